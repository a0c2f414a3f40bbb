//! Turn free-text model answers into structured fields.
//!
//! Prompts ask for a fenced JSON object. When one parses, it is used as-is
//! (`Extraction::Structured`). Otherwise keyword and regex heuristics recover
//! what they can (`Extraction::Heuristic`). Neither path is authoritative.

pub mod analysis;
pub mod clinical;
pub mod coding;

pub use analysis::*;
pub use clinical::*;
pub use coding::*;

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Attached to every AI-derived response.
pub const AI_DISCLAIMER: &str = "AI-generated content for clinical decision support only. \
Structured fields are extracted on a best-effort basis and must be verified by a qualified clinician.";

/// Caps applied to extracted lists.
pub const MAX_INSIGHTS: usize = 5;
pub const MAX_RECOMMENDATIONS: usize = 5;
pub const MAX_RELATED_CONDITIONS: usize = 5;

/// How the structured fields of a response were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Extraction {
    Structured,
    Heuristic,
}

static NUMBERED_ITEM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+[.)]\s*").unwrap());

/// Extract a JSON block from a model response.
/// Handles responses that include text before/after the JSON.
pub fn extract_json_block(response: &str) -> Option<&str> {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```json") {
        let after_fence = &trimmed[start + 7..];
        if let Some(end) = after_fence.find("```") {
            return Some(after_fence[..end].trim());
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        if let Some(end) = after_fence.find("```") {
            let block = after_fence[..end].trim();
            if block.starts_with('{') {
                return Some(block);
            }
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => Some(&trimmed[start..=end]),
        _ => None,
    }
}

/// Parse the response's JSON block into `T`, if there is one that fits.
pub fn parse_structured<T: DeserializeOwned>(response: &str) -> Option<T> {
    let block = extract_json_block(response)?;
    match serde_json::from_str(block) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(error = %e, "Model JSON did not match expected shape, using heuristics");
            None
        }
    }
}

pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn strip_bullet(line: &str) -> Option<&str> {
    line.strip_prefix(['-', '•', '*']).map(str::trim)
}

/// Recommendations listed after a line mentioning "recommendation" or
/// starting with "suggest". Bullets and numbered items are collected until
/// the first plain line.
pub fn extract_recommendations(response: &str) -> Vec<String> {
    let mut recommendations = Vec::new();
    let mut in_section = false;

    for line in response.lines().map(str::trim) {
        let lower = line.to_lowercase();
        if lower.contains("recommendation") || lower.starts_with("suggest") {
            in_section = true;
            if let Some((_, rest)) = line.split_once(':') {
                let rest = rest.trim();
                if !rest.is_empty() {
                    recommendations.push(rest.to_string());
                }
            }
            continue;
        }
        if !in_section || line.is_empty() {
            continue;
        }
        if let Some(item) = strip_bullet(line) {
            recommendations.push(item.to_string());
        } else if let Some(m) = NUMBERED_ITEM.find(line) {
            recommendations.push(line[m.end()..].trim().to_string());
        } else {
            in_section = false;
        }
    }

    recommendations.retain(|r| !r.is_empty());
    recommendations.truncate(MAX_RECOMMENDATIONS);
    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_block_from_fence() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nThanks.";
        assert_eq!(extract_json_block(text), Some("{\"a\": 1}"));
    }

    #[test]
    fn json_block_from_bare_braces() {
        let text = "Result {\"a\": {\"b\": 2}} end";
        assert_eq!(extract_json_block(text), Some("{\"a\": {\"b\": 2}}"));
    }

    #[test]
    fn no_json_block_in_prose() {
        assert!(extract_json_block("Blood pressure is stable.").is_none());
    }

    #[test]
    fn parse_structured_rejects_wrong_shape() {
        #[derive(serde::Deserialize)]
        struct Shape {
            #[allow(dead_code)]
            summary: String,
        }
        assert!(parse_structured::<Shape>("```json\n{\"other\": 1}\n```").is_none());
        assert!(parse_structured::<Shape>("```json\n{\"summary\": \"ok\"}\n```").is_some());
    }

    #[test]
    fn recommendations_section_parsing() {
        let text = "Assessment done.\n\
                    Recommendations: Repeat CBC in 2 weeks\n\
                    - Start iron supplementation\n\
                    2. Dietary counseling\n\
                    \n\
                    * Recheck ferritin\n\
                    Prognosis is good.\n\
                    - Not a recommendation";
        assert_eq!(
            extract_recommendations(text),
            vec![
                "Repeat CBC in 2 weeks",
                "Start iron supplementation",
                "Dietary counseling",
                "Recheck ferritin",
            ]
        );
    }

    #[test]
    fn recommendations_capped_at_five() {
        let mut text = String::from("Recommendations:\n");
        for i in 0..8 {
            text.push_str(&format!("- item {i}\n"));
        }
        assert_eq!(extract_recommendations(&text).len(), MAX_RECOMMENDATIONS);
    }

    #[test]
    fn clamp_handles_out_of_range() {
        assert_eq!(clamp_unit(1.4), 1.0);
        assert_eq!(clamp_unit(-0.2), 0.0);
        assert_eq!(clamp_unit(f64::NAN), 0.0);
    }
}
