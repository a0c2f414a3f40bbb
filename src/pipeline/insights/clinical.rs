use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{
    clamp_unit, extract_recommendations, parse_structured, strip_bullet, Extraction, MAX_INSIGHTS,
    MAX_RECOMMENDATIONS, MAX_RELATED_CONDITIONS,
};
use crate::models::ClinicalQueryType;

const DEFAULT_CONFIDENCE: f64 = 0.7;

static CONDITION_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*(?:,|;|\band\b|\bor\b)\s*").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalInsight {
    #[serde(default)]
    pub category: String,
    pub insight: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub supporting_evidence: Vec<String>,
    #[serde(default = "default_significance")]
    pub clinical_significance: String,
}

fn default_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

fn default_significance() -> String {
    "low".into()
}

/// Shape requested from the model for clinical queries.
#[derive(Debug, Deserialize)]
struct StructuredClinical {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    insights: Vec<ClinicalInsight>,
    #[serde(default)]
    recommendations: Vec<String>,
    #[serde(default)]
    related_conditions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClinicalExtraction {
    pub response: String,
    pub insights: Vec<ClinicalInsight>,
    pub recommendations: Vec<String>,
    pub related_conditions: Vec<String>,
    pub confidence_score: f64,
    pub extraction: Extraction,
}

/// Structure a clinical answer. `source_count` feeds the confidence score.
pub fn extract_clinical(
    response_text: &str,
    query_type: ClinicalQueryType,
    source_count: usize,
) -> ClinicalExtraction {
    let (response, mut insights, mut recommendations, mut related_conditions, extraction) =
        match parse_structured::<StructuredClinical>(response_text) {
            Some(s) => {
                let response = s
                    .response
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| response_text.trim().to_string());
                let insights = s
                    .insights
                    .into_iter()
                    .map(|mut i| {
                        if i.category.trim().is_empty() {
                            i.category = determine_category(&i.insight, query_type);
                        }
                        i.confidence = clamp_unit(i.confidence);
                        i
                    })
                    .collect();
                (
                    response,
                    insights,
                    s.recommendations,
                    dedupe(s.related_conditions),
                    Extraction::Structured,
                )
            }
            None => (
                response_text.trim().to_string(),
                extract_insights(response_text, query_type),
                extract_recommendations(response_text),
                extract_related_conditions(response_text),
                Extraction::Heuristic,
            ),
        };

    insights.truncate(MAX_INSIGHTS);
    recommendations.truncate(MAX_RECOMMENDATIONS);
    related_conditions.truncate(MAX_RELATED_CONDITIONS);

    let confidence_score = clinical_confidence(&response, &insights, source_count);
    ClinicalExtraction {
        response,
        insights,
        recommendations,
        related_conditions,
        confidence_score,
        extraction,
    }
}

// ── Heuristics ──────────────────────────────────────────

/// A line containing `insight:`, `finding:`, `observation:` or `conclusion:`
/// opens an insight. Bullet lines right after it are its evidence; the first
/// plain line closes it.
pub fn extract_insights(response_text: &str, query_type: ClinicalQueryType) -> Vec<ClinicalInsight> {
    let mut insights = Vec::new();
    let mut current: Option<(String, Vec<String>)> = None;

    let finish = |text: String, evidence: Vec<String>| ClinicalInsight {
        category: determine_category(&text, query_type),
        confidence: extract_confidence(&text),
        clinical_significance: determine_significance(&text).to_string(),
        supporting_evidence: evidence,
        insight: text,
    };

    for line in response_text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let lower = line.to_lowercase();
        let opens = ["insight:", "finding:", "observation:", "conclusion:"]
            .iter()
            .any(|k| lower.contains(k));

        if opens {
            if let Some((text, evidence)) = current.take() {
                insights.push(finish(text, evidence));
            }
            let text = line.split_once(':').map_or(line, |(_, rest)| rest).trim();
            current = Some((text.to_string(), Vec::new()));
        } else if let Some((_, evidence)) = current.as_mut() {
            match strip_bullet(line) {
                Some(item) => evidence.push(item.to_string()),
                None => {
                    if let Some((text, evidence)) = current.take() {
                        insights.push(finish(text, evidence));
                    }
                }
            }
        }
    }
    if let Some((text, evidence)) = current {
        insights.push(finish(text, evidence));
    }

    insights.truncate(MAX_INSIGHTS);
    insights
}

pub fn determine_category(insight: &str, query_type: ClinicalQueryType) -> String {
    let lower = insight.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    let category = if has(&["diagnos", "condition", "disease", "disorder"]) {
        "diagnosis"
    } else if has(&["treatment", "therapy", "intervention"]) {
        "treatment"
    } else if has(&["medication", "drug", "prescription"]) {
        "medication"
    } else if has(&["lab", "test", "result", "level"]) {
        "lab"
    } else if has(&["imaging", "scan", "x-ray"]) {
        "imaging"
    } else if has(&["risk", "factor", "complication"]) {
        "risk_factor"
    } else {
        query_type.as_str()
    };
    category.to_string()
}

pub fn extract_confidence(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    if has(&["certain", "definitive", "confirmed"]) {
        0.9
    } else if has(&["likely", "probable", "suggests"]) {
        0.8
    } else if has(&["possible", "may", "could"]) {
        0.6
    } else if has(&["uncertain", "unclear", "inconclusive"]) {
        0.4
    } else {
        DEFAULT_CONFIDENCE
    }
}

pub fn determine_significance(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    if has(&["critical", "urgent", "severe", "emergency"]) {
        "high"
    } else if has(&["moderate", "significant", "important"]) {
        "medium"
    } else {
        "low"
    }
}

/// Conditions named after the colon on lines mentioning related conditions,
/// differentials, "consider" or "rule out".
pub fn extract_related_conditions(response_text: &str) -> Vec<String> {
    let mut conditions = Vec::new();

    for line in response_text.lines().map(str::trim) {
        let lower = line.to_lowercase();
        let mentions = ["related condition", "differential", "consider", "rule out"]
            .iter()
            .any(|p| lower.contains(p));
        if !mentions {
            continue;
        }
        if let Some((_, rest)) = line.split_once(':') {
            conditions.extend(
                CONDITION_SEPARATOR
                    .split(rest.trim())
                    .map(|c| c.trim().trim_end_matches('.').to_string()),
            );
        }
    }

    let mut conditions = dedupe(conditions.into_iter().filter(|c| c.chars().count() > 2).collect());
    conditions.truncate(MAX_RELATED_CONDITIONS);
    conditions
}

/// Case-insensitive dedupe keeping first-seen order.
fn dedupe(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|c| seen.insert(c.to_lowercase()))
        .collect()
}

/// `0.5` base, boosted by insight count, source count, answer length and the
/// insights' own confidence, clamped to `[0, 1]`.
pub fn clinical_confidence(response_text: &str, insights: &[ClinicalInsight], source_count: usize) -> f64 {
    let insight_boost = (insights.len() as f64 * 0.1).min(0.3);
    let source_boost = (source_count as f64 * 0.05).min(0.2);
    let length_boost = (response_text.chars().count() as f64 / 1000.0 * 0.1).min(0.2);
    let agreement_boost = if insights.is_empty() {
        0.0
    } else {
        let avg = insights.iter().map(|i| i.confidence).sum::<f64>() / insights.len() as f64;
        (avg - 0.5) * 0.3
    };

    clamp_unit(0.5 + insight_boost + source_boost + length_boost + agreement_boost)
}
