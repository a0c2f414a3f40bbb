use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{clamp_unit, parse_structured, Extraction};

const DEFAULT_CODE_CONFIDENCE: f64 = 0.5;

static ICD10_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-TV-Z][0-9][0-9AB](?:\.[0-9A-TV-Z]{1,4})?)\b").unwrap());
static CPT_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b([0-9]{5})\b").unwrap());
static CONFIDENCE_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)confidence").unwrap());
static CONFIDENCE_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)confidence[^0-9]{0,12}([01](?:\.[0-9]+)?)").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeSuggestion {
    pub code: String,
    pub description: String,
    pub confidence: f64,
    pub category: String,
    pub code_type: String,
}

#[derive(Debug, Deserialize)]
struct StructuredCode {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    category: Option<String>,
}

/// Shape requested from the model for code suggestions.
#[derive(Debug, Deserialize)]
struct StructuredCoding {
    #[serde(default)]
    icd10_codes: Vec<StructuredCode>,
    #[serde(default)]
    cpt_codes: Vec<StructuredCode>,
    #[serde(default)]
    clinical_summary: Option<String>,
    #[serde(default)]
    confidence_score: Option<f64>,
    #[serde(default)]
    processing_notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CodingExtraction {
    pub icd10_suggestions: Vec<CodeSuggestion>,
    pub cpt_suggestions: Vec<CodeSuggestion>,
    pub clinical_summary: String,
    pub confidence_score: f64,
    pub processing_notes: Vec<String>,
    pub extraction: Extraction,
}

/// What the caller asked for.
#[derive(Debug, Clone, Copy)]
pub struct CodingRequest {
    pub include_diagnoses: bool,
    pub include_procedures: bool,
    pub max_suggestions: usize,
}

impl StructuredCode {
    fn into_suggestion(self, code_type: &str, default_category: &str) -> CodeSuggestion {
        CodeSuggestion {
            code: self.code.trim().to_string(),
            description: self.description.trim().to_string(),
            confidence: clamp_unit(self.confidence.unwrap_or(DEFAULT_CODE_CONFIDENCE)),
            category: self
                .category
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| default_category.to_string()),
            code_type: code_type.to_string(),
        }
    }
}

pub fn extract_codes(response_text: &str, request: CodingRequest) -> CodingExtraction {
    let (mut icd10, mut cpt, summary, confidence, mut notes, extraction) =
        match parse_structured::<StructuredCoding>(response_text) {
            Some(s) => (
                s.icd10_codes
                    .into_iter()
                    .map(|c| c.into_suggestion("ICD-10", "secondary"))
                    .filter(|c| !c.code.is_empty())
                    .collect(),
                s.cpt_codes
                    .into_iter()
                    .map(|c| c.into_suggestion("CPT", "procedure"))
                    .filter(|c| !c.code.is_empty())
                    .collect(),
                s.clinical_summary.filter(|c| !c.trim().is_empty()),
                s.confidence_score,
                s.processing_notes,
                Extraction::Structured,
            ),
            None => (
                heuristic_icd10(response_text),
                heuristic_cpt(response_text),
                None,
                None,
                vec!["Codes were extracted from a free-text response".to_string()],
                Extraction::Heuristic,
            ),
        };

    if !request.include_diagnoses {
        icd10.clear();
    }
    if !request.include_procedures {
        cpt.clear();
    }
    icd10.truncate(request.max_suggestions);
    cpt.truncate(request.max_suggestions.saturating_sub(icd10.len()));

    if icd10.is_empty() && cpt.is_empty() {
        notes.push("No codes could be identified".to_string());
    }

    let confidence_score = match confidence {
        Some(c) => clamp_unit(c),
        None => overall_confidence(icd10.iter().chain(cpt.iter())),
    };

    CodingExtraction {
        icd10_suggestions: icd10,
        cpt_suggestions: cpt,
        clinical_summary: summary.unwrap_or_else(|| extract_clinical_summary(response_text)),
        confidence_score,
        processing_notes: notes,
        extraction,
    }
}

// ── Heuristics ──────────────────────────────────────────

/// Text after the code on its line, stripped of separators and any
/// trailing confidence annotation.
fn description_after(line: &str, end: usize) -> String {
    let rest = &line[end..];
    let rest = match CONFIDENCE_WORD.find(rest) {
        Some(m) => &rest[..m.start()],
        None => rest,
    };
    rest.trim_matches(|c: char| c.is_whitespace() || matches!(c, '-' | ':' | '(' | ')' | ',' | '–'))
        .to_string()
}

fn line_confidence(line: &str) -> f64 {
    CONFIDENCE_VALUE
        .captures(line)
        .and_then(|c| c[1].parse::<f64>().ok())
        .map(clamp_unit)
        .unwrap_or(DEFAULT_CODE_CONFIDENCE)
}

/// ICD-10 shaped tokens on lines that do not talk about CPT. The first code
/// found is the primary diagnosis.
pub fn heuristic_icd10(response_text: &str) -> Vec<CodeSuggestion> {
    let mut seen = HashSet::new();
    let mut suggestions = Vec::new();

    for line in response_text.lines().map(str::trim) {
        if line.to_uppercase().contains("CPT") {
            continue;
        }
        for m in ICD10_CODE.captures_iter(line).filter_map(|c| c.get(1)) {
            if !seen.insert(m.as_str().to_string()) {
                continue;
            }
            suggestions.push(CodeSuggestion {
                code: m.as_str().to_string(),
                description: description_after(line, m.end()),
                confidence: line_confidence(line),
                category: if suggestions.is_empty() { "primary" } else { "secondary" }.to_string(),
                code_type: "ICD-10".to_string(),
            });
        }
    }
    suggestions
}

/// Five-digit codes on lines that mention CPT.
pub fn heuristic_cpt(response_text: &str) -> Vec<CodeSuggestion> {
    let mut seen = HashSet::new();
    let mut suggestions = Vec::new();

    for line in response_text.lines().map(str::trim) {
        if !line.to_uppercase().contains("CPT") {
            continue;
        }
        for m in CPT_CODE.captures_iter(line).filter_map(|c| c.get(1)) {
            if !seen.insert(m.as_str().to_string()) {
                continue;
            }
            suggestions.push(CodeSuggestion {
                code: m.as_str().to_string(),
                description: description_after(line, m.end()),
                confidence: line_confidence(line),
                category: "procedure".to_string(),
                code_type: "CPT".to_string(),
            });
        }
    }
    suggestions
}

/// Average suggestion confidence, nudged up for three or more suggestions and
/// down for a single one. `0.5` when there are none.
pub fn overall_confidence<'a>(suggestions: impl Iterator<Item = &'a CodeSuggestion>) -> f64 {
    let confidences: Vec<f64> = suggestions.map(|s| s.confidence).collect();
    if confidences.is_empty() {
        return 0.5;
    }
    let avg = confidences.iter().sum::<f64>() / confidences.len() as f64;
    match confidences.len() {
        1 => (avg - 0.1).max(0.0),
        2 => avg,
        _ => (avg + 0.1).min(1.0),
    }
}

/// First three sentence-like lines that are not code listings.
pub fn extract_clinical_summary(response_text: &str) -> String {
    let lines: Vec<&str> = response_text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter(|l| !["ICD", "CPT", "Code:", "Confidence:"].iter().any(|p| l.starts_with(p)))
        .filter(|l| l.chars().count() > 20 && l.contains('.'))
        .take(3)
        .collect();

    if lines.is_empty() {
        "Clinical analysis completed".to_string()
    } else {
        lines.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(max: usize) -> CodingRequest {
        CodingRequest {
            include_diagnoses: true,
            include_procedures: true,
            max_suggestions: max,
        }
    }

    const FREE_TEXT: &str = "Patient presents with poorly controlled type 2 diabetes and hypertension.\n\
        ICD-10 suggestions:\n\
        - E11.65 - Type 2 diabetes mellitus with hyperglycemia (confidence: 0.9)\n\
        - I10 - Essential hypertension (confidence 0.85)\n\
        - E11.65 repeated\n\
        CPT suggestions:\n\
        - CPT 99214 - Office visit, established patient, moderate complexity\n\
        - CPT 83036 - Hemoglobin A1c (confidence: 0.7)";

    #[test]
    fn heuristic_icd10_codes() {
        let codes = heuristic_icd10(FREE_TEXT);
        let ids: Vec<&str> = codes.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(ids, vec!["E11.65", "I10"]);
        assert_eq!(codes[0].category, "primary");
        assert_eq!(codes[0].description, "Type 2 diabetes mellitus with hyperglycemia");
        assert_eq!(codes[0].confidence, 0.9);
        assert_eq!(codes[1].category, "secondary");
        assert_eq!(codes[1].confidence, 0.85);
    }

    #[test]
    fn heuristic_cpt_codes() {
        let codes = heuristic_cpt(FREE_TEXT);
        let ids: Vec<&str> = codes.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(ids, vec!["99214", "83036"]);
        assert_eq!(codes[0].confidence, DEFAULT_CODE_CONFIDENCE);
        assert_eq!(codes[1].description, "Hemoglobin A1c");
        assert!(codes.iter().all(|c| c.code_type == "CPT"));
    }

    #[test]
    fn include_flags_and_max_are_honored() {
        let only_dx = extract_codes(
            FREE_TEXT,
            CodingRequest { include_procedures: false, ..request(10) },
        );
        assert_eq!(only_dx.icd10_suggestions.len(), 2);
        assert!(only_dx.cpt_suggestions.is_empty());

        let capped = extract_codes(FREE_TEXT, request(3));
        assert_eq!(capped.icd10_suggestions.len(), 2);
        assert_eq!(capped.cpt_suggestions.len(), 1);
        assert_eq!(capped.extraction, Extraction::Heuristic);
    }

    #[test]
    fn overall_confidence_rules() {
        let s = |c: f64| CodeSuggestion {
            code: "X".into(),
            description: String::new(),
            confidence: c,
            category: "primary".into(),
            code_type: "ICD-10".into(),
        };
        assert_eq!(overall_confidence(Vec::<CodeSuggestion>::new().iter()), 0.5);
        assert!((overall_confidence([s(0.8)].iter()) - 0.7).abs() < 1e-9);
        assert!((overall_confidence([s(0.8), s(0.6)].iter()) - 0.7).abs() < 1e-9);
        assert!((overall_confidence([s(0.8), s(0.6), s(0.7)].iter()) - 0.8).abs() < 1e-9);
        assert_eq!(overall_confidence([s(1.0), s(1.0), s(1.0)].iter()), 1.0);
    }

    #[test]
    fn summary_fallback() {
        assert_eq!(
            extract_clinical_summary(FREE_TEXT),
            "Patient presents with poorly controlled type 2 diabetes and hypertension. \
             - E11.65 - Type 2 diabetes mellitus with hyperglycemia (confidence: 0.9) \
             - I10 - Essential hypertension (confidence 0.85)"
        );
        assert_eq!(extract_clinical_summary("ICD E11.9\nshort."), "Clinical analysis completed");
    }

    #[test]
    fn structured_response_is_used() {
        let text = r#"```json
{"icd10_codes": [{"code": "J18.9", "description": "Pneumonia, unspecified organism", "confidence": 0.82, "category": "primary"}],
 "cpt_codes": [{"code": "71046", "description": "Chest X-ray, 2 views", "confidence": 0.9}],
 "clinical_summary": "Community-acquired pneumonia.", "confidence_score": 0.86, "processing_notes": ["Assumed outpatient setting"]}
```"#;
        let result = extract_codes(text, request(10));
        assert_eq!(result.extraction, Extraction::Structured);
        assert_eq!(result.icd10_suggestions[0].code, "J18.9");
        assert_eq!(result.cpt_suggestions[0].category, "procedure");
        assert_eq!(result.clinical_summary, "Community-acquired pneumonia.");
        assert_eq!(result.confidence_score, 0.86);
        assert_eq!(result.processing_notes, vec!["Assumed outpatient setting"]);
    }

    #[test]
    fn no_codes_noted() {
        let result = extract_codes("Unable to determine codes from the notes provided.", request(10));
        assert!(result.icd10_suggestions.is_empty());
        assert_eq!(result.confidence_score, 0.5);
        assert!(result.processing_notes.iter().any(|n| n.contains("No codes")));
    }
}
