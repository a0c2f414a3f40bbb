use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::clinical::extract_insights;
use super::{clamp_unit, extract_recommendations, parse_structured, Extraction, MAX_RECOMMENDATIONS};
use crate::models::ClinicalQueryType;

/// Used when the model gives no confidence of its own.
const DEFAULT_ANALYSIS_CONFIDENCE: f64 = 0.8;

/// `Parameter: value ... high|low|...` on a single line.
static FLAGGED_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^[-*•]?\s*([A-Za-z][A-Za-z0-9 /()%-]*?)\s*:\s*([0-9][0-9.,]*\s*[A-Za-zµμ/%^0-9.]*)[^\n]*?\b(critically high|critically low|critical|high|low|elevated|decreased|abnormal)\b",
    )
    .unwrap()
});
static NORMAL_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:normal|reference)(?:\s+range)?\s*[:=]?\s*([0-9][0-9.,]*\s*-\s*[0-9][0-9.,]*\s*[A-Za-zµμ/%^0-9]*)").unwrap()
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbnormalFlag {
    pub parameter: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub normal_range: Option<String>,
    #[serde(default = "default_severity")]
    pub severity: String,
    #[serde(default = "default_flag_type")]
    pub flag_type: String,
}

fn default_severity() -> String {
    "moderate".into()
}

fn default_flag_type() -> String {
    "abnormal".into()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticInsight {
    #[serde(default)]
    pub category: String,
    pub insight: String,
    #[serde(default = "default_insight_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

fn default_insight_confidence() -> f64 {
    0.7
}

/// Shape requested from the model for results analysis.
#[derive(Debug, Deserialize)]
struct StructuredAnalysis {
    #[serde(default)]
    abnormal_flags: Vec<AbnormalFlag>,
    #[serde(default)]
    diagnostic_insights: Vec<DiagnosticInsight>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisExtraction {
    pub abnormal_flags: Vec<AbnormalFlag>,
    pub diagnostic_insights: Vec<DiagnosticInsight>,
    pub summary: String,
    pub confidence_score: f64,
    pub recommendations: Vec<String>,
    pub extraction: Extraction,
}

pub fn extract_analysis(response_text: &str) -> AnalysisExtraction {
    match parse_structured::<StructuredAnalysis>(response_text) {
        Some(s) => {
            let mut recommendations = s.recommendations;
            recommendations.truncate(MAX_RECOMMENDATIONS);
            AnalysisExtraction {
                abnormal_flags: s.abnormal_flags,
                diagnostic_insights: s
                    .diagnostic_insights
                    .into_iter()
                    .map(|mut i| {
                        i.confidence = clamp_unit(i.confidence);
                        i
                    })
                    .collect(),
                summary: s
                    .summary
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| response_text.trim().to_string()),
                confidence_score: clamp_unit(s.confidence.unwrap_or(DEFAULT_ANALYSIS_CONFIDENCE)),
                recommendations,
                extraction: Extraction::Structured,
            }
        }
        None => AnalysisExtraction {
            abnormal_flags: extract_abnormal_flags(response_text),
            diagnostic_insights: extract_insights(response_text, ClinicalQueryType::Diagnostic)
                .into_iter()
                .map(|i| DiagnosticInsight {
                    confidence: i.confidence,
                    category: i.category,
                    insight: i.insight,
                    recommendations: Vec::new(),
                })
                .collect(),
            summary: response_text.trim().to_string(),
            confidence_score: DEFAULT_ANALYSIS_CONFIDENCE,
            recommendations: extract_recommendations(response_text),
            extraction: Extraction::Heuristic,
        },
    }
}

/// Lines reporting a value together with a high/low/abnormal qualifier.
pub fn extract_abnormal_flags(response_text: &str) -> Vec<AbnormalFlag> {
    response_text
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            let caps = FLAGGED_VALUE.captures(line)?;
            let qualifier = caps[3].to_lowercase();
            let flag_type = match qualifier.as_str() {
                "high" | "elevated" | "critically high" => "high",
                "low" | "decreased" | "critically low" => "low",
                _ => "abnormal",
            };
            let severity = if qualifier.starts_with("critical") || line.to_lowercase().contains("severe") {
                "severe"
            } else if line.to_lowercase().contains("mild") || line.to_lowercase().contains("slightly") {
                "mild"
            } else {
                "moderate"
            };
            Some(AbnormalFlag {
                parameter: caps[1].trim().to_string(),
                value: caps[2].trim().to_string(),
                normal_range: NORMAL_RANGE.captures(line).map(|c| c[1].trim().to_string()),
                severity: severity.to_string(),
                flag_type: flag_type.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_from_free_text() {
        let text = "Lab review:\n\
                    - Hemoglobin: 8.2 g/dL (normal range 12.0-15.5 g/dL) - low\n\
                    - WBC: 15,000/uL elevated\n\
                    - Potassium: 6.9 mmol/L critically high\n\
                    - Sodium: 140 mmol/L within normal limits\n\
                    - Glucose: 110 mg/dL slightly high";
        let flags = extract_abnormal_flags(text);
        assert_eq!(flags.len(), 4);

        assert_eq!(flags[0].parameter, "Hemoglobin");
        assert_eq!(flags[0].value, "8.2 g/dL");
        assert_eq!(flags[0].normal_range.as_deref(), Some("12.0-15.5 g/dL"));
        assert_eq!(flags[0].flag_type, "low");
        assert_eq!(flags[0].severity, "moderate");

        assert_eq!(flags[1].parameter, "WBC");
        assert_eq!(flags[1].flag_type, "high");

        assert_eq!(flags[2].flag_type, "high");
        assert_eq!(flags[2].severity, "severe");

        assert_eq!(flags[3].parameter, "Glucose");
        assert_eq!(flags[3].severity, "mild");
    }

    #[test]
    fn heuristic_analysis() {
        let text = "Hemoglobin: 8.2 g/dL low\n\
                    Finding: Low hemoglobin suggests possible anemia\n\
                    - Microcytic indices\n\
                    Recommendations:\n\
                    - Iron studies";
        let result = extract_analysis(text);
        assert_eq!(result.extraction, Extraction::Heuristic);
        assert_eq!(result.abnormal_flags.len(), 1);
        assert_eq!(result.diagnostic_insights.len(), 1);
        assert_eq!(result.diagnostic_insights[0].confidence, 0.8);
        assert_eq!(result.recommendations, vec!["Iron studies"]);
        assert_eq!(result.confidence_score, DEFAULT_ANALYSIS_CONFIDENCE);
        assert!(result.summary.starts_with("Hemoglobin"));
    }

    #[test]
    fn structured_analysis() {
        let text = r#"```json
{"abnormal_flags": [{"parameter": "Glucose", "value": "180 mg/dL", "normal_range": "70-100 mg/dL", "severity": "moderate", "flag_type": "high"}],
 "diagnostic_insights": [{"category": "endocrine", "insight": "Hyperglycemia", "confidence": 0.85, "recommendations": ["HbA1c"]}],
 "summary": "Elevated glucose.", "confidence": 0.9, "recommendations": ["Repeat fasting glucose"]}
```"#;
        let result = extract_analysis(text);
        assert_eq!(result.extraction, Extraction::Structured);
        assert_eq!(result.abnormal_flags[0].parameter, "Glucose");
        assert_eq!(result.diagnostic_insights[0].recommendations, vec!["HbA1c"]);
        assert_eq!(result.summary, "Elevated glucose.");
        assert_eq!(result.confidence_score, 0.9);
    }
}
