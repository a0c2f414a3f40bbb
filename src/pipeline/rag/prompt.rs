//! Prompt builders for every AI-backed endpoint.
//!
//! Prompts that feed the insight parsers ask for a fenced JSON block so the
//! structured path can be tried before the keyword heuristics.

use crate::models::*;
use crate::pipeline::storage::types::ScoredChunk;

/// First `max_chars` characters of `text`, with `...` appended when cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Retrieval-augmented prompt: numbered context chunks, then the query.
pub fn build_query_prompt(query: &str, sources: &[ScoredChunk]) -> String {
    let mut prompt = String::new();

    if sources.is_empty() {
        prompt.push_str("No indexed documents matched this query. Say so if the answer depends on patient records.\n\n");
    } else {
        prompt.push_str("Context information is below.\n---------------------\n");
        for (i, chunk) in sources.iter().enumerate() {
            match &chunk.section_title {
                Some(title) => prompt.push_str(&format!("[{}] ({title})\n", i + 1)),
                None => prompt.push_str(&format!("[{}]\n", i + 1)),
            }
            prompt.push_str(chunk.content.trim());
            prompt.push_str("\n\n");
        }
        prompt.push_str("---------------------\n");
        prompt.push_str("Using only the context above and no prior knowledge, answer the query.\n\n");
    }

    prompt.push_str(&format!("User Query: {query}"));
    prompt
}

/// `- {type} ({date}): {excerpt}` lines for recent documents, under `heading`.
/// Empty when there are no documents.
pub fn document_history(heading: &str, documents: &[Document], excerpt_chars: usize, with_dates: bool) -> String {
    if documents.is_empty() {
        return String::new();
    }

    let mut block = format!("{heading}:\n");
    for doc in documents {
        let text = doc.source.text().unwrap_or("[no extracted text]");
        let snippet = excerpt(text, excerpt_chars);
        if with_dates {
            block.push_str(&format!(
                "- {} ({}): {}\n",
                doc.document_type,
                doc.created_at.format("%Y-%m-%d"),
                snippet
            ));
        } else {
            block.push_str(&format!("- {}: {}\n", doc.document_type, snippet));
        }
    }
    block
}

pub fn patient_query_prompt(query: &str, patient: &PatientIdentifier) -> String {
    format!(
        "Answer the question using only this patient's records.\n\
         Patient Code: {}\n\
         Age Range: {}\n\
         Gender: {}\n\n\
         Question: {query}",
        patient.patient_code,
        patient.age_range.as_deref().unwrap_or("Not specified"),
        patient.gender.map(|g| g.as_str()).unwrap_or("Not specified"),
    )
}

pub struct ClinicalPrompt<'a> {
    pub query: &'a str,
    pub query_type: ClinicalQueryType,
    pub patient_code: Option<&'a str>,
    pub facility_name: Option<&'a str>,
    pub context: &'a str,
}

pub fn clinical_prompt(input: &ClinicalPrompt<'_>) -> String {
    format!(
        r#"You are an advanced clinical AI assistant. Analyze the following clinical query and provide comprehensive insights.

Query Type: {query_type}
Patient Code: {patient}
Facility: {facility}

Clinical Query: {query}

{context}
Please provide:
1. A comprehensive clinical response
2. Specific clinical insights with confidence levels
3. Evidence-based recommendations
4. Related conditions or considerations
5. Clinical significance assessment

Return a single JSON object in a ```json fenced block with this shape:
{{"response": "...", "insights": [{{"category": "...", "insight": "...", "confidence": 0.0, "supporting_evidence": ["..."], "clinical_significance": "high|medium|low"}}], "recommendations": ["..."], "related_conditions": ["..."]}}"#,
        query_type = input.query_type,
        patient = input.patient_code.unwrap_or("General Query"),
        facility = input.facility_name.unwrap_or("Not specified"),
        query = input.query,
        context = input.context,
    )
}

pub fn coding_prompt(clinical_notes: &str, include_diagnoses: bool, include_procedures: bool, max_suggestions: usize) -> String {
    format!(
        r#"Analyze the following clinical notes and suggest appropriate medical codes.

Clinical Notes:
{clinical_notes}

Requirements:
- Include ICD-10 codes: {include_diagnoses}
- Include CPT codes: {include_procedures}
- Maximum suggestions: {max_suggestions}

Categorize ICD-10 codes as primary or secondary and CPT codes as procedure.
Confidence scores must be between 0.0 and 1.0.

Return a single JSON object in a ```json fenced block with this shape:
{{"icd10_codes": [{{"code": "...", "description": "...", "confidence": 0.0, "category": "primary"}}], "cpt_codes": [{{"code": "...", "description": "...", "confidence": 0.0, "category": "procedure"}}], "clinical_summary": "...", "confidence_score": 0.0, "processing_notes": ["..."]}}"#
    )
}

pub struct DischargePrompt<'a> {
    pub patient: &'a PatientIdentifier,
    pub facility_name: &'a str,
    pub diagnosis: &'a str,
    pub medications: &'a [String],
    pub follow_up_instructions: Option<&'a str>,
    pub activity_restrictions: Option<&'a str>,
    pub diet_instructions: Option<&'a str>,
    pub warning_signs: Option<&'a str>,
    pub additional_notes: Option<&'a str>,
    pub language: &'a str,
    pub reading_level: &'a str,
    pub history: &'a str,
}

/// Bullet list of medications, or the "none prescribed" line.
pub fn medications_text(medications: &[String]) -> String {
    if medications.is_empty() {
        "No medications prescribed".to_string()
    } else {
        medications
            .iter()
            .map(|m| format!("- {m}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn discharge_prompt(input: &DischargePrompt<'_>) -> String {
    format!(
        r#"Generate comprehensive discharge instructions for patient {code}.

Patient Information:
- Patient Code: {code}
- Facility: {facility}
- Age Range: {age}
- Gender: {gender}

Discharge Details:
- Primary Diagnosis: {diagnosis}
- Language Preference: {language}
- Reading Level: {reading_level}

Medications:
{medications}

Follow-up Instructions:
{follow_up}

Activity Restrictions:
{activity}

Diet Instructions:
{diet}

Warning Signs:
{warning}

Additional Notes:
{notes}

{history}
Write patient-friendly discharge instructions that include:
1. Clear explanation of the diagnosis in simple terms
2. Detailed medication instructions with purpose and timing
3. Specific follow-up care instructions
4. Activity and diet guidelines
5. Warning signs that require immediate medical attention
6. Emergency contact information

Write in {language} at a {reading_level} reading level. Every instruction must be clear and actionable."#,
        code = input.patient.patient_code,
        facility = input.facility_name,
        age = input.patient.age_range.as_deref().unwrap_or("Not specified"),
        gender = input.patient.gender.map(|g| g.as_str()).unwrap_or("Not specified"),
        diagnosis = input.diagnosis,
        language = input.language,
        reading_level = input.reading_level,
        medications = medications_text(input.medications),
        follow_up = input.follow_up_instructions.unwrap_or("Standard follow-up as needed"),
        activity = input.activity_restrictions.unwrap_or("No specific restrictions"),
        diet = input.diet_instructions.unwrap_or("Regular diet as tolerated"),
        warning = input.warning_signs.unwrap_or("Standard warning signs to watch for"),
        notes = input.additional_notes.unwrap_or("No additional notes"),
        history = input.history,
    )
}

/// Deterministic instructions used when the model cannot be reached.
pub fn discharge_fallback(input: &DischargePrompt<'_>) -> String {
    format!(
        "DISCHARGE INSTRUCTIONS FOR {code}\n\n\
         Diagnosis: {diagnosis}\n\n\
         Medications:\n{medications}\n\n\
         Follow-up: {follow_up}\n\n\
         Activity: {activity}\n\n\
         Diet: {diet}\n\n\
         Warning Signs: {warning}\n\n\
         Additional Notes: {notes}",
        code = input.patient.patient_code,
        diagnosis = input.diagnosis,
        medications = medications_text(input.medications),
        follow_up = input
            .follow_up_instructions
            .unwrap_or("Follow up with your primary care provider as needed"),
        activity = input.activity_restrictions.unwrap_or("Resume normal activities as tolerated"),
        diet = input.diet_instructions.unwrap_or("Regular diet"),
        warning = input.warning_signs.unwrap_or("Contact your doctor if symptoms worsen"),
        notes = input.additional_notes.unwrap_or("Take care and follow all instructions"),
    )
}

pub fn analysis_prompt(patient_code: &str, analysis_type: &str, content: &str, history: &str) -> String {
    format!(
        r#"Analyze the following medical data for patient {patient_code}.

Analysis Type: {analysis_type}

{content}
{history}
Please provide:
1. Abnormal flags with specific values, normal ranges, and severity
2. Diagnostic insights with confidence levels
3. Clinical recommendations
4. Overall summary

Return a single JSON object in a ```json fenced block with this shape:
{{"abnormal_flags": [{{"parameter": "...", "value": "...", "normal_range": "...", "severity": "mild|moderate|severe", "flag_type": "high|low|abnormal"}}], "diagnostic_insights": [{{"category": "...", "insight": "...", "confidence": 0.0, "recommendations": ["..."]}}], "summary": "...", "confidence": 0.0, "recommendations": ["..."]}}"#
    )
}

pub fn patient_summary_prompt(patient: &PatientIdentifier, history: &str) -> String {
    format!(
        "Summarize the clinical picture for patient {} in at most five sentences for a treating clinician. \
         Mention active problems, current medications and pending follow-up when the records show them.\n\n{}",
        patient.patient_code,
        if history.is_empty() { "No documents are on file." } else { history },
    )
}
