use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::Gender;

/// Anonymized patient handle. Never carries direct identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientIdentifier {
    pub id: Uuid,
    pub patient_code: String,
    pub external_id: Option<String>,
    pub facility_id: Uuid,
    pub age_range: Option<String>,
    pub gender: Option<Gender>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Validate an age range of the form `"NN-MM"`: both bounds in 0..=150, start < end.
pub fn validate_age_range(value: &str) -> Result<(), String> {
    let invalid = || {
        format!("Invalid age_range '{value}': expected format 'XX-YY' with 0 <= XX < YY <= 150")
    };

    let (start, end) = value.split_once('-').ok_or_else(invalid)?;
    let start: u32 = start.trim().parse().map_err(|_| invalid())?;
    let end: u32 = end.trim().parse().map_err(|_| invalid())?;

    if start > 150 || end > 150 || start >= end {
        return Err(invalid());
    }
    Ok(())
}
