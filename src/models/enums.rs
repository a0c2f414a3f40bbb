use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// Serde uses the same wire strings as the database columns.
macro_rules! str_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }

            #[allow(dead_code)]
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(DocumentType {
    ClinicalNote => "clinical_note",
    LabResult => "lab_result",
    DischargeSummary => "discharge_summary",
    RadiologyReport => "radiology_report",
    Prescription => "prescription",
    PathologyReport => "pathology_report",
    ProgressNote => "progress_note",
    Consultation => "consultation",
    Other => "other",
});

str_enum!(SensitivityLevel {
    Standard => "standard",
    Sensitive => "sensitive",
    Restricted => "restricted",
});

str_enum!(Gender {
    M => "M",
    F => "F",
    Male => "Male",
    Female => "Female",
    Other => "Other",
    NonBinary => "Non-binary",
    PreferNotToSay => "Prefer not to say",
});

str_enum!(
    /// Outcome of forwarding a document to the vector index.
    IndexStatus {
        Pending => "pending",
        Indexed => "indexed",
        Failed => "failed",
        Skipped => "skipped",
    }
);

str_enum!(SourceKind {
    Inline => "inline",
    File => "file",
});

str_enum!(ClinicalQueryType {
    General => "general",
    Diagnostic => "diagnostic",
    Treatment => "treatment",
    Medication => "medication",
    LabResults => "lab_results",
    Imaging => "imaging",
    History => "history",
});

impl Default for SensitivityLevel {
    fn default() -> Self {
        Self::Standard
    }
}

impl Default for ClinicalQueryType {
    fn default() -> Self {
        Self::General
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn document_type_round_trips_through_str() {
        for doc_type in DocumentType::ALL {
            assert_eq!(DocumentType::from_str(doc_type.as_str()).unwrap(), *doc_type);
        }
    }

    #[test]
    fn unknown_value_reports_field() {
        let err = IndexStatus::from_str("done").unwrap_err();
        match err {
            DatabaseError::InvalidEnum { field, value } => {
                assert_eq!(field, "IndexStatus");
                assert_eq!(value, "done");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn index_status_uses_column_values_on_the_wire() {
        for status in IndexStatus::ALL {
            let json = serde_json::to_string(status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn gender_serializes_to_display_label() {
        let json = serde_json::to_string(&Gender::PreferNotToSay).unwrap();
        assert_eq!(json, "\"Prefer not to say\"");
        let parsed: Gender = serde_json::from_str("\"Non-binary\"").unwrap();
        assert_eq!(parsed, Gender::NonBinary);
    }

    #[test]
    fn query_type_rejects_unknown_json() {
        let parsed: Result<ClinicalQueryType, _> = serde_json::from_str("\"astrology\"");
        assert!(parsed.is_err());
    }
}
