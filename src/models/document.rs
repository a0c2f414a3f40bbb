use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{DocumentType, IndexStatus, SensitivityLevel, SourceKind};

/// Where a document's bytes came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentSource {
    /// Text submitted directly in a JSON request.
    Inline { content: String },
    /// A stored upload. `text` holds the extracted plain text when the
    /// format could be read.
    File {
        filename: String,
        content_type: String,
        file_path: String,
        file_size: u64,
        text: Option<String>,
    },
}

impl DocumentSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            DocumentSource::Inline { .. } => SourceKind::Inline,
            DocumentSource::File { .. } => SourceKind::File,
        }
    }

    /// Text available for indexing and prompting.
    pub fn text(&self) -> Option<&str> {
        match self {
            DocumentSource::Inline { content } => Some(content.as_str()),
            DocumentSource::File { text, .. } => text.as_deref(),
        }
    }
}

/// Persisted outcome of the indexing side effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexState {
    pub status: IndexStatus,
    pub error: Option<String>,
    pub attempts: u32,
    pub next_retry_at: Option<NaiveDateTime>,
}

impl IndexState {
    pub fn pending() -> Self {
        Self {
            status: IndexStatus::Pending,
            error: None,
            attempts: 0,
            next_retry_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub source: DocumentSource,
    pub content_hash: Option<String>,
    pub document_type: DocumentType,
    pub document_category: Option<String>,
    pub sensitivity_level: SensitivityLevel,
    pub facility_id: Uuid,
    pub patient_identifier_id: Option<Uuid>,
    pub collection_id: Uuid,
    pub metadata: BTreeMap<String, String>,
    pub index: IndexState,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Document {
    /// A document counts as processed once it is searchable.
    pub fn processed(&self) -> bool {
        self.index.status == IndexStatus::Indexed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_source_exposes_text() {
        let source = DocumentSource::Inline { content: "BP 120/80".into() };
        assert_eq!(source.kind(), SourceKind::Inline);
        assert_eq!(source.text(), Some("BP 120/80"));
    }

    #[test]
    fn file_without_extracted_text_has_no_text() {
        let source = DocumentSource::File {
            filename: "scan.pdf".into(),
            content_type: "application/pdf".into(),
            file_path: "/tmp/x.pdf".into(),
            file_size: 10,
            text: None,
        };
        assert_eq!(source.kind(), SourceKind::File);
        assert!(source.text().is_none());
    }
}
