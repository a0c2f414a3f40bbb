use uuid::Uuid;

use super::enums::{DocumentType, IndexStatus};

#[derive(Debug, Default, Clone)]
pub struct DocumentFilter {
    pub facility_id: Option<Uuid>,
    pub patient_identifier_id: Option<Uuid>,
    pub document_type: Option<DocumentType>,
    pub index_status: Option<IndexStatus>,
    /// `Some(true)` keeps indexed documents only, `Some(false)` everything else.
    pub processed: Option<bool>,
    /// Only documents created at or after this time.
    pub created_after: Option<chrono::NaiveDateTime>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Clone)]
pub struct PatientFilter {
    pub facility_id: Option<Uuid>,
}
