use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Naming convention for the collection every facility owns.
pub const FACILITY_SHARED_COLLECTION: &str = "Facility_Shared_Collection";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Facility {
    pub id: Uuid,
    pub name: String,
    pub address: Option<String>,
    pub external_id: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Namespace in the vector index. Exactly one per facility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDb {
    pub id: Uuid,
    pub name: String,
    pub facility_id: Uuid,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub vector_db_id: Uuid,
    pub created_at: NaiveDateTime,
}

pub fn vector_db_name(facility_name: &str) -> String {
    format!("{facility_name}_VectorDB")
}

pub fn patient_collection_name(patient_code: &str) -> String {
    format!("Patient_{patient_code}_Collection")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naming_conventions() {
        assert_eq!(vector_db_name("General Hospital"), "General Hospital_VectorDB");
        assert_eq!(patient_collection_name("PAT1"), "Patient_PAT1_Collection");
        assert_ne!(patient_collection_name("PAT1"), patient_collection_name("PAT2"));
    }
}
