use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::*;

const PATIENT_COLUMNS: &str =
    "id, patient_code, external_id, facility_id, age_range, gender, created_at, updated_at";

struct PatientRow {
    id: String,
    patient_code: String,
    external_id: Option<String>,
    facility_id: String,
    age_range: Option<String>,
    gender: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_patient_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PatientRow> {
    Ok(PatientRow {
        id: row.get(0)?,
        patient_code: row.get(1)?,
        external_id: row.get(2)?,
        facility_id: row.get(3)?,
        age_range: row.get(4)?,
        gender: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn patient_from_row(row: PatientRow) -> Result<PatientIdentifier, DatabaseError> {
    Ok(PatientIdentifier {
        id: parse_uuid(&row.id)?,
        patient_code: row.patient_code,
        external_id: row.external_id,
        facility_id: parse_uuid(&row.facility_id)?,
        age_range: row.age_range,
        gender: row.gender.as_deref().map(Gender::from_str).transpose()?,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
    })
}

pub fn insert_patient(conn: &Connection, patient: &PatientIdentifier) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patient_identifiers
         (id, patient_code, external_id, facility_id, age_range, gender, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            patient.id.to_string(),
            patient.patient_code,
            patient.external_id,
            patient.facility_id.to_string(),
            patient.age_range,
            patient.gender.map(|g| g.as_str()),
            format_timestamp(&patient.created_at),
            format_timestamp(&patient.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<PatientIdentifier>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {PATIENT_COLUMNS} FROM patient_identifiers WHERE id = ?1"),
            params![id.to_string()],
            read_patient_row,
        )
        .optional()?;
    row.map(patient_from_row).transpose()
}

pub fn get_patient_by_code(
    conn: &Connection,
    patient_code: &str,
) -> Result<Option<PatientIdentifier>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {PATIENT_COLUMNS} FROM patient_identifiers WHERE patient_code = ?1"),
            params![patient_code],
            read_patient_row,
        )
        .optional()?;
    row.map(patient_from_row).transpose()
}

pub fn list_patients(
    conn: &Connection,
    filter: &PatientFilter,
) -> Result<Vec<PatientIdentifier>, DatabaseError> {
    let facility = filter.facility_id.map(|id| id.to_string());
    let mut stmt = conn.prepare(&format!(
        "SELECT {PATIENT_COLUMNS} FROM patient_identifiers
         WHERE (?1 IS NULL OR facility_id = ?1)
         ORDER BY created_at, patient_code"
    ))?;
    let rows = stmt.query_map(params![facility], read_patient_row)?;

    let mut patients = Vec::new();
    for row in rows {
        patients.push(patient_from_row(row?)?);
    }
    Ok(patients)
}

pub fn count_facility_patients(conn: &Connection, facility_id: &Uuid) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM patient_identifiers WHERE facility_id = ?1",
        params![facility_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn delete_patient(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "DELETE FROM patient_identifiers WHERE id = ?1",
        params![id.to_string()],
    )?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "PatientIdentifier".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::insert_facility;
    use crate::db::sqlite::open_memory_database;

    fn seed_facility(conn: &Connection) -> Uuid {
        let ts = now();
        let facility = Facility {
            id: Uuid::new_v4(),
            name: "Clinic".into(),
            address: None,
            external_id: None,
            created_at: ts,
            updated_at: ts,
        };
        insert_facility(conn, &facility).unwrap();
        facility.id
    }

    fn make_patient(code: &str, facility_id: Uuid) -> PatientIdentifier {
        let ts = now();
        PatientIdentifier {
            id: Uuid::new_v4(),
            patient_code: code.into(),
            external_id: None,
            facility_id,
            age_range: Some("25-30".into()),
            gender: Some(Gender::Female),
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn insert_and_lookup_by_code() {
        let conn = open_memory_database().unwrap();
        let facility_id = seed_facility(&conn);
        let patient = make_patient("PAT1", facility_id);
        insert_patient(&conn, &patient).unwrap();

        let loaded = get_patient_by_code(&conn, "PAT1").unwrap().unwrap();
        assert_eq!(loaded.id, patient.id);
        assert_eq!(loaded.gender, Some(Gender::Female));
        assert_eq!(loaded.age_range.as_deref(), Some("25-30"));
        assert!(get_patient(&conn, &patient.id).unwrap().is_some());
    }

    #[test]
    fn duplicate_code_rejected() {
        let conn = open_memory_database().unwrap();
        let facility_id = seed_facility(&conn);
        insert_patient(&conn, &make_patient("PAT1", facility_id)).unwrap();
        let err = insert_patient(&conn, &make_patient("PAT1", facility_id)).unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn unknown_facility_rejected_by_foreign_key() {
        let conn = open_memory_database().unwrap();
        let err = insert_patient(&conn, &make_patient("PAT1", Uuid::new_v4())).unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn list_filters_by_facility() {
        let conn = open_memory_database().unwrap();
        let a = seed_facility(&conn);
        let b = seed_facility(&conn);
        insert_patient(&conn, &make_patient("A1", a)).unwrap();
        insert_patient(&conn, &make_patient("A2", a)).unwrap();
        insert_patient(&conn, &make_patient("B1", b)).unwrap();

        let all = list_patients(&conn, &PatientFilter::default()).unwrap();
        assert_eq!(all.len(), 3);
        let only_a = list_patients(&conn, &PatientFilter { facility_id: Some(a) }).unwrap();
        assert_eq!(only_a.len(), 2);
        assert!(only_a.iter().all(|p| p.facility_id == a));
        assert_eq!(count_facility_patients(&conn, &b).unwrap(), 1);
    }
}
