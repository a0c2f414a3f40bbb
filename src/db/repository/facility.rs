use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::*;

const FACILITY_COLUMNS: &str = "id, name, address, external_id, created_at, updated_at";

struct FacilityRow {
    id: String,
    name: String,
    address: Option<String>,
    external_id: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_facility_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FacilityRow> {
    Ok(FacilityRow {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        external_id: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn facility_from_row(row: FacilityRow) -> Result<Facility, DatabaseError> {
    Ok(Facility {
        id: parse_uuid(&row.id)?,
        name: row.name,
        address: row.address,
        external_id: row.external_id,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
    })
}

pub fn insert_facility(conn: &Connection, facility: &Facility) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO facilities (id, name, address, external_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            facility.id.to_string(),
            facility.name,
            facility.address,
            facility.external_id,
            format_timestamp(&facility.created_at),
            format_timestamp(&facility.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_facility(conn: &Connection, id: &Uuid) -> Result<Option<Facility>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {FACILITY_COLUMNS} FROM facilities WHERE id = ?1"),
            params![id.to_string()],
            read_facility_row,
        )
        .optional()?;
    row.map(facility_from_row).transpose()
}

pub fn get_facility_by_external_id(
    conn: &Connection,
    external_id: &str,
) -> Result<Option<Facility>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {FACILITY_COLUMNS} FROM facilities WHERE external_id = ?1"),
            params![external_id],
            read_facility_row,
        )
        .optional()?;
    row.map(facility_from_row).transpose()
}

pub fn list_facilities(conn: &Connection) -> Result<Vec<Facility>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FACILITY_COLUMNS} FROM facilities ORDER BY created_at, name"
    ))?;
    let rows = stmt.query_map([], read_facility_row)?;

    let mut facilities = Vec::new();
    for row in rows {
        facilities.push(facility_from_row(row?)?);
    }
    Ok(facilities)
}

pub fn count_facilities(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row("SELECT COUNT(*) FROM facilities", [], |row| row.get(0))?;
    Ok(count)
}

/// Delete a facility row. Its VectorDB and collections cascade.
pub fn delete_facility(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let rows = conn.execute("DELETE FROM facilities WHERE id = ?1", params![id.to_string()])?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Facility".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn make_facility(name: &str, external_id: Option<&str>) -> Facility {
        let ts = now();
        Facility {
            id: Uuid::new_v4(),
            name: name.into(),
            address: Some("1 Main St".into()),
            external_id: external_id.map(String::from),
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn insert_and_get_facility() {
        let conn = open_memory_database().unwrap();
        let facility = make_facility("General Hospital", Some("EXT-1"));
        insert_facility(&conn, &facility).unwrap();

        let loaded = get_facility(&conn, &facility.id).unwrap().unwrap();
        assert_eq!(loaded.name, "General Hospital");
        assert_eq!(loaded.external_id.as_deref(), Some("EXT-1"));
        assert_eq!(loaded.created_at, facility.created_at);

        let by_ext = get_facility_by_external_id(&conn, "EXT-1").unwrap().unwrap();
        assert_eq!(by_ext.id, facility.id);
    }

    #[test]
    fn missing_facility_is_none() {
        let conn = open_memory_database().unwrap();
        assert!(get_facility(&conn, &Uuid::new_v4()).unwrap().is_none());
        assert!(get_facility_by_external_id(&conn, "nope").unwrap().is_none());
    }

    #[test]
    fn duplicate_external_id_is_constraint_violation() {
        let conn = open_memory_database().unwrap();
        insert_facility(&conn, &make_facility("A", Some("EXT"))).unwrap();
        let err = insert_facility(&conn, &make_facility("B", Some("EXT"))).unwrap_err();
        assert!(err.is_constraint_violation());
        assert_eq!(count_facilities(&conn).unwrap(), 1);
    }

    #[test]
    fn facilities_without_external_id_do_not_collide() {
        let conn = open_memory_database().unwrap();
        insert_facility(&conn, &make_facility("A", None)).unwrap();
        insert_facility(&conn, &make_facility("B", None)).unwrap();
        assert_eq!(list_facilities(&conn).unwrap().len(), 2);
    }

    #[test]
    fn delete_unknown_facility_is_not_found() {
        let conn = open_memory_database().unwrap();
        let err = delete_facility(&conn, &Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }
}
