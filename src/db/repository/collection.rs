use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::*;

// ── VectorDB ────────────────────────────────────────────────

pub fn insert_vector_db(conn: &Connection, vector_db: &VectorDb) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO vector_dbs (id, name, facility_id, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            vector_db.id.to_string(),
            vector_db.name,
            vector_db.facility_id.to_string(),
            format_timestamp(&vector_db.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_vector_db_for_facility(
    conn: &Connection,
    facility_id: &Uuid,
) -> Result<Option<VectorDb>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, name, facility_id, created_at FROM vector_dbs WHERE facility_id = ?1",
            params![facility_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;

    match row {
        Some((id, name, facility_id, created_at)) => Ok(Some(VectorDb {
            id: parse_uuid(&id)?,
            name,
            facility_id: parse_uuid(&facility_id)?,
            created_at: parse_timestamp(&created_at),
        })),
        None => Ok(None),
    }
}

// ── Collections ─────────────────────────────────────────────

struct CollectionRow {
    id: String,
    name: String,
    description: Option<String>,
    vector_db_id: String,
    created_at: String,
}

fn read_collection_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CollectionRow> {
    Ok(CollectionRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        vector_db_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn collection_from_row(row: CollectionRow) -> Result<Collection, DatabaseError> {
    Ok(Collection {
        id: parse_uuid(&row.id)?,
        name: row.name,
        description: row.description,
        vector_db_id: parse_uuid(&row.vector_db_id)?,
        created_at: parse_timestamp(&row.created_at),
    })
}

pub fn insert_collection(conn: &Connection, collection: &Collection) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO collections (id, name, description, vector_db_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            collection.id.to_string(),
            collection.name,
            collection.description,
            collection.vector_db_id.to_string(),
            format_timestamp(&collection.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_collection(conn: &Connection, id: &Uuid) -> Result<Option<Collection>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, name, description, vector_db_id, created_at FROM collections WHERE id = ?1",
            params![id.to_string()],
            read_collection_row,
        )
        .optional()?;
    row.map(collection_from_row).transpose()
}

/// Resolve a collection by exact name inside the facility's VectorDB.
pub fn find_facility_collection(
    conn: &Connection,
    facility_id: &Uuid,
    name: &str,
) -> Result<Option<Collection>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT c.id, c.name, c.description, c.vector_db_id, c.created_at
             FROM collections c
             JOIN vector_dbs v ON v.id = c.vector_db_id
             WHERE v.facility_id = ?1 AND c.name = ?2",
            params![facility_id.to_string(), name],
            read_collection_row,
        )
        .optional()?;
    row.map(collection_from_row).transpose()
}

pub fn list_facility_collections(
    conn: &Connection,
    facility_id: &Uuid,
) -> Result<Vec<Collection>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.name, c.description, c.vector_db_id, c.created_at
         FROM collections c
         JOIN vector_dbs v ON v.id = c.vector_db_id
         WHERE v.facility_id = ?1
         ORDER BY c.created_at, c.name",
    )?;
    let rows = stmt.query_map(params![facility_id.to_string()], read_collection_row)?;

    let mut collections = Vec::new();
    for row in rows {
        collections.push(collection_from_row(row?)?);
    }
    Ok(collections)
}

pub fn delete_collection(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let rows = conn.execute("DELETE FROM collections WHERE id = ?1", params![id.to_string()])?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Collection".into(),
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

    fn seed(conn: &Connection) -> (Facility, VectorDb) {
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
        let vdb = VectorDb {
            id: Uuid::new_v4(),
            name: vector_db_name(&facility.name),
            facility_id: facility.id,
            created_at: ts,
        };
        insert_vector_db(conn, &vdb).unwrap();
        (facility, vdb)
    }

    fn collection(vdb: &VectorDb, name: &str) -> Collection {
        Collection {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            vector_db_id: vdb.id,
            created_at: now(),
        }
    }

    #[test]
    fn vector_db_is_unique_per_facility() {
        let conn = open_memory_database().unwrap();
        let (facility, vdb) = seed(&conn);
        let loaded = get_vector_db_for_facility(&conn, &facility.id).unwrap().unwrap();
        assert_eq!(loaded.id, vdb.id);

        let second = VectorDb { id: Uuid::new_v4(), ..vdb };
        assert!(insert_vector_db(&conn, &second).unwrap_err().is_constraint_violation());
    }

    #[test]
    fn collection_resolves_by_name_through_facility() {
        let conn = open_memory_database().unwrap();
        let (facility, vdb) = seed(&conn);
        let shared = collection(&vdb, FACILITY_SHARED_COLLECTION);
        insert_collection(&conn, &shared).unwrap();

        let found = find_facility_collection(&conn, &facility.id, FACILITY_SHARED_COLLECTION)
            .unwrap()
            .unwrap();
        assert_eq!(found.id, shared.id);

        // Same name in another facility is not visible
        let (other, _) = seed(&conn);
        assert!(find_facility_collection(&conn, &other.id, FACILITY_SHARED_COLLECTION)
            .unwrap()
            .is_none());
    }

    #[test]
    fn collection_name_unique_within_vector_db() {
        let conn = open_memory_database().unwrap();
        let (_, vdb) = seed(&conn);
        insert_collection(&conn, &collection(&vdb, "Patient_A_Collection")).unwrap();
        let err = insert_collection(&conn, &collection(&vdb, "Patient_A_Collection")).unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn collection_requires_existing_vector_db() {
        let conn = open_memory_database().unwrap();
        let orphan = Collection {
            id: Uuid::new_v4(),
            name: "x".into(),
            description: None,
            vector_db_id: Uuid::new_v4(),
            created_at: now(),
        };
        assert!(insert_collection(&conn, &orphan).unwrap_err().is_constraint_violation());
    }

    #[test]
    fn deleting_facility_cascades_to_namespace() {
        let conn = open_memory_database().unwrap();
        let (facility, vdb) = seed(&conn);
        insert_collection(&conn, &collection(&vdb, FACILITY_SHARED_COLLECTION)).unwrap();
        crate::db::repository::delete_facility(&conn, &facility.id).unwrap();
        assert!(get_vector_db_for_facility(&conn, &facility.id).unwrap().is_none());
        assert!(list_facility_collections(&conn, &facility.id).unwrap().is_empty());
    }
}
