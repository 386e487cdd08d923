use crate::models::FavoriteRecord;
use crate::storage::KvRepository;
use crate::{Error, Result};
use rusqlite::Connection;

pub struct FavoriteRepository;

impl FavoriteRepository {
    /// Load the record array stored under `key`. A missing key is an empty list.
    pub fn load_records(conn: &Connection, key: &str) -> Result<Vec<FavoriteRecord>> {
        let Some(json) = KvRepository::get(conn, key)? else {
            return Ok(Vec::new());
        };

        if json.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&json).map_err(|e| Error::CorruptState {
            key: key.to_string(),
            details: e.to_string(),
        })
    }

    /// Load the legacy display order stored under `key`, if any.
    pub fn load_order(conn: &Connection, key: &str) -> Result<Option<Vec<String>>> {
        let Some(json) = KvRepository::get(conn, key)? else {
            return Ok(None);
        };

        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| Error::CorruptState {
                key: key.to_string(),
                details: e.to_string(),
            })
    }

    /// Write records and display order together.
    pub fn save(
        conn: &Connection,
        records_key: &str,
        order_key: &str,
        records: &[FavoriteRecord],
        order: &[String],
    ) -> Result<()> {
        let records_json = serde_json::to_string(records)?;
        let order_json = serde_json::to_string(order)?;

        let tx = conn.unchecked_transaction()?;
        KvRepository::put(&tx, records_key, &records_json)?;
        KvRepository::put(&tx, order_key, &order_json)?;
        tx.commit()?;

        Ok(())
    }

    /// Remove both keys
    pub fn clear(conn: &Connection, records_key: &str, order_key: &str) -> Result<()> {
        KvRepository::delete(conn, records_key)?;
        KvRepository::delete(conn, order_key)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CanonicalId, Category};
    use crate::storage::Database;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    const RECORDS: &str = "favorites.records";
    const ORDER: &str = "favorites.order";

    fn setup_test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::new(&db_path);
        let conn = db.create().unwrap();
        (dir, conn)
    }

    fn sample() -> Vec<FavoriteRecord> {
        let at = |secs| Utc.timestamp_opt(secs, 0).unwrap();
        vec![
            FavoriteRecord::new(&CanonicalId::step(Category::Card, "c", "l", 1), "hello", "xin chào", "", at(2)),
            FavoriteRecord::new(&CanonicalId::course("c"), "Course", "", "", at(1)),
        ]
    }

    #[test]
    fn test_missing_keys() {
        let (_dir, conn) = setup_test_db();

        assert!(FavoriteRepository::load_records(&conn, RECORDS).unwrap().is_empty());
        assert!(FavoriteRepository::load_order(&conn, ORDER).unwrap().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let (_dir, conn) = setup_test_db();
        let records = sample();
        let order = vec![records[1].canonical_id.clone(), records[0].canonical_id.clone()];

        FavoriteRepository::save(&conn, RECORDS, ORDER, &records, &order).unwrap();

        assert_eq!(FavoriteRepository::load_records(&conn, RECORDS).unwrap(), records);
        assert_eq!(FavoriteRepository::load_order(&conn, ORDER).unwrap(), Some(order));
    }

    #[test]
    fn test_corrupt_records() {
        let (_dir, conn) = setup_test_db();
        KvRepository::put(&conn, RECORDS, "[{not json").unwrap();

        let err = FavoriteRepository::load_records(&conn, RECORDS).unwrap_err();
        assert!(matches!(err, Error::CorruptState { .. }));
    }

    #[test]
    fn test_clear() {
        let (_dir, conn) = setup_test_db();
        FavoriteRepository::save(&conn, RECORDS, ORDER, &sample(), &[]).unwrap();

        FavoriteRepository::clear(&conn, RECORDS, ORDER).unwrap();
        assert!(KvRepository::keys(&conn).unwrap().is_empty());
    }
}
