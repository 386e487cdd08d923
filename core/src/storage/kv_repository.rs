use crate::models::{datetime_to_timestamp, timestamp_to_datetime};
use crate::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

pub struct KvRepository;

impl KvRepository {
    /// Get the value stored under a key
    pub fn get(conn: &Connection, key: &str) -> Result<Option<String>> {
        let value = conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        Ok(value)
    }

    /// Insert or replace the value under a key
    pub fn put(conn: &Connection, key: &str, value: &str) -> Result<()> {
        let now = Utc::now();
        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, datetime_to_timestamp(&now)],
        )?;

        Ok(())
    }

    /// Delete a key. Returns whether it existed.
    pub fn delete(conn: &Connection, key: &str) -> Result<bool> {
        let rows_affected = conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(rows_affected > 0)
    }

    /// Last write time of a key
    pub fn updated_at(conn: &Connection, key: &str) -> Result<Option<DateTime<Utc>>> {
        let timestamp: Option<i64> = conn
            .query_row(
                "SELECT updated_at FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        Ok(timestamp.map(timestamp_to_datetime))
    }

    /// All keys, sorted
    pub fn keys(conn: &Connection) -> Result<Vec<String>> {
        let mut stmt = conn.prepare("SELECT key FROM kv_store ORDER BY key")?;

        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;

        Ok(keys)
    }
}
