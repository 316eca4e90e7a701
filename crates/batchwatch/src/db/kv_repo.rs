//! Key-value repository: JSON values stored in the `kv_store` table.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{Database, DatabaseError};

const UPSERT: &str = "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at";

/// Stores a raw string value under `key`, replacing any previous value.
pub fn put_raw(db: &Database, key: &str, value: &str) -> Result<(), DatabaseError> {
    let now = Utc::now().to_rfc3339();
    db.with_conn(|conn| {
        conn.execute(UPSERT, params![key, value, now])?;
        Ok(())
    })
}

/// Stores several raw values in one transaction. Either every entry is
/// written or none is.
pub fn put_many_raw(db: &Database, entries: &[(&str, String)]) -> Result<(), DatabaseError> {
    let now = Utc::now().to_rfc3339();
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(UPSERT)?;
            for (key, value) in entries {
                stmt.execute(params![key, value, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    })
}

/// Reads the raw string value stored under `key`.
pub fn get_raw(db: &Database, key: &str) -> Result<Option<String>, DatabaseError> {
    db.with_conn(|conn| {
        let value = conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |r| r.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    })
}

/// Serializes `value` as the JSON text stored under `key`.
pub fn encode<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialize {
        key: key.to_string(),
        source: e,
    })
}

/// Serializes `value` as JSON and stores it under `key`.
pub fn put<T: Serialize + ?Sized>(db: &Database, key: &str, value: &T) -> Result<(), DatabaseError> {
    put_raw(db, key, &encode(key, value)?)
}

/// Reads and deserializes the JSON value stored under `key`.
pub fn get<T: DeserializeOwned>(db: &Database, key: &str) -> Result<Option<T>, DatabaseError> {
    match get_raw(db, key)? {
        Some(json) => serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| DatabaseError::Serialize {
                key: key.to_string(),
                source: e,
            }),
        None => Ok(None),
    }
}

/// Deletes the given keys. Missing keys are ignored.
pub fn delete_many(db: &Database, keys: &[&str]) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("DELETE FROM kv_store WHERE key = ?1")?;
        for key in keys {
            stmt.execute(params![key])?;
        }
        Ok(())
    })
}
