use crate::error::Result;
use crate::storage::Storage;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};

/// Persists the engine snapshot as a single JSON row.
pub struct StateStore<'a> {
    storage: &'a Storage,
}

impl<'a> StateStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    pub async fn save<T: Serialize>(&self, snapshot: &T) -> Result<()> {
        let conn = self.storage.get_connection().await;
        let json = serde_json::to_string(snapshot)?;

        conn.execute(
            "INSERT OR REPLACE INTO engine_state (id, snapshot, updated_at)
             VALUES (1, ?1, ?2)",
            params![json, Utc::now().timestamp()],
        )?;

        Ok(())
    }

    pub async fn load<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        let conn = self.storage.get_connection().await;

        let json: Option<String> = conn
            .query_row(
                "SELECT snapshot FROM engine_state WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}
