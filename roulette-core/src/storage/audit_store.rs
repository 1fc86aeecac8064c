use crate::error::{Result, RouletteError};
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

/// One persisted audit entry. `payload` is the JSON encoding of the
/// full entry as produced by the table layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub seq: u64,
    pub round_id: Option<u64>,
    pub kind: String,
    pub payload: String,
    pub recorded_at: DateTime<Utc>,
}

pub struct AuditStore<'a> {
    storage: &'a Storage,
}

impl<'a> AuditStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Append records in one transaction. Sequence numbers must continue
    /// the stored log; existing rows are never replaced.
    pub async fn append(&self, records: &[AuditRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut conn = self.storage.get_connection().await;
        let last: Option<i64> =
            conn.query_row("SELECT MAX(seq) FROM audit_log", [], |row| row.get(0))?;
        let mut expected = last.map(|s| s as u64 + 1).unwrap_or(0);

        let tx = conn.transaction()?;
        for record in records {
            if record.seq != expected {
                return Err(RouletteError::internal(format!(
                    "Audit sequence gap: expected {}, got {}",
                    expected, record.seq
                )));
            }

            tx.execute(
                "INSERT INTO audit_log (seq, round_id, kind, payload, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.seq as i64,
                    record.round_id.map(|r| r as i64),
                    record.kind,
                    record.payload,
                    record.recorded_at.timestamp_millis(),
                ],
            )?;
            expected += 1;
        }
        tx.commit()?;

        tracing::debug!("Persisted {} audit records", records.len());
        Ok(records.len())
    }

    /// Sequence number the next appended record must carry.
    pub async fn next_seq(&self) -> Result<u64> {
        let conn = self.storage.get_connection().await;
        let last: Option<i64> = conn
            .query_row("SELECT MAX(seq) FROM audit_log", [], |row| row.get(0))
            .optional()?
            .flatten();
        Ok(last.map(|s| s as u64 + 1).unwrap_or(0))
    }

    pub async fn load_all(&self) -> Result<Vec<AuditRecord>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT seq, round_id, kind, payload, recorded_at
             FROM audit_log ORDER BY seq ASC",
        )?;

        let record_iter = stmt.query_map([], row_to_record)?;

        let mut records = Vec::new();
        for record in record_iter {
            records.push(record?);
        }

        Ok(records)
    }

    pub async fn load_round(&self, round_id: u64) -> Result<Vec<AuditRecord>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT seq, round_id, kind, payload, recorded_at
             FROM audit_log WHERE round_id = ?1 ORDER BY seq ASC",
        )?;

        let record_iter = stmt.query_map(params![round_id as i64], row_to_record)?;

        let mut records = Vec::new();
        for record in record_iter {
            records.push(record?);
        }

        Ok(records)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditRecord> {
    let seq: i64 = row.get(0)?;
    let round_id: Option<i64> = row.get(1)?;
    let recorded_ms: i64 = row.get(4)?;

    Ok(AuditRecord {
        seq: seq as u64,
        round_id: round_id.map(|r| r as u64),
        kind: row.get(2)?,
        payload: row.get(3)?,
        recorded_at: DateTime::from_timestamp_millis(recorded_ms).unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(seq: u64, round_id: Option<u64>) -> AuditRecord {
        AuditRecord {
            seq,
            round_id,
            kind: "test".to_string(),
            payload: format!("{{\"seq\":{}}}", seq),
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_append_and_load() {
        let storage = Storage::in_memory().await.unwrap();
        let store = AuditStore::new(&storage);

        assert_eq!(store.next_seq().await.unwrap(), 0);
        store
            .append(&[record(0, None), record(1, Some(4)), record(2, Some(5))])
            .await
            .unwrap();

        assert_eq!(store.next_seq().await.unwrap(), 3);
        assert_eq!(store.load_all().await.unwrap().len(), 3);

        let round = store.load_round(4).await.unwrap();
        assert_eq!(round.len(), 1);
        assert_eq!(round[0].seq, 1);
    }

    #[tokio::test]
    async fn test_rejects_sequence_gap() {
        let storage = Storage::in_memory().await.unwrap();
        let store = AuditStore::new(&storage);

        store.append(&[record(0, None)]).await.unwrap();
        assert!(store.append(&[record(2, None)]).await.is_err());
        // replaying an old sequence number is refused too
        assert!(store.append(&[record(0, None)]).await.is_err());
        assert_eq!(store.load_all().await.unwrap().len(), 1);
    }
}
