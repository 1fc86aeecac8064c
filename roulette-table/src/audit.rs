//! Append-only record of every state transition.
//!
//! Entries are numbered contiguously. The in-memory log buffers entries
//! until `persist` moves them into the SQLite `audit_log` table, where the
//! replay verifier reads them offline.

use crate::odds::BetType;
use crate::round::CancelReason;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use roulette_core::{
    AuditRecord, AuditStore, BetId, ParticipantId, Payout, Refund, Result, RoundId,
    RouletteError, Storage,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEvent {
    RoundOpened {
        wheel_size: u8,
        close_deadline: DateTime<Utc>,
        max_exposure: u64,
    },
    BetPlaced {
        bet_id: BetId,
        participant: ParticipantId,
        bet_type: BetType,
        amount: u64,
        worst_case: u64,
    },
    RoundClosed {
        bet_count: usize,
        total_bet_amount: u64,
    },
    SeedCommitted {
        commit_hash: String,
        nonce: String,
        beacon: String,
        bet_set_digest: String,
        external_entropy: String,
        reveal_deadline: DateTime<Utc>,
    },
    SeedRevealed {
        seed: String,
        outcome: u8,
    },
    /// A reveal that did not open the commitment. Logged before the
    /// resulting cancellation.
    RevealRejected {
        seed: String,
    },
    RoundSettled {
        payouts: Vec<Payout>,
        total_payout: u64,
        house_edge: i64,
    },
    RoundCancelled {
        reason: CancelReason,
        refunds: Vec<Refund>,
    },
    PoolDeposit {
        amount: u64,
        reserve: u64,
    },
    PoolWithdraw {
        amount: u64,
        reserve: u64,
    },
}

impl AuditEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::RoundOpened { .. } => "round_opened",
            AuditEvent::BetPlaced { .. } => "bet_placed",
            AuditEvent::RoundClosed { .. } => "round_closed",
            AuditEvent::SeedCommitted { .. } => "seed_committed",
            AuditEvent::SeedRevealed { .. } => "seed_revealed",
            AuditEvent::RevealRejected { .. } => "reveal_rejected",
            AuditEvent::RoundSettled { .. } => "round_settled",
            AuditEvent::RoundCancelled { .. } => "round_cancelled",
            AuditEvent::PoolDeposit { .. } => "pool_deposit",
            AuditEvent::PoolWithdraw { .. } => "pool_withdraw",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: u64,
    pub round_id: Option<RoundId>,
    pub recorded_at: DateTime<Utc>,
    pub event: AuditEvent,
}

impl AuditEntry {
    pub fn to_record(&self) -> Result<AuditRecord> {
        Ok(AuditRecord {
            seq: self.seq,
            round_id: self.round_id.map(|r| r.0),
            kind: self.event.kind().to_string(),
            payload: serde_json::to_string(&self.event)?,
            recorded_at: self.recorded_at,
        })
    }
}

impl TryFrom<AuditRecord> for AuditEntry {
    type Error = RouletteError;

    fn try_from(record: AuditRecord) -> Result<Self> {
        let event: AuditEvent = serde_json::from_str(&record.payload)?;
        if event.kind() != record.kind {
            return Err(RouletteError::audit(format!(
                "Entry {} is stored as {} but decodes as {}",
                record.seq,
                record.kind,
                event.kind()
            )));
        }

        Ok(Self {
            seq: record.seq,
            round_id: record.round_id.map(RoundId),
            recorded_at: record.recorded_at,
            event,
        })
    }
}

#[derive(Debug, Default)]
struct LogInner {
    /// Entries not yet in storage.
    entries: Vec<AuditEntry>,
    next_seq: u64,
}

#[derive(Debug, Default)]
pub struct AuditLog {
    inner: Mutex<LogInner>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty log whose first entry continues an existing sequence.
    pub fn starting_at(next_seq: u64) -> Self {
        Self {
            inner: Mutex::new(LogInner {
                next_seq,
                ..LogInner::default()
            }),
        }
    }

    pub fn record(&self, round_id: Option<RoundId>, event: AuditEvent) -> u64 {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.push(AuditEntry {
            seq,
            round_id,
            recorded_at: Utc::now(),
            event,
        });
        seq
    }

    pub fn next_seq(&self) -> u64 {
        self.inner.lock().next_seq
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.inner.lock().entries.clone()
    }

    pub fn entries_for_round(&self, round_id: RoundId) -> Vec<AuditEntry> {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|e| e.round_id == Some(round_id))
            .cloned()
            .collect()
    }

    /// Write buffered entries to storage and drop them from memory. Returns
    /// how many were written.
    pub async fn persist(&self, storage: &Storage) -> Result<usize> {
        let records = {
            let inner = self.inner.lock();
            inner
                .entries
                .iter()
                .map(AuditEntry::to_record)
                .collect::<Result<Vec<_>>>()?
        };
        let Some(last) = records.last().map(|r| r.seq) else {
            return Ok(0);
        };

        let written = AuditStore::new(storage).append(&records).await?;

        // entries recorded during the write stay buffered
        self.inner.lock().entries.retain(|e| e.seq > last);
        Ok(written)
    }
}

/// Load and decode the stored log, optionally limited to one round.
pub async fn load_entries(storage: &Storage, round_id: Option<RoundId>) -> Result<Vec<AuditEntry>> {
    let store = AuditStore::new(storage);
    let records = match round_id {
        Some(id) => store.load_round(id.0).await?,
        None => store.load_all().await?,
    };

    records.into_iter().map(AuditEntry::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_contiguous() {
        let log = AuditLog::starting_at(5);
        let a = log.record(None, AuditEvent::PoolDeposit { amount: 10, reserve: 10 });
        let b = log.record(
            Some(RoundId(1)),
            AuditEvent::RoundClosed {
                bet_count: 0,
                total_bet_amount: 0,
            },
        );

        assert_eq!((a, b), (5, 6));
        assert_eq!(log.next_seq(), 7);
        assert_eq!(log.entries_for_round(RoundId(1)).len(), 1);
    }

    #[test]
    fn test_record_conversion() {
        let log = AuditLog::new();
        log.record(
            Some(RoundId(2)),
            AuditEvent::BetPlaced {
                bet_id: BetId(4),
                participant: ParticipantId::new(),
                bet_type: BetType::Split { first: 0, second: 2 },
                amount: 5,
                worst_case: 90,
            },
        );

        let entry = log.entries().remove(0);
        let record = entry.to_record().unwrap();
        assert_eq!(record.kind, "bet_placed");
        assert_eq!(record.round_id, Some(2));
        assert_eq!(AuditEntry::try_from(record.clone()).unwrap(), entry);

        let mislabelled = AuditRecord {
            kind: "round_closed".to_string(),
            ..record
        };
        assert!(matches!(
            AuditEntry::try_from(mislabelled),
            Err(RouletteError::AuditMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_persist_only_new_entries() {
        let storage = Storage::in_memory().await.unwrap();
        let log = AuditLog::new();

        log.record(None, AuditEvent::PoolDeposit { amount: 10, reserve: 10 });
        let mut expected: Vec<(u64, AuditEvent)> =
            log.entries().into_iter().map(|e| (e.seq, e.event)).collect();
        assert_eq!(log.persist(&storage).await.unwrap(), 1);
        assert!(log.is_empty());
        assert_eq!(log.persist(&storage).await.unwrap(), 0);

        log.record(None, AuditEvent::PoolWithdraw { amount: 4, reserve: 6 });
        expected.extend(log.entries().into_iter().map(|e| (e.seq, e.event)));
        assert_eq!(log.persist(&storage).await.unwrap(), 1);
        assert_eq!(log.len(), 0);
        assert_eq!(log.next_seq(), 2);

        // timestamps are stored at millisecond precision
        let loaded = load_entries(&storage, None).await.unwrap();
        let events: Vec<(u64, AuditEvent)> = loaded.into_iter().map(|e| (e.seq, e.event)).collect();
        assert_eq!(events, expected);
    }
}
