//! Roulette core - custody primitives for the round settlement engine
//!
//! This crate owns everything that outlives a single round: the house fund
//! pool and participant balances, engine configuration, the error taxonomy
//! and SQLite persistence for snapshots and the audit trail.

pub mod config;
pub mod error;
pub mod pool;
pub mod storage;
pub mod types;

pub use config::{EngineConfig, DOUBLE_ZERO_WHEEL, MAX_REVEAL_TIMEOUT, SINGLE_ZERO_WHEEL};
pub use error::{ErrorKind, Result, RouletteError};
pub use pool::{FundPool, RoundEscrow, SettlementSummary, Stake};
pub use storage::{AuditRecord, AuditStore, StateStore, Storage};
pub use types::{BetId, Participant, ParticipantId, Payout, PoolStatus, Refund, RoundId};
