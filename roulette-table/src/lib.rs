//! Round-based roulette settlement.
//!
//! Bets are admitted against a per-round exposure ceiling and the shared
//! fund pool, outcomes come from an operator commit-reveal mixed with an
//! external beacon, and payouts are a pure function of outcome and bet set.

pub mod audit;
pub mod commitment;
pub mod engine;
pub mod entropy;
pub mod ledger;
pub mod odds;
pub mod payout;
pub mod replay;
pub mod round;

pub use audit::{AuditEntry, AuditEvent, AuditLog};
pub use commitment::{commitment_hash, generate_nonce, generate_secret, Commitment};
pub use engine::{EngineSnapshot, RoundRecord, RouletteEngine, TimeoutSweep};
pub use entropy::{EntropySource, FixedEntropy, OsEntropy};
pub use ledger::{Bet, BetIter, BetLedger, BetStatus};
pub use odds::{BetKind, BetType, Color, Half, Parity};
pub use payout::{compute_payouts, payout, worst_case};
pub use replay::{verify_round, RoundVerification, VerifiedStatus};
pub use round::{CancelReason, Round, RoundParams, RoundState};

pub use roulette_core::{Result, RouletteError};
