use crate::commitment::Commitment;
use chrono::{DateTime, Duration, Utc};
use roulette_core::{EngineConfig, Result, RoundId, RouletteError, MAX_REVEAL_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Round lifecycle. Transitions only move forward; `Cancelled` is reachable
/// from every state before `Settled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundState {
    Idle,
    Open,
    Closed,
    Resolving,
    Settled,
    Cancelled,
}

impl RoundState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RoundState::Settled | RoundState::Cancelled)
    }
}

impl fmt::Display for RoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoundState::Idle => "idle",
            RoundState::Open => "open",
            RoundState::Closed => "closed",
            RoundState::Resolving => "resolving",
            RoundState::Settled => "settled",
            RoundState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum CancelReason {
    Operator(String),
    RevealTimeout,
    CommitMismatch,
    /// The pool refused the computed settlement.
    SettlementFailure(String),
}

impl CancelReason {
    /// Forced cancellations flag the round for audit review.
    pub fn needs_review(&self) -> bool {
        !matches!(self, CancelReason::Operator(_))
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Operator(text) => write!(f, "operator: {}", text),
            CancelReason::RevealTimeout => f.write_str("reveal timeout"),
            CancelReason::CommitMismatch => f.write_str("commit mismatch"),
            CancelReason::SettlementFailure(text) => write!(f, "settlement failure: {}", text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundParams {
    pub wheel_size: u8,
    pub close_deadline: DateTime<Utc>,
    pub max_exposure: u64,
    /// Falls back to `EngineConfig::reveal_timeout`.
    pub reveal_timeout: Option<std::time::Duration>,
}

impl RoundParams {
    pub fn new(wheel_size: u8, close_deadline: DateTime<Utc>, max_exposure: u64) -> Self {
        Self {
            wheel_size,
            close_deadline,
            max_exposure,
            reveal_timeout: None,
        }
    }

    pub fn with_reveal_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.reveal_timeout = Some(timeout);
        self
    }

    /// Resolve the reveal timeout against `config` and check every field.
    pub fn validate(
        &self,
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> Result<std::time::Duration> {
        if !config.supports_wheel(self.wheel_size) {
            return Err(RouletteError::config(format!(
                "Wheel size {} is not supported (supported: {:?})",
                self.wheel_size, config.supported_wheels
            )));
        }

        if self.close_deadline <= now {
            return Err(RouletteError::config("Close deadline must be in the future"));
        }

        if self.max_exposure == 0 {
            return Err(RouletteError::config("Max exposure must be greater than 0"));
        }

        let timeout = self.reveal_timeout.unwrap_or(config.reveal_timeout);
        if timeout.is_zero() {
            return Err(RouletteError::config("Reveal timeout must be greater than 0"));
        }

        if timeout > MAX_REVEAL_TIMEOUT {
            return Err(RouletteError::config(format!(
                "Reveal timeout must not exceed {}s",
                MAX_REVEAL_TIMEOUT.as_secs()
            )));
        }

        let window = Duration::from_std(timeout)
            .map_err(|e| RouletteError::config(format!("Reveal timeout out of range: {}", e)))?;
        if self.close_deadline.checked_add_signed(window).is_none() {
            return Err(RouletteError::config("Reveal deadline out of range"));
        }
        Ok(timeout)
    }
}

/// One betting round. Bets live in the round's `BetLedger`; this struct
/// carries the lifecycle and the randomness record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub id: RoundId,
    pub state: RoundState,
    pub wheel_size: u8,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub close_deadline: DateTime<Utc>,
    pub max_exposure: u64,
    pub reveal_timeout: std::time::Duration,
    pub commitment: Option<Commitment>,
    pub reveal_deadline: Option<DateTime<Utc>>,
    pub external_entropy: Option<[u8; 32]>,
    pub bet_set_digest: Option<[u8; 32]>,
    pub revealed_seed: Option<Vec<u8>>,
    pub outcome: Option<u8>,
    pub total_bet_amount: u64,
    pub total_payout: u64,
    pub cancel_reason: Option<CancelReason>,
    pub audit_review: bool,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Round {
    /// Validate `params` and return a round that has moved `Idle -> Open`.
    pub fn open(
        id: RoundId,
        params: &RoundParams,
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let reveal_timeout = params.validate(config, now)?;

        let mut round = Self {
            id,
            state: RoundState::Idle,
            wheel_size: params.wheel_size,
            opened_at: None,
            closed_at: None,
            close_deadline: params.close_deadline,
            max_exposure: params.max_exposure,
            reveal_timeout,
            commitment: None,
            reveal_deadline: None,
            external_entropy: None,
            bet_set_digest: None,
            revealed_seed: None,
            outcome: None,
            total_bet_amount: 0,
            total_payout: 0,
            cancel_reason: None,
            audit_review: false,
            finished_at: None,
        };

        round.expect_state(RoundState::Idle, "open")?;
        round.state = RoundState::Open;
        round.opened_at = Some(now);
        Ok(round)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn expect_state(&self, expected: RoundState, operation: &str) -> Result<()> {
        if self.state != expected {
            return Err(RouletteError::invalid_state(self.id, self.state, operation));
        }
        Ok(())
    }

    pub fn ensure_accepting_bets(&self, now: DateTime<Utc>) -> Result<()> {
        self.expect_state(RoundState::Open, "place bet")?;
        if now > self.close_deadline {
            return Err(RouletteError::invalid_state(
                self.id,
                "past its close deadline",
                "place bet",
            ));
        }
        Ok(())
    }

    pub fn is_close_overdue(&self, now: DateTime<Utc>) -> bool {
        self.state == RoundState::Open && now > self.close_deadline
    }

    pub fn is_reveal_overdue(&self, now: DateTime<Utc>) -> bool {
        self.state == RoundState::Resolving && self.reveal_deadline.map_or(false, |d| now > d)
    }

    pub fn close(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.expect_state(RoundState::Open, "close")?;
        self.state = RoundState::Closed;
        self.closed_at = Some(now);
        Ok(())
    }

    /// `Closed -> Resolving`. The commitment is fixed from here on.
    pub fn request_outcome(&mut self, commitment: Commitment, now: DateTime<Utc>) -> Result<()> {
        self.expect_state(RoundState::Closed, "commit seed")?;
        if self.commitment.is_some() {
            return Err(RouletteError::invalid_state(self.id, "already committed", "commit seed"));
        }

        let deadline = Duration::from_std(self.reveal_timeout)
            .ok()
            .and_then(|timeout| now.checked_add_signed(timeout))
            .ok_or_else(|| {
                RouletteError::config(format!(
                    "Reveal timeout of {:?} is out of range",
                    self.reveal_timeout
                ))
            })?;

        self.commitment = Some(commitment);
        self.reveal_deadline = Some(deadline);
        self.state = RoundState::Resolving;
        Ok(())
    }

    pub(crate) fn bind_entropy(&mut self, external: [u8; 32], bet_set_digest: [u8; 32]) {
        self.external_entropy = Some(external);
        self.bet_set_digest = Some(bet_set_digest);
    }

    /// Check a reveal against the deadline and the commitment. Nothing is
    /// mutated; the caller cancels the round on a timeout or mismatch.
    pub fn check_reveal(&self, seed: &[u8], now: DateTime<Utc>) -> Result<()> {
        self.expect_state(RoundState::Resolving, "reveal seed")?;

        if self.is_reveal_overdue(now) {
            return Err(RouletteError::RevealTimeout(self.id));
        }

        let commitment = self
            .commitment
            .as_ref()
            .ok_or_else(|| RouletteError::internal(format!("Round {} has no commitment", self.id)))?;

        if !commitment.verify_secret(seed) {
            return Err(RouletteError::CommitMismatch(self.id));
        }

        Ok(())
    }

    /// `Resolving -> Settled`.
    pub fn settle(
        &mut self,
        seed: Vec<u8>,
        outcome: u8,
        total_payout: u64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.expect_state(RoundState::Resolving, "settle")?;
        if outcome >= self.wheel_size {
            return Err(RouletteError::internal(format!(
                "Outcome {} outside wheel of {}",
                outcome, self.wheel_size
            )));
        }

        self.revealed_seed = Some(seed);
        self.outcome = Some(outcome);
        self.total_payout = total_payout;
        self.state = RoundState::Settled;
        self.finished_at = Some(now);
        Ok(())
    }

    pub fn ensure_cancellable(&self) -> Result<()> {
        if self.is_terminal() {
            return Err(RouletteError::invalid_state(self.id, self.state, "cancel"));
        }
        Ok(())
    }

    pub fn cancel(&mut self, reason: CancelReason, now: DateTime<Utc>) -> Result<()> {
        self.ensure_cancellable()?;
        self.audit_review = reason.needs_review();
        self.cancel_reason = Some(reason);
        self.state = RoundState::Cancelled;
        self.finished_at = Some(now);
        Ok(())
    }
}
