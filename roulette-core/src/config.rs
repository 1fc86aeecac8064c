use crate::error::{Result, RouletteError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// European single-zero wheel.
pub const SINGLE_ZERO_WHEEL: u8 = 37;
/// American double-zero wheel; pocket 37 stands for `00`.
pub const DOUBLE_ZERO_WHEEL: u8 = 38;
/// Longest reveal window a round may be given.
pub const MAX_REVEAL_TIMEOUT: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub supported_wheels: Vec<u8>,
    pub min_bet: u64,
    pub max_bet: u64,
    pub max_bets_per_round: usize,
    pub reveal_timeout: Duration,
    pub max_seed_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            supported_wheels: vec![SINGLE_ZERO_WHEEL, DOUBLE_ZERO_WHEEL],
            min_bet: 1,
            max_bet: 1_000_000,
            max_bets_per_round: 1_000,
            reveal_timeout: Duration::from_secs(300), // 5 minutes
            max_seed_len: 256,
        }
    }
}

impl EngineConfig {
    pub fn european() -> Self {
        Self {
            supported_wheels: vec![SINGLE_ZERO_WHEEL],
            ..Self::default()
        }
    }

    pub fn with_reveal_timeout(mut self, timeout: Duration) -> Self {
        self.reveal_timeout = timeout;
        self
    }

    pub fn supports_wheel(&self, wheel_size: u8) -> bool {
        self.supported_wheels.contains(&wheel_size)
    }

    pub fn validate(&self) -> Result<()> {
        if self.supported_wheels.is_empty() {
            return Err(RouletteError::config("At least one wheel size must be supported"));
        }

        if let Some(bad) = self
            .supported_wheels
            .iter()
            .find(|w| **w != SINGLE_ZERO_WHEEL && **w != DOUBLE_ZERO_WHEEL)
        {
            return Err(RouletteError::config(format!(
                "Unsupported wheel size {}",
                bad
            )));
        }

        if self.min_bet == 0 {
            return Err(RouletteError::config("Minimum bet must be greater than 0"));
        }

        if self.max_bet < self.min_bet {
            return Err(RouletteError::config(
                "Maximum bet must not be below the minimum bet",
            ));
        }

        if self.max_bets_per_round == 0 {
            return Err(RouletteError::config(
                "Max bets per round must be greater than 0",
            ));
        }

        if self.reveal_timeout.is_zero() {
            return Err(RouletteError::config("Reveal timeout must be greater than 0"));
        }

        if self.reveal_timeout > MAX_REVEAL_TIMEOUT {
            return Err(RouletteError::config(format!(
                "Reveal timeout must not exceed {}s",
                MAX_REVEAL_TIMEOUT.as_secs()
            )));
        }

        if self.max_seed_len == 0 {
            return Err(RouletteError::config("Max seed length must be greater than 0"));
        }

        Ok(())
    }
}
