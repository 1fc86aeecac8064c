use crate::odds::BetType;
use chrono::{DateTime, Utc};
use roulette_core::{BetId, ParticipantId, Result, RoundId, RouletteError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BetStatus {
    Pending,
    Settled { payout: u64 },
    Refunded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    pub id: BetId,
    pub round_id: RoundId,
    pub participant: ParticipantId,
    pub bet_type: BetType,
    pub amount: u64,
    pub placed_at: DateTime<Utc>,
    pub status: BetStatus,
}

impl Bet {
    pub fn is_settled(&self) -> bool {
        !matches!(self.status, BetStatus::Pending)
    }

    pub fn payout(&self) -> Option<u64> {
        match self.status {
            BetStatus::Settled { payout } => Some(payout),
            _ => None,
        }
    }

    /// Gross amount owed if this bet wins.
    pub fn worst_case(&self) -> Option<u64> {
        crate::payout::worst_case(&self.bet_type, self.amount)
    }
}

/// Per-round record of accepted bets and their cumulative worst-case
/// obligation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetLedger {
    round_id: RoundId,
    bets: Vec<Bet>,
    exposure: u64,
    total_staked: u64,
}

impl BetLedger {
    pub fn new(round_id: RoundId) -> Self {
        Self {
            round_id,
            bets: Vec::new(),
            exposure: 0,
            total_staked: 0,
        }
    }

    pub fn round_id(&self) -> RoundId {
        self.round_id
    }

    pub fn len(&self) -> usize {
        self.bets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bets.is_empty()
    }

    pub fn exposure(&self) -> u64 {
        self.exposure
    }

    pub fn total_staked(&self) -> u64 {
        self.total_staked
    }

    pub fn bets(&self) -> &[Bet] {
        &self.bets
    }

    pub fn get(&self, bet_id: BetId) -> Option<&Bet> {
        self.bets.iter().find(|b| b.id == bet_id)
    }

    /// Check that one more bet with `worst_case` obligation fits under the
    /// round ceiling. Returns the exposure the round would carry afterwards.
    pub fn check_admission(
        &self,
        worst_case: u64,
        max_exposure: u64,
        max_bets: usize,
    ) -> Result<u64> {
        if self.bets.len() >= max_bets {
            return Err(RouletteError::validation(format!(
                "Round {} already holds the maximum of {} bets",
                self.round_id, max_bets
            )));
        }

        let projected = self.exposure.checked_add(worst_case).ok_or(RouletteError::Insolvency {
            requested: u64::MAX,
            available: max_exposure,
        })?;

        if projected > max_exposure {
            return Err(RouletteError::Insolvency {
                requested: worst_case,
                available: max_exposure - self.exposure,
            });
        }

        Ok(projected)
    }

    pub(crate) fn record(&mut self, bet: Bet, worst_case: u64) {
        self.exposure += worst_case;
        self.total_staked += bet.amount;
        self.bets.push(bet);
    }

    pub(crate) fn mark_settled(&mut self, payouts: &[(BetId, u64)]) {
        for (bet_id, payout) in payouts {
            if let Some(bet) = self.bets.iter_mut().find(|b| b.id == *bet_id) {
                bet.status = BetStatus::Settled { payout: *payout };
            }
        }
    }

    pub(crate) fn mark_refunded(&mut self) {
        for bet in &mut self.bets {
            bet.status = BetStatus::Refunded;
        }
    }

    /// Restartable cursor over a snapshot of the ledger.
    pub fn iter_snapshot(&self) -> BetIter {
        BetIter::new(self.bets.clone().into())
    }
}

/// Lazy, finite sequence of bets. Cloning a fresh iterator restarts it.
#[derive(Debug, Clone)]
pub struct BetIter {
    bets: Arc<[Bet]>,
    pos: usize,
}

impl BetIter {
    fn new(bets: Arc<[Bet]>) -> Self {
        Self { bets, pos: 0 }
    }

    /// Rewind to the first bet.
    pub fn restart(&mut self) {
        self.pos = 0;
    }
}

impl Iterator for BetIter {
    type Item = Bet;

    fn next(&mut self) -> Option<Bet> {
        let bet = self.bets.get(self.pos).cloned();
        if bet.is_some() {
            self.pos += 1;
        }
        bet
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.bets.len() - self.pos;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for BetIter {}
