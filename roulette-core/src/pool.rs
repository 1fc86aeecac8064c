use crate::error::{Result, RouletteError};
use crate::types::{BetId, Participant, ParticipantId, Payout, PoolStatus, Refund, RoundId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single escrowed stake and the worst-case obligation it adds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stake {
    pub bet_id: BetId,
    pub participant: ParticipantId,
    pub amount: u64,
    pub exposure: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoundEscrow {
    pub stakes: Vec<Stake>,
    pub locked: u64,
    pub exposure: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementSummary {
    pub round_id: RoundId,
    pub staked: u64,
    pub paid: u64,
    pub house_edge: i128,
}

/// House custody shared by every round.
///
/// `reserve` is house liquidity. `committed` is the summed worst-case
/// obligation of every escrowed bet and may never exceed `reserve`.
/// Stakes sit in `locked` until their round settles or is refunded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FundPool {
    reserve: u64,
    locked: u64,
    committed: u64,
    house_edge: i128,
    participants: HashMap<ParticipantId, Participant>,
    escrows: HashMap<RoundId, RoundEscrow>,
}

impl FundPool {
    pub fn new(reserve: u64) -> Self {
        Self {
            reserve,
            ..Self::default()
        }
    }

    pub fn reserve(&self) -> u64 {
        self.reserve
    }

    pub fn locked(&self) -> u64 {
        self.locked
    }

    pub fn committed(&self) -> u64 {
        self.committed
    }

    pub fn available(&self) -> u64 {
        self.reserve.saturating_sub(self.committed)
    }

    pub fn house_edge(&self) -> i128 {
        self.house_edge
    }

    pub fn escrow(&self, round_id: RoundId) -> Option<&RoundEscrow> {
        self.escrows.get(&round_id)
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            reserve: self.reserve,
            locked: self.locked,
            committed: self.committed,
            available: self.available(),
            house_edge: self.house_edge,
            open_rounds: self.escrows.len(),
        }
    }

    // Operator liquidity

    pub fn deposit(&mut self, amount: u64) -> Result<u64> {
        if amount == 0 {
            return Err(RouletteError::validation("Deposit amount must be greater than 0"));
        }

        self.reserve = self
            .reserve
            .checked_add(amount)
            .ok_or_else(|| RouletteError::validation("Reserve overflow"))?;

        tracing::info!("Pool deposit of {} units, reserve now {}", amount, self.reserve);
        Ok(self.reserve)
    }

    pub fn withdraw(&mut self, amount: u64) -> Result<u64> {
        if amount == 0 {
            return Err(RouletteError::validation("Withdrawal amount must be greater than 0"));
        }

        if amount > self.available() {
            return Err(RouletteError::Insolvency {
                requested: amount,
                available: self.available(),
            });
        }

        self.reserve -= amount;
        tracing::info!("Pool withdrawal of {} units, reserve now {}", amount, self.reserve);
        Ok(self.reserve)
    }

    // Participants

    pub fn register_participant(&mut self, name: &str, initial_balance: u64) -> Result<ParticipantId> {
        if name.trim().is_empty() {
            return Err(RouletteError::validation("Participant name cannot be empty"));
        }

        if self.participants.values().any(|p| p.name == name) {
            return Err(RouletteError::validation(format!(
                "Participant '{}' already exists",
                name
            )));
        }

        let participant = Participant::new(name, initial_balance);
        let id = participant.id;
        self.participants.insert(id, participant);

        tracing::info!("Registered participant '{}' with ID: {}", name, id);
        Ok(id)
    }

    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.get(&id)
    }

    pub fn participant_by_name(&self, name: &str) -> Option<&Participant> {
        self.participants.values().find(|p| p.name == name)
    }

    pub fn participants(&self) -> Vec<Participant> {
        let mut all: Vec<Participant> = self.participants.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        all
    }

    pub fn credit_participant(&mut self, id: ParticipantId, amount: u64) -> Result<u64> {
        if amount == 0 {
            return Err(RouletteError::validation("Credit amount must be greater than 0"));
        }

        let participant = self
            .participants
            .get_mut(&id)
            .ok_or(RouletteError::ParticipantNotFound(id))?;

        participant.balance = participant
            .balance
            .checked_add(amount)
            .ok_or_else(|| RouletteError::validation("Balance overflow"))?;
        Ok(participant.balance)
    }

    pub fn debit_participant(&mut self, id: ParticipantId, amount: u64) -> Result<u64> {
        if amount == 0 {
            return Err(RouletteError::validation("Debit amount must be greater than 0"));
        }

        let participant = self
            .participants
            .get_mut(&id)
            .ok_or(RouletteError::ParticipantNotFound(id))?;

        if participant.balance < amount {
            return Err(RouletteError::InsufficientFunds {
                need: amount,
                available: participant.balance,
            });
        }

        participant.balance -= amount;
        Ok(participant.balance)
    }

    // Escrow

    /// Validate a lock without touching any balance.
    pub fn check_lock(&self, participant: ParticipantId, amount: u64, exposure: u64) -> Result<()> {
        let account = self
            .participants
            .get(&participant)
            .ok_or(RouletteError::ParticipantNotFound(participant))?;

        if account.balance < amount {
            return Err(RouletteError::InsufficientFunds {
                need: amount,
                available: account.balance,
            });
        }

        if exposure > self.available() {
            return Err(RouletteError::Insolvency {
                requested: exposure,
                available: self.available(),
            });
        }

        Ok(())
    }

    /// Move `amount` from the participant into escrow for `round_id` and
    /// commit `exposure` against the reserve.
    pub fn lock(
        &mut self,
        round_id: RoundId,
        bet_id: BetId,
        participant: ParticipantId,
        amount: u64,
        exposure: u64,
    ) -> Result<()> {
        self.check_lock(participant, amount, exposure)?;

        let locked = self
            .locked
            .checked_add(amount)
            .ok_or_else(|| RouletteError::validation("Locked balance overflow"))?;
        let committed = self.committed + exposure; // bounded by reserve after check_lock

        if let Some(account) = self.participants.get_mut(&participant) {
            account.balance -= amount;
            account.bets_placed += 1;
            account.amount_wagered = account.amount_wagered.saturating_add(amount);
        }
        self.locked = locked;
        self.committed = committed;

        let escrow = self.escrows.entry(round_id).or_default();
        escrow.stakes.push(Stake {
            bet_id,
            participant,
            amount,
            exposure,
        });
        escrow.locked += amount;
        escrow.exposure += exposure;

        tracing::debug!(
            "Locked {} units for bet {} in round {} (exposure {})",
            amount,
            bet_id,
            round_id,
            exposure
        );
        Ok(())
    }

    /// Pay out a round in one step. Every escrowed bet must appear exactly
    /// once in `payouts` and the total may not exceed the round's exposure;
    /// otherwise nothing is applied.
    pub fn settle(&mut self, round_id: RoundId, payouts: &[Payout]) -> Result<SettlementSummary> {
        let escrow = self.escrows.get(&round_id).cloned().unwrap_or_default();

        if payouts.len() != escrow.stakes.len() {
            return Err(RouletteError::internal(format!(
                "Round {} has {} escrowed bets but {} payouts",
                round_id,
                escrow.stakes.len(),
                payouts.len()
            )));
        }

        let mut paid: u64 = 0;
        for payout in payouts {
            let stake = escrow
                .stakes
                .iter()
                .find(|s| s.bet_id == payout.bet_id)
                .ok_or_else(|| {
                    RouletteError::internal(format!(
                        "Bet {} is not escrowed in round {}",
                        payout.bet_id, round_id
                    ))
                })?;

            if stake.participant != payout.participant {
                return Err(RouletteError::internal(format!(
                    "Bet {} belongs to a different participant",
                    payout.bet_id
                )));
            }

            if !self.participants.contains_key(&payout.participant) {
                return Err(RouletteError::ParticipantNotFound(payout.participant));
            }

            paid = paid
                .checked_add(payout.amount)
                .ok_or_else(|| RouletteError::internal("Payout total overflow"))?;
        }

        if paid > escrow.exposure {
            return Err(RouletteError::Insolvency {
                requested: paid,
                available: escrow.exposure,
            });
        }

        let new_reserve = self.reserve as i128 + escrow.locked as i128 - paid as i128;
        if new_reserve < 0 || new_reserve > u64::MAX as i128 {
            return Err(RouletteError::internal(format!(
                "Settlement of round {} would leave reserve at {}",
                round_id, new_reserve
            )));
        }

        // All checks passed; apply.
        for payout in payouts.iter().filter(|p| p.amount > 0) {
            if let Some(account) = self.participants.get_mut(&payout.participant) {
                account.balance = account.balance.saturating_add(payout.amount);
                account.amount_won = account.amount_won.saturating_add(payout.amount);
            }
        }

        let edge = escrow.locked as i128 - paid as i128;
        self.reserve = new_reserve as u64;
        self.locked -= escrow.locked;
        self.committed -= escrow.exposure;
        self.house_edge += edge;
        self.escrows.remove(&round_id);

        tracing::info!(
            "Settled round {}: staked {}, paid {}, house edge {}",
            round_id,
            escrow.locked,
            paid,
            edge
        );

        Ok(SettlementSummary {
            round_id,
            staked: escrow.locked,
            paid,
            house_edge: edge,
        })
    }

    /// Return every stake of `round_id` to its owner at the original amount.
    pub fn refund(&mut self, round_id: RoundId) -> Result<Vec<Refund>> {
        let Some(escrow) = self.escrows.remove(&round_id) else {
            return Ok(Vec::new());
        };

        let mut refunds = Vec::with_capacity(escrow.stakes.len());
        for stake in &escrow.stakes {
            if let Some(account) = self.participants.get_mut(&stake.participant) {
                account.balance = account.balance.saturating_add(stake.amount);
            }
            refunds.push(Refund {
                bet_id: stake.bet_id,
                participant: stake.participant,
                amount: stake.amount,
            });
        }

        self.locked -= escrow.locked;
        self.committed -= escrow.exposure;

        tracing::info!(
            "Refunded {} units across {} bets for round {}",
            escrow.locked,
            refunds.len(),
            round_id
        );
        Ok(refunds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_with_player(reserve: u64, balance: u64) -> (FundPool, ParticipantId) {
        let mut pool = FundPool::new(reserve);
        let id = pool.register_participant("alice", balance).unwrap();
        (pool, id)
    }

    #[test]
    fn test_lock_moves_balance_into_escrow() {
        let (mut pool, alice) = pool_with_player(1_000, 100);

        pool.lock(RoundId(1), BetId(1), alice, 10, 360).unwrap();

        assert_eq!(pool.participant(alice).unwrap().balance, 90);
        assert_eq!(pool.locked(), 10);
        assert_eq!(pool.committed(), 360);
        assert_eq!(pool.available(), 640);
    }

    #[test]
    fn test_lock_rejects_over_reserve_without_side_effects() {
        let (mut pool, alice) = pool_with_player(100, 100);

        let err = pool.lock(RoundId(1), BetId(1), alice, 10, 360).unwrap_err();
        assert!(matches!(err, RouletteError::Insolvency { requested: 360, available: 100 }));
        assert_eq!(pool.participant(alice).unwrap().balance, 100);
        assert_eq!(pool.locked(), 0);
        assert!(pool.escrow(RoundId(1)).is_none());
    }

    #[test]
    fn test_lock_rejects_insufficient_balance() {
        let (mut pool, alice) = pool_with_player(1_000, 5);

        let err = pool.lock(RoundId(1), BetId(1), alice, 10, 20).unwrap_err();
        assert!(matches!(err, RouletteError::InsufficientFunds { need: 10, available: 5 }));
    }

    #[test]
    fn test_settle_pays_winner_and_books_edge() {
        let (mut pool, alice) = pool_with_player(1_000, 100);
        let bob = pool.register_participant("bob", 100).unwrap();

        pool.lock(RoundId(1), BetId(1), alice, 10, 360).unwrap();
        pool.lock(RoundId(1), BetId(2), bob, 20, 40).unwrap();

        let payouts = vec![
            Payout { bet_id: BetId(1), participant: alice, amount: 0 },
            Payout { bet_id: BetId(2), participant: bob, amount: 40 },
        ];
        let summary = pool.settle(RoundId(1), &payouts).unwrap();

        assert_eq!(summary.staked, 30);
        assert_eq!(summary.paid, 40);
        assert_eq!(summary.house_edge, -10);
        assert_eq!(pool.reserve(), 990);
        assert_eq!(pool.locked(), 0);
        assert_eq!(pool.committed(), 0);
        assert_eq!(pool.participant(bob).unwrap().balance, 120);
        assert_eq!(pool.participant(bob).unwrap().amount_won, 40);
        assert_eq!(pool.participant(alice).unwrap().balance, 90);
    }

    #[test]
    fn test_settle_is_all_or_nothing() {
        let (mut pool, alice) = pool_with_player(1_000, 100);
        pool.lock(RoundId(1), BetId(1), alice, 10, 20).unwrap();

        // pays more than the escrowed exposure
        let payouts = vec![Payout { bet_id: BetId(1), participant: alice, amount: 21 }];
        assert!(pool.settle(RoundId(1), &payouts).is_err());

        assert_eq!(pool.locked(), 10);
        assert_eq!(pool.committed(), 20);
        assert_eq!(pool.reserve(), 1_000);
        assert_eq!(pool.participant(alice).unwrap().balance, 90);
    }

    #[test]
    fn test_refund_restores_exact_amounts() {
        let (mut pool, alice) = pool_with_player(10_000, 1_000);
        pool.lock(RoundId(7), BetId(1), alice, 333, 666).unwrap();
        pool.lock(RoundId(7), BetId(2), alice, 17, 612).unwrap();

        let refunds = pool.refund(RoundId(7)).unwrap();

        assert_eq!(refunds.iter().map(|r| r.amount).sum::<u64>(), 350);
        assert_eq!(pool.participant(alice).unwrap().balance, 1_000);
        assert_eq!(pool.locked(), 0);
        assert_eq!(pool.committed(), 0);
        assert_eq!(pool.house_edge(), 0);
    }

    #[test]
    fn test_withdraw_keeps_obligations_covered() {
        let (mut pool, alice) = pool_with_player(1_000, 100);
        pool.lock(RoundId(1), BetId(1), alice, 10, 360).unwrap();

        assert!(matches!(
            pool.withdraw(641),
            Err(RouletteError::Insolvency { requested: 641, available: 640 })
        ));
        assert_eq!(pool.withdraw(640).unwrap(), 360);
        assert_eq!(pool.deposit(40).unwrap(), 400);
    }

    #[test]
    fn test_duplicate_participant_names_rejected() {
        let (mut pool, _) = pool_with_player(0, 0);
        assert!(pool.register_participant("alice", 10).is_err());
        assert!(pool.register_participant("  ", 10).is_err());
    }
}
