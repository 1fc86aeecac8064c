use crate::audit::{AuditEvent, AuditLog};
use crate::commitment::Commitment;
use crate::entropy::{self, EntropySource, OsEntropy};
use crate::ledger::{Bet, BetIter, BetLedger, BetStatus};
use crate::odds::BetType;
use crate::payout::{compute_payouts, total_paid, worst_case};
use crate::round::{CancelReason, Round, RoundParams, RoundState};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use roulette_core::{
    BetId, EngineConfig, FundPool, Participant, ParticipantId, PoolStatus, Refund, Result,
    RoundId, RouletteError,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// A round together with its bets. Guarded by one async mutex so every
/// operation on the round is totally ordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round: Round,
    pub ledger: BetLedger,
}

type RoundCell = Arc<tokio::sync::Mutex<RoundRecord>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub next_round_id: u64,
    pub next_bet_id: u64,
    pub next_audit_seq: u64,
    pub pool: FundPool,
    pub rounds: Vec<RoundRecord>,
    pub taken_at: DateTime<Utc>,
}

/// Rounds touched by a timeout sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeoutSweep {
    pub closed: Vec<RoundId>,
    pub cancelled: Vec<RoundId>,
}

struct EngineInner {
    config: EngineConfig,
    entropy: Arc<dyn EntropySource>,
    rounds: RwLock<HashMap<RoundId, RoundCell>>,
    pool: Mutex<FundPool>,
    audit: AuditLog,
    next_round_id: AtomicU64,
    next_bet_id: AtomicU64,
}

/// Settlement engine. Cheap to clone; clones share state.
///
/// Lock order is round, then pool. The pool lock is only held for
/// synchronous steps and never across an await.
#[derive(Clone)]
pub struct RouletteEngine {
    inner: Arc<EngineInner>,
}

impl RouletteEngine {
    /// Engine with an empty pool, drawing beacons from the OS RNG.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_entropy(config, Arc::new(OsEntropy))
    }

    pub fn with_entropy(config: EngineConfig, entropy: Arc<dyn EntropySource>) -> Result<Self> {
        config.validate()?;

        Ok(Self::from_parts(
            config,
            entropy,
            FundPool::default(),
            HashMap::new(),
            AuditLog::new(),
            1,
            1,
        ))
    }

    fn from_parts(
        config: EngineConfig,
        entropy: Arc<dyn EntropySource>,
        pool: FundPool,
        rounds: HashMap<RoundId, RoundCell>,
        audit: AuditLog,
        next_round_id: u64,
        next_bet_id: u64,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config,
                entropy,
                rounds: RwLock::new(rounds),
                pool: Mutex::new(pool),
                audit,
                next_round_id: AtomicU64::new(next_round_id),
                next_bet_id: AtomicU64::new(next_bet_id),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.inner.audit
    }

    fn round_cell(&self, round_id: RoundId) -> Result<RoundCell> {
        self.inner
            .rounds
            .read()
            .get(&round_id)
            .cloned()
            .ok_or(RouletteError::RoundNotFound(round_id))
    }

    fn round_cells(&self) -> Vec<(RoundId, RoundCell)> {
        let mut cells: Vec<(RoundId, RoundCell)> = self
            .inner
            .rounds
            .read()
            .iter()
            .map(|(id, cell)| (*id, cell.clone()))
            .collect();
        cells.sort_by_key(|(id, _)| *id);
        cells
    }

    fn log_event(&self, round_id: Option<RoundId>, event: AuditEvent) {
        self.inner.audit.record(round_id, event);
    }

    // Round lifecycle

    pub async fn open_round(&self, params: RoundParams) -> Result<RoundId> {
        let now = Utc::now();
        params.validate(&self.inner.config, now)?;

        let round_id = RoundId(self.inner.next_round_id.fetch_add(1, Ordering::SeqCst));
        let round = Round::open(round_id, &params, &self.inner.config, now)?;

        let record = RoundRecord {
            round,
            ledger: BetLedger::new(round_id),
        };
        self.inner
            .rounds
            .write()
            .insert(round_id, Arc::new(tokio::sync::Mutex::new(record)));

        self.log_event(
            Some(round_id),
            AuditEvent::RoundOpened {
                wheel_size: params.wheel_size,
                close_deadline: params.close_deadline,
                max_exposure: params.max_exposure,
            },
        );

        tracing::info!(
            "Opened round {} (wheel {}, max exposure {}, closes {})",
            round_id,
            params.wheel_size,
            params.max_exposure,
            params.close_deadline
        );
        Ok(round_id)
    }

    /// Admit a bet and escrow its stake. Nothing changes if any check fails.
    pub async fn place_bet(
        &self,
        round_id: RoundId,
        participant: ParticipantId,
        bet_type: BetType,
        amount: u64,
    ) -> Result<BetId> {
        let config = &self.inner.config;
        let cell = self.round_cell(round_id)?;
        let mut record = cell.lock().await;
        let now = Utc::now();

        record.round.ensure_accepting_bets(now)?;

        if amount == 0 {
            return Err(RouletteError::validation("Bet amount must be greater than 0"));
        }
        if amount < config.min_bet || amount > config.max_bet {
            return Err(RouletteError::validation(format!(
                "Bet amount {} outside limits {}..={}",
                amount, config.min_bet, config.max_bet
            )));
        }
        bet_type.validate(record.round.wheel_size)?;

        let worst = worst_case(&bet_type, amount).ok_or(RouletteError::Insolvency {
            requested: u64::MAX,
            available: record.round.max_exposure,
        })?;
        let projected = record.ledger.check_admission(
            worst,
            record.round.max_exposure,
            config.max_bets_per_round,
        )?;

        let bet_id = {
            let mut pool = self.inner.pool.lock();
            pool.check_lock(participant, amount, worst)?;
            let bet_id = BetId(self.inner.next_bet_id.fetch_add(1, Ordering::SeqCst));
            pool.lock(round_id, bet_id, participant, amount, worst)?;
            bet_id
        };

        let bet = Bet {
            id: bet_id,
            round_id,
            participant,
            bet_type,
            amount,
            placed_at: now,
            status: BetStatus::Pending,
        };
        record.ledger.record(bet, worst);
        record.round.total_bet_amount += amount;

        self.log_event(
            Some(round_id),
            AuditEvent::BetPlaced {
                bet_id,
                participant,
                bet_type,
                amount,
                worst_case: worst,
            },
        );

        tracing::debug!(
            "Admitted bet {} on round {}: {} x {} (exposure {}/{})",
            bet_id,
            round_id,
            bet_type,
            amount,
            projected,
            record.round.max_exposure
        );
        Ok(bet_id)
    }

    pub async fn close_round(&self, round_id: RoundId) -> Result<()> {
        let cell = self.round_cell(round_id)?;
        let mut record = cell.lock().await;
        self.close_locked(&mut record)
    }

    fn close_locked(&self, record: &mut RoundRecord) -> Result<()> {
        record.round.close(Utc::now())?;

        self.log_event(
            Some(record.round.id),
            AuditEvent::RoundClosed {
                bet_count: record.ledger.len(),
                total_bet_amount: record.ledger.total_staked(),
            },
        );

        tracing::info!(
            "Closed round {} with {} bets ({} staked)",
            record.round.id,
            record.ledger.len(),
            record.ledger.total_staked()
        );
        Ok(())
    }

    /// Store the operator commitment and move the round to `Resolving`.
    ///
    /// The external beacon is drawn after the commitment is fixed and is
    /// bound to the frozen bet set.
    pub async fn commit_seed(&self, round_id: RoundId, commitment: Commitment) -> Result<()> {
        let cell = self.round_cell(round_id)?;
        let mut record = cell.lock().await;
        let now = Utc::now();

        if commitment.nonce.len() > self.inner.config.max_seed_len {
            return Err(RouletteError::validation(format!(
                "Nonce exceeds {} bytes",
                self.inner.config.max_seed_len
            )));
        }

        let commit_hash = commitment.hash_hex();
        let nonce = hex::encode(&commitment.nonce);
        record.round.request_outcome(commitment, now)?;

        let digest = entropy::bet_set_digest(record.ledger.bets());
        let beacon = self.inner.entropy.beacon(round_id);
        let external = entropy::external_entropy(&beacon, &digest);
        record.round.bind_entropy(external, digest);

        let deadline = record
            .round
            .reveal_deadline
            .ok_or_else(|| RouletteError::internal("Reveal deadline missing after commit"))?;

        self.log_event(
            Some(round_id),
            AuditEvent::SeedCommitted {
                commit_hash,
                nonce,
                beacon: hex::encode(beacon),
                bet_set_digest: hex::encode(digest),
                external_entropy: hex::encode(external),
                reveal_deadline: deadline,
            },
        );

        tracing::info!("Round {} committed; reveal due by {}", round_id, deadline);
        self.spawn_reveal_watchdog(round_id, deadline);
        Ok(())
    }

    /// Alias of [`commit_seed`](Self::commit_seed) named after the state
    /// transition it performs.
    pub async fn request_outcome(&self, round_id: RoundId, commitment: Commitment) -> Result<()> {
        self.commit_seed(round_id, commitment).await
    }

    /// Verify the seed, derive the outcome and settle the round in one step.
    ///
    /// A late reveal or a seed that does not open the commitment cancels the
    /// round with a full refund before the error is returned.
    pub async fn reveal_seed(&self, round_id: RoundId, seed: &[u8]) -> Result<u8> {
        let cell = self.round_cell(round_id)?;
        let mut record = cell.lock().await;
        let now = Utc::now();

        // a seed outside the accepted length cannot be a valid opening
        let max_seed_len = self.inner.config.max_seed_len;
        let checked = record.round.check_reveal(seed, now).and_then(|()| {
            if seed.is_empty() || seed.len() > max_seed_len {
                Err(RouletteError::CommitMismatch(round_id))
            } else {
                Ok(())
            }
        });

        match checked {
            Ok(()) => {}
            Err(RouletteError::RevealTimeout(id)) => {
                tracing::warn!("Reveal for round {} arrived after the deadline", id);
                self.cancel_locked(&mut record, CancelReason::RevealTimeout)?;
                return Err(RouletteError::RevealTimeout(id));
            }
            Err(RouletteError::CommitMismatch(id)) => {
                tracing::error!(
                    "Revealed seed ({} bytes) does not open the commitment for round {}",
                    seed.len(),
                    id
                );
                self.log_event(
                    Some(id),
                    AuditEvent::RevealRejected {
                        seed: hex::encode(seed),
                    },
                );
                self.cancel_locked(&mut record, CancelReason::CommitMismatch)?;
                return Err(RouletteError::CommitMismatch(id));
            }
            Err(e) => return Err(e),
        }

        let external = record.round.external_entropy.ok_or_else(|| {
            RouletteError::internal(format!("Round {} has no external entropy", round_id))
        })?;
        let outcome = entropy::outcome_for(seed, &external, round_id, record.round.wheel_size);

        let payouts = compute_payouts(outcome, record.ledger.bets());
        let total = total_paid(&payouts);

        let settled = self.inner.pool.lock().settle(round_id, &payouts);
        let summary = match settled {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!("Settlement of round {} refused: {}", round_id, e);
                self.cancel_locked(&mut record, CancelReason::SettlementFailure(e.to_string()))?;
                return Err(e);
            }
        };

        let paid: Vec<(BetId, u64)> = payouts.iter().map(|p| (p.bet_id, p.amount)).collect();
        record.ledger.mark_settled(&paid);
        record.round.settle(seed.to_vec(), outcome, total, now)?;

        self.log_event(
            Some(round_id),
            AuditEvent::SeedRevealed {
                seed: hex::encode(seed),
                outcome,
            },
        );
        self.log_event(
            Some(round_id),
            AuditEvent::RoundSettled {
                payouts,
                total_payout: total,
                house_edge: clamp_edge(summary.house_edge),
            },
        );

        tracing::info!(
            "Round {} settled on {}: staked {}, paid {}",
            round_id,
            outcome,
            summary.staked,
            summary.paid
        );
        Ok(outcome)
    }

    pub async fn cancel_round(&self, round_id: RoundId, reason: CancelReason) -> Result<Vec<Refund>> {
        let cell = self.round_cell(round_id)?;
        let mut record = cell.lock().await;
        self.cancel_locked(&mut record, reason)
    }

    fn cancel_locked(&self, record: &mut RoundRecord, reason: CancelReason) -> Result<Vec<Refund>> {
        let round_id = record.round.id;
        record.round.ensure_cancellable()?;

        let refunds = self.inner.pool.lock().refund(round_id)?;
        record.round.cancel(reason.clone(), Utc::now())?;
        record.ledger.mark_refunded();

        let refunded: u64 = refunds.iter().map(|r| r.amount).sum();
        tracing::warn!(
            "Cancelled round {} ({}); refunded {} across {} bets",
            round_id,
            reason,
            refunded,
            refunds.len()
        );

        self.log_event(
            Some(round_id),
            AuditEvent::RoundCancelled {
                reason,
                refunds: refunds.clone(),
            },
        );
        Ok(refunds)
    }

    // Timeouts

    fn spawn_reveal_watchdog(&self, round_id: RoundId, deadline: DateTime<Utc>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No runtime; round {} relies on the timeout sweep", round_id);
            return;
        };

        let engine: Weak<EngineInner> = Arc::downgrade(&self.inner);
        let wait = (deadline - Utc::now())
            .to_std()
            .unwrap_or_default()
            + std::time::Duration::from_millis(5);

        handle.spawn(async move {
            tokio::time::sleep(wait).await;

            let Some(inner) = engine.upgrade() else {
                return;
            };
            let engine = RouletteEngine { inner };
            if let Err(e) = engine.expire_round(round_id).await {
                tracing::warn!("Reveal watchdog for round {} failed: {}", round_id, e);
            }
        });
    }

    /// Cancel `round_id` if its reveal deadline has passed. Returns whether
    /// the round was cancelled.
    pub async fn expire_round(&self, round_id: RoundId) -> Result<bool> {
        let cell = self.round_cell(round_id)?;
        let mut record = cell.lock().await;

        if !record.round.is_reveal_overdue(Utc::now()) {
            return Ok(false);
        }

        tracing::warn!("Round {} missed its reveal deadline", round_id);
        self.cancel_locked(&mut record, CancelReason::RevealTimeout)?;
        Ok(true)
    }

    /// Close open rounds past their deadline and cancel resolving rounds
    /// past their reveal deadline.
    pub async fn check_timeouts(&self) -> Result<TimeoutSweep> {
        let mut sweep = TimeoutSweep::default();

        for (round_id, cell) in self.round_cells() {
            let mut record = cell.lock().await;
            let now = Utc::now();

            if record.round.is_close_overdue(now) {
                self.close_locked(&mut record)?;
                sweep.closed.push(round_id);
            } else if record.round.is_reveal_overdue(now) {
                self.cancel_locked(&mut record, CancelReason::RevealTimeout)?;
                sweep.cancelled.push(round_id);
            }
        }

        if !sweep.closed.is_empty() || !sweep.cancelled.is_empty() {
            tracing::info!(
                "Timeout sweep closed {} and cancelled {} rounds",
                sweep.closed.len(),
                sweep.cancelled.len()
            );
        }
        Ok(sweep)
    }

    // Queries

    pub async fn round_status(&self, round_id: RoundId) -> Result<Round> {
        let cell = self.round_cell(round_id)?;
        let record = cell.lock().await;
        Ok(record.round.clone())
    }

    pub async fn bets_for_round(&self, round_id: RoundId) -> Result<BetIter> {
        let cell = self.round_cell(round_id)?;
        let record = cell.lock().await;
        Ok(record.ledger.iter_snapshot())
    }

    pub async fn rounds(&self) -> Vec<Round> {
        let mut rounds = Vec::new();
        for (_, cell) in self.round_cells() {
            rounds.push(cell.lock().await.round.clone());
        }
        rounds
    }

    pub async fn pool_status(&self) -> PoolStatus {
        let mut open_rounds = 0;
        for (_, cell) in self.round_cells() {
            if !cell.lock().await.round.is_terminal() {
                open_rounds += 1;
            }
        }

        let mut status = self.inner.pool.lock().status();
        status.open_rounds = open_rounds;
        status
    }

    // Participants and liquidity

    pub fn register_participant(&self, name: &str, initial_balance: u64) -> Result<ParticipantId> {
        let id = self.inner.pool.lock().register_participant(name, initial_balance)?;
        tracing::info!("Registered participant '{}' as {}", name, id);
        Ok(id)
    }

    pub fn participant(&self, id: ParticipantId) -> Result<Participant> {
        self.inner
            .pool
            .lock()
            .participant(id)
            .cloned()
            .ok_or(RouletteError::ParticipantNotFound(id))
    }

    pub fn participant_by_name(&self, name: &str) -> Option<Participant> {
        self.inner.pool.lock().participant_by_name(name).cloned()
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.inner.pool.lock().participants()
    }

    pub fn credit_participant(&self, id: ParticipantId, amount: u64) -> Result<u64> {
        self.inner.pool.lock().credit_participant(id, amount)
    }

    pub fn debit_participant(&self, id: ParticipantId, amount: u64) -> Result<u64> {
        self.inner.pool.lock().debit_participant(id, amount)
    }

    pub fn deposit_reserve(&self, amount: u64) -> Result<u64> {
        let reserve = self.inner.pool.lock().deposit(amount)?;
        self.log_event(None, AuditEvent::PoolDeposit { amount, reserve });
        Ok(reserve)
    }

    /// Fails with `Insolvency` if the remaining reserve would not cover the
    /// obligations already committed.
    pub fn withdraw_reserve(&self, amount: u64) -> Result<u64> {
        let reserve = self.inner.pool.lock().withdraw(amount)?;
        self.log_event(None, AuditEvent::PoolWithdraw { amount, reserve });
        Ok(reserve)
    }

    // Persistence

    /// Consistent copy of the engine: every round lock is held while the
    /// pool is copied.
    pub async fn snapshot(&self) -> EngineSnapshot {
        let cells = self.round_cells();
        let mut guards = Vec::with_capacity(cells.len());
        for (_, cell) in &cells {
            guards.push(cell.lock().await);
        }

        let pool = self.inner.pool.lock().clone();
        let rounds = guards.iter().map(|g| (**g).clone()).collect();

        EngineSnapshot {
            next_round_id: self.inner.next_round_id.load(Ordering::SeqCst),
            next_bet_id: self.inner.next_bet_id.load(Ordering::SeqCst),
            next_audit_seq: self.inner.audit.next_seq(),
            pool,
            rounds,
            taken_at: Utc::now(),
        }
    }

    /// Rebuild an engine from `snapshot`, then run the timeout sweep and
    /// rearm watchdogs for rounds still awaiting a reveal.
    pub async fn restore(
        config: EngineConfig,
        snapshot: EngineSnapshot,
        entropy: Arc<dyn EntropySource>,
    ) -> Result<Self> {
        config.validate()?;

        let mut rounds = HashMap::with_capacity(snapshot.rounds.len());
        for record in snapshot.rounds {
            if record.round.id != record.ledger.round_id() {
                return Err(RouletteError::internal(format!(
                    "Snapshot pairs round {} with ledger of round {}",
                    record.round.id,
                    record.ledger.round_id()
                )));
            }
            rounds.insert(record.round.id, Arc::new(tokio::sync::Mutex::new(record)));
        }

        let engine = Self::from_parts(
            config,
            entropy,
            snapshot.pool,
            rounds,
            AuditLog::starting_at(snapshot.next_audit_seq),
            snapshot.next_round_id,
            snapshot.next_bet_id,
        );

        engine.check_timeouts().await?;

        for (round_id, cell) in engine.round_cells() {
            let record = cell.lock().await;
            if record.round.state == RoundState::Resolving {
                if let Some(deadline) = record.round.reveal_deadline {
                    engine.spawn_reveal_watchdog(round_id, deadline);
                }
            }
        }

        tracing::info!(
            "Restored engine snapshot from {} ({} rounds)",
            snapshot.taken_at,
            engine.inner.rounds.read().len()
        );
        Ok(engine)
    }
}

/// Saturate a round's house edge into the audit field, keeping its sign.
fn clamp_edge(edge: i128) -> i64 {
    i64::try_from(edge).unwrap_or(if edge < 0 { i64::MIN } else { i64::MAX })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::generate_secret;
    use crate::entropy::FixedEntropy;
    use crate::odds::{Color, Parity};
    use crate::replay::{verify_round, VerifiedStatus};
    use chrono::Duration;
    use futures::future::join_all;

    const BEACON: [u8; 32] = [42u8; 32];

    fn engine() -> RouletteEngine {
        let engine = RouletteEngine::with_entropy(
            EngineConfig::default(),
            Arc::new(FixedEntropy(BEACON)),
        )
        .unwrap();
        engine.deposit_reserve(1_000_000).unwrap();
        engine
    }

    fn params(max_exposure: u64) -> RoundParams {
        RoundParams::new(37, Utc::now() + Duration::minutes(5), max_exposure)
    }

    async fn commit(engine: &RouletteEngine, round: RoundId) -> Vec<u8> {
        let seed = generate_secret();
        engine.close_round(round).await.unwrap();
        engine
            .commit_seed(round, Commitment::create_with_secret(&seed))
            .await
            .unwrap();
        seed
    }

    #[tokio::test]
    async fn test_full_round_pays_out() {
        let engine = engine();
        let alice = engine.register_participant("alice", 1_000).unwrap();
        let bob = engine.register_participant("bob", 1_000).unwrap();
        let round = engine.open_round(params(100_000)).await.unwrap();

        let mut bets = Vec::new();
        for n in 0..37u8 {
            bets.push(
                engine
                    .place_bet(round, alice, BetType::Straight { number: n }, 10)
                    .await
                    .unwrap(),
            );
        }
        engine
            .place_bet(round, bob, BetType::Color { color: Color::Red }, 20)
            .await
            .unwrap();

        let seed = commit(&engine, round).await;
        let outcome = engine.reveal_seed(round, &seed).await.unwrap();
        assert!(outcome < 37);

        let status = engine.round_status(round).await.unwrap();
        assert_eq!(status.state, RoundState::Settled);
        assert_eq!(status.outcome, Some(outcome));
        assert!(status.total_payout <= status.max_exposure);

        // alice covered every number: 37 stakes of 10 in, one win of 360 back
        assert_eq!(engine.participant(alice).unwrap().balance, 1_000 - 370 + 360);

        let red = BetType::Color { color: Color::Red };
        let bob_balance = engine.participant(bob).unwrap().balance;
        if red.covers(outcome) {
            assert_eq!(bob_balance, 1_020);
        } else {
            assert_eq!(bob_balance, 980);
        }

        let pool = engine.pool_status().await;
        assert_eq!(pool.locked, 0);
        assert_eq!(pool.committed, 0);
        assert_eq!(pool.open_rounds, 0);
        assert_eq!(pool.house_edge, 390i128 - status.total_payout as i128);

        let settled: Vec<Bet> = engine.bets_for_round(round).await.unwrap().collect();
        assert_eq!(settled.len(), 38);
        assert!(settled.iter().all(|b| b.payout().is_some()));
    }

    #[tokio::test]
    async fn test_outcome_is_reproducible() {
        let seed = b"fixed operator seed".to_vec();
        let mut outcomes = Vec::new();

        for _ in 0..2 {
            let engine = engine();
            let round = engine.open_round(params(1_000)).await.unwrap();
            engine.close_round(round).await.unwrap();
            engine
                .commit_seed(round, Commitment::create_with_secret(&seed))
                .await
                .unwrap();
            outcomes.push(engine.reveal_seed(round, &seed).await.unwrap());

            let status = engine.round_status(round).await.unwrap();
            let external = status.external_entropy.unwrap();
            assert_eq!(
                entropy::outcome_for(&seed, &external, round, 37),
                outcomes[outcomes.len() - 1]
            );
        }

        assert_eq!(outcomes[0], outcomes[1]);
    }

    #[tokio::test]
    async fn test_bets_rejected_outside_open() {
        let engine = engine();
        let alice = engine.register_participant("alice", 1_000).unwrap();
        let bet = BetType::Parity { parity: Parity::Even };

        let round = engine.open_round(params(10_000)).await.unwrap();
        engine.close_round(round).await.unwrap();
        let err = engine.place_bet(round, alice, bet, 10).await.unwrap_err();
        assert!(matches!(err, RouletteError::InvalidState { .. }));
        // state is checked before the amount
        let err = engine.place_bet(round, alice, bet, 0).await.unwrap_err();
        assert!(matches!(err, RouletteError::InvalidState { .. }));

        let seed = generate_secret();
        engine
            .commit_seed(round, Commitment::create_with_secret(&seed))
            .await
            .unwrap();
        let err = engine.place_bet(round, alice, bet, 10).await.unwrap_err();
        assert!(matches!(err, RouletteError::InvalidState { .. }));

        engine.reveal_seed(round, &seed).await.unwrap();
        let err = engine.place_bet(round, alice, bet, 10).await.unwrap_err();
        assert!(matches!(err, RouletteError::InvalidState { .. }));
        let err = engine.place_bet(round, alice, bet, 0).await.unwrap_err();
        assert!(matches!(err, RouletteError::InvalidState { .. }));

        let cancelled = engine.open_round(params(10_000)).await.unwrap();
        engine
            .cancel_round(cancelled, CancelReason::Operator("test".into()))
            .await
            .unwrap();
        let err = engine.place_bet(cancelled, alice, bet, 10).await.unwrap_err();
        assert!(matches!(err, RouletteError::InvalidState { .. }));

        assert_eq!(engine.participant(alice).unwrap().balance, 1_000);
    }

    #[tokio::test]
    async fn test_commit_mismatch_cancels_and_refunds() {
        let engine = engine();
        let alice = engine.register_participant("alice", 1_000).unwrap();
        let bob = engine.register_participant("bob", 500).unwrap();
        let round = engine.open_round(params(10_000)).await.unwrap();

        engine
            .place_bet(round, alice, BetType::Dozen { dozen: 2 }, 33)
            .await
            .unwrap();
        engine
            .place_bet(round, bob, BetType::Straight { number: 0 }, 7)
            .await
            .unwrap();

        commit(&engine, round).await;
        let err = engine.reveal_seed(round, b"not the seed").await.unwrap_err();
        assert!(matches!(err, RouletteError::CommitMismatch(r) if r == round));

        let status = engine.round_status(round).await.unwrap();
        assert_eq!(status.state, RoundState::Cancelled);
        assert_eq!(status.cancel_reason, Some(CancelReason::CommitMismatch));
        assert!(status.audit_review);
        assert_eq!(status.outcome, None);

        assert_eq!(engine.participant(alice).unwrap().balance, 1_000);
        assert_eq!(engine.participant(bob).unwrap().balance, 500);
        assert_eq!(engine.pool_status().await.locked, 0);

        let rejected = engine
            .audit_log()
            .entries_for_round(round)
            .into_iter()
            .find_map(|e| match e.event {
                AuditEvent::RevealRejected { seed } => Some(seed),
                _ => None,
            });
        assert_eq!(rejected, Some(hex::encode(b"not the seed")));
    }

    #[tokio::test]
    async fn test_out_of_bounds_seed_cancels_round() {
        let engine = engine();
        let alice = engine.register_participant("alice", 100).unwrap();

        for seed in [vec![7u8; 300], Vec::new()] {
            let round = engine.open_round(params(10_000)).await.unwrap();
            engine
                .place_bet(round, alice, BetType::Color { color: Color::Black }, 10)
                .await
                .unwrap();
            engine.close_round(round).await.unwrap();
            engine
                .commit_seed(round, Commitment::create_with_secret(b"right"))
                .await
                .unwrap();

            let err = engine.reveal_seed(round, &seed).await.unwrap_err();
            assert!(matches!(err, RouletteError::CommitMismatch(r) if r == round));

            let status = engine.round_status(round).await.unwrap();
            assert_eq!(status.state, RoundState::Cancelled);
            assert_eq!(status.cancel_reason, Some(CancelReason::CommitMismatch));
            assert_eq!(engine.participant(alice).unwrap().balance, 100);

            let verified = verify_round(&engine.audit_log().entries_for_round(round), round).unwrap();
            assert_eq!(verified.status, VerifiedStatus::Cancelled(CancelReason::CommitMismatch));
        }

        assert_eq!(engine.pool_status().await.locked, 0);
    }

    #[tokio::test]
    async fn test_reveal_timeout_out_of_range_rejected_at_open() {
        let engine = engine();
        let huge = std::time::Duration::from_secs(9_000_000_000_000);

        let err = engine
            .open_round(params(1_000).with_reveal_timeout(huge))
            .await
            .unwrap_err();
        assert!(matches!(err, RouletteError::Config(_)));
        assert!(engine.rounds().await.is_empty());
    }

    #[test]
    fn test_house_edge_clamp_keeps_sign() {
        assert_eq!(clamp_edge(-25), -25);
        assert_eq!(clamp_edge(i128::from(u64::MAX)), i64::MAX);
        assert_eq!(clamp_edge(-i128::from(u64::MAX)), i64::MIN);
    }

    #[tokio::test]
    async fn test_cancel_refunds_exact_stakes() {
        let engine = engine();
        let alice = engine.register_participant("alice", 1_000).unwrap();
        let round = engine.open_round(params(100_000)).await.unwrap();

        let amounts = [1u64, 7, 13, 99, 250];
        for amount in amounts {
            engine
                .place_bet(round, alice, BetType::Column { column: 3 }, amount)
                .await
                .unwrap();
        }

        let refunds = engine
            .cancel_round(round, CancelReason::Operator("table closed".into()))
            .await
            .unwrap();
        let refunded: u64 = refunds.iter().map(|r| r.amount).sum();
        assert_eq!(refunded, amounts.iter().sum::<u64>());
        assert_eq!(engine.participant(alice).unwrap().balance, 1_000);

        let err = engine
            .cancel_round(round, CancelReason::Operator("again".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, RouletteError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_combined_exposure_rejected() {
        let engine = engine();
        let alice = engine.register_participant("alice", 1_000).unwrap();
        let round = engine.open_round(params(500)).await.unwrap();

        engine
            .place_bet(round, alice, BetType::Straight { number: 7 }, 10)
            .await
            .unwrap();
        let err = engine
            .place_bet(round, alice, BetType::Straight { number: 8 }, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, RouletteError::Insolvency { .. }));

        // the rejected bet left no trace
        assert_eq!(engine.participant(alice).unwrap().balance, 990);
        assert_eq!(engine.bets_for_round(round).await.unwrap().len(), 1);
        assert_eq!(engine.pool_status().await.committed, 360);
    }

    #[tokio::test]
    async fn test_pool_reserve_bounds_admission() {
        let engine = RouletteEngine::with_entropy(
            EngineConfig::default(),
            Arc::new(FixedEntropy(BEACON)),
        )
        .unwrap();
        engine.deposit_reserve(400).unwrap();
        let alice = engine.register_participant("alice", 1_000).unwrap();

        let first = engine.open_round(params(1_000)).await.unwrap();
        let second = engine.open_round(params(1_000)).await.unwrap();

        engine
            .place_bet(first, alice, BetType::Straight { number: 1 }, 10)
            .await
            .unwrap();
        let err = engine
            .place_bet(second, alice, BetType::Straight { number: 2 }, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, RouletteError::Insolvency { requested: 360, available: 40 }));

        let err = engine.withdraw_reserve(41).unwrap_err();
        assert!(matches!(err, RouletteError::Insolvency { .. }));
        assert_eq!(engine.withdraw_reserve(40).unwrap(), 360);
    }

    #[tokio::test]
    async fn test_bet_validation() {
        let engine = engine();
        let alice = engine.register_participant("alice", 50).unwrap();
        let round = engine.open_round(params(10_000)).await.unwrap();

        let err = engine
            .place_bet(round, alice, BetType::Color { color: Color::Red }, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, RouletteError::Validation(_)));

        let err = engine
            .place_bet(round, alice, BetType::Straight { number: 37 }, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, RouletteError::InvalidBetType(_)));

        let err = engine
            .place_bet(round, alice, BetType::Color { color: Color::Red }, 60)
            .await
            .unwrap_err();
        assert!(matches!(err, RouletteError::InsufficientFunds { need: 60, available: 50 }));

        let err = engine
            .place_bet(round, ParticipantId::new(), BetType::Color { color: Color::Red }, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, RouletteError::ParticipantNotFound(_)));

        let err = engine
            .place_bet(RoundId(99), alice, BetType::Color { color: Color::Red }, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, RouletteError::RoundNotFound(_)));
    }

    #[tokio::test]
    async fn test_double_zero_wheel() {
        let engine = engine();
        let alice = engine.register_participant("alice", 100).unwrap();
        let round = engine
            .open_round(RoundParams::new(38, Utc::now() + Duration::minutes(5), 10_000))
            .await
            .unwrap();

        engine
            .place_bet(round, alice, BetType::Straight { number: 37 }, 1)
            .await
            .unwrap();
        engine
            .place_bet(round, alice, BetType::Split { first: 37, second: 2 }, 1)
            .await
            .unwrap();

        let seed = commit(&engine, round).await;
        assert!(engine.reveal_seed(round, &seed).await.unwrap() < 38);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_bets_respect_exposure() {
        let engine = engine();
        let round = engine.open_round(params(3_600)).await.unwrap();

        let mut players = Vec::new();
        for i in 0..40 {
            players.push(engine.register_participant(&format!("player-{}", i), 100).unwrap());
        }

        let tasks = players.iter().enumerate().map(|(i, player)| {
            let engine = engine.clone();
            let player = *player;
            tokio::spawn(async move {
                let number = (i % 36) as u8 + 1;
                engine
                    .place_bet(round, player, BetType::Straight { number }, 10)
                    .await
            })
        });

        let results = join_all(tasks).await;
        let accepted = results
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(_))))
            .count();

        // 3_600 / 360 fits exactly ten straight-up bets of 10
        assert_eq!(accepted, 10);

        let exposure: u64 = engine
            .bets_for_round(round)
            .await
            .unwrap()
            .map(|b| b.worst_case().unwrap())
            .sum();
        assert_eq!(exposure, 3_600);
        assert_eq!(engine.pool_status().await.committed, 3_600);
    }

    #[tokio::test]
    async fn test_independent_rounds() {
        let engine = engine();
        let alice = engine.register_participant("alice", 1_000).unwrap();
        let first = engine.open_round(params(10_000)).await.unwrap();
        let second = engine.open_round(params(10_000)).await.unwrap();

        engine
            .place_bet(first, alice, BetType::Color { color: Color::Black }, 10)
            .await
            .unwrap();
        engine
            .place_bet(second, alice, BetType::Color { color: Color::Red }, 10)
            .await
            .unwrap();

        engine
            .cancel_round(first, CancelReason::Operator("test".into()))
            .await
            .unwrap();

        let seed = commit(&engine, second).await;
        engine.reveal_seed(second, &seed).await.unwrap();

        assert_eq!(engine.rounds().await.len(), 2);
        assert_eq!(
            engine.round_status(first).await.unwrap().state,
            RoundState::Cancelled
        );
        assert_eq!(
            engine.round_status(second).await.unwrap().state,
            RoundState::Settled
        );
    }

    #[tokio::test]
    async fn test_watchdog_cancels_late_round() {
        let engine = engine();
        let alice = engine.register_participant("alice", 100).unwrap();
        let round = engine
            .open_round(params(10_000).with_reveal_timeout(std::time::Duration::from_millis(50)))
            .await
            .unwrap();
        engine
            .place_bet(round, alice, BetType::Half { half: crate::odds::Half::High }, 40)
            .await
            .unwrap();

        let seed = commit(&engine, round).await;
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;

        let status = engine.round_status(round).await.unwrap();
        assert_eq!(status.state, RoundState::Cancelled);
        assert_eq!(status.cancel_reason, Some(CancelReason::RevealTimeout));
        assert!(status.audit_review);
        assert_eq!(engine.participant(alice).unwrap().balance, 100);

        let err = engine.reveal_seed(round, &seed).await.unwrap_err();
        assert!(matches!(err, RouletteError::InvalidState { .. }));
    }

    #[test]
    fn test_late_reveal_cancels_without_runtime() {
        futures::executor::block_on(async {
            let engine = engine();
            let alice = engine.register_participant("alice", 100).unwrap();
            let round = engine
                .open_round(
                    params(10_000).with_reveal_timeout(std::time::Duration::from_millis(20)),
                )
                .await
                .unwrap();
            engine
                .place_bet(round, alice, BetType::Dozen { dozen: 3 }, 30)
                .await
                .unwrap();

            let seed = commit(&engine, round).await;
            std::thread::sleep(std::time::Duration::from_millis(60));

            let err = engine.reveal_seed(round, &seed).await.unwrap_err();
            assert!(matches!(err, RouletteError::RevealTimeout(r) if r == round));

            let status = engine.round_status(round).await.unwrap();
            assert_eq!(status.cancel_reason, Some(CancelReason::RevealTimeout));
            assert_eq!(engine.participant(alice).unwrap().balance, 100);
        });
    }

    #[test]
    fn test_sweep_handles_overdue_rounds() {
        futures::executor::block_on(async {
            let engine = engine();
            let alice = engine.register_participant("alice", 100).unwrap();

            let open = engine
                .open_round(RoundParams::new(
                    37,
                    Utc::now() + Duration::milliseconds(20),
                    1_000,
                ))
                .await
                .unwrap();
            let resolving = engine
                .open_round(params(1_000).with_reveal_timeout(std::time::Duration::from_millis(20)))
                .await
                .unwrap();
            engine
                .place_bet(resolving, alice, BetType::Color { color: Color::Black }, 10)
                .await
                .unwrap();
            commit(&engine, resolving).await;

            std::thread::sleep(std::time::Duration::from_millis(60));
            let sweep = engine.check_timeouts().await.unwrap();

            assert_eq!(sweep.closed, vec![open]);
            assert_eq!(sweep.cancelled, vec![resolving]);
            assert_eq!(
                engine.round_status(open).await.unwrap().state,
                RoundState::Closed
            );
            assert_eq!(engine.participant(alice).unwrap().balance, 100);
        });
    }

    #[tokio::test]
    async fn test_snapshot_restore_roundtrip() {
        let engine = engine();
        let alice = engine.register_participant("alice", 1_000).unwrap();

        let settled = engine.open_round(params(10_000)).await.unwrap();
        engine
            .place_bet(settled, alice, BetType::Color { color: Color::Red }, 50)
            .await
            .unwrap();
        let seed = commit(&engine, settled).await;
        engine.reveal_seed(settled, &seed).await.unwrap();

        let open = engine.open_round(params(10_000)).await.unwrap();
        engine
            .place_bet(open, alice, BetType::Corner { top_left: 1 }, 25)
            .await
            .unwrap();

        let snapshot = engine.snapshot().await;
        let json = serde_json::to_string(&snapshot).unwrap();
        let snapshot: EngineSnapshot = serde_json::from_str(&json).unwrap();

        let restored = RouletteEngine::restore(
            EngineConfig::default(),
            snapshot,
            Arc::new(FixedEntropy(BEACON)),
        )
        .await
        .unwrap();

        assert_eq!(restored.pool_status().await, engine.pool_status().await);
        assert_eq!(restored.participant(alice).unwrap(), engine.participant(alice).unwrap());
        assert_eq!(
            restored.round_status(settled).await.unwrap().outcome,
            engine.round_status(settled).await.unwrap().outcome
        );

        let before: Vec<Bet> = engine.bets_for_round(open).await.unwrap().collect();
        let after: Vec<Bet> = restored.bets_for_round(open).await.unwrap().collect();
        assert_eq!(before, after);

        // ids continue where the original left off
        let next = restored.open_round(params(10_000)).await.unwrap();
        assert_eq!(next, RoundId(open.0 + 1));
        assert_eq!(restored.audit_log().next_seq(), engine.audit_log().next_seq());
    }

    #[tokio::test]
    async fn test_audit_replay_of_settled_round() {
        let engine = engine();
        let alice = engine.register_participant("alice", 1_000).unwrap();
        let round = engine.open_round(params(10_000)).await.unwrap();

        engine
            .place_bet(round, alice, BetType::Straight { number: 17 }, 5)
            .await
            .unwrap();
        engine
            .place_bet(round, alice, BetType::Color { color: Color::Black }, 40)
            .await
            .unwrap();

        let seed = commit(&engine, round).await;
        let outcome = engine.reveal_seed(round, &seed).await.unwrap();

        let entries = engine.audit_log().entries();
        let verified = verify_round(&entries, round).unwrap();
        assert_eq!(verified.outcome, Some(outcome));
        assert_eq!(verified.status, VerifiedStatus::Settled);
        assert_eq!(verified.bet_count, 2);
        assert_eq!(
            verified.total_payout,
            Some(engine.round_status(round).await.unwrap().total_payout)
        );

        // inflate the first payout
        let mut tampered = entries.clone();
        for entry in tampered.iter_mut() {
            if let AuditEvent::RoundSettled { payouts, .. } = &mut entry.event {
                payouts[0].amount += 1;
            }
        }
        assert!(matches!(
            verify_round(&tampered, round),
            Err(RouletteError::AuditMismatch(_))
        ));

        // swap the revealed seed
        let mut tampered = entries;
        for entry in tampered.iter_mut() {
            if let AuditEvent::SeedRevealed { seed, .. } = &mut entry.event {
                *seed = hex::encode(b"some other seed");
            }
        }
        assert!(matches!(
            verify_round(&tampered, round),
            Err(RouletteError::AuditMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_audit_replay_of_cancelled_round() {
        let engine = engine();
        let alice = engine.register_participant("alice", 1_000).unwrap();
        let round = engine.open_round(params(10_000)).await.unwrap();
        engine
            .place_bet(round, alice, BetType::Line { first_row: 4 }, 12)
            .await
            .unwrap();

        commit(&engine, round).await;
        engine.reveal_seed(round, b"wrong").await.unwrap_err();

        let verified = verify_round(&engine.audit_log().entries(), round).unwrap();
        assert_eq!(verified.status, VerifiedStatus::Cancelled(CancelReason::CommitMismatch));
        assert_eq!(verified.total_staked, 12);

        assert!(matches!(
            verify_round(&engine.audit_log().entries(), RoundId(404)),
            Err(RouletteError::RoundNotFound(_))
        ));
    }
}
