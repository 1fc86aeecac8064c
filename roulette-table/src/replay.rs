//! Offline verification of a round from its audit entries.
//!
//! Recomputes the bet-set digest, the external entropy, the commitment, the
//! outcome and every payout from logged inputs alone, and fails with
//! `AuditMismatch` on the first disagreement.

use crate::audit::{AuditEntry, AuditEvent};
use crate::commitment::{commitment_hash, constant_time_eq};
use crate::entropy::{bet_set_digest, external_entropy, outcome_for};
use crate::ledger::{Bet, BetStatus};
use crate::payout::{compute_payouts, total_paid, worst_case};
use crate::round::CancelReason;
use roulette_core::{Result, RoundId, RouletteError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifiedStatus {
    /// No terminal entry yet.
    InProgress,
    Settled,
    Cancelled(CancelReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundVerification {
    pub round_id: RoundId,
    pub wheel_size: u8,
    pub bet_count: usize,
    pub total_staked: u64,
    pub max_exposure: u64,
    pub outcome: Option<u8>,
    pub total_payout: Option<u64>,
    pub status: VerifiedStatus,
}

struct Committed {
    hash: [u8; 32],
    nonce: Vec<u8>,
    external: [u8; 32],
}

fn mismatch(round_id: RoundId, msg: impl std::fmt::Display) -> RouletteError {
    RouletteError::audit(format!("round {}: {}", round_id, msg))
}

fn decode_hex(round_id: RoundId, field: &str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value).map_err(|e| mismatch(round_id, format!("bad {} encoding: {}", field, e)))
}

fn decode_hash(round_id: RoundId, field: &str, value: &str) -> Result<[u8; 32]> {
    decode_hex(round_id, field, value)?
        .try_into()
        .map_err(|_| mismatch(round_id, format!("{} is not 32 bytes", field)))
}

/// Replay `round_id` from `entries`. Entries of other rounds are ignored.
pub fn verify_round(entries: &[AuditEntry], round_id: RoundId) -> Result<RoundVerification> {
    let mut round_entries: Vec<&AuditEntry> = entries
        .iter()
        .filter(|e| e.round_id == Some(round_id))
        .collect();
    round_entries.sort_by_key(|e| e.seq);

    let mut iter = round_entries.into_iter();
    let (wheel_size, max_exposure) = match iter.next().map(|e| &e.event) {
        Some(AuditEvent::RoundOpened {
            wheel_size,
            max_exposure,
            ..
        }) => (*wheel_size, *max_exposure),
        Some(other) => {
            return Err(mismatch(round_id, format!("log starts with {}", other.kind())));
        }
        None => return Err(RouletteError::RoundNotFound(round_id)),
    };

    let mut bets: Vec<Bet> = Vec::new();
    let mut exposure: u64 = 0;
    let mut closed = false;
    let mut committed: Option<Committed> = None;
    let mut outcome: Option<u8> = None;
    let mut rejected = false;
    let mut total_payout: Option<u64> = None;
    let mut status = VerifiedStatus::InProgress;

    for entry in iter {
        if status != VerifiedStatus::InProgress {
            return Err(mismatch(round_id, format!("{} after terminal entry", entry.event.kind())));
        }

        match &entry.event {
            AuditEvent::RoundOpened { .. } => {
                return Err(mismatch(round_id, "opened twice"));
            }
            AuditEvent::BetPlaced {
                bet_id,
                participant,
                bet_type,
                amount,
                worst_case: logged_worst,
            } => {
                if closed {
                    return Err(mismatch(round_id, format!("bet {} placed after close", bet_id)));
                }
                bet_type
                    .validate(wheel_size)
                    .map_err(|e| mismatch(round_id, e))?;

                let worst = worst_case(bet_type, *amount)
                    .ok_or_else(|| mismatch(round_id, format!("bet {} overflows", bet_id)))?;
                if worst != *logged_worst {
                    return Err(mismatch(round_id, format!("bet {} worst case differs", bet_id)));
                }

                exposure = exposure
                    .checked_add(worst)
                    .filter(|e| *e <= max_exposure)
                    .ok_or_else(|| mismatch(round_id, format!("bet {} exceeds max exposure", bet_id)))?;

                bets.push(Bet {
                    id: *bet_id,
                    round_id,
                    participant: *participant,
                    bet_type: *bet_type,
                    amount: *amount,
                    placed_at: entry.recorded_at,
                    status: BetStatus::Pending,
                });
            }
            AuditEvent::RoundClosed {
                bet_count,
                total_bet_amount,
            } => {
                let staked: u64 = bets.iter().map(|b| b.amount).sum();
                if *bet_count != bets.len() || *total_bet_amount != staked {
                    return Err(mismatch(round_id, "close totals differ from logged bets"));
                }
                closed = true;
            }
            AuditEvent::SeedCommitted {
                commit_hash,
                nonce,
                beacon,
                bet_set_digest: logged_digest,
                external_entropy: logged_external,
                ..
            } => {
                if !closed || committed.is_some() {
                    return Err(mismatch(round_id, "commitment out of order"));
                }

                let digest = bet_set_digest(&bets);
                if decode_hash(round_id, "bet set digest", logged_digest)? != digest {
                    return Err(mismatch(round_id, "bet set digest differs"));
                }

                let beacon = decode_hash(round_id, "beacon", beacon)?;
                let external = external_entropy(&beacon, &digest);
                if decode_hash(round_id, "external entropy", logged_external)? != external {
                    return Err(mismatch(round_id, "external entropy differs"));
                }

                committed = Some(Committed {
                    hash: decode_hash(round_id, "commit hash", commit_hash)?,
                    nonce: decode_hex(round_id, "nonce", nonce)?,
                    external,
                });
            }
            AuditEvent::SeedRevealed {
                seed,
                outcome: logged_outcome,
            } => {
                if rejected {
                    return Err(mismatch(round_id, "reveal accepted after a rejection"));
                }
                let commit = committed
                    .as_ref()
                    .ok_or_else(|| mismatch(round_id, "reveal without commitment"))?;
                let seed = decode_hex(round_id, "seed", seed)?;

                if !constant_time_eq(&commitment_hash(&seed, &commit.nonce), &commit.hash) {
                    return Err(mismatch(round_id, "revealed seed does not open the commitment"));
                }

                let derived = outcome_for(&seed, &commit.external, round_id, wheel_size);
                if derived != *logged_outcome {
                    return Err(mismatch(
                        round_id,
                        format!("outcome {} logged, {} derived", logged_outcome, derived),
                    ));
                }
                outcome = Some(derived);
            }
            AuditEvent::RevealRejected { seed } => {
                if committed.is_none() || outcome.is_some() {
                    return Err(mismatch(round_id, "rejected reveal outside resolving"));
                }
                decode_hex(round_id, "rejected seed", seed)?;
                rejected = true;
            }
            AuditEvent::RoundSettled {
                payouts,
                total_payout: logged_total,
                ..
            } => {
                let outcome = outcome.ok_or_else(|| mismatch(round_id, "settled without reveal"))?;
                let expected = compute_payouts(outcome, &bets);
                if *payouts != expected {
                    return Err(mismatch(round_id, "payouts differ from recomputation"));
                }

                let total = total_paid(&expected);
                if total != *logged_total || total > max_exposure {
                    return Err(mismatch(round_id, "payout total differs or exceeds exposure"));
                }

                total_payout = Some(total);
                status = VerifiedStatus::Settled;
            }
            AuditEvent::RoundCancelled { reason, refunds } => {
                let mut expected: Vec<(u64, u64)> =
                    bets.iter().map(|b| (b.id.0, b.amount)).collect();
                let mut refunded: Vec<(u64, u64)> =
                    refunds.iter().map(|r| (r.bet_id.0, r.amount)).collect();
                expected.sort_unstable();
                refunded.sort_unstable();

                if expected != refunded {
                    return Err(mismatch(round_id, "refunds differ from stakes"));
                }
                if rejected && *reason != CancelReason::CommitMismatch {
                    return Err(mismatch(
                        round_id,
                        format!("rejected reveal cancelled as {}", reason),
                    ));
                }
                status = VerifiedStatus::Cancelled(reason.clone());
            }
            AuditEvent::PoolDeposit { .. } | AuditEvent::PoolWithdraw { .. } => {
                return Err(mismatch(round_id, "pool entry attributed to a round"));
            }
        }
    }

    Ok(RoundVerification {
        round_id,
        wheel_size,
        bet_count: bets.len(),
        total_staked: bets.iter().map(|b| b.amount).sum(),
        max_exposure,
        outcome,
        total_payout,
        status,
    })
}
