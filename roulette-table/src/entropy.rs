//! Outcome derivation from a revealed seed and external entropy.
//!
//! ```text
//! externalEntropy = SHA-256(beacon || betSetDigest)
//! finalEntropy    = SHA-256(seed || externalEntropy || roundId_le64)
//! outcome         = uniform(finalEntropy, wheelSize)   // rejection sampled
//! ```

use crate::ledger::Bet;
use rand::RngCore;
use roulette_core::RoundId;
use sha2::{Digest, Sha256};

/// Supplies the beacon mixed into a round's entropy. It is drawn only after
/// the operator commitment has been stored.
pub trait EntropySource: Send + Sync {
    fn beacon(&self, round_id: RoundId) -> [u8; 32];
}

/// Operating-system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn beacon(&self, _round_id: RoundId) -> [u8; 32] {
        let mut beacon = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut beacon);
        beacon
    }
}

/// Always returns the same beacon. Used for replay and deterministic runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedEntropy(pub [u8; 32]);

impl EntropySource for FixedEntropy {
    fn beacon(&self, _round_id: RoundId) -> [u8; 32] {
        self.0
    }
}

/// Digest binding the frozen bet set of a round.
pub fn bet_set_digest<'a, I>(bets: I) -> [u8; 32]
where
    I: IntoIterator<Item = &'a Bet>,
{
    let mut hasher = Sha256::new();
    for bet in bets {
        let bet_type = bet.bet_type.to_string();
        hasher.update(bet.id.0.to_le_bytes());
        hasher.update(bet.participant.0.as_bytes());
        hasher.update((bet_type.len() as u32).to_le_bytes());
        hasher.update(bet_type.as_bytes());
        hasher.update(bet.amount.to_le_bytes());
    }
    hasher.finalize().into()
}

pub fn external_entropy(beacon: &[u8; 32], bet_digest: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(beacon);
    hasher.update(bet_digest);
    hasher.finalize().into()
}

pub fn final_entropy(seed: &[u8], external: &[u8; 32], round_id: RoundId) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(seed);
    hasher.update(external);
    hasher.update(round_id.to_le_bytes());
    hasher.finalize().into()
}

/// Map a 64-bit draw onto `0..wheel_size`, or `None` if it falls in the
/// biased tail above the largest multiple of `wheel_size`.
fn sample(draw: u64, wheel_size: u8) -> Option<u8> {
    let n = wheel_size as u64;
    // 2^64 mod n
    let tail = (u64::MAX % n + 1) % n;
    if draw <= u64::MAX - tail {
        Some((draw % n) as u8)
    } else {
        None
    }
}

fn draw_u64(bytes: &[u8; 32]) -> u64 {
    let mut first = [0u8; 8];
    first.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(first)
}

/// Uniform pocket in `0..wheel_size` from `final_entropy`. Rejected draws
/// are replaced by `SHA-256(final_entropy || counter_le32)`.
pub fn derive_outcome(final_entropy: &[u8; 32], wheel_size: u8) -> u8 {
    debug_assert!(wheel_size > 0);

    if let Some(outcome) = sample(draw_u64(final_entropy), wheel_size) {
        return outcome;
    }

    let mut counter: u32 = 0;
    loop {
        let mut hasher = Sha256::new();
        hasher.update(final_entropy);
        hasher.update(counter.to_le_bytes());
        let redraw: [u8; 32] = hasher.finalize().into();

        if let Some(outcome) = sample(draw_u64(&redraw), wheel_size) {
            tracing::debug!("Outcome accepted after {} redraws", counter + 1);
            return outcome;
        }
        counter = counter.wrapping_add(1);
    }
}

/// Full derivation as an observer would run it from audit data.
pub fn outcome_for(seed: &[u8], external: &[u8; 32], round_id: RoundId, wheel_size: u8) -> u8 {
    derive_outcome(&final_entropy(seed, external, round_id), wheel_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_boundary() {
        // 2^64 mod 37 == 12
        assert_eq!(sample(u64::MAX - 12, 37), Some(((u64::MAX - 12) % 37) as u8));
        assert_eq!(sample(u64::MAX - 11, 37), None);
        assert_eq!(sample(u64::MAX, 37), None);
        assert_eq!(sample(0, 37), Some(0));
        assert_eq!(sample(74, 37), Some(0));
    }

    #[test]
    fn test_rejected_draw_is_redrawn() {
        let mut entropy = [0u8; 32];
        entropy[..8].copy_from_slice(&u64::MAX.to_le_bytes());
        let outcome = derive_outcome(&entropy, 37);
        assert!(outcome < 37);
        assert_eq!(outcome, derive_outcome(&entropy, 37));
    }

    #[test]
    fn test_outcome_is_deterministic_and_in_range() {
        let external = external_entropy(&[9u8; 32], &bet_set_digest(&Vec::<Bet>::new()));
        for i in 0u32..500 {
            let seed = i.to_le_bytes();
            for wheel in [37u8, 38] {
                let a = outcome_for(&seed, &external, RoundId(i as u64), wheel);
                let b = outcome_for(&seed, &external, RoundId(i as u64), wheel);
                assert_eq!(a, b);
                assert!(a < wheel);
            }
        }
    }

    #[test]
    fn test_every_input_moves_the_entropy() {
        let external = [1u8; 32];
        let base = final_entropy(b"seed", &external, RoundId(1));
        assert_ne!(base, final_entropy(b"seeD", &external, RoundId(1)));
        assert_ne!(base, final_entropy(b"seed", &[2u8; 32], RoundId(1)));
        assert_ne!(base, final_entropy(b"seed", &external, RoundId(2)));
    }

    #[test]
    fn test_outcomes_cover_the_wheel() {
        let mut seen = [false; 37];
        let external = [3u8; 32];
        for i in 0u32..2_000 {
            seen[outcome_for(&i.to_le_bytes(), &external, RoundId(1), 37) as usize] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_fixed_entropy() {
        let source = FixedEntropy([5u8; 32]);
        assert_eq!(source.beacon(RoundId(1)), source.beacon(RoundId(2)));
        assert_ne!(OsEntropy.beacon(RoundId(1)), OsEntropy.beacon(RoundId(1)));
    }
}
