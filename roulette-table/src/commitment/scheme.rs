use super::{commitment_hash, constant_time_eq, generate_nonce};
use chrono::{DateTime, Utc};
use roulette_core::{Result, RouletteError};
use serde::{Deserialize, Serialize};

/// Operator commitment to a secret seed, stored with the round.
///
/// `hash` is `SHA-256(seed || nonce)`. The nonce travels with the hash so
/// the reveal can be checked without trusting the operator's arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    pub hash: [u8; 32],
    pub nonce: Vec<u8>,
    pub committed_at: DateTime<Utc>,
}

impl Commitment {
    pub fn new(hash: [u8; 32], nonce: Vec<u8>) -> Self {
        Self {
            hash,
            nonce,
            committed_at: Utc::now(),
        }
    }

    /// Build a commitment from hex-encoded hash and nonce.
    pub fn from_hex(hash_hex: &str, nonce_hex: &str) -> Result<Self> {
        let hash = hex::decode(hash_hex.trim())
            .map_err(|e| RouletteError::validation(format!("Invalid commitment hash: {}", e)))?;
        let hash: [u8; 32] = hash.try_into().map_err(|v: Vec<u8>| {
            RouletteError::validation(format!(
                "Commitment hash must be 32 bytes, got {}",
                v.len()
            ))
        })?;
        let nonce = hex::decode(nonce_hex.trim())
            .map_err(|e| RouletteError::validation(format!("Invalid nonce: {}", e)))?;

        Ok(Self::new(hash, nonce))
    }

    /// Operator-side helper: commit to `secret` under a fresh random nonce.
    pub fn create_with_secret(secret: &[u8]) -> Self {
        let nonce = generate_nonce();
        let hash = commitment_hash(secret, &nonce);
        Self::new(hash, nonce)
    }

    /// Constant-time check that `secret` opens this commitment.
    pub fn verify_secret(&self, secret: &[u8]) -> bool {
        let computed = commitment_hash(secret, &self.nonce);
        constant_time_eq(&computed, &self.hash)
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}
