pub mod scheme;

pub use scheme::Commitment;

use rand::RngCore;
use sha2::{Digest, Sha256};

pub const SECRET_LEN: usize = 32;
pub const NONCE_LEN: usize = 16;

/// Random seed for an operator commitment.
pub fn generate_secret() -> Vec<u8> {
    let mut secret = vec![0u8; SECRET_LEN];
    rand::thread_rng().fill_bytes(&mut secret);
    secret
}

pub fn generate_nonce() -> Vec<u8> {
    let mut nonce = vec![0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// `SHA-256(secret || nonce)`
pub fn commitment_hash(secret: &[u8], nonce: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(secret);
    hasher.update(nonce);
    hasher.finalize().into()
}

/// Compare without an early exit so timing does not leak the matching prefix.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
