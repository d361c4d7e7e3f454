//! Request-scoped token generation and verification.
//!
//! Tokens are 32 bytes of CSPRNG material rendered as 64 hex characters.
//! Only SHA-256 hashes are ever stored; verification hashes the presented
//! token and compares the hex digests in constant time.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Generate a fresh 64-hex-char token.
///
/// UUID v4 draws from the OS CSPRNG; two of them give 32 random bytes.
pub fn generate_token() -> String {
    let u1 = Uuid::new_v4();
    let u2 = Uuid::new_v4();
    let mut bytes = Vec::with_capacity(32);
    bytes.extend_from_slice(u1.as_bytes());
    bytes.extend_from_slice(u2.as_bytes());
    hex::encode(bytes)
}

/// SHA-256 hex digest of a token, the only form that is ever persisted.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Check a presented token against a stored hash in constant time.
pub fn verify_token(presented: &str, stored_hash: &str) -> bool {
    let presented_hash = hash_token(presented);
    let a = presented_hash.as_bytes();
    let b = stored_hash.as_bytes();
    a.len() == b.len() && bool::from(a.ct_eq(b))
}
