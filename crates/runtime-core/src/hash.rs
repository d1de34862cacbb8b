//! SHA-256 helpers for source hashing and audit log chaining.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of a plugin's main source file, used as the
/// cache key for verification memoization and as the value signed
/// over by the manifest's detached signature (spec §6).
pub fn source_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Chain hash for one audit log entry: `H(timestamp || actor || kind || details || prev_hash)`.
/// `prev_hash` is the empty string for the first entry in a log.
pub fn chain_hash(prev_hash: &str, timestamp: &str, actor: &str, kind: &str, details: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(timestamp.as_bytes());
    hasher.update(actor.as_bytes());
    hasher.update(kind.as_bytes());
    hasher.update(details.as_bytes());
    hasher.update(prev_hash.as_bytes());
    hex::encode(hasher.finalize())
}
