//! SHA-256 helpers for content fingerprints and dimension surrogate keys.

use sha2::{Digest, Sha256};

// ---

/// Hex-encoded SHA-256 of raw content, used as a raw reading's fingerprint.
pub fn content_fingerprint(content: &[u8]) -> String {
    // ---
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Hex-encoded SHA-256 over `|`-joined natural key parts.
pub fn surrogate_key(parts: &[&str]) -> String {
    // ---
    content_fingerprint(parts.join("|").as_bytes())
}
