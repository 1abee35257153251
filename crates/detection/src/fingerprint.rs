//! Content fingerprints for classification caching.
//!
//! The fingerprint is SHA-256 over the *normalized* image bytes, hex-encoded.
//! Hashing after normalization means re-uploads of the same source photo keep
//! hitting the same cache entry regardless of transport-level differences in
//! the raw multipart body.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Deterministic digest of image content, used as a cache key component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentFingerprint(String);

impl ContentFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint a byte buffer.
pub fn fingerprint_bytes(bytes: &[u8]) -> ContentFingerprint {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    ContentFingerprint(hex::encode(hasher.finalize()))
}
