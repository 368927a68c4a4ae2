//! Content fingerprints for cache validity.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A SHA-256 content fingerprint, rendered as lowercase hex.
///
/// Fingerprints are deterministic functions of their input transcript and
/// are compared for exact equality; they are never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a single byte string.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        FingerprintBuilder::new().field("content", bytes).finish()
    }

    /// The hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Incremental fingerprint builder over named fields.
///
/// Every field is written as a length-prefixed record (name length, name,
/// value length, value) so that no concatenation of adjacent fields can
/// collide with a different field split.
pub struct FingerprintBuilder {
    hasher: Sha256,
}

impl FingerprintBuilder {
    /// Start an empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    /// Append one named field to the transcript.
    #[must_use]
    pub fn field(mut self, name: &str, value: &[u8]) -> Self {
        self.hasher.update((name.len() as u64).to_be_bytes());
        self.hasher.update(name.as_bytes());
        self.hasher.update((value.len() as u64).to_be_bytes());
        self.hasher.update(value);
        self
    }

    /// Finish the transcript and produce the fingerprint.
    #[must_use]
    pub fn finish(self) -> Fingerprint {
        Fingerprint(hex::encode(self.hasher.finalize()))
    }
}

impl Default for FingerprintBuilder {
    fn default() -> Self {
        Self::new()
    }
}
