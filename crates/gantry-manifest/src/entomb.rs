//! Entombment encryption.
//!
//! Secret values embedded in the entombed variant are sealed with
//! XChaCha20-Poly1305. The nonce is derived from the secret path, field,
//! and plaintext, so sealing the same value twice produces identical
//! output — rendered variants must be byte-identical for unchanged
//! inputs.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::{ManifestError, Result};

/// Size of the XChaCha20-Poly1305 nonce in bytes.
const NONCE_SIZE: usize = 24;

/// Size of the encryption key in bytes.
const KEY_SIZE: usize = 32;

/// Marker prefix on sealed values.
const PREFIX: &str = "entombed:v1:";

/// Entombment key with zeroized memory.
#[derive(Clone)]
pub struct EntombKey {
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl EntombKey {
    /// Parse a hex-encoded 32-byte key.
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| ManifestError::EntombKeyInvalid(e.to_string()))?;

        if bytes.len() != KEY_SIZE {
            return Err(ManifestError::EntombKeyInvalid(format!(
                "expected {KEY_SIZE} bytes, got {}",
                bytes.len()
            )));
        }

        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        key.copy_from_slice(&bytes);
        Ok(Self { key })
    }

    /// Generate a random key and return it with its hex encoding.
    #[must_use]
    pub fn generate() -> (Self, String) {
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        OsRng.fill_bytes(key.as_mut());
        let hex_key = hex::encode(key.as_ref());
        (Self { key }, hex_key)
    }

    /// Stable identifier of the key for fingerprints; does not reveal
    /// the key.
    #[must_use]
    pub fn id(&self) -> String {
        hex::encode(Sha256::digest(self.key.as_ref()))
    }

    /// Seal one secret value. Deterministic for a given key, path,
    /// field, and plaintext.
    pub fn seal(&self, path: &str, field: &str, plaintext: &str) -> Result<String> {
        let cipher = XChaCha20Poly1305::new_from_slice(self.key.as_ref())
            .map_err(|e| ManifestError::EntombKeyInvalid(e.to_string()))?;

        let nonce_bytes = derive_nonce(path, field, plaintext);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| ManifestError::EntombKeyInvalid(format!("encryption failed: {e}")))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);

        Ok(format!("{PREFIX}{}", BASE64.encode(sealed)))
    }

    /// Open a sealed value.
    pub fn open(&self, sealed: &str) -> Result<String> {
        let body = sealed
            .strip_prefix(PREFIX)
            .ok_or_else(|| ManifestError::EntombOpenFailed("missing marker prefix".to_string()))?;

        let bytes = BASE64
            .decode(body)
            .map_err(|e| ManifestError::EntombOpenFailed(e.to_string()))?;

        if bytes.len() < NONCE_SIZE {
            return Err(ManifestError::EntombOpenFailed(
                "sealed value is too short".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_SIZE);
        let nonce = XNonce::from_slice(nonce_bytes);

        let cipher = XChaCha20Poly1305::new_from_slice(self.key.as_ref())
            .map_err(|e| ManifestError::EntombKeyInvalid(e.to_string()))?;

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| ManifestError::EntombOpenFailed("authentication failed".to_string()))?;

        String::from_utf8(plaintext).map_err(|e| ManifestError::EntombOpenFailed(e.to_string()))
    }

    /// Whether a string is a sealed value.
    #[must_use]
    pub fn is_sealed(value: &str) -> bool {
        value.starts_with(PREFIX)
    }
}

impl std::fmt::Debug for EntombKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EntombKey([REDACTED])")
    }
}

/// Nonce derivation: SHA-256 over a length-prefixed transcript of path,
/// field, and plaintext, truncated to the nonce size. Distinct
/// plaintexts produce distinct nonces, so determinism does not cost
/// nonce reuse across values.
fn derive_nonce(path: &str, field: &str, plaintext: &str) -> [u8; NONCE_SIZE] {
    let mut hasher = Sha256::new();
    for part in [path, field, plaintext] {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }

    let digest = hasher.finalize();
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&digest[..NONCE_SIZE]);
    nonce
}
