//! Secret paths, values, and records.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::{SecretsError, StoreError};

/// A slash-separated hierarchical secret key, unique within an
/// environment: `ssl/ca`, `nodes/0/cert`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SecretPath(String);

impl SecretPath {
    /// Validate and wrap a secret path.
    pub fn new(path: impl Into<String>) -> Result<Self, SecretsError> {
        let path = path.into();

        if path.is_empty() {
            return Err(SecretsError::InvalidPath {
                path,
                reason: "path cannot be empty".to_string(),
            });
        }

        for segment in path.split('/') {
            if segment.is_empty() {
                return Err(SecretsError::InvalidPath {
                    path: path.clone(),
                    reason: "path segments cannot be empty".to_string(),
                });
            }

            if !segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            {
                return Err(SecretsError::InvalidPath {
                    path: path.clone(),
                    reason: format!("segment '{segment}' contains invalid characters"),
                });
            }
        }

        Ok(Self(path))
    }

    /// The path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecretPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SecretPath {
    type Err = SecretsError;

    fn from_str(s: &str) -> Result<Self, SecretsError> {
        Self::new(s)
    }
}

impl TryFrom<String> for SecretPath {
    type Error = SecretsError;

    fn try_from(value: String) -> Result<Self, SecretsError> {
        Self::new(value)
    }
}

impl From<SecretPath> for String {
    fn from(value: SecretPath) -> Self {
        value.0
    }
}

/// A secret value with redacted debug output and zeroization on drop.
#[derive(Clone)]
pub struct SecretValue {
    inner: SecretString,
}

impl SecretValue {
    /// Wrap a value.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            inner: SecretString::from(value.into()),
        }
    }

    /// Expose the value. Call only at the point of actual use.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.inner.expose_secret()
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl PartialEq for SecretValue {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for SecretValue {}

impl Zeroize for SecretValue {
    fn zeroize(&mut self) {
        // SecretString zeroizes on drop; replacing triggers the cleanup.
        self.inner = SecretString::from(String::new());
    }
}

impl From<String> for SecretValue {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecretValue {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// The named fields of one stored secret. A certificate record, for
/// example, carries `certificate`, `private_key`, and `ca`.
pub type SecretFields = BTreeMap<String, SecretValue>;

/// A stored secret as last observed in the external store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRecord {
    /// Store path.
    pub path: SecretPath,
    /// Field name to value.
    pub fields: SecretFields,
}

impl SecretRecord {
    /// Build a record.
    #[must_use]
    pub fn new(path: SecretPath, fields: SecretFields) -> Self {
        Self { path, fields }
    }

    /// One field's value.
    pub fn field(&self, name: &str) -> Result<&SecretValue, StoreError> {
        self.fields.get(name).ok_or_else(|| {
            StoreError::Backend(format!("record '{}' has no field '{name}'", self.path))
        })
    }

    /// Whether every named field is present and non-empty.
    #[must_use]
    pub fn has_fields(&self, names: &[&str]) -> bool {
        names
            .iter()
            .all(|name| self.fields.get(*name).is_some_and(|v| !v.expose().is_empty()))
    }

    /// Stable hash of the record contents, keyed by field name; used in
    /// render fingerprints so a rotated secret invalidates caches.
    #[must_use]
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for (name, value) in &self.fields {
            hasher.update((name.len() as u64).to_be_bytes());
            hasher.update(name.as_bytes());
            let exposed = value.expose();
            hasher.update((exposed.len() as u64).to_be_bytes());
            hasher.update(exposed.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_paths() {
        assert!(SecretPath::new("ssl/ca").is_ok());
        assert!(SecretPath::new("nodes/0/cert").is_ok());
        assert!(SecretPath::new("db.primary/admin_creds").is_ok());
    }

    #[test]
    fn test_invalid_paths() {
        assert!(SecretPath::new("").is_err());
        assert!(SecretPath::new("/lead").is_err());
        assert!(SecretPath::new("trail/").is_err());
        assert!(SecretPath::new("a//b").is_err());
        assert!(SecretPath::new("has space").is_err());
        assert!(SecretPath::new("colon:field").is_err());
    }

    #[test]
    fn test_secret_value_redacted_debug() {
        let value = SecretValue::new("hunter2");
        let debug = format!("{value:?}");
        assert_eq!(debug, "[REDACTED]");
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_secret_value_expose_and_eq() {
        let a = SecretValue::new("same");
        let b = SecretValue::new("same");
        let c = SecretValue::new("different");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.expose(), "same");
    }

    #[test]
    fn test_secret_value_zeroize() {
        let mut value = SecretValue::new("sensitive");
        value.zeroize();
        assert_eq!(value.expose(), "");
    }

    #[test]
    fn test_record_has_fields() {
        let mut fields = SecretFields::new();
        fields.insert("value".to_string(), SecretValue::new("x"));
        fields.insert("empty".to_string(), SecretValue::new(""));

        let record = SecretRecord::new(SecretPath::new("a/b").unwrap(), fields);
        assert!(record.has_fields(&["value"]));
        assert!(!record.has_fields(&["empty"]));
        assert!(!record.has_fields(&["missing"]));
    }

    #[test]
    fn test_content_hash_changes_with_values() {
        let path = SecretPath::new("a/b").unwrap();

        let mut fields = SecretFields::new();
        fields.insert("value".to_string(), SecretValue::new("one"));
        let first = SecretRecord::new(path.clone(), fields).content_hash();

        let mut fields = SecretFields::new();
        fields.insert("value".to_string(), SecretValue::new("two"));
        let second = SecretRecord::new(path, fields).content_hash();

        assert_ne!(first, second);
    }
}
