//! The external secret store contract.
//!
//! All operations are per-path atomic from the engine's perspective. A
//! multi-field record is written in one call; there is no partial-write
//! surface. Concrete network stores live outside this workspace and
//! implement [`SecretStore`]; [`MemoryStore`] backs tests and local
//! runs, and [`RetryingStore`] adds bounded retry with backoff and a
//! per-attempt timeout to any inner store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use gantry_core::SecretsConfig;
use rand::Rng;
use tracing::{debug, warn};

use crate::{SecretFields, SecretPath, StoreError};

/// Read/write access to the external secret store.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Read a record's fields, or `None` when absent.
    async fn read(&self, path: &SecretPath) -> Result<Option<SecretFields>, StoreError>;

    /// Write a record's fields in one atomic operation.
    async fn write(&self, path: &SecretPath, fields: &SecretFields) -> Result<(), StoreError>;

    /// Whether a record exists at the path.
    async fn exists(&self, path: &SecretPath) -> Result<bool, StoreError>;

    /// Delete the record at the path. Deleting an absent path succeeds.
    async fn delete(&self, path: &SecretPath) -> Result<(), StoreError>;
}

/// In-memory secret store. Records are versioned on every write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, (u64, SecretFields)>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current write version of a record, for tests and fingerprints.
    #[must_use]
    pub fn version(&self, path: &SecretPath) -> Option<u64> {
        self.records.get(path.as_str()).map(|e| e.value().0)
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn read(&self, path: &SecretPath) -> Result<Option<SecretFields>, StoreError> {
        Ok(self
            .records
            .get(path.as_str())
            .map(|entry| entry.value().1.clone()))
    }

    async fn write(&self, path: &SecretPath, fields: &SecretFields) -> Result<(), StoreError> {
        let mut entry = self
            .records
            .entry(path.as_str().to_string())
            .or_insert_with(|| (0, SecretFields::new()));

        let (version, stored) = entry.value_mut();
        *version += 1;
        *stored = fields.clone();

        debug!(path = %path, version = *version, "stored secret record");
        Ok(())
    }

    async fn exists(&self, path: &SecretPath) -> Result<bool, StoreError> {
        Ok(self.records.contains_key(path.as_str()))
    }

    async fn delete(&self, path: &SecretPath) -> Result<(), StoreError> {
        self.records.remove(path.as_str());
        Ok(())
    }
}

/// Wraps a store with bounded retry on transient errors.
///
/// Each attempt runs under the configured timeout; timeouts count as
/// transient. Backoff doubles per attempt with a small random jitter.
pub struct RetryingStore<S> {
    inner: Arc<S>,
    attempts: u32,
    backoff: Duration,
    timeout: Duration,
}

impl<S: SecretStore> RetryingStore<S> {
    /// Wrap a store using the engine's secrets configuration.
    pub fn new(inner: Arc<S>, config: &SecretsConfig) -> Self {
        Self {
            inner,
            attempts: config.retry_attempts.max(1),
            backoff: config.retry_backoff,
            timeout: config.store_timeout,
        }
    }

    async fn with_retry<T, F, Fut>(&self, op: &str, path: &SecretPath, f: F) -> Result<T, StoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0;

        loop {
            let outcome = tokio::time::timeout(self.timeout, f()).await;

            let error = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if e.is_transient() => e,
                Ok(Err(e)) => return Err(e),
                Err(_) => StoreError::Timeout(self.timeout),
            };

            attempt += 1;
            if attempt >= self.attempts {
                return Err(error);
            }

            let exponential = self.backoff * 2u32.saturating_pow(attempt - 1);
            let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..50));

            warn!(
                op,
                path = %path,
                attempt,
                delay = ?(exponential + jitter),
                error = %error,
                "transient store error, retrying"
            );

            tokio::time::sleep(exponential + jitter).await;
        }
    }
}

#[async_trait]
impl<S: SecretStore> SecretStore for RetryingStore<S> {
    async fn read(&self, path: &SecretPath) -> Result<Option<SecretFields>, StoreError> {
        self.with_retry("read", path, || self.inner.read(path)).await
    }

    async fn write(&self, path: &SecretPath, fields: &SecretFields) -> Result<(), StoreError> {
        self.with_retry("write", path, || self.inner.write(path, fields))
            .await
    }

    async fn exists(&self, path: &SecretPath) -> Result<bool, StoreError> {
        self.with_retry("exists", path, || self.inner.exists(path))
            .await
    }

    async fn delete(&self, path: &SecretPath) -> Result<(), StoreError> {
        self.with_retry("delete", path, || self.inner.delete(path))
            .await
    }
}
