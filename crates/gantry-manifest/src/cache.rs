//! The manifest cache.
//!
//! Entries are keyed by `(environment, variant, input fingerprint)` and
//! invalidated by fingerprint mismatch only — never by wall-clock time.
//! Each entry carries a hash of its own content; a mismatch on lookup is
//! cache corruption and is treated as a miss, never trusted.

use dashmap::DashMap;
use gantry_core::Fingerprint;
use tracing::{debug, warn};

use crate::ManifestVariant;

/// Cache key: one environment, one variant, one input fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Environment name.
    pub environment: String,
    /// Manifest variant.
    pub variant: ManifestVariant,
    /// Fingerprint of the render inputs.
    pub fingerprint: String,
}

#[derive(Debug, Clone)]
struct CachedManifest {
    content: String,
    content_hash: Fingerprint,
}

/// In-memory manifest cache.
#[derive(Debug)]
pub struct ManifestCache {
    entries: DashMap<CacheKey, CachedManifest>,
    enabled: bool,
}

impl ManifestCache {
    /// Create a cache; a disabled cache never hits.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            entries: DashMap::new(),
            enabled,
        }
    }

    /// Look up a rendered manifest, verifying entry integrity.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<String> {
        if !self.enabled {
            return None;
        }

        let entry = self.entries.get(key)?;

        if Fingerprint::of(entry.content.as_bytes()) != entry.content_hash {
            drop(entry);
            warn!(
                environment = %key.environment,
                variant = %key.variant,
                "cached manifest failed its integrity check, discarding"
            );
            self.entries.remove(key);
            return None;
        }

        debug!(
            environment = %key.environment,
            variant = %key.variant,
            "manifest cache hit"
        );
        Some(entry.content.clone())
    }

    /// Store a rendered manifest.
    pub fn put(&self, key: CacheKey, content: &str) {
        if !self.enabled {
            return;
        }

        self.entries.insert(
            key,
            CachedManifest {
                content: content.to_string(),
                content_hash: Fingerprint::of(content.as_bytes()),
            },
        );
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
