//! Engine configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{CoreError, Result};

mod duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(|e| D::Error::custom(format!("invalid duration: {e}")))
    }
}

/// Engine-wide configuration.
///
/// All fields have working defaults; a config file and `GANTRY_*`
/// environment variables may override them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct EngineConfig {
    /// Secret generation and validation tunables.
    #[serde(default)]
    pub secrets: SecretsConfig,

    /// Manifest cache tunables.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Entombment settings.
    #[serde(default)]
    pub entomb: EntombConfig,
}

impl EngineConfig {
    /// Load configuration from an optional YAML file plus `GANTRY_*`
    /// environment variables (double-underscore separated, so
    /// `GANTRY_SECRETS__RETRY_ATTEMPTS=5` overrides `secrets.retry_attempts`).
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("GANTRY")
                .prefix_separator("_")
                .separator("__"),
        );

        let cfg = builder
            .build()
            .map_err(|e| CoreError::Config(e.to_string()))?;

        cfg.try_deserialize()
            .map_err(|e| CoreError::Config(e.to_string()))
    }
}

/// Secret generation and validation tunables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecretsConfig {
    /// Maximum concurrent secret generation tasks.
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Per-attempt timeout for secret store operations.
    #[serde(default = "default_store_timeout", with = "duration")]
    pub store_timeout: Duration,

    /// Attempts per store operation before a transient error becomes fatal.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Base backoff between retries; doubles per attempt.
    #[serde(default = "default_retry_backoff", with = "duration")]
    pub retry_backoff: Duration,

    /// Certificates expiring within this margin are reported as
    /// expiring-soon rather than valid.
    #[serde(default = "default_expiry_lookahead", with = "duration")]
    pub expiry_lookahead: Duration,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: default_worker_concurrency(),
            store_timeout: default_store_timeout(),
            retry_attempts: default_retry_attempts(),
            retry_backoff: default_retry_backoff(),
            expiry_lookahead: default_expiry_lookahead(),
        }
    }
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_store_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff() -> Duration {
    Duration::from_millis(250)
}

fn default_expiry_lookahead() -> Duration {
    // 30 days
    Duration::from_secs(30 * 24 * 60 * 60)
}

/// Manifest cache tunables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
    /// Whether manifest caching is enabled at all.
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}

/// Entombment settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct EntombConfig {
    /// Hex-encoded 32-byte key used to encrypt entombed secret values.
    /// Required only when rendering the entombed variant.
    #[serde(default)]
    pub key_hex: Option<String>,
}
