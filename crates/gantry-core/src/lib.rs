//! `Gantry` core types.
//!
//! Leaf types shared by every other crate in the workspace:
//!
//! - [`EnvironmentName`]: validated environment identifiers and their
//!   hierarchical configuration-file chains
//! - [`NodePath`]: dotted paths into document trees
//! - [`Fingerprint`]: content hashes used for cache validity
//! - [`EngineConfig`]: engine-wide tunables

mod config;
mod environment;
mod error;
mod fingerprint;
mod path;

pub use config::{CacheConfig, EngineConfig, EntombConfig, SecretsConfig};
pub use environment::EnvironmentName;
pub use error::{CoreError, Result};
pub use fingerprint::{Fingerprint, FingerprintBuilder};
pub use path::NodePath;
