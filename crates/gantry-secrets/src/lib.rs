//! `Gantry` secret lifecycle.
//!
//! Derives the set of credentials an environment requires from its kit
//! blueprint and merged document, then generates, validates, and rotates
//! them against an external secret store:
//!
//! - [`SecretDefinitionParser`]: blueprint + merged document → [`SecretPlan`]
//! - [`SecretGenerator`]: idempotent, parallel-safe generation
//! - [`SecretValidator`]: per-path health checks, aggregated plan-wide
//! - [`SecretStore`]: the external store contract, with retry/backoff
//!   ([`RetryingStore`]) and an in-memory implementation ([`MemoryStore`])

mod definition;
mod error;
mod generator;
mod kind;
mod material;
mod parser;
mod plan;
mod store;
mod types;
mod validator;

pub use definition::SecretDefinition;
pub use error::{Result, SecretsError, StoreError};
pub use generator::{EnsureOutcome, GenerationReport, SecretGenerator};
pub use kind::{
    CertificateSpec, Charset, KeypairSpec, ProvidedSpec, RandomSpec, SecretKind, SecretSpec,
};
pub use parser::SecretDefinitionParser;
pub use plan::SecretPlan;
pub use store::{MemoryStore, RetryingStore, SecretStore};
pub use types::{SecretFields, SecretPath, SecretRecord, SecretValue};
pub use validator::{SecretHealth, SecretValidator, ValidationReport};
