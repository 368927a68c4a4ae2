use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SecretsError {
    #[error("Invalid secret path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Invalid definition for '{path}' (from {origin}): {reason}")]
    Definition {
        path: String,
        origin: String,
        reason: String,
    },

    #[error(
        "Ambiguous secret definition for '{path}': '{first_origin}' and '{second_origin}' \
         disagree on kind or parameters"
    )]
    AmbiguousDefinition {
        path: String,
        first_origin: String,
        second_origin: String,
    },

    #[error("Signer dependency cycle involving: {paths}")]
    SignerCycle { paths: String },

    #[error(
        "Credential template '{template}' references '{target}', which is missing \
         from the merged document"
    )]
    TemplateTargetMissing { template: String, target: String },

    #[error(
        "Credential template '{template}' references '{target}', which is not a \
         usable scalar value"
    )]
    TemplateTargetInvalid { template: String, target: String },

    #[error("Signer '{signer}' for '{path}' has no stored record")]
    SignerMissing { path: String, signer: String },

    #[error("Failed to generate secret '{path}': {reason}")]
    Generation { path: String, reason: String },

    #[error("Secret plan is not satisfied:\n{details}")]
    PlanIncomplete { details: String },

    #[error("Secret plan failed validation:\n{details}")]
    PlanInvalid { details: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors surfaced by the external secret store.
///
/// Transient errors (including timeouts) are retried by
/// [`crate::RetryingStore`]; everything else is permanent.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Transient store error: {0}")]
    Transient(String),

    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Write conflict at '{path}'")]
    Conflict { path: String },

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether retrying the operation could help.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, SecretsError>;
