//! Per-kind secret material generation.
//!
//! One algorithm per kind, dispatched by exhaustive match. Everything
//! here is synchronous and CPU-bound; the generator runs it on the
//! blocking pool.

mod dh;
mod keys;
mod random;
mod x509;

use crate::{Result, SecretFields, SecretPath, SecretRecord, SecretSpec, SecretsError};

/// Generate the field set for one secret.
///
/// `signer` must be the signer's stored record when the spec names one.
pub(crate) fn generate(
    path: &SecretPath,
    spec: &SecretSpec,
    signer: Option<&SecretRecord>,
) -> Result<SecretFields> {
    match spec {
        SecretSpec::Certificate(cert) => x509::generate(path, cert, signer),
        SecretSpec::Ssh(keypair) => keys::generate_ssh(path, keypair),
        SecretSpec::Rsa(keypair) => keys::generate_rsa(path, keypair),
        SecretSpec::DhParams(keypair) => dh::generate(path, keypair),
        SecretSpec::Random(random) => Ok(random::generate_string(random)),
        SecretSpec::Uuid => Ok(random::generate_uuid()),
        SecretSpec::Provided(_) => Err(SecretsError::Generation {
            path: path.to_string(),
            reason: "user-supplied secrets are never auto-generated".to_string(),
        }),
        SecretSpec::Invalid { kind } => Err(SecretsError::Generation {
            path: path.to_string(),
            reason: format!("unknown secret kind '{kind}'"),
        }),
    }
}

/// Shorthand for wrapping backend failures with the secret path.
pub(crate) fn generation_error(path: &SecretPath, e: impl std::fmt::Display) -> SecretsError {
    SecretsError::Generation {
        path: path.to_string(),
        reason: e.to_string(),
    }
}
