//! Resolved secret definitions.

use serde::Serialize;

use crate::{SecretPath, SecretSpec};

/// One required secret, fully resolved: a concrete path, a kind with
/// parameters, and the origin that declared it (for error reporting).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecretDefinition {
    /// Concrete store path.
    pub path: SecretPath,
    /// Kind and parameters.
    pub spec: SecretSpec,
    /// Which blueprint entry or manifest declaration produced this.
    pub origin: String,
}

impl SecretDefinition {
    /// Build a definition.
    #[must_use]
    pub fn new(path: SecretPath, spec: SecretSpec, origin: impl Into<String>) -> Self {
        Self {
            path,
            spec,
            origin: origin.into(),
        }
    }

    /// Whether two definitions for the same path agree on kind and
    /// parameters (origins may differ).
    #[must_use]
    pub fn agrees_with(&self, other: &Self) -> bool {
        self.path == other.path && self.spec == other.spec
    }
}
