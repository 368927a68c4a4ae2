//! Manifest variants and the rendered document type.

use std::fmt;

use gantry_core::{EnvironmentName, Fingerprint};
use serde::{Deserialize, Serialize};

/// How secret values are represented in a rendered manifest.
///
/// Every variant is a deterministic function of the same merged
/// document, secret plan, and secret record set; re-rendering with
/// unchanged inputs is byte-identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestVariant {
    /// The raw merge, operators still present.
    Unevaluated,
    /// Merge complete and evaluated; secret references not substituted.
    Partial,
    /// Secret values inlined in plaintext.
    Unredacted,
    /// Secret values replaced by a placeholder marker.
    Redacted,
    /// Secret values replaced by store-lookup references resolved at
    /// deployment time.
    Vaultified,
    /// Secret values embedded encrypted, for archival.
    Entombed,
}

impl ManifestVariant {
    /// Whether rendering needs the secret plan at all.
    #[must_use]
    pub fn requires_plan(self) -> bool {
        !matches!(self, Self::Unevaluated | Self::Partial)
    }

    /// Whether rendering substitutes actual secret values.
    #[must_use]
    pub fn requires_records(self) -> bool {
        matches!(self, Self::Unredacted | Self::Entombed)
    }

    /// All variants, for iteration in tools and tests.
    #[must_use]
    pub fn all() -> [Self; 6] {
        [
            Self::Unevaluated,
            Self::Partial,
            Self::Unredacted,
            Self::Redacted,
            Self::Vaultified,
            Self::Entombed,
        ]
    }
}

impl fmt::Display for ManifestVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unevaluated => "unevaluated",
            Self::Partial => "partial",
            Self::Unredacted => "unredacted",
            Self::Redacted => "redacted",
            Self::Vaultified => "vaultified",
            Self::Entombed => "entombed",
        };
        f.write_str(s)
    }
}

/// A rendered manifest. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestDocument {
    variant: ManifestVariant,
    environment: EnvironmentName,
    content: String,
    fingerprint: Fingerprint,
}

impl ManifestDocument {
    pub(crate) fn new(
        variant: ManifestVariant,
        environment: EnvironmentName,
        content: String,
        fingerprint: Fingerprint,
    ) -> Self {
        Self {
            variant,
            environment,
            content,
            fingerprint,
        }
    }

    /// The variant tag.
    #[must_use]
    pub fn variant(&self) -> ManifestVariant {
        self.variant
    }

    /// The environment this manifest was rendered for.
    #[must_use]
    pub fn environment(&self) -> &EnvironmentName {
        &self.environment
    }

    /// The serialized manifest content.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// The fingerprint of the inputs this manifest was rendered from.
    #[must_use]
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}
