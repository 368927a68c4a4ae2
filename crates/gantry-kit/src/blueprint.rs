//! Kit blueprints.
//!
//! A blueprint declares the kit's identity, its ordered layer files
//! (base plus per-feature overlays), and its secret requirement
//! templates. Requirement kinds and parameters are carried as raw
//! values here; the secrets crate interprets them.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{KitError, Result};

/// A kit's declarative description: identity, layers, and credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    /// Kit name.
    pub name: String,

    /// Kit version (semver).
    pub version: String,

    /// Optional human description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Ordered layer files contributed to every merge.
    #[serde(default)]
    pub layers: LayerSet,

    /// Secret requirement templates.
    #[serde(default)]
    pub credentials: Vec<CredentialTemplate>,
}

/// The layer files a kit contributes, base first, then feature overlays
/// in declaration order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LayerSet {
    /// Files merged for every environment using this kit.
    #[serde(default)]
    pub base: Vec<String>,

    /// Files merged only when the named feature is active. Declaration
    /// order is merge order.
    #[serde(default)]
    pub features: IndexMap<String, Vec<String>>,
}

/// One secret requirement template.
///
/// The `path` may contain `${<doc.path>}` substitutions resolved against
/// the merged document, and — together with `per_instance` — the
/// `${index}` placeholder, which expands the template into one concrete
/// path per instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialTemplate {
    /// Secret path template (slash-separated).
    pub path: String,

    /// Secret kind name; interpreted by the secrets crate.
    pub kind: String,

    /// Features that must all be active for this requirement to apply.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub when: Vec<String>,

    /// Document path holding an instance count; expands `${index}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_instance: Option<String>,

    /// Kind-specific parameters, passed through uninterpreted.
    #[serde(flatten)]
    pub params: BTreeMap<String, serde_yaml::Value>,
}

impl Blueprint {
    /// Parse a blueprint from YAML and validate its shape.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let blueprint: Self = serde_yaml::from_str(content)?;
        blueprint.validate()?;
        Ok(blueprint)
    }

    /// The kit identity, `name/version`.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }

    /// Structural validation beyond what serde enforces.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(KitError::InvalidBlueprint {
                reason: "kit name cannot be empty".to_string(),
            });
        }

        if !is_semver(&self.version) {
            return Err(KitError::InvalidBlueprint {
                reason: format!("kit version '{}' is not a semantic version", self.version),
            });
        }

        for template in &self.credentials {
            if template.path.is_empty() {
                return Err(KitError::InvalidBlueprint {
                    reason: "credential template with empty path".to_string(),
                });
            }

            if template.kind.is_empty() {
                return Err(KitError::InvalidBlueprint {
                    reason: format!("credential '{}' has an empty kind", template.path),
                });
            }

            if template.path.contains("${index}") && template.per_instance.is_none() {
                return Err(KitError::InvalidBlueprint {
                    reason: format!(
                        "credential '{}' uses ${{index}} without per_instance",
                        template.path
                    ),
                });
            }
        }

        Ok(())
    }

    /// Layer files for the given active feature set: base files first,
    /// then each active feature's overlays in declaration order.
    #[must_use]
    pub fn layer_files_for(&self, features: &[String]) -> Vec<String> {
        let mut files = self.layers.base.clone();

        for (feature, overlays) in &self.layers.features {
            if features.iter().any(|f| f == feature) {
                files.extend(overlays.iter().cloned());
            }
        }

        files
    }
}

fn is_semver(version: &str) -> bool {
    let parts: Vec<&str> = version.split('.').collect();
    parts.len() == 3 && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KIT_YAML: &str = r#"
name: shield
version: 2.1.0
layers:
  base:
    - base.yml
  features:
    tls:
      - tls.yml
    ha:
      - ha.yml
      - ha-net.yml
credentials:
  - path: admin/password
    kind: random
    length: 48
  - path: ssl/ca
    kind: certificate
    is_ca: true
    common_name: shieldCA
    when: [tls]
  - path: nodes/${index}/cert
    kind: certificate
    common_name: node
    signed_by: ssl/ca
    per_instance: meta.node_count
    when: [tls]
"#;

    #[test]
    fn test_parse_blueprint() {
        let bp = Blueprint::from_yaml(KIT_YAML).unwrap();
        assert_eq!(bp.name, "shield");
        assert_eq!(bp.id(), "shield/2.1.0");
        assert_eq!(bp.credentials.len(), 3);
    }

    #[test]
    fn test_kind_specific_params_flattened() {
        let bp = Blueprint::from_yaml(KIT_YAML).unwrap();
        let random = &bp.credentials[0];
        assert_eq!(random.kind, "random");
        assert_eq!(
            random.params.get("length").and_then(serde_yaml::Value::as_u64),
            Some(48)
        );

        let ca = &bp.credentials[1];
        assert_eq!(ca.when, vec!["tls"]);
        assert_eq!(
            ca.params.get("is_ca").and_then(serde_yaml::Value::as_bool),
            Some(true)
        );
    }

    #[test]
    fn test_layer_files_for_features() {
        let bp = Blueprint::from_yaml(KIT_YAML).unwrap();

        assert_eq!(bp.layer_files_for(&[]), vec!["base.yml"]);
        assert_eq!(
            bp.layer_files_for(&["ha".to_string(), "tls".to_string()]),
            // Blueprint declaration order, not activation order.
            vec!["base.yml", "tls.yml", "ha.yml", "ha-net.yml"]
        );
    }

    #[test]
    fn test_invalid_version_rejected() {
        let result = Blueprint::from_yaml("name: x\nversion: not-semver\n");
        assert!(matches!(result, Err(KitError::InvalidBlueprint { .. })));
    }

    #[test]
    fn test_index_without_per_instance_rejected() {
        let yaml = r"
name: x
version: 1.0.0
credentials:
  - path: nodes/${index}/cert
    kind: certificate
    common_name: node
";
        let result = Blueprint::from_yaml(yaml);
        assert!(matches!(result, Err(KitError::InvalidBlueprint { .. })));
    }

    #[test]
    fn test_empty_kind_rejected() {
        let yaml = "name: x\nversion: 1.0.0\ncredentials:\n  - path: a/b\n    kind: \"\"\n";
        let result = Blueprint::from_yaml(yaml);
        assert!(matches!(result, Err(KitError::InvalidBlueprint { .. })));
    }
}
