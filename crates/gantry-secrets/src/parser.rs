//! Secret definition parsing from kit blueprints and merged documents.

use std::collections::BTreeMap;

use gantry_core::NodePath;
use gantry_kit::{Blueprint, CredentialTemplate};
use gantry_merge::MergeDocument;
use serde_yaml::Value;
use tracing::debug;

use crate::{Result, SecretDefinition, SecretPath, SecretPlan, SecretSpec, SecretsError};

/// Derives the [`SecretPlan`] for one environment from the kit blueprint
/// plus the merged document's active features and values.
pub struct SecretDefinitionParser;

impl SecretDefinitionParser {
    /// Resolve the plan.
    ///
    /// Conditional templates apply only when every `when` feature is
    /// active. Path templates expand `${<doc.path>}` substitutions and,
    /// with `per_instance`, one concrete path per `${index}`. Ad hoc
    /// declarations from the merged document's top-level `variables`
    /// list are included last. Entries resolving to the same path must
    /// agree on kind and parameters.
    pub fn parse(blueprint: &Blueprint, document: &MergeDocument) -> Result<SecretPlan> {
        let features = document.active_features();
        let mut definitions = Vec::new();

        for template in &blueprint.credentials {
            if !template.when.iter().all(|f| features.contains(f)) {
                continue;
            }

            let origin = format!("{}:credentials/{}", blueprint.id(), template.path);

            for concrete in expand_paths(template, document)? {
                let path = SecretPath::new(concrete.clone()).map_err(|e| {
                    SecretsError::Definition {
                        path: concrete.clone(),
                        origin: origin.clone(),
                        reason: e.to_string(),
                    }
                })?;

                let spec = SecretSpec::from_raw(&template.kind, &template.params).map_err(
                    |reason| SecretsError::Definition {
                        path: concrete.clone(),
                        origin: origin.clone(),
                        reason,
                    },
                )?;

                definitions.push(SecretDefinition::new(path, spec, origin.clone()));
            }
        }

        definitions.extend(manifest_declarations(document)?);

        debug!(
            kit = %blueprint.id(),
            features = features.len(),
            definitions = definitions.len(),
            "parsed secret definitions"
        );

        SecretPlan::from_definitions(definitions)
    }
}

/// Expand one template's path into concrete paths.
fn expand_paths(template: &CredentialTemplate, document: &MergeDocument) -> Result<Vec<String>> {
    match &template.per_instance {
        None => Ok(vec![substitute(&template.path, document, None)?]),
        Some(count_path) => {
            let count = instance_count(&template.path, count_path, document)?;

            (0..count)
                .map(|index| substitute(&template.path, document, Some(index)))
                .collect()
        }
    }
}

fn instance_count(
    template_path: &str,
    count_path: &str,
    document: &MergeDocument,
) -> Result<u64> {
    let parsed = NodePath::parse(count_path).map_err(|_| SecretsError::TemplateTargetInvalid {
        template: template_path.to_string(),
        target: count_path.to_string(),
    })?;

    let value = document
        .lookup(&parsed)
        .ok_or_else(|| SecretsError::TemplateTargetMissing {
            template: template_path.to_string(),
            target: count_path.to_string(),
        })?;

    value
        .as_u64()
        .ok_or_else(|| SecretsError::TemplateTargetInvalid {
            template: template_path.to_string(),
            target: count_path.to_string(),
        })
}

/// Substitute `${...}` tokens in a path template.
fn substitute(
    template: &str,
    document: &MergeDocument,
    index: Option<u64>,
) -> Result<String> {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        let (before, tail) = rest.split_at(start);
        result.push_str(before);

        let Some(end) = tail.find('}') else {
            return Err(SecretsError::TemplateTargetInvalid {
                template: template.to_string(),
                target: tail.to_string(),
            });
        };

        let token = &tail[2..end];
        rest = &tail[end + 1..];

        if token == "index" {
            match index {
                Some(i) => result.push_str(&i.to_string()),
                None => {
                    return Err(SecretsError::TemplateTargetInvalid {
                        template: template.to_string(),
                        target: "${index}".to_string(),
                    });
                }
            }
            continue;
        }

        let path = NodePath::parse(token).map_err(|_| SecretsError::TemplateTargetInvalid {
            template: template.to_string(),
            target: token.to_string(),
        })?;

        let value = document
            .lookup(&path)
            .ok_or_else(|| SecretsError::TemplateTargetMissing {
                template: template.to_string(),
                target: token.to_string(),
            })?;

        let rendered = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => {
                return Err(SecretsError::TemplateTargetInvalid {
                    template: template.to_string(),
                    target: token.to_string(),
                });
            }
        };

        result.push_str(&rendered);
    }

    result.push_str(rest);
    Ok(result)
}

/// Ad hoc secret declarations embedded in the merged document: a
/// top-level `variables` list of `{name, kind, ...params}` maps.
fn manifest_declarations(document: &MergeDocument) -> Result<Vec<SecretDefinition>> {
    let Some(variables) = document.tree().get("variables").and_then(Value::as_sequence) else {
        return Ok(Vec::new());
    };

    let origin = "manifest:variables";
    let mut definitions = Vec::new();

    for (i, entry) in variables.iter().enumerate() {
        let Some(map) = entry.as_mapping() else {
            return Err(SecretsError::Definition {
                path: format!("variables[{i}]"),
                origin: origin.to_string(),
                reason: "variable declaration must be a map".to_string(),
            });
        };

        let name = map
            .get(&Value::String("name".to_string()))
            .and_then(Value::as_str)
            .ok_or_else(|| SecretsError::Definition {
                path: format!("variables[{i}]"),
                origin: origin.to_string(),
                reason: "variable declaration is missing a name".to_string(),
            })?;

        let kind = map
            .get(&Value::String("kind".to_string()))
            .or_else(|| map.get(&Value::String("type".to_string())))
            .and_then(Value::as_str)
            .ok_or_else(|| SecretsError::Definition {
                path: name.to_string(),
                origin: origin.to_string(),
                reason: "variable declaration is missing a kind".to_string(),
            })?;

        let params: BTreeMap<String, Value> = map
            .iter()
            .filter_map(|(k, v)| {
                k.as_str()
                    .filter(|key| !matches!(*key, "name" | "kind" | "type"))
                    .map(|key| (key.to_string(), v.clone()))
            })
            .collect();

        let path = SecretPath::new(name).map_err(|e| SecretsError::Definition {
            path: name.to_string(),
            origin: origin.to_string(),
            reason: e.to_string(),
        })?;

        let spec = SecretSpec::from_raw(kind, &params).map_err(|reason| {
            SecretsError::Definition {
                path: name.to_string(),
                origin: origin.to_string(),
                reason,
            }
        })?;

        definitions.push(SecretDefinition::new(path, spec, origin));
    }

    Ok(definitions)
}

#[cfg(test)]
mod tests {
    use gantry_merge::{HierarchicalMerger, MergeLayer};

    use super::*;
    use crate::SecretKind;

    fn document(yaml: &str) -> MergeDocument {
        HierarchicalMerger::with_layers(vec![MergeLayer::from_str("env.yml", 0, yaml).unwrap()])
            .merge()
            .unwrap()
    }

    fn blueprint(yaml: &str) -> Blueprint {
        Blueprint::from_yaml(yaml).unwrap()
    }

    const KIT: &str = r#"
name: shield
version: 1.0.0
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
    fn test_unconditional_requirements_always_included() {
        let plan =
            SecretDefinitionParser::parse(&blueprint(KIT), &document("meta:\n  x: 1\n")).unwrap();

        assert_eq!(plan.len(), 1);
        assert!(plan.get(&SecretPath::new("admin/password").unwrap()).is_some());
    }

    #[test]
    fn test_feature_gated_requirements_excluded_when_inactive() {
        let doc = document("kit:\n  features: []\nmeta:\n  node_count: 2\n");
        let plan = SecretDefinitionParser::parse(&blueprint(KIT), &doc).unwrap();

        assert!(plan.get(&SecretPath::new("ssl/ca").unwrap()).is_none());
    }

    #[test]
    fn test_feature_gated_requirements_included_when_active() {
        let doc = document("kit:\n  features: [tls]\nmeta:\n  node_count: 3\n");
        let plan = SecretDefinitionParser::parse(&blueprint(KIT), &doc).unwrap();

        assert!(plan.get(&SecretPath::new("ssl/ca").unwrap()).is_some());
        // One per instance index.
        for i in 0..3 {
            let path = SecretPath::new(format!("nodes/{i}/cert")).unwrap();
            assert!(plan.get(&path).is_some(), "missing nodes/{i}/cert");
        }
        assert_eq!(plan.len(), 5);
    }

    #[test]
    fn test_per_instance_count_missing_is_an_error() {
        let doc = document("kit:\n  features: [tls]\n");
        let err = SecretDefinitionParser::parse(&blueprint(KIT), &doc).unwrap_err();
        assert!(matches!(err, SecretsError::TemplateTargetMissing { .. }));
    }

    #[test]
    fn test_doc_value_substitution_in_paths() {
        let kit = blueprint(
            r"
name: demo
version: 1.0.0
credentials:
  - path: ${meta.site}/api/key
    kind: random
",
        );
        let plan =
            SecretDefinitionParser::parse(&kit, &document("meta:\n  site: east\n")).unwrap();

        assert!(plan.get(&SecretPath::new("east/api/key").unwrap()).is_some());
    }

    #[test]
    fn test_manifest_variables_are_parsed() {
        let doc = document(
            "variables:\n  - name: broker/token\n    kind: random\n    length: 24\n",
        );
        let kit = blueprint("name: demo\nversion: 1.0.0\n");
        let plan = SecretDefinitionParser::parse(&kit, &doc).unwrap();

        let def = plan.get(&SecretPath::new("broker/token").unwrap()).unwrap();
        assert_eq!(def.spec.kind(), SecretKind::Random);
        assert_eq!(def.origin, "manifest:variables");
    }

    #[test]
    fn test_kit_and_manifest_conflict_is_ambiguous() {
        let kit = blueprint(
            r"
name: demo
version: 1.0.0
credentials:
  - path: db/password
    kind: random
    length: 16
",
        );
        let doc = document(
            "variables:\n  - name: db/password\n    kind: random\n    length: 64\n",
        );

        let err = SecretDefinitionParser::parse(&kit, &doc).unwrap_err();
        assert!(matches!(err, SecretsError::AmbiguousDefinition { .. }));
    }

    #[test]
    fn test_unknown_kind_flows_through_as_invalid() {
        let kit = blueprint(
            r"
name: demo
version: 1.0.0
credentials:
  - path: odd/thing
    kind: quantum
",
        );
        let plan = SecretDefinitionParser::parse(&kit, &document("a: 1\n")).unwrap();

        let def = plan.get(&SecretPath::new("odd/thing").unwrap()).unwrap();
        assert_eq!(def.spec.kind(), SecretKind::Invalid);
    }
}
