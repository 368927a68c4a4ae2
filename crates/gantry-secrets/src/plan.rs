//! The secret plan: deduplicated requirements plus generation order.

use std::collections::{BTreeMap, BTreeSet};

use gantry_core::{Fingerprint, FingerprintBuilder};
use tracing::debug;

use crate::{Result, SecretDefinition, SecretPath, SecretsError};

/// The deduplicated set of secret requirements for one environment at
/// one point in time.
///
/// Owned by the pipeline run that created it and recomputed — never
/// mutated — when features or kit version change. Definitions are
/// grouped into waves by signer dependency: everything in wave *n*
/// depends only on secrets in earlier waves, so a wave's paths can be
/// generated concurrently.
#[derive(Debug, Clone)]
pub struct SecretPlan {
    definitions: BTreeMap<SecretPath, SecretDefinition>,
    waves: Vec<Vec<SecretPath>>,
}

impl SecretPlan {
    /// Build a plan from resolved definitions, detecting ambiguous
    /// duplicates and signer cycles.
    pub fn from_definitions(definitions: Vec<SecretDefinition>) -> Result<Self> {
        let mut map: BTreeMap<SecretPath, SecretDefinition> = BTreeMap::new();

        for def in definitions {
            match map.get(&def.path) {
                None => {
                    map.insert(def.path.clone(), def);
                }
                Some(existing) if existing.agrees_with(&def) => {
                    // Identical requirement from two sources deduplicates.
                }
                Some(existing) => {
                    return Err(SecretsError::AmbiguousDefinition {
                        path: def.path.to_string(),
                        first_origin: existing.origin.clone(),
                        second_origin: def.origin,
                    });
                }
            }
        }

        let waves = compute_waves(&map)?;
        debug!(secrets = map.len(), waves = waves.len(), "resolved secret plan");

        Ok(Self {
            definitions: map,
            waves,
        })
    }

    /// Number of secrets in the plan.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether the plan is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Look up one definition.
    #[must_use]
    pub fn get(&self, path: &SecretPath) -> Option<&SecretDefinition> {
        self.definitions.get(path)
    }

    /// All paths, in deterministic order.
    #[must_use]
    pub fn paths(&self) -> Vec<&SecretPath> {
        self.definitions.keys().collect()
    }

    /// Iterate definitions in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = &SecretDefinition> {
        self.definitions.values()
    }

    /// Generation waves: each wave's paths depend only on earlier waves.
    #[must_use]
    pub fn waves(&self) -> &[Vec<SecretPath>] {
        &self.waves
    }

    /// Content fingerprint over the serialized definitions.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        let mut builder = FingerprintBuilder::new();

        for (path, def) in &self.definitions {
            let serialized = serde_json::to_string(def).unwrap_or_default();
            builder = builder.field(path.as_str(), serialized.as_bytes());
        }

        builder.finish()
    }
}

/// Group paths into waves by signer-dependency depth. Signers referenced
/// from outside the plan (an externally managed CA) contribute no edge.
fn compute_waves(map: &BTreeMap<SecretPath, SecretDefinition>) -> Result<Vec<Vec<SecretPath>>> {
    fn depth_of(
        path: &SecretPath,
        map: &BTreeMap<SecretPath, SecretDefinition>,
        depths: &mut BTreeMap<SecretPath, usize>,
        visiting: &mut BTreeSet<SecretPath>,
    ) -> Result<usize> {
        if let Some(depth) = depths.get(path) {
            return Ok(*depth);
        }

        if !visiting.insert(path.clone()) {
            let cycle: Vec<String> = visiting.iter().map(ToString::to_string).collect();
            return Err(SecretsError::SignerCycle {
                paths: cycle.join(", "),
            });
        }

        let depth = match map.get(path).and_then(|def| def.spec.signed_by()) {
            Some(signer) if map.contains_key(signer) => {
                depth_of(signer, map, depths, visiting)? + 1
            }
            _ => 0,
        };

        visiting.remove(path);
        depths.insert(path.clone(), depth);
        Ok(depth)
    }

    let mut depths = BTreeMap::new();
    let mut visiting = BTreeSet::new();

    for path in map.keys() {
        depth_of(path, map, &mut depths, &mut visiting)?;
    }

    let max_depth = depths.values().copied().max().unwrap_or(0);
    let mut waves = vec![Vec::new(); max_depth + 1];

    for (path, depth) in depths {
        if let Some(wave) = waves.get_mut(depth) {
            wave.push(path);
        }
    }

    Ok(waves.into_iter().filter(|w| !w.is_empty()).collect())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap as ParamMap;

    use super::*;
    use crate::SecretSpec;

    fn def(path: &str, kind: &str, params_yaml: &str, origin: &str) -> SecretDefinition {
        let params: ParamMap<String, serde_yaml::Value> = if params_yaml.is_empty() {
            ParamMap::new()
        } else {
            serde_yaml::from_str(params_yaml).unwrap()
        };

        SecretDefinition::new(
            SecretPath::new(path).unwrap(),
            SecretSpec::from_raw(kind, &params).unwrap(),
            origin,
        )
    }

    #[test]
    fn test_identical_duplicates_dedupe() {
        let plan = SecretPlan::from_definitions(vec![
            def("db/password", "random", "length: 16", "kit"),
            def("db/password", "random", "length: 16", "manifest"),
        ])
        .unwrap();

        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn test_conflicting_duplicates_are_ambiguous() {
        let err = SecretPlan::from_definitions(vec![
            def("db/password", "random", "length: 16", "kit:a"),
            def("db/password", "random", "length: 64", "kit:b"),
        ])
        .unwrap_err();

        let msg = err.to_string();
        assert!(matches!(err, SecretsError::AmbiguousDefinition { .. }));
        assert!(msg.contains("kit:a"), "{msg}");
        assert!(msg.contains("kit:b"), "{msg}");
        assert!(msg.contains("db/password"), "{msg}");
    }

    #[test]
    fn test_waves_follow_signer_chains() {
        let plan = SecretPlan::from_definitions(vec![
            def("leaf/cert", "certificate", "common_name: leaf\nsigned_by: mid/ca", "kit"),
            def(
                "mid/ca",
                "certificate",
                "common_name: mid\nis_ca: true\nsigned_by: root/ca",
                "kit",
            ),
            def("root/ca", "certificate", "common_name: root\nis_ca: true", "kit"),
            def("db/password", "random", "", "kit"),
        ])
        .unwrap();

        let waves = plan.waves();
        assert_eq!(waves.len(), 3);

        let wave_of = |p: &str| {
            let path = SecretPath::new(p).unwrap();
            waves.iter().position(|w| w.contains(&path)).unwrap()
        };

        assert_eq!(wave_of("root/ca"), 0);
        assert_eq!(wave_of("db/password"), 0);
        assert_eq!(wave_of("mid/ca"), 1);
        assert_eq!(wave_of("leaf/cert"), 2);
    }

    #[test]
    fn test_signer_cycle_detected() {
        let err = SecretPlan::from_definitions(vec![
            def("a/cert", "certificate", "common_name: a\nsigned_by: b/cert", "kit"),
            def("b/cert", "certificate", "common_name: b\nsigned_by: a/cert", "kit"),
        ])
        .unwrap_err();

        assert!(matches!(err, SecretsError::SignerCycle { .. }));
    }

    #[test]
    fn test_external_signer_is_depth_zero() {
        let plan = SecretPlan::from_definitions(vec![def(
            "leaf/cert",
            "certificate",
            "common_name: leaf\nsigned_by: corp/external-ca",
            "kit",
        )])
        .unwrap();

        assert_eq!(plan.waves().len(), 1);
    }

    #[test]
    fn test_fingerprint_stable_and_sensitive() {
        let build = |length: &str| {
            SecretPlan::from_definitions(vec![def(
                "db/password",
                "random",
                &format!("length: {length}"),
                "kit",
            )])
            .unwrap()
            .fingerprint()
        };

        assert_eq!(build("16"), build("16"));
        assert_ne!(build("16"), build("64"));
    }
}
