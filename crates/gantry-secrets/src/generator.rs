//! Secret generation: idempotent, serialized per path, parallel across
//! paths.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use gantry_core::SecretsConfig;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::{
    material, Result, SecretDefinition, SecretPath, SecretPlan, SecretRecord, SecretSpec,
    SecretStore, SecretsError,
};

/// What `ensure` did for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// A new record was generated and written.
    Generated,
    /// A usable record already existed; left untouched.
    AlreadyPresent,
    /// Rotation was requested; the record was regenerated.
    Rotated,
    /// The secret is user-supplied and absent.
    MissingUserInput {
        /// What to ask the operator for.
        prompt: Option<String>,
    },
}

/// Generates secret material against the store.
///
/// Concurrent calls for the same path serialize on a per-path mutex, so
/// at most one write wins and multi-field records are never interleaved.
/// Distinct paths run concurrently under a bounded worker pool, with the
/// CPU-heavy material generation on the blocking pool.
pub struct SecretGenerator<S> {
    store: Arc<S>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    limiter: Arc<Semaphore>,
    config: SecretsConfig,
}

impl<S> Clone for SecretGenerator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            locks: Arc::clone(&self.locks),
            limiter: Arc::clone(&self.limiter),
            config: self.config.clone(),
        }
    }
}

impl<S: SecretStore + 'static> SecretGenerator<S> {
    /// Create a generator over a store.
    pub fn new(store: Arc<S>, config: SecretsConfig) -> Self {
        let limiter = Arc::new(Semaphore::new(config.worker_concurrency.max(1)));

        Self {
            store,
            locks: Arc::new(DashMap::new()),
            limiter,
            config,
        }
    }

    fn lock_for(&self, path: &SecretPath) -> Arc<Mutex<()>> {
        self.locks
            .entry(path.as_str().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Ensure a secret exists: generate it unless a usable record is
    /// already stored.
    #[instrument(skip(self, def), fields(path = %def.path, kind = %def.spec.kind()))]
    pub async fn ensure(&self, def: &SecretDefinition) -> Result<EnsureOutcome> {
        let lock = self.lock_for(&def.path);
        let _guard = lock.lock().await;

        if let SecretSpec::Provided(provided) = &def.spec {
            return if self.store.exists(&def.path).await.map_err(SecretsError::from)? {
                Ok(EnsureOutcome::AlreadyPresent)
            } else {
                Ok(EnsureOutcome::MissingUserInput {
                    prompt: provided.prompt.clone(),
                })
            };
        }

        if let Some(fields) = self.store.read(&def.path).await.map_err(SecretsError::from)? {
            let record = SecretRecord::new(def.path.clone(), fields);

            if record.has_fields(def.spec.required_fields()) {
                debug!("record already present, leaving untouched");
                return Ok(EnsureOutcome::AlreadyPresent);
            }

            // A record missing required fields is a half-written or
            // corrupted write; regenerate it.
            warn!("stored record is missing required fields, regenerating");
        }

        self.generate_and_write(def).await?;
        Ok(EnsureOutcome::Generated)
    }

    /// Regenerate a secret unconditionally, overwriting any existing
    /// record.
    #[instrument(skip(self, def), fields(path = %def.path))]
    pub async fn rotate(&self, def: &SecretDefinition) -> Result<EnsureOutcome> {
        if matches!(def.spec, SecretSpec::Provided(_)) {
            return Err(SecretsError::Generation {
                path: def.path.to_string(),
                reason: "user-supplied secrets cannot be rotated automatically".to_string(),
            });
        }

        let lock = self.lock_for(&def.path);
        let _guard = lock.lock().await;

        self.generate_and_write(def).await?;
        Ok(EnsureOutcome::Rotated)
    }

    /// Generate material and write the whole record in one store call.
    async fn generate_and_write(&self, def: &SecretDefinition) -> Result<()> {
        let signer = match def.spec.signed_by() {
            Some(signer_path) => {
                let fields = self
                    .store
                    .read(signer_path)
                    .await
                    .map_err(SecretsError::from)?
                    .ok_or_else(|| SecretsError::SignerMissing {
                        path: def.path.to_string(),
                        signer: signer_path.to_string(),
                    })?;
                Some(SecretRecord::new(signer_path.clone(), fields))
            }
            None => None,
        };

        let path = def.path.clone();
        let spec = def.spec.clone();

        let fields = tokio::task::spawn_blocking(move || {
            material::generate(&path, &spec, signer.as_ref())
        })
        .await
        .map_err(|e| SecretsError::Generation {
            path: def.path.to_string(),
            reason: format!("generation task failed: {e}"),
        })??;

        self.store
            .write(&def.path, &fields)
            .await
            .map_err(SecretsError::from)?;

        info!(path = %def.path, kind = %def.spec.kind(), "generated secret");
        Ok(())
    }

    /// Ensure every secret in the plan, wave by wave so signers exist
    /// before their leaves, concurrently within each wave.
    ///
    /// Per-path problems are collected into the report rather than
    /// aborting, so the caller sees every problem at once.
    #[instrument(skip(self, plan), fields(secrets = plan.len()))]
    pub async fn ensure_all(&self, plan: &SecretPlan) -> Result<GenerationReport> {
        let mut report = GenerationReport::default();

        for wave in plan.waves() {
            let mut tasks: JoinSet<(SecretPath, Result<EnsureOutcome>)> = JoinSet::new();

            for path in wave {
                let Some(def) = plan.get(path) else {
                    continue;
                };

                let def = def.clone();
                let this = self.clone();

                tasks.spawn(async move {
                    let permit = this.limiter.clone().acquire_owned().await;
                    if permit.is_err() {
                        return (
                            def.path.clone(),
                            Err(SecretsError::Generation {
                                path: def.path.to_string(),
                                reason: "worker pool closed".to_string(),
                            }),
                        );
                    }

                    let outcome = this.ensure(&def).await;
                    (def.path.clone(), outcome)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((path, Ok(outcome))) => report.record(path, outcome),
                    Ok((path, Err(error))) => report.failures.push((path.to_string(), error)),
                    Err(join_error) => report.failures.push((
                        "(worker)".to_string(),
                        SecretsError::Generation {
                            path: "(worker)".to_string(),
                            reason: join_error.to_string(),
                        },
                    )),
                }
            }
        }

        Ok(report)
    }

    /// Rotate the listed paths only.
    pub async fn rotate_paths(
        &self,
        plan: &SecretPlan,
        paths: &[SecretPath],
    ) -> Result<GenerationReport> {
        let mut report = GenerationReport::default();

        for path in paths {
            let Some(def) = plan.get(path) else {
                report.failures.push((
                    path.to_string(),
                    SecretsError::Generation {
                        path: path.to_string(),
                        reason: "path is not part of the plan".to_string(),
                    },
                ));
                continue;
            };

            match self.rotate(def).await {
                Ok(outcome) => report.record(path.clone(), outcome),
                Err(error) => report.failures.push((path.to_string(), error)),
            }
        }

        Ok(report)
    }
}

/// Aggregated outcome of a plan-wide generation pass.
#[derive(Debug, Default)]
pub struct GenerationReport {
    /// Paths generated fresh.
    pub generated: Vec<SecretPath>,
    /// Paths whose existing records were left untouched.
    pub present: Vec<SecretPath>,
    /// Paths rotated.
    pub rotated: Vec<SecretPath>,
    /// User-supplied secrets that are absent, with their prompts.
    pub missing_input: Vec<(SecretPath, Option<String>)>,
    /// Per-path failures.
    pub failures: Vec<(String, SecretsError)>,
}

impl GenerationReport {
    fn record(&mut self, path: SecretPath, outcome: EnsureOutcome) {
        match outcome {
            EnsureOutcome::Generated => self.generated.push(path),
            EnsureOutcome::AlreadyPresent => self.present.push(path),
            EnsureOutcome::Rotated => self.rotated.push(path),
            EnsureOutcome::MissingUserInput { prompt } => self.missing_input.push((path, prompt)),
        }
    }

    /// Whether every secret is now present and usable.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.missing_input.is_empty()
    }

    /// Actionable checklist for absent user-supplied secrets.
    #[must_use]
    pub fn missing_input_checklist(&self) -> Vec<String> {
        self.missing_input
            .iter()
            .map(|(path, prompt)| match prompt {
                Some(prompt) => format!("{path}: {prompt}"),
                None => format!("{path}: provide a value"),
            })
            .collect()
    }

    /// Fail unless the plan is fully satisfied, reporting every problem.
    pub fn into_result(self) -> Result<()> {
        if self.is_complete() {
            return Ok(());
        }

        Err(SecretsError::PlanIncomplete {
            details: self.to_string(),
        })
    }
}

impl fmt::Display for GenerationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (path, error) in &self.failures {
            writeln!(f, "  {path}: {error}")?;
        }
        for line in self.missing_input_checklist() {
            writeln!(f, "  missing user input - {line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{MemoryStore, SecretFields, SecretValue};

    fn definition(path: &str, kind: &str, params_yaml: &str) -> SecretDefinition {
        let params: BTreeMap<String, serde_yaml::Value> = if params_yaml.is_empty() {
            BTreeMap::new()
        } else {
            serde_yaml::from_str(params_yaml).unwrap()
        };

        SecretDefinition::new(
            SecretPath::new(path).unwrap(),
            SecretSpec::from_raw(kind, &params).unwrap(),
            "test",
        )
    }

    fn generator(store: Arc<MemoryStore>) -> SecretGenerator<MemoryStore> {
        SecretGenerator::new(store, SecretsConfig::default())
    }

    #[tokio::test]
    async fn test_ensure_generates_missing() {
        let store = Arc::new(MemoryStore::new());
        let gen = generator(Arc::clone(&store));
        let def = definition("db/password", "random", "length: 24");

        let outcome = gen.ensure(&def).await.unwrap();
        assert_eq!(outcome, EnsureOutcome::Generated);

        let fields = store.read(&def.path).await.unwrap().unwrap();
        assert_eq!(fields.get("value").unwrap().expose().len(), 24);
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let gen = generator(Arc::clone(&store));
        let def = definition("db/password", "random", "");

        gen.ensure(&def).await.unwrap();
        let first = store.read(&def.path).await.unwrap().unwrap();

        let outcome = gen.ensure(&def).await.unwrap();
        assert_eq!(outcome, EnsureOutcome::AlreadyPresent);

        let second = store.read(&def.path).await.unwrap().unwrap();
        assert_eq!(
            first.get("value").unwrap().expose(),
            second.get("value").unwrap().expose()
        );
        assert_eq!(store.version(&def.path), Some(1));
    }

    #[tokio::test]
    async fn test_rotate_overwrites() {
        let store = Arc::new(MemoryStore::new());
        let gen = generator(Arc::clone(&store));
        let def = definition("db/password", "random", "");

        gen.ensure(&def).await.unwrap();
        let first = store.read(&def.path).await.unwrap().unwrap();

        let outcome = gen.rotate(&def).await.unwrap();
        assert_eq!(outcome, EnsureOutcome::Rotated);

        let second = store.read(&def.path).await.unwrap().unwrap();
        assert_ne!(
            first.get("value").unwrap().expose(),
            second.get("value").unwrap().expose()
        );
        assert_eq!(store.version(&def.path), Some(2));
    }

    #[tokio::test]
    async fn test_concurrent_ensure_single_write() {
        let store = Arc::new(MemoryStore::new());
        let gen = generator(Arc::clone(&store));
        let def = definition("db/password", "random", "");

        let mut tasks = JoinSet::new();
        for _ in 0..8 {
            let gen = gen.clone();
            let def = def.clone();
            tasks.spawn(async move { gen.ensure(&def).await });
        }

        let mut generated = 0;
        while let Some(result) = tasks.join_next().await {
            if result.unwrap().unwrap() == EnsureOutcome::Generated {
                generated += 1;
            }
        }

        // Exactly one write wins; the rest observe the existing record.
        assert_eq!(generated, 1);
        assert_eq!(store.version(&def.path), Some(1));
    }

    #[tokio::test]
    async fn test_corrupt_record_regenerates() {
        let store = Arc::new(MemoryStore::new());
        let gen = generator(Arc::clone(&store));
        let def = definition("db/password", "random", "");

        // A half-written record: required field absent.
        let mut partial = SecretFields::new();
        partial.insert("stray".to_string(), SecretValue::new("junk"));
        store.write(&def.path, &partial).await.unwrap();

        let outcome = gen.ensure(&def).await.unwrap();
        assert_eq!(outcome, EnsureOutcome::Generated);

        let fields = store.read(&def.path).await.unwrap().unwrap();
        assert!(fields.contains_key("value"));
    }

    #[tokio::test]
    async fn test_provided_secret_reports_missing_input() {
        let store = Arc::new(MemoryStore::new());
        let gen = generator(Arc::clone(&store));
        let def = definition("ops/api-token", "provided", "prompt: paste the API token\n");

        let outcome = gen.ensure(&def).await.unwrap();
        assert_eq!(
            outcome,
            EnsureOutcome::MissingUserInput {
                prompt: Some("paste the API token".to_string())
            }
        );

        // Once supplied, it is left untouched.
        let mut fields = SecretFields::new();
        fields.insert("value".to_string(), SecretValue::new("tok-123"));
        store.write(&def.path, &fields).await.unwrap();

        let outcome = gen.ensure(&def).await.unwrap();
        assert_eq!(outcome, EnsureOutcome::AlreadyPresent);
    }

    #[tokio::test]
    async fn test_ensure_all_orders_signers_before_leaves() {
        let store = Arc::new(MemoryStore::new());
        let gen = generator(Arc::clone(&store));

        let plan = SecretPlan::from_definitions(vec![
            definition("api/cert", "certificate", "common_name: api\nsigned_by: ssl/ca"),
            definition("ssl/ca", "certificate", "common_name: ca\nis_ca: true"),
            definition("db/password", "random", ""),
        ])
        .unwrap();

        let report = gen.ensure_all(&plan).await.unwrap();
        assert!(report.is_complete(), "{report}");
        assert_eq!(report.generated.len(), 3);

        let leaf = store
            .read(&SecretPath::new("api/cert").unwrap())
            .await
            .unwrap()
            .unwrap();
        let ca = store
            .read(&SecretPath::new("ssl/ca").unwrap())
            .await
            .unwrap()
            .unwrap();

        // The leaf's ca field is the signer's certificate.
        assert_eq!(
            leaf.get("ca").unwrap().expose(),
            ca.get("certificate").unwrap().expose()
        );
    }

    #[tokio::test]
    async fn test_ensure_all_aggregates_problems() {
        let store = Arc::new(MemoryStore::new());
        let gen = generator(Arc::clone(&store));

        let plan = SecretPlan::from_definitions(vec![
            definition("ok/password", "random", ""),
            definition("ops/token", "provided", ""),
            definition("bad/thing", "quantum", ""),
        ])
        .unwrap();

        let report = gen.ensure_all(&plan).await.unwrap();

        assert_eq!(report.generated.len(), 1);
        assert_eq!(report.missing_input.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert!(!report.is_complete());

        let err = report.into_result().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("ops/token"), "{msg}");
        assert!(msg.contains("bad/thing"), "{msg}");
    }

    #[tokio::test]
    async fn test_rotate_paths_only_touches_listed() {
        let store = Arc::new(MemoryStore::new());
        let gen = generator(Arc::clone(&store));

        let plan = SecretPlan::from_definitions(vec![
            definition("a/one", "random", ""),
            definition("b/two", "random", ""),
        ])
        .unwrap();

        gen.ensure_all(&plan).await.unwrap();

        let rotate_target = SecretPath::new("a/one").unwrap();
        let report = gen.rotate_paths(&plan, &[rotate_target.clone()]).await.unwrap();
        assert_eq!(report.rotated.len(), 1);

        assert_eq!(store.version(&rotate_target), Some(2));
        assert_eq!(store.version(&SecretPath::new("b/two").unwrap()), Some(1));
    }
}
