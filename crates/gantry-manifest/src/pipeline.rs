//! The manifest pipeline.
//!
//! One run per environment, through consuming stage structs:
//! `LoadedRun -> MergedRun -> PlanResolvedRun -> SecretsResolvedRun`,
//! from which any number of variants can be rendered. Stage transitions
//! check the cancel flag; an in-flight secret generation completes or
//! fails cleanly once started.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use gantry_core::{EngineConfig, EnvironmentName, Fingerprint, FingerprintBuilder, NodePath};
use gantry_kit::{HookKind, HookPayload, KitSource, LayerFile, LifecycleHooks};
use gantry_merge::{HierarchicalMerger, MergeDocument, MergeLayer};
use gantry_secrets::{
    RetryingStore, SecretDefinitionParser, SecretGenerator, SecretPath, SecretPlan, SecretRecord,
    SecretStore, SecretValidator,
};
use tracing::{info, instrument, warn};

use crate::cache::{CacheKey, ManifestCache};
use crate::entomb::EntombKey;
use crate::render::{self, RenderInputs};
use crate::{ManifestDocument, ManifestError, ManifestVariant, Result};

/// Cooperative cancellation for a pipeline run, checked between stages.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct RunCtx<S> {
    kit: Arc<dyn KitSource>,
    store: Arc<RetryingStore<S>>,
    cache: Arc<ManifestCache>,
    config: EngineConfig,
    cancel: CancelFlag,
}

impl<S> Clone for RunCtx<S> {
    fn clone(&self) -> Self {
        Self {
            kit: Arc::clone(&self.kit),
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
            config: self.config.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<S> RunCtx<S> {
    fn check_cancel(&self, stage: &'static str) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(ManifestError::Cancelled { stage })
        } else {
            Ok(())
        }
    }
}

/// Entry point: owns the kit, the store, the cache, and the config.
///
/// Runs for distinct environments share nothing mutable; each run owns
/// its document and plan exclusively until handed to the next stage.
pub struct Pipeline<S> {
    ctx: RunCtx<S>,
}

impl<S: SecretStore + 'static> Pipeline<S> {
    /// Create a pipeline. The store is wrapped with retry/backoff per
    /// the engine configuration.
    pub fn new(kit: Arc<dyn KitSource>, store: Arc<S>, config: EngineConfig) -> Self {
        let store = Arc::new(RetryingStore::new(store, &config.secrets));
        let cache = Arc::new(ManifestCache::new(config.cache.enabled));

        Self {
            ctx: RunCtx {
                kit,
                store,
                cache,
                config,
                cancel: CancelFlag::new(),
            },
        }
    }

    /// The cancel flag for runs of this pipeline.
    #[must_use]
    pub fn cancel_flag(&self) -> CancelFlag {
        self.ctx.cancel.clone()
    }

    /// Start a run from already-read environment layers.
    ///
    /// Active features are read from the environment layers (last layer
    /// naming `kit.features` wins) and select the kit's feature
    /// overlays. Kit layers merge first, then environment layers, so
    /// the environment always wins.
    #[instrument(skip(self, env_layers), fields(environment = %environment))]
    pub fn load(
        &self,
        environment: EnvironmentName,
        env_layers: Vec<LayerFile>,
    ) -> Result<LoadedRun<S>> {
        self.ctx.check_cancel("load")?;

        let features = declared_features(&env_layers);
        let mut sources = self.ctx.kit.layer_files(&features)?;
        sources.extend(env_layers);

        info!(
            kit = %self.ctx.kit.blueprint().id(),
            layers = sources.len(),
            features = features.len(),
            "loaded layer chain"
        );

        Ok(LoadedRun {
            ctx: self.ctx.clone(),
            environment,
            sources,
        })
    }

    /// Start a run from an environment directory, deriving the file
    /// chain from the environment name (`ops-us-prod` reads `ops.yml`,
    /// `ops-us.yml`, `ops-us-prod.yml`, each optional except the last).
    pub fn load_from_dir(
        &self,
        environment: EnvironmentName,
        dir: impl AsRef<Path>,
    ) -> Result<LoadedRun<S>> {
        let dir = dir.as_ref();
        let chain = environment.file_chain();
        let mut layers = Vec::new();

        for (i, file) in chain.iter().enumerate() {
            let path = dir.join(file);
            let is_most_specific = i == chain.len() - 1;

            if !path.exists() {
                if is_most_specific {
                    return Err(ManifestError::MissingEnvironmentFile {
                        path: path.display().to_string(),
                    });
                }
                continue;
            }

            let content =
                std::fs::read_to_string(&path).map_err(|source| ManifestError::Io {
                    path: path.display().to_string(),
                    source,
                })?;

            layers.push(LayerFile {
                origin: path.display().to_string(),
                content,
            });
        }

        self.load(environment, layers)
    }
}

/// Read the `kit.features` list from raw environment layers; the last
/// layer that names it wins.
fn declared_features(layers: &[LayerFile]) -> Vec<String> {
    let features_path = match NodePath::parse("kit.features") {
        Ok(path) => path,
        Err(_) => return Vec::new(),
    };

    let mut features = Vec::new();

    for layer in layers {
        let Ok(tree) = serde_yaml::from_str::<serde_yaml::Value>(&layer.content) else {
            // Unparseable layers fail properly at the merge stage.
            continue;
        };

        if let Some(list) = gantry_merge::tree::lookup(&tree, &features_path) {
            if let Some(seq) = list.as_sequence() {
                features = seq
                    .iter()
                    .filter_map(serde_yaml::Value::as_str)
                    .map(str::to_string)
                    .collect();
            }
        }
    }

    features
}

/// State: layers assembled, nothing merged yet.
pub struct LoadedRun<S> {
    ctx: RunCtx<S>,
    environment: EnvironmentName,
    sources: Vec<LayerFile>,
}

impl<S> std::fmt::Debug for LoadedRun<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedRun")
            .field("environment", &self.environment)
            .field("sources", &self.sources)
            .finish_non_exhaustive()
    }
}

impl<S: SecretStore + 'static> LoadedRun<S> {
    /// Merge the layer chain. Sequential by design: layer order is
    /// semantically significant.
    #[instrument(skip(self), fields(environment = %self.environment))]
    pub fn merge(self) -> Result<MergedRun<S>> {
        self.ctx.check_cancel("merge")?;

        let layers = self
            .sources
            .iter()
            .enumerate()
            .map(|(index, source)| MergeLayer::from_str(&source.origin, index, &source.content))
            .collect::<gantry_merge::Result<Vec<_>>>()?;

        let document = HierarchicalMerger::with_layers(layers).merge()?;

        // A document with surviving param markers is unusable; fail the
        // run with every marker listed.
        document.ensure_resolved()?;

        let mut builder = FingerprintBuilder::new();
        for source in &self.sources {
            builder = builder.field(&source.origin, source.content.as_bytes());
        }
        let merge_fingerprint = builder.finish();

        Ok(MergedRun {
            ctx: self.ctx,
            environment: self.environment,
            document,
            merge_fingerprint,
        })
    }
}

/// State: one logical document exists.
pub struct MergedRun<S> {
    ctx: RunCtx<S>,
    environment: EnvironmentName,
    document: MergeDocument,
    merge_fingerprint: Fingerprint,
}

impl<S> std::fmt::Debug for MergedRun<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergedRun")
            .field("environment", &self.environment)
            .field("document", &self.document)
            .field("merge_fingerprint", &self.merge_fingerprint)
            .finish_non_exhaustive()
    }
}

impl<S: SecretStore + 'static> MergedRun<S> {
    /// The merged document.
    #[must_use]
    pub fn document(&self) -> &MergeDocument {
        &self.document
    }

    /// Resolve the secret plan from the kit blueprint and the merged
    /// document's active features.
    #[instrument(skip(self), fields(environment = %self.environment))]
    pub fn resolve_plan(self) -> Result<PlanResolvedRun<S>> {
        self.ctx.check_cancel("plan resolution")?;

        let plan = SecretDefinitionParser::parse(self.ctx.kit.blueprint(), &self.document)?;

        Ok(PlanResolvedRun {
            ctx: self.ctx,
            environment: self.environment,
            document: self.document,
            merge_fingerprint: self.merge_fingerprint,
            plan,
        })
    }
}

/// State: the secret plan is known.
pub struct PlanResolvedRun<S> {
    ctx: RunCtx<S>,
    environment: EnvironmentName,
    document: MergeDocument,
    merge_fingerprint: Fingerprint,
    plan: SecretPlan,
}

impl<S: SecretStore + 'static> PlanResolvedRun<S> {
    /// The resolved plan.
    #[must_use]
    pub fn plan(&self) -> &SecretPlan {
        &self.plan
    }

    /// Ensure and validate every secret in the plan, then load the
    /// records needed for rendering.
    ///
    /// Generation runs in parallel across paths (bounded pool); store
    /// calls are the suspension points and retry transient errors.
    /// Problems are aggregated so the caller sees all of them at once.
    #[instrument(skip(self), fields(environment = %self.environment, secrets = self.plan.len()))]
    pub async fn resolve_secrets(self) -> Result<SecretsResolvedRun<S>> {
        self.ctx.check_cancel("secret resolution")?;

        let generator = SecretGenerator::new(
            Arc::clone(&self.ctx.store),
            self.ctx.config.secrets.clone(),
        );

        let report = generator.ensure_all(&self.plan).await?;
        report.into_result()?;

        let validator = SecretValidator::new(
            Arc::clone(&self.ctx.store),
            self.ctx.config.secrets.clone(),
        );

        let validation = validator.validate_plan(&self.plan).await?;
        for (path, health) in validation.warnings() {
            warn!(path = %path, state = %health, "secret is usable but flagged");
        }
        validation.into_result()?;

        let mut records = BTreeMap::new();
        for def in self.plan.iter() {
            let fields = self
                .ctx
                .store
                .read(&def.path)
                .await
                .map_err(gantry_secrets::SecretsError::from)?
                .ok_or_else(|| ManifestError::MissingRecord {
                    path: def.path.to_string(),
                })?;

            records.insert(def.path.clone(), SecretRecord::new(def.path.clone(), fields));
        }

        Ok(SecretsResolvedRun {
            ctx: self.ctx,
            environment: self.environment,
            document: self.document,
            merge_fingerprint: self.merge_fingerprint,
            plan: self.plan,
            records,
        })
    }
}

/// State: every secret exists and validates; variants can render.
pub struct SecretsResolvedRun<S> {
    ctx: RunCtx<S>,
    environment: EnvironmentName,
    document: MergeDocument,
    merge_fingerprint: Fingerprint,
    plan: SecretPlan,
    records: BTreeMap<SecretPath, SecretRecord>,
}

impl<S> std::fmt::Debug for SecretsResolvedRun<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretsResolvedRun")
            .field("environment", &self.environment)
            .field("document", &self.document)
            .field("merge_fingerprint", &self.merge_fingerprint)
            .field("plan", &self.plan)
            .field("records", &self.records)
            .finish_non_exhaustive()
    }
}

impl<S: SecretStore + 'static> SecretsResolvedRun<S> {
    /// The merged document.
    #[must_use]
    pub fn document(&self) -> &MergeDocument {
        &self.document
    }

    /// The satisfied plan.
    #[must_use]
    pub fn plan(&self) -> &SecretPlan {
        &self.plan
    }

    /// Fingerprint of one variant's exact inputs. Variants that ignore
    /// secrets depend only on the merge inputs, so a record rotation
    /// invalidates only the secret-bearing variants.
    fn fingerprint_for(&self, variant: ManifestVariant) -> Result<Fingerprint> {
        let mut builder = FingerprintBuilder::new()
            .field("variant", variant.to_string().as_bytes())
            .field("merge", self.merge_fingerprint.as_str().as_bytes());

        if variant.requires_plan() {
            builder = builder.field("plan", self.plan.fingerprint().as_str().as_bytes());
        }

        if variant.requires_records() {
            for (path, record) in &self.records {
                builder = builder.field(path.as_str(), record.content_hash().as_bytes());
            }
        }

        if variant == ManifestVariant::Entombed {
            let key = self.entomb_key()?;
            builder = builder.field("entomb-key", key.id().as_bytes());
        }

        Ok(builder.finish())
    }

    fn entomb_key(&self) -> Result<EntombKey> {
        let hex_key = self
            .ctx
            .config
            .entomb
            .key_hex
            .as_deref()
            .ok_or(ManifestError::EntombKeyMissing)?;

        EntombKey::from_hex(hex_key)
    }

    /// Render one variant, consulting the cache first.
    #[instrument(skip(self), fields(environment = %self.environment, variant = %variant))]
    pub fn render(&self, variant: ManifestVariant) -> Result<ManifestDocument> {
        self.ctx.check_cancel("render")?;

        let fingerprint = self.fingerprint_for(variant)?;
        let key = CacheKey {
            environment: self.environment.to_string(),
            variant,
            fingerprint: fingerprint.to_string(),
        };

        if let Some(content) = self.ctx.cache.get(&key) {
            return Ok(ManifestDocument::new(
                variant,
                self.environment.clone(),
                content,
                fingerprint,
            ));
        }

        let entomb_key = if variant == ManifestVariant::Entombed {
            Some(self.entomb_key()?)
        } else {
            None
        };

        let inputs = RenderInputs {
            document: &self.document,
            plan: &self.plan,
            records: &self.records,
        };

        let rendered = render::render(
            variant,
            &self.environment,
            &inputs,
            entomb_key.as_ref(),
            fingerprint,
        )?;

        self.ctx.cache.put(key, rendered.content());
        info!(bytes = rendered.content().len(), "rendered manifest");

        Ok(rendered)
    }

    /// The payload a lifecycle-hook runner consumes for a rendered
    /// manifest.
    #[must_use]
    pub fn hook_payload(&self, document: &ManifestDocument) -> HookPayload {
        HookPayload {
            environment: self.environment.to_string(),
            variant: document.variant().to_string(),
            content: document.content().to_string(),
        }
    }

    /// Hand a rendered manifest to a hook runner.
    pub async fn run_hook(
        &self,
        hooks: &dyn LifecycleHooks,
        kind: HookKind,
        document: &ManifestDocument,
    ) -> Result<()> {
        let payload = self.hook_payload(document);
        hooks.on_manifest(kind, &payload).await?;
        Ok(())
    }
}
