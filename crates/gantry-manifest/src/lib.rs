//! `Gantry` manifest rendering.
//!
//! Turns a merged document plus a satisfied secret plan into the final
//! deployment document, in several redaction/embedding variants, through
//! a monotonic pipeline:
//!
//! ```text
//! Loaded -> Merged -> PlanResolved -> SecretsResolved -> Rendered(variant)
//! ```
//!
//! Each stage consumes the previous one, so a run can never regress; a
//! failure at any stage aborts the run without emitting a partial
//! manifest. Rendered variants are cached by a content fingerprint of
//! their exact inputs.

mod cache;
mod entomb;
mod error;
mod pipeline;
mod render;
mod variant;

pub use cache::{CacheKey, ManifestCache};
pub use entomb::EntombKey;
pub use error::{ManifestError, Result};
pub use pipeline::{
    CancelFlag, LoadedRun, MergedRun, Pipeline, PlanResolvedRun, SecretsResolvedRun,
};
pub use variant::{ManifestDocument, ManifestVariant};
