//! `Gantry` hierarchical merge engine.
//!
//! Resolves an ordered chain of configuration layers into one logical
//! document. Later layers win on conflicts unless an operator says
//! otherwise.
//!
//! ## Operators
//!
//! Scalar position:
//! - `(( grab meta.name ))` — copy a value from elsewhere in the merged
//!   document, resolved after the last layer
//! - `(( concat "api." meta.domain ))` — string concatenation of literals
//!   and references
//! - `(( param "set me in an environment file" ))` — must be overwritten
//!   by a later layer; surviving params fail resolution
//! - `(( defer <text> ))` — emit `(( <text> ))` literally for downstream
//!   tooling
//! - `(( secret db/creds:password ))` — secret reference, consumed by
//!   manifest rendering
//! - `(( prune ))` — remove this path after all layers merge
//!
//! Sequence directives (first element of a sequence value):
//! `(( append ))`, `(( prepend ))`, `(( merge on <key> ))`, `(( replace ))`.

mod document;
mod error;
mod eval;
mod layer;
mod merger;
mod operator;
pub mod tree;

pub use document::{MergeDocument, UnresolvedMarker};
pub use error::{MergeError, Result};
pub use layer::MergeLayer;
pub use merger::HierarchicalMerger;
pub use operator::{ScalarOp, SecretMarker, SeqDirective};
