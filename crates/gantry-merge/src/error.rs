use gantry_core::NodePath;
use thiserror::Error;

use crate::document::UnresolvedMarker;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Failed to read layer '{origin}': {source}")]
    Io {
        origin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse layer '{origin}': {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Layer '{origin}' must be a map at the top level")]
    LayerNotMapping { origin: String },

    #[error("Layer '{origin}' has a non-string key under '{path}'")]
    NonStringKey { path: String, origin: String },

    #[error(
        "Type conflict at '{path}': layer '{incoming_origin}' supplies a {incoming_kind} \
         but '{existing_origin}' already set a {existing_kind} there"
    )]
    TypeConflict {
        path: String,
        existing_origin: String,
        incoming_origin: String,
        existing_kind: &'static str,
        incoming_kind: &'static str,
    },

    #[error("Invalid operator '{token}' at '{path}' in layer '{origin}': {reason}")]
    InvalidOperator {
        path: String,
        origin: String,
        token: String,
        reason: String,
    },

    #[error(
        "Element {index} at '{path}' in layer '{origin}' is missing the '{key}' field \
         required by (( merge on {key} ))"
    )]
    MergeOnMissingKey {
        path: String,
        origin: String,
        key: String,
        index: usize,
    },

    #[error("(( grab {target} )) at '{at}' references a path that does not exist")]
    GrabTargetMissing { at: NodePath, target: NodePath },

    #[error("(( grab {target} )) at '{at}' references a pruned path")]
    GrabTargetPruned { at: NodePath, target: NodePath },

    #[error("(( concat )) at '{at}' references '{target}', which does not exist")]
    ConcatTargetMissing { at: NodePath, target: NodePath },

    #[error("(( concat )) at '{at}' references '{target}', which is not a scalar")]
    ConcatNotScalar { at: NodePath, target: NodePath },

    #[error("Cyclic operator references involving: {paths}")]
    EvalCycle { paths: String },

    #[error("Document has unresolved markers:\n{}", format_markers(.markers))]
    Unresolved { markers: Vec<UnresolvedMarker> },

    #[error("Failed to serialize document: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

fn format_markers(markers: &[UnresolvedMarker]) -> String {
    markers
        .iter()
        .map(|m| format!("  {} (from {}): {}", m.path, m.origin, m.message))
        .collect::<Vec<_>>()
        .join("\n")
}

pub type Result<T> = std::result::Result<T, MergeError>;
