//! The merged document: final tree, provenance, and unresolved markers.

use std::collections::BTreeMap;

use gantry_core::NodePath;
use serde_yaml::Value;

use crate::operator::{parse_scalar_op, OpParse, ScalarOp, SecretMarker};
use crate::{tree, MergeError, MergeLayer, Result};

/// A deferred marker that survived merging and evaluation.
///
/// The only markers that can remain unresolved are `(( param ... ))`
/// placeholders no later layer overwrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedMarker {
    /// Where the marker sits in the document.
    pub path: NodePath,
    /// The layer that contributed the marker.
    pub origin: String,
    /// The param message explaining what was expected.
    pub message: String,
}

/// The result of merging an ordered chain of layers.
///
/// Holds the fully merged and evaluated tree, the raw (unevaluated) tree
/// as it stood after the last layer, per-leaf provenance, and any
/// unresolved deferred markers. A document with unresolved markers is in
/// an error state; [`MergeDocument::ensure_resolved`] gates on that.
#[derive(Debug, Clone)]
pub struct MergeDocument {
    tree: Value,
    raw: Value,
    provenance: BTreeMap<NodePath, String>,
    unresolved: Vec<UnresolvedMarker>,
}

impl MergeDocument {
    pub(crate) fn new(
        tree: Value,
        raw: Value,
        provenance: BTreeMap<NodePath, String>,
        unresolved: Vec<UnresolvedMarker>,
    ) -> Self {
        Self {
            tree,
            raw,
            provenance,
            unresolved,
        }
    }

    /// The merged, evaluated tree.
    #[must_use]
    pub fn tree(&self) -> &Value {
        &self.tree
    }

    /// The merged tree before operator evaluation, operators intact.
    #[must_use]
    pub fn raw_tree(&self) -> &Value {
        &self.raw
    }

    /// Look up a value in the evaluated tree.
    #[must_use]
    pub fn lookup(&self, path: &NodePath) -> Option<&Value> {
        tree::lookup(&self.tree, path)
    }

    /// Which layer last set the given path, if tracked.
    #[must_use]
    pub fn provenance_of(&self, path: &NodePath) -> Option<&str> {
        self.provenance.get(path).map(String::as_str)
    }

    /// Full provenance map.
    #[must_use]
    pub fn provenance(&self) -> &BTreeMap<NodePath, String> {
        &self.provenance
    }

    /// Markers that remain unresolved.
    #[must_use]
    pub fn unresolved(&self) -> &[UnresolvedMarker] {
        &self.unresolved
    }

    /// Fail unless every deferred marker was resolved.
    pub fn ensure_resolved(&self) -> Result<()> {
        if self.unresolved.is_empty() {
            Ok(())
        } else {
            Err(MergeError::Unresolved {
                markers: self.unresolved.clone(),
            })
        }
    }

    /// The active feature set: the `kit.features` string sequence, empty
    /// when absent.
    #[must_use]
    pub fn active_features(&self) -> Vec<String> {
        self.tree
            .get("kit")
            .and_then(|kit| kit.get("features"))
            .and_then(Value::as_sequence)
            .map(|seq| {
                seq.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every secret reference in the evaluated tree, with its location.
    #[must_use]
    pub fn secret_markers(&self) -> Vec<(NodePath, SecretMarker)> {
        let mut markers = Vec::new();
        tree::walk_strings(&self.tree, &mut |path, s| {
            if let OpParse::Op(ScalarOp::Secret(marker)) = parse_scalar_op(s) {
                markers.push((path.clone(), marker));
            }
        });
        markers
    }

    /// Serialize the evaluated tree as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.tree)?)
    }

    /// Serialize the raw (unevaluated) tree as YAML.
    pub fn raw_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.raw)?)
    }

    /// Re-package the evaluated tree as a layer, for incremental merges
    /// on top of an already-merged document.
    pub fn into_base_layer(self, origin: impl Into<String>) -> Result<MergeLayer> {
        MergeLayer::new(origin, 0, self.tree)
    }
}
