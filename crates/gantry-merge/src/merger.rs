//! The hierarchical merger: an order-sensitive fold of layers.

use std::collections::{BTreeMap, BTreeSet};

use gantry_core::NodePath;
use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::operator::{parse_scalar_op, parse_seq_directive, OpParse, ScalarOp, SeqDirective};
use crate::{eval, tree, MergeDocument, MergeError, MergeLayer, Result};

/// Merges an ordered sequence of layers into one [`MergeDocument`].
///
/// Layers are processed strictly in index order; a later layer wins over
/// an earlier one at any path unless an operator defers, prunes, or
/// composes instead of overwriting. Merge failure is fatal: no partial
/// document is ever produced.
#[derive(Debug, Default)]
pub struct HierarchicalMerger {
    layers: Vec<MergeLayer>,
}

struct MergeCtx<'a> {
    origin: &'a str,
    provenance: &'a mut BTreeMap<NodePath, String>,
    prunes: &'a mut BTreeSet<NodePath>,
}

impl HierarchicalMerger {
    /// Start with no layers.
    #[must_use]
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Start from a full layer chain.
    #[must_use]
    pub fn with_layers(layers: Vec<MergeLayer>) -> Self {
        Self { layers }
    }

    /// Add one layer to the chain.
    pub fn add_layer(&mut self, layer: MergeLayer) {
        self.layers.push(layer);
    }

    /// The layers in merge order.
    #[must_use]
    pub fn layers(&self) -> &[MergeLayer] {
        &self.layers
    }

    /// Merge all layers, evaluate deferred operators, and apply prunes.
    pub fn merge(&self) -> Result<MergeDocument> {
        let mut ordered: Vec<&MergeLayer> = self.layers.iter().collect();
        ordered.sort_by_key(|l| l.index());

        let mut root = Value::Mapping(Mapping::new());
        let mut provenance = BTreeMap::new();
        let mut prunes = BTreeSet::new();

        for layer in ordered {
            if matches!(layer.tree(), Value::Null) {
                continue;
            }

            debug!(origin = layer.origin(), index = layer.index(), "merging layer");

            let mut ctx = MergeCtx {
                origin: layer.origin(),
                provenance: &mut provenance,
                prunes: &mut prunes,
            };

            merge_value(&mut root, layer.tree(), &mut Vec::new(), &mut ctx)?;
        }

        let raw = root.clone();

        let unresolved = eval::evaluate(&mut root, &provenance)?;
        prune_pass(&mut root, &prunes, &mut provenance);

        debug!(
            leaves = provenance.len(),
            unresolved = unresolved.len(),
            pruned = prunes.len(),
            "merge complete"
        );

        Ok(MergeDocument::new(root, raw, provenance, unresolved))
    }
}

fn path_from(segments: &[String]) -> Option<NodePath> {
    NodePath::from_segments(segments.to_vec()).ok()
}

fn path_display(segments: &[String]) -> String {
    if segments.is_empty() {
        "(root)".to_string()
    } else {
        segments.join(".")
    }
}

/// Which origin to blame for the existing side of a conflict.
fn existing_origin(
    provenance: &BTreeMap<NodePath, String>,
    segments: &[String],
) -> String {
    if let Some(path) = path_from(segments) {
        if let Some(origin) = provenance.get(&path) {
            return origin.clone();
        }

        // A descendant entry means the subtree was built there.
        if let Some((_, origin)) = provenance.iter().find(|(k, _)| path.contains(k)) {
            return origin.clone();
        }

        // Fall back to the nearest recorded ancestor.
        let mut current = path.parent();
        while let Some(p) = current {
            if let Some(origin) = provenance.get(&p) {
                return origin.clone();
            }
            current = p.parent();
        }
    }

    "earlier layers".to_string()
}

fn clear_provenance_under(provenance: &mut BTreeMap<NodePath, String>, segments: &[String]) {
    match path_from(segments) {
        Some(path) => provenance.retain(|k, _| !path.contains(k)),
        None => provenance.clear(),
    }
}

fn record_provenance(ctx: &mut MergeCtx<'_>, segments: &[String]) {
    if let Some(path) = path_from(segments) {
        ctx.provenance.insert(path, ctx.origin.to_string());
    }
}

fn merge_value(
    existing: &mut Value,
    incoming: &Value,
    segments: &mut Vec<String>,
    ctx: &mut MergeCtx<'_>,
) -> Result<()> {
    match incoming {
        Value::Mapping(incoming_map) => merge_mapping(existing, incoming_map, segments, ctx),
        Value::Sequence(items) => merge_sequence(existing, items, segments, ctx),
        scalar => merge_scalar(existing, scalar, segments, ctx),
    }
}

fn merge_mapping(
    existing: &mut Value,
    incoming: &Mapping,
    segments: &mut Vec<String>,
    ctx: &mut MergeCtx<'_>,
) -> Result<()> {
    match existing {
        Value::Null => *existing = Value::Mapping(Mapping::new()),
        Value::Mapping(_) => {}
        other => {
            return Err(MergeError::TypeConflict {
                path: path_display(segments),
                existing_origin: existing_origin(ctx.provenance, segments),
                incoming_origin: ctx.origin.to_string(),
                existing_kind: tree::kind(other),
                incoming_kind: "map",
            });
        }
    }

    let Value::Mapping(existing_map) = existing else {
        return Ok(());
    };

    for (k, v) in incoming {
        let Some(key) = k.as_str() else {
            return Err(MergeError::NonStringKey {
                path: path_display(segments),
                origin: ctx.origin.to_string(),
            });
        };

        if !existing_map.contains_key(k) {
            existing_map.insert(k.clone(), Value::Null);
        }

        let Some(slot) = existing_map.get_mut(k) else {
            continue;
        };

        segments.push(key.to_string());
        merge_value(slot, v, segments, ctx)?;
        segments.pop();
    }

    Ok(())
}

fn merge_sequence(
    existing: &mut Value,
    items: &[Value],
    segments: &mut Vec<String>,
    ctx: &mut MergeCtx<'_>,
) -> Result<()> {
    let directive = items.first().and_then(parse_seq_directive);
    let payload: &[Value] = if directive.is_some() {
        &items[1..]
    } else {
        items
    };

    match directive {
        None | Some(SeqDirective::Replace) => {
            // Default operator: wholesale overwrite.
            clear_provenance_under(ctx.provenance, segments);
            *existing = Value::Sequence(Vec::with_capacity(payload.len()));
            append_items(existing, payload, segments, ctx)?;
        }
        Some(SeqDirective::Append) => {
            ensure_sequence(existing, segments, ctx)?;
            append_items(existing, payload, segments, ctx)?;
        }
        Some(SeqDirective::Prepend) => {
            ensure_sequence(existing, segments, ctx)?;

            // Build the new items against an empty sequence, then splice
            // the old items behind them.
            let mut head = Value::Sequence(Vec::with_capacity(payload.len()));
            append_items(&mut head, payload, segments, ctx)?;

            if let Value::Sequence(mut head_items) = head {
                if let Value::Sequence(old) = existing {
                    head_items.append(old);
                }
                *existing = Value::Sequence(head_items);
            }
        }
        Some(SeqDirective::MergeOn(key)) => {
            ensure_sequence(existing, segments, ctx)?;
            merge_on_key(existing, payload, &key, segments, ctx)?;
        }
    }

    // The sequence node as a whole was last touched by this layer; leaf
    // provenance inside sequences is not tracked because directives can
    // reorder elements.
    clear_provenance_under(ctx.provenance, segments);
    record_provenance(ctx, segments);

    Ok(())
}

/// Require the existing slot to be a sequence (or create one from null).
fn ensure_sequence(
    existing: &mut Value,
    segments: &[String],
    ctx: &MergeCtx<'_>,
) -> Result<()> {
    match existing {
        Value::Null => {
            *existing = Value::Sequence(Vec::new());
            Ok(())
        }
        Value::Sequence(_) => Ok(()),
        other => Err(MergeError::TypeConflict {
            path: path_display(segments),
            existing_origin: existing_origin(ctx.provenance, segments),
            incoming_origin: ctx.origin.to_string(),
            existing_kind: tree::kind(other),
            incoming_kind: "sequence",
        }),
    }
}

fn append_items(
    existing: &mut Value,
    items: &[Value],
    segments: &mut Vec<String>,
    ctx: &mut MergeCtx<'_>,
) -> Result<()> {
    let Value::Sequence(seq) = existing else {
        return Ok(());
    };

    for item in items {
        seq.push(Value::Null);
        let index = seq.len() - 1;

        let Some(slot) = seq.get_mut(index) else {
            continue;
        };

        segments.push(index.to_string());
        merge_value(slot, item, segments, ctx)?;
        segments.pop();
    }

    Ok(())
}

fn merge_on_key(
    existing: &mut Value,
    items: &[Value],
    key: &str,
    segments: &mut Vec<String>,
    ctx: &mut MergeCtx<'_>,
) -> Result<()> {
    let key_val = Value::String(key.to_string());

    let Value::Sequence(seq) = existing else {
        return Ok(());
    };

    for (i, item) in items.iter().enumerate() {
        let Some(item_map) = item.as_mapping() else {
            return Err(MergeError::InvalidOperator {
                path: path_display(segments),
                origin: ctx.origin.to_string(),
                token: format!("(( merge on {key} ))"),
                reason: format!("element {i} is not a map"),
            });
        };

        let Some(id) = item_map.get(&key_val) else {
            return Err(MergeError::MergeOnMissingKey {
                path: path_display(segments),
                origin: ctx.origin.to_string(),
                key: key.to_string(),
                index: i,
            });
        };

        let position = seq
            .iter()
            .position(|e| e.as_mapping().and_then(|m| m.get(&key_val)) == Some(id));

        let index = match position {
            Some(p) => p,
            None => {
                seq.push(Value::Null);
                seq.len() - 1
            }
        };

        let Some(slot) = seq.get_mut(index) else {
            continue;
        };

        segments.push(index.to_string());
        merge_value(slot, item, segments, ctx)?;
        segments.pop();
    }

    Ok(())
}

fn merge_scalar(
    existing: &mut Value,
    incoming: &Value,
    segments: &mut Vec<String>,
    ctx: &mut MergeCtx<'_>,
) -> Result<()> {
    if let Value::String(s) = incoming {
        match parse_scalar_op(s) {
            OpParse::Invalid(reason) => {
                return Err(MergeError::InvalidOperator {
                    path: path_display(segments),
                    origin: ctx.origin.to_string(),
                    token: s.trim().to_string(),
                    reason,
                });
            }
            OpParse::Op(ScalarOp::Prune) => {
                // Sticky marks survive later overwrites of the value.
                // Paths through sequences are not recorded here because
                // directives can shift element indices; those prunes are
                // picked up by the marker sweep instead.
                let stable = !segments.iter().any(|s| s.parse::<usize>().is_ok());
                if stable {
                    if let Some(path) = path_from(segments) {
                        ctx.prunes.insert(path);
                    }
                }
            }
            _ => {}
        }
    }

    // Default operator: overwrite, regardless of the existing kind.
    clear_provenance_under(ctx.provenance, segments);
    *existing = incoming.clone();
    record_provenance(ctx, segments);

    Ok(())
}

/// Remove pruned paths (sticky marks plus any surviving marker sites),
/// deepest first so shallower removals cannot invalidate deeper paths.
fn prune_pass(
    root: &mut Value,
    sticky: &BTreeSet<NodePath>,
    provenance: &mut BTreeMap<NodePath, String>,
) {
    let mut targets: BTreeSet<NodePath> = sticky.clone();

    tree::walk_strings(root, &mut |path, s| {
        if let OpParse::Op(ScalarOp::Prune) = parse_scalar_op(s) {
            targets.insert(path.clone());
        }
    });

    let mut ordered: Vec<NodePath> = targets.into_iter().collect();
    ordered.sort_by(|a, b| compare_numeric_aware(b, a));

    for path in ordered {
        tree::remove(root, &path);
        provenance.retain(|k, _| !path.contains(k));
    }
}

/// Path ordering that compares numeric segments numerically, so sequence
/// index 10 sorts after index 9 and removals happen highest-index first.
fn compare_numeric_aware(a: &NodePath, b: &NodePath) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    for (sa, sb) in a.segments().iter().zip(b.segments().iter()) {
        let ord = match (sa.parse::<u64>(), sb.parse::<u64>()) {
            (Ok(na), Ok(nb)) => na.cmp(&nb),
            _ => sa.cmp(sb),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    a.segments().len().cmp(&b.segments().len())
}
