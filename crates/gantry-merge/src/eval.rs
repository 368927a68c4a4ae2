//! The deferred-evaluation pass.
//!
//! Runs after the last layer merges. Resolves `grab` and `concat` to a
//! fixpoint (they may reference each other), rewrites `defer` to its
//! literal form, and collects surviving `param` markers. `secret`
//! references are left intact for manifest rendering.

use std::collections::BTreeMap;

use gantry_core::NodePath;
use serde_yaml::Value;

use crate::document::UnresolvedMarker;
use crate::operator::{parse_scalar_op, ConcatPart, OpParse, ScalarOp};
use crate::{tree, MergeError, Result};

/// Resolve deferred operators in place. Returns the unresolved `param`
/// markers remaining afterwards.
pub fn evaluate(
    root: &mut Value,
    provenance: &BTreeMap<NodePath, String>,
) -> Result<Vec<UnresolvedMarker>> {
    resolve_references(root)?;
    finalize_markers(root, provenance)
}

/// One `grab`/`concat` site awaiting resolution.
fn collect_deferred(root: &Value) -> Vec<NodePath> {
    let mut sites = Vec::new();
    tree::walk_strings(root, &mut |path, s| {
        if let OpParse::Op(ScalarOp::Grab(_) | ScalarOp::Concat(_)) = parse_scalar_op(s) {
            sites.push(path.clone());
        }
    });
    sites
}

/// Whether a subtree still contains unresolved `grab`/`concat` sites.
fn contains_deferred(value: &Value) -> bool {
    let mut found = false;
    tree::walk_strings(value, &mut |_, s| {
        if let OpParse::Op(ScalarOp::Grab(_) | ScalarOp::Concat(_)) = parse_scalar_op(s) {
            found = true;
        }
    });
    if let Value::String(s) = value {
        if let OpParse::Op(ScalarOp::Grab(_) | ScalarOp::Concat(_)) = parse_scalar_op(s) {
            found = true;
        }
    }
    found
}

fn is_prune_marker(value: &Value) -> bool {
    matches!(
        value,
        Value::String(s) if matches!(parse_scalar_op(s), OpParse::Op(ScalarOp::Prune))
    )
}

/// Iterate `grab`/`concat` resolution to a fixpoint. Each round must
/// resolve at least one site; when a round stalls, the remaining sites
/// either reference genuinely missing paths or form a cycle.
///
/// A target that does not exist *yet* (it sits under a value that is
/// itself still a deferred operator) is not an error mid-fixpoint; it
/// only becomes one once no further progress is possible.
fn resolve_references(root: &mut Value) -> Result<()> {
    loop {
        let sites = collect_deferred(root);
        if sites.is_empty() {
            return Ok(());
        }

        let mut progressed = false;

        for at in &sites {
            // Re-read the site: an earlier resolution in this round may
            // have replaced the subtree it sits in.
            let op = match tree::lookup(root, at) {
                Some(Value::String(s)) => match parse_scalar_op(s) {
                    OpParse::Op(op @ (ScalarOp::Grab(_) | ScalarOp::Concat(_))) => op,
                    _ => continue,
                },
                _ => continue,
            };

            match op {
                ScalarOp::Grab(target) => {
                    let resolved = match tree::lookup(root, &target) {
                        None => None,
                        Some(v) if is_prune_marker(v) => {
                            return Err(MergeError::GrabTargetPruned {
                                at: at.clone(),
                                target,
                            });
                        }
                        Some(v) if contains_deferred(v) => None,
                        Some(v) => Some(v.clone()),
                    };

                    if let Some(value) = resolved {
                        tree::set(root, at, value);
                        progressed = true;
                    }
                }
                ScalarOp::Concat(parts) => {
                    if let Some(joined) = try_concat(root, at, &parts)? {
                        tree::set(root, at, Value::String(joined));
                        progressed = true;
                    }
                }
                _ => {}
            }
        }

        if !progressed {
            return Err(stall_error(root));
        }
    }
}

/// Diagnose a stalled fixpoint: a site whose target truly does not
/// exist reports missing; otherwise the remaining sites form a cycle.
fn stall_error(root: &Value) -> MergeError {
    let remaining = collect_deferred(root);

    for at in &remaining {
        let Some(Value::String(s)) = tree::lookup(root, at) else {
            continue;
        };

        match parse_scalar_op(s) {
            OpParse::Op(ScalarOp::Grab(target)) => {
                if tree::lookup(root, &target).is_none() {
                    return MergeError::GrabTargetMissing {
                        at: at.clone(),
                        target,
                    };
                }
            }
            OpParse::Op(ScalarOp::Concat(parts)) => {
                for part in parts {
                    if let ConcatPart::Ref(target) = part {
                        if tree::lookup(root, &target).is_none() {
                            return MergeError::ConcatTargetMissing {
                                at: at.clone(),
                                target,
                            };
                        }
                    }
                }
            }
            _ => {}
        }
    }

    MergeError::EvalCycle {
        paths: remaining
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", "),
    }
}

/// Resolve a concat if every referenced part is ready. `Ok(None)` means
/// a referenced value is missing or still deferred; try again next
/// round (a genuinely missing target is reported once the fixpoint
/// stalls).
fn try_concat(root: &Value, at: &NodePath, parts: &[ConcatPart]) -> Result<Option<String>> {
    let mut joined = String::new();

    for part in parts {
        match part {
            ConcatPart::Literal(lit) => joined.push_str(lit),
            ConcatPart::Ref(target) => {
                let Some(value) = tree::lookup(root, target) else {
                    return Ok(None);
                };

                if contains_deferred(value) {
                    return Ok(None);
                }

                let Some(s) = tree::scalar_to_string(value) else {
                    return Err(MergeError::ConcatNotScalar {
                        at: at.clone(),
                        target: target.clone(),
                    });
                };

                joined.push_str(&s);
            }
        }
    }

    Ok(Some(joined))
}

/// Rewrite `defer` markers to their literal form and collect surviving
/// `param` markers.
fn finalize_markers(
    root: &mut Value,
    provenance: &BTreeMap<NodePath, String>,
) -> Result<Vec<UnresolvedMarker>> {
    let mut deferred: Vec<(NodePath, String)> = Vec::new();
    let mut params: Vec<UnresolvedMarker> = Vec::new();

    tree::walk_strings(root, &mut |path, s| match parse_scalar_op(s) {
        OpParse::Op(ScalarOp::Defer(text)) => {
            deferred.push((path.clone(), format!("(( {text} ))")));
        }
        OpParse::Op(ScalarOp::Param(message)) => {
            params.push(UnresolvedMarker {
                path: path.clone(),
                origin: origin_of(provenance, path),
                message,
            });
        }
        _ => {}
    });

    for (path, literal) in deferred {
        tree::set(root, &path, Value::String(literal));
    }

    Ok(params)
}

fn origin_of(provenance: &BTreeMap<NodePath, String>, path: &NodePath) -> String {
    if let Some(origin) = provenance.get(path) {
        return origin.clone();
    }

    let mut current = path.parent();
    while let Some(p) = current {
        if let Some(origin) = provenance.get(&p) {
            return origin.clone();
        }
        current = p.parent();
    }

    "unknown layer".to_string()
}
