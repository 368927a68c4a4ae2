//! Tree navigation helpers over `serde_yaml::Value`.

use gantry_core::NodePath;
use serde_yaml::Value;

/// Human-readable kind name for error messages.
pub fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) | Value::Number(_) | Value::String(_) => "scalar",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "map",
        Value::Tagged(_) => "tagged value",
    }
}

fn step<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Mapping(map) => map.get(&Value::String(segment.to_string())),
        Value::Sequence(seq) => segment.parse::<usize>().ok().and_then(|i| seq.get(i)),
        _ => None,
    }
}

fn step_mut<'a>(value: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match value {
        Value::Mapping(map) => map.get_mut(&Value::String(segment.to_string())),
        Value::Sequence(seq) => segment
            .parse::<usize>()
            .ok()
            .and_then(move |i| seq.get_mut(i)),
        _ => None,
    }
}

/// Look up the value at a path.
pub fn lookup<'a>(root: &'a Value, path: &NodePath) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.segments() {
        current = step(current, segment)?;
    }
    Some(current)
}

/// Replace the value at an existing path. Returns false when the path
/// does not exist.
pub fn set(root: &mut Value, path: &NodePath, value: Value) -> bool {
    let mut current = root;
    for segment in path.segments() {
        match step_mut(current, segment) {
            Some(next) => current = next,
            None => return false,
        }
    }
    *current = value;
    true
}

/// Remove the node at a path. Returns false when the path does not exist.
pub fn remove(root: &mut Value, path: &NodePath) -> bool {
    let Some(parent_segments) = path.segments().len().checked_sub(1) else {
        return false;
    };

    let mut current = root;
    for segment in &path.segments()[..parent_segments] {
        match step_mut(current, segment) {
            Some(next) => current = next,
            None => return false,
        }
    }

    let leaf = path.leaf();
    match current {
        Value::Mapping(map) => map.remove(&Value::String(leaf.to_string())).is_some(),
        Value::Sequence(seq) => match leaf.parse::<usize>() {
            Ok(i) if i < seq.len() => {
                seq.remove(i);
                true
            }
            _ => false,
        },
        _ => false,
    }
}

/// Visit every string scalar in the tree, with its path.
pub fn walk_strings<F>(root: &Value, f: &mut F)
where
    F: FnMut(&NodePath, &str),
{
    fn inner<F: FnMut(&NodePath, &str)>(value: &Value, segments: &mut Vec<String>, f: &mut F) {
        match value {
            Value::String(s) => {
                if let Ok(path) = NodePath::from_segments(segments.clone()) {
                    f(&path, s);
                }
            }
            Value::Mapping(map) => {
                for (k, v) in map {
                    if let Some(key) = k.as_str() {
                        segments.push(key.to_string());
                        inner(v, segments, f);
                        segments.pop();
                    }
                }
            }
            Value::Sequence(seq) => {
                for (i, v) in seq.iter().enumerate() {
                    segments.push(i.to_string());
                    inner(v, segments, f);
                    segments.pop();
                }
            }
            _ => {}
        }
    }

    let mut segments = Vec::new();
    inner(root, &mut segments, f);
}

/// Render a scalar as the string it concatenates to.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
