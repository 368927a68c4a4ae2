//! Merge layers: ordered, named configuration sources.

use std::path::Path;

use serde_yaml::Value;

use crate::{MergeError, Result};

/// One ordered configuration source contributing a partial tree.
///
/// Immutable once loaded. The origin identifier appears in every error
/// and provenance entry this layer contributes to.
#[derive(Debug, Clone)]
pub struct MergeLayer {
    origin: String,
    index: usize,
    tree: Value,
}

impl MergeLayer {
    /// Create a layer from an already-parsed tree.
    ///
    /// The tree must be a map (or null, for an empty layer).
    pub fn new(origin: impl Into<String>, index: usize, tree: Value) -> Result<Self> {
        let origin = origin.into();

        match tree {
            Value::Mapping(_) | Value::Null => Ok(Self {
                origin,
                index,
                tree,
            }),
            _ => Err(MergeError::LayerNotMapping { origin }),
        }
    }

    /// Parse a layer from YAML (or JSON, which is a YAML subset) text.
    pub fn from_str(origin: impl Into<String>, index: usize, content: &str) -> Result<Self> {
        let origin = origin.into();

        let tree: Value = serde_yaml::from_str(content).map_err(|source| MergeError::Parse {
            origin: origin.clone(),
            source,
        })?;

        Self::new(origin, index, tree)
    }

    /// Load a layer from a file, using the path as the origin.
    pub fn from_file(index: usize, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let origin = path.display().to_string();

        let content = std::fs::read_to_string(path).map_err(|source| MergeError::Io {
            origin: origin.clone(),
            source,
        })?;

        Self::from_str(origin, index, &content)
    }

    /// The origin identifier for this layer.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// The position of this layer in the merge order.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// The parsed tree.
    #[must_use]
    pub fn tree(&self) -> &Value {
        &self.tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str() {
        let layer = MergeLayer::from_str("base.yml", 0, "a: 1\nb:\n  c: 2\n").unwrap();
        assert_eq!(layer.origin(), "base.yml");
        assert_eq!(layer.index(), 0);
        assert!(layer.tree().get("a").is_some());
    }

    #[test]
    fn test_json_content_parses() {
        let layer = MergeLayer::from_str("base.json", 0, r#"{"a": 1}"#).unwrap();
        assert!(layer.tree().get("a").is_some());
    }

    #[test]
    fn test_empty_layer_is_allowed() {
        let layer = MergeLayer::from_str("empty.yml", 0, "").unwrap();
        assert!(matches!(layer.tree(), Value::Null));
    }

    #[test]
    fn test_scalar_layer_rejected() {
        let result = MergeLayer::from_str("bad.yml", 0, "just a string");
        assert!(matches!(result, Err(MergeError::LayerNotMapping { .. })));
    }

    #[test]
    fn test_invalid_yaml_names_origin() {
        let err = MergeLayer::from_str("broken.yml", 0, "a: [unclosed").unwrap_err();
        assert!(err.to_string().contains("broken.yml"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.yml");
        std::fs::write(&path, "name: test\n").unwrap();

        let layer = MergeLayer::from_file(3, &path).unwrap();
        assert_eq!(layer.index(), 3);
        assert!(layer.origin().ends_with("env.yml"));
    }
}
