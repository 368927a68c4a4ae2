//! Dotted paths into document trees.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{CoreError, Result};

/// A dotted path addressing one node in a document tree.
///
/// Segments are separated by `.`; numeric segments index into sequences,
/// all other segments name map keys: `jobs.0.properties.tls.cert`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodePath {
    segments: Vec<String>,
}

impl NodePath {
    /// Parse a dotted path.
    pub fn parse(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Err(CoreError::InvalidPath {
                path: path.to_string(),
                reason: "path cannot be empty".to_string(),
            });
        }

        let segments: Vec<String> = path.split('.').map(str::to_string).collect();

        if segments.iter().any(String::is_empty) {
            return Err(CoreError::InvalidPath {
                path: path.to_string(),
                reason: "path segments cannot be empty".to_string(),
            });
        }

        Ok(Self { segments })
    }

    /// Build a path from pre-validated segments.
    ///
    /// Empty segment lists are rejected like empty paths.
    pub fn from_segments(segments: Vec<String>) -> Result<Self> {
        if segments.is_empty() || segments.iter().any(String::is_empty) {
            return Err(CoreError::InvalidPath {
                path: segments.join("."),
                reason: "path segments cannot be empty".to_string(),
            });
        }

        Ok(Self { segments })
    }

    /// The path segments in order.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The final segment.
    #[must_use]
    pub fn leaf(&self) -> &str {
        // Construction guarantees at least one segment.
        self.segments.last().map_or("", String::as_str)
    }

    /// The path without its final segment, or `None` at the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() < 2 {
            return None;
        }

        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Extend this path with one more segment.
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// Whether `other` is this path or lies underneath it.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        other.segments.len() >= self.segments.len()
            && self.segments == other.segments[..self.segments.len()]
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl FromStr for NodePath {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for NodePath {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<NodePath> for String {
    fn from(value: NodePath) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let path = NodePath::parse("jobs.api.tls").unwrap();
        assert_eq!(path.segments(), &["jobs", "api", "tls"]);
        assert_eq!(path.to_string(), "jobs.api.tls");
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(NodePath::parse("").is_err());
        assert!(NodePath::parse("a..b").is_err());
        assert!(NodePath::parse(".a").is_err());
    }

    #[test]
    fn test_parent_and_leaf() {
        let path = NodePath::parse("meta.name").unwrap();
        assert_eq!(path.leaf(), "name");
        assert_eq!(path.parent().unwrap().to_string(), "meta");
        assert!(path.parent().unwrap().parent().is_none());
    }

    #[test]
    fn test_child() {
        let path = NodePath::parse("meta").unwrap();
        assert_eq!(path.child("name").to_string(), "meta.name");
    }

    #[test]
    fn test_contains() {
        let root = NodePath::parse("jobs").unwrap();
        let deep = NodePath::parse("jobs.api.tls").unwrap();
        let other = NodePath::parse("meta").unwrap();

        assert!(root.contains(&deep));
        assert!(root.contains(&root));
        assert!(!root.contains(&other));
        assert!(!deep.contains(&root));
    }

    #[test]
    fn test_numeric_segments() {
        let path = NodePath::parse("jobs.0.name").unwrap();
        assert_eq!(path.segments()[1], "0");
    }
}
