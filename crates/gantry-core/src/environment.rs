//! Environment names and their configuration-file chains.
//!
//! An environment name is a dash-separated hierarchy (`ops-us-east-prod`).
//! Each prefix of the hierarchy may contribute a configuration file, most
//! general first, so `ops.yml` is merged before `ops-us.yml`, and so on
//! down to the full name.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{CoreError, Result};

/// A validated environment name.
///
/// Names are lowercase, dash-separated, and each dash-separated segment is
/// non-empty and starts with an alphanumeric character.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EnvironmentName(String);

impl EnvironmentName {
    /// Create a new environment name, validating its shape.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();

        if name.is_empty() {
            return Err(CoreError::InvalidEnvironmentName {
                name,
                reason: "name cannot be empty".to_string(),
            });
        }

        for segment in name.split('-') {
            if segment.is_empty() {
                return Err(CoreError::InvalidEnvironmentName {
                    name: name.clone(),
                    reason: "segments between dashes cannot be empty".to_string(),
                });
            }

            if !segment
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            {
                return Err(CoreError::InvalidEnvironmentName {
                    name: name.clone(),
                    reason: format!("segment '{segment}' contains invalid characters"),
                });
            }
        }

        Ok(Self(name))
    }

    /// The name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive the hierarchical configuration-file chain for this
    /// environment, most general first.
    ///
    /// `ops-us-east` yields `["ops.yml", "ops-us.yml", "ops-us-east.yml"]`.
    /// Files earlier in the chain are merged first, so the most specific
    /// file wins on conflicts.
    #[must_use]
    pub fn file_chain(&self) -> Vec<String> {
        let segments: Vec<&str> = self.0.split('-').collect();

        (1..=segments.len())
            .map(|n| format!("{}.yml", segments[..n].join("-")))
            .collect()
    }
}

impl fmt::Display for EnvironmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EnvironmentName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for EnvironmentName {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<EnvironmentName> for String {
    fn from(value: EnvironmentName) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(EnvironmentName::new("prod").is_ok());
        assert!(EnvironmentName::new("ops-us-east-prod").is_ok());
        assert!(EnvironmentName::new("lab2-west").is_ok());
    }

    #[test]
    fn test_invalid_names() {
        assert!(EnvironmentName::new("").is_err());
        assert!(EnvironmentName::new("Prod").is_err());
        assert!(EnvironmentName::new("a--b").is_err());
        assert!(EnvironmentName::new("-lead").is_err());
        assert!(EnvironmentName::new("trail-").is_err());
        assert!(EnvironmentName::new("has space").is_err());
    }

    #[test]
    fn test_file_chain() {
        let env = EnvironmentName::new("ops-us-east-prod").unwrap();
        assert_eq!(
            env.file_chain(),
            vec![
                "ops.yml".to_string(),
                "ops-us.yml".to_string(),
                "ops-us-east.yml".to_string(),
                "ops-us-east-prod.yml".to_string(),
            ]
        );
    }

    #[test]
    fn test_file_chain_single_segment() {
        let env = EnvironmentName::new("prod").unwrap();
        assert_eq!(env.file_chain(), vec!["prod.yml".to_string()]);
    }

    #[test]
    fn test_serde_round_trip() {
        let env = EnvironmentName::new("ops-prod").unwrap();
        let yaml = serde_yaml::to_string(&env).unwrap();
        let back: EnvironmentName = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(env, back);
    }

    #[test]
    fn test_serde_rejects_invalid() {
        let result: std::result::Result<EnvironmentName, _> = serde_yaml::from_str("BAD NAME");
        assert!(result.is_err());
    }
}
