//! Kit source contract and the bundled implementations.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::debug;

use crate::{Blueprint, KitError, Result};

/// One layer file a kit contributes to a merge, already read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerFile {
    /// Origin identifier carried into merge provenance and errors.
    pub origin: String,
    /// Raw YAML/JSON content.
    pub content: String,
}

/// A source of kit blueprints and layer files.
///
/// Kit retrieval (archives, registries) is out of scope; implementations
/// only need to serve an already-available kit.
pub trait KitSource: Send + Sync {
    /// The kit's blueprint.
    fn blueprint(&self) -> &Blueprint;

    /// The kit's layer files for the given active features: base files
    /// first, then each active feature's overlays in blueprint order.
    fn layer_files(&self, features: &[String]) -> Result<Vec<LayerFile>>;
}

/// A kit unpacked into a directory: `kit.yml` plus a `layers/` tree.
#[derive(Debug)]
pub struct DirKit {
    root: PathBuf,
    blueprint: Blueprint,
}

impl DirKit {
    /// Open a kit directory and parse its blueprint.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let blueprint_path = root.join("kit.yml");

        let content =
            std::fs::read_to_string(&blueprint_path).map_err(|source| KitError::Io {
                path: blueprint_path.display().to_string(),
                source,
            })?;

        let blueprint = Blueprint::from_yaml(&content)?;
        debug!(kit = %blueprint.id(), root = %root.display(), "opened kit directory");

        Ok(Self { root, blueprint })
    }
}

impl KitSource for DirKit {
    fn blueprint(&self) -> &Blueprint {
        &self.blueprint
    }

    fn layer_files(&self, features: &[String]) -> Result<Vec<LayerFile>> {
        let mut files = Vec::new();

        for file in self.blueprint.layer_files_for(features) {
            let path = self.root.join("layers").join(&file);

            let content = std::fs::read_to_string(&path).map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    KitError::MissingLayerFile {
                        kit: self.blueprint.id(),
                        file: file.clone(),
                    }
                } else {
                    KitError::Io {
                        path: path.display().to_string(),
                        source,
                    }
                }
            })?;

            files.push(LayerFile {
                origin: format!("{}:{}", self.blueprint.id(), file),
                content,
            });
        }

        Ok(files)
    }
}

/// An in-memory kit, for tests and embedded defaults.
#[derive(Debug)]
pub struct MemoryKit {
    blueprint: Blueprint,
    files: HashMap<String, String>,
}

impl MemoryKit {
    /// Create a kit from a blueprint and its layer file contents.
    #[must_use]
    pub fn new(blueprint: Blueprint, files: HashMap<String, String>) -> Self {
        Self { blueprint, files }
    }
}

impl KitSource for MemoryKit {
    fn blueprint(&self) -> &Blueprint {
        &self.blueprint
    }

    fn layer_files(&self, features: &[String]) -> Result<Vec<LayerFile>> {
        self.blueprint
            .layer_files_for(features)
            .into_iter()
            .map(|file| {
                self.files
                    .get(&file)
                    .map(|content| LayerFile {
                        origin: format!("{}:{}", self.blueprint.id(), file),
                        content: content.clone(),
                    })
                    .ok_or_else(|| KitError::MissingLayerFile {
                        kit: self.blueprint.id(),
                        file,
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blueprint() -> Blueprint {
        Blueprint::from_yaml(
            r"
name: demo
version: 1.0.0
layers:
  base:
    - base.yml
  features:
    tls:
      - tls.yml
",
        )
        .unwrap()
    }

    #[test]
    fn test_memory_kit_serves_base_and_features() {
        let mut files = HashMap::new();
        files.insert("base.yml".to_string(), "a: 1\n".to_string());
        files.insert("tls.yml".to_string(), "tls: true\n".to_string());

        let kit = MemoryKit::new(blueprint(), files);

        let base_only = kit.layer_files(&[]).unwrap();
        assert_eq!(base_only.len(), 1);
        assert_eq!(base_only[0].origin, "demo/1.0.0:base.yml");

        let with_tls = kit.layer_files(&["tls".to_string()]).unwrap();
        assert_eq!(with_tls.len(), 2);
        assert_eq!(with_tls[1].content, "tls: true\n");
    }

    #[test]
    fn test_memory_kit_missing_file() {
        let kit = MemoryKit::new(blueprint(), HashMap::new());
        let result = kit.layer_files(&[]);
        assert!(matches!(result, Err(KitError::MissingLayerFile { .. })));
    }

    #[test]
    fn test_dir_kit_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        std::fs::write(
            root.join("kit.yml"),
            "name: demo\nversion: 1.0.0\nlayers:\n  base:\n    - base.yml\n",
        )
        .unwrap();
        std::fs::create_dir_all(root.join("layers")).unwrap();
        std::fs::write(root.join("layers/base.yml"), "a: 1\n").unwrap();

        let kit = DirKit::open(root).unwrap();
        assert_eq!(kit.blueprint().name, "demo");

        let files = kit.layer_files(&[]).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].content, "a: 1\n");
    }

    #[test]
    fn test_dir_kit_missing_blueprint() {
        let dir = tempfile::tempdir().unwrap();
        let result = DirKit::open(dir.path());
        assert!(matches!(result, Err(KitError::Io { .. })));
    }

    #[test]
    fn test_dir_kit_missing_layer_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("kit.yml"),
            "name: demo\nversion: 1.0.0\nlayers:\n  base:\n    - gone.yml\n",
        )
        .unwrap();

        let kit = DirKit::open(dir.path()).unwrap();
        let result = kit.layer_files(&[]);
        assert!(matches!(result, Err(KitError::MissingLayerFile { .. })));
    }
}
