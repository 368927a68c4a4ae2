//! Lifecycle hook surface.
//!
//! The pipeline exposes the final manifest content and variant tag; a
//! downstream hook runner consumes them around deploys. Hook execution
//! itself is out of scope.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Lifecycle points a kit can hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookKind {
    /// Runs before the manifest is handed to the infrastructure director.
    PreDeploy,
    /// Runs after the director accepts the manifest.
    PostDeploy,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreDeploy => f.write_str("pre-deploy"),
            Self::PostDeploy => f.write_str("post-deploy"),
        }
    }
}

/// What a hook runner receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookPayload {
    /// Environment the manifest was rendered for.
    pub environment: String,
    /// Manifest variant tag.
    pub variant: String,
    /// Rendered manifest content.
    pub content: String,
}

/// A lifecycle hook runner.
#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    /// Called with the rendered manifest at each lifecycle point.
    async fn on_manifest(&self, kind: HookKind, payload: &HookPayload) -> Result<()>;
}

/// Hook runner that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

#[async_trait]
impl LifecycleHooks for NoopHooks {
    async fn on_manifest(&self, _kind: HookKind, _payload: &HookPayload) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_kind_display() {
        assert_eq!(HookKind::PreDeploy.to_string(), "pre-deploy");
        assert_eq!(HookKind::PostDeploy.to_string(), "post-deploy");
    }

    #[tokio::test]
    async fn test_noop_hooks() {
        let payload = HookPayload {
            environment: "prod".to_string(),
            variant: "redacted".to_string(),
            content: "{}".to_string(),
        };

        assert!(NoopHooks
            .on_manifest(HookKind::PreDeploy, &payload)
            .await
            .is_ok());
    }
}
