//! Pure rendering of manifest variants.
//!
//! Every function here is a deterministic function of the merged
//! document, the secret plan, and the secret record set.

use std::collections::BTreeMap;

use gantry_core::{EnvironmentName, Fingerprint};
use gantry_merge::{tree, MergeDocument, SecretMarker};
use gantry_secrets::{SecretPath, SecretRecord};
use serde_yaml::Value;

use crate::entomb::EntombKey;
use crate::{ManifestDocument, ManifestError, ManifestVariant, Result};

/// Placeholder for secret values in the redacted variant.
const REDACTED: &str = "REDACTED";

/// The inputs a render is a pure function of.
pub(crate) struct RenderInputs<'a> {
    pub document: &'a MergeDocument,
    pub plan: &'a gantry_secrets::SecretPlan,
    pub records: &'a BTreeMap<SecretPath, SecretRecord>,
}

/// Render one variant.
pub(crate) fn render(
    variant: ManifestVariant,
    environment: &EnvironmentName,
    inputs: &RenderInputs<'_>,
    entomb_key: Option<&EntombKey>,
    fingerprint: Fingerprint,
) -> Result<ManifestDocument> {
    let content = match variant {
        ManifestVariant::Unevaluated => inputs.document.raw_yaml()?,
        ManifestVariant::Partial => inputs.document.to_yaml()?,
        ManifestVariant::Unredacted
        | ManifestVariant::Redacted
        | ManifestVariant::Vaultified
        | ManifestVariant::Entombed => substituted_content(variant, inputs, entomb_key)?,
    };

    Ok(ManifestDocument::new(
        variant,
        environment.clone(),
        content,
        fingerprint,
    ))
}

fn substituted_content(
    variant: ManifestVariant,
    inputs: &RenderInputs<'_>,
    entomb_key: Option<&EntombKey>,
) -> Result<String> {
    let mut working = inputs.document.tree().clone();

    for (at, marker) in inputs.document.secret_markers() {
        let replacement = replacement_for(variant, &at, &marker, inputs, entomb_key)?;
        tree::set(&mut working, &at, Value::String(replacement));
    }

    Ok(serde_yaml::to_string(&working)?)
}

fn replacement_for(
    variant: ManifestVariant,
    at: &gantry_core::NodePath,
    marker: &SecretMarker,
    inputs: &RenderInputs<'_>,
    entomb_key: Option<&EntombKey>,
) -> Result<String> {
    let path = SecretPath::new(marker.path.clone()).map_err(|_| ManifestError::UnplannedSecret {
        path: marker.path.clone(),
        at: at.to_string(),
    })?;

    // Every reference must be covered by the plan, whatever the variant.
    if inputs.plan.get(&path).is_none() {
        return Err(ManifestError::UnplannedSecret {
            path: marker.path.clone(),
            at: at.to_string(),
        });
    }

    match variant {
        ManifestVariant::Redacted => Ok(REDACTED.to_string()),
        ManifestVariant::Vaultified => Ok(marker.canonical()),
        ManifestVariant::Unredacted | ManifestVariant::Entombed => {
            let record = inputs
                .records
                .get(&path)
                .ok_or_else(|| ManifestError::MissingRecord {
                    path: marker.path.clone(),
                })?;

            let value = record.fields.get(&marker.field).ok_or_else(|| {
                ManifestError::MissingField {
                    path: marker.path.clone(),
                    field: marker.field.clone(),
                    at: at.to_string(),
                }
            })?;

            if variant == ManifestVariant::Unredacted {
                Ok(value.expose().to_string())
            } else {
                let key = entomb_key.ok_or(ManifestError::EntombKeyMissing)?;
                key.seal(&marker.path, &marker.field, value.expose())
            }
        }
        ManifestVariant::Unevaluated | ManifestVariant::Partial => Ok(marker.canonical()),
    }
}
