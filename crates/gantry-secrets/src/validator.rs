//! Secret validation: per-path health checks, aggregated plan-wide.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use gantry_core::SecretsConfig;
use openssl::dh::Dh;
use openssl::pkey::PKey;
use tokio::task::JoinSet;
use tracing::instrument;
use uuid::Uuid;
use x509_parser::certificate::X509Certificate;
use x509_parser::pem::parse_x509_pem;

use crate::{
    CertificateSpec, KeypairSpec, RandomSpec, Result, SecretDefinition, SecretPath, SecretPlan,
    SecretRecord, SecretSpec, SecretStore, SecretsError,
};

const SECONDS_PER_DAY: i64 = 86_400;

/// Health of one stored secret against its definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretHealth {
    /// Present and satisfies every constraint.
    Valid,
    /// No record stored.
    Missing,
    /// Validity window has passed.
    Expired {
        /// Days since `not_after`.
        days_ago: i64,
    },
    /// Valid, but inside the expiry look-ahead margin.
    ExpiringSoon {
        /// Days until `not_after`.
        days_left: i64,
    },
    /// Wrong field set or undecodable encoding.
    Malformed {
        /// What is wrong, one entry per problem.
        reasons: Vec<String>,
    },
    /// Decodes, but fails parameter constraints.
    Weak {
        /// What is wrong, one entry per problem.
        reasons: Vec<String>,
    },
}

impl SecretHealth {
    /// Whether the record can be used as-is (warnings allowed).
    #[must_use]
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Valid | Self::ExpiringSoon { .. })
    }
}

impl fmt::Display for SecretHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => f.write_str("valid"),
            Self::Missing => f.write_str("missing"),
            Self::Expired { days_ago } => write!(f, "expired {days_ago} day(s) ago"),
            Self::ExpiringSoon { days_left } => write!(f, "expiring in {days_left} day(s)"),
            Self::Malformed { reasons } => write!(f, "malformed: {}", reasons.join("; ")),
            Self::Weak { reasons } => write!(f, "weak: {}", reasons.join("; ")),
        }
    }
}

/// Checks stored secrets against their declared shape, expiry, and
/// strength rules.
pub struct SecretValidator<S> {
    store: Arc<S>,
    config: SecretsConfig,
}

impl<S> Clone for SecretValidator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<S: SecretStore + 'static> SecretValidator<S> {
    /// Create a validator over a store.
    pub fn new(store: Arc<S>, config: SecretsConfig) -> Self {
        Self { store, config }
    }

    /// Check one secret.
    #[instrument(skip(self, def), fields(path = %def.path))]
    pub async fn check(&self, def: &SecretDefinition) -> Result<SecretHealth> {
        let Some(fields) = self.store.read(&def.path).await.map_err(SecretsError::from)? else {
            return Ok(SecretHealth::Missing);
        };

        let record = SecretRecord::new(def.path.clone(), fields);

        let missing: Vec<String> = def
            .spec
            .required_fields()
            .iter()
            .filter(|name| !record.has_fields(&[name]))
            .map(|name| format!("field '{name}' is absent or empty"))
            .collect();

        if !missing.is_empty() {
            return Ok(SecretHealth::Malformed { reasons: missing });
        }

        match &def.spec {
            SecretSpec::Certificate(spec) => self.check_certificate(spec, &record).await,
            SecretSpec::Ssh(spec) | SecretSpec::Rsa(spec) => Ok(check_keypair(spec, &record)),
            SecretSpec::DhParams(spec) => Ok(check_dhparams(spec, &record)),
            SecretSpec::Random(spec) => Ok(check_random(spec, &record)),
            SecretSpec::Uuid => Ok(check_uuid(&record)),
            SecretSpec::Provided(_) => Ok(SecretHealth::Valid),
            SecretSpec::Invalid { kind } => Ok(SecretHealth::Malformed {
                reasons: vec![format!("unknown secret kind '{kind}'")],
            }),
        }
    }

    async fn check_certificate(
        &self,
        spec: &CertificateSpec,
        record: &SecretRecord,
    ) -> Result<SecretHealth> {
        let signer_cert_pem = match &spec.signed_by {
            Some(signer_path) => {
                let Some(fields) = self
                    .store
                    .read(signer_path)
                    .await
                    .map_err(SecretsError::from)?
                else {
                    return Ok(SecretHealth::Malformed {
                        reasons: vec![format!("signer record '{signer_path}' not found")],
                    });
                };

                let signer = SecretRecord::new(signer_path.clone(), fields);
                match signer.fields.get("certificate") {
                    Some(value) => Some(value.expose().to_string()),
                    None => {
                        return Ok(SecretHealth::Malformed {
                            reasons: vec![format!(
                                "signer record '{signer_path}' has no certificate field"
                            )],
                        });
                    }
                }
            }
            None => None,
        };

        let lookahead_days =
            i64::try_from(self.config.expiry_lookahead.as_secs()).unwrap_or(i64::MAX)
                / SECONDS_PER_DAY;

        Ok(certificate_health(
            spec,
            record,
            signer_cert_pem.as_deref(),
            lookahead_days,
        ))
    }

    /// Validate every secret in the plan, aggregating results so the
    /// caller sees all problems at once.
    #[instrument(skip(self, plan), fields(secrets = plan.len()))]
    pub async fn validate_plan(&self, plan: &SecretPlan) -> Result<ValidationReport> {
        let mut tasks: JoinSet<(SecretPath, Result<SecretHealth>)> = JoinSet::new();

        for def in plan.iter() {
            let def = def.clone();
            let this = self.clone();
            tasks.spawn(async move {
                let health = this.check(&def).await;
                (def.path, health)
            });
        }

        let mut results = BTreeMap::new();

        while let Some(joined) = tasks.join_next().await {
            let (path, health) = joined.map_err(|e| SecretsError::Generation {
                path: "(worker)".to_string(),
                reason: e.to_string(),
            })?;
            results.insert(path, health?);
        }

        Ok(ValidationReport { results })
    }
}

fn certificate_health(
    spec: &CertificateSpec,
    record: &SecretRecord,
    signer_cert_pem: Option<&str>,
    lookahead_days: i64,
) -> SecretHealth {
    // Field presence was checked up front; decode failures from here on
    // are malformed records.
    let Some(cert_pem) = record.fields.get("certificate") else {
        return SecretHealth::Malformed {
            reasons: vec!["field 'certificate' is absent".to_string()],
        };
    };

    let pem = match parse_x509_pem(cert_pem.expose().as_bytes()) {
        Ok((_, pem)) => pem,
        Err(e) => {
            return SecretHealth::Malformed {
                reasons: vec![format!("certificate is not valid PEM: {e}")],
            };
        }
    };

    let cert = match pem.parse_x509() {
        Ok(cert) => cert,
        Err(e) => {
            return SecretHealth::Malformed {
                reasons: vec![format!("certificate does not decode: {e}")],
            };
        }
    };

    // Expiry dominates every other verdict.
    let now = chrono::Utc::now().timestamp();
    let not_after = cert.validity().not_after.timestamp();
    if not_after < now {
        return SecretHealth::Expired {
            days_ago: (now - not_after) / SECONDS_PER_DAY,
        };
    }

    if let Some(signer_pem) = signer_cert_pem {
        if let Some(health) = check_chain(&cert, signer_pem) {
            return health;
        }
    }

    let mut weak = Vec::new();
    if let Some(private_pem) = record.fields.get("private_key") {
        match PKey::private_key_from_pem(private_pem.expose().as_bytes()) {
            Ok(key) => {
                if let Ok(rsa) = key.rsa() {
                    let bits = rsa.size() * 8;
                    if bits < spec.key_bits {
                        weak.push(format!(
                            "key is {bits} bits, definition requires {}",
                            spec.key_bits
                        ));
                    }
                }
            }
            Err(e) => {
                return SecretHealth::Malformed {
                    reasons: vec![format!("private key does not decode: {e}")],
                };
            }
        }
    }

    if !weak.is_empty() {
        return SecretHealth::Weak { reasons: weak };
    }

    let days_left = (not_after - now) / SECONDS_PER_DAY;
    if days_left < lookahead_days {
        return SecretHealth::ExpiringSoon { days_left };
    }

    SecretHealth::Valid
}

/// Verify the certificate chains to the signer: issuer DN must match the
/// signer's subject, and the signature must verify against the signer's
/// public key. Returns `None` when the chain is sound.
fn check_chain(cert: &X509Certificate<'_>, signer_pem: &str) -> Option<SecretHealth> {
    let signer = match parse_x509_pem(signer_pem.as_bytes()) {
        Ok((_, pem)) => pem,
        Err(e) => {
            return Some(SecretHealth::Malformed {
                reasons: vec![format!("signer certificate is not valid PEM: {e}")],
            });
        }
    };

    let signer_cert = match signer.parse_x509() {
        Ok(cert) => cert,
        Err(e) => {
            return Some(SecretHealth::Malformed {
                reasons: vec![format!("signer certificate does not decode: {e}")],
            });
        }
    };

    if cert.issuer().to_string() != signer_cert.subject().to_string() {
        return Some(SecretHealth::Malformed {
            reasons: vec![format!(
                "issuer '{}' does not match signer subject '{}'",
                cert.issuer(),
                signer_cert.subject()
            )],
        });
    }

    if cert.verify_signature(Some(signer_cert.public_key())).is_err() {
        return Some(SecretHealth::Malformed {
            reasons: vec!["signature does not verify against the signer".to_string()],
        });
    }

    None
}

fn check_keypair(spec: &KeypairSpec, record: &SecretRecord) -> SecretHealth {
    let Some(private_pem) = record.fields.get("private_key") else {
        return SecretHealth::Malformed {
            reasons: vec!["field 'private_key' is absent".to_string()],
        };
    };

    let key = match PKey::private_key_from_pem(private_pem.expose().as_bytes()) {
        Ok(key) => key,
        Err(e) => {
            return SecretHealth::Malformed {
                reasons: vec![format!("private key does not decode: {e}")],
            };
        }
    };

    if let Ok(rsa) = key.rsa() {
        let bits = rsa.size() * 8;
        if bits < spec.key_bits {
            return SecretHealth::Weak {
                reasons: vec![format!(
                    "key is {bits} bits, definition requires {}",
                    spec.key_bits
                )],
            };
        }
    }

    SecretHealth::Valid
}

fn check_dhparams(spec: &KeypairSpec, record: &SecretRecord) -> SecretHealth {
    let Some(pem) = record.fields.get("dhparams") else {
        return SecretHealth::Malformed {
            reasons: vec!["field 'dhparams' is absent".to_string()],
        };
    };

    let dh = match Dh::params_from_pem(pem.expose().as_bytes()) {
        Ok(dh) => dh,
        Err(e) => {
            return SecretHealth::Malformed {
                reasons: vec![format!("parameters do not decode: {e}")],
            };
        }
    };

    let bits = dh.prime_p().num_bits();
    if bits >= 0 && (bits as u32) < spec.key_bits {
        return SecretHealth::Weak {
            reasons: vec![format!(
                "parameters are {bits} bits, definition requires {}",
                spec.key_bits
            )],
        };
    }

    SecretHealth::Valid
}

fn check_random(spec: &RandomSpec, record: &SecretRecord) -> SecretHealth {
    let Some(value) = record.fields.get("value") else {
        return SecretHealth::Malformed {
            reasons: vec!["field 'value' is absent".to_string()],
        };
    };

    let len = value.expose().len();
    if len < spec.length {
        return SecretHealth::Weak {
            reasons: vec![format!(
                "value is {len} characters, definition requires {}",
                spec.length
            )],
        };
    }

    SecretHealth::Valid
}

fn check_uuid(record: &SecretRecord) -> SecretHealth {
    let Some(value) = record.fields.get("value") else {
        return SecretHealth::Malformed {
            reasons: vec!["field 'value' is absent".to_string()],
        };
    };

    match Uuid::parse_str(value.expose()) {
        Ok(_) => SecretHealth::Valid,
        Err(e) => SecretHealth::Malformed {
            reasons: vec![format!("value is not a canonical UUID: {e}")],
        },
    }
}

/// Aggregated validation results for a whole plan.
#[derive(Debug)]
pub struct ValidationReport {
    results: BTreeMap<SecretPath, SecretHealth>,
}

impl ValidationReport {
    /// Health of one path.
    #[must_use]
    pub fn get(&self, path: &SecretPath) -> Option<&SecretHealth> {
        self.results.get(path)
    }

    /// Every result in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = (&SecretPath, &SecretHealth)> {
        self.results.iter()
    }

    /// Paths that cannot be used as-is.
    #[must_use]
    pub fn problems(&self) -> Vec<(&SecretPath, &SecretHealth)> {
        self.results
            .iter()
            .filter(|(_, health)| !health.is_usable())
            .collect()
    }

    /// Non-fatal warnings (expiring soon).
    #[must_use]
    pub fn warnings(&self) -> Vec<(&SecretPath, &SecretHealth)> {
        self.results
            .iter()
            .filter(|(_, health)| matches!(health, SecretHealth::ExpiringSoon { .. }))
            .collect()
    }

    /// Whether every secret is usable.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.problems().is_empty()
    }

    /// Fail with the full problem listing unless healthy.
    pub fn into_result(self) -> Result<()> {
        let problems = self.problems();
        if problems.is_empty() {
            return Ok(());
        }

        let details = problems
            .iter()
            .map(|(path, health)| format!("  {path}: {health}"))
            .collect::<Vec<_>>()
            .join("\n");

        Err(SecretsError::PlanInvalid { details })
    }
}
