//! The closed set of secret kinds and their parameters.
//!
//! Kinds are a tagged enumeration dispatched by exhaustive match; adding
//! a kind is a compile-checked update, not a runtime registration.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::SecretPath;

/// Kind tag for a secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecretKind {
    /// Asymmetric certificate (CA, self-signed, or chain-signed).
    Certificate,
    /// SSH key pair.
    Ssh,
    /// RSA key pair.
    Rsa,
    /// Diffie-Hellman parameters.
    DhParams,
    /// Random string.
    Random,
    /// Unique identifier.
    Uuid,
    /// Supplied by a human; never auto-generated.
    Provided,
    /// Unknown kind carried through for per-path reporting.
    Invalid,
}

impl fmt::Display for SecretKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Certificate => "certificate",
            Self::Ssh => "ssh",
            Self::Rsa => "rsa",
            Self::DhParams => "dhparams",
            Self::Random => "random",
            Self::Uuid => "uuid",
            Self::Provided => "provided",
            Self::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

/// A secret kind with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SecretSpec {
    Certificate(CertificateSpec),
    Ssh(KeypairSpec),
    Rsa(KeypairSpec),
    DhParams(KeypairSpec),
    Random(RandomSpec),
    Uuid,
    Provided(ProvidedSpec),
    Invalid {
        /// The unrecognized kind name, for reporting.
        kind: String,
    },
}

/// Certificate parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CertificateSpec {
    /// Issue as a certificate authority.
    pub is_ca: bool,
    /// Subject common name.
    pub common_name: String,
    /// Subject alternative names (DNS names or IP addresses).
    pub alternative_names: Vec<String>,
    /// Subject organization.
    pub organization: Option<String>,
    /// RSA key size in bits.
    pub key_bits: u32,
    /// Validity window in days.
    pub valid_for_days: u32,
    /// Signer secret path; self-signed when absent.
    pub signed_by: Option<SecretPath>,
}

/// Key-pair and DH-parameter sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeypairSpec {
    /// Key (or prime) size in bits.
    pub key_bits: u32,
}

/// Random string parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RandomSpec {
    /// Number of characters.
    pub length: usize,
    /// Character class to draw from.
    pub charset: Charset,
}

/// Character classes for random strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Charset {
    /// ASCII letters.
    Alpha,
    /// ASCII letters and digits.
    Alphanumeric,
    /// Lowercase hex digits.
    Hex,
    /// Printable ASCII without whitespace.
    Printable,
}

impl Charset {
    /// The characters this class draws from.
    #[must_use]
    pub fn alphabet(self) -> &'static [u8] {
        match self {
            Self::Alpha => b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz",
            Self::Alphanumeric => {
                b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789"
            }
            Self::Hex => b"0123456789abcdef",
            Self::Printable => {
                b"!#$%&()*+,-./0123456789:;<=>?@ABCDEFGHIJKLMNOPQRSTUVWXYZ[]^_\
                  abcdefghijklmnopqrstuvwxyz{|}~"
            }
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "alpha" => Some(Self::Alpha),
            "alphanumeric" => Some(Self::Alphanumeric),
            "hex" => Some(Self::Hex),
            "printable" => Some(Self::Printable),
            _ => None,
        }
    }
}

/// User-supplied secret parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvidedSpec {
    /// What to ask the operator for.
    pub prompt: Option<String>,
}

const MIN_KEY_BITS: u32 = 2048;
const DEFAULT_KEY_BITS: u32 = 2048;
const DEFAULT_VALID_FOR_DAYS: u32 = 365;
const DEFAULT_RANDOM_LENGTH: usize = 32;

impl SecretSpec {
    /// Interpret a raw kind name and parameter map from a blueprint or
    /// manifest declaration.
    ///
    /// Unknown kinds become [`SecretSpec::Invalid`] so they can be
    /// reported per-path instead of failing the whole parse; parameter
    /// errors on known kinds are returned as reasons for the caller to
    /// wrap with path and origin.
    pub fn from_raw(
        kind: &str,
        params: &BTreeMap<String, Value>,
    ) -> std::result::Result<Self, String> {
        match kind.to_lowercase().as_str() {
            "certificate" | "cert" | "x509" => Ok(Self::Certificate(certificate_spec(params)?)),
            "ssh" => Ok(Self::Ssh(keypair_spec(params)?)),
            "rsa" => Ok(Self::Rsa(keypair_spec(params)?)),
            "dhparams" | "dhparam" | "dh" => Ok(Self::DhParams(keypair_spec(params)?)),
            "random" | "password" => Ok(Self::Random(random_spec(params)?)),
            "uuid" => Ok(Self::Uuid),
            "provided" | "user" | "user-provided" => Ok(Self::Provided(ProvidedSpec {
                prompt: get_str(params, "prompt"),
            })),
            other => Ok(Self::Invalid {
                kind: other.to_string(),
            }),
        }
    }

    /// The kind tag.
    #[must_use]
    pub fn kind(&self) -> SecretKind {
        match self {
            Self::Certificate(_) => SecretKind::Certificate,
            Self::Ssh(_) => SecretKind::Ssh,
            Self::Rsa(_) => SecretKind::Rsa,
            Self::DhParams(_) => SecretKind::DhParams,
            Self::Random(_) => SecretKind::Random,
            Self::Uuid => SecretKind::Uuid,
            Self::Provided(_) => SecretKind::Provided,
            Self::Invalid { .. } => SecretKind::Invalid,
        }
    }

    /// The record fields this kind must carry.
    #[must_use]
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Certificate(_) => &["certificate", "private_key", "ca"],
            Self::Ssh(_) => &["private_key", "public_key", "fingerprint"],
            Self::Rsa(_) => &["private_key", "public_key"],
            Self::DhParams(_) => &["dhparams"],
            Self::Random(_) | Self::Uuid | Self::Provided(_) => &["value"],
            Self::Invalid { .. } => &[],
        }
    }

    /// The signer this secret depends on, if any.
    #[must_use]
    pub fn signed_by(&self) -> Option<&SecretPath> {
        match self {
            Self::Certificate(spec) => spec.signed_by.as_ref(),
            _ => None,
        }
    }
}

fn certificate_spec(params: &BTreeMap<String, Value>) -> std::result::Result<CertificateSpec, String> {
    let common_name =
        get_str(params, "common_name").ok_or_else(|| "certificate requires common_name".to_string())?;

    let key_bits = get_bits(params, DEFAULT_KEY_BITS)?;

    let valid_for_days = match get_u64(params, "valid_for") {
        Some(0) => return Err("valid_for must be at least one day".to_string()),
        Some(days) => u32::try_from(days).map_err(|_| "valid_for is out of range".to_string())?,
        None => DEFAULT_VALID_FOR_DAYS,
    };

    let signed_by = match get_str(params, "signed_by") {
        Some(raw) => Some(SecretPath::new(raw).map_err(|e| e.to_string())?),
        None => None,
    };

    Ok(CertificateSpec {
        is_ca: get_bool(params, "is_ca").unwrap_or(false),
        common_name,
        alternative_names: get_str_list(params, "alternative_names"),
        organization: get_str(params, "organization"),
        key_bits,
        valid_for_days,
        signed_by,
    })
}

fn keypair_spec(params: &BTreeMap<String, Value>) -> std::result::Result<KeypairSpec, String> {
    Ok(KeypairSpec {
        key_bits: get_bits(params, DEFAULT_KEY_BITS)?,
    })
}

fn random_spec(params: &BTreeMap<String, Value>) -> std::result::Result<RandomSpec, String> {
    let length = match get_u64(params, "length") {
        Some(0) => return Err("length must be at least 1".to_string()),
        Some(n) => usize::try_from(n).map_err(|_| "length is out of range".to_string())?,
        None => DEFAULT_RANDOM_LENGTH,
    };

    let charset = match get_str(params, "charset") {
        Some(raw) => Charset::parse(&raw).ok_or_else(|| format!("unknown charset '{raw}'"))?,
        None => Charset::Alphanumeric,
    };

    Ok(RandomSpec { length, charset })
}

fn get_bits(params: &BTreeMap<String, Value>, default: u32) -> std::result::Result<u32, String> {
    let bits = match get_u64(params, "key_bits").or_else(|| get_u64(params, "bits")) {
        Some(n) => u32::try_from(n).map_err(|_| "key_bits is out of range".to_string())?,
        None => default,
    };

    if bits < MIN_KEY_BITS {
        return Err(format!("key_bits must be at least {MIN_KEY_BITS}"));
    }

    Ok(bits)
}

fn get_str(params: &BTreeMap<String, Value>, key: &str) -> Option<String> {
    params.get(key).and_then(Value::as_str).map(str::to_string)
}

fn get_u64(params: &BTreeMap<String, Value>, key: &str) -> Option<u64> {
    params.get(key).and_then(Value::as_u64)
}

fn get_bool(params: &BTreeMap<String, Value>, key: &str) -> Option<bool> {
    params.get(key).and_then(Value::as_bool)
}

fn get_str_list(params: &BTreeMap<String, Value>, key: &str) -> Vec<String> {
    params
        .get(key)
        .and_then(Value::as_sequence)
        .map(|seq| {
            seq.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(yaml: &str) -> BTreeMap<String, Value> {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_certificate_from_raw() {
        let spec = SecretSpec::from_raw(
            "certificate",
            &params("common_name: api\nis_ca: true\nvalid_for: 30\nsigned_by: ssl/ca\n"),
        )
        .unwrap();

        let SecretSpec::Certificate(cert) = spec else {
            panic!("wrong kind");
        };
        assert!(cert.is_ca);
        assert_eq!(cert.common_name, "api");
        assert_eq!(cert.valid_for_days, 30);
        assert_eq!(cert.key_bits, 2048);
        assert_eq!(cert.signed_by.unwrap().as_str(), "ssl/ca");
    }

    #[test]
    fn test_certificate_requires_common_name() {
        let result = SecretSpec::from_raw("certificate", &params("is_ca: true\n"));
        assert!(result.is_err());
    }

    #[test]
    fn test_small_keys_rejected() {
        let result = SecretSpec::from_raw(
            "rsa",
            &params("key_bits: 1024\n"),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_kind_aliases() {
        let map = BTreeMap::new();
        assert_eq!(
            SecretSpec::from_raw("dh", &map).unwrap().kind(),
            SecretKind::DhParams
        );
        assert_eq!(
            SecretSpec::from_raw("password", &map).unwrap().kind(),
            SecretKind::Random
        );
        assert_eq!(
            SecretSpec::from_raw("user", &map).unwrap().kind(),
            SecretKind::Provided
        );
    }

    #[test]
    fn test_unknown_kind_is_invalid_not_error() {
        let spec = SecretSpec::from_raw("blockchain", &BTreeMap::new()).unwrap();
        assert_eq!(spec.kind(), SecretKind::Invalid);
        assert!(matches!(spec, SecretSpec::Invalid { kind } if kind == "blockchain"));
    }

    #[test]
    fn test_random_defaults() {
        let spec = SecretSpec::from_raw("random", &BTreeMap::new()).unwrap();
        let SecretSpec::Random(random) = spec else {
            panic!("wrong kind");
        };
        assert_eq!(random.length, 32);
        assert_eq!(random.charset, Charset::Alphanumeric);
    }

    #[test]
    fn test_random_zero_length_rejected() {
        assert!(SecretSpec::from_raw("random", &params("length: 0\n")).is_err());
    }

    #[test]
    fn test_charset_alphabets_are_distinct() {
        assert!(Charset::Hex.alphabet().len() == 16);
        assert!(Charset::Alpha.alphabet().len() == 52);
        assert!(Charset::Alphanumeric.alphabet().len() == 62);
    }

    #[test]
    fn test_required_fields_by_kind() {
        let cert = SecretSpec::from_raw("certificate", &params("common_name: x\n")).unwrap();
        assert!(cert.required_fields().contains(&"private_key"));

        let uuid = SecretSpec::from_raw("uuid", &BTreeMap::new()).unwrap();
        assert_eq!(uuid.required_fields(), &["value"]);
    }
}
