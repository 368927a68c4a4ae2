//! Certificate issuance.
//!
//! Key pairs are RSA, sized per the definition; issuance goes through
//! rcgen. Chain-signed certificates re-derive the issuer identity from
//! the signer's stored record, so the leaf verifies against the stored
//! CA certificate.

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    PKCS_RSA_SHA256,
};
use time::{Duration, OffsetDateTime};

use super::{generation_error, keys};
use crate::{CertificateSpec, Result, SecretFields, SecretPath, SecretRecord, SecretValue};

pub(crate) fn generate(
    path: &SecretPath,
    spec: &CertificateSpec,
    signer: Option<&SecretRecord>,
) -> Result<SecretFields> {
    let key_pem = keys::rsa_private_key_pem(path, spec.key_bits)?;
    let key_pair = KeyPair::from_pem_and_sign_algo(&key_pem, &PKCS_RSA_SHA256)
        .map_err(|e| generation_error(path, e))?;

    let params = build_params(path, spec)?;

    let (cert_pem, ca_pem) = match signer {
        Some(record) => {
            let signer_cert = record
                .field("certificate")
                .map_err(|e| generation_error(path, e))?
                .expose()
                .to_string();
            let signer_key = record
                .field("private_key")
                .map_err(|e| generation_error(path, e))?;

            let issuer_key = KeyPair::from_pem_and_sign_algo(signer_key.expose(), &PKCS_RSA_SHA256)
                .map_err(|e| generation_error(path, e))?;

            // Recreate the issuer identity from the stored CA so the
            // leaf's issuer DN and signature match that record.
            let issuer_params = CertificateParams::from_ca_cert_pem(&signer_cert)
                .map_err(|e| generation_error(path, e))?;
            let issuer = issuer_params
                .self_signed(&issuer_key)
                .map_err(|e| generation_error(path, e))?;

            let cert = params
                .signed_by(&key_pair, &issuer, &issuer_key)
                .map_err(|e| generation_error(path, e))?;

            (cert.pem(), signer_cert)
        }
        None => {
            let cert = params
                .self_signed(&key_pair)
                .map_err(|e| generation_error(path, e))?;
            let pem = cert.pem();
            (pem.clone(), pem)
        }
    };

    let mut fields = SecretFields::new();
    fields.insert("certificate".to_string(), SecretValue::new(cert_pem));
    fields.insert("private_key".to_string(), SecretValue::new(key_pem));
    fields.insert("ca".to_string(), SecretValue::new(ca_pem));

    Ok(fields)
}

fn build_params(path: &SecretPath, spec: &CertificateSpec) -> Result<CertificateParams> {
    let mut params = CertificateParams::new(spec.alternative_names.clone())
        .map_err(|e| generation_error(path, e))?;

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, spec.common_name.clone());
    if let Some(org) = &spec.organization {
        dn.push(DnType::OrganizationName, org.clone());
    }
    params.distinguished_name = dn;

    if spec.is_ca {
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    }

    params.not_before = OffsetDateTime::now_utc();
    params.not_after = params.not_before + Duration::days(i64::from(spec.valid_for_days));

    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> SecretPath {
        SecretPath::new(s).unwrap()
    }

    fn ca_spec() -> CertificateSpec {
        CertificateSpec {
            is_ca: true,
            common_name: "testCA".to_string(),
            alternative_names: vec![],
            organization: Some("gantry".to_string()),
            key_bits: 2048,
            valid_for_days: 365,
            signed_by: None,
        }
    }

    #[test]
    fn test_self_signed_certificate_fields() {
        let fields = generate(&path("ssl/ca"), &ca_spec(), None).unwrap();

        let cert = fields.get("certificate").unwrap().expose();
        let key = fields.get("private_key").unwrap().expose();
        let ca = fields.get("ca").unwrap().expose();

        assert!(cert.contains("BEGIN CERTIFICATE"));
        assert!(key.contains("BEGIN PRIVATE KEY"));
        // Self-signed certs are their own CA.
        assert_eq!(cert, ca);
    }

    #[test]
    fn test_chain_signed_certificate() {
        let ca_path = path("ssl/ca");
        let ca_fields = generate(&ca_path, &ca_spec(), None).unwrap();
        let ca_record = SecretRecord::new(ca_path, ca_fields);

        let leaf_spec = CertificateSpec {
            is_ca: false,
            common_name: "api.internal".to_string(),
            alternative_names: vec!["api.internal".to_string(), "10.0.0.1".to_string()],
            organization: None,
            key_bits: 2048,
            valid_for_days: 90,
            signed_by: Some(SecretPath::new("ssl/ca").unwrap()),
        };

        let fields = generate(&path("api/cert"), &leaf_spec, Some(&ca_record)).unwrap();

        let cert = fields.get("certificate").unwrap().expose();
        let ca = fields.get("ca").unwrap().expose();

        assert!(cert.contains("BEGIN CERTIFICATE"));
        // The ca field carries the signer's stored certificate.
        assert_eq!(ca, ca_record.field("certificate").unwrap().expose());
        assert_ne!(cert, ca);
    }

    #[test]
    fn test_missing_signer_field_fails() {
        let record = SecretRecord::new(path("ssl/ca"), SecretFields::new());

        let spec = CertificateSpec {
            signed_by: Some(SecretPath::new("ssl/ca").unwrap()),
            ..ca_spec()
        };

        assert!(generate(&path("api/cert"), &spec, Some(&record)).is_err());
    }
}
