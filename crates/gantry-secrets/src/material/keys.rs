//! RSA and SSH key pair generation.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use sha2::{Digest, Sha256};

use super::generation_error;
use crate::{KeypairSpec, Result, SecretFields, SecretPath, SecretValue};

/// Generate an RSA private key, PEM-encoded (PKCS#8).
pub(crate) fn rsa_private_key_pem(path: &SecretPath, bits: u32) -> Result<String> {
    let rsa = Rsa::generate(bits).map_err(|e| generation_error(path, e))?;
    let key = PKey::from_rsa(rsa).map_err(|e| generation_error(path, e))?;

    let pem = key
        .private_key_to_pem_pkcs8()
        .map_err(|e| generation_error(path, e))?;

    String::from_utf8(pem).map_err(|e| generation_error(path, e))
}

/// RSA key pair: PEM private key and SPKI public key.
pub(crate) fn generate_rsa(path: &SecretPath, spec: &KeypairSpec) -> Result<SecretFields> {
    let key = private_key(path, spec.key_bits)?;

    let private_pem = key
        .private_key_to_pem_pkcs8()
        .map_err(|e| generation_error(path, e))?;
    let public_pem = key
        .public_key_to_pem()
        .map_err(|e| generation_error(path, e))?;

    let mut fields = SecretFields::new();
    fields.insert(
        "private_key".to_string(),
        pem_value(path, private_pem)?,
    );
    fields.insert("public_key".to_string(), pem_value(path, public_pem)?);

    Ok(fields)
}

/// SSH key pair: PEM private key, OpenSSH public key line, and SHA-256
/// fingerprint over the public key blob.
pub(crate) fn generate_ssh(path: &SecretPath, spec: &KeypairSpec) -> Result<SecretFields> {
    let key = private_key(path, spec.key_bits)?;

    let private_pem = key
        .private_key_to_pem_pkcs8()
        .map_err(|e| generation_error(path, e))?;

    let blob = ssh_public_blob(path, &key)?;
    let public_line = format!("ssh-rsa {} gantry-generated", BASE64.encode(&blob));
    let fingerprint = format!("SHA256:{}", BASE64.encode(Sha256::digest(&blob)));

    let mut fields = SecretFields::new();
    fields.insert(
        "private_key".to_string(),
        pem_value(path, private_pem)?,
    );
    fields.insert("public_key".to_string(), SecretValue::new(public_line));
    fields.insert("fingerprint".to_string(), SecretValue::new(fingerprint));

    Ok(fields)
}

fn private_key(path: &SecretPath, bits: u32) -> Result<PKey<Private>> {
    let rsa = Rsa::generate(bits).map_err(|e| generation_error(path, e))?;
    PKey::from_rsa(rsa).map_err(|e| generation_error(path, e))
}

fn pem_value(path: &SecretPath, pem: Vec<u8>) -> Result<SecretValue> {
    String::from_utf8(pem)
        .map(SecretValue::new)
        .map_err(|e| generation_error(path, e))
}

/// Assemble the SSH wire-format public key blob: string "ssh-rsa",
/// mpint e, mpint n.
fn ssh_public_blob(path: &SecretPath, key: &PKey<Private>) -> Result<Vec<u8>> {
    let rsa = key.rsa().map_err(|e| generation_error(path, e))?;

    let mut blob = Vec::new();
    write_ssh_string(&mut blob, b"ssh-rsa");
    write_ssh_mpint(&mut blob, &rsa.e().to_vec());
    write_ssh_mpint(&mut blob, &rsa.n().to_vec());

    Ok(blob)
}

fn write_ssh_string(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
    buf.extend_from_slice(data);
}

fn write_ssh_mpint(buf: &mut Vec<u8>, data: &[u8]) {
    let mut trimmed = data;
    while trimmed.len() > 1 && trimmed[0] == 0 && (trimmed[1] & 0x80) == 0 {
        trimmed = &trimmed[1..];
    }

    // A leading high bit would read as negative; pad with a zero byte.
    if trimmed.first().is_some_and(|b| b & 0x80 != 0) {
        buf.extend_from_slice(&((trimmed.len() + 1) as u32).to_be_bytes());
        buf.push(0);
        buf.extend_from_slice(trimmed);
    } else {
        write_ssh_string(buf, trimmed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> SecretPath {
        SecretPath::new("test/key").unwrap()
    }

    #[test]
    fn test_generate_rsa_fields() {
        let fields = generate_rsa(&path(), &KeypairSpec { key_bits: 2048 }).unwrap();

        let private = fields.get("private_key").unwrap().expose().to_string();
        let public = fields.get("public_key").unwrap().expose().to_string();

        assert!(private.contains("BEGIN PRIVATE KEY"));
        assert!(public.contains("BEGIN PUBLIC KEY"));
    }

    #[test]
    fn test_generate_ssh_fields() {
        let fields = generate_ssh(&path(), &KeypairSpec { key_bits: 2048 }).unwrap();

        assert!(fields
            .get("private_key")
            .unwrap()
            .expose()
            .contains("BEGIN PRIVATE KEY"));
        assert!(fields.get("public_key").unwrap().expose().starts_with("ssh-rsa "));
        assert!(fields
            .get("fingerprint")
            .unwrap()
            .expose()
            .starts_with("SHA256:"));
    }

    #[test]
    fn test_keys_are_unique() {
        let spec = KeypairSpec { key_bits: 2048 };
        let a = generate_rsa(&path(), &spec).unwrap();
        let b = generate_rsa(&path(), &spec).unwrap();
        assert_ne!(
            a.get("private_key").unwrap().expose(),
            b.get("private_key").unwrap().expose()
        );
    }

    #[test]
    fn test_ssh_mpint_padding() {
        let mut buf = Vec::new();
        write_ssh_mpint(&mut buf, &[0x80, 0x01]);
        // Length 3: zero pad plus the two bytes.
        assert_eq!(&buf, &[0, 0, 0, 3, 0, 0x80, 0x01]);

        let mut buf = Vec::new();
        write_ssh_mpint(&mut buf, &[0x00, 0x7f]);
        // Leading zero strips; 0x7f needs no pad.
        assert_eq!(&buf, &[0, 0, 0, 1, 0x7f]);
    }
}
