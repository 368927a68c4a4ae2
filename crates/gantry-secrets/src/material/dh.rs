//! Diffie-Hellman parameter generation.
//!
//! Prime generation at 2048+ bits takes tens of seconds of CPU; callers
//! run this on the blocking pool, and unrelated paths generate in
//! parallel.

use openssl::dh::Dh;
use tracing::info;

use super::generation_error;
use crate::{KeypairSpec, Result, SecretFields, SecretPath, SecretValue};

const GENERATOR: u32 = 2;

pub(crate) fn generate(path: &SecretPath, spec: &KeypairSpec) -> Result<SecretFields> {
    info!(
        path = %path,
        bits = spec.key_bits,
        "generating DH parameters (this can take a while)"
    );

    let dh = Dh::generate_params(spec.key_bits, GENERATOR)
        .map_err(|e| generation_error(path, e))?;

    let pem = dh.params_to_pem().map_err(|e| generation_error(path, e))?;
    let pem = String::from_utf8(pem).map_err(|e| generation_error(path, e))?;

    let mut fields = SecretFields::new();
    fields.insert("dhparams".to_string(), SecretValue::new(pem));

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2048-bit generation is too slow for unit tests; the validator's
    // minimum-size rule is exercised separately against fixed inputs.
    #[test]
    #[ignore = "slow: generates real DH parameters"]
    fn test_generate_dhparams() {
        let path = SecretPath::new("test/dh").unwrap();
        let fields = generate(&path, &KeypairSpec { key_bits: 2048 }).unwrap();

        let pem = fields.get("dhparams").unwrap().expose();
        assert!(pem.contains("BEGIN DH PARAMETERS"));
    }
}
