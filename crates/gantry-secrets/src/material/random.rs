//! Random strings and unique identifiers.

use rand::rngs::OsRng;
use rand::Rng;
use uuid::Uuid;

use crate::{RandomSpec, SecretFields, SecretValue};

pub(crate) fn generate_string(spec: &RandomSpec) -> SecretFields {
    let alphabet = spec.charset.alphabet();

    let value: String = (0..spec.length)
        .map(|_| {
            let i = OsRng.gen_range(0..alphabet.len());
            alphabet[i] as char
        })
        .collect();

    let mut fields = SecretFields::new();
    fields.insert("value".to_string(), SecretValue::new(value));
    fields
}

pub(crate) fn generate_uuid() -> SecretFields {
    let mut fields = SecretFields::new();
    fields.insert(
        "value".to_string(),
        SecretValue::new(Uuid::new_v4().to_string()),
    );
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Charset;

    #[test]
    fn test_random_length_and_charset() {
        let spec = RandomSpec {
            length: 48,
            charset: Charset::Hex,
        };

        let fields = generate_string(&spec);
        let value = fields.get("value").unwrap().expose();

        assert_eq!(value.len(), 48);
        assert!(value.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_random_values_differ() {
        let spec = RandomSpec {
            length: 32,
            charset: Charset::Alphanumeric,
        };

        let a = generate_string(&spec);
        let b = generate_string(&spec);
        assert_ne!(
            a.get("value").unwrap().expose(),
            b.get("value").unwrap().expose()
        );
    }

    #[test]
    fn test_uuid_is_canonical() {
        let fields = generate_uuid();
        let value = fields.get("value").unwrap().expose();

        assert!(Uuid::parse_str(value).is_ok());
        assert_eq!(value.len(), 36);
    }
}
