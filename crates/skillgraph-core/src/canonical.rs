//! Canonical JSON encoding for deterministic signing.
//!
//! Documents are encoded with deterministic rules:
//! - Object keys: sorted by their UTF-8 bytes
//! - Arrays: element order preserved
//! - Scalars: standard JSON literal form
//! - No insignificant whitespace
//!
//! **CRITICAL**: This encoding is FROZEN. Changes break all existing signatures
//! and every content-addressed certificate id.

use serde::Serialize;
use serde_json::Value;

use crate::crypto::{Ed25519PublicKey, Ed25519Signature, Keypair};
use crate::error::{CoreError, Result};

/// Encode a JSON value to canonical bytes.
pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    let mut out = Vec::with_capacity(128);
    write_value(value, &mut out);
    out
}

/// Encode any serializable value to canonical bytes.
pub fn to_canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(value).map_err(|e| CoreError::EncodingError(e.to_string()))?;
    Ok(canonical_bytes(&value))
}

/// Canonical encoding as a UTF-8 string.
pub fn canonical_string(value: &Value) -> String {
    // Every byte written below comes from `str` data or JSON literals.
    String::from_utf8_lossy(&canonical_bytes(value)).into_owned()
}

fn write_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

            out.push(b'{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_string(key, out);
                out.push(b':');
                write_value(item, out);
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(item, out);
            }
            out.push(b']');
        }
        Value::String(s) => write_string(s, out),
        scalar => out.extend_from_slice(scalar.to_string().as_bytes()),
    }
}

fn write_string(s: &str, out: &mut Vec<u8>) {
    // serde_json's Display for strings applies standard JSON escaping.
    out.extend_from_slice(Value::String(s.to_owned()).to_string().as_bytes());
}

/// Sign the canonical encoding of a value.
pub fn sign(value: &Value, keypair: &Keypair) -> Ed25519Signature {
    keypair.sign(&canonical_bytes(value))
}

/// Verify a base64 signature over the canonical encoding of a value.
///
/// Never fails: malformed signatures, wrong-length keys and mismatches all
/// yield `false`.
pub fn verify(value: &Value, signature_b64: &str, public_key: &Ed25519PublicKey) -> bool {
    let signature = match Ed25519Signature::from_base64(signature_b64) {
        Ok(sig) => sig,
        Err(e) => {
            tracing::debug!(error = %e, "rejecting undecodable signature");
            return false;
        }
    };
    public_key
        .verify(&canonical_bytes(value), &signature)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_keys_are_sorted() {
        let value = json!({"b": 1, "a": {"d": [3, {"z": true, "y": null}], "c": "x"}});
        assert_eq!(
            canonical_string(&value),
            r#"{"a":{"c":"x","d":[3,{"y":null,"z":true}]},"b":1}"#
        );
    }

    #[test]
    fn test_array_order_preserved() {
        let value = json!([3, 1, 2]);
        assert_eq!(canonical_string(&value), "[3,1,2]");
    }

    #[test]
    fn test_string_escaping() {
        let value = json!({"q": "say \"hi\"\n"});
        assert_eq!(canonical_string(&value), r#"{"q":"say \"hi\"\n"}"#);
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let keypair = Keypair::from_seed(&[7u8; 32]);
        let doc = json!({"skill": "React", "level": 7});
        let sig = sign(&doc, &keypair);

        assert!(verify(&doc, &sig.to_base64(), &keypair.public_key()));

        let tampered = json!({"skill": "React", "level": 8});
        assert!(!verify(&tampered, &sig.to_base64(), &keypair.public_key()));
    }

    #[test]
    fn test_verify_never_fails_on_garbage() {
        let keypair = Keypair::from_seed(&[7u8; 32]);
        let doc = json!({"a": 1});
        assert!(!verify(&doc, "not base64!!", &keypair.public_key()));
        assert!(!verify(&doc, "", &keypair.public_key()));
        assert!(!verify(&doc, "AAAA", &keypair.public_key()));
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            any::<f64>().prop_filter("finite", |f| f.is_finite()).prop_map(|f| json!(f)),
            "[a-zA-Z0-9 ]{0,12}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::vec(("[a-z]{1,6}", inner), 0..6).prop_map(|entries| {
                    Value::Object(entries.into_iter().collect())
                }),
            ]
        })
    }

    #[test]
    fn test_float_literals() {
        let doc = json!({"b": 72.5, "a": 1.0e-7, "c": -0.0, "d": 78.0});
        assert_eq!(canonical_string(&doc), r#"{"a":1e-7,"b":72.5,"c":-0.0,"d":78.0}"#);
    }

    proptest! {
        #[test]
        fn test_canonical_survives_roundtrip(value in arb_json()) {
            let once = canonical_bytes(&value);
            let text = serde_json::to_string(&value).unwrap();
            let reparsed: Value = serde_json::from_str(&text).unwrap();
            prop_assert_eq!(once, canonical_bytes(&reparsed));
        }

        #[test]
        fn test_canonical_is_parseable_and_stable(value in arb_json()) {
            let bytes = canonical_bytes(&value);
            let reparsed: Value = serde_json::from_slice(&bytes).unwrap();
            prop_assert_eq!(&reparsed, &value);
            prop_assert_eq!(canonical_bytes(&reparsed), bytes);
        }
    }
}
