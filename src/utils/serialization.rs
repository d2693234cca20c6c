// src/utils/serialization.rs
//! Serialization utilities for the keymaster.
//!
//! Provides:
//! - A plain JSON deserialization helper
//! - Canonical JSON (sorted keys, no insignificant whitespace) used before
//!   hashing and signing, so that verification is reproducible regardless of
//!   the order in which fields were produced

use crate::utils::crypto::hash_data;
use serde::Deserialize;
use serde_json::Value;

/// Name of the field excluded from the canonical form of signed objects.
pub const SIGNATURE_FIELD: &str = "signature";

/// Deserializes a value from a JSON string.
pub fn deserialize<'a, T: Deserialize<'a>>(data: &'a str) -> Result<T, serde_json::Error> {
    serde_json::from_str(data)
}

/// Produces the canonical JSON text of `value`.
///
/// Object members are emitted in lexicographic key order at every depth.
/// Strings and numbers use serde_json's own formatting, which is stable
/// across a parse/serialize round trip.
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            // UTF-16 code unit order, as JCS sorts
            keys.sort_by(|a, b| a.encode_utf16().cmp(b.encode_utf16()));
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Hex SHA-256 of the canonical form of `value`, ignoring any top-level
/// `signature` member.
pub fn canonical_hash(value: &Value) -> String {
    let stripped = strip_signature(value);
    hex::encode(hash_data(canonicalize(&stripped).as_bytes()))
}

/// Returns a copy of `value` without its top-level `signature` member.
pub fn strip_signature(value: &Value) -> Value {
    let mut copy = value.clone();
    if let Value::Object(map) = &mut copy {
        map.remove(SIGNATURE_FIELD);
    }
    copy
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_form_ignores_key_order() {
        let a = json!({"b": 1, "a": {"y": [1, 2], "x": "s"}});
        let b = json!({"a": {"x": "s", "y": [1, 2]}, "b": 1});
        assert_eq!(canonicalize(&a), r#"{"a":{"x":"s","y":[1,2]},"b":1}"#);
        assert_eq!(canonicalize(&a), canonicalize(&b));
    }

    #[test]
    fn test_canonical_hash_excludes_signature() {
        let unsigned = json!({"a": 1});
        let signed = json!({"a": 1, "signature": {"value": "00"}});
        assert_eq!(canonical_hash(&unsigned), canonical_hash(&signed));
        assert_ne!(canonical_hash(&unsigned), canonical_hash(&json!({"a": 2})));
    }

    #[test]
    fn test_keys_sort_by_utf16_code_units() {
        // U+1F600 encodes as a surrogate pair (0xD83D..), which sorts before U+FF61
        // in UTF-16 although its UTF-8 bytes sort after
        let value = json!({"\u{ff61}": 1, "\u{1f600}": 2});
        assert_eq!(canonicalize(&value), "{\"\u{1f600}\":2,\"\u{ff61}\":1}");
    }

    #[test]
    fn test_strings_are_escaped() {
        let value = json!({"k\"ey": "line\nbreak"});
        assert_eq!(canonicalize(&value), r#"{"k\"ey":"line\nbreak"}"#);
    }
}
