//! Canonical JSON serialization for model artifacts
//!
//! Object keys are sorted recursively and the output carries no
//! whitespace, so the same model always serializes to the same bytes and
//! hashes to the same BLAKE3 digest.

use serde::Serialize;
use serde_json::{Map, Value};

/// Recursively sort JSON object keys
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));

            let mut sorted = Map::with_capacity(entries.len());
            for (key, val) in entries {
                sorted.insert(key, canonicalize(val));
            }
            Value::Object(sorted)
        }
        Value::Array(elements) => Value::Array(elements.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Serialize a value to canonical JSON (sorted keys, no whitespace)
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let canonical = canonicalize(serde_json::to_value(value)?);
    serde_json::to_string(&canonical)
}

/// BLAKE3 digest of the canonical JSON form, hex encoded
pub fn hash_canonical_hex<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = to_canonical_json(value)?;
    Ok(hex::encode(blake3::hash(json.as_bytes()).as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_are_sorted_at_every_level() {
        let value = json!({"b": 1, "a": {"d": [ {"z": 0, "y": 1} ], "c": null}});
        assert_eq!(
            to_canonical_json(&value).unwrap(),
            r#"{"a":{"c":null,"d":[{"y":1,"z":0}]},"b":1}"#
        );
    }

    #[test]
    fn test_hash_is_stable_and_sensitive() {
        let h1 = hash_canonical_hex(&json!({"x": 1, "y": 2})).unwrap();
        let h2 = hash_canonical_hex(&json!({"y": 2, "x": 1})).unwrap();
        let h3 = hash_canonical_hex(&json!({"x": 1, "y": 3})).unwrap();

        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
        assert_eq!(h1.len(), 64);
    }
}
