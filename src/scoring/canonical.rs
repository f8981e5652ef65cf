//! Canonical JSON serialization and digests.
//!
//! The determinism contract for evidence hashing: serialize with object
//! keys sorted and no insignificant whitespace, then SHA-256. The
//! canonicalizer is written out explicitly rather than relying on any
//! encoder's default key order.

use crate::error::{Result, ScoringError};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Serializes a JSON value canonically: objects with sorted keys, arrays
/// in order, no insignificant whitespace.
///
/// # Errors
///
/// Returns an error if a non-finite number is encountered (canonical JSON
/// has no representation for NaN or infinity).
pub fn canonical_json(value: &Value) -> Result<String> {
    let mut out = String::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) -> Result<()> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => {
            if n.as_f64().is_some_and(f64::is_nan) {
                return Err(ScoringError::CanonicalizationFailed {
                    reason: "non-finite number in evidence".to_string(),
                }
                .into());
            }
            out.push_str(&n.to_string());
        }
        Value::String(s) => {
            // serde_json's string escaping is deterministic
            out.push_str(&Value::String(s.clone()).to_string());
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            // Sort keys; serde_json map order is insertion order by default.
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                if let Some(v) = map.get(*key) {
                    write_canonical(v, out)?;
                }
            }
            out.push('}');
        }
    }
    Ok(())
}

/// SHA-256 of a string, hex-encoded.
#[must_use]
pub fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Canonicalizes and hashes a JSON value in one step.
///
/// # Errors
///
/// Returns an error if canonicalization fails.
pub fn canonical_digest(value: &Value) -> Result<String> {
    Ok(sha256_hex(&canonical_json(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_sorts_keys() {
        let v = json!({"zeta": 1, "alpha": {"b": 2, "a": 1}});
        assert_eq!(
            canonical_json(&v).unwrap(),
            r#"{"alpha":{"a":1,"b":2},"zeta":1}"#
        );
    }

    #[test]
    fn test_canonical_no_whitespace() {
        let v = json!({"a": [1, 2, 3], "b": "text with spaces"});
        let s = canonical_json(&v).unwrap();
        assert!(!s.contains(": "));
        assert!(!s.contains(", "));
    }

    #[test]
    fn test_digest_independent_of_insertion_order() {
        let mut a = serde_json::Map::new();
        a.insert("x".to_string(), json!(1));
        a.insert("y".to_string(), json!(2));
        let mut b = serde_json::Map::new();
        b.insert("y".to_string(), json!(2));
        b.insert("x".to_string(), json!(1));
        assert_eq!(
            canonical_digest(&Value::Object(a)).unwrap(),
            canonical_digest(&Value::Object(b)).unwrap()
        );
    }

    #[test]
    fn test_digest_sensitive_to_values() {
        let a = json!({"score": 1});
        let b = json!({"score": 2});
        assert_ne!(
            canonical_digest(&a).unwrap(),
            canonical_digest(&b).unwrap()
        );
    }

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256 of the empty string
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_canonical_escapes_strings() {
        let v = json!({"k": "line\nbreak \"quoted\""});
        let s = canonical_json(&v).unwrap();
        assert!(s.contains("\\n"));
        assert!(s.contains("\\\""));
    }

    #[test]
    fn test_canonical_null_and_bool() {
        assert_eq!(canonical_json(&json!(null)).unwrap(), "null");
        assert_eq!(canonical_json(&json!(true)).unwrap(), "true");
        assert_eq!(canonical_json(&json!([false])).unwrap(), "[false]");
    }
}
