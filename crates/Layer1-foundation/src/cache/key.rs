//! Canonical JSON keys for caching
//!
//! Cache and dedup keys must be order-independent: `{"a":1,"b":2}` and
//! `{"b":2,"a":1}` describe the same request. Canonicalization sorts object
//! keys at every nesting level before serializing.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde_json::Value;

/// Serialize a JSON value with object keys sorted at every level
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

/// Compute a hash over the canonical form of a JSON value
pub fn hash_json(value: &Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    canonical_json(value).hash(&mut hasher);
    hasher.finish()
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
            // Scalars serialize deterministically as-is
            out.push_str(&value.to_string());
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
        Value::Object(map) => {
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
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_order_independent() {
        let a = json!({"a": 1, "b": {"y": 2, "x": 3}});
        let b = json!({"b": {"x": 3, "y": 2}, "a": 1});

        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(hash_json(&a), hash_json(&b));
    }

    #[test]
    fn test_canonical_distinguishes_values() {
        assert_ne!(hash_json(&json!({"a": 1})), hash_json(&json!({"a": 2})));
        assert_ne!(hash_json(&json!([1, 2])), hash_json(&json!([2, 1])));
    }

    #[test]
    fn test_canonical_shape() {
        let v = json!({"b": [1, null], "a": "s"});
        assert_eq!(canonical_json(&v), r#"{"a":"s","b":[1,null]}"#);
    }
}
