//! Canonical JSON used for hashing.
//!
//! Object keys are emitted in lexicographic order at every depth, strings
//! and numbers use serde_json's standard rendering, and the output is
//! UTF-8 with no insignificant whitespace. Two semantically equal events
//! always hash identically, independent of field insertion order.

use crate::AuditError;
use alder_types::Event;
use serde_json::Value;
use std::collections::BTreeMap;

/// Render a JSON value canonically.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

/// Canonical bytes of an event, the hashing input for the chain.
pub fn canonical_event_bytes(event: &Event) -> Result<Vec<u8>, AuditError> {
    let value = serde_json::to_value(event)?;
    Ok(canonical_json(&value).into_bytes())
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        // serde_json renders integers without exponents and floats via the
        // shortest round-trippable form, which is normalization enough.
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => {
            // Reuse serde_json's escaping rules.
            out.push_str(&serde_json::to_string(s).expect("string serialization is infallible"));
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            out.push('{');
            for (i, (key, item)) in sorted.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(
                    &serde_json::to_string(key).expect("string serialization is infallible"),
                );
                out.push(':');
                write_value(item, out);
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
    fn keys_are_sorted_at_every_depth() {
        let a = json!({"b": 1, "a": {"z": true, "m": [1, 2]}});
        assert_eq!(canonical_json(&a), r#"{"a":{"m":[1,2],"z":true},"b":1}"#);
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let mut first = serde_json::Map::new();
        first.insert("x".to_string(), json!(1));
        first.insert("a".to_string(), json!(2));

        let mut second = serde_json::Map::new();
        second.insert("a".to_string(), json!(2));
        second.insert("x".to_string(), json!(1));

        assert_eq!(
            canonical_json(&Value::Object(first)),
            canonical_json(&Value::Object(second))
        );
    }

    #[test]
    fn strings_are_escaped() {
        let v = json!({"msg": "line\nbreak \"quoted\""});
        assert_eq!(
            canonical_json(&v),
            r#"{"msg":"line\nbreak \"quoted\""}"#
        );
    }
}
