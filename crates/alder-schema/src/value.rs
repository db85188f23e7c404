//! Typed decode/encode of OVSDB set and map column values.
//!
//! OVSDB encodes non-scalar column values as tagged pairs: `["set", [...]]`
//! and `["map", [[key, value], ...]]`. A set holding exactly one atom may be
//! encoded as the bare atom. Atoms themselves may be pairs too (`["uuid", s]`,
//! `["named-uuid", s]`), so decoding has to distinguish an atom pair from a
//! collection pair by its tag. All comparisons downstream use the decoded
//! structural form, never the raw encoding.

use serde_json::Value;

use crate::SchemaError;

const SET_TAG: &str = "set";
const MAP_TAG: &str = "map";
const ATOM_TAGS: [&str; 2] = ["uuid", "named-uuid"];

fn pair_tag(value: &Value) -> Option<&str> {
    let elements = value.as_array()?;
    if elements.len() == 2 { elements[0].as_str() } else { None }
}

/// Decode a set-typed column value into its elements.
///
/// Accepts `["set", [...]]` and the bare-atom singleton encoding.
pub fn decode_set(value: &Value) -> Result<Vec<Value>, SchemaError> {
    match pair_tag(value) {
        Some(SET_TAG) => {
            let elements = value.as_array().and_then(|pair| pair[1].as_array()).ok_or_else(|| {
                SchemaError::ValueType {
                    expected: "set",
                    got: value.to_string(),
                }
            })?;
            Ok(elements.clone())
        }
        Some(tag) if ATOM_TAGS.contains(&tag) => Ok(vec![value.clone()]),
        Some(_) => Err(SchemaError::ValueType {
            expected: "set",
            got: value.to_string(),
        }),
        None => match value {
            // A bare atom is a singleton set.
            Value::Array(_) => Err(SchemaError::ValueType {
                expected: "set",
                got: value.to_string(),
            }),
            other => Ok(vec![other.clone()]),
        },
    }
}

/// Encode set elements back into the `["set", [...]]` wire form.
pub fn encode_set(elements: Vec<Value>) -> Value {
    Value::Array(vec![Value::String(SET_TAG.to_string()), Value::Array(elements)])
}

/// Decode a map-typed column value into its `(key, value)` entries.
pub fn decode_map(value: &Value) -> Result<Vec<(Value, Value)>, SchemaError> {
    let type_error = || SchemaError::ValueType {
        expected: "map",
        got: value.to_string(),
    };
    if pair_tag(value) != Some(MAP_TAG) {
        return Err(type_error());
    }
    let entries = value.as_array().and_then(|pair| pair[1].as_array()).ok_or_else(type_error)?;

    let mut decoded = Vec::with_capacity(entries.len());
    for entry in entries {
        let pair = entry.as_array().filter(|pair| pair.len() == 2).ok_or_else(type_error)?;
        decoded.push((pair[0].clone(), pair[1].clone()));
    }
    Ok(decoded)
}

/// Encode map entries back into the `["map", [[k, v], ...]]` wire form.
pub fn encode_map(entries: Vec<(Value, Value)>) -> Value {
    let pairs = entries
        .into_iter()
        .map(|(key, value)| Value::Array(vec![key, value]))
        .collect();
    Value::Array(vec![Value::String(MAP_TAG.to_string()), Value::Array(pairs)])
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decode_tagged_set() {
        let decoded = decode_set(&json!(["set", [1, 2, 3]])).unwrap();
        assert_eq!(decoded, vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn decode_empty_set() {
        assert!(decode_set(&json!(["set", []])).unwrap().is_empty());
    }

    #[test]
    fn decode_bare_atom_as_singleton() {
        assert_eq!(decode_set(&json!("a")).unwrap(), vec![json!("a")]);
        assert_eq!(decode_set(&json!(7)).unwrap(), vec![json!(7)]);
    }

    #[test]
    fn decode_uuid_atom_as_singleton() {
        let atom = json!(["uuid", "aae60a04-ed8c-4cb6-b573-f0c8a4c460b3"]);
        assert_eq!(decode_set(&atom).unwrap(), vec![atom]);
    }

    #[test]
    fn decode_set_rejects_untagged_array() {
        assert!(decode_set(&json!([1, 2])).is_err());
        assert!(decode_set(&json!(["map", []])).is_err());
    }

    #[test]
    fn set_round_trip() {
        let encoded = encode_set(vec![json!(1), json!(2)]);
        assert_eq!(encoded, json!(["set", [1, 2]]));
        assert_eq!(decode_set(&encoded).unwrap(), vec![json!(1), json!(2)]);
    }

    #[test]
    fn decode_tagged_map() {
        let decoded = decode_map(&json!(["map", [["a", 1], ["b", 2]]])).unwrap();
        assert_eq!(decoded, vec![(json!("a"), json!(1)), (json!("b"), json!(2))]);
    }

    #[test]
    fn decode_map_rejects_other_shapes() {
        assert!(decode_map(&json!(["set", []])).is_err());
        assert!(decode_map(&json!({"a": 1})).is_err());
        assert!(decode_map(&json!(["map", [["a", 1, 2]]])).is_err());
    }

    #[test]
    fn map_round_trip() {
        let entries = vec![(json!("a"), json!(1))];
        let encoded = encode_map(entries.clone());
        assert_eq!(encoded, json!(["map", [["a", 1]]]));
        assert_eq!(decode_map(&encoded).unwrap(), entries);
    }
}
