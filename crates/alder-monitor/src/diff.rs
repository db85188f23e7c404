//! Per-column deltas between two decoded rows.
//!
//! Comparison always happens on decoded values, never raw bytes: encoders
//! may reorder map keys or set elements, so a byte-level mismatch can still
//! be a semantic no-op. Set and map deltas that decode to empty are dropped
//! from the result for the same reason.

use alder_ovsjson::Row;
use alder_schema::ColumnKind;
use alder_schema::TableSchema;
use alder_schema::decode_map;
use alder_schema::decode_set;
use alder_schema::encode_map;
use alder_schema::encode_set;
use serde_json::Value;
use tracing::warn;

use crate::MonitorError;

/// Compute the delta between a modified row and its previous image.
///
/// The result contains only columns whose decoded values differ. Scalar
/// columns store the previous value for v1 monitors (the client rebuilds the
/// pre-image next to the full new row) and the new value for v2/v3. Set
/// columns store the symmetric difference; map columns store changed/new
/// keys with their new value plus removed keys with their previous value.
///
/// Columns absent from the schema are logged and skipped; a typed decode
/// failure aborts this row's delta.
pub fn row_delta(
    modified: &Row,
    previous: &Row,
    schema: &TableSchema,
    is_v1: bool,
) -> Result<Row, MonitorError> {
    let mut delta = Row::new();
    for (column, new_value) in modified {
        let prev_value = previous.get(column);
        if prev_value == Some(new_value) {
            continue;
        }
        let column_schema = match schema.lookup_column(column) {
            Ok(column_schema) => column_schema,
            Err(err) => {
                warn!(table = %schema.name, column = %column, error = %err, "skipping column absent from schema");
                continue;
            }
        };
        let entry = match column_schema.kind {
            ColumnKind::Set => set_delta(new_value, prev_value)?,
            ColumnKind::Map => map_delta(new_value, prev_value)?,
            ColumnKind::Scalar => {
                if is_v1 {
                    Some(prev_value.cloned().unwrap_or(Value::Null))
                } else {
                    Some(new_value.clone())
                }
            }
        };
        if let Some(value) = entry {
            delta.insert(column.clone(), value);
        }
    }
    Ok(delta)
}

/// Symmetric difference of two set-typed values, or `None` when they are
/// semantically equal.
fn set_delta(new_value: &Value, prev_value: Option<&Value>) -> Result<Option<Value>, MonitorError> {
    let new_elements = decode_set(new_value)?;
    let prev_elements = match prev_value {
        Some(value) => decode_set(value)?,
        None => Vec::new(),
    };

    let mut difference: Vec<Value> = new_elements
        .iter()
        .filter(|element| !prev_elements.contains(element))
        .cloned()
        .collect();
    difference.extend(
        prev_elements
            .iter()
            .filter(|element| !new_elements.contains(element))
            .cloned(),
    );

    if difference.is_empty() {
        Ok(None)
    } else {
        Ok(Some(encode_set(difference)))
    }
}

/// OVSDB map delta, or `None` when the maps are semantically equal.
fn map_delta(new_value: &Value, prev_value: Option<&Value>) -> Result<Option<Value>, MonitorError> {
    let new_entries = decode_map(new_value)?;
    let prev_entries = match prev_value {
        Some(value) => decode_map(value)?,
        None => Vec::new(),
    };

    let mut delta = Vec::new();
    for (key, value) in &new_entries {
        match entry_value(&prev_entries, key) {
            Some(prev) if prev == value => {}
            _ => delta.push((key.clone(), value.clone())),
        }
    }
    // Keys that were removed signal removal by carrying their previous value.
    for (key, prev) in &prev_entries {
        if entry_value(&new_entries, key).is_none() {
            delta.push((key.clone(), prev.clone()));
        }
    }

    if delta.is_empty() {
        Ok(None)
    } else {
        Ok(Some(encode_map(delta)))
    }
}

/// Structural lookup; map keys can be arbitrary atoms, not just strings.
fn entry_value<'a>(entries: &'a [(Value, Value)], key: &Value) -> Option<&'a Value> {
    entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}
