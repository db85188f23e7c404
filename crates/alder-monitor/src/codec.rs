//! Row codec: decode stored payloads and project columns.
//!
//! A stored row is a JSON object mapping column names to column values, plus
//! the reserved `_uuid` column holding a `["uuid", <string>]` pair. The uuid
//! is always split off before the row is exposed anywhere; it becomes the row
//! identifier key in the enclosing `TableUpdate`, never a column.

use alder_ovsjson::Row;
use serde_json::Value;

use crate::MonitorError;

/// The reserved uuid column of every stored row.
pub const COL_UUID: &str = "_uuid";

/// Decode a stored row payload into its columns and uuid.
///
/// Fails with [`MonitorError::MalformedRow`] when the payload is not a JSON
/// object or `_uuid` is missing or not a `["uuid", <string>]` pair.
pub fn decode_row(raw: &[u8]) -> Result<(Row, String), MonitorError> {
    let value: Value = serde_json::from_slice(raw).map_err(|err| MonitorError::MalformedRow {
        reason: format!("row is not valid JSON: {err}"),
    })?;
    let mut row = match value {
        Value::Object(row) => row,
        other => {
            return Err(MonitorError::MalformedRow {
                reason: format!("row is not a JSON object: {other}"),
            });
        }
    };
    let uuid = take_uuid(&mut row)?;
    Ok((row, uuid))
}

fn take_uuid(row: &mut Row) -> Result<String, MonitorError> {
    let value = row.remove(COL_UUID).ok_or_else(|| MonitorError::MalformedRow {
        reason: format!("row has no '{COL_UUID}' column"),
    })?;
    let pair = value.as_array().filter(|pair| pair.len() == 2);
    let uuid = pair
        .filter(|pair| pair[0].as_str() == Some("uuid"))
        .and_then(|pair| pair[1].as_str());
    match uuid {
        Some(uuid) => Ok(uuid.to_string()),
        None => Err(MonitorError::MalformedRow {
            reason: format!("'{COL_UUID}' is not a [\"uuid\", <string>] pair: {value}"),
        }),
    }
}

/// Reduce a row to the requested columns.
///
/// `None` (all columns requested) returns the row unchanged. Columns missing
/// from the row are silently omitted.
pub fn project(mut row: Row, projection: Option<&[String]>) -> Row {
    let columns = match projection {
        Some(columns) => columns,
        None => return row,
    };
    let mut projected = Row::new();
    for column in columns {
        if let Some(value) = row.remove(column) {
            projected.insert(column.clone(), value);
        }
    }
    projected
}
