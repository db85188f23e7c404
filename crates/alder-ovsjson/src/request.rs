//! Monitor request shapes and positional-parameter parsing.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Malformed `monitor*` parameters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParamsError {
    /// The params value was not a JSON array.
    #[error("monitor params must be an array, got {got}")]
    NotAnArray {
        /// JSON type name of the received value.
        got: &'static str,
    },

    /// The params array was shorter than the method requires.
    #[error("monitor params require at least {expected} elements, got {got}")]
    TooShort {
        /// Minimum number of positional parameters.
        expected: usize,
        /// Number actually received.
        got: usize,
    },

    /// A positional element failed to deserialize.
    #[error("invalid monitor parameter at position {position}: {reason}")]
    InvalidElement {
        /// Zero-based position in the params array.
        position: usize,
        /// Deserialization failure description.
        reason: String,
    },
}

/// Tri-state selection flags of a monitor condition request.
///
/// Absent flags default to selected; the distinction between absent and
/// `false` must survive a JSON round-trip, so the fields stay `Option<bool>`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSelect {
    /// Include rows that existed when the monitor was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial: Option<bool>,
    /// Include rows inserted after the monitor was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert: Option<bool>,
    /// Include rows deleted after the monitor was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<bool>,
    /// Include rows modified after the monitor was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modify: Option<bool>,
}

impl MonitorSelect {
    /// Resolve a tri-state flag: absent means selected.
    fn selected(flag: Option<bool>) -> bool {
        flag.unwrap_or(true)
    }

    /// Whether initial rows are selected.
    pub fn initial(&self) -> bool {
        Self::selected(self.initial)
    }

    /// Whether inserts are selected.
    pub fn insert(&self) -> bool {
        Self::selected(self.insert)
    }

    /// Whether deletes are selected.
    pub fn delete(&self) -> bool {
        Self::selected(self.delete)
    }

    /// Whether modifications are selected.
    pub fn modify(&self) -> bool {
        Self::selected(self.modify)
    }
}

/// One `<monitor-cond-request>`: a column projection, selection flags, and an
/// accepted-but-unevaluated `where` clause.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorCondRequest {
    /// Columns to project; absent or empty means all columns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    /// Selection flags; absent means everything is selected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<MonitorSelect>,
    /// Condition expressions. Accepted on the wire, not evaluated.
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clauses: Option<Vec<Value>>,
}

impl MonitorCondRequest {
    /// The effective selection flags (absent `select` selects everything).
    pub fn select(&self) -> MonitorSelect {
        self.select.unwrap_or_default()
    }

    /// The column projection, or `None` when all columns are requested.
    pub fn projection(&self) -> Option<&[String]> {
        match &self.columns {
            Some(columns) if !columns.is_empty() => Some(columns),
            _ => None,
        }
    }
}

/// A table's condition requests: OVSDB allows a single object or an array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(MonitorCondRequest),
    Many(Vec<MonitorCondRequest>),
}

impl From<OneOrMany> for Vec<MonitorCondRequest> {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(mcr) => vec![mcr],
            OneOrMany::Many(mcrs) => mcrs,
        }
    }
}

/// Decoded positional parameters of `monitor`, `monitor_cond`, and
/// `monitor_cond_since`: `[db, json-value, {table -> condReq | [condReq...]},
/// last-txn-id?]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CondMonitorParameters {
    /// Target database name.
    pub database_name: String,
    /// The client's opaque correlation value, echoed in every notification.
    pub json_value: Value,
    /// Condition requests per monitored table.
    pub requests: HashMap<String, Vec<MonitorCondRequest>>,
    /// `monitor_cond_since` only: the last transaction id the client saw.
    pub last_txn_id: Option<String>,
}

impl CondMonitorParameters {
    /// Parse the positional params array of a `monitor*` request.
    pub fn from_params(params: &Value) -> Result<Self, ParamsError> {
        let elements = params.as_array().ok_or(ParamsError::NotAnArray {
            got: json_type_name(params),
        })?;
        if elements.len() < 3 {
            return Err(ParamsError::TooShort {
                expected: 3,
                got: elements.len(),
            });
        }

        let database_name: String = element(elements, 0)?;
        let json_value = elements[1].clone();
        let requests: HashMap<String, OneOrMany> = element(elements, 2)?;
        let last_txn_id = match elements.get(3) {
            Some(Value::Null) | None => None,
            Some(v) => Some(
                v.as_str()
                    .ok_or_else(|| ParamsError::InvalidElement {
                        position: 3,
                        reason: "last transaction id must be a string".to_string(),
                    })?
                    .to_string(),
            ),
        };

        Ok(CondMonitorParameters {
            database_name,
            json_value,
            requests: requests.into_iter().map(|(table, mcrs)| (table, mcrs.into())).collect(),
            last_txn_id,
        })
    }
}

fn element<T: serde::de::DeserializeOwned>(elements: &[Value], position: usize) -> Result<T, ParamsError> {
    serde_json::from_value(elements[position].clone()).map_err(|err| ParamsError::InvalidElement {
        position,
        reason: err.to_string(),
    })
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The registry and notification correlation key for a client-supplied
/// `json-value`: its canonical JSON text.
pub fn json_value_key(json_value: &Value) -> String {
    json_value.to_string()
}
