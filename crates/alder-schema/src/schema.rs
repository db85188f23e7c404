//! Parsing OVSDB schema documents into column type tags.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::SchemaError;

/// The three value shapes an OVSDB column can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// A single atom (string, integer, real, boolean, uuid).
    Scalar,
    /// An unordered collection of atoms, encoded as `["set", [...]]` or a
    /// bare atom for singletons.
    Set,
    /// Key-to-value pairs, encoded as `["map", [[k, v], ...]]`.
    Map,
}

/// Type information for one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    /// The column's value shape.
    pub kind: ColumnKind,
}

/// Column types for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Column name to type information.
    pub columns: HashMap<String, ColumnSchema>,
}

impl TableSchema {
    /// Look up a column's type, failing if the schema does not define it.
    pub fn lookup_column(&self, column: &str) -> Result<&ColumnSchema, SchemaError> {
        self.columns.get(column).ok_or_else(|| SchemaError::UnknownColumn {
            table: self.name.clone(),
            column: column.to_string(),
        })
    }
}

/// A parsed OVSDB database schema.
///
/// Tables are wrapped in `Arc` because every updater of a monitored table
/// holds a reference to its column types.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseSchema {
    /// Database name (the `name` member of the schema document).
    pub name: String,
    /// Schema version string, when the document carries one.
    pub version: Option<String>,
    /// Table name to column types.
    pub tables: HashMap<String, Arc<TableSchema>>,
    /// The original schema document, echoed verbatim by `get_schema`.
    pub raw: Value,
}

impl DatabaseSchema {
    /// Parse an OVSDB schema document.
    pub fn from_value(raw: Value) -> Result<Self, SchemaError> {
        let object = raw.as_object().ok_or_else(|| SchemaError::Invalid {
            reason: "schema document must be an object".to_string(),
        })?;
        let name = object
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| SchemaError::Invalid {
                reason: "schema document has no 'name'".to_string(),
            })?
            .to_string();
        let version = object.get("version").and_then(Value::as_str).map(str::to_string);
        let table_docs = object
            .get("tables")
            .and_then(Value::as_object)
            .ok_or_else(|| SchemaError::Invalid {
                reason: format!("schema '{name}' has no 'tables' object"),
            })?;

        let mut tables = HashMap::with_capacity(table_docs.len());
        for (table_name, table_doc) in table_docs {
            let columns = parse_table_columns(&name, table_name, table_doc)?;
            tables.insert(
                table_name.clone(),
                Arc::new(TableSchema {
                    name: table_name.clone(),
                    columns,
                }),
            );
        }

        Ok(DatabaseSchema {
            name,
            version,
            tables,
            raw,
        })
    }

    /// Look up a table's schema, failing if the database does not define it.
    pub fn lookup_table(&self, table: &str) -> Result<Arc<TableSchema>, SchemaError> {
        self.tables.get(table).cloned().ok_or_else(|| SchemaError::UnknownTable {
            database: self.name.clone(),
            table: table.to_string(),
        })
    }
}

fn parse_table_columns(
    database: &str,
    table: &str,
    table_doc: &Value,
) -> Result<HashMap<String, ColumnSchema>, SchemaError> {
    let column_docs = table_doc
        .get("columns")
        .and_then(Value::as_object)
        .ok_or_else(|| SchemaError::Invalid {
            reason: format!("table '{database}.{table}' has no 'columns' object"),
        })?;

    let mut columns = HashMap::with_capacity(column_docs.len());
    for (column_name, column_doc) in column_docs {
        let type_doc = column_doc.get("type").ok_or_else(|| SchemaError::Invalid {
            reason: format!("column '{database}.{table}.{column_name}' has no 'type'"),
        })?;
        columns.insert(
            column_name.clone(),
            ColumnSchema {
                kind: parse_column_kind(type_doc),
            },
        );
    }
    Ok(columns)
}

/// Derive a column's value shape from its `type` member.
///
/// A bare atomic-type string is a scalar. An object with a `value` member is
/// a map. Otherwise the column is a set unless both `min` and `max` are 1
/// (their default), in which case it holds exactly one atom.
fn parse_column_kind(type_doc: &Value) -> ColumnKind {
    let object = match type_doc {
        Value::Object(object) => object,
        _ => return ColumnKind::Scalar,
    };
    if object.contains_key("value") {
        return ColumnKind::Map;
    }
    let min = object.get("min").and_then(Value::as_u64).unwrap_or(1);
    let max_is_one = match object.get("max") {
        None => true,
        Some(v) => v.as_u64() == Some(1),
    };
    if min == 1 && max_is_one {
        ColumnKind::Scalar
    } else {
        ColumnKind::Set
    }
}
