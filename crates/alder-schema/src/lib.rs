//! OVSDB schema model and typed column values.
//!
//! The monitor pipeline needs exactly one thing from a schema: the type tag
//! of each `(table, column)` pair, so set- and map-valued columns can be
//! diffed under OVSDB semantics instead of raw JSON equality. This crate
//! parses OVSDB schema documents into that shape and provides the typed
//! decode/encode helpers for `["set", ...]` and `["map", ...]` column values.

mod schema;
mod value;

pub use schema::ColumnKind;
pub use schema::ColumnSchema;
pub use schema::DatabaseSchema;
pub use schema::TableSchema;
pub use value::decode_map;
pub use value::decode_set;
pub use value::encode_map;
pub use value::encode_set;

use thiserror::Error;

/// Schema and typed-value failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A diff or projection referenced a column the schema does not define.
    #[error("column '{column}' is not in the schema of table '{table}'")]
    UnknownColumn {
        /// Table whose schema was consulted.
        table: String,
        /// The missing column.
        column: String,
    },

    /// A monitor request referenced a table the schema does not define.
    #[error("table '{table}' is not in the schema of database '{database}'")]
    UnknownTable {
        /// Database whose schema was consulted.
        database: String,
        /// The missing table.
        table: String,
    },

    /// The schema document itself was malformed.
    #[error("invalid database schema: {reason}")]
    Invalid {
        /// What was wrong with the document.
        reason: String,
    },

    /// A stored column value did not match its schema type.
    #[error("cannot decode {expected} value from {got}")]
    ValueType {
        /// The type the schema called for.
        expected: &'static str,
        /// The JSON actually found.
        got: String,
    },
}
