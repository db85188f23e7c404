//! Notification payload hierarchy: database -> table -> row uuid -> delta.

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// A decoded row: column name to column value. The reserved `_uuid` column is
/// always stripped before a row reaches this type.
pub type Row = Map<String, Value>;

/// Per-row delta inside a notification.
///
/// At most one of `new`/`old` (v1) or `initial`/`insert`/`modify`/`delete`
/// (v2/v3) is populated, except the v1 modify case which carries both `new`
/// (full post-image) and `old` (previous values of changed columns).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowUpdate {
    /// v1: the post-image (insert, modify, initial).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<Row>,
    /// v1: the pre-image (delete) or previous values of changed columns (modify).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Row>,
    /// v2/v3: row present when the monitor was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial: Option<Row>,
    /// v2/v3: newly inserted row.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert: Option<Row>,
    /// v2/v3: new values of changed columns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modify: Option<Row>,
    /// v2/v3: row deleted; always `true` when present, with no row payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<bool>,
}

impl RowUpdate {
    /// A v1 `{new}` update (insert or initial).
    pub fn new_row(row: Row) -> Self {
        RowUpdate {
            new: Some(row),
            ..Default::default()
        }
    }

    /// A v1 `{old}` update (delete).
    pub fn old_row(row: Row) -> Self {
        RowUpdate {
            old: Some(row),
            ..Default::default()
        }
    }

    /// A v1 modify: full post-image plus previous values of changed columns.
    pub fn modified(new: Row, old: Row) -> Self {
        RowUpdate {
            new: Some(new),
            old: Some(old),
            ..Default::default()
        }
    }

    /// A v2/v3 `{initial}` update.
    pub fn initial(row: Row) -> Self {
        RowUpdate {
            initial: Some(row),
            ..Default::default()
        }
    }

    /// A v2/v3 `{insert}` update.
    pub fn insert(row: Row) -> Self {
        RowUpdate {
            insert: Some(row),
            ..Default::default()
        }
    }

    /// A v2/v3 `{modify}` update carrying new values of changed columns.
    pub fn modify(delta: Row) -> Self {
        RowUpdate {
            modify: Some(delta),
            ..Default::default()
        }
    }

    /// The v2/v3 delete marker; the row payload is a null object by contract.
    pub fn deleted() -> Self {
        RowUpdate {
            delete: Some(true),
            ..Default::default()
        }
    }

    /// Whether this update is well-formed for the v1 (`update`) shape.
    pub fn valid_for_v1(&self) -> bool {
        self.initial.is_none()
            && self.insert.is_none()
            && self.modify.is_none()
            && self.delete.is_none()
            && (self.new.is_some() || self.old.is_some())
    }

    /// Whether this update is well-formed for the v2/v3 shape: exactly one of
    /// `initial`, `insert`, `modify`, `delete` populated, and no v1 fields.
    pub fn valid_for_v2(&self) -> bool {
        if self.new.is_some() || self.old.is_some() {
            return false;
        }
        let populated = usize::from(self.initial.is_some())
            + usize::from(self.insert.is_some())
            + usize::from(self.modify.is_some())
            + usize::from(self.delete.is_some());
        populated == 1
    }
}

/// Updates for one table, keyed by row uuid.
pub type TableUpdate = HashMap<String, RowUpdate>;

/// Updates for one database, keyed by table name.
pub type TableUpdates = HashMap<String, TableUpdate>;
