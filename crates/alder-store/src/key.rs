//! Row key paths and their table-key reduction.

use thiserror::Error;

/// Separator between key path segments.
pub const KEY_DELIMITER: char = '/';

/// Malformed row keys.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The key does not start with the configured store prefix.
    #[error("key '{key}' does not start with prefix '{prefix}'")]
    WrongPrefix {
        /// The offending key.
        key: String,
        /// The prefix the parser expected.
        prefix: String,
    },

    /// The key does not have database, table, and uuid segments.
    #[error("key '{key}' must have <database>/<table>/<uuid> segments after the prefix")]
    BadShape {
        /// The offending key.
        key: String,
    },
}

/// The common prefix shared by all rows of one table:
/// `<prefix>/<database>/<table>`. This is the unit of monitor indexing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableKey {
    prefix: String,
    database: String,
    table: String,
}

impl TableKey {
    /// Build a table key under the configured store prefix.
    pub fn new(prefix: &str, database: &str, table: &str) -> Self {
        TableKey {
            prefix: prefix.to_string(),
            database: database.to_string(),
            table: table.to_string(),
        }
    }

    /// The database segment.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// The table segment.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The full path, `<prefix>/<database>/<table>`.
    pub fn path(&self) -> String {
        format!(
            "{}{d}{}{d}{}",
            self.prefix,
            self.database,
            self.table,
            d = KEY_DELIMITER
        )
    }

    /// The prefix matching every row key of this table.
    pub fn row_prefix(&self) -> String {
        format!("{}{}", self.path(), KEY_DELIMITER)
    }
}

/// A full row key, `<prefix>/<database>/<table>/<uuid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    table: TableKey,
    uuid: String,
}

impl Key {
    /// Build a row key under the configured store prefix.
    pub fn new(prefix: &str, database: &str, table: &str, uuid: &str) -> Self {
        Key {
            table: TableKey::new(prefix, database, table),
            uuid: uuid.to_string(),
        }
    }

    /// Parse a raw store key. `prefix` is the configured store prefix
    /// (itself allowed to contain delimiters); the remainder must be exactly
    /// `<database>/<table>/<uuid>` with non-empty segments.
    pub fn parse(prefix: &str, raw: &str) -> Result<Self, KeyError> {
        let mut leading = String::with_capacity(prefix.len() + 1);
        leading.push_str(prefix);
        leading.push(KEY_DELIMITER);
        let rest = raw.strip_prefix(&leading).ok_or_else(|| KeyError::WrongPrefix {
            key: raw.to_string(),
            prefix: prefix.to_string(),
        })?;

        let segments: Vec<&str> = rest.split(KEY_DELIMITER).collect();
        if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
            return Err(KeyError::BadShape { key: raw.to_string() });
        }
        Ok(Key::new(prefix, segments[0], segments[1], segments[2]))
    }

    /// The table-key reduction of this row key.
    pub fn table_key(&self) -> TableKey {
        self.table.clone()
    }

    /// The table name segment.
    pub fn table(&self) -> &str {
        self.table.table()
    }

    /// The row uuid segment.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// The full path, `<prefix>/<database>/<table>/<uuid>`.
    pub fn path(&self) -> String {
        format!("{}{}{}", self.table.path(), KEY_DELIMITER, self.uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "ovsdb/nb";

    #[test]
    fn parse_splits_segments() {
        let key = Key::parse(PREFIX, "ovsdb/nb/OVN_Northbound/Logical_Switch/u-1").unwrap();
        assert_eq!(key.table_key().database(), "OVN_Northbound");
        assert_eq!(key.table(), "Logical_Switch");
        assert_eq!(key.uuid(), "u-1");
    }

    #[test]
    fn path_round_trip() {
        let key = Key::new(PREFIX, "db", "table", "u-2");
        assert_eq!(key.path(), "ovsdb/nb/db/table/u-2");
        assert_eq!(Key::parse(PREFIX, &key.path()).unwrap(), key);
    }

    #[test]
    fn table_key_paths() {
        let table = TableKey::new(PREFIX, "db", "table");
        assert_eq!(table.path(), "ovsdb/nb/db/table");
        assert_eq!(table.row_prefix(), "ovsdb/nb/db/table/");
    }

    #[test]
    fn parse_rejects_wrong_prefix() {
        let err = Key::parse(PREFIX, "other/nb/db/table/u").unwrap_err();
        assert!(matches!(err, KeyError::WrongPrefix { .. }));
    }

    #[test]
    fn parse_rejects_missing_segments() {
        for raw in ["ovsdb/nb/db/table", "ovsdb/nb/db/table/u/extra", "ovsdb/nb/db//u"] {
            let err = Key::parse(PREFIX, raw).unwrap_err();
            assert!(matches!(err, KeyError::BadShape { .. }), "{raw}");
        }
    }

    #[test]
    fn table_keys_are_map_keys() {
        use std::collections::HashMap;

        let mut index: HashMap<TableKey, u32> = HashMap::new();
        index.insert(TableKey::new(PREFIX, "db", "t1"), 1);
        index.insert(TableKey::new(PREFIX, "db", "t2"), 2);
        assert_eq!(index[&TableKey::new(PREFIX, "db", "t1")], 1);
        assert_eq!(index.len(), 2);
    }
}
