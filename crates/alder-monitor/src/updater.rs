//! The compiled form of one `(table, condition-request)` pair.

use std::sync::Arc;

use alder_ovsjson::MonitorCondRequest;
use alder_ovsjson::Row;
use alder_ovsjson::RowUpdate;
use alder_schema::TableSchema;
use alder_store::EventKind;
use alder_store::WatchEvent;

use crate::MonitorError;
use crate::codec;
use crate::diff;

/// Turns KV events into OVSDB row updates for one monitor condition.
///
/// Immutable after construction. Bound to a protocol variant (`is_v1`), the
/// monitored table's column types, and the client correlation key used to
/// route its output.
#[derive(Debug, Clone, PartialEq)]
pub struct Updater {
    mcr: MonitorCondRequest,
    is_v1: bool,
    table_schema: Arc<TableSchema>,
    json_value_key: String,
}

impl Updater {
    /// Compile a monitor condition request.
    pub fn new(
        mcr: MonitorCondRequest,
        json_value_key: impl Into<String>,
        table_schema: Arc<TableSchema>,
        is_v1: bool,
    ) -> Self {
        Updater {
            mcr,
            is_v1,
            table_schema,
            json_value_key: json_value_key.into(),
        }
    }

    /// The correlation key of the monitor this updater belongs to.
    pub fn json_value_key(&self) -> &str {
        &self.json_value_key
    }

    /// Turn one watch event into a row update, or nothing when the event is
    /// filtered out by the selection flags, the projection, or an empty diff.
    pub fn on_event(&self, event: &WatchEvent) -> Result<Option<(RowUpdate, String)>, MonitorError> {
        match event.kind {
            EventKind::Create => self.create_update(event),
            EventKind::Delete => self.delete_update(event),
            EventKind::Modify => self.modify_update(event),
        }
    }

    /// Turn a snapshot row into its initial update, gated by `Select.Initial`.
    pub fn on_initial(&self, raw: &[u8]) -> Result<Option<(RowUpdate, String)>, MonitorError> {
        if !self.mcr.select().initial() {
            return Ok(None);
        }
        let (row, uuid) = self.prepare_row(raw)?;
        if row.is_empty() {
            return Ok(None);
        }
        let update = if self.is_v1 {
            RowUpdate::new_row(row)
        } else {
            RowUpdate::initial(row)
        };
        Ok(Some((update, uuid)))
    }

    fn create_update(&self, event: &WatchEvent) -> Result<Option<(RowUpdate, String)>, MonitorError> {
        if !self.mcr.select().insert() {
            return Ok(None);
        }
        let raw = event.value.as_deref().ok_or_else(|| MonitorError::MalformedRow {
            reason: "create event has no current value".to_string(),
        })?;
        let (row, uuid) = self.prepare_row(raw)?;
        if row.is_empty() {
            return Ok(None);
        }
        let update = if self.is_v1 {
            RowUpdate::new_row(row)
        } else {
            RowUpdate::insert(row)
        };
        Ok(Some((update, uuid)))
    }

    fn delete_update(&self, event: &WatchEvent) -> Result<Option<(RowUpdate, String)>, MonitorError> {
        if !self.mcr.select().delete() {
            return Ok(None);
        }
        let raw = event.prev_value.as_deref().ok_or_else(|| MonitorError::MalformedRow {
            reason: "delete event has no previous value".to_string(),
        })?;
        let (row, uuid) = self.prepare_row(raw)?;
        if !self.is_v1 {
            // The v2+ contract defines <row> as a null object for deletes;
            // the pre-image is only decoded for its uuid.
            return Ok(Some((RowUpdate::deleted(), uuid)));
        }
        if row.is_empty() {
            return Ok(None);
        }
        Ok(Some((RowUpdate::old_row(row), uuid)))
    }

    fn modify_update(&self, event: &WatchEvent) -> Result<Option<(RowUpdate, String)>, MonitorError> {
        if !self.mcr.select().modify() {
            return Ok(None);
        }
        let raw = event.value.as_deref().ok_or_else(|| MonitorError::MalformedRow {
            reason: "modify event has no current value".to_string(),
        })?;
        let prev_raw = event.prev_value.as_deref().ok_or_else(|| MonitorError::MalformedRow {
            reason: "modify event has no previous value".to_string(),
        })?;

        let (modified, uuid) = self.prepare_row(raw)?;
        let (previous, prev_uuid) = self.prepare_row(prev_raw)?;
        if uuid != prev_uuid {
            return Err(MonitorError::UuidChanged {
                prev: prev_uuid,
                new: uuid,
            });
        }

        let delta = diff::row_delta(&modified, &previous, &self.table_schema, self.is_v1)?;
        if delta.is_empty() {
            return Ok(None);
        }
        let update = if self.is_v1 {
            RowUpdate::modified(modified, delta)
        } else {
            RowUpdate::modify(delta)
        };
        Ok(Some((update, uuid)))
    }

    /// Decode and project a stored payload.
    fn prepare_row(&self, raw: &[u8]) -> Result<(Row, String), MonitorError> {
        let (row, uuid) = codec::decode_row(raw)?;
        Ok((codec::project(row, self.mcr.projection()), uuid))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use alder_ovsjson::MonitorSelect;
    use alder_schema::ColumnKind;
    use alder_schema::ColumnSchema;
    use serde_json::Value;
    use serde_json::json;

    use super::*;

    fn table_schema() -> Arc<TableSchema> {
        let columns = [
            ("c1", ColumnKind::Scalar),
            ("c2", ColumnKind::Scalar),
            ("c3", ColumnKind::Scalar),
            ("s", ColumnKind::Set),
            ("m", ColumnKind::Map),
        ];
        Arc::new(TableSchema {
            name: "table".to_string(),
            columns: columns
                .iter()
                .map(|(name, kind)| (name.to_string(), ColumnSchema { kind: *kind }))
                .collect::<HashMap<_, _>>(),
        })
    }

    fn updater(columns: &[&str], is_v1: bool) -> Updater {
        let mcr = MonitorCondRequest {
            columns: if columns.is_empty() {
                None
            } else {
                Some(columns.iter().map(|c| c.to_string()).collect())
            },
            ..Default::default()
        };
        Updater::new(mcr, "jv-key", table_schema(), is_v1)
    }

    fn updater_with_select(select: MonitorSelect, is_v1: bool) -> Updater {
        let mcr = MonitorCondRequest {
            select: Some(select),
            ..Default::default()
        };
        Updater::new(mcr, "jv-key", table_schema(), is_v1)
    }

    fn encode(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    fn row_u1(columns: Value) -> Vec<u8> {
        let mut object = columns.as_object().unwrap().clone();
        object.insert("_uuid".to_string(), json!(["uuid", "U1"]));
        encode(Value::Object(object))
    }

    #[test]
    fn v1_create_all_columns() {
        let event = WatchEvent::create("k/db/table/U1", row_u1(json!({"c1": "v1", "c2": "v2"})));
        let (update, uuid) = updater(&[], true).on_event(&event).unwrap().unwrap();
        assert_eq!(uuid, "U1");
        assert!(update.valid_for_v1());
        assert_eq!(update.new.unwrap(), json!({"c1": "v1", "c2": "v2"}).as_object().unwrap().clone());
        assert!(update.old.is_none());
    }

    #[test]
    fn v1_modify_projected_column() {
        let event = WatchEvent::modify(
            "k/db/table/U1",
            row_u1(json!({"c1": "v1", "c2": "v3"})),
            row_u1(json!({"c1": "v1", "c2": "v2"})),
        );
        let (update, uuid) = updater(&["c2"], true).on_event(&event).unwrap().unwrap();
        assert_eq!(uuid, "U1");
        assert_eq!(update.new.unwrap(), json!({"c2": "v3"}).as_object().unwrap().clone());
        assert_eq!(update.old.unwrap(), json!({"c2": "v2"}).as_object().unwrap().clone());
    }

    #[test]
    fn v2_delete_all_columns() {
        let event = WatchEvent::delete("k/db/table/U1", row_u1(json!({"c1": "v1", "c2": "v2"})));
        let (update, uuid) = updater(&[], false).on_event(&event).unwrap().unwrap();
        assert_eq!(uuid, "U1");
        assert_eq!(update, RowUpdate::deleted());
    }

    #[test]
    fn v2_create_with_absent_projection_emits_nothing() {
        let event = WatchEvent::create("k/db/table/U1", row_u1(json!({"c1": "v1", "c2": "v2"})));
        assert!(updater(&["c3"], false).on_event(&event).unwrap().is_none());
    }

    #[test]
    fn v2_map_modify_delta() {
        let event = WatchEvent::modify(
            "k/db/table/U1",
            row_u1(json!({"m": ["map", [["a", 1], ["b", 3], ["c", 4]]]})),
            row_u1(json!({"m": ["map", [["a", 1], ["b", 2]]]})),
        );
        let (update, _) = updater(&[], false).on_event(&event).unwrap().unwrap();
        let delta = update.modify.unwrap();
        let entries = alder_schema::decode_map(&delta["m"]).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.contains(&(json!("b"), json!(3))));
        assert!(entries.contains(&(json!("c"), json!(4))));
    }

    #[test]
    fn v1_set_modify_delta_is_symmetric_difference() {
        let event = WatchEvent::modify(
            "k/db/table/U1",
            row_u1(json!({"s": ["set", [2, 3, 4]]})),
            row_u1(json!({"s": ["set", [1, 2, 3]]})),
        );
        let (update, _) = updater(&[], true).on_event(&event).unwrap().unwrap();
        assert_eq!(
            update.new.unwrap()["s"],
            json!(["set", [2, 3, 4]]),
        );
        let old = update.old.unwrap();
        let elements = alder_schema::decode_set(&old["s"]).unwrap();
        assert_eq!(elements.len(), 2);
        assert!(elements.contains(&json!(1)));
        assert!(elements.contains(&json!(4)));
    }

    #[test]
    fn modify_with_equal_projection_emits_nothing() {
        let event = WatchEvent::modify(
            "k/db/table/U1",
            row_u1(json!({"c1": "v1", "c2": "v3"})),
            row_u1(json!({"c1": "v1", "c2": "v2"})),
        );
        assert!(updater(&["c1"], false).on_event(&event).unwrap().is_none());
    }

    #[test]
    fn modify_with_changed_uuid_is_an_error() {
        let mut post = json!({"c1": "v1"}).as_object().unwrap().clone();
        post.insert("_uuid".to_string(), json!(["uuid", "U2"]));
        let event = WatchEvent::modify(
            "k/db/table/U1",
            encode(Value::Object(post)),
            row_u1(json!({"c1": "v0"})),
        );
        let err = updater(&[], false).on_event(&event).unwrap_err();
        assert_eq!(
            err,
            MonitorError::UuidChanged {
                prev: "U1".to_string(),
                new: "U2".to_string(),
            }
        );
    }

    #[test]
    fn selection_gates_suppress_events() {
        let off = Some(false);
        let create = WatchEvent::create("k", row_u1(json!({"c1": "v1"})));
        let delete = WatchEvent::delete("k", row_u1(json!({"c1": "v1"})));
        let modify = WatchEvent::modify("k", row_u1(json!({"c1": "v2"})), row_u1(json!({"c1": "v1"})));

        let no_insert = updater_with_select(MonitorSelect { insert: off, ..Default::default() }, false);
        assert!(no_insert.on_event(&create).unwrap().is_none());

        let no_delete = updater_with_select(MonitorSelect { delete: off, ..Default::default() }, false);
        assert!(no_delete.on_event(&delete).unwrap().is_none());

        let no_modify = updater_with_select(MonitorSelect { modify: off, ..Default::default() }, false);
        assert!(no_modify.on_event(&modify).unwrap().is_none());
    }

    #[test]
    fn initial_rows_respect_gate_and_variant() {
        let raw = row_u1(json!({"c1": "v1"}));

        let (v1, uuid) = updater(&[], true).on_initial(&raw).unwrap().unwrap();
        assert_eq!(uuid, "U1");
        assert!(v1.new.is_some());

        let (v2, _) = updater(&[], false).on_initial(&raw).unwrap().unwrap();
        assert!(v2.initial.is_some());

        let gated = updater_with_select(
            MonitorSelect {
                initial: Some(false),
                ..Default::default()
            },
            false,
        );
        assert!(gated.on_initial(&raw).unwrap().is_none());
    }

    #[test]
    fn v1_delete_with_empty_projection_emits_nothing() {
        let event = WatchEvent::delete("k/db/table/U1", row_u1(json!({"c1": "v1"})));
        assert!(updater(&["c3"], true).on_event(&event).unwrap().is_none());
    }

    #[test]
    fn v2_delete_with_empty_projection_still_emits() {
        let event = WatchEvent::delete("k/db/table/U1", row_u1(json!({"c1": "v1"})));
        let (update, uuid) = updater(&["c3"], false).on_event(&event).unwrap().unwrap();
        assert_eq!(update, RowUpdate::deleted());
        assert_eq!(uuid, "U1");
    }
}
