//! OVSDB JSON wire types.
//!
//! This crate defines the JSON shapes alder exchanges with OVSDB clients:
//! monitor requests (`monitor`, `monitor_cond`, `monitor_cond_since`) and the
//! notification payload hierarchy (`TableUpdates` -> `TableUpdate` ->
//! `RowUpdate`). It is deliberately free of server logic so both the monitor
//! pipeline and the tests can depend on it without pulling in the runtime.
//!
//! Selection flags are tri-state: an absent flag is not the same as `false`.
//! `MonitorSelect` therefore keeps `Option<bool>` fields and resolves the
//! OVSDB default (absent means selected) at read time.

mod request;
mod update;

pub use request::CondMonitorParameters;
pub use request::MonitorCondRequest;
pub use request::MonitorSelect;
pub use request::ParamsError;
pub use request::json_value_key;
pub use update::Row;
pub use update::RowUpdate;
pub use update::TableUpdate;
pub use update::TableUpdates;

/// The all-zero UUID, used as the null transaction id in `update3` and in
/// `monitor_cond_since` replies.
pub const ZERO_UUID: &str = "00000000-0000-0000-0000-000000000000";

/// Notification method for v1 monitors.
pub const UPDATE: &str = "update";

/// Notification method for v2 (`monitor_cond`) monitors.
pub const UPDATE2: &str = "update2";

/// Notification method for v3 (`monitor_cond_since`) monitors.
pub const UPDATE3: &str = "update3";

/// Notification sent when the server drops a monitor on its own initiative.
pub const MONITOR_CANCELED: &str = "monitor_canceled";

/// Which notification shape a monitor was registered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateNotificationType {
    /// `monitor` -> `update` notifications, v1 row shape.
    Update,
    /// `monitor_cond` -> `update2` notifications.
    Update2,
    /// `monitor_cond_since` -> `update3` notifications.
    Update3,
}

impl UpdateNotificationType {
    /// The JSON-RPC method name for this variant's push notification.
    pub fn method(&self) -> &'static str {
        match self {
            UpdateNotificationType::Update => UPDATE,
            UpdateNotificationType::Update2 => UPDATE2,
            UpdateNotificationType::Update3 => UPDATE3,
        }
    }

    /// True for the v1 notification shape (`New`/`Old` rows).
    pub fn is_v1(&self) -> bool {
        matches!(self, UpdateNotificationType::Update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names() {
        assert_eq!(UpdateNotificationType::Update.method(), "update");
        assert_eq!(UpdateNotificationType::Update2.method(), "update2");
        assert_eq!(UpdateNotificationType::Update3.method(), "update3");
    }

    #[test]
    fn only_v1_is_v1() {
        assert!(UpdateNotificationType::Update.is_v1());
        assert!(!UpdateNotificationType::Update2.is_v1());
        assert!(!UpdateNotificationType::Update3.is_v1());
    }

    #[test]
    fn zero_uuid_is_all_zero() {
        assert_eq!(ZERO_UUID.len(), 36);
        assert!(ZERO_UUID.chars().all(|c| c == '0' || c == '-'));
    }
}
