//! Watch events, batches, and snapshot shapes.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// What happened to a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// The key did not exist before.
    Create,
    /// The key existed and its value changed.
    Modify,
    /// The key was removed.
    Delete,
}

/// One row change from the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// The change kind.
    pub kind: EventKind,
    /// The row key the change applies to.
    pub key: String,
    /// The current value; absent for deletes.
    pub value: Option<Vec<u8>>,
    /// The previous value; present for modify and delete.
    pub prev_value: Option<Vec<u8>>,
}

impl WatchEvent {
    /// A creation event carrying the new value.
    pub fn create(key: impl Into<String>, value: Vec<u8>) -> Self {
        WatchEvent {
            kind: EventKind::Create,
            key: key.into(),
            value: Some(value),
            prev_value: None,
        }
    }

    /// A modification event carrying both values.
    pub fn modify(key: impl Into<String>, value: Vec<u8>, prev_value: Vec<u8>) -> Self {
        WatchEvent {
            kind: EventKind::Modify,
            key: key.into(),
            value: Some(value),
            prev_value: Some(prev_value),
        }
    }

    /// A deletion event carrying the previous value.
    pub fn delete(key: impl Into<String>, prev_value: Vec<u8>) -> Self {
        WatchEvent {
            kind: EventKind::Delete,
            key: key.into(),
            value: None,
            prev_value: Some(prev_value),
        }
    }
}

/// A batch of events that committed at one revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchBatch {
    /// The events, in commit order.
    pub events: Vec<WatchEvent>,
    /// The revision all events in the batch carry.
    pub revision: i64,
    /// Set when the store closed the watch; no further batches follow.
    pub canceled: bool,
}

impl WatchBatch {
    /// The terminal batch the store sends when it closes a watch.
    pub fn canceled() -> Self {
        WatchBatch {
            events: Vec::new(),
            revision: 0,
            canceled: true,
        }
    }
}

/// A live watch: a channel of batches plus the handle that stops it.
pub struct WatchSubscription {
    /// Revision-ordered batches from the store.
    pub batches: mpsc::Receiver<WatchBatch>,
    /// Cancel to stop the watch from the consumer side.
    pub cancel: CancellationToken,
}

/// A consistent prefix read: rows plus the revision they were read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSnapshot {
    /// Key/value pairs under the requested prefix.
    pub rows: Vec<(String, Vec<u8>)>,
    /// The revision the snapshot was taken at.
    pub revision: i64,
}
