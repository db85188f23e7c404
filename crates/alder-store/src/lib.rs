//! Backing-store contract for alder.
//!
//! Rows live in a distributed key-value store under
//! `<prefix>/<database>/<table>/<uuid>` keys. The monitor pipeline consumes
//! the store through a narrow seam: prefix snapshots at a revision, and a
//! watch channel delivering revision-tagged event batches with previous
//! values on modify and delete. This crate defines that seam plus the key
//! path model, and ships a deterministic in-memory store used by the test
//! suites and the standalone server mode.

mod event;
mod key;
mod memory;

pub use event::EventKind;
pub use event::StoreSnapshot;
pub use event::WatchBatch;
pub use event::WatchEvent;
pub use event::WatchSubscription;
pub use key::KEY_DELIMITER;
pub use key::Key;
pub use key::KeyError;
pub use key::TableKey;
pub use memory::MemoryStore;
pub use memory::WriteOp;

use async_trait::async_trait;
use thiserror::Error;

/// Backing-store failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("backing store unavailable: {reason}")]
    Unavailable {
        /// Connection or transport failure description.
        reason: String,
    },

    /// The store rejected or failed the operation.
    #[error("backing store operation failed: {reason}")]
    Failed {
        /// Failure description from the store.
        reason: String,
    },
}

/// The store operations the monitor subsystem consumes.
///
/// Implementations must deliver watch batches in revision order and tag each
/// snapshot with the revision it was taken at, so a watch armed after a
/// snapshot splices cleanly with the live stream.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Read every key under `prefix` together with the snapshot revision.
    async fn snapshot(&self, prefix: &str) -> Result<StoreSnapshot, StoreError>;

    /// Watch every key under `prefix` for changes after `start_revision`.
    async fn watch(&self, prefix: &str, start_revision: i64) -> Result<WatchSubscription, StoreError>;
}
