//! Monitor pipeline error taxonomy.
//!
//! Everything here is locally recoverable: the watch loop logs and skips the
//! offending row or column and the stream continues. Errors surfaced to
//! clients (duplicate monitor, unknown monitor) live in the session layer.

use alder_schema::SchemaError;
use thiserror::Error;

/// Failures while turning a KV event into a row update.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// A stored row could not be decoded or lacks a valid `_uuid`.
    #[error("malformed row: {reason}")]
    MalformedRow {
        /// What was wrong with the payload.
        reason: String,
    },

    /// Schema lookup or typed value decode failed inside the diff engine.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A modify event's pre- and post-image uuids disagree.
    #[error("row uuid changed: previous '{prev}', new '{new}'")]
    UuidChanged {
        /// Uuid carried by the pre-image.
        prev: String,
        /// Uuid carried by the post-image.
        new: String,
    },
}
