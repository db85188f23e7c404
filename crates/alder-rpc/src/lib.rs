//! JSON-RPC transport for alder.
//!
//! OVSDB clients speak JSON-RPC 1.0 over a plain TCP stream: back-to-back
//! JSON values with no framing beyond the values themselves. Requests carry
//! `method`/`params`/`id`; notifications are requests with a null id; both
//! directions may push. This crate provides the listener, the per-connection
//! read loop, a serialized writer task (so replies and server-push
//! notifications interleave safely), and the [`RpcService`] seam the session
//! layer implements.

mod codec;
mod connection;
mod message;
mod server;

pub use codec::MAX_FRAME_BYTES;
pub use codec::split_frames;
pub use connection::ClientHandle;
pub use message::Frame;
pub use message::Request;
pub use message::Response;
pub use server::RpcServer;
pub use server::RpcService;
pub use server::RpcServiceFactory;

use serde_json::Value;
use thiserror::Error;

/// Errors surfaced to clients as JSON-RPC error replies.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// The request named a method this server does not provide.
    #[error("unknown method '{method}'")]
    MethodNotFound {
        /// The method the client asked for.
        method: String,
    },

    /// The request was understood but could not be satisfied.
    #[error("{reason}")]
    Failed {
        /// Failure description, sent verbatim as the error value.
        reason: String,
    },
}

impl RpcError {
    /// Convenience constructor for application failures.
    pub fn failed(reason: impl Into<String>) -> Self {
        RpcError::Failed { reason: reason.into() }
    }

    /// The JSON value placed in the reply's `error` member.
    pub fn payload(&self) -> Value {
        Value::String(self.to_string())
    }
}
