//! Per-connection outbound handle.

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::RpcError;
use crate::message::Response;
use crate::message::notification_frame;

/// Handle to one client connection's outbound side.
///
/// All writes funnel through the connection's writer task, so replies and
/// server-push notifications never interleave mid-frame. Cloneable and cheap;
/// the session layer and every notifier of the connection share it.
#[derive(Clone)]
pub struct ClientHandle {
    outbound: mpsc::Sender<Value>,
    cancel: CancellationToken,
    peer: String,
}

impl ClientHandle {
    pub(crate) fn new(outbound: mpsc::Sender<Value>, cancel: CancellationToken, peer: String) -> Self {
        ClientHandle { outbound, cancel, peer }
    }

    /// The remote address, for logging.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Fires when the connection goes away; notifiers hang their shutdown
    /// off child tokens of this.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Push a notification (a request with a null id) to the client.
    pub async fn notify(&self, method: &str, params: Value) -> Result<(), RpcError> {
        self.send(notification_frame(method, params)).await
    }

    /// Queue a reply.
    pub async fn respond(&self, response: Response) -> Result<(), RpcError> {
        self.send(response.to_value()).await
    }

    async fn send(&self, frame: Value) -> Result<(), RpcError> {
        let closed = || RpcError::failed(format!("connection to {} is closed", self.peer));
        tokio::select! {
            _ = self.cancel.cancelled() => Err(closed()),
            sent = self.outbound.send(frame) => sent.map_err(|_| closed()),
        }
    }
}
