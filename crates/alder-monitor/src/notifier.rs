//! Per-client notification worker.

use std::sync::Arc;
use std::time::Duration;

use alder_ovsjson::MONITOR_CANCELED;
use alder_ovsjson::TableUpdates;
use alder_ovsjson::UpdateNotificationType;
use alder_ovsjson::ZERO_UUID;
use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

/// Outgoing notifications buffered per client before the watch loop blocks.
///
/// Backpressure is local to the client: filling this buffer stalls only the
/// delivery of that client's updates, not other notifiers.
pub const NOTIFICATION_CHANNEL_SIZE: usize = 256;

/// Startup delay so a monitor's initial reply reaches the client before its
/// first streamed update.
pub const NOTIFIER_GRACE_DELAY: Duration = Duration::from_millis(5);

/// The connection seam the notifier emits on. Implemented by the JSON-RPC
/// connection handle in the server.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    /// Push a notification (a request without an id) to the client.
    async fn notify(&self, method: &str, params: Value) -> anyhow::Result<()>;
}

enum Outgoing {
    Updates {
        updates: TableUpdates,
        done: Option<oneshot::Sender<()>>,
    },
    MonitorCanceled,
}

/// Handle for enqueueing notifications to one client monitor.
///
/// Cloneable; the worker task ends when every handle is dropped or the
/// connection's cancellation token fires.
#[derive(Clone)]
pub struct ClientNotifier {
    tx: mpsc::Sender<Outgoing>,
}

impl ClientNotifier {
    /// Spawn the worker for one monitor.
    ///
    /// `json_value` is the client's original correlation value, echoed in
    /// every notification. The returned handle feeds the worker; the
    /// `JoinHandle` completes when the worker exits.
    pub fn spawn(
        variant: UpdateNotificationType,
        json_value: Value,
        transport: Arc<dyn NotificationTransport>,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(NOTIFICATION_CHANNEL_SIZE);
        let worker = NotifierWorker {
            rx,
            variant,
            json_value,
            transport,
            cancel,
        };
        (ClientNotifier { tx }, tokio::spawn(worker.run()))
    }

    /// Enqueue a table-updates notification. Blocks when the buffer is full;
    /// returns false if the worker is gone. The optional `done` channel is
    /// signalled after the transport send (or on cancellation).
    pub async fn enqueue(&self, updates: TableUpdates, done: Option<oneshot::Sender<()>>) -> bool {
        self.tx.send(Outgoing::Updates { updates, done }).await.is_ok()
    }

    /// Enqueue the `monitor_canceled` notification.
    pub async fn enqueue_canceled(&self) -> bool {
        self.tx.send(Outgoing::MonitorCanceled).await.is_ok()
    }
}

struct NotifierWorker {
    rx: mpsc::Receiver<Outgoing>,
    variant: UpdateNotificationType,
    json_value: Value,
    transport: Arc<dyn NotificationTransport>,
    cancel: CancellationToken,
}

impl NotifierWorker {
    async fn run(mut self) {
        // Give the monitor call time to return its snapshot reply first.
        tokio::time::sleep(NOTIFIER_GRACE_DELAY).await;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.drain();
                    return;
                }
                event = self.rx.recv() => match event {
                    None => return,
                    Some(outgoing) => {
                        if self.cancel.is_cancelled() {
                            release(outgoing);
                            self.drain();
                            return;
                        }
                        self.emit(outgoing).await;
                    }
                }
            }
        }
    }

    async fn emit(&self, outgoing: Outgoing) {
        match outgoing {
            Outgoing::Updates { updates, done } => {
                debug!(method = self.variant.method(), "sending notification");
                let params = self.update_params(updates);
                if let Err(err) = self.transport.notify(self.variant.method(), params).await {
                    // The client may reconnect; the monitor is not torn down.
                    warn!(error = %err, "monitor notification failed");
                }
                if let Some(done) = done {
                    let _ = done.send(());
                }
            }
            Outgoing::MonitorCanceled => {
                if let Err(err) = self.transport.notify(MONITOR_CANCELED, self.json_value.clone()).await {
                    warn!(error = %err, "monitor_canceled notification failed");
                }
            }
        }
    }

    fn update_params(&self, updates: TableUpdates) -> Value {
        match self.variant {
            UpdateNotificationType::Update | UpdateNotificationType::Update2 => {
                json!([self.json_value, updates])
            }
            UpdateNotificationType::Update3 => json!([self.json_value, ZERO_UUID, updates]),
        }
    }

    /// Release wait handles of anything still queued so cancellation never
    /// leaks a waiter.
    fn drain(&mut self) {
        while let Ok(outgoing) = self.rx.try_recv() {
            release(outgoing);
        }
    }
}

fn release(outgoing: Outgoing) {
    if let Outgoing::Updates { done: Some(done), .. } = outgoing {
        let _ = done.send(());
    }
}
