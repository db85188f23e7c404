//! Per-database watch loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use alder_ovsjson::TableUpdates;
use alder_store::Key;
use alder_store::WatchBatch;
use alder_store::WatchEvent;
use alder_store::WatchSubscription;
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::UpdaterRegistry;

/// Where the watch loop hands off grouped updates.
///
/// The loop knows clients only by correlation key; the session layer owns the
/// key-to-notifier mapping. This keeps the handler/monitor relationship
/// acyclic: the loop dispatches through the registry and this seam, never
/// through session state.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Enqueue a batch of table updates for the client behind `json_value_key`.
    async fn deliver(&self, json_value_key: &str, updates: TableUpdates);

    /// Tell the client behind `json_value_key` that its monitor is gone.
    async fn monitor_canceled(&self, json_value_key: &str);
}

/// Monotonic high-water mark of processed revisions.
pub struct RevisionChecker {
    revision: Mutex<i64>,
}

impl RevisionChecker {
    /// Start below any real revision.
    pub fn new() -> Self {
        RevisionChecker {
            revision: Mutex::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, i64> {
        self.revision.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Advance to `revision` if it is newer than everything seen; returns
    /// false for duplicates and stale revisions.
    pub fn is_new_revision(&self, revision: i64) -> bool {
        let mut current = self.lock();
        if revision > *current {
            *current = revision;
            true
        } else {
            false
        }
    }

    /// Record an externally observed revision (a snapshot) without requiring
    /// it to be new.
    pub fn observe(&self, revision: i64) {
        let mut current = self.lock();
        if revision > *current {
            *current = revision;
        }
    }

    /// The highest revision processed so far.
    pub fn current(&self) -> i64 {
        *self.lock()
    }
}

impl Default for RevisionChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// One watch loop per database.
///
/// Owns the routing registry and the revision checker; consumes the store's
/// watch subscription and fans grouped updates out through a
/// [`NotificationSink`]. Transport I/O never happens here.
pub struct DbWatcher {
    prefix: String,
    database: String,
    registry: UpdaterRegistry,
    revisions: RevisionChecker,
    arm_lock: tokio::sync::Mutex<()>,
    cancel: CancellationToken,
}

impl DbWatcher {
    /// Create a watcher for `database` under the store `prefix`.
    pub fn new(prefix: &str, database: &str) -> Arc<Self> {
        Arc::new(DbWatcher {
            prefix: prefix.to_string(),
            database: database.to_string(),
            registry: UpdaterRegistry::new(),
            revisions: RevisionChecker::new(),
            arm_lock: tokio::sync::Mutex::new(()),
            cancel: CancellationToken::new(),
        })
    }

    /// The database this watcher serves.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// The routing registry monitors register into.
    pub fn registry(&self) -> &UpdaterRegistry {
        &self.registry
    }

    /// Cancelling this token stops the loop without a store-side cancel.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Hold batch processing while a monitor takes its snapshot and
    /// registers. Guarantees no live event is dropped or duplicated relative
    /// to the snapshot: events stay queued until the guard drops, and the
    /// snapshot revision recorded via [`DbWatcher::observe_revision`] makes
    /// the checker drop anything the snapshot already contains.
    pub async fn pause(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.arm_lock.lock().await
    }

    /// Seed the revision checker with a snapshot revision.
    pub fn observe_revision(&self, revision: i64) {
        self.revisions.observe(revision);
    }

    /// Spawn the loop over a store subscription.
    pub fn start(self: Arc<Self>, mut subscription: WatchSubscription, sink: Arc<dyn NotificationSink>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(database = %self.database, "watch loop started");
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        debug!(database = %self.database, "watch loop stopped");
                        break;
                    }
                    batch = subscription.batches.recv() => match batch {
                        Some(batch) if batch.canceled => {
                            self.run_cancellation(sink.as_ref()).await;
                            break;
                        }
                        Some(batch) => self.process_batch(batch, sink.as_ref()).await,
                        None => {
                            self.run_cancellation(sink.as_ref()).await;
                            break;
                        }
                    }
                }
            }
        })
    }

    async fn process_batch(&self, batch: WatchBatch, sink: &dyn NotificationSink) {
        if batch.events.is_empty() {
            return;
        }
        let _arm = self.arm_lock.lock().await;
        if !self.revisions.is_new_revision(batch.revision) {
            debug!(
                database = %self.database,
                revision = batch.revision,
                current = self.revisions.current(),
                "dropping batch at stale revision"
            );
            return;
        }
        for (json_value_key, updates) in self.prepare_table_updates(&batch.events) {
            sink.deliver(&json_value_key, updates).await;
        }
    }

    /// Route a batch's events through the registry, accumulating
    /// `json_value_key -> table -> uuid -> RowUpdate`. Within a batch, a
    /// later emission for the same row wins.
    fn prepare_table_updates(&self, events: &[WatchEvent]) -> HashMap<String, TableUpdates> {
        let mut result: HashMap<String, TableUpdates> = HashMap::new();
        for event in events {
            let key = match Key::parse(&self.prefix, &event.key) {
                Ok(key) => key,
                Err(err) => {
                    warn!(error = %err, "skipping event with unparsable key");
                    continue;
                }
            };
            let updaters = self.registry.lookup(&key.table_key());
            if updaters.is_empty() {
                debug!(table = %key.table(), "no monitors for table");
                continue;
            }
            for updater in updaters {
                let (row_update, uuid) = match updater.on_event(event) {
                    Ok(Some(emitted)) => emitted,
                    Ok(None) => continue,
                    Err(err) => {
                        warn!(error = %err, key = %event.key, "skipping row update");
                        continue;
                    }
                };
                let table_update = result
                    .entry(updater.json_value_key().to_string())
                    .or_default()
                    .entry(key.table().to_string())
                    .or_default();
                if table_update.contains_key(&uuid) {
                    info!(table = %key.table(), uuid = %uuid, "row updated twice in one batch, keeping the later event");
                }
                table_update.insert(uuid.clone(), row_update);
            }
        }
        result
    }

    /// The store closed the watch: cancel the loop's context, clear the
    /// registry, and tell every affected client exactly once.
    async fn run_cancellation(&self, sink: &dyn NotificationSink) {
        info!(database = %self.database, "watch canceled by the store");
        self.cancel.cancel();
        for json_value_key in self.registry.drain_json_value_keys() {
            sink.monitor_canceled(&json_value_key).await;
        }
    }
}
