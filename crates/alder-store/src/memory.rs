//! Deterministic in-memory backing store.
//!
//! Implements the `StoreClient` seam over a `BTreeMap` with a monotonic
//! revision counter and watch fan-out. Every write batch commits at one
//! revision and is delivered as one `WatchBatch` to each watcher whose
//! prefix matches, with previous values captured for modify and delete.
//! Used by the test suites and by the standalone server mode; a production
//! deployment points `StoreClient` at the real distributed store instead.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::StoreClient;
use crate::StoreError;
use crate::StoreSnapshot;
use crate::WatchBatch;
use crate::WatchEvent;
use crate::WatchSubscription;

/// Buffered batches per watcher before the store write path blocks.
const WATCH_CHANNEL_SIZE: usize = 64;

/// One write in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Set `key` to `value`, creating or modifying the row.
    Put {
        /// The row key.
        key: String,
        /// The encoded row payload.
        value: Vec<u8>,
    },
    /// Remove `key`; a no-op if the row does not exist.
    Delete {
        /// The row key.
        key: String,
    },
}

struct Watcher {
    prefix: String,
    tx: mpsc::Sender<WatchBatch>,
    cancel: CancellationToken,
}

struct Inner {
    data: BTreeMap<String, Vec<u8>>,
    revision: i64,
    watchers: Vec<Watcher>,
}

/// In-memory `StoreClient` with revisioned watch fan-out.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store at revision 0.
    pub fn new() -> Self {
        MemoryStore {
            inner: Mutex::new(Inner {
                data: BTreeMap::new(),
                revision: 0,
                watchers: Vec::new(),
            }),
        }
    }

    /// Set a single key; returns the commit revision.
    pub async fn put(&self, key: &str, value: Vec<u8>) -> i64 {
        self.apply(vec![WriteOp::Put {
            key: key.to_string(),
            value,
        }])
        .await
    }

    /// Delete a single key; returns the commit revision.
    pub async fn delete(&self, key: &str) -> i64 {
        self.apply(vec![WriteOp::Delete { key: key.to_string() }]).await
    }

    /// Apply a batch of writes at one revision and fan the resulting events
    /// out to matching watchers. Returns the commit revision.
    pub async fn apply(&self, ops: Vec<WriteOp>) -> i64 {
        let mut inner = self.inner.lock().await;
        inner.revision += 1;
        let revision = inner.revision;

        let mut events = Vec::with_capacity(ops.len());
        for op in ops {
            match op {
                WriteOp::Put { key, value } => {
                    let prev = inner.data.insert(key.clone(), value.clone());
                    let event = match prev {
                        Some(prev_value) => WatchEvent::modify(key, value, prev_value),
                        None => WatchEvent::create(key, value),
                    };
                    events.push(event);
                }
                WriteOp::Delete { key } => {
                    if let Some(prev_value) = inner.data.remove(&key) {
                        events.push(WatchEvent::delete(key, prev_value));
                    }
                }
            }
        }

        deliver(&mut inner.watchers, &events, revision).await;
        revision
    }

    /// Close every watch, delivering the terminal canceled batch. Simulates
    /// the store dropping its watchers (remote cancellation, compaction).
    pub async fn cancel_watches(&self) {
        let mut inner = self.inner.lock().await;
        for watcher in inner.watchers.drain(..) {
            let _ = watcher.tx.send(WatchBatch::canceled()).await;
            watcher.cancel.cancel();
        }
    }

    /// The current revision.
    pub async fn revision(&self) -> i64 {
        self.inner.lock().await.revision
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

async fn deliver(watchers: &mut Vec<Watcher>, events: &[WatchEvent], revision: i64) {
    let mut live = Vec::with_capacity(watchers.len());
    for watcher in watchers.drain(..) {
        if watcher.cancel.is_cancelled() {
            debug!(prefix = %watcher.prefix, "dropping cancelled watcher");
            continue;
        }
        let matched: Vec<WatchEvent> = events
            .iter()
            .filter(|event| event.key.starts_with(&watcher.prefix))
            .cloned()
            .collect();
        if matched.is_empty() {
            live.push(watcher);
            continue;
        }
        let batch = WatchBatch {
            events: matched,
            revision,
            canceled: false,
        };
        match watcher.tx.send(batch).await {
            Ok(()) => live.push(watcher),
            Err(_) => debug!(prefix = %watcher.prefix, "dropping watcher with closed channel"),
        }
    }
    *watchers = live;
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn snapshot(&self, prefix: &str) -> Result<StoreSnapshot, StoreError> {
        let inner = self.inner.lock().await;
        let rows = inner
            .data
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Ok(StoreSnapshot {
            rows,
            revision: inner.revision,
        })
    }

    async fn watch(&self, prefix: &str, _start_revision: i64) -> Result<WatchSubscription, StoreError> {
        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_SIZE);
        let cancel = CancellationToken::new();
        let mut inner = self.inner.lock().await;
        inner.watchers.push(Watcher {
            prefix: prefix.to_string(),
            tx,
            cancel: cancel.clone(),
        });
        Ok(WatchSubscription { batches: rx, cancel })
    }
}
