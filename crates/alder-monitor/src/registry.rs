//! Routing index from table keys to active updaters.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Mutex;

use alder_store::TableKey;

use crate::Updater;

/// Per-database map from table key to the updaters registered for it.
///
/// OVSDB allows an array of condition requests per monitored table and many
/// clients may monitor the same table, so each slot holds a list. Writes
/// (add/remove) and reads (lookup during dispatch) serialize on one mutex;
/// `lookup` clones the slot so the lock is never held across updater work.
pub struct UpdaterRegistry {
    inner: Mutex<HashMap<TableKey, Vec<Updater>>>,
}

impl UpdaterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        UpdaterRegistry {
            inner: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TableKey, Vec<Updater>>> {
        // The map has no invariants a panicking holder could break.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register updaters, appending to each table's slot. An updater that is
    /// deep-equal to one already registered for the same table is skipped.
    pub fn add(&self, updaters: HashMap<TableKey, Vec<Updater>>) {
        let mut inner = self.lock();
        for (key, incoming) in updaters {
            let slot = inner.entry(key).or_default();
            for updater in incoming {
                if slot.contains(&updater) {
                    continue;
                }
                slot.push(updater);
            }
        }
    }

    /// Drop every updater with the given correlation key from the given
    /// tables, deleting slots that become empty.
    pub fn remove(&self, keys: &[TableKey], json_value_key: &str) {
        let mut inner = self.lock();
        for key in keys {
            if let Some(slot) = inner.get_mut(key) {
                slot.retain(|updater| updater.json_value_key() != json_value_key);
                if slot.is_empty() {
                    inner.remove(key);
                }
            }
        }
    }

    /// A stable snapshot of the updaters registered for a table.
    pub fn lookup(&self, key: &TableKey) -> Vec<Updater> {
        self.lock().get(key).cloned().unwrap_or_default()
    }

    /// The distinct correlation keys of every registered updater.
    pub fn json_value_keys(&self) -> HashSet<String> {
        self.lock()
            .values()
            .flatten()
            .map(|updater| updater.json_value_key().to_string())
            .collect()
    }

    /// Clear the registry, returning the correlation keys that were
    /// registered. Used by the watch cancellation path to notify every
    /// affected client exactly once.
    pub fn drain_json_value_keys(&self) -> HashSet<String> {
        let mut inner = self.lock();
        let keys = inner
            .values()
            .flatten()
            .map(|updater| updater.json_value_key().to_string())
            .collect();
        inner.clear();
        keys
    }

    /// Whether any updater is registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Default for UpdaterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
