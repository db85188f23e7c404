//! Loaded schemas, the store client, and per-database watch loops.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use alder_monitor::DbWatcher;
use alder_monitor::NotificationSink;
use alder_schema::DatabaseSchema;
use alder_schema::SchemaError;
use alder_store::KEY_DELIMITER;
use alder_store::StoreClient;
use alder_store::TableKey;
use anyhow::Context;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::info;

/// The server's databases: their schemas, the backing store they live in,
/// and the watch loop each one runs.
///
/// Schemas are loaded once at startup and immutable afterwards. Watch loops
/// start lazily with the first monitor on a database and are replaced if the
/// store cancels them.
pub struct Database {
    prefix: String,
    store: Arc<dyn StoreClient>,
    schemas: HashMap<String, DatabaseSchema>,
    watchers: Mutex<HashMap<String, Arc<DbWatcher>>>,
}

impl Database {
    /// Create an empty database set over a store client. `prefix` is the
    /// process-wide key prefix from the configuration.
    pub fn new(store: Arc<dyn StoreClient>, prefix: impl Into<String>) -> Self {
        Database {
            prefix: prefix.into(),
            store,
            schemas: HashMap::new(),
            watchers: Mutex::new(HashMap::new()),
        }
    }

    /// Register a parsed schema document.
    pub fn add_schema(&mut self, raw: Value) -> Result<(), SchemaError> {
        let schema = DatabaseSchema::from_value(raw)?;
        info!(database = %schema.name, "schema loaded");
        self.schemas.insert(schema.name.clone(), schema);
        Ok(())
    }

    /// Load a schema document from disk.
    pub fn add_schema_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading schema file {}", path.display()))?;
        let raw: Value =
            serde_json::from_str(&text).with_context(|| format!("parsing schema file {}", path.display()))?;
        self.add_schema(raw)?;
        Ok(())
    }

    /// The schema of a database, if loaded.
    pub fn schema(&self, database: &str) -> Option<&DatabaseSchema> {
        self.schemas.get(database)
    }

    /// Names of all loaded databases, sorted.
    pub fn database_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemas.keys().cloned().collect();
        names.sort();
        names
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn StoreClient> {
        &self.store
    }

    /// The process-wide key prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The table key for a table of one of this server's databases.
    pub fn table_key(&self, database: &str, table: &str) -> TableKey {
        TableKey::new(&self.prefix, database, table)
    }

    /// The running watcher for a database, starting (or restarting after a
    /// store-side cancel) its watch loop if needed.
    pub async fn ensure_watcher(
        &self,
        database: &str,
        sink: Arc<dyn NotificationSink>,
    ) -> anyhow::Result<Arc<DbWatcher>> {
        let mut watchers = self.watchers.lock().await;
        if let Some(watcher) = watchers.get(database) {
            if !watcher.cancel_token().is_cancelled() {
                return Ok(Arc::clone(watcher));
            }
        }

        let watch_prefix = format!("{}{d}{}{d}", self.prefix, database, d = KEY_DELIMITER);
        let subscription = self
            .store
            .watch(&watch_prefix, 0)
            .await
            .with_context(|| format!("arming watch on '{watch_prefix}'"))?;
        let watcher = DbWatcher::new(&self.prefix, database);
        Arc::clone(&watcher).start(subscription, sink);
        watchers.insert(database.to_string(), Arc::clone(&watcher));
        Ok(watcher)
    }

    /// The running watcher for a database, if any.
    pub async fn watcher(&self, database: &str) -> Option<Arc<DbWatcher>> {
        self.watchers.lock().await.get(database).cloned()
    }
}
