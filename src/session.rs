//! Per-connection session handling for the OVSDB monitor protocol.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use alder_monitor::ClientNotifier;
use alder_monitor::NotificationSink;
use alder_monitor::NotificationTransport;
use alder_monitor::Updater;
use alder_ovsjson::CondMonitorParameters;
use alder_ovsjson::TableUpdate;
use alder_ovsjson::TableUpdates;
use alder_ovsjson::UpdateNotificationType;
use alder_ovsjson::ZERO_UUID;
use alder_ovsjson::json_value_key;
use alder_rpc::ClientHandle;
use alder_rpc::RpcError;
use alder_rpc::RpcService;
use alder_rpc::RpcServiceFactory;
use alder_store::TableKey;
use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::db::Database;

/// State shared by every connection: the databases and the notifier
/// directory the watch loops deliver through.
pub struct ServerState {
    /// Loaded schemas, store client, and per-database watch loops.
    pub db: Database,
    /// Correlation key to client notifier, across all connections.
    pub directory: Arc<NotifierDirectory>,
    /// This process's id, returned by `get_server_id`.
    pub server_id: String,
}

impl ServerState {
    /// Wrap a database set; generates the per-process server id.
    pub fn new(db: Database) -> Arc<Self> {
        Arc::new(ServerState {
            db,
            directory: Arc::new(NotifierDirectory::new()),
            server_id: uuid::Uuid::new_v4().to_string(),
        })
    }
}

/// Server-wide map from monitor correlation key to the client's notifier.
///
/// This is the [`NotificationSink`] the watch loops deliver through: they
/// know monitors only by correlation key, so the handler/monitor
/// relationship stays acyclic.
pub struct NotifierDirectory {
    inner: Mutex<HashMap<String, ClientNotifier>>,
}

impl NotifierDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        NotifierDirectory {
            inner: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ClientNotifier>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether a monitor with this correlation key exists anywhere on the
    /// server.
    pub fn contains(&self, json_value_key: &str) -> bool {
        self.lock().contains_key(json_value_key)
    }

    fn insert(&self, json_value_key: String, notifier: ClientNotifier) {
        self.lock().insert(json_value_key, notifier);
    }

    fn remove(&self, json_value_key: &str) -> Option<ClientNotifier> {
        self.lock().remove(json_value_key)
    }

    fn get(&self, json_value_key: &str) -> Option<ClientNotifier> {
        self.lock().get(json_value_key).cloned()
    }
}

impl Default for NotifierDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSink for NotifierDirectory {
    async fn deliver(&self, json_value_key: &str, updates: TableUpdates) {
        let notifier = self.get(json_value_key);
        match notifier {
            Some(notifier) => {
                if !notifier.enqueue(updates, None).await {
                    warn!(json_value_key, "notifier is gone, dropping updates");
                }
            }
            None => debug!(json_value_key, "no notifier registered, dropping updates"),
        }
    }

    async fn monitor_canceled(&self, json_value_key: &str) {
        if let Some(notifier) = self.remove(json_value_key) {
            notifier.enqueue_canceled().await;
        }
    }
}

/// Adapts the connection handle to the notifier's transport seam.
struct ClientTransport(ClientHandle);

#[async_trait]
impl NotificationTransport for ClientTransport {
    async fn notify(&self, method: &str, params: Value) -> anyhow::Result<()> {
        self.0.notify(method, params).await?;
        Ok(())
    }
}

/// Bookkeeping for one active monitor of this connection.
struct MonitorEntry {
    database: String,
    table_keys: Vec<TableKey>,
    cancel: CancellationToken,
}

/// One client connection's request handler.
pub struct Handler {
    state: Arc<ServerState>,
    client: ClientHandle,
    monitors: tokio::sync::Mutex<HashMap<String, MonitorEntry>>,
}

impl Handler {
    /// Create the handler for a new connection.
    pub fn new(state: Arc<ServerState>, client: ClientHandle) -> Self {
        Handler {
            state,
            client,
            monitors: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// The `monitor`/`monitor_cond`/`monitor_cond_since` core: build
    /// updaters, take a revision-stable snapshot, register, and arm the
    /// watch after the snapshot revision. Returns the initial table updates.
    async fn monitor(&self, params: &Value, variant: UpdateNotificationType) -> Result<Value, RpcError> {
        let request = CondMonitorParameters::from_params(params).map_err(|err| RpcError::failed(err.to_string()))?;
        if request.database_name.is_empty() {
            return Err(RpcError::failed("database name is not specified"));
        }
        let schema = self
            .state
            .db
            .schema(&request.database_name)
            .ok_or_else(|| RpcError::failed(format!("unknown database '{}'", request.database_name)))?;

        let json_value_key = json_value_key(&request.json_value);
        let mut monitors = self.monitors.lock().await;
        if monitors.contains_key(&json_value_key) || self.state.directory.contains(&json_value_key) {
            return Err(RpcError::failed("duplicate json-value"));
        }

        // Compile one updater per (table, condition request).
        let is_v1 = variant.is_v1();
        let mut updaters: HashMap<TableKey, Vec<Updater>> = HashMap::new();
        for (table, mcrs) in &request.requests {
            let table_schema = schema.lookup_table(table).map_err(|err| RpcError::failed(err.to_string()))?;
            if mcrs.iter().any(|mcr| mcr.where_clauses.is_some()) {
                debug!(table = %table, "where conditions are accepted but not evaluated");
            }
            let compiled = mcrs
                .iter()
                .map(|mcr| Updater::new(mcr.clone(), json_value_key.clone(), Arc::clone(&table_schema), is_v1))
                .collect();
            updaters.insert(self.state.db.table_key(&request.database_name, table), compiled);
        }

        let sink: Arc<dyn NotificationSink> = Arc::clone(&self.state.directory) as Arc<dyn NotificationSink>;
        let watcher = self
            .state
            .db
            .ensure_watcher(&request.database_name, sink)
            .await
            .map_err(|err| RpcError::failed(err.to_string()))?;

        // Holding the watcher's arm lock makes snapshot + registration atomic
        // with respect to live events: nothing the snapshot already contains
        // is re-delivered, and nothing newer is lost.
        let armed = watcher.pause().await;
        let initial = self.initial_updates(&updaters, &watcher).await?;
        watcher.registry().add(updaters.clone());

        let cancel = self.client.cancel_token().child_token();
        let transport = Arc::new(ClientTransport(self.client.clone()));
        let (notifier, _worker) = ClientNotifier::spawn(variant, request.json_value.clone(), transport, cancel.clone());
        self.state.directory.insert(json_value_key.clone(), notifier);
        monitors.insert(
            json_value_key.clone(),
            MonitorEntry {
                database: request.database_name.clone(),
                table_keys: updaters.keys().cloned().collect(),
                cancel,
            },
        );
        drop(armed);

        info!(
            database = %request.database_name,
            json_value_key = %json_value_key,
            method = variant.method(),
            "monitor registered"
        );
        serde_json::to_value(initial).map_err(|err| RpcError::failed(err.to_string()))
    }

    /// Build the initial reply from per-table snapshots, recording the
    /// highest snapshot revision in the watcher's checker.
    async fn initial_updates(
        &self,
        updaters: &HashMap<TableKey, Vec<Updater>>,
        watcher: &alder_monitor::DbWatcher,
    ) -> Result<TableUpdates, RpcError> {
        let mut initial = TableUpdates::new();
        for (table_key, table_updaters) in updaters {
            let snapshot = self
                .state
                .db
                .store()
                .snapshot(&table_key.row_prefix())
                .await
                .map_err(|err| RpcError::failed(err.to_string()))?;
            watcher.observe_revision(snapshot.revision);

            let mut table_update = TableUpdate::new();
            for (row_key, raw) in &snapshot.rows {
                for updater in table_updaters {
                    match updater.on_initial(raw) {
                        Ok(Some((row_update, uuid))) => {
                            table_update.insert(uuid, row_update);
                        }
                        Ok(None) => {}
                        Err(err) => {
                            warn!(key = %row_key, error = %err, "skipping malformed snapshot row");
                        }
                    }
                }
            }
            if !table_update.is_empty() {
                initial.insert(table_key.table().to_string(), table_update);
            }
        }
        Ok(initial)
    }

    /// `monitor_cancel`: synchronous, idempotent against the registry.
    async fn monitor_cancel(&self, params: &Value) -> Result<Value, RpcError> {
        // The correlation value arrives either bare or as a one-element array.
        let json_value = match params {
            Value::Array(elements) if elements.len() == 1 => &elements[0],
            other => other,
        };
        let json_value_key = json_value_key(json_value);

        let mut monitors = self.monitors.lock().await;
        let entry = monitors
            .remove(&json_value_key)
            .ok_or_else(|| RpcError::failed("unknown monitor"))?;
        drop(monitors);

        self.release_monitor(&json_value_key, entry).await;
        info!(json_value_key = %json_value_key, "monitor canceled");
        Ok(json!({}))
    }

    async fn release_monitor(&self, json_value_key: &str, entry: MonitorEntry) {
        if let Some(watcher) = self.state.db.watcher(&entry.database).await {
            watcher.registry().remove(&entry.table_keys, json_value_key);
        }
        self.state.directory.remove(json_value_key);
        entry.cancel.cancel();
    }

    async fn get_schema(&self, params: &Value) -> Result<Value, RpcError> {
        let database = params
            .as_array()
            .and_then(|elements| elements.first())
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::failed("get_schema expects [<database-name>]"))?;
        let schema = self
            .state
            .db
            .schema(database)
            .ok_or_else(|| RpcError::failed(format!("unknown database '{database}'")))?;
        Ok(schema.raw.clone())
    }
}

#[async_trait]
impl RpcService for Handler {
    async fn handle(&self, method: &str, params: &Value) -> Result<Value, RpcError> {
        match method {
            "echo" => Ok(params.clone()),
            "list_dbs" => Ok(json!(self.state.db.database_names())),
            "get_schema" => self.get_schema(params).await,
            "get_server_id" => Ok(json!(self.state.server_id)),
            "monitor" => self.monitor(params, UpdateNotificationType::Update).await,
            "monitor_cond" => self.monitor(params, UpdateNotificationType::Update2).await,
            "monitor_cond_since" => {
                let updates = self.monitor(params, UpdateNotificationType::Update3).await?;
                Ok(json!([false, ZERO_UUID, updates]))
            }
            "monitor_cancel" => self.monitor_cancel(params).await,
            other => Err(RpcError::MethodNotFound {
                method: other.to_string(),
            }),
        }
    }

    async fn shutdown(&self) {
        let entries: Vec<(String, MonitorEntry)> = self.monitors.lock().await.drain().collect();
        for (json_value_key, entry) in entries {
            self.release_monitor(&json_value_key, entry).await;
        }
        debug!(peer = %self.client.peer(), "session cleaned up");
    }
}

/// Builds a [`Handler`] per accepted connection.
pub struct SessionFactory {
    state: Arc<ServerState>,
}

impl SessionFactory {
    /// Wrap the shared server state.
    pub fn new(state: Arc<ServerState>) -> Self {
        SessionFactory { state }
    }
}

impl RpcServiceFactory for SessionFactory {
    fn create(&self, client: ClientHandle) -> Arc<dyn RpcService> {
        Arc::new(Handler::new(Arc::clone(&self.state), client))
    }
}
