//! Server bootstrap: schemas, state, listener.

use std::sync::Arc;

use alder_rpc::RpcServer;
use alder_store::StoreClient;
use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ServerConfig;
use crate::db::Database;
use crate::session::ServerState;
use crate::session::SessionFactory;

/// Run the server until `cancel` fires.
///
/// Loads the configured schemas, binds the JSON-RPC listener, and serves
/// connections against `store`.
pub async fn run(config: ServerConfig, store: Arc<dyn StoreClient>, cancel: CancellationToken) -> anyhow::Result<()> {
    config.validate()?;

    let mut db = Database::new(store, config.key_prefix());
    for path in &config.schema_files {
        db.add_schema_file(path)?;
    }
    if db.database_names().is_empty() {
        info!("no schema files configured, serving without databases");
    }

    let state = ServerState::new(db);
    let server = RpcServer::bind(&config.tcp_address)
        .await
        .with_context(|| format!("binding {}", config.tcp_address))?;
    info!(
        addr = %config.tcp_address,
        prefix = %config.key_prefix(),
        server_id = %state.server_id,
        "alder serving"
    );
    server.serve(Arc::new(SessionFactory::new(state)), cancel).await;
    Ok(())
}
