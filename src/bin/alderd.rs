//! alderd - the alder server binary.
//!
//! Serves the OVSDB monitor protocol over JSON-RPC/TCP against a backing
//! key-value store. Configuration layers: built-in defaults, `ALDER_*`
//! environment variables, CLI flags. Shuts down gracefully on SIGINT and
//! SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use alder::ServerConfig;
use alder_store::MemoryStore;
use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

#[derive(Debug, Parser)]
#[command(name = "alderd", about = "OVSDB-compatible monitor server over a distributed key-value store")]
struct Args {
    /// TCP listen address, e.g. 127.0.0.1:6640.
    #[arg(long)]
    tcp_address: Option<String>,

    /// First segment of every store key.
    #[arg(long)]
    database_prefix: Option<String>,

    /// Deployment service name, e.g. 'nb' or 'sb'.
    #[arg(long)]
    service_name: Option<String>,

    /// OVSDB schema file to load; may be given multiple times.
    #[arg(long = "schema-file")]
    schema_files: Vec<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = ServerConfig::from_env();
    if let Some(tcp_address) = args.tcp_address {
        config.tcp_address = tcp_address;
    }
    if let Some(database_prefix) = args.database_prefix {
        config.database_prefix = database_prefix;
    }
    if let Some(service_name) = args.service_name {
        config.service_name = service_name;
    }
    if !args.schema_files.is_empty() {
        config.schema_files = args.schema_files;
    }
    config.validate()?;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_cancel.cancel();
    });

    // The bundled in-memory store; a deployment against a real distributed
    // store plugs its client in here.
    let store = Arc::new(MemoryStore::new());
    alder::run(config, store, cancel).await
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).compact().init();
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::SignalKind;
        use tokio::signal::unix::signal;

        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(terminate) => terminate,
            Err(err) => {
                warn!(error = %err, "cannot listen for SIGTERM, relying on ctrl-c only");
                if let Err(err) = ctrl_c.await {
                    warn!(error = %err, "ctrl-c handler failed");
                }
                return;
            }
        };
        tokio::select! {
            result = ctrl_c => {
                if let Err(err) = result {
                    warn!(error = %err, "ctrl-c handler failed");
                }
            }
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            warn!(error = %err, "ctrl-c handler failed");
        }
    }
}
