//! alder: an OVSDB-compatible database server whose persistent state lives
//! in a distributed key-value store.
//!
//! This crate is the server surface: configuration, loaded database schemas,
//! the per-connection session handler that speaks the OVSDB monitor protocol
//! (`monitor`, `monitor_cond`, `monitor_cond_since`, `monitor_cancel`), and
//! the bootstrap glue that wires the JSON-RPC listener to the monitor
//! pipeline in `alder-monitor`.
//!
//! # Architecture
//!
//! - One JSON-RPC connection per client; requests dispatch to a
//!   [`session::Handler`].
//! - One watch loop per database (`alder-monitor::DbWatcher`), shared by all
//!   clients monitoring that database and fed by the backing store's watch
//!   channel.
//! - One notifier task per client monitor; the watch loop reaches it through
//!   the [`session::NotifierDirectory`], never through session state.

pub mod config;
pub mod db;
pub mod server;
pub mod session;

pub use config::ServerConfig;
pub use db::Database;
pub use server::run;
pub use session::Handler;
pub use session::NotifierDirectory;
pub use session::ServerState;
pub use session::SessionFactory;
