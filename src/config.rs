//! Server configuration: defaults, environment overrides, validation.
//!
//! Layering follows the usual order: built-in defaults, then `ALDER_*`
//! environment variables, then CLI flags applied by the binary.

use std::path::PathBuf;

use alder_store::KEY_DELIMITER;
use anyhow::bail;

/// Configuration for one alder server process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// TCP listen address for the JSON-RPC server.
    pub tcp_address: String,
    /// First segment of every store key; shared by all alder deployments on
    /// one backing store.
    pub database_prefix: String,
    /// Second key segment, distinguishing deployments (e.g. `nb` vs `sb`).
    pub service_name: String,
    /// OVSDB schema documents to load at startup.
    pub schema_files: Vec<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            tcp_address: "127.0.0.1:6640".to_string(),
            database_prefix: "ovsdb".to_string(),
            service_name: "nb".to_string(),
            schema_files: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `ALDER_TCP_ADDRESS`, `ALDER_DATABASE_PREFIX`,
    /// `ALDER_SERVICE_NAME`, and `ALDER_SCHEMA_FILES` (comma-separated).
    pub fn from_env() -> Self {
        let mut config = ServerConfig::default();
        if let Ok(value) = std::env::var("ALDER_TCP_ADDRESS") {
            config.tcp_address = value;
        }
        if let Ok(value) = std::env::var("ALDER_DATABASE_PREFIX") {
            config.database_prefix = value;
        }
        if let Ok(value) = std::env::var("ALDER_SERVICE_NAME") {
            config.service_name = value;
        }
        if let Ok(value) = std::env::var("ALDER_SCHEMA_FILES") {
            config.schema_files = value.split(',').filter(|s| !s.is_empty()).map(PathBuf::from).collect();
        }
        config
    }

    /// Fail fast on configurations the key parser cannot work with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tcp_address.is_empty() {
            bail!("a TCP listen address is required");
        }
        if self.database_prefix.is_empty() || self.database_prefix.contains(KEY_DELIMITER) {
            bail!("illegal database prefix '{}'", self.database_prefix);
        }
        if self.service_name.is_empty() || self.service_name.contains(KEY_DELIMITER) {
            bail!("illegal service name '{}'", self.service_name);
        }
        Ok(())
    }

    /// The process-wide store key prefix, `<database-prefix>/<service-name>`.
    /// Several deployments can share one backing store under different
    /// prefixes.
    pub fn key_prefix(&self) -> String {
        format!("{}{}{}", self.database_prefix, KEY_DELIMITER, self.service_name)
    }
}
