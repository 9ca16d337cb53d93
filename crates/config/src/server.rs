//! HTTP server / process-level configuration settings.

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;

/// HTTP server and process configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// The socket address the gateway listens on.
    pub listen_address: SocketAddr,
    /// `log` / `EnvFilter`-style directive, e.g. `"info"` or
    /// `"gateway=debug,info"`.
    pub log_filter: String,
    /// Where to persist the conversation-tree state. If unset, persistence
    /// is disabled and all trees are lost across restarts.
    pub state_path: Option<PathBuf>,
    /// How often to write `state_path` while the gateway is running, in
    /// addition to the write performed on graceful shutdown.
    pub persist_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1:8090".parse().expect("valid default address"),
            log_filter: "info".to_string(),
            state_path: None,
            persist_interval_secs: 60,
        }
    }
}
