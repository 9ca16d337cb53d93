use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

/// Command line arguments for the gateway binary.
#[derive(Debug, Parser)]
#[command(name = "gateway", version, about = "Anthropic-to-OpenAI translating LLM gateway")]
pub struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "GATEWAY_CONFIG", default_value = "gateway.toml")]
    pub config: PathBuf,

    /// Override the address the server listens on.
    #[arg(short, long, env = "GATEWAY_LISTEN_ADDRESS")]
    pub listen: Option<SocketAddr>,

    /// Override the `log`/`EnvFilter` directive string from the config file.
    #[arg(long, env = "GATEWAY_LOG")]
    pub log_filter: Option<String>,
}
