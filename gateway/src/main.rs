use args::Args;
use clap::Parser;
use server::ServeConfig;
use tokio_util::sync::CancellationToken;

mod args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = config::load(&args.config)?;

    if let Some(listen_address) = args.listen {
        config.server.listen_address = listen_address;
    }

    let log_filter = args.log_filter.unwrap_or_else(|| config.server.log_filter.clone());
    let listen_address = config.server.listen_address;

    let shutdown_signal = CancellationToken::new();
    let shutdown_signal_clone = shutdown_signal.clone();

    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown_signal_clone.cancel();
    });

    let serve_config = ServeConfig {
        listen_address,
        config,
        shutdown_signal,
        log_filter,
        version: env!("CARGO_PKG_VERSION").to_string(),
        bound_addr_sender: None,
    };

    server::serve(serve_config).await
}
