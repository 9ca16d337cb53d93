//! Gateway server library.
//!
//! Provides a reusable server function to serve the gateway, either for the
//! binary or for integration tests.

#![deny(missing_docs)]

mod error;
mod logger;

pub use error::Error;

use std::net::SocketAddr;

use anyhow::anyhow;
use config::Config;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Configuration for serving the gateway.
pub struct ServeConfig {
    /// The socket address (IP and port) the server will bind to
    pub listen_address: SocketAddr,
    /// The deserialized TOML configuration.
    pub config: Config,
    /// Cancellation token for graceful shutdown
    pub shutdown_signal: CancellationToken,
    /// Log filter string (e.g., "info" or "llm=debug,info")
    pub log_filter: String,
    /// The version string to log on startup
    pub version: String,
    /// Optional oneshot sender to send back the bound address (useful if port 0 was specified)
    pub bound_addr_sender: Option<tokio::sync::oneshot::Sender<SocketAddr>>,
}

/// Starts and runs the gateway with the provided configuration.
///
/// Binds the translation router built by [`llm::Gateway`], serves it until
/// `shutdown_signal` fires, and persists the conversation tree state on the
/// way in and out.
pub async fn serve(
    ServeConfig {
        listen_address,
        config,
        shutdown_signal,
        log_filter,
        version,
        bound_addr_sender,
    }: ServeConfig,
) -> anyhow::Result<()> {
    logger::init(&log_filter);

    log::info!("gateway {version}");

    let gateway = llm::Gateway::build(config)
        .await
        .map_err(|err| anyhow!("failed to initialize gateway: {err}"))?;

    let persist_interval = gateway.persist_interval();
    let persist_gateway = gateway.clone();
    let persist_shutdown = shutdown_signal.clone();

    let persist_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(persist_interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = persist_gateway.persist().await {
                        log::warn!("failed to persist conversation tree state: {err:?}");
                    }
                }
                _ = persist_shutdown.cancelled() => break,
            }
        }
    });

    let app = gateway.router();

    let listener = TcpListener::bind(listen_address).await.map_err(Error::Bind)?;

    if let Some(sender) = bound_addr_sender {
        let addr = listener.local_addr().map_err(Error::Bind)?;
        sender.send(addr).expect("failed to send back bound address");
    }

    log::info!("messages endpoint: http://{listen_address}/v1/messages");

    let result = tokio::select! {
        result = axum::serve(listener, app.into_make_service()) => {
            result.map_err(Error::Server).map_err(Into::into)
        }
        _ = shutdown_signal.cancelled() => {
            log::info!("received shutdown signal, shutting down gracefully...");
            Ok(())
        }
    };

    persist_task.abort();

    if let Err(err) = gateway.persist().await {
        log::warn!("failed to persist conversation tree state on shutdown: {err:?}");
    }

    result
}
