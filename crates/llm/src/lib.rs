//! The translating gateway itself (§6): an axum router sitting in front of
//! the converters (C2/C3), the SSE/think/heuristic-tool pumps (C4-C6), the
//! provider adapter (C7), and the conversation-tree manager (C8-C11), with
//! the global rate coordinator (C1) wired in underneath all of it.
//!
//! One struct assembled once at startup, cloned cheaply per request,
//! exposing a `Router` the HTTP server just binds and serves.

pub mod convert;
pub mod error;
mod http_client;
pub mod openai;
pub mod protocol;
pub mod provider;
pub mod stream;
pub mod token_counter;

use std::{collections::HashMap, path::PathBuf, pin::Pin, sync::Arc, task::Context, task::Poll, time::Duration};

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use futures::{Stream, StreamExt};

use config::Config;
use tree::{BoxedJob, NodeOutcome, ProcessContext, TreeQueueManager};

pub use error::GatewayError;

use convert::{ConvertOptions, to_openai};
use openai::ChatRequest;
use protocol::anthropic::messages::{Request as MessagesRequest, StreamEvent};
use provider::Provider;
use token_counter::{CountTokensRequest, CountTokensResponse, count_tokens};

/// The assembled gateway: provider registry, tree manager, and persistence
/// settings behind one cheaply-`Clone`able handle.
///
/// The ingress this gateway serves (`POST /v1/messages`) has no notion of a
/// reply thread - the Anthropic Messages API carries no parent-message id -
/// so every request starts a brand-new single-node tree rather than joining
/// an existing one via `enqueue_reply`. The full per-root FIFO/branch/tree
/// semantics the tree crate implements exist for a messaging front end
/// (Telegram, Discord, ...) to drive with real parent ids; this gateway
/// exercises the same manager so that one request's processing can still be
/// cancelled (client disconnect) without disturbing any other in-flight
/// request, and so the persisted-state contract (§11) has something real to
/// round-trip in integration tests.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    providers: HashMap<String, Provider>,
    tree: TreeQueueManager,
    state_path: Option<PathBuf>,
    persist_interval: Duration,
}

impl Gateway {
    /// Builds every configured provider, initializes the process-wide rate
    /// coordinator from `config.rate_limit`, and restores any persisted
    /// conversation-tree state from `config.server.state_path`.
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        rate_limit::init_global(config.rate_limit.capacity, Duration::from_secs(config.rate_limit.window_secs))
            .map_err(|err| anyhow::anyhow!("invalid rate limit configuration: {err}"))?;

        let mut providers = HashMap::with_capacity(config.providers.len());
        for (name, provider_config) in &config.providers {
            let provider = Provider::new(name.clone(), provider_config.clone())?;
            providers.insert(name.clone(), provider);
        }

        let state_path = config.server.state_path.clone();
        let persist_interval = Duration::from_secs(config.server.persist_interval_secs.max(1));

        let gateway = Self {
            inner: Arc::new(Inner { config, providers, tree: TreeQueueManager::new(), state_path, persist_interval }),
        };

        gateway.restore().await?;

        Ok(gateway)
    }

    /// How often the caller should call [`Gateway::persist`] on a timer.
    pub fn persist_interval(&self) -> Duration {
        self.inner.persist_interval
    }

    /// Builds the axum router exposing `POST /v1/messages` and
    /// `POST /v1/messages/count_tokens` (§6).
    pub fn router(&self) -> Router {
        Router::new()
            .route("/v1/messages", post(handle_messages))
            .route("/v1/messages/count_tokens", post(handle_count_tokens))
            .with_state(self.clone())
    }

    /// Writes the conversation-tree snapshot to `state_path`, if configured.
    /// A no-op otherwise.
    pub async fn persist(&self) -> anyhow::Result<()> {
        let Some(path) = &self.inner.state_path else { return Ok(()) };

        let value = self.inner.tree.to_dict().await;
        let content = serde_json::to_string_pretty(&value)?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(path, content).await?;
        Ok(())
    }

    async fn restore(&self) -> anyhow::Result<()> {
        let Some(path) = &self.inner.state_path else { return Ok(()) };
        if tokio::fs::metadata(path).await.is_err() {
            return Ok(());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let value: serde_json::Value = serde_json::from_str(&content)?;
        self.inner.tree.from_dict(value).await?;

        // No job survives a restart: anything left mid-flight in the
        // restored snapshot is unrecoverable and must be marked accordingly
        // before the gateway starts serving traffic again.
        self.inner.tree.cleanup_stale_nodes().await;

        Ok(())
    }

    fn resolve(&self, requested_model: &str) -> Result<(Provider, String), GatewayError> {
        let (provider_name, upstream_model) = self
            .inner
            .config
            .resolve_model(requested_model)
            .ok_or_else(|| GatewayError::InvalidRequest(format!("no provider configured for model '{requested_model}'")))?;

        let provider = self
            .inner
            .providers
            .get(provider_name)
            .cloned()
            .ok_or_else(|| GatewayError::InvalidRequest(format!("provider '{provider_name}' is not configured")))?;

        Ok((provider, upstream_model.to_string()))
    }

    async fn cleanup_tree(&self, root_id: &str) {
        let _ = self.inner.tree.cancel_tree(root_id).await;
        let _ = self.inner.tree.remove_branch(root_id).await;
    }
}

/// Drops to cancel and detach its per-request tree, whether the request
/// completed normally, failed, or the client disconnected mid-flight
/// (§5 cancellation: a dropped future must still abort the in-flight
/// upstream call and leave no `Pending`/`InProgress` node behind).
struct PendingRequest {
    gateway: Gateway,
    root_id: String,
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        let gateway = self.gateway.clone();
        let root_id = std::mem::take(&mut self.root_id);
        tokio::spawn(async move { gateway.cleanup_tree(&root_id).await });
    }
}

async fn handle_messages(State(gateway): State<Gateway>, Json(request): Json<MessagesRequest>) -> Result<Response, GatewayError> {
    let stream = request.stream.unwrap_or(true);
    let requested_model = request.model.clone();
    let (provider, upstream_model) = gateway.resolve(&requested_model)?;

    let options = ConvertOptions { model: upstream_model, max_tokens_cap: provider.max_tokens_cap(), defaults: provider.defaults() };
    let body = to_openai(&request, &options);

    let root_id = format!("msg_{}", uuid::Uuid::new_v4().simple());
    let incoming = serde_json::to_value(&request).unwrap_or(serde_json::Value::Null);

    if stream {
        stream_messages(gateway, root_id, incoming, provider, body, requested_model).await
    } else {
        complete_messages(gateway, root_id, incoming, provider, body, requested_model).await
    }
}

async fn complete_messages(
    gateway: Gateway,
    root_id: String,
    incoming: serde_json::Value,
    provider: Provider,
    body: ChatRequest,
    model_label: String,
) -> Result<Response, GatewayError> {
    let pending = PendingRequest { gateway: gateway.clone(), root_id: root_id.clone() };

    let (tx, rx) = tokio::sync::oneshot::channel();
    let job: BoxedJob = Box::new(move |_ctx: ProcessContext| {
        Box::pin(async move {
            let result = provider.chat_completion(body, &model_label).await;
            let outcome = match &result {
                Ok(_) => NodeOutcome::Completed,
                Err(err) => NodeOutcome::Error(err.to_string()),
            };
            let _ = tx.send(result);
            outcome
        })
    });

    gateway
        .inner
        .tree
        .start_root(root_id, incoming, None, job)
        .await
        .map_err(|err| GatewayError::Internal(err.to_string()))?;

    let response = rx.await.map_err(|_| GatewayError::Cancelled)?;
    drop(pending);

    Ok(Json(response?).into_response())
}

async fn stream_messages(
    gateway: Gateway,
    root_id: String,
    incoming: serde_json::Value,
    provider: Provider,
    body: ChatRequest,
    model_label: String,
) -> Result<Response, GatewayError> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Result<StreamEvent, GatewayError>>();
    let message_id = root_id.clone();

    let job: BoxedJob = Box::new(move |_ctx: ProcessContext| {
        Box::pin(async move {
            match provider.chat_completion_stream(body, message_id, model_label).await {
                Ok(mut events) => {
                    let mut errored = false;
                    while let Some(item) = events.next().await {
                        errored = errored || item.is_err();
                        let stop = item.is_err();
                        if tx.send(item).is_err() || stop {
                            break;
                        }
                    }

                    if errored {
                        NodeOutcome::Error("upstream stream ended with an error".to_string())
                    } else {
                        NodeOutcome::Completed
                    }
                }
                Err(err) => {
                    let message = err.to_string();
                    let _ = tx.send(Err(err));
                    NodeOutcome::Error(message)
                }
            }
        })
    });

    gateway
        .inner
        .tree
        .start_root(root_id.clone(), incoming, None, job)
        .await
        .map_err(|err| GatewayError::Internal(err.to_string()))?;

    let body_stream = CleanupStream { rx, _pending: PendingRequest { gateway, root_id } }.map(|item| {
        let event = match item {
            Ok(event) => event,
            Err(err) => StreamEvent::Error { error: err.to_anthropic_error() },
        };

        Ok::<_, std::convert::Infallible>(Bytes::from(stream::render_sse_event(&event)))
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(body_stream))
        .map_err(|err| GatewayError::Internal(err.to_string()))
}

/// Wraps the provider adapter's event channel so dropping the response body
/// (client disconnect, or simply reaching the end of the stream) always
/// tears down its tree node via [`PendingRequest`].
struct CleanupStream {
    rx: tokio::sync::mpsc::UnboundedReceiver<Result<StreamEvent, GatewayError>>,
    _pending: PendingRequest,
}

impl Stream for CleanupStream {
    type Item = Result<StreamEvent, GatewayError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

async fn handle_count_tokens(Json(request): Json<CountTokensRequest>) -> Json<CountTokensResponse> {
    Json(CountTokensResponse { input_tokens: count_tokens(&request) })
}
