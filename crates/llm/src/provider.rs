//! Provider Adapter (C7): translates a converted `ChatRequest` into an HTTP
//! call against one configured upstream and translates the reply back,
//! either as a single `Response` or as a pumped stream of Anthropic
//! `StreamEvent`s.
//!
//! Status is checked before the body is parsed or streamed, and upstream
//! 4xx/5xx codes map onto one error taxonomy. All four configured provider
//! kinds speak the identical OpenAI chat-completion wire format, so this is
//! one generic struct rather than four per-kind subclasses - the only
//! mechanics that differ between kinds are how the API key is attached to
//! the request.

use std::collections::BTreeMap;

use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt, stream};
use reqwest::{Client, header::AUTHORIZATION};
use secrecy::ExposeSecret;
use serde_json::{Value, json};

use config::{ProviderConfig, ProviderKind};

use crate::convert::{apply_subagent_interception, map_stop_reason, stream_usage};
use crate::error::{GatewayError, classify_upstream_status};
use crate::http_client;
use crate::openai::{self, ChatRequest};
use crate::protocol::anthropic::messages::{Response, StopReason, StreamEvent};
use crate::stream::think::{ChunkKind, ThinkTagParser};
use crate::stream::{AnthropicSseBuilder, heuristic_tool};

const SUBAGENT_TOOL_NAME: &str = "Task";

/// One configured upstream, ready to serve chat-completion calls. Cheap to
/// clone: the `reqwest::Client` is itself `Arc`-backed connection pooling.
#[derive(Clone)]
pub struct Provider {
    name: String,
    client: Client,
    config: ProviderConfig,
}

impl Provider {
    /// Builds a provider's HTTP client from its configuration. Fails only
    /// if the underlying `reqwest::Client` cannot be constructed (e.g. a
    /// malformed default header), which a valid `ProviderConfig` never
    /// triggers in practice.
    pub fn new(name: String, config: ProviderConfig) -> Result<Self, GatewayError> {
        let client = http_client::build(&config).map_err(|err| GatewayError::Internal(err.to_string()))?;

        Ok(Self { name, client, config })
    }

    /// The configured name this provider is registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this provider opted in to recovering tool calls emitted as
    /// inline text (C6).
    pub fn heuristic_tool_parsing(&self) -> bool {
        self.config.heuristic_tool_parsing
    }

    /// The hard ceiling this provider applies to `max_tokens`, if any.
    pub fn max_tokens_cap(&self) -> Option<u32> {
        self.config.max_tokens_cap
    }

    /// Provider-level sampling defaults merged into every request.
    pub fn defaults(&self) -> &config::ProviderDefaults {
        &self.config.defaults
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.as_str().trim_end_matches('/'))
    }

    fn request_builder(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.post(url);

        match (self.config.kind, &self.config.api_key) {
            (ProviderKind::VertexAi, Some(key)) => builder.query(&[("key", key.expose_secret())]),
            (_, Some(key)) => builder.header(AUTHORIZATION, format!("Bearer {}", key.expose_secret())),
            (_, None) => builder,
        }
    }

    /// Sends one non-streaming chat-completion call and translates the
    /// reply back into an Anthropic response.
    pub async fn chat_completion(&self, body: ChatRequest, model_label: &str) -> Result<Response, GatewayError> {
        rate_limit::global().wait_if_blocked().await;

        let url = self.endpoint();
        let response = self
            .request_builder(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| GatewayError::Network(err.to_string()))?;

        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_else(|_| "<empty response>".to_string());
            self.maybe_engage_cooldown(status.as_u16()).await;

            log::warn!("{}: upstream error ({status}): {text}", self.name);
            return Err(classify_upstream_status(status.as_u16(), &text));
        }

        let text = response.text().await.map_err(|err| GatewayError::Network(err.to_string()))?;
        let upstream: openai::ChatResponse = serde_json::from_str(&text).map_err(|err| {
            log::error!("{}: failed to parse chat-completion response: {err}", self.name);
            GatewayError::Internal(format!("failed to parse upstream response: {err}"))
        })?;

        Ok(crate::convert::from_openai(upstream, model_label, self.heuristic_tool_parsing()))
    }

    /// Sends one streaming chat-completion call and returns the Anthropic
    /// `StreamEvent` pump (C4 driven by C3's streaming counterpart).
    pub async fn chat_completion_stream(
        &self,
        body: ChatRequest,
        message_id: String,
        model_label: String,
    ) -> Result<impl Stream<Item = Result<StreamEvent, GatewayError>> + Send + 'static, GatewayError> {
        rate_limit::global().wait_if_blocked().await;

        let url = self.endpoint();
        let response = self
            .request_builder(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| GatewayError::Network(err.to_string()))?;

        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_else(|_| "<empty response>".to_string());
            self.maybe_engage_cooldown(status.as_u16()).await;

            log::warn!("{}: upstream streaming error ({status}): {text}", self.name);
            return Err(classify_upstream_status(status.as_u16(), &text));
        }

        let events = response.bytes_stream().eventsource();
        let pump = StreamPump::new(message_id, model_label, self.heuristic_tool_parsing());

        Ok(pump_stream(events, pump))
    }

    async fn maybe_engage_cooldown(&self, status: u16) {
        if status == 429 {
            rate_limit::global().set_blocked(std::time::Duration::from_secs(60)).await;
        }
    }
}

#[derive(Default)]
struct ToolAccum {
    id: String,
    name: String,
    arguments: String,
    is_task: bool,
    opened: bool,
    anthropic_index: Option<u32>,
}

/// Stateful reducer turning a sequence of OpenAI `StreamChunk`s into
/// Anthropic `StreamEvent`s, owning the SSE builder (C4) and the think-tag
/// parser (C5) for the lifetime of one streamed response.
struct StreamPump {
    sse: AnthropicSseBuilder,
    think: ThinkTagParser,
    message_id: String,
    model: String,
    heuristic_tool_parsing: bool,
    heuristic_buffer: String,
    open_tool_index: Option<u32>,
    tool_calls: BTreeMap<u32, ToolAccum>,
    finish_reason: Option<String>,
    usage: Option<openai::Usage>,
    started: bool,
}

impl StreamPump {
    fn new(message_id: String, model: String, heuristic_tool_parsing: bool) -> Self {
        Self {
            sse: AnthropicSseBuilder::new(),
            think: ThinkTagParser::new(),
            message_id,
            model,
            heuristic_tool_parsing,
            heuristic_buffer: String::new(),
            open_tool_index: None,
            tool_calls: BTreeMap::new(),
            finish_reason: None,
            usage: None,
            started: false,
        }
    }

    fn ensure_started(&mut self, events: &mut Vec<StreamEvent>) {
        if self.started {
            return;
        }

        self.started = true;
        if let Some(event) = self.sse.start_message(&self.message_id, &self.model) {
            events.push(event);
        }
    }

    fn push_visible_chunks(&mut self, events: &mut Vec<StreamEvent>, text: &str) {
        let chunks = self.think.feed(text);
        self.emit_think_chunks(events, chunks);
    }

    fn emit_think_chunks(&mut self, events: &mut Vec<StreamEvent>, chunks: Vec<crate::stream::Chunk>) {
        for chunk in chunks {
            match chunk.kind {
                ChunkKind::Think => {
                    let (open_events, index) = self.sse.ensure_thinking_block();
                    events.extend(open_events);
                    if let Some(event) = self.sse.emit_thinking_delta(index, &chunk.text) {
                        events.push(event);
                    }
                }
                ChunkKind::Text => {
                    if self.heuristic_tool_parsing {
                        self.heuristic_buffer.push_str(&chunk.text);
                    } else {
                        let (open_events, index) = self.sse.ensure_text_block();
                        events.extend(open_events);
                        if let Some(event) = self.sse.emit_text_delta(index, &chunk.text) {
                            events.push(event);
                        }
                    }
                }
            }
        }
    }

    /// Feeds one upstream chunk, returning the Anthropic events it produces.
    fn feed_chunk(&mut self, chunk: openai::StreamChunk) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        self.ensure_started(&mut events);

        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }

        let Some(choice) = chunk.choices.into_iter().next() else { return events };

        if let Some(reason) = choice.finish_reason {
            self.finish_reason = Some(reason);
        }

        let delta = choice.delta;

        if let Some(reasoning) = delta.reasoning_text() {
            let (open_events, index) = self.sse.ensure_thinking_block();
            events.extend(open_events);
            if let Some(event) = self.sse.emit_thinking_delta(index, &reasoning) {
                events.push(event);
            }
        }

        if let Some(text) = &delta.content {
            self.push_visible_chunks(&mut events, text);
        }

        for call in delta.tool_calls.into_iter().flatten() {
            self.feed_tool_call_delta(&mut events, call);
        }

        events
    }

    fn feed_tool_call_delta(&mut self, events: &mut Vec<StreamEvent>, call: openai::ToolCallDelta) {
        let index = call.index;
        let id_update = call.id;
        let name_update = call.function.as_ref().and_then(|f| f.name.clone());
        let args_update = call.function.and_then(|f| f.arguments);

        let accum = self.tool_calls.entry(index).or_default();
        if let Some(id) = id_update {
            accum.id = id;
        }
        if let Some(name) = name_update {
            accum.name = name;
            if accum.name == SUBAGENT_TOOL_NAME {
                accum.is_task = true;
            }
        }
        if let Some(args) = &args_update {
            accum.arguments.push_str(args);
        }

        let is_task = accum.is_task;
        let opened = accum.opened;
        let name_known = !accum.name.is_empty();
        let id = accum.id.clone();
        let name = accum.name.clone();

        // Task calls are buffered whole and flushed at `finish()` so
        // `apply_subagent_interception` sees the complete JSON before the
        // client does (§4.6).
        if is_task {
            return;
        }

        if self.open_tool_index != Some(index) {
            if let Some(event) = self.sse.close_current() {
                events.push(event);
            }
            self.open_tool_index = Some(index);
        }

        if name_known && !opened {
            let (open_events, anthropic_index) = self.sse.open_tool_block(&id, &name);
            events.extend(open_events);
            if let Some(accum) = self.tool_calls.get_mut(&index) {
                accum.opened = true;
                accum.anthropic_index = Some(anthropic_index);
            }
        }

        if let Some(args) = args_update {
            let anthropic_index = self.tool_calls.get(&index).and_then(|a| a.anthropic_index);
            if let Some(anthropic_index) = anthropic_index
                && let Some(event) = self.sse.emit_tool_delta(anthropic_index, &args)
            {
                events.push(event);
            }
        }
    }

    /// Flushes buffered Task calls and any heuristically-recovered tool
    /// calls, then emits the terminal `message_delta`/`message_stop` pair.
    fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        self.ensure_started(&mut events);

        let had_tool_calls = !self.tool_calls.is_empty();

        for (_, accum) in std::mem::take(&mut self.tool_calls) {
            if !accum.is_task {
                continue;
            }

            let mut input: Value = serde_json::from_str(&accum.arguments).unwrap_or_else(|_| json!({}));
            apply_subagent_interception(&accum.name, &mut input);
            self.emit_complete_tool_use(&mut events, &accum.id, &accum.name, input);
        }

        let trailing_chunks = self.think.finalize();
        self.emit_think_chunks(&mut events, trailing_chunks);

        let mut recovered_tool_use = false;

        if self.heuristic_tool_parsing {
            let mut remaining = std::mem::take(&mut self.heuristic_buffer);
            let mut errors = Vec::new();

            while let Some(extracted) = heuristic_tool::extract(&remaining) {
                remaining = extracted.remaining_text;
                if let Some(error) = extracted.parse_error {
                    errors.push(error);
                }

                for call in extracted.calls {
                    recovered_tool_use = true;
                    let mut input = call.input;
                    apply_subagent_interception(&call.name, &mut input);
                    self.emit_complete_tool_use(&mut events, &call.id, &call.name, input);
                }
            }

            let trimmed = remaining.trim();
            if !trimmed.is_empty() {
                let (open_events, index) = self.sse.ensure_text_block();
                events.extend(open_events);
                if let Some(event) = self.sse.emit_text_delta(index, trimmed) {
                    events.push(event);
                }
            }

            if !errors.is_empty() {
                let (open_events, index) = self.sse.ensure_text_block();
                events.extend(open_events);
                let message = format!("[tool call parse error: {}]", errors.join("; "));
                if let Some(event) = self.sse.emit_text_delta(index, &message) {
                    events.push(event);
                }
            }
        }

        let stop_reason = if recovered_tool_use || had_tool_calls {
            StopReason::ToolUse
        } else {
            map_stop_reason(self.finish_reason.as_deref())
        };

        events.extend(self.sse.finalize(stop_reason, stream_usage(self.usage.take())));
        events
    }

    fn emit_complete_tool_use(&mut self, events: &mut Vec<StreamEvent>, id: &str, name: &str, input: Value) {
        if let Some(event) = self.sse.close_current() {
            events.push(event);
        }

        let (open_events, index) = self.sse.open_tool_block(id, name);
        events.extend(open_events);

        let serialized = serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_string());
        if let Some(event) = self.sse.emit_tool_delta(index, &serialized) {
            events.push(event);
        }
    }
}

/// Drains a raw SSE byte stream through a [`StreamPump`], flattening each
/// upstream chunk into zero or more Anthropic events and surfacing
/// transport errors as a terminal item (§6.1, §9 Design Notes on streaming
/// error handling: errors after the stream has started close it instead of
/// tearing down the connection).
type RawEvent = Result<eventsource_stream::Event, eventsource_stream::EventStreamError<reqwest::Error>>;
type BoxedEventStream = std::pin::Pin<Box<dyn Stream<Item = RawEvent> + Send>>;

struct PumpState {
    events: BoxedEventStream,
    pump: StreamPump,
    queue: std::collections::VecDeque<Result<StreamEvent, GatewayError>>,
    done: bool,
}

fn pump_stream(
    events: impl Stream<Item = RawEvent> + Send + 'static,
    pump: StreamPump,
) -> impl Stream<Item = Result<StreamEvent, GatewayError>> + Send + 'static {
    let state =
        PumpState { events: Box::pin(events), pump, queue: std::collections::VecDeque::new(), done: false };

    stream::unfold(state, |mut state: PumpState| async move {
        loop {
            if let Some(item) = state.queue.pop_front() {
                return Some((item, state));
            }

            if state.done {
                return None;
            }

            match state.events.next().await {
                Some(Ok(event)) => {
                    if event.data == "[DONE]" {
                        state.done = true;
                        state.queue.extend(state.pump.finish().into_iter().map(Ok));
                        continue;
                    }

                    match serde_json::from_str::<openai::StreamChunk>(&event.data) {
                        Ok(chunk) => {
                            state.queue.extend(state.pump.feed_chunk(chunk).into_iter().map(Ok));
                            continue;
                        }
                        Err(err) => {
                            log::debug!("skipping unparseable streaming chunk: {err}");
                            continue;
                        }
                    }
                }
                Some(Err(err)) => {
                    state.done = true;
                    state.queue.push_back(Err(GatewayError::Network(err.to_string())));
                    continue;
                }
                None => {
                    state.done = true;
                    state.queue.extend(state.pump.finish().into_iter().map(Ok));
                    continue;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openai::{ChoiceDelta, Delta, FunctionCallDelta, StreamChunk, ToolCallDelta};

    fn chunk(delta: Delta, finish_reason: Option<&str>) -> StreamChunk {
        StreamChunk {
            id: Some("chatcmpl-1".to_string()),
            choices: vec![ChoiceDelta { delta, finish_reason: finish_reason.map(str::to_string) }],
            usage: None,
        }
    }

    #[test]
    fn text_delta_streams_as_text_block() {
        let mut pump = StreamPump::new("msg_1".to_string(), "m".to_string(), false);

        let events = pump.feed_chunk(chunk(
            Delta { content: Some("hello".to_string()), ..Default::default() },
            None,
        ));

        assert!(matches!(events[0], StreamEvent::MessageStart(_)));
        assert!(matches!(events[1], StreamEvent::ContentBlockStart { .. }));
        assert!(matches!(events[2], StreamEvent::ContentBlockDelta { .. }));
    }

    #[test]
    fn task_tool_call_is_buffered_until_finish_and_forced_foreground() {
        let mut pump = StreamPump::new("msg_1".to_string(), "m".to_string(), false);

        pump.feed_chunk(chunk(
            Delta {
                tool_calls: Some(vec![ToolCallDelta {
                    index: 0,
                    id: Some("call_1".to_string()),
                    function: Some(FunctionCallDelta {
                        name: Some("Task".to_string()),
                        arguments: Some(r#"{"run_in_background": true}"#.to_string()),
                    }),
                }]),
                ..Default::default()
            },
            Some("tool_calls"),
        ));

        let events = pump.finish();
        let delta = events.iter().find_map(|event| match event {
            StreamEvent::ContentBlockDelta { delta, .. } => Some(delta.clone()),
            _ => None,
        });

        let partial_json = delta.unwrap().get("partial_json").unwrap().as_str().unwrap().to_string();
        assert!(partial_json.contains("\"run_in_background\":false"));
        assert!(matches!(events.last(), Some(StreamEvent::MessageStop)));
    }

    #[test]
    fn heuristic_parsing_recovers_tool_call_from_buffered_text() {
        let mut pump = StreamPump::new("msg_1".to_string(), "m".to_string(), true);

        pump.feed_chunk(chunk(
            Delta {
                content: Some(r#"<tool_call>{"name": "lookup", "arguments": {"q": "rust"}}</tool_call>"#.to_string()),
                ..Default::default()
            },
            Some("stop"),
        ));

        let events = pump.finish();
        let opened_tool_block = events.iter().any(|event| {
            matches!(
                event,
                StreamEvent::ContentBlockStart {
                    content_block: crate::protocol::anthropic::messages::ResponseContent::ToolUse(block),
                    ..
                } if block.name == "lookup"
            )
        });

        assert!(opened_tool_block);
    }
}
