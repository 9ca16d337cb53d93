//! Stateful emitter of Anthropic-shaped SSE events (C4).
//!
//! A pure state machine driven by an external pump (the provider adapter's
//! read loop): it owns no socket and performs no I/O. Callers feed it text,
//! thinking, and tool-call deltas and drain the [`StreamEvent`]s it produces.

use serde_json::{Value, json};

use crate::protocol::anthropic::error::Error as AnthropicError;
use crate::protocol::anthropic::messages::{
    Delta, MessageDelta, ResponseContent, ResponseTextBlock, ResponseThinkingBlock, ResponseToolUseBlock, Role,
    StopReason, StreamEvent, StreamMessageStart, StreamUsage,
};
use crate::protocol::unknown_fields::UnknownFields;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenBlock {
    Text,
    Thinking,
    Tool,
}

/// Builds the `message_start` → `content_block_*` → `message_delta` →
/// `message_stop` sequence for one streamed response.
pub struct AnthropicSseBuilder {
    started: bool,
    next_index: u32,
    open: Option<(u32, OpenBlock)>,
    finalized: bool,
}

impl Default for AnthropicSseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AnthropicSseBuilder {
    pub fn new() -> Self {
        Self { started: false, next_index: 0, open: None, finalized: false }
    }

    /// Emits `message_start` with empty usage. Idempotent - later calls are
    /// no-ops once the message has started.
    pub fn start_message(&mut self, msg_id: &str, model: &str) -> Option<StreamEvent> {
        if self.started {
            return None;
        }

        self.started = true;

        Some(StreamEvent::MessageStart(Box::new(StreamMessageStart {
            id: msg_id.to_string(),
            role: Role::Assistant,
            content: Vec::new(),
            model: model.to_string(),
            usage: StreamUsage {
                input_tokens: Some(0),
                output_tokens: Some(0),
                cache_creation: None,
                cache_creation_input_tokens: Some(0),
                cache_read_input_tokens: Some(0),
                server_tool_use: None,
                service_tier: None,
                unknown_fields: UnknownFields::default(),
            },
            stop_reason: None,
            stop_sequence: None,
            unknown_fields: UnknownFields::default(),
        })))
    }

    /// Ensures the open block is a text block, closing and reopening if a
    /// different kind is currently open. Returns the events produced (0-2)
    /// and the block's index.
    pub fn ensure_text_block(&mut self) -> (Vec<StreamEvent>, u32) {
        self.ensure_block(OpenBlock::Text, || {
            ResponseContent::Text(ResponseTextBlock { text: String::new(), citations: None, unknown_fields: UnknownFields::default() })
        })
    }

    /// Ensures the open block is a thinking block; see [`Self::ensure_text_block`].
    pub fn ensure_thinking_block(&mut self) -> (Vec<StreamEvent>, u32) {
        self.ensure_block(OpenBlock::Thinking, || {
            ResponseContent::Thinking(ResponseThinkingBlock { signature: String::new(), thinking: String::new(), unknown_fields: UnknownFields::default() })
        })
    }

    /// Opens a tool_use block for a newly recognized tool call.
    pub fn open_tool_block(&mut self, id: &str, name: &str) -> (Vec<StreamEvent>, u32) {
        let id = id.to_string();
        let name = name.to_string();

        self.ensure_block(OpenBlock::Tool, move || {
            ResponseContent::ToolUse(ResponseToolUseBlock { id: id.clone(), name: name.clone(), input: json!({}), unknown_fields: UnknownFields::default() })
        })
    }

    fn ensure_block(&mut self, kind: OpenBlock, build: impl FnOnce() -> ResponseContent) -> (Vec<StreamEvent>, u32) {
        if let Some((index, open_kind)) = self.open
            && open_kind == kind
        {
            return (Vec::new(), index);
        }

        let mut events = Vec::new();
        events.extend(self.close_current());

        let index = self.next_index;
        self.next_index += 1;
        self.open = Some((index, kind));

        events.push(StreamEvent::ContentBlockStart { index, content_block: build() });

        (events, index)
    }

    /// Emits a `text_delta` for `index`. Empty strings are dropped.
    pub fn emit_text_delta(&self, index: u32, text: &str) -> Option<StreamEvent> {
        if text.is_empty() {
            return None;
        }

        Some(StreamEvent::ContentBlockDelta { index, delta: json!({"type": "text_delta", "text": text}) })
    }

    /// Emits a `thinking_delta` for `index`. Empty strings are dropped.
    pub fn emit_thinking_delta(&self, index: u32, text: &str) -> Option<StreamEvent> {
        if text.is_empty() {
            return None;
        }

        Some(StreamEvent::ContentBlockDelta { index, delta: json!({"type": "thinking_delta", "thinking": text}) })
    }

    /// Emits an `input_json_delta` for `index`. Empty strings are dropped.
    pub fn emit_tool_delta(&self, index: u32, partial_json: &str) -> Option<StreamEvent> {
        if partial_json.is_empty() {
            return None;
        }

        Some(StreamEvent::ContentBlockDelta { index, delta: json!({"type": "input_json_delta", "partial_json": partial_json}) })
    }

    /// Closes the currently open block, if any, emitting `content_block_stop`.
    pub fn close_current(&mut self) -> Option<StreamEvent> {
        let (index, _) = self.open.take()?;
        Some(StreamEvent::ContentBlockStop { index })
    }

    /// Closes any open block and emits the terminal `message_delta` +
    /// `message_stop` pair. Idempotent after the first call.
    pub fn finalize(&mut self, stop_reason: StopReason, usage: StreamUsage) -> Vec<StreamEvent> {
        if self.finalized {
            return Vec::new();
        }

        self.finalized = true;

        let mut events = Vec::new();
        events.extend(self.close_current());

        events.push(StreamEvent::MessageDelta(Box::new(MessageDelta {
            delta: Delta { stop_reason: Some(stop_reason), stop_sequence: None, unknown_fields: UnknownFields::default() },
            usage: Some(usage),
            unknown_fields: UnknownFields::default(),
        })));

        events.push(StreamEvent::MessageStop);

        events
    }

    /// Closes any open block and emits a terminal pair reflecting client
    /// disconnect or an explicit branch/tree cancel.
    pub fn cancel(&mut self, partial_usage: StreamUsage) -> Vec<StreamEvent> {
        self.finalize(StopReason::EndTurn, partial_usage)
    }

    /// Emits a standalone heartbeat event.
    pub fn ping(&self) -> StreamEvent {
        StreamEvent::Ping
    }

    /// Wraps an upstream/internal failure as a client-facing `error` event.
    pub fn error(&self, error: AnthropicError) -> StreamEvent {
        StreamEvent::Error { error }
    }
}

/// Renders one [`StreamEvent`] as `event: <type>\ndata: <json>\n\n` wire
/// bytes, matching the SSE shape in §6.1.
pub fn render(event: &StreamEvent) -> String {
    let (type_name, payload) = match serde_json::to_value(event).unwrap_or(Value::Null) {
        Value::Object(mut map) => {
            let type_name = map.remove("type").and_then(|v| v.as_str().map(str::to_string)).unwrap_or_else(|| "message".to_string());
            (type_name, Value::Object(map))
        }
        other => ("message".to_string(), other),
    };

    let data = serde_json::to_string(&reattach_type(&type_name, payload)).unwrap_or_else(|_| "{}".to_string());

    format!("event: {type_name}\ndata: {data}\n\n")
}

fn reattach_type(type_name: &str, payload: Value) -> Value {
    let Value::Object(mut map) = payload else { return payload };
    map.insert("type".to_string(), Value::String(type_name.to_string()));
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage() -> StreamUsage {
        StreamUsage {
            input_tokens: Some(10),
            output_tokens: Some(5),
            cache_creation: None,
            cache_creation_input_tokens: Some(0),
            cache_read_input_tokens: Some(0),
            server_tool_use: None,
            service_tier: None,
            unknown_fields: UnknownFields::default(),
        }
    }

    #[test]
    fn start_message_is_idempotent() {
        let mut builder = AnthropicSseBuilder::new();
        assert!(builder.start_message("msg_1", "m").is_some());
        assert!(builder.start_message("msg_1", "m").is_none());
    }

    #[test]
    fn reusing_same_block_kind_does_not_reopen() {
        let mut builder = AnthropicSseBuilder::new();
        let (events, index) = builder.ensure_text_block();
        assert_eq!(events.len(), 1);

        let (events, index2) = builder.ensure_text_block();
        assert!(events.is_empty());
        assert_eq!(index, index2);
    }

    #[test]
    fn switching_block_kind_closes_and_reopens_with_increasing_index() {
        let mut builder = AnthropicSseBuilder::new();
        let (_, text_index) = builder.ensure_text_block();
        let (events, think_index) = builder.ensure_thinking_block();

        assert!(think_index > text_index);
        assert!(matches!(events[0], StreamEvent::ContentBlockStop { index } if index == text_index));
        assert!(matches!(events[1], StreamEvent::ContentBlockStart { index, .. } if index == think_index));
    }

    #[test]
    fn empty_delta_text_is_dropped() {
        let mut builder = AnthropicSseBuilder::new();
        let (_, index) = builder.ensure_text_block();
        assert!(builder.emit_text_delta(index, "").is_none());
        assert!(builder.emit_text_delta(index, "hi").is_some());
    }

    #[test]
    fn finalize_closes_open_block_and_is_idempotent() {
        let mut builder = AnthropicSseBuilder::new();
        builder.ensure_text_block();

        let events = builder.finalize(StopReason::EndTurn, usage());
        assert!(matches!(events[0], StreamEvent::ContentBlockStop { .. }));
        assert!(matches!(events[1], StreamEvent::MessageDelta(_)));
        assert!(matches!(events[2], StreamEvent::MessageStop));

        assert!(builder.finalize(StopReason::EndTurn, usage()).is_empty());
    }

    #[test]
    fn render_produces_event_and_data_lines() {
        let rendered = render(&StreamEvent::MessageStop);
        assert_eq!(rendered, "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n");
    }
}
