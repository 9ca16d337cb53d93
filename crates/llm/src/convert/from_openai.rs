//! Response Converter (C3): OpenAI non-streaming response → Anthropic
//! response (§4.2).

use serde_json::Value;

use crate::openai;
use crate::protocol::anthropic::messages::{
    CacheCreation, Response, ResponseContent, ResponseTextBlock, ResponseThinkingBlock, ResponseToolUseBlock, Role,
    StopReason, Usage,
};
use crate::protocol::unknown_fields::UnknownFields;
use crate::stream::heuristic_tool;
use crate::stream::think::{ChunkKind, ThinkTagParser};

/// Name of the tool whose `run_in_background` flag the gateway forces to
/// `false` before surfacing a tool call to the client (§4.6 "Subagent task
/// interception").
const SUBAGENT_TOOL_NAME: &str = "Task";

pub fn from_openai(upstream: openai::ChatResponse, model: &str, heuristic_tool_parsing: bool) -> Response {
    let choice = upstream.choices.into_iter().next();
    let finish_reason = choice.as_ref().and_then(|c| c.finish_reason.clone());
    let message = choice.map(|c| c.message);

    let mut content = Vec::new();
    let mut recovered_tool_use = false;

    if let Some(message) = message {
        push_text_content(&mut content, &message);

        for call in message.tool_calls.into_iter().flatten() {
            let mut input = parse_tool_arguments(&call.function.arguments);
            apply_subagent_interception(&call.function.name, &mut input);

            content.push(ResponseContent::ToolUse(ResponseToolUseBlock {
                id: call.id,
                name: call.function.name,
                input,
                unknown_fields: UnknownFields::default(),
            }));
        }
    }

    if heuristic_tool_parsing {
        recovered_tool_use = apply_heuristic_tool_parsing(&mut content);
    }

    if content.is_empty() {
        // Some upstreams reject an assistant message with empty content on
        // the next turn, so a single space keeps follow-up requests valid.
        content.push(ResponseContent::Text(ResponseTextBlock {
            text: " ".to_string(),
            citations: None,
            unknown_fields: UnknownFields::default(),
        }));
    }

    let usage = upstream.usage.unwrap_or(openai::Usage { prompt_tokens: 0, completion_tokens: 0 });

    let stop_reason =
        if recovered_tool_use { StopReason::ToolUse } else { map_stop_reason(finish_reason.as_deref()) };

    Response {
        id: upstream.id.unwrap_or_else(mint_message_id),
        role: Role::Assistant,
        content,
        model: model.to_string(),
        stop_reason: Some(stop_reason),
        stop_sequence: None,
        usage: Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            cache_creation: None::<CacheCreation>,
            cache_creation_input_tokens: Some(0),
            cache_read_input_tokens: Some(0),
            server_tool_use: None,
            service_tier: None,
            unknown_fields: UnknownFields::default(),
        },
        unknown_fields: UnknownFields::default(),
    }
}

/// Builds the leading `thinking` block (if any) and the `text` block from
/// `message.content`, following the priority order in §4.2 rule 1/2:
/// structured `reasoning_content`/`reasoning_details` first, a `<think>`
/// tag fallback second.
fn push_text_content(content: &mut Vec<ResponseContent>, message: &openai::ResponseMessage) {
    if let Some(reasoning) = message.reasoning_text() {
        content.push(ResponseContent::Thinking(ResponseThinkingBlock {
            signature: String::new(),
            thinking: reasoning,
            unknown_fields: UnknownFields::default(),
        }));

        if let Some(text) = &message.content
            && !text.is_empty()
        {
            content.push(ResponseContent::Text(ResponseTextBlock {
                text: text.clone(),
                citations: None,
                unknown_fields: UnknownFields::default(),
            }));
        }

        return;
    }

    let Some(text) = &message.content else { return };

    let mut parser = ThinkTagParser::new();
    let mut chunks = parser.feed(text);
    chunks.extend(parser.finalize());

    let mut thinking = String::new();
    let mut visible = String::new();

    for chunk in chunks {
        match chunk.kind {
            ChunkKind::Think => thinking.push_str(&chunk.text),
            ChunkKind::Text => visible.push_str(&chunk.text),
        }
    }

    if !thinking.is_empty() {
        content.push(ResponseContent::Thinking(ResponseThinkingBlock {
            signature: String::new(),
            thinking,
            unknown_fields: UnknownFields::default(),
        }));
    }

    if !visible.is_empty() {
        content.push(ResponseContent::Text(ResponseTextBlock {
            text: visible,
            citations: None,
            unknown_fields: UnknownFields::default(),
        }));
    }
}

fn parse_tool_arguments(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Forces a `Task` tool call's `run_in_background` argument to `false`,
/// preventing the orchestrator from spawning background subagents through
/// this gateway (§4.6).
pub(crate) fn apply_subagent_interception(name: &str, input: &mut Value) {
    if name != SUBAGENT_TOOL_NAME {
        return;
    }

    if let Some(object) = input.as_object_mut()
        && object.get("run_in_background").and_then(Value::as_bool) == Some(true)
    {
        object.insert("run_in_background".to_string(), Value::Bool(false));
    }
}

pub(crate) fn map_stop_reason(finish_reason: Option<&str>) -> StopReason {
    match finish_reason {
        Some("stop") => StopReason::EndTurn,
        Some("length") => StopReason::MaxTokens,
        Some("tool_calls") => StopReason::ToolUse,
        Some("content_filter") => StopReason::EndTurn,
        _ => StopReason::EndTurn,
    }
}

/// Builds a streaming `StreamUsage` from an upstream OpenAI usage payload,
/// mirroring the non-streaming `Usage` construction above so the Provider
/// Adapter's pump (C7) doesn't duplicate the cache-field defaulting rules.
pub(crate) fn stream_usage(usage: Option<openai::Usage>) -> crate::protocol::anthropic::messages::StreamUsage {
    let usage = usage.unwrap_or(openai::Usage { prompt_tokens: 0, completion_tokens: 0 });

    crate::protocol::anthropic::messages::StreamUsage {
        input_tokens: Some(usage.prompt_tokens),
        output_tokens: Some(usage.completion_tokens),
        cache_creation: None,
        cache_creation_input_tokens: Some(0),
        cache_read_input_tokens: Some(0),
        server_tool_use: None,
        service_tier: None,
        unknown_fields: UnknownFields::default(),
    }
}

/// Runs heuristic tool-call recovery (C6) against the last visible `text`
/// block in `content`, replacing it with whatever text remained and
/// appending a `tool_use` block per recovered call plus a trailing text
/// block describing any parse failure. Returns whether any call was
/// recovered, so the caller can force `stop_reason` to `tool_use`.
fn apply_heuristic_tool_parsing(content: &mut Vec<ResponseContent>) -> bool {
    let Some(index) = content.iter().rposition(|block| matches!(block, ResponseContent::Text(_))) else {
        return false;
    };

    let ResponseContent::Text(text_block) = content.remove(index) else { unreachable!() };
    let mut remaining = text_block.text;

    let mut recovered = Vec::new();
    let mut errors = Vec::new();

    while let Some(extracted) = heuristic_tool::extract(&remaining) {
        remaining = extracted.remaining_text;
        if let Some(error) = extracted.parse_error {
            errors.push(error);
        }
        recovered.extend(extracted.calls);

        if recovered.is_empty() && errors.is_empty() {
            break;
        }
    }

    let trimmed = remaining.trim();
    if !trimmed.is_empty() {
        content.insert(
            index,
            ResponseContent::Text(ResponseTextBlock {
                text: trimmed.to_string(),
                citations: None,
                unknown_fields: UnknownFields::default(),
            }),
        );
    }

    let found_any = !recovered.is_empty();

    for call in recovered {
        let mut input = call.input;
        apply_subagent_interception(&call.name, &mut input);

        content.push(ResponseContent::ToolUse(ResponseToolUseBlock {
            id: call.id,
            name: call.name,
            input,
            unknown_fields: UnknownFields::default(),
        }));
    }

    if !errors.is_empty() {
        content.push(ResponseContent::Text(ResponseTextBlock {
            text: format!("[tool call parse error: {}]", errors.join("; ")),
            citations: None,
            unknown_fields: UnknownFields::default(),
        }));
    }

    found_any
}

fn mint_message_id() -> String {
    format!("msg_{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openai::{ChatResponse, Choice, ResponseMessage, ToolCall, Usage as OpenAiUsage};
    use serde_json::json;

    fn response(message: ResponseMessage, finish_reason: Option<&str>) -> ChatResponse {
        ChatResponse {
            id: Some("chatcmpl-1".to_string()),
            choices: vec![Choice { message, finish_reason: finish_reason.map(str::to_string) }],
            usage: Some(OpenAiUsage { prompt_tokens: 3, completion_tokens: 1 }),
        }
    }

    fn empty_message(content: Option<&str>) -> ResponseMessage {
        ResponseMessage {
            content: content.map(str::to_string),
            reasoning_content: None,
            reasoning_details: None,
            tool_calls: None,
        }
    }

    #[test]
    fn non_streaming_happy_path() {
        let upstream = response(empty_message(Some("hello")), Some("stop"));
        let result = from_openai(upstream, "meta/llama-3.1-70b-instruct", false);

        assert_eq!(result.content.len(), 1);
        assert!(matches!(&result.content[0], ResponseContent::Text(block) if block.text == "hello"));
        assert_eq!(result.stop_reason, Some(StopReason::EndTurn));
        assert_eq!(result.usage.input_tokens, 3);
        assert_eq!(result.usage.output_tokens, 1);
    }

    #[test]
    fn tool_call_round_trip_forces_subagent_foreground() {
        let mut message = empty_message(None);
        message.tool_calls = Some(vec![ToolCall::function(
            "call_1".to_string(),
            "Task".to_string(),
            r#"{"run_in_background": true}"#.to_string(),
        )]);

        let upstream = response(message, Some("tool_calls"));
        let result = from_openai(upstream, "m", false);

        assert_eq!(result.stop_reason, Some(StopReason::ToolUse));
        let ResponseContent::ToolUse(tool_use) = &result.content[0] else { panic!("expected tool_use block") };
        assert_eq!(tool_use.input, json!({"run_in_background": false}));
    }

    #[test]
    fn think_tag_fallback_splits_into_thinking_and_text_blocks() {
        let upstream = response(empty_message(Some("<think>reasoning</think>answer")), Some("stop"));
        let result = from_openai(upstream, "m", false);

        assert_eq!(result.content.len(), 2);
        assert!(matches!(&result.content[0], ResponseContent::Thinking(block) if block.thinking == "reasoning"));
        assert!(matches!(&result.content[1], ResponseContent::Text(block) if block.text == "answer"));
    }

    #[test]
    fn empty_content_falls_back_to_single_space_block() {
        let upstream = response(empty_message(None), Some("stop"));
        let result = from_openai(upstream, "m", false);

        assert_eq!(result.content.len(), 1);
        assert!(matches!(&result.content[0], ResponseContent::Text(block) if block.text == " "));
    }

    #[test]
    fn missing_upstream_id_mints_a_fresh_one() {
        let mut upstream = response(empty_message(Some("hi")), Some("stop"));
        upstream.id = None;

        let result = from_openai(upstream, "m", false);
        assert!(result.id.starts_with("msg_"));
    }
}
