//! `POST /v1/messages/count_tokens` (§6 "Token counting").
//!
//! Counts tokens with `tiktoken-rs`'s `cl100k_base` encoder rather than a
//! heuristic, adding the fixed per-message/per-role overhead Anthropic's own
//! counting endpoint documents.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tiktoken_rs::CoreBPE;

use crate::protocol::anthropic::messages::{
    InputMessage, InputMessageContent, InputMessageStructuredContent, Metadata, SystemPrompt, ThinkingConfig, Tool,
    ToolChoice,
};
use crate::protocol::unknown_fields::UnknownFields;

/// Request body for `/v1/messages/count_tokens`. A near-twin of
/// [`crate::protocol::anthropic::messages::Request`] that omits `max_tokens`
/// and `stream`, neither of which this endpoint accepts.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CountTokensRequest {
    pub model: String,
    pub messages: Vec<InputMessage>,

    #[serde(default)]
    pub system: Option<SystemPrompt>,

    #[serde(default)]
    pub tools: Option<Vec<Tool>>,

    #[serde(default)]
    pub tool_choice: Option<ToolChoice>,

    #[serde(default)]
    pub thinking: Option<ThinkingConfig>,

    #[serde(default)]
    pub metadata: Option<Metadata>,

    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// Response body for `/v1/messages/count_tokens`.
#[derive(Debug, Clone, Serialize)]
pub struct CountTokensResponse {
    pub input_tokens: u32,
}

fn encoder() -> &'static CoreBPE {
    static ENCODER: OnceLock<CoreBPE> = OnceLock::new();
    ENCODER.get_or_init(|| tiktoken_rs::cl100k_base().expect("cl100k_base vocabulary is bundled with tiktoken-rs"))
}

fn bpe_len(text: &str) -> u64 {
    encoder().encode_ordinary(text).len() as u64
}

/// Counts input tokens for `request`, following the overhead table in §6:
/// 4 tokens per message, +4 for system framing, +15 per `tool_use` block,
/// +8 per `tool_result` block, +5 per tool definition, and an image cost of
/// `max(85, base64_len/3000)` (or 765 with no inline data). The total is
/// never reported as zero.
pub fn count_tokens(request: &CountTokensRequest) -> u32 {
    let mut total: u64 = 0;

    if let Some(system) = &request.system {
        total += 4;
        total += bpe_len(&system.clone().into_text());
    }

    for message in &request.messages {
        total += 4;
        total += count_message_content(&message.content);
    }

    if let Some(tools) = &request.tools {
        for tool in tools {
            total += 5;
            total += bpe_len(&tool.name);
            total += tool.description.as_deref().map(bpe_len).unwrap_or(0);
            total += bpe_len(&serde_json::to_string(&tool.input_schema).unwrap_or_default());
        }
    }

    total.max(1).min(u64::from(u32::MAX)) as u32
}

fn count_message_content(content: &InputMessageContent) -> u64 {
    match content {
        InputMessageContent::Text(text) => bpe_len(text),
        InputMessageContent::Items(items) => items.iter().map(count_block).sum(),
    }
}

fn count_block(block: &InputMessageStructuredContent) -> u64 {
    match block {
        InputMessageStructuredContent::Text(block) => bpe_len(&block.text),
        InputMessageStructuredContent::Image(block) => image_cost(&block.source),
        InputMessageStructuredContent::Thinking(block) => bpe_len(&block.thinking),
        InputMessageStructuredContent::RedactedThinking(_) => 0,
        InputMessageStructuredContent::ToolUse(block) => {
            15 + bpe_len(&block.name) + bpe_len(&serde_json::to_string(&block.input).unwrap_or_default())
        }
        InputMessageStructuredContent::ToolResult(block) => 8 + bpe_len(&tool_result_text(&block.content)),
        InputMessageStructuredContent::Unknown(_) => 0,
    }
}

fn image_cost(source: &Value) -> u64 {
    match source.get("data").and_then(Value::as_str) {
        Some(data) => std::cmp::max(85, data.len() / 3000) as u64,
        None => 765,
    }
}

fn tool_result_text(content: &Option<Value>) -> String {
    match content {
        None => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(items)) => {
            items.iter().filter_map(|item| item.get("text").and_then(Value::as_str)).collect::<Vec<_>>().join("")
        }
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::anthropic::messages::{RequestToolResultBlock, RequestToolUseBlock, Role};
    use serde_json::json;

    fn request(messages: Vec<InputMessage>) -> CountTokensRequest {
        CountTokensRequest {
            model: "claude-3-5-sonnet-20241022".to_string(),
            messages,
            system: None,
            tools: None,
            tool_choice: None,
            thinking: None,
            metadata: None,
            unknown_fields: UnknownFields::default(),
        }
    }

    fn text_message(role: Role, text: &str) -> InputMessage {
        InputMessage { role, content: InputMessageContent::Text(text.to_string()), unknown_fields: UnknownFields::default() }
    }

    #[test]
    fn never_reports_zero_for_an_empty_request() {
        let request = request(Vec::new());
        assert!(count_tokens(&request) >= 1);
    }

    #[test]
    fn per_message_overhead_is_applied() {
        let short = request(vec![text_message(Role::User, "hi")]);
        let long = request(vec![text_message(Role::User, "hi"), text_message(Role::User, "hi")]);

        assert!(count_tokens(&long) > count_tokens(&short));
    }

    #[test]
    fn tool_use_block_adds_fifteen_token_overhead() {
        let with_tool_use = request(vec![InputMessage {
            role: Role::Assistant,
            content: InputMessageContent::Items(vec![InputMessageStructuredContent::ToolUse(RequestToolUseBlock {
                id: "call_1".to_string(),
                input: json!({}),
                name: "lookup".to_string(),
                cache_control: None,
                unknown_fields: UnknownFields::default(),
            })]),
            unknown_fields: UnknownFields::default(),
        }]);

        let baseline = request(vec![text_message(Role::Assistant, "")]);

        assert!(count_tokens(&with_tool_use) >= count_tokens(&baseline) + 15);
    }

    #[test]
    fn tool_result_block_adds_eight_token_overhead() {
        let with_result = request(vec![InputMessage {
            role: Role::User,
            content: InputMessageContent::Items(vec![InputMessageStructuredContent::ToolResult(RequestToolResultBlock {
                tool_use_id: "call_1".to_string(),
                content: Some(json!("done")),
                is_error: None,
                cache_control: None,
                unknown_fields: UnknownFields::default(),
            })]),
            unknown_fields: UnknownFields::default(),
        }]);

        let baseline = request(vec![text_message(Role::User, "done")]);

        assert!(count_tokens(&with_result) >= count_tokens(&baseline) + 8);
    }

    #[test]
    fn image_without_inline_data_costs_765() {
        let with_image = request(vec![InputMessage {
            role: Role::User,
            content: InputMessageContent::Items(vec![InputMessageStructuredContent::Image(
                crate::protocol::anthropic::messages::RequestImageBlock {
                    source: json!({"type": "url", "url": "https://example.com/cat.png"}),
                    cache_control: None,
                    unknown_fields: UnknownFields::default(),
                },
            )]),
            unknown_fields: UnknownFields::default(),
        }]);

        assert!(count_tokens(&with_image) >= 765);
    }
}
