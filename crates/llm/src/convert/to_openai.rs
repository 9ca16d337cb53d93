//! Request Converter (C2): Anthropic request → OpenAI request body (§4.1).

use config::ProviderDefaults;
use serde_json::{Map, Value, json};

use crate::openai::{ChatRequest, ImageUrl, Message, MessageContent, MessageContentPart, Tool, ToolCall};
use crate::protocol::anthropic::messages::{
    InputMessage, InputMessageContent, InputMessageStructuredContent, Request, RequestToolResultBlock, Role,
    ToolChoice,
};

const NAMED_FIELDS: &[&str] = &["model", "messages", "max_tokens", "temperature", "top_p", "stop", "tools", "tool_choice", "stream"];

/// Per-call knobs the converter needs beyond the request body itself.
pub struct ConvertOptions<'a> {
    /// The upstream-facing model identifier (already resolved from the
    /// alias table; §4.1 "Model normalization").
    pub model: String,
    /// The provider's configured `max_tokens` ceiling, if any.
    pub max_tokens_cap: Option<u32>,
    /// Provider-level sampling defaults merged under the request's own
    /// `extra_body`.
    pub defaults: &'a ProviderDefaults,
}

pub fn to_openai(request: &Request, options: &ConvertOptions<'_>) -> ChatRequest {
    let mut messages = Vec::new();

    if let Some(system) = &request.system {
        let text = system.clone().into_text();

        if !text.is_empty() {
            messages.push(Message::system(text));
        }
    }

    for message in &request.messages {
        push_message(&mut messages, message);
    }

    let max_tokens = Some(match options.max_tokens_cap {
        Some(cap) => request.max_tokens.min(cap),
        None => request.max_tokens,
    });

    let tools = request.tools.as_ref().map(|tools| {
        tools
            .iter()
            .map(|tool| Tool::function(tool.name.clone(), tool.description.clone(), tool.input_schema.clone()))
            .collect()
    });

    let tool_choice = request.tool_choice.as_ref().map(tool_choice_to_openai);

    let mut extra = request.extra_body.clone().unwrap_or_default();
    apply_thinking_hints(request, &mut extra);
    apply_provider_defaults(options.defaults, &mut extra);

    // Request-level top_k always wins over whatever extra_body/defaults set
    // (§9 Open Question (b)); top_k has no named field, so it only ever
    // lives in `extra`.
    if let Some(top_k) = request.top_k {
        extra.insert("top_k".to_string(), json!(top_k));
    }

    // top_p is a named OpenAI field; pull anything extra_body/defaults set
    // for it out of `extra` so it isn't emitted twice, with the request
    // level taking precedence when both are present.
    let extra_top_p = extra.remove("top_p").and_then(|v| v.as_f64()).map(|v| v as f32);
    let top_p = request.top_p.or(extra_top_p);

    for field in NAMED_FIELDS {
        extra.remove(*field);
    }

    ChatRequest {
        model: options.model.clone(),
        messages,
        max_tokens,
        temperature: request.temperature,
        top_p,
        stop: request.stop_sequences.clone(),
        tools,
        tool_choice,
        stream: request.stream.unwrap_or(true),
        extra,
    }
}

fn apply_thinking_hints(request: &Request, extra: &mut Map<String, Value>) {
    let Some(thinking) = &request.thinking else { return };

    if !thinking.is_enabled() {
        return;
    }

    extra.entry("thinking".to_string()).or_insert_with(|| json!({"type": "enabled"}));
    extra.entry("reasoning_split".to_string()).or_insert_with(|| json!(true));
    extra.entry("chat_template_kwargs".to_string()).or_insert_with(|| {
        json!({"thinking": true, "reasoning_split": true, "clear_thinking": false})
    });
}

fn apply_provider_defaults(defaults: &ProviderDefaults, extra: &mut Map<String, Value>) {
    for (key, value) in &defaults.0 {
        if extra.contains_key(key) {
            continue;
        }

        if is_ignore_value(value) {
            continue;
        }

        extra.insert(key.clone(), value.clone());
    }
}

/// Providers use a documented sentinel (e.g. `top_k = -1`) to mean "leave
/// this sampling knob unset"; such defaults must not be forwarded.
fn is_ignore_value(value: &Value) -> bool {
    value.as_i64() == Some(-1)
}

fn push_message(out: &mut Vec<Message>, message: &InputMessage) {
    match &message.content {
        InputMessageContent::Text(text) => match message.role {
            Role::Assistant => out.push(Message::assistant(Some(text.clone()), Vec::new())),
            Role::User | Role::Unknown(_) => out.push(Message::user(MessageContent::Text(text.clone()))),
        },
        InputMessageContent::Items(items) => match message.role {
            Role::Assistant => push_assistant_blocks(out, items),
            Role::User | Role::Unknown(_) => push_user_blocks(out, items),
        },
    }
}

fn push_user_blocks(out: &mut Vec<Message>, items: &[InputMessageStructuredContent]) {
    let mut parts = Vec::new();
    let mut text_only = String::new();
    let mut has_image = false;

    for item in items {
        match item {
            InputMessageStructuredContent::Text(block) => {
                text_only.push_str(&block.text);
                parts.push(MessageContentPart::Text { text: block.text.clone() });
            }
            InputMessageStructuredContent::Image(block) => {
                if let Some(url) = image_source_to_url(&block.source) {
                    has_image = true;
                    parts.push(MessageContentPart::ImageUrl { image_url: ImageUrl { url } });
                }
            }
            InputMessageStructuredContent::ToolResult(block) => {
                flush_user_content(out, &mut parts, &mut text_only, &mut has_image);
                out.push(Message::tool(block.tool_use_id.clone(), tool_result_to_string(block)));
            }
            InputMessageStructuredContent::Thinking(_)
            | InputMessageStructuredContent::RedactedThinking(_)
            | InputMessageStructuredContent::ToolUse(_)
            | InputMessageStructuredContent::Unknown(_) => {}
        }
    }

    flush_user_content(out, &mut parts, &mut text_only, &mut has_image);
}

fn flush_user_content(out: &mut Vec<Message>, parts: &mut Vec<MessageContentPart>, text_only: &mut String, has_image: &mut bool) {
    if *has_image {
        out.push(Message::user(MessageContent::Parts(std::mem::take(parts))));
    } else if !text_only.is_empty() {
        out.push(Message::user(MessageContent::Text(std::mem::take(text_only))));
    }

    parts.clear();
    text_only.clear();
    *has_image = false;
}

fn push_assistant_blocks(out: &mut Vec<Message>, items: &[InputMessageStructuredContent]) {
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for item in items {
        match item {
            InputMessageStructuredContent::Text(block) => text.push_str(&block.text),
            InputMessageStructuredContent::ToolUse(block) => {
                let arguments = serde_json::to_string(&block.input).unwrap_or_else(|_| "{}".to_string());
                tool_calls.push(ToolCall::function(block.id.clone(), block.name.clone(), arguments));
            }
            // Thinking/redacted-thinking blocks are dropped - providers
            // don't accept them back on the next turn (§4.1 "Messages").
            InputMessageStructuredContent::Thinking(_)
            | InputMessageStructuredContent::RedactedThinking(_)
            | InputMessageStructuredContent::Image(_)
            | InputMessageStructuredContent::ToolResult(_)
            | InputMessageStructuredContent::Unknown(_) => {}
        }
    }

    out.push(Message::assistant((!text.is_empty()).then_some(text), tool_calls));
}

fn tool_result_to_string(block: &RequestToolResultBlock) -> String {
    match &block.content {
        None => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        Some(other) => other.to_string(),
    }
}

fn image_source_to_url(source: &Value) -> Option<String> {
    match source.get("type").and_then(Value::as_str) {
        Some("url") => source.get("url").and_then(Value::as_str).map(str::to_string),
        Some("base64") => {
            let media_type = source.get("media_type").and_then(Value::as_str).unwrap_or("image/png");
            let data = source.get("data").and_then(Value::as_str)?;
            Some(format!("data:{media_type};base64,{data}"))
        }
        _ => None,
    }
}

fn tool_choice_to_openai(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto { .. } => json!("auto"),
        ToolChoice::Any { .. } => json!("required"),
        ToolChoice::Tool { name, .. } => json!({"type": "function", "function": {"name": name}}),
        ToolChoice::None { .. } => json!("none"),
        ToolChoice::Unknown(value) => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::anthropic::messages::{InputMessageContent, RequestTextBlock, RequestToolResultBlock, ThinkingConfig};
    use crate::protocol::unknown_fields::UnknownFields;

    fn defaults(pairs: &[(&str, Value)]) -> ProviderDefaults {
        ProviderDefaults(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
    }

    fn minimal_request() -> Request {
        Request {
            model: "claude-3-5-sonnet-20241022".to_string(),
            messages: vec![InputMessage {
                role: Role::User,
                content: InputMessageContent::Text("hi".to_string()),
                unknown_fields: UnknownFields::default(),
            }],
            max_tokens: 16,
            system: None,
            temperature: None,
            top_p: None,
            top_k: None,
            stop_sequences: None,
            stream: None,
            metadata: None,
            tools: None,
            tool_choice: None,
            thinking: None,
            extra_body: None,
            unknown_fields: UnknownFields::default(),
        }
    }

    #[test]
    fn plain_text_user_message_round_trips() {
        let request = minimal_request();
        let options = ConvertOptions { model: "meta/llama-3.1-70b-instruct".to_string(), max_tokens_cap: None, defaults: &defaults(&[]) };

        let body = to_openai(&request, &options);

        assert_eq!(body.messages.len(), 1);
        assert_eq!(body.messages[0].role, "user");
        assert!(matches!(&body.messages[0].content, Some(MessageContent::Text(t)) if t == "hi"));
    }

    #[test]
    fn max_tokens_is_capped_by_provider_ceiling() {
        let mut request = minimal_request();
        request.max_tokens = 10_000;

        let options = ConvertOptions { model: "m".to_string(), max_tokens_cap: Some(4096), defaults: &defaults(&[]) };
        let body = to_openai(&request, &options);

        assert_eq!(body.max_tokens, Some(4096));
    }

    #[test]
    fn request_level_top_k_overrides_provider_default() {
        let mut request = minimal_request();
        request.top_k = Some(7);

        let options = ConvertOptions { model: "m".to_string(), max_tokens_cap: None, defaults: &defaults(&[("top_k", json!(40))]) };
        let body = to_openai(&request, &options);

        assert_eq!(body.extra.get("top_k"), Some(&json!(7)));
    }

    #[test]
    fn ignore_value_default_is_not_forwarded() {
        let request = minimal_request();
        let options = ConvertOptions { model: "m".to_string(), max_tokens_cap: None, defaults: &defaults(&[("top_k", json!(-1))]) };
        let body = to_openai(&request, &options);

        assert!(!body.extra.contains_key("top_k"));
    }

    #[test]
    fn thinking_enabled_sets_reasoning_hints_unless_already_present() {
        let mut request = minimal_request();
        request.thinking = Some(ThinkingConfig::Enabled { budget_tokens: 1024, unknown_fields: UnknownFields::default() });

        let options = ConvertOptions { model: "m".to_string(), max_tokens_cap: None, defaults: &defaults(&[]) };
        let body = to_openai(&request, &options);

        assert_eq!(body.extra.get("thinking"), Some(&json!({"type": "enabled"})));
        assert_eq!(body.extra.get("reasoning_split"), Some(&json!(true)));
    }

    #[test]
    fn tool_result_block_becomes_separate_tool_message() {
        let mut request = minimal_request();
        request.messages[0].content = InputMessageContent::Items(vec![
            crate::protocol::anthropic::messages::InputMessageStructuredContent::Text(RequestTextBlock {
                text: "before".to_string(),
                cache_control: None,
                unknown_fields: UnknownFields::default(),
            }),
            crate::protocol::anthropic::messages::InputMessageStructuredContent::ToolResult(RequestToolResultBlock {
                tool_use_id: "call_1".to_string(),
                content: Some(json!("result text")),
                is_error: None,
                cache_control: None,
                unknown_fields: UnknownFields::default(),
            }),
        ]);

        let options = ConvertOptions { model: "m".to_string(), max_tokens_cap: None, defaults: &defaults(&[]) };
        let body = to_openai(&request, &options);

        assert_eq!(body.messages.len(), 2);
        assert_eq!(body.messages[0].role, "user");
        assert_eq!(body.messages[1].role, "tool");
        assert_eq!(body.messages[1].tool_call_id.as_deref(), Some("call_1"));
    }
}
