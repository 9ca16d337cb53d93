//! Heuristic recovery of tool calls emitted as inline text instead of a
//! structured `tool_calls` field (C6). Small or fine-tuned models sometimes
//! fall back to this; the adapter opts in per-provider.
//!
//! Three frames are recognized, in priority order, against the text
//! accumulated so far: a fenced `<tool_call>{json}</tool_call>` block, an
//! `<invoke name="X"><parameter name="k">v</parameter>...</invoke>` block,
//! and a bare JSON object at a line boundary with exactly the keys
//! `{name, arguments}` or `{tool, args}`.

use serde_json::Value;

/// A tool call recovered from inline text.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolUseCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// Result of scanning accumulated text for a heuristic tool-call frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    /// Tool calls recognized in the scanned text, in the order they appear.
    pub calls: Vec<ToolUseCall>,
    /// Text with every matched frame removed.
    pub remaining_text: String,
    /// Set when a recognized frame contained malformed JSON; the final
    /// stream should append this as a trailing text block rather than
    /// silently dropping the failure.
    pub parse_error: Option<String>,
}

/// Scans `text` for the first recognized tool-call frame and extracts it.
/// Returns `None` if no frame is present at all.
pub fn extract(text: &str) -> Option<Extracted> {
    if let Some(result) = extract_fenced_tool_call(text) {
        return Some(result);
    }

    if let Some(result) = extract_invoke(text) {
        return Some(result);
    }

    extract_bare_json(text)
}

fn mint_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

fn extract_fenced_tool_call(text: &str) -> Option<Extracted> {
    const OPEN: &str = "<tool_call>";
    const CLOSE: &str = "</tool_call>";

    let start = text.find(OPEN)?;
    let body_start = start + OPEN.len();
    let end = text[body_start..].find(CLOSE)? + body_start;

    let body = &text[body_start..end];
    let remaining = format!("{}{}", &text[..start], &text[end + CLOSE.len()..]);

    match serde_json::from_str::<Value>(body) {
        Ok(value) => match call_from_name_arguments_object(&value) {
            Some(call) => Some(Extracted { calls: vec![call], remaining_text: remaining, parse_error: None }),
            None => Some(Extracted {
                calls: Vec::new(),
                remaining_text: remaining,
                parse_error: Some(format!("tool_call frame missing name/arguments fields: {body}")),
            }),
        },
        Err(err) => Some(Extracted {
            calls: Vec::new(),
            remaining_text: remaining,
            parse_error: Some(format!("malformed JSON in tool_call frame: {err}")),
        }),
    }
}

fn call_from_name_arguments_object(value: &Value) -> Option<ToolUseCall> {
    let object = value.as_object()?;
    let name = object.get("name")?.as_str()?.to_string();
    let input = object.get("arguments").or_else(|| object.get("input")).cloned().unwrap_or(Value::Object(Default::default()));

    Some(ToolUseCall { id: mint_id(), name, input })
}

fn extract_invoke(text: &str) -> Option<Extracted> {
    const OPEN_PREFIX: &str = "<invoke name=\"";
    const CLOSE: &str = "</invoke>";

    let start = text.find(OPEN_PREFIX)?;
    let name_start = start + OPEN_PREFIX.len();
    let name_end = text[name_start..].find('"')? + name_start;
    let name = text[name_start..name_end].to_string();

    let tag_end = text[name_end..].find('>')? + name_end + 1;
    let body_end = text[tag_end..].find(CLOSE)? + tag_end;
    let body = &text[tag_end..body_end];

    let remaining = format!("{}{}", &text[..start], &text[body_end + CLOSE.len()..]);

    match parse_invoke_parameters(body) {
        Ok(input) => Some(Extracted {
            calls: vec![ToolUseCall { id: mint_id(), name, input }],
            remaining_text: remaining,
            parse_error: None,
        }),
        Err(err) => Some(Extracted { calls: Vec::new(), remaining_text: remaining, parse_error: Some(err) }),
    }
}

fn parse_invoke_parameters(body: &str) -> Result<Value, String> {
    const PARAM_PREFIX: &str = "<parameter name=\"";
    const PARAM_CLOSE: &str = "</parameter>";

    let mut object = serde_json::Map::new();
    let mut cursor = 0;

    while let Some(rel_start) = body[cursor..].find(PARAM_PREFIX) {
        let start = cursor + rel_start + PARAM_PREFIX.len();
        let name_end = body[start..]
            .find('"')
            .map(|i| start + i)
            .ok_or_else(|| "unterminated parameter name in invoke frame".to_string())?;
        let key = body[start..name_end].to_string();

        let tag_end = body[name_end..]
            .find('>')
            .map(|i| name_end + i + 1)
            .ok_or_else(|| "unterminated parameter tag in invoke frame".to_string())?;
        let value_end = body[tag_end..]
            .find(PARAM_CLOSE)
            .map(|i| tag_end + i)
            .ok_or_else(|| "unclosed parameter in invoke frame".to_string())?;

        let raw_value = body[tag_end..value_end].trim();
        let value = serde_json::from_str::<Value>(raw_value).unwrap_or_else(|_| Value::String(raw_value.to_string()));
        object.insert(key, value);

        cursor = value_end + PARAM_CLOSE.len();
    }

    Ok(Value::Object(object))
}

fn extract_bare_json(text: &str) -> Option<Extracted> {
    for line in text.lines() {
        let trimmed = line.trim();
        if !trimmed.starts_with('{') || !trimmed.ends_with('}') {
            continue;
        }

        let Ok(value) = serde_json::from_str::<Value>(trimmed) else { continue };
        let Some(object) = value.as_object() else { continue };

        let call = if object.len() == 2 && object.contains_key("name") && object.contains_key("arguments") {
            call_from_name_arguments_object(&value)
        } else if object.len() == 2 && object.contains_key("tool") && object.contains_key("args") {
            let name = object.get("tool")?.as_str()?.to_string();
            let input = object.get("args").cloned().unwrap_or(Value::Object(Default::default()));
            Some(ToolUseCall { id: mint_id(), name, input })
        } else {
            None
        };

        let Some(call) = call else { continue };

        let remaining = text.replacen(line, "", 1);
        return Some(Extracted { calls: vec![call], remaining_text: remaining, parse_error: None });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fenced_tool_call_with_arguments_field() {
        let text = r#"before <tool_call>{"name": "lookup", "arguments": {"q": "rust"}}</tool_call> after"#;
        let extracted = extract(text).expect("frame recognized");

        assert_eq!(extracted.calls.len(), 1);
        assert_eq!(extracted.calls[0].name, "lookup");
        assert_eq!(extracted.calls[0].input, json!({"q": "rust"}));
        assert_eq!(extracted.remaining_text, "before  after");
        assert!(extracted.parse_error.is_none());
    }

    #[test]
    fn fenced_tool_call_malformed_json_reports_error_not_silent_drop() {
        let text = "<tool_call>{not json}</tool_call>";
        let extracted = extract(text).expect("frame recognized");

        assert!(extracted.calls.is_empty());
        assert!(extracted.parse_error.is_some());
    }

    #[test]
    fn invoke_style_frame_collects_parameters() {
        let text = r#"<invoke name="Bash"><parameter name="command">ls -la</parameter><parameter name="timeout">30</parameter></invoke>"#;
        let extracted = extract(text).expect("frame recognized");

        assert_eq!(extracted.calls[0].name, "Bash");
        assert_eq!(extracted.calls[0].input, json!({"command": "ls -la", "timeout": 30}));
    }

    #[test]
    fn bare_json_line_with_name_arguments_keys() {
        let text = "some preamble\n{\"name\": \"search\", \"arguments\": {\"q\": \"x\"}}\ntrailer";
        let extracted = extract(text).expect("frame recognized");

        assert_eq!(extracted.calls[0].name, "search");
        assert!(!extracted.remaining_text.contains("\"name\""));
    }

    #[test]
    fn bare_json_line_with_tool_args_keys() {
        let text = "{\"tool\": \"search\", \"args\": {\"q\": \"x\"}}";
        let extracted = extract(text).expect("frame recognized");

        assert_eq!(extracted.calls[0].name, "search");
        assert_eq!(extracted.calls[0].input, json!({"q": "x"}));
    }

    #[test]
    fn no_recognized_frame_returns_none() {
        assert!(extract("just plain text, nothing special").is_none());
    }

    #[test]
    fn minted_ids_are_unique_per_call() {
        let first = extract(r#"<tool_call>{"name": "a", "arguments": {}}</tool_call>"#).unwrap();
        let second = extract(r#"<tool_call>{"name": "a", "arguments": {}}</tool_call>"#).unwrap();
        assert_ne!(first.calls[0].id, second.calls[0].id);
    }
}
