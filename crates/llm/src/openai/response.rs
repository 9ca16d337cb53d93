use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::request::ToolCall;

/// Non-streaming response from `{base_url}/chat/completions`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub choices: Vec<Choice>,

    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,

    /// Structured reasoning/thinking content some upstreams surface directly
    /// instead of a `<think>` tag (§4.2 rule 1).
    #[serde(default)]
    pub reasoning_content: Option<String>,

    #[serde(default)]
    pub reasoning_details: Option<Vec<ReasoningDetail>>,

    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReasoningDetail {
    #[serde(default)]
    pub text: Option<String>,

    #[serde(flatten)]
    pub unknown_fields: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

impl ResponseMessage {
    /// Joins `reasoning_content` and any `reasoning_details[].text` into one
    /// string, or `None` if the upstream reported neither (§4.2 rule 1).
    pub fn reasoning_text(&self) -> Option<String> {
        if let Some(text) = &self.reasoning_content {
            return Some(text.clone());
        }

        let details = self.reasoning_details.as_ref()?;
        let joined = details.iter().filter_map(|d| d.text.as_deref()).collect::<Vec<_>>().join("");

        (!joined.is_empty()).then_some(joined)
    }
}
