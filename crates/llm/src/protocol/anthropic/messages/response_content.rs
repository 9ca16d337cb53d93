use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::unknown_fields::UnknownFields;

/// Content blocks returned by Anthropic message responses.
///
/// Server-managed tool blocks (web search, code execution, MCP, container
/// uploads) fall through to [`ResponseContent::Unknown`] for the same reason
/// request-side blocks do: this gateway has no Anthropic-side infrastructure
/// behind it to produce them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseContent {
    Text(ResponseTextBlock),
    Thinking(ResponseThinkingBlock),
    RedactedThinking(ResponseRedactedThinkingBlock),
    ToolUse(ResponseToolUseBlock),

    #[serde(untagged)]
    Unknown(Value),
}

/// Text returned by the model, optionally accompanied by citations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseTextBlock {
    /// Raw assistant text generated for this block.
    pub text: String,
    /// Citations supporting the text block, retained verbatim.
    #[serde(default)]
    pub citations: Option<Vec<Value>>,
    /// Forward-compatible storage for unsupported properties.
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// Model thinking content surfaced when the thinking capability is enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseThinkingBlock {
    /// Signature used by Anthropic to verify the thinking payload.
    pub signature: String,
    /// Raw thinking text emitted by the model.
    pub thinking: String,
    /// Forward-compatible storage for unsupported properties.
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// Redacted thinking output revealed when thinking content is withheld.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRedactedThinkingBlock {
    /// Opaque data blob describing the redacted thinking segment.
    pub data: String,
    /// Forward-compatible storage for unsupported properties.
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// Tool invocation requested by the model within the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseToolUseBlock {
    /// Unique identifier assigned to the tool call.
    pub id: String,
    /// Tool input payload provided by the model.
    pub input: Value,
    /// Name of the tool being invoked.
    pub name: String,
    /// Forward-compatible storage for unsupported properties.
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}
