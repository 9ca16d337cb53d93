use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::unknown_fields::UnknownFields;

use super::cache_control::CacheControl;

/// A single input message provided to the Anthropic API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputMessage {
    /// Originating role for the message turn.
    pub role: Role,
    /// Message body provided as text or structured blocks.
    pub content: InputMessageContent,

    /// Extra message fields passed through untouched.
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// Supported Anthropic message roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    #[serde(untagged)]
    Unknown(String),
}

/// Message content may be provided as a raw string or as structured content blocks.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum InputMessageContent {
    Text(String),
    Items(Vec<InputMessageStructuredContent>),
}

/// Structured content blocks accepted by the Anthropic Messages API.
///
/// Anthropic supports several additional block kinds (server tools, MCP,
/// container uploads). Those are out of scope for a gateway fronting
/// OpenAI-chat-completion-shaped providers, since there is no Anthropic-side
/// infrastructure behind this gateway to execute them; they fall through to
/// [`InputMessageStructuredContent::Unknown`] and are dropped during
/// conversion rather than rejected outright.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputMessageStructuredContent {
    Text(RequestTextBlock),
    Image(RequestImageBlock),
    Thinking(RequestThinkingBlock),
    RedactedThinking(RequestRedactedThinkingBlock),
    ToolUse(RequestToolUseBlock),
    ToolResult(RequestToolResultBlock),
    #[serde(untagged)]
    Unknown(Value),
}

/// Text content supplied to the Anthropic API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequestTextBlock {
    /// Raw text body for the content block.
    pub text: String,

    /// Optional cache-control hints attached to the block.
    #[serde(default)]
    pub cache_control: Option<CacheControl>,

    /// Additional fields retained for forward compatibility.
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// Image content block accepted by Anthropic.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequestImageBlock {
    /// Image source descriptor (base64, URL, or file reference).
    pub source: Value,

    /// Optional cache-control hints attached to the block.
    #[serde(default)]
    pub cache_control: Option<CacheControl>,

    /// Additional unknown properties carried through untouched.
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// Thinking block provided by the caller.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequestThinkingBlock {
    /// Signature reported alongside the thinking payload.
    pub signature: String,

    /// Raw thinking text supplied to the API.
    pub thinking: String,

    /// Unknown fields retained for future schema revisions.
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// Redacted thinking block.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequestRedactedThinkingBlock {
    /// Redacted content payload.
    pub data: String,

    /// Unknown properties carried forward untouched.
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// Tool use block emitted by a caller when forcing tool calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequestToolUseBlock {
    /// Unique identifier referencing the tool use.
    pub id: String,

    /// Tool input payload provided to Anthropic.
    pub input: Value,

    /// Name of the tool being invoked.
    pub name: String,

    /// Optional cache-control hints associated with the block.
    #[serde(default)]
    pub cache_control: Option<CacheControl>,

    /// Additional unknown fields preserved verbatim.
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// Tool result block describing the outcome of a tool invocation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequestToolResultBlock {
    /// Identifier of the tool use this result corresponds to.
    pub tool_use_id: String,

    /// Optional content returned by the tool (string or block array).
    #[serde(default)]
    pub content: Option<Value>,

    /// Indicates whether the tool invocation failed.
    #[serde(default)]
    pub is_error: Option<bool>,

    /// Optional cache-control configuration for the result.
    #[serde(default)]
    pub cache_control: Option<CacheControl>,

    /// Unknown fields retained for schema-forward compatibility.
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}
