use serde::{Deserialize, Serialize};

use crate::protocol::unknown_fields::UnknownFields;

use super::{ResponseContent, Role};

/// A complete (non-streamed) response from the Anthropic Messages API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Unique identifier for the generated message.
    pub id: String,

    /// Role of the generated message, always `assistant`.
    pub role: Role,

    /// Content blocks composing the assistant's reply.
    pub content: Vec<ResponseContent>,

    /// Model that produced the response.
    pub model: String,

    /// Reason generation stopped, if the model finished.
    #[serde(default)]
    pub stop_reason: Option<StopReason>,

    /// Custom stop sequence that ended generation, when applicable.
    #[serde(default)]
    pub stop_sequence: Option<String>,

    /// Token accounting for the request and response.
    pub usage: Usage,

    /// Additional undocumented fields preserved for forward compatibility.
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// Reason the model stopped generating tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
    #[serde(untagged)]
    Unknown(String),
}

/// Service tier reflected back in token usage accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageServiceTier {
    Standard,
    Priority,
    Batch,
    #[serde(untagged)]
    Unknown(String),
}

/// Usage counters for Anthropic-managed server tools.
///
/// This gateway has no server tools behind it (see
/// [`super::ResponseContent`]'s module documentation), so these counters are
/// always absent in practice; the type is retained to keep `usage` payloads
/// forward-compatible with whatever an upstream mistakenly echoes back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerToolUsage {
    #[serde(default)]
    pub web_search_requests: Option<u32>,

    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// Breakdown of prompt-cache token creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheCreation {
    #[serde(default)]
    pub ephemeral_5m_input_tokens: Option<u32>,

    #[serde(default)]
    pub ephemeral_1h_input_tokens: Option<u32>,

    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// Token accounting attached to a complete response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,

    #[serde(default)]
    pub cache_creation: Option<CacheCreation>,

    #[serde(default)]
    pub cache_creation_input_tokens: Option<u32>,

    #[serde(default)]
    pub cache_read_input_tokens: Option<u32>,

    #[serde(default)]
    pub server_tool_use: Option<ServerToolUsage>,

    #[serde(default)]
    pub service_tier: Option<UsageServiceTier>,

    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}
