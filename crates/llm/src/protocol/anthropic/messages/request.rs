use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::unknown_fields::UnknownFields;

use super::*;

/// Request body for the Anthropic Messages API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Request {
    /// The model that will complete the prompt.
    pub model: String,
    /// Conversation turns supplied to the Messages API.
    pub messages: Vec<InputMessage>,
    /// Maximum output tokens the upstream model may generate.
    pub max_tokens: u32,

    /// System prompt providing global instructions for the assistant.
    #[serde(default)]
    pub system: Option<SystemPrompt>,

    /// Sampling temperature controlling randomness (0.0-1.0).
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Probability mass cutoff used for nucleus sampling.
    #[serde(default)]
    pub top_p: Option<f32>,

    /// Top-K sampling limit that constrains candidate tokens.
    #[serde(default)]
    pub top_k: Option<u32>,

    /// Custom strings that cause generation to stop when produced.
    #[serde(default)]
    pub stop_sequences: Option<Vec<String>>,

    /// When true, deliver a Server-Sent Events stream instead of a single body.
    #[serde(default)]
    pub stream: Option<bool>,

    /// Optional metadata describing the end user for abuse detection.
    #[serde(default)]
    pub metadata: Option<Metadata>,

    /// Tool specifications the model may call during this request.
    #[serde(default)]
    pub tools: Option<Vec<Tool>>,

    /// Directive controlling if and how the model must use tools.
    #[serde(default)]
    pub tool_choice: Option<ToolChoice>,

    /// Configuration enabling the model's extended thinking mode.
    #[serde(default)]
    pub thinking: Option<ThinkingConfig>,

    /// Provider-specific parameters passed straight through to the
    /// upstream chat-completion body, merged under provider defaults
    /// (§4.1 "Extra body").
    #[serde(default)]
    pub extra_body: Option<serde_json::Map<String, Value>>,

    /// Additional undocumented fields preserved for forward compatibility.
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// System prompt payload accepted by the Anthropic Messages API.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    /// Plain-text system prompt.
    Text(String),
    /// Structured system prompt comprised of content blocks.
    Blocks(Vec<SystemInputMessage>),
}

impl SystemPrompt {
    /// Flatten a system prompt into a single plain-text string.
    ///
    /// OpenAI-chat-completion-shaped providers only accept a system message
    /// as plain text, so structured system blocks are joined with newlines.
    pub fn into_text(self) -> String {
        match self {
            SystemPrompt::Text(text) => text,
            SystemPrompt::Blocks(blocks) => blocks
                .into_iter()
                .filter_map(|block| match block {
                    SystemInputMessage::Text(text_block) => Some(text_block.text),
                    SystemInputMessage::Unknown(_) => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SystemInputMessage {
    Text(RequestTextBlock),
    #[serde(untagged)]
    Unknown(Value),
}

impl ThinkingConfig {
    /// Whether extended thinking is requested.
    ///
    /// Clients send either the documented `{type: "enabled"|"disabled"}`
    /// shape or the older `{enabled: bool}` shape; the latter never carries a
    /// `type` tag so it lands in [`ThinkingConfig::Unknown`].
    pub fn is_enabled(&self) -> bool {
        match self {
            ThinkingConfig::Enabled { .. } => true,
            ThinkingConfig::Disabled { .. } => false,
            ThinkingConfig::Unknown(value) => {
                value.get("enabled").and_then(Value::as_bool).unwrap_or(false)
            }
        }
    }
}

/// Optional metadata forwarded to Anthropic.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Metadata {
    /// External identifier for the end user associated with this request.
    #[serde(default)]
    pub user_id: Option<String>,

    /// Additional metadata keys retained for compatibility.
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// Configuration for extended thinking mode.
///
/// Translated into the provider-specific `extra_body` fields some
/// OpenAI-compatible endpoints (notably NVIDIA NIM reasoning models) use to
/// toggle chain-of-thought generation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThinkingConfig {
    Enabled {
        budget_tokens: u32,
        #[serde(flatten)]
        unknown_fields: UnknownFields,
    },
    Disabled {
        #[serde(flatten)]
        unknown_fields: UnknownFields,
    },
    #[serde(untagged)]
    Unknown(Value),
}
