//! Egress wire types: the OpenAI chat-completion shape spoken by every
//! upstream provider this gateway forwards to (§3 "OpenAI request body",
//! GLOSSARY "OpenAI chat-completion").

pub mod request;
pub mod response;
pub mod stream;

pub use request::{ChatRequest, FunctionDef, Message, MessageContent, MessageContentPart, Tool, ToolCall};
pub use response::{ChatResponse, Choice, ReasoningDetail, ResponseMessage, Usage};
pub use stream::{ChoiceDelta, Delta, FunctionCallDelta, StreamChunk, ToolCallDelta};

/// A JSON-schema mapping, carried through untouched between Anthropic tool
/// definitions and OpenAI function definitions (§3 "Tool").
pub type JsonSchema = serde_json::Value;
