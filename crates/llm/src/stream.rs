//! Pure, chunk-agnostic combinators driven by the Provider Adapter's pump:
//! the think-tag parser (C5), the heuristic tool-call recovery parser (C6),
//! and the Anthropic SSE event builder (C4). None of these own an I/O loop.

pub mod heuristic_tool;
pub mod sse;
pub mod think;

pub use heuristic_tool::{Extracted, ToolUseCall, extract as extract_heuristic_tool_call};
pub use sse::{AnthropicSseBuilder, render as render_sse_event};
pub use think::{Chunk, ChunkKind, ThinkTagParser};
