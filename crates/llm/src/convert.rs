//! Direct converters between the Anthropic-shaped ingress types and the
//! OpenAI chat-completion egress types (C2, C3).
//!
//! A true N-protocol gateway needs a pivot type shared by every ingress and
//! egress pair; this gateway has exactly one pair, so the pivot collapses to
//! two plain functions instead.

mod from_openai;
mod to_openai;

pub use from_openai::from_openai;
pub(crate) use from_openai::{apply_subagent_interception, map_stop_reason, stream_usage};
pub use to_openai::{ConvertOptions, to_openai};
