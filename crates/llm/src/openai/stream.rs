use serde::Deserialize;

use super::response::{ReasoningDetail, Usage};

/// One `data: {...}` SSE chunk from a streaming `/chat/completions` call.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub id: Option<String>,
    pub choices: Vec<ChoiceDelta>,

    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceDelta {
    #[serde(default)]
    pub delta: Delta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,

    #[serde(default)]
    pub reasoning_content: Option<String>,

    #[serde(default)]
    pub reasoning_details: Option<Vec<ReasoningDetail>>,

    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

impl Delta {
    pub fn reasoning_text(&self) -> Option<String> {
        if let Some(text) = &self.reasoning_content {
            return Some(text.clone());
        }

        let details = self.reasoning_details.as_ref()?;
        let joined = details.iter().filter_map(|d| d.text.as_deref()).collect::<Vec<_>>().join("");

        (!joined.is_empty()).then_some(joined)
    }
}

/// A partial tool call, accumulated across chunks by `index` (§4.6 step 2).
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallDelta {
    pub index: u32,

    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub function: Option<FunctionCallDelta>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FunctionCallDelta {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub arguments: Option<String>,
}
