//! Provider-agnostic request/response types.

use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for streaming chat chunks.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// A backend-agnostic chat request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub prompt: String,
    pub system_message: Option<String>,
    /// Sampling temperature. `None` lets the backend choose.
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Ask the model to emit valid JSON only.
    pub json_mode: bool,
    /// Tool definitions the model may invoke.
    pub tools: Vec<ToolDefinition>,
    /// Images for vision requests.
    pub images: Vec<ImageInput>,
}

/// A tool the model may call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments.
    pub parameters: serde_json::Value,
}

/// A tool call emitted by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

/// An image attached to a vision request.
#[derive(Debug, Clone)]
pub enum ImageInput {
    Url(String),
    Base64 { media_type: String, data: String },
}

/// Token usage for one completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// What a backend adapter returns on success.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    /// The model that actually produced the response.
    pub model: String,
    pub finish_reason: Option<String>,
}

/// What [`LlmService`](crate::LlmService) hands callers. Failures are data,
/// not errors: `success = false` with `error` set, so callers at domain
/// boundaries never have to unwind.
#[derive(Debug, Clone, Serialize)]
pub struct LlmResponse {
    pub success: bool,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LlmResponse {
    pub fn from_chat(response: ChatResponse) -> Self {
        Self {
            success: true,
            content: response.content,
            tool_calls: response.tool_calls,
            usage: response.usage,
            model: response.model,
            error: None,
        }
    }

    pub fn failure(model: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: String::new(),
            tool_calls: Vec::new(),
            usage: None,
            model: model.into(),
            error: Some(error.into()),
        }
    }
}
