//! Backend-neutral LLM access.
//!
//! The decision intent parser, the local-LLM decision provider, and any
//! provider that wants a model all go through [`LlmService`]: named
//! backends (`llm`, `llm_fast`, `vlm`) resolved from config, each mapped
//! to a concrete adapter (OpenAI-compatible HTTP or native Ollama), with
//! retry, cooperative stream cancellation, and token accounting on top.

mod backend;
mod ollama;
mod openai_compat;
mod retry;
mod service;
mod sse;
mod types;
mod usage;

pub use backend::LlmBackend;
pub use ollama::OllamaBackend;
pub use openai_compat::OpenAiCompatBackend;
pub use retry::RetryPolicy;
pub use service::{BackendInfo, ChatOptions, LlmService};
pub use types::{
    BoxStream, ChatRequest, ChatResponse, ImageInput, LlmResponse, ToolCall, ToolDefinition,
    Usage,
};
pub use usage::UsageTotals;
