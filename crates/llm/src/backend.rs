use async_trait::async_trait;

use kg_domain::Result;

use crate::types::{BoxStream, ChatRequest, ChatResponse};

/// Trait every backend adapter implements.
///
/// Adapters translate between our internal types and the wire format of
/// each vendor's HTTP API. They own request formatting, response parsing,
/// and streaming; retry lives a layer up in the service.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Wire-protocol tag, e.g. "openai" or "ollama".
    fn kind(&self) -> &'static str;

    /// The configured model identifier.
    fn model(&self) -> &str;

    /// Send a chat request and wait for the full response.
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse>;

    /// Send a chat request and return a stream of text chunks.
    async fn chat_stream(&self, req: &ChatRequest) -> Result<BoxStream<'static, Result<String>>>;
}

/// Map a reqwest error onto the shared error type. Timeouts keep their own
/// variant so the retry classifier can see them.
pub(crate) fn from_reqwest(e: reqwest::Error) -> kg_domain::Error {
    if e.is_timeout() {
        kg_domain::Error::Timeout(e.to_string())
    } else {
        kg_domain::Error::Http(e.to_string())
    }
}
