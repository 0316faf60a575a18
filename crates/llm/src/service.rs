//! The backend-neutral service facade.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use kg_domain::config::{BackendKind, LlmBackendConfig};
use kg_domain::{Error, Result};

use crate::backend::LlmBackend;
use crate::ollama::OllamaBackend;
use crate::openai_compat::OpenAiCompatBackend;
use crate::retry::{with_retry, RetryPolicy};
use crate::types::{
    BoxStream, ChatRequest, ImageInput, LlmResponse, ToolDefinition,
};
use crate::usage::{UsageTracker, UsageTotals};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct BackendEntry {
    adapter: Arc<dyn LlmBackend>,
    retry: RetryPolicy,
}

/// Named-backend LLM facade.
///
/// Failures surface as `LlmResponse { success: false, error }` rather than
/// `Err`: callers at domain boundaries recover with fallback values and
/// must never unwind across the bus.
pub struct LlmService {
    backends: HashMap<String, BackendEntry>,
    usage: UsageTracker,
}

/// Per-call options for [`LlmService::chat`].
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub system_message: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub json_mode: bool,
}

/// Static description of one configured backend, for observability.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BackendInfo {
    pub name: String,
    pub kind: String,
    pub model: String,
}

impl LlmService {
    pub fn empty() -> Self {
        Self {
            backends: HashMap::new(),
            usage: UsageTracker::new(),
        }
    }

    /// Build every configured backend block. A backend that fails to
    /// construct is a configuration error and aborts startup.
    pub fn from_config(configs: &HashMap<&'static str, &LlmBackendConfig>) -> Result<Self> {
        let mut service = Self::empty();
        for (name, config) in configs.iter() {
            let name = *name;
            let config: &LlmBackendConfig = config;
            let adapter: Arc<dyn LlmBackend> = match config.backend {
                BackendKind::Openai => Arc::new(OpenAiCompatBackend::from_config(config)?),
                BackendKind::Ollama => Arc::new(OllamaBackend::from_config(config)?),
            };
            let retry = RetryPolicy {
                max_retries: config.max_retries,
                base_delay: Duration::from_millis(config.retry_delay_ms),
                ..RetryPolicy::default()
            };
            tracing::info!(
                backend = %name,
                kind = %adapter.kind(),
                model = %config.model,
                "registered LLM backend"
            );
            service.add_backend(name, adapter, retry);
        }
        Ok(service)
    }

    /// Register a backend under a name. Mostly used by `from_config`;
    /// exposed so embedders and tests can install their own adapters.
    pub fn add_backend(
        &mut self,
        name: impl Into<String>,
        adapter: Arc<dyn LlmBackend>,
        retry: RetryPolicy,
    ) {
        self.backends
            .insert(name.into(), BackendEntry { adapter, retry });
    }

    pub fn has_backend(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    // ── Operations ─────────────────────────────────────────────────

    /// Plain chat against a named backend (conventionally `"llm"`).
    pub async fn chat(&self, prompt: &str, backend: &str, options: ChatOptions) -> LlmResponse {
        let request = ChatRequest {
            prompt: prompt.to_string(),
            system_message: options.system_message,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            json_mode: options.json_mode,
            ..Default::default()
        };
        self.run(backend, request).await
    }

    /// Chat with tool definitions; `tool_calls` is populated when the
    /// backend emits them.
    pub async fn call_tools(
        &self,
        prompt: &str,
        tools: Vec<ToolDefinition>,
        backend: &str,
        system_message: Option<String>,
    ) -> LlmResponse {
        let request = ChatRequest {
            prompt: prompt.to_string(),
            system_message,
            tools,
            ..Default::default()
        };
        self.run(backend, request).await
    }

    /// Vision chat against a named backend (conventionally `"vlm"`).
    pub async fn vision(
        &self,
        prompt: &str,
        images: Vec<ImageInput>,
        backend: &str,
        options: ChatOptions,
    ) -> LlmResponse {
        let request = ChatRequest {
            prompt: prompt.to_string(),
            system_message: options.system_message,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            json_mode: options.json_mode,
            images,
            ..Default::default()
        };
        self.run(backend, request).await
    }

    /// Streaming chat. The returned stream ends early (without error) when
    /// `stop` is cancelled; no retry applies once streaming has begun.
    pub async fn stream_chat(
        &self,
        prompt: &str,
        backend: &str,
        system_message: Option<String>,
        stop: CancellationToken,
    ) -> Result<BoxStream<'static, Result<String>>> {
        let entry = self
            .backends
            .get(backend)
            .ok_or_else(|| Error::Config(format!("unknown LLM backend \"{backend}\"")))?;

        let request = ChatRequest {
            prompt: prompt.to_string(),
            system_message,
            ..Default::default()
        };
        let mut inner = entry.adapter.chat_stream(&request).await?;
        self.usage.record(backend, None);

        let stream = async_stream::stream! {
            use futures_util::StreamExt;
            loop {
                tokio::select! {
                    () = stop.cancelled() => {
                        tracing::debug!("stream_chat cancelled by stop token");
                        return;
                    }
                    chunk = inner.next() => match chunk {
                        Some(item) => yield item,
                        None => return,
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }

    async fn run(&self, backend: &str, request: ChatRequest) -> LlmResponse {
        let entry = match self.backends.get(backend) {
            Some(entry) => entry,
            None => {
                return LlmResponse::failure(
                    "unknown",
                    format!("unknown LLM backend \"{backend}\""),
                );
            }
        };

        let adapter = entry.adapter.clone();
        let result = with_retry(&entry.retry, backend, || {
            let adapter = adapter.clone();
            let request = request.clone();
            async move { adapter.chat(&request).await }
        })
        .await;

        match result {
            Ok(response) => {
                self.usage.record(backend, response.usage);
                LlmResponse::from_chat(response)
            }
            Err(e) => {
                let safe = mask_secrets(&e.to_string());
                tracing::warn!(backend = %backend, error = %safe, "LLM call failed");
                self.usage.record(backend, None);
                LlmResponse::failure(entry.adapter.model(), safe)
            }
        }
    }

    // ── Observability ──────────────────────────────────────────────

    pub fn usage_summary(&self) -> HashMap<String, UsageTotals> {
        self.usage.snapshot()
    }

    pub fn backend_info(&self) -> Vec<BackendInfo> {
        let mut info: Vec<BackendInfo> = self
            .backends
            .iter()
            .map(|(name, entry)| BackendInfo {
                name: name.clone(),
                kind: entry.adapter.kind().to_string(),
                model: entry.adapter.model().to_string(),
            })
            .collect();
        info.sort_by(|a, b| a.name.cmp(&b.name));
        info
    }
}

/// Mask substrings that look like API keys or bearer tokens so secrets
/// never reach logs or fallback intents.
fn mask_secrets(msg: &str) -> String {
    let mut result = msg.to_string();
    for word in msg.split(|c: char| c.is_whitespace() || c == '\'' || c == '"' || c == ',') {
        let trimmed = word.trim();
        if trimmed.len() >= 20
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            let masked = format!("{}...{}", &trimmed[..4], &trimmed[trimmed.len() - 4..]);
            result = result.replace(trimmed, &masked);
        }
    }
    result
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct StubBackend {
        calls: AtomicU32,
        fail_first: u32,
        error: fn() -> Error,
    }

    impl StubBackend {
        fn ok() -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_first: 0,
                error: || Error::Other("unused".into()),
            }
        }

        fn failing(fail_first: u32, error: fn() -> Error) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_first,
                error,
            }
        }
    }

    #[async_trait]
    impl LlmBackend for StubBackend {
        fn kind(&self) -> &'static str {
            "stub"
        }
        fn model(&self) -> &str {
            "stub-model"
        }
        async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err((self.error)());
            }
            Ok(ChatResponse {
                content: format!("echo: {}", req.prompt),
                tool_calls: Vec::new(),
                usage: Some(crate::types::Usage {
                    prompt_tokens: 3,
                    completion_tokens: 2,
                    total_tokens: 5,
                }),
                model: "stub-model".into(),
                finish_reason: Some("stop".into()),
            })
        }
        async fn chat_stream(
            &self,
            _req: &ChatRequest,
        ) -> Result<BoxStream<'static, Result<String>>> {
            let stream = async_stream::stream! {
                for chunk in ["a", "b", "c"] {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    yield Ok(chunk.to_string());
                }
            };
            Ok(Box::pin(stream))
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn chat_success_records_usage() {
        let mut service = LlmService::empty();
        service.add_backend("llm", Arc::new(StubBackend::ok()), fast_retry());

        let response = service.chat("hi", "llm", ChatOptions::default()).await;
        assert!(response.success);
        assert_eq!(response.content, "echo: hi");

        let usage = service.usage_summary();
        assert_eq!(usage["llm"].requests, 1);
        assert_eq!(usage["llm"].total_tokens, 5);
    }

    #[tokio::test]
    async fn unknown_backend_fails_without_panic() {
        let service = LlmService::empty();
        let response = service.chat("hi", "nope", ChatOptions::default()).await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("unknown LLM backend"));
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let mut service = LlmService::empty();
        service.add_backend(
            "llm",
            Arc::new(StubBackend::failing(2, || {
                Error::Http("status 503: unavailable".into())
            })),
            fast_retry(),
        );
        let response = service.chat("hi", "llm", ChatOptions::default()).await;
        assert!(response.success);
    }

    #[tokio::test]
    async fn auth_errors_fail_fast_as_data() {
        let mut service = LlmService::empty();
        service.add_backend(
            "llm",
            Arc::new(StubBackend::failing(10, || {
                Error::Http("status 401: bad key".into())
            })),
            fast_retry(),
        );
        let response = service.chat("hi", "llm", ChatOptions::default()).await;
        assert!(!response.success);
        assert_eq!(response.model, "stub-model");
    }

    #[tokio::test]
    async fn stream_chat_honors_stop_token() {
        use futures_util::StreamExt;

        let mut service = LlmService::empty();
        service.add_backend("llm", Arc::new(StubBackend::ok()), fast_retry());

        let stop = CancellationToken::new();
        let mut stream = service
            .stream_chat("hi", "llm", None, stop.clone())
            .await
            .unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, "a");
        stop.cancel();
        // After cancellation the stream terminates (possibly after at most
        // the chunk already in flight).
        let mut remaining = 0;
        while stream.next().await.is_some() {
            remaining += 1;
        }
        assert!(remaining <= 1, "stream kept running after cancel");
    }

    #[test]
    fn secrets_are_masked() {
        let message = "status 401: invalid key sk-abcdefghijklmnopqrstuvwxyz provided";
        let masked = mask_secrets(message);
        assert!(!masked.contains("sk-abcdefghijklmnopqrstuvwxyz"));
        assert!(masked.contains("..."));
    }
}
