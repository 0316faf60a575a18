//! Intent parsing against a stubbed LLM backend: the freeform platform
//! reply either becomes a structured intent or degrades to raw text.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use kg_domain::intent::Emotion;
use kg_domain::Result;
use kg_llm::{
    BoxStream, ChatRequest, ChatResponse, LlmBackend, LlmService, RetryPolicy,
};
use kg_runtime::decision::intent_parser::IntentParser;

/// A backend that always answers with a canned payload.
struct CannedBackend {
    content: &'static str,
}

#[async_trait]
impl LlmBackend for CannedBackend {
    fn kind(&self) -> &'static str {
        "stub"
    }
    fn model(&self) -> &str {
        "canned"
    }
    async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse> {
        Ok(ChatResponse {
            content: self.content.to_string(),
            tool_calls: Vec::new(),
            usage: None,
            model: "canned".into(),
            finish_reason: Some("stop".into()),
        })
    }
    async fn chat_stream(&self, _req: &ChatRequest) -> Result<BoxStream<'static, Result<String>>> {
        Ok(Box::pin(futures_util::stream::empty()))
    }
}

fn service_with(content: &'static str) -> Arc<LlmService> {
    let mut service = LlmService::empty();
    service.add_backend(
        "llm",
        Arc::new(CannedBackend { content }),
        RetryPolicy {
            max_retries: 0,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        },
    );
    Arc::new(service)
}

const PLATFORM_REPLY: &str = "hello [happy] [smile]";

#[tokio::test]
async fn well_formed_llm_output_becomes_a_structured_intent() {
    let parser = IntentParser::new(
        service_with(r#"{"response_text":"hello","emotion":"HAPPY","actions":["SMILE"]}"#),
        None,
    );
    let intent = parser.parse(PLATFORM_REPLY, PLATFORM_REPLY).await;

    assert_eq!(intent.response_text, "hello");
    assert_eq!(intent.emotion, Emotion::Happy);
    assert_eq!(intent.actions.len(), 1);
    assert_eq!(intent.actions[0].kind, "expression");
    assert_eq!(
        intent.actions[0]
            .params
            .get("expression")
            .and_then(|v| v.as_str()),
        Some("SMILE")
    );
}

#[tokio::test]
async fn malformed_llm_output_falls_back_to_raw_text() {
    let parser = IntentParser::new(service_with("{ this is not json"), None);
    let intent = parser.parse(PLATFORM_REPLY, PLATFORM_REPLY).await;

    assert_eq!(intent.response_text, PLATFORM_REPLY);
    assert_eq!(intent.emotion, Emotion::Neutral);
    assert!(intent.actions.is_empty());
}

#[tokio::test]
async fn llm_failure_falls_back_to_raw_text() {
    // No backends registered at all: the chat call fails as data.
    let parser = IntentParser::new(Arc::new(LlmService::empty()), None);
    let intent = parser.parse(PLATFORM_REPLY, PLATFORM_REPLY).await;

    assert_eq!(intent.response_text, PLATFORM_REPLY);
    assert_eq!(intent.emotion, Emotion::Neutral);
}
