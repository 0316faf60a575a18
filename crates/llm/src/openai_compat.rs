//! OpenAI-compatible adapter.
//!
//! Works with OpenAI, vLLM, LM Studio, OpenRouter, and any other endpoint
//! that follows the OpenAI chat completions contract.

use serde_json::Value;

use async_trait::async_trait;

use kg_domain::config::LlmBackendConfig;
use kg_domain::{Error, Result};

use crate::backend::{from_reqwest, LlmBackend};
use crate::sse::sse_text_stream;
use crate::types::{BoxStream, ChatRequest, ChatResponse, ImageInput, ToolCall, Usage};

pub struct OpenAiCompatBackend {
    base_url: String,
    api_key: Option<String>,
    model: String,
    default_temperature: Option<f32>,
    default_max_tokens: Option<u32>,
    client: reqwest::Client,
}

impl OpenAiCompatBackend {
    pub fn from_config(config: &LlmBackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            base_url: config.effective_base_url(),
            api_key: config.resolve_api_key(),
            model: config.model.clone(),
            default_temperature: config.temperature,
            default_max_tokens: config.max_tokens,
            client,
        })
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }
        builder
    }

    fn build_body(&self, req: &ChatRequest, stream: bool) -> Value {
        let mut messages: Vec<Value> = Vec::new();
        if let Some(system) = &req.system_message {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(user_message(req));

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
        });

        if let Some(temp) = req.temperature.or(self.default_temperature) {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = req.max_tokens.or(self.default_max_tokens) {
            body["max_tokens"] = serde_json::json!(max);
        }
        if req.json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        if !req.tools.is_empty() {
            let tools: Vec<Value> = req
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }
        body
    }
}

/// The user message, either plain text or text + image parts.
fn user_message(req: &ChatRequest) -> Value {
    if req.images.is_empty() {
        return serde_json::json!({"role": "user", "content": req.prompt});
    }

    let mut parts = vec![serde_json::json!({"type": "text", "text": req.prompt})];
    for image in &req.images {
        let url = match image {
            ImageInput::Url(url) => url.clone(),
            ImageInput::Base64 { media_type, data } => {
                format!("data:{media_type};base64,{data}")
            }
        };
        parts.push(serde_json::json!({
            "type": "image_url",
            "image_url": {"url": url},
        }));
    }
    serde_json::json!({"role": "user", "content": parts})
}

fn parse_chat_response(body: &Value) -> Result<ChatResponse> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::Http("no choices in response".into()))?;

    let message = choice
        .get("message")
        .ok_or_else(|| Error::Http("no message in choice".into()))?;

    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let tool_calls = message
        .get("tool_calls")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|tc| {
                    let call_id = tc.get("id")?.as_str()?.to_string();
                    let func = tc.get("function")?;
                    let tool_name = func.get("name")?.as_str()?.to_string();
                    let args_str = func.get("arguments")?.as_str().unwrap_or("{}");
                    let arguments: Value =
                        serde_json::from_str(args_str).unwrap_or(Value::Object(Default::default()));
                    Some(ToolCall {
                        call_id,
                        tool_name,
                        arguments,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(ChatResponse {
        content,
        tool_calls,
        usage: body.get("usage").and_then(parse_usage),
        model: body
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string(),
        finish_reason: choice
            .get("finish_reason")
            .and_then(|v| v.as_str())
            .map(String::from),
    })
}

fn parse_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: v.get("total_tokens")?.as_u64()? as u32,
    })
}

/// Text delta from one streaming chunk, if it carries any.
fn parse_stream_data(data: &str) -> Option<String> {
    let v: Value = serde_json::from_str(data).ok()?;
    let delta = v.get("choices")?.as_array()?.first()?.get("delta")?;
    let text = delta.get("content")?.as_str()?;
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

#[async_trait]
impl LlmBackend for OpenAiCompatBackend {
    fn kind(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(req, false);

        tracing::debug!(model = %self.model, url = %url, "openai chat request");

        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let resp_text = resp.text().await.map_err(from_reqwest)?;

        if !status.is_success() {
            return Err(Error::Http(format!(
                "status {}: {resp_text}",
                status.as_u16()
            )));
        }

        let resp_json: Value = serde_json::from_str(&resp_text)?;
        parse_chat_response(&resp_json)
    }

    async fn chat_stream(&self, req: &ChatRequest) -> Result<BoxStream<'static, Result<String>>> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(req, true);

        tracing::debug!(model = %self.model, url = %url, "openai stream request");

        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let err_text = resp.text().await.map_err(from_reqwest)?;
            return Err(Error::Http(format!(
                "status {}: {err_text}",
                status.as_u16()
            )));
        }

        Ok(sse_text_stream(resp, parse_stream_data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolDefinition;

    fn backend() -> OpenAiCompatBackend {
        OpenAiCompatBackend {
            base_url: "https://example.test/v1".into(),
            api_key: Some("sk-test".into()),
            model: "gpt-4o-mini".into(),
            default_temperature: Some(0.7),
            default_max_tokens: None,
            client: reqwest::Client::new(),
        }
    }

    #[test]
    fn body_includes_system_and_defaults() {
        let req = ChatRequest {
            prompt: "hi".into(),
            system_message: Some("be brief".into()),
            ..Default::default()
        };
        let body = backend().build_body(&req, false);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["temperature"], 0.7);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn json_mode_sets_response_format() {
        let req = ChatRequest {
            prompt: "hi".into(),
            json_mode: true,
            ..Default::default()
        };
        let body = backend().build_body(&req, false);
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn tools_are_wrapped_as_functions() {
        let req = ChatRequest {
            prompt: "hi".into(),
            tools: vec![ToolDefinition {
                name: "lookup".into(),
                description: "find things".into(),
                parameters: serde_json::json!({"type": "object"}),
            }],
            ..Default::default()
        };
        let body = backend().build_body(&req, false);
        assert_eq!(body["tools"][0]["function"]["name"], "lookup");
    }

    #[test]
    fn images_become_content_parts() {
        let req = ChatRequest {
            prompt: "what is this".into(),
            images: vec![ImageInput::Url("https://example.test/cat.png".into())],
            ..Default::default()
        };
        let body = backend().build_body(&req, false);
        let parts = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
    }

    #[test]
    fn response_parses_content_and_usage() {
        let body = serde_json::json!({
            "model": "gpt-4o-mini",
            "choices": [{
                "message": {"content": "hello"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12}
        });
        let resp = parse_chat_response(&body).unwrap();
        assert_eq!(resp.content, "hello");
        assert_eq!(resp.usage.unwrap().total_tokens, 12);
        assert_eq!(resp.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn response_parses_tool_calls() {
        let body = serde_json::json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "function": {"name": "lookup", "arguments": "{\"q\":\"cats\"}"}
                    }]
                }
            }]
        });
        let resp = parse_chat_response(&body).unwrap();
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].tool_name, "lookup");
        assert_eq!(resp.tool_calls[0].arguments["q"], "cats");
    }

    #[test]
    fn missing_choices_is_an_error() {
        assert!(parse_chat_response(&serde_json::json!({})).is_err());
    }

    #[test]
    fn stream_delta_extraction() {
        let data = r#"{"choices":[{"delta":{"content":"hel"}}]}"#;
        assert_eq!(parse_stream_data(data).as_deref(), Some("hel"));
        let role_only = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_stream_data(role_only), None);
    }
}
