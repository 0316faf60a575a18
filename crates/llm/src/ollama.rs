//! Native Ollama adapter (`/api/chat`).
//!
//! Ollama streams newline-delimited JSON rather than SSE, and reports
//! token counts as `prompt_eval_count` / `eval_count`.

use serde_json::Value;

use async_trait::async_trait;

use kg_domain::config::LlmBackendConfig;
use kg_domain::{Error, Result};

use crate::backend::{from_reqwest, LlmBackend};
use crate::types::{BoxStream, ChatRequest, ChatResponse, ImageInput, Usage};

pub struct OllamaBackend {
    base_url: String,
    model: String,
    default_temperature: Option<f32>,
    default_max_tokens: Option<u32>,
    client: reqwest::Client,
}

impl OllamaBackend {
    pub fn from_config(config: &LlmBackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            base_url: config.effective_base_url(),
            model: config.model.clone(),
            default_temperature: config.temperature,
            default_max_tokens: config.max_tokens,
            client,
        })
    }

    fn build_body(&self, req: &ChatRequest, stream: bool) -> Value {
        let mut messages: Vec<Value> = Vec::new();
        if let Some(system) = &req.system_message {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }

        let mut user = serde_json::json!({"role": "user", "content": req.prompt});
        let images: Vec<&str> = req
            .images
            .iter()
            .filter_map(|img| match img {
                ImageInput::Base64 { data, .. } => Some(data.as_str()),
                // Ollama only accepts inline base64.
                ImageInput::Url(_) => None,
            })
            .collect();
        if !images.is_empty() {
            user["images"] = serde_json::json!(images);
        }
        messages.push(user);

        let mut options = serde_json::Map::new();
        if let Some(temp) = req.temperature.or(self.default_temperature) {
            options.insert("temperature".into(), serde_json::json!(temp));
        }
        if let Some(max) = req.max_tokens.or(self.default_max_tokens) {
            options.insert("num_predict".into(), serde_json::json!(max));
        }

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
        });
        if !options.is_empty() {
            body["options"] = Value::Object(options);
        }
        if req.json_mode {
            body["format"] = serde_json::json!("json");
        }
        body
    }
}

fn parse_chat_response(body: &Value) -> Result<ChatResponse> {
    let content = body
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Http("no message content in ollama response".into()))?
        .to_string();

    let usage = match (
        body.get("prompt_eval_count").and_then(|v| v.as_u64()),
        body.get("eval_count").and_then(|v| v.as_u64()),
    ) {
        (Some(prompt), Some(completion)) => Some(Usage {
            prompt_tokens: prompt as u32,
            completion_tokens: completion as u32,
            total_tokens: (prompt + completion) as u32,
        }),
        _ => None,
    };

    Ok(ChatResponse {
        content,
        tool_calls: Vec::new(),
        usage,
        model: body
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string(),
        finish_reason: body
            .get("done_reason")
            .and_then(|v| v.as_str())
            .map(String::from),
    })
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    fn kind(&self) -> &'static str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/api/chat", self.base_url);
        let body = self.build_body(req, false);

        tracing::debug!(model = %self.model, url = %url, "ollama chat request");

        let resp = self
            .client
            .post(&url)
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
        let url = format!("{}/api/chat", self.base_url);
        let body = self.build_body(req, true);

        let resp = self
            .client
            .post(&url)
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

        // NDJSON: one JSON object per line, `done: true` on the last.
        let stream = async_stream::stream! {
            let mut response = resp;
            let mut buffer = String::new();

            loop {
                match response.chunk().await {
                    Ok(Some(bytes)) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        while let Some(pos) = buffer.find('\n') {
                            let line: String = buffer.drain(..=pos).collect();
                            let line = line.trim();
                            if line.is_empty() {
                                continue;
                            }
                            match serde_json::from_str::<Value>(line) {
                                Ok(v) => {
                                    if let Some(text) = v
                                        .get("message")
                                        .and_then(|m| m.get("content"))
                                        .and_then(|c| c.as_str())
                                    {
                                        if !text.is_empty() {
                                            yield Ok(text.to_string());
                                        }
                                    }
                                    if v.get("done").and_then(|d| d.as_bool()) == Some(true) {
                                        return;
                                    }
                                }
                                Err(e) => yield Err(Error::Json(e)),
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(from_reqwest(e));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> OllamaBackend {
        OllamaBackend {
            base_url: "http://localhost:11434".into(),
            model: "llama3".into(),
            default_temperature: None,
            default_max_tokens: Some(256),
            client: reqwest::Client::new(),
        }
    }

    #[test]
    fn body_maps_max_tokens_to_num_predict() {
        let req = ChatRequest {
            prompt: "hi".into(),
            ..Default::default()
        };
        let body = backend().build_body(&req, false);
        assert_eq!(body["options"]["num_predict"], 256);
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn json_mode_sets_format() {
        let req = ChatRequest {
            prompt: "hi".into(),
            json_mode: true,
            ..Default::default()
        };
        let body = backend().build_body(&req, false);
        assert_eq!(body["format"], "json");
    }

    #[test]
    fn base64_images_are_inlined() {
        let req = ChatRequest {
            prompt: "describe".into(),
            images: vec![ImageInput::Base64 {
                media_type: "image/png".into(),
                data: "aGVsbG8=".into(),
            }],
            ..Default::default()
        };
        let body = backend().build_body(&req, false);
        assert_eq!(body["messages"][0]["images"][0], "aGVsbG8=");
    }

    #[test]
    fn response_parses_usage_counts() {
        let body = serde_json::json!({
            "model": "llama3",
            "message": {"role": "assistant", "content": "hey"},
            "prompt_eval_count": 12,
            "eval_count": 3,
            "done_reason": "stop"
        });
        let resp = parse_chat_response(&body).unwrap();
        assert_eq!(resp.content, "hey");
        let usage = resp.usage.unwrap();
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn missing_message_is_an_error() {
        assert!(parse_chat_response(&serde_json::json!({"done": true})).is_err());
    }
}
