//! Local-LLM decision provider: one prompt-template render, one
//! structured-JSON chat call, same parse/fallback semantics as the
//! platform provider.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use kg_domain::intent::Intent;
use kg_domain::message::NormalizedMessage;
use kg_domain::{Error, Result};
use kg_llm::{ChatOptions, LlmService};
use kg_prompt::PromptManager;

use crate::context::ProviderContext;
use crate::decision::intent_parser::intent_from_json;
use crate::traits::DecisionProvider;

/// Prompt used when no `decision` template is on disk.
const DEFAULT_PROMPT: &str = "You are a cheerful AI VTuber. A viewer said: \"$message\" \
(importance $importance, via $source). Reply with a single JSON object: \
{\"response_text\": what you say, \"emotion\": one of \
[\"neutral\",\"happy\",\"sad\",\"angry\",\"surprised\",\"love\"], \
\"actions\": array of action name strings}.";

pub struct LocalLlmProvider {
    backend: String,
    temperature: Option<f32>,
    llm: Mutex<Option<Arc<LlmService>>>,
    prompts: Mutex<Option<Arc<PromptManager>>>,
}

impl LocalLlmProvider {
    pub fn from_config(config: &toml::Value) -> Result<Self> {
        let backend = config
            .get("backend")
            .and_then(|v| v.as_str())
            .unwrap_or("llm")
            .to_string();
        let temperature = config
            .get("temperature")
            .and_then(|v| v.as_float())
            .map(|t| t as f32);
        Ok(Self {
            backend,
            temperature,
            llm: Mutex::new(None),
            prompts: Mutex::new(None),
        })
    }

    fn prompt_for(&self, message: &NormalizedMessage) -> String {
        let vars: HashMap<String, String> = [
            ("message".to_string(), message.text.clone()),
            ("source".to_string(), message.source.clone()),
            (
                "importance".to_string(),
                format!("{:.2}", message.importance),
            ),
        ]
        .into();

        if let Some(prompts) = self.prompts.lock().clone() {
            if let Ok(rendered) = prompts.render("decision", &vars) {
                return rendered;
            }
        }
        kg_prompt::substitute(DEFAULT_PROMPT, &vars, kg_prompt::MissingVar::Preserve)
            .unwrap_or_else(|_| DEFAULT_PROMPT.to_string())
    }
}

#[async_trait]
impl DecisionProvider for LocalLlmProvider {
    fn name(&self) -> &str {
        "local_llm"
    }

    async fn setup(&self, ctx: &ProviderContext) -> Result<()> {
        let llm = ctx
            .llm
            .clone()
            .ok_or_else(|| Error::Config("local_llm requires an [llm] backend".into()))?;
        if !llm.has_backend(&self.backend) {
            return Err(Error::Config(format!(
                "local_llm backend \"{}\" is not configured",
                self.backend
            )));
        }
        *self.llm.lock() = Some(llm);
        *self.prompts.lock() = ctx.prompts.clone();
        Ok(())
    }

    async fn decide(&self, message: &NormalizedMessage) -> Result<Intent> {
        let llm = self
            .llm
            .lock()
            .clone()
            .ok_or_else(|| Error::Other("setup was not called".into()))?;

        let prompt = self.prompt_for(message);
        let response = llm
            .chat(
                &prompt,
                &self.backend,
                ChatOptions {
                    temperature: self.temperature,
                    json_mode: true,
                    ..ChatOptions::default()
                },
            )
            .await;

        if !response.success {
            return Err(Error::Provider {
                provider: "local_llm".into(),
                message: response.error.unwrap_or_else(|| "LLM call failed".into()),
            });
        }

        // Malformed model output degrades to a raw-text intent, never an
        // error.
        Ok(intent_from_json(&message.text, &response.content)
            .unwrap_or_else(|| Intent::new(&message.text, &response.content)))
    }

    async fn cleanup(&self) -> Result<()> {
        self.llm.lock().take();
        Ok(())
    }
}
