use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM backend blocks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One named backend block (`[llm]`, `[llm_fast]`, `[vlm]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmBackendConfig {
    pub backend: BackendKind,
    pub model: String,
    /// Direct key. Prefer `api_key_env` so secrets stay out of the file.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Env var name resolved at startup.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "d_2")]
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries.
    #[serde(default = "d_500")]
    pub retry_delay_ms: u64,
    #[serde(default = "d_60")]
    pub timeout_secs: u64,
}

impl LlmBackendConfig {
    /// Effective base URL, falling back to the backend's conventional
    /// default endpoint.
    pub fn effective_base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => match self.backend {
                BackendKind::Openai => "https://api.openai.com/v1".into(),
                BackendKind::Ollama => "http://localhost:11434".into(),
            },
        }
    }

    /// Resolve the API key: direct value wins, then the env indirection.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = &self.api_key {
            return Some(key.clone());
        }
        self.api_key_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok())
    }

    /// A non-fatal configuration smell, if any.
    pub fn validate(&self) -> Option<String> {
        if self.model.is_empty() {
            return Some("model must not be empty".into());
        }
        if self.backend == BackendKind::Openai && self.resolve_api_key().is_none() {
            return Some(
                "no api_key or api_key_env configured; requests will be unauthenticated".into(),
            );
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Any endpoint following the OpenAI chat completions contract.
    Openai,
    /// Native Ollama `/api/chat`.
    Ollama,
}

fn d_2() -> u32 {
    2
}
fn d_500() -> u64 {
    500
}
fn d_60() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_defaults_per_backend() {
        let toml = r#"
            backend = "ollama"
            model = "llama3"
        "#;
        let config: LlmBackendConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.effective_base_url(), "http://localhost:11434");
    }

    #[test]
    fn base_url_trailing_slash_stripped() {
        let toml = r#"
            backend = "openai"
            model = "gpt-4o-mini"
            base_url = "https://example.test/v1/"
        "#;
        let config: LlmBackendConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.effective_base_url(), "https://example.test/v1");
    }

    #[test]
    fn direct_api_key_wins_over_env() {
        let toml = r#"
            backend = "openai"
            model = "gpt-4o-mini"
            api_key = "sk-direct"
            api_key_env = "KAGURA_TEST_UNSET_VAR"
        "#;
        let config: LlmBackendConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.resolve_api_key().as_deref(), Some("sk-direct"));
    }

    #[test]
    fn missing_key_is_flagged() {
        let toml = r#"
            backend = "openai"
            model = "gpt-4o-mini"
        "#;
        let config: LlmBackendConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_some());
    }
}
