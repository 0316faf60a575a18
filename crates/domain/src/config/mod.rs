//! Configuration model for the whole runtime.
//!
//! Parsed from a single TOML file. Each concern gets its own submodule;
//! the root [`Config`] stitches them together and owns validation.
//! Validation never panics: it produces a list of [`ConfigIssue`]s and the
//! composition root decides whether any of them is fatal.

mod flow;
mod llm;
mod pipelines;
mod providers;

pub use flow::FlowConfig;
pub use llm::{BackendKind, LlmBackendConfig};
pub use pipelines::{PipelineConfig, PipelineErrorPolicy, PipelinesConfig};
pub use providers::{
    DecisionDomainConfig, InputDomainConfig, OutputDomainConfig, OutputErrorPolicy,
    ProvidersConfig,
};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Root config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub pipelines: PipelinesConfig,
    /// Primary chat backend.
    #[serde(default)]
    pub llm: Option<LlmBackendConfig>,
    /// Cheap/fast backend used by the intent parser.
    #[serde(default)]
    pub llm_fast: Option<LlmBackendConfig>,
    /// Vision backend.
    #[serde(default)]
    pub vlm: Option<LlmBackendConfig>,
    #[serde(default)]
    pub flow: FlowConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    /// HTTP callback server; absent = disabled.
    #[serde(default)]
    pub server: Option<ServerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsConfig {
    #[serde(default = "d_templates_dir")]
    pub templates_dir: PathBuf,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            templates_dir: d_templates_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for `POST /callbacks/{provider}`.
    #[serde(default = "d_bind")]
    pub bind: String,
}

fn d_templates_dir() -> PathBuf {
    PathBuf::from("prompts")
}
fn d_bind() -> String {
    "127.0.0.1:9900".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

fn warn(issues: &mut Vec<ConfigIssue>, message: impl Into<String>) {
    issues.push(ConfigIssue {
        severity: ConfigSeverity::Warning,
        message: message.into(),
    });
}

fn error(issues: &mut Vec<ConfigIssue>, message: impl Into<String>) {
    issues.push(ConfigIssue {
        severity: ConfigSeverity::Error,
        message: message.into(),
    });
}

impl Config {
    /// Check the configuration for problems. Errors are fatal at startup;
    /// warnings are logged and ignored.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        let decision = &self.providers.decision;
        if decision.active_provider.is_empty() {
            error(
                &mut issues,
                "[providers.decision] active_provider must not be empty",
            );
        } else if !decision.available_providers.is_empty()
            && !decision
                .available_providers
                .contains(&decision.active_provider)
        {
            error(
                &mut issues,
                format!(
                    "[providers.decision] active_provider \"{}\" is not listed in available_providers",
                    decision.active_provider
                ),
            );
        }
        if decision.decide_timeout_secs == 0 {
            warn(
                &mut issues,
                "[providers.decision] decide_timeout_secs = 0 disables the decide timeout",
            );
        }

        if self.providers.input.enabled_inputs.is_empty() {
            warn(
                &mut issues,
                "[providers.input] enabled_inputs is empty; the runtime will receive no data",
            );
        }
        if self.providers.output.enabled_outputs.is_empty() {
            warn(
                &mut issues,
                "[providers.output] enabled_outputs is empty; intents will render nowhere",
            );
        }

        for (name, cfg) in self.llm_backends() {
            if let Some(issue) = cfg.validate() {
                warn(&mut issues, format!("[{name}] {issue}"));
            }
        }

        for (name, p) in &self.pipelines.input {
            if p.timeout_secs <= 0.0 {
                error(
                    &mut issues,
                    format!("[pipelines.input.{name}] timeout_secs must be positive"),
                );
            }
        }
        for (name, p) in &self.pipelines.output {
            if p.timeout_secs <= 0.0 {
                error(
                    &mut issues,
                    format!("[pipelines.output.{name}] timeout_secs must be positive"),
                );
            }
        }

        issues
    }

    /// Named LLM backend blocks that are actually configured.
    pub fn llm_backends(&self) -> HashMap<&'static str, &LlmBackendConfig> {
        let mut map = HashMap::new();
        if let Some(cfg) = &self.llm {
            map.insert("llm", cfg);
        }
        if let Some(cfg) = &self.llm_fast {
            map.insert("llm_fast", cfg);
        }
        if let Some(cfg) = &self.vlm {
            map.insert("vlm", cfg);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_errors() {
        let config = Config::default();
        let issues = config.validate();
        assert!(
            issues
                .iter()
                .all(|i| i.severity != ConfigSeverity::Error),
            "unexpected errors: {issues:?}"
        );
    }

    #[test]
    fn active_provider_must_be_available() {
        let toml = r#"
            [providers.decision]
            active_provider = "maicore"
            available_providers = ["rule_engine"]
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error
                && i.message.contains("maicore")));
    }

    #[test]
    fn empty_active_provider_is_an_error() {
        let toml = r#"
            [providers.decision]
            active_provider = ""
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config
            .validate()
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error));
    }
}
