use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Provider domains
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub input: InputDomainConfig,
    #[serde(default)]
    pub decision: DecisionDomainConfig,
    #[serde(default)]
    pub output: OutputDomainConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputDomainConfig {
    #[serde(default)]
    pub enabled_inputs: Vec<String>,
    /// Reawaken a failed or finished provider with fresh state.
    #[serde(default = "d_true")]
    pub auto_restart: bool,
    #[serde(default = "d_5")]
    pub restart_interval_secs: u64,
    /// Per-provider config tables: `[providers.input.{name}]`.
    #[serde(flatten)]
    pub provider_config: HashMap<String, toml::Value>,
}

impl Default for InputDomainConfig {
    fn default() -> Self {
        Self {
            enabled_inputs: Vec::new(),
            auto_restart: true,
            restart_interval_secs: 5,
            provider_config: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionDomainConfig {
    #[serde(default = "d_rule_engine")]
    pub active_provider: String,
    #[serde(default)]
    pub available_providers: Vec<String>,
    #[serde(default = "d_30")]
    pub decide_timeout_secs: u64,
    /// Messages held while a provider swap is in flight; oldest dropped on
    /// overflow.
    #[serde(default = "d_64")]
    pub swap_queue_size: usize,
    /// How long a swap waits for in-flight decides before cancelling them.
    #[serde(default = "d_5")]
    pub swap_grace_secs: u64,
    /// Per-provider config tables: `[providers.decision.{name}]`.
    #[serde(flatten)]
    pub provider_config: HashMap<String, toml::Value>,
}

impl Default for DecisionDomainConfig {
    fn default() -> Self {
        Self {
            active_provider: d_rule_engine(),
            available_providers: Vec::new(),
            decide_timeout_secs: 30,
            swap_queue_size: 64,
            swap_grace_secs: 5,
            provider_config: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputDomainConfig {
    #[serde(default)]
    pub enabled_outputs: Vec<String>,
    #[serde(default = "d_true")]
    pub concurrent_rendering: bool,
    #[serde(default)]
    pub error_handling: OutputErrorPolicy,
    #[serde(default = "d_10")]
    pub render_timeout_secs: u64,
    /// Bounded per-provider render queue; oldest entries dropped on
    /// overflow.
    #[serde(default = "d_8")]
    pub render_queue_size: usize,
    /// Per-provider config tables: `[providers.output.{name}]`.
    #[serde(flatten)]
    pub provider_config: HashMap<String, toml::Value>,
}

impl Default for OutputDomainConfig {
    fn default() -> Self {
        Self {
            enabled_outputs: Vec::new(),
            concurrent_rendering: true,
            error_handling: OutputErrorPolicy::Continue,
            render_timeout_secs: 10,
            render_queue_size: 8,
            provider_config: HashMap::new(),
        }
    }
}

/// What one output provider's failure does to its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputErrorPolicy {
    /// Log and keep siblings running.
    #[default]
    Continue,
    /// Abort the whole fan-out for this intent (providers stay alive).
    Stop,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_true() -> bool {
    true
}
fn d_5() -> u64 {
    5
}
fn d_10() -> u64 {
    10
}
fn d_30() -> u64 {
    30
}
fn d_8() -> usize {
    8
}
fn d_64() -> usize {
    64
}
fn d_rule_engine() -> String {
    "rule_engine".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_provider_tables_are_collected() {
        let toml = r#"
            enabled_inputs = ["console", "danmaku"]

            [danmaku]
            room_id = 42
        "#;
        let config: InputDomainConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.enabled_inputs, vec!["console", "danmaku"]);
        let danmaku = config.provider_config.get("danmaku").unwrap();
        assert_eq!(
            danmaku.get("room_id").and_then(|v| v.as_integer()),
            Some(42)
        );
    }

    #[test]
    fn output_error_policy_parses() {
        let toml = r#"
            enabled_outputs = ["tts"]
            error_handling = "stop"
        "#;
        let config: OutputDomainConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.error_handling, OutputErrorPolicy::Stop);
    }

    #[test]
    fn decision_defaults() {
        let config = DecisionDomainConfig::default();
        assert_eq!(config.active_provider, "rule_engine");
        assert_eq!(config.decide_timeout_secs, 30);
        assert_eq!(config.swap_queue_size, 64);
    }
}
