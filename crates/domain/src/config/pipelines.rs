use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Pipeline chains for both domains, keyed by pipeline name:
/// `[pipelines.input.{name}]` and `[pipelines.output.{name}]`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelinesConfig {
    #[serde(default)]
    pub input: HashMap<String, PipelineConfig>,
    #[serde(default)]
    pub output: HashMap<String, PipelineConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Chain position; lower runs earlier. `None` uses the pipeline's
    /// built-in default.
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub error_handling: PipelineErrorPolicy,
    #[serde(default = "d_timeout")]
    pub timeout_secs: f64,
    /// Pipeline-specific options (rates, thresholds, word lists).
    #[serde(flatten)]
    pub options: HashMap<String, toml::Value>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: None,
            error_handling: PipelineErrorPolicy::Continue,
            timeout_secs: d_timeout(),
            options: HashMap::new(),
        }
    }
}

impl PipelineConfig {
    /// Typed view of one option, e.g. `opt::<u64>("max_per_minute")`.
    pub fn opt<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.options
            .get(key)
            .and_then(|v| v.clone().try_into().ok())
    }
}

/// What a pipeline stage's failure (or timeout) does to the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineErrorPolicy {
    /// Log and pass the pre-stage value forward.
    #[default]
    Continue,
    /// Abort the chain; the pre-stage value is the chain result.
    Stop,
    /// Silently discard the message.
    Drop,
}

fn d_true() -> bool {
    true
}
fn d_timeout() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_options_are_typed() {
        let toml = r#"
            enabled = true
            priority = 100
            max_per_minute = 12
            threshold = 0.85
        "#;
        let config: PipelineConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.priority, Some(100));
        assert_eq!(config.opt::<u64>("max_per_minute"), Some(12));
        assert_eq!(config.opt::<f64>("threshold"), Some(0.85));
        assert_eq!(config.opt::<u64>("missing"), None);
    }

    #[test]
    fn error_policy_parses_all_variants() {
        for (raw, expected) in [
            ("continue", PipelineErrorPolicy::Continue),
            ("stop", PipelineErrorPolicy::Stop),
            ("drop", PipelineErrorPolicy::Drop),
        ] {
            let toml = format!("error_handling = \"{raw}\"");
            let config: PipelineConfig = toml::from_str(&toml).unwrap();
            assert_eq!(config.error_handling, expected);
        }
    }
}
