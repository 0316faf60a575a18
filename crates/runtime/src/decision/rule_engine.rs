//! Rule-engine decision provider: keyword and regex rules from config or
//! a rules file. No network, no model — the fastest brain available.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use kg_domain::intent::{Emotion, Intent, IntentAction};
use kg_domain::message::NormalizedMessage;
use kg_domain::{Error, Result};

use crate::traits::DecisionProvider;

#[derive(Debug, Deserialize, Default)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<RawRule>,
    #[serde(default)]
    default_response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    pattern: Option<String>,
    response: String,
    #[serde(default)]
    emotion: Option<String>,
    #[serde(default)]
    actions: Vec<String>,
}

struct CompiledRule {
    keywords: Vec<String>,
    pattern: Option<Regex>,
    response: String,
    emotion: Emotion,
    actions: Vec<String>,
}

pub struct RuleEngineProvider {
    rules: Vec<CompiledRule>,
    default_response: Option<String>,
}

impl RuleEngineProvider {
    /// Rules either inline in the provider table or from `rules_file`.
    /// The file wins when both are present.
    pub fn from_config(config: &toml::Value) -> Result<Self> {
        let rule_file: RuleFile = if let Some(path) =
            config.get("rules_file").and_then(|v| v.as_str())
        {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| Error::Config(format!("rule_engine rules_file {path}: {e}")))?;
            toml::from_str(&raw)
                .map_err(|e| Error::Config(format!("rule_engine rules_file {path}: {e}")))?
        } else {
            config
                .clone()
                .try_into()
                .map_err(|e| Error::Config(format!("rule_engine rules: {e}")))?
        };

        let mut rules = Vec::with_capacity(rule_file.rules.len());
        for raw in rule_file.rules {
            let pattern = match &raw.pattern {
                Some(p) => Some(
                    Regex::new(p)
                        .map_err(|e| Error::Config(format!("rule pattern {p}: {e}")))?,
                ),
                None => None,
            };
            rules.push(CompiledRule {
                keywords: raw.keywords.iter().map(|k| k.to_lowercase()).collect(),
                pattern,
                response: raw.response,
                emotion: raw.emotion.as_deref().map(Emotion::parse).unwrap_or_default(),
                actions: raw.actions,
            });
        }

        tracing::debug!(rules = rules.len(), "rule engine loaded");
        Ok(Self {
            rules,
            default_response: rule_file.default_response,
        })
    }

    fn matching_rule(&self, text: &str) -> Option<&CompiledRule> {
        let lowered = text.to_lowercase();
        self.rules.iter().find(|rule| {
            rule.keywords.iter().any(|k| lowered.contains(k))
                || rule
                    .pattern
                    .as_ref()
                    .is_some_and(|p| p.is_match(text))
        })
    }
}

#[async_trait]
impl DecisionProvider for RuleEngineProvider {
    fn name(&self) -> &str {
        "rule_engine"
    }

    async fn decide(&self, message: &NormalizedMessage) -> Result<Intent> {
        match self.matching_rule(&message.text) {
            Some(rule) => {
                let mut intent = Intent::new(&message.text, &rule.response)
                    .with_emotion(rule.emotion);
                intent.actions = rule
                    .actions
                    .iter()
                    .map(|a| IntentAction::expression(a.clone()))
                    .collect();
                Ok(intent)
            }
            None => {
                let response = self.default_response.clone().unwrap_or_default();
                let mut intent = Intent::new(&message.text, response);
                intent
                    .metadata
                    .insert("matched".into(), serde_json::Value::Bool(false));
                Ok(intent)
            }
        }
    }
}
