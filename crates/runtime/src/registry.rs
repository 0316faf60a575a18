//! Provider registry: name → factory, with per-provider state tracking.
//!
//! Factories are plain functions from a config table to a provider
//! instance; built-ins self-register in [`ProviderRegistry::with_builtins`]
//! and embedders may add their own before the runtime boots. Construction
//! failures are isolated: the record is marked `Failed`, the rest of the
//! system proceeds.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use kg_domain::{Error, Result};

use crate::traits::{DecisionProvider, InputProvider, OutputProvider};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderDomain {
    Input,
    Decision,
    Output,
}

impl ProviderDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderDomain::Input => "input",
            ProviderDomain::Decision => "decision",
            ProviderDomain::Output => "output",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    Registered,
    Building,
    Ready,
    Running,
    Stopping,
    Failed,
}

/// Observable registry entry.
#[derive(Debug, Clone)]
pub struct ProviderRecord {
    pub name: String,
    pub domain: ProviderDomain,
    pub state: ProviderState,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Factories
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub type InputFactory =
    Arc<dyn Fn(&toml::Value) -> Result<Arc<dyn InputProvider>> + Send + Sync>;
pub type DecisionFactory =
    Arc<dyn Fn(&toml::Value) -> Result<Arc<dyn DecisionProvider>> + Send + Sync>;
pub type OutputFactory =
    Arc<dyn Fn(&toml::Value) -> Result<Arc<dyn OutputProvider>> + Send + Sync>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ProviderRegistry {
    inputs: HashMap<String, InputFactory>,
    decisions: HashMap<String, DecisionFactory>,
    outputs: HashMap<String, OutputFactory>,
    states: Mutex<HashMap<(ProviderDomain, String), ProviderState>>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            inputs: HashMap::new(),
            decisions: HashMap::new(),
            outputs: HashMap::new(),
            states: Mutex::new(HashMap::new()),
        }
    }

    /// A registry with every built-in provider registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register_input("console", |cfg| {
            Ok(Arc::new(crate::input::console::ConsoleInput::from_config(cfg)?) as _)
        });
        registry.register_input("timer", |cfg| {
            Ok(Arc::new(crate::input::timer::TimerInput::from_config(cfg)?) as _)
        });
        registry.register_input("http_callback", |cfg| {
            Ok(Arc::new(crate::input::http_callback::HttpCallbackInput::from_config(cfg)?) as _)
        });

        registry.register_decision("rule_engine", |cfg| {
            Ok(Arc::new(crate::decision::rule_engine::RuleEngineProvider::from_config(cfg)?) as _)
        });
        registry.register_decision("local_llm", |cfg| {
            Ok(Arc::new(crate::decision::local_llm::LocalLlmProvider::from_config(cfg)?) as _)
        });
        registry.register_decision("maicore", |cfg| {
            Ok(Arc::new(crate::decision::maicore::MaicoreProvider::from_config(cfg)?) as _)
        });

        registry.register_output("subtitle", |cfg| {
            Ok(Arc::new(crate::output::subtitle::SubtitleOutput::from_config(cfg)?) as _)
        });
        registry.register_output("tts", |cfg| {
            Ok(Arc::new(crate::output::tts::TtsOutput::from_config(cfg)?) as _)
        });
        registry.register_output("console", |cfg| {
            Ok(Arc::new(crate::output::console::ConsoleOutput::from_config(cfg)?) as _)
        });

        registry
    }

    // ── Registration ───────────────────────────────────────────────

    pub fn register_input<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&toml::Value) -> Result<Arc<dyn InputProvider>> + Send + Sync + 'static,
    {
        self.inputs.insert(name.to_string(), Arc::new(factory));
        self.set_state(ProviderDomain::Input, name, ProviderState::Registered);
    }

    pub fn register_decision<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&toml::Value) -> Result<Arc<dyn DecisionProvider>> + Send + Sync + 'static,
    {
        self.decisions.insert(name.to_string(), Arc::new(factory));
        self.set_state(ProviderDomain::Decision, name, ProviderState::Registered);
    }

    pub fn register_output<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&toml::Value) -> Result<Arc<dyn OutputProvider>> + Send + Sync + 'static,
    {
        self.outputs.insert(name.to_string(), Arc::new(factory));
        self.set_state(ProviderDomain::Output, name, ProviderState::Registered);
    }

    // ── Construction ───────────────────────────────────────────────

    pub fn build_input(&self, name: &str, config: &toml::Value) -> Result<Arc<dyn InputProvider>> {
        let factory = self.inputs.get(name).cloned().ok_or_else(|| {
            Error::Config(format!("unknown input provider \"{name}\""))
        })?;
        self.build(ProviderDomain::Input, name, config, |cfg| factory(cfg))
    }

    pub fn build_decision(
        &self,
        name: &str,
        config: &toml::Value,
    ) -> Result<Arc<dyn DecisionProvider>> {
        let factory = self.decisions.get(name).cloned().ok_or_else(|| {
            Error::Config(format!("unknown decision provider \"{name}\""))
        })?;
        self.build(ProviderDomain::Decision, name, config, |cfg| factory(cfg))
    }

    pub fn build_output(
        &self,
        name: &str,
        config: &toml::Value,
    ) -> Result<Arc<dyn OutputProvider>> {
        let factory = self.outputs.get(name).cloned().ok_or_else(|| {
            Error::Config(format!("unknown output provider \"{name}\""))
        })?;
        self.build(ProviderDomain::Output, name, config, |cfg| factory(cfg))
    }

    fn build<T>(
        &self,
        domain: ProviderDomain,
        name: &str,
        config: &toml::Value,
        factory: impl Fn(&toml::Value) -> Result<T>,
    ) -> Result<T> {
        self.set_state(domain, name, ProviderState::Building);
        match factory(config) {
            Ok(provider) => {
                self.set_state(domain, name, ProviderState::Ready);
                Ok(provider)
            }
            Err(e) => {
                self.set_state(domain, name, ProviderState::Failed);
                tracing::error!(
                    provider = %name,
                    domain = %domain.as_str(),
                    error = %e,
                    "provider construction failed"
                );
                Err(e)
            }
        }
    }

    // ── State tracking ─────────────────────────────────────────────

    pub fn set_state(&self, domain: ProviderDomain, name: &str, state: ProviderState) {
        self.states
            .lock()
            .insert((domain, name.to_string()), state);
    }

    pub fn records(&self) -> Vec<ProviderRecord> {
        let mut records: Vec<ProviderRecord> = self
            .states
            .lock()
            .iter()
            .map(|((domain, name), state)| ProviderRecord {
                name: name.clone(),
                domain: *domain,
                state: *state,
            })
            .collect();
        records.sort_by(|a, b| (a.domain.as_str(), &a.name).cmp(&(b.domain.as_str(), &b.name)));
        records
    }

    pub fn known_input(&self, name: &str) -> bool {
        self.inputs.contains_key(name)
    }

    pub fn known_decision(&self, name: &str) -> bool {
        self.decisions.contains_key(name)
    }

    pub fn known_output(&self, name: &str) -> bool {
        self.outputs.contains_key(name)
    }
}

/// Empty config table for providers with no `[providers.{domain}.{name}]`
/// block.
pub fn empty_config() -> toml::Value {
    toml::Value::Table(toml::map::Map::new())
}
