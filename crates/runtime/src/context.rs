//! Frozen capability record injected into providers.

use std::sync::Arc;

use kg_bus::EventBus;
use kg_llm::LlmService;
use kg_prompt::PromptManager;

use crate::audio::AudioBroadcast;
use crate::callbacks::CallbackRegistry;

/// Shared capabilities handed to every provider's `setup`.
///
/// Constructors take only their config table; everything else arrives
/// through this record. It is frozen: cloning yields the same handles, and
/// nothing a provider does can mutate it. Optional fields are capabilities
/// the composition root may not have configured (no `[llm]` block, no
/// `[server]` block).
#[derive(Clone)]
pub struct ProviderContext {
    pub bus: Arc<EventBus>,
    pub llm: Option<Arc<LlmService>>,
    pub prompts: Option<Arc<PromptManager>>,
    pub audio: Arc<AudioBroadcast>,
    pub callbacks: Option<Arc<CallbackRegistry>>,
}

impl ProviderContext {
    /// A minimal context around a bus, for tests and embedders.
    pub fn minimal(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            llm: None,
            prompts: None,
            audio: Arc::new(AudioBroadcast::new(16)),
            callbacks: None,
        }
    }
}
