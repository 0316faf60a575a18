//! Composition root: wire everything, own startup and shutdown order.
//!
//! Startup is leaves-first: bus → LLM service → prompt manager → audio
//! channel → registry → callback server → decision domain → input domain
//! → output domain. Shutdown is the strict reverse, each phase bounded by
//! a grace period.

use std::sync::Arc;

use anyhow::Context as _;
use tokio_util::sync::CancellationToken;

use kg_bus::EventBus;
use kg_domain::config::Config;
use kg_domain::envelope::PayloadKind;
use kg_domain::message::NormalizedMessage;
use kg_domain::params::ExpressionParameters;
use kg_domain::topics;
use kg_llm::LlmService;
use kg_pipeline::{
    Chain, ProfanityPipeline, RateLimitPipeline, SimilarTextPipeline, TextLengthPipeline,
};
use kg_prompt::PromptManager;

use crate::audio::AudioBroadcast;
use crate::callbacks::{self, CallbackRegistry};
use crate::context::ProviderContext;
use crate::decision::DecisionManager;
use crate::flow::FlowCoordinator;
use crate::input::InputManager;
use crate::output::OutputManager;
use crate::registry::{empty_config, ProviderRegistry};
use crate::traits::{InputProvider, OutputProvider};

pub struct Runtime {
    config: Arc<Config>,
    bus: Arc<EventBus>,
    input: Arc<InputManager>,
    decision: Arc<DecisionManager>,
    output: Arc<OutputManager>,
    #[allow(dead_code)]
    flow: Arc<FlowCoordinator>,
    registry: Arc<ProviderRegistry>,
    server_shutdown: CancellationToken,
    server_task: Option<tokio::task::JoinHandle<()>>,
}

impl Runtime {
    /// Build and start the whole runtime. Configuration problems are
    /// fatal here; after this returns the VTuber is live.
    pub async fn start(config: Arc<Config>, registry: ProviderRegistry) -> anyhow::Result<Self> {
        let registry = Arc::new(registry);

        // ── Event bus ────────────────────────────────────────────────
        let bus = Arc::new(EventBus::new());
        bus.register_topic(topics::DATA_MESSAGE, PayloadKind::Message);
        bus.register_topic(topics::DECISION_INTENT, PayloadKind::Intent);
        bus.register_topic(topics::OUTPUT_INTENT, PayloadKind::Params);
        bus.set_validation(true);

        // ── LLM service ──────────────────────────────────────────────
        let backends = config.llm_backends();
        let llm = if backends.is_empty() {
            tracing::warn!("no LLM backends configured; LLM-dependent providers will refuse setup");
            None
        } else {
            Some(Arc::new(
                LlmService::from_config(&backends).context("initializing LLM service")?,
            ))
        };

        // ── Prompt manager ───────────────────────────────────────────
        let prompts = Arc::new(PromptManager::new(config.prompts.templates_dir.clone()));
        tracing::info!(
            root = %prompts.root().display(),
            templates = prompts.list().len(),
            "prompt manager ready"
        );

        // ── Audio channel ────────────────────────────────────────────
        let audio = Arc::new(AudioBroadcast::new(64));

        // ── Callback server ──────────────────────────────────────────
        let server_shutdown = CancellationToken::new();
        let callbacks_registry = config.server.as_ref().map(|_| Arc::new(CallbackRegistry::new()));
        let server_task = match (&config.server, &callbacks_registry) {
            (Some(server), Some(registry)) => Some(
                callbacks::serve(&server.bind, registry.clone(), server_shutdown.clone())
                    .await
                    .context("starting callback server")?,
            ),
            _ => None,
        };

        let ctx = ProviderContext {
            bus: bus.clone(),
            llm: llm.clone(),
            prompts: Some(prompts.clone()),
            audio: audio.clone(),
            callbacks: callbacks_registry,
        };

        // ── Decision domain ──────────────────────────────────────────
        let decision = Arc::new(DecisionManager::new(
            bus.clone(),
            registry.clone(),
            ctx.clone(),
            config.providers.decision.clone(),
        ));
        decision
            .start()
            .await
            .context("starting decision domain")?;

        // ── Flow coordinator ─────────────────────────────────────────
        let flow = Arc::new(FlowCoordinator::new(
            bus.clone(),
            &config.flow,
            build_output_chain(&config)?,
        ));
        flow.start();

        // ── Input domain ─────────────────────────────────────────────
        let input = Arc::new(InputManager::new(
            bus.clone(),
            config.providers.input.clone(),
            build_input_chain(&config),
            ctx.clone(),
        ));
        let input_providers = build_input_providers(&config, &registry)?;
        input
            .start(input_providers)
            .await
            .context("starting input domain")?;

        // ── Output domain ────────────────────────────────────────────
        let output = Arc::new(OutputManager::new(
            bus.clone(),
            config.providers.output.clone(),
            ctx.clone(),
        ));
        let output_providers = build_output_providers(&config, &registry)?;
        output
            .start(output_providers)
            .await
            .context("starting output domain")?;

        tracing::info!("runtime started");
        Ok(Self {
            config,
            bus,
            input,
            decision,
            output,
            flow,
            registry,
            server_shutdown,
            server_task,
        })
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn decision(&self) -> &Arc<DecisionManager> {
        &self.decision
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Reverse-order shutdown with bounded grace per phase.
    pub async fn shutdown(mut self) {
        tracing::info!("runtime shutting down");

        self.output.stop().await;
        self.input.stop().await;
        self.decision.stop().await;

        self.server_shutdown.cancel();
        if let Some(task) = self.server_task.take() {
            let abort = task.abort_handle();
            if tokio::time::timeout(std::time::Duration::from_secs(2), task)
                .await
                .is_err()
            {
                abort.abort();
            }
        }

        self.bus.close();
        tracing::info!("runtime stopped");
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chain + provider construction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn build_input_chain(config: &Config) -> Chain<NormalizedMessage> {
    let mut chain = Chain::new();
    for (name, pipeline_config) in &config.pipelines.input {
        if !pipeline_config.enabled {
            continue;
        }
        match name.as_str() {
            "rate_limit" => chain.add(
                Arc::new(RateLimitPipeline::from_config(pipeline_config)),
                pipeline_config,
            ),
            "similarity" => chain.add(
                Arc::new(SimilarTextPipeline::from_config(pipeline_config)),
                pipeline_config,
            ),
            other => {
                tracing::warn!(pipeline = %other, "unknown input pipeline, skipping");
            }
        }
    }
    tracing::info!(stages = chain.len(), "input pipeline chain ready");
    chain
}

fn build_output_chain(config: &Config) -> anyhow::Result<Chain<ExpressionParameters>> {
    let mut chain = Chain::new();
    for (name, pipeline_config) in &config.pipelines.output {
        if !pipeline_config.enabled {
            continue;
        }
        match name.as_str() {
            "profanity" => chain.add(
                Arc::new(
                    ProfanityPipeline::from_config(pipeline_config)
                        .context("building profanity pipeline")?,
                ),
                pipeline_config,
            ),
            "length_limit" => chain.add(
                Arc::new(TextLengthPipeline::from_config(pipeline_config)),
                pipeline_config,
            ),
            other => {
                tracing::warn!(pipeline = %other, "unknown output pipeline, skipping");
            }
        }
    }
    tracing::info!(stages = chain.len(), "output pipeline chain ready");
    Ok(chain)
}

fn build_input_providers(
    config: &Config,
    registry: &ProviderRegistry,
) -> anyhow::Result<Vec<Arc<dyn InputProvider>>> {
    let mut providers = Vec::new();
    for name in &config.providers.input.enabled_inputs {
        let provider_config = config
            .providers
            .input
            .provider_config
            .get(name)
            .cloned()
            .unwrap_or_else(empty_config);
        match registry.build_input(name, &provider_config) {
            Ok(provider) => providers.push(provider),
            Err(e) => {
                // Isolated: the rest of the inputs still come up.
                tracing::error!(provider = %name, error = %e, "input provider skipped");
            }
        }
    }
    Ok(providers)
}

fn build_output_providers(
    config: &Config,
    registry: &ProviderRegistry,
) -> anyhow::Result<Vec<Arc<dyn OutputProvider>>> {
    let mut providers = Vec::new();
    for name in &config.providers.output.enabled_outputs {
        let provider_config = config
            .providers
            .output
            .provider_config
            .get(name)
            .cloned()
            .unwrap_or_else(empty_config);
        match registry.build_output(name, &provider_config) {
            Ok(provider) => providers.push(provider),
            Err(e) => {
                tracing::error!(provider = %name, error = %e, "output provider skipped");
            }
        }
    }
    Ok(providers)
}
