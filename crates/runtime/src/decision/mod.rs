//! Decision domain: exactly one active provider, fallback on failure,
//! live swap.

pub mod intent_parser;
pub mod local_llm;
pub mod maicore;
pub mod rule_engine;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use kg_bus::{handler, EventBus};
use kg_domain::config::DecisionDomainConfig;
use kg_domain::envelope::EventPayload;
use kg_domain::intent::Intent;
use kg_domain::message::NormalizedMessage;
use kg_domain::topics;
use kg_domain::{Error, Result};

use crate::context::ProviderContext;
use crate::registry::{empty_config, ProviderDomain, ProviderRegistry, ProviderState};
use crate::traits::DecisionProvider;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Manager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct ActiveSlot {
    name: String,
    provider: Arc<dyn DecisionProvider>,
}

struct Shared {
    bus: Arc<EventBus>,
    registry: Arc<ProviderRegistry>,
    ctx: ProviderContext,
    config: DecisionDomainConfig,
    /// The active provider slot. `decide` clones the Arc under this lock
    /// and awaits outside it; the slot itself changes only during a swap.
    active: Mutex<Option<ActiveSlot>>,
    /// True while a swap is draining/replacing; incoming messages queue.
    swapping: AtomicBool,
    held: Mutex<VecDeque<Arc<NormalizedMessage>>>,
    in_flight: AtomicUsize,
    drained: Notify,
    /// Serializes swaps.
    swap_gate: tokio::sync::Mutex<()>,
}

/// Owns the active decision provider and guarantees exactly one
/// `decision.intent` per `data.message`, synthesizing fallback intents
/// when the provider fails, times out, or is absent.
pub struct DecisionManager {
    shared: Arc<Shared>,
}

impl DecisionManager {
    pub fn new(
        bus: Arc<EventBus>,
        registry: Arc<ProviderRegistry>,
        ctx: ProviderContext,
        config: DecisionDomainConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                bus,
                registry,
                ctx,
                config,
                active: Mutex::new(None),
                swapping: AtomicBool::new(false),
                held: Mutex::new(VecDeque::new()),
                in_flight: AtomicUsize::new(0),
                drained: Notify::new(),
                swap_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Build and activate the configured provider, then subscribe to
    /// `data.message`. A failing *active* provider build is fatal: the
    /// runtime cannot decide without one.
    pub async fn start(&self) -> Result<()> {
        let name = self.shared.config.active_provider.clone();
        let provider = self.build_and_setup(&name).await?;
        *self.shared.active.lock() = Some(ActiveSlot {
            name: name.clone(),
            provider,
        });
        self.shared
            .registry
            .set_state(ProviderDomain::Decision, &name, ProviderState::Running);
        tracing::info!(provider = %name, "decision provider active");

        let shared = self.shared.clone();
        self.shared.bus.subscribe(
            topics::DATA_MESSAGE,
            handler(move |envelope| {
                let shared = shared.clone();
                async move {
                    let Some(message) = envelope.payload.as_message().cloned() else {
                        return Err(Error::Other(
                            "data.message carried a non-message payload".into(),
                        ));
                    };
                    Shared::handle_message(&shared, message).await;
                    Ok(())
                }
            }),
            0,
        );
        Ok(())
    }

    /// Swap the active provider atomically: drain in-flight decides up to
    /// the grace period, clean the outgoing provider up, build + set up
    /// the replacement, then replay messages held during the swap. No
    /// message ever observes two providers.
    pub async fn switch_provider(&self, name: &str) -> Result<()> {
        let shared = &self.shared;
        let _gate = shared.swap_gate.lock().await;

        tracing::info!(to = %name, "decision provider swap starting");
        shared.swapping.store(true, Ordering::SeqCst);

        // Drain: wait for in-flight decides, then proceed regardless.
        let grace = Duration::from_secs(shared.config.swap_grace_secs);
        let drain = async {
            loop {
                // Register before checking so a decrement between the
                // check and the await cannot be missed.
                let notified = shared.drained.notified();
                if shared.in_flight.load(Ordering::SeqCst) == 0 {
                    break;
                }
                notified.await;
            }
        };
        if tokio::time::timeout(grace, drain).await.is_err() {
            tracing::warn!(
                grace_secs = grace.as_secs(),
                "swap grace elapsed with decides still in flight"
            );
        }

        // Retire the outgoing provider.
        let outgoing = shared.active.lock().take();
        if let Some(outgoing) = outgoing {
            shared.registry.set_state(
                ProviderDomain::Decision,
                &outgoing.name,
                ProviderState::Stopping,
            );
            if let Err(e) = outgoing.provider.cleanup().await {
                tracing::warn!(provider = %outgoing.name, error = %e, "cleanup failed");
            }
            shared.registry.set_state(
                ProviderDomain::Decision,
                &outgoing.name,
                ProviderState::Registered,
            );
        }

        // Bring up the replacement.
        let outcome = match self.build_and_setup(name).await {
            Ok(provider) => {
                *shared.active.lock() = Some(ActiveSlot {
                    name: name.to_string(),
                    provider,
                });
                shared
                    .registry
                    .set_state(ProviderDomain::Decision, name, ProviderState::Running);
                tracing::info!(provider = %name, "decision provider swap complete");
                Ok(())
            }
            Err(e) => {
                // The slot stays empty; messages get `no_provider`
                // fallbacks until the next successful swap.
                tracing::error!(provider = %name, error = %e, "replacement provider failed");
                Err(e)
            }
        };

        shared.swapping.store(false, Ordering::SeqCst);

        // Replay everything held during the swap, in arrival order.
        loop {
            let next = shared.held.lock().pop_front();
            match next {
                Some(message) => {
                    shared.in_flight.fetch_add(1, Ordering::SeqCst);
                    Shared::decide_and_emit(shared, message).await;
                }
                None => break,
            }
        }

        outcome
    }

    /// Name of the currently active provider, if any.
    pub fn active_provider(&self) -> Option<String> {
        self.shared.active.lock().as_ref().map(|s| s.name.clone())
    }

    pub async fn stop(&self) {
        let outgoing = self.shared.active.lock().take();
        if let Some(outgoing) = outgoing {
            if let Err(e) = outgoing.provider.cleanup().await {
                tracing::warn!(provider = %outgoing.name, error = %e, "cleanup failed");
            }
        }
    }

    async fn build_and_setup(&self, name: &str) -> Result<Arc<dyn DecisionProvider>> {
        let shared = &self.shared;
        let config = shared
            .config
            .provider_config
            .get(name)
            .cloned()
            .unwrap_or_else(empty_config);
        let provider = shared.registry.build_decision(name, &config)?;
        provider.setup(&shared.ctx).await?;
        Ok(provider)
    }
}

impl Shared {
    async fn handle_message(shared: &Arc<Shared>, message: Arc<NormalizedMessage>) {
        if shared.swapping.load(Ordering::SeqCst) {
            let mut held = shared.held.lock();
            if held.len() >= shared.config.swap_queue_size {
                let dropped = held.pop_front();
                tracing::warn!(
                    text = %dropped.map(|m| m.text.clone()).unwrap_or_default(),
                    "swap hold queue full, dropping oldest message"
                );
            }
            held.push_back(message);
            return;
        }

        // Decide in its own task so a slow provider never stalls the bus:
        // a message stuck against the decide timeout must not delay the
        // ones behind it. The in-flight count is taken here, before the
        // spawn, so a swap's drain cannot miss a decide that is scheduled
        // but not yet running.
        shared.in_flight.fetch_add(1, Ordering::SeqCst);
        let shared = shared.clone();
        tokio::spawn(async move {
            Shared::decide_and_emit(&shared, message).await;
        });
    }

    /// One decide attempt, one emitted intent, no exceptions. The caller
    /// has already incremented `in_flight`; it is released here.
    async fn decide_and_emit(shared: &Arc<Shared>, message: Arc<NormalizedMessage>) {
        let slot = {
            let active = shared.active.lock();
            active
                .as_ref()
                .map(|s| (s.name.clone(), s.provider.clone()))
        };

        let intent = match slot {
            None => Intent::fallback(&message.text, "no_provider"),
            Some((name, provider)) => {
                let timeout = Duration::from_secs(shared.config.decide_timeout_secs.max(1));
                let outcome =
                    tokio::time::timeout(timeout, provider.decide(&message)).await;

                match outcome {
                    Ok(Ok(intent)) => intent,
                    Ok(Err(e)) => {
                        let kind = match &e {
                            Error::Timeout(_) => "timeout",
                            Error::Disconnected(_) => "disconnected",
                            _ => "provider_error",
                        };
                        tracing::warn!(
                            provider = %name,
                            error = %e,
                            "decide failed, emitting fallback intent"
                        );
                        Intent::fallback(&message.text, kind)
                    }
                    Err(_) => {
                        tracing::warn!(
                            provider = %name,
                            timeout_secs = timeout.as_secs(),
                            "decide timed out, emitting fallback intent"
                        );
                        Intent::fallback(&message.text, "timeout")
                    }
                }
            }
        };

        if shared.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            shared.drained.notify_waiters();
        }

        if let Err(e) = shared
            .bus
            .emit(
                topics::DECISION_INTENT,
                EventPayload::Intent(Arc::new(intent)),
                "decision",
            )
            .await
        {
            tracing::error!(error = %e, "failed to publish decision.intent");
        }
    }
}
