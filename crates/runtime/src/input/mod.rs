//! Input domain: run providers concurrently, normalize, filter, publish.

pub mod console;
pub mod http_callback;
pub mod normalizer;
pub mod timer;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use kg_bus::EventBus;
use kg_domain::config::InputDomainConfig;
use kg_domain::envelope::{EventPayload, ProviderEvent};
use kg_domain::message::NormalizedMessage;
use kg_domain::raw::RawData;
use kg_domain::topics;
use kg_pipeline::Chain;

use crate::context::ProviderContext;
use crate::traits::InputProvider;

/// Capacity of the merged raw-observation channel.
const RAW_CHANNEL_CAPACITY: usize = 256;

/// Runs every enabled input provider in its own task, funnels their
/// observations through normalization and the input pipeline chain, and
/// publishes survivors as `data.message`.
///
/// One provider's failure never cancels its siblings; with auto-restart
/// the failed provider is rebuilt-in-place (fresh `run` call) after the
/// configured interval.
pub struct InputManager {
    bus: Arc<EventBus>,
    config: InputDomainConfig,
    chain: Arc<Chain<NormalizedMessage>>,
    ctx: ProviderContext,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    providers: Mutex<Vec<Arc<dyn InputProvider>>>,
    raw_tx: Mutex<Option<mpsc::Sender<RawData>>>,
}

impl InputManager {
    pub fn new(
        bus: Arc<EventBus>,
        config: InputDomainConfig,
        chain: Chain<NormalizedMessage>,
        ctx: ProviderContext,
    ) -> Self {
        Self {
            bus,
            config,
            chain: Arc::new(chain),
            ctx,
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            providers: Mutex::new(Vec::new()),
            raw_tx: Mutex::new(None),
        }
    }

    /// Set up and start every provider plus the shared normalizer task.
    pub async fn start(&self, providers: Vec<Arc<dyn InputProvider>>) -> kg_domain::Result<()> {
        let (tx, rx) = mpsc::channel::<RawData>(RAW_CHANNEL_CAPACITY);
        *self.raw_tx.lock() = Some(tx.clone());

        self.tasks.lock().push(self.spawn_normalizer(rx));

        for provider in providers {
            // Setup failure is isolated: the other inputs still come up.
            if let Err(e) = provider.setup(&self.ctx).await {
                tracing::error!(
                    provider = %provider.name(),
                    error = %e,
                    "input provider setup failed, skipping"
                );
                continue;
            }
            self.tasks.lock().push(self.spawn_runner(provider.clone(), tx.clone()));
            self.providers.lock().push(provider);
        }
        Ok(())
    }

    /// The sender feeding the normalizer, for embedders that inject
    /// observations directly (tests, callback server wiring). Present
    /// only after `start`.
    pub fn raw_sender(&self) -> Option<mpsc::Sender<RawData>> {
        self.raw_tx.lock().clone()
    }

    fn spawn_normalizer(&self, mut rx: mpsc::Receiver<RawData>) -> JoinHandle<()> {
        let bus = self.bus.clone();
        let chain = self.chain.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                let raw = tokio::select! {
                    () = shutdown.cancelled() => break,
                    raw = rx.recv() => match raw {
                        Some(raw) => raw,
                        None => break,
                    },
                };

                let source = raw.source.clone();
                let Some(message) = normalizer::normalize(raw) else {
                    continue;
                };

                let Some(message) = chain.run(message).await else {
                    // The responsible stage already logged the drop reason.
                    continue;
                };

                if let Err(e) = bus
                    .emit(
                        topics::DATA_MESSAGE,
                        EventPayload::Message(Arc::new(message)),
                        &source,
                    )
                    .await
                {
                    tracing::error!(source = %source, error = %e, "failed to publish data.message");
                }
            }
            tracing::debug!("input normalizer stopped");
        })
    }

    fn spawn_runner(
        &self,
        provider: Arc<dyn InputProvider>,
        tx: mpsc::Sender<RawData>,
    ) -> JoinHandle<()> {
        let bus = self.bus.clone();
        let shutdown = self.shutdown.clone();
        let auto_restart = self.config.auto_restart;
        let restart_interval = Duration::from_secs(self.config.restart_interval_secs);

        tokio::spawn(async move {
            let name = provider.name().to_string();
            loop {
                announce(&bus, &name, true).await;
                let result = tokio::select! {
                    () = shutdown.cancelled() => break,
                    result = provider.run(tx.clone(), shutdown.clone()) => result,
                };
                announce(&bus, &name, false).await;

                match &result {
                    Ok(()) => tracing::info!(provider = %name, "input provider finished"),
                    Err(e) => {
                        tracing::error!(provider = %name, error = %e, "input provider failed")
                    }
                }

                if let Err(e) = provider.cleanup().await {
                    tracing::warn!(provider = %name, error = %e, "input provider cleanup failed");
                }

                if !auto_restart || shutdown.is_cancelled() {
                    break;
                }
                tracing::info!(
                    provider = %name,
                    interval_secs = restart_interval.as_secs(),
                    "restarting input provider"
                );
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(restart_interval) => {}
                }
            }
        })
    }

    /// Stop every provider task and wait briefly for them to wind down.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        self.raw_tx.lock().take();

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let abort = task.abort_handle();
            if tokio::time::timeout(Duration::from_secs(2), task).await.is_err() {
                tracing::warn!("input task did not stop within grace period, aborting");
                abort.abort();
            }
        }

        let providers: Vec<Arc<dyn InputProvider>> =
            self.providers.lock().drain(..).collect();
        for provider in providers {
            let _ = provider.cleanup().await;
        }
    }
}

async fn announce(bus: &EventBus, provider: &str, connected: bool) {
    let topic = if connected {
        topics::INPUT_PROVIDER_CONNECTED
    } else {
        topics::INPUT_PROVIDER_DISCONNECTED
    };
    let _ = bus
        .emit(
            topic,
            EventPayload::Provider(ProviderEvent {
                provider: provider.to_string(),
                domain: "input".into(),
                connected,
            }),
            provider,
        )
        .await;
}
