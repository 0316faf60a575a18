//! Output domain: concurrent fan-out with per-provider isolation.

pub mod console;
pub mod subtitle;
pub mod tts;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use kg_bus::{handler, EventBus};
use kg_domain::config::{OutputDomainConfig, OutputErrorPolicy};
use kg_domain::envelope::{EventPayload, ProviderEvent};
use kg_domain::params::ExpressionParameters;
use kg_domain::topics;
use kg_domain::{Error, Result};

use crate::context::ProviderContext;
use crate::traits::OutputProvider;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Worker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Worker {
    name: String,
    queue: Arc<Mutex<VecDeque<Arc<ExpressionParameters>>>>,
    notify: Arc<Notify>,
    task: JoinHandle<()>,
    provider: Arc<dyn OutputProvider>,
}

/// Fans every `output.intent` out to all registered providers, each in
/// its own worker task with a bounded drop-oldest render queue. A failing
/// or slow provider is isolated (`continue`, the default); with `stop`
/// the first failure flushes every queue, aborting the in-flight fan-out
/// without tearing providers down.
pub struct OutputManager {
    bus: Arc<EventBus>,
    config: OutputDomainConfig,
    ctx: ProviderContext,
    workers: Arc<Mutex<Vec<Worker>>>,
    shutdown: CancellationToken,
}

impl OutputManager {
    pub fn new(bus: Arc<EventBus>, config: OutputDomainConfig, ctx: ProviderContext) -> Self {
        Self {
            bus,
            config,
            ctx,
            workers: Arc::new(Mutex::new(Vec::new())),
            shutdown: CancellationToken::new(),
        }
    }

    /// Set up providers, spawn their workers, subscribe to `output.intent`.
    pub async fn start(&self, providers: Vec<Arc<dyn OutputProvider>>) -> Result<()> {
        for provider in providers {
            // Setup failure is isolated: siblings still come up.
            if let Err(e) = provider.setup(&self.ctx).await {
                tracing::error!(
                    provider = %provider.name(),
                    error = %e,
                    "output provider setup failed, skipping"
                );
                continue;
            }
            let name = provider.name().to_string();
            self.spawn_worker(provider);
            announce(&self.bus, &name, true).await;
        }

        let workers = self.workers.clone();
        let queue_cap = self.config.render_queue_size.max(1);
        let concurrent = self.config.concurrent_rendering;
        let render_timeout = Duration::from_secs(self.config.render_timeout_secs.max(1));
        let policy = self.config.error_handling;

        self.bus.subscribe(
            topics::OUTPUT_INTENT,
            handler(move |envelope| {
                let workers = workers.clone();
                async move {
                    let Some(params) = envelope.payload.as_params().cloned() else {
                        return Err(Error::Other(
                            "output.intent carried a non-params payload".into(),
                        ));
                    };

                    if concurrent {
                        // Enqueue to every worker; each renders in its own
                        // task.
                        let workers = workers.lock();
                        for worker in workers.iter() {
                            let mut queue = worker.queue.lock();
                            if queue.len() >= queue_cap {
                                queue.pop_front();
                                tracing::warn!(
                                    provider = %worker.name,
                                    "render queue full, dropping oldest intent"
                                );
                            }
                            queue.push_back(params.clone());
                            worker.notify.notify_one();
                        }
                    } else {
                        // Sequential mode: render one provider after
                        // another on the dispatch path.
                        let snapshot: Vec<(String, Arc<dyn OutputProvider>)> = workers
                            .lock()
                            .iter()
                            .map(|w| (w.name.clone(), w.provider.clone()))
                            .collect();
                        for (name, provider) in snapshot {
                            let ok = render_one(
                                &name,
                                provider.as_ref(),
                                &params,
                                render_timeout,
                            )
                            .await;
                            if !ok && policy == OutputErrorPolicy::Stop {
                                tracing::warn!(
                                    provider = %name,
                                    "stopping fan-out after render failure"
                                );
                                break;
                            }
                        }
                    }
                    Ok(())
                }
            }),
            0,
        );
        Ok(())
    }

    fn spawn_worker(&self, provider: Arc<dyn OutputProvider>) {
        let name = provider.name().to_string();
        let queue: Arc<Mutex<VecDeque<Arc<ExpressionParameters>>>> =
            Arc::new(Mutex::new(VecDeque::new()));
        let notify = Arc::new(Notify::new());
        let shutdown = self.shutdown.clone();
        let render_timeout = Duration::from_secs(self.config.render_timeout_secs.max(1));
        let policy = self.config.error_handling;
        let all_workers = self.workers.clone();

        let task = {
            let name = name.clone();
            let queue = queue.clone();
            let notify = notify.clone();
            let provider = provider.clone();
            tokio::spawn(async move {
                loop {
                    let next = queue.lock().pop_front();
                    let params = match next {
                        Some(params) => params,
                        None => {
                            tokio::select! {
                                () = shutdown.cancelled() => break,
                                () = notify.notified() => {}
                            }
                            continue;
                        }
                    };

                    let ok = render_one(&name, provider.as_ref(), &params, render_timeout).await;
                    if !ok && policy == OutputErrorPolicy::Stop {
                        // Abort the fan-out: flush every sibling's queue.
                        let workers = all_workers.lock();
                        for worker in workers.iter() {
                            worker.queue.lock().clear();
                        }
                        tracing::warn!(
                            provider = %name,
                            "fan-out aborted after render failure"
                        );
                    }
                }
            })
        };

        self.workers.lock().push(Worker {
            name,
            queue,
            notify,
            task,
            provider,
        });
    }

    /// Number of registered providers.
    pub fn provider_count(&self) -> usize {
        self.workers.lock().len()
    }

    pub async fn stop(&self) {
        self.shutdown.cancel();
        let workers: Vec<Worker> = self.workers.lock().drain(..).collect();
        for worker in workers {
            let abort = worker.task.abort_handle();
            if tokio::time::timeout(Duration::from_secs(2), worker.task)
                .await
                .is_err()
            {
                abort.abort();
            }
            if let Err(e) = worker.provider.cleanup().await {
                tracing::warn!(provider = %worker.name, error = %e, "cleanup failed");
            }
            announce(&self.bus, &worker.name, false).await;
        }
    }
}

/// One bounded render attempt. Returns false on error or timeout.
async fn render_one(
    name: &str,
    provider: &dyn OutputProvider,
    params: &ExpressionParameters,
    render_timeout: Duration,
) -> bool {
    match tokio::time::timeout(render_timeout, provider.render(params)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::error!(provider = %name, error = %e, "render failed");
            false
        }
        Err(_) => {
            tracing::warn!(
                provider = %name,
                timeout_secs = render_timeout.as_secs(),
                "render timed out"
            );
            false
        }
    }
}

async fn announce(bus: &EventBus, provider: &str, connected: bool) {
    let topic = if connected {
        topics::OUTPUT_PROVIDER_CONNECTED
    } else {
        topics::OUTPUT_PROVIDER_DISCONNECTED
    };
    let _ = bus
        .emit(
            topic,
            EventPayload::Provider(ProviderEvent {
                provider: provider.to_string(),
                domain: "output".into(),
                connected,
            }),
            provider,
        )
        .await;
}
