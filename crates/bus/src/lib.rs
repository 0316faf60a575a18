//! Process-local named-topic event bus.
//!
//! The bus is the only channel between the three business domains: input
//! publishes `data.message`, decision publishes `decision.intent`, the flow
//! coordinator publishes `output.intent`, and nobody calls anybody else
//! directly.
//!
//! Guarantees:
//! - Handlers run in ascending priority order, insertion order breaking
//!   ties, and each handler subscribed at emit time runs exactly once.
//! - With error isolation (the default), one handler's failure never
//!   prevents its siblings from running.
//! - Dispatch takes a snapshot of the registration list, so subscribing or
//!   unsubscribing concurrently never affects an emit already in flight.

mod stats;

pub use stats::TopicStats;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use kg_domain::envelope::{EventEnvelope, EventPayload, PayloadKind};
use kg_domain::topics::REPLY_PREFIX;
use kg_domain::{Error, Result};

use stats::StatsTable;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handler types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// A subscribed event handler. Build one from an async closure with
/// [`handler`].
pub type Handler = Arc<dyn Fn(EventEnvelope) -> HandlerFuture + Send + Sync>;

/// Wrap an async closure into a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(EventEnvelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |envelope| Box::pin(f(envelope)))
}

/// Stable opaque subscription handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Registration {
    id: u64,
    priority: i32,
    insertion: u64,
    handler: Handler,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// EventBus
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct EventBus {
    topics: Mutex<HashMap<String, Vec<Registration>>>,
    /// In-flight `request` calls, keyed by their generated reply topic.
    pending_replies: Mutex<HashMap<String, oneshot::Sender<EventPayload>>>,
    /// Topic → expected payload kind, consulted when validation is on.
    expected_payloads: Mutex<HashMap<String, PayloadKind>>,
    stats: StatsTable,
    next_id: AtomicU64,
    next_seq: AtomicU64,
    validate: AtomicBool,
    closed: AtomicBool,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            pending_replies: Mutex::new(HashMap::new()),
            expected_payloads: Mutex::new(HashMap::new()),
            stats: StatsTable::new(),
            next_id: AtomicU64::new(1),
            next_seq: AtomicU64::new(0),
            validate: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    // ── Subscription ───────────────────────────────────────────────

    /// Register a handler for a topic. Handlers run in ascending
    /// `priority` order; ties break by subscription order.
    pub fn subscribe(&self, topic: &str, handler: Handler, priority: i32) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let insertion = id;
        let mut topics = self.topics.lock();
        let registrations = topics.entry(topic.to_string()).or_default();
        let registration = Registration {
            id,
            priority,
            insertion,
            handler,
        };
        let at = registrations
            .partition_point(|r| (r.priority, r.insertion) <= (priority, insertion));
        registrations.insert(at, registration);
        tracing::debug!(topic = %topic, priority, subscription = id, "handler subscribed");
        SubscriptionId(id)
    }

    /// Remove a subscription. Unknown ids are a no-op.
    pub fn unsubscribe(&self, subscription: SubscriptionId) {
        let mut topics = self.topics.lock();
        for registrations in topics.values_mut() {
            registrations.retain(|r| r.id != subscription.0);
        }
    }

    /// Number of handlers currently subscribed to a topic.
    pub fn handler_count(&self, topic: &str) -> usize {
        self.topics.lock().get(topic).map_or(0, Vec::len)
    }

    // ── Emission ───────────────────────────────────────────────────

    /// Publish an event with error isolation: a failing handler is logged
    /// and counted, and its siblings still run.
    pub async fn emit(&self, topic: &str, payload: EventPayload, source: &str) -> Result<()> {
        self.emit_with(topic, payload, source, true).await
    }

    /// Publish an event. Without isolation the first handler error aborts
    /// the dispatch and propagates to the caller.
    pub async fn emit_with(
        &self,
        topic: &str,
        payload: EventPayload,
        source: &str,
        isolate_errors: bool,
    ) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            tracing::warn!(topic = %topic, source = %source, "emit dropped: bus is closed");
            return Ok(());
        }

        // A reply to an in-flight request resolves the waiter directly.
        if topic.starts_with(REPLY_PREFIX) {
            self.resolve_reply(topic, payload);
            return Ok(());
        }

        self.check_payload(topic, &payload);

        let envelope = EventEnvelope {
            topic: topic.to_string(),
            payload,
            source: source.to_string(),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            reply_to: None,
        };
        self.dispatch(envelope, isolate_errors).await
    }

    /// Emit to `topic` and wait for a single response emitted to the
    /// envelope's generated reply topic.
    pub async fn request(
        &self,
        topic: &str,
        payload: EventPayload,
        source: &str,
        timeout: Duration,
    ) -> Result<EventPayload> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }

        self.check_payload(topic, &payload);

        let reply_topic = format!("{REPLY_PREFIX}{}", uuid::Uuid::new_v4());
        let (tx, rx) = oneshot::channel();
        self.pending_replies.lock().insert(reply_topic.clone(), tx);

        let envelope = EventEnvelope {
            topic: topic.to_string(),
            payload,
            source: source.to_string(),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            reply_to: Some(reply_topic.clone()),
        };

        // Dispatch with isolation so one broken responder candidate cannot
        // mask another.
        if let Err(e) = self.dispatch(envelope, true).await {
            self.pending_replies.lock().remove(&reply_topic);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            // Sender dropped without a send: the bus closed underneath us.
            Ok(Err(_)) => Err(Error::Closed),
            Err(_) => {
                self.pending_replies.lock().remove(&reply_topic);
                Err(Error::Timeout(format!(
                    "no response on {topic} within {}ms",
                    timeout.as_millis()
                )))
            }
        }
    }

    fn resolve_reply(&self, reply_topic: &str, payload: EventPayload) {
        match self.pending_replies.lock().remove(reply_topic) {
            Some(tx) => {
                let _ = tx.send(payload);
            }
            None => {
                // Late or duplicate response; the requester already gave up.
                tracing::debug!(topic = %reply_topic, "reply for unknown or expired request");
            }
        }
    }

    async fn dispatch(&self, envelope: EventEnvelope, isolate_errors: bool) -> Result<()> {
        // Snapshot under the lock; invoke without it so handlers can
        // subscribe/unsubscribe freely.
        let snapshot: Vec<(u64, Handler)> = {
            let topics = self.topics.lock();
            topics
                .get(&envelope.topic)
                .map(|regs| regs.iter().map(|r| (r.id, r.handler.clone())).collect())
                .unwrap_or_default()
        };

        self.stats.record_emit(&envelope.topic);

        for (id, handler) in snapshot {
            match handler(envelope.clone()).await {
                Ok(()) => self.stats.record_invocation(&envelope.topic),
                Err(e) => {
                    self.stats.record_error(&envelope.topic, &e);
                    if isolate_errors {
                        tracing::error!(
                            topic = %envelope.topic,
                            subscription = id,
                            error = %e,
                            "handler failed; continuing with remaining handlers"
                        );
                    } else {
                        return Err(e);
                    }
                }
            }
        }
        Ok(())
    }

    // ── Payload validation ─────────────────────────────────────────

    /// Declare the payload kind expected on a topic.
    pub fn register_topic(&self, topic: &str, kind: PayloadKind) {
        self.expected_payloads
            .lock()
            .insert(topic.to_string(), kind);
    }

    /// Enable or disable payload validation. Mismatches are logged, never
    /// rejected.
    pub fn set_validation(&self, enabled: bool) {
        self.validate.store(enabled, Ordering::Relaxed);
    }

    fn check_payload(&self, topic: &str, payload: &EventPayload) {
        if !self.validate.load(Ordering::Relaxed) {
            return;
        }
        match self.expected_payloads.lock().get(topic) {
            Some(expected) if *expected != payload.kind() => {
                tracing::warn!(
                    topic = %topic,
                    expected = ?expected,
                    actual = ?payload.kind(),
                    "payload kind mismatch"
                );
            }
            Some(_) => {}
            None => {
                tracing::debug!(topic = %topic, "emit on unregistered topic");
            }
        }
    }

    // ── Observability ──────────────────────────────────────────────

    /// Per-topic dispatch statistics.
    pub fn stats(&self) -> HashMap<String, TopicStats> {
        self.stats.snapshot()
    }

    // ── Shutdown ───────────────────────────────────────────────────

    /// Close the bus. Further emits are dropped with a warning; pending
    /// `request` calls fail with [`Error::Closed`]. In-flight handler
    /// invocations run to completion.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let pending: Vec<_> = self.pending_replies.lock().drain().collect();
        if !pending.is_empty() {
            tracing::warn!(count = pending.len(), "failing pending requests on close");
        }
        // Dropping the senders resolves each waiter with Closed.
        drop(pending);
        tracing::info!("event bus closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
