//! Platform decision provider: WebSocket to the external AI chat backend
//! plus LLM intent parsing of its freeform replies.
//!
//! Flow per decide:
//! 1. Build a platform frame with a fresh `message_id`
//! 2. Register a oneshot under that id in the pending map
//! 3. Send the frame over the socket
//! 4. Await the reply with a timeout
//! 5. Run the reply text through the intent parser
//!
//! A reconnect loop owns the socket: exponential backoff with jitter,
//! bounded interval, forever until shutdown. On socket loss every pending
//! correlation fails fast with a disconnect error rather than idling out,
//! and `decision.provider.connected` / `…disconnected` events are emitted
//! for observers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use kg_bus::EventBus;
use kg_domain::envelope::{EventPayload, ProviderEvent};
use kg_domain::intent::Intent;
use kg_domain::message::NormalizedMessage;
use kg_domain::topics;
use kg_domain::{Error, Result};

use crate::context::ProviderContext;
use crate::decision::intent_parser::IntentParser;
use crate::traits::DecisionProvider;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Backoff
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempt: 0,
        }
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Next delay: `base · 2^attempt` capped at `max`, ±25% jitter.
    fn next_delay(&mut self) -> Duration {
        use rand::Rng;
        let exp = self.base.as_millis() as f64 * 2f64.powi(self.attempt.min(16) as i32);
        self.attempt = self.attempt.saturating_add(1);
        let capped = Duration::from_millis(exp as u64).min(self.max);
        let factor = rand::thread_rng().gen_range(0.75..1.25);
        Duration::from_millis((capped.as_millis() as f64 * factor) as u64)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<serde_json::Value>>>>;
type OutboundSlot = Arc<Mutex<Option<mpsc::Sender<String>>>>;

pub struct MaicoreProvider {
    url: String,
    reply_timeout: Duration,
    pending: Pending,
    outbound: OutboundSlot,
    shutdown: CancellationToken,
    conn_task: Mutex<Option<JoinHandle<()>>>,
    parser: Mutex<Option<Arc<IntentParser>>>,
}

impl MaicoreProvider {
    pub fn from_config(config: &toml::Value) -> Result<Self> {
        let url = config
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Config("maicore requires a url".into()))?
            .to_string();
        let reply_timeout = Duration::from_secs(
            config
                .get("reply_timeout_secs")
                .and_then(|v| v.as_integer())
                .unwrap_or(30) as u64,
        );
        Ok(Self {
            url,
            reply_timeout,
            pending: Arc::new(Mutex::new(HashMap::new())),
            outbound: Arc::new(Mutex::new(None)),
            shutdown: CancellationToken::new(),
            conn_task: Mutex::new(None),
            parser: Mutex::new(None),
        })
    }
}

/// Fail every pending correlation; their `decide` callers see a
/// disconnect immediately instead of waiting out the reply timeout.
fn fail_pending(pending: &Pending, reason: &str) {
    let drained: Vec<_> = pending.lock().drain().collect();
    if drained.is_empty() {
        return;
    }
    tracing::warn!(
        count = drained.len(),
        reason = %reason,
        "failing pending platform requests"
    );
    // Dropping the senders resolves each waiter with a recv error, which
    // `decide` maps onto Error::Disconnected.
    drop(drained);
}

async fn announce(bus: &EventBus, connected: bool) {
    let topic = if connected {
        topics::DECISION_PROVIDER_CONNECTED
    } else {
        topics::DECISION_PROVIDER_DISCONNECTED
    };
    let _ = bus
        .emit(
            topic,
            EventPayload::Provider(ProviderEvent {
                provider: "maicore".into(),
                domain: "decision".into(),
                connected,
            }),
            "maicore",
        )
        .await;
}

/// One connected-socket session. Returns when the socket drops or
/// shutdown fires.
async fn socket_session(
    socket: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    pending: &Pending,
    outbound: &OutboundSlot,
    shutdown: &CancellationToken,
) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(64);
    *outbound.lock() = Some(tx);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                let _ = ws_sink.send(Message::Close(None)).await;
                break;
            }
            frame = rx.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = ws_sink.send(Message::Text(frame)).await {
                        tracing::warn!(error = %e, "platform socket send failed");
                        break;
                    }
                }
                None => break,
            },
            inbound = ws_stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => handle_reply(pending, &text),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "platform socket read failed");
                    break;
                }
            },
        }
    }

    outbound.lock().take();
}

/// Correlate one inbound frame. Unknown or late ids are logged and
/// dropped.
fn handle_reply(pending: &Pending, text: &str) {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable platform frame");
            return;
        }
    };
    let Some(message_id) = value.get("message_id").and_then(|v| v.as_str()) else {
        tracing::debug!("platform frame without message_id");
        return;
    };

    match pending.lock().remove(message_id) {
        Some(tx) => {
            let _ = tx.send(value.clone());
        }
        None => {
            tracing::debug!(message_id = %message_id, "reply for unknown or expired request");
        }
    }
}

async fn connection_loop(
    url: String,
    pending: Pending,
    outbound: OutboundSlot,
    bus: Arc<EventBus>,
    shutdown: CancellationToken,
) {
    let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        match connect_async(url.as_str()).await {
            Ok((socket, _)) => {
                backoff.reset();
                tracing::info!(url = %url, "platform socket connected");
                announce(&bus, true).await;

                socket_session(socket, &pending, &outbound, &shutdown).await;

                announce(&bus, false).await;
                fail_pending(&pending, "socket closed");
                tracing::warn!(url = %url, "platform socket disconnected");
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "platform connect failed");
            }
        }

        if shutdown.is_cancelled() {
            break;
        }
        let delay = backoff.next_delay();
        tracing::debug!(delay_ms = delay.as_millis() as u64, "platform reconnect backoff");
        tokio::select! {
            () = shutdown.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }
}

#[async_trait]
impl DecisionProvider for MaicoreProvider {
    fn name(&self) -> &str {
        "maicore"
    }

    async fn setup(&self, ctx: &ProviderContext) -> Result<()> {
        if let Some(llm) = ctx.llm.clone() {
            *self.parser.lock() = Some(Arc::new(IntentParser::new(llm, ctx.prompts.clone())));
        } else {
            tracing::warn!("no LLM service configured; platform replies pass through unparsed");
        }

        let task = tokio::spawn(connection_loop(
            self.url.clone(),
            self.pending.clone(),
            self.outbound.clone(),
            ctx.bus.clone(),
            self.shutdown.clone(),
        ));
        *self.conn_task.lock() = Some(task);
        Ok(())
    }

    async fn decide(&self, message: &NormalizedMessage) -> Result<Intent> {
        let message_id = uuid::Uuid::new_v4().to_string();
        let frame = serde_json::json!({
            "message_id": message_id,
            "type": "message",
            "text": message.text,
            "source": message.source,
            "importance": message.importance,
            "metadata": message.metadata,
        })
        .to_string();

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(message_id.clone(), tx);

        let sender = self.outbound.lock().clone();
        let Some(sender) = sender else {
            self.pending.lock().remove(&message_id);
            return Err(Error::Disconnected("platform socket not connected".into()));
        };
        if sender.send(frame).await.is_err() {
            self.pending.lock().remove(&message_id);
            return Err(Error::Disconnected("platform socket send failed".into()));
        }

        let reply = match tokio::time::timeout(self.reply_timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => {
                // Sender dropped: the socket died underneath us.
                return Err(Error::Disconnected(
                    "platform socket lost while awaiting reply".into(),
                ));
            }
            Err(_) => {
                self.pending.lock().remove(&message_id);
                return Err(Error::Timeout(format!(
                    "no platform reply within {}s",
                    self.reply_timeout.as_secs()
                )));
            }
        };

        let reply_text = reply
            .get("text")
            .or_else(|| reply.get("response"))
            .or_else(|| reply.get("content"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let parser = self.parser.lock().clone();
        match parser {
            Some(parser) => Ok(parser.parse(&message.text, &reply_text).await),
            None => Ok(Intent::new(&message.text, reply_text)),
        }
    }

    async fn cleanup(&self) -> Result<()> {
        self.shutdown.cancel();
        if let Some(task) = self.conn_task.lock().take() {
            task.abort();
        }
        fail_pending(&self.pending, "provider cleanup");
        self.outbound.lock().take();
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests (against an in-process mock backend)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use kg_domain::message::StructuredContent;
    use kg_domain::raw::DataKind;

    fn msg(text: &str) -> NormalizedMessage {
        NormalizedMessage::new(
            StructuredContent::Text {
                text: text.into(),
                user_id: None,
                user_name: None,
            },
            "test",
            DataKind::Text,
        )
    }

    async fn provider_for(url: &str, reply_timeout_ms: u64) -> MaicoreProvider {
        let config: toml::Value = toml::from_str(&format!("url = \"{url}\"")).unwrap();
        let mut provider = MaicoreProvider::from_config(&config).unwrap();
        provider.reply_timeout = Duration::from_millis(reply_timeout_ms);
        let ctx = ProviderContext::minimal(Arc::new(EventBus::new()));
        provider.setup(&ctx).await.unwrap();
        // Give the connect loop a moment.
        tokio::time::sleep(Duration::from_millis(100)).await;
        provider
    }

    /// Mock platform backend: accepts one socket, applies `reply` to each
    /// inbound frame.
    async fn mock_backend<F>(reply: F) -> String
    where
        F: Fn(serde_json::Value) -> Option<String> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(Message::Text(text))) = socket.next().await {
                let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
                if let Some(response) = reply(frame) {
                    socket.send(Message::Text(response)).await.unwrap();
                }
            }
        });
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn reply_is_correlated_by_message_id() {
        let url = mock_backend(|frame| {
            let id = frame["message_id"].as_str().unwrap();
            Some(
                serde_json::json!({"message_id": id, "text": "hello there"}).to_string(),
            )
        })
        .await;

        let provider = provider_for(&url, 2_000).await;
        let intent = provider.decide(&msg("hi")).await.unwrap();
        // No LLM configured: the reply passes through unparsed.
        assert_eq!(intent.response_text, "hello there");
        assert_eq!(intent.original_text, "hi");
        provider.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn missing_reply_times_out_and_clears_pending() {
        let url = mock_backend(|_| None).await;

        let provider = provider_for(&url, 100).await;
        let err = provider.decide(&msg("hi")).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert!(provider.pending.lock().is_empty());
        provider.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn decide_without_connection_fails_fast() {
        // Nothing listening on this port.
        let config: toml::Value =
            toml::from_str("url = \"ws://127.0.0.1:1\"").unwrap();
        let provider = MaicoreProvider::from_config(&config).unwrap();
        let ctx = ProviderContext::minimal(Arc::new(EventBus::new()));
        provider.setup(&ctx).await.unwrap();

        let err = provider.decide(&msg("hi")).await.unwrap_err();
        assert!(matches!(err, Error::Disconnected(_)));
        provider.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn cleanup_is_idempotent() {
        let config: toml::Value =
            toml::from_str("url = \"ws://127.0.0.1:1\"").unwrap();
        let provider = MaicoreProvider::from_config(&config).unwrap();
        provider.cleanup().await.unwrap();
        provider.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn late_reply_with_unknown_id_is_dropped() {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        handle_reply(&pending, r#"{"message_id": "ghost", "text": "late"}"#);
        assert!(pending.lock().is_empty());
    }
}
