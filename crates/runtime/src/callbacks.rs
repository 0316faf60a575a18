//! Shared HTTP callback server.
//!
//! Providers that receive pushes from external services (webhooks, local
//! companion apps) register a route name; the server exposes
//! `POST /callbacks/{provider}` and forwards the JSON body to the owning
//! provider as a [`RawData`] observation.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use kg_domain::raw::{DataKind, RawContent, RawData};
use kg_domain::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Route table shared between the HTTP server and providers.
#[derive(Default)]
pub struct CallbackRegistry {
    routes: Mutex<HashMap<String, mpsc::Sender<RawData>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `POST /callbacks/{name}` for a provider.
    pub fn register(&self, name: &str, tx: mpsc::Sender<RawData>) {
        if self
            .routes
            .lock()
            .insert(name.to_string(), tx)
            .is_some()
        {
            tracing::warn!(route = %name, "callback route re-registered");
        } else {
            tracing::info!(route = %name, "callback route registered");
        }
    }

    pub fn unregister(&self, name: &str) {
        self.routes.lock().remove(name);
    }

    fn sender(&self, name: &str) -> Option<mpsc::Sender<RawData>> {
        self.routes.lock().get(name).cloned()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build a [`RawData`] from a callback body.
///
/// Bodies may carry `text` (string), `data_type`, and `metadata` (object);
/// anything else rides along inside a JSON payload.
fn raw_data_from_body(provider: &str, body: serde_json::Value) -> RawData {
    let metadata = body
        .get("metadata")
        .and_then(|m| m.as_object())
        .map(|m| m.clone().into_iter().collect())
        .unwrap_or_default();

    let mut raw = match body.get("text").and_then(|t| t.as_str()) {
        Some(text) => RawData::text(provider, text),
        None => RawData {
            content: RawContent::Json {
                value: body.clone(),
            },
            source: provider.to_string(),
            data_type: DataKind::Json,
            timestamp: chrono::Utc::now(),
            metadata: HashMap::new(),
        },
    };
    raw.metadata = metadata;
    raw
}

async fn handle_callback(
    State(registry): State<Arc<CallbackRegistry>>,
    Path(provider): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> StatusCode {
    let Some(tx) = registry.sender(&provider) else {
        return StatusCode::NOT_FOUND;
    };

    let raw = raw_data_from_body(&provider, body);
    match tx.try_send(raw) {
        Ok(()) => StatusCode::ACCEPTED,
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!(provider = %provider, "callback queue full, rejecting");
            StatusCode::TOO_MANY_REQUESTS
        }
        Err(mpsc::error::TrySendError::Closed(_)) => StatusCode::GONE,
    }
}

pub fn router(registry: Arc<CallbackRegistry>) -> Router {
    Router::new()
        .route("/callbacks/:provider", post(handle_callback))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(registry)
}

/// Bind and serve until `shutdown` fires. Returns the join handle; bind
/// failures are startup errors.
pub async fn serve(
    bind: &str,
    registry: Arc<CallbackRegistry>,
    shutdown: CancellationToken,
) -> Result<JoinHandle<()>> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| Error::Config(format!("callback server bind {bind}: {e}")))?;
    tracing::info!(bind = %bind, "callback server listening");

    let app = router(registry);
    let handle = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "callback server terminated");
        }
    });
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_body_becomes_text_raw_data() {
        let body = serde_json::json!({
            "text": "hello from webhook",
            "metadata": {"user_id": "U9"}
        });
        let raw = raw_data_from_body("hooks", body);
        assert_eq!(raw.source, "hooks");
        assert_eq!(raw.data_type, DataKind::Text);
        assert_eq!(raw.content.as_text(), Some("hello from webhook"));
        assert_eq!(
            raw.metadata.get("user_id").and_then(|v| v.as_str()),
            Some("U9")
        );
    }

    #[test]
    fn non_text_body_is_kept_as_json() {
        let body = serde_json::json!({"kind": "telemetry", "hp": 20});
        let raw = raw_data_from_body("game", body);
        assert_eq!(raw.data_type, DataKind::Json);
        match &raw.content {
            RawContent::Json { value } => assert_eq!(value["hp"], 20),
            other => panic!("unexpected content {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        use tower::ServiceExt;

        let registry = Arc::new(CallbackRegistry::new());
        let app = router(registry);

        let response = app
            .oneshot(
                axum::http::Request::post("/callbacks/ghost")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn registered_route_forwards_to_provider() {
        use tower::ServiceExt;

        let registry = Arc::new(CallbackRegistry::new());
        let (tx, mut rx) = mpsc::channel(4);
        registry.register("chat", tx);

        let app = router(registry);
        let response = app
            .oneshot(
                axum::http::Request::post("/callbacks/chat")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(r#"{"text":"yo"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let raw = rx.recv().await.unwrap();
        assert_eq!(raw.content.as_text(), Some("yo"));
    }
}
