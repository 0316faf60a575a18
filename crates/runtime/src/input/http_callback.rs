//! HTTP callback input provider.
//!
//! Claims a `POST /callbacks/{route}` route on the shared callback server
//! and forwards everything posted there into the input domain.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use kg_domain::raw::RawData;
use kg_domain::{Error, Result};

use crate::callbacks::CallbackRegistry;
use crate::context::ProviderContext;
use crate::traits::InputProvider;

pub struct HttpCallbackInput {
    route: String,
    registry: Mutex<Option<Arc<CallbackRegistry>>>,
}

impl HttpCallbackInput {
    pub fn from_config(config: &toml::Value) -> Result<Self> {
        let route = config
            .get("route")
            .and_then(|v| v.as_str())
            .unwrap_or("http_callback")
            .to_string();
        Ok(Self {
            route,
            registry: Mutex::new(None),
        })
    }
}

#[async_trait]
impl InputProvider for HttpCallbackInput {
    fn name(&self) -> &str {
        "http_callback"
    }

    async fn setup(&self, ctx: &ProviderContext) -> Result<()> {
        let registry = ctx.callbacks.clone().ok_or_else(|| {
            Error::Config(
                "http_callback input requires the [server] callback server".into(),
            )
        })?;
        *self.registry.lock() = Some(registry);
        Ok(())
    }

    async fn run(&self, tx: mpsc::Sender<RawData>, shutdown: CancellationToken) -> Result<()> {
        let registry = self
            .registry
            .lock()
            .clone()
            .ok_or_else(|| Error::Other("setup was not called".into()))?;

        registry.register(&self.route, tx);
        shutdown.cancelled().await;
        registry.unregister(&self.route);
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        if let Some(registry) = self.registry.lock().clone() {
            registry.unregister(&self.route);
        }
        Ok(())
    }
}
