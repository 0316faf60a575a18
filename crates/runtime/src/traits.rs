//! Provider contracts for the three domains.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use kg_domain::intent::Intent;
use kg_domain::message::NormalizedMessage;
use kg_domain::params::ExpressionParameters;
use kg_domain::raw::RawData;
use kg_domain::Result;

use crate::context::ProviderContext;

/// A source of raw observations (chat feed, console, telemetry).
///
/// `run` drives the provider's main loop: it pushes observations into
/// `tx` until the source ends, an error occurs, or `shutdown` fires.
/// Returning `Ok` means a clean end-of-stream; the input manager may
/// restart the provider either way when auto-restart is on.
#[async_trait]
pub trait InputProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn setup(&self, _ctx: &ProviderContext) -> Result<()> {
        Ok(())
    }

    async fn run(&self, tx: mpsc::Sender<RawData>, shutdown: CancellationToken) -> Result<()>;

    /// Idempotent; called on shutdown and before an auto-restart.
    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}

/// The single replaceable brain between input and output.
///
/// `decide` must resolve within the domain's configured timeout; the
/// manager wraps every call and converts failures into fallback intents,
/// so implementations are free to just return errors.
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn setup(&self, _ctx: &ProviderContext) -> Result<()> {
        Ok(())
    }

    async fn decide(&self, message: &NormalizedMessage) -> Result<Intent>;

    /// Idempotent; called on shutdown and when swapped out.
    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}

/// A rendering sink (TTS, subtitles, avatar parameters).
///
/// `render` may be long-running; the output manager bounds it with the
/// configured render timeout and isolates failures from siblings.
#[async_trait]
pub trait OutputProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn setup(&self, _ctx: &ProviderContext) -> Result<()> {
        Ok(())
    }

    async fn render(&self, params: &ExpressionParameters) -> Result<()>;

    /// Idempotent.
    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}
