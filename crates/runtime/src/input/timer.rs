//! Timer input provider: periodic synthetic events.
//!
//! Useful for idle chatter ("nobody has said anything in a while") and
//! for exercising the full pipeline without a live chat connection.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use kg_domain::raw::RawData;
use kg_domain::Result;

use crate::traits::InputProvider;

pub struct TimerInput {
    interval: Duration,
    text: String,
}

impl TimerInput {
    pub fn from_config(config: &toml::Value) -> Result<Self> {
        let interval_secs = config
            .get("interval_secs")
            .and_then(|v| v.as_integer())
            .unwrap_or(300) as u64;
        let text = config
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or("[idle] nothing has happened for a while")
            .to_string();
        Ok(Self {
            interval: Duration::from_secs(interval_secs.max(1)),
            text,
        })
    }
}

#[async_trait]
impl InputProvider for TimerInput {
    fn name(&self) -> &str {
        "timer"
    }

    async fn run(&self, tx: mpsc::Sender<RawData>, shutdown: CancellationToken) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // Skip the immediate first tick.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }
            if tx.send(RawData::text("timer", &self.text)).await.is_err() {
                return Ok(());
            }
        }
    }
}
