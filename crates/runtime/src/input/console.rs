//! Console input provider: one observation per stdin line.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use kg_domain::raw::RawData;
use kg_domain::Result;

use crate::traits::InputProvider;

pub struct ConsoleInput {
    /// Source name attached to observations; usually just "console".
    source: String,
}

impl ConsoleInput {
    pub fn from_config(config: &toml::Value) -> Result<Self> {
        let source = config
            .get("source")
            .and_then(|v| v.as_str())
            .unwrap_or("console")
            .to_string();
        Ok(Self { source })
    }
}

#[async_trait]
impl InputProvider for ConsoleInput {
    fn name(&self) -> &str {
        "console"
    }

    async fn run(&self, tx: mpsc::Sender<RawData>, shutdown: CancellationToken) -> Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();

        loop {
            let line = tokio::select! {
                () = shutdown.cancelled() => return Ok(()),
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                // stdin closed: clean end-of-stream.
                return Ok(());
            };
            if line.trim().is_empty() {
                continue;
            }
            if tx.send(RawData::text(&self.source, line)).await.is_err() {
                return Ok(());
            }
        }
    }
}
