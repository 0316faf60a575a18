//! Subtitle output provider.
//!
//! Renders subtitle lines to the structured log and, when configured, to
//! an append-only file an overlay can tail. Platform overlay SDKs are
//! leaf collaborators behind this same provider contract.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use kg_domain::params::ExpressionParameters;
use kg_domain::Result;

use crate::traits::OutputProvider;

pub struct SubtitleOutput {
    file: Option<PathBuf>,
}

impl SubtitleOutput {
    pub fn from_config(config: &toml::Value) -> Result<Self> {
        let file = config
            .get("file")
            .and_then(|v| v.as_str())
            .map(PathBuf::from);
        Ok(Self { file })
    }
}

#[async_trait]
impl OutputProvider for SubtitleOutput {
    fn name(&self) -> &str {
        "subtitle"
    }

    async fn render(&self, params: &ExpressionParameters) -> Result<()> {
        if !params.subtitle_enabled {
            return Ok(());
        }

        tracing::info!(target: "subtitle", text = %params.subtitle_text, "subtitle");

        if let Some(path) = &self.file {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?;
            file.write_all(params.subtitle_text.as_bytes()).await?;
            file.write_all(b"\n").await?;
            file.flush().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn renders_to_the_configured_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subs.txt");
        let config: toml::Value =
            toml::from_str(&format!("file = {:?}", path.to_str().unwrap())).unwrap();
        let output = SubtitleOutput::from_config(&config).unwrap();

        let params = ExpressionParameters::new("speech", "line one");
        output.render(&params).await.unwrap();
        output.render(&params).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "line one\nline one\n");
    }

    #[tokio::test]
    async fn disabled_channel_renders_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subs.txt");
        let config: toml::Value =
            toml::from_str(&format!("file = {:?}", path.to_str().unwrap())).unwrap();
        let output = SubtitleOutput::from_config(&config).unwrap();

        let mut params = ExpressionParameters::new("speech", "hidden");
        params.subtitle_enabled = false;
        output.render(&params).await.unwrap();

        assert!(!path.exists());
    }
}
