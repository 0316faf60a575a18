//! Console output provider: prints the response. The simplest sink, and
//! the one you stare at while everything else is misconfigured.

use async_trait::async_trait;

use kg_domain::params::ExpressionParameters;
use kg_domain::Result;

use crate::traits::OutputProvider;

pub struct ConsoleOutput {
    prefix: String,
}

impl ConsoleOutput {
    pub fn from_config(config: &toml::Value) -> Result<Self> {
        let prefix = config
            .get("prefix")
            .and_then(|v| v.as_str())
            .unwrap_or(">>")
            .to_string();
        Ok(Self { prefix })
    }
}

#[async_trait]
impl OutputProvider for ConsoleOutput {
    fn name(&self) -> &str {
        "console"
    }

    async fn render(&self, params: &ExpressionParameters) -> Result<()> {
        println!("{} {}", self.prefix, params.subtitle_text);
        Ok(())
    }
}
