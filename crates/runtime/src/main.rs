use std::sync::Arc;

use clap::Parser;

use kg_runtime::bootstrap::Runtime;
use kg_runtime::cli::{self, Cli};
use kg_runtime::registry::ProviderRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli::init_tracing(&cli);

    let config = cli::load_config(&cli.config)?;
    cli::validate_config(&config)?;

    let runtime = Runtime::start(Arc::new(config), ProviderRegistry::with_builtins()).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("interrupt received");
    runtime.shutdown().await;
    Ok(())
}
