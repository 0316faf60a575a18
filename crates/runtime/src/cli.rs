//! CLI surface and config/tracing initialization.

use clap::Parser;

use kg_domain::config::{Config, ConfigSeverity};

/// Kagura — an AI VTuber runtime.
#[derive(Debug, Parser)]
#[command(name = "kagura", version, about)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    pub config: String,

    /// Restrict debug logging to these modules (repeatable).
    #[arg(long = "filter")]
    pub filters: Vec<String>,

    /// Debug-level logging everywhere.
    #[arg(long)]
    pub debug: bool,
}

/// Initialize tracing from the CLI flags.
///
/// `RUST_LOG` wins when set; otherwise `--debug` turns everything up and
/// each `--filter <module>` turns just that module up.
pub fn init_tracing(cli: &Cli) {
    use tracing_subscriber::EnvFilter;

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let mut directives = if cli.debug {
                String::from("debug")
            } else {
                String::from("info")
            };
            for module in &cli.filters {
                directives.push_str(&format!(",{module}=debug"));
            }
            EnvFilter::new(directives)
        }
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Load the configuration. A missing file yields the defaults with a
/// warning; an unparseable file is a startup error.
pub fn load_config(path: &str) -> anyhow::Result<Config> {
    if !std::path::Path::new(path).exists() {
        tracing::warn!(path = %path, "config file not found, using defaults");
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading {path}: {e}"))?;
    let config: Config =
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {path}: {e}"))?;
    Ok(config)
}

/// Run validation, log every issue, and fail when any is an error.
pub fn validate_config(config: &Config) -> anyhow::Result<()> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    let errors = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    if errors > 0 {
        anyhow::bail!("config validation failed with {errors} error(s)");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let config = load_config("/definitely/not/here.toml").unwrap();
        assert!(config.llm.is_none());
    }

    #[test]
    fn broken_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not [valid toml").unwrap();
        assert!(load_config(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn validation_failure_propagates() {
        let config: Config = toml::from_str(
            r#"
            [providers.decision]
            active_provider = ""
            "#,
        )
        .unwrap();
        assert!(validate_config(&config).is_err());
    }
}
