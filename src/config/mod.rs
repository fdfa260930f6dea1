// Configuration management module
// TOML-backed settings for the embedding provider, retry policy and index locations

pub mod settings;


use anyhow::{Context, Result};
use console::style;

pub use settings::{Config, ConfigError, EmbeddingConfig, IndexConfig, RetryConfig};

/// Write the configuration to disk if no config file exists yet.
///
/// Returns `true` when a new file was written.
#[inline]
pub fn ensure_config_file(config: &Config) -> Result<bool> {
    if config.config_file_path().exists() {
        return Ok(false);
    }

    config
        .save()
        .context("Failed to write default configuration")?;
    Ok(true)
}

#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    eprintln!("{}", style("Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedding Provider:").bold().yellow());
    match config.embedding_url() {
        Ok(url) => eprintln!("  URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  URL: {} ({})", style("Invalid").red(), e),
    }
    eprintln!("  Model: {}", style(&config.embedding.model).cyan());
    eprintln!("  Batch Size: {}", style(config.embedding.batch_size).cyan());
    eprintln!(
        "  Timeout: {}",
        style(format!("{}s", config.embedding.timeout_secs)).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Retry Policy:").bold().yellow());
    eprintln!("  Max Retries: {}", style(config.retry.max_retries).cyan());
    eprintln!(
        "  Base Delay: {}",
        style(format!("{}s", config.retry.base_delay_secs)).cyan()
    );
    eprintln!(
        "  Retry Unavailable: {}",
        style(config.retry.retry_unavailable).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Index:").bold().yellow());
    eprintln!(
        "  Data File: {}",
        style(config.index.data_path.display()).cyan()
    );
    eprintln!(
        "  Index File: {}",
        style(config.index_path().display()).cyan()
    );
    eprintln!("  Default k: {}", style(config.index.default_k).cyan());

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}
