//! Tracing subscriber setup

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use transfer_config::{LogConfig, LogFormat};

/// Filter for the subscriber
///
/// `RUST_LOG` wins over the command line level, which wins over the
/// configured level and directives.
pub fn filter(config: &LogConfig, cli_level: Option<&str>) -> Result<EnvFilter> {
    if let Ok(env) = std::env::var(EnvFilter::DEFAULT_ENV)
        && !env.trim().is_empty()
    {
        return EnvFilter::try_new(&env).with_context(|| format!("invalid RUST_LOG: {env}"));
    }
    let directive = match cli_level {
        Some(level) => level.to_string(),
        None => config.filter_directive(),
    };
    EnvFilter::try_new(&directive).with_context(|| format!("invalid log filter: {directive}"))
}

/// Install the global subscriber
pub fn init(config: &LogConfig, cli_level: Option<&str>) -> Result<()> {
    let filter = filter(config, cli_level)?;
    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .try_init(),
        LogFormat::Json => registry.with(fmt::layer().json().with_target(true)).try_init(),
    }
    .context("failed to install tracing subscriber")
}
