//! CLI configuration loading and merging.

use anyhow::{Context, Result};
use chattune_core::CliConfig;
use std::path::Path;

/// Load and merge CLI configuration.
///
/// Configuration precedence:
/// 1. CLI arguments (handled by clap)
/// 2. Environment variables (`CHATTUNE_RUNTIME`)
/// 3. `--config` file, or the local config file (./.chattunerc) over the
///    global one (~/.chattune/config.toml)
/// 4. Defaults
pub fn load_config(explicit: Option<&Path>) -> Result<CliConfig> {
    let mut config = match explicit {
        Some(path) => CliConfig::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => CliConfig::discover_and_load().context("Failed to load configuration")?,
    };
    config.apply_env_overrides(|key| std::env::var(key).ok());
    Ok(config)
}
