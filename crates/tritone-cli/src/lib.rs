//! Shared helpers for the tritone command line tools.

pub mod output;

use anyhow::{Context, Result};
use std::path::Path;
use tritone_core::Config;

/// Initialise logging. Quiet by default so JSON output stays parseable;
/// verbose switches info-level logs on.
pub fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Off
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}

/// Load configuration from an explicit path, from `tritone.toml` in the
/// working directory, or fall back to the defaults.
pub fn load_config(explicit: Option<&str>) -> Result<Config> {
    if let Some(path) = explicit {
        return Config::load(Path::new(path))
            .with_context(|| format!("Failed to load config from {}", path));
    }
    let default_path = Path::new("tritone.toml");
    if default_path.exists() {
        return Config::load(default_path).context("Failed to load tritone.toml");
    }
    Ok(Config::default())
}
