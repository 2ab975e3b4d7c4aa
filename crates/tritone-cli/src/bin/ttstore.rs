//! ttstore - extract fingerprints and add (or remove) resources
//!
//! Usage: ttstore [OPTIONS] <AUDIO_PATHS>...

use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;
use std::path::Path;
use tritone_cli::{init_logging, load_config, output::print_json_value};
use tritone_core::Engine;

#[derive(Parser, Debug)]
#[command(name = "ttstore")]
#[command(about = "Store audio fingerprints in the tritone index", long_about = None)]
struct Args {
    /// Audio files to store
    #[arg(required = true)]
    audio_paths: Vec<String>,

    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<String>,

    /// Delete the resources instead of storing them
    #[arg(short, long)]
    delete: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = load_config(args.config.as_deref())?;
    let engine = Engine::new(config).context("Failed to open storage")?;

    let summaries: Vec<serde_json::Value> = args
        .audio_paths
        .par_iter()
        .map(|path_str| {
            let path = Path::new(path_str);
            let outcome = if args.delete {
                engine.delete(path).map(|duration| ("deleted", duration))
            } else {
                engine.store(path).map(|duration| ("stored", duration))
            };
            match outcome {
                Ok((action, duration)) => serde_json::json!({
                    "status": action,
                    "path": path_str,
                    "duration_seconds": duration,
                }),
                Err(e) => serde_json::json!({
                    "status": "error",
                    "path": path_str,
                    "error": e.to_string(),
                }),
            }
        })
        .collect();

    let failed = summaries
        .iter()
        .filter(|summary| summary["status"] == "error")
        .count();
    print_json_value(&serde_json::json!({
        "processed": summaries.len(),
        "failed": failed,
        "resources": summaries,
    }));

    if failed > 0 {
        anyhow::bail!("{} of {} resources failed", failed, summaries.len());
    }
    Ok(())
}
