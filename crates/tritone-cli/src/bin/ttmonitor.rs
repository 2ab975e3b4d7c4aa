//! ttmonitor - scan long recordings for indexed snippets
//!
//! Slides fixed windows with overlap across the input and runs one
//! independent sub-query per window.
//!
//! Usage: ttmonitor [OPTIONS] <INPUT_FILE>

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tritone_cli::{init_logging, load_config, output::print_json_outcome};
use tritone_core::{Deadline, Engine};

#[derive(Parser, Debug)]
#[command(name = "ttmonitor")]
#[command(about = "Monitor long audio files for indexed material", long_about = None)]
struct Args {
    /// Input audio file
    input_file: String,

    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<String>,

    /// Maximum number of results per window
    #[arg(short, long, default_value_t = 10)]
    max_results: usize,

    /// Resource identifiers to ignore
    #[arg(short, long)]
    avoid: Vec<i32>,

    /// Give up after this many seconds and report partial results
    #[arg(long)]
    timeout: Option<f64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = load_config(args.config.as_deref())?;
    let engine = Engine::new(config).context("Failed to open storage")?;

    let avoid: HashSet<i32> = args.avoid.iter().copied().collect();
    let deadline = match args.timeout {
        Some(seconds) => Deadline::after(Duration::from_secs_f64(seconds)),
        None => Deadline::none(),
    };

    let outcome = engine
        .monitor(Path::new(&args.input_file), args.max_results, &avoid, deadline)
        .with_context(|| format!("Monitoring failed for {}", args.input_file))?;
    print_json_outcome(&args.input_file, &outcome);

    Ok(())
}
