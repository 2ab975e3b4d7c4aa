//! ttquery - identify audio clips against the index
//!
//! Usage: ttquery [OPTIONS] <QUERY_PATHS>...

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tritone_cli::{init_logging, load_config, output::print_json_outcome};
use tritone_core::{Deadline, Engine};

#[derive(Parser, Debug)]
#[command(name = "ttquery")]
#[command(about = "Match query audio against the tritone index", long_about = None)]
struct Args {
    /// Audio files to identify
    #[arg(required = true)]
    query_paths: Vec<String>,

    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<String>,

    /// Maximum number of results per query
    #[arg(short, long, default_value_t = 10)]
    max_results: usize,

    /// Resource identifiers to ignore (e.g. the query itself)
    #[arg(short, long)]
    avoid: Vec<i32>,

    /// Only analyse this window: start second
    #[arg(long)]
    start: Option<f64>,

    /// Only analyse this window: length in seconds
    #[arg(long)]
    length: Option<f64>,

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

    for path_str in &args.query_paths {
        let path = Path::new(path_str);
        let outcome = match (args.start, args.length) {
            (Some(start), Some(length)) => engine
                .query_window(path, start, length, args.max_results, &avoid, deadline)
                .with_context(|| format!("Query failed for {}", path_str))?,
            _ => engine
                .query(path, args.max_results, &avoid, deadline)
                .with_context(|| format!("Query failed for {}", path_str))?,
        };
        print_json_outcome(path_str, &outcome);
    }

    Ok(())
}
