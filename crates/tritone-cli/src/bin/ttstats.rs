//! ttstats - storage statistics and maintenance
//!
//! Usage: ttstats [OPTIONS]

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use tritone_cli::{init_logging, load_config, output::print_json_value};
use tritone_core::Engine;

#[derive(Parser, Debug)]
#[command(name = "ttstats")]
#[command(about = "Inspect or maintain the tritone index", long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<String>,

    /// Print the stored metadata line for this resource
    #[arg(short, long)]
    resource: Option<String>,

    /// Extract and print this file's event points as CSV
    #[arg(long)]
    print_points: Option<String>,

    /// Load cached fingerprint files into the configured store
    #[arg(long)]
    load_cache: bool,

    /// Remove every posting and metadata record
    #[arg(long)]
    clear: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = load_config(args.config.as_deref())?;
    let engine = Engine::new(config).context("Failed to open storage")?;

    if args.clear {
        engine.clear().context("Failed to clear storage")?;
    }
    if args.load_cache {
        let loaded = engine
            .load_cache_into_store()
            .context("Failed to load cached fingerprints")?;
        log::info!("Loaded {} resources from the cache folder", loaded);
    }

    if let Some(resource) = &args.resource {
        let line = engine
            .metadata(Path::new(resource))
            .with_context(|| format!("No metadata for {}", resource))?;
        println!("{}", line);
        return Ok(());
    }

    if let Some(audio_path) = &args.print_points {
        let points = engine
            .event_points(Path::new(audio_path))
            .with_context(|| format!("Extraction failed for {}", audio_path))?;
        let config = engine.config();
        println!("Time (step), Frequency (bin), Magnitude, Time (s), Frequency (Hz)");
        for point in points {
            println!(
                "{}, {}, {:.6}, {:.6}, {:.3}",
                point.t,
                point.f,
                point.m,
                config.frame_to_seconds(point.t),
                config.bin_to_hz(point.f)
            );
        }
        return Ok(());
    }

    let stats = engine.stats().context("Failed to read storage stats")?;
    print_json_value(&serde_json::json!({
        "resources": stats.resource_count,
        "postings": stats.posting_count,
    }));

    Ok(())
}
