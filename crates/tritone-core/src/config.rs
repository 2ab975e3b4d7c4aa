//! Configuration parameters for the fingerprinting engine.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which storage backend holds the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    Memory,
    Kv,
    File,
}

/// Flat map of typed engine options. Every field can be set from a TOML
/// file; unset fields keep their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Spectral framing
    pub sample_rate: u32,
    pub frame_size: usize,
    pub hop: usize,

    // Event point extraction
    pub peak_neighbourhood_t: usize,
    pub peak_neighbourhood_f: usize,
    pub peak_ema_alpha: f32,
    pub peak_ema_k: f32,
    pub peaks_per_frame_max: usize,

    // Triplet geometry
    pub fp_dt_min: i32,
    pub fp_dt_max: i32,
    pub fp_df_min: i16,
    pub fp_df_max: i16,
    pub fp_max_per_anchor: usize,

    // Matching
    pub query_range: u64,
    pub min_hits_unfiltered: usize,
    pub min_hits_filtered: usize,
    pub hit_part_max_size: usize,
    pub hit_part_divider: usize,
    pub min_time_factor: f64,
    pub max_time_factor: f64,
    pub min_match_duration: f64,
    pub min_sec_with_match: f64,
    pub match_fallback_to_hist: bool,

    // Storage
    pub storage_backend: StorageBackendKind,
    pub cache_to_file: bool,
    pub cache_folder: String,
    pub use_cached_prints: bool,
    pub db_folder: String,
    pub report_folder: String,

    // Monitor
    pub monitor_step: u32,
    pub monitor_overlap: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_size: 1024,
            hop: 128,

            peak_neighbourhood_t: 7,
            peak_neighbourhood_f: 7,
            peak_ema_alpha: 0.94,
            peak_ema_k: 1.4,
            peaks_per_frame_max: 6,

            fp_dt_min: 2,
            fp_dt_max: 33,
            fp_df_min: 1,
            fp_df_max: 128,
            fp_max_per_anchor: 12,

            query_range: 2,
            min_hits_unfiltered: 10,
            min_hits_filtered: 5,
            hit_part_max_size: 250,
            hit_part_divider: 4,
            min_time_factor: 0.8,
            max_time_factor: 1.2,
            min_match_duration: 3.0,
            min_sec_with_match: 0.2,
            match_fallback_to_hist: false,

            storage_backend: StorageBackendKind::Memory,
            cache_to_file: false,
            cache_folder: "./tritone_cache".to_string(),
            use_cached_prints: false,
            db_folder: "./tritone_db".to_string(),
            report_folder: "./tritone_reports".to_string(),

            monitor_step: 25,
            monitor_overlap: 5,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("cannot parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and cross-field consistency.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::Config("sample_rate must be > 0".into()));
        }
        if self.frame_size == 0 || self.frame_size % 2 != 0 {
            return Err(Error::Config("frame_size must be a positive even number".into()));
        }
        if self.hop == 0 || self.hop > self.frame_size {
            return Err(Error::Config("hop must be in 1..=frame_size".into()));
        }
        if !(0.0..1.0).contains(&self.peak_ema_alpha) {
            return Err(Error::Config("peak_ema_alpha must be in [0, 1)".into()));
        }
        if self.fp_dt_min < 1 || self.fp_dt_min > self.fp_dt_max {
            return Err(Error::Config("fp_dt_min must be in 1..=fp_dt_max".into()));
        }
        if self.fp_df_min < 0 || self.fp_df_min > self.fp_df_max {
            return Err(Error::Config("fp_df_min must be in 0..=fp_df_max".into()));
        }
        if self.hit_part_divider == 0 {
            return Err(Error::Config("hit_part_divider must be > 0".into()));
        }
        if self.min_time_factor >= self.max_time_factor {
            return Err(Error::Config(
                "min_time_factor must be < max_time_factor".into(),
            ));
        }
        if self.monitor_overlap >= self.monitor_step {
            return Err(Error::Config(
                "monitor_overlap must be < monitor_step".into(),
            ));
        }
        Ok(())
    }

    /// Number of frequency bins in a half-spectrum.
    pub fn num_bins(&self) -> usize {
        self.frame_size / 2
    }

    /// Convert a frame index to seconds.
    pub fn frame_to_seconds(&self, t: i32) -> f32 {
        t as f32 * self.hop as f32 / self.sample_rate as f32
    }

    /// Convert seconds to the frame index covering that instant.
    pub fn seconds_to_frame(&self, seconds: f64) -> i32 {
        (seconds * self.sample_rate as f64 / self.hop as f64) as i32
    }

    /// Centre frequency of a spectral bin in Hz.
    pub fn bin_to_hz(&self, f: i16) -> f32 {
        let bin_width = self.sample_rate as f32 / self.frame_size as f32;
        f as f32 * bin_width + bin_width / 2.0
    }
}
