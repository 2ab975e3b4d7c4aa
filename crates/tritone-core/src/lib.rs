//! Tritone Core - Acoustic Fingerprinting Library
//!
//! An acoustic-fingerprinting index and matcher in the landmark family, but
//! built on *triplets* of spectral peaks instead of pairs. Audio is reduced
//! to sparse time-frequency event points, combined into three-peak
//! fingerprints summarised by a 64-bit hash, stored in a hash-indexed
//! posting store and matched back with a time-offset regression that
//! tolerates moderate time stretching.

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod eventpoint;
pub mod fingerprint;
pub mod matching;
pub mod monitor;
pub mod resource;
pub mod spectral;

pub use config::{Config, StorageBackendKind};
pub use engine::Engine;
pub use error::{Error, Result};
pub use eventpoint::{EventPoint, EventPointExtractor};
pub use fingerprint::{Fingerprint, FingerprintGenerator};
pub use matching::{Matcher, QueryOutcome, QueryResult};

use std::time::{Duration, Instant};

/// A cooperative deadline, checked at frame and I/O boundaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No deadline; work runs to completion.
    pub fn none() -> Self {
        Self(None)
    }

    /// Expires the given duration from now.
    pub fn after(duration: Duration) -> Self {
        Self(Some(Instant::now() + duration))
    }

    pub fn expired(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }
}

/// Extract fingerprints from an audio file with the given configuration.
pub fn generate_fingerprints(audio_path: &str, config: &Config) -> Result<Vec<Fingerprint>> {
    let audio = audio::decode_audio(std::path::Path::new(audio_path), config.sample_rate)?;
    let samples = audio.to_mono();
    fingerprint::fingerprints_from_samples(&samples, config, Deadline::none())
}
