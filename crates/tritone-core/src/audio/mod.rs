//! Audio decoding and framing.
//!
//! The engine consumes audio through a narrow interface: a finite, ordered
//! stream of overlapping frames of mono PCM in [-1, 1] at a configured
//! sample rate. WAV files are decoded with hound, everything else goes
//! through symphonia.

mod decoder;
mod resample;

pub use decoder::{decode_audio, AudioData};
pub use resample::resample_to_target;

use crate::error::Result;
use std::path::Path;

/// Decode a clip to mono samples at `sample_rate`, restricted to
/// `[start_s, start_s + len_s)`.
pub fn decode_clip(path: &Path, sample_rate: u32, start_s: f64, len_s: f64) -> Result<Vec<f32>> {
    let audio = decode_audio(path, sample_rate)?;
    let samples = audio.to_mono();
    Ok(clip(&samples, sample_rate, start_s, len_s).to_vec())
}

/// Duration of an audio file in seconds, at the decoder's native rate.
pub fn duration_in_seconds(path: &Path, sample_rate: u32) -> Result<f64> {
    let audio = decode_audio(path, sample_rate)?;
    Ok(audio.duration_ms as f64 / 1000.0)
}

/// The sub-slice of `samples` covering `[start_s, start_s + len_s)`.
pub fn clip(samples: &[f32], sample_rate: u32, start_s: f64, len_s: f64) -> &[f32] {
    let start = ((start_s * sample_rate as f64) as usize).min(samples.len());
    let stop = (((start_s + len_s) * sample_rate as f64) as usize).min(samples.len());
    &samples[start..stop]
}

/// Overlapping frames over a sample buffer: `frame_size` samples advancing
/// by `hop`. Trailing samples that do not fill a frame are dropped.
pub fn frames(samples: &[f32], frame_size: usize, hop: usize) -> Frames<'_> {
    Frames {
        samples,
        frame_size,
        hop,
        pos: 0,
    }
}

pub struct Frames<'a> {
    samples: &'a [f32],
    frame_size: usize,
    hop: usize,
    pos: usize,
}

impl<'a> Iterator for Frames<'a> {
    type Item = &'a [f32];

    fn next(&mut self) -> Option<&'a [f32]> {
        if self.pos + self.frame_size > self.samples.len() {
            return None;
        }
        let frame = &self.samples[self.pos..self.pos + self.frame_size];
        self.pos += self.hop;
        Some(frame)
    }
}
