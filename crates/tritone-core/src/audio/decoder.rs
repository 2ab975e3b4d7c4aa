//! Audio decoding for WAV and compressed formats.

use super::resample_to_target;
use crate::error::{Error, Result};
use std::path::Path;
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decoded audio data.
#[derive(Debug, Clone)]
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_ms: u32,
}

impl AudioData {
    /// Convert to mono by averaging channels.
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }
        let mut mono = Vec::with_capacity(self.samples.len() / self.channels as usize);
        for chunk in self.samples.chunks(self.channels as usize) {
            let avg: f32 = chunk.iter().sum::<f32>() / chunk.len() as f32;
            mono.push(avg);
        }
        mono
    }
}

/// Decode an audio file to mono-mixable PCM at `target_sample_rate`.
pub fn decode_audio(path: &Path, target_sample_rate: u32) -> Result<AudioData> {
    if !path.exists() {
        return Err(Error::decode(path, "file not found"));
    }

    let is_wav = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("wav") | Some("wave")
    );
    let mut audio = if is_wav {
        decode_wav(path)?
    } else {
        decode_with_symphonia(path)?
    };

    if audio.samples.is_empty() {
        return Ok(AudioData {
            samples: Vec::new(),
            sample_rate: target_sample_rate,
            channels: 1,
            duration_ms: 0,
        });
    }

    if audio.sample_rate != target_sample_rate {
        let mono = audio.to_mono();
        audio.samples = resample_to_target(&mono, audio.sample_rate, target_sample_rate);
        audio.sample_rate = target_sample_rate;
        audio.channels = 1;
    } else if audio.channels > 1 {
        audio.samples = audio.to_mono();
        audio.channels = 1;
    }

    Ok(audio)
}

fn decode_wav(path: &Path) -> Result<AudioData> {
    let mut reader = hound::WavReader::open(path).map_err(|e| Error::decode(path, e))?;

    let spec = reader.spec();
    let sample_rate = spec.sample_rate;
    let channels = spec.channels;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::decode(path, e))?,
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| Error::decode(path, e))?
        }
    };

    let duration_ms = duration_ms(samples.len(), sample_rate, channels);
    Ok(AudioData {
        samples,
        sample_rate,
        channels,
        duration_ms,
    })
}

fn decode_with_symphonia(path: &Path) -> Result<AudioData> {
    let file = std::fs::File::open(path).map_err(|e| Error::decode(path, e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::decode(path, e))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::decode(path, "no audio track"))?;
    let track_id = track.id;
    let codec_params = &track.codec_params;
    let sample_rate = codec_params.sample_rate.unwrap_or(44_100);
    let channels = codec_params.channels.map(|c| c.count()).unwrap_or(2) as u16;

    let mut decoder = symphonia::default::get_codecs()
        .make(codec_params, &DecoderOptions::default())
        .map_err(|e| Error::decode(path, e))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break
            }
            Err(e) => return Err(Error::decode(path, e)),
        };
        if packet.track_id() != track_id {
            continue;
        }
        // Corrupted packets are skipped, not fatal.
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(_) => continue,
        };
        push_interleaved(&decoded, &mut samples);
    }

    let duration_ms = duration_ms(samples.len(), sample_rate, channels);
    Ok(AudioData {
        samples,
        sample_rate,
        channels,
        duration_ms,
    })
}

fn push_interleaved(decoded: &AudioBufferRef<'_>, samples: &mut Vec<f32>) {
    macro_rules! interleave {
        ($buf:expr, $convert:expr) => {{
            let buf = $buf;
            let channels = buf.spec().channels.count();
            for frame in 0..buf.frames() {
                for ch in 0..channels {
                    samples.push($convert(buf.chan(ch)[frame]));
                }
            }
        }};
    }
    match decoded {
        AudioBufferRef::F32(buf) => interleave!(buf, |s: f32| s),
        AudioBufferRef::F64(buf) => interleave!(buf, |s: f64| s as f32),
        AudioBufferRef::S32(buf) => interleave!(buf, |s: i32| s as f32 / i32::MAX as f32),
        AudioBufferRef::S16(buf) => interleave!(buf, |s: i16| s as f32 / i16::MAX as f32),
        AudioBufferRef::U8(buf) => interleave!(buf, |s: u8| (s as f32 - 128.0) / 128.0),
        _ => log::warn!("unsupported sample format in decoded packet"),
    }
}

fn duration_ms(sample_count: usize, sample_rate: u32, channels: u16) -> u32 {
    if sample_rate == 0 || channels == 0 {
        return 0;
    }
    (sample_count as f64 / (sample_rate as f64 * channels as f64) * 1000.0) as u32
}
