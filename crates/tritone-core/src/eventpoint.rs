//! Event point extraction.
//!
//! A bin survives three filters, in order: it must be a strict local maximum
//! over a (2Δt+1)×(2Δf+1) time-frequency neighbourhood, it must exceed a
//! multiple of the per-bin exponentially smoothed magnitude (a spectral
//! whitening effect), and the frame must not already carry its quota of
//! peaks. Only a ring of the last 2Δt+1 spectra is held.

use crate::config::Config;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A local maximum on the STFT magnitude surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventPoint {
    /// Time index (frame number)
    pub t: i32,
    /// Frequency bin index
    pub f: i16,
    /// Magnitude value
    pub m: f32,
}

impl EventPoint {
    pub fn new(t: i32, f: i16, m: f32) -> Self {
        Self { t, f, m }
    }
}

/// Streaming extractor over successive magnitude spectra.
pub struct EventPointExtractor {
    delta_t: usize,
    delta_f: usize,
    ema_alpha: f32,
    ema_k: f32,
    max_per_frame: usize,
    ring: VecDeque<Vec<f32>>,
    ema: Vec<f32>,
    frames_seen: usize,
}

impl EventPointExtractor {
    pub fn new(config: &Config) -> Self {
        Self {
            delta_t: config.peak_neighbourhood_t,
            delta_f: config.peak_neighbourhood_f,
            ema_alpha: config.peak_ema_alpha,
            ema_k: config.peak_ema_k,
            max_per_frame: config.peaks_per_frame_max,
            ring: VecDeque::with_capacity(2 * config.peak_neighbourhood_t + 2),
            ema: Vec::new(),
            frames_seen: 0,
        }
    }

    /// Feed the next magnitude spectrum. Returns the event points of the
    /// frame that just became the centre of the ring, in bin order. Frames
    /// closer than Δt to either end of the input never become centres.
    pub fn process(&mut self, magnitudes: Vec<f32>) -> Vec<EventPoint> {
        if self.ema.is_empty() {
            self.ema = magnitudes.clone();
        } else {
            for (tracked, &mag) in self.ema.iter_mut().zip(magnitudes.iter()) {
                *tracked = self.ema_alpha * *tracked + (1.0 - self.ema_alpha) * mag;
            }
        }

        self.ring.push_back(magnitudes);
        self.frames_seen += 1;

        let span = 2 * self.delta_t + 1;
        if self.ring.len() < span {
            return Vec::new();
        }

        let centre_t = (self.frames_seen - 1 - self.delta_t) as i32;
        let points = self.extract_centre(centre_t);
        self.ring.pop_front();
        points
    }

    /// Convenience over a whole spectrogram.
    pub fn extract_all<I>(&mut self, spectra: I) -> Vec<EventPoint>
    where
        I: IntoIterator<Item = Vec<f32>>,
    {
        let mut points = Vec::new();
        for magnitudes in spectra {
            points.extend(self.process(magnitudes));
        }
        points
    }

    fn extract_centre(&self, centre_t: i32) -> Vec<EventPoint> {
        let centre = &self.ring[self.delta_t];
        let num_bins = centre.len();
        let mut candidates = Vec::new();

        'bins: for f in 0..num_bins {
            let m = centre[f];
            if m <= 0.0 || m <= self.ema_k * self.ema[f] {
                continue;
            }
            let f_low = f.saturating_sub(self.delta_f);
            let f_high = (f + self.delta_f).min(num_bins - 1);
            for (ti, spectrum) in self.ring.iter().enumerate() {
                for (fj, &neighbour) in spectrum[f_low..=f_high].iter().enumerate() {
                    if ti == self.delta_t && f_low + fj == f {
                        continue;
                    }
                    if neighbour >= m {
                        continue 'bins;
                    }
                }
            }
            candidates.push(EventPoint::new(centre_t, f as i16, m));
        }

        if candidates.len() > self.max_per_frame {
            candidates.sort_by(|a, b| b.m.total_cmp(&a.m));
            candidates.truncate(self.max_per_frame);
            candidates.sort_by_key(|p| p.f);
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.peak_neighbourhood_t = 2;
        config.peak_neighbourhood_f = 2;
        config.peak_ema_alpha = 0.9;
        config.peak_ema_k = 1.1;
        config.peaks_per_frame_max = 3;
        config
    }

    fn flat_spectrum(bins: usize, level: f32) -> Vec<f32> {
        vec![level; bins]
    }

    #[test]
    fn empty_input_yields_no_points() {
        let mut extractor = EventPointExtractor::new(&test_config());
        let points = extractor.extract_all(Vec::<Vec<f32>>::new());
        assert!(points.is_empty());
    }

    #[test]
    fn isolated_peak_is_found_at_the_right_coordinates() {
        let config = test_config();
        let mut extractor = EventPointExtractor::new(&config);

        let mut spectra: Vec<Vec<f32>> = (0..9).map(|_| flat_spectrum(16, 0.1)).collect();
        spectra[4][8] = 5.0;

        let points = extractor.extract_all(spectra);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].t, 4);
        assert_eq!(points[0].f, 8);
        assert!((points[0].m - 5.0).abs() < 1e-6);
    }

    #[test]
    fn peak_near_the_edge_of_input_is_not_reported() {
        let config = test_config();
        let mut extractor = EventPointExtractor::new(&config);

        // Peak in frame 1, inside the leading Δt margin.
        let mut spectra: Vec<Vec<f32>> = (0..9).map(|_| flat_spectrum(16, 0.1)).collect();
        spectra[1][8] = 5.0;

        let points = extractor.extract_all(spectra);
        assert!(points.is_empty());
    }

    #[test]
    fn weak_peak_is_suppressed_by_whitening() {
        let config = test_config();
        let mut extractor = EventPointExtractor::new(&config);

        // A "peak" barely above a loud steady background: the EMA tracks the
        // background, so the 1.1x gate rejects it.
        let mut spectra: Vec<Vec<f32>> = (0..9).map(|_| flat_spectrum(16, 1.0)).collect();
        spectra[4][8] = 1.05;

        let points = extractor.extract_all(spectra);
        assert!(points.is_empty());
    }

    #[test]
    fn per_frame_cap_keeps_the_loudest_points() {
        let config = test_config();
        let mut extractor = EventPointExtractor::new(&config);

        // Five isolated peaks in the same frame, spaced wider than Δf.
        let mut spectra: Vec<Vec<f32>> = (0..9).map(|_| flat_spectrum(40, 0.01)).collect();
        for &(f, m) in &[(2usize, 2.0f32), (9, 5.0), (16, 3.0), (23, 4.0), (30, 1.0)] {
            spectra[4][f] = m;
        }

        let points = extractor.extract_all(spectra);
        assert_eq!(points.len(), 3);
        // bin order preserved, weakest two dropped
        let kept: Vec<i16> = points.iter().map(|p| p.f).collect();
        assert_eq!(kept, vec![9, 16, 23]);
    }

    #[test]
    fn plateau_has_no_strict_maximum() {
        let config = test_config();
        let mut extractor = EventPointExtractor::new(&config);

        // Two equal magnitudes inside one neighbourhood: neither is strictly
        // greater than the other.
        let mut spectra: Vec<Vec<f32>> = (0..9).map(|_| flat_spectrum(16, 0.1)).collect();
        spectra[4][8] = 5.0;
        spectra[4][9] = 5.0;

        let points = extractor.extract_all(spectra);
        assert!(points.is_empty());
    }
}
