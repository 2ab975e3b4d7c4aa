//! Spectral front-end: Hann window, real FFT, magnitude half-spectrum.

use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};
use std::f32::consts::PI;
use std::sync::Arc;

/// Computes one magnitude half-spectrum per frame. The same input frames
/// always produce the same output.
pub struct SpectralFrontEnd {
    frame_size: usize,
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    input: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl SpectralFrontEnd {
    pub fn new(frame_size: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(frame_size);
        let spectrum = fft.make_output_vec();
        let scratch = fft.make_scratch_vec();
        Self {
            frame_size,
            fft,
            window: hann_window(frame_size),
            input: vec![0.0; frame_size],
            spectrum,
            scratch,
        }
    }

    /// Number of bins in the half-spectrum (the Nyquist bin is dropped).
    pub fn num_bins(&self) -> usize {
        self.frame_size / 2
    }

    /// Magnitude half-spectrum of one frame of `frame_size` samples.
    pub fn magnitudes(&mut self, frame: &[f32]) -> Vec<f32> {
        debug_assert_eq!(frame.len(), self.frame_size);
        for (slot, (&sample, &weight)) in
            self.input.iter_mut().zip(frame.iter().zip(self.window.iter()))
        {
            *slot = sample * weight;
        }
        self.fft
            .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)
            .expect("buffer lengths fixed at construction");
        self.spectrum[..self.frame_size / 2]
            .iter()
            .map(|c| (c.re * c.re + c.im * c.im).sqrt())
            .collect()
    }
}

/// Hann window of the given size.
pub fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let x = i as f32 / (size - 1) as f32;
            0.5 * (1.0 - (2.0 * PI * x).cos())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hann_window_shape() {
        let window = hann_window(512);
        assert_eq!(window.len(), 512);
        assert!((window[0] - 0.0).abs() < 1e-3);
        assert!((window[256] - 1.0).abs() < 1e-3);
        assert!((window[511] - 0.0).abs() < 1e-3);
    }

    #[test]
    fn sine_peaks_in_the_right_bin() {
        let frame_size = 1024;
        let sample_rate = 16_000.0f32;
        let freq = 1000.0f32;
        let frame: Vec<f32> = (0..frame_size)
            .map(|i| (i as f32 / sample_rate * freq * std::f32::consts::TAU).sin())
            .collect();

        let mut front_end = SpectralFrontEnd::new(frame_size);
        let mags = front_end.magnitudes(&frame);
        assert_eq!(mags.len(), 512);

        let peak_bin = mags
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        let expected = (freq / sample_rate * frame_size as f32).round() as usize;
        assert!((peak_bin as i64 - expected as i64).abs() <= 1);
    }

    #[test]
    fn deterministic_output() {
        let frame: Vec<f32> = (0..1024).map(|i| ((i * 7919) % 100) as f32 / 100.0).collect();
        let mut a = SpectralFrontEnd::new(1024);
        let mut b = SpectralFrontEnd::new(1024);
        assert_eq!(a.magnitudes(&frame), b.magnitudes(&frame));
        assert_eq!(a.magnitudes(&frame), a.magnitudes(&frame));
    }
}
