//! Fingerprint generation and hashing.
//!
//! A fingerprint connects three event points within configured time and
//! frequency windows and folds them into a 64-bit hash built from the first
//! peak's quantised frequency, the two frequency ratios and the two time
//! ratios. The hash depends only on the triplet's internal geometry, never
//! on absolute time, and keeps the finest-grained quantities in the low
//! bits so a small arithmetic neighbourhood around a hash corresponds to
//! near-identical triplets.

use crate::audio::frames;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::eventpoint::{EventPoint, EventPointExtractor};
use crate::spectral::SpectralFrontEnd;
use crate::Deadline;
use serde::{Deserialize, Serialize};

/// A fingerprint of three event points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// 64-bit hash of the triplet
    pub hash: u64,
    pub t1: i32,
    pub f1: i16,
    pub m1: f32,
    pub t2: i32,
    pub f2: i16,
    pub m2: f32,
    pub t3: i32,
    pub f3: i16,
    pub m3: f32,
}

impl Fingerprint {
    /// Create a fingerprint from three event points with `t1 < t2 < t3`.
    pub fn from_points(p1: &EventPoint, p2: &EventPoint, p3: &EventPoint) -> Self {
        let mut fp = Self {
            hash: 0,
            t1: p1.t,
            f1: p1.f,
            m1: p1.m,
            t2: p2.t,
            f2: p2.f,
            m2: p2.m,
            t3: p3.t,
            f3: p3.f,
            m3: p3.m,
        };
        fp.hash = fp.compute_hash();
        fp
    }

    /// A fingerprint reconstructed from a cache file: only the hash and the
    /// anchor time survive the round trip.
    pub fn from_cached(hash: u64, t1: i32) -> Self {
        Self {
            hash,
            t1,
            f1: 0,
            m1: 0.0,
            t2: 0,
            f2: 0,
            m2: 0.0,
            t3: 0,
            f3: 0,
            m3: 0.0,
        }
    }

    fn compute_hash(&self) -> u64 {
        // 9 bits of anchor frequency.
        let f1q = (self.f1 as u64) & 0x1FF;

        // Frequency ratios relative to the anchor, 1/64 steps, 9 bits each.
        let f1 = self.f1.max(1) as f32;
        let r2q = ((self.f2 as f32 / f1 * 64.0) as u64) & 0x1FF;
        let r3q = ((self.f3 as f32 / f1 * 64.0) as u64) & 0x1FF;

        // Time ratios over the triplet span, 1/64 steps, 6 bits each. At
        // this granularity a one-frame rounding wobble moves the lowest
        // field by at most a quantum or two, within reach of the +-Q
        // lookup. Both ratios lie strictly inside (0, 1) because t1 < t2 < t3.
        let span = (self.t3 - self.t1) as f32;
        let tr1q = (((self.t2 - self.t1) as f32 / span * 64.0) as u64) & 0x3F;
        let tr2q = (((self.t3 - self.t2) as f32 / span * 64.0) as u64) & 0x3F;

        f1q << 30 | r2q << 21 | r3q << 12 | tr1q << 6 | tr2q
    }

    pub fn magnitude_sum(&self) -> f32 {
        self.m1 + self.m2 + self.m3
    }

    /// Earliest peak time, used for report timestamps.
    pub fn min_time(&self) -> i32 {
        self.t1.min(self.t2).min(self.t3)
    }
}

/// Combines an event-point stream into fingerprints.
pub struct FingerprintGenerator {
    dt_min: i32,
    dt_max: i32,
    df_min: i16,
    df_max: i16,
    max_per_anchor: usize,
}

impl FingerprintGenerator {
    pub fn new(config: &Config) -> Self {
        Self {
            dt_min: config.fp_dt_min,
            dt_max: config.fp_dt_max,
            df_min: config.fp_df_min,
            df_max: config.fp_df_max,
            max_per_anchor: config.fp_max_per_anchor,
        }
    }

    fn leg_fits(&self, from: &EventPoint, to: &EventPoint) -> bool {
        let dt = to.t - from.t;
        let df = (to.f - from.f).abs();
        dt >= self.dt_min && dt <= self.dt_max && df >= self.df_min && df <= self.df_max
    }

    /// Generate fingerprints from event points in frame order.
    pub fn generate(&self, event_points: &[EventPoint]) -> Vec<Fingerprint> {
        let mut points = event_points.to_vec();
        points.sort_by_key(|p| (p.t, p.f));

        let mut fingerprints = Vec::new();
        let mut per_anchor = Vec::new();

        for (i, p1) in points.iter().enumerate() {
            per_anchor.clear();

            for (j, p2) in points.iter().enumerate().skip(i + 1) {
                if p2.t - p1.t > self.dt_max {
                    break;
                }
                if !self.leg_fits(p1, p2) {
                    continue;
                }
                for p3 in points.iter().skip(j + 1) {
                    if p3.t - p2.t > self.dt_max {
                        break;
                    }
                    if !self.leg_fits(p2, p3) {
                        continue;
                    }
                    per_anchor.push(Fingerprint::from_points(p1, p2, p3));
                }
            }

            // Keep the strongest combinations per anchor.
            if per_anchor.len() > self.max_per_anchor {
                per_anchor.sort_by(|a, b| b.magnitude_sum().total_cmp(&a.magnitude_sum()));
                per_anchor.truncate(self.max_per_anchor);
            }
            fingerprints.extend(per_anchor.drain(..));
        }

        fingerprints.sort_by_key(|fp| (fp.t1, fp.t2, fp.t3, fp.f1));
        fingerprints
    }
}

/// The full front-end pipeline: frames, spectra, event points, fingerprints.
/// Cancellation is honoured at frame boundaries.
pub fn fingerprints_from_samples(
    samples: &[f32],
    config: &Config,
    deadline: Deadline,
) -> Result<Vec<Fingerprint>> {
    let mut front_end = SpectralFrontEnd::new(config.frame_size);
    let mut extractor = EventPointExtractor::new(config);
    let mut points = Vec::new();
    for frame in frames(samples, config.frame_size, config.hop) {
        if deadline.expired() {
            return Err(Error::Cancelled);
        }
        points.extend(extractor.process(front_end.magnitudes(frame)));
    }
    Ok(FingerprintGenerator::new(config).generate(&points))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(t: i32, f: i16, m: f32) -> EventPoint {
        EventPoint::new(t, f, m)
    }

    #[test]
    fn hash_is_deterministic_and_translation_invariant() {
        let fp = Fingerprint::from_points(
            &point(100, 120, 0.5),
            &point(110, 140, 0.7),
            &point(125, 100, 0.6),
        );
        let again = Fingerprint::from_points(
            &point(100, 120, 0.5),
            &point(110, 140, 0.7),
            &point(125, 100, 0.6),
        );
        assert_ne!(fp.hash, 0);
        assert_eq!(fp.hash, again.hash);

        // Shifting the whole triplet in time changes nothing.
        let shifted = Fingerprint::from_points(
            &point(4100, 120, 0.5),
            &point(4110, 140, 0.7),
            &point(4125, 100, 0.6),
        );
        assert_eq!(fp.hash, shifted.hash);
    }

    #[test]
    fn hash_reacts_to_geometry() {
        let base = Fingerprint::from_points(
            &point(0, 120, 0.5),
            &point(10, 140, 0.7),
            &point(25, 100, 0.6),
        );
        let narrower = Fingerprint::from_points(
            &point(0, 120, 0.5),
            &point(12, 140, 0.7),
            &point(25, 100, 0.6),
        );
        let other_anchor = Fingerprint::from_points(
            &point(0, 200, 0.5),
            &point(10, 140, 0.7),
            &point(25, 100, 0.6),
        );
        assert_ne!(base.hash, narrower.hash);
        assert_ne!(base.hash, other_anchor.hash);
    }

    #[test]
    fn generated_triplets_satisfy_the_geometry_windows() {
        let config = Config::default();
        let generator = FingerprintGenerator::new(&config);

        let points: Vec<EventPoint> = (0..30)
            .map(|i| point(i * 5, 100 + ((i * 17) % 90) as i16, 1.0))
            .collect();
        let prints = generator.generate(&points);
        assert!(!prints.is_empty());

        for fp in &prints {
            assert!(fp.t1 < fp.t2 && fp.t2 < fp.t3);
            let dt12 = fp.t2 - fp.t1;
            let dt23 = fp.t3 - fp.t2;
            assert!(dt12 >= config.fp_dt_min && dt12 <= config.fp_dt_max);
            assert!(dt23 >= config.fp_dt_min && dt23 <= config.fp_dt_max);
            assert!((fp.f2 - fp.f1).abs() >= config.fp_df_min);
            assert!((fp.f2 - fp.f1).abs() <= config.fp_df_max);
            assert!((fp.f3 - fp.f2).abs() >= config.fp_df_min);
            assert!((fp.f3 - fp.f2).abs() <= config.fp_df_max);
        }
    }

    #[test]
    fn too_few_points_produce_nothing() {
        let generator = FingerprintGenerator::new(&Config::default());
        assert!(generator.generate(&[]).is_empty());
        assert!(generator.generate(&[point(0, 100, 1.0)]).is_empty());
        assert!(generator
            .generate(&[point(0, 100, 1.0), point(10, 120, 1.0)])
            .is_empty());
    }

    #[test]
    fn anchor_cap_prefers_strong_triplets() {
        let mut config = Config::default();
        config.fp_max_per_anchor = 2;
        let generator = FingerprintGenerator::new(&config);

        // One anchor, several second/third peaks of varying magnitude.
        let points = vec![
            point(0, 100, 1.0),
            point(5, 110, 0.1),
            point(6, 130, 3.0),
            point(12, 120, 0.2),
            point(13, 150, 2.0),
        ];
        let prints = generator.generate(&points);

        let anchored: Vec<&Fingerprint> = prints.iter().filter(|fp| fp.t1 == 0).collect();
        assert_eq!(anchored.len(), 2);
        for fp in anchored {
            assert!(fp.magnitude_sum() >= 1.0 + 0.1 + 2.0);
        }
    }
}
