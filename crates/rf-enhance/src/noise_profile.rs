//! Noise Profile Estimator
//!
//! Tracks the background-noise magnitude spectrum from frames classified as
//! noise-only. A frame is noise-only when its RMS is below
//! `NOISE_THRESHOLD_RATIO` times the long-term running minimum RMS.
//!
//! A steady tone keeps the frame RMS flat, so frame classification alone
//! cannot keep it out of the profile. Inside a noise-only frame, bins more
//! than `TONAL_RATIO` above both the frame's median magnitude and their own
//! estimate are treated as tonal and left out of the update.
//!
//! Until the first noise-only frame has been seen the profile is all zero
//! and spectral subtraction is a no-op (cold start).

use num_complex::Complex32;
use serde::{Deserialize, Serialize};

use crate::level::{self, MinimumTracker};

/// Noise-only threshold relative to the running minimum RMS
pub const NOISE_THRESHOLD_RATIO: f32 = 1.5;

/// Per-frame rise of the running minimum towards louder frames
const MINIMUM_RISE_PER_FRAME: f32 = 0.005;

/// Bin-to-median magnitude ratio above which a bin counts as tonal
///
/// Rayleigh-distributed noise bins exceed 3x the median about 0.2 % of the time.
pub const TONAL_RATIO: f32 = 3.0;

/// Frames below this RMS are digital silence and carry no noise information
const SILENCE_RMS: f32 = 1e-9;

/// Background noise magnitude per FFT bin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseProfile {
    /// Smoothed magnitude per bin
    magnitudes: Vec<f32>,
    /// Noise-only frames folded into the profile
    frames_observed: u64,
}

impl NoiseProfile {
    /// Create empty (cold) profile
    pub fn new(num_bins: usize) -> Self {
        Self {
            magnitudes: vec![0.0; num_bins],
            frames_observed: 0,
        }
    }

    /// Magnitude estimate per bin
    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    /// Magnitude estimate of one bin (0.0 out of range)
    pub fn magnitude(&self, bin: usize) -> f32 {
        self.magnitudes.get(bin).copied().unwrap_or(0.0)
    }

    /// Noise-only frames seen so far
    pub fn frames_observed(&self) -> u64 {
        self.frames_observed
    }

    /// True once at least one noise-only frame has been observed
    pub fn is_warm(&self) -> bool {
        self.frames_observed > 0
    }

    /// Fold a noise-only spectrum into the profile, every bin included
    pub fn update(&mut self, spectrum: &[Complex32], smoothing: f32) {
        self.update_gated(spectrum, smoothing, f32::INFINITY);
    }

    /// Fold a noise-only spectrum into the profile, skipping tonal bins
    ///
    /// A bin is skipped when its magnitude reaches both `tonal_floor` and
    /// `TONAL_RATIO` times its current estimate. The first frame seeds the
    /// profile; later frames are smoothed with
    /// `N = lambda * N + (1 - lambda) * |X|`.
    pub fn update_gated(&mut self, spectrum: &[Complex32], smoothing: f32, tonal_floor: f32) {
        debug_assert_eq!(spectrum.len(), self.magnitudes.len());

        let seeding = self.frames_observed == 0;
        let keep = smoothing.clamp(0.0, 1.0);

        for (n, bin) in self.magnitudes.iter_mut().zip(spectrum) {
            let m = bin.norm();
            if m >= tonal_floor.max(TONAL_RATIO * *n) {
                continue;
            }
            *n = if seeding {
                m
            } else {
                keep * *n + (1.0 - keep) * m
            };
        }

        self.frames_observed += 1;
    }

    /// Back to cold start
    pub fn reset(&mut self) {
        self.magnitudes.fill(0.0);
        self.frames_observed = 0;
    }
}

/// Classifies frames and maintains the `NoiseProfile`
#[derive(Debug, Clone)]
pub struct NoiseEstimator {
    /// Current profile
    profile: NoiseProfile,
    /// Long-term minimum frame RMS
    minimum: MinimumTracker,
    /// Profile smoothing factor (lambda)
    smoothing: f32,
    /// Samples in a full frame
    frame_len: usize,
    /// Median scratch
    scratch: Vec<f32>,
}

impl NoiseEstimator {
    /// Create estimator for frames of `window_size` samples
    pub fn new(window_size: usize, smoothing: f32) -> Self {
        let num_bins = window_size / 2 + 1;
        Self {
            profile: NoiseProfile::new(num_bins),
            minimum: MinimumTracker::new(MINIMUM_RISE_PER_FRAME),
            smoothing,
            frame_len: window_size,
            scratch: Vec::with_capacity(num_bins),
        }
    }

    /// Change the smoothing factor without touching the profile
    pub fn set_smoothing(&mut self, smoothing: f32) {
        self.smoothing = smoothing;
    }

    /// Current profile
    pub fn profile(&self) -> &NoiseProfile {
        &self.profile
    }

    /// Running minimum frame RMS
    pub fn noise_floor_rms(&self) -> f32 {
        self.minimum.minimum()
    }

    /// Observe one frame; returns true when it was classified noise-only
    ///
    /// `frame` is the unwindowed time frame, `spectrum` its analysis.
    /// Frames shorter than the window still hold pre-roll padding and are
    /// not observed.
    pub fn observe(&mut self, frame: &[f32], spectrum: &[Complex32]) -> bool {
        if frame.len() < self.frame_len {
            return false;
        }
        let rms = level::rms(frame);
        if rms <= SILENCE_RMS {
            return false;
        }

        let floor = self.minimum.update(rms);
        let is_noise = rms < NOISE_THRESHOLD_RATIO * floor;

        if is_noise {
            let was_warm = self.profile.is_warm();
            let tonal_floor = TONAL_RATIO * self.median_magnitude(spectrum);
            self.profile
                .update_gated(spectrum, self.smoothing, tonal_floor);
            if !was_warm {
                log::debug!("Noise profile warm after first noise-only frame (rms {:.5})", rms);
            }
        }

        is_noise
    }

    /// Back to cold start
    pub fn reset(&mut self) {
        self.profile.reset();
        self.minimum.reset();
    }

    fn median_magnitude(&mut self, spectrum: &[Complex32]) -> f32 {
        self.scratch.clear();
        self.scratch.extend(spectrum.iter().map(|c| c.norm()));
        if self.scratch.is_empty() {
            return 0.0;
        }
        let mid = self.scratch.len() / 2;
        let (_, median, _) = self.scratch.select_nth_unstable_by(mid, f32::total_cmp);
        *median
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stft::{SpectralTransform, WindowKind};
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn flat_spectrum(bins: usize, magnitude: f32) -> Vec<Complex32> {
        vec![Complex32::new(magnitude, 0.0); bins]
    }

    #[test]
    fn test_cold_profile_is_zero() {
        let estimator = NoiseEstimator::new(128, 0.95);
        assert!(!estimator.profile().is_warm());
        assert!(estimator.profile().magnitudes().iter().all(|&m| m == 0.0));
    }

    #[test]
    fn test_first_noise_frame_seeds_profile() {
        let mut estimator = NoiseEstimator::new(128, 0.95);
        let frame = vec![0.01; 128];
        assert!(estimator.observe(&frame, &flat_spectrum(65, 2.0)));
        assert!(estimator.profile().is_warm());
        assert_relative_eq!(estimator.profile().magnitude(10), 2.0);
    }

    #[test]
    fn test_smoothing_update() {
        let mut profile = NoiseProfile::new(4);
        profile.update(&flat_spectrum(4, 1.0), 0.95);
        profile.update(&flat_spectrum(4, 3.0), 0.95);
        // 0.95 * 1.0 + 0.05 * 3.0
        assert_relative_eq!(profile.magnitude(0), 1.1, epsilon = 1e-6);
        assert_eq!(profile.frames_observed(), 2);
    }

    #[test]
    fn test_loud_frames_not_learned() {
        let mut estimator = NoiseEstimator::new(128, 0.95);
        let quiet = vec![0.01; 128];
        let loud = vec![0.5; 128];

        for _ in 0..5 {
            assert!(estimator.observe(&quiet, &flat_spectrum(65, 1.0)));
        }
        // 50x the floor: speech, not noise
        assert!(!estimator.observe(&loud, &flat_spectrum(65, 50.0)));
        assert_relative_eq!(estimator.profile().magnitude(3), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_digital_silence_ignored() {
        let mut estimator = NoiseEstimator::new(128, 0.95);
        assert!(!estimator.observe(&[0.0; 128], &flat_spectrum(65, 0.0)));
        assert!(!estimator.profile().is_warm());
        assert_eq!(estimator.noise_floor_rms(), 0.0);
    }

    #[test]
    fn test_reset_returns_to_cold() {
        let mut estimator = NoiseEstimator::new(128, 0.95);
        estimator.observe(&[0.01; 128], &flat_spectrum(65, 1.0));
        estimator.reset();
        assert!(!estimator.profile().is_warm());
        assert_eq!(estimator.profile().magnitude(0), 0.0);
    }

    #[test]
    fn test_partial_frame_not_observed() {
        let mut estimator = NoiseEstimator::new(128, 0.95);
        assert!(!estimator.observe(&[0.01; 64], &flat_spectrum(65, 1.0)));
        assert!(!estimator.profile().is_warm());
        assert_eq!(estimator.noise_floor_rms(), 0.0);
    }

    #[test]
    fn test_tonal_bin_skipped() {
        let mut profile = NoiseProfile::new(8);
        let mut spectrum = flat_spectrum(8, 1.0);
        spectrum[3] = Complex32::new(40.0, 0.0);

        profile.update_gated(&spectrum, 0.95, TONAL_RATIO * 1.0);
        assert_relative_eq!(profile.magnitude(0), 1.0);
        assert_eq!(profile.magnitude(3), 0.0);

        // Noise bins may rise up to TONAL_RATIO x their own estimate
        let mut louder = flat_spectrum(8, 2.5);
        louder[3] = Complex32::new(40.0, 0.0);
        profile.update_gated(&louder, 0.95, TONAL_RATIO * 2.5);
        assert_relative_eq!(profile.magnitude(0), 0.95 + 0.05 * 2.5, epsilon = 1e-6);
        assert_eq!(profile.magnitude(3), 0.0);
    }

    #[test]
    fn test_steady_tone_stays_out_of_profile() {
        let size = 1024;
        let sample_rate = 16000.0;
        let mut rng = StdRng::seed_from_u64(11);
        let mut transform = SpectralTransform::new(size, WindowKind::Hann);
        let mut spectrum = vec![Complex32::new(0.0, 0.0); transform.num_bins()];
        let mut estimator = NoiseEstimator::new(size, 0.95);

        // Tone on every frame, no noise-only lead-in
        let tone_bin = 28;
        let freq = tone_bin as f32 * sample_rate / size as f32;
        let mut noise_frames = 0;
        for f in 0..40 {
            let frame: Vec<f32> = (0..size)
                .map(|i| {
                    let t = (f * 512 + i) as f32 / sample_rate;
                    0.5 * (2.0 * std::f32::consts::PI * freq * t).sin()
                        + (rng.random::<f32>() - 0.5) * 0.17
                })
                .collect();
            transform.analyze(&frame, &mut spectrum).unwrap();
            if estimator.observe(&frame, &spectrum) {
                noise_frames += 1;
            }
        }

        // Every frame looks alike, so all are noise-only
        assert_eq!(noise_frames, 40);
        let profile = estimator.profile();
        let tone = spectrum[tone_bin].norm();
        assert!(profile.magnitude(tone_bin) < 0.05 * tone);

        // Noise bins learned near their true level
        let noise_level = profile.magnitude(200);
        assert!(noise_level > 0.1 && noise_level < 5.0, "noise bin {}", noise_level);
    }
}
