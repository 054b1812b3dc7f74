//! Automatic Gain Controller
//!
//! Sliding-window RMS level drives a target gain:
//! - level above threshold: compress to `threshold / level`
//! - level far below threshold (< 25 %): bounded make-up gain
//! - otherwise unity
//!
//! The applied gain follows the target exponentially (attack when falling,
//! release when rising). Peaks are held under 0.98 and the output is clamped
//! to [-1.0, 1.0].

use crate::level;
use crate::{Algorithm, Stage};

/// Level below which the target gain is held (silence / pauses)
const SILENCE_LEVEL: f32 = 1e-4;

/// Make-up gain only applies below this fraction of the threshold
const MAKEUP_REGION: f32 = 0.25;

/// Peak ceiling after gain
const PEAK_CEILING: f32 = 0.98;

/// Windowed-RMS gain controller
#[derive(Debug, Clone)]
pub struct AutoGainControl {
    /// Target RMS level (linear)
    threshold: f32,
    /// Make-up gain ceiling (linear)
    max_gain: f32,
    /// Level window (ms)
    window_ms: f32,
    /// Attack time (ms)
    attack_ms: f32,
    /// Release time (ms)
    release_ms: f32,
    /// Sample rate
    sample_rate: u32,
    /// Squared samples in the level window
    squares: Vec<f32>,
    /// Next write position in `squares`
    write_pos: usize,
    /// Valid entries in `squares`
    filled: usize,
    /// Running sum of `squares`
    sum: f64,
    /// Smoothing coefficient for falling gain
    attack_coeff: f32,
    /// Smoothing coefficient for rising gain
    release_coeff: f32,
    /// Current gain
    gain: f32,
}

impl AutoGainControl {
    /// Create controller
    pub fn new(
        sample_rate: u32,
        threshold: f32,
        max_gain: f32,
        window_ms: f32,
        attack_ms: f32,
        release_ms: f32,
    ) -> Self {
        let mut agc = Self {
            threshold,
            max_gain: max_gain.max(1.0),
            window_ms,
            attack_ms,
            release_ms,
            sample_rate,
            squares: Vec::new(),
            write_pos: 0,
            filled: 0,
            sum: 0.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            gain: 1.0,
        };
        agc.rebuild();
        agc
    }

    fn rebuild(&mut self) {
        let sr = self.sample_rate as f32;
        self.attack_coeff = level::time_coeff(self.attack_ms, sr);
        self.release_coeff = level::time_coeff(self.release_ms, sr);

        let window = level::ms_to_samples(self.window_ms, self.sample_rate);
        if window != self.squares.len() {
            self.squares = vec![0.0; window];
            self.write_pos = 0;
            self.filled = 0;
            self.sum = 0.0;
        }
    }

    /// Change target level and make-up ceiling
    pub fn set_levels(&mut self, threshold: f32, max_gain: f32) {
        self.threshold = threshold;
        self.max_gain = max_gain.max(1.0);
    }

    /// Change window and smoothing times
    pub fn set_times(&mut self, window_ms: f32, attack_ms: f32, release_ms: f32) {
        self.window_ms = window_ms;
        self.attack_ms = attack_ms;
        self.release_ms = release_ms;
        self.rebuild();
    }

    /// Change sample rate
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        if sample_rate != self.sample_rate {
            self.sample_rate = sample_rate;
            self.rebuild();
        }
    }

    /// Current gain
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Current windowed RMS level
    pub fn level(&self) -> f32 {
        if self.filled == 0 {
            return 0.0;
        }
        (self.sum.max(0.0) / self.filled as f64).sqrt() as f32
    }

    /// Level window in samples
    pub fn window_samples(&self) -> usize {
        self.squares.len()
    }

    #[inline]
    fn push_square(&mut self, x: f32) {
        let square = x * x;
        self.sum += square as f64 - self.squares[self.write_pos] as f64;
        self.squares[self.write_pos] = square;
        self.write_pos += 1;
        if self.write_pos == self.squares.len() {
            self.write_pos = 0;
            // Re-sum once per window so rounding never accumulates
            self.sum = self.squares.iter().map(|&s| s as f64).sum();
        }
        self.filled = (self.filled + 1).min(self.squares.len());
    }

    /// Gain the controller is heading for at `level`
    pub fn target_gain(&self, level: f32) -> f32 {
        if level <= SILENCE_LEVEL {
            return self.gain;
        }
        if level > self.threshold {
            return self.threshold / level;
        }
        let makeup_level = MAKEUP_REGION * self.threshold;
        if level < makeup_level {
            return (makeup_level / level).min(self.max_gain);
        }
        1.0
    }

    /// Level `samples` in place
    pub fn process(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            let x = *sample;
            self.push_square(x);

            let target = self.target_gain(self.level());
            let coeff = if target < self.gain {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.gain = target + coeff * (self.gain - target);

            let peak = x.abs();
            let gain = if peak * self.gain > PEAK_CEILING {
                PEAK_CEILING / peak
            } else {
                self.gain
            };

            *sample = (x * gain).clamp(-1.0, 1.0);
        }
    }
}

impl Stage for AutoGainControl {
    fn algorithm(&self) -> Algorithm {
        Algorithm::GainControl
    }

    fn reset(&mut self) {
        self.squares.fill(0.0);
        self.write_pos = 0;
        self.filled = 0;
        self.sum = 0.0;
        self.gain = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::PI;

    fn sine(len: usize, amplitude: f32, freq: f32, sr: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * freq * i as f32 / sr).sin())
            .collect()
    }

    fn default_agc() -> AutoGainControl {
        AutoGainControl::new(16000, 0.3, 4.0, 100.0, 10.0, 200.0)
    }

    #[test]
    fn test_target_gain_regions() {
        let agc = default_agc();
        // Compress
        assert_relative_eq!(agc.target_gain(0.6), 0.5);
        // Unity band
        assert_eq!(agc.target_gain(0.2), 1.0);
        assert_eq!(agc.target_gain(0.075), 1.0);
        // Make-up towards 0.075
        assert_relative_eq!(agc.target_gain(0.05), 1.5, epsilon = 1e-6);
        // Capped
        assert_eq!(agc.target_gain(0.001), 4.0);
        // Silence holds
        assert_eq!(agc.target_gain(0.0), agc.gain());
    }

    #[test]
    fn test_sliding_level() {
        let mut agc = default_agc();
        let mut block = vec![0.5; 1600];
        agc.process(&mut block);
        assert_relative_eq!(agc.level(), 0.5, epsilon = 1e-4);
        assert_eq!(agc.window_samples(), 1600);
    }

    #[test]
    fn test_step_converges_without_clipping() {
        let mut agc = default_agc();

        let mut quiet = sine(8000, 0.05, 440.0, 16000.0);
        agc.process(&mut quiet);
        // Make-up gain engaged
        assert!(agc.gain() > 1.5);

        let mut loud = sine(16000, 0.8, 440.0, 16000.0);
        agc.process(&mut loud);

        assert!(loud.iter().all(|&s| s.abs() < 1.0));
        let settled = level::rms(&loud[12000..]);
        assert_relative_eq!(settled, 0.3, epsilon = 0.02);
    }

    #[test]
    fn test_unity_band_is_transparent() {
        let mut agc = default_agc();
        let input = sine(8000, 0.2, 440.0, 16000.0);
        let mut output = input.clone();
        agc.process(&mut output);
        // rms 0.141 sits between 0.075 and 0.3
        for (y, x) in output[1600..].iter().zip(&input[1600..]) {
            assert_relative_eq!(*y, *x, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_output_bounded_for_full_scale() {
        let mut agc = AutoGainControl::new(16000, 1.0, 4.0, 100.0, 10.0, 200.0);
        let mut square: Vec<f32> = (0..4000).map(|i| if i % 40 < 20 { 1.0 } else { -1.0 }).collect();
        agc.process(&mut square);
        assert!(square.iter().all(|&s| s.abs() <= PEAK_CEILING + 1e-6));
    }

    #[test]
    fn test_silence_stays_silent() {
        let mut agc = default_agc();
        let mut silence = vec![0.0; 4800];
        agc.process(&mut silence);
        assert!(silence.iter().all(|&s| s == 0.0));
        assert_eq!(agc.gain(), 1.0);
    }

    #[test]
    fn test_sample_rate_change_resizes_window() {
        let mut agc = default_agc();
        agc.set_sample_rate(48000);
        assert_eq!(agc.window_samples(), 4800);
    }
}
