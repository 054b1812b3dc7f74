//! Frequency-Domain Filter
//!
//! High-pass / low-pass attenuation applied to STFT bins. Bin frequency is
//! `bin * sample_rate / window_size`; the stop-bands are reached through a
//! raised-cosine taper instead of a hard edge to avoid ringing.

use std::f32::consts::PI;

use num_complex::Complex32;

use crate::{Algorithm, Stage};

/// Transition width as a fraction of the cutoff
const TRANSITION_RATIO: f32 = 0.1;

/// Minimum transition width in bins
const MIN_TRANSITION_BINS: f32 = 2.0;

/// Per-bin gain table for a high-pass / low-pass pair
#[derive(Debug, Clone)]
pub struct FrequencyFilter {
    /// Gain per bin
    gains: Vec<f32>,
    /// STFT window size
    window_size: usize,
    /// Sample rate
    sample_rate: u32,
    /// High-pass cutoff (Hz), 0 disables
    high_pass_hz: f32,
    /// Low-pass cutoff (Hz)
    low_pass_hz: f32,
}

impl FrequencyFilter {
    /// Create filter for `window_size`-sample frames
    pub fn new(window_size: usize, sample_rate: u32, high_pass_hz: f32, low_pass_hz: f32) -> Self {
        let mut filter = Self {
            gains: vec![1.0; window_size / 2 + 1],
            window_size,
            sample_rate,
            high_pass_hz,
            low_pass_hz,
        };
        filter.update_gains();
        filter
    }

    /// Change cutoffs
    pub fn set_cutoffs(&mut self, high_pass_hz: f32, low_pass_hz: f32) {
        if high_pass_hz != self.high_pass_hz || low_pass_hz != self.low_pass_hz {
            self.high_pass_hz = high_pass_hz;
            self.low_pass_hz = low_pass_hz;
            self.update_gains();
        }
    }

    /// Change sample rate
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        if sample_rate != self.sample_rate {
            self.sample_rate = sample_rate;
            self.update_gains();
        }
    }

    /// Gain per bin
    pub fn gains(&self) -> &[f32] {
        &self.gains
    }

    /// Centre frequency of `bin`
    pub fn bin_frequency(&self, bin: usize) -> f32 {
        bin as f32 * self.sample_rate as f32 / self.window_size as f32
    }

    /// Filter gain at `freq_hz`
    pub fn gain_at(&self, freq_hz: f32) -> f32 {
        let bin_width = self.sample_rate as f32 / self.window_size as f32;
        let nyquist = self.sample_rate as f32 * 0.5;
        high_pass_gain(freq_hz, self.high_pass_hz, bin_width)
            * low_pass_gain(freq_hz, self.low_pass_hz, bin_width, nyquist)
    }

    fn update_gains(&mut self) {
        for bin in 0..self.gains.len() {
            self.gains[bin] = self.gain_at(self.bin_frequency(bin));
        }
    }

    /// Attenuate `spectrum` in place
    pub fn process_spectrum(&self, spectrum: &mut [Complex32]) {
        for (bin, &gain) in spectrum.iter_mut().zip(&self.gains) {
            *bin *= gain;
        }
    }
}

impl Stage for FrequencyFilter {
    fn algorithm(&self) -> Algorithm {
        Algorithm::FrequencyFilter
    }

    fn reset(&mut self) {}
}

fn transition_width(cutoff: f32, bin_width: f32) -> f32 {
    (MIN_TRANSITION_BINS * bin_width).max(TRANSITION_RATIO * cutoff)
}

/// Unity at and above the cutoff, zero below `cutoff - width`
fn high_pass_gain(freq: f32, cutoff: f32, bin_width: f32) -> f32 {
    if cutoff <= 0.0 || freq >= cutoff {
        return 1.0;
    }
    let start = (cutoff - transition_width(cutoff, bin_width)).max(0.0);
    if freq <= start {
        return 0.0;
    }
    let t = (freq - start) / (cutoff - start);
    0.5 * (1.0 - (PI * t).cos())
}

/// Unity at and below the cutoff, zero above `cutoff + width`
fn low_pass_gain(freq: f32, cutoff: f32, bin_width: f32, nyquist: f32) -> f32 {
    if cutoff >= nyquist || freq <= cutoff {
        return 1.0;
    }
    let width = transition_width(cutoff, bin_width);
    if freq >= cutoff + width {
        return 0.0;
    }
    let t = (freq - cutoff) / width;
    0.5 * (1.0 + (PI * t).cos())
}
