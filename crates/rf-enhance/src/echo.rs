//! Echo Canceller
//!
//! Fixed-delay subtraction of the engine's own recent output:
//! `y[n] = x[n] - strength * history[n - delay]`.
//!
//! The delay is not adapted. Cancellation only works when the real echo path
//! delay matches `echo_delay_ms` within a few samples; otherwise the
//! subtraction adds a delayed copy instead of removing one.

use serde::{Deserialize, Serialize};

use crate::level;
use crate::{Algorithm, Stage};

/// Ring of the most recent output samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoHistory {
    /// Storage
    buffer: Vec<f32>,
    /// Next write position
    write_pos: usize,
    /// Valid samples
    filled: usize,
}

impl EchoHistory {
    /// Create history holding up to `capacity` samples
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity.max(1)],
            write_pos: 0,
            filled: 0,
        }
    }

    /// Maximum samples kept
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Samples currently held
    pub fn len(&self) -> usize {
        self.filled
    }

    /// Nothing recorded yet
    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Append one sample, dropping the oldest when full
    #[inline]
    pub fn push(&mut self, sample: f32) {
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
        self.filled = (self.filled + 1).min(self.buffer.len());
    }

    /// Append a block
    pub fn push_slice(&mut self, samples: &[f32]) {
        for &s in samples {
            self.push(s);
        }
    }

    /// Sample `n` positions back (1 = most recent); 0.0 when not recorded
    #[inline]
    pub fn back(&self, n: usize) -> f32 {
        if n == 0 || n > self.filled {
            return 0.0;
        }
        let len = self.buffer.len();
        self.buffer[(self.write_pos + len - n) % len]
    }

    /// Recorded samples, oldest first
    pub fn to_vec(&self) -> Vec<f32> {
        (1..=self.filled).rev().map(|n| self.back(n)).collect()
    }

    /// Change capacity, keeping the most recent samples that still fit
    pub fn resize(&mut self, capacity: usize) {
        let capacity = capacity.max(1);
        if capacity == self.buffer.len() {
            return;
        }
        let keep = self.filled.min(capacity);
        let mut buffer = vec![0.0; capacity];
        for (slot, n) in buffer.iter_mut().zip((1..=keep).rev()) {
            *slot = self.back(n);
        }
        self.buffer = buffer;
        self.write_pos = keep % capacity;
        self.filled = keep;
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
        self.filled = 0;
    }
}

/// Fixed-delay echo suppressor
#[derive(Debug, Clone)]
pub struct EchoCanceller {
    /// Recent output
    history: EchoHistory,
    /// Delay (ms)
    delay_ms: f32,
    /// Delay (samples)
    delay: usize,
    /// Reference scale (0.0 - 1.0)
    strength: f32,
    /// Sample rate
    sample_rate: u32,
}

impl EchoCanceller {
    /// Create canceller
    pub fn new(sample_rate: u32, delay_ms: f32, strength: f32) -> Self {
        let delay = level::ms_to_samples(delay_ms, sample_rate);
        Self {
            history: EchoHistory::new(delay),
            delay_ms,
            delay,
            strength: strength.clamp(0.0, 1.0),
            sample_rate,
        }
    }

    /// Change strength
    pub fn set_strength(&mut self, strength: f32) {
        self.strength = strength.clamp(0.0, 1.0);
    }

    /// Change delay; the most recent history that fits the new delay is kept
    pub fn set_delay_ms(&mut self, delay_ms: f32) {
        self.delay_ms = delay_ms;
        self.delay = level::ms_to_samples(delay_ms, self.sample_rate);
        self.history.resize(self.delay);
    }

    /// Change sample rate; history recorded at the old rate is dropped
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        if sample_rate != self.sample_rate {
            self.sample_rate = sample_rate;
            self.delay = level::ms_to_samples(self.delay_ms, sample_rate);
            self.history = EchoHistory::new(self.delay);
        }
    }

    /// Delay in samples
    pub fn delay_samples(&self) -> usize {
        self.delay
    }

    /// Reference history
    pub fn history(&self) -> &EchoHistory {
        &self.history
    }

    /// Subtract the delayed reference from `samples` in place
    ///
    /// Positions whose reference lies inside the current chunk (not yet
    /// emitted) get no correction; the engine keeps blocks within the delay.
    pub fn process(&mut self, samples: &mut [f32]) {
        if self.strength == 0.0 || self.history.is_empty() {
            return;
        }
        let delay = self.delay;
        for (i, sample) in samples.iter_mut().enumerate().take(delay) {
            *sample -= self.strength * self.history.back(delay - i);
        }
    }

    /// Record the final output of a chunk as future reference
    pub fn record_output(&mut self, output: &[f32]) {
        self.history.push_slice(output);
    }
}

impl Stage for EchoCanceller {
    fn algorithm(&self) -> Algorithm {
        Algorithm::EchoCancellation
    }

    fn reset(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_history_ring() {
        let mut history = EchoHistory::new(4);
        history.push_slice(&[1.0, 2.0, 3.0]);
        assert_eq!(history.back(1), 3.0);
        assert_eq!(history.back(3), 1.0);
        assert_eq!(history.back(4), 0.0);

        history.push_slice(&[4.0, 5.0]);
        assert_eq!(history.len(), 4);
        assert_eq!(history.to_vec(), vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_delay_in_samples() {
        let canceller = EchoCanceller::new(16000, 100.0, 0.5);
        assert_eq!(canceller.delay_samples(), 1600);
        assert_eq!(canceller.history().capacity(), 1600);
    }

    #[test]
    fn test_matching_delay_cancels() {
        // 1 ms at 16 kHz
        let mut canceller = EchoCanceller::new(16000, 1.0, 1.0);
        let emitted: Vec<f32> = (0..16).map(|i| (i as f32 * 0.3).sin()).collect();
        canceller.record_output(&emitted);

        // Echo of the emitted chunk arriving exactly 16 samples later
        let mut captured = emitted.clone();
        canceller.process(&mut captured);
        for s in &captured {
            assert_relative_eq!(*s, 0.0, epsilon = 1e-7);
        }
    }

    #[test]
    fn test_strength_scales_reference() {
        let mut canceller = EchoCanceller::new(16000, 1.0, 0.5);
        canceller.record_output(&[1.0; 16]);
        let mut captured = vec![1.0; 16];
        canceller.process(&mut captured);
        assert!(captured.iter().all(|&s| (s - 0.5).abs() < 1e-7));
    }

    #[test]
    fn test_mismatched_delay_leaves_residual() {
        let mut canceller = EchoCanceller::new(16000, 1.0, 1.0);
        let emitted: Vec<f32> = (0..16).map(|i| (i as f32 * 0.9).sin()).collect();
        canceller.record_output(&emitted);

        // Echo arrives 3 samples later than configured
        let mut captured = vec![0.0; 16];
        captured[3..].copy_from_slice(&emitted[..13]);
        let before = level::rms(&captured);
        canceller.process(&mut captured);
        assert!(level::rms(&captured) > 0.5 * before);
    }

    #[test]
    fn test_positions_past_delay_untouched() {
        let mut canceller = EchoCanceller::new(16000, 1.0, 1.0);
        canceller.record_output(&[1.0; 16]);
        let mut captured = vec![1.0; 40];
        canceller.process(&mut captured);
        assert!(captured[..16].iter().all(|&s| s == 0.0));
        assert!(captured[16..].iter().all(|&s| s == 1.0));
    }

    #[test]
    fn test_empty_history_is_noop() {
        let mut canceller = EchoCanceller::new(16000, 100.0, 1.0);
        let mut captured = vec![0.25; 64];
        canceller.process(&mut captured);
        assert!(captured.iter().all(|&s| s == 0.25));
    }

    #[test]
    fn test_reset_clears_history() {
        let mut canceller = EchoCanceller::new(16000, 1.0, 1.0);
        canceller.record_output(&[1.0; 8]);
        canceller.reset();
        assert!(canceller.history().is_empty());
    }

    #[test]
    fn test_history_resize_keeps_recent() {
        let mut history = EchoHistory::new(4);
        history.push_slice(&[1.0, 2.0, 3.0, 4.0, 5.0]);

        history.resize(2);
        assert_eq!(history.to_vec(), vec![4.0, 5.0]);

        history.resize(6);
        assert_eq!(history.to_vec(), vec![4.0, 5.0]);
        history.push(6.0);
        assert_eq!(history.back(1), 6.0);
        assert_eq!(history.to_vec(), vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_delay_change_keeps_history() {
        let mut canceller = EchoCanceller::new(16000, 2.0, 1.0);
        let emitted: Vec<f32> = (0..32).map(|i| i as f32).collect();
        canceller.record_output(&emitted);

        canceller.set_delay_ms(1.0);
        assert_eq!(canceller.delay_samples(), 16);
        assert_eq!(canceller.history().to_vec(), emitted[16..].to_vec());

        canceller.set_delay_ms(3.0);
        assert_eq!(canceller.history().capacity(), 48);
        assert_eq!(canceller.history().len(), 16);
    }

    #[test]
    fn test_sample_rate_change_drops_history() {
        let mut canceller = EchoCanceller::new(16000, 1.0, 1.0);
        canceller.record_output(&[1.0; 16]);
        canceller.set_sample_rate(48000);
        assert_eq!(canceller.delay_samples(), 48);
        assert!(canceller.history().is_empty());
    }
}
