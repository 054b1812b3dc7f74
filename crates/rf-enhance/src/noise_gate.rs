//! RMS Noise Gate
//!
//! Time-domain noise reduction used when spectral subtraction is off.
//! Audio is measured in short sub-blocks; a sub-block quieter than
//! `floor * (1 + strength)` pulls the gain down to `1 - 0.9 * strength`,
//! anything louder pulls it back to unity. Gain moves linearly across the
//! following sub-block, so the gate never switches hard.

use crate::level::{self, MinimumTracker};
use crate::{Algorithm, Stage};

/// Per-block rise of the floor towards louder blocks
const FLOOR_RISE_PER_BLOCK: f32 = 0.002;

/// Attenuation depth at full strength
const MAX_DEPTH: f32 = 0.9;

/// Blocks at or below this RMS are digital silence
const SILENCE_RMS: f32 = 1e-9;

/// Adaptive sub-block RMS gate
#[derive(Debug, Clone)]
pub struct NoiseGate {
    /// Noise reduction strength (0.0 - 1.0)
    strength: f32,
    /// Sub-block length (ms)
    block_ms: f32,
    /// Sub-block length (samples)
    block_len: usize,
    /// Sample rate
    sample_rate: u32,
    /// Sum of squares in the current sub-block
    block_energy: f32,
    /// Samples accumulated in the current sub-block
    block_fill: usize,
    /// Running noise floor
    floor: MinimumTracker,
    /// Current gain
    gain: f32,
    /// Gain the ramp is heading for
    target: f32,
    /// Gain increment per sample
    step: f32,
}

impl NoiseGate {
    /// Create gate
    pub fn new(sample_rate: u32, block_ms: f32, strength: f32) -> Self {
        Self {
            strength: strength.clamp(0.0, 1.0),
            block_ms,
            block_len: level::ms_to_samples(block_ms, sample_rate),
            sample_rate,
            block_energy: 0.0,
            block_fill: 0,
            floor: MinimumTracker::new(FLOOR_RISE_PER_BLOCK),
            gain: 1.0,
            target: 1.0,
            step: 0.0,
        }
    }

    /// Change strength (takes effect at the next sub-block decision)
    pub fn set_strength(&mut self, strength: f32) {
        self.strength = strength.clamp(0.0, 1.0);
    }

    /// Change sub-block length
    pub fn set_block_ms(&mut self, block_ms: f32) {
        if block_ms != self.block_ms {
            self.block_ms = block_ms;
            self.resize();
        }
    }

    /// Change sample rate
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        if sample_rate != self.sample_rate {
            self.sample_rate = sample_rate;
            self.resize();
        }
    }

    fn resize(&mut self) {
        self.block_len = level::ms_to_samples(self.block_ms, self.sample_rate);
        self.block_energy = 0.0;
        self.block_fill = 0;
    }

    /// Sub-block length in samples
    pub fn block_len(&self) -> usize {
        self.block_len
    }

    /// Current gain
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Running noise floor (RMS)
    pub fn noise_floor(&self) -> f32 {
        self.floor.minimum()
    }

    /// Gain applied to sub-blocks classified as noise
    pub fn attenuated_gain(&self) -> f32 {
        1.0 - MAX_DEPTH * self.strength
    }

    /// Gate `samples` in place
    pub fn process(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            let x = *sample;
            self.block_energy += x * x;
            self.block_fill += 1;

            if self.gain != self.target {
                self.gain += self.step;
                if (self.step > 0.0 && self.gain > self.target)
                    || (self.step < 0.0 && self.gain < self.target)
                {
                    self.gain = self.target;
                }
            }
            *sample = x * self.gain;

            if self.block_fill == self.block_len {
                self.finish_block();
            }
        }
    }

    fn finish_block(&mut self) {
        let rms = (self.block_energy / self.block_fill as f32).sqrt();
        self.block_energy = 0.0;
        self.block_fill = 0;

        if rms <= SILENCE_RMS {
            return;
        }

        let floor = self.floor.update(rms);
        let threshold = floor * (1.0 + self.strength);

        self.target = if rms < threshold {
            self.attenuated_gain()
        } else {
            1.0
        };
        self.step = (self.target - self.gain) / self.block_len as f32;
    }
}

impl Stage for NoiseGate {
    fn algorithm(&self) -> Algorithm {
        Algorithm::NoiseGate
    }

    fn reset(&mut self) {
        self.block_energy = 0.0;
        self.block_fill = 0;
        self.floor.reset();
        self.gain = 1.0;
        self.target = 1.0;
        self.step = 0.0;
    }
}
