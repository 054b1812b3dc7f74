//! Sample buffers handed between the engine and its callers

use std::time::Duration;

/// Interleaved audio owned by whichever stage currently holds it
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    /// Samples normalised to [-1.0, 1.0] (interleaved when multi-channel)
    pub samples: Vec<f32>,
    /// Sample rate
    pub sample_rate: u32,
    /// Number of channels
    pub channels: usize,
}

impl SampleBuffer {
    /// Create buffer
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: usize) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Create mono buffer
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(samples, sample_rate, 1)
    }

    /// Samples per channel
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1)
    }

    /// Playback duration
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Empty buffer
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Split interleaved samples into per-channel buffers (reusing their storage)
pub(crate) fn deinterleave_into(samples: &[f32], outputs: &mut [Vec<f32>]) {
    let channels = outputs.len();
    let frames = samples.len() / channels;

    for (ch, out) in outputs.iter_mut().enumerate() {
        out.clear();
        out.extend(samples.iter().skip(ch).step_by(channels).take(frames));
    }
}

/// Interleave per-channel buffers of equal length
pub(crate) fn interleave(inputs: &[Vec<f32>]) -> Vec<f32> {
    let frames = inputs.first().map(|c| c.len()).unwrap_or(0);
    let mut data = Vec::with_capacity(frames * inputs.len());

    for i in 0..frames {
        for ch in inputs {
            data.push(ch.get(i).copied().unwrap_or(0.0));
        }
    }

    data
}
