//! Performance metrics
//!
//! Aggregated per session and snapshotted by value, so readers never hold a
//! reference into the engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Algorithm;

/// Invocation count per algorithm
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmCounts {
    /// Echo cancellation
    pub echo_cancellation: u64,
    /// RMS noise gate
    pub noise_gate: u64,
    /// Spectral subtraction
    pub spectral_subtraction: u64,
    /// Frequency filter
    pub frequency_filter: u64,
    /// Automatic gain control
    pub gain_control: u64,
}

impl AlgorithmCounts {
    fn slot(&mut self, algorithm: Algorithm) -> &mut u64 {
        match algorithm {
            Algorithm::EchoCancellation => &mut self.echo_cancellation,
            Algorithm::NoiseGate => &mut self.noise_gate,
            Algorithm::SpectralSubtraction => &mut self.spectral_subtraction,
            Algorithm::FrequencyFilter => &mut self.frequency_filter,
            Algorithm::GainControl => &mut self.gain_control,
        }
    }

    /// Count one invocation
    pub fn increment(&mut self, algorithm: Algorithm) {
        *self.slot(algorithm) += 1;
    }

    /// Invocations of `algorithm`
    pub fn get(&self, algorithm: Algorithm) -> u64 {
        match algorithm {
            Algorithm::EchoCancellation => self.echo_cancellation,
            Algorithm::NoiseGate => self.noise_gate,
            Algorithm::SpectralSubtraction => self.spectral_subtraction,
            Algorithm::FrequencyFilter => self.frequency_filter,
            Algorithm::GainControl => self.gain_control,
        }
    }
}

/// Session processing statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Chunks processed (fallbacks included)
    pub chunks_processed: u64,
    /// Samples processed, all channels
    pub samples_processed: u64,
    /// Per-algorithm invocation counts
    pub algorithm_invocations: AlgorithmCounts,
    /// Wall-clock time spent processing
    pub total_processing_time: Duration,
    /// Mean processing time per chunk
    pub average_latency: Duration,
    /// Worst processing time per chunk
    pub max_latency: Duration,
    /// Real-time chunks that exceeded their budget
    pub deadline_misses: u64,
    /// Chunks passed through unmodified
    pub fallbacks: u64,
    /// Audio duration processed
    pub audio_duration: Duration,
}

impl PerformanceMetrics {
    /// Fold one chunk into the statistics
    pub fn record_chunk(
        &mut self,
        samples: usize,
        audio_duration: Duration,
        elapsed: Duration,
        applied: &[Algorithm],
    ) {
        self.chunks_processed += 1;
        self.samples_processed += samples as u64;
        self.audio_duration += audio_duration;
        self.total_processing_time += elapsed;
        self.max_latency = self.max_latency.max(elapsed);
        self.average_latency = Duration::from_nanos(
            (self.total_processing_time.as_nanos() / self.chunks_processed as u128) as u64,
        );

        for &algorithm in applied {
            self.algorithm_invocations.increment(algorithm);
        }
    }

    /// Count a missed real-time deadline
    pub fn record_deadline_miss(&mut self) {
        self.deadline_misses += 1;
    }

    /// Count a pass-through fallback
    pub fn record_fallback(&mut self) {
        self.fallbacks += 1;
    }

    /// Processing time over audio time (< 1.0 keeps up with real time)
    pub fn realtime_factor(&self) -> f64 {
        if self.audio_duration.is_zero() {
            return 0.0;
        }
        self.total_processing_time.as_secs_f64() / self.audio_duration.as_secs_f64()
    }

    /// Clear all counters
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
