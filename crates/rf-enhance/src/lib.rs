//! ReelForge Audio Enhancement Engine
//!
//! STFT-based cleanup of raw capture audio before transcription or archival:
//!
//! ## Echo Cancellation
//! - Fixed-delay subtraction of the engine's own recent output
//!
//! ## Noise Reduction
//! - Adaptive noise profile learned from noise-only frames
//! - Spectral subtraction with over-subtraction and spectral floor
//! - RMS noise gate with cross-faded gain ramps (time-domain fallback)
//!
//! ## Frequency Filtering
//! - High-pass / low-pass bin attenuation with raised-cosine roll-off
//!
//! ## Automatic Gain Control
//! - Sliding-window RMS leveller with attack/release smoothing
//!
//! Stages run in a fixed order (echo → noise → filter → AGC); the
//! frequency-domain stages share a single STFT pass per frame.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rf_enhance::{EnhancementConfig, EnhancementEngine};
//!
//! let mut engine = EnhancementEngine::with_config(EnhancementConfig::realtime_speech())?;
//! let result = engine.process_audio(&chunk, 16000)?;
//! transcriber.feed(&result.samples);
//! ```

#![warn(missing_docs)]

pub mod agc;
pub mod buffer;
pub mod config;
pub mod echo;
pub mod engine;
pub mod filter;
pub mod metrics;
pub mod noise_gate;
pub mod noise_profile;
pub mod preview;
pub mod spectral_subtraction;
pub mod stft;
pub mod stream;

mod chain;
mod error;
mod level;

pub use buffer::SampleBuffer;
pub use config::{EnhancementConfig, ProcessingMode};
pub use engine::{EngineState, EnhancementEngine};
pub use error::{EnhanceError, EnhanceResult};
pub use metrics::PerformanceMetrics;
pub use noise_profile::NoiseProfile;
pub use stream::EnhancementStream;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sample rate assumed until the first chunk says otherwise
pub const DEFAULT_SAMPLE_RATE: u32 = 16000;

/// Enhancement algorithms, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    /// Fixed-delay echo suppression
    EchoCancellation,
    /// Time-domain RMS noise gate
    NoiseGate,
    /// Frequency-domain spectral subtraction
    SpectralSubtraction,
    /// High-pass / low-pass bin attenuation
    FrequencyFilter,
    /// Automatic gain control
    GainControl,
}

impl Algorithm {
    /// All algorithms in the order the pipeline applies them
    pub const PIPELINE_ORDER: [Algorithm; 5] = [
        Algorithm::EchoCancellation,
        Algorithm::NoiseGate,
        Algorithm::SpectralSubtraction,
        Algorithm::FrequencyFilter,
        Algorithm::GainControl,
    ];

    /// Display name
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::EchoCancellation => "Echo Cancellation",
            Algorithm::NoiseGate => "Noise Gate",
            Algorithm::SpectralSubtraction => "Spectral Subtraction",
            Algorithm::FrequencyFilter => "Frequency Filter",
            Algorithm::GainControl => "Automatic Gain Control",
        }
    }

    /// Runs inside the shared STFT pass
    pub fn is_spectral(self) -> bool {
        matches!(
            self,
            Algorithm::SpectralSubtraction | Algorithm::FrequencyFilter
        )
    }

    /// Whether `config` enables this algorithm
    pub fn is_enabled(self, config: &EnhancementConfig) -> bool {
        match self {
            Algorithm::EchoCancellation => config.enable_echo_cancellation,
            Algorithm::NoiseGate => config.uses_rms_gate(),
            Algorithm::SpectralSubtraction => config.enable_spectral_subtraction,
            Algorithm::FrequencyFilter => config.enable_frequency_filtering,
            Algorithm::GainControl => config.enable_auto_gain_control,
        }
    }

    /// Enabled algorithms of `config`, in pipeline order
    pub fn enabled(config: &EnhancementConfig) -> Vec<Algorithm> {
        Self::PIPELINE_ORDER
            .into_iter()
            .filter(|a| a.is_enabled(config))
            .collect()
    }
}

/// Common interface of the enhancement stages
pub trait Stage: Send {
    /// Algorithm implemented by this stage
    fn algorithm(&self) -> Algorithm;

    /// Clear runtime state, keep parameters
    fn reset(&mut self);

    /// Delay added by the stage in samples
    fn latency_samples(&self) -> usize {
        0
    }
}

/// Non-fatal per-chunk problem; the chunk was passed through unmodified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProcessingWarning {
    /// Real-time budget exceeded
    ProcessingTimeout {
        /// Time spent on the chunk
        elapsed: Duration,
        /// Budget for the chunk
        budget: Duration,
    },
    /// Transform failure or non-finite output
    NumericInstability(String),
}

/// Output of one enhancement call
#[derive(Debug, Clone, PartialEq)]
pub struct EnhancementResult {
    /// Enhanced samples (interleaved for multi-channel sessions)
    pub samples: Vec<f32>,
    /// Sample rate
    pub sample_rate: u32,
    /// Number of channels
    pub channels: usize,
    /// Algorithms applied, in pipeline order (empty on fallback)
    pub applied: Vec<Algorithm>,
    /// Wall-clock processing time
    pub processing_time: Duration,
    /// Delay of `samples` relative to the input, per channel
    pub delay_samples: usize,
    /// Set when the chunk fell back to pass-through
    pub warning: Option<ProcessingWarning>,
}

impl EnhancementResult {
    /// Whether the chunk fell back to pass-through
    pub fn is_fallback(&self) -> bool {
        self.warning.is_some()
    }

    /// Convert into an owned sample buffer
    pub fn into_buffer(self) -> SampleBuffer {
        SampleBuffer::new(self.samples, self.sample_rate, self.channels)
    }
}
