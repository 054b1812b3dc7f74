//! Single-algorithm preview calls
//!
//! Each call runs one stage over a whole recording in a fresh mono session
//! (post-processing mode, no deadline) and returns output aligned with the
//! input. Used by the settings UI to audition one algorithm at a time.

use serde::{Deserialize, Serialize};

use crate::config::{EnhancementConfig, ProcessingMode};
use crate::engine::EnhancementEngine;
use crate::error::EnhanceResult;
use crate::EnhancementResult;

/// RMS gate parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseGateParams {
    /// Reduction strength (0.0 - 1.0)
    pub strength: f32,
    /// Sub-block length (ms)
    pub block_ms: f32,
}

impl Default for NoiseGateParams {
    fn default() -> Self {
        Self {
            strength: 0.7,
            block_ms: 10.0,
        }
    }
}

/// Spectral subtraction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralSubtractionParams {
    /// Reduction strength (0.0 - 1.0)
    pub strength: f32,
    /// Over-subtraction factor
    pub alpha: f32,
    /// Spectral floor
    pub beta: f32,
    /// STFT window size
    pub window_size: usize,
    /// STFT overlap
    pub overlap_size: usize,
}

impl Default for SpectralSubtractionParams {
    fn default() -> Self {
        Self {
            strength: 0.7,
            alpha: 2.0,
            beta: 0.01,
            window_size: 1024,
            overlap_size: 512,
        }
    }
}

/// Echo canceller parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoParams {
    /// Echo delay (ms)
    pub delay_ms: f32,
    /// Reference scale (0.0 - 1.0)
    pub strength: f32,
}

impl Default for EchoParams {
    fn default() -> Self {
        Self {
            delay_ms: 100.0,
            strength: 0.5,
        }
    }
}

/// AGC parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GainParams {
    /// Target RMS level
    pub threshold: f32,
    /// Make-up gain ceiling
    pub max_gain: f32,
    /// Level window (ms)
    pub window_ms: f32,
    /// Attack (ms)
    pub attack_ms: f32,
    /// Release (ms)
    pub release_ms: f32,
}

impl Default for GainParams {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            max_gain: 4.0,
            window_ms: 100.0,
            attack_ms: 10.0,
            release_ms: 200.0,
        }
    }
}

/// Frequency filter parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterParams {
    /// High-pass cutoff (Hz), 0 disables
    pub high_pass_hz: f32,
    /// Low-pass cutoff (Hz)
    pub low_pass_hz: f32,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            high_pass_hz: 80.0,
            low_pass_hz: 8000.0,
        }
    }
}

fn preview_config() -> EnhancementConfig {
    EnhancementConfig {
        processing_mode: ProcessingMode::PostProcessing,
        channels: 1,
        ..EnhancementConfig::passthrough()
    }
}

fn run(config: EnhancementConfig, samples: &[f32], sample_rate: u32) -> EnhanceResult<EnhancementResult> {
    let mut engine = EnhancementEngine::with_config(config)?;
    engine.process_offline(samples, sample_rate)
}

/// Time-domain noise reduction only
pub fn apply_noise_gate(
    samples: &[f32],
    sample_rate: u32,
    params: &NoiseGateParams,
) -> EnhanceResult<EnhancementResult> {
    let config = EnhancementConfig {
        enable_noise_reduction: true,
        noise_reduction_strength: params.strength,
        gate_block_ms: params.block_ms,
        ..preview_config()
    };
    run(config, samples, sample_rate)
}

/// Spectral subtraction only
pub fn apply_spectral_subtraction(
    samples: &[f32],
    sample_rate: u32,
    params: &SpectralSubtractionParams,
) -> EnhanceResult<EnhancementResult> {
    let config = EnhancementConfig {
        enable_noise_reduction: true,
        enable_spectral_subtraction: true,
        noise_reduction_strength: params.strength,
        spectral_subtraction_alpha: params.alpha,
        spectral_subtraction_beta: params.beta,
        window_size: params.window_size,
        overlap_size: params.overlap_size,
        ..preview_config()
    };
    run(config, samples, sample_rate)
}

/// Echo cancellation only
pub fn apply_echo_cancellation(
    samples: &[f32],
    sample_rate: u32,
    params: &EchoParams,
) -> EnhanceResult<EnhancementResult> {
    let config = EnhancementConfig {
        enable_echo_cancellation: true,
        echo_delay_ms: params.delay_ms,
        echo_cancellation_strength: params.strength,
        ..preview_config()
    };
    run(config, samples, sample_rate)
}

/// Automatic gain control only
pub fn apply_gain_control(
    samples: &[f32],
    sample_rate: u32,
    params: &GainParams,
) -> EnhanceResult<EnhancementResult> {
    let config = EnhancementConfig {
        enable_auto_gain_control: true,
        gain_control_threshold: params.threshold,
        agc_max_gain: params.max_gain,
        agc_window_ms: params.window_ms,
        agc_attack_ms: params.attack_ms,
        agc_release_ms: params.release_ms,
        ..preview_config()
    };
    run(config, samples, sample_rate)
}

/// High-pass / low-pass filtering only
pub fn apply_frequency_filter(
    samples: &[f32],
    sample_rate: u32,
    params: &FilterParams,
) -> EnhanceResult<EnhancementResult> {
    let config = EnhancementConfig {
        enable_frequency_filtering: true,
        high_pass_cutoff_hz: params.high_pass_hz,
        low_pass_cutoff_hz: params.low_pass_hz,
        ..preview_config()
    };
    run(config, samples, sample_rate)
}
