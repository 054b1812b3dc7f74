//! Enhancement configuration

use serde::{Deserialize, Serialize};

use crate::error::{EnhanceError, EnhanceResult};

/// Smallest supported STFT window
pub const MIN_WINDOW_SIZE: usize = 16;

/// Largest supported STFT window
pub const MAX_WINDOW_SIZE: usize = 32768;

/// Upper bound for the echo canceller delay line
pub const MAX_ECHO_DELAY_MS: f32 = 2000.0;

/// Upper bound for interleaved channels per session
pub const MAX_CHANNELS: usize = 32;

/// Processing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProcessingMode {
    /// Live capture: every chunk has a deadline equal to its duration
    #[default]
    RealTime,
    /// Offline: no deadline
    PostProcessing,
}

/// Immutable enhancement session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementConfig {
    /// Enable noise reduction (RMS gate unless spectral subtraction is on)
    pub enable_noise_reduction: bool,

    /// Enable fixed-delay echo suppression
    pub enable_echo_cancellation: bool,

    /// Enable automatic gain control
    pub enable_auto_gain_control: bool,

    /// Use spectral subtraction for noise reduction
    pub enable_spectral_subtraction: bool,

    /// Enable high-pass / low-pass bin attenuation
    pub enable_frequency_filtering: bool,

    /// Real-time or post-processing
    pub processing_mode: ProcessingMode,

    /// Noise reduction strength (0.0 - 1.0)
    pub noise_reduction_strength: f32,

    /// Echo reference scale (0.0 - 1.0)
    pub echo_cancellation_strength: f32,

    /// AGC target RMS level (0.0 - 1.0, linear)
    pub gain_control_threshold: f32,

    /// Over-subtraction factor (>= 1.0)
    pub spectral_subtraction_alpha: f32,

    /// Spectral floor (0.0 - 1.0)
    pub spectral_subtraction_beta: f32,

    /// High-pass cutoff (Hz), 0 disables
    pub high_pass_cutoff_hz: f32,

    /// Low-pass cutoff (Hz)
    pub low_pass_cutoff_hz: f32,

    /// STFT window size (samples)
    pub window_size: usize,

    /// STFT overlap (samples), hop = window - overlap
    pub overlap_size: usize,

    /// Interleaved channel count
    pub channels: usize,

    /// Echo delay (ms)
    pub echo_delay_ms: f32,

    /// Noise profile smoothing factor (lambda)
    pub noise_smoothing: f32,

    /// RMS gate sub-block length (ms)
    pub gate_block_ms: f32,

    /// AGC level window (ms)
    pub agc_window_ms: f32,

    /// AGC attack time (ms)
    pub agc_attack_ms: f32,

    /// AGC release time (ms)
    pub agc_release_ms: f32,

    /// AGC make-up gain ceiling (linear)
    pub agc_max_gain: f32,

    /// Real-time budget as a fraction of the chunk duration
    pub realtime_budget_ratio: f32,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            enable_noise_reduction: true,
            enable_echo_cancellation: false,
            enable_auto_gain_control: true,
            enable_spectral_subtraction: true,
            enable_frequency_filtering: true,
            processing_mode: ProcessingMode::default(),
            noise_reduction_strength: 0.7,
            echo_cancellation_strength: 0.5,
            gain_control_threshold: 0.3,
            spectral_subtraction_alpha: 2.0,
            spectral_subtraction_beta: 0.01,
            high_pass_cutoff_hz: 80.0,
            low_pass_cutoff_hz: 8000.0,
            window_size: 1024,
            overlap_size: 512,
            channels: 1,
            echo_delay_ms: 100.0,
            noise_smoothing: 0.95,
            gate_block_ms: 10.0,
            agc_window_ms: 100.0,
            agc_attack_ms: 10.0,
            agc_release_ms: 200.0,
            agc_max_gain: 4.0,
            realtime_budget_ratio: 1.0,
        }
    }
}

impl EnhancementConfig {
    /// Every stage disabled (pure STFT round trip)
    pub fn passthrough() -> Self {
        Self {
            enable_noise_reduction: false,
            enable_echo_cancellation: false,
            enable_auto_gain_control: false,
            enable_spectral_subtraction: false,
            enable_frequency_filtering: false,
            ..Default::default()
        }
    }

    /// Low-latency speech preset for live capture
    pub fn realtime_speech() -> Self {
        Self {
            processing_mode: ProcessingMode::RealTime,
            window_size: 512,
            overlap_size: 256,
            high_pass_cutoff_hz: 100.0,
            low_pass_cutoff_hz: 7000.0,
            ..Default::default()
        }
    }

    /// Higher-resolution preset for archived recordings
    pub fn post_processing() -> Self {
        Self {
            processing_mode: ProcessingMode::PostProcessing,
            enable_echo_cancellation: true,
            noise_reduction_strength: 0.8,
            window_size: 2048,
            overlap_size: 1536,
            ..Default::default()
        }
    }

    /// Parse a settings document; missing fields take their defaults
    pub fn from_json(json: &str) -> EnhanceResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| EnhanceError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize for the settings layer
    pub fn to_json(&self) -> EnhanceResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| EnhanceError::Configuration(e.to_string()))
    }

    /// STFT hop (stride between frames)
    #[inline]
    pub fn hop_size(&self) -> usize {
        self.window_size - self.overlap_size
    }

    /// Number of FFT bins per frame
    #[inline]
    pub fn num_bins(&self) -> usize {
        self.window_size / 2 + 1
    }

    /// Effective spectral subtraction factor for the configured strength
    pub fn effective_alpha(&self) -> f32 {
        1.0 + self.noise_reduction_strength * (self.spectral_subtraction_alpha - 1.0)
    }

    /// Whether the RMS gate runs (noise reduction without spectral subtraction)
    pub fn uses_rms_gate(&self) -> bool {
        self.enable_noise_reduction && !self.enable_spectral_subtraction
    }

    /// Whether switching from `self` to `other` requires new frame buffers
    pub fn requires_realloc(&self, other: &Self) -> bool {
        self.window_size != other.window_size
            || self.overlap_size != other.overlap_size
            || self.channels != other.channels
    }

    /// Check all invariants
    pub fn validate(&self) -> EnhanceResult<()> {
        if self.window_size < MIN_WINDOW_SIZE || self.window_size > MAX_WINDOW_SIZE {
            return Err(EnhanceError::Configuration(format!(
                "window_size {} outside {}..={}",
                self.window_size, MIN_WINDOW_SIZE, MAX_WINDOW_SIZE
            )));
        }
        if self.overlap_size >= self.window_size {
            return Err(EnhanceError::Configuration(format!(
                "overlap_size {} must be smaller than window_size {}",
                self.overlap_size, self.window_size
            )));
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(EnhanceError::Configuration(format!(
                "channels {} outside 1..={}",
                self.channels, MAX_CHANNELS
            )));
        }

        check_range("noise_reduction_strength", self.noise_reduction_strength, 0.0, 1.0)?;
        check_range("echo_cancellation_strength", self.echo_cancellation_strength, 0.0, 1.0)?;
        check_range("gain_control_threshold", self.gain_control_threshold, 0.0, 1.0)?;
        check_range("spectral_subtraction_beta", self.spectral_subtraction_beta, 0.0, 1.0)?;
        check_range("noise_smoothing", self.noise_smoothing, 0.0, 0.9999)?;

        if !self.spectral_subtraction_alpha.is_finite() || self.spectral_subtraction_alpha < 1.0 {
            return Err(EnhanceError::Configuration(format!(
                "spectral_subtraction_alpha {} must be >= 1.0",
                self.spectral_subtraction_alpha
            )));
        }

        if !self.high_pass_cutoff_hz.is_finite() || self.high_pass_cutoff_hz < 0.0 {
            return Err(EnhanceError::Configuration(format!(
                "high_pass_cutoff_hz {} must be >= 0",
                self.high_pass_cutoff_hz
            )));
        }
        if !self.low_pass_cutoff_hz.is_finite() || self.low_pass_cutoff_hz <= self.high_pass_cutoff_hz {
            return Err(EnhanceError::Configuration(format!(
                "low_pass_cutoff_hz {} must exceed high_pass_cutoff_hz {}",
                self.low_pass_cutoff_hz, self.high_pass_cutoff_hz
            )));
        }

        check_range("echo_delay_ms", self.echo_delay_ms, 0.0, MAX_ECHO_DELAY_MS)?;
        check_positive("echo_delay_ms", self.echo_delay_ms)?;
        check_positive("gate_block_ms", self.gate_block_ms)?;
        check_positive("agc_window_ms", self.agc_window_ms)?;
        check_positive("agc_attack_ms", self.agc_attack_ms)?;
        check_positive("agc_release_ms", self.agc_release_ms)?;
        check_positive("realtime_budget_ratio", self.realtime_budget_ratio)?;

        if !self.agc_max_gain.is_finite() || self.agc_max_gain < 1.0 {
            return Err(EnhanceError::Configuration(format!(
                "agc_max_gain {} must be >= 1.0",
                self.agc_max_gain
            )));
        }

        Ok(())
    }
}

fn check_range(name: &str, value: f32, min: f32, max: f32) -> EnhanceResult<()> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(EnhanceError::Configuration(format!(
            "{name} {value} outside {min}..={max}"
        )))
    }
}

fn check_positive(name: &str, value: f32) -> EnhanceResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(EnhanceError::Configuration(format!("{name} {value} must be > 0")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_valid() {
        let config = EnhancementConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.hop_size(), 512);
        assert_eq!(config.num_bins(), 513);
    }

    #[test]
    fn test_presets_valid() {
        assert!(EnhancementConfig::realtime_speech().validate().is_ok());
        assert!(EnhancementConfig::post_processing().validate().is_ok());
        assert!(EnhancementConfig::passthrough().validate().is_ok());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_window() {
        let config = EnhancementConfig {
            window_size: 512,
            overlap_size: 512,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(EnhanceError::Configuration(_))));
    }

    #[test]
    fn test_cutoff_ordering() {
        let config = EnhancementConfig {
            high_pass_cutoff_hz: 4000.0,
            low_pass_cutoff_hz: 4000.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EnhancementConfig {
            high_pass_cutoff_hz: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_strength_range() {
        let config = EnhancementConfig {
            noise_reduction_strength: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EnhancementConfig {
            echo_cancellation_strength: f32::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_alpha_below_one_rejected() {
        let config = EnhancementConfig {
            spectral_subtraction_alpha: 0.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_effective_alpha_scales_with_strength() {
        let mut config = EnhancementConfig {
            spectral_subtraction_alpha: 3.0,
            noise_reduction_strength: 0.0,
            ..Default::default()
        };
        assert_eq!(config.effective_alpha(), 1.0);
        config.noise_reduction_strength = 1.0;
        assert_eq!(config.effective_alpha(), 3.0);
        config.noise_reduction_strength = 0.5;
        assert_eq!(config.effective_alpha(), 2.0);
    }

    #[test]
    fn test_json_partial_document() {
        let config = EnhancementConfig::from_json(
            r#"{ "window_size": 2048, "overlap_size": 1024, "processing_mode": "PostProcessing" }"#,
        )
        .unwrap();
        assert_eq!(config.window_size, 2048);
        assert_eq!(config.processing_mode, ProcessingMode::PostProcessing);
        assert_eq!(config.spectral_subtraction_alpha, 2.0);

        let json = config.to_json().unwrap();
        assert_eq!(EnhancementConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_json_invalid_document() {
        let result = EnhancementConfig::from_json(r#"{ "window_size": 256, "overlap_size": 300 }"#);
        assert!(matches!(result, Err(EnhanceError::Configuration(_))));

        let result = EnhancementConfig::from_json("not json");
        assert!(matches!(result, Err(EnhanceError::Configuration(_))));
    }

    #[test]
    fn test_requires_realloc() {
        let a = EnhancementConfig::default();
        let b = EnhancementConfig {
            noise_reduction_strength: 0.2,
            ..a.clone()
        };
        assert!(!a.requires_realloc(&b));

        let c = EnhancementConfig {
            window_size: 2048,
            ..a.clone()
        };
        assert!(a.requires_realloc(&c));
    }
}
