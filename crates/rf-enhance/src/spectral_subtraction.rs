//! Spectral Subtraction Filter
//!
//! Per bin: `M' = max(M - alpha * N, beta * M)` with the input phase kept.
//! `alpha` over-subtracts to suppress residual noise, `beta` is the spectral
//! floor that keeps isolated bins from turning into musical noise.

use num_complex::Complex32;

use crate::config::EnhancementConfig;
use crate::noise_profile::NoiseProfile;
use crate::{Algorithm, Stage};

/// Magnitude-domain noise subtractor
#[derive(Debug, Clone)]
pub struct SpectralSubtractor {
    /// Effective over-subtraction factor
    alpha: f32,
    /// Spectral floor
    beta: f32,
}

impl SpectralSubtractor {
    /// Create subtractor with an effective alpha and a floor
    pub fn new(alpha: f32, beta: f32) -> Self {
        Self {
            alpha: alpha.max(0.0),
            beta: beta.clamp(0.0, 1.0),
        }
    }

    /// Alpha scaled by `noise_reduction_strength`
    pub fn from_config(config: &EnhancementConfig) -> Self {
        Self::new(config.effective_alpha(), config.spectral_subtraction_beta)
    }

    /// Update parameters from a new configuration
    pub fn apply_config(&mut self, config: &EnhancementConfig) {
        *self = Self::from_config(config);
    }

    /// Effective alpha
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Spectral floor
    pub fn beta(&self) -> f32 {
        self.beta
    }

    /// Output magnitude for input magnitude `m` over noise `n`
    #[inline]
    pub fn subtract(&self, m: f32, n: f32) -> f32 {
        (m - self.alpha * n).max(self.beta * m)
    }

    /// Subtract `noise` from `spectrum` in place (no-op while the profile is cold)
    pub fn process_spectrum(&self, spectrum: &mut [Complex32], noise: &NoiseProfile) {
        if !noise.is_warm() {
            return;
        }

        for (bin, &n) in spectrum.iter_mut().zip(noise.magnitudes()) {
            let m = bin.norm();
            if m <= 0.0 {
                continue;
            }
            // Scaling keeps the phase
            *bin *= self.subtract(m, n) / m;
        }
    }
}

impl Stage for SpectralSubtractor {
    fn algorithm(&self) -> Algorithm {
        Algorithm::SpectralSubtraction
    }

    fn reset(&mut self) {}
}
