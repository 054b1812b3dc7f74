//! Level measurement helpers shared by the stages

/// RMS of a block (0.0 for an empty block)
#[inline]
pub fn rms(block: &[f32]) -> f32 {
    if block.is_empty() {
        return 0.0;
    }
    let sum: f32 = block.iter().map(|x| x * x).sum();
    (sum / block.len() as f32).sqrt()
}

/// One-pole smoothing coefficient for a time constant
///
/// Used as `state = target + coeff * (state - target)`.
#[inline]
pub fn time_coeff(time_ms: f32, sample_rate: f32) -> f32 {
    let samples = time_ms * 0.001 * sample_rate;
    if samples <= 0.0 {
        0.0
    } else {
        (-1.0 / samples).exp()
    }
}

/// Samples covered by a duration, at least one
#[inline]
pub fn ms_to_samples(ms: f32, sample_rate: u32) -> usize {
    ((ms * 0.001 * sample_rate as f32).round() as usize).max(1)
}

/// Long-term running minimum
///
/// Falls to any lower observation immediately and creeps back up towards
/// higher observations at `rise` per update.
#[derive(Debug, Clone)]
pub struct MinimumTracker {
    minimum: f32,
    rise: f32,
    primed: bool,
}

impl MinimumTracker {
    /// Create tracker with a per-update rise rate (0.0 - 1.0)
    pub fn new(rise: f32) -> Self {
        Self {
            minimum: 0.0,
            rise: rise.clamp(0.0, 1.0),
            primed: false,
        }
    }

    /// Feed one observation, returns the updated minimum
    pub fn update(&mut self, value: f32) -> f32 {
        if !self.primed {
            self.minimum = value;
            self.primed = true;
        } else if value < self.minimum {
            self.minimum = value;
        } else {
            self.minimum += self.rise * (value - self.minimum);
        }
        self.minimum
    }

    /// Current minimum (0.0 before the first observation)
    pub fn minimum(&self) -> f32 {
        self.minimum
    }

    /// Forget all observations
    pub fn reset(&mut self) {
        self.minimum = 0.0;
        self.primed = false;
    }
}
