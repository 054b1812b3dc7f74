//! Per-channel processing chain
//!
//! Echo and the RMS gate run on the raw chunk, spectral subtraction and the
//! frequency filter share one STFT pass, AGC runs on the reconstructed
//! output. A dry delay line keeps the unprocessed input aligned with the
//! processed output for pass-through fallback.

use std::collections::VecDeque;

use crate::agc::AutoGainControl;
use crate::config::EnhancementConfig;
use crate::echo::{EchoCanceller, EchoHistory};
use crate::error::EnhanceResult;
use crate::filter::FrequencyFilter;
use crate::noise_gate::NoiseGate;
use crate::noise_profile::{NoiseEstimator, NoiseProfile};
use crate::spectral_subtraction::SpectralSubtractor;
use crate::stft::StftProcessor;
use crate::Stage;

/// Processing state of one channel
pub(crate) struct ChannelChain {
    stft: StftProcessor,
    estimator: NoiseEstimator,
    subtractor: SpectralSubtractor,
    filter: FrequencyFilter,
    gate: NoiseGate,
    echo: EchoCanceller,
    agc: AutoGainControl,
    /// Input delayed by the STFT latency
    dry: VecDeque<f32>,
    /// Time-domain pre-processing buffer
    work: Vec<f32>,
    sample_rate: u32,
}

impl ChannelChain {
    pub fn new(config: &EnhancementConfig, sample_rate: u32) -> Self {
        let stft = StftProcessor::new(config.window_size, config.hop_size());
        let latency = stft.latency_samples();

        Self {
            estimator: NoiseEstimator::new(config.window_size, config.noise_smoothing),
            subtractor: SpectralSubtractor::from_config(config),
            filter: FrequencyFilter::new(
                config.window_size,
                sample_rate,
                config.high_pass_cutoff_hz,
                config.low_pass_cutoff_hz,
            ),
            gate: NoiseGate::new(sample_rate, config.gate_block_ms, config.noise_reduction_strength),
            echo: EchoCanceller::new(
                sample_rate,
                config.echo_delay_ms,
                config.echo_cancellation_strength,
            ),
            agc: AutoGainControl::new(
                sample_rate,
                config.gain_control_threshold,
                config.agc_max_gain,
                config.agc_window_ms,
                config.agc_attack_ms,
                config.agc_release_ms,
            ),
            dry: std::iter::repeat_n(0.0, latency).collect(),
            work: Vec::new(),
            stft,
            sample_rate,
        }
    }

    /// Run one chunk; `output` gets the processed signal, `dry_out` the
    /// input delayed by the same latency
    pub fn process(
        &mut self,
        input: &[f32],
        output: &mut [f32],
        dry_out: &mut [f32],
        config: &EnhancementConfig,
    ) -> EnhanceResult<()> {
        for (dry, &x) in dry_out.iter_mut().zip(input) {
            self.dry.push_back(x);
            *dry = self.dry.pop_front().unwrap_or(0.0);
        }

        self.work.clear();
        self.work.extend_from_slice(input);

        if config.enable_echo_cancellation {
            self.echo.process(&mut self.work);
        }
        if config.uses_rms_gate() {
            self.gate.process(&mut self.work);
        }

        let subtract = config.enable_spectral_subtraction;
        let filtering = config.enable_frequency_filtering;

        let Self {
            stft,
            estimator,
            subtractor,
            filter,
            work,
            ..
        } = self;

        let result = stft.process(work, output, |frame, spectrum| {
            // Profile keeps learning even while subtraction is off
            estimator.observe(frame, spectrum);
            if subtract {
                subtractor.process_spectrum(spectrum, estimator.profile());
            }
            if filtering {
                filter.process_spectrum(spectrum);
            }
        });

        if config.enable_auto_gain_control {
            self.agc.process(output);
        }

        result
    }

    /// Feed the chunk's final output into the echo reference
    pub fn record_output(&mut self, output: &[f32]) {
        self.echo.record_output(output);
    }

    /// Pick up parameter changes that need no reallocation
    pub fn apply_config(&mut self, config: &EnhancementConfig) {
        self.estimator.set_smoothing(config.noise_smoothing);
        self.subtractor.apply_config(config);
        self.filter
            .set_cutoffs(config.high_pass_cutoff_hz, config.low_pass_cutoff_hz);
        self.gate.set_strength(config.noise_reduction_strength);
        self.gate.set_block_ms(config.gate_block_ms);
        self.echo.set_strength(config.echo_cancellation_strength);
        self.echo.set_delay_ms(config.echo_delay_ms);
        self.agc
            .set_levels(config.gain_control_threshold, config.agc_max_gain);
        self.agc.set_times(
            config.agc_window_ms,
            config.agc_attack_ms,
            config.agc_release_ms,
        );
    }

    /// Re-size time-based state for a new sample rate
    ///
    /// The noise profile is dropped: its bins now map to other frequencies.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        if sample_rate == self.sample_rate {
            return;
        }
        self.sample_rate = sample_rate;
        self.filter.set_sample_rate(sample_rate);
        self.gate.set_sample_rate(sample_rate);
        self.echo.set_sample_rate(sample_rate);
        self.agc.set_sample_rate(sample_rate);
        self.estimator.reset();
    }

    /// Clear all runtime state, keep parameters
    pub fn reset(&mut self) {
        self.stft.reset();
        self.reset_stages();

        let latency = self.latency_samples();
        self.dry.clear();
        self.dry.extend(std::iter::repeat_n(0.0, latency));
    }

    /// Recover from a numeric failure without dropping in-flight audio
    ///
    /// Learned state and stage state start over; frame and dry-line samples
    /// are kept, with any non-finite values zeroed.
    pub fn recover(&mut self) {
        self.reset_stages();
        self.stft.scrub_non_finite();
        for sample in self.dry.iter_mut().filter(|s| !s.is_finite()) {
            *sample = 0.0;
        }
    }

    fn reset_stages(&mut self) {
        self.estimator.reset();

        let stages: [&mut dyn Stage; 5] = [
            &mut self.echo,
            &mut self.gate,
            &mut self.subtractor,
            &mut self.filter,
            &mut self.agc,
        ];
        for stage in stages {
            stage.reset();
        }
    }

    /// Echo delay in samples
    pub fn echo_delay_samples(&self) -> usize {
        self.echo.delay_samples()
    }

    /// Delay between input and output
    pub fn latency_samples(&self) -> usize {
        self.stft.latency_samples()
    }

    pub fn noise_profile(&self) -> &NoiseProfile {
        self.estimator.profile()
    }

    pub fn echo_history(&self) -> &EchoHistory {
        self.echo.history()
    }
}
