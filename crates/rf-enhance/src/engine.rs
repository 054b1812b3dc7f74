//! Enhancement Pipeline Orchestrator
//!
//! Owns the session configuration and one processing chain per channel,
//! runs the enabled stages in fixed order and aggregates metrics.
//!
//! Lifecycle: `Uninitialized → Configured → Processing → Disposed`.
//! Per-chunk failures (FFT errors, non-finite output, missed real-time
//! deadlines) never abort processing: the chunk is passed through dry,
//! delay-aligned with regular output, and the result carries a warning.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::buffer::{self, SampleBuffer};
use crate::chain::ChannelChain;
use crate::config::{EnhancementConfig, ProcessingMode};
use crate::echo::EchoHistory;
use crate::error::{EnhanceError, EnhanceResult};
use crate::metrics::PerformanceMetrics;
use crate::noise_profile::NoiseProfile;
use crate::stream::EnhancementStream;
use crate::{Algorithm, DEFAULT_SAMPLE_RATE, EnhancementResult, ProcessingWarning};

/// Lowest accepted input sample rate
pub const MIN_SAMPLE_RATE: u32 = 1000;

/// Highest accepted input sample rate
pub const MAX_SAMPLE_RATE: u32 = 768_000;

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    /// Created, no configuration yet
    Uninitialized,
    /// Configured, no audio processed yet
    Configured,
    /// At least one chunk processed
    Processing,
    /// Buffers released; every call fails
    Disposed,
}

// ============ Session ============

/// Buffers and per-channel state of an initialized engine
struct Session {
    config: EnhancementConfig,
    sample_rate: u32,
    chains: Vec<ChannelChain>,
    inputs: Vec<Vec<f32>>,
    outputs: Vec<Vec<f32>>,
    dry: Vec<Vec<f32>>,
}

impl Session {
    fn new(config: EnhancementConfig, sample_rate: u32) -> Self {
        let channels = config.channels;
        Self {
            chains: (0..channels)
                .map(|_| ChannelChain::new(&config, sample_rate))
                .collect(),
            inputs: vec![Vec::new(); channels],
            outputs: vec![Vec::new(); channels],
            dry: vec![Vec::new(); channels],
            config,
            sample_rate,
        }
    }

    fn set_sample_rate(&mut self, sample_rate: u32) {
        log::debug!(
            "Sample rate changed {} -> {} Hz, resizing stage state",
            self.sample_rate,
            sample_rate
        );
        self.sample_rate = sample_rate;
        for chain in &mut self.chains {
            chain.set_sample_rate(sample_rate);
        }
    }

    fn reset_chains(&mut self) {
        for chain in &mut self.chains {
            chain.reset();
        }
    }

    /// Longest block whose echo references are all emitted already
    fn echo_block_frames(&self) -> usize {
        if !self.config.enable_echo_cancellation {
            return usize::MAX;
        }
        self.chains
            .first()
            .map(ChannelChain::echo_delay_samples)
            .unwrap_or(usize::MAX)
    }

    fn latency_samples(&self) -> usize {
        self.chains
            .first()
            .map(ChannelChain::latency_samples)
            .unwrap_or(self.config.window_size)
    }
}

// ============ Engine ============

/// Audio enhancement session
pub struct EnhancementEngine {
    /// Lifecycle state
    state: EngineState,
    /// Allocated session (None before `initialize` and after `dispose`)
    session: Option<Session>,
    /// Aggregated statistics
    metrics: PerformanceMetrics,
}

impl Default for EnhancementEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EnhancementEngine {
    /// Create uninitialized engine
    pub fn new() -> Self {
        Self {
            state: EngineState::Uninitialized,
            session: None,
            metrics: PerformanceMetrics::default(),
        }
    }

    /// Create and initialize in one step
    pub fn with_config(config: EnhancementConfig) -> EnhanceResult<Self> {
        let mut engine = Self::new();
        engine.initialize(config)?;
        Ok(engine)
    }

    /// Validate `config` and allocate all per-channel state
    ///
    /// Re-initializing a live session discards all learned state and metrics.
    pub fn initialize(&mut self, config: EnhancementConfig) -> EnhanceResult<()> {
        if self.state == EngineState::Disposed {
            return Err(EnhanceError::Disposed);
        }
        config.validate()?;

        log::info!(
            "Enhancement engine initialized: window {}, hop {}, {} channel(s), {:?}",
            config.window_size,
            config.hop_size(),
            config.channels,
            config.processing_mode
        );

        self.session = Some(Session::new(config, DEFAULT_SAMPLE_RATE));
        self.metrics.reset();
        self.state = EngineState::Configured;
        Ok(())
    }

    /// Replace the configuration, effective from the next frame
    ///
    /// Frame buffers, noise profiles and echo history survive unless the
    /// window size, overlap or channel count changes.
    pub fn configure(&mut self, config: EnhancementConfig) -> EnhanceResult<()> {
        let session = self.session_mut()?;
        config.validate()?;

        if session.config.requires_realloc(&config) {
            log::info!(
                "Reallocating enhancement buffers: window {} -> {}, hop {} -> {}, channels {} -> {}",
                session.config.window_size,
                config.window_size,
                session.config.hop_size(),
                config.hop_size(),
                session.config.channels,
                config.channels
            );
            *session = Session::new(config, session.sample_rate);
        } else {
            for chain in &mut session.chains {
                chain.apply_config(&config);
            }
            session.config = config;
        }
        Ok(())
    }

    /// Switch between real-time and post-processing
    pub fn set_processing_mode(&mut self, mode: ProcessingMode) -> EnhanceResult<()> {
        let config = EnhancementConfig {
            processing_mode: mode,
            ..self.session_mut()?.config.clone()
        };
        self.configure(config)
    }

    /// Lifecycle state
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Active configuration
    pub fn config(&self) -> Option<&EnhancementConfig> {
        self.session.as_ref().map(|s| &s.config)
    }

    /// Sample rate the stages are currently sized for
    pub fn sample_rate(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.sample_rate)
    }

    /// Algorithmic delay of `process_audio` output, per channel
    pub fn latency_samples(&self) -> usize {
        self.session
            .as_ref()
            .map(Session::latency_samples)
            .unwrap_or(0)
    }

    /// Enhance one chunk (interleaved when multi-channel)
    ///
    /// Output is delayed by `latency_samples()` relative to the input.
    /// With echo cancellation on, chunks longer than the echo delay run in
    /// delay-sized blocks and come back as one result.
    pub fn process_audio(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
    ) -> EnhanceResult<EnhancementResult> {
        self.run_chunk(samples, sample_rate, true)
    }

    /// Enhance a buffer whose channel count must match the session
    pub fn process_buffer(&mut self, buffer: &SampleBuffer) -> EnhanceResult<EnhancementResult> {
        let channels = self.session_ref()?.config.channels;
        if buffer.channels != channels {
            return Err(EnhanceError::InvalidInput(format!(
                "buffer has {} channel(s), session expects {}",
                buffer.channels, channels
            )));
        }
        self.process_audio(&buffer.samples, buffer.sample_rate)
    }

    /// Lazily enhance a sequence of chunks, one result per chunk, in order
    pub fn process_audio_stream<I, T>(
        &mut self,
        chunks: I,
        sample_rate: u32,
    ) -> EnhancementStream<'_, I::IntoIter>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[f32]>,
    {
        EnhancementStream::new(self, chunks.into_iter(), sample_rate)
    }

    /// Enhance a complete recording without deadline or output delay
    ///
    /// Frame state is cleared first, so the call is self-contained; the
    /// result is aligned sample for sample with `samples`. The recording is
    /// fed in hop-sized blocks so the echo reference fills as it would live.
    pub fn process_offline(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
    ) -> EnhanceResult<EnhancementResult> {
        let session = self.session_mut()?;
        let channels = session.config.channels;
        validate_input(samples, sample_rate, channels)?;

        session.reset_chains();
        let latency = session.latency_samples() * channels;
        let hop = session.config.hop_size();

        let mut padded = Vec::with_capacity(samples.len() + latency);
        padded.extend_from_slice(samples);
        padded.resize(samples.len() + latency, 0.0);

        let mut result = self.enhance_blocks(&padded, sample_rate, hop, false)?;
        result.samples.drain(..latency);
        result.delay_samples = 0;

        self.record_metrics(samples.len(), &result);
        Ok(result)
    }

    /// Push the delayed tail out by feeding `latency_samples()` of silence
    pub fn flush(&mut self) -> EnhanceResult<EnhancementResult> {
        let session = self.session_ref()?;
        let silence = vec![0.0; session.latency_samples() * session.config.channels];
        let sample_rate = session.sample_rate;
        self.run_chunk(&silence, sample_rate, true)
    }

    /// Metrics snapshot
    pub fn performance_metrics(&self) -> PerformanceMetrics {
        self.metrics.clone()
    }

    /// Clear metrics, keep processing state
    pub fn reset_metrics(&mut self) {
        self.metrics.reset();
    }

    /// Learned noise profile of `channel`
    pub fn noise_profile(&self, channel: usize) -> Option<&NoiseProfile> {
        self.session
            .as_ref()
            .and_then(|s| s.chains.get(channel))
            .map(ChannelChain::noise_profile)
    }

    /// Echo reference history of `channel`
    pub fn echo_history(&self, channel: usize) -> Option<&EchoHistory> {
        self.session
            .as_ref()
            .and_then(|s| s.chains.get(channel))
            .map(ChannelChain::echo_history)
    }

    /// Release all buffers; every later call fails with `Disposed`
    pub fn dispose(&mut self) -> EnhanceResult<()> {
        if self.state == EngineState::Disposed {
            return Err(EnhanceError::Disposed);
        }
        self.session = None;
        self.state = EngineState::Disposed;
        log::info!(
            "Enhancement engine disposed after {} chunk(s)",
            self.metrics.chunks_processed
        );
        Ok(())
    }

    // ============ Internals ============

    fn session_ref(&self) -> EnhanceResult<&Session> {
        match (self.state, &self.session) {
            (EngineState::Disposed, _) => Err(EnhanceError::Disposed),
            (_, Some(session)) => Ok(session),
            (_, None) => Err(EnhanceError::Uninitialized),
        }
    }

    fn session_mut(&mut self) -> EnhanceResult<&mut Session> {
        match (self.state, &mut self.session) {
            (EngineState::Disposed, _) => Err(EnhanceError::Disposed),
            (_, Some(session)) => Ok(session),
            (_, None) => Err(EnhanceError::Uninitialized),
        }
    }

    fn run_chunk(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
        deadline: bool,
    ) -> EnhanceResult<EnhancementResult> {
        let result = self.enhance_blocks(samples, sample_rate, usize::MAX, deadline)?;
        self.record_metrics(samples.len(), &result);
        Ok(result)
    }

    /// Run `samples` in blocks of at most `max_frames` frames, merged into one result
    ///
    /// With echo cancellation on, blocks are also capped at the echo delay
    /// so every position has its reference already emitted.
    fn enhance_blocks(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
        max_frames: usize,
        deadline: bool,
    ) -> EnhanceResult<EnhancementResult> {
        let session = self.session_mut()?;
        let channels = session.config.channels;
        validate_input(samples, sample_rate, channels)?;

        if session.sample_rate != sample_rate {
            session.set_sample_rate(sample_rate);
        }
        let block = max_frames.min(session.echo_block_frames()).max(1);
        let enabled = Algorithm::enabled(&session.config);

        if samples.len() <= block.saturating_mul(channels) {
            return self.enhance_chunk(samples, sample_rate, deadline);
        }

        let mut merged = EnhancementResult {
            samples: Vec::with_capacity(samples.len()),
            sample_rate,
            channels,
            applied: enabled,
            processing_time: Duration::ZERO,
            delay_samples: 0,
            warning: None,
        };

        for chunk in samples.chunks(block * channels) {
            let result = self.enhance_chunk(chunk, sample_rate, deadline)?;
            merged.processing_time += result.processing_time;
            merged.delay_samples = result.delay_samples;
            if merged.warning.is_none() {
                merged.warning = result.warning;
            }
            merged.samples.extend_from_slice(&result.samples);
        }

        if merged.warning.is_some() {
            merged.applied.clear();
        }
        Ok(merged)
    }

    /// One call as seen by the caller: one chunk in the metrics
    fn record_metrics(&mut self, samples: usize, result: &EnhancementResult) {
        match result.warning {
            Some(ProcessingWarning::ProcessingTimeout { .. }) => {
                self.metrics.record_deadline_miss();
                self.metrics.record_fallback();
            }
            Some(ProcessingWarning::NumericInstability(_)) => self.metrics.record_fallback(),
            None => {}
        }

        let frames = samples / result.channels.max(1);
        let audio_duration = Duration::from_secs_f64(frames as f64 / result.sample_rate as f64);
        self.metrics
            .record_chunk(samples, audio_duration, result.processing_time, &result.applied);
    }

    /// Run the chains over one chunk without touching the metrics
    fn enhance_chunk(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
        deadline: bool,
    ) -> EnhanceResult<EnhancementResult> {
        let session = match (self.state, self.session.as_mut()) {
            (EngineState::Disposed, _) => return Err(EnhanceError::Disposed),
            (_, Some(session)) => session,
            (_, None) => return Err(EnhanceError::Uninitialized),
        };

        let channels = session.config.channels;
        validate_input(samples, sample_rate, channels)?;

        let start = Instant::now();

        if session.sample_rate != sample_rate {
            session.set_sample_rate(sample_rate);
        }

        let frames = samples.len() / channels;
        let latency = session.latency_samples();

        let Session {
            config,
            chains,
            inputs,
            outputs,
            dry,
            ..
        } = &mut *session;

        buffer::deinterleave_into(samples, inputs);
        for (output, dry) in outputs.iter_mut().zip(dry.iter_mut()) {
            output.clear();
            output.resize(frames, 0.0);
            dry.clear();
            dry.resize(frames, 0.0);
        }

        let mut failure = None;
        for (ch, chain) in chains.iter_mut().enumerate() {
            if let Err(e) = chain.process(&inputs[ch], &mut outputs[ch], &mut dry[ch], config) {
                if failure.is_none() {
                    failure = Some(e.to_string());
                }
            }
        }

        if failure.is_none() && outputs.iter().flatten().any(|s| !s.is_finite()) {
            failure = Some("non-finite samples in enhanced output".to_string());
        }

        let elapsed = start.elapsed();
        let audio_duration = Duration::from_secs_f64(frames as f64 / sample_rate as f64);

        let mut warning = failure.map(ProcessingWarning::NumericInstability);
        if warning.is_none() && deadline && config.processing_mode == ProcessingMode::RealTime {
            let budget = audio_duration.mul_f64(config.realtime_budget_ratio as f64);
            if elapsed > budget {
                warning = Some(ProcessingWarning::ProcessingTimeout { elapsed, budget });
            }
        }

        let applied = match &warning {
            Some(w) => {
                log::warn!("Chunk of {} frame(s) passed through unprocessed: {:?}", frames, w);
                Vec::new()
            }
            None => Algorithm::enabled(config),
        };

        let emitted = if warning.is_some() { &*dry } else { &*outputs };
        for (chain, channel) in chains.iter_mut().zip(emitted) {
            chain.record_output(channel);
        }
        let samples_out = buffer::interleave(emitted);

        if matches!(warning, Some(ProcessingWarning::NumericInstability(_))) {
            for chain in chains.iter_mut() {
                chain.recover();
            }
        }

        self.state = EngineState::Processing;
        let processing_time = start.elapsed();

        Ok(EnhancementResult {
            samples: samples_out,
            sample_rate,
            channels,
            applied,
            processing_time,
            delay_samples: latency,
            warning,
        })
    }
}

/// Reject malformed chunks before any state is touched
fn validate_input(samples: &[f32], sample_rate: u32, channels: usize) -> EnhanceResult<()> {
    if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
        return Err(EnhanceError::InvalidInput(format!(
            "sample rate {} outside {}..={}",
            sample_rate, MIN_SAMPLE_RATE, MAX_SAMPLE_RATE
        )));
    }
    if samples.is_empty() {
        return Err(EnhanceError::InvalidInput("empty buffer".to_string()));
    }
    if samples.len() % channels != 0 {
        return Err(EnhanceError::InvalidInput(format!(
            "{} samples is not a multiple of {} channel(s)",
            samples.len(),
            channels
        )));
    }
    if let Some(pos) = samples.iter().position(|s| !s.is_finite()) {
        return Err(EnhanceError::InvalidInput(format!(
            "non-finite sample at index {}",
            pos
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> EnhancementConfig {
        EnhancementConfig {
            window_size: 256,
            overlap_size: 128,
            ..Default::default()
        }
    }

    #[test]
    fn test_engine_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<EnhancementEngine>();
    }

    #[test]
    fn test_lifecycle() {
        let mut engine = EnhancementEngine::new();
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert_eq!(
            engine.process_audio(&[0.0; 256], 16000),
            Err(EnhanceError::Uninitialized)
        );
        assert_eq!(
            engine.configure(small_config()),
            Err(EnhanceError::Uninitialized)
        );

        engine.initialize(small_config()).unwrap();
        assert_eq!(engine.state(), EngineState::Configured);
        assert_eq!(engine.latency_samples(), 256);

        engine.process_audio(&[0.0; 256], 16000).unwrap();
        assert_eq!(engine.state(), EngineState::Processing);

        engine.dispose().unwrap();
        assert_eq!(engine.state(), EngineState::Disposed);
        assert_eq!(
            engine.process_audio(&[0.0; 256], 16000),
            Err(EnhanceError::Disposed)
        );
        assert_eq!(engine.configure(small_config()), Err(EnhanceError::Disposed));
        assert_eq!(engine.initialize(small_config()), Err(EnhanceError::Disposed));
        assert_eq!(engine.flush(), Err(EnhanceError::Disposed));
        assert_eq!(engine.dispose(), Err(EnhanceError::Disposed));
        assert!(engine.config().is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut engine = EnhancementEngine::new();
        let config = EnhancementConfig {
            window_size: 256,
            overlap_size: 256,
            ..Default::default()
        };
        assert!(matches!(
            engine.initialize(config),
            Err(EnhanceError::Configuration(_))
        ));
        assert_eq!(engine.state(), EngineState::Uninitialized);
    }

    #[test]
    fn test_invalid_input_rejected() {
        let mut engine = EnhancementEngine::with_config(small_config()).unwrap();

        for (samples, rate) in [
            (vec![], 16000),
            (vec![0.0, f32::NAN], 16000),
            (vec![0.0, f32::INFINITY], 16000),
            (vec![0.0; 64], 0),
        ] {
            assert!(matches!(
                engine.process_audio(&samples, rate),
                Err(EnhanceError::InvalidInput(_))
            ));
        }
        // Nothing was processed
        assert_eq!(engine.state(), EngineState::Configured);
        assert_eq!(engine.performance_metrics().chunks_processed, 0);
    }

    #[test]
    fn test_channel_mismatch() {
        let config = EnhancementConfig {
            channels: 2,
            ..small_config()
        };
        let mut engine = EnhancementEngine::with_config(config).unwrap();
        assert!(matches!(
            engine.process_audio(&[0.0; 3], 16000),
            Err(EnhanceError::InvalidInput(_))
        ));
        let mono = SampleBuffer::mono(vec![0.0; 64], 16000);
        assert!(matches!(
            engine.process_buffer(&mono),
            Err(EnhanceError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_output_length_matches_input() {
        let mut engine = EnhancementEngine::with_config(small_config()).unwrap();
        for len in [1, 17, 256, 1000] {
            let result = engine.process_audio(&vec![0.1; len], 16000).unwrap();
            assert_eq!(result.samples.len(), len);
            assert_eq!(result.delay_samples, 256);
        }
    }

    #[test]
    fn test_set_processing_mode() {
        let mut engine = EnhancementEngine::with_config(small_config()).unwrap();
        engine
            .set_processing_mode(ProcessingMode::PostProcessing)
            .unwrap();
        assert_eq!(
            engine.config().map(|c| c.processing_mode),
            Some(ProcessingMode::PostProcessing)
        );
    }

    #[test]
    fn test_sample_rate_follows_input() {
        let mut engine = EnhancementEngine::with_config(small_config()).unwrap();
        assert_eq!(engine.sample_rate(), Some(DEFAULT_SAMPLE_RATE));
        engine.process_audio(&[0.0; 480], 48000).unwrap();
        assert_eq!(engine.sample_rate(), Some(48000));
    }

    #[test]
    fn test_flush_returns_latency_tail() {
        let mut engine = EnhancementEngine::with_config(small_config()).unwrap();
        engine.process_audio(&[0.1; 100], 16000).unwrap();
        let tail = engine.flush().unwrap();
        assert_eq!(tail.samples.len(), 256);
    }

    #[test]
    fn test_reinitialize_resets_metrics() {
        let mut engine = EnhancementEngine::with_config(small_config()).unwrap();
        engine.process_audio(&[0.1; 512], 16000).unwrap();
        assert_eq!(engine.performance_metrics().chunks_processed, 1);
        engine.initialize(small_config()).unwrap();
        assert_eq!(engine.performance_metrics().chunks_processed, 0);
        assert_eq!(engine.state(), EngineState::Configured);
    }

    #[test]
    fn test_offline_call_counts_as_one_chunk() {
        let mut engine = EnhancementEngine::with_config(small_config()).unwrap();
        engine.process_offline(&[0.01; 16000], 16000).unwrap();

        let metrics = engine.performance_metrics();
        assert_eq!(metrics.chunks_processed, 1);
        assert_eq!(metrics.samples_processed, 16000);
        assert_eq!(metrics.audio_duration, Duration::from_secs(1));
        assert_eq!(
            metrics.algorithm_invocations.get(Algorithm::SpectralSubtraction),
            1
        );
    }

    #[test]
    fn test_long_chunk_matches_delay_sized_chunks() {
        // 4 ms echo delay = 64 samples at 16 kHz
        let config = EnhancementConfig {
            window_size: 64,
            overlap_size: 32,
            enable_echo_cancellation: true,
            echo_cancellation_strength: 1.0,
            echo_delay_ms: 4.0,
            processing_mode: ProcessingMode::PostProcessing,
            ..EnhancementConfig::passthrough()
        };
        let input: Vec<f32> = (0..1024).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();

        let mut whole = EnhancementEngine::with_config(config.clone()).unwrap();
        let long = whole.process_audio(&input, 16000).unwrap();

        let mut split = EnhancementEngine::with_config(config).unwrap();
        let mut expected = Vec::new();
        for chunk in input.chunks(64) {
            expected.extend(split.process_audio(chunk, 16000).unwrap().samples);
        }

        assert_eq!(long.samples.len(), expected.len());
        for (a, b) in long.samples.iter().zip(&expected) {
            assert!((a - b).abs() < 1e-6, "{} vs {}", a, b);
        }
        assert_eq!(long.applied, vec![Algorithm::EchoCancellation]);
        assert_eq!(whole.performance_metrics().chunks_processed, 1);
    }
}
