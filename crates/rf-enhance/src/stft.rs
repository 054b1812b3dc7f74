//! Spectral Transform Core
//!
//! Real-input FFT analysis/synthesis and streaming overlap-add:
//! - Hann analysis window (rectangular when the overlap is too small for it)
//! - Overlap-add at a stride of `window - overlap`
//! - Synthesis normalised by the window overlap-sum, so an unmodified
//!   spectrum reconstructs the input exactly (up to rounding)
//!
//! Any window size is accepted: powers of two take the radix-2 path inside
//! `realfft`, other lengths use its mixed-radix / Bluestein plans.

use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::Arc;

use num_complex::Complex32;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::error::{EnhanceError, EnhanceResult};

/// Smallest overlap-sum accepted for the Hann window before falling back
const MIN_OVERLAP_SUM: f32 = 0.1;

// ============ Window ============

/// Analysis window shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    /// Periodic Hann
    Hann,
    /// No taper (used for zero / tiny overlap)
    Rectangular,
}

impl WindowKind {
    /// Generate window coefficients
    pub fn generate(self, size: usize) -> Vec<f32> {
        match self {
            WindowKind::Hann => (0..size)
                .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / size as f32).cos()))
                .collect(),
            WindowKind::Rectangular => vec![1.0; size],
        }
    }
}

/// Sum of overlapping windows at each position inside one hop
pub fn overlap_sum(window: &[f32], hop_size: usize) -> Vec<f32> {
    (0..hop_size)
        .map(|j| window.iter().skip(j).step_by(hop_size.max(1)).sum())
        .collect()
}

// ============ Transform ============

/// Windowed forward / inverse real FFT of one frame
pub struct SpectralTransform {
    /// Frame length
    size: usize,
    /// Window shape
    window_kind: WindowKind,
    /// Analysis window
    window: Vec<f32>,
    /// Forward FFT
    forward: Arc<dyn RealToComplex<f32>>,
    /// Inverse FFT
    inverse: Arc<dyn ComplexToReal<f32>>,
    /// Windowed frame (realfft consumes its input)
    time_scratch: Vec<f32>,
    /// FFT scratch buffer
    forward_scratch: Vec<Complex32>,
    /// IFFT scratch buffer
    inverse_scratch: Vec<Complex32>,
}

impl SpectralTransform {
    /// Create transform for `size`-sample frames
    pub fn new(size: usize, window_kind: WindowKind) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);

        let forward_scratch = vec![Complex32::new(0.0, 0.0); forward.get_scratch_len()];
        let inverse_scratch = vec![Complex32::new(0.0, 0.0); inverse.get_scratch_len()];

        Self {
            size,
            window_kind,
            window: window_kind.generate(size),
            forward,
            inverse,
            time_scratch: vec![0.0; size],
            forward_scratch,
            inverse_scratch,
        }
    }

    /// Frame length
    pub fn size(&self) -> usize {
        self.size
    }

    /// Bins per spectrum (`size / 2 + 1`)
    pub fn num_bins(&self) -> usize {
        self.size / 2 + 1
    }

    /// Window shape in use
    pub fn window_kind(&self) -> WindowKind {
        self.window_kind
    }

    /// Analysis window coefficients
    pub fn window(&self) -> &[f32] {
        &self.window
    }

    /// Analyze: windowed time frame -> `size / 2 + 1` bins
    pub fn analyze(&mut self, frame: &[f32], spectrum: &mut [Complex32]) -> EnhanceResult<()> {
        if frame.len() != self.size || spectrum.len() != self.num_bins() {
            return Err(EnhanceError::Transform(format!(
                "analyze expects {} samples / {} bins, got {} / {}",
                self.size,
                self.num_bins(),
                frame.len(),
                spectrum.len()
            )));
        }

        for ((dst, &sample), &w) in self.time_scratch.iter_mut().zip(frame).zip(&self.window) {
            *dst = sample * w;
        }

        self.forward
            .process_with_scratch(&mut self.time_scratch, spectrum, &mut self.forward_scratch)
            .map_err(|e| EnhanceError::Transform(e.to_string()))
    }

    /// Synthesize: bins -> `size` samples (scaled by 1/N, no synthesis window)
    ///
    /// The spectrum is used as scratch and is garbage afterwards.
    pub fn synthesize(&mut self, spectrum: &mut [Complex32], output: &mut [f32]) -> EnhanceResult<()> {
        if output.len() != self.size || spectrum.len() != self.num_bins() {
            return Err(EnhanceError::Transform(format!(
                "synthesize expects {} bins / {} samples, got {} / {}",
                self.num_bins(),
                self.size,
                spectrum.len(),
                output.len()
            )));
        }

        // DC (and Nyquist for even sizes) must be purely real
        spectrum[0].im = 0.0;
        if self.size % 2 == 0 {
            let last = spectrum.len() - 1;
            spectrum[last].im = 0.0;
        }

        self.inverse
            .process_with_scratch(spectrum, output, &mut self.inverse_scratch)
            .map_err(|e| EnhanceError::Transform(e.to_string()))?;

        let norm = 1.0 / self.size as f32;
        for sample in output.iter_mut() {
            *sample *= norm;
        }

        Ok(())
    }
}

// ============ Streaming STFT ============

/// Streaming STFT with overlap-add reconstruction (one channel)
///
/// Holds the per-channel frame state: the most recent `window_size` input
/// samples and the overlap-add accumulator. Output is the processed input
/// delayed by exactly `window_size` samples, whatever the chunk sizes.
pub struct StftProcessor {
    /// Windowed FFT
    transform: SpectralTransform,
    /// Stride between frames
    hop_size: usize,
    /// Input ring (linearised, shifted by one hop per frame)
    input: Vec<f32>,
    /// Valid samples in `input`
    input_fill: usize,
    /// Current frame spectrum
    spectrum: Vec<Complex32>,
    /// Synthesized frame
    synth: Vec<f32>,
    /// Overlap-add accumulator
    accumulator: Vec<f32>,
    /// Reciprocal window overlap-sum per hop position
    inv_overlap_sum: Vec<f32>,
    /// Finalized samples waiting to be handed out
    output: VecDeque<f32>,
    /// Leading zeros of `input` that are pre-roll, not signal
    pre_roll: usize,
    /// Frames transformed since the last reset
    frames_processed: u64,
}

impl StftProcessor {
    /// Create processor; `hop_size` must be in `1..=window_size`
    pub fn new(window_size: usize, hop_size: usize) -> Self {
        let hop_size = hop_size.clamp(1, window_size);

        let hann = WindowKind::Hann.generate(window_size);
        let hann_min = overlap_sum(&hann, hop_size)
            .into_iter()
            .fold(f32::INFINITY, f32::min);

        let window_kind = if hann_min >= MIN_OVERLAP_SUM {
            WindowKind::Hann
        } else {
            log::debug!(
                "Hann overlap-sum {:.4} too small for hop {} of {}, using rectangular window",
                hann_min,
                hop_size,
                window_size
            );
            WindowKind::Rectangular
        };

        let transform = SpectralTransform::new(window_size, window_kind);
        let inv_overlap_sum = overlap_sum(transform.window(), hop_size)
            .into_iter()
            .map(|s| 1.0 / s)
            .collect();
        let num_bins = transform.num_bins();

        let mut processor = Self {
            transform,
            hop_size,
            input: vec![0.0; window_size],
            input_fill: 0,
            spectrum: vec![Complex32::new(0.0, 0.0); num_bins],
            synth: vec![0.0; window_size],
            accumulator: vec![0.0; window_size],
            inv_overlap_sum,
            output: VecDeque::with_capacity(window_size * 2),
            pre_roll: 0,
            frames_processed: 0,
        };
        processor.reset();
        processor
    }

    /// Frame length
    pub fn window_size(&self) -> usize {
        self.transform.size()
    }

    /// Stride between frames
    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Bins per frame
    pub fn num_bins(&self) -> usize {
        self.transform.num_bins()
    }

    /// Window shape chosen for this hop
    pub fn window_kind(&self) -> WindowKind {
        self.transform.window_kind()
    }

    /// Delay between input and output in samples
    pub fn latency_samples(&self) -> usize {
        self.transform.size()
    }

    /// Frames transformed since the last reset
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Push `input`, run `on_frame` on every completed frame and fill `output`
    ///
    /// `on_frame` receives the raw (unwindowed) time frame and its spectrum,
    /// which it may modify in place. The time frame excludes the pre-roll
    /// padding, so the first frames after a reset are shorter than
    /// `window_size`. `output` must be as long as `input`.
    /// On a transform failure the chunk is still consumed (the failed frame
    /// contributes silence) and the first error is returned.
    pub fn process<F>(&mut self, input: &[f32], output: &mut [f32], mut on_frame: F) -> EnhanceResult<()>
    where
        F: FnMut(&[f32], &mut [Complex32]),
    {
        debug_assert_eq!(input.len(), output.len());

        let window_size = self.transform.size();
        let mut result = Ok(());
        let mut consumed = 0;

        while consumed < input.len() {
            let take = (window_size - self.input_fill).min(input.len() - consumed);
            self.input[self.input_fill..self.input_fill + take]
                .copy_from_slice(&input[consumed..consumed + take]);
            self.input_fill += take;
            consumed += take;

            if self.input_fill == window_size {
                let frame_result = self.process_frame(&mut on_frame);
                if result.is_ok() {
                    result = frame_result;
                }
            }
        }

        for sample in output.iter_mut() {
            *sample = self.output.pop_front().unwrap_or(0.0);
        }

        result
    }

    fn process_frame<F>(&mut self, on_frame: &mut F) -> EnhanceResult<()>
    where
        F: FnMut(&[f32], &mut [Complex32]),
    {
        let window_size = self.transform.size();
        let hop = self.hop_size;

        let transformed = self.transform_frame(on_frame);
        if transformed.is_err() {
            self.synth.fill(0.0);
        }

        // Overlap-add
        for (acc, &s) in self.accumulator.iter_mut().zip(&self.synth) {
            *acc += s;
        }

        // First hop is final: no later frame reaches back this far
        for (acc, &inv) in self.accumulator[..hop].iter().zip(&self.inv_overlap_sum) {
            self.output.push_back(acc * inv);
        }

        self.accumulator.copy_within(hop.., 0);
        self.accumulator[window_size - hop..].fill(0.0);

        self.input.copy_within(hop.., 0);
        self.input_fill = window_size - hop;
        self.pre_roll = self.pre_roll.saturating_sub(hop);
        self.frames_processed += 1;

        transformed
    }

    fn transform_frame<F>(&mut self, on_frame: &mut F) -> EnhanceResult<()>
    where
        F: FnMut(&[f32], &mut [Complex32]),
    {
        self.transform.analyze(&self.input, &mut self.spectrum)?;
        on_frame(&self.input[self.pre_roll..], &mut self.spectrum);
        self.transform.synthesize(&mut self.spectrum, &mut self.synth)
    }

    /// Zero non-finite samples in the frame and overlap-add state
    pub fn scrub_non_finite(&mut self) {
        let state = self
            .input
            .iter_mut()
            .chain(self.accumulator.iter_mut())
            .chain(self.output.iter_mut());
        for sample in state.filter(|s| !s.is_finite()) {
            *sample = 0.0;
        }
    }

    /// Clear all frame state (latency priming included)
    pub fn reset(&mut self) {
        let window_size = self.transform.size();
        self.input.fill(0.0);
        // Pre-roll so the first frame completes after one hop
        self.input_fill = window_size - self.hop_size;
        self.pre_roll = self.input_fill;
        self.accumulator.fill(0.0);
        self.output.clear();
        // One hop of priming keeps `output` non-empty for any chunk size
        self.output.extend(std::iter::repeat_n(0.0, self.hop_size));
        self.frames_processed = 0;
    }
}
