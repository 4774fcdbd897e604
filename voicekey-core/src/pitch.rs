//! # Pitch Detection Module
//!
//! This module implements single-pitch detection for a monophonic voice using
//! the YIN algorithm.
//!
//! ## Features
//! - Cumulative mean normalized difference with a guard for silent input
//! - Absolute threshold search with a global-minimum fallback
//! - Parabolic interpolation for sub-sample accuracy on both search paths
//! - Optional FFT-accelerated difference function (see [`crate::fft`])

use std::fmt;

use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

use crate::fft;
use crate::frame::{AudioFrame, MIN_FRAME_LEN};

/// Dips below this normalized difference are accepted immediately.
pub const DEFAULT_THRESHOLD: f32 = 0.15;

/// The global-minimum fallback is rejected above this value.
pub const DEFAULT_FALLBACK_CEILING: f32 = 0.4;

/// How the YIN difference function is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifferenceMethod {
    /// Plain double loop, O(N²).
    #[default]
    Direct,
    /// Energy terms plus an FFT cross-correlation, O(N log N).
    Fft,
}

/// Tunables for the YIN estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YinConfig {
    pub threshold: f32,
    pub fallback_ceiling: f32,
    pub method: DifferenceMethod,
}

impl Default for YinConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            fallback_ceiling: DEFAULT_FALLBACK_CEILING,
            method: DifferenceMethod::Direct,
        }
    }
}

/// Frame-by-frame fundamental frequency estimator.
///
/// Every frame is analysed independently; the only state kept between calls
/// is the FFT planner cache.
pub struct PitchEstimator {
    config: YinConfig,
    planner: FftPlanner<f32>,
}

impl fmt::Debug for PitchEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PitchEstimator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for PitchEstimator {
    fn default() -> Self {
        Self::new(YinConfig::default())
    }
}

impl PitchEstimator {
    pub fn new(config: YinConfig) -> Self {
        Self {
            config,
            planner: FftPlanner::new(),
        }
    }

    pub fn config(&self) -> &YinConfig {
        &self.config
    }

    /// Estimates the fundamental frequency of a frame.
    ///
    /// # Returns
    /// * `Some(frequency)` - Detected frequency in Hz
    /// * `None` - No confident pitch (silence, noise or unvoiced sound)
    pub fn estimate(&mut self, frame: &AudioFrame) -> Option<f32> {
        let signal = frame.samples();
        let diff = match self.config.method {
            DifferenceMethod::Direct => difference_direct(signal),
            DifferenceMethod::Fft => fft::difference_function(&mut self.planner, signal),
        };
        yin_from_difference(diff, frame.sample_rate(), &self.config)
    }
}

/// Runs YIN with the default configuration on a raw slice.
///
/// # Arguments
/// * `signal` - Input audio signal
/// * `sample_rate` - Sample rate in Hz
///
/// # Panics
/// * If `signal` has fewer than [`MIN_FRAME_LEN`] samples or `sample_rate` is zero
pub fn detect_pitch_yin(signal: &[f32], sample_rate: u32) -> Option<f32> {
    assert!(
        signal.len() >= MIN_FRAME_LEN,
        "YIN needs at least {} samples, got {}",
        MIN_FRAME_LEN,
        signal.len()
    );
    assert!(sample_rate > 0, "sample rate must be greater than zero");
    yin_from_difference(difference_direct(signal), sample_rate, &YinConfig::default())
}

/// Steps 2 to 5 of YIN, shared by both difference methods.
fn yin_from_difference(
    mut yin_buffer: Vec<f32>,
    sample_rate: u32,
    config: &YinConfig,
) -> Option<f32> {
    cumulative_mean_normalize(&mut yin_buffer);

    let period = select_lag(&yin_buffer, config.threshold, config.fallback_ceiling)?;
    let period_float = parabolic_interpolation(&yin_buffer, period);

    let frequency = sample_rate as f32 / period_float;
    if frequency.is_finite() && frequency > 0.0 {
        Some(frequency)
    } else {
        None
    }
}

/// `d(τ) = Σ_{i<W} (x[i] − x[i+τ])²` for `τ < W = N/2`.
fn difference_direct(signal: &[f32]) -> Vec<f32> {
    let window = signal.len() / 2;
    let mut diff = vec![0.0; window];
    for (tau, slot) in diff.iter_mut().enumerate().skip(1) {
        let mut sum = 0.0;
        for i in 0..window {
            let delta = signal[i] - signal[i + tau];
            sum += delta * delta;
        }
        *slot = sum;
    }
    diff
}

/// In-place cumulative mean normalization.
///
/// While the running sum is still zero the value is pinned to 1.0, so a
/// silent or constant frame never produces a dip.
fn cumulative_mean_normalize(yin_buffer: &mut [f32]) {
    if yin_buffer.is_empty() {
        return;
    }
    yin_buffer[0] = 1.0;
    let mut running_sum = 0.0;
    for tau in 1..yin_buffer.len() {
        running_sum += yin_buffer[tau];
        if running_sum != 0.0 {
            yin_buffer[tau] *= tau as f32 / running_sum;
        } else {
            yin_buffer[tau] = 1.0;
        }
    }
}

/// Picks the lag of the first dip under `threshold`, or the global minimum
/// if it does not exceed `fallback_ceiling`.
///
/// Once a lag crosses the threshold the search keeps walking while the curve
/// still falls, so the bottom of that dip is returned.
fn select_lag(yin_buffer: &[f32], threshold: f32, fallback_ceiling: f32) -> Option<usize> {
    let len = yin_buffer.len();

    let mut tau = 1;
    while tau < len {
        if yin_buffer[tau] < threshold {
            while tau + 1 < len && yin_buffer[tau + 1] < yin_buffer[tau] {
                tau += 1;
            }
            return Some(tau);
        }
        tau += 1;
    }

    let (best_tau, best_value) = yin_buffer
        .iter()
        .enumerate()
        .skip(1)
        .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))?;

    if *best_value <= fallback_ceiling {
        Some(best_tau)
    } else {
        None
    }
}

/// Refines `tau` by fitting a parabola through it and its neighbours.
///
/// Falls back to the integer lag at the edges of the buffer or when the three
/// points are collinear.
fn parabolic_interpolation(yin_buffer: &[f32], tau: usize) -> f32 {
    if tau == 0 || tau + 1 >= yin_buffer.len() {
        return tau as f32;
    }

    let y1 = yin_buffer[tau - 1];
    let y2 = yin_buffer[tau];
    let y3 = yin_buffer[tau + 1];

    let denominator = y1 - 2.0 * y2 + y3;
    if denominator == 0.0 {
        return tau as f32;
    }
    let peak_shift = (y1 - y3) / (2.0 * denominator);
    tau as f32 + peak_shift
}
