//! # Audio Frame Module
//!
//! A fixed-length block of mono samples together with the rate it was
//! captured at. Frames are validated once on construction so that every
//! analysis stage downstream can rely on having enough samples to compare
//! at least one lag.

use thiserror::Error;

/// The smallest frame the pitch estimator can work with.
///
/// With fewer than four samples the half-window holds a single lag and
/// no neighbour is available for interpolation.
pub const MIN_FRAME_LEN: usize = 4;

/// Reasons a frame cannot be built.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    #[error("frame holds {len} samples, at least {min} are required", min = MIN_FRAME_LEN)]
    TooShort { len: usize },
    #[error("sample rate must be greater than zero")]
    ZeroSampleRate,
}

/// One block of captured audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioFrame {
    /// Builds a frame, rejecting inputs too short to analyse.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self, FrameError> {
        if samples.len() < MIN_FRAME_LEN {
            return Err(FrameError::TooShort { len: samples.len() });
        }
        if sample_rate == 0 {
            return Err(FrameError::ZeroSampleRate);
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Root-mean-square level of the frame after applying `gain`.
    pub fn rms(&self, gain: f32) -> f32 {
        rms(&self.samples, gain)
    }
}

/// `sqrt(mean((sample * gain)^2))`, or 0 for an empty slice.
pub fn rms(samples: &[f32], gain: f32) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples
        .iter()
        .map(|&s| {
            let boosted = s * gain;
            boosted * boosted
        })
        .sum();
    (sum / samples.len() as f32).sqrt()
}
