//! # Audio Capture Module
//!
//! Microphone capture through CPAL (Cross-Platform Audio Library), exposed as
//! a pull-based [`FrameSource`].
//!
//! The stream callback only forwards sample chunks over a bounded channel.
//! Each pull drains that channel into a sliding window and returns the most
//! recent `frame_size` samples, so the driver always analyses fresh audio no
//! matter how the device sizes its buffers.
//!
//! ## Features
//! - Default input device selection
//! - Sample rate chosen as close to 44.1 kHz as the device allows
//! - Downmix of multi-channel input to mono

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SupportedStreamConfigRange;
use crossbeam_channel::Receiver;
use tracing::{info, warn};

use crate::driver::FrameSource;
use crate::frame::AudioFrame;

/// Preferred capture rate.
pub const TARGET_SAMPLE_RATE: u32 = 44100;

// Chunks buffered between the callback and the driver before dropping.
const CHUNK_QUEUE_DEPTH: usize = 64;

/// Keeps the most recent `capacity` samples.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, chunk: &[f32]) {
        // Only the tail of an oversized chunk can survive.
        let start = chunk.len().saturating_sub(self.capacity);
        for &sample in &chunk[start..] {
            if self.samples.len() == self.capacity {
                self.samples.pop_front();
            }
            self.samples.push_back(sample);
        }
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    /// Copies the window out, oldest sample first.
    pub fn snapshot(&self) -> Vec<f32> {
        self.samples.iter().copied().collect()
    }
}

/// Live microphone input.
///
/// Holds the CPAL stream, which must stay on the thread that created it.
pub struct CpalCapture {
    stream: cpal::Stream,
    receiver: Receiver<Vec<f32>>,
    window: SampleWindow,
    sample_rate: u32,
    // Chunks the callback could not queue; read and reset on each pull.
    dropped: Arc<AtomicUsize>,
}

impl CpalCapture {
    /// Starts capturing from the default input device.
    ///
    /// # Arguments
    /// * `frame_size` - Number of samples in each frame handed to the driver
    ///
    /// # Returns
    /// * `Ok(capture)` - Running capture; dropping it stops the stream
    /// * `Err(e)` - No device, no usable f32 format, or the stream failed to start
    pub fn start(frame_size: usize) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow!("No input device available"))?;

        info!("Using audio input device: {}", device.name()?);

        let configs = device
            .supported_input_configs()
            .context("querying input configurations")?
            .collect::<Vec<_>>();
        let supported_config = find_supported_config(configs, TARGET_SAMPLE_RATE)
            .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

        let rate = TARGET_SAMPLE_RATE.clamp(
            supported_config.min_sample_rate().0,
            supported_config.max_sample_rate().0,
        );
        let config = supported_config.with_sample_rate(cpal::SampleRate(rate));
        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;
        let config: cpal::StreamConfig = config.into();

        info!(sample_rate, channels, frame_size, "Selected input format");

        let (sender, receiver) = crossbeam_channel::bounded::<Vec<f32>>(CHUNK_QUEUE_DEPTH);
        let dropped = Arc::new(AtomicUsize::new(0));
        let callback_dropped = Arc::clone(&dropped);
        let err_fn = |err| warn!("An error occurred on the audio stream: {}", err);

        let stream = device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // Never block the audio thread; count what does not fit.
                if sender.try_send(downmix(data, channels)).is_err() {
                    callback_dropped.fetch_add(1, Ordering::Relaxed);
                }
            },
            err_fn,
            None,
        )?;

        stream.play().context("starting input stream")?;

        Ok(Self {
            stream,
            receiver,
            window: SampleWindow::new(frame_size),
            sample_rate,
            dropped,
        })
    }
}

impl FrameSource for CpalCapture {
    fn next_frame(&mut self) -> Option<AudioFrame> {
        for chunk in self.receiver.try_iter() {
            self.window.push(&chunk);
        }
        let dropped = self.dropped.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            warn!(dropped, "capture queue full, audio chunks dropped");
        }
        if !self.window.is_full() {
            return None;
        }
        AudioFrame::new(self.window.snapshot(), self.sample_rate).ok()
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        if let Err(e) = self.stream.pause() {
            warn!("Error pausing input stream: {}", e);
        }
    }
}

/// Averages interleaved channels into one.
fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Finds the best supported f32 configuration: fewest channels first, then
/// the range closest to `target_rate`.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let min = c.min_sample_rate().0;
            let max = c.max_sample_rate().0;
            let distance = if (min..=max).contains(&target_rate) {
                0
            } else {
                min.abs_diff(target_rate).min(max.abs_diff(target_rate))
            };
            (c.channels(), distance)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_keeps_latest_samples() {
        let mut window = SampleWindow::new(4);
        window.push(&[1.0, 2.0]);
        assert!(!window.is_full());
        window.push(&[3.0, 4.0, 5.0]);
        assert!(window.is_full());
        assert_eq!(window.snapshot(), vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn oversized_chunk_keeps_its_tail() {
        let mut window = SampleWindow::new(3);
        window.push(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(window.snapshot(), vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn downmix_averages_channels() {
        assert_eq!(downmix(&[1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
        assert_eq!(downmix(&[0.25, -0.25], 1), vec![0.25, -0.25]);
    }
}
