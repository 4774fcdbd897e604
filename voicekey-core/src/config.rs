//! # Configuration Module
//!
//! Engine settings with compiled defaults, optionally overridden from a TOML
//! file. Every field may be omitted from the file.
//!
//! ```toml
//! frame_size = 1024
//! tick_hz = 60.0
//! mode = "note_input"
//! sensitivity = 0.02
//! gain = 1.5
//! gate = { hysteresis = { release_ratio = 0.6 } }
//!
//! [yin]
//! threshold = 0.15
//! method = "fft"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::OperatingMode;
use crate::frame::MIN_FRAME_LEN;
use crate::pitch::YinConfig;
use crate::recording::MIN_NOTE_DURATION;
use crate::tracker::GatePolicy;

/// Accepted driver rates, in ticks per second.
pub const TICK_HZ_RANGE: std::ops::RangeInclusive<f32> = 1.0..=1000.0;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Everything the engine and driver need to start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Samples per analysis frame.
    pub frame_size: usize,
    /// Driver ticks per second.
    pub tick_hz: f32,
    /// Mode the engine starts in.
    pub mode: OperatingMode,
    /// RMS level the gate must exceed.
    pub sensitivity: f32,
    /// Microphone gain applied before measuring the level.
    pub gain: f32,
    pub monitor_enabled: bool,
    /// Exponential smoothing factor for the level meter, in `[0, 1)`.
    pub meter_smoothing: f32,
    /// Shortest recorded note in seconds.
    pub min_note_duration: f64,
    pub gate: GatePolicy,
    pub yin: YinConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_size: 1024,
            tick_hz: 60.0,
            mode: OperatingMode::Idle,
            sensitivity: 0.01,
            gain: 1.0,
            monitor_enabled: false,
            meter_smoothing: 0.8,
            min_note_duration: MIN_NOTE_DURATION,
            gate: GatePolicy::Instantaneous,
            yin: YinConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Loads a TOML file on top of the defaults and validates the result.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes to TOML, e.g. to print a starting point for a config file.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Time between driver ticks.
    ///
    /// Fails when `tick_hz` is outside [`TICK_HZ_RANGE`].
    pub fn tick_period(&self) -> Result<Duration, ConfigError> {
        if !TICK_HZ_RANGE.contains(&self.tick_hz) {
            return Err(ConfigError::Invalid(format!(
                "tick_hz must be in [{}, {}], got {}",
                TICK_HZ_RANGE.start(),
                TICK_HZ_RANGE.end(),
                self.tick_hz
            )));
        }
        Duration::try_from_secs_f32(1.0 / self.tick_hz)
            .map_err(|e| ConfigError::Invalid(format!("tick_hz {}: {}", self.tick_hz, e)))
    }

    /// Checks value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.frame_size < MIN_FRAME_LEN {
            return invalid(format!(
                "frame_size must be at least {}, got {}",
                MIN_FRAME_LEN, self.frame_size
            ));
        }
        self.tick_period()?;
        if !(self.sensitivity.is_finite() && self.sensitivity >= 0.0) {
            return invalid(format!("sensitivity must be >= 0, got {}", self.sensitivity));
        }
        if !(self.gain.is_finite() && self.gain > 0.0) {
            return invalid(format!("gain must be positive, got {}", self.gain));
        }
        if !(0.0..1.0).contains(&self.meter_smoothing) {
            return invalid(format!(
                "meter_smoothing must be in [0, 1), got {}",
                self.meter_smoothing
            ));
        }
        if !(self.min_note_duration.is_finite() && self.min_note_duration >= 0.0) {
            return invalid(format!(
                "min_note_duration must be >= 0, got {}",
                self.min_note_duration
            ));
        }
        for (name, value) in [
            ("yin.threshold", self.yin.threshold),
            ("yin.fallback_ceiling", self.yin.fallback_ceiling),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return invalid(format!("{} must be in (0, 1], got {}", name, value));
            }
        }
        if let GatePolicy::Hysteresis { release_ratio } = self.gate {
            if !(release_ratio > 0.0 && release_ratio <= 1.0) {
                return invalid(format!(
                    "gate release_ratio must be in (0, 1], got {}",
                    release_ratio
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch::DifferenceMethod;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.frame_size, 1024);
        assert_eq!(config.yin.threshold, 0.15);
        assert_eq!(config.min_note_duration, 0.05);
        let period = config.tick_period().unwrap();
        assert!((period.as_secs_f64() - 1.0 / 60.0).abs() < 1e-6);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            mode = "note_input"
            sensitivity = 0.02
            gate = { hysteresis = { release_ratio = 0.6 } }

            [yin]
            method = "fft"
            "#,
        )
        .unwrap();

        assert_eq!(config.mode, OperatingMode::NoteInput);
        assert_eq!(config.sensitivity, 0.02);
        assert_eq!(config.gate, GatePolicy::Hysteresis { release_ratio: 0.6 });
        assert_eq!(config.yin.method, DifferenceMethod::Fft);
        assert_eq!(config.yin.threshold, 0.15);
        assert_eq!(config.gain, 1.0);
        config.validate().unwrap();
    }

    #[test]
    fn toml_round_trip() {
        let config = EngineConfig {
            gate: GatePolicy::Hysteresis { release_ratio: 0.5 },
            mode: OperatingMode::Recording,
            ..EngineConfig::default()
        };
        let text = config.to_toml().unwrap();
        let restored: EngineConfig = toml::from_str(&text).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn rejects_out_of_range_values() {
        fn with(change: fn(&mut EngineConfig)) -> EngineConfig {
            let mut config = EngineConfig::default();
            change(&mut config);
            config
        }
        let cases = [
            with(|c| c.frame_size = 2),
            with(|c| c.tick_hz = 0.0),
            with(|c| c.tick_hz = 1e-30),
            with(|c| c.tick_hz = 5000.0),
            with(|c| c.tick_hz = f32::NAN),
            with(|c| c.gain = 0.0),
            with(|c| c.sensitivity = -0.1),
            with(|c| c.meter_smoothing = 1.0),
            with(|c| c.gate = GatePolicy::Hysteresis { release_ratio: 1.5 }),
            with(|c| c.yin.threshold = 0.0),
        ];
        for config in cases {
            let result = config.validate();
            assert!(matches!(result, Err(ConfigError::Invalid(_))), "{:?}", config);
        }
    }

    #[test]
    fn load_reports_missing_file() {
        let err = EngineConfig::load(Path::new("/nonexistent/voicekey.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }
}
