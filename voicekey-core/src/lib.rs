// voicekey-core/src/lib.rs

//! The core logic for the voice-driven virtual keyboard.
//! This crate turns a live microphone signal into monophonic note events:
//! pitch detection, note tracking and recording segmentation. It is
//! completely headless and contains no UI or synthesizer code.

pub mod audio;
pub mod config;
pub mod driver;
pub mod engine;
pub mod fft;
pub mod frame;
pub mod pitch;
pub mod recording;
pub mod tracker;
pub mod tuning;

pub use config::{ConfigError, EngineConfig};
pub use driver::{Command, Driver, EngineOutput, FrameSource};
pub use engine::{Engine, ModeSwitch, OperatingMode, TickReport};
pub use frame::{AudioFrame, FrameError};
pub use pitch::{DifferenceMethod, PitchEstimator, YinConfig};
pub use recording::{
    RecordedNote, RecordingError, RecordingPhase, RecordingSegmenter, RecordingSession,
};
pub use tracker::{GatePolicy, NoteEvent, NoteEventKind, Transition};
pub use tuning::PitchIndex;
