//! # Engine Module
//!
//! The explicit per-stream state object. One [`Engine`] is owned by the
//! driver loop and handed to each tick by exclusive reference, so the held
//! note, the open recording and the current mode never need locking.
//!
//! ## Tick pipeline
//! 1. Instantaneous RMS of the gain-boosted frame (gate) and a smoothed copy (meter)
//! 2. YIN estimate, quantized to a pitch index
//! 3. Gate and tracker produce a [`Transition`]
//! 4. While recording, the transition is fed to the segmenter

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::frame::AudioFrame;
use crate::pitch::PitchEstimator;
use crate::recording::{RecordingPhase, RecordingSegmenter, RecordingSession};
use crate::tracker::{Gate, NoteEvent, NoteTracker, Transition};
use crate::tuning::{calculate_cents_deviation, PitchIndex};

/// What the engine is doing with the voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    /// Listening only; no notes.
    #[default]
    Idle,
    /// Voice plays the virtual keyboard.
    NoteInput,
    /// Voice is routed to the output unchanged; no notes.
    VoicePassthrough,
    /// Like `NoteInput`, and every note is captured into a session.
    Recording,
}

impl OperatingMode {
    pub fn permits_notes(self) -> bool {
        matches!(self, OperatingMode::NoteInput | OperatingMode::Recording)
    }
}

/// User-adjustable values read on every tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    pub sensitivity: f32,
    pub gain: f32,
    pub monitor_enabled: bool,
}

/// Exponentially smoothed level for display.
///
/// Never consulted by the gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelMeter {
    smoothing: f32,
    level: f32,
}

impl LevelMeter {
    pub fn new(smoothing: f32) -> Self {
        Self {
            smoothing,
            level: 0.0,
        }
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn update(&mut self, rms: f32) -> f32 {
        self.level = self.smoothing * self.level + (1.0 - self.smoothing) * rms;
        self.level
    }
}

/// Everything one tick observed and produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub time: f64,
    pub frequency: Option<f32>,
    pub pitch: Option<PitchIndex>,
    /// Offset of `frequency` from the centre of `pitch`.
    pub cents_deviation: Option<f32>,
    /// Instantaneous level used by the gate.
    pub rms: f32,
    /// Smoothed level for metering.
    pub level: f32,
    pub armed: bool,
    pub transition: Transition,
}

/// Result of a mode change.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeSwitch {
    pub previous: OperatingMode,
    pub current: OperatingMode,
    /// Held note released because the new mode does not produce notes.
    pub release: Option<NoteEvent>,
    /// Session sealed because recording ended.
    pub session: Option<RecordingSession>,
}

#[derive(Debug)]
pub struct Engine {
    estimator: PitchEstimator,
    gate: Gate,
    tracker: NoteTracker,
    segmenter: RecordingSegmenter,
    meter: LevelMeter,
    mode: OperatingMode,
    settings: Settings,
}

impl Engine {
    /// Builds an engine in `config.mode`. Starting in `Recording` opens a
    /// session at time 0.
    pub fn new(config: &EngineConfig) -> Self {
        let mut engine = Self {
            estimator: PitchEstimator::new(config.yin),
            gate: Gate::new(config.gate),
            tracker: NoteTracker::new(),
            segmenter: RecordingSegmenter::new(config.min_note_duration),
            meter: LevelMeter::new(config.meter_smoothing),
            mode: OperatingMode::Idle,
            settings: Settings {
                sensitivity: config.sensitivity,
                gain: config.gain,
                monitor_enabled: config.monitor_enabled,
            },
        };
        engine.set_mode(config.mode, 0.0);
        engine
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn active_note(&self) -> Option<PitchIndex> {
        self.tracker.active()
    }

    pub fn recording_phase(&self) -> RecordingPhase {
        self.segmenter.phase()
    }

    pub fn level(&self) -> f32 {
        self.meter.level()
    }

    /// True when the live voice should be heard on the output.
    pub fn voice_routed(&self) -> bool {
        self.mode == OperatingMode::VoicePassthrough || self.settings.monitor_enabled
    }

    /// Ignored unless finite and non-negative.
    pub fn set_sensitivity(&mut self, sensitivity: f32) {
        if sensitivity.is_finite() && sensitivity >= 0.0 {
            self.settings.sensitivity = sensitivity;
        } else {
            warn!(sensitivity, "ignoring invalid sensitivity");
        }
    }

    /// Ignored unless finite and positive.
    pub fn set_gain(&mut self, gain: f32) {
        if gain.is_finite() && gain > 0.0 {
            self.settings.gain = gain;
        } else {
            warn!(gain, "ignoring invalid gain");
        }
    }

    pub fn set_monitor(&mut self, enabled: bool) {
        self.settings.monitor_enabled = enabled;
    }

    /// Runs the full analysis pipeline on one frame.
    pub fn tick(&mut self, frame: &AudioFrame, now: f64) -> TickReport {
        let rms = frame.rms(self.settings.gain);
        let level = self.meter.update(rms);

        let frequency = self.estimator.estimate(frame);
        let pitch = frequency.and_then(PitchIndex::from_frequency);
        let cents_deviation = match (frequency, pitch) {
            (Some(freq), Some(pitch)) => Some(calculate_cents_deviation(freq, pitch.frequency())),
            _ => None,
        };

        let armed = self
            .gate
            .update(rms, self.settings.sensitivity, self.mode.permits_notes());
        let transition = self.tracker.update(pitch, armed, now);
        self.segmenter.observe_transition(&transition);

        for event in transition.events() {
            debug!(kind = ?event.kind, note = %event.pitch, time = event.time, "note event");
        }

        TickReport {
            time: now,
            frequency,
            pitch,
            cents_deviation,
            rms,
            level,
            armed,
            transition,
        }
    }

    /// Switches mode between ticks.
    ///
    /// Leaving note production releases the held note at `now`. Entering
    /// `Recording` opens a session; leaving it seals and returns the session.
    pub fn set_mode(&mut self, mode: OperatingMode, now: f64) -> ModeSwitch {
        let previous = self.mode;
        if mode == previous {
            return ModeSwitch {
                previous,
                current: mode,
                release: None,
                session: None,
            };
        }

        let mut release = None;
        if !mode.permits_notes() {
            self.gate.close();
            release = self.tracker.release_all(now).release;
            if let Some(event) = &release {
                self.segmenter.observe(event);
            }
        }

        let mut session = None;
        if previous == OperatingMode::Recording {
            match self.segmenter.stop(now, None) {
                Ok(finished) => session = Some(finished),
                Err(e) => warn!("could not stop recording: {}", e),
            }
        }
        if mode == OperatingMode::Recording {
            match self.segmenter.start(now) {
                // A note already sounding is recorded from this point on.
                Ok(()) => {
                    if let Some(held) = self.tracker.active() {
                        self.segmenter.observe(&NoteEvent::attack(held, now));
                    }
                }
                Err(e) => warn!("could not start recording: {}", e),
            }
        }

        self.mode = mode;
        info!(from = ?previous, to = ?mode, "mode changed");
        ModeSwitch {
            previous,
            current: mode,
            release,
            session,
        }
    }

    /// Releases everything and closes any open recording.
    pub fn shutdown(&mut self, now: f64) -> ModeSwitch {
        self.set_mode(OperatingMode::Idle, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::NoteEventKind;

    const SAMPLE_RATE: u32 = 44100;

    fn sine_frame(frequency: f32, amplitude: f32) -> AudioFrame {
        let samples = (0..1024)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE as f32;
                amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
            })
            .collect();
        AudioFrame::new(samples, SAMPLE_RATE).unwrap()
    }

    fn engine_in(mode: OperatingMode) -> Engine {
        Engine::new(&EngineConfig {
            mode,
            ..EngineConfig::default()
        })
    }

    #[test]
    fn sustained_voice_attacks_once() {
        let mut engine = engine_in(OperatingMode::NoteInput);
        let frame = sine_frame(440.0, 0.5);
        let events: Vec<_> = (0..10)
            .flat_map(|tick| {
                let report = engine.tick(&frame, tick as f64 / 60.0);
                report.transition.events().collect::<Vec<_>>()
            })
            .collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, NoteEventKind::Attack);
        assert_eq!(events[0].label(), "A4");
        assert_eq!(engine.active_note(), Some(PitchIndex(69)));
    }

    #[test]
    fn idle_mode_reports_pitch_without_notes() {
        let mut engine = engine_in(OperatingMode::Idle);
        let report = engine.tick(&sine_frame(440.0, 0.5), 0.0);
        assert_eq!(report.pitch, Some(PitchIndex(69)));
        assert!(!report.armed);
        assert!(report.transition.is_empty());
        assert!(report.cents_deviation.unwrap().abs() < 20.0);
    }

    #[test]
    fn quiet_voice_is_gated() {
        let mut engine = engine_in(OperatingMode::NoteInput);
        engine.set_sensitivity(0.2);
        assert_eq!(engine.settings().sensitivity, 0.2);
        let report = engine.tick(&sine_frame(440.0, 0.1), 0.0);
        assert!(!report.armed);
        assert!(report.transition.is_empty());
    }

    #[test]
    fn gain_boost_arms_gate() {
        let mut engine = engine_in(OperatingMode::NoteInput);
        engine.set_sensitivity(0.2);
        engine.set_gain(4.0);
        let report = engine.tick(&sine_frame(440.0, 0.1), 0.0);
        assert!(report.armed);
        assert!(report.transition.attack.is_some());
    }

    #[test]
    fn invalid_settings_are_ignored() {
        let mut engine = engine_in(OperatingMode::NoteInput);
        engine.set_sensitivity(f32::NAN);
        engine.set_sensitivity(-0.5);
        engine.set_gain(0.0);
        engine.set_gain(f32::INFINITY);
        assert_eq!(engine.settings().sensitivity, 0.01);
        assert_eq!(engine.settings().gain, 1.0);

        // The gate still arms with the previous values.
        let report = engine.tick(&sine_frame(440.0, 0.5), 0.0);
        assert!(report.armed);
        assert!(report.transition.attack.is_some());
    }

    #[test]
    fn amplitude_drop_releases_once() {
        let mut engine = engine_in(OperatingMode::NoteInput);
        engine.set_sensitivity(0.1);
        engine.tick(&sine_frame(440.0, 0.5), 0.0);

        // Still pitched and audible, but under the sensitivity.
        let quiet = sine_frame(440.0, 0.05);
        let first = engine.tick(&quiet, 0.1);
        let second = engine.tick(&quiet, 0.2);
        assert_eq!(first.transition.release.map(|e| e.kind), Some(NoteEventKind::Release));
        assert!(second.transition.is_empty());
    }

    #[test]
    fn mode_switch_forces_release() {
        let mut engine = engine_in(OperatingMode::NoteInput);
        engine.tick(&sine_frame(440.0, 0.5), 0.0);

        let switch = engine.set_mode(OperatingMode::VoicePassthrough, 0.3);
        assert_eq!(switch.release, Some(NoteEvent::release(PitchIndex(69), 0.3)));
        assert!(engine.voice_routed());

        // The voice keeps going but no further events appear.
        let report = engine.tick(&sine_frame(440.0, 0.5), 0.4);
        assert!(report.transition.is_empty());
    }

    #[test]
    fn recording_mode_produces_session() {
        let mut engine = engine_in(OperatingMode::Idle);
        engine.set_mode(OperatingMode::Recording, 1.0);
        assert_eq!(engine.recording_phase(), RecordingPhase::Recording);

        engine.tick(&sine_frame(440.0, 0.5), 1.1);
        engine.tick(&sine_frame(440.0, 0.5), 1.2);
        engine.tick(&sine_frame(523.25, 0.5), 1.5);

        let switch = engine.set_mode(OperatingMode::NoteInput, 2.0);
        let session = switch.session.expect("session sealed");
        let labels: Vec<_> = session.notes().iter().map(|n| n.note.as_str()).collect();
        assert_eq!(labels, vec!["A4", "C5"]);
        assert!((session.notes()[0].time - 0.1).abs() < 1e-9);
        assert!((session.notes()[1].duration - 0.5).abs() < 1e-9);
        assert_eq!(engine.recording_phase(), RecordingPhase::Complete);
        // Switching between note-producing modes keeps the note sounding.
        assert_eq!(switch.release, None);
        assert_eq!(engine.active_note(), Some(PitchIndex(72)));
    }

    #[test]
    fn recording_picks_up_held_note() {
        let mut engine = engine_in(OperatingMode::NoteInput);
        engine.tick(&sine_frame(440.0, 0.5), 0.0);
        engine.set_mode(OperatingMode::Recording, 0.5);
        let session = engine.shutdown(1.0).session.unwrap();
        assert_eq!(session.notes().len(), 1);
        assert_eq!(session.notes()[0].note, "A4");
        assert!((session.notes()[0].duration - 0.5).abs() < 1e-9);
    }

    #[test]
    fn meter_smooths_but_gate_does_not() {
        let mut engine = engine_in(OperatingMode::NoteInput);
        let report = engine.tick(&sine_frame(440.0, 0.5), 0.0);
        assert!(report.level < report.rms);
        assert!(report.armed);
    }
}
