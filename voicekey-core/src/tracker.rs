//! # Note Tracking Module
//!
//! Turns the per-frame stream of pitch estimates into discrete Attack and
//! Release events for a monophonic instrument.
//!
//! Two pieces cooperate on every tick:
//! - [`Gate`] decides from the frame level and the operating mode whether
//!   notes may sound at all.
//! - [`NoteTracker`] compares the current pitch against the note it holds
//!   and emits a [`Transition`] only when something changes.
//!
//! The pitch index itself is not smoothed. A voice hovering on the boundary
//! between two semitones will alternate between them.

use serde::{Deserialize, Serialize};

use crate::tuning::PitchIndex;

/// Whether a note starts or ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteEventKind {
    Attack,
    Release,
}

/// A single onset or offset, timestamped in seconds on the driver clock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub kind: NoteEventKind,
    pub pitch: PitchIndex,
    pub time: f64,
}

impl NoteEvent {
    pub fn attack(pitch: PitchIndex, time: f64) -> Self {
        Self {
            kind: NoteEventKind::Attack,
            pitch,
            time,
        }
    }

    pub fn release(pitch: PitchIndex, time: f64) -> Self {
        Self {
            kind: NoteEventKind::Release,
            pitch,
            time,
        }
    }

    /// Note label for the synthesizer, e.g. "A4".
    pub fn label(&self) -> String {
        self.pitch.name()
    }
}

/// The events produced by one tracker update.
///
/// When both are present the release always comes first.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transition {
    pub release: Option<NoteEvent>,
    pub attack: Option<NoteEvent>,
}

impl Transition {
    pub fn is_empty(&self) -> bool {
        self.release.is_none() && self.attack.is_none()
    }

    /// Events in emission order.
    pub fn events(&self) -> impl Iterator<Item = NoteEvent> + '_ {
        self.release.iter().chain(self.attack.iter()).copied()
    }
}

/// How the amplitude gate opens and closes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatePolicy {
    /// Armed exactly while the level is above the sensitivity.
    #[default]
    Instantaneous,
    /// Opens above the sensitivity, closes only once the level falls to
    /// `sensitivity * release_ratio` or below.
    Hysteresis { release_ratio: f32 },
}

/// Amplitude gate deciding whether note production is armed.
///
/// Always fed the instantaneous RMS of the frame, never a smoothed level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gate {
    policy: GatePolicy,
    armed: bool,
}

impl Gate {
    pub fn new(policy: GatePolicy) -> Self {
        Self {
            policy,
            armed: false,
        }
    }

    pub fn policy(&self) -> GatePolicy {
        self.policy
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Updates and returns the armed state for this tick.
    pub fn update(&mut self, rms: f32, sensitivity: f32, notes_permitted: bool) -> bool {
        self.armed = if !notes_permitted {
            false
        } else {
            match self.policy {
                GatePolicy::Instantaneous => rms > sensitivity,
                GatePolicy::Hysteresis { release_ratio } => {
                    if self.armed {
                        rms > sensitivity * release_ratio
                    } else {
                        rms > sensitivity
                    }
                }
            }
        };
        self.armed
    }

    /// Closes the gate immediately, e.g. on a mode switch.
    pub fn close(&mut self) {
        self.armed = false;
    }
}

/// Holds at most one sounding note and reports changes to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NoteTracker {
    active: Option<PitchIndex>,
}

impl NoteTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The note currently held, if any.
    pub fn active(&self) -> Option<PitchIndex> {
        self.active
    }

    /// Feeds one tick worth of input.
    ///
    /// # Arguments
    /// * `pitch` - Quantized estimate for this frame
    /// * `armed` - Gate state for this frame
    /// * `time` - Timestamp attached to any emitted events
    pub fn update(&mut self, pitch: Option<PitchIndex>, armed: bool, time: f64) -> Transition {
        match (armed, pitch) {
            (true, Some(pitch)) if self.active == Some(pitch) => Transition::default(),
            (true, Some(pitch)) => {
                let release = self.active.map(|held| NoteEvent::release(held, time));
                self.active = Some(pitch);
                Transition {
                    release,
                    attack: Some(NoteEvent::attack(pitch, time)),
                }
            }
            _ => self.release_all(time),
        }
    }

    /// Releases the held note, if there is one.
    pub fn release_all(&mut self, time: f64) -> Transition {
        Transition {
            release: self.active.take().map(|held| NoteEvent::release(held, time)),
            attack: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A4: PitchIndex = PitchIndex(69);
    const B4: PitchIndex = PitchIndex(71);

    #[test]
    fn sustained_pitch_attacks_once() {
        let mut tracker = NoteTracker::new();
        let mut attacks = 0;
        let mut releases = 0;
        for tick in 0..10 {
            let transition = tracker.update(Some(A4), true, tick as f64 / 60.0);
            for event in transition.events() {
                match event.kind {
                    NoteEventKind::Attack => attacks += 1,
                    NoteEventKind::Release => releases += 1,
                }
            }
        }
        assert_eq!(attacks, 1);
        assert_eq!(releases, 0);
        assert_eq!(tracker.active(), Some(A4));
    }

    #[test]
    fn pitch_change_releases_before_attacking() {
        let mut tracker = NoteTracker::new();
        tracker.update(Some(A4), true, 0.0);
        let transition = tracker.update(Some(B4), true, 0.5);
        let events: Vec<_> = transition.events().collect();
        assert_eq!(events, vec![NoteEvent::release(A4, 0.5), NoteEvent::attack(B4, 0.5)]);
        assert_eq!(tracker.active(), Some(B4));
    }

    #[test]
    fn disarm_releases_exactly_once() {
        let mut tracker = NoteTracker::new();
        tracker.update(Some(A4), true, 0.0);

        let first = tracker.update(Some(A4), false, 0.1);
        assert_eq!(first.release, Some(NoteEvent::release(A4, 0.1)));
        assert_eq!(first.attack, None);

        let second = tracker.update(Some(A4), false, 0.2);
        assert!(second.is_empty());
        assert_eq!(tracker.active(), None);
    }

    #[test]
    fn losing_the_pitch_releases() {
        let mut tracker = NoteTracker::new();
        tracker.update(Some(A4), true, 0.0);
        let transition = tracker.update(None, true, 0.1);
        assert_eq!(transition.release, Some(NoteEvent::release(A4, 0.1)));
        assert!(tracker.update(None, true, 0.2).is_empty());
    }

    #[test]
    fn nothing_happens_while_idle() {
        let mut tracker = NoteTracker::new();
        assert!(tracker.update(Some(A4), false, 0.0).is_empty());
        assert!(tracker.update(None, false, 0.1).is_empty());
        assert!(tracker.release_all(0.2).is_empty());
    }

    #[test]
    fn instantaneous_gate_follows_level() {
        let mut gate = Gate::new(GatePolicy::Instantaneous);
        assert!(gate.update(0.05, 0.01, true));
        assert!(!gate.update(0.009, 0.01, true));
        assert!(!gate.update(0.01, 0.01, true));
        assert!(!gate.update(0.5, 0.01, false));
    }

    #[test]
    fn hysteresis_gate_holds_through_shallow_dip() {
        let mut gate = Gate::new(GatePolicy::Hysteresis { release_ratio: 0.5 });
        assert_eq!(gate.policy(), GatePolicy::Hysteresis { release_ratio: 0.5 });
        assert!(!gate.update(0.008, 0.01, true));
        assert!(gate.update(0.02, 0.01, true));
        assert!(gate.is_armed());
        // Below the sensitivity but above the release level.
        assert!(gate.update(0.007, 0.01, true));
        assert!(!gate.update(0.004, 0.01, true));
        // Re-arming needs the full sensitivity again.
        assert!(!gate.update(0.007, 0.01, true));
    }

    #[test]
    fn mode_denial_overrides_hysteresis() {
        let mut gate = Gate::new(GatePolicy::Hysteresis { release_ratio: 0.5 });
        assert!(gate.update(0.5, 0.01, true));
        assert!(!gate.update(0.5, 0.01, false));

        gate.update(0.5, 0.01, true);
        gate.close();
        assert!(!gate.is_armed());
    }
}
