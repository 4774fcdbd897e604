//! # Recording Module
//!
//! Rebuilds a symbolic performance from the tracker's event stream while a
//! recording is open, and seals it into an immutable [`RecordingSession`]
//! when the recording stops.
//!
//! Notes shorter than the minimum duration are treated as blips and dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::tracker::{NoteEvent, NoteEventKind, Transition};
use crate::tuning::{ParseNoteError, PitchIndex};

/// Shortest span, in seconds, kept as a note.
pub const MIN_NOTE_DURATION: f64 = 0.05;

// Absorbs subtraction round-off so a span of exactly the minimum is kept.
const DURATION_EPSILON: f64 = 1e-9;

/// A note in a finished recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedNote {
    /// Note label, e.g. "C#4".
    pub note: String,
    /// Start offset from the beginning of the recording, in seconds.
    pub time: f64,
    /// Length in seconds.
    pub duration: f64,
}

/// A sealed recording.
///
/// There are no mutators; once returned from [`RecordingSegmenter::stop`] the
/// note list is final.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingSession {
    id: Uuid,
    timestamp: DateTime<Utc>,
    notes: Vec<RecordedNote>,
    audio_asset: Option<String>,
}

impl RecordingSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wall-clock time the recording started.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Notes in performance order.
    pub fn notes(&self) -> &[RecordedNote] {
        &self.notes
    }

    /// Reference to the audio captured alongside, owned by whoever stored it.
    pub fn audio_asset(&self) -> Option<&str> {
        self.audio_asset.as_deref()
    }

    /// Attaches the reference to externally stored audio. The notes are untouched.
    pub fn with_audio_asset(self, audio_asset: impl Into<String>) -> Self {
        Self {
            audio_asset: Some(audio_asset.into()),
            ..self
        }
    }

    /// Total length from the recording start to the end of the last note.
    pub fn duration(&self) -> f64 {
        self.notes
            .iter()
            .map(|n| n.time + n.duration)
            .fold(0.0, f64::max)
    }

    /// Expands the session into Attack/Release events relative to playback start.
    pub fn playback_events(&self) -> Result<Vec<NoteEvent>, ParseNoteError> {
        let mut events = Vec::with_capacity(self.notes.len() * 2);
        for note in &self.notes {
            let pitch: PitchIndex = note.note.parse()?;
            events.push(NoteEvent::attack(pitch, note.time));
            events.push(NoteEvent::release(pitch, note.time + note.duration));
        }
        Ok(events)
    }
}

/// Where the segmenter is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingPhase {
    NotStarted,
    Recording,
    /// Only observable while `stop` is sealing the session.
    Finalizing,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordingError {
    #[error("a recording is already in progress")]
    AlreadyRecording,
    #[error("no recording is in progress")]
    NotRecording,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct OpenNote {
    pitch: PitchIndex,
    start_offset: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct ActiveRecording {
    id: Uuid,
    timestamp: DateTime<Utc>,
    start_time: f64,
    open: Option<OpenNote>,
    notes: Vec<RecordedNote>,
}

impl ActiveRecording {
    fn close_open_note(&mut self, time: f64, min_note_duration: f64) {
        let Some(open) = self.open.take() else {
            return;
        };
        let duration = time - self.start_time - open.start_offset;
        if duration + DURATION_EPSILON >= min_note_duration {
            self.notes.push(RecordedNote {
                note: open.pitch.name(),
                time: open.start_offset,
                duration,
            });
        } else {
            debug!(note = %open.pitch, duration, "dropping short note");
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum State {
    NotStarted,
    Recording(ActiveRecording),
    Finalizing,
    Complete,
}

/// Collects recorded notes from Attack/Release events.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSegmenter {
    state: State,
    min_note_duration: f64,
}

impl Default for RecordingSegmenter {
    fn default() -> Self {
        Self::new(MIN_NOTE_DURATION)
    }
}

impl RecordingSegmenter {
    pub fn new(min_note_duration: f64) -> Self {
        Self {
            state: State::NotStarted,
            min_note_duration,
        }
    }

    pub fn phase(&self) -> RecordingPhase {
        match self.state {
            State::NotStarted => RecordingPhase::NotStarted,
            State::Recording(_) => RecordingPhase::Recording,
            State::Finalizing => RecordingPhase::Finalizing,
            State::Complete => RecordingPhase::Complete,
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, State::Recording(_))
    }

    /// Notes kept so far in the open recording.
    pub fn notes(&self) -> &[RecordedNote] {
        match &self.state {
            State::Recording(active) => &active.notes,
            _ => &[],
        }
    }

    /// Opens a new session starting at `now` (driver clock seconds).
    pub fn start(&mut self, now: f64) -> Result<(), RecordingError> {
        if self.is_recording() {
            return Err(RecordingError::AlreadyRecording);
        }
        let active = ActiveRecording {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            start_time: now,
            open: None,
            notes: Vec::new(),
        };
        info!(id = %active.id, "recording started");
        self.state = State::Recording(active);
        Ok(())
    }

    /// Feeds one tracker event. Ignored unless a recording is open.
    pub fn observe(&mut self, event: &NoteEvent) {
        let State::Recording(active) = &mut self.state else {
            return;
        };
        match event.kind {
            NoteEventKind::Attack => {
                // Monophonic: a new attack ends whatever is still open.
                active.close_open_note(event.time, self.min_note_duration);
                active.open = Some(OpenNote {
                    pitch: event.pitch,
                    start_offset: event.time - active.start_time,
                });
            }
            NoteEventKind::Release => {
                if active.open.map(|open| open.pitch) == Some(event.pitch) {
                    active.close_open_note(event.time, self.min_note_duration);
                }
            }
        }
    }

    /// Feeds every event of a transition in order.
    pub fn observe_transition(&mut self, transition: &Transition) {
        for event in transition.events() {
            self.observe(&event);
        }
    }

    /// Ends the recording at `now` and returns the sealed session.
    ///
    /// A note still open is closed as if released at `now`, subject to the
    /// same minimum duration.
    pub fn stop(
        &mut self,
        now: f64,
        audio_asset: Option<String>,
    ) -> Result<RecordingSession, RecordingError> {
        let mut active = match std::mem::replace(&mut self.state, State::Finalizing) {
            State::Recording(active) => active,
            other => {
                self.state = other;
                return Err(RecordingError::NotRecording);
            }
        };

        active.close_open_note(now, self.min_note_duration);
        let session = RecordingSession {
            id: active.id,
            timestamp: active.timestamp,
            notes: active.notes,
            audio_asset,
        };
        self.state = State::Complete;

        info!(id = %session.id, notes = session.notes.len(), "recording complete");
        Ok(session)
    }
}
