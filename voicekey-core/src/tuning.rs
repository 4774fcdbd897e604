//! # Musical Tuning Module
//!
//! Equal-temperament helpers for turning detected frequencies into discrete
//! pitches and back.
//!
//! ## Features
//! - Frequency to semitone index quantization (A4 = 440 Hz = 69)
//! - Note labels such as "A4", "C#3" or "B-2" for any index, including negative ones
//! - Label parsing with sharps and flats
//! - Cent deviation calculations for metering

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Reference pitch in Hz for index 69.
pub const A4_FREQUENCY: f32 = 440.0;

/// Index of the reference pitch.
pub const A4_INDEX: i32 = 69;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// A semitone count relative to the reference, with A4 at 69.
///
/// The range is not clamped to any instrument; a low enough voice simply
/// yields a small or negative index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PitchIndex(pub i32);

impl PitchIndex {
    /// Maps a frequency to the nearest equal-tempered pitch.
    ///
    /// Returns `None` for zero, negative or non-finite input. Index 0 is a real
    /// pitch (C-1) so it is never used as a fallback.
    pub fn from_frequency(freq: f32) -> Option<Self> {
        if !freq.is_finite() || freq <= 0.0 {
            return None;
        }
        let semitones = 12.0 * (freq / A4_FREQUENCY).log2();
        Some(Self(A4_INDEX + semitones.round() as i32))
    }

    /// Pitch class in `0..12`, with 0 = C.
    pub fn pitch_class(self) -> usize {
        (((self.0 % 12) + 12) % 12) as usize
    }

    /// Scientific-pitch octave number (C4 is middle C).
    pub fn octave(self) -> i32 {
        self.0.div_euclid(12) - 1
    }

    /// Human-readable label, e.g. "A4".
    pub fn name(self) -> String {
        self.to_string()
    }

    /// Equal-temperament frequency of this pitch in Hz.
    pub fn frequency(self) -> f32 {
        A4_FREQUENCY * 2.0_f32.powf((self.0 - A4_INDEX) as f32 / 12.0)
    }
}

impl fmt::Display for PitchIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", NOTE_NAMES[self.pitch_class()], self.octave())
    }
}

/// Failure to read a note label.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid note label `{0}`")]
pub struct ParseNoteError(pub String);

impl FromStr for PitchIndex {
    type Err = ParseNoteError;

    /// Parses labels like "A4", "C#3", "Bb2" or "B-2".
    fn from_str(label: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseNoteError(label.to_string());
        let mut chars = label.chars();

        let class: i32 = match chars.next().ok_or_else(invalid)? {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(invalid()),
        };

        let rest = chars.as_str();
        let (shift, octave_text) = if let Some(stripped) = rest.strip_prefix('#') {
            (1, stripped)
        } else if let Some(stripped) = rest.strip_prefix('b') {
            (-1, stripped)
        } else {
            (0, rest)
        };

        let octave: i32 = octave_text.parse().map_err(|_| invalid())?;
        Ok(Self((octave + 1) * 12 + class + shift))
    }
}

/// Calculates the deviation from a target frequency in cents.
///
/// 100 cents make a semitone; positive values are sharp, negative flat.
pub fn calculate_cents_deviation(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}
