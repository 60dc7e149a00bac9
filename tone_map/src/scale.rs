//! The two eight-slot scales the hand moves through.
//!
//! Each scale spans one octave from middle C in exactly [`NOTE_SLOTS`]
//! frequencies.  The eyebrows pick which one sounds.

use serde::{Deserialize, Serialize};

/// Number of note bands the frame height is split into.
pub const NOTE_SLOTS: usize = 8;

/// Display names for each slot, top of the frame first.
pub const NOTE_NAMES: [&str; NOTE_SLOTS] = ["C", "D", "E", "F", "G", "A", "B", "C"];

const MAJOR_HZ: [f32; NOTE_SLOTS] =
    [261.63, 293.66, 329.63, 349.23, 392.00, 440.00, 493.88, 523.25];
const MINOR_HZ: [f32; NOTE_SLOTS] =
    [261.63, 293.66, 311.13, 349.23, 392.00, 415.30, 493.88, 523.25];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleKind {
    Major,
    Minor,
}

impl ScaleKind {
    pub fn name(self) -> &'static str {
        match self {
            ScaleKind::Major => "major",
            ScaleKind::Minor => "minor",
        }
    }
}

/// An ordered octave of eight frequencies (Hz).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Scale {
    pub kind:        ScaleKind,
    pub frequencies: [f32; NOTE_SLOTS],
}

impl Scale {
    pub fn major() -> Self {
        Scale { kind: ScaleKind::Major, frequencies: MAJOR_HZ }
    }

    /// Minor variant: flattened third and sixth over the major set.
    pub fn minor() -> Self {
        Scale { kind: ScaleKind::Minor, frequencies: MINOR_HZ }
    }

    /// Raised brows → major, otherwise minor.
    pub fn for_eyebrows(raised: bool) -> Self {
        if raised { Scale::major() } else { Scale::minor() }
    }

    /// Frequency of slot `index`; indices past the top clamp to the last slot.
    pub fn frequency(&self, index: usize) -> f32 {
        self.frequencies[index.min(NOTE_SLOTS - 1)]
    }
}

/// Display name of a slot.
pub fn note_name(index: usize) -> &'static str {
    NOTE_NAMES[index.min(NOTE_SLOTS - 1)]
}
