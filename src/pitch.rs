//! Pitch spelling: letter name, chromatic alteration and octave.

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;

/// The seven letter names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Step {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl Step {
    /// Semitones above C within an octave.
    pub fn semitones(&self) -> i32 {
        match self {
            Step::C => 0,
            Step::D => 2,
            Step::E => 4,
            Step::F => 5,
            Step::G => 7,
            Step::A => 9,
            Step::B => 11,
        }
    }

    /// The MusicXML step letter.
    pub fn letter(&self) -> &'static str {
        match self {
            Step::C => "C",
            Step::D => "D",
            Step::E => "E",
            Step::F => "F",
            Step::G => "G",
            Step::A => "A",
            Step::B => "B",
        }
    }

    pub fn from_letter(letter: &str) -> Option<Step> {
        match letter {
            "C" => Some(Step::C),
            "D" => Some(Step::D),
            "E" => Some(Step::E),
            "F" => Some(Step::F),
            "G" => Some(Step::G),
            "A" => Some(Step::A),
            "B" => Some(Step::B),
            _ => None,
        }
    }
}

/// A spelled pitch. `alter` is the chromatic alteration in semitones
/// (-2 double flat .. 2 double sharp); middle C is C4.
///
/// Ordering and equality compare sounding pitch (MIDI number), so C#4 and
/// Db4 compare equal while remaining distinct spellings.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Pitch {
    pub step: Step,
    pub alter: i32,
    pub octave: i32,
}

impl Pitch {
    pub fn new(step: Step, alter: i32, octave: i32) -> Pitch {
        Pitch { step, alter, octave }
    }

    /// The MIDI note number; C4 = 60.
    pub fn to_midi(&self) -> i32 {
        (self.octave + 1) * 12 + self.step.semitones() + self.alter
    }

    /// True if `other` is the same spelled pitch, not merely the same
    /// sounding pitch.
    pub fn equals_in_spelling(&self, other: &Pitch) -> bool {
        self.step == other.step && self.alter == other.alter && self.octave == other.octave
    }
}

impl PartialEq for Pitch {
    fn eq(&self, other: &Pitch) -> bool {
        self.to_midi() == other.to_midi()
    }
}

impl Eq for Pitch {}

impl Ord for Pitch {
    fn cmp(&self, other: &Pitch) -> Ordering {
        self.to_midi().cmp(&other.to_midi())
    }
}

impl PartialOrd for Pitch {
    fn partial_cmp(&self, other: &Pitch) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.step.letter())?;
        match self.alter.cmp(&0) {
            Ordering::Greater => {
                for _ in 0..self.alter {
                    write!(f, "#")?;
                }
            }
            Ordering::Less => {
                for _ in 0..-self.alter {
                    write!(f, "b")?;
                }
            }
            Ordering::Equal => {}
        }
        write!(f, "{}", self.octave)
    }
}
