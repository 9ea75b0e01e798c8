//! Positional addressing and traversal over an immutable score.
//!
//! A [`Position`] names one atomic element by walking the hierarchy: part
//! index, staff number, measure number, voice number, index within the
//! voice, and optionally an index within a chord. Resolution either
//! returns the addressed element or reports precisely which component was
//! missing.

use std::rc::Rc;

use serde::Serialize;

use crate::error::LookupError;
use crate::note::{Chord, Durational, Note, Rest};
use crate::score::{Part, Score};

/// The address of one atomic element in a score. Equality and hashing are
/// structural over all present fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Position {
    part: usize,
    staff: u32,
    measure: u32,
    voice: u32,
    index: usize,
    chord_index: Option<usize>,
}

impl Position {
    pub fn new(part: usize, staff: u32, measure: u32, voice: u32, index: usize) -> Position {
        Position {
            part,
            staff,
            measure,
            voice,
            index,
            chord_index: None,
        }
    }

    /// An address into the single staff of a one-staff part.
    pub fn in_single_staff(part: usize, measure: u32, voice: u32, index: usize) -> Position {
        Position::new(part, Part::DEFAULT_STAFF, measure, voice, index)
    }

    /// The same address narrowed to one note of the chord at it.
    pub fn with_chord_index(self, chord_index: usize) -> Position {
        Position {
            chord_index: Some(chord_index),
            ..self
        }
    }

    pub fn part(&self) -> usize {
        self.part
    }

    pub fn staff(&self) -> u32 {
        self.staff
    }

    pub fn measure(&self) -> u32 {
        self.measure
    }

    pub fn voice(&self) -> u32 {
        self.voice
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn chord_index(&self) -> Option<usize> {
        self.chord_index
    }

    /// The same address without any chord narrowing.
    pub fn without_chord_index(self) -> Position {
        Position {
            chord_index: None,
            ..self
        }
    }
}

/// An element resolved from a [`Position`], borrowed from the score. A
/// chord index in the position dereferences into the chord and yields the
/// single note.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Element<'a> {
    Note(&'a Rc<Note>),
    Rest(&'a Rest),
    Chord(&'a Chord),
}

impl<'a> Element<'a> {
    pub fn as_note(&self) -> Option<&'a Rc<Note>> {
        match self {
            Element::Note(note) => Some(note),
            _ => None,
        }
    }

    pub fn as_chord(&self) -> Option<&'a Chord> {
        match self {
            Element::Chord(chord) => Some(chord),
            _ => None,
        }
    }

    pub fn is_rest(&self) -> bool {
        matches!(self, Element::Rest(_))
    }
}

impl Score {
    /// Resolves a position to the element it addresses. Each missing
    /// hierarchical component reports its own error variant.
    pub fn element_at(&self, position: &Position) -> Result<Element<'_>, LookupError> {
        let part = self
            .part(position.part())
            .ok_or(LookupError::PartNotFound(position.part()))?;
        let staff = part
            .staff(position.staff())
            .ok_or(LookupError::StaffNotFound(position.staff()))?;
        let measure = staff
            .measure(position.measure())
            .ok_or(LookupError::MeasureNotFound(position.measure()))?;
        let voice = measure
            .voice(position.voice())
            .ok_or(LookupError::VoiceNotFound(position.voice()))?;
        let durational = voice
            .get(position.index())
            .ok_or(LookupError::IndexNotFound(position.index()))?;

        match position.chord_index() {
            None => Ok(match durational {
                Durational::Note(note) => Element::Note(note),
                Durational::Rest(rest) => Element::Rest(rest),
                Durational::Chord(chord) => Element::Chord(chord),
            }),
            Some(chord_index) => {
                let note = durational
                    .as_chord()
                    .and_then(|chord| chord.note(chord_index))
                    .ok_or(LookupError::ChordIndexNotFound(chord_index))?;
                Ok(Element::Note(note))
            }
        }
    }

    /// Every element of the score with its position, in ascending part,
    /// staff, measure, voice and index order. Forward-only, single-pass;
    /// never mutates the score.
    pub fn partwise_iter(&self) -> impl Iterator<Item = (Position, &Durational)> {
        self.parts().iter().enumerate().flat_map(|(part_index, part)| {
            part.staves().flat_map(move |(staff_number, staff)| {
                staff.measures().iter().flat_map(move |measure| {
                    measure.voices().flat_map(move |(voice_number, contents)| {
                        contents.iter().enumerate().map(move |(index, durational)| {
                            (
                                Position::new(
                                    part_index,
                                    staff_number,
                                    measure.number(),
                                    voice_number,
                                    index,
                                ),
                                durational,
                            )
                        })
                    })
                })
            })
        })
    }

    /// As [`Score::partwise_iter`] restricted to the inclusive measure
    /// number range `first..=last`.
    pub fn selection(
        &self,
        first: u32,
        last: u32,
    ) -> impl Iterator<Item = (Position, &Durational)> {
        self.partwise_iter()
            .filter(move |(position, _)| (first..=last).contains(&position.measure()))
    }
}
