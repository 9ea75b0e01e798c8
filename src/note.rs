//! Finalized notated elements: notes, grace notes, rests and chords.
//!
//! Everything in this module is immutable once built. Notes are created
//! through [`crate::builder::NoteBuilder`], which resolves tie and
//! notation declarations into [`Connection`]s pointing at other finished
//! elements, never at builders.

use std::collections::BTreeSet;
use std::rc::Rc;

use serde::Serialize;

use crate::duration::Duration;
use crate::error::BuildError;
use crate::notation::{Connectable, Connection, Notation, NotationType};
use crate::pitch::Pitch;

/// Articulation marks attached to a single note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Articulation {
    Accent,
    BreathMark,
    Caesura,
    Fermata,
    Marcato,
    Staccatissimo,
    Staccato,
    Tenuto,
}

/// Ornament marks attached to a single note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Ornament {
    Trill,
    Mordent,
    InvertedMordent,
    Turn,
    InvertedTurn,
}

// ─── Note ────────────────────────────────────────────────────────────

/// An immutable pitched note with a duration, articulations, ornaments,
/// grace note attachments and its connections into notation chains.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Note {
    pitch: Pitch,
    duration: Duration,
    articulations: BTreeSet<Articulation>,
    ornaments: BTreeSet<Ornament>,
    connections: Vec<Connection>,
    preceding_grace_notes: Vec<Rc<GraceNote>>,
    succeeding_grace_notes: Vec<Rc<GraceNote>>,
}

impl Note {
    /// A plain note with no articulations or connections.
    pub fn of(pitch: Pitch, duration: Duration) -> Rc<Note> {
        Rc::new(Note {
            pitch,
            duration,
            articulations: BTreeSet::new(),
            ornaments: BTreeSet::new(),
            connections: Vec::new(),
            preceding_grace_notes: Vec::new(),
            succeeding_grace_notes: Vec::new(),
        })
    }

    pub(crate) fn from_parts(
        pitch: Pitch,
        duration: Duration,
        articulations: BTreeSet<Articulation>,
        ornaments: BTreeSet<Ornament>,
        connections: Vec<Connection>,
        preceding_grace_notes: Vec<Rc<GraceNote>>,
        succeeding_grace_notes: Vec<Rc<GraceNote>>,
    ) -> Note {
        Note {
            pitch,
            duration,
            articulations,
            ornaments,
            connections,
            preceding_grace_notes,
            succeeding_grace_notes,
        }
    }

    pub fn pitch(&self) -> Pitch {
        self.pitch
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn articulations(&self) -> impl Iterator<Item = Articulation> + '_ {
        self.articulations.iter().copied()
    }

    pub fn has_articulation(&self, articulation: Articulation) -> bool {
        self.articulations.contains(&articulation)
    }

    pub fn ornaments(&self) -> impl Iterator<Item = Ornament> + '_ {
        self.ornaments.iter().copied()
    }

    /// Grace notes played before this note.
    pub fn preceding_grace_notes(&self) -> &[Rc<GraceNote>] {
        &self.preceding_grace_notes
    }

    /// Grace notes played after this note.
    pub fn succeeding_grace_notes(&self) -> &[Rc<GraceNote>] {
        &self.succeeding_grace_notes
    }

    // ─── Notation queries ────────────────────────────────────────────

    /// Every connection this note holds, one per notation occurrence that
    /// affects it.
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// The connection for the given occurrence, if this note takes part
    /// in it.
    pub fn connection(&self, notation: &Notation) -> Option<&Connection> {
        self.connections
            .iter()
            .find(|connection| connection.notation() == notation)
    }

    /// True if this note takes any part in the given occurrence.
    pub fn has_notation(&self, notation: &Notation) -> bool {
        self.connection(notation).is_some()
    }

    /// True if this note takes part in any occurrence of the given type.
    pub fn has_notation_of_type(&self, notation_type: NotationType) -> bool {
        self.connections
            .iter()
            .any(|connection| connection.notation_type() == notation_type)
    }

    /// True if this note is the first element of the occurrence's chain.
    pub fn begins_notation(&self, notation: &Notation) -> bool {
        self.connection(notation)
            .is_some_and(|connection| connection.is_beginning())
    }

    /// True if this note is the last element of the occurrence's chain.
    pub fn ends_notation(&self, notation: &Notation) -> bool {
        self.connection(notation)
            .is_some_and(|connection| connection.is_end())
    }

    // ─── Ties ────────────────────────────────────────────────────────

    fn tie_connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections
            .iter()
            .filter(|connection| connection.notation().is_tie())
    }

    /// True if this note is tied to the following note.
    pub fn is_tied_to_following(&self) -> bool {
        self.tie_connections()
            .any(|connection| connection.following().is_some())
    }

    /// True if this note is tied from the previous note.
    pub fn is_tied_from_previous(&self) -> bool {
        self.tie_connections()
            .any(|connection| !connection.is_beginning())
    }

    /// True if this note takes part in any tie.
    pub fn is_tied(&self) -> bool {
        self.tie_connections().next().is_some()
    }

    /// The note this is tied to, if there is one.
    pub fn following_tied_note(&self) -> Option<Rc<Note>> {
        self.tie_connections()
            .filter_map(|connection| connection.following())
            .filter_map(Connectable::as_note)
            .next()
            .cloned()
    }

    /// The total duration of this note and everything it is transitively
    /// tied to, up to the first note with no following tie. Exact rational
    /// summation; a quarter tied to an eighth reports a dotted quarter's
    /// length.
    pub fn tied_duration(&self) -> Duration {
        let mut total = self.duration;
        let mut next = self.following_tied_note();
        while let Some(note) = next {
            total = total.add(&note.duration());
            next = note.following_tied_note();
        }
        total
    }
}

// ─── Grace notes ─────────────────────────────────────────────────────

/// How a grace note is performed and displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GraceNoteType {
    /// Slashed grace note taking no notated time.
    Acciaccatura,
    /// Unslashed grace note.
    Appoggiatura,
    GraceNote,
}

/// An ornamental note without a duration of its own; the duration it
/// carries is display-only. Grace notes take part in notation chains the
/// same way notes do.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraceNote {
    pitch: Pitch,
    displayable_duration: Duration,
    grace_note_type: GraceNoteType,
    articulations: BTreeSet<Articulation>,
    connections: Vec<Connection>,
}

impl GraceNote {
    pub(crate) fn from_parts(
        pitch: Pitch,
        displayable_duration: Duration,
        grace_note_type: GraceNoteType,
        articulations: BTreeSet<Articulation>,
        connections: Vec<Connection>,
    ) -> GraceNote {
        GraceNote {
            pitch,
            displayable_duration,
            grace_note_type,
            articulations,
            connections,
        }
    }

    pub fn pitch(&self) -> Pitch {
        self.pitch
    }

    /// The duration this grace note is written with. It occupies no time.
    pub fn displayable_duration(&self) -> Duration {
        self.displayable_duration
    }

    pub fn grace_note_type(&self) -> GraceNoteType {
        self.grace_note_type
    }

    pub fn has_articulation(&self, articulation: Articulation) -> bool {
        self.articulations.contains(&articulation)
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn connection(&self, notation: &Notation) -> Option<&Connection> {
        self.connections
            .iter()
            .find(|connection| connection.notation() == notation)
    }

    pub fn begins_notation(&self, notation: &Notation) -> bool {
        self.connection(notation)
            .is_some_and(|connection| connection.is_beginning())
    }

    pub fn ends_notation(&self, notation: &Notation) -> bool {
        self.connection(notation)
            .is_some_and(|connection| connection.is_end())
    }
}

// ─── Rest ────────────────────────────────────────────────────────────

/// A silence with a duration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rest {
    duration: Duration,
}

impl Rest {
    pub fn of(duration: Duration) -> Rest {
        Rest { duration }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

// ─── Chord ───────────────────────────────────────────────────────────

/// Simultaneous notes of equal duration, kept in ascending pitch order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chord {
    notes: Vec<Rc<Note>>,
}

impl Chord {
    /// Builds a chord from the given notes, sorted from the lowest pitch
    /// up. Fails on an empty collection or on notes of differing lengths.
    pub fn of(notes: Vec<Rc<Note>>) -> Result<Chord, BuildError> {
        let Some(first) = notes.first() else {
            return Err(BuildError::EmptyChord);
        };
        let duration = first.duration();
        if notes.iter().any(|note| note.duration() != duration) {
            return Err(BuildError::MismatchedChordDurations);
        }
        let mut notes = notes;
        notes.sort_by_key(|note| note.pitch());
        Ok(Chord { notes })
    }

    /// Notes already validated to share a duration and sorted ascending.
    pub(crate) fn from_sorted_notes(notes: Vec<Rc<Note>>) -> Chord {
        Chord { notes }
    }

    /// The common duration of the chord's notes.
    pub fn duration(&self) -> Duration {
        self.notes[0].duration()
    }

    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    /// The note at `index`, counting from the bottom of the chord.
    pub fn note(&self, index: usize) -> Option<&Rc<Note>> {
        self.notes.get(index)
    }

    pub fn notes(&self) -> &[Rc<Note>] {
        &self.notes
    }
}

// ─── Durational ──────────────────────────────────────────────────────

/// Any element occupying time in a voice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Durational {
    Note(Rc<Note>),
    Rest(Rest),
    Chord(Chord),
}

impl Durational {
    pub fn duration(&self) -> Duration {
        match self {
            Durational::Note(note) => note.duration(),
            Durational::Rest(rest) => rest.duration(),
            Durational::Chord(chord) => chord.duration(),
        }
    }

    pub fn is_rest(&self) -> bool {
        matches!(self, Durational::Rest(_))
    }

    pub fn is_note(&self) -> bool {
        matches!(self, Durational::Note(_))
    }

    pub fn is_chord(&self) -> bool {
        matches!(self, Durational::Chord(_))
    }

    pub fn as_note(&self) -> Option<&Rc<Note>> {
        match self {
            Durational::Note(note) => Some(note),
            _ => None,
        }
    }

    pub fn as_chord(&self) -> Option<&Chord> {
        match self {
            Durational::Chord(chord) => Some(chord),
            _ => None,
        }
    }
}
