//! Self-contained fragments extracted from arbitrary position selections.
//!
//! A [`Pattern`] is an immutable multi-voice excerpt. Extraction takes any
//! collection of positions, possibly spanning parts, staves and voices and
//! possibly non-contiguous in time, and produces a fragment whose voices
//! are renumbered densely from 1 and whose temporal gaps are closed with
//! explicit rests. The pattern keeps no reference back to the score it
//! came from.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde::Serialize;

use crate::duration::Duration;
use crate::error::LookupError;
use crate::note::{Chord, Durational, Note, Rest};
use crate::position::{Element, Position};
use crate::score::{Score, Staff};

/// A time offset from the start of a staff. `None` is zero; durations
/// themselves cannot represent an empty length.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Offset(Option<Duration>);

impl Offset {
    const ZERO: Offset = Offset(None);

    fn plus(self, duration: Duration) -> Offset {
        Offset(Some(match self.0 {
            Some(offset) => offset.add(&duration),
            None => duration,
        }))
    }

    /// `self - other` when positive, `None` when the gap is empty.
    fn gap_after(self, other: Offset) -> Option<Duration> {
        match (self.0, other.0) {
            (Some(this), Some(that)) if this > that => Some(this.subtract(&that)),
            (Some(this), None) => Some(this),
            _ => None,
        }
    }
}

/// An immutable multi-voice fragment with densely numbered voices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pattern {
    name: Option<String>,
    voices: BTreeMap<u32, Vec<Durational>>,
}

impl Pattern {
    /// The voice number of the first (or only) voice.
    pub const FIRST_VOICE: u32 = 1;

    /// A monophonic pattern from one sequence of elements.
    pub fn of_voice(contents: Vec<Durational>) -> Pattern {
        Pattern::of_voices(vec![contents])
    }

    /// A polyphonic pattern; voices are numbered from 1 in the given
    /// order.
    pub fn of_voices(voices: Vec<Vec<Durational>>) -> Pattern {
        let voices = (Pattern::FIRST_VOICE..)
            .zip(voices)
            .collect::<BTreeMap<_, _>>();
        Pattern {
            name: None,
            voices,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Pattern {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    pub fn is_monophonic(&self) -> bool {
        self.voices.len() == 1
    }

    pub fn voice_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.voices.keys().copied()
    }

    pub fn voice(&self, number: u32) -> Option<&[Durational]> {
        self.voices.get(&number).map(Vec::as_slice)
    }

    pub fn voices(&self) -> impl Iterator<Item = (u32, &[Durational])> {
        self.voices
            .iter()
            .map(|(number, contents)| (*number, contents.as_slice()))
    }

    /// Extracts the elements at the given positions into a new pattern.
    ///
    /// All positions are resolved up front; any unresolvable position
    /// fails the whole extraction. The resolved elements are grouped by
    /// their originating (part, staff, voice) triple in first-seen order
    /// and each group becomes one pattern voice, numbered densely from 1.
    /// Within a voice the selection is ordered temporally; whenever the
    /// next selected element starts after the previous one ended, the gap
    /// is closed exactly with rests produced by duration decomposition.
    /// Several notes selected out of the same chord merge back into one
    /// chord. Duplicate positions are dropped.
    pub fn extract(score: &Score, positions: &[Position]) -> Result<Pattern, LookupError> {
        for position in positions {
            score.element_at(position)?;
        }

        // Group by source triple, first seen first; dedupe as we go.
        let mut groups: Vec<((usize, u32, u32), Vec<Position>)> = Vec::new();
        for position in positions {
            let triple = (position.part(), position.staff(), position.voice());
            let index = match groups.iter().position(|(key, _)| *key == triple) {
                Some(index) => index,
                None => {
                    groups.push((triple, Vec::new()));
                    groups.len() - 1
                }
            };
            let group = &mut groups[index].1;
            if !group.contains(position) {
                group.push(*position);
            }
        }

        let mut voices = Vec::with_capacity(groups.len());
        for ((part_index, staff_number, voice_number), mut group) in groups {
            group.sort_by_key(|position| {
                (position.measure(), position.index(), position.chord_index())
            });
            let staff = score
                .part(part_index)
                .and_then(|part| part.staff(staff_number))
                .ok_or(LookupError::StaffNotFound(staff_number))?;
            voices.push(extract_voice(score, staff, voice_number, &group)?);
        }

        Ok(Pattern::of_voices(voices))
    }
}

/// One group of positions, already sorted temporally, into one pattern
/// voice.
fn extract_voice(
    score: &Score,
    staff: &Staff,
    voice_number: u32,
    group: &[Position],
) -> Result<Vec<Durational>, LookupError> {
    let measure_starts = measure_start_offsets(staff);

    let mut contents: Vec<Durational> = Vec::new();
    let mut previous_end: Option<Offset> = None;

    let mut remaining = group;
    while let Some(first) = remaining.first() {
        // Positions differing only in chord index address the same slot.
        let same_slot = remaining
            .iter()
            .take_while(|position| {
                position.measure() == first.measure() && position.index() == first.index()
            })
            .count();
        let (slot, rest) = remaining.split_at(same_slot);
        remaining = rest;

        let offset = element_offset(staff, &measure_starts, voice_number, first)?;
        let durational = resolve_slot(score, slot)?;

        if let Some(end) = previous_end {
            if let Some(gap) = offset.gap_after(end) {
                for piece in gap.decompose() {
                    contents.push(Durational::Rest(Rest::of(piece)));
                }
            }
        }

        previous_end = Some(offset.plus(durational.duration()));
        contents.push(durational);
    }

    Ok(contents)
}

/// The start offset of every measure of the staff, accumulated from time
/// signatures.
fn measure_start_offsets(staff: &Staff) -> BTreeMap<u32, Offset> {
    let mut starts = BTreeMap::new();
    let mut offset = Offset::ZERO;
    for measure in staff.measures() {
        starts.insert(measure.number(), offset);
        offset = offset.plus(measure.attributes().time_signature.total_duration());
    }
    starts
}

/// The offset of the addressed element from the start of the staff.
fn element_offset(
    staff: &Staff,
    measure_starts: &BTreeMap<u32, Offset>,
    voice_number: u32,
    position: &Position,
) -> Result<Offset, LookupError> {
    let measure = staff
        .measure(position.measure())
        .ok_or(LookupError::MeasureNotFound(position.measure()))?;
    let voice = measure
        .voice(voice_number)
        .ok_or(LookupError::VoiceNotFound(voice_number))?;
    let mut offset = measure_starts
        .get(&position.measure())
        .copied()
        .unwrap_or(Offset::ZERO);
    for durational in voice.iter().take(position.index()) {
        offset = offset.plus(durational.duration());
    }
    Ok(offset)
}

/// The pattern element for one slot: the element itself, or the selected
/// chord notes merged back into a note or a smaller chord.
fn resolve_slot(score: &Score, slot: &[Position]) -> Result<Durational, LookupError> {
    let first = slot
        .first()
        .ok_or(LookupError::IndexNotFound(0))?;

    // Any whole-element selection takes the full element regardless of
    // other chord-index selections at the same slot.
    if slot.iter().any(|position| position.chord_index().is_none()) {
        let element = score.element_at(&first.without_chord_index())?;
        return Ok(match element {
            Element::Note(note) => Durational::Note(note.clone()),
            Element::Rest(rest) => Durational::Rest(*rest),
            Element::Chord(chord) => Durational::Chord(chord.clone()),
        });
    }

    let mut notes: Vec<Rc<Note>> = Vec::with_capacity(slot.len());
    for position in slot {
        let element = score.element_at(position)?;
        if let Element::Note(note) = element {
            notes.push(note.clone());
        }
    }
    if notes.len() == 1 {
        let Some(note) = notes.pop() else {
            return Err(LookupError::IndexNotFound(first.index()));
        };
        Ok(Durational::Note(note))
    } else {
        // Notes of one chord share a duration and arrive in chord order.
        Ok(Durational::Chord(Chord::from_sorted_notes(notes)))
    }
}
