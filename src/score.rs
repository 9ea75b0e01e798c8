//! The score hierarchy: parts, staves, measures and their attributes.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::duration::Duration;
use crate::error::BuildError;
use crate::note::Durational;

// ─── Clef ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ClefSign {
    G,
    F,
    C,
    Percussion,
}

/// A clef: sign and the staff line it sits on, counted from the bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Clef {
    pub sign: ClefSign,
    pub line: u32,
}

impl Clef {
    pub const TREBLE: Clef = Clef {
        sign: ClefSign::G,
        line: 2,
    };
    pub const BASS: Clef = Clef {
        sign: ClefSign::F,
        line: 4,
    };
    pub const ALTO: Clef = Clef {
        sign: ClefSign::C,
        line: 3,
    };

    pub fn new(sign: ClefSign, line: u32) -> Clef {
        Clef { sign, line }
    }
}

impl Default for Clef {
    fn default() -> Clef {
        Clef::TREBLE
    }
}

// ─── Key signature ───────────────────────────────────────────────────

/// A key signature as a count of fifths: positive sharps, negative flats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct KeySignature {
    fifths: i32,
}

impl KeySignature {
    pub fn new(fifths: i32) -> KeySignature {
        KeySignature { fifths }
    }

    pub fn fifths(&self) -> i32 {
        self.fifths
    }

    pub fn sharp_count(&self) -> u32 {
        self.fifths.max(0) as u32
    }

    pub fn flat_count(&self) -> u32 {
        (-self.fifths).max(0) as u32
    }
}

// ─── Time signature ──────────────────────────────────────────────────

/// A time signature of `beats` beats, each one `beat_unit`th of a whole
/// note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimeSignature {
    beats: u64,
    beat_unit: u64,
    total: Duration,
}

impl TimeSignature {
    pub fn new(beats: u64, beat_unit: u64) -> Result<TimeSignature, BuildError> {
        let total = Duration::new(beats, beat_unit)?;
        Ok(TimeSignature {
            beats,
            beat_unit,
            total,
        })
    }

    pub fn common() -> TimeSignature {
        TimeSignature {
            beats: 4,
            beat_unit: 4,
            total: Duration::raw(1, 1, 0, 1),
        }
    }

    pub fn beats(&self) -> u64 {
        self.beats
    }

    pub fn beat_unit(&self) -> u64 {
        self.beat_unit
    }

    /// The exact length of one full measure under this time signature.
    pub fn total_duration(&self) -> Duration {
        self.total
    }
}

impl Default for TimeSignature {
    fn default() -> TimeSignature {
        TimeSignature::common()
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.beats, self.beat_unit)
    }
}

// ─── Barline ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Barline {
    #[default]
    Regular,
    Double,
    Final,
    RepeatBegin,
    RepeatEnd,
}

// ─── Measure attributes ──────────────────────────────────────────────

/// Notational context of one measure. Readers carry attributes forward
/// measure to measure, so every measure holds its effective context.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MeasureAttributes {
    pub clef: Clef,
    pub key_signature: KeySignature,
    pub time_signature: TimeSignature,
    pub right_barline: Barline,
}

// ─── Measure ─────────────────────────────────────────────────────────

/// One measure of one staff: voices keyed by voice number, iterated in
/// ascending key order. Voice numbers are sparse and need not start at 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measure {
    number: u32,
    voices: BTreeMap<u32, Vec<Durational>>,
    attributes: MeasureAttributes,
}

impl Measure {
    pub fn new(
        number: u32,
        voices: BTreeMap<u32, Vec<Durational>>,
        attributes: MeasureAttributes,
    ) -> Measure {
        Measure {
            number,
            voices,
            attributes,
        }
    }

    /// The measure number; 0 is a pickup measure.
    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn attributes(&self) -> &MeasureAttributes {
        &self.attributes
    }

    pub fn is_pickup(&self) -> bool {
        self.number == 0
    }

    pub fn voice_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.voices.keys().copied()
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    pub fn voice(&self, voice: u32) -> Option<&[Durational]> {
        self.voices.get(&voice).map(Vec::as_slice)
    }

    /// Voices in ascending voice-number order.
    pub fn voices(&self) -> impl Iterator<Item = (u32, &[Durational])> {
        self.voices
            .iter()
            .map(|(number, contents)| (*number, contents.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.voices.values().all(Vec::is_empty)
    }
}

// ─── Staff ───────────────────────────────────────────────────────────

/// The measures of one staff, in score order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Staff {
    measures: Vec<Measure>,
}

impl Staff {
    pub fn new(measures: Vec<Measure>) -> Staff {
        Staff { measures }
    }

    pub fn measures(&self) -> &[Measure] {
        &self.measures
    }

    pub fn measure_count(&self) -> usize {
        self.measures.len()
    }

    /// Looks up a measure by its number, not its index.
    pub fn measure(&self, number: u32) -> Option<&Measure> {
        self.measures
            .iter()
            .find(|measure| measure.number() == number)
    }
}

// ─── Part ────────────────────────────────────────────────────────────

/// One part: named, with one or more staves keyed by staff number.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Part {
    name: Option<String>,
    abbreviation: Option<String>,
    staves: BTreeMap<u32, Staff>,
}

impl Part {
    /// The staff number of a single-staff part.
    pub const DEFAULT_STAFF: u32 = 1;

    pub fn new(
        name: Option<String>,
        abbreviation: Option<String>,
        staves: BTreeMap<u32, Staff>,
    ) -> Part {
        Part {
            name,
            abbreviation,
            staves,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn abbreviation(&self) -> Option<&str> {
        self.abbreviation.as_deref()
    }

    pub fn has_multiple_staves(&self) -> bool {
        self.staves.len() > 1
    }

    pub fn staff_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.staves.keys().copied()
    }

    pub fn staff(&self, number: u32) -> Option<&Staff> {
        self.staves.get(&number)
    }

    /// Staves in ascending staff-number order.
    pub fn staves(&self) -> impl Iterator<Item = (u32, &Staff)> {
        self.staves.iter().map(|(number, staff)| (*number, staff))
    }

    /// The number of measures in the longest staff.
    pub fn measure_count(&self) -> usize {
        self.staves
            .values()
            .map(Staff::measure_count)
            .max()
            .unwrap_or(0)
    }
}

// ─── Score ───────────────────────────────────────────────────────────

/// Identifying attributes of a score. All fields are optional.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ScoreInfo {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub composer: Option<String>,
    pub arranger: Option<String>,
    pub software: Option<String>,
}

/// A complete immutable score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Score {
    info: ScoreInfo,
    parts: Vec<Part>,
}

impl Score {
    pub fn new(info: ScoreInfo, parts: Vec<Part>) -> Score {
        Score { info, parts }
    }

    pub fn info(&self) -> &ScoreInfo {
        &self.info
    }

    pub fn title(&self) -> Option<&str> {
        self.info.title.as_deref()
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn part(&self, index: usize) -> Option<&Part> {
        self.parts.get(index)
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// The number of measures in the longest part.
    pub fn measure_count(&self) -> usize {
        self.parts.iter().map(Part::measure_count).max().unwrap_or(0)
    }
}
