//! MusicXML reader — builds a [`Score`] from score-partwise documents.
//!
//! Notes are created through the builder layer so ties and slurs resolve
//! into connections between finished elements. Durations arrive as counts
//! of per-quarter divisions and are converted to exact fractions of a
//! whole note.

use std::collections::BTreeMap;
use std::collections::HashMap;

use log::{debug, warn};
use roxmltree::{Document, Node};

use crate::builder::{
    ChordBuilder, DurationalBuilder, GraceNoteBuilder, MeasureBuilder, NoteBuilder, PartBuilder,
    RestBuilder, ScoreBuilder,
};
use crate::duration::{Duration, DurationSymbol};
use crate::error::ReadError;
use crate::notation::Notation;
use crate::note::{Articulation, GraceNoteType, Ornament};
use crate::pitch::{Pitch, Step};
use crate::score::{
    Barline, Clef, ClefSign, KeySignature, MeasureAttributes, Score, ScoreInfo, TimeSignature,
};

/// Parse a MusicXML string into a score.
pub fn read_musicxml(xml: &str) -> Result<Score, ReadError> {
    // MusicXML files include a DOCTYPE declaration, so we must allow DTDs
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    let doc = Document::parse_with_options(xml, options)?;
    let root = doc.root_element();

    if root.tag_name().name() != "score-partwise" {
        return Err(ReadError::Format(format!(
            "unsupported root element '{}', only 'score-partwise' is supported",
            root.tag_name().name()
        )));
    }

    let mut builder = ScoreBuilder::new();
    let mut part_names: HashMap<String, (Option<String>, Option<String>)> = HashMap::new();

    for child in root.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "work" => read_work(&child, builder.info_mut()),
            "movement-title" => {
                if builder.info_mut().title.is_none() {
                    builder.info_mut().title = element_text(&child);
                }
            }
            "identification" => read_identification(&child, builder.info_mut()),
            "part-list" => read_part_list(&child, &mut part_names),
            "part" => {
                let id = child.attribute("id").unwrap_or("");
                let (name, abbreviation) = part_names.get(id).cloned().unwrap_or_default();
                debug!("reading part {id:?}");
                builder.add_part(read_part(&child, name, abbreviation)?);
            }
            _ => {}
        }
    }

    Ok(builder.build()?)
}

// ─── Header ──────────────────────────────────────────────────────────

fn read_work(node: &Node, info: &mut ScoreInfo) {
    for child in node.children().filter(|n| n.is_element()) {
        if child.tag_name().name() == "work-title" {
            info.title = element_text(&child);
        }
    }
}

fn read_identification(node: &Node, info: &mut ScoreInfo) {
    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "creator" => {
                let text = element_text(&child);
                match child.attribute("type").unwrap_or("") {
                    "composer" => info.composer = text,
                    "arranger" => info.arranger = text,
                    _ => {}
                }
            }
            "encoding" => {
                for enc_child in child.children().filter(|n| n.is_element()) {
                    if enc_child.tag_name().name() == "software" {
                        info.software = element_text(&enc_child);
                    }
                }
            }
            _ => {}
        }
    }
}

fn read_part_list(node: &Node, names: &mut HashMap<String, (Option<String>, Option<String>)>) {
    for child in node.children().filter(|n| n.is_element()) {
        if child.tag_name().name() == "score-part" {
            let id = child.attribute("id").unwrap_or("").to_string();
            let mut name = None;
            let mut abbreviation = None;
            for sp_child in child.children().filter(|n| n.is_element()) {
                match sp_child.tag_name().name() {
                    "part-name" => name = element_text(&sp_child),
                    "part-abbreviation" => abbreviation = element_text(&sp_child),
                    _ => {}
                }
            }
            names.insert(id, (name, abbreviation));
        }
    }
}

// ─── Part ────────────────────────────────────────────────────────────

/// State carried forward across measures while reading one part.
struct PartContext {
    /// Division count of one quarter note.
    divisions: u64,
    key_signature: KeySignature,
    time_signature: TimeSignature,
    clefs: HashMap<u32, Clef>,
    staff_count: u32,
    /// Open ties keyed by (staff, voice, midi number).
    open_ties: HashMap<(u32, u32, i32), NoteBuilder>,
    /// Open slurs keyed by slur number.
    open_slurs: HashMap<u32, (Notation, SlurSource)>,
}

#[derive(Clone)]
enum SlurSource {
    Note(NoteBuilder),
    GraceNote(GraceNoteBuilder),
}

impl PartContext {
    fn new() -> PartContext {
        PartContext {
            divisions: 1,
            key_signature: KeySignature::default(),
            time_signature: TimeSignature::common(),
            clefs: HashMap::new(),
            staff_count: 1,
            open_ties: HashMap::new(),
            open_slurs: HashMap::new(),
        }
    }

    fn attributes_for_staff(&self, staff: u32, right_barline: Barline) -> MeasureAttributes {
        MeasureAttributes {
            clef: self.clefs.get(&staff).copied().unwrap_or_default(),
            key_signature: self.key_signature,
            time_signature: self.time_signature,
            right_barline,
        }
    }
}

fn read_part(
    node: &Node,
    name: Option<String>,
    abbreviation: Option<String>,
) -> Result<PartBuilder, ReadError> {
    let mut part = PartBuilder::new(name.unwrap_or_default());
    if let Some(abbreviation) = abbreviation {
        part.set_abbreviation(abbreviation);
    }

    let mut context = PartContext::new();
    for child in node.children().filter(|n| n.is_element()) {
        if child.tag_name().name() == "measure" {
            read_measure(&child, &mut context, &mut part)?;
        }
    }

    if !context.open_ties.is_empty() {
        warn!("{} tie(s) started but never stopped", context.open_ties.len());
    }
    if !context.open_slurs.is_empty() {
        warn!(
            "{} slur(s) started but never stopped",
            context.open_slurs.len()
        );
    }

    Ok(part)
}

// ─── Measure ─────────────────────────────────────────────────────────

fn read_measure(
    node: &Node,
    context: &mut PartContext,
    part: &mut PartBuilder,
) -> Result<(), ReadError> {
    let number = node
        .attribute("number")
        .and_then(|n| n.parse::<u32>().ok())
        .unwrap_or(0);

    // (staff, voice) -> contents, in document order per voice.
    let mut voices: BTreeMap<(u32, u32), Vec<DurationalBuilder>> = BTreeMap::new();
    // Last note builder per (staff, voice), for chords and trailing graces.
    let mut last_note: HashMap<(u32, u32), NoteBuilder> = HashMap::new();
    // Grace notes seen since the last principal note, per (staff, voice).
    let mut pending_graces: HashMap<(u32, u32), Vec<GraceNoteBuilder>> = HashMap::new();
    let mut right_barline = Barline::Regular;

    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "attributes" => read_attributes(&child, context)?,
            "note" => read_note(
                &child,
                context,
                &mut voices,
                &mut last_note,
                &mut pending_graces,
            )?,
            "barline" => {
                if child.attribute("location").unwrap_or("right") == "right" {
                    right_barline = read_barline(&child);
                }
            }
            // backup and forward only reposition the time cursor between
            // voices; per-voice contents stay in document order.
            "backup" | "forward" => {}
            _ => {}
        }
    }

    // Graces with no principal left in the measure attach backwards.
    for ((staff, voice), graces) in pending_graces {
        match last_note.get(&(staff, voice)) {
            Some(builder) => builder.set_succeeding_grace_notes(graces),
            None => warn!("measure {number}: grace notes in an otherwise empty voice dropped"),
        }
    }

    for staff in 1..=context.staff_count {
        let attributes = context.attributes_for_staff(staff, right_barline);
        let mut measure = MeasureBuilder::new(number, attributes);
        for ((_, voice), contents) in voices.range((staff, 0)..=(staff, u32::MAX)) {
            for builder in contents {
                measure.add_to_voice(*voice, builder.clone());
            }
        }
        part.add_measure_to_staff(staff, measure);
    }

    Ok(())
}

fn read_attributes(node: &Node, context: &mut PartContext) -> Result<(), ReadError> {
    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "divisions" => {
                let divisions = element_u64(&child).unwrap_or(0);
                if divisions == 0 {
                    return Err(ReadError::Format("invalid divisions value".into()));
                }
                context.divisions = divisions;
            }
            "key" => {
                for key_child in child.children().filter(|n| n.is_element()) {
                    if key_child.tag_name().name() == "fifths" {
                        let fifths = element_text(&key_child)
                            .and_then(|t| t.parse::<i32>().ok())
                            .unwrap_or(0);
                        context.key_signature = KeySignature::new(fifths);
                    }
                }
            }
            "time" => {
                let mut beats = 4;
                let mut beat_unit = 4;
                for time_child in child.children().filter(|n| n.is_element()) {
                    match time_child.tag_name().name() {
                        "beats" => beats = element_u64(&time_child).unwrap_or(4),
                        "beat-type" => beat_unit = element_u64(&time_child).unwrap_or(4),
                        _ => {}
                    }
                }
                context.time_signature = TimeSignature::new(beats, beat_unit)
                    .map_err(|_| ReadError::Format("invalid time signature".into()))?;
            }
            "staves" => {
                context.staff_count = element_u64(&child).unwrap_or(1).max(1) as u32;
            }
            "clef" => {
                let staff = child
                    .attribute("number")
                    .and_then(|n| n.parse::<u32>().ok())
                    .unwrap_or(1);
                context.clefs.insert(staff, read_clef(&child));
            }
            _ => {}
        }
    }
    Ok(())
}

fn read_clef(node: &Node) -> Clef {
    let mut sign = ClefSign::G;
    let mut line = 2;
    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "sign" => {
                sign = match child.text().unwrap_or("G").trim() {
                    "F" => ClefSign::F,
                    "C" => ClefSign::C,
                    "percussion" => ClefSign::Percussion,
                    _ => ClefSign::G,
                };
            }
            "line" => line = element_u64(&child).unwrap_or(2) as u32,
            _ => {}
        }
    }
    Clef::new(sign, line)
}

fn read_barline(node: &Node) -> Barline {
    let mut barline = Barline::Regular;
    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "bar-style" => {
                barline = match child.text().unwrap_or("").trim() {
                    "light-light" => Barline::Double,
                    "light-heavy" => Barline::Final,
                    _ => barline,
                };
            }
            "repeat" => {
                barline = match child.attribute("direction") {
                    Some("forward") => Barline::RepeatBegin,
                    Some("backward") => Barline::RepeatEnd,
                    _ => barline,
                };
            }
            _ => {}
        }
    }
    barline
}

// ─── Note ────────────────────────────────────────────────────────────

#[derive(Default)]
struct NoteElement {
    pitch: Option<Pitch>,
    duration_divisions: u64,
    voice: u32,
    staff: u32,
    is_rest: bool,
    measure_rest: bool,
    chord: bool,
    dot_count: u32,
    grace: bool,
    grace_slash: bool,
    tie_start: bool,
    tie_stop: bool,
    slur_starts: Vec<u32>,
    slur_stops: Vec<u32>,
    tuplet_actual: u64,
    articulations: Vec<Articulation>,
    ornaments: Vec<Ornament>,
    note_type: Option<String>,
}

fn read_note(
    node: &Node,
    context: &mut PartContext,
    voices: &mut BTreeMap<(u32, u32), Vec<DurationalBuilder>>,
    last_note: &mut HashMap<(u32, u32), NoteBuilder>,
    pending_graces: &mut HashMap<(u32, u32), Vec<GraceNoteBuilder>>,
) -> Result<(), ReadError> {
    let element = parse_note_element(node)?;
    let key = (element.staff, element.voice);

    if element.grace {
        let grace = make_grace_note(&element)?;
        connect_slurs_to_grace(context, &element, &grace);
        pending_graces.entry(key).or_default().push(grace);
        return Ok(());
    }

    if element.is_rest {
        let duration = if element.measure_rest {
            context.time_signature.total_duration()
        } else {
            divisions_to_duration(&element, context)?
        };
        voices
            .entry(key)
            .or_default()
            .push(RestBuilder::new(duration).into());
        return Ok(());
    }

    let pitch = element
        .pitch
        .ok_or_else(|| ReadError::Format("note without pitch or rest".into()))?;
    let duration = divisions_to_duration(&element, context)?;
    let builder = NoteBuilder::new(pitch, duration);
    for articulation in &element.articulations {
        builder.add_articulation(*articulation);
    }
    for ornament in &element.ornaments {
        builder.add_ornament(*ornament);
    }

    if let Some(graces) = pending_graces.remove(&key) {
        builder.set_preceding_grace_notes(graces);
    }

    connect_ties(context, &element, key, pitch, &builder);
    connect_slurs(context, &element, &builder);

    if element.chord {
        attach_to_chord(voices, key, builder.clone())?;
    } else {
        voices
            .entry(key)
            .or_default()
            .push(builder.clone().into());
    }
    last_note.insert(key, builder);
    Ok(())
}

fn parse_note_element(node: &Node) -> Result<NoteElement, ReadError> {
    let mut element = NoteElement {
        voice: 1,
        staff: 1,
        tuplet_actual: 1,
        ..NoteElement::default()
    };

    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "pitch" => element.pitch = Some(read_pitch(&child)?),
            "duration" => element.duration_divisions = element_u64(&child).unwrap_or(0),
            "voice" => element.voice = element_u64(&child).unwrap_or(1) as u32,
            "staff" => element.staff = element_u64(&child).unwrap_or(1) as u32,
            "type" => element.note_type = element_text(&child),
            "rest" => {
                element.is_rest = true;
                if child.attribute("measure") == Some("yes") {
                    element.measure_rest = true;
                }
            }
            "grace" => {
                element.grace = true;
                if child.attribute("slash") == Some("yes") {
                    element.grace_slash = true;
                }
            }
            "chord" => element.chord = true,
            "dot" => element.dot_count += 1,
            "tie" => match child.attribute("type") {
                Some("start") => element.tie_start = true,
                Some("stop") => element.tie_stop = true,
                _ => {}
            },
            "time-modification" => {
                for tm_child in child.children().filter(|n| n.is_element()) {
                    if tm_child.tag_name().name() == "actual-notes" {
                        element.tuplet_actual = element_u64(&tm_child).unwrap_or(1).max(1);
                    }
                }
            }
            "notations" => read_notations(&child, &mut element),
            _ => {}
        }
    }

    Ok(element)
}

fn read_notations(node: &Node, element: &mut NoteElement) {
    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "slur" => {
                let number = child
                    .attribute("number")
                    .and_then(|n| n.parse::<u32>().ok())
                    .unwrap_or(1);
                match child.attribute("type") {
                    Some("start") => element.slur_starts.push(number),
                    Some("stop") => element.slur_stops.push(number),
                    _ => {}
                }
            }
            "fermata" => element.articulations.push(Articulation::Fermata),
            "articulations" => {
                for art in child.children().filter(|n| n.is_element()) {
                    let articulation = match art.tag_name().name() {
                        "accent" => Some(Articulation::Accent),
                        "breath-mark" => Some(Articulation::BreathMark),
                        "caesura" => Some(Articulation::Caesura),
                        "strong-accent" => Some(Articulation::Marcato),
                        "staccatissimo" => Some(Articulation::Staccatissimo),
                        "staccato" => Some(Articulation::Staccato),
                        "tenuto" => Some(Articulation::Tenuto),
                        _ => None,
                    };
                    element.articulations.extend(articulation);
                }
            }
            "ornaments" => {
                for orn in child.children().filter(|n| n.is_element()) {
                    let ornament = match orn.tag_name().name() {
                        "trill-mark" => Some(Ornament::Trill),
                        "mordent" => Some(Ornament::Mordent),
                        "inverted-mordent" => Some(Ornament::InvertedMordent),
                        "turn" => Some(Ornament::Turn),
                        "inverted-turn" => Some(Ornament::InvertedTurn),
                        _ => None,
                    };
                    element.ornaments.extend(ornament);
                }
            }
            _ => {}
        }
    }
}

fn read_pitch(node: &Node) -> Result<Pitch, ReadError> {
    let mut step = Step::C;
    let mut alter = 0;
    let mut octave = 4;
    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "step" => {
                let letter = child.text().unwrap_or("").trim();
                step = Step::from_letter(letter)
                    .ok_or_else(|| ReadError::Format(format!("invalid step '{letter}'")))?;
            }
            "alter" => {
                alter = child
                    .text()
                    .and_then(|t| t.trim().parse::<f64>().ok())
                    .unwrap_or(0.0) as i32;
            }
            "octave" => {
                octave = child
                    .text()
                    .and_then(|t| t.trim().parse::<i32>().ok())
                    .unwrap_or(4);
            }
            _ => {}
        }
    }
    Ok(Pitch::new(step, alter, octave))
}

/// Converts a division count to an exact fraction of a whole note, with
/// the written dot count and tuplet divisor as display metadata.
fn divisions_to_duration(
    element: &NoteElement,
    context: &PartContext,
) -> Result<Duration, ReadError> {
    if element.duration_divisions == 0 {
        return Err(ReadError::Format("note without duration".into()));
    }
    Duration::with_appearance(
        element.duration_divisions,
        context.divisions * 4,
        element.dot_count,
        element.tuplet_actual,
    )
    .map_err(|_| ReadError::Format("invalid note duration".into()))
}

fn make_grace_note(element: &NoteElement) -> Result<GraceNoteBuilder, ReadError> {
    let pitch = element
        .pitch
        .ok_or_else(|| ReadError::Format("grace note without pitch".into()))?;
    let displayable = element
        .note_type
        .as_deref()
        .and_then(DurationSymbol::from_name)
        .map(|symbol| symbol.duration())
        .unwrap_or(crate::duration::durations::EIGHTH);
    let grace = GraceNoteBuilder::new(pitch, displayable);
    grace.set_grace_note_type(if element.grace_slash {
        GraceNoteType::Acciaccatura
    } else {
        GraceNoteType::Appoggiatura
    });
    for articulation in &element.articulations {
        grace.add_articulation(*articulation);
    }
    Ok(grace)
}

fn attach_to_chord(
    voices: &mut BTreeMap<(u32, u32), Vec<DurationalBuilder>>,
    key: (u32, u32),
    builder: NoteBuilder,
) -> Result<(), ReadError> {
    let contents = voices.entry(key).or_default();
    match contents.pop() {
        Some(DurationalBuilder::Note(previous)) => {
            let mut chord = ChordBuilder::new();
            chord.add(previous);
            chord.add(builder);
            contents.push(chord.into());
            Ok(())
        }
        Some(DurationalBuilder::Chord(mut chord)) => {
            chord.add(builder);
            contents.push(chord.into());
            Ok(())
        }
        other => {
            if let Some(other) = other {
                contents.push(other);
            }
            Err(ReadError::Format(
                "chord note without a preceding note".into(),
            ))
        }
    }
}

// ─── Ties and slurs ──────────────────────────────────────────────────

fn connect_ties(
    context: &mut PartContext,
    element: &NoteElement,
    key: (u32, u32),
    pitch: Pitch,
    builder: &NoteBuilder,
) {
    let tie_key = (key.0, key.1, pitch.to_midi());
    if element.tie_stop {
        match context.open_ties.remove(&tie_key) {
            Some(previous) => previous.add_tie_to_following(builder),
            None => warn!("tie stop at {pitch} without a matching start"),
        }
    }
    if element.tie_start {
        context.open_ties.insert(tie_key, builder.clone());
    }
}

fn connect_slurs(context: &mut PartContext, element: &NoteElement, builder: &NoteBuilder) {
    for number in &element.slur_stops {
        match context.open_slurs.remove(number) {
            Some((notation, SlurSource::Note(start))) => start.connect_with(&notation, builder),
            Some((notation, SlurSource::GraceNote(start))) => {
                start.connect_with(&notation, builder);
            }
            None => warn!("slur stop {number} without a matching start"),
        }
    }
    for number in &element.slur_starts {
        context.open_slurs.insert(
            *number,
            (Notation::slur(), SlurSource::Note(builder.clone())),
        );
    }
}

fn connect_slurs_to_grace(
    context: &mut PartContext,
    element: &NoteElement,
    grace: &GraceNoteBuilder,
) {
    for number in &element.slur_stops {
        match context.open_slurs.remove(number) {
            Some((notation, SlurSource::Note(start))) => {
                start.connect_with_grace_note(&notation, grace);
            }
            Some((notation, SlurSource::GraceNote(start))) => {
                start.connect_with_grace_note(&notation, grace);
            }
            None => warn!("slur stop {number} without a matching start"),
        }
    }
    for number in &element.slur_starts {
        context.open_slurs.insert(
            *number,
            (Notation::slur(), SlurSource::GraceNote(grace.clone())),
        );
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────

fn element_text(node: &Node) -> Option<String> {
    node.text()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn element_u64(node: &Node) -> Option<u64> {
    node.text()?.trim().parse().ok()
}
