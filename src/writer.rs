//! MusicXML writer — emits score-partwise 4.0 documents.
//!
//! The writer walks the score part by part and asks the duration engine
//! how to notate every length: an expressible duration becomes one written
//! note, anything else is decomposed into a tied run. Tie and slur marks
//! are derived from the connections the link resolver installed on each
//! note.

use std::collections::HashMap;
use std::rc::Rc;

use crate::duration::{Duration, DurationAppearance};
use crate::notation::{Notation, NotationType};
use crate::note::{Articulation, Durational, GraceNote, GraceNoteType, Note, Ornament};
use crate::pitch::Pitch;
use crate::score::{Barline, Clef, ClefSign, Measure, Part, Score};

/// Render a score as a MusicXML string.
pub fn write_musicxml(score: &Score) -> String {
    let mut xml = Xml::new();
    xml.raw("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    xml.raw(concat!(
        "<!DOCTYPE score-partwise PUBLIC \"-//Recordare//DTD MusicXML 4.0 Partwise//EN\" ",
        "\"http://www.musicxml.org/dtds/partwise.dtd\">"
    ));
    xml.open_with("score-partwise", "version=\"4.0\"");

    write_header(&mut xml, score);
    write_part_list(&mut xml, score);
    for (index, part) in score.parts().iter().enumerate() {
        write_part(&mut xml, part, index);
    }

    xml.close("score-partwise");
    xml.finish()
}

fn write_header(xml: &mut Xml, score: &Score) {
    let info = score.info();
    if let Some(title) = &info.title {
        xml.open("work");
        xml.leaf("work-title", title);
        xml.close("work");
    }
    if let Some(subtitle) = &info.subtitle {
        xml.leaf("movement-title", subtitle);
    }
    if info.composer.is_some() || info.arranger.is_some() || info.software.is_some() {
        xml.open("identification");
        if let Some(composer) = &info.composer {
            xml.leaf_with("creator", "type=\"composer\"", composer);
        }
        if let Some(arranger) = &info.arranger {
            xml.leaf_with("creator", "type=\"arranger\"", arranger);
        }
        if let Some(software) = &info.software {
            xml.open("encoding");
            xml.leaf("software", software);
            xml.close("encoding");
        }
        xml.close("identification");
    }
}

fn write_part_list(xml: &mut Xml, score: &Score) {
    xml.open("part-list");
    for (index, part) in score.parts().iter().enumerate() {
        xml.open_with("score-part", &format!("id=\"P{}\"", index + 1));
        xml.leaf("part-name", part.name().unwrap_or(""));
        if let Some(abbreviation) = part.abbreviation() {
            xml.leaf("part-abbreviation", abbreviation);
        }
        xml.close("score-part");
    }
    xml.close("part-list");
}

// ─── Parts and measures ──────────────────────────────────────────────

/// Attributes as last written, for change detection measure to measure.
#[derive(Default)]
struct WrittenAttributes {
    divisions: Option<u64>,
    fifths: Option<i32>,
    time: Option<(u64, u64)>,
    clefs: HashMap<u32, Clef>,
}

fn write_part(xml: &mut Xml, part: &Part, index: usize) {
    xml.open_with("part", &format!("id=\"P{}\"", index + 1));

    let staff_numbers: Vec<u32> = part.staff_numbers().collect();
    let mut written = WrittenAttributes::default();
    let mut slurs = SlurNumbers::default();

    for measure_index in 0..part.measure_count() {
        let staved: Vec<(u32, &Measure)> = staff_numbers
            .iter()
            .filter_map(|&staff| {
                part.staff(staff)
                    .and_then(|s| s.measures().get(measure_index))
                    .map(|measure| (staff, measure))
            })
            .collect();
        let Some(&(_, first_measure)) = staved.first() else {
            continue;
        };

        xml.open_with("measure", &format!("number=\"{}\"", first_measure.number()));
        let divisions = measure_divisions(&staved);
        write_attributes(xml, &staved, divisions, measure_index == 0, &mut written);
        write_measure_contents(xml, &staved, divisions, &mut slurs);
        write_barline(xml, first_measure.attributes().right_barline);
        xml.close("measure");
    }

    xml.close("part");
}

/// The per-quarter division count for one measure: the least common
/// multiple of every written duration's denominator, so each duration is
/// an integral number of divisions.
fn measure_divisions(staved: &[(u32, &Measure)]) -> u64 {
    let mut lcm_value = 1u64;
    for (_, measure) in staved {
        for (_, contents) in measure.voices() {
            for durational in contents {
                for piece in written_pieces(durational.duration()) {
                    lcm_value = lcm(lcm_value, piece.denominator());
                }
            }
        }
        lcm_value = lcm(
            lcm_value,
            measure.attributes().time_signature.total_duration().denominator(),
        );
    }
    lcm_value
}

fn write_attributes(
    xml: &mut Xml,
    staved: &[(u32, &Measure)],
    divisions: u64,
    first_measure: bool,
    written: &mut WrittenAttributes,
) {
    let Some(&(_, measure)) = staved.first() else {
        return;
    };
    let attributes = measure.attributes();
    let fifths = attributes.key_signature.fifths();
    let time = (
        attributes.time_signature.beats(),
        attributes.time_signature.beat_unit(),
    );

    let divisions_changed = written.divisions != Some(divisions);
    let key_changed = written.fifths != Some(fifths);
    let time_changed = written.time != Some(time);
    let changed_clefs: Vec<(u32, Clef)> = staved
        .iter()
        .filter(|(staff, m)| written.clefs.get(staff) != Some(&m.attributes().clef))
        .map(|(staff, m)| (*staff, m.attributes().clef))
        .collect();

    if !divisions_changed && !key_changed && !time_changed && changed_clefs.is_empty() {
        return;
    }

    xml.open("attributes");
    if divisions_changed {
        xml.leaf("divisions", &divisions.to_string());
        written.divisions = Some(divisions);
    }
    if key_changed {
        xml.open("key");
        xml.leaf("fifths", &fifths.to_string());
        xml.close("key");
        written.fifths = Some(fifths);
    }
    if time_changed {
        xml.open("time");
        xml.leaf("beats", &time.0.to_string());
        xml.leaf("beat-type", &time.1.to_string());
        xml.close("time");
        written.time = Some(time);
    }
    if first_measure && staved.len() > 1 {
        xml.leaf("staves", &staved.len().to_string());
    }
    for (staff, clef) in changed_clefs {
        if staved.len() > 1 {
            xml.open_with("clef", &format!("number=\"{staff}\""));
        } else {
            xml.open("clef");
        }
        let sign = match clef.sign {
            ClefSign::G => "G",
            ClefSign::F => "F",
            ClefSign::C => "C",
            ClefSign::Percussion => "percussion",
        };
        xml.leaf("sign", sign);
        xml.leaf("line", &clef.line.to_string());
        xml.close("clef");
        written.clefs.insert(staff, clef);
    }
    xml.close("attributes");
}

fn write_measure_contents(
    xml: &mut Xml,
    staved: &[(u32, &Measure)],
    divisions: u64,
    slurs: &mut SlurNumbers,
) {
    let multi_staff = staved.len() > 1;
    let voice_slots: Vec<(u32, u32, &[Durational])> = staved
        .iter()
        .flat_map(|(staff, measure)| {
            measure
                .voices()
                .map(move |(voice, contents)| (*staff, voice, contents))
        })
        .collect();

    for (slot_index, (staff, voice, contents)) in voice_slots.iter().enumerate() {
        if slot_index > 0 {
            // Rewind the time cursor to the start of the measure for the
            // next voice.
            let previous = &voice_slots[slot_index - 1];
            let elapsed: u64 = previous
                .2
                .iter()
                .flat_map(|durational| written_pieces(durational.duration()))
                .map(|piece| divisions_count(&piece, divisions))
                .sum();
            if elapsed > 0 {
                xml.open("backup");
                xml.leaf("duration", &elapsed.to_string());
                xml.close("backup");
            }
        }
        let measure_total = staved
            .iter()
            .find(|(s, _)| s == staff)
            .map(|(_, m)| m.attributes().time_signature.total_duration());
        for durational in *contents {
            write_durational(
                xml,
                durational,
                divisions,
                *voice,
                multi_staff.then_some(*staff),
                measure_total,
                slurs,
            );
        }
    }
}

fn write_barline(xml: &mut Xml, barline: Barline) {
    let style = match barline {
        Barline::Regular => return,
        Barline::Double => "light-light",
        Barline::Final => "light-heavy",
        Barline::RepeatBegin => "heavy-light",
        Barline::RepeatEnd => "light-heavy",
    };
    xml.open_with("barline", "location=\"right\"");
    xml.leaf("bar-style", style);
    match barline {
        Barline::RepeatBegin => xml.raw_indented("<repeat direction=\"forward\"/>"),
        Barline::RepeatEnd => xml.raw_indented("<repeat direction=\"backward\"/>"),
        _ => {}
    }
    xml.close("barline");
}

// ─── Elements ────────────────────────────────────────────────────────

/// The written pieces of one duration: itself when it can be notated
/// directly, otherwise a tied run of expressible pieces.
fn written_pieces(duration: Duration) -> Vec<Duration> {
    if duration.has_expression() {
        vec![duration]
    } else {
        duration.decompose()
    }
}

fn divisions_count(duration: &Duration, divisions: u64) -> u64 {
    duration.numerator() * 4 * divisions / duration.denominator()
}

#[allow(clippy::too_many_arguments)]
fn write_durational(
    xml: &mut Xml,
    durational: &Durational,
    divisions: u64,
    voice: u32,
    staff: Option<u32>,
    measure_total: Option<Duration>,
    slurs: &mut SlurNumbers,
) {
    match durational {
        Durational::Rest(rest) => {
            if measure_total == Some(rest.duration()) {
                write_rest(xml, &rest.duration(), divisions, voice, staff, true, None);
                return;
            }
            for piece in written_pieces(rest.duration()) {
                let appearance = piece.appearance();
                write_rest(xml, &piece, divisions, voice, staff, false, appearance);
            }
        }
        Durational::Note(note) => {
            write_note_event(xml, std::slice::from_ref(note), divisions, voice, staff, slurs);
        }
        Durational::Chord(chord) => {
            write_note_event(xml, chord.notes(), divisions, voice, staff, slurs);
        }
    }
}

fn write_rest(
    xml: &mut Xml,
    duration: &Duration,
    divisions: u64,
    voice: u32,
    staff: Option<u32>,
    measure_rest: bool,
    appearance: Option<DurationAppearance>,
) {
    xml.open("note");
    if measure_rest {
        xml.raw_indented("<rest measure=\"yes\"/>");
    } else {
        xml.raw_indented("<rest/>");
    }
    xml.leaf("duration", &divisions_count(duration, divisions).to_string());
    xml.leaf("voice", &voice.to_string());
    if !measure_rest {
        write_appearance(xml, appearance);
    }
    if let Some(staff) = staff {
        xml.leaf("staff", &staff.to_string());
    }
    xml.close("note");
}

/// One note or chord, expanded into a tied run when its duration is not
/// directly notatable. Grace notes and slur marks attach to the first
/// piece.
fn write_note_event(
    xml: &mut Xml,
    notes: &[Rc<Note>],
    divisions: u64,
    voice: u32,
    staff: Option<u32>,
    slurs: &mut SlurNumbers,
) {
    let Some(first_note) = notes.first() else {
        return;
    };
    let pieces = written_pieces(first_note.duration());
    let last = pieces.len() - 1;

    for grace in first_note.preceding_grace_notes() {
        write_grace_note(xml, grace, voice, staff, slurs);
    }

    for (piece_index, piece) in pieces.iter().enumerate() {
        for (note_index, note) in notes.iter().enumerate() {
            let tie_stop = piece_index > 0 || note.is_tied_from_previous();
            let tie_start = piece_index < last || note.is_tied_to_following();
            xml.open("note");
            if note_index > 0 {
                xml.raw_indented("<chord/>");
            }
            write_pitch(xml, note.pitch());
            xml.leaf("duration", &divisions_count(piece, divisions).to_string());
            if tie_stop {
                xml.raw_indented("<tie type=\"stop\"/>");
            }
            if tie_start {
                xml.raw_indented("<tie type=\"start\"/>");
            }
            xml.leaf("voice", &voice.to_string());
            write_appearance(xml, piece.appearance());
            if let Some(staff) = staff {
                xml.leaf("staff", &staff.to_string());
            }
            write_notations(xml, note, piece_index == 0, tie_start, tie_stop, slurs);
            xml.close("note");
        }
    }

    for grace in first_note.succeeding_grace_notes() {
        write_grace_note(xml, grace, voice, staff, slurs);
    }
}

fn write_grace_note(
    xml: &mut Xml,
    grace: &Rc<GraceNote>,
    voice: u32,
    staff: Option<u32>,
    slurs: &mut SlurNumbers,
) {
    xml.open("note");
    if grace.grace_note_type() == GraceNoteType::Acciaccatura {
        xml.raw_indented("<grace slash=\"yes\"/>");
    } else {
        xml.raw_indented("<grace/>");
    }
    write_pitch(xml, grace.pitch());
    xml.leaf("voice", &voice.to_string());
    write_appearance(xml, grace.displayable_duration().appearance());
    if let Some(staff) = staff {
        xml.leaf("staff", &staff.to_string());
    }

    let slur_events = slur_events(grace.connections(), slurs);
    if !slur_events.is_empty() {
        xml.open("notations");
        for (kind, number) in slur_events {
            xml.raw_indented(&format!("<slur type=\"{kind}\" number=\"{number}\"/>"));
        }
        xml.close("notations");
    }
    xml.close("note");
}

fn write_pitch(xml: &mut Xml, pitch: Pitch) {
    xml.open("pitch");
    xml.leaf("step", pitch.step.letter());
    if pitch.alter != 0 {
        xml.leaf("alter", &pitch.alter.to_string());
    }
    xml.leaf("octave", &pitch.octave.to_string());
    xml.close("pitch");
}

fn write_appearance(xml: &mut Xml, appearance: Option<DurationAppearance>) {
    let Some(appearance) = appearance else {
        return;
    };
    xml.leaf("type", appearance.symbol.name());
    for _ in 0..appearance.dot_count {
        xml.raw_indented("<dot/>");
    }
    if let Some(ratio) = appearance.tuplet_ratio {
        xml.open("time-modification");
        xml.leaf("actual-notes", &ratio.actual.to_string());
        xml.leaf("normal-notes", &ratio.normal.to_string());
        xml.close("time-modification");
    }
}

fn write_notations(
    xml: &mut Xml,
    note: &Note,
    first_piece: bool,
    tie_start: bool,
    tie_stop: bool,
    slurs: &mut SlurNumbers,
) {
    let slur_events = if first_piece {
        slur_events(note.connections(), slurs)
    } else {
        Vec::new()
    };
    let articulations: Vec<Articulation> = if first_piece {
        note.articulations()
            .filter(|a| *a != Articulation::Fermata)
            .collect()
    } else {
        Vec::new()
    };
    let has_fermata = first_piece && note.has_articulation(Articulation::Fermata);
    let ornaments: Vec<Ornament> = if first_piece {
        note.ornaments().collect()
    } else {
        Vec::new()
    };

    if !tie_start && !tie_stop && slur_events.is_empty() && articulations.is_empty()
        && !has_fermata
        && ornaments.is_empty()
    {
        return;
    }

    xml.open("notations");
    if tie_stop {
        xml.raw_indented("<tied type=\"stop\"/>");
    }
    if tie_start {
        xml.raw_indented("<tied type=\"start\"/>");
    }
    for (kind, number) in slur_events {
        xml.raw_indented(&format!("<slur type=\"{kind}\" number=\"{number}\"/>"));
    }
    if has_fermata {
        xml.raw_indented("<fermata/>");
    }
    if !articulations.is_empty() {
        xml.open("articulations");
        for articulation in articulations {
            let tag = match articulation {
                Articulation::Accent => "accent",
                Articulation::BreathMark => "breath-mark",
                Articulation::Caesura => "caesura",
                Articulation::Marcato => "strong-accent",
                Articulation::Staccatissimo => "staccatissimo",
                Articulation::Staccato => "staccato",
                Articulation::Tenuto => "tenuto",
                Articulation::Fermata => continue,
            };
            xml.raw_indented(&format!("<{tag}/>"));
        }
        xml.close("articulations");
    }
    if !ornaments.is_empty() {
        xml.open("ornaments");
        for ornament in ornaments {
            let tag = match ornament {
                Ornament::Trill => "trill-mark",
                Ornament::Mordent => "mordent",
                Ornament::InvertedMordent => "inverted-mordent",
                Ornament::Turn => "turn",
                Ornament::InvertedTurn => "inverted-turn",
            };
            xml.raw_indented(&format!("<{tag}/>"));
        }
        xml.close("ornaments");
    }
    xml.close("notations");
}

// ─── Slur numbering ──────────────────────────────────────────────────

/// MusicXML requires concurrent slurs to carry distinct small numbers.
/// Numbers are allocated when a slur begins and released when it ends.
#[derive(Default)]
struct SlurNumbers {
    active: HashMap<Notation, u32>,
}

impl SlurNumbers {
    fn begin(&mut self, notation: &Notation) -> u32 {
        let mut number = 1;
        while self.active.values().any(|&used| used == number) {
            number += 1;
        }
        self.active.insert(notation.clone(), number);
        number
    }

    fn end(&mut self, notation: &Notation) -> u32 {
        self.active.remove(notation).unwrap_or(1)
    }
}

/// Slur begin/stop events for one element's connections, with numbers
/// assigned. A middle element of a slur chain emits nothing.
fn slur_events(
    connections: &[crate::notation::Connection],
    slurs: &mut SlurNumbers,
) -> Vec<(&'static str, u32)> {
    let mut events = Vec::new();
    for connection in connections {
        if connection.notation_type() != NotationType::Slur {
            continue;
        }
        if connection.is_beginning() {
            events.push(("start", slurs.begin(connection.notation())));
        } else if connection.is_end() {
            events.push(("stop", slurs.end(connection.notation())));
        }
    }
    events
}

// ─── XML assembly ────────────────────────────────────────────────────

struct Xml {
    out: String,
    indent: usize,
}

impl Xml {
    fn new() -> Xml {
        Xml {
            out: String::new(),
            indent: 0,
        }
    }

    fn raw(&mut self, line: &str) {
        self.out.push_str(line);
        self.out.push('\n');
    }

    fn raw_indented(&mut self, line: &str) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.raw(line);
    }

    fn open(&mut self, tag: &str) {
        self.raw_indented(&format!("<{tag}>"));
        self.indent += 1;
    }

    fn open_with(&mut self, tag: &str, attrs: &str) {
        self.raw_indented(&format!("<{tag} {attrs}>"));
        self.indent += 1;
    }

    fn close(&mut self, tag: &str) {
        self.indent = self.indent.saturating_sub(1);
        self.raw_indented(&format!("</{tag}>"));
    }

    fn leaf(&mut self, tag: &str, text: &str) {
        self.raw_indented(&format!("<{tag}>{}</{tag}>", escape(text)));
    }

    fn leaf_with(&mut self, tag: &str, attrs: &str, text: &str) {
        self.raw_indented(&format!("<{tag} {attrs}>{}</{tag}>", escape(text)));
    }

    fn finish(self) -> String {
        self.out
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

fn lcm(a: u64, b: u64) -> u64 {
    a / gcd(a, b) * b
}
