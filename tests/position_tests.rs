//! Position resolution and the traversal iterators.

use pretty_assertions::assert_eq;

use notalib::{
    durations, ChordBuilder, Durational, Element, LookupError, MeasureAttributes, MeasureBuilder,
    NoteBuilder, PartBuilder, Pitch, Position, RestBuilder, Score, ScoreBuilder, Step,
};

fn pitch(step: Step, octave: i32) -> Pitch {
    Pitch::new(step, 0, octave)
}

/// One part, one staff, two 4/4 measures:
///   measure 1, voice 1: C4 half, D4 quarter, quarter rest
///   measure 1, voice 2: E3 whole
///   measure 2, voice 1: C-E-G quarter chord, rest, half rest
fn sample_score() -> Score {
    let attributes = MeasureAttributes::default();

    let mut measure1 = MeasureBuilder::new(1, attributes.clone());
    measure1.add_to_voice(1, NoteBuilder::new(pitch(Step::C, 4), durations::HALF));
    measure1.add_to_voice(1, NoteBuilder::new(pitch(Step::D, 4), durations::QUARTER));
    measure1.add_to_voice(1, RestBuilder::new(durations::QUARTER));
    measure1.add_to_voice(2, NoteBuilder::new(pitch(Step::E, 3), durations::WHOLE));

    let mut measure2 = MeasureBuilder::new(2, attributes);
    let mut chord = ChordBuilder::new();
    chord.add(NoteBuilder::new(pitch(Step::C, 4), durations::QUARTER));
    chord.add(NoteBuilder::new(pitch(Step::E, 4), durations::QUARTER));
    chord.add(NoteBuilder::new(pitch(Step::G, 4), durations::QUARTER));
    measure2.add_to_voice(1, chord);
    measure2.add_to_voice(1, RestBuilder::new(durations::QUARTER));
    measure2.add_to_voice(1, RestBuilder::new(durations::HALF));

    let mut part = PartBuilder::new("Piano");
    part.add_measure(measure1);
    part.add_measure(measure2);

    let mut score = ScoreBuilder::new();
    score.add_part(part);
    score.build().expect("sample score builds")
}

// ─── Lookup ─────────────────────────────────────────────────────────

#[test]
fn element_at_resolves_notes_rests_and_chords() {
    let score = sample_score();

    let note = score
        .element_at(&Position::in_single_staff(0, 1, 1, 0))
        .expect("first note resolves");
    let note = note.as_note().expect("a note");
    assert_eq!(note.pitch(), pitch(Step::C, 4));
    assert_eq!(note.duration(), durations::HALF);

    let rest = score
        .element_at(&Position::in_single_staff(0, 1, 1, 2))
        .expect("rest resolves");
    assert!(rest.is_rest());

    let chord = score
        .element_at(&Position::in_single_staff(0, 2, 1, 0))
        .expect("chord resolves");
    let chord = chord.as_chord().expect("a chord");
    assert_eq!(chord.note_count(), 3);
}

#[test]
fn chord_index_dereferences_into_the_chord() {
    let score = sample_score();
    let position = Position::in_single_staff(0, 2, 1, 0).with_chord_index(1);
    let element = score.element_at(&position).expect("chord note resolves");
    let note = element.as_note().expect("a single chord note");
    assert_eq!(note.pitch(), pitch(Step::E, 4));
}

#[test]
fn each_missing_component_reports_its_own_error() {
    let score = sample_score();

    assert_eq!(
        score.element_at(&Position::in_single_staff(3, 1, 1, 0)),
        Err(LookupError::PartNotFound(3))
    );
    assert_eq!(
        score.element_at(&Position::new(0, 2, 1, 1, 0)),
        Err(LookupError::StaffNotFound(2))
    );
    assert_eq!(
        score.element_at(&Position::in_single_staff(0, 9, 1, 0)),
        Err(LookupError::MeasureNotFound(9))
    );
    assert_eq!(
        score.element_at(&Position::in_single_staff(0, 2, 7, 0)),
        Err(LookupError::VoiceNotFound(7))
    );
    assert_eq!(
        score.element_at(&Position::in_single_staff(0, 1, 1, 10)),
        Err(LookupError::IndexNotFound(10))
    );
    assert_eq!(
        score.element_at(&Position::in_single_staff(0, 2, 1, 0).with_chord_index(5)),
        Err(LookupError::ChordIndexNotFound(5))
    );
    // A chord index on a plain note does not resolve either.
    assert_eq!(
        score.element_at(&Position::in_single_staff(0, 1, 1, 0).with_chord_index(0)),
        Err(LookupError::ChordIndexNotFound(0))
    );
}

#[test]
fn position_equality_is_structural() {
    let plain = Position::in_single_staff(0, 1, 1, 0);
    assert_eq!(plain, Position::new(0, 1, 1, 1, 0));
    assert_ne!(plain, plain.with_chord_index(0));
    assert_eq!(plain.with_chord_index(0).without_chord_index(), plain);
}

// ─── Traversal ──────────────────────────────────────────────────────

#[test]
fn partwise_iter_visits_everything_in_order() {
    let score = sample_score();
    let visited: Vec<(u32, u32, usize)> = score
        .partwise_iter()
        .map(|(position, _)| (position.measure(), position.voice(), position.index()))
        .collect();
    assert_eq!(
        visited,
        vec![
            (1, 1, 0),
            (1, 1, 1),
            (1, 1, 2),
            (1, 2, 0),
            (2, 1, 0),
            (2, 1, 1),
            (2, 1, 2),
        ]
    );
}

#[test]
fn partwise_iter_positions_resolve_to_the_same_elements() {
    let score = sample_score();
    for (position, durational) in score.partwise_iter() {
        let element = score
            .element_at(&position)
            .expect("iterated position resolves");
        match (durational, element) {
            (Durational::Note(note), Element::Note(resolved)) => {
                assert!(std::rc::Rc::ptr_eq(note, resolved));
            }
            (Durational::Rest(_), Element::Rest(_)) => {}
            (Durational::Chord(_), Element::Chord(_)) => {}
            (durational, _) => panic!("mismatched element kinds at {position:?}: {durational:?}"),
        }
    }
}

#[test]
fn selection_restricts_to_the_measure_range() {
    let score = sample_score();
    let measures: Vec<u32> = score
        .selection(2, 2)
        .map(|(position, _)| position.measure())
        .collect();
    assert_eq!(measures, vec![2, 2, 2]);

    assert_eq!(score.selection(5, 9).count(), 0);
}
