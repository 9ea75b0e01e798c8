//! Pattern extraction from position selections.

use pretty_assertions::assert_eq;

use notalib::{
    durations, ChordBuilder, Durational, Duration, LookupError, MeasureAttributes, MeasureBuilder,
    NoteBuilder, PartBuilder, Pattern, Pitch, Position, RestBuilder, Score, ScoreBuilder, Step,
};

fn pitch(step: Step, octave: i32) -> Pitch {
    Pitch::new(step, 0, octave)
}

fn single_voice_score(measures: Vec<MeasureBuilder>) -> Score {
    let mut part = PartBuilder::new("Melody");
    for measure in measures {
        part.add_measure(measure);
    }
    let mut score = ScoreBuilder::new();
    score.add_part(part);
    score.build().expect("score builds")
}

// ─── Direct constructors ────────────────────────────────────────────

#[test]
fn of_voices_numbers_densely_from_one() {
    let pattern = Pattern::of_voices(vec![
        vec![Durational::Rest(notalib::Rest::of(durations::QUARTER))],
        vec![Durational::Rest(notalib::Rest::of(durations::HALF))],
    ])
    .with_name("fragment");

    assert_eq!(pattern.name(), Some("fragment"));
    assert_eq!(pattern.voice_count(), 2);
    assert_eq!(pattern.voice_numbers().collect::<Vec<_>>(), vec![1, 2]);
    assert!(!pattern.is_monophonic());
}

// ─── Gap filling ────────────────────────────────────────────────────

#[test]
fn skipped_elements_become_one_exact_rest() {
    // Voice: quarter, quarter, eighth, quarter rest, quarter.
    let mut measure = MeasureBuilder::new(1, MeasureAttributes::default());
    measure.add_to_voice(1, NoteBuilder::new(pitch(Step::C, 4), durations::QUARTER));
    measure.add_to_voice(1, NoteBuilder::new(pitch(Step::D, 4), durations::QUARTER));
    measure.add_to_voice(1, NoteBuilder::new(pitch(Step::E, 4), durations::EIGHTH));
    measure.add_to_voice(1, RestBuilder::new(durations::QUARTER));
    measure.add_to_voice(1, NoteBuilder::new(pitch(Step::F, 4), durations::QUARTER));
    let score = single_voice_score(vec![measure]);

    // Select indices 0 and 3, skipping one and a half beats.
    let pattern = Pattern::extract(
        &score,
        &[
            Position::in_single_staff(0, 1, 1, 0),
            Position::in_single_staff(0, 1, 1, 3),
        ],
    )
    .expect("positions resolve");

    assert!(pattern.is_monophonic());
    let voice = pattern.voice(1).expect("single voice");
    assert_eq!(voice.len(), 3, "note, one gap rest, selected rest");

    assert_eq!(
        voice[0].as_note().map(|n| n.pitch()),
        Some(pitch(Step::C, 4))
    );
    assert!(voice[1].is_rest());
    assert_eq!(
        voice[1].duration(),
        Duration::new(3, 8).unwrap(),
        "the gap is exactly a dotted quarter"
    );
    assert!(voice[2].is_rest());
    assert_eq!(voice[2].duration(), durations::QUARTER);
}

#[test]
fn gaps_across_measures_use_time_signatures() {
    // Two 4/4 measures of quarters; select the first and the last.
    let mut measure1 = MeasureBuilder::new(1, MeasureAttributes::default());
    for step in [Step::C, Step::D, Step::E, Step::F] {
        measure1.add_to_voice(1, NoteBuilder::new(pitch(step, 4), durations::QUARTER));
    }
    let mut measure2 = MeasureBuilder::new(2, MeasureAttributes::default());
    for step in [Step::G, Step::A, Step::B, Step::C] {
        measure2.add_to_voice(1, NoteBuilder::new(pitch(step, 4), durations::QUARTER));
    }
    let score = single_voice_score(vec![measure1, measure2]);

    let pattern = Pattern::extract(
        &score,
        &[
            Position::in_single_staff(0, 1, 1, 0),
            Position::in_single_staff(0, 2, 1, 3),
        ],
    )
    .expect("positions resolve");

    let voice = pattern.voice(1).expect("single voice");
    // Gap from end of beat 1 to the last beat of measure 2: 6 quarters.
    let gap: Duration = Duration::sum(
        voice[1..voice.len() - 1]
            .iter()
            .inspect(|d| assert!(d.is_rest(), "gap filler must be a rest"))
            .map(Durational::duration),
    )
    .expect("gap rests exist");
    assert_eq!(gap, Duration::new(3, 2).unwrap());

    assert_eq!(
        voice.last().and_then(|d| d.as_note()).map(|n| n.pitch()),
        Some(pitch(Step::C, 4))
    );
}

#[test]
fn adjacent_selections_get_no_filler() {
    let mut measure = MeasureBuilder::new(1, MeasureAttributes::default());
    measure.add_to_voice(1, NoteBuilder::new(pitch(Step::C, 4), durations::QUARTER));
    measure.add_to_voice(1, NoteBuilder::new(pitch(Step::D, 4), durations::QUARTER));
    let score = single_voice_score(vec![measure]);

    let pattern = Pattern::extract(
        &score,
        &[
            Position::in_single_staff(0, 1, 1, 0),
            Position::in_single_staff(0, 1, 1, 1),
        ],
    )
    .expect("positions resolve");

    let voice = pattern.voice(1).expect("single voice");
    assert_eq!(voice.len(), 2);
    assert!(voice.iter().all(|d| d.is_note()));
}

// ─── Grouping ───────────────────────────────────────────────────────

#[test]
fn voices_are_grouped_in_first_seen_order() {
    let mut measure = MeasureBuilder::new(1, MeasureAttributes::default());
    measure.add_to_voice(1, NoteBuilder::new(pitch(Step::C, 5), durations::WHOLE));
    measure.add_to_voice(4, NoteBuilder::new(pitch(Step::C, 3), durations::WHOLE));
    let score = single_voice_score(vec![measure]);

    // Lower voice first in the selection.
    let pattern = Pattern::extract(
        &score,
        &[
            Position::in_single_staff(0, 1, 4, 0),
            Position::in_single_staff(0, 1, 1, 0),
        ],
    )
    .expect("positions resolve");

    assert_eq!(pattern.voice_count(), 2);
    assert_eq!(
        pattern.voice(1).and_then(|v| v[0].as_note()).map(|n| n.pitch()),
        Some(pitch(Step::C, 3)),
        "voice 1 of the pattern is the first-seen source voice"
    );
    assert_eq!(
        pattern.voice(2).and_then(|v| v[0].as_note()).map(|n| n.pitch()),
        Some(pitch(Step::C, 5))
    );
}

#[test]
fn duplicate_positions_are_dropped() {
    let mut measure = MeasureBuilder::new(1, MeasureAttributes::default());
    measure.add_to_voice(1, NoteBuilder::new(pitch(Step::C, 4), durations::WHOLE));
    let score = single_voice_score(vec![measure]);

    let position = Position::in_single_staff(0, 1, 1, 0);
    let pattern =
        Pattern::extract(&score, &[position, position, position]).expect("positions resolve");
    assert_eq!(pattern.voice(1).map(<[Durational]>::len), Some(1));
}

#[test]
fn chord_note_selections_merge_back_into_a_chord() {
    let mut chord = ChordBuilder::new();
    chord.add(NoteBuilder::new(pitch(Step::C, 4), durations::HALF));
    chord.add(NoteBuilder::new(pitch(Step::E, 4), durations::HALF));
    chord.add(NoteBuilder::new(pitch(Step::G, 4), durations::HALF));
    let mut measure = MeasureBuilder::new(1, MeasureAttributes::default());
    measure.add_to_voice(1, chord);
    let score = single_voice_score(vec![measure]);

    let base = Position::in_single_staff(0, 1, 1, 0);
    let pattern = Pattern::extract(
        &score,
        &[base.with_chord_index(0), base.with_chord_index(2)],
    )
    .expect("positions resolve");

    let voice = pattern.voice(1).expect("single voice");
    assert_eq!(voice.len(), 1);
    let merged = voice[0].as_chord().expect("merged back into a chord");
    assert_eq!(merged.note_count(), 2);
    let pitches: Vec<Pitch> = merged.notes().iter().map(|n| n.pitch()).collect();
    assert_eq!(pitches, vec![pitch(Step::C, 4), pitch(Step::G, 4)]);
}

#[test]
fn single_chord_note_selection_becomes_a_note() {
    let mut chord = ChordBuilder::new();
    chord.add(NoteBuilder::new(pitch(Step::C, 4), durations::HALF));
    chord.add(NoteBuilder::new(pitch(Step::E, 4), durations::HALF));
    let mut measure = MeasureBuilder::new(1, MeasureAttributes::default());
    measure.add_to_voice(1, chord);
    let score = single_voice_score(vec![measure]);

    let pattern = Pattern::extract(
        &score,
        &[Position::in_single_staff(0, 1, 1, 0).with_chord_index(1)],
    )
    .expect("position resolves");

    let voice = pattern.voice(1).expect("single voice");
    assert_eq!(
        voice[0].as_note().map(|n| n.pitch()),
        Some(pitch(Step::E, 4))
    );
}

// ─── Failure ────────────────────────────────────────────────────────

#[test]
fn any_invalid_position_fails_the_whole_extraction() {
    let mut measure = MeasureBuilder::new(1, MeasureAttributes::default());
    measure.add_to_voice(1, NoteBuilder::new(pitch(Step::C, 4), durations::WHOLE));
    let score = single_voice_score(vec![measure]);

    let result = Pattern::extract(
        &score,
        &[
            Position::in_single_staff(0, 1, 1, 0),
            Position::in_single_staff(0, 1, 9, 0),
        ],
    );
    assert_eq!(result, Err(LookupError::VoiceNotFound(9)));
}
