//! Reading and writing MusicXML and MXL, including round trips.

use pretty_assertions::assert_eq;

use notalib::{
    durations, read_bytes, read_musicxml, read_mxl, write_musicxml, write_mxl, Articulation,
    ChordBuilder, Connectable, Duration, Durational, GraceNoteType, MeasureAttributes,
    MeasureBuilder, NotationType, Notation, NoteBuilder, PartBuilder, Pitch, ReadError,
    RestBuilder, Score, ScoreBuilder, Step,
};

fn pitch(step: Step, octave: i32) -> Pitch {
    Pitch::new(step, 0, octave)
}

const TWO_VOICE_SCORE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<score-partwise version="4.0">
  <work><work-title>Fixture</work-title></work>
  <identification>
    <creator type="composer">Anna Magdalena</creator>
    <encoding><software>notalib test</software></encoding>
  </identification>
  <part-list>
    <score-part id="P1">
      <part-name>Music</part-name>
      <part-abbreviation>Mus.</part-abbreviation>
    </score-part>
  </part-list>
  <part id="P1">
    <measure number="1">
      <attributes>
        <divisions>6</divisions>
        <key><fifths>1</fifths></key>
        <time><beats>4</beats><beat-type>4</beat-type></time>
        <clef><sign>G</sign><line>2</line></clef>
      </attributes>
      <note>
        <pitch><step>C</step><octave>4</octave></pitch>
        <duration>6</duration>
        <voice>1</voice>
        <type>quarter</type>
        <notations><slur type="start" number="1"/></notations>
      </note>
      <note>
        <pitch><step>D</step><octave>4</octave></pitch>
        <duration>6</duration>
        <voice>1</voice>
        <type>quarter</type>
        <notations><slur type="stop" number="1"/></notations>
      </note>
      <note>
        <pitch><step>E</step><octave>4</octave></pitch>
        <duration>2</duration>
        <voice>1</voice>
        <type>eighth</type>
        <time-modification>
          <actual-notes>3</actual-notes>
          <normal-notes>2</normal-notes>
        </time-modification>
      </note>
      <note>
        <pitch><step>F</step><octave>4</octave></pitch>
        <duration>2</duration>
        <voice>1</voice>
        <type>eighth</type>
        <time-modification>
          <actual-notes>3</actual-notes>
          <normal-notes>2</normal-notes>
        </time-modification>
      </note>
      <note>
        <pitch><step>G</step><octave>4</octave></pitch>
        <duration>2</duration>
        <voice>1</voice>
        <type>eighth</type>
        <time-modification>
          <actual-notes>3</actual-notes>
          <normal-notes>2</normal-notes>
        </time-modification>
      </note>
      <note>
        <rest/>
        <duration>6</duration>
        <voice>1</voice>
        <type>quarter</type>
      </note>
      <backup><duration>24</duration></backup>
      <note>
        <pitch><step>C</step><octave>3</octave></pitch>
        <duration>12</duration>
        <voice>2</voice>
        <type>half</type>
      </note>
      <note>
        <chord/>
        <pitch><step>G</step><octave>3</octave></pitch>
        <duration>12</duration>
        <voice>2</voice>
        <type>half</type>
      </note>
      <note>
        <rest/>
        <duration>12</duration>
        <voice>2</voice>
        <type>half</type>
      </note>
    </measure>
    <measure number="2">
      <note>
        <pitch><step>E</step><octave>4</octave></pitch>
        <duration>12</duration>
        <voice>1</voice>
        <type>half</type>
        <tie type="start"/>
        <notations><tied type="start"/><fermata/></notations>
      </note>
      <note>
        <pitch><step>E</step><octave>4</octave></pitch>
        <duration>12</duration>
        <voice>1</voice>
        <type>half</type>
        <tie type="stop"/>
        <notations><tied type="stop"/></notations>
      </note>
      <note>
        <rest measure="yes"/>
        <duration>24</duration>
        <voice>2</voice>
      </note>
    </measure>
  </part>
</score-partwise>
"#;

// ─── Reading ────────────────────────────────────────────────────────

#[test]
fn reads_header_and_part_list() {
    let score = read_musicxml(TWO_VOICE_SCORE).expect("fixture parses");
    assert_eq!(score.title(), Some("Fixture"));
    assert_eq!(score.info().composer.as_deref(), Some("Anna Magdalena"));
    assert_eq!(score.info().software.as_deref(), Some("notalib test"));

    assert_eq!(score.part_count(), 1);
    let part = &score.parts()[0];
    assert_eq!(part.name(), Some("Music"));
    assert_eq!(part.abbreviation(), Some("Mus."));
    assert_eq!(part.measure_count(), 2);
}

#[test]
fn reads_attributes_and_carries_them_forward() {
    let score = read_musicxml(TWO_VOICE_SCORE).expect("fixture parses");
    let staff = score.parts()[0].staff(1).expect("single staff");

    let first = staff.measure(1).expect("measure 1");
    assert_eq!(first.attributes().key_signature.fifths(), 1);
    assert_eq!(first.attributes().time_signature.to_string(), "4/4");
    assert_eq!(first.attributes().clef, notalib::Clef::TREBLE);

    // Measure 2 declares nothing; the context carries forward.
    let second = staff.measure(2).expect("measure 2");
    assert_eq!(second.attributes().key_signature.fifths(), 1);
    assert_eq!(second.attributes().time_signature.to_string(), "4/4");
}

#[test]
fn reads_exact_durations_and_tuplets() {
    let score = read_musicxml(TWO_VOICE_SCORE).expect("fixture parses");
    let staff = score.parts()[0].staff(1).expect("single staff");
    let voice = staff.measure(1).expect("measure 1").voice(1).expect("voice 1");

    let lengths: Vec<Duration> = voice.iter().map(Durational::duration).collect();
    assert_eq!(
        lengths,
        vec![
            durations::QUARTER,
            durations::QUARTER,
            durations::EIGHTH_TRIPLET,
            durations::EIGHTH_TRIPLET,
            durations::EIGHTH_TRIPLET,
            durations::QUARTER,
        ]
    );
    assert_eq!(lengths[2].tuplet_divisor(), 3);
    assert!(lengths[2].has_expression(), "triplet keeps its written shape");

    // The measure total is exact.
    let total = Duration::sum(lengths).expect("non-empty");
    assert_eq!(total, durations::WHOLE);
}

#[test]
fn reads_slurs_into_connections() {
    let score = read_musicxml(TWO_VOICE_SCORE).expect("fixture parses");
    let staff = score.parts()[0].staff(1).expect("single staff");
    let voice = staff.measure(1).expect("measure 1").voice(1).expect("voice 1");

    let first = voice[0].as_note().expect("a note");
    assert!(first.has_notation_of_type(NotationType::Slur));
    let connection = first
        .connections()
        .iter()
        .find(|c| c.notation_type() == NotationType::Slur)
        .expect("slur connection");
    assert!(connection.is_beginning());

    let pitches: Vec<Pitch> = connection
        .notation()
        .affected_starting_from(&Connectable::Note(first.clone()))
        .map(|element| element.pitch())
        .collect();
    assert_eq!(pitches, vec![pitch(Step::C, 4), pitch(Step::D, 4)]);
}

#[test]
fn reads_chords_sorted_ascending() {
    let score = read_musicxml(TWO_VOICE_SCORE).expect("fixture parses");
    let staff = score.parts()[0].staff(1).expect("single staff");
    let voice = staff.measure(1).expect("measure 1").voice(2).expect("voice 2");

    let chord = voice[0].as_chord().expect("a chord");
    assert_eq!(chord.note_count(), 2);
    let pitches: Vec<Pitch> = chord.notes().iter().map(|n| n.pitch()).collect();
    assert_eq!(pitches, vec![pitch(Step::C, 3), pitch(Step::G, 3)]);
    assert_eq!(chord.duration(), durations::HALF);
}

#[test]
fn reads_ties_and_whole_measure_rests() {
    let score = read_musicxml(TWO_VOICE_SCORE).expect("fixture parses");
    let staff = score.parts()[0].staff(1).expect("single staff");
    let measure = staff.measure(2).expect("measure 2");

    let voice1 = measure.voice(1).expect("voice 1");
    let first = voice1[0].as_note().expect("a note");
    assert!(first.is_tied_to_following());
    assert!(first.has_articulation(Articulation::Fermata));
    assert_eq!(first.tied_duration(), durations::WHOLE);
    let second = voice1[1].as_note().expect("a note");
    assert!(second.is_tied_from_previous());
    assert!(!second.is_tied_to_following());

    let voice2 = measure.voice(2).expect("voice 2");
    assert!(voice2[0].is_rest());
    assert_eq!(voice2[0].duration(), durations::WHOLE);
}

#[test]
fn reads_grace_notes_with_their_written_type() {
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<score-partwise version="4.0">
  <part-list>
    <score-part id="P1"><part-name>Music</part-name></score-part>
  </part-list>
  <part id="P1">
    <measure number="1">
      <attributes>
        <divisions>4</divisions>
        <time><beats>4</beats><beat-type>4</beat-type></time>
      </attributes>
      <note>
        <grace slash="yes"/>
        <pitch><step>D</step><octave>5</octave></pitch>
        <voice>1</voice>
        <type>16th</type>
      </note>
      <note>
        <pitch><step>E</step><octave>5</octave></pitch>
        <duration>16</duration>
        <voice>1</voice>
        <type>whole</type>
      </note>
    </measure>
  </part>
</score-partwise>"#;

    let score = read_musicxml(xml).expect("fixture parses");
    let staff = score.parts()[0].staff(1).expect("single staff");
    let voice = staff.measure(1).expect("measure 1").voice(1).expect("voice 1");

    let principal = voice[0].as_note().expect("a note");
    assert_eq!(principal.pitch(), pitch(Step::E, 5));
    let graces = principal.preceding_grace_notes();
    assert_eq!(graces.len(), 1);
    assert_eq!(graces[0].pitch(), pitch(Step::D, 5));
    assert_eq!(graces[0].displayable_duration(), durations::SIXTEENTH);
    assert_eq!(graces[0].grace_note_type(), GraceNoteType::Acciaccatura);
}

// ─── Malformed input ────────────────────────────────────────────────

#[test]
fn wrong_root_element_is_a_format_error() {
    let result = read_musicxml("<?xml version=\"1.0\"?><score-timewise/>");
    assert!(matches!(result, Err(ReadError::Format(_))));
}

#[test]
fn invalid_xml_is_an_xml_error() {
    let result = read_musicxml("this is not xml");
    assert!(matches!(result, Err(ReadError::Xml(_))));
}

#[test]
fn garbage_bytes_fail_as_an_archive() {
    let result = read_bytes(&[0x50, 0x4b, 0x00, 0x00, 0x01], None);
    assert!(matches!(result, Err(ReadError::Zip(_))));
}

// ─── Round trips ────────────────────────────────────────────────────

/// A score with a slur, a chord, a triplet and an unnotatable duration
/// that must be written as a tied run.
fn round_trip_score() -> Score {
    let mut measure1 = MeasureBuilder::new(1, MeasureAttributes::default());
    let slur = Notation::slur();
    let first = NoteBuilder::new(pitch(Step::C, 4), durations::QUARTER);
    let second = NoteBuilder::new(pitch(Step::D, 4), durations::QUARTER);
    first.connect_with(&slur, &second);
    measure1.add_to_voice(1, first);
    measure1.add_to_voice(1, second);
    let mut chord = ChordBuilder::new();
    chord.add(NoteBuilder::new(pitch(Step::C, 4), durations::QUARTER));
    chord.add(NoteBuilder::new(pitch(Step::E, 4), durations::QUARTER));
    measure1.add_to_voice(1, chord);
    for step in [Step::E, Step::F, Step::G] {
        measure1.add_to_voice(
            1,
            NoteBuilder::new(pitch(step, 4), durations::QUARTER.divide(3)),
        );
    }

    let mut measure2 = MeasureBuilder::new(2, MeasureAttributes::default());
    measure2.add_to_voice(
        1,
        NoteBuilder::new(pitch(Step::F, 4), Duration::new(5, 8).expect("valid")),
    );
    measure2.add_to_voice(1, RestBuilder::new(Duration::new(3, 8).expect("valid")));

    let mut part = PartBuilder::new("Flute");
    part.add_measure(measure1);
    part.add_measure(measure2);

    let mut score = ScoreBuilder::new();
    score.info_mut().title = Some("Round Trip".to_string());
    score.info_mut().composer = Some("Nobody".to_string());
    score.add_part(part);
    score.build().expect("round trip score builds")
}

#[test]
fn musicxml_round_trip_preserves_structure() {
    let original = round_trip_score();
    let xml = write_musicxml(&original);
    let reread = read_musicxml(&xml).expect("written document parses");

    assert_eq!(reread.title(), Some("Round Trip"));
    assert_eq!(reread.info().composer.as_deref(), Some("Nobody"));
    assert_eq!(reread.part_count(), 1);
    assert_eq!(reread.parts()[0].name(), Some("Flute"));

    let staff = reread.parts()[0].staff(1).expect("single staff");
    let voice1 = staff.measure(1).expect("measure 1").voice(1).expect("voice 1");
    assert_eq!(voice1.len(), 6);
    assert_eq!(voice1[0].duration(), durations::QUARTER);
    assert_eq!(voice1[3].duration(), durations::EIGHTH_TRIPLET);
    assert_eq!(
        voice1[2].as_chord().map(|c| c.note_count()),
        Some(2),
        "chord survives the round trip"
    );

    // The slur still spans the first two notes.
    let first = voice1[0].as_note().expect("a note");
    let slur = first
        .connections()
        .iter()
        .find(|c| c.notation_type() == NotationType::Slur)
        .expect("slur survives the round trip");
    assert!(slur.is_beginning());
    assert_eq!(
        slur.following().map(Connectable::pitch),
        Some(pitch(Step::D, 4))
    );
}

#[test]
fn unnotatable_duration_round_trips_as_a_tied_run() {
    let original = round_trip_score();
    let xml = write_musicxml(&original);
    let reread = read_musicxml(&xml).expect("written document parses");

    let staff = reread.parts()[0].staff(1).expect("single staff");
    let voice = staff.measure(2).expect("measure 2").voice(1).expect("voice 1");

    // 5/8 was written as half tied to eighth.
    assert_eq!(voice.len(), 3);
    let first = voice[0].as_note().expect("a note");
    assert_eq!(first.duration(), durations::HALF);
    assert!(first.is_tied_to_following());
    assert_eq!(first.tied_duration(), Duration::new(5, 8).expect("valid"));
    assert_eq!(voice[1].duration(), durations::EIGHTH);

    // 3/8 came back as one dotted rest, not a run.
    assert!(voice[2].is_rest());
    assert_eq!(voice[2].duration(), Duration::new(3, 8).expect("valid"));
}

#[test]
fn mxl_round_trip() {
    let original = round_trip_score();
    let archive = write_mxl(&original).expect("mxl writes");
    let reread = read_mxl(&archive).expect("mxl reads back");

    assert_eq!(reread.title(), Some("Round Trip"));
    assert_eq!(reread.part_count(), 1);
    assert_eq!(reread.measure_count(), 2);

    let extracted = notalib::mxl::extract_musicxml(&archive).expect("archive holds xml");
    assert!(extracted.contains("<score-partwise"));
}

#[test]
fn read_bytes_auto_detects_the_format() {
    let original = round_trip_score();

    let xml = write_musicxml(&original);
    let from_xml = read_bytes(xml.as_bytes(), None).expect("detects xml");
    assert_eq!(from_xml.title(), Some("Round Trip"));

    let archive = write_mxl(&original).expect("mxl writes");
    let from_mxl = read_bytes(&archive, None).expect("detects mxl");
    assert_eq!(from_mxl.title(), Some("Round Trip"));
}
