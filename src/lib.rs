//! notalib — an exact model of Western music notation with MusicXML
//! interchange.
//!
//! Durations are exact rationals, never floating point; ties, slurs and
//! other cross-note markings are built through a two-phase builder layer
//! that resolves forward references into an immutable score graph; and
//! any element of a finished score is addressable by a [`Position`].
//! Both uncompressed MusicXML (.musicxml) and compressed MXL (.mxl)
//! files are supported.
//!
//! # Example
//! ```no_run
//! use notalib::read_file;
//!
//! let score = read_file("path/to/score.musicxml").unwrap();
//! println!("Title: {:?}", score.title());
//! println!("Parts: {}", score.part_count());
//! println!("Measures: {}", score.measure_count());
//! ```

pub mod builder;
pub mod duration;
pub mod error;
pub mod mxl;
pub mod notation;
pub mod note;
pub mod pattern;
pub mod pitch;
pub mod position;
pub mod reader;
pub mod score;
pub mod writer;

use std::path::Path;

pub use builder::{
    ChordBuilder, DurationalBuilder, GraceNoteBuilder, MeasureBuilder, NoteBuilder, PartBuilder,
    RestBuilder, ScoreBuilder,
};
pub use duration::{durations, Duration, DurationAppearance, DurationSymbol, TupletRatio};
pub use error::{BuildError, LookupError, ReadError};
pub use mxl::{read_mxl, write_mxl};
pub use notation::{Connectable, Connection, Notation, NotationType};
pub use note::{Articulation, Chord, Durational, GraceNote, GraceNoteType, Note, Ornament, Rest};
pub use pattern::Pattern;
pub use pitch::{Pitch, Step};
pub use position::{Element, Position};
pub use reader::read_musicxml;
pub use score::{
    Barline, Clef, ClefSign, KeySignature, Measure, MeasureAttributes, Part, Score, ScoreInfo,
    Staff, TimeSignature,
};
pub use writer::write_musicxml;

/// Read a score from a file path. The format is detected from the file
/// extension:
/// - `.musicxml` or `.xml` → uncompressed MusicXML
/// - `.mxl` → compressed MXL (ZIP archive)
///
/// Any other extension is auto-detected from the content.
pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Score, ReadError> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    read_bytes(&data, path.extension().and_then(|e| e.to_str()))
}

/// Read a score from raw bytes with an optional format hint. With no
/// hint, the format is auto-detected: content starting like an XML
/// document is read as MusicXML, anything else as MXL.
pub fn read_bytes(data: &[u8], extension: Option<&str>) -> Result<Score, ReadError> {
    match extension {
        Some("mxl") => read_mxl(data),
        Some("musicxml") | Some("xml") => {
            let xml = std::str::from_utf8(data)
                .map_err(|e| ReadError::Format(format!("invalid UTF-8 in MusicXML file: {e}")))?;
            read_musicxml(xml)
        }
        _ => {
            if let Ok(xml) = std::str::from_utf8(data) {
                if xml.trim_start().starts_with('<') {
                    return read_musicxml(xml);
                }
            }
            read_mxl(data)
        }
    }
}

/// Write a score to a file path. `.mxl` writes a compressed archive, any
/// other extension an uncompressed MusicXML document.
pub fn write_file<P: AsRef<Path>>(score: &Score, path: P) -> Result<(), ReadError> {
    let path = path.as_ref();
    let data = match path.extension().and_then(|e| e.to_str()) {
        Some("mxl") => write_mxl(score)?,
        _ => write_musicxml(score).into_bytes(),
    };
    std::fs::write(path, data)?;
    Ok(())
}

/// Serialize a score to a JSON string.
pub fn score_to_json(score: &Score) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(score)
}
