//! Error types for the notation model and the MusicXML boundary.
//!
//! Three separate families so callers can tell them apart:
//! construction misuse ([`BuildError`]), addresses that do not exist in a
//! score ([`LookupError`]), and failures at the interchange boundary
//! ([`ReadError`]), where I/O problems are kept distinct from malformed
//! documents.

use thiserror::Error;

/// Fatal construction errors. These signal caller misuse — invalid values
/// passed to a constructor or an impossible structure declared through the
/// builder protocol — and are never silently corrected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// Duration numerator or denominator was zero.
    #[error("duration numerator and denominator must be at least 1")]
    InvalidDuration,

    /// More dots than a duration can display.
    #[error("dot count must be at most {max}, was {count}")]
    TooManyDots { count: u32, max: u32 },

    /// A tuplet divisor of zero.
    #[error("tuplet divisor must be at least 1")]
    InvalidTupletDivisor,

    /// Summing an empty collection of durations.
    #[error("cannot sum an empty collection of durations")]
    EmptySum,

    /// A chord with no notes.
    #[error("chord must contain at least one note")]
    EmptyChord,

    /// Notes of differing lengths inside one chord.
    #[error("all notes in a chord must have equal durations")]
    MismatchedChordDurations,

    /// A tie or notation chain that loops back on itself, detected while
    /// finalizing builders.
    #[error("cyclic notation chain detected while building")]
    CyclicNotation,
}

/// A position component that does not exist in the score. Expected in
/// normal use and recoverable; the variant names the first hierarchical
/// component that failed to resolve.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("no part at index {0}")]
    PartNotFound(usize),

    #[error("no staff {0} in part")]
    StaffNotFound(u32),

    #[error("no measure {0} in staff")]
    MeasureNotFound(u32),

    #[error("no voice {0} in measure")]
    VoiceNotFound(u32),

    #[error("no element at index {0} in voice")]
    IndexNotFound(usize),

    #[error("element is not a chord or has no note at chord index {0}")]
    ChordIndexNotFound(usize),
}

/// Failures while reading an interchange document. `Io` covers missing or
/// unreadable streams; the other variants cover documents that were read
/// but are malformed, so callers can retry or abort accordingly.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("MXL archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Structurally valid XML that is not a usable score document.
    #[error("invalid MusicXML: {0}")]
    Format(String),

    /// The parsed document declared an impossible structure.
    #[error("invalid MusicXML: {0}")]
    Build(#[from] BuildError),
}
