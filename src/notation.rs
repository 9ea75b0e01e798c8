//! Cross-element markings: ties, slurs, glissandi, arpeggiation.
//!
//! One [`Notation`] value stands for one *occurrence* of a marking — two
//! slurs created separately are different notations even though both are
//! slurs, so identity is by handle, not by type. The elements affected by
//! an occurrence are linked pairwise through [`Connection`]s: the first
//! element holds a beginning connection to the second, each middle element
//! holds a connection to its successor, and the last holds an end
//! connection with no successor. For any occurrence those connections form
//! exactly one simple path.

use std::hash::{Hash, Hasher};
use std::rc::Rc;

use serde::Serialize;

use crate::duration::Duration;
use crate::note::{GraceNote, Note};
use crate::pitch::Pitch;

/// The kind of a connected notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NotationType {
    /// Pitch-preserving duration extension between adjacent notes.
    Tie,
    Slur,
    Glissando,
    /// Arpeggiation, customarily played from the lowest note upwards.
    Arpeggiate,
    /// Arpeggiation explicitly marked downwards.
    ArpeggiateDown,
    /// Bracket marking a chord as not arpeggiated.
    NonArpeggiate,
}

#[derive(Debug, Serialize)]
struct NotationData {
    notation_type: NotationType,
}

/// One occurrence of a cross-element marking. Cheap to clone; clones are
/// the same occurrence. Equality and hashing are by occurrence identity,
/// never by type.
#[derive(Debug, Clone, Serialize)]
pub struct Notation(Rc<NotationData>);

impl Notation {
    /// A new occurrence of the given type.
    pub fn of(notation_type: NotationType) -> Notation {
        Notation(Rc::new(NotationData { notation_type }))
    }

    /// A new tie occurrence.
    pub fn tie() -> Notation {
        Notation::of(NotationType::Tie)
    }

    /// A new slur occurrence.
    pub fn slur() -> Notation {
        Notation::of(NotationType::Slur)
    }

    pub fn notation_type(&self) -> NotationType {
        self.0.notation_type
    }

    pub fn is_tie(&self) -> bool {
        self.0.notation_type == NotationType::Tie
    }

    /// All elements affected by this occurrence starting from `element`,
    /// in chain order. Yields nothing if the element takes no part in
    /// this occurrence; otherwise the element itself followed by the rest
    /// of the chain, walked lazily one connection at a time.
    pub fn affected_starting_from(&self, element: &Connectable) -> FollowingElements<'_> {
        FollowingElements {
            notation: self,
            next: element.connection(self).map(|_| element.clone()),
        }
    }
}

impl PartialEq for Notation {
    fn eq(&self, other: &Notation) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Notation {}

impl Hash for Notation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.0).hash(state);
    }
}

// ─── Connections ─────────────────────────────────────────────────────

/// A finalized element that can take part in a notation chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Connectable {
    Note(Rc<Note>),
    GraceNote(Rc<GraceNote>),
}

impl Connectable {
    /// The connection this element holds for the given occurrence.
    pub fn connection(&self, notation: &Notation) -> Option<&Connection> {
        match self {
            Connectable::Note(note) => note.connection(notation),
            Connectable::GraceNote(grace) => grace.connection(notation),
        }
    }

    /// The pitch of the element.
    pub fn pitch(&self) -> Pitch {
        match self {
            Connectable::Note(note) => note.pitch(),
            Connectable::GraceNote(grace) => grace.pitch(),
        }
    }

    /// The duration the element occupies, if it occupies time: grace notes
    /// only display a duration and return `None`.
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Connectable::Note(note) => Some(note.duration()),
            Connectable::GraceNote(_) => None,
        }
    }

    pub fn as_note(&self) -> Option<&Rc<Note>> {
        match self {
            Connectable::Note(note) => Some(note),
            Connectable::GraceNote(_) => None,
        }
    }
}

/// One element's role in one notation occurrence: the beginning, a middle,
/// or the end of the chain. Beginning and middle connections own a
/// reference to the following finalized element; the end has none.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Connection {
    notation: Notation,
    following: Option<Connectable>,
    is_beginning: bool,
}

impl Connection {
    /// The connection attached to the first element of a chain.
    pub fn beginning_of(notation: Notation, following: Connectable) -> Connection {
        Connection {
            notation,
            following: Some(following),
            is_beginning: true,
        }
    }

    /// A connection attached to a middle element of a chain.
    pub fn of(notation: Notation, following: Connectable) -> Connection {
        Connection {
            notation,
            following: Some(following),
            is_beginning: false,
        }
    }

    /// The connection attached to the last element of a chain.
    pub fn end_of(notation: Notation) -> Connection {
        Connection {
            notation,
            following: None,
            is_beginning: false,
        }
    }

    /// The occurrence this connection belongs to.
    pub fn notation(&self) -> &Notation {
        &self.notation
    }

    pub fn notation_type(&self) -> NotationType {
        self.notation.notation_type()
    }

    /// The next element in the chain; `None` at the end.
    pub fn following(&self) -> Option<&Connectable> {
        self.following.as_ref()
    }

    pub fn is_beginning(&self) -> bool {
        self.is_beginning
    }

    pub fn is_end(&self) -> bool {
        self.following.is_none()
    }

    /// All elements after this connection's holder that the same
    /// occurrence affects, in chain order. Lazy and iterative; finalized
    /// chains are finite by construction.
    pub fn following_elements(&self) -> FollowingElements<'_> {
        FollowingElements {
            notation: &self.notation,
            next: self.following.clone(),
        }
    }
}

/// Lazy iterator over the elements of a notation chain, in chain order.
pub struct FollowingElements<'a> {
    notation: &'a Notation,
    next: Option<Connectable>,
}

impl Iterator for FollowingElements<'_> {
    type Item = Connectable;

    fn next(&mut self) -> Option<Connectable> {
        let current = self.next.take()?;
        self.next = current
            .connection(self.notation)
            .and_then(|connection| connection.following().cloned());
        Some(current)
    }
}
