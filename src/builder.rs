//! Two-phase builders for notes, chords, measures, parts and scores.
//!
//! Builders are mutable, cheap-to-clone shared handles. A builder may
//! declare a *forward* reference to another builder that has not been
//! finalized yet — the following note of a tie, or the next element under
//! a slur — and `build()` resolves the whole reachable graph at once:
//! successors are materialized first so every finished element holds
//! [`Connection`]s to finished elements, never to builders. The walk is
//! iterative with an explicit in-progress marker per builder; a chain that
//! loops back on itself fails with [`BuildError::CyclicNotation`] instead
//! of recursing forever.
//!
//! Results are cached. `build()` called twice without intervening mutation
//! returns the same element; after mutating a builder call
//! [`NoteBuilder::clear_cache`] on it (and on any builder whose successors
//! changed) before rebuilding. Rebuilding without clearing the cache is
//! unsupported.
//!
//! Builders are not thread-safe.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use std::collections::BTreeSet;

use crate::duration::Duration;
use crate::error::BuildError;
use crate::notation::{Connectable, Connection, Notation};
use crate::note::{
    Articulation, Chord, Durational, GraceNote, GraceNoteType, Note, Ornament, Rest,
};
use crate::pitch::Pitch;
use crate::score::{Measure, MeasureAttributes, Part, Score, ScoreInfo, Staff};

/// A forward reference recorded in a builder: the next element of one
/// notation occurrence's chain.
#[derive(Clone)]
enum Target {
    Note(NoteBuilder),
    GraceNote(GraceNoteBuilder),
}

// ─── NoteBuilder ─────────────────────────────────────────────────────

struct NoteData {
    pitch: Pitch,
    duration: Duration,
    articulations: BTreeSet<Articulation>,
    ornaments: BTreeSet<Ornament>,
    /// Outgoing forward references, at most one per notation occurrence.
    connections: Vec<(Notation, Target)>,
    /// Occurrences that arrive at this builder from a predecessor.
    connected_from: Vec<Notation>,
    preceding_grace_notes: Vec<GraceNoteBuilder>,
    succeeding_grace_notes: Vec<GraceNoteBuilder>,
    cached: Option<Rc<Note>>,
    in_progress: bool,
}

/// Builder for [`Note`] values. Clones share the same underlying builder,
/// which is what allows a forward reference to a note declared later.
#[derive(Clone)]
pub struct NoteBuilder {
    inner: Rc<RefCell<NoteData>>,
}

impl NoteBuilder {
    pub fn new(pitch: Pitch, duration: Duration) -> NoteBuilder {
        NoteBuilder {
            inner: Rc::new(RefCell::new(NoteData {
                pitch,
                duration,
                articulations: BTreeSet::new(),
                ornaments: BTreeSet::new(),
                connections: Vec::new(),
                connected_from: Vec::new(),
                preceding_grace_notes: Vec::new(),
                succeeding_grace_notes: Vec::new(),
                cached: None,
                in_progress: false,
            })),
        }
    }

    pub fn pitch(&self) -> Pitch {
        self.inner.borrow().pitch
    }

    pub fn set_pitch(&self, pitch: Pitch) {
        self.inner.borrow_mut().pitch = pitch;
    }

    pub fn duration(&self) -> Duration {
        self.inner.borrow().duration
    }

    pub fn set_duration(&self, duration: Duration) {
        self.inner.borrow_mut().duration = duration;
    }

    pub fn add_articulation(&self, articulation: Articulation) {
        self.inner.borrow_mut().articulations.insert(articulation);
    }

    pub fn add_ornament(&self, ornament: Ornament) {
        self.inner.borrow_mut().ornaments.insert(ornament);
    }

    /// Declares that this note is tied to the note built by `following`.
    /// Replaces any previously declared outgoing tie.
    pub fn add_tie_to_following(&self, following: &NoteBuilder) {
        let replaced: Vec<(Notation, Target)> = {
            let mut data = self.inner.borrow_mut();
            let replaced = data
                .connections
                .iter()
                .filter(|(notation, _)| notation.is_tie())
                .cloned()
                .collect();
            data.connections.retain(|(notation, _)| !notation.is_tie());
            replaced
        };
        for (notation, old_target) in replaced {
            old_target.unmark_connected_from(&notation);
        }
        let tie = Notation::tie();
        following.mark_connected_from(&tie);
        self.inner
            .borrow_mut()
            .connections
            .push((tie, Target::Note(following.clone())));
    }

    /// Declares that the given occurrence continues from this note to the
    /// note built by `following`. At most one outgoing reference per
    /// occurrence; declaring the same occurrence again replaces the
    /// previous reference.
    pub fn connect_with(&self, notation: &Notation, following: &NoteBuilder) {
        self.record_connection(notation, Target::Note(following.clone()));
        following.mark_connected_from(notation);
    }

    /// As [`NoteBuilder::connect_with`] with a grace note as the next
    /// element of the chain.
    pub fn connect_with_grace_note(&self, notation: &Notation, following: &GraceNoteBuilder) {
        self.record_connection(notation, Target::GraceNote(following.clone()));
        following.mark_connected_from(notation);
    }

    fn record_connection(&self, notation: &Notation, target: Target) {
        let replaced: Vec<(Notation, Target)> = {
            let mut data = self.inner.borrow_mut();
            let replaced = data
                .connections
                .iter()
                .filter(|(existing, _)| existing == notation)
                .cloned()
                .collect();
            data.connections.retain(|(existing, _)| existing != notation);
            data.connections.push((notation.clone(), target));
            replaced
        };
        // The chain is a simple path, so the replaced target is no longer
        // reached by this occurrence at all.
        for (notation, old_target) in replaced {
            old_target.unmark_connected_from(&notation);
        }
    }

    fn mark_connected_from(&self, notation: &Notation) {
        let mut data = self.inner.borrow_mut();
        if !data.connected_from.contains(notation) {
            data.connected_from.push(notation.clone());
        }
    }

    fn unmark_connected_from(&self, notation: &Notation) {
        self.inner
            .borrow_mut()
            .connected_from
            .retain(|existing| existing != notation);
    }

    /// True if some other builder declared a tie into this one.
    pub fn is_tied_from_previous(&self) -> bool {
        self.inner
            .borrow()
            .connected_from
            .iter()
            .any(Notation::is_tie)
    }

    /// The builder of the note this one is tied to, if declared.
    pub fn following_tied(&self) -> Option<NoteBuilder> {
        self.inner
            .borrow()
            .connections
            .iter()
            .find(|(notation, _)| notation.is_tie())
            .and_then(|(_, target)| match target {
                Target::Note(builder) => Some(builder.clone()),
                Target::GraceNote(_) => None,
            })
    }

    /// Attaches grace notes played before the note. The builders are
    /// finalized together with this builder.
    pub fn set_preceding_grace_notes(&self, grace_notes: Vec<GraceNoteBuilder>) {
        for grace in &grace_notes {
            grace.set_principal(self);
        }
        self.inner.borrow_mut().preceding_grace_notes = grace_notes;
    }

    /// Attaches grace notes played after the note.
    pub fn set_succeeding_grace_notes(&self, grace_notes: Vec<GraceNoteBuilder>) {
        for grace in &grace_notes {
            grace.set_principal(self);
        }
        self.inner.borrow_mut().succeeding_grace_notes = grace_notes;
    }

    /// Drops the cached result so the next [`NoteBuilder::build`] reflects
    /// later mutations. Must also be called on every builder whose
    /// forward-referenced successors changed.
    pub fn clear_cache(&self) {
        let mut data = self.inner.borrow_mut();
        data.cached = None;
        data.in_progress = false;
    }

    /// Finalizes this builder and, transitively, every reachable builder
    /// that is not already finalized, successors first. The result is
    /// cached; repeated calls without intervening mutation return the
    /// cached note. Fails with [`BuildError::CyclicNotation`] if the
    /// declared references loop back on themselves.
    pub fn build(&self) -> Result<Rc<Note>, BuildError> {
        build_graph(Target::Note(self.clone()))?;
        match &self.inner.borrow().cached {
            Some(note) => Ok(note.clone()),
            None => unreachable!("builder finalized without a cached note"),
        }
    }

    fn successors(&self) -> Vec<Target> {
        let data = self.inner.borrow();
        let mut successors: Vec<Target> = data
            .connections
            .iter()
            .map(|(_, target)| target.clone())
            .collect();
        // Grace builders are finalized inline by this builder, but their
        // own outgoing references must resolve first.
        for grace in data
            .preceding_grace_notes
            .iter()
            .chain(data.succeeding_grace_notes.iter())
        {
            successors.extend(grace.external_targets(self));
        }
        successors
    }

    /// Builds the note, assuming every successor is already cached.
    fn finalize(&self) -> Result<(), BuildError> {
        let preceding;
        let succeeding;
        {
            let data = self.inner.borrow();
            if data.cached.is_some() {
                return Ok(());
            }
            preceding = data.preceding_grace_notes.clone();
            succeeding = data.succeeding_grace_notes.clone();
        }

        // Later grace notes first, so chains within the ornament group
        // resolve to finished elements.
        let mut preceding_built = Vec::with_capacity(preceding.len());
        for grace in preceding.iter().rev() {
            preceding_built.push(grace.finalize_with_principal(Some(self))?);
        }
        preceding_built.reverse();
        let mut succeeding_built = Vec::with_capacity(succeeding.len());
        for grace in succeeding.iter().rev() {
            succeeding_built.push(grace.finalize_with_principal(Some(self))?);
        }
        succeeding_built.reverse();

        let mut data = self.inner.borrow_mut();
        let connections = resolve_connections(&data.connections, &data.connected_from);
        let note = Rc::new(Note::from_parts(
            data.pitch,
            data.duration,
            data.articulations.clone(),
            data.ornaments.clone(),
            connections,
            preceding_built,
            succeeding_built,
        ));
        data.cached = Some(note);
        data.in_progress = false;
        Ok(())
    }
}

// ─── GraceNoteBuilder ────────────────────────────────────────────────

struct GraceNoteData {
    pitch: Pitch,
    displayable_duration: Duration,
    grace_note_type: GraceNoteType,
    articulations: BTreeSet<Articulation>,
    connections: Vec<(Notation, Target)>,
    connected_from: Vec<Notation>,
    /// The note this grace note ornaments; weak to keep the builder graph
    /// acyclic in ownership.
    principal: Option<Weak<RefCell<NoteData>>>,
    cached: Option<Rc<GraceNote>>,
    in_progress: bool,
}

/// Builder for [`GraceNote`] values. Grace note builders are finalized
/// together with the note they ornament; a connection from a grace note to
/// its own principal resolves to a plain pitch-and-duration copy of the
/// principal, which keeps the finished structure acyclic.
#[derive(Clone)]
pub struct GraceNoteBuilder {
    inner: Rc<RefCell<GraceNoteData>>,
}

impl GraceNoteBuilder {
    pub fn new(pitch: Pitch, displayable_duration: Duration) -> GraceNoteBuilder {
        GraceNoteBuilder {
            inner: Rc::new(RefCell::new(GraceNoteData {
                pitch,
                displayable_duration,
                grace_note_type: GraceNoteType::GraceNote,
                articulations: BTreeSet::new(),
                connections: Vec::new(),
                connected_from: Vec::new(),
                principal: None,
                cached: None,
                in_progress: false,
            })),
        }
    }

    pub fn pitch(&self) -> Pitch {
        self.inner.borrow().pitch
    }

    pub fn set_pitch(&self, pitch: Pitch) {
        self.inner.borrow_mut().pitch = pitch;
    }

    pub fn set_grace_note_type(&self, grace_note_type: GraceNoteType) {
        self.inner.borrow_mut().grace_note_type = grace_note_type;
    }

    pub fn add_articulation(&self, articulation: Articulation) {
        self.inner.borrow_mut().articulations.insert(articulation);
    }

    /// Declares that the given occurrence continues from this grace note
    /// to the note built by `following`.
    pub fn connect_with(&self, notation: &Notation, following: &NoteBuilder) {
        self.record_connection(notation, Target::Note(following.clone()));
        following.mark_connected_from(notation);
    }

    /// As [`GraceNoteBuilder::connect_with`] with another grace note as
    /// the next element.
    pub fn connect_with_grace_note(&self, notation: &Notation, following: &GraceNoteBuilder) {
        self.record_connection(notation, Target::GraceNote(following.clone()));
        following.mark_connected_from(notation);
    }

    fn record_connection(&self, notation: &Notation, target: Target) {
        let replaced: Vec<(Notation, Target)> = {
            let mut data = self.inner.borrow_mut();
            let replaced = data
                .connections
                .iter()
                .filter(|(existing, _)| existing == notation)
                .cloned()
                .collect();
            data.connections.retain(|(existing, _)| existing != notation);
            data.connections.push((notation.clone(), target));
            replaced
        };
        // The chain is a simple path, so the replaced target is no longer
        // reached by this occurrence at all.
        for (notation, old_target) in replaced {
            old_target.unmark_connected_from(&notation);
        }
    }

    fn mark_connected_from(&self, notation: &Notation) {
        let mut data = self.inner.borrow_mut();
        if !data.connected_from.contains(notation) {
            data.connected_from.push(notation.clone());
        }
    }

    fn unmark_connected_from(&self, notation: &Notation) {
        self.inner
            .borrow_mut()
            .connected_from
            .retain(|existing| existing != notation);
    }

    fn set_principal(&self, principal: &NoteBuilder) {
        self.inner.borrow_mut().principal = Some(Rc::downgrade(&principal.inner));
    }

    fn principal(&self) -> Option<NoteBuilder> {
        self.inner
            .borrow()
            .principal
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| NoteBuilder { inner })
    }

    pub fn clear_cache(&self) {
        let mut data = self.inner.borrow_mut();
        data.cached = None;
        data.in_progress = false;
    }

    /// Finalizes this grace note. When it is attached to a principal note
    /// builder the principal is finalized first and caches this grace note
    /// as part of its own build.
    pub fn build(&self) -> Result<Rc<GraceNote>, BuildError> {
        build_graph(Target::GraceNote(self.clone()))?;
        match &self.inner.borrow().cached {
            Some(grace) => Ok(grace.clone()),
            None => unreachable!("grace note builder finalized without a cached note"),
        }
    }

    fn is_principal(&self, builder: &NoteBuilder) -> bool {
        self.principal()
            .is_some_and(|principal| Rc::ptr_eq(&principal.inner, &builder.inner))
    }

    /// Outgoing targets excluding the principal itself, which is resolved
    /// to a copy during finalization rather than traversed.
    fn external_targets(&self, principal: &NoteBuilder) -> Vec<Target> {
        self.inner
            .borrow()
            .connections
            .iter()
            .filter(|(_, target)| match target {
                Target::Note(builder) => !Rc::ptr_eq(&builder.inner, &principal.inner),
                Target::GraceNote(_) => true,
            })
            .map(|(_, target)| target.clone())
            .collect()
    }

    /// Builds the grace note, assuming every non-principal successor is
    /// cached. Connections to the principal resolve to a plain copy.
    fn finalize_with_principal(
        &self,
        principal: Option<&NoteBuilder>,
    ) -> Result<Rc<GraceNote>, BuildError> {
        {
            let data = self.inner.borrow();
            if let Some(cached) = &data.cached {
                return Ok(cached.clone());
            }
        }

        let principal_copy = principal.map(|builder| {
            let data = builder.inner.borrow();
            Note::of(data.pitch, data.duration)
        });

        let mut data = self.inner.borrow_mut();
        let mut connections = Vec::new();
        for (notation, target) in &data.connections {
            let following = match (target, principal) {
                (Target::Note(builder), Some(p)) if Rc::ptr_eq(&builder.inner, &p.inner) => {
                    match &principal_copy {
                        Some(copy) => Connectable::Note(copy.clone()),
                        None => continue,
                    }
                }
                _ => match target.cached_connectable() {
                    Some(connectable) => connectable,
                    None => return Err(BuildError::CyclicNotation),
                },
            };
            if data.connected_from.contains(notation) {
                connections.push(Connection::of(notation.clone(), following));
            } else {
                connections.push(Connection::beginning_of(notation.clone(), following));
            }
        }
        for notation in &data.connected_from {
            if !data.connections.iter().any(|(n, _)| n == notation) {
                connections.push(Connection::end_of(notation.clone()));
            }
        }

        let grace = Rc::new(GraceNote::from_parts(
            data.pitch,
            data.displayable_duration,
            data.grace_note_type,
            data.articulations.clone(),
            connections,
        ));
        data.cached = Some(grace.clone());
        data.in_progress = false;
        Ok(grace)
    }
}

// ─── Graph finalization ──────────────────────────────────────────────

impl Target {
    fn is_cached(&self) -> bool {
        match self {
            Target::Note(builder) => builder.inner.borrow().cached.is_some(),
            Target::GraceNote(builder) => builder.inner.borrow().cached.is_some(),
        }
    }

    fn in_progress(&self) -> bool {
        match self {
            Target::Note(builder) => builder.inner.borrow().in_progress,
            Target::GraceNote(builder) => builder.inner.borrow().in_progress,
        }
    }

    fn mark_in_progress(&self) {
        match self {
            Target::Note(builder) => builder.inner.borrow_mut().in_progress = true,
            Target::GraceNote(builder) => builder.inner.borrow_mut().in_progress = true,
        }
    }

    fn unmark_connected_from(&self, notation: &Notation) {
        match self {
            Target::Note(builder) => builder.unmark_connected_from(notation),
            Target::GraceNote(builder) => builder.unmark_connected_from(notation),
        }
    }

    fn successors(&self) -> Vec<Target> {
        match self {
            Target::Note(builder) => builder.successors(),
            Target::GraceNote(builder) => {
                let mut successors = match builder.principal() {
                    Some(principal) => builder.external_targets(&principal),
                    None => builder
                        .inner
                        .borrow()
                        .connections
                        .iter()
                        .map(|(_, target)| target.clone())
                        .collect(),
                };
                // An attached grace note is cached by its principal's
                // build, so the principal must be finalized as well. A
                // principal already on the stack will finalize this grace
                // note inline; pushing it again would read as a cycle.
                if let Some(principal) = builder.principal() {
                    let principal = Target::Note(principal);
                    if !principal.in_progress() {
                        successors.push(principal);
                    }
                }
                successors
            }
        }
    }

    fn finalize(&self) -> Result<(), BuildError> {
        match self {
            Target::Note(builder) => builder.finalize(),
            Target::GraceNote(builder) => {
                // Finalized through the principal when attached; reached
                // here only for detached grace note builders or after the
                // principal has already cached it.
                builder.finalize_with_principal(None).map(|_| ())
            }
        }
    }

    fn cached_connectable(&self) -> Option<Connectable> {
        match self {
            Target::Note(builder) => builder
                .inner
                .borrow()
                .cached
                .as_ref()
                .map(|note| Connectable::Note(note.clone())),
            Target::GraceNote(builder) => builder
                .inner
                .borrow()
                .cached
                .as_ref()
                .map(|grace| Connectable::GraceNote(grace.clone())),
        }
    }
}

/// Depth-first post-order finalization with an explicit stack. Builders
/// are marked while their subtree is being processed; meeting a marked,
/// not-yet-cached builder again means the declared references form a
/// cycle.
fn build_graph(root: Target) -> Result<(), BuildError> {
    let mut stack: Vec<(Target, bool)> = vec![(root, false)];

    while let Some((target, expanded)) = stack.pop() {
        if expanded {
            target.finalize()?;
            continue;
        }
        if target.is_cached() {
            continue;
        }
        if target.in_progress() {
            return Err(BuildError::CyclicNotation);
        }
        target.mark_in_progress();
        stack.push((target.clone(), true));
        for successor in target.successors() {
            if !successor.is_cached() {
                stack.push((successor, false));
            }
        }
    }

    Ok(())
}

/// Resolves recorded forward references into connections, assuming every
/// target is cached: an occurrence arriving from a predecessor without an
/// outgoing reference ends here, one with an outgoing reference continues,
/// and an occurrence only going out begins here.
fn resolve_connections(
    outgoing: &[(Notation, Target)],
    connected_from: &[Notation],
) -> Vec<Connection> {
    let mut connections = Vec::new();
    for (notation, target) in outgoing {
        let Some(following) = target.cached_connectable() else {
            // Unreachable in practice: build_graph caches all successors.
            continue;
        };
        if connected_from.contains(notation) {
            connections.push(Connection::of(notation.clone(), following));
        } else {
            connections.push(Connection::beginning_of(notation.clone(), following));
        }
    }
    for notation in connected_from {
        if !outgoing.iter().any(|(n, _)| n == notation) {
            connections.push(Connection::end_of(notation.clone()));
        }
    }
    connections
}

// ─── RestBuilder / ChordBuilder / DurationalBuilder ──────────────────

/// Builder for [`Rest`] values.
#[derive(Clone)]
pub struct RestBuilder {
    duration: Duration,
}

impl RestBuilder {
    pub fn new(duration: Duration) -> RestBuilder {
        RestBuilder { duration }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration = duration;
    }

    pub fn build(&self) -> Rest {
        Rest::of(self.duration)
    }
}

/// Builder for [`Chord`] values: a collection of note builders that must
/// agree on duration when built.
#[derive(Clone, Default)]
pub struct ChordBuilder {
    note_builders: Vec<NoteBuilder>,
}

impl ChordBuilder {
    pub fn new() -> ChordBuilder {
        ChordBuilder {
            note_builders: Vec::new(),
        }
    }

    pub fn add(&mut self, note_builder: NoteBuilder) {
        self.note_builders.push(note_builder);
    }

    pub fn note_builders(&self) -> &[NoteBuilder] {
        &self.note_builders
    }

    pub fn build(&self) -> Result<Chord, BuildError> {
        let mut notes = Vec::with_capacity(self.note_builders.len());
        for builder in &self.note_builders {
            notes.push(builder.build()?);
        }
        Chord::of(notes)
    }
}

/// Any builder that can occupy a slot in a voice.
#[derive(Clone)]
pub enum DurationalBuilder {
    Note(NoteBuilder),
    Rest(RestBuilder),
    Chord(ChordBuilder),
}

impl DurationalBuilder {
    pub fn duration(&self) -> Option<Duration> {
        match self {
            DurationalBuilder::Note(builder) => Some(builder.duration()),
            DurationalBuilder::Rest(builder) => Some(builder.duration()),
            DurationalBuilder::Chord(builder) => {
                builder.note_builders().first().map(NoteBuilder::duration)
            }
        }
    }

    pub fn build(&self) -> Result<Durational, BuildError> {
        match self {
            DurationalBuilder::Note(builder) => Ok(Durational::Note(builder.build()?)),
            DurationalBuilder::Rest(builder) => Ok(Durational::Rest(builder.build())),
            DurationalBuilder::Chord(builder) => Ok(Durational::Chord(builder.build()?)),
        }
    }
}

impl From<NoteBuilder> for DurationalBuilder {
    fn from(builder: NoteBuilder) -> DurationalBuilder {
        DurationalBuilder::Note(builder)
    }
}

impl From<RestBuilder> for DurationalBuilder {
    fn from(builder: RestBuilder) -> DurationalBuilder {
        DurationalBuilder::Rest(builder)
    }
}

impl From<ChordBuilder> for DurationalBuilder {
    fn from(builder: ChordBuilder) -> DurationalBuilder {
        DurationalBuilder::Chord(builder)
    }
}

// ─── MeasureBuilder / PartBuilder / ScoreBuilder ─────────────────────

/// Builder for one measure: ordered voices keyed by voice number.
pub struct MeasureBuilder {
    number: u32,
    attributes: MeasureAttributes,
    voices: BTreeMap<u32, Vec<DurationalBuilder>>,
}

impl MeasureBuilder {
    pub fn new(number: u32, attributes: MeasureAttributes) -> MeasureBuilder {
        MeasureBuilder {
            number,
            attributes,
            voices: BTreeMap::new(),
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn attributes(&self) -> &MeasureAttributes {
        &self.attributes
    }

    pub fn set_attributes(&mut self, attributes: MeasureAttributes) {
        self.attributes = attributes;
    }

    /// Appends an element to the given voice, creating the voice if it
    /// does not exist yet. Voice numbers need not be contiguous.
    pub fn add_to_voice(&mut self, voice: u32, builder: impl Into<DurationalBuilder>) {
        self.voices.entry(voice).or_default().push(builder.into());
    }

    pub fn voice_numbers(&self) -> Vec<u32> {
        self.voices.keys().copied().collect()
    }

    /// The summed duration of the given voice's contents so far.
    pub fn voice_duration(&self, voice: u32) -> Option<Duration> {
        let contents = self.voices.get(&voice)?;
        Duration::sum(contents.iter().filter_map(DurationalBuilder::duration)).ok()
    }

    pub fn build(&self) -> Result<Measure, BuildError> {
        let mut voices = BTreeMap::new();
        for (number, contents) in &self.voices {
            let mut built = Vec::with_capacity(contents.len());
            for builder in contents {
                built.push(builder.build()?);
            }
            voices.insert(*number, built);
        }
        Ok(Measure::new(self.number, voices, self.attributes.clone()))
    }
}

/// Builder for one part: measures grouped per staff.
pub struct PartBuilder {
    name: Option<String>,
    abbreviation: Option<String>,
    staves: BTreeMap<u32, Vec<MeasureBuilder>>,
}

impl PartBuilder {
    pub fn new(name: impl Into<String>) -> PartBuilder {
        PartBuilder {
            name: Some(name.into()),
            abbreviation: None,
            staves: BTreeMap::new(),
        }
    }

    pub fn set_abbreviation(&mut self, abbreviation: impl Into<String>) {
        self.abbreviation = Some(abbreviation.into());
    }

    /// Appends a measure to the single staff of a one-staff part.
    pub fn add_measure(&mut self, measure: MeasureBuilder) {
        self.add_measure_to_staff(Part::DEFAULT_STAFF, measure);
    }

    /// Appends a measure to the given staff.
    pub fn add_measure_to_staff(&mut self, staff: u32, measure: MeasureBuilder) {
        self.staves.entry(staff).or_default().push(measure);
    }

    pub fn staff_numbers(&self) -> Vec<u32> {
        self.staves.keys().copied().collect()
    }

    pub fn measure_count(&self, staff: u32) -> usize {
        self.staves.get(&staff).map_or(0, Vec::len)
    }

    pub fn build(&self) -> Result<Part, BuildError> {
        let mut staves = BTreeMap::new();
        for (number, measures) in &self.staves {
            let mut built = Vec::with_capacity(measures.len());
            for measure in measures {
                built.push(measure.build()?);
            }
            staves.insert(*number, Staff::new(built));
        }
        Ok(Part::new(
            self.name.clone(),
            self.abbreviation.clone(),
            staves,
        ))
    }
}

/// Builder for a whole score.
#[derive(Default)]
pub struct ScoreBuilder {
    info: ScoreInfo,
    parts: Vec<PartBuilder>,
}

impl ScoreBuilder {
    pub fn new() -> ScoreBuilder {
        ScoreBuilder::default()
    }

    pub fn info_mut(&mut self) -> &mut ScoreInfo {
        &mut self.info
    }

    pub fn set_info(&mut self, info: ScoreInfo) {
        self.info = info;
    }

    pub fn add_part(&mut self, part: PartBuilder) {
        self.parts.push(part);
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    pub fn build(&self) -> Result<Score, BuildError> {
        let mut parts = Vec::with_capacity(self.parts.len());
        for part in &self.parts {
            parts.push(part.build()?);
        }
        Ok(Score::new(self.info.clone(), parts))
    }
}
