//! Melodic note representation.
//!
//! A note is one playable event on a melodic track: a pitch index into the
//! track's keyboard plus a half-open `[start, end)` beat interval.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for generating unique note IDs.
/// Using atomic for thread-safety in case of parallel operations.
static NOTE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Tolerance absorbing floating-point error in beat positions produced by
/// interactive insertion and query.
pub const OVERLAP_EPSILON: f64 = 1e-6;

/// Unique identifier for a note within a composition.
///
/// Notes are addressed by ID, never by reference identity; the ID is the
/// stable key mapping a note to its audio source across edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoteId(u64);

impl NoteId {
    /// Generates a new unique note ID.
    pub fn new() -> Self {
        Self(NOTE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw ID value (for logging/debugging).
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

/// A single note: pitch index into the track's keyboard and a half-open
/// beat interval within the track's loop.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    /// Unique identifier for this note instance.
    pub id: NoteId,

    /// Index into the owning track's keyboard (ordered list of pitches).
    pub pitch: usize,

    /// Start position in beats from the loop start.
    pub start_beat: f64,

    /// End position in beats (exclusive).
    pub end_beat: f64,
}

impl Note {
    /// Creates a new note with a fresh ID.
    pub fn new(pitch: usize, start_beat: f64, end_beat: f64) -> Self {
        Self {
            id: NoteId::new(),
            pitch,
            start_beat,
            end_beat,
        }
    }

    /// Sounding length in beats.
    pub fn duration_beats(&self) -> f64 {
        self.end_beat - self.start_beat
    }

    /// Whether this note's interval overlaps `[start, end)`.
    ///
    /// Strict with epsilon tolerance: identical intervals overlap, intervals
    /// that merely touch at an endpoint do not.
    pub fn overlaps_range(&self, start: f64, end: f64) -> bool {
        intervals_overlap(self.start_beat, self.end_beat, start, end)
    }

    /// Whether this note overlaps another note's interval (pitch ignored).
    pub fn overlaps(&self, other: &Note) -> bool {
        self.overlaps_range(other.start_beat, other.end_beat)
    }
}

/// Half-open interval intersection test used for insert-time eviction.
pub fn intervals_overlap(s1: f64, e1: f64, s2: f64, e2: f64) -> bool {
    s1 < e2 - OVERLAP_EPSILON && s2 < e1 - OVERLAP_EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_creation() {
        let note = Note::new(3, 0.0, 1.0);
        assert_eq!(note.pitch, 3);
        assert!((note.duration_beats() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn partial_overlap() {
        // [0,1) vs [0.5,1.5): each interval reaches into the other.
        let existing = Note::new(3, 0.0, 1.0);
        assert!(existing.overlaps_range(0.5, 1.5));
        assert!(existing.overlaps_range(-0.5, 0.5));
    }

    #[test]
    fn containment_overlaps() {
        let note = Note::new(0, 1.0, 3.0);
        assert!(note.overlaps_range(1.5, 2.0));
        assert!(note.overlaps_range(0.0, 4.0));
    }

    #[test]
    fn identical_intervals_overlap() {
        let note = Note::new(0, 2.0, 3.0);
        assert!(note.overlaps_range(2.0, 3.0));
    }

    #[test]
    fn touching_intervals_do_not_overlap() {
        let note = Note::new(0, 0.0, 1.0);
        assert!(!note.overlaps_range(1.0, 2.0));
        assert!(!note.overlaps_range(-1.0, 0.0));
    }

    #[test]
    fn epsilon_absorbs_float_noise() {
        let note = Note::new(0, 0.0, 1.0);
        // An interval starting a hair before the note's end still counts as
        // touching, not overlapping.
        assert!(!note.overlaps_range(1.0 - 1e-9, 2.0));
    }

    #[test]
    fn ids_are_unique() {
        let a = Note::new(0, 0.0, 1.0);
        let b = Note::new(0, 0.0, 1.0);
        assert_ne!(a.id, b.id);
    }
}
