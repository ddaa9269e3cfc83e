//! Track representations.
//!
//! Two kinds of playable track share a combination: melodic tracks (notes
//! played on a keyboard of pitched buffers) and looping sample tracks (one
//! fixed buffer stretched to a whole number of beats). Both carry a mute flag
//! and an opaque effects-chain configuration.

use super::note::{Note, NoteId};
use crate::assets::Keyboard;
use crate::audio::{EffectConfig, SampleBuffer};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for generating unique track IDs.
static TRACK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a track within a composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackId(u64);

impl TrackId {
    /// Generates a new unique track ID.
    pub fn new() -> Self {
        Self(TRACK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TrackId {
    fn default() -> Self {
        Self::new()
    }
}

/// A melodic track: notes placed on a keyboard, looping every
/// `measures * beats_per_measure` beats.
///
/// Notes are stored in insertion order. The track enforces the invariant that
/// no two notes on the same pitch have overlapping intervals, by evicting the
/// older note on insert.
#[derive(Debug, Clone)]
pub struct MelodicTrack {
    /// Unique identifier for this track.
    pub id: TrackId,

    /// Human-readable name for the track.
    pub name: String,

    /// Whether the sustain pedal is held: sustained notes play out their full
    /// buffer instead of being truncated to their written duration.
    pub sustain: bool,

    /// Whether this track's mute gain is closed.
    pub muted: bool,

    /// Opaque effects chain applied before the mute gain.
    pub effects: Vec<EffectConfig>,

    notes: Vec<Note>,
    measures: u32,
    beats_per_measure: u32,
    keyboard: Keyboard,
}

impl MelodicTrack {
    /// Creates an empty track over `keyboard`.
    pub fn new(
        name: impl Into<String>,
        keyboard: Keyboard,
        measures: u32,
        beats_per_measure: u32,
    ) -> Self {
        Self {
            id: TrackId::new(),
            name: name.into(),
            sustain: false,
            muted: false,
            effects: Vec::new(),
            notes: Vec::new(),
            measures,
            beats_per_measure,
            keyboard,
        }
    }

    pub fn measures(&self) -> u32 {
        self.measures
    }

    pub fn beats_per_measure(&self) -> u32 {
        self.beats_per_measure
    }

    /// Length of one full loop of this track, in beats.
    pub fn loop_beats(&self) -> f64 {
        (self.measures * self.beats_per_measure) as f64
    }

    pub fn keyboard(&self) -> &Keyboard {
        &self.keyboard
    }

    /// Buffer for `pitch`, or `None` when the pitch is outside the keyboard.
    pub fn buffer_for_pitch(&self, pitch: usize) -> Option<&SampleBuffer> {
        self.keyboard.buffer(pitch)
    }

    /// All notes, in insertion order.
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// Returns a reference to a note by its ID.
    pub fn note(&self, id: NoteId) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == id)
    }

    /// Inserts a note, evicting same-pitch notes whose intervals overlap it.
    ///
    /// Returns the new note's ID and the evicted notes (callers tear down the
    /// evicted notes' audio sources and notify).
    pub fn insert_note(&mut self, pitch: usize, start_beat: f64, end_beat: f64) -> (NoteId, Vec<Note>) {
        let note = Note::new(pitch, start_beat, end_beat);
        let id = note.id;
        let mut evicted = Vec::new();
        self.notes.retain(|existing| {
            if existing.pitch == pitch && existing.overlaps(&note) {
                evicted.push(existing.clone());
                false
            } else {
                true
            }
        });
        self.notes.push(note);
        (id, evicted)
    }

    /// Removes a note by its ID, returning it if present.
    pub fn remove_note(&mut self, id: NoteId) -> Option<Note> {
        let pos = self.notes.iter().position(|n| n.id == id)?;
        Some(self.notes.remove(pos))
    }

    /// Resizes the track to `measures`, evicting (and returning) every note
    /// whose end lies beyond the new total-beats bound.
    pub fn set_measures(&mut self, measures: u32) -> Vec<Note> {
        self.measures = measures;
        let bound = self.loop_beats();
        let mut evicted = Vec::new();
        self.notes.retain(|n| {
            if n.end_beat > bound {
                evicted.push(n.clone());
                false
            } else {
                true
            }
        });
        evicted
    }

    /// Swaps the keyboard. Notes whose pitch falls outside the new keyboard
    /// stay in the document and simply schedule silently.
    pub fn set_keyboard(&mut self, keyboard: Keyboard) {
        self.keyboard = keyboard;
    }

    /// Returns the number of notes on the track.
    pub fn note_count(&self) -> usize {
        self.notes.len()
    }
}

/// A looping sample track: one fixed buffer played once per loop, stretched
/// by a varispeed rate so the buffer spans exactly `beats_per_loop` beats.
#[derive(Debug, Clone)]
pub struct SampleTrack {
    /// Unique identifier for this track.
    pub id: TrackId,

    /// Human-readable name for the track.
    pub name: String,

    /// Whether this track's mute gain is closed.
    pub muted: bool,

    /// Opaque effects chain applied before the mute gain.
    pub effects: Vec<EffectConfig>,

    buffer: SampleBuffer,
    beats_per_loop: u32,
}

impl SampleTrack {
    pub fn new(name: impl Into<String>, buffer: SampleBuffer, beats_per_loop: u32) -> Self {
        Self {
            id: TrackId::new(),
            name: name.into(),
            muted: false,
            effects: Vec::new(),
            buffer,
            beats_per_loop,
        }
    }

    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    pub fn beats_per_loop(&self) -> u32 {
        self.beats_per_loop
    }

    /// Length of one full loop of this track, in beats.
    pub fn loop_beats(&self) -> f64 {
        self.beats_per_loop as f64
    }

    /// Playback rate that stretches the buffer to exactly one loop at `bpm`.
    ///
    /// Rates above 1.0 speed the buffer up (it is longer than the loop slot).
    pub fn tempo_rate(&self, bpm: f64) -> f64 {
        let slot = self.beats_per_loop as f64 * 60.0 / bpm;
        if slot <= 0.0 {
            return 1.0;
        }
        self.buffer.duration_seconds() / slot
    }
}
