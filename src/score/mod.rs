//! The composition document.
//!
//! This module provides the core types for representing a live-editable
//! composition: notes, melodic and looping sample tracks, and the
//! combination/composition tree that groups them. The document owns musical
//! content; schedulers reference it and re-derive their work from it on every
//! pass, so it can be mutated freely between passes.

mod arrangement;
mod note;
mod track;

pub use arrangement::{Combination, Composition, TrackView};
pub use note::{intervals_overlap, Note, NoteId, OVERLAP_EPSILON};
pub use track::{MelodicTrack, SampleTrack, TrackId};
