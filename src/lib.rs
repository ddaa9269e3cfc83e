//! loopdeck - a beat-synchronized loop scheduling engine.
//!
//! This library renders a hierarchical, live-editable composition (tempo,
//! melodic tracks, looping sample tracks, effects, nested mute groups) as
//! continuously-playing audio. Its core is a musical clock mapping beats to
//! the hardware playback clock plus a rolling loop-ahead scheduler per track,
//! kept correct under concurrent edits by always re-deriving work from the
//! clock and the current document.

pub mod assets;
pub mod audio;
pub mod clock;
pub mod engine;
pub mod events;
pub mod mixer;
pub mod sched;
pub mod score;

// Re-export commonly used types
pub use assets::{AssetId, AssetLibrary, FsAssetLibrary, Keyboard};
pub use audio::{AudioGraph, EffectConfig, HostTime, SampleBuffer};
pub use clock::{Clock, TransportEvent};
pub use engine::{Engine, EngineError};
pub use events::{CompositionEvent, EventHub, SubscriberId};
pub use score::{Combination, Composition, MelodicTrack, Note, NoteId, SampleTrack, TrackId};
