//! Composition container.
//!
//! A composition is an ordered list of combinations sharing one clock and one
//! tempo. Each combination groups melodic and sample tracks under its own
//! mute/effects stage. At most one combination is audible at a time; the
//! engine enforces that switch atomically.

use super::track::{MelodicTrack, SampleTrack, TrackId};
use crate::audio::EffectConfig;

/// A named group of tracks sharing a mute/effects stage.
#[derive(Debug, Clone)]
pub struct Combination {
    /// Human-readable name.
    pub name: String,

    /// Whether this combination's mute gain is closed. New combinations start
    /// muted; the engine opens exactly one at a time.
    pub muted: bool,

    /// Opaque effects chain applied to the combination's mix.
    pub effects: Vec<EffectConfig>,

    melodic: Vec<MelodicTrack>,
    samples: Vec<SampleTrack>,
}

impl Combination {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            muted: true,
            effects: Vec::new(),
            melodic: Vec::new(),
            samples: Vec::new(),
        }
    }

    /// Adds a melodic track, returning its ID.
    pub fn add_melodic_track(&mut self, track: MelodicTrack) -> TrackId {
        let id = track.id;
        self.melodic.push(track);
        id
    }

    /// Adds a sample track, returning its ID.
    pub fn add_sample_track(&mut self, track: SampleTrack) -> TrackId {
        let id = track.id;
        self.samples.push(track);
        id
    }

    pub fn melodic_tracks(&self) -> &[MelodicTrack] {
        &self.melodic
    }

    pub fn sample_tracks(&self) -> &[SampleTrack] {
        &self.samples
    }

    pub(crate) fn melodic_track_mut(&mut self, id: TrackId) -> Option<&mut MelodicTrack> {
        self.melodic.iter_mut().find(|t| t.id == id)
    }

    pub(crate) fn sample_track_mut(&mut self, id: TrackId) -> Option<&mut SampleTrack> {
        self.samples.iter_mut().find(|t| t.id == id)
    }

    /// IDs of every track in this combination, melodic first.
    pub fn track_ids(&self) -> Vec<TrackId> {
        self.melodic
            .iter()
            .map(|t| t.id)
            .chain(self.samples.iter().map(|t| t.id))
            .collect()
    }

    /// Whether `id` names a track in this combination.
    pub fn contains_track(&self, id: TrackId) -> bool {
        self.melodic.iter().any(|t| t.id == id) || self.samples.iter().any(|t| t.id == id)
    }
}

/// A read-only view of either track kind, for callers that look tracks up by
/// ID without caring which kind they get.
#[derive(Debug, Clone, Copy)]
pub enum TrackView<'a> {
    Melodic(&'a MelodicTrack),
    Sample(&'a SampleTrack),
}

/// A complete composition: tempo plus an ordered list of combinations.
#[derive(Debug, Clone)]
pub struct Composition {
    /// Composition name.
    pub name: String,

    /// Tempo in beats per minute, shared by every combination.
    pub bpm: f64,

    combinations: Vec<Combination>,
}

impl Composition {
    /// Creates an empty composition at 120 BPM.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bpm: 120.0,
            combinations: Vec::new(),
        }
    }

    /// Appends a combination, returning its index.
    pub fn add_combination(&mut self, combination: Combination) -> usize {
        self.combinations.push(combination);
        self.combinations.len() - 1
    }

    pub fn combinations(&self) -> &[Combination] {
        &self.combinations
    }

    pub fn combination(&self, index: usize) -> Option<&Combination> {
        self.combinations.get(index)
    }

    pub(crate) fn combination_mut(&mut self, index: usize) -> Option<&mut Combination> {
        self.combinations.get_mut(index)
    }

    pub fn combination_count(&self) -> usize {
        self.combinations.len()
    }

    /// Index of the combination currently unmuted, if any.
    pub fn unmuted_combination(&self) -> Option<usize> {
        self.combinations.iter().position(|c| !c.muted)
    }

    /// Index of the combination containing track `id`.
    pub fn combination_of_track(&self, id: TrackId) -> Option<usize> {
        self.combinations.iter().position(|c| c.contains_track(id))
    }

    /// Looks a melodic track up by ID across all combinations.
    pub fn melodic_track(&self, id: TrackId) -> Option<&MelodicTrack> {
        self.combinations
            .iter()
            .flat_map(|c| c.melodic_tracks())
            .find(|t| t.id == id)
    }

    pub(crate) fn melodic_track_mut(&mut self, id: TrackId) -> Option<&mut MelodicTrack> {
        self.combinations
            .iter_mut()
            .find_map(|c| c.melodic_track_mut(id))
    }

    /// Looks a sample track up by ID across all combinations.
    pub fn sample_track(&self, id: TrackId) -> Option<&SampleTrack> {
        self.combinations
            .iter()
            .flat_map(|c| c.sample_tracks())
            .find(|t| t.id == id)
    }

    pub(crate) fn sample_track_mut(&mut self, id: TrackId) -> Option<&mut SampleTrack> {
        self.combinations
            .iter_mut()
            .find_map(|c| c.sample_track_mut(id))
    }

    /// Looks any track up by ID.
    pub fn track(&self, id: TrackId) -> Option<TrackView<'_>> {
        if let Some(t) = self.melodic_track(id) {
            return Some(TrackView::Melodic(t));
        }
        self.sample_track(id).map(TrackView::Sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::Keyboard;
    use crate::audio::test_buffer;

    fn demo_composition() -> (Composition, TrackId, TrackId) {
        let mut composition = Composition::new("demo");
        let mut a = Combination::new("a");
        let keyboard = Keyboard::new("kb", vec![test_buffer(64)]);
        let melodic = a.add_melodic_track(MelodicTrack::new("lead", keyboard, 1, 4));
        let mut b = Combination::new("b");
        let sample = b.add_sample_track(SampleTrack::new("drums", test_buffer(64), 4));
        composition.add_combination(a);
        composition.add_combination(b);
        (composition, melodic, sample)
    }

    #[test]
    fn tracks_found_across_combinations() {
        let (composition, melodic, sample) = demo_composition();
        assert!(composition.melodic_track(melodic).is_some());
        assert!(composition.sample_track(sample).is_some());
        assert!(matches!(composition.track(melodic), Some(TrackView::Melodic(_))));
        assert!(matches!(composition.track(sample), Some(TrackView::Sample(_))));
        assert!(composition.track(TrackId::new()).is_none());
    }

    #[test]
    fn combination_of_track() {
        let (composition, melodic, sample) = demo_composition();
        assert_eq!(composition.combination_of_track(melodic), Some(0));
        assert_eq!(composition.combination_of_track(sample), Some(1));
    }

    #[test]
    fn combinations_start_muted() {
        let (composition, _, _) = demo_composition();
        assert_eq!(composition.unmuted_combination(), None);
    }
}
