//! Track and combination routing.
//!
//! Every track's audio passes through: effects chain → per-track mute gain →
//! combination mix. Combinations compose the same way one level up: their
//! tracks' strips feed the combination's effects, then its mute gain, then
//! the master gain at the composition level, which feeds the device output.
//! Mute gains are binary (0 or 1, no crossfade).

use crate::audio::{AudioGraph, EffectConfig, NodeId};
use crate::score::{Combination, Composition, TrackId};
use tracing::debug;

/// Builds `effects` as a chain feeding `dst`; returns the chain's input (or
/// `dst` itself when the chain is empty).
fn build_effect_chain<G: AudioGraph>(
    graph: &mut G,
    effects: &[EffectConfig],
    dst: NodeId,
) -> NodeId {
    let mut downstream = dst;
    for config in effects.iter().rev() {
        let effect = graph.attach_effect(config);
        graph.connect(effect, downstream);
        downstream = effect;
    }
    downstream
}

/// One track's routing: chain input → effects → mute gain → parent mix.
#[derive(Debug)]
pub struct TrackStrip {
    track: TrackId,
    /// Where the track's source nodes connect.
    input: NodeId,
    mute_gain: NodeId,
}

impl TrackStrip {
    fn build<G: AudioGraph>(
        graph: &mut G,
        track: TrackId,
        effects: &[EffectConfig],
        muted: bool,
        parent: NodeId,
    ) -> Self {
        let mute_gain = graph.attach_gain();
        graph.connect(mute_gain, parent);
        graph.set_gain(mute_gain, if muted { 0.0 } else { 1.0 });
        let input = build_effect_chain(graph, effects, mute_gain);
        Self {
            track,
            input,
            mute_gain,
        }
    }

    /// The node this track's sources feed into.
    pub fn input(&self) -> NodeId {
        self.input
    }
}

/// One combination's routing stage plus its tracks' strips.
#[derive(Debug)]
pub struct CombinationStrip {
    /// Mix point the track strips feed.
    input: NodeId,
    mute_gain: NodeId,
    tracks: Vec<TrackStrip>,
}

impl CombinationStrip {
    fn build<G: AudioGraph>(graph: &mut G, combination: &Combination, parent: NodeId) -> Self {
        let mute_gain = graph.attach_gain();
        graph.connect(mute_gain, parent);
        graph.set_gain(mute_gain, if combination.muted { 0.0 } else { 1.0 });
        let input = build_effect_chain(graph, &combination.effects, mute_gain);

        let mut tracks = Vec::new();
        for track in combination.melodic_tracks() {
            tracks.push(TrackStrip::build(
                graph,
                track.id,
                &track.effects,
                track.muted,
                input,
            ));
        }
        for track in combination.sample_tracks() {
            tracks.push(TrackStrip::build(
                graph,
                track.id,
                &track.effects,
                track.muted,
                input,
            ));
        }
        Self {
            input,
            mute_gain,
            tracks,
        }
    }

    pub fn track_strip(&self, track: TrackId) -> Option<&TrackStrip> {
        self.tracks.iter().find(|s| s.track == track)
    }

    /// The mix point this combination's track strips feed.
    pub fn input(&self) -> NodeId {
        self.input
    }
}

/// The whole composition's routing: combination strips → master → output.
#[derive(Debug)]
pub struct MixerTree {
    master: NodeId,
    combinations: Vec<CombinationStrip>,
}

impl MixerTree {
    /// Builds the full tree for `composition` into `graph`.
    pub fn build<G: AudioGraph>(graph: &mut G, composition: &Composition) -> Self {
        let master = graph.attach_gain();
        let output = graph.output_node();
        graph.connect(master, output);
        let combinations = composition
            .combinations()
            .iter()
            .map(|c| CombinationStrip::build(graph, c, master))
            .collect();
        debug!(
            combinations = composition.combination_count(),
            "mixer tree built"
        );
        Self {
            master,
            combinations,
        }
    }

    pub fn master(&self) -> NodeId {
        self.master
    }

    pub fn combination_strip(&self, index: usize) -> Option<&CombinationStrip> {
        self.combinations.get(index)
    }

    /// The mix input a given track's sources should feed, if the track is in
    /// the tree.
    pub fn track_input(&self, track: TrackId) -> Option<NodeId> {
        self.combinations
            .iter()
            .find_map(|c| c.track_strip(track).map(|s| s.input))
    }

    /// Opens or closes a track's mute gain.
    pub fn set_track_muted<G: AudioGraph>(&self, graph: &mut G, track: TrackId, muted: bool) {
        if let Some(strip) = self
            .combinations
            .iter()
            .find_map(|c| c.track_strip(track))
        {
            graph.set_gain(strip.mute_gain, if muted { 0.0 } else { 1.0 });
        }
    }

    /// Opens or closes a combination's mute gain.
    pub fn set_combination_muted<G: AudioGraph>(&self, graph: &mut G, index: usize, muted: bool) {
        if let Some(strip) = self.combinations.get(index) {
            graph.set_gain(strip.mute_gain, if muted { 0.0 } else { 1.0 });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::Keyboard;
    use crate::audio::capture::CaptureGraph;
    use crate::audio::test_buffer;
    use crate::score::{MelodicTrack, SampleTrack};

    fn composition() -> (Composition, TrackId, TrackId) {
        let mut composition = Composition::new("demo");
        let mut a = Combination::new("a");
        let keyboard = Keyboard::new("kb", vec![test_buffer(64)]);
        let mut lead = MelodicTrack::new("lead", keyboard, 1, 4);
        lead.effects.push(EffectConfig::new("reverb", 0.3));
        let lead_id = a.add_melodic_track(lead);
        let mut b = Combination::new("b");
        let drums_id = b.add_sample_track(SampleTrack::new("drums", test_buffer(64), 4));
        composition.add_combination(a);
        composition.add_combination(b);
        (composition, lead_id, drums_id)
    }

    #[test]
    fn sources_route_through_strips_to_output() {
        let (composition, lead, _) = composition();
        let mut graph = CaptureGraph::new();
        let tree = MixerTree::build(&mut graph, &composition);

        let source = graph.attach_source();
        graph.connect(source, tree.track_input(lead).unwrap());
        // Combination starts muted: the chain reaches the output at gain 0.
        assert_eq!(graph.effective_gain(source), 0.0);

        tree.set_combination_muted(&mut graph, 0, false);
        assert!((graph.effective_gain(source) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn track_mute_is_binary_and_independent() {
        let (composition, lead, drums) = composition();
        let mut graph = CaptureGraph::new();
        let tree = MixerTree::build(&mut graph, &composition);
        tree.set_combination_muted(&mut graph, 0, false);
        tree.set_combination_muted(&mut graph, 1, false);

        let lead_source = graph.attach_source();
        graph.connect(lead_source, tree.track_input(lead).unwrap());
        let drum_source = graph.attach_source();
        graph.connect(drum_source, tree.track_input(drums).unwrap());

        tree.set_track_muted(&mut graph, lead, true);
        assert_eq!(graph.effective_gain(lead_source), 0.0);
        assert!((graph.effective_gain(drum_source) - 1.0).abs() < 1e-6);

        tree.set_track_muted(&mut graph, lead, false);
        assert!((graph.effective_gain(lead_source) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn unknown_track_has_no_input() {
        let (composition, _, _) = composition();
        let mut graph = CaptureGraph::new();
        let tree = MixerTree::build(&mut graph, &composition);
        assert!(tree.track_input(TrackId::new()).is_none());
    }
}
