//! The playback engine.
//!
//! `Engine` is the single owner tying everything together: the audio graph,
//! the shared clock, the composition document, the mixer tree, one scheduler
//! per track, and the event hub. Every edit and transport operation the
//! document/UI layer can perform flows through here, which is what keeps
//! scheduling single-threaded: one pending wakeup per scheduler, dispatched
//! from [`Engine::pump`] on the caller's run loop.

use crate::audio::{AudioGraph, HostTime};
use crate::clock::{Clock, TransportEvent};
use crate::events::{CompositionEvent, EventHub, SubscriberId};
use crate::mixer::MixerTree;
use crate::sched::{MelodicScheduler, SampleLoopScheduler};
use crate::score::{Composition, NoteId, TrackId, TrackView};
use crate::assets::Keyboard;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

/// Errors surfaced by engine operations. Scheduling itself never errors
/// (silence is its failure mode); these cover bad addresses and misuse of
/// the editing session.
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("no track with id {0:?}")]
    UnknownTrack(TrackId),

    #[error("no combination at index {0}")]
    UnknownCombination(usize),

    #[error("track {0:?} is not a melodic track")]
    NotAMelodicTrack(TrackId),

    #[error("another track is already being edited")]
    AlreadyEditing,

    #[error("no editing session is active")]
    NotEditing,
}

/// Either kind of per-track scheduler.
enum TrackScheduler {
    Melodic(MelodicScheduler),
    Sample(SampleLoopScheduler),
}

impl TrackScheduler {
    fn wakeup_due(&self, now: HostTime) -> bool {
        match self {
            TrackScheduler::Melodic(s) => s.wakeup_due(now),
            TrackScheduler::Sample(s) => s.wakeup_due(now),
        }
    }

    fn stop<G: AudioGraph>(&mut self, graph: &mut G) {
        match self {
            TrackScheduler::Melodic(s) => s.stop(graph),
            TrackScheduler::Sample(s) => s.stop(graph),
        }
    }
}

/// A melodic track temporarily detached from the shared clock.
struct EditSession {
    track: TrackId,
    saved_muted: bool,
    clock: Clock,
}

/// Owns one composition's playback: graph, clock, mixer, schedulers, events.
pub struct Engine<G: AudioGraph> {
    graph: G,
    clock: Clock,
    composition: Composition,
    mixer: MixerTree,
    schedulers: HashMap<TrackId, TrackScheduler>,
    hub: EventHub,
    /// Combination whose schedulers are running, if any.
    active: Option<usize>,
    editing: Option<EditSession>,
}

impl<G: AudioGraph> Engine<G> {
    /// Builds the mixer tree and one scheduler per track.
    pub fn new(mut graph: G, composition: Composition) -> Self {
        let mixer = MixerTree::build(&mut graph, &composition);
        let clock = Clock::new(composition.bpm);
        let mut schedulers = HashMap::new();
        for combination in composition.combinations() {
            for track in combination.melodic_tracks() {
                if let Some(input) = mixer.track_input(track.id) {
                    schedulers.insert(
                        track.id,
                        TrackScheduler::Melodic(MelodicScheduler::new(&mut graph, input, track)),
                    );
                }
            }
            for track in combination.sample_tracks() {
                if let Some(input) = mixer.track_input(track.id) {
                    schedulers.insert(
                        track.id,
                        TrackScheduler::Sample(SampleLoopScheduler::new(&mut graph, input)),
                    );
                }
            }
        }
        info!(
            name = %composition.name,
            combinations = composition.combination_count(),
            tracks = schedulers.len(),
            "engine built"
        );
        Self {
            graph,
            clock,
            composition,
            mixer,
            schedulers,
            hub: EventHub::new(),
            active: None,
            editing: None,
        }
    }

    pub fn composition(&self) -> &Composition {
        &self.composition
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut G {
        &mut self.graph
    }

    /// Combination whose schedulers are currently running.
    pub fn active_combination(&self) -> Option<usize> {
        self.active
    }

    /// Whether a track is detached into an editing session.
    pub fn is_editing(&self, track: TrackId) -> bool {
        self.editing.as_ref().is_some_and(|e| e.track == track)
    }

    // ----- change notification -------------------------------------------

    pub fn subscribe(&mut self) -> SubscriberId {
        self.hub.subscribe()
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) {
        self.hub.unsubscribe(id);
    }

    pub fn drain_events(&mut self, id: SubscriberId) -> Vec<CompositionEvent> {
        self.hub.drain(id)
    }

    // ----- transport ------------------------------------------------------

    /// Makes combination `index` the one audible combination and ensures the
    /// shared clock is running. The previous combination is muted and its
    /// schedulers stopped first; the whole switch publishes a single
    /// `MuteStatesChanged`.
    pub fn play_combination(&mut self, index: usize) -> Result<(), EngineError> {
        if index >= self.composition.combination_count() {
            return Err(EngineError::UnknownCombination(index));
        }
        if self.active == Some(index) && self.clock.is_playing() {
            return Ok(());
        }
        if let Some(previous) = self.active {
            if previous != index {
                if let Some(c) = self.composition.combination_mut(previous) {
                    c.muted = true;
                }
                self.mixer.set_combination_muted(&mut self.graph, previous, true);
                self.stop_combination_schedulers(previous);
            }
        }
        if let Some(c) = self.composition.combination_mut(index) {
            c.muted = false;
        }
        self.mixer.set_combination_muted(&mut self.graph, index, false);

        let now = self.graph.now();
        let beat = match self.clock.play(now) {
            Some(TransportEvent::Started { beat }) => beat,
            _ => self.clock.current_beat(now).unwrap_or(0.0),
        };
        self.start_combination_schedulers(index, beat);
        self.active = Some(index);
        info!(index, beat, "combination playing");
        self.hub.publish(CompositionEvent::MuteStatesChanged);
        Ok(())
    }

    /// Mutes whichever combination is playing and resets the shared clock to
    /// never-started.
    pub fn stop_playing(&mut self) {
        if let Some(index) = self.active.take() {
            if let Some(c) = self.composition.combination_mut(index) {
                c.muted = true;
            }
            self.mixer.set_combination_muted(&mut self.graph, index, true);
            self.stop_combination_schedulers(index);
            self.hub.publish(CompositionEvent::MuteStatesChanged);
        }
        let now = self.graph.now();
        self.clock.reset(now);
        info!("playback stopped");
    }

    /// Changes the shared tempo, preserving beat position. Running
    /// schedulers discard their windows and rebuild at the new timing.
    pub fn set_bpm(&mut self, bpm: f64) {
        self.composition.bpm = bpm;
        let now = self.graph.now();
        self.clock.set_tempo(bpm, now);
        if self.clock.is_playing() {
            if let Some(index) = self.active {
                self.rebuild_combination_schedulers(index);
            }
        }
        self.hub.publish(CompositionEvent::CompositionChanged);
    }

    /// Toggles a combination's mute gain.
    ///
    /// Unmuting while the clock is stopped means "play this combination";
    /// unmuting while it runs is a plain gain change that touches nothing
    /// else.
    pub fn set_combination_muted(&mut self, index: usize, muted: bool) -> Result<(), EngineError> {
        if index >= self.composition.combination_count() {
            return Err(EngineError::UnknownCombination(index));
        }
        if !muted && !self.clock.is_playing() {
            return self.play_combination(index);
        }
        if let Some(c) = self.composition.combination_mut(index) {
            c.muted = muted;
        }
        self.mixer.set_combination_muted(&mut self.graph, index, muted);
        self.hub.publish(CompositionEvent::MuteStatesChanged);
        Ok(())
    }

    /// Runs every scheduling pass whose beat-synchronized wakeup is due.
    /// Call this from the application's run loop.
    pub fn pump(&mut self) {
        let now = self.graph.now();
        let due: Vec<TrackId> = self
            .schedulers
            .iter()
            .filter(|(_, s)| s.wakeup_due(now))
            .map(|(id, _)| *id)
            .collect();
        for id in due {
            self.run_due_pass(id);
        }
    }

    // ----- per-track edits ------------------------------------------------

    /// Inserts a note, evicting overlapping same-pitch notes, and makes it
    /// audible from the current loop if the track is playing.
    pub fn add_note(
        &mut self,
        track_id: TrackId,
        pitch: usize,
        start_beat: f64,
        end_beat: f64,
    ) -> Result<NoteId, EngineError> {
        let (note_id, evicted) = {
            let track = self
                .composition
                .melodic_track_mut(track_id)
                .ok_or(EngineError::UnknownTrack(track_id))?;
            track.insert_note(pitch, start_beat, end_beat)
        };

        let clock = match self.editing.as_ref() {
            Some(session) if session.track == track_id => &session.clock,
            _ => &self.clock,
        };
        if let (Some(TrackScheduler::Melodic(sched)), Some(track)) = (
            self.schedulers.get_mut(&track_id),
            self.composition.melodic_track(track_id),
        ) {
            for note in &evicted {
                sched.note_removed(note.id, &mut self.graph);
            }
            sched.note_added(note_id, track, clock, &mut self.graph);
        }

        if !evicted.is_empty() {
            self.hub.publish(CompositionEvent::NotesRemoved {
                track: track_id,
                notes: evicted.iter().map(|n| n.id).collect(),
            });
        }
        self.hub.publish(CompositionEvent::CompositionChanged);
        Ok(note_id)
    }

    /// Deletes a note, silencing its scheduled and sounding occurrences.
    pub fn delete_note(&mut self, track_id: TrackId, note_id: NoteId) -> Result<(), EngineError> {
        let removed = {
            let track = self
                .composition
                .melodic_track_mut(track_id)
                .ok_or(EngineError::UnknownTrack(track_id))?;
            track.remove_note(note_id)
        };
        if removed.is_some() {
            if let Some(TrackScheduler::Melodic(sched)) = self.schedulers.get_mut(&track_id) {
                sched.note_removed(note_id, &mut self.graph);
            }
            self.hub.publish(CompositionEvent::CompositionChanged);
        }
        Ok(())
    }

    /// Resizes a melodic track, evicting out-of-range notes and rebuilding
    /// its schedule from scratch.
    pub fn set_measures(&mut self, track_id: TrackId, measures: u32) -> Result<(), EngineError> {
        let evicted = {
            let track = self
                .composition
                .melodic_track_mut(track_id)
                .ok_or(EngineError::UnknownTrack(track_id))?;
            track.set_measures(measures)
        };

        let clock = match self.editing.as_ref() {
            Some(session) if session.track == track_id => &session.clock,
            _ => &self.clock,
        };
        if let (Some(TrackScheduler::Melodic(sched)), Some(track)) = (
            self.schedulers.get_mut(&track_id),
            self.composition.melodic_track(track_id),
        ) {
            for note in &evicted {
                sched.note_removed(note.id, &mut self.graph);
            }
            sched.rebuild(track, clock, &mut self.graph);
        }

        if !evicted.is_empty() {
            debug!(track = ?track_id, evicted = evicted.len(), "measure shrink evicted notes");
            self.hub.publish(CompositionEvent::NotesRemoved {
                track: track_id,
                notes: evicted.iter().map(|n| n.id).collect(),
            });
        }
        self.hub.publish(CompositionEvent::CompositionChanged);
        Ok(())
    }

    /// Sets a melodic track's sustain pedal; affects notes scheduled from now
    /// on, never already-issued commands.
    pub fn set_pedal_state(&mut self, track_id: TrackId, sustain: bool) -> Result<(), EngineError> {
        let track = self
            .composition
            .melodic_track_mut(track_id)
            .ok_or(EngineError::UnknownTrack(track_id))?;
        track.sustain = sustain;
        self.hub.publish(CompositionEvent::CompositionChanged);
        Ok(())
    }

    /// Swaps a melodic track's keyboard and rebuilds its schedule.
    pub fn set_keyboard(&mut self, track_id: TrackId, keyboard: Keyboard) -> Result<(), EngineError> {
        {
            let track = self
                .composition
                .melodic_track_mut(track_id)
                .ok_or(EngineError::UnknownTrack(track_id))?;
            track.set_keyboard(keyboard);
        }

        let clock = match self.editing.as_ref() {
            Some(session) if session.track == track_id => &session.clock,
            _ => &self.clock,
        };
        if let (Some(TrackScheduler::Melodic(sched)), Some(track)) = (
            self.schedulers.get_mut(&track_id),
            self.composition.melodic_track(track_id),
        ) {
            sched.rebuild(track, clock, &mut self.graph);
        }
        self.hub.publish(CompositionEvent::CompositionChanged);
        Ok(())
    }

    /// Opens or closes one track's mute gain.
    pub fn set_track_muted(&mut self, track_id: TrackId, muted: bool) -> Result<(), EngineError> {
        if let Some(track) = self.composition.melodic_track_mut(track_id) {
            track.muted = muted;
        } else if let Some(track) = self.composition.sample_track_mut(track_id) {
            track.muted = muted;
        } else {
            return Err(EngineError::UnknownTrack(track_id));
        }
        self.mixer.set_track_muted(&mut self.graph, track_id, muted);
        self.hub.publish(CompositionEvent::MuteStatesChanged);
        Ok(())
    }

    // ----- editing isolation ----------------------------------------------

    /// Detaches a melodic track from the shared clock into a private one so
    /// it can be auditioned alone. The track is unmuted for the session; its
    /// previous mute state is restored by [`Engine::end_editing`].
    pub fn begin_editing(&mut self, track_id: TrackId) -> Result<(), EngineError> {
        if self.editing.is_some() {
            return Err(EngineError::AlreadyEditing);
        }
        let saved_muted = match self.composition.track(track_id) {
            Some(TrackView::Melodic(t)) => t.muted,
            Some(TrackView::Sample(_)) => return Err(EngineError::NotAMelodicTrack(track_id)),
            None => return Err(EngineError::UnknownTrack(track_id)),
        };
        if let Some(sched) = self.schedulers.get_mut(&track_id) {
            sched.stop(&mut self.graph);
        }
        if let Some(track) = self.composition.melodic_track_mut(track_id) {
            track.muted = false;
        }
        self.mixer.set_track_muted(&mut self.graph, track_id, false);
        self.editing = Some(EditSession {
            track: track_id,
            saved_muted,
            clock: Clock::new(self.composition.bpm),
        });
        info!(track = ?track_id, "editing session started");
        self.hub.publish(CompositionEvent::MuteStatesChanged);
        Ok(())
    }

    /// Starts the editing clock (and the edited track's scheduler).
    pub fn edit_play(&mut self) -> Result<(), EngineError> {
        let now = self.graph.now();
        let Some(session) = self.editing.as_mut() else {
            return Err(EngineError::NotEditing);
        };
        let Some(TransportEvent::Started { beat }) = session.clock.play(now) else {
            return Ok(());
        };
        let track_id = session.track;
        if let (Some(session), Some(TrackScheduler::Melodic(sched)), Some(track)) = (
            self.editing.as_ref(),
            self.schedulers.get_mut(&track_id),
            self.composition.melodic_track(track_id),
        ) {
            sched.start_at(beat, track, &session.clock, &mut self.graph);
        }
        Ok(())
    }

    /// Pauses the editing clock (and stops the edited track's scheduler).
    pub fn edit_pause(&mut self) -> Result<(), EngineError> {
        let now = self.graph.now();
        let Some(session) = self.editing.as_mut() else {
            return Err(EngineError::NotEditing);
        };
        if session.clock.pause(now).is_none() {
            return Ok(());
        }
        let track_id = session.track;
        if let Some(sched) = self.schedulers.get_mut(&track_id) {
            sched.stop(&mut self.graph);
        }
        Ok(())
    }

    /// Ends the editing session: restores the saved mute state and rebinds
    /// the track to the shared clock, resuming if its combination is playing.
    pub fn end_editing(&mut self) -> Result<(), EngineError> {
        let Some(session) = self.editing.take() else {
            return Err(EngineError::NotEditing);
        };
        if let Some(sched) = self.schedulers.get_mut(&session.track) {
            sched.stop(&mut self.graph);
        }
        if let Some(track) = self.composition.melodic_track_mut(session.track) {
            track.muted = session.saved_muted;
        }
        self.mixer
            .set_track_muted(&mut self.graph, session.track, session.saved_muted);

        let rebind = self.clock.is_playing()
            && self.active.is_some()
            && self.composition.combination_of_track(session.track) == self.active;
        if rebind {
            if let Some(beat) = self.clock.current_beat(self.graph.now()) {
                self.start_track_scheduler(session.track, beat);
            }
        }
        info!(track = ?session.track, "editing session ended");
        self.hub.publish(CompositionEvent::MuteStatesChanged);
        Ok(())
    }

    // ----- internals ------------------------------------------------------

    fn run_due_pass(&mut self, track_id: TrackId) {
        let clock = match self.editing.as_ref() {
            Some(session) if session.track == track_id => &session.clock,
            _ => &self.clock,
        };
        let Some(sched) = self.schedulers.get_mut(&track_id) else {
            return;
        };
        match (sched, self.composition.track(track_id)) {
            (TrackScheduler::Melodic(s), Some(TrackView::Melodic(t))) => {
                s.run_pass(t, clock, &mut self.graph)
            }
            (TrackScheduler::Sample(s), Some(TrackView::Sample(t))) => {
                s.run_pass(t, clock, &mut self.graph)
            }
            _ => {}
        }
    }

    fn start_track_scheduler(&mut self, track_id: TrackId, beat: f64) {
        let Some(sched) = self.schedulers.get_mut(&track_id) else {
            return;
        };
        match (sched, self.composition.track(track_id)) {
            (TrackScheduler::Melodic(s), Some(TrackView::Melodic(t))) => {
                s.start_at(beat, t, &self.clock, &mut self.graph)
            }
            (TrackScheduler::Sample(s), Some(TrackView::Sample(t))) => {
                s.start_at(beat, t, &self.clock, &mut self.graph)
            }
            _ => {}
        }
    }

    fn start_combination_schedulers(&mut self, index: usize, beat: f64) {
        let ids = match self.composition.combination(index) {
            Some(c) => c.track_ids(),
            None => return,
        };
        for id in ids {
            if self.is_editing(id) {
                continue;
            }
            self.start_track_scheduler(id, beat);
        }
    }

    fn stop_combination_schedulers(&mut self, index: usize) {
        let ids = match self.composition.combination(index) {
            Some(c) => c.track_ids(),
            None => return,
        };
        for id in ids {
            if self.is_editing(id) {
                continue;
            }
            if let Some(sched) = self.schedulers.get_mut(&id) {
                sched.stop(&mut self.graph);
            }
        }
    }

    fn rebuild_combination_schedulers(&mut self, index: usize) {
        let ids = match self.composition.combination(index) {
            Some(c) => c.track_ids(),
            None => return,
        };
        for id in ids {
            if self.is_editing(id) {
                continue;
            }
            let Some(sched) = self.schedulers.get_mut(&id) else {
                continue;
            };
            match (sched, self.composition.track(id)) {
                (TrackScheduler::Melodic(s), Some(TrackView::Melodic(t))) => {
                    s.rebuild(t, &self.clock, &mut self.graph)
                }
                (TrackScheduler::Sample(s), Some(TrackView::Sample(t))) => {
                    s.rebuild(t, &self.clock, &mut self.graph)
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::capture::CaptureGraph;
    use crate::audio::test_buffer;
    use crate::score::{Combination, MelodicTrack, SampleTrack};

    /// Two combinations: "verse" holds a melodic track (one 4-beat measure,
    /// one note at beats 0-1) and "chorus" holds a 2-beat sample loop.
    fn engine() -> (Engine<CaptureGraph>, TrackId, TrackId) {
        let mut composition = Composition::new("demo");
        let mut verse = Combination::new("verse");
        let keyboard = Keyboard::new("kb", (0..4).map(|_| test_buffer(44_100)).collect());
        let mut lead = MelodicTrack::new("lead", keyboard, 1, 4);
        lead.insert_note(0, 0.0, 1.0);
        let lead_id = verse.add_melodic_track(lead);
        let mut chorus = Combination::new("chorus");
        let drums_id = chorus.add_sample_track(SampleTrack::new("drums", test_buffer(44_100), 2));
        composition.add_combination(verse);
        composition.add_combination(chorus);
        (Engine::new(CaptureGraph::new(), composition), lead_id, drums_id)
    }

    /// Gain from a combination's mix input through to the device output:
    /// its own mute gain times the master.
    fn combination_gain(engine: &Engine<CaptureGraph>, index: usize) -> f32 {
        let strip = engine.mixer.combination_strip(index).unwrap();
        engine.graph.effective_gain(strip.input())
    }

    #[test]
    fn play_combination_starts_clock_and_schedules() {
        let (mut engine, _, _) = engine();
        engine.play_combination(0).unwrap();
        assert!(engine.clock().is_playing());
        assert_eq!(engine.active_combination(), Some(0));
        // One note, 2-loop lookahead: occurrences at 0s and 2s.
        let times: Vec<f64> = engine
            .graph()
            .all_live_commands()
            .iter()
            .map(|c| c.at.seconds())
            .collect();
        assert_eq!(times, vec![0.0, 2.0]);
    }

    #[test]
    fn exclusive_combination_switch() {
        let (mut engine, _, _) = engine();
        let sub = engine.subscribe();
        engine.play_combination(1).unwrap();
        engine.drain_events(sub);

        engine.play_combination(0).unwrap();
        assert!((combination_gain(&engine, 0) - 1.0).abs() < 1e-6);
        assert_eq!(combination_gain(&engine, 1), 0.0);
        assert!(!engine.composition().combination(0).unwrap().muted);
        assert!(engine.composition().combination(1).unwrap().muted);

        // Exactly one mute notification for the whole switch.
        let mutes = engine
            .drain_events(sub)
            .into_iter()
            .filter(|e| *e == CompositionEvent::MuteStatesChanged)
            .count();
        assert_eq!(mutes, 1);
    }

    #[test]
    fn play_combination_is_idempotent_while_playing() {
        let (mut engine, _, _) = engine();
        engine.play_combination(0).unwrap();
        let issued = engine.graph().commands().len();
        engine.play_combination(0).unwrap();
        assert_eq!(engine.graph().commands().len(), issued);
    }

    #[test]
    fn unknown_combination_is_an_error() {
        let (mut engine, _, _) = engine();
        assert_eq!(
            engine.play_combination(7),
            Err(EngineError::UnknownCombination(7))
        );
    }

    #[test]
    fn stop_playing_mutes_and_resets_clock() {
        let (mut engine, _, _) = engine();
        engine.play_combination(0).unwrap();
        engine.stop_playing();
        assert!(!engine.clock().is_playing());
        assert!(!engine.clock().is_started());
        assert_eq!(engine.active_combination(), None);
        assert_eq!(combination_gain(&engine, 0), 0.0);
        assert!(engine.graph().all_live_commands().is_empty());
    }

    #[test]
    fn unmuting_while_stopped_acts_as_play() {
        let (mut engine, _, _) = engine();
        engine.set_combination_muted(1, false).unwrap();
        assert!(engine.clock().is_playing());
        assert_eq!(engine.active_combination(), Some(1));
    }

    #[test]
    fn unmuting_while_running_is_gain_only() {
        let (mut engine, _, _) = engine();
        engine.play_combination(0).unwrap();
        let issued = engine.graph().commands().len();
        engine.set_combination_muted(1, false).unwrap();
        // No schedulers started for combination 1, no switch of the active one.
        assert_eq!(engine.active_combination(), Some(0));
        assert_eq!(engine.graph().commands().len(), issued);
    }

    #[test]
    fn pump_tops_up_window_at_loop_boundary() {
        let (mut engine, _, _) = engine();
        engine.play_combination(0).unwrap();
        assert_eq!(engine.graph().all_live_commands().len(), 2);

        engine.graph.advance(2.1); // past beat 4, the first loop boundary
        engine.pump();
        assert_eq!(engine.graph().all_live_commands().len(), 3);
    }

    #[test]
    fn set_bpm_preserves_position_and_reschedules() {
        let (mut engine, _, _) = engine();
        engine.play_combination(0).unwrap();
        engine.graph.advance(1.0); // beat 2
        engine.set_bpm(60.0);
        let beat = engine.clock().current_beat(engine.graph().now()).unwrap();
        assert!((beat - 2.0).abs() < 1e-9);
        // Old commands were flushed and the window rebuilt at the new tempo.
        let times: Vec<f64> = engine
            .graph()
            .all_live_commands()
            .iter()
            .map(|c| c.at.seconds())
            .collect();
        assert_eq!(times, vec![-1.0, 3.0]);
    }

    #[test]
    fn added_note_is_backfilled_into_committed_loops() {
        let (mut engine, lead, _) = engine();
        let sub = engine.subscribe();
        engine.play_combination(0).unwrap();
        engine.graph.advance(0.75); // mid loop 0
        engine.drain_events(sub);

        engine.add_note(lead, 1, 2.0, 3.0).unwrap();
        // Backfill for loops 0 and 1: beats 2 and 6 -> 1s and 3s.
        let times: Vec<f64> = engine
            .graph()
            .all_live_commands()
            .iter()
            .map(|c| c.at.seconds())
            .collect();
        assert_eq!(times, vec![0.0, 2.0, 1.0, 3.0]);
        assert!(engine
            .drain_events(sub)
            .contains(&CompositionEvent::CompositionChanged));
    }

    #[test]
    fn overlap_eviction_notifies_and_silences_old_note() {
        let (mut engine, lead, _) = engine();
        let sub = engine.subscribe();
        let old_id = engine.composition().melodic_track(lead).unwrap().notes()[0].id;
        engine.play_combination(0).unwrap();
        engine.drain_events(sub);

        engine.add_note(lead, 0, 0.5, 1.5).unwrap();
        let events = engine.drain_events(sub);
        assert!(events.contains(&CompositionEvent::NotesRemoved {
            track: lead,
            notes: vec![old_id],
        }));
        // The evicted note's commands are gone; the replacement is scheduled
        // for both committed loops (beats 0.5 and 4.5 -> 0.25s and 2.25s).
        let times: Vec<f64> = engine
            .graph()
            .all_live_commands()
            .iter()
            .map(|c| c.at.seconds())
            .collect();
        assert_eq!(times, vec![0.25, 2.25]);
    }

    #[test]
    fn measure_shrink_evicts_and_notifies() {
        let (mut engine, lead, _) = engine();
        // Grow to 2 measures and put a note in the second one.
        engine.set_measures(lead, 2).unwrap();
        let late = engine.add_note(lead, 2, 6.0, 7.0).unwrap();
        let sub = engine.subscribe();

        engine.set_measures(lead, 1).unwrap();
        let events = engine.drain_events(sub);
        assert!(events.contains(&CompositionEvent::NotesRemoved {
            track: lead,
            notes: vec![late],
        }));
        assert!(engine
            .composition()
            .melodic_track(lead)
            .unwrap()
            .note(late)
            .is_none());
    }

    #[test]
    fn editing_isolates_from_shared_clock_and_restores_mute() {
        let (mut engine, lead, _) = engine();
        engine.set_track_muted(lead, true).unwrap();

        engine.begin_editing(lead).unwrap();
        assert!(engine.is_editing(lead));
        // Unmuted for audition.
        assert!(!engine.composition().melodic_track(lead).unwrap().muted);

        engine.edit_play().unwrap();
        // The private clock runs; the shared clock does not.
        assert!(!engine.clock().is_playing());
        assert!(!engine.graph().all_live_commands().is_empty());

        engine.end_editing().unwrap();
        assert!(!engine.is_editing(lead));
        assert!(engine.composition().melodic_track(lead).unwrap().muted);
        // Editing session's schedule was flushed on teardown.
        assert!(engine.graph().all_live_commands().is_empty());
    }

    #[test]
    fn editing_misuse_errors() {
        let (mut engine, lead, drums) = engine();
        assert_eq!(engine.edit_play(), Err(EngineError::NotEditing));
        assert_eq!(
            engine.begin_editing(drums),
            Err(EngineError::NotAMelodicTrack(drums))
        );
        engine.begin_editing(lead).unwrap();
        assert_eq!(engine.begin_editing(lead), Err(EngineError::AlreadyEditing));
        engine.end_editing().unwrap();
        assert_eq!(engine.end_editing(), Err(EngineError::NotEditing));
    }

    #[test]
    fn end_editing_rebinds_to_running_shared_clock() {
        let (mut engine, lead, _) = engine();
        engine.play_combination(0).unwrap();
        engine.graph.advance(0.5);

        engine.begin_editing(lead).unwrap();
        // Detached: the shared schedule for the track was flushed.
        assert!(engine.graph().all_live_commands().is_empty());

        engine.graph.advance(0.5);
        engine.end_editing().unwrap();
        // Rebound at the shared clock's current beat (beat 2, inside loop 0):
        // the window re-covers loops 0 and 1.
        let times: Vec<f64> = engine
            .graph()
            .all_live_commands()
            .iter()
            .map(|c| c.at.seconds())
            .collect();
        assert_eq!(times, vec![0.0, 2.0]);
    }
}
