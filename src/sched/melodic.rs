//! Loop scheduler for melodic tracks.
//!
//! One instance per melodic track, bound to exactly one clock at a time. The
//! scheduler owns a per-note source node in the audio graph (notes map to
//! sources by stable ID) and keeps a rolling window of loop iterations whose
//! note occurrences have already been turned into timestamped commands.
//!
//! The scheduler never patches already-issued commands. Live edits either
//! touch a single note's source (add/delete) or discard the window and
//! rebuild from the clock's current beat (tempo/structure changes).

use super::window::{loop_index, LoopWindow};
use super::{Wakeup, LOOKAHEAD_LOOPS};
use crate::audio::{AudioGraph, HostTime, NodeId};
use crate::clock::Clock;
use crate::score::{MelodicTrack, Note, NoteId};
use std::collections::HashMap;
use tracing::{debug, trace};

#[derive(Debug)]
struct RunState {
    window: LoopWindow,
    wakeup: Option<Wakeup>,
}

/// Rolling-window scheduler for one melodic track.
pub struct MelodicScheduler {
    /// Mix point all of this track's note sources feed (the track strip's
    /// chain input).
    input: NodeId,
    /// Stable note-ID → source-node table.
    sources: HashMap<NoteId, NodeId>,
    running: Option<RunState>,
    generation: u64,
}

impl MelodicScheduler {
    /// Builds the scheduler and one source node per existing note.
    pub fn new<G: AudioGraph>(graph: &mut G, input: NodeId, track: &MelodicTrack) -> Self {
        let mut scheduler = Self {
            input,
            sources: HashMap::new(),
            running: None,
            generation: 0,
        };
        for note in track.notes() {
            scheduler.ensure_source(graph, note.id);
        }
        scheduler
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Most advanced loop iteration committed so far; `None` when stopped.
    pub fn highest_scheduled(&self) -> Option<i64> {
        self.running.as_ref().map(|s| s.window.highest_scheduled())
    }

    fn ensure_source<G: AudioGraph>(&mut self, graph: &mut G, note: NoteId) -> NodeId {
        if let Some(&source) = self.sources.get(&note) {
            return source;
        }
        let source = graph.attach_source();
        graph.connect(source, self.input);
        self.sources.insert(note, source);
        source
    }

    /// Enters `Running` at `beat`: nothing is considered scheduled for the
    /// loop containing `beat` yet, every source starts, and one pass runs
    /// immediately.
    pub fn start_at<G: AudioGraph>(
        &mut self,
        beat: f64,
        track: &MelodicTrack,
        clock: &Clock,
        graph: &mut G,
    ) {
        let loop_beats = track.loop_beats();
        if loop_beats <= 0.0 {
            return;
        }
        self.generation += 1;
        let current = loop_index(beat, loop_beats);
        self.running = Some(RunState {
            window: LoopWindow::starting_at(current),
            wakeup: None,
        });
        for &source in self.sources.values() {
            graph.play_source(source);
        }
        debug!(track = %track.name, beat, current, "melodic scheduler started");
        self.run_pass(track, clock, graph);
    }

    /// Leaves `Running`: cancels the pending wakeup and stops every source.
    ///
    /// Commands already consumed by the graph may still fire; they land in a
    /// muted or stopped sink.
    pub fn stop<G: AudioGraph>(&mut self, graph: &mut G) {
        if self.running.take().is_none() {
            return;
        }
        self.generation += 1;
        for &source in self.sources.values() {
            graph.stop_source(source);
        }
        debug!("melodic scheduler stopped");
    }

    /// Whether the pending wakeup is due at `now`.
    pub fn wakeup_due(&self, now: HostTime) -> bool {
        match self.running.as_ref().and_then(|s| s.wakeup) {
            Some(wakeup) => wakeup.generation == self.generation && now >= wakeup.at,
            None => false,
        }
    }

    /// One scheduling pass: tops the window up to the lookahead target and
    /// re-arms the wakeup at the next loop boundary.
    pub fn run_pass<G: AudioGraph>(&mut self, track: &MelodicTrack, clock: &Clock, graph: &mut G) {
        let loop_beats = track.loop_beats();
        if loop_beats <= 0.0 {
            return;
        }
        let now = graph.now();
        let Some(beat) = clock.current_beat(now) else {
            // Clock never started: stay silent, try again when driven next.
            return;
        };
        let current = loop_index(beat, loop_beats);
        let due = match self.running.as_mut() {
            Some(state) => {
                if let Some(wakeup) = state.wakeup {
                    if wakeup.generation != self.generation {
                        // Stale wakeup from a previous run; drop it.
                        state.wakeup = None;
                    }
                }
                state.window.due(current, LOOKAHEAD_LOOPS)
            }
            None => return,
        };

        for li in due {
            trace!(track = %track.name, li, "scheduling loop");
            for note in track.notes() {
                self.schedule_occurrence(li, note, track, clock, graph);
            }
        }

        let next_boundary = (current + 1) as f64 * loop_beats;
        let wakeup = clock.host_time_for_beat(next_boundary).map(|at| Wakeup {
            at,
            generation: self.generation,
        });
        if let Some(state) = self.running.as_mut() {
            state.wakeup = wakeup;
        }
    }

    /// Issues one playback command for `note`'s occurrence in loop `li`.
    ///
    /// Silent no-ops: clock never started, or pitch outside the keyboard.
    fn schedule_occurrence<G: AudioGraph>(
        &self,
        li: i64,
        note: &Note,
        track: &MelodicTrack,
        clock: &Clock,
        graph: &mut G,
    ) {
        let Some(&source) = self.sources.get(&note.id) else {
            return;
        };
        let absolute_beat = li as f64 * track.loop_beats() + note.start_beat;
        let Some(at) = clock.host_time_for_beat(absolute_beat) else {
            return;
        };
        let Some(buffer) = track.buffer_for_pitch(note.pitch) else {
            trace!(pitch = note.pitch, "pitch outside keyboard, skipping");
            return;
        };
        // With the pedal held the note rings out its full buffer; otherwise
        // it is truncated to its written duration.
        let duration = if track.sustain {
            None
        } else {
            Some(note.duration_beats() * clock.seconds_per_beat())
        };
        graph.schedule_buffer(source, buffer, at, duration);
    }

    /// Reacts to a note inserted while possibly running.
    ///
    /// Creates and starts the note's source, then backfills the loops already
    /// committed before the note existed (from the current loop through the
    /// window's high-water mark) so the note is audible starting this loop,
    /// not only after the window advances. Occurrences whose host time has
    /// already passed are issued anyway; the audio layer clips them.
    pub fn note_added<G: AudioGraph>(
        &mut self,
        note_id: NoteId,
        track: &MelodicTrack,
        clock: &Clock,
        graph: &mut G,
    ) {
        let source = self.ensure_source(graph, note_id);
        let Some(state) = self.running.as_ref() else {
            return;
        };
        graph.play_source(source);
        let Some(note) = track.note(note_id) else {
            return;
        };
        let Some(beat) = clock.current_beat(graph.now()) else {
            return;
        };
        let current = loop_index(beat, track.loop_beats());
        let highest = state.window.highest_scheduled();
        debug!(track = %track.name, note = note_id.as_u64(), current, highest, "backfilling note");
        for li in current..=highest {
            self.schedule_occurrence(li, note, track, clock, graph);
        }
    }

    /// Reacts to a note removed from the track: silences anything queued or
    /// sounding on its source and tears the source down.
    pub fn note_removed<G: AudioGraph>(&mut self, note_id: NoteId, graph: &mut G) {
        if let Some(source) = self.sources.remove(&note_id) {
            graph.stop_source(source);
            graph.disconnect(source);
        }
    }

    /// Full restart after a structural change (tempo, measure count,
    /// keyboard swap): the committed window is discarded and rebuilt from the
    /// clock's current beat.
    pub fn rebuild<G: AudioGraph>(&mut self, track: &MelodicTrack, clock: &Clock, graph: &mut G) {
        if !self.is_running() {
            return;
        }
        self.stop(graph);
        if let Some(beat) = clock.current_beat(graph.now()) {
            self.start_at(beat, track, clock, graph);
        }
    }

    /// Tears down every source this scheduler owns.
    pub fn teardown<G: AudioGraph>(&mut self, graph: &mut G) {
        self.stop(graph);
        for (_, source) in self.sources.drain() {
            graph.disconnect(source);
        }
    }
}
