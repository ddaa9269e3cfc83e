//! Loop scheduler for looping sample tracks.
//!
//! The sample-track instantiation of the rolling-window pattern: one source
//! node, one buffer, one command per loop iteration. The buffer is stretched
//! to exactly one loop by a varispeed rate derived from the clock tempo, so a
//! tempo change means a rate change and therefore a full rebuild.

use super::window::{loop_index, LoopWindow};
use super::{Wakeup, LOOKAHEAD_LOOPS};
use crate::audio::{AudioGraph, HostTime, NodeId};
use crate::clock::Clock;
use crate::score::SampleTrack;
use tracing::debug;

#[derive(Debug)]
struct RunState {
    window: LoopWindow,
    wakeup: Option<Wakeup>,
}

/// Rolling-window scheduler for one looping sample track.
pub struct SampleLoopScheduler {
    source: NodeId,
    running: Option<RunState>,
    generation: u64,
}

impl SampleLoopScheduler {
    /// Builds the scheduler and its single source node, feeding `input`.
    pub fn new<G: AudioGraph>(graph: &mut G, input: NodeId) -> Self {
        let source = graph.attach_source();
        graph.connect(source, input);
        Self {
            source,
            running: None,
            generation: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Most advanced loop iteration committed so far; `None` when stopped.
    pub fn highest_scheduled(&self) -> Option<i64> {
        self.running.as_ref().map(|s| s.window.highest_scheduled())
    }

    /// Enters `Running` at `beat`, pinning the varispeed rate to the clock's
    /// current tempo and running one pass immediately.
    pub fn start_at<G: AudioGraph>(
        &mut self,
        beat: f64,
        track: &SampleTrack,
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
        graph.set_rate(self.source, track.tempo_rate(clock.bpm()));
        graph.play_source(self.source);
        debug!(track = %track.name, beat, current, "sample scheduler started");
        self.run_pass(track, clock, graph);
    }

    /// Leaves `Running`: cancels the pending wakeup and flushes the source.
    pub fn stop<G: AudioGraph>(&mut self, graph: &mut G) {
        if self.running.take().is_none() {
            return;
        }
        self.generation += 1;
        graph.stop_source(self.source);
        debug!("sample scheduler stopped");
    }

    /// Whether the pending wakeup is due at `now`.
    pub fn wakeup_due(&self, now: HostTime) -> bool {
        match self.running.as_ref().and_then(|s| s.wakeup) {
            Some(wakeup) => wakeup.generation == self.generation && now >= wakeup.at,
            None => false,
        }
    }

    /// One scheduling pass: one command per due loop iteration, then re-arm
    /// at the next loop boundary.
    pub fn run_pass<G: AudioGraph>(&mut self, track: &SampleTrack, clock: &Clock, graph: &mut G) {
        let loop_beats = track.loop_beats();
        if loop_beats <= 0.0 {
            return;
        }
        let Some(beat) = clock.current_beat(graph.now()) else {
            return;
        };
        let current = loop_index(beat, loop_beats);
        let due = match self.running.as_mut() {
            Some(state) => state.window.due(current, LOOKAHEAD_LOOPS),
            None => return,
        };

        for li in due {
            let Some(at) = clock.host_time_for_beat(li as f64 * loop_beats) else {
                continue;
            };
            graph.schedule_buffer(self.source, track.buffer(), at, None);
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

    /// Full restart after a tempo or content change: discards the window and
    /// re-derives the rate and schedule from the clock's current beat.
    pub fn rebuild<G: AudioGraph>(&mut self, track: &SampleTrack, clock: &Clock, graph: &mut G) {
        if !self.is_running() {
            return;
        }
        self.stop(graph);
        if let Some(beat) = clock.current_beat(graph.now()) {
            self.start_at(beat, track, clock, graph);
        }
    }

    /// Tears down the source node.
    pub fn teardown<G: AudioGraph>(&mut self, graph: &mut G) {
        self.stop(graph);
        graph.disconnect(self.source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::capture::CaptureGraph;
    use crate::audio::test_buffer;

    /// 2-beat loop over a 1s buffer, clock at 120 BPM started at t=0.
    fn fixture() -> (CaptureGraph, Clock, SampleTrack, SampleLoopScheduler) {
        let mut graph = CaptureGraph::new();
        let track = SampleTrack::new("drums", test_buffer(44_100), 2);
        let mut clock = Clock::new(120.0);
        clock.play(graph.now());
        let input = graph.output_node();
        let scheduler = SampleLoopScheduler::new(&mut graph, input);
        (graph, clock, track, scheduler)
    }

    fn live_times(graph: &CaptureGraph) -> Vec<f64> {
        graph
            .all_live_commands()
            .iter()
            .map(|c| c.at.seconds())
            .collect()
    }

    #[test]
    fn loops_land_on_loop_boundaries() {
        let (mut graph, clock, track, mut scheduler) = fixture();
        scheduler.start_at(0.0, &track, &clock, &mut graph);
        // 2-beat loop at 120 bpm = 1s per loop; loops 0 and 1.
        assert_eq!(live_times(&graph), vec![0.0, 1.0]);

        graph.advance(1.1);
        assert!(scheduler.wakeup_due(graph.now()));
        scheduler.run_pass(&track, &clock, &mut graph);
        assert_eq!(live_times(&graph), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn rate_matches_tempo() {
        let (mut graph, clock, track, mut scheduler) = fixture();
        let source = {
            scheduler.start_at(0.0, &track, &clock, &mut graph);
            graph.all_live_commands()[0].node
        };
        // 1s buffer over a 1s loop slot: natural rate.
        assert!((graph.rate(source) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn tempo_change_rebuild_recomputes_rate() {
        let (mut graph, mut clock, track, mut scheduler) = fixture();
        scheduler.start_at(0.0, &track, &clock, &mut graph);
        let source = graph.all_live_commands()[0].node;

        graph.advance(0.5); // beat 1
        clock.set_tempo(60.0, graph.now());
        scheduler.rebuild(&track, &clock, &mut graph);

        // Loop slot is now 2s for the 1s buffer: half speed.
        assert!((graph.rate(source) - 0.5).abs() < 1e-9);
        // Window rebuilt from beat 1 (inside loop 0): loop 0 starts at beat 0,
        // one second of 60 bpm before the re-anchor at t=0.5 -> t=-0.5.
        assert_eq!(live_times(&graph), vec![-0.5, 1.5]);
    }

    #[test]
    fn stop_flushes_and_cancels() {
        let (mut graph, clock, track, mut scheduler) = fixture();
        scheduler.start_at(0.0, &track, &clock, &mut graph);
        scheduler.stop(&mut graph);
        assert!(live_times(&graph).is_empty());
        graph.advance(10.0);
        assert!(!scheduler.wakeup_due(graph.now()));
    }
}
