//! Best-effort rodio playback backend.
//!
//! Maps the graph capability onto rodio: every source node owns a `Sink`,
//! gain and effect stages are folded into per-sink volume by walking the
//! route to the output, and scheduled buffers become delayed sources appended
//! to the sink's queue. Effects render at unity since they are opaque to this
//! core. Rodio queues per sink are sequential, so absolute host times are
//! approximated by padding the gap from the end of the previous queued
//! buffer; commands wholly in the past are dropped.

use super::{AudioGraph, EffectConfig, HostTime, NodeId, SampleBuffer};
use anyhow::{Context, Result};
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

enum RodioNode {
    Source {
        sink: Sink,
        rate: f64,
        /// Host time at which this sink's queue drains.
        queued_until: f64,
        route: Option<NodeId>,
    },
    Stage {
        gain: f32,
        route: Option<NodeId>,
    },
    Output,
}

/// An [`AudioGraph`] that plays through the default rodio output device.
pub struct RodioGraph {
    // Keep-alive: dropping the stream kills the output device.
    _stream: OutputStream,
    handle: OutputStreamHandle,
    started: Instant,
    next_node: u64,
    output: NodeId,
    nodes: HashMap<NodeId, RodioNode>,
}

impl RodioGraph {
    /// Opens the default output device.
    pub fn new() -> Result<Self> {
        let (stream, handle) =
            OutputStream::try_default().context("Failed to open audio output")?;
        let output = NodeId(0);
        let mut nodes = HashMap::new();
        nodes.insert(output, RodioNode::Output);
        Ok(Self {
            _stream: stream,
            handle,
            started: Instant::now(),
            next_node: 1,
            output,
            nodes,
        })
    }

    fn insert(&mut self, node: RodioNode) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        self.nodes.insert(id, node);
        id
    }

    /// Product of stage gains along the route from `node` to the output;
    /// 0.0 for a detached chain.
    fn effective_gain(&self, node: NodeId) -> f32 {
        let mut gain = 1.0;
        let mut current = node;
        loop {
            match self.nodes.get(&current) {
                Some(RodioNode::Output) => return gain,
                Some(RodioNode::Source { route, .. }) => match route {
                    Some(next) => current = *next,
                    None => return 0.0,
                },
                Some(RodioNode::Stage { gain: g, route }) => {
                    gain *= g;
                    match route {
                        Some(next) => current = *next,
                        None => return 0.0,
                    }
                }
                None => return 0.0,
            }
        }
    }

    /// Re-applies downstream gain changes to every source sink's volume.
    fn refresh_volumes(&mut self) {
        let sources: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, n)| matches!(n, RodioNode::Source { .. }))
            .map(|(id, _)| *id)
            .collect();
        for id in sources {
            let volume = self.effective_gain(id);
            if let Some(RodioNode::Source { sink, .. }) = self.nodes.get(&id) {
                sink.set_volume(volume);
            }
        }
    }
}

impl AudioGraph for RodioGraph {
    fn attach_source(&mut self) -> NodeId {
        match Sink::try_new(&self.handle) {
            Ok(sink) => {
                // Idle until the scheduler starts the source.
                sink.pause();
                self.insert(RodioNode::Source {
                    sink,
                    rate: 1.0,
                    queued_until: 0.0,
                    route: None,
                })
            }
            Err(e) => {
                warn!(error = %e, "sink creation failed; source will be silent");
                self.insert(RodioNode::Stage {
                    gain: 0.0,
                    route: None,
                })
            }
        }
    }

    fn attach_gain(&mut self) -> NodeId {
        self.insert(RodioNode::Stage {
            gain: 1.0,
            route: None,
        })
    }

    fn attach_effect(&mut self, config: &EffectConfig) -> NodeId {
        // Effects are opaque to this core; this backend passes them through.
        debug!(kind = %config.kind, "effect rendered as unity pass-through");
        self.insert(RodioNode::Stage {
            gain: 1.0,
            route: None,
        })
    }

    fn output_node(&self) -> NodeId {
        self.output
    }

    fn connect(&mut self, src: NodeId, dst: NodeId) {
        match self.nodes.get_mut(&src) {
            Some(RodioNode::Source { route, .. }) | Some(RodioNode::Stage { route, .. }) => {
                *route = Some(dst);
            }
            _ => {}
        }
        self.refresh_volumes();
    }

    fn disconnect(&mut self, node: NodeId) {
        if let Some(RodioNode::Source { sink, .. }) = self.nodes.get(&node) {
            sink.stop();
        }
        self.nodes.remove(&node);
        for other in self.nodes.values_mut() {
            match other {
                RodioNode::Source { route, .. } | RodioNode::Stage { route, .. } => {
                    if *route == Some(node) {
                        *route = None;
                    }
                }
                RodioNode::Output => {}
            }
        }
        self.refresh_volumes();
    }

    fn set_gain(&mut self, node: NodeId, gain: f32) {
        if let Some(RodioNode::Stage { gain: g, .. }) = self.nodes.get_mut(&node) {
            *g = gain;
        }
        self.refresh_volumes();
    }

    fn set_rate(&mut self, node: NodeId, rate: f64) {
        if let Some(RodioNode::Source { rate: r, .. }) = self.nodes.get_mut(&node) {
            *r = rate;
        }
    }

    fn schedule_buffer(
        &mut self,
        node: NodeId,
        buffer: &SampleBuffer,
        at: HostTime,
        duration: Option<f64>,
    ) {
        let now = self.started.elapsed().as_secs_f64();
        let Some(RodioNode::Source {
            sink,
            rate,
            queued_until,
            ..
        }) = self.nodes.get_mut(&node)
        else {
            return;
        };
        let rate = *rate;
        let output_duration =
            duration.unwrap_or_else(|| buffer.duration_seconds() / rate.max(1e-9));
        if at.seconds() + output_duration <= now {
            // Entirely elapsed (backfill for a loop already behind the play
            // head); nothing audible remains, drop it.
            debug!(at = at.seconds(), "dropping past-dated buffer");
            return;
        }

        // The sink queue is sequential: pad out the gap between the previous
        // queued buffer and this one's absolute start time.
        let queue_head = now.max(*queued_until);
        let gap = (at.seconds() - queue_head).max(0.0);
        *queued_until = queue_head + gap + output_duration;

        let source = SamplesBuffer::new(
            buffer.channels(),
            buffer.sample_rate(),
            buffer.samples().to_vec(),
        )
        .speed(rate as f32)
        .take_duration(Duration::from_secs_f64(output_duration))
        .delay(Duration::from_secs_f64(gap));
        sink.append(source);
    }

    fn play_source(&mut self, node: NodeId) {
        if let Some(RodioNode::Source { sink, .. }) = self.nodes.get(&node) {
            sink.play();
        }
    }

    fn stop_source(&mut self, node: NodeId) {
        let now = self.started.elapsed().as_secs_f64();
        if let Some(RodioNode::Source {
            sink, queued_until, ..
        }) = self.nodes.get_mut(&node)
        {
            // Empties the queue; the sink stays usable for the next start.
            sink.stop();
            *queued_until = now;
        }
    }

    fn now(&self) -> HostTime {
        HostTime::from_seconds(self.started.elapsed().as_secs_f64())
    }
}
