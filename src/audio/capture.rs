//! Command-capturing audio graph with a virtual host clock.
//!
//! `CaptureGraph` implements [`AudioGraph`] without producing sound: every
//! scheduled buffer is appended to a command log, and the host clock only
//! moves when told to. The demo binary's simulate mode prints the log; the
//! scheduler, mixer, and engine tests assert on it.

use super::{AudioGraph, EffectConfig, HostTime, NodeId, SampleBuffer};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Source,
    Gain,
    Effect,
    Output,
}

#[derive(Debug)]
struct CapturedNode {
    kind: NodeKind,
    gain: f32,
    rate: f64,
    playing: bool,
    /// Downstream node this one feeds, if connected.
    route: Option<NodeId>,
}

/// One buffer-playback command as issued by a scheduler.
#[derive(Debug, Clone)]
pub struct ScheduledCommand {
    pub node: NodeId,
    pub at: HostTime,
    /// Duration override in seconds, `None` = play the buffer out.
    pub duration: Option<f64>,
    /// Frame count of the scheduled buffer.
    pub frames: usize,
    /// Set when `stop_source` flushed this command before it was consumed.
    pub cancelled: bool,
}

/// A virtual-time [`AudioGraph`] that records everything.
pub struct CaptureGraph {
    now: HostTime,
    next_node: u64,
    output: NodeId,
    nodes: HashMap<NodeId, CapturedNode>,
    commands: Vec<ScheduledCommand>,
}

impl CaptureGraph {
    pub fn new() -> Self {
        let output = NodeId(0);
        let mut nodes = HashMap::new();
        nodes.insert(
            output,
            CapturedNode {
                kind: NodeKind::Output,
                gain: 1.0,
                rate: 1.0,
                playing: false,
                route: None,
            },
        );
        Self {
            now: HostTime::from_seconds(0.0),
            next_node: 1,
            output,
            nodes,
            commands: Vec::new(),
        }
    }

    fn insert(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        self.nodes.insert(
            id,
            CapturedNode {
                kind,
                gain: 1.0,
                rate: 1.0,
                playing: false,
                route: None,
            },
        );
        id
    }

    /// Advances the virtual host clock.
    pub fn advance(&mut self, seconds: f64) {
        self.now = self.now.offset(seconds);
    }

    /// Every command ever issued, including cancelled ones.
    pub fn commands(&self) -> &[ScheduledCommand] {
        &self.commands
    }

    /// Commands issued to `node` that were not flushed.
    pub fn live_commands(&self, node: NodeId) -> Vec<&ScheduledCommand> {
        self.commands
            .iter()
            .filter(|c| c.node == node && !c.cancelled)
            .collect()
    }

    /// All un-flushed commands in issue order.
    pub fn all_live_commands(&self) -> Vec<&ScheduledCommand> {
        self.commands.iter().filter(|c| !c.cancelled).collect()
    }

    /// Gain currently set on `node`.
    pub fn gain(&self, node: NodeId) -> f32 {
        self.nodes.get(&node).map(|n| n.gain).unwrap_or(0.0)
    }

    /// Playback rate currently set on `node`.
    pub fn rate(&self, node: NodeId) -> f64 {
        self.nodes.get(&node).map(|n| n.rate).unwrap_or(1.0)
    }

    /// Whether a source node has been started.
    pub fn is_playing(&self, node: NodeId) -> bool {
        self.nodes.get(&node).map(|n| n.playing).unwrap_or(false)
    }

    /// Product of gains along the route from `node` to the output.
    ///
    /// Returns 0.0 if the node is disconnected from the output (commands
    /// fired into a detached chain are inaudible).
    pub fn effective_gain(&self, node: NodeId) -> f32 {
        let mut gain = 1.0;
        let mut current = node;
        loop {
            let Some(n) = self.nodes.get(&current) else {
                return 0.0;
            };
            gain *= n.gain;
            if n.kind == NodeKind::Output {
                return gain;
            }
            match n.route {
                Some(next) => current = next,
                None => return 0.0,
            }
        }
    }
}

impl Default for CaptureGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioGraph for CaptureGraph {
    fn attach_source(&mut self) -> NodeId {
        self.insert(NodeKind::Source)
    }

    fn attach_gain(&mut self) -> NodeId {
        self.insert(NodeKind::Gain)
    }

    fn attach_effect(&mut self, _config: &EffectConfig) -> NodeId {
        self.insert(NodeKind::Effect)
    }

    fn output_node(&self) -> NodeId {
        self.output
    }

    fn connect(&mut self, src: NodeId, dst: NodeId) {
        if let Some(node) = self.nodes.get_mut(&src) {
            node.route = Some(dst);
        }
    }

    fn disconnect(&mut self, node: NodeId) {
        self.nodes.remove(&node);
        for other in self.nodes.values_mut() {
            if other.route == Some(node) {
                other.route = None;
            }
        }
    }

    fn set_gain(&mut self, node: NodeId, gain: f32) {
        if let Some(node) = self.nodes.get_mut(&node) {
            node.gain = gain;
        }
    }

    fn set_rate(&mut self, node: NodeId, rate: f64) {
        if let Some(node) = self.nodes.get_mut(&node) {
            node.rate = rate;
        }
    }

    fn schedule_buffer(
        &mut self,
        node: NodeId,
        buffer: &SampleBuffer,
        at: HostTime,
        duration: Option<f64>,
    ) {
        self.commands.push(ScheduledCommand {
            node,
            at,
            duration,
            frames: buffer.frames(),
            cancelled: false,
        });
    }

    fn play_source(&mut self, node: NodeId) {
        if let Some(node) = self.nodes.get_mut(&node) {
            node.playing = true;
        }
    }

    fn stop_source(&mut self, node: NodeId) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.playing = false;
        }
        // Flush: everything still queued on this source is silenced.
        for command in self.commands.iter_mut().filter(|c| c.node == node) {
            command.cancelled = true;
        }
    }

    fn now(&self) -> HostTime {
        self.now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::test_buffer;

    #[test]
    fn records_and_flushes_commands() {
        let mut graph = CaptureGraph::new();
        let source = graph.attach_source();
        graph.schedule_buffer(source, &test_buffer(64), HostTime::from_seconds(1.0), None);
        graph.schedule_buffer(
            source,
            &test_buffer(64),
            HostTime::from_seconds(2.0),
            Some(0.5),
        );
        assert_eq!(graph.live_commands(source).len(), 2);

        graph.stop_source(source);
        assert!(graph.live_commands(source).is_empty());
        // The issuance log itself is append-only.
        assert_eq!(graph.commands().len(), 2);
    }

    #[test]
    fn effective_gain_walks_route_to_output() {
        let mut graph = CaptureGraph::new();
        let source = graph.attach_source();
        let gain_a = graph.attach_gain();
        let gain_b = graph.attach_gain();
        graph.connect(source, gain_a);
        graph.connect(gain_a, gain_b);
        graph.connect(gain_b, graph.output_node());
        graph.set_gain(gain_a, 0.5);
        assert!((graph.effective_gain(source) - 0.5).abs() < 1e-6);

        graph.set_gain(gain_b, 0.0);
        assert_eq!(graph.effective_gain(source), 0.0);
    }

    #[test]
    fn disconnected_chain_is_inaudible() {
        let mut graph = CaptureGraph::new();
        let source = graph.attach_source();
        assert_eq!(graph.effective_gain(source), 0.0);
    }

    #[test]
    fn virtual_clock_only_moves_when_told() {
        let mut graph = CaptureGraph::new();
        assert!((graph.now().seconds() - 0.0).abs() < 1e-9);
        graph.advance(1.5);
        graph.advance(0.5);
        assert!((graph.now().seconds() - 2.0).abs() < 1e-9);
    }
}
