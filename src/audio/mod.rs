//! Audio graph capability.
//!
//! The scheduling core never touches hardware directly: it talks to an
//! [`AudioGraph`], an opaque routing/mixing collaborator that owns nodes,
//! connections, per-node gain, and a hardware host clock. Two implementations
//! live alongside the trait: [`capture::CaptureGraph`] (virtual time, records
//! every command; used by tests and the demo's simulate mode) and
//! [`rodio_out::RodioGraph`] (best-effort real playback).

pub mod capture;
pub mod rodio_out;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// An instant on the hardware playback clock, in seconds since the output
/// device started. Purely linear; all beat math happens in [`crate::clock`].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct HostTime(f64);

impl HostTime {
    /// Wraps a raw seconds-since-start value.
    pub fn from_seconds(seconds: f64) -> Self {
        Self(seconds)
    }

    /// Seconds since the output device started.
    pub fn seconds(&self) -> f64 {
        self.0
    }

    /// This instant shifted forward (or backward, for negative `seconds`).
    pub fn offset(&self, seconds: f64) -> Self {
        Self(self.0 + seconds)
    }

    /// Signed distance from `earlier` to `self` in seconds.
    pub fn since(&self, earlier: HostTime) -> f64 {
        self.0 - earlier.0
    }
}

/// Handle to a node owned by an audio graph. Only meaningful to the graph
/// that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u64);

/// An immutable, cheaply-clonable audio buffer (interleaved f32 frames).
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    data: Arc<Vec<f32>>,
    channels: u16,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Wraps interleaved f32 samples.
    pub fn new(data: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            data: Arc::new(data),
            channels,
            sample_rate,
        }
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.data
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.data.len() / self.channels as usize
    }

    /// Natural playback length in seconds, before any rate change.
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Configuration of one opaque effect unit in a track or combination chain.
///
/// The core routes audio through effect nodes but never processes them;
/// interpretation is entirely up to the graph implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectConfig {
    /// Effect kind understood by the graph backend (e.g. "reverb", "delay").
    pub kind: String,
    /// Wet/dry or intensity amount, 0.0..=1.0.
    pub amount: f32,
}

impl EffectConfig {
    pub fn new(kind: impl Into<String>, amount: f32) -> Self {
        Self {
            kind: kind.into(),
            amount,
        }
    }
}

/// The audio routing/mixing collaborator consumed by the scheduling core.
///
/// Implementations own a node graph rooted at [`AudioGraph::output_node`].
/// Scheduling is command-based: a buffer is queued on a source node at an
/// absolute host time, optionally truncated to a duration override.
/// `stop_source` flushes whatever is still queued on that source; commands
/// referencing times in the past are the implementation's to clip or drop.
pub trait AudioGraph {
    /// Creates a buffer-player source node.
    fn attach_source(&mut self) -> NodeId;

    /// Creates a gain stage (initial gain 1.0).
    fn attach_gain(&mut self) -> NodeId;

    /// Creates an opaque effect unit.
    fn attach_effect(&mut self, config: &EffectConfig) -> NodeId;

    /// The device output mix point every chain ultimately feeds.
    fn output_node(&self) -> NodeId;

    /// Routes `src`'s output into `dst`.
    fn connect(&mut self, src: NodeId, dst: NodeId);

    /// Removes a node and its connections.
    fn disconnect(&mut self, node: NodeId);

    /// Sets a gain node's gain (sources also accept a gain for convenience).
    fn set_gain(&mut self, node: NodeId, gain: f32);

    /// Sets a source node's playback rate (1.0 = natural speed).
    fn set_rate(&mut self, node: NodeId, rate: f64);

    /// Queues `buffer` on `node` to begin sounding at `at`. A `duration`
    /// override truncates playback to that many seconds of output.
    fn schedule_buffer(
        &mut self,
        node: NodeId,
        buffer: &SampleBuffer,
        at: HostTime,
        duration: Option<f64>,
    );

    /// Starts a source consuming its queued buffers.
    fn play_source(&mut self, node: NodeId);

    /// Stops a source and flushes everything still queued on it.
    fn stop_source(&mut self, node: NodeId);

    /// The hardware clock's current time.
    fn now(&self) -> HostTime;

    /// Convenience: the instant `seconds` from now.
    fn host_time_after(&self, seconds: f64) -> HostTime {
        self.now().offset(seconds)
    }
}

#[cfg(test)]
pub(crate) fn test_buffer(frames: usize) -> SampleBuffer {
    // Mono ramp, 44.1kHz. Content is irrelevant to the scheduler; frame count
    // is what the capture log asserts on.
    let data = (0..frames).map(|i| (i as f32) / (frames as f32)).collect();
    SampleBuffer::new(data, 1, 44_100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_duration() {
        let buf = SampleBuffer::new(vec![0.0; 44_100 * 2], 2, 44_100);
        assert_eq!(buf.frames(), 44_100);
        assert!((buf.duration_seconds() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn host_time_arithmetic() {
        let t = HostTime::from_seconds(1.5);
        assert!((t.offset(0.5).seconds() - 2.0).abs() < 1e-9);
        assert!((t.since(HostTime::from_seconds(1.0)) - 0.5).abs() < 1e-9);
        assert!(t.offset(-2.0).seconds() < 0.0);
    }
}
