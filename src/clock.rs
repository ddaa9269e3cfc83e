//! The musical clock.
//!
//! A [`Clock`] maintains the mapping between abstract beat position and the
//! hardware playback clock. It is the single source of truth for "what beat
//! is it now": every scheduler derives its work from `current_beat` plus the
//! document, never from its own notion of position.
//!
//! All methods that need "now" take it explicitly as a [`HostTime`]; the
//! engine passes `graph.now()`. That keeps the type pure and lets tests drive
//! it with a virtual clock.

use crate::audio::HostTime;
use tracing::debug;

/// The (host time, beat) pair from which position extrapolates linearly.
///
/// While the clock is paused the anchor holds the frozen position, not a live
/// origin; both fields are always present together.
#[derive(Debug, Clone, Copy)]
struct Anchor {
    host_time: HostTime,
    beat: f64,
}

/// A transport transition, reported to whoever drives the schedulers.
///
/// Listeners are expected to reschedule on `TempoChanged`, not to assume old
/// timing remains valid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportEvent {
    /// Playback (re)started at `beat`.
    Started { beat: f64 },
    /// Playback stopped at `beat` (pause or reset).
    Stopped { beat: f64 },
    /// Tempo changed; position was preserved at `beat`.
    TempoChanged { bpm: f64, beat: f64 },
}

/// Maps between beat position and host time for one running ensemble.
///
/// One clock exists per independently-running ensemble: one for the
/// composition, plus an ephemeral one per track being edited in isolation.
#[derive(Debug, Clone)]
pub struct Clock {
    bpm: f64,
    playing: bool,
    anchor: Option<Anchor>,
}

impl Clock {
    /// A stopped, never-started clock at `bpm`.
    pub fn new(bpm: f64) -> Self {
        Self {
            bpm,
            playing: false,
            anchor: None,
        }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// True once `play` has been called at least once since the last `reset`.
    pub fn is_started(&self) -> bool {
        self.anchor.is_some()
    }

    /// Duration of one beat in seconds at the current tempo.
    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm
    }

    /// The beat that should be sounding at host time `t`.
    ///
    /// `None` iff the clock has never been started. While playing the mapping
    /// extrapolates linearly in both directions: a `t` before the anchor
    /// yields an earlier (possibly negative) beat, which schedulers use to
    /// compute missed events. While paused, returns the frozen position.
    pub fn current_beat(&self, t: HostTime) -> Option<f64> {
        let anchor = self.anchor?;
        if !self.playing {
            return Some(anchor.beat);
        }
        Some(anchor.beat + t.since(anchor.host_time) / self.seconds_per_beat())
    }

    /// The host time at which beat `b` sounds; inverse of [`Self::current_beat`].
    pub fn host_time_for_beat(&self, b: f64) -> Option<HostTime> {
        let anchor = self.anchor?;
        Some(anchor.host_time.offset((b - anchor.beat) * self.seconds_per_beat()))
    }

    /// Starts or resumes playback at `now`.
    ///
    /// No-op when already playing. Resumes from the frozen beat, or beat 0 if
    /// never started.
    pub fn play(&mut self, now: HostTime) -> Option<TransportEvent> {
        if self.playing {
            return None;
        }
        let beat = self.anchor.map(|a| a.beat).unwrap_or(0.0);
        self.anchor = Some(Anchor {
            host_time: now,
            beat,
        });
        self.playing = true;
        debug!(beat, bpm = self.bpm, "clock started");
        Some(TransportEvent::Started { beat })
    }

    /// Freezes the clock at its current beat.
    ///
    /// No-op when not playing.
    pub fn pause(&mut self, now: HostTime) -> Option<TransportEvent> {
        if !self.playing {
            return None;
        }
        let beat = self.current_beat(now).unwrap_or(0.0);
        self.anchor = Some(Anchor {
            host_time: now,
            beat,
        });
        self.playing = false;
        debug!(beat, "clock paused");
        Some(TransportEvent::Stopped { beat })
    }

    /// Returns the clock to never-started.
    ///
    /// If playing, reports the stop at the beat reached; the anchor is
    /// cleared either way.
    pub fn reset(&mut self, now: HostTime) -> Option<TransportEvent> {
        let event = if self.playing {
            let beat = self.current_beat(now).unwrap_or(0.0);
            Some(TransportEvent::Stopped { beat })
        } else {
            None
        };
        self.playing = false;
        self.anchor = None;
        debug!("clock reset");
        event
    }

    /// Changes tempo while preserving the current beat.
    ///
    /// Re-anchors at (now, current beat) BEFORE swapping `bpm`, so position
    /// is continuous across the change.
    pub fn set_tempo(&mut self, bpm: f64, now: HostTime) -> TransportEvent {
        let beat = self.current_beat(now).unwrap_or(0.0);
        if let Some(anchor) = self.anchor.as_mut() {
            anchor.host_time = now;
            anchor.beat = beat;
        }
        self.bpm = bpm;
        debug!(bpm, beat, "tempo changed");
        TransportEvent::TempoChanged { bpm, beat }
    }
}
