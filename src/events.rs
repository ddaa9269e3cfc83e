//! Change notification.
//!
//! One typed event hub per composition replaces hand-wired delegate chains:
//! observers subscribe for a stable handle, the engine publishes once at the
//! point a change is committed, and each observer drains its own mailbox on
//! its own schedule (the UI layer re-renders from these instead of polling).
//! Unsubscription is explicit; dropping a handle without unsubscribing leaks
//! the mailbox until the hub is dropped.

use crate::score::{NoteId, TrackId};
use std::collections::VecDeque;

/// A change to persisted composition state.
#[derive(Debug, Clone, PartialEq)]
pub enum CompositionEvent {
    /// Musical content changed (notes, measures, tempo, pedal, keyboard).
    CompositionChanged,
    /// One or more mute gains changed (tracks or combinations).
    MuteStatesChanged,
    /// Notes were evicted from a track as a side effect of an edit
    /// (overlap eviction on insert, or a measure-count shrink).
    NotesRemoved {
        track: TrackId,
        notes: Vec<NoteId>,
    },
}

/// Stable handle identifying one subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Per-composition observer bus with per-subscriber mailboxes.
#[derive(Debug, Default)]
pub struct EventHub {
    next_id: u64,
    mailboxes: Vec<(SubscriberId, VecDeque<CompositionEvent>)>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber and returns its handle.
    pub fn subscribe(&mut self) -> SubscriberId {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        self.mailboxes.push((id, VecDeque::new()));
        id
    }

    /// Removes a subscriber and whatever it had not drained.
    pub fn unsubscribe(&mut self, id: SubscriberId) {
        self.mailboxes.retain(|(s, _)| *s != id);
    }

    /// Delivers `event` to every mailbox.
    pub fn publish(&mut self, event: CompositionEvent) {
        for (_, mailbox) in &mut self.mailboxes {
            mailbox.push_back(event.clone());
        }
    }

    /// Takes everything queued for `id`, in publish order.
    pub fn drain(&mut self, id: SubscriberId) -> Vec<CompositionEvent> {
        self.mailboxes
            .iter_mut()
            .find(|(s, _)| *s == id)
            .map(|(_, mailbox)| mailbox.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.mailboxes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_receive_in_publish_order() {
        let mut hub = EventHub::new();
        let a = hub.subscribe();
        let b = hub.subscribe();
        hub.publish(CompositionEvent::CompositionChanged);
        hub.publish(CompositionEvent::MuteStatesChanged);

        let got = hub.drain(a);
        assert_eq!(
            got,
            vec![
                CompositionEvent::CompositionChanged,
                CompositionEvent::MuteStatesChanged
            ]
        );
        // Draining one mailbox leaves the other full.
        assert_eq!(hub.drain(b).len(), 2);
        assert!(hub.drain(a).is_empty());
    }

    #[test]
    fn late_subscribers_miss_earlier_events() {
        let mut hub = EventHub::new();
        hub.publish(CompositionEvent::CompositionChanged);
        let late = hub.subscribe();
        assert!(hub.drain(late).is_empty());
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut hub = EventHub::new();
        let id = hub.subscribe();
        hub.unsubscribe(id);
        hub.publish(CompositionEvent::MuteStatesChanged);
        assert_eq!(hub.subscriber_count(), 0);
        assert!(hub.drain(id).is_empty());
    }
}
