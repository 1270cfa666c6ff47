//! # Bus: fan-in of events from every publisher.
//!
//! ```text
//!   shutdown worker ──┐
//!   deliverer       ──┼──► Bus (broadcast ring) ──► subscriber_listener ──► SubscriberSet
//!   subscriber set  ──┘                             (RegistrarContext)
//! ```
//!
//! ## Rules
//! - `publish` never waits; with nobody listening the event is discarded.
//! - One ring of `capacity` slots is shared by all receivers. A receiver that
//!   falls behind sees `RecvError::Lagged` and loses the oldest events.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for [`Event`]s. Clones share the same channel.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus holding up to `capacity` undelivered events (at least one).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, ev: Event) {
        if let Err(broadcast::error::SendError(ev)) = self.tx.send(ev) {
            tracing::trace!(seq = ev.seq, kind = ?ev.kind, "event published without receivers");
        }
    }

    /// Receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
