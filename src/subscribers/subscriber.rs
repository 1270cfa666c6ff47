//! # Subscribe: consumers of the event stream.
//!
//! The status window's progress log, kill audits and test probes implement
//! [`Subscribe`] and are handed to `RegistrarContextBuilder::with_subscribers`.
//! The [`SubscriberSet`](super::SubscriberSet) gives each of them a bounded queue
//! and a task of its own, so a stuck subscriber never holds up the shutdown worker.
//!
//! ```text
//! Bus ──► subscriber_listener ──► SubscriberSet::emit ──► queue ──► on_event()
//!                                        │ full                        │ panic
//!                                        ▼                             ▼
//!                               SubscriberOverflow            SubscriberPanicked
//! ```
//!
//! ## Example
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use async_trait::async_trait;
//! use registrar::{Event, EventKind, Subscribe};
//!
//! #[derive(Default)]
//! struct KillCounter(AtomicUsize);
//!
//! #[async_trait]
//! impl Subscribe for KillCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::ProcessKilled {
//!             self.0.fetch_add(1, Ordering::Relaxed);
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "kill-counter" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Receives every event published on the registrar's bus, in order.
///
/// `on_event` runs on the subscriber's own task. It should not block the
/// executor and should not panic; a panic costs the subscriber that event.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    async fn on_event(&self, event: &Event);

    /// Label carried by `SubscriberOverflow` and `SubscriberPanicked` events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Events buffered before new ones are dropped for this subscriber.
    /// Values below one are raised to one.
    fn queue_capacity(&self) -> usize {
        256
    }
}
