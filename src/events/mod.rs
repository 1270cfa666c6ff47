//! Shutdown and delivery events.
//!
//! Every decision the shutdown worker takes and every message the deliverer
//! gives up on is published as an [`Event`] on the [`Bus`]. Nothing in the core
//! reads them back; they exist for subscribers (progress logs, audits, tests).
//!
//! ## Publishers
//! - shutdown worker: phases, quit requests, timeouts, kills, aborts, power requests
//! - `MessageDeliverer`: queued and dropped messages
//! - `SubscriberSet`: overflow and panics of subscribers

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
