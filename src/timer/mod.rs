//! Timed one-shot callbacks.
//!
//! ## Contents
//! - [`TimedEventScheduler`] process-wide queue with one firing task
//! - [`ScheduledEvent`], [`EventId`], [`Disposition`] events and their lifecycle

mod event;
mod scheduler;

pub use event::{Disposition, EventId, ScheduledEvent};
pub use scheduler::TimedEventScheduler;
