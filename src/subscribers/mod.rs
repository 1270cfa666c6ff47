//! # Event subscribers for the registrar runtime.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and the built-in [`LogWriter`] (feature `logging`).
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   shutdown worker / deliverer ── publish(Event) ──► Bus ──► subscriber_listener
//!                                                                   │
//!                                                             SubscriberSet
//!                                                          ┌────────┼────────┐
//!                                                          ▼        ▼        ▼
//!                                                      LogWriter  Audit   Custom
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscriber;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub(crate) use set::panic_message;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
