//! Roster watching: who gets told about launches, quits and activations.
//!
//! ## Contents
//! - [`EventMask`] events a watcher subscribed to
//! - [`WatcherFilter`] selection of watchers for one notification
//! - [`Watcher`], [`WatchingService`] registration and fan-out

mod filter;
mod service;

pub use filter::{EventMask, WatcherFilter};
pub use service::{Watcher, WatchingService};
