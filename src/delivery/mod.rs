//! Reliable fire-and-forget message delivery.
//!
//! ## Contents
//! - [`MessageDeliverer`] shared deliverer with one background retry task
//! - [`Port`], [`ChannelPort`], [`PortId`], [`PortError`] destination mailboxes
//! - [`Messenger`] messaging address of a process
//! - [`TargetSet`] single or fan-out destinations of one call

mod deliverer;
mod mailbox;
mod target;

pub use deliverer::MessageDeliverer;
pub use target::{ChannelPort, Messenger, Port, PortError, PortId, TargetSet};
