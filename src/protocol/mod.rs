//! Wire protocol: typed messages for applications and requests for the registrar.
//!
//! ## Contents
//! - [`Message`], [`Value`], [`MessageCode`] payloads handed to the deliverer
//! - [`Request`], [`Reply`], [`RequestCode`], [`ErrorCode`] registrar operations
//! - [`ShutdownRequest`] flags of a shutdown request

mod message;
mod request;

pub use message::{
    FIELD_ACTIVE, FIELD_NAME, FIELD_REBOOT, FIELD_SHUTDOWN, FIELD_TEAM, Message, MessageCode,
    Value, quit_request, roster_notification,
};
pub use request::{ErrorCode, Reply, Request, RequestCode, ShutdownRequest};
