//! # Registrar request/reply protocol.
//!
//! Requests carry well-known operation codes and typed fields; every request
//! is answered with a [`Reply`]: success, or an error with an [`ErrorCode`].

use crate::delivery::{Messenger, PortId};
use crate::error::{RegistryError, ShutdownError};
use crate::roster::{ProcessId, ProcessRecord};
use crate::watching::EventMask;

use super::message::Message;

/// Well-known operation codes.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestCode {
    AddApp = 0x7267_0001,
    CompleteRegistration = 0x7267_0002,
    RemoveApp = 0x7267_0003,
    ActivateApp = 0x7267_0004,
    ShutDown = 0x7267_0005,
    Broadcast = 0x7267_0006,
    StartWatching = 0x7267_0007,
    StopWatching = 0x7267_0008,
}

/// Flags of a shutdown request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShutdownRequest {
    /// Reboot instead of powering off.
    pub reboot: bool,
    /// Ask the user before doing anything.
    pub confirm: bool,
    /// Reply only once the sequence has ended.
    pub synchronous: bool,
}

impl ShutdownRequest {
    /// Power-off request without confirmation that replies immediately.
    pub fn power_off() -> Self {
        Self::default()
    }

    /// Reboot request without confirmation that replies immediately.
    pub fn reboot() -> Self {
        Self {
            reboot: true,
            ..Self::default()
        }
    }

    pub fn with_confirm(mut self, confirm: bool) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn with_synchronous(mut self, synchronous: bool) -> Self {
        self.synchronous = synchronous;
        self
    }
}

/// Typed registrar request.
#[derive(Clone, Debug)]
pub enum Request {
    /// Pre-register an application.
    AddApp(ProcessRecord),
    /// Complete a pending registration.
    CompleteRegistration { process: ProcessId },
    /// Unregister an application.
    RemoveApp { process: ProcessId },
    /// Make an application the active one.
    ActivateApp { process: ProcessId },
    /// Shut the system down.
    ShutDown(ShutdownRequest),
    /// Send `message` to every registered application except `sender`.
    Broadcast {
        message: Message,
        sender: Option<ProcessId>,
    },
    /// Subscribe `target` to roster notifications matching `events`.
    StartWatching { target: Messenger, events: EventMask },
    /// Drop the subscription of the watcher behind `port`.
    StopWatching { port: PortId },
}

impl Request {
    /// Operation code of this request.
    pub fn code(&self) -> RequestCode {
        match self {
            Request::AddApp(_) => RequestCode::AddApp,
            Request::CompleteRegistration { .. } => RequestCode::CompleteRegistration,
            Request::RemoveApp { .. } => RequestCode::RemoveApp,
            Request::ActivateApp { .. } => RequestCode::ActivateApp,
            Request::ShutDown(_) => RequestCode::ShutDown,
            Request::Broadcast { .. } => RequestCode::Broadcast,
            Request::StartWatching { .. } => RequestCode::StartWatching,
            Request::StopWatching { .. } => RequestCode::StopWatching,
        }
    }
}

/// Error codes carried by [`Reply::Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    BadValue,
    NotFound,
    ShuttingDown,
    ShutdownInProgress,
    ShutdownCancelled,
    ShutdownFailed,
    Unavailable,
}

/// Answer to a [`Request`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reply {
    Success,
    Error(ErrorCode),
}

impl Reply {
    pub fn is_success(&self) -> bool {
        matches!(self, Reply::Success)
    }
}

impl From<&RegistryError> for ErrorCode {
    fn from(err: &RegistryError) -> Self {
        match err {
            RegistryError::NotFound { .. } => ErrorCode::NotFound,
            RegistryError::ShuttingDown => ErrorCode::ShuttingDown,
            RegistryError::Unavailable { .. } => ErrorCode::Unavailable,
        }
    }
}

impl From<&ShutdownError> for ErrorCode {
    fn from(err: &ShutdownError) -> Self {
        match err {
            ShutdownError::AlreadyInProgress => ErrorCode::ShutdownInProgress,
            ShutdownError::Init { .. } => ErrorCode::ShutdownFailed,
            ShutdownError::Registry(inner) => inner.into(),
        }
    }
}
