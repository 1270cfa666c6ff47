//! How a shutdown sequence ends.

use std::sync::Arc;

use crate::roster::ProcessId;

/// Who cancelled a shutdown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AbortCause {
    /// The user pressed cancel (or declined the confirmation).
    User,
    /// An application refused to quit while user applications were asked.
    Process { process: ProcessId, name: Arc<str> },
}

impl AbortCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbortCause::User => "user",
            AbortCause::Process { .. } => "process",
        }
    }
}

/// Why a process was force-killed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KillReason {
    /// It did not answer its quit request in time.
    Unresponsive,
    /// The user pressed "kill" while it was blocked.
    UserRequest,
    /// It was still running after the background phase.
    Background,
    /// It has no quit protocol and survived the termination signal.
    NonApp,
}

impl KillReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            KillReason::Unresponsive => "unresponsive",
            KillReason::UserRequest => "user_request",
            KillReason::Background => "background",
            KillReason::NonApp => "non_app",
        }
    }
}

/// Final status of a sequence, reported to the requester.
///
/// Cancellation is a normal outcome, not an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every phase ran and the platform accepted the power request.
    Completed { reboot: bool },
    /// The sequence was cancelled and the system keeps running.
    Cancelled(AbortCause),
    /// Every power request failed; the machine waited to be switched off
    /// until its owner stopped the sequence.
    Halted,
    /// The owner stopped the sequence before it finished.
    Stopped,
}

impl ShutdownOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ShutdownOutcome::Cancelled(_))
    }
}
