//! Error types used by the registrar core.
//!
//! Each primitive has its own enum so callers can match on exactly what can go wrong:
//!
//! - [`TimerError`]: the timed-event scheduler could not start or has stopped.
//! - [`DeliveryError`]: a message could not be handed to its destination.
//! - [`PlatformError`]: the kernel-facing layer refused a signal, kill or power request.
//! - [`RegistryError`]: the process registry rejected a request.
//! - [`ShutdownError`]: a shutdown sequence could not be started.
//! - [`ContextError`]: the process-wide context could not be built.
//!
//! A cancelled shutdown is **not** an error; see [`ShutdownOutcome`](crate::ShutdownOutcome).
//! All enums provide `as_label` (stable snake_case label for logs/metrics).

use thiserror::Error;

use crate::delivery::PortId;
use crate::roster::ProcessId;

/// # Errors produced by the timed-event scheduler.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// No tokio runtime was available to host the scheduler's background task.
    #[error("no async runtime available for the scheduler")]
    NoRuntime,

    /// The scheduler was stopped; no further events are accepted.
    #[error("scheduler stopped")]
    Stopped,
}

impl TimerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TimerError::NoRuntime => "timer_no_runtime",
            TimerError::Stopped => "timer_stopped",
        }
    }
}

/// # Errors produced by the message deliverer.
///
/// Transient back-pressure never shows up here: full mailboxes are retried
/// silently. Only permanent failures of single-destination sends surface.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// No tokio runtime was available to host the retry task.
    #[error("no async runtime available for the deliverer")]
    NoRuntime,

    /// The only destination of the call no longer exists.
    #[error("destination port {port} is gone")]
    TargetGone {
        /// Port of the vanished destination.
        port: PortId,
    },

    /// The call named no destination at all.
    #[error("no destination given")]
    NoTargets,

    /// The deliverer was stopped.
    #[error("deliverer stopped")]
    Stopped,
}

impl DeliveryError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DeliveryError::NoRuntime => "delivery_no_runtime",
            DeliveryError::TargetGone { .. } => "delivery_target_gone",
            DeliveryError::NoTargets => "delivery_no_targets",
            DeliveryError::Stopped => "delivery_stopped",
        }
    }
}

/// # Errors reported by the platform layer.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The kernel refused the request.
    #[error("platform denied request: {reason}")]
    Denied {
        /// Reason given by the platform.
        reason: String,
    },

    /// The request is not available on this platform.
    #[error("operation unsupported by platform")]
    Unsupported,
}

impl PlatformError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            PlatformError::Denied { .. } => "platform_denied",
            PlatformError::Unsupported => "platform_unsupported",
        }
    }
}

/// # Errors reported by the process registry.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The process is not registered.
    #[error("process {process} is not registered")]
    NotFound {
        /// The unknown process.
        process: ProcessId,
    },

    /// The system is shutting down and refuses new registrations.
    #[error("system is shutting down")]
    ShuttingDown,

    /// The registry could not answer.
    #[error("registry unavailable: {reason}")]
    Unavailable {
        /// Underlying cause.
        reason: String,
    },
}

impl RegistryError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RegistryError::NotFound { .. } => "registry_not_found",
            RegistryError::ShuttingDown => "registry_shutting_down",
            RegistryError::Unavailable { .. } => "registry_unavailable",
        }
    }
}

/// # Errors raised while starting a shutdown sequence.
///
/// Once a sequence runs, every outcome (including cancellation) is reported
/// through [`ShutdownOutcome`](crate::ShutdownOutcome) instead.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShutdownError {
    /// Another shutdown sequence is still active.
    #[error("a shutdown is already in progress")]
    AlreadyInProgress,

    /// A required resource could not be set up.
    #[error("failed to initialize {what}: {reason}")]
    Init {
        /// The resource that failed (scheduler, notification subscription, worker).
        what: &'static str,
        /// Underlying cause.
        reason: String,
    },

    /// The registry could not provide the process snapshot.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl ShutdownError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ShutdownError::AlreadyInProgress => "shutdown_in_progress",
            ShutdownError::Init { .. } => "shutdown_init_failed",
            ShutdownError::Registry(_) => "shutdown_registry_failed",
        }
    }
}

/// # Errors raised while building the process-wide context.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    /// The scheduler failed to start.
    #[error(transparent)]
    Timer(#[from] TimerError),

    /// The deliverer failed to start.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}
