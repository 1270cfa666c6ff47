//! # Process registry collaborator.
//!
//! The registry owns application registration bookkeeping. The shutdown core
//! only reads categorized snapshots from it, checks liveness, and toggles the
//! "shutting down" flag that makes it refuse new launches.

use crate::error::RegistryError;

use super::record::{ProcessId, ProcessRecord, ShutdownSnapshot};

/// Registration request forwarded by the [`Registrar`](crate::Registrar).
#[derive(Clone, Debug)]
pub enum RegistrationChange {
    /// Pre-register an application.
    Add(ProcessRecord),
    /// Finish the registration of a pre-registered application.
    Complete(ProcessId),
    /// Unregister an application.
    Remove(ProcessId),
    /// Mark an application as the active one.
    Activate(ProcessId),
}

/// Source of process lists and identities.
///
/// Implementations must be cheap and non-blocking: the orchestrator calls them
/// from its worker and notification tasks.
pub trait ProcessRegistry: Send + Sync + 'static {
    /// Builds the categorized lists for a new shutdown sequence.
    fn shutdown_snapshot(&self) -> Result<ShutdownSnapshot, RegistryError>;

    /// Looks up a fully registered application.
    fn record_for(&self, process: ProcessId) -> Option<ProcessRecord>;

    /// Every fully registered application.
    fn registered(&self) -> Vec<ProcessRecord>;

    /// Whether the process still exists.
    fn is_running(&self, process: ProcessId) -> bool;

    /// Tells the registry whether a shutdown is in progress.
    ///
    /// While `true`, the registry should refuse new registrations.
    fn set_shutting_down(&self, shutting_down: bool);

    /// Applies a registration change and returns the affected record.
    fn apply(&self, change: RegistrationChange) -> Result<Option<ProcessRecord>, RegistryError>;
}
