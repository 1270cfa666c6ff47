//! Collaborators of the shutdown core.
//!
//! The core never registers processes, draws windows or talks to the kernel
//! itself. It consumes these interfaces instead:
//! - [`ProcessRegistry`] categorized process snapshots and liveness;
//! - [`Platform`] signals, kills, stuck-process probes and the power request;
//! - [`StatusSurface`] one-way progress display.

mod platform;
mod record;
mod registry;
mod status;

pub use platform::{Platform, Signal};
pub use record::{Category, ProcessId, ProcessRecord, RosterEvent, ShutdownSnapshot};
pub use registry::{ProcessRegistry, RegistrationChange};
pub use status::{NullStatus, StatusSurface};
