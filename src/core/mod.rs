//! Shutdown core: process-wide context, the phased sequence and the request dispatcher.
//!
//! The public entry points are [`RegistrarContext`], [`ShutdownOrchestrator`]
//! and [`Registrar`]; everything else supports them.
//!
//! Internal modules:
//! - [`lists`]: category lists shared by the translator and the worker;
//! - [`worker`]: the phase state machine and its escalation ladder;
//! - [`orchestrator`]: start-up, notification translation and the handle;
//! - [`registrar`]: request dispatch and the single shutdown slot.

mod config;
mod context;
mod internal;
mod lists;
mod orchestrator;
mod outcome;
mod phase;
mod registrar;
mod worker;


pub use config::Config;
pub use context::{RegistrarContext, RegistrarContextBuilder};
pub use internal::{InternalEvent, InternalEventKind};
pub use orchestrator::{Collaborators, ShutdownHandle, ShutdownOrchestrator};
pub use outcome::{AbortCause, KillReason, ShutdownOutcome};
pub use phase::ShutdownPhase;
pub use registrar::Registrar;
