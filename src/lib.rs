//! # registrar
//!
//! **registrar** is the shutdown orchestration core of an operating-system
//! registrar: the service that knows every running application and powers the
//! machine off or reboots it after asking them to quit.
//!
//! It provides three building blocks and the sequence that ties them together:
//! a timed event scheduler, a non-blocking message deliverer with background
//! retries, and a phased shutdown orchestrator.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   Request ──► Registrar ──► ProcessRegistry (collaborator)
//!                   │
//!                   │ ShutDown
//!                   ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  RegistrarContext (process-wide)                                  │
//! │  - TimedEventScheduler (one firing task)                          │
//! │  - MessageDeliverer    (one retry task, per-port mailboxes)       │
//! │  - WatchingService     (roster notifications)                     │
//! │  - Bus ─► SubscriberSet (per-subscriber queues)                   │
//! └──────┬─────────────────────────────┬──────────────────────────────┘
//!        │ timeouts                    │ quit requests, notifications
//!        ▼                             ▼
//! ┌──────────────────────┐      ┌──────────────────────┐
//! │  shutdown worker     │◄─────│  translator          │
//! │  (phase machine)     │ quit │  (notification port) │
//! └──────┬───────────────┘      └──────────────────────┘
//!        │ InternalEvent queue ◄── ShutdownHandle (cancel, kill, decline, reboot)
//!        ▼
//!   Platform (signals, kills, power request) + StatusSurface (progress)
//! ```
//!
//! ### Sequence
//! ```text
//! confirm? ─► sync ─► UserApps ─► SystemApps ─► BackgroundApps ─► OtherProcesses ─► Done
//!                        │             │              │
//!                        └─────────────┴──────────────┴─► Aborted (cancel or refusal)
//!
//! per application: quit request ─► wait(timeout)
//!                    ├─ quit       ─► next
//!                    ├─ debugged   ─► waited for at the end of the phase
//!                    ├─ modal      ─► kill offered to the user
//!                    └─ otherwise  ─► killed
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                            |
//! |-------------------|--------------------------------------------------------------|-----------------------------------------------|
//! | **Timers**        | Absolute-time callbacks, cancellable and re-armable.         | [`TimedEventScheduler`], [`ScheduledEvent`]   |
//! | **Delivery**      | Non-blocking sends with background retry of full mailboxes.  | [`MessageDeliverer`], [`Port`], [`TargetSet`] |
//! | **Shutdown**      | Phased quit sequence with escalation and cancellation.       | [`ShutdownOrchestrator`], [`ShutdownHandle`]  |
//! | **Requests**      | Registration forwarding, watching, broadcast, shutdown.      | [`Registrar`], [`Request`], [`Reply`]         |
//! | **Subscriber API**| Hook into shutdown and delivery events.                      | [`Subscribe`], [`Event`]                      |
//! | **Policies**      | Retry pacing of full mailboxes.                              | [`BackoffPolicy`], [`JitterPolicy`]           |
//! | **Configuration** | Centralized timeouts and capacities.                         | [`Config`]                                    |
//!
//! ## Optional features
//! - `logging`: exports the [`tracing`]-backed `LogWriter` subscriber.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use registrar::{
//!     Collaborators, Config, NullStatus, Platform, PlatformError, ProcessId, ProcessRecord,
//!     ProcessRegistry, RegistrarContext, RegistrationChange, RegistryError, ShutdownOrchestrator,
//!     ShutdownOutcome, ShutdownRequest, ShutdownSnapshot, Signal,
//! };
//!
//! // A machine with nothing running.
//! struct Idle;
//!
//! impl ProcessRegistry for Idle {
//!     fn shutdown_snapshot(&self) -> Result<ShutdownSnapshot, RegistryError> {
//!         Ok(ShutdownSnapshot::default())
//!     }
//!     fn record_for(&self, _: ProcessId) -> Option<ProcessRecord> { None }
//!     fn registered(&self) -> Vec<ProcessRecord> { Vec::new() }
//!     fn is_running(&self, _: ProcessId) -> bool { false }
//!     fn set_shutting_down(&self, _: bool) {}
//!     fn apply(&self, _: RegistrationChange) -> Result<Option<ProcessRecord>, RegistryError> {
//!         Ok(None)
//!     }
//! }
//!
//! impl Platform for Idle {
//!     fn processes(&self) -> Vec<ProcessId> { Vec::new() }
//!     fn send_signal(&self, _: ProcessId, _: Signal) -> Result<(), PlatformError> { Ok(()) }
//!     fn kill(&self, _: ProcessId) -> Result<(), PlatformError> { Ok(()) }
//!     fn shutdown(&self, _reboot: bool) -> Result<(), PlatformError> { Ok(()) }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ctx = RegistrarContext::builder(Config::default()).build()?;
//!
//!     let system = Arc::new(Idle);
//!     let collab = Collaborators {
//!         registry: system.clone(),
//!         platform: system,
//!         status: Arc::new(NullStatus),
//!     };
//!
//!     let handle = ShutdownOrchestrator::start(&ctx, collab, ShutdownRequest::reboot())?;
//!     assert_eq!(handle.wait().await, ShutdownOutcome::Completed { reboot: true });
//!
//!     ctx.shutdown().await;
//!     Ok(())
//! }
//! ```
mod core;
mod delivery;
mod error;
mod events;
mod policies;
mod protocol;
mod roster;
mod subscribers;
mod timer;
mod watching;

#[cfg(test)]
mod testing;

// ---- Public re-exports ----

pub use core::{
    AbortCause, Collaborators, Config, InternalEvent, InternalEventKind, KillReason, Registrar,
    RegistrarContext, RegistrarContextBuilder, ShutdownHandle, ShutdownOrchestrator,
    ShutdownOutcome, ShutdownPhase,
};
pub use delivery::{ChannelPort, MessageDeliverer, Messenger, Port, PortError, PortId, TargetSet};
pub use error::{
    ContextError, DeliveryError, PlatformError, RegistryError, ShutdownError, TimerError,
};
pub use events::{Bus, Event, EventKind};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use protocol::{
    ErrorCode, FIELD_ACTIVE, FIELD_NAME, FIELD_REBOOT, FIELD_SHUTDOWN, FIELD_TEAM, Message,
    MessageCode, Reply, Request, RequestCode, ShutdownRequest, Value, quit_request,
    roster_notification,
};
pub use roster::{
    Category, NullStatus, Platform, ProcessId, ProcessRecord, ProcessRegistry, RegistrationChange,
    RosterEvent, ShutdownSnapshot, Signal, StatusSurface,
};
pub use subscribers::{Subscribe, SubscriberSet};
pub use timer::{Disposition, EventId, ScheduledEvent, TimedEventScheduler};
pub use watching::{EventMask, Watcher, WatcherFilter, WatchingService};

// Optional: expose the tracing-backed subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
