//! # Runtime events emitted by the shutdown core.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Subscriber events**: problems inside the observability fan-out itself
//! - **Sequence events**: phase transitions, abort and completion of a shutdown
//! - **Process events**: what happened to one tracked process (quit, timed out, killed)
//! - **Delivery events**: messages parked for retry or given up on
//!
//! The [`Event`] struct carries additional metadata such as timestamps, process
//! identity, phase, reasons, and retry delays.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use registrar::{Event, EventKind, ProcessId, ShutdownPhase};
//!
//! let ev = Event::new(EventKind::ProcessTimedOut)
//!     .with_process(ProcessId(42))
//!     .with_name("Tracker")
//!     .with_phase(ShutdownPhase::UserApps);
//!
//! assert_eq!(ev.kind, EventKind::ProcessTimedOut);
//! assert_eq!(ev.process, Some(ProcessId(42)));
//! assert_eq!(ev.name.as_deref(), Some("Tracker"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::core::{KillReason, ShutdownPhase};
use crate::delivery::PortId;
use crate::roster::ProcessId;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `name`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `name`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Sequence events ===
    /// A shutdown sequence was accepted.
    ///
    /// Sets:
    /// - `reason`: "reboot" or "power_off"
    ShutdownRequested,

    /// The sequence entered a new phase.
    ///
    /// Sets:
    /// - `phase`: the phase entered
    /// - `count`: number of processes tracked for it
    PhaseEntered,

    /// The sequence was cancelled.
    ///
    /// Sets:
    /// - `phase`: phase that was active
    /// - `process`/`name`: refusing process, if a process caused it
    /// - `reason`: "user" or "process"
    ShutdownAborted,

    /// Every phase finished and the platform accepted the power request.
    ///
    /// Sets:
    /// - `reason`: "reboot" or "power_off"
    ShutdownCompleted,

    /// The platform refused a power request.
    ///
    /// Sets:
    /// - `reason`: platform error
    PlatformShutdownFailed,

    /// Both power requests failed; the machine waits to be switched off.
    SafeHaltEntered,

    // === Process events ===
    /// A quit request was sent.
    ///
    /// Sets:
    /// - `process`, `name`, `phase`
    QuitRequested,

    /// A tracked process went away.
    ///
    /// Sets:
    /// - `process`, `phase`
    ProcessQuit,

    /// A process did not quit within its timeout.
    ///
    /// Sets:
    /// - `process`, `name`, `phase`
    /// - `delay_ms`: the timeout that elapsed
    ProcessTimedOut,

    /// A process looks blocked behind a confirmation panel; the kill control is offered.
    ///
    /// Sets:
    /// - `process`, `name`, `phase`
    ProcessBlocked,

    /// The sequence waits for a process stopped under a debugger.
    ///
    /// Sets:
    /// - `process`, `phase`
    DebuggedWait,

    /// A process was force-killed.
    ///
    /// Sets:
    /// - `process`, `phase`
    /// - `kill_reason`: why it was killed
    /// - `reason`: platform error, if the kill call failed
    ProcessKilled,

    // === Delivery events ===
    /// A message found its destination full and was parked for retry.
    ///
    /// Sets:
    /// - `port`: destination
    /// - `count`: messages now pending for it
    MessageQueued,

    /// Pending messages were given up on.
    ///
    /// Sets:
    /// - `port`: destination
    /// - `count`: messages dropped
    /// - `reason`: "gone" or "expired"
    MessageDropped,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Process the event is about.
    pub process: Option<ProcessId>,
    /// Display name of the process, or the subscriber name.
    pub name: Option<Arc<str>>,
    /// Phase active when the event was raised.
    pub phase: Option<ShutdownPhase>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Timeout or retry delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Destination port of a delivery event.
    pub port: Option<PortId>,
    /// Why a process was killed.
    pub kill_reason: Option<KillReason>,
    /// Number of items concerned (processes, messages).
    pub count: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            process: None,
            name: None,
            phase: None,
            reason: None,
            delay_ms: None,
            port: None,
            kill_reason: None,
            count: None,
        }
    }

    #[inline]
    pub fn with_process(mut self, process: ProcessId) -> Self {
        self.process = Some(process);
        self
    }

    #[inline]
    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[inline]
    pub fn with_phase(mut self, phase: ShutdownPhase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    #[inline]
    pub fn with_port(mut self, port: PortId) -> Self {
        self.port = Some(port);
        self
    }

    #[inline]
    pub fn with_kill_reason(mut self, reason: KillReason) -> Self {
        self.kill_reason = Some(reason);
        self
    }

    #[inline]
    pub fn with_count(mut self, n: usize) -> Self {
        self.count = Some(n.min(u32::MAX as usize) as u32);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_name(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_name(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    #[inline]
    pub fn is_subscriber_panic(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberPanicked)
    }
}
