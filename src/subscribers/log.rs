//! # LogWriter: renders events as `tracing` records.
//!
//! Sequence events are logged at `info`, escalations (timeouts, kills, aborts,
//! platform failures) at `warn`, delivery bookkeeping at `debug`.
//!
//! ## Example output (with `tracing_subscriber::fmt`)
//! ```text
//! INFO registrar: phase entered phase=user_apps tracked=3
//! INFO registrar: quit requested pid=101 name="StyledEdit"
//! WARN registrar: process timed out pid=103 name="Tracker" timeout_ms=3000
//! WARN registrar: process killed pid=103 reason=unresponsive
//! INFO registrar: shutdown completed mode="power_off"
//! ```

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let pid = e.process.map(|p| p.0);
        let name = e.name.as_deref().unwrap_or("");
        let phase = e.phase.map(|p| p.as_str()).unwrap_or("");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::ShutdownRequested => {
                info!(target: "registrar", seq = e.seq, mode = reason, "shutdown requested");
            }
            EventKind::PhaseEntered => {
                info!(target: "registrar", seq = e.seq, phase, tracked = e.count, "phase entered");
            }
            EventKind::QuitRequested => {
                info!(target: "registrar", seq = e.seq, pid, name, phase, "quit requested");
            }
            EventKind::ProcessQuit => {
                info!(target: "registrar", seq = e.seq, pid, phase, "process quit");
            }
            EventKind::ProcessTimedOut => {
                warn!(target: "registrar", seq = e.seq, pid, name, phase, timeout_ms = e.delay_ms, "process timed out");
            }
            EventKind::ProcessBlocked => {
                warn!(target: "registrar", seq = e.seq, pid, name, phase, "process blocked, kill offered");
            }
            EventKind::DebuggedWait => {
                info!(target: "registrar", seq = e.seq, pid, phase, "waiting for debugged process");
            }
            EventKind::ProcessKilled => {
                let kill = e.kill_reason.map(|k| k.as_str()).unwrap_or("");
                warn!(target: "registrar", seq = e.seq, pid, phase, reason = kill, error = reason, "process killed");
            }
            EventKind::ShutdownAborted => {
                warn!(target: "registrar", seq = e.seq, pid, name, phase, cause = reason, "shutdown aborted");
            }
            EventKind::ShutdownCompleted => {
                info!(target: "registrar", seq = e.seq, mode = reason, "shutdown completed");
            }
            EventKind::PlatformShutdownFailed => {
                warn!(target: "registrar", seq = e.seq, error = reason, "platform shutdown failed");
            }
            EventKind::SafeHaltEntered => {
                warn!(target: "registrar", seq = e.seq, "safe halt entered");
            }
            EventKind::MessageQueued => {
                debug!(target: "registrar", seq = e.seq, port = e.port.map(|p| p.0), pending = e.count, "message queued for retry");
            }
            EventKind::MessageDropped => {
                warn!(target: "registrar", seq = e.seq, port = e.port.map(|p| p.0), dropped = e.count, reason, "message dropped");
            }
            EventKind::SubscriberOverflow => {
                warn!(target: "registrar", seq = e.seq, subscriber = name, reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                warn!(target: "registrar", seq = e.seq, subscriber = name, info = reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
