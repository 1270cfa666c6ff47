//! Events consumed by the shutdown worker.

use crate::roster::ProcessId;

use super::phase::ShutdownPhase;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InternalEventKind {
    /// A tracked process went away.
    ProcessQuit,
    /// A process launched during the sequence was filed under its category.
    ProcessLaunched,
    /// The wait armed in `phase` elapsed.
    Timeout,
    /// The user cancelled, or `process` declined to quit.
    Abort,
    /// The user asked to kill `process`.
    KillRequest,
    /// Retry the power request from the safe halt state.
    Reboot,
    /// The debugger state of some process changed.
    DebugStateChanged,
}

/// One entry of the worker's queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InternalEvent {
    pub kind: InternalEventKind,
    pub process: Option<ProcessId>,
    /// Phase the event was raised in. Timeouts from another phase are stale.
    pub phase: ShutdownPhase,
}

impl InternalEvent {
    pub fn new(kind: InternalEventKind, phase: ShutdownPhase) -> Self {
        Self {
            kind,
            process: None,
            phase,
        }
    }

    pub fn with_process(mut self, process: ProcessId) -> Self {
        self.process = Some(process);
        self
    }

    /// Whether this is a timeout raised in a phase other than `current`.
    pub fn is_stale(&self, current: ShutdownPhase) -> bool {
        self.kind == InternalEventKind::Timeout && self.phase != current
    }
}
