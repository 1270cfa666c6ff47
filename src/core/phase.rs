//! Shutdown phases.

use std::fmt;

/// Stage of a shutdown sequence.
///
/// Phases advance in declaration order; `Aborted` can only be entered from
/// the first three phases and is terminal, like `Done`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShutdownPhase {
    UserApps,
    SystemApps,
    BackgroundApps,
    OtherProcesses,
    Aborted,
    Done,
}

impl ShutdownPhase {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownPhase::UserApps => "user_apps",
            ShutdownPhase::SystemApps => "system_apps",
            ShutdownPhase::BackgroundApps => "background_apps",
            ShutdownPhase::OtherProcesses => "other_processes",
            ShutdownPhase::Aborted => "aborted",
            ShutdownPhase::Done => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ShutdownPhase::Aborted | ShutdownPhase::Done)
    }

    /// Whether the sequence may still be cancelled from this phase.
    pub fn is_abortable(&self) -> bool {
        matches!(
            self,
            ShutdownPhase::UserApps | ShutdownPhase::SystemApps | ShutdownPhase::BackgroundApps
        )
    }
}

impl fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
