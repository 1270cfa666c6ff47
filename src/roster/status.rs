//! # Status surface collaborator.
//!
//! The shutdown window (or any other front-end) that shows progress. All
//! setters are one-way: the orchestrator never waits for them. User actions
//! on the surface come back through [`ShutdownHandle`](crate::ShutdownHandle).

use async_trait::async_trait;

use super::record::ProcessId;

/// Sink for shutdown progress.
#[async_trait]
pub trait StatusSurface: Send + Sync + 'static {
    /// Replaces the descriptive text.
    fn set_phase_text(&self, text: &str);

    /// Shows the process currently being waited for (`None` clears it).
    fn set_current_process(&self, process: Option<ProcessId>);

    /// Enables the "kill application" control.
    fn set_kill_enabled(&self, enabled: bool);

    /// Enables the "cancel" control (it doubles as "OK" after an abort).
    fn set_cancel_enabled(&self, enabled: bool);

    /// Starts or stops the busy animation.
    fn set_wait_animation(&self, enabled: bool);

    /// Switches to the final "waiting for the machine to go down" layout.
    fn set_wait_for_completion(&self, waiting: bool);

    /// Asks the user to confirm the request before anything is touched.
    ///
    /// Surfaces without a user default to confirming.
    async fn confirm(&self, reboot: bool) -> bool {
        let _ = reboot;
        true
    }
}

/// Surface for headless systems: drops everything, confirms everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullStatus;

impl StatusSurface for NullStatus {
    fn set_phase_text(&self, _text: &str) {}
    fn set_current_process(&self, _process: Option<ProcessId>) {}
    fn set_kill_enabled(&self, _enabled: bool) {}
    fn set_cancel_enabled(&self, _enabled: bool) {}
    fn set_wait_animation(&self, _enabled: bool) {}
    fn set_wait_for_completion(&self, _waiting: bool) {}
}
