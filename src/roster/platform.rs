//! # Kernel-facing platform layer.
//!
//! Everything the shutdown core needs from the operating system: enumerating
//! processes, signalling and killing them, probing whether they are stuck, and
//! the final privileged power request.

use crate::error::PlatformError;

use super::record::ProcessId;

/// Signal sent to processes without a graceful quit protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    /// Polite termination request (`SIGTERM`).
    Terminate,
    /// Interrupt (`SIGINT`).
    Interrupt,
}

/// Process and power control.
pub trait Platform: Send + Sync + 'static {
    /// Every process currently alive, registered or not.
    fn processes(&self) -> Vec<ProcessId>;

    /// Sends `signal` to `process`.
    fn send_signal(&self, process: ProcessId, signal: Signal) -> Result<(), PlatformError>;

    /// Terminates `process` immediately. May complete asynchronously.
    fn kill(&self, process: ProcessId) -> Result<(), PlatformError>;

    /// Whether `process` is stopped under an interactive debugger.
    fn is_being_debugged(&self, process: ProcessId) -> bool {
        let _ = process;
        false
    }

    /// Whether `process` appears to wait on a confirmation panel.
    ///
    /// Platforms without such a probe keep the default, which makes every
    /// unresponsive process be treated the same way.
    fn is_showing_modal(&self, process: ProcessId) -> bool {
        let _ = process;
        false
    }

    /// Flushes filesystem caches.
    fn sync_filesystems(&self) {}

    /// Powers the machine off, or reboots it when `reboot` is set.
    ///
    /// Returns only if the request failed (or, in tests, to report success).
    fn shutdown(&self, reboot: bool) -> Result<(), PlatformError>;
}
