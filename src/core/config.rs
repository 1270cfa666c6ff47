//! # Registrar runtime configuration.
//!
//! Provides [`Config`], the centralized timing and capacity settings of the
//! shutdown core.
//!
//! Config is used in two ways:
//! 1. **Context creation**: `RegistrarContext::builder(config)` sizes the bus and
//!    configures the deliverer's retry pacing.
//! 2. **Shutdown sequences**: every `ShutdownOrchestrator` reads its timeouts from it.
//!
//! ## Sentinel values
//! - `message_timeout = 0s` → queued messages never expire
//! - `self_process = None` → the registrar does not protect its own process

use std::time::Duration;

use crate::policies::BackoffPolicy;
use crate::roster::ProcessId;

/// Global configuration for the registrar runtime.
///
/// ## Field semantics
/// - `app_quit_timeout`: wait per user/system application before escalating
/// - `background_quit_timeout`: single wait for the whole background phase
/// - `non_app_grace`: pause between SIGTERM and SIGKILL for unregistered processes
/// - `abort_display`: how long a cancellation stays on screen before the sequence ends
/// - `retry_interval`: wake interval of the deliverer while mailboxes are pending
/// - `retry_backoff`: per-mailbox pacing of retries
/// - `message_timeout`: default lifetime of a queued message (`0s` = forever)
/// - `mailbox_capacity`: capacity of ports the registrar creates for itself
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
/// - `self_process`: the registrar's own process, always treated as vital
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum time a user or system application gets to answer a quit request.
    pub app_quit_timeout: Duration,

    /// Time background applications get, all together, to quit.
    pub background_quit_timeout: Duration,

    /// Grace between the termination signal and the forced kill of
    /// processes without a quit protocol.
    pub non_app_grace: Duration,

    /// Time the reason of a cancelled shutdown stays visible unless acknowledged.
    pub abort_display: Duration,

    /// Wake interval of the deliverer's retry task.
    pub retry_interval: Duration,

    /// Pacing of retries per destination.
    pub retry_backoff: BackoffPolicy,

    /// Default lifetime of a message parked in a mailbox.
    ///
    /// - `Duration::ZERO` = never expires
    pub message_timeout: Duration,

    /// Capacity of the ports the registrar allocates (its notification port).
    pub mailbox_capacity: usize,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Process the registrar itself runs in.
    pub self_process: Option<ProcessId>,
}

impl Config {
    /// Returns the default message lifetime as an `Option`.
    ///
    /// - `None` → messages wait until delivered or their destination vanishes
    #[inline]
    pub fn message_timeout(&self) -> Option<Duration> {
        if self.message_timeout == Duration::ZERO {
            None
        } else {
            Some(self.message_timeout)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `app_quit_timeout = 3s`, `background_quit_timeout = 3s`
    /// - `non_app_grace = 500ms`
    /// - `abort_display = 3s`
    /// - `retry_interval = 20ms`, constant backoff of the same length
    /// - `message_timeout = 0s` (never expire)
    /// - `mailbox_capacity = 256`, `bus_capacity = 1024`
    fn default() -> Self {
        let retry_interval = Duration::from_millis(20);
        Self {
            app_quit_timeout: Duration::from_secs(3),
            background_quit_timeout: Duration::from_secs(3),
            non_app_grace: Duration::from_millis(500),
            abort_display: Duration::from_secs(3),
            retry_interval,
            retry_backoff: BackoffPolicy::constant(retry_interval),
            message_timeout: Duration::ZERO,
            mailbox_capacity: 256,
            bus_capacity: 1024,
            self_process: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_message_timeout_means_forever() {
        let mut cfg = Config::default();
        assert_eq!(cfg.message_timeout(), None);
        cfg.message_timeout = Duration::from_secs(1);
        assert_eq!(cfg.message_timeout(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn bus_capacity_never_zero() {
        let cfg = Config {
            bus_capacity: 0,
            ..Config::default()
        };
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }
}
