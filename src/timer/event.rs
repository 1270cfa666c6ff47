//! One-shot timed callbacks.

use std::fmt;

use tokio::time::Instant;

/// Handle of an event owned by a [`TimedEventScheduler`](super::TimedEventScheduler).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub(crate) u64);

/// What happens to an event after its callback ran.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Drop the event.
    Delete,
    /// Park the event so its owner can reschedule or take it back.
    Keep,
}

type Callback = Box<dyn FnMut() -> Disposition + Send + 'static>;

/// A callback due at an absolute instant.
pub struct ScheduledEvent {
    pub(crate) due: Instant,
    pub(crate) callback: Callback,
    pub(crate) self_deleting: bool,
}

impl ScheduledEvent {
    /// Creates an event firing `callback` at `due`.
    pub fn new<F>(due: Instant, callback: F) -> Self
    where
        F: FnMut() -> Disposition + Send + 'static,
    {
        Self {
            due,
            callback: Box::new(callback),
            self_deleting: false,
        }
    }

    /// Marks the event as owned by the scheduler: it is dropped after it
    /// fires or is cancelled instead of being parked for its creator.
    #[must_use]
    pub fn self_deleting(mut self) -> Self {
        self.self_deleting = true;
        self
    }

    pub fn due(&self) -> Instant {
        self.due
    }

    pub fn is_self_deleting(&self) -> bool {
        self.self_deleting
    }
}

impl fmt::Debug for ScheduledEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledEvent")
            .field("due", &self.due)
            .field("self_deleting", &self.self_deleting)
            .finish_non_exhaustive()
    }
}
