//! # Process identity and categorized snapshots.
//!
//! A [`ProcessRecord`] is the orchestrator's view of one running application:
//! who it is, where to send it messages, how to show it to the user and which
//! [`Category`] list it belongs to.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::delivery::Messenger;

/// Kernel-level process (team) identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(pub i32);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Partition a tracked process belongs to during shutdown.
///
/// The order of the variants is the order in which the lists are drained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    /// Ordinary applications started by the user.
    User,
    /// Privileged applications shipped with the system (desktop shell, tracker).
    System,
    /// Applications flagged as background services.
    Background,
    /// Processes that are never terminated (kernel, registrar, display server).
    Vital,
}

impl Category {
    /// Returns a short stable label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::User => "user",
            Category::System => "system",
            Category::Background => "background",
            Category::Vital => "vital",
        }
    }
}

/// One tracked process.
#[derive(Clone, Debug)]
pub struct ProcessRecord {
    /// Process identity.
    pub process: ProcessId,
    /// Messaging address of the application's main looper.
    pub messenger: Messenger,
    /// Name shown on the status surface.
    pub name: Arc<str>,
    /// List this record is filed under.
    pub category: Category,
}

impl ProcessRecord {
    /// Creates a record.
    pub fn new(
        process: ProcessId,
        messenger: Messenger,
        name: impl Into<Arc<str>>,
        category: Category,
    ) -> Self {
        Self {
            process,
            messenger,
            name: name.into(),
            category,
        }
    }
}

/// Categorized view of the registry taken when a shutdown starts.
#[derive(Clone, Debug, Default)]
pub struct ShutdownSnapshot {
    /// Ordinary applications, asked first.
    pub user: Vec<ProcessRecord>,
    /// System applications, asked after the user applications are gone.
    pub system: Vec<ProcessRecord>,
    /// Background applications, asked all at once.
    pub background: Vec<ProcessRecord>,
    /// Processes exempt from termination.
    pub vital: HashSet<ProcessId>,
}

/// Roster change broadcast to watchers.
#[derive(Clone, Debug)]
pub enum RosterEvent {
    /// An application completed its registration.
    Launched(ProcessRecord),
    /// An application unregistered.
    Quit(ProcessRecord),
    /// An application became the active one.
    Activated(ProcessRecord),
}

impl RosterEvent {
    /// The record the event is about.
    pub fn record(&self) -> &ProcessRecord {
        match self {
            RosterEvent::Launched(r) | RosterEvent::Quit(r) | RosterEvent::Activated(r) => r,
        }
    }
}
