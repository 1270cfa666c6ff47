//! # Messages exchanged with applications.
//!
//! A [`Message`] is an immutable bag of named, typed fields tagged with a
//! [`MessageCode`]. Once handed to the deliverer it is shared behind an `Arc`
//! and never mutated again.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::roster::ProcessRecord;

/// Field holding the process id a notification is about.
pub const FIELD_TEAM: &str = "be:team";
/// Field holding the display name of the process.
pub const FIELD_NAME: &str = "be:name";
/// Set on quit requests that are part of a system shutdown.
pub const FIELD_SHUTDOWN: &str = "_shutdown_";
/// Set on shutdown quit requests when the machine will reboot.
pub const FIELD_REBOOT: &str = "_reboot_";
/// Set on activation messages.
pub const FIELD_ACTIVE: &str = "active";

/// What a message is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageCode {
    /// Asks an application to quit.
    QuitRequested,
    /// Watcher notification: an application was launched.
    SomeAppLaunched,
    /// Watcher notification: an application quit.
    SomeAppQuit,
    /// Watcher notification: an application was activated.
    SomeAppActivated,
    /// Tells an application it became active.
    AppActivated,
    /// Application-defined code (broadcasts).
    Custom(u32),
}

/// Typed field value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Str(Arc<str>),
}

/// Typed asynchronous message.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    what: MessageCode,
    fields: BTreeMap<String, Value>,
}

impl Message {
    /// Creates an empty message.
    pub fn new(what: MessageCode) -> Self {
        Self {
            what,
            fields: BTreeMap::new(),
        }
    }

    /// The message code.
    pub fn what(&self) -> MessageCode {
        self.what
    }

    /// Attaches a field, replacing any previous value under `name`.
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Attaches a boolean field.
    pub fn with_bool(self, name: impl Into<String>, value: bool) -> Self {
        self.with(name, Value::Bool(value))
    }

    /// Attaches a 32-bit integer field.
    pub fn with_i32(self, name: impl Into<String>, value: i32) -> Self {
        self.with(name, Value::Int32(value))
    }

    /// Attaches a string field.
    pub fn with_str(self, name: impl Into<String>, value: impl Into<Arc<str>>) -> Self {
        self.with(name, Value::Str(value.into()))
    }

    /// Raw field lookup.
    pub fn find(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn find_bool(&self, name: &str) -> Option<bool> {
        match self.find(name)? {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn find_i32(&self, name: &str) -> Option<i32> {
        match self.find(name)? {
            Value::Int32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn find_str(&self, name: &str) -> Option<&str> {
        match self.find(name)? {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Quit request sent to applications during shutdown.
pub fn quit_request(reboot: bool) -> Message {
    Message::new(MessageCode::QuitRequested)
        .with_bool(FIELD_SHUTDOWN, true)
        .with_bool(FIELD_REBOOT, reboot)
}

/// Watcher notification describing `record`.
pub fn roster_notification(what: MessageCode, record: &ProcessRecord) -> Message {
    Message::new(what)
        .with_i32(FIELD_TEAM, record.process.0)
        .with_str(FIELD_NAME, Arc::clone(&record.name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_lookup_rejects_mismatched_types() {
        let msg = Message::new(MessageCode::Custom(7))
            .with_i32("count", 3)
            .with_str("label", "x");

        assert_eq!(msg.find_i32("count"), Some(3));
        assert_eq!(msg.find_bool("count"), None);
        assert_eq!(msg.find_str("label"), Some("x"));
        assert_eq!(msg.find_i32("missing"), None);
        assert_eq!(msg.len(), 2);
    }

    #[test]
    fn quit_request_is_marked_as_shutdown() {
        let msg = quit_request(true);
        assert_eq!(msg.what(), MessageCode::QuitRequested);
        assert_eq!(msg.find_bool(FIELD_SHUTDOWN), Some(true));
        assert_eq!(msg.find_bool(FIELD_REBOOT), Some(true));
    }
}
