//! # Destinations: ports, messengers and target sets.
//!
//! A [`Port`] is one bounded mailbox owned by some process. The deliverer only
//! ever calls [`Port::try_send`], which never blocks and answers with one of
//! three outcomes: accepted, full (transient) or gone (permanent).
//!
//! [`ChannelPort`] is the in-process port over a bounded tokio mpsc channel.

use std::fmt;
use std::slice;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::protocol::Message;
use crate::roster::ProcessId;

/// Identity of a port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(pub u32);

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a non-blocking send was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortError {
    /// The mailbox is at capacity. Retry later.
    Full,
    /// The mailbox no longer exists.
    Gone,
}

/// A destination mailbox.
pub trait Port: Send + Sync + 'static {
    /// Identity used to key retry mailboxes.
    fn id(&self) -> PortId;

    /// Hands `message` over without blocking.
    fn try_send(&self, message: Arc<Message>) -> Result<(), PortError>;

    /// Whether the mailbox still exists.
    fn is_valid(&self) -> bool;
}

/// [`Port`] backed by a bounded tokio mpsc channel.
#[derive(Clone, Debug)]
pub struct ChannelPort {
    id: PortId,
    tx: mpsc::Sender<Arc<Message>>,
}

impl ChannelPort {
    /// Creates a port with room for `capacity` messages (minimum 1) and its receiving end.
    pub fn channel(id: PortId, capacity: usize) -> (Self, mpsc::Receiver<Arc<Message>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { id, tx }, rx)
    }
}

impl Port for ChannelPort {
    fn id(&self) -> PortId {
        self.id
    }

    fn try_send(&self, message: Arc<Message>) -> Result<(), PortError> {
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PortError::Full,
            mpsc::error::TrySendError::Closed(_) => PortError::Gone,
        })
    }

    fn is_valid(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Messaging address of a process: its team plus one of its ports.
#[derive(Clone)]
pub struct Messenger {
    team: ProcessId,
    port: Arc<dyn Port>,
}

impl Messenger {
    pub fn new(team: ProcessId, port: Arc<dyn Port>) -> Self {
        Self { team, port }
    }

    /// Process owning the port.
    pub fn team(&self) -> ProcessId {
        self.team
    }

    pub fn port_id(&self) -> PortId {
        self.port.id()
    }

    pub fn port(&self) -> &Arc<dyn Port> {
        &self.port
    }

    pub fn is_valid(&self) -> bool {
        self.port.is_valid()
    }
}

impl fmt::Debug for Messenger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Messenger")
            .field("team", &self.team)
            .field("port", &self.port.id())
            .finish()
    }
}

/// Destinations of one delivery call.
#[derive(Clone, Debug)]
pub enum TargetSet {
    Single(Messenger),
    Many(Vec<Messenger>),
}

impl TargetSet {
    pub fn len(&self) -> usize {
        match self {
            TargetSet::Single(_) => 1,
            TargetSet::Many(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> slice::Iter<'_, Messenger> {
        match self {
            TargetSet::Single(m) => slice::from_ref(m).iter(),
            TargetSet::Many(v) => v.iter(),
        }
    }
}

impl From<Messenger> for TargetSet {
    fn from(m: Messenger) -> Self {
        TargetSet::Single(m)
    }
}

impl From<Vec<Messenger>> for TargetSet {
    fn from(v: Vec<Messenger>) -> Self {
        TargetSet::Many(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageCode;

    #[test]
    fn channel_port_reports_full_then_gone() {
        let (port, rx) = ChannelPort::channel(PortId(1), 1);
        let msg = Arc::new(Message::new(MessageCode::Custom(1)));

        assert_eq!(port.try_send(Arc::clone(&msg)), Ok(()));
        assert_eq!(port.try_send(Arc::clone(&msg)), Err(PortError::Full));
        assert!(port.is_valid());

        drop(rx);
        assert_eq!(port.try_send(msg), Err(PortError::Gone));
        assert!(!port.is_valid());
    }

    #[test]
    fn single_target_iterates_once() {
        let (port, _rx) = ChannelPort::channel(PortId(9), 4);
        let set = TargetSet::from(Messenger::new(ProcessId(3), Arc::new(port)));
        assert_eq!(set.len(), 1);
        let ports: Vec<_> = set.iter().map(Messenger::port_id).collect();
        assert_eq!(ports, vec![PortId(9)]);
    }
}
