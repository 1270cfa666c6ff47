//! # WatchingService: roster notifications for subscribed messengers.
//!
//! Watchers are keyed by the port they listen on; one port watches at most
//! once. Notifications go out through the shared
//! [`MessageDeliverer`](crate::delivery::MessageDeliverer), so a busy watcher
//! never holds up the registrar. Watchers whose port is gone are pruned on
//! the next notification.

use std::sync::{Mutex, MutexGuard};

use crate::delivery::{MessageDeliverer, Messenger, PortId};
use crate::protocol::Message;

use super::filter::{EventMask, WatcherFilter};

/// A subscribed messenger.
#[derive(Clone, Debug)]
pub struct Watcher {
    pub target: Messenger,
    pub events: EventMask,
}

impl Watcher {
    pub fn new(target: Messenger, events: EventMask) -> Self {
        Self { target, events }
    }
}

#[derive(Default)]
pub struct WatchingService {
    watchers: Mutex<Vec<Watcher>>,
}

impl WatchingService {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Watcher>> {
        self.watchers.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("watcher list lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Adds a watcher. Returns `false` if its port already watches.
    pub fn add_watcher(&self, watcher: Watcher) -> bool {
        let mut list = self.lock();
        let port = watcher.target.port_id();
        if list.iter().any(|w| w.target.port_id() == port) {
            return false;
        }
        list.push(watcher);
        true
    }

    /// Removes the watcher listening on `port`. Returns whether there was one.
    pub fn remove_watcher(&self, port: PortId) -> bool {
        let mut list = self.lock();
        let before = list.len();
        list.retain(|w| w.target.port_id() != port);
        list.len() != before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sends `message` to every watcher `filter` accepts. Returns how many
    /// watchers it went to.
    pub fn notify_watchers(
        &self,
        message: &Message,
        filter: WatcherFilter,
        deliverer: &MessageDeliverer,
    ) -> usize {
        let targets: Vec<Messenger> = {
            let mut list = self.lock();
            list.retain(|w| {
                let valid = w.target.is_valid();
                if !valid {
                    tracing::debug!(port = w.target.port_id().0, "pruning stale watcher");
                }
                valid
            });
            list.iter()
                .filter(|w| filter.accepts(w.events))
                .map(|w| w.target.clone())
                .collect()
        };
        if targets.is_empty() {
            return 0;
        }
        let count = targets.len();
        if let Err(err) = deliverer.deliver_message(message.clone(), targets, None) {
            tracing::warn!(error = %err, "watcher notification failed");
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Config;
    use crate::delivery::ChannelPort;
    use crate::events::Bus;
    use crate::protocol::MessageCode;
    use crate::roster::ProcessId;
    use std::sync::Arc;

    fn watcher(id: u32, events: EventMask) -> (Watcher, tokio::sync::mpsc::Receiver<Arc<Message>>) {
        let (port, rx) = ChannelPort::channel(PortId(id), 8);
        let target = Messenger::new(ProcessId(id as i32), Arc::new(port));
        (Watcher::new(target, events), rx)
    }

    #[test]
    fn one_watcher_per_port() {
        let service = WatchingService::new();
        let (a, _rx) = watcher(1, EventMask::QUIT);
        assert!(service.add_watcher(a.clone()));
        assert!(!service.add_watcher(a));
        assert!(service.remove_watcher(PortId(1)));
        assert!(!service.remove_watcher(PortId(1)));
        assert!(service.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn notifications_respect_masks_and_prune_dead_watchers() {
        let deliverer = MessageDeliverer::start(&Config::default(), Bus::new(8)).unwrap();
        let service = WatchingService::new();
        let (launch, mut launch_rx) = watcher(1, EventMask::LAUNCHED);
        let (quit, mut quit_rx) = watcher(2, EventMask::QUIT);
        let (dead, dead_rx) = watcher(3, EventMask::ALL);
        for w in [launch, quit, dead] {
            assert!(service.add_watcher(w));
        }
        drop(dead_rx);

        let msg = Message::new(MessageCode::SomeAppQuit);
        let sent = service.notify_watchers(&msg, WatcherFilter::Events(EventMask::QUIT), &deliverer);

        assert_eq!(sent, 1);
        assert_eq!(service.len(), 2);
        assert_eq!(quit_rx.recv().await.unwrap().what(), MessageCode::SomeAppQuit);
        assert!(launch_rx.try_recv().is_err());
    }
}
