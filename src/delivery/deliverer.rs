//! # MessageDeliverer: fire-and-forget delivery that survives full mailboxes.
//!
//! [`MessageDeliverer::deliver_message`] never blocks. Every destination gets
//! one immediate non-blocking send; destinations that answer "full" get a
//! private FIFO mailbox that a single background task retries until it drains.
//!
//! ## Architecture
//! ```text
//! deliver_message(msg, targets)
//!     │
//!     ├── target has mailbox? ──yes──► append behind pending entries (FIFO)
//!     │        │no
//!     │        ▼
//!     │   try_send ──Ok──► done
//!     │        ├──Full──► new Mailbox ──► notify retry task
//!     │        └──Gone──► error only if targets.len() == 1
//!     │
//! retry task (one per deliverer):
//!     idle ── notified ──► loop { sleep(retry_interval); flush due mailboxes }
//!                           drained/gone mailboxes are removed
//! ```
//!
//! ## Rules
//! - The mailbox map is guarded by one mutex, never held across an `.await`.
//! - A payload fanned out to several full destinations is shared by `Arc`.
//! - A destination that vanishes while queued is dropped with a
//!   `MessageDropped` event and a warning; the caller is never told.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::Config;
use crate::error::DeliveryError;
use crate::events::{Bus, Event, EventKind};
use crate::policies::BackoffPolicy;
use crate::protocol::Message;

use super::mailbox::{Mailbox, MailboxStatus, QueuedMessage};
use super::target::{PortError, PortId, TargetSet};

struct Shared {
    mailboxes: Mutex<HashMap<PortId, Mailbox>>,
    wake: Notify,
    interval: Duration,
    backoff: BackoffPolicy,
    bus: Bus,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, HashMap<PortId, Mailbox>> {
        self.mailboxes.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("deliverer mailbox lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// One retry pass. Returns whether mailboxes remain.
    fn retry_pending(&self) -> bool {
        let now = Instant::now();
        let mut dropped = Vec::new();
        let remaining = {
            let mut map = self.lock();
            map.retain(|port, mailbox| {
                if !mailbox.is_due(now) {
                    return true;
                }
                let pending = mailbox.len();
                let res = mailbox.flush(now, &self.backoff);
                if res.expired > 0 {
                    dropped.push((*port, res.expired, "expired"));
                }
                match res.status {
                    MailboxStatus::Drained => false,
                    MailboxStatus::Blocked => true,
                    MailboxStatus::Gone => {
                        dropped.push((*port, pending - res.sent - res.expired, "gone"));
                        false
                    }
                }
            });
            !map.is_empty()
        };

        for (port, count, reason) in dropped {
            tracing::warn!(port = port.0, count, reason, "dropping undeliverable messages");
            self.bus.publish(
                Event::new(EventKind::MessageDropped)
                    .with_port(port)
                    .with_count(count)
                    .with_reason(reason),
            );
        }
        remaining
    }
}

/// Shared reliable deliverer. Cheap to clone.
#[derive(Clone)]
pub struct MessageDeliverer {
    shared: Arc<Shared>,
    token: CancellationToken,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl MessageDeliverer {
    /// Spawns the retry task on the current tokio runtime.
    pub fn start(config: &Config, bus: Bus) -> Result<Self, DeliveryError> {
        let handle =
            tokio::runtime::Handle::try_current().map_err(|_| DeliveryError::NoRuntime)?;

        let shared = Arc::new(Shared {
            mailboxes: Mutex::new(HashMap::new()),
            wake: Notify::new(),
            interval: config.retry_interval.max(Duration::from_millis(1)),
            backoff: config.retry_backoff,
            bus,
        });
        let token = CancellationToken::new();
        let worker = handle.spawn(Self::run(Arc::clone(&shared), token.clone()));

        Ok(Self {
            shared,
            token,
            worker: Arc::new(Mutex::new(Some(worker))),
        })
    }

    async fn run(shared: Arc<Shared>, token: CancellationToken) {
        loop {
            let idle = shared.lock().is_empty();
            if idle {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = shared.wake.notified() => {}
                }
            }
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(shared.interval) => {}
            }
            shared.retry_pending();
        }
    }

    /// Delivers `message` to every target without blocking.
    ///
    /// Full destinations are retried in the background; `timeout` bounds how
    /// long the message may wait there (`None` = forever).
    ///
    /// # Errors
    /// - [`DeliveryError::NoTargets`] when `targets` is empty;
    /// - [`DeliveryError::TargetGone`] when the only target no longer exists;
    /// - [`DeliveryError::Stopped`] after [`stop`](Self::stop).
    pub fn deliver_message(
        &self,
        message: Message,
        targets: impl Into<TargetSet>,
        timeout: Option<Duration>,
    ) -> Result<(), DeliveryError> {
        if self.token.is_cancelled() {
            return Err(DeliveryError::Stopped);
        }
        let targets = targets.into();
        if targets.is_empty() {
            return Err(DeliveryError::NoTargets);
        }

        let message = Arc::new(message);
        let mut entry: Option<Arc<QueuedMessage>> = None;
        let mut gone = None;
        let mut queued = Vec::new();
        let now = Instant::now();
        {
            let mut map = self.shared.lock();
            for target in targets.iter() {
                let port = target.port_id();
                if let Some(mailbox) = map.get_mut(&port) {
                    let e = entry
                        .get_or_insert_with(|| Arc::new(QueuedMessage::new(Arc::clone(&message), timeout)));
                    mailbox.push(Arc::clone(e));
                    queued.push((port, mailbox.len()));
                    continue;
                }
                match target.port().try_send(Arc::clone(&message)) {
                    Ok(()) => {}
                    Err(PortError::Full) => {
                        let e = entry
                            .get_or_insert_with(|| Arc::new(QueuedMessage::new(Arc::clone(&message), timeout)));
                        let mut mailbox = Mailbox::new(target.clone());
                        mailbox.push(Arc::clone(e));
                        mailbox.blocked(now, &self.shared.backoff);
                        map.insert(port, mailbox);
                        queued.push((port, 1));
                    }
                    Err(PortError::Gone) => {
                        tracing::debug!(port = port.0, "destination gone");
                        gone = Some(port);
                    }
                }
            }
        }

        if !queued.is_empty() {
            for (port, pending) in queued {
                self.shared.bus.publish(
                    Event::new(EventKind::MessageQueued)
                        .with_port(port)
                        .with_count(pending),
                );
            }
            self.shared.wake.notify_one();
        }

        match gone {
            Some(port) if targets.len() == 1 => Err(DeliveryError::TargetGone { port }),
            _ => Ok(()),
        }
    }

    /// Messages waiting for `port`.
    pub fn pending(&self, port: PortId) -> usize {
        self.shared.lock().get(&port).map_or(0, Mailbox::len)
    }

    /// Destinations with a retry mailbox.
    pub fn mailbox_count(&self) -> usize {
        self.shared.lock().len()
    }

    /// Stops the retry task. Pending mailboxes are discarded.
    pub async fn stop(&self) {
        self.token.cancel();
        let worker = match self.worker.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(worker) = worker {
            let _ = worker.await;
        }
        self.shared.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{ChannelPort, Messenger};
    use crate::protocol::MessageCode;
    use crate::roster::ProcessId;
    use crate::testing::ScriptedPort;
    use tokio::sync::mpsc;

    fn deliverer() -> (MessageDeliverer, Bus) {
        let bus = Bus::new(64);
        let d = MessageDeliverer::start(&Config::default(), bus.clone()).unwrap();
        (d, bus)
    }

    fn channel(id: u32, capacity: usize) -> (Messenger, mpsc::Receiver<Arc<Message>>) {
        let (port, rx) = ChannelPort::channel(PortId(id), capacity);
        (Messenger::new(ProcessId(id as i32), Arc::new(port)), rx)
    }

    fn msg(code: u32) -> Message {
        Message::new(MessageCode::Custom(code))
    }

    #[tokio::test(start_paused = true)]
    async fn fan_out_ignores_gone_destinations() {
        let (d, _bus) = deliverer();
        let mut live = Vec::new();
        let mut targets = Vec::new();
        for id in 0..5 {
            let (m, rx) = channel(id, 4);
            targets.push(m);
            if id == 1 || id == 3 {
                drop(rx);
            } else {
                live.push(rx);
            }
        }

        assert_eq!(d.deliver_message(msg(7), targets, None), Ok(()));
        for rx in &mut live {
            assert_eq!(rx.recv().await.unwrap().what(), MessageCode::Custom(7));
        }
        assert_eq!(d.mailbox_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn single_gone_destination_is_reported() {
        let (d, _bus) = deliverer();
        let (m, rx) = channel(5, 4);
        drop(rx);
        assert_eq!(
            d.deliver_message(msg(1), m, None),
            Err(DeliveryError::TargetGone { port: PortId(5) })
        );
        assert_eq!(
            d.deliver_message(msg(1), Vec::<Messenger>::new(), None),
            Err(DeliveryError::NoTargets)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn full_destination_is_retried_until_delivered() {
        let (d, _bus) = deliverer();
        let port = Arc::new(ScriptedPort::new(PortId(3), 4));
        let target = Messenger::new(ProcessId(3), port.clone());
        let (other, mut other_rx) = channel(4, 4);

        d.deliver_message(msg(9), vec![target, other], None).unwrap();
        assert_eq!(other_rx.recv().await.unwrap().what(), MessageCode::Custom(9));
        assert_eq!(d.pending(PortId(3)), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(port.received(), vec![MessageCode::Custom(9)]);
        assert_eq!(port.attempts(), 5);
        assert_eq!(d.mailbox_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn later_messages_queue_behind_pending_ones() {
        let (d, _bus) = deliverer();
        let port = Arc::new(ScriptedPort::new(PortId(8), 2));
        let target = Messenger::new(ProcessId(8), port.clone());

        d.deliver_message(msg(1), target.clone(), None).unwrap();
        d.deliver_message(msg(2), target.clone(), None).unwrap();
        assert_eq!(d.pending(PortId(8)), 2);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            port.received(),
            vec![MessageCode::Custom(1), MessageCode::Custom(2)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn expired_messages_are_dropped() {
        let (d, bus) = deliverer();
        let mut events = bus.subscribe();
        let port = Arc::new(ScriptedPort::new(PortId(2), u32::MAX));
        let target = Messenger::new(ProcessId(2), port.clone());

        d.deliver_message(msg(1), target, Some(Duration::from_millis(100)))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(d.mailbox_count(), 0);
        assert!(port.received().is_empty());
        let mut saw_drop = false;
        while let Ok(ev) = events.try_recv() {
            if ev.kind == EventKind::MessageDropped {
                assert_eq!(ev.reason.as_deref(), Some("expired"));
                saw_drop = true;
            }
        }
        assert!(saw_drop);
    }

    #[tokio::test(start_paused = true)]
    async fn destination_vanishing_during_retry_is_dropped() {
        let (d, bus) = deliverer();
        let mut events = bus.subscribe();
        let port = Arc::new(ScriptedPort::new(PortId(6), u32::MAX));
        let target = Messenger::new(ProcessId(6), port.clone());

        d.deliver_message(msg(1), target, None).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        port.close();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(d.mailbox_count(), 0);
        let dropped = std::iter::from_fn(|| events.try_recv().ok())
            .find(|ev| ev.kind == EventKind::MessageDropped)
            .unwrap();
        assert_eq!(dropped.port, Some(PortId(6)));
        assert_eq!(dropped.count, Some(1));
        assert_eq!(dropped.reason.as_deref(), Some("gone"));
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_deliverer_refuses_messages() {
        let (d, _bus) = deliverer();
        let (m, _rx) = channel(1, 1);
        d.stop().await;
        assert_eq!(d.deliver_message(msg(1), m, None), Err(DeliveryError::Stopped));
    }
}
