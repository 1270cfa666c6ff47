//! # RegistrarContext: the process-wide services, created once at startup.
//!
//! The context owns the long-lived primitives every collaborator shares and
//! is passed explicitly (as `Arc<RegistrarContext>`) to whoever needs them.
//!
//! ## Architecture
//! ```text
//! RegistrarContext::builder(config).with_subscribers(subs).build()
//!     ├─► Bus (broadcast)
//!     ├─► TimedEventScheduler  ── one firing task
//!     ├─► MessageDeliverer     ── one retry task
//!     ├─► WatchingService
//!     └─► subscriber_listener: Bus.subscribe() ─► SubscriberSet::emit(&Event)
//!
//! shutdown(): cancel token ─► stop scheduler ─► stop deliverer ─► drain subscribers
//! ```
//!
//! ## Rules
//! - At most one shutdown sequence holds the [`ShutdownClaim`] at a time.
//! - After [`RegistrarContext::shutdown`] no sequence can start.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::delivery::{ChannelPort, MessageDeliverer, PortId};
use crate::error::ContextError;
use crate::events::Bus;
use crate::protocol::{Message, MessageCode, roster_notification};
use crate::roster::RosterEvent;
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::timer::TimedEventScheduler;
use crate::watching::{EventMask, WatcherFilter, WatchingService};

use super::config::Config;

/// First id handed out for ports the registrar allocates for itself.
const FIRST_LOCAL_PORT: u32 = 0x8000_0000;

/// Builder for [`RegistrarContext`].
pub struct RegistrarContextBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl RegistrarContextBuilder {
    /// Sets event subscribers for observability.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Starts the shared services on the current tokio runtime.
    ///
    /// # Errors
    /// Fails if the scheduler or the deliverer cannot start (no runtime).
    pub fn build(self) -> Result<Arc<RegistrarContext>, ContextError> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let scheduler = TimedEventScheduler::start()?;
        let deliverer = MessageDeliverer::start(&self.cfg, bus.clone())?;
        let token = CancellationToken::new();

        let subs = SubscriberSet::new(self.subscribers, bus.clone());
        let listener = subscriber_listener(bus.subscribe(), subs, token.clone());

        Ok(Arc::new(RegistrarContext {
            cfg: self.cfg,
            bus,
            scheduler,
            deliverer,
            watching: WatchingService::new(),
            token,
            next_port: AtomicU32::new(FIRST_LOCAL_PORT),
            shutdown_active: AtomicBool::new(false),
            listener: std::sync::Mutex::new(Some(listener)),
        }))
    }
}

/// Forwards bus events to the subscriber set until cancelled, then drains.
fn subscriber_listener(
    mut rx: broadcast::Receiver<crate::events::Event>,
    subs: SubscriberSet,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                ev = rx.recv() => match ev {
                    Ok(ev) => subs.emit(&ev),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "subscriber listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = token.cancelled() => break,
            }
        }
        while let Ok(ev) = rx.try_recv() {
            subs.emit(&ev);
        }
        subs.shutdown().await;
    })
}

/// Shared services of one registrar instance.
pub struct RegistrarContext {
    cfg: Config,
    bus: Bus,
    scheduler: TimedEventScheduler,
    deliverer: MessageDeliverer,
    watching: WatchingService,
    token: CancellationToken,
    next_port: AtomicU32,
    shutdown_active: AtomicBool,
    listener: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl RegistrarContext {
    /// Creates a builder with the given configuration.
    pub fn builder(cfg: Config) -> RegistrarContextBuilder {
        RegistrarContextBuilder {
            cfg,
            subscribers: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn scheduler(&self) -> &TimedEventScheduler {
        &self.scheduler
    }

    pub fn deliverer(&self) -> &MessageDeliverer {
        &self.deliverer
    }

    pub fn watching(&self) -> &WatchingService {
        &self.watching
    }

    /// Token cancelled by [`shutdown`](Self::shutdown); sequences derive theirs from it.
    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Creates a port for the registrar's own use.
    pub fn allocate_port(&self) -> (ChannelPort, mpsc::Receiver<Arc<Message>>) {
        let id = PortId(self.next_port.fetch_add(1, Ordering::Relaxed));
        ChannelPort::channel(id, self.cfg.mailbox_capacity)
    }

    /// Tells the watchers subscribed to this kind of roster change.
    pub fn notify_watchers(&self, event: &RosterEvent) -> usize {
        let (what, mask) = match event {
            RosterEvent::Launched(_) => (MessageCode::SomeAppLaunched, EventMask::LAUNCHED),
            RosterEvent::Quit(_) => (MessageCode::SomeAppQuit, EventMask::QUIT),
            RosterEvent::Activated(_) => (MessageCode::SomeAppActivated, EventMask::ACTIVATED),
        };
        let message = roster_notification(what, event.record());
        self.watching
            .notify_watchers(&message, WatcherFilter::Events(mask), &self.deliverer)
    }

    /// Reserves the single shutdown slot.
    pub(crate) fn claim_shutdown(self: &Arc<Self>) -> Option<ShutdownClaim> {
        if self.token.is_cancelled() {
            return None;
        }
        self.shutdown_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ShutdownClaim {
                ctx: Arc::clone(self),
            })
    }

    /// Whether a shutdown sequence is running.
    pub fn is_shutdown_active(&self) -> bool {
        self.shutdown_active.load(Ordering::Acquire)
    }

    /// Stops every shared service and waits for subscribers to drain.
    pub async fn shutdown(&self) {
        self.token.cancel();
        self.scheduler.stop().await;
        self.deliverer.stop().await;
        let listener = match self.listener.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(listener) = listener {
            let _ = listener.await;
        }
    }
}

/// Ownership of the shutdown slot; released on drop.
pub(crate) struct ShutdownClaim {
    ctx: Arc<RegistrarContext>,
}

impl Drop for ShutdownClaim {
    fn drop(&mut self) {
        self.ctx.shutdown_active.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::Port;
    use crate::events::{Event, EventKind};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Collect(Arc<Mutex<Vec<EventKind>>>);

    #[async_trait]
    impl Subscribe for Collect {
        async fn on_event(&self, ev: &Event) {
            self.0.lock().unwrap().push(ev.kind);
        }
        fn name(&self) -> &'static str {
            "collect"
        }
    }

    #[tokio::test]
    async fn subscribers_see_events_published_before_shutdown() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let ctx = RegistrarContext::builder(Config::default())
            .with_subscribers(vec![Arc::new(Collect(Arc::clone(&seen)))])
            .build()
            .unwrap();

        ctx.bus().publish(Event::new(EventKind::SafeHaltEntered));
        tokio::task::yield_now().await;
        ctx.shutdown().await;

        assert_eq!(*seen.lock().unwrap(), vec![EventKind::SafeHaltEntered]);
        assert!(!ctx.scheduler().is_running());
    }

    #[tokio::test]
    async fn shutdown_slot_is_exclusive() {
        let ctx = RegistrarContext::builder(Config::default()).build().unwrap();
        let claim = ctx.claim_shutdown().unwrap();
        assert!(ctx.is_shutdown_active());
        assert!(ctx.claim_shutdown().is_none());

        drop(claim);
        assert!(!ctx.is_shutdown_active());
        assert!(ctx.claim_shutdown().is_some());
    }

    #[test]
    fn build_outside_runtime_fails() {
        let err = RegistrarContext::builder(Config::default()).build().err();
        assert!(matches!(err, Some(ContextError::Timer(_))));
    }

    #[tokio::test]
    async fn local_ports_are_distinct() {
        let ctx = RegistrarContext::builder(Config::default()).build().unwrap();
        let (a, _ra) = ctx.allocate_port();
        let (b, _rb) = ctx.allocate_port();
        assert_ne!(a.id(), b.id());
    }
}
