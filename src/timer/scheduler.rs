//! # TimedEventScheduler: absolute-time one-shot callbacks on one background task.
//!
//! ## Architecture
//! ```text
//! schedule / cancel / reschedule ──► Queue (mutex) ──notify if new head──► worker
//!                                                                           │
//! worker: select { stop, notified, sleep_until(head.due) }                  │
//!            └─► fire_due(): pop every due event, run callback, Keep → park ◄┘
//! ```
//!
//! ## Rules
//! - Events fire in ascending `(due, id)` order; ties fire in scheduling order.
//! - Callbacks run on the worker **while the queue lock is held**: they are
//!   never concurrent with each other nor with a queue mutation. A callback
//!   must not call back into the scheduler.
//! - A cancelled event never fires.
//! - After firing or cancellation an event is dropped if it is self-deleting
//!   (or its callback returned [`Disposition::Delete`]); otherwise it is parked
//!   and can be re-armed with [`TimedEventScheduler::reschedule`] or reclaimed
//!   with [`TimedEventScheduler::take`].
//! - A panicking callback is logged and its event dropped; the worker survives.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::TimerError;
use crate::subscribers::panic_message;

use super::event::{Disposition, EventId, ScheduledEvent};

#[derive(Default)]
struct Queue {
    order: BTreeSet<(Instant, EventId)>,
    queued: HashMap<EventId, ScheduledEvent>,
    parked: HashMap<EventId, ScheduledEvent>,
    next_id: u64,
}

impl Queue {
    fn head(&self) -> Option<Instant> {
        self.order.first().map(|(due, _)| *due)
    }

    /// Inserts and reports whether the event became the new head.
    fn insert(&mut self, id: EventId, event: ScheduledEvent) -> bool {
        let key = (event.due, id);
        self.order.insert(key);
        self.queued.insert(id, event);
        self.order.first() == Some(&key)
    }

    fn remove(&mut self, id: EventId) -> Option<ScheduledEvent> {
        let event = self.queued.remove(&id)?;
        self.order.remove(&(event.due, id));
        Some(event)
    }

    fn fire_due(&mut self, now: Instant) -> usize {
        let mut fired = 0;
        while let Some(&(due, id)) = self.order.first() {
            if due > now {
                break;
            }
            self.order.pop_first();
            let Some(mut event) = self.queued.remove(&id) else {
                continue;
            };
            fired += 1;

            let outcome =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (event.callback)()));
            match outcome {
                Ok(Disposition::Keep) if !event.self_deleting => {
                    self.parked.insert(id, event);
                }
                Ok(_) => {}
                Err(panic) => {
                    tracing::warn!(
                        event = id.0,
                        info = %panic_message(&*panic),
                        "timed event callback panicked"
                    );
                }
            }
        }
        fired
    }
}

struct Shared {
    queue: Mutex<Queue>,
    wake: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("scheduler queue lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

/// Process-wide timed event scheduler. Cheap to clone.
#[derive(Clone)]
pub struct TimedEventScheduler {
    shared: Arc<Shared>,
    token: CancellationToken,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl TimedEventScheduler {
    /// Spawns the firing task on the current tokio runtime.
    ///
    /// # Errors
    /// [`TimerError::NoRuntime`] when called outside a runtime.
    pub fn start() -> Result<Self, TimerError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| TimerError::NoRuntime)?;
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue::default()),
            wake: Notify::new(),
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
            let head = shared.lock().head();
            let sleep = async move {
                match head {
                    Some(due) => tokio::time::sleep_until(due).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = shared.wake.notified() => {}
                _ = sleep => {
                    shared.lock().fire_due(Instant::now());
                }
            }
        }
    }

    /// Queues `event` and returns its handle.
    ///
    /// # Errors
    /// [`TimerError::Stopped`] after [`stop`](Self::stop).
    pub fn schedule(&self, event: ScheduledEvent) -> Result<EventId, TimerError> {
        if self.token.is_cancelled() {
            return Err(TimerError::Stopped);
        }
        let (id, is_head) = {
            let mut q = self.shared.lock();
            let id = EventId(q.next_id);
            q.next_id += 1;
            (id, q.insert(id, event))
        };
        if is_head {
            self.shared.wake.notify_one();
        }
        Ok(id)
    }

    /// Removes a queued event. Returns whether it was queued.
    pub fn cancel(&self, id: EventId) -> bool {
        let mut q = self.shared.lock();
        match q.remove(id) {
            Some(event) => {
                if !event.self_deleting {
                    q.parked.insert(id, event);
                }
                true
            }
            None => false,
        }
    }

    /// Moves a queued or parked event to `due`. Returns whether it was known.
    pub fn reschedule(&self, id: EventId, due: Instant) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        let is_head = {
            let mut q = self.shared.lock();
            let event = match q.remove(id) {
                Some(event) => Some(event),
                None => q.parked.remove(&id),
            };
            let Some(mut event) = event else {
                return false;
            };
            event.due = due;
            q.insert(id, event)
        };
        if is_head {
            self.shared.wake.notify_one();
        }
        true
    }

    /// Reclaims an event, whether queued or parked.
    pub fn take(&self, id: EventId) -> Option<ScheduledEvent> {
        let mut q = self.shared.lock();
        match q.remove(id) {
            Some(event) => Some(event),
            None => q.parked.remove(&id),
        }
    }

    /// Whether the event is waiting to fire.
    pub fn is_scheduled(&self, id: EventId) -> bool {
        self.shared.lock().queued.contains_key(&id)
    }

    /// Number of events waiting to fire.
    pub fn len(&self) -> usize {
        self.shared.lock().queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Stops the firing task and drops every event.
    pub async fn stop(&self) {
        self.token.cancel();
        let worker = match self.worker.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(worker) = worker {
            let _ = worker.await;
        }
        let mut q = self.shared.lock();
        q.order.clear();
        q.queued.clear();
        q.parked.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::collections::HashSet;
    use std::time::Duration;

    type Log = Arc<Mutex<Vec<(u32, Instant)>>>;

    fn recorder(log: &Log, tag: u32, disposition: Disposition) -> impl FnMut() -> Disposition + Send + 'static {
        let log = Arc::clone(log);
        move || {
            log.lock().unwrap().push((tag, Instant::now()));
            disposition
        }
    }

    fn tags(log: &Log) -> Vec<u32> {
        log.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn fires_in_due_order() {
        let s = TimedEventScheduler::start().unwrap();
        let log = Log::default();
        let t0 = Instant::now();

        for (tag, ms) in [(3, 30), (1, 10), (2, 20)] {
            let ev = ScheduledEvent::new(t0 + Duration::from_millis(ms), recorder(&log, tag, Disposition::Delete));
            s.schedule(ev).unwrap();
        }
        assert_eq!(s.len(), 3);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(tags(&log), vec![1, 2, 3]);
        for (tag, at) in log.lock().unwrap().iter() {
            assert_eq!(*at, t0 + Duration::from_millis(u64::from(*tag) * 10));
        }
        assert!(s.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_event_never_fires() {
        let s = TimedEventScheduler::start().unwrap();
        let log = Log::default();
        let id = s
            .schedule(ScheduledEvent::new(
                Instant::now() + Duration::from_millis(10),
                recorder(&log, 1, Disposition::Delete),
            ))
            .unwrap();

        assert!(s.cancel(id));
        assert!(!s.cancel(id));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(tags(&log).is_empty());

        // parked for its owner
        assert!(s.take(id).is_some());
        assert!(s.take(id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_moves_an_event_earlier_and_later() {
        let s = TimedEventScheduler::start().unwrap();
        let log = Log::default();
        let t0 = Instant::now();
        let late = s
            .schedule(ScheduledEvent::new(t0 + Duration::from_secs(10), recorder(&log, 1, Disposition::Delete)))
            .unwrap();
        let early = s
            .schedule(ScheduledEvent::new(t0 + Duration::from_millis(5), recorder(&log, 2, Disposition::Delete)))
            .unwrap();

        assert!(s.reschedule(late, t0 + Duration::from_millis(1)));
        assert!(s.reschedule(early, t0 + Duration::from_millis(20)));
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(tags(&log), vec![1, 2]);
        assert_eq!(log.lock().unwrap()[0].1, t0 + Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn kept_event_can_be_rearmed() {
        let s = TimedEventScheduler::start().unwrap();
        let log = Log::default();
        let t0 = Instant::now();
        let id = s
            .schedule(ScheduledEvent::new(t0 + Duration::from_millis(10), recorder(&log, 7, Disposition::Keep)))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(15)).await;
        assert!(!s.is_scheduled(id));
        assert!(s.reschedule(id, Instant::now() + Duration::from_millis(10)));
        assert!(s.is_scheduled(id));

        tokio::time::sleep(Duration::from_millis(15)).await;
        assert_eq!(tags(&log), vec![7, 7]);
    }

    #[tokio::test(start_paused = true)]
    async fn self_deleting_events_are_not_parked() {
        let s = TimedEventScheduler::start().unwrap();
        let log = Log::default();
        let t0 = Instant::now();
        let fired = s
            .schedule(
                ScheduledEvent::new(t0 + Duration::from_millis(10), recorder(&log, 1, Disposition::Keep))
                    .self_deleting(),
            )
            .unwrap();
        let cancelled = s
            .schedule(
                ScheduledEvent::new(t0 + Duration::from_millis(10), recorder(&log, 2, Disposition::Keep))
                    .self_deleting(),
            )
            .unwrap();

        assert!(s.cancel(cancelled));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(tags(&log), vec![1]);
        assert!(s.take(fired).is_none());
        assert!(s.take(cancelled).is_none());
        assert!(!s.reschedule(fired, Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_callback_does_not_stop_the_worker() {
        let s = TimedEventScheduler::start().unwrap();
        let log = Log::default();
        let t0 = Instant::now();
        s.schedule(ScheduledEvent::new(t0 + Duration::from_millis(1), || -> Disposition {
            panic!("callback failed")
        }))
        .unwrap();
        s.schedule(ScheduledEvent::new(t0 + Duration::from_millis(2), recorder(&log, 1, Disposition::Delete)))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(tags(&log), vec![1]);
        assert!(s.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_scheduler_rejects_events() {
        let s = TimedEventScheduler::start().unwrap();
        s.stop().await;
        let err = s
            .schedule(ScheduledEvent::new(Instant::now(), || Disposition::Delete))
            .unwrap_err();
        assert_eq!(err, TimerError::Stopped);
        assert!(!s.is_running());
    }

    #[test]
    fn start_outside_runtime_fails() {
        assert_eq!(TimedEventScheduler::start().err(), Some(TimerError::NoRuntime));
    }

    #[tokio::test(start_paused = true)]
    async fn random_operations_keep_order_and_never_fire_cancelled() {
        let mut rng = rand::rng();
        for _round in 0..20 {
            let s = TimedEventScheduler::start().unwrap();
            let log = Log::default();
            let t0 = Instant::now();
            let mut live: HashMap<u32, (EventId, Instant)> = HashMap::new();
            let mut cancelled = HashSet::new();

            for tag in 0..40u32 {
                let due = t0 + Duration::from_millis(rng.random_range(1..200));
                let id = s
                    .schedule(ScheduledEvent::new(due, recorder(&log, tag, Disposition::Delete)))
                    .unwrap();
                live.insert(tag, (id, due));

                if tag > 0 && rng.random_bool(0.3) {
                    let victim = rng.random_range(0..tag);
                    if let Some((vid, _)) = live.remove(&victim) {
                        assert!(s.cancel(vid));
                        cancelled.insert(victim);
                    }
                }
                if tag > 0 && rng.random_bool(0.3) {
                    let moved = rng.random_range(0..tag);
                    if let Some((mid, due)) = live.get_mut(&moved) {
                        *due = t0 + Duration::from_millis(rng.random_range(1..200));
                        assert!(s.reschedule(*mid, *due));
                    }
                }
            }

            tokio::time::sleep(Duration::from_millis(250)).await;

            let fired = log.lock().unwrap().clone();
            assert_eq!(fired.len(), live.len());
            for (tag, at) in &fired {
                assert!(!cancelled.contains(tag));
                assert_eq!(*at, live[tag].1);
            }
            assert!(fired.windows(2).all(|w| w[0].1 <= w[1].1));
            s.stop().await;
        }
    }
}
