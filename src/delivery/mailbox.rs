//! Per-destination retry queue.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::policies::BackoffPolicy;
use crate::protocol::Message;

use super::target::{Messenger, PortError};

/// A payload waiting in one or more mailboxes.
///
/// The same `Arc<QueuedMessage>` sits in every mailbox the payload was fanned
/// out to; it is freed when the last mailbox lets go of it.
#[derive(Debug)]
pub(crate) struct QueuedMessage {
    pub(crate) message: Arc<Message>,
    pub(crate) created: Instant,
    pub(crate) timeout: Option<Duration>,
}

impl QueuedMessage {
    pub(crate) fn new(message: Arc<Message>, timeout: Option<Duration>) -> Self {
        Self {
            message,
            created: Instant::now(),
            timeout,
        }
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        match self.timeout {
            Some(t) => now.saturating_duration_since(self.created) >= t,
            None => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MailboxStatus {
    /// Nothing left to send.
    Drained,
    /// The destination is still full.
    Blocked,
    /// The destination vanished; the remaining entries are lost.
    Gone,
}

#[derive(Debug)]
pub(crate) struct FlushResult {
    pub(crate) status: MailboxStatus,
    pub(crate) sent: usize,
    pub(crate) expired: usize,
}

/// FIFO of pending messages for one destination.
pub(crate) struct Mailbox {
    target: Messenger,
    queue: VecDeque<Arc<QueuedMessage>>,
    failures: u32,
    next_attempt: Instant,
}

impl Mailbox {
    pub(crate) fn new(target: Messenger) -> Self {
        Self {
            target,
            queue: VecDeque::new(),
            failures: 0,
            next_attempt: Instant::now(),
        }
    }

    pub(crate) fn push(&mut self, entry: Arc<QueuedMessage>) {
        self.queue.push_back(entry);
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    /// Records a full answer to an immediate send and paces the first retry.
    pub(crate) fn blocked(&mut self, now: Instant, backoff: &BackoffPolicy) {
        self.failures = self.failures.saturating_add(1);
        self.next_attempt = now + backoff.next(self.failures - 1);
    }

    pub(crate) fn is_due(&self, now: Instant) -> bool {
        now >= self.next_attempt
    }

    /// Sends queued entries head first until one is refused.
    pub(crate) fn flush(&mut self, now: Instant, backoff: &BackoffPolicy) -> FlushResult {
        let mut sent = 0;
        let mut expired = 0;

        while let Some(head) = self.queue.front() {
            if head.is_expired(now) {
                self.queue.pop_front();
                expired += 1;
                continue;
            }
            match self.target.port().try_send(Arc::clone(&head.message)) {
                Ok(()) => {
                    self.queue.pop_front();
                    self.failures = 0;
                    sent += 1;
                }
                Err(PortError::Full) => {
                    self.blocked(now, backoff);
                    return FlushResult {
                        status: MailboxStatus::Blocked,
                        sent,
                        expired,
                    };
                }
                Err(PortError::Gone) => {
                    return FlushResult {
                        status: MailboxStatus::Gone,
                        sent,
                        expired,
                    };
                }
            }
        }
        FlushResult {
            status: MailboxStatus::Drained,
            sent,
            expired,
        }
    }
}
