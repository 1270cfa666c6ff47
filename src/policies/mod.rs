//! Retry pacing policies.
//!
//! ## Contents
//! - [`BackoffPolicy`] how long a full mailbox rests before the next attempt
//! - [`JitterPolicy`]  randomization to avoid retrying every mailbox on the same tick
//!
//! ## Wiring
//! ```text
//! Config { retry_interval, retry_backoff: BackoffPolicy }
//!      └─► delivery::MessageDeliverer
//!           - wakes every retry_interval while mailboxes are pending
//!           - mailbox.next_attempt = now + retry_backoff.next(failures)
//! ```

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
