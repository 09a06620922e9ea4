//! Timer gateway.
//!
//! The liquidator never sleeps on its own. It asks a [`TimerService`] for the
//! current time and for one-shot wakeups, optionally grouped under a
//! [`CancelToken`] so a whole epoch can be withdrawn at once.

pub mod cancel;
pub mod manual;

pub use cancel::*;
pub use manual::*;

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::time::Timestamp;
use crate::error::Result;

/// Callback invoked by the timer service at a scheduled instant
#[async_trait]
pub trait TimerWaker: Send + Sync {
    /// Called once, at or after the instant the wakeup was armed for
    async fn wake(&self, timestamp: Timestamp) -> Result<()>;
}

/// One-shot wakeup scheduling with cancellation.
///
/// Implementations must fire each armed waker at most once and never before
/// its scheduled time. Cancelling a token withdraws every wakeup armed under
/// it that has not fired yet.
#[async_trait]
pub trait TimerService: Send + Sync {
    /// Current time
    async fn current_timestamp(&self) -> Result<Timestamp>;

    /// Arm `waker` to fire at `when`, optionally under `token`.
    ///
    /// Must return before the waker runs, even when `when` is already past.
    /// Callers arm wakeups while holding the scheduler lock, and the waker
    /// takes that same lock.
    async fn set_wakeup(
        &self,
        when: Timestamp,
        waker: Arc<dyn TimerWaker>,
        token: Option<&CancelToken>,
    ) -> Result<()>;

    /// Withdraw all pending wakeups armed under `token`
    async fn cancel(&self, token: &CancelToken) -> Result<()>;
}
