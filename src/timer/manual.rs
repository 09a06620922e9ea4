//! Manually driven timer service.
//!
//! Time only moves when the owner calls [`ManualTimer::advance_to`] or
//! [`ManualTimer::jump_to`], which makes scheduling behaviour reproducible in
//! tests and in the simulator. `jump_to` moves the clock without firing
//! anything, modelling a host that slept through its wakeups.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{CancelToken, TimerService, TimerWaker};
use crate::core::time::{RelativeTime, Timestamp};
use crate::error::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// RECORDS
// ═══════════════════════════════════════════════════════════════════════════════

/// A wakeup as seen by the timer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakeupRecord {
    /// Scheduled fire time
    pub when: Timestamp,
    /// Timer time when the wakeup was armed
    pub armed_at: Timestamp,
    /// Token the wakeup was armed under
    pub token: Option<CancelToken>,
}

struct PendingWakeup {
    record: WakeupRecord,
    waker: Arc<dyn TimerWaker>,
}

#[derive(Default)]
struct TimerState {
    now: Timestamp,
    next_seq: u64,
    pending: BTreeMap<(Timestamp, u64), PendingWakeup>,
    armed: Vec<WakeupRecord>,
    cancelled: Vec<CancelToken>,
    fired: u64,
    unavailable: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// MANUAL TIMER
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory timer service (for testing and simulation)
#[derive(Default)]
pub struct ManualTimer {
    state: Mutex<TimerState>,
}

impl std::fmt::Debug for ManualTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("ManualTimer")
            .field("now", &state.now)
            .field("pending", &state.pending.len())
            .field("fired", &state.fired)
            .finish()
    }
}

impl ManualTimer {
    /// Create a timer reading `start`
    pub fn new(start: Timestamp) -> Self {
        Self {
            state: Mutex::new(TimerState {
                now: start,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn checked_state(&self) -> Result<MutexGuard<'_, TimerState>> {
        let state = self.state();
        if state.unavailable {
            return Err(Error::Timer("timer service unavailable".into()));
        }
        Ok(state)
    }

    /// Current time without going through the async gateway
    pub fn now(&self) -> Timestamp {
        self.state().now
    }

    /// Make every gateway call fail until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Move the clock forward without firing anything
    pub fn jump_to(&self, to: Timestamp) {
        let mut state = self.state();
        state.now = state.now.max(to);
    }

    /// Fire every wakeup due at or before `to`, in time order, then set the clock to `to`.
    ///
    /// Wakers may arm further wakeups; those fire in the same call if they
    /// are due. Returns the number of wakers fired.
    ///
    /// A waker that keeps re-arming itself at or before `to` makes this loop
    /// forever. A recovering rescheduler does exactly that when the auction
    /// house has not moved its next round past the nominal start by the
    /// time it fires, so pair this timer with an auction house that advances
    /// on its own clock, such as [`RoundPublisher`](crate::auction::RoundPublisher).
    pub async fn advance_to(&self, to: Timestamp) -> usize {
        let mut fired = 0;
        while let Some((now, pending)) = self.pop_due(to) {
            fire(pending, now).await;
            fired += 1;
        }
        self.jump_to(to);
        fired
    }

    /// [`advance_to`](Self::advance_to) relative to the current time
    pub async fn advance_by(&self, delta: RelativeTime) -> Result<usize> {
        let to = self.now().add_rel(delta)?;
        Ok(self.advance_to(to).await)
    }

    /// Fire wakeups that are already overdue at the current time
    pub async fn fire_due(&self) -> usize {
        self.advance_to(self.now()).await
    }

    fn pop_due(&self, limit: Timestamp) -> Option<(Timestamp, PendingWakeup)> {
        let mut state = self.state();
        let key = *state.pending.keys().next()?;
        if key.0 > limit {
            return None;
        }
        let pending = state.pending.remove(&key)?;
        state.now = state.now.max(key.0);
        state.fired += 1;
        Some((state.now, pending))
    }

    /// Wakeups still waiting to fire, in fire order
    pub fn pending(&self) -> Vec<WakeupRecord> {
        self.state().pending.values().map(|p| p.record.clone()).collect()
    }

    /// Every wakeup ever armed, in arming order
    pub fn armed_log(&self) -> Vec<WakeupRecord> {
        self.state().armed.clone()
    }

    /// Tokens passed to `cancel`, in call order
    pub fn cancelled(&self) -> Vec<CancelToken> {
        self.state().cancelled.clone()
    }

    /// Number of wakers fired so far
    pub fn fired_count(&self) -> u64 {
        self.state().fired
    }

}

async fn fire(pending: PendingWakeup, now: Timestamp) {
    if let Err(e) = pending.waker.wake(now).await {
        tracing::warn!(
            scheduled = %pending.record.when,
            %now,
            "Waker failed: {}",
            e
        );
    }
}

#[async_trait]
impl TimerService for ManualTimer {
    async fn current_timestamp(&self) -> Result<Timestamp> {
        Ok(self.checked_state()?.now)
    }

    async fn set_wakeup(
        &self,
        when: Timestamp,
        waker: Arc<dyn TimerWaker>,
        token: Option<&CancelToken>,
    ) -> Result<()> {
        let mut state = self.checked_state()?;
        let record = WakeupRecord {
            when,
            armed_at: state.now,
            token: token.cloned(),
        };
        let seq = state.next_seq;
        state.next_seq += 1;
        state.armed.push(record.clone());
        state.pending.insert((when, seq), PendingWakeup { record, waker });
        Ok(())
    }

    async fn cancel(&self, token: &CancelToken) -> Result<()> {
        let mut state = self.checked_state()?;
        state.pending.retain(|_, p| p.record.token.as_ref() != Some(token));
        state.cancelled.push(token.clone());
        Ok(())
    }
}
