//! Scheduling epoch state.
//!
//! The cancel token is the only mutable state shared between the wakeup
//! scheduler and the governance watcher. A present token means an epoch is
//! active; an absent one means the liquidator is paused or waiting for a
//! tokenless rescheduler to fire. Both writers hold the lock for their whole
//! read/decide/arm/write sequence, so at most one epoch is ever active.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use crate::core::config::LiquidatorConfig;
use crate::core::time::Timestamp;
use crate::timer::{CancelToken, CancelTokenMaker};
use crate::utils::constants::{DEFAULT_MAX_EVENTS, DEFAULT_TOKEN_LABEL};

// ═══════════════════════════════════════════════════════════════════════════════
// OUTCOMES
// ═══════════════════════════════════════════════════════════════════════════════

/// Why the scheduler stopped arming wakeups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PauseReason {
    /// The whole window of the next round elapsed before we woke
    WindowElapsed,
    /// The auction house published no next round
    NoNextSchedule,
    /// A timer or auction house call failed part way through rescheduling
    RescheduleFailed,
}

impl PauseReason {
    /// Get display name
    pub fn as_str(&self) -> &'static str {
        match self {
            PauseReason::WindowElapsed => "window elapsed",
            PauseReason::NoNextSchedule => "no next schedule",
            PauseReason::RescheduleFailed => "reschedule failed",
        }
    }
}

/// Wakeups armed for an on-time round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmedRound {
    /// Token all three wakeups were armed under
    pub token: CancelToken,
    /// Price-lock waker fire time
    pub price_lock_at: Timestamp,
    /// Liquidation waker fire time (the nominal start)
    pub liquidation_at: Timestamp,
    /// Rescheduler fire time
    pub reschedule_at: Timestamp,
}

/// Result of one scheduling decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleOutcome {
    /// Now is at or before the nominal start: all three wakeups armed
    OnTime(ArmedRound),
    /// Nominal start passed but the round has not ended: round skipped,
    /// tokenless rescheduler armed
    Recovering {
        /// Nominal start of the skipped round
        nominal_start: Timestamp,
        /// Rescheduler fire time
        reschedule_at: Timestamp,
    },
    /// Nothing armed; waiting for a governance repair
    Paused(PauseReason),
}

impl ScheduleOutcome {
    /// Check if this outcome paused the scheduler
    pub fn is_paused(&self) -> bool {
        matches!(self, ScheduleOutcome::Paused(_))
    }
}

/// Coarse scheduler status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerStatus {
    /// No decision taken yet
    Starting,
    /// A round is armed under a live token
    Armed,
    /// A round was skipped; the tokenless rescheduler is pending
    Recovering,
    /// A governance change re-armed the rescheduler after a pause
    Repairing,
    /// Waiting for a governance repair
    Paused(PauseReason),
}

/// Recorded scheduler decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerEventKind {
    /// Outcome of `schedule_next_round` or `trigger_reschedule`
    Scheduled(ScheduleOutcome),
    /// Governance change re-armed the rescheduler
    GovernanceRearmed {
        /// Freshly minted token
        token: CancelToken,
        /// Rescheduler fire time
        reschedule_at: Timestamp,
    },
}

/// Scheduler decision with the timer time it was taken at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerEvent {
    /// Timer time of the decision
    pub at: Timestamp,
    /// What was decided
    pub kind: SchedulerEventKind,
}

// ═══════════════════════════════════════════════════════════════════════════════
// EPOCH STATE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub(crate) struct EpochState {
    token: Option<CancelToken>,
    maker: CancelTokenMaker,
    status: SchedulerStatus,
    events: VecDeque<SchedulerEvent>,
    max_events: usize,
}

impl EpochState {
    pub(crate) fn token(&self) -> Option<&CancelToken> {
        self.token.as_ref()
    }

    /// Reuse the live token, minting one only if none is live
    pub(crate) fn ensure_token(&mut self) -> CancelToken {
        if let Some(token) = &self.token {
            return token.clone();
        }
        let token = self.maker.make();
        self.token = Some(token.clone());
        token
    }

    /// Mint a token without installing it
    pub(crate) fn mint_token(&mut self) -> CancelToken {
        self.maker.make()
    }

    pub(crate) fn install_token(&mut self, token: CancelToken) {
        self.token = Some(token);
    }

    pub(crate) fn clear_token(&mut self) -> Option<CancelToken> {
        self.token.take()
    }

    pub(crate) fn set_status(&mut self, status: SchedulerStatus) {
        self.status = status;
    }

    pub(crate) fn record(&mut self, at: Timestamp, kind: SchedulerEventKind) {
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(SchedulerEvent { at, kind });
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCHEDULER STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Shared handle to the epoch state. Clones refer to the same state.
#[derive(Debug, Clone)]
pub struct SchedulerState {
    inner: Arc<Mutex<EpochState>>,
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_LABEL, DEFAULT_MAX_EVENTS)
    }
}

impl SchedulerState {
    /// Create state whose first epoch is already open.
    ///
    /// Governance changes are ignored until the first pause.
    pub fn new(token_label: &str, max_events: usize) -> Self {
        let mut maker = CancelTokenMaker::new(token_label);
        let token = maker.make();
        Self {
            inner: Arc::new(Mutex::new(EpochState {
                token: Some(token),
                maker,
                status: SchedulerStatus::Starting,
                events: VecDeque::new(),
                max_events: max_events.max(1),
            })),
        }
    }

    /// Create from configuration
    pub fn from_config(config: &LiquidatorConfig) -> Self {
        Self::new(&config.token_label, config.max_events)
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, EpochState> {
        self.inner.lock().await
    }

    /// Live cancel token, if an epoch is active
    pub async fn active_token(&self) -> Option<CancelToken> {
        self.lock().await.token.clone()
    }

    /// Current status
    pub async fn status(&self) -> SchedulerStatus {
        self.lock().await.status
    }

    /// Check if waiting for a governance repair
    pub async fn is_paused(&self) -> bool {
        matches!(self.status().await, SchedulerStatus::Paused(_))
    }

    /// Recorded decisions, oldest first
    pub async fn events(&self) -> Vec<SchedulerEvent> {
        self.lock().await.events.iter().cloned().collect()
    }
}
