//! In-memory auction house.
//!
//! Holds the schedules and governed parameters a real auction house would
//! publish, and broadcasts a [`ParamChange`] whenever governance updates a
//! parameter. Used by tests and by the simulator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tokio::sync::broadcast;

use super::{AuctionParameter, AuctionSchedule, AuctionSchedules, AuctioneerFacet, ParamChange, ParamSet};
use crate::core::time::{RelativeTime, Timestamp};
use crate::error::{Error, Result};
use crate::timer::{TimerService, TimerWaker};

/// Buffered notifications per subscriber before it lags
const CHANGE_CHANNEL_CAPACITY: usize = 64;

// ═══════════════════════════════════════════════════════════════════════════════
// PERIODIC SCHEDULE
// ═══════════════════════════════════════════════════════════════════════════════

/// Fixed-frequency round plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodicSchedule {
    /// Start of round zero
    pub first_start: Timestamp,
    /// Ticks between consecutive starts
    pub start_frequency: RelativeTime,
    /// Ticks each round runs for
    pub auction_duration: RelativeTime,
}

impl PeriodicSchedule {
    /// Schedule of round `index`
    pub fn round(&self, index: u64) -> Result<AuctionSchedule> {
        let offset = self
            .start_frequency
            .ticks()
            .checked_mul(index)
            .ok_or_else(|| Error::TimeOutOfRange {
                operation: format!("round {} offset", index),
            })?;
        let start_time = self.first_start.add_rel(RelativeTime::from_ticks(offset))?;
        let end_time = start_time.add_rel(self.auction_duration)?;
        AuctionSchedule::new(start_time, end_time)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MANUAL AUCTIONEER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct AuctioneerState {
    schedules: AuctionSchedules,
    params: ParamSet,
    sequence: u64,
    unavailable: bool,
}

/// Auction house double driven by its owner
#[derive(Debug)]
pub struct ManualAuctioneer {
    state: RwLock<AuctioneerState>,
    changes: broadcast::Sender<ParamChange>,
}

impl Default for ManualAuctioneer {
    fn default() -> Self {
        Self::new(ParamSet::default())
    }
}

impl ManualAuctioneer {
    /// Create with initial governed parameters and no schedules
    pub fn new(params: ParamSet) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(AuctioneerState {
                params,
                ..Default::default()
            }),
            changes,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, AuctioneerState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, AuctioneerState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_available(&self) -> Result<()> {
        if self.read().unavailable {
            return Err(Error::Auctioneer("auction house unavailable".into()));
        }
        Ok(())
    }

    /// Publish the next round's schedule (or withdraw it)
    pub fn set_next_schedule(&self, schedule: Option<AuctionSchedule>) {
        self.write().schedules.next_auction_schedule = schedule;
    }

    /// Publish the live round's schedule
    pub fn set_live_schedule(&self, schedule: Option<AuctionSchedule>) {
        self.write().schedules.live_auction_schedule = schedule;
    }

    /// Make every facet call fail until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.write().unavailable = unavailable;
    }

    /// Apply a governance update and notify subscribers
    pub fn update_param(&self, parameter: AuctionParameter, value: u64) -> Result<ParamChange> {
        let change = {
            let mut state = self.write();
            state.params = state.params.with(parameter, value)?;
            state.sequence += 1;
            ParamChange {
                sequence: state.sequence,
                parameter,
                params: state.params,
            }
        };

        tracing::info!(
            parameter = parameter.name(),
            value,
            sequence = change.sequence,
            "Governed auction parameter updated"
        );
        // No subscribers is fine; the change is still applied.
        let _ = self.changes.send(change);

        Ok(change)
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.changes.receiver_count()
    }

    /// Governed parameters, read without the facet
    pub fn current_params(&self) -> ParamSet {
        self.read().params
    }
}

#[async_trait]
impl AuctioneerFacet for ManualAuctioneer {
    async fn schedules(&self) -> Result<AuctionSchedules> {
        self.ensure_available()?;
        Ok(self.read().schedules)
    }

    async fn governed_params(&self) -> Result<ParamSet> {
        self.ensure_available()?;
        Ok(self.read().params)
    }

    async fn subscribe(&self) -> Result<broadcast::Receiver<ParamChange>> {
        self.ensure_available()?;
        Ok(self.changes.subscribe())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROUND PUBLISHER
// ═══════════════════════════════════════════════════════════════════════════════

/// Advances the published rounds on the auction house's own clock.
///
/// Round `i` is published as next until its nominal start, when it becomes
/// live and round `i + 1` becomes next.
pub struct RoundPublisher<T: ?Sized> {
    auctioneer: Arc<ManualAuctioneer>,
    timer: Arc<T>,
    plan: PeriodicSchedule,
    next_round: AtomicU64,
    this: Weak<Self>,
}

impl<T: TimerService + ?Sized + 'static> RoundPublisher<T> {
    /// Create a publisher for `plan`
    pub fn new(auctioneer: Arc<ManualAuctioneer>, timer: Arc<T>, plan: PeriodicSchedule) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            auctioneer,
            timer,
            plan,
            next_round: AtomicU64::new(0),
            this: this.clone(),
        })
    }

    /// Publish round zero and arm the first advance
    pub async fn start(&self) -> Result<()> {
        self.publish(0).await
    }

    /// Index of the round currently published as next
    pub fn next_round(&self) -> u64 {
        self.next_round.load(Ordering::SeqCst)
    }

    async fn publish(&self, index: u64) -> Result<()> {
        let next = self.plan.round(index)?;
        let live = match index.checked_sub(1) {
            Some(previous) => Some(self.plan.round(previous)?),
            None => None,
        };
        self.auctioneer.set_live_schedule(live);
        self.auctioneer.set_next_schedule(Some(next));
        self.next_round.store(index, Ordering::SeqCst);

        let advance_at = next.nominal_start(&self.auctioneer.current_params())?;
        tracing::debug!(round = index, start = %next.start_time, %advance_at, "Published next round");

        match self.this.upgrade() {
            Some(this) => self.timer.set_wakeup(advance_at, this, None).await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<T: TimerService + ?Sized + 'static> TimerWaker for RoundPublisher<T> {
    async fn wake(&self, _timestamp: Timestamp) -> Result<()> {
        self.publish(self.next_round() + 1).await
    }
}
