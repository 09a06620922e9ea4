//! Liquidation director.
//!
//! Owns the wakers for one vault manager and wires the rescheduler back into
//! the wakeup scheduler. The rescheduler holds only a weak reference, so
//! dropping the director lets pending wakeups fire as no-ops.

use async_trait::async_trait;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::debug;

use super::governance::watch_param_changes;
use super::state::{ScheduleOutcome, SchedulerState};
use super::wakeups::{RoundWakers, WakeupScheduler};
use crate::auction::AuctioneerFacet;
use crate::core::time::Timestamp;
use crate::error::Result;
use crate::timer::{TimerService, TimerWaker};

/// Drives the wakeup scheduler for one vault manager
pub struct LiquidationDirector<T: ?Sized, A: ?Sized> {
    scheduler: WakeupScheduler<T>,
    auctioneer: Arc<A>,
    wakers: RoundWakers,
}

impl<T, A> LiquidationDirector<T, A>
where
    T: TimerService + ?Sized + 'static,
    A: AuctioneerFacet + ?Sized + 'static,
{
    /// Create a director whose rescheduler calls back into it
    pub fn new(
        timer: Arc<T>,
        auctioneer: Arc<A>,
        state: SchedulerState,
        price_lock: Arc<dyn TimerWaker>,
        liquidation: Arc<dyn TimerWaker>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|director: &Weak<Self>| {
            let rescheduler: Arc<dyn TimerWaker> = Arc::new(ReschedulerWaker {
                director: director.clone(),
            });
            Self {
                scheduler: WakeupScheduler::new(timer, state),
                auctioneer,
                wakers: RoundWakers {
                    price_lock,
                    liquidation,
                    rescheduler,
                },
            }
        })
    }

    /// Start watching governance and arm the first round
    pub async fn start(&self) -> Result<(ScheduleOutcome, JoinHandle<()>)> {
        let watcher = watch_param_changes(
            &*self.auctioneer,
            self.scheduler.timer().clone(),
            self.wakers.rescheduler.clone(),
            self.scheduler.state().clone(),
        )
        .await?;
        let outcome = self.reset_wakeups().await?;
        Ok((outcome, watcher))
    }

    /// Re-read the auction house and re-arm wakeups
    pub async fn reset_wakeups(&self) -> Result<ScheduleOutcome> {
        self.scheduler
            .trigger_reschedule(&*self.auctioneer, &self.wakers)
            .await
    }

    /// Shared epoch state
    pub fn state(&self) -> &SchedulerState {
        self.scheduler.state()
    }

    /// Wakers armed by this director
    pub fn wakers(&self) -> &RoundWakers {
        &self.wakers
    }
}

struct ReschedulerWaker<T: ?Sized, A: ?Sized> {
    director: Weak<LiquidationDirector<T, A>>,
}

#[async_trait]
impl<T, A> TimerWaker for ReschedulerWaker<T, A>
where
    T: TimerService + ?Sized + 'static,
    A: AuctioneerFacet + ?Sized + 'static,
{
    async fn wake(&self, timestamp: Timestamp) -> Result<()> {
        let Some(director) = self.director.upgrade() else {
            debug!(%timestamp, "Director gone; rescheduler is a no-op");
            return Ok(());
        };
        director.reset_wakeups().await?;
        Ok(())
    }
}
