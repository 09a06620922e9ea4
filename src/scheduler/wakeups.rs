//! Wakeup scheduler.
//!
//! Decides, for the next auction round, which wakeups to arm on the timer:
//!
//! | Case | Condition | Action |
//! |------|-----------|--------|
//! | on time | `now <= nominal_start` | reuse or mint a token, arm price-lock, liquidation and rescheduler |
//! | recoverable | `nominal_start < now <= end_time` | cancel the epoch, arm a tokenless rescheduler |
//! | elapsed | `now > end_time` | cancel the epoch and pause until governance repairs |
//!
//! The rescheduler always fires one tick after the nominal start, so a
//! recoverable delay skips the late round and picks up the following one.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::state::{
    ArmedRound, EpochState, PauseReason, ScheduleOutcome, SchedulerEventKind, SchedulerState,
    SchedulerStatus,
};
use crate::auction::{AuctionSchedule, AuctioneerFacet, ParamSet};
use crate::core::time::{RelativeTime, Timestamp};
use crate::error::{Error, Result};
use crate::timer::{TimerService, TimerWaker};
use crate::utils::constants::TICK;

/// The three wakers armed for a round
#[derive(Clone)]
pub struct RoundWakers {
    /// Fixes the liquidation price
    pub price_lock: Arc<dyn TimerWaker>,
    /// Runs liquidation selection
    pub liquidation: Arc<dyn TimerWaker>,
    /// Re-evaluates the following round
    pub rescheduler: Arc<dyn TimerWaker>,
}

impl std::fmt::Debug for RoundWakers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundWakers").finish_non_exhaustive()
    }
}

/// Arms and cancels round wakeups on a timer service
pub struct WakeupScheduler<T: ?Sized> {
    timer: Arc<T>,
    state: SchedulerState,
}

impl<T: TimerService + ?Sized> WakeupScheduler<T> {
    /// Create a scheduler over `timer` sharing `state`
    pub fn new(timer: Arc<T>, state: SchedulerState) -> Self {
        Self { timer, state }
    }

    /// Timer this scheduler arms wakeups on
    pub fn timer(&self) -> &Arc<T> {
        &self.timer
    }

    /// Shared epoch state
    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    /// Arm wakeups for `schedule` as seen at `now`.
    ///
    /// Errors from time arithmetic are returned before any timer call. If a
    /// timer call fails, the epoch is cancelled and the scheduler pauses
    /// until a governance update re-arms it; the error is still returned.
    pub async fn schedule_next_round(
        &self,
        schedule: &AuctionSchedule,
        now: Timestamp,
        params: &ParamSet,
        wakers: &RoundWakers,
    ) -> Result<ScheduleOutcome> {
        let plan = RoundPlan::new(schedule, now, params)?;
        let mut epoch = self.state.lock().await;
        match self.apply(&mut epoch, &plan, wakers).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => Err(self.halt(&mut epoch, Some(now), err).await),
        }
    }

    /// Read the next schedule, governed params and current time, then schedule.
    ///
    /// Pauses when the auction house publishes no next round, and when any
    /// read or timer call fails.
    pub async fn trigger_reschedule<A: AuctioneerFacet + ?Sized>(
        &self,
        auctioneer: &A,
        wakers: &RoundWakers,
    ) -> Result<ScheduleOutcome> {
        let fetched = tokio::try_join!(
            auctioneer.schedules(),
            auctioneer.governed_params(),
            self.timer.current_timestamp(),
        );

        let mut epoch = self.state.lock().await;
        let (schedules, params, now) = match fetched {
            Ok(fetched) => fetched,
            Err(err) => return Err(self.halt(&mut epoch, None, err).await),
        };

        let Some(next) = schedules.next_auction_schedule else {
            if let Err(err) = self.cancel_epoch(&mut epoch).await {
                return Err(self.halt(&mut epoch, Some(now), err).await);
            }
            let outcome = pause(&mut epoch, PauseReason::NoNextSchedule);
            epoch.record(now, SchedulerEventKind::Scheduled(outcome.clone()));
            return Ok(outcome);
        };

        info!(
            %now,
            start = %next.start_time,
            end = %next.end_time,
            "Rescheduling liquidation wakeups"
        );
        let result = match RoundPlan::new(&next, now, &params) {
            Ok(plan) => self.apply(&mut epoch, &plan, wakers).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(outcome) => Ok(outcome),
            Err(err) => Err(self.halt(&mut epoch, Some(now), err).await),
        }
    }

    async fn apply(
        &self,
        epoch: &mut EpochState,
        plan: &RoundPlan,
        wakers: &RoundWakers,
    ) -> Result<ScheduleOutcome> {
        let RoundPlan {
            now,
            end_time,
            nominal_start,
            reschedule_at,
            price_lock_at,
        } = *plan;

        let Some(price_lock_at) = price_lock_at else {
            self.cancel_epoch(epoch).await?;

            let outcome = if now <= end_time {
                debug!(%now, %nominal_start, end = %end_time, "Late for round; skipping to the next");
                self.timer
                    .set_wakeup(reschedule_at, wakers.rescheduler.clone(), None)
                    .await?;
                epoch.set_status(SchedulerStatus::Recovering);
                ScheduleOutcome::Recovering {
                    nominal_start,
                    reschedule_at,
                }
            } else {
                pause(epoch, PauseReason::WindowElapsed)
            };

            epoch.record(now, SchedulerEventKind::Scheduled(outcome.clone()));
            return Ok(outcome);
        };

        let token = epoch.ensure_token();
        debug!(
            %token,
            %price_lock_at,
            %nominal_start,
            %reschedule_at,
            "On time; arming round wakeups"
        );
        self.timer
            .set_wakeup(price_lock_at, wakers.price_lock.clone(), Some(&token))
            .await?;
        self.timer
            .set_wakeup(nominal_start, wakers.liquidation.clone(), Some(&token))
            .await?;
        self.timer
            .set_wakeup(reschedule_at, wakers.rescheduler.clone(), Some(&token))
            .await?;

        epoch.set_status(SchedulerStatus::Armed);
        let outcome = ScheduleOutcome::OnTime(ArmedRound {
            token,
            price_lock_at,
            liquidation_at: nominal_start,
            reschedule_at,
        });
        epoch.record(now, SchedulerEventKind::Scheduled(outcome.clone()));
        Ok(outcome)
    }

    /// Cancel every wakeup under the live token, then forget it
    async fn cancel_epoch(&self, epoch: &mut EpochState) -> Result<()> {
        if let Some(token) = epoch.token() {
            self.timer.cancel(token).await?;
            debug!(%token, "Cancelled epoch");
        }
        epoch.clear_token();
        Ok(())
    }

    /// Drop the epoch after a failed call and pause, handing back `err`.
    ///
    /// The token is cleared even if the timer refuses the cancel, so the
    /// governance watcher can open a new epoch.
    async fn halt(&self, epoch: &mut EpochState, at: Option<Timestamp>, err: Error) -> Error {
        if let Some(token) = epoch.token() {
            if let Err(cancel_err) = self.timer.cancel(token).await {
                warn!(%token, error = %cancel_err, "Could not cancel epoch after failure");
            }
        }
        epoch.clear_token();
        warn!(error = %err, "Rescheduling failed");

        let outcome = pause(epoch, PauseReason::RescheduleFailed);
        if let Some(at) = at {
            epoch.record(at, SchedulerEventKind::Scheduled(outcome));
        }
        err
    }
}

/// Fire times for one round, computed before touching the timer
#[derive(Debug, Clone, Copy)]
struct RoundPlan {
    now: Timestamp,
    end_time: Timestamp,
    nominal_start: Timestamp,
    reschedule_at: Timestamp,
    /// Present only when the round is still on time
    price_lock_at: Option<Timestamp>,
}

impl RoundPlan {
    fn new(schedule: &AuctionSchedule, now: Timestamp, params: &ParamSet) -> Result<Self> {
        schedule.validate()?;
        let nominal_start = schedule.nominal_start(params)?;
        let reschedule_at = nominal_start.add_rel(RelativeTime::from_ticks(TICK))?;
        let price_lock_at = if now <= nominal_start {
            Some(nominal_start.sub_rel(params.price_lock_period)?)
        } else {
            None
        };
        Ok(Self {
            now,
            end_time: schedule.end_time,
            nominal_start,
            reschedule_at,
            price_lock_at,
        })
    }
}

fn pause(epoch: &mut EpochState, reason: PauseReason) -> ScheduleOutcome {
    warn!(
        reason = reason.as_str(),
        "No wake for reschedule. Repair by resetting auction params."
    );
    epoch.set_status(SchedulerStatus::Paused(reason));
    ScheduleOutcome::Paused(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::ManualAuctioneer;
    use crate::timer::{CancelToken, ManualTimer, WakeupRecord};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoopWaker;

    #[async_trait]
    impl TimerWaker for NoopWaker {
        async fn wake(&self, _timestamp: Timestamp) -> Result<()> {
            Ok(())
        }
    }

    fn t(ticks: u64) -> Timestamp {
        Timestamp::from_ticks(ticks)
    }

    fn wakers() -> RoundWakers {
        RoundWakers {
            price_lock: Arc::new(NoopWaker),
            liquidation: Arc::new(NoopWaker),
            rescheduler: Arc::new(NoopWaker),
        }
    }

    /// startTime 1000, endTime 1100, delay 10, lock 30
    fn setup(now: u64) -> (Arc<ManualTimer>, WakeupScheduler<ManualTimer>, AuctionSchedule, ParamSet) {
        let timer = Arc::new(ManualTimer::new(t(now)));
        let scheduler = WakeupScheduler::new(timer.clone(), SchedulerState::new("liq", 16));
        let schedule = AuctionSchedule::new(t(1000), t(1100)).unwrap();
        let params = ParamSet::new(RelativeTime::from_ticks(30), RelativeTime::from_ticks(10));
        (timer, scheduler, schedule, params)
    }

    fn times(records: &[WakeupRecord]) -> Vec<u64> {
        records.iter().map(|r| r.when.ticks()).collect()
    }

    #[tokio::test]
    async fn test_on_time_arms_three_wakeups_under_one_token() {
        let (timer, scheduler, schedule, params) = setup(950);

        let outcome = scheduler
            .schedule_next_round(&schedule, t(950), &params, &wakers())
            .await
            .unwrap();

        let armed = timer.armed_log();
        assert_eq!(times(&armed), vec![960, 990, 991]);
        let token = scheduler.state().active_token().await.unwrap();
        assert!(armed.iter().all(|r| r.token.as_ref() == Some(&token)));
        assert!(matches!(outcome, ScheduleOutcome::OnTime(ref round) if round.token == token));
        assert_eq!(scheduler.state().status().await, SchedulerStatus::Armed);
    }

    #[tokio::test]
    async fn test_on_time_at_exact_nominal_start() {
        let (timer, scheduler, schedule, params) = setup(990);

        scheduler
            .schedule_next_round(&schedule, t(990), &params, &wakers())
            .await
            .unwrap();
        assert_eq!(times(&timer.armed_log()), vec![960, 990, 991]);
    }

    #[tokio::test]
    async fn test_on_time_reuses_live_token() {
        let (timer, scheduler, schedule, params) = setup(900);
        let initial = scheduler.state().active_token().await.unwrap();

        scheduler
            .schedule_next_round(&schedule, t(900), &params, &wakers())
            .await
            .unwrap();
        scheduler
            .schedule_next_round(&schedule, t(901), &params, &wakers())
            .await
            .unwrap();

        assert_eq!(scheduler.state().active_token().await, Some(initial.clone()));
        assert!(timer.armed_log().iter().all(|r| r.token.as_ref() == Some(&initial)));
        assert!(timer.cancelled().is_empty());
    }

    #[tokio::test]
    async fn test_recoverable_arms_tokenless_rescheduler() {
        let (timer, scheduler, schedule, params) = setup(1050);
        let old = scheduler.state().active_token().await.unwrap();

        let outcome = scheduler
            .schedule_next_round(&schedule, t(1050), &params, &wakers())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ScheduleOutcome::Recovering {
                nominal_start: t(990),
                reschedule_at: t(991),
            }
        );
        assert_eq!(timer.cancelled(), vec![old]);
        let armed = timer.armed_log();
        assert_eq!(times(&armed), vec![991]);
        assert_eq!(armed[0].token, None);
        assert_eq!(scheduler.state().active_token().await, None);
    }

    #[tokio::test]
    async fn test_recoverable_includes_end_time() {
        let (_timer, scheduler, schedule, params) = setup(1100);

        let outcome = scheduler
            .schedule_next_round(&schedule, t(1100), &params, &wakers())
            .await
            .unwrap();
        assert!(matches!(outcome, ScheduleOutcome::Recovering { .. }));
    }

    #[tokio::test]
    async fn test_elapsed_window_pauses() {
        let (timer, scheduler, schedule, params) = setup(1101);

        let outcome = scheduler
            .schedule_next_round(&schedule, t(1101), &params, &wakers())
            .await
            .unwrap();

        assert_eq!(outcome, ScheduleOutcome::Paused(PauseReason::WindowElapsed));
        assert!(timer.armed_log().is_empty());
        assert!(timer.pending().is_empty());
        assert_eq!(timer.cancelled().len(), 1);
        assert!(scheduler.state().is_paused().await);
        assert_eq!(scheduler.state().active_token().await, None);
    }

    #[tokio::test]
    async fn test_cancel_skipped_without_token() {
        let (timer, scheduler, schedule, params) = setup(1200);
        scheduler.state().lock().await.clear_token();

        scheduler
            .schedule_next_round(&schedule, t(1200), &params, &wakers())
            .await
            .unwrap();
        assert!(timer.cancelled().is_empty());
    }

    #[tokio::test]
    async fn test_price_lock_before_epoch_is_error() {
        let (timer, scheduler, _schedule, _params) = setup(0);
        let schedule = AuctionSchedule::new(t(20), t(40)).unwrap();
        let params = ParamSet::new(RelativeTime::from_ticks(30), RelativeTime::from_ticks(10));

        let err = scheduler
            .schedule_next_round(&schedule, t(0), &params, &wakers())
            .await
            .unwrap_err();
        assert_eq!(err.code(), 1001);
        assert!(timer.armed_log().is_empty());
    }

    #[tokio::test]
    async fn test_trigger_reschedule_without_next_round_pauses() {
        let (timer, scheduler, _schedule, _params) = setup(500);
        let auctioneer = ManualAuctioneer::default();

        let outcome = scheduler.trigger_reschedule(&auctioneer, &wakers()).await.unwrap();

        assert_eq!(outcome, ScheduleOutcome::Paused(PauseReason::NoNextSchedule));
        assert_eq!(timer.cancelled().len(), 1);
        assert!(timer.pending().is_empty());
        assert_eq!(scheduler.state().active_token().await, None);
    }

    #[tokio::test]
    async fn test_trigger_reschedule_uses_fresh_params() {
        let (timer, scheduler, schedule, _params) = setup(500);
        let auctioneer = ManualAuctioneer::new(ParamSet::new(
            RelativeTime::from_ticks(30),
            RelativeTime::from_ticks(10),
        ));
        auctioneer.set_next_schedule(Some(schedule));
        auctioneer
            .update_param(crate::auction::AuctionParameter::PriceLockPeriod, 100)
            .unwrap();

        scheduler.trigger_reschedule(&auctioneer, &wakers()).await.unwrap();
        assert_eq!(times(&timer.armed_log()), vec![890, 990, 991]);
    }

    #[tokio::test]
    async fn test_trigger_reschedule_timer_failure_pauses() {
        let (timer, scheduler, schedule, _params) = setup(500);
        let auctioneer = ManualAuctioneer::default();
        auctioneer.set_next_schedule(Some(schedule));
        timer.set_unavailable(true);

        let err = scheduler.trigger_reschedule(&auctioneer, &wakers()).await.unwrap_err();

        assert!(err.is_recoverable());
        assert_eq!(scheduler.state().active_token().await, None);
        assert_eq!(
            scheduler.state().status().await,
            SchedulerStatus::Paused(PauseReason::RescheduleFailed)
        );
    }

    #[tokio::test]
    async fn test_trigger_reschedule_auctioneer_failure_pauses() {
        let (timer, scheduler, schedule, _params) = setup(500);
        let auctioneer = ManualAuctioneer::default();
        auctioneer.set_next_schedule(Some(schedule));
        auctioneer.set_unavailable(true);
        let old = scheduler.state().active_token().await.unwrap();

        let err = scheduler.trigger_reschedule(&auctioneer, &wakers()).await.unwrap_err();

        assert_eq!(err.code(), 1004);
        assert_eq!(timer.cancelled(), vec![old]);
        assert_eq!(scheduler.state().active_token().await, None);
        assert!(scheduler.state().is_paused().await);
    }

    /// Passes calls through to a manual timer until `budget` wakeups are armed
    struct FlakyTimer {
        inner: ManualTimer,
        budget: AtomicUsize,
    }

    #[async_trait]
    impl TimerService for FlakyTimer {
        async fn current_timestamp(&self) -> Result<Timestamp> {
            self.inner.current_timestamp().await
        }

        async fn set_wakeup(
            &self,
            when: Timestamp,
            waker: Arc<dyn TimerWaker>,
            token: Option<&CancelToken>,
        ) -> Result<()> {
            let left = self.budget.load(Ordering::SeqCst);
            if left == 0 {
                return Err(Error::Timer("wakeup quota exhausted".into()));
            }
            self.budget.store(left - 1, Ordering::SeqCst);
            self.inner.set_wakeup(when, waker, token).await
        }

        async fn cancel(&self, token: &CancelToken) -> Result<()> {
            self.inner.cancel(token).await
        }
    }

    #[tokio::test]
    async fn test_partial_arming_cancels_epoch() {
        let timer = Arc::new(FlakyTimer {
            inner: ManualTimer::new(t(950)),
            budget: AtomicUsize::new(1),
        });
        let scheduler = WakeupScheduler::new(timer.clone(), SchedulerState::new("liq", 16));
        let schedule = AuctionSchedule::new(t(1000), t(1100)).unwrap();
        let params = ParamSet::new(RelativeTime::from_ticks(30), RelativeTime::from_ticks(10));
        let token = scheduler.state().active_token().await.unwrap();

        let err = scheduler
            .schedule_next_round(&schedule, t(950), &params, &wakers())
            .await
            .unwrap_err();

        assert_eq!(err.code(), 1003);
        // The price lock was armed before the failure and is withdrawn again.
        assert_eq!(times(&timer.inner.armed_log()), vec![960]);
        assert!(timer.inner.pending().is_empty());
        assert_eq!(timer.inner.cancelled(), vec![token]);
        assert_eq!(scheduler.state().active_token().await, None);
        assert_eq!(
            scheduler.state().status().await,
            SchedulerStatus::Paused(PauseReason::RescheduleFailed)
        );
    }
}
