//! Governance change watcher.
//!
//! A paused scheduler has nothing armed and no token, so nothing inside the
//! liquidator will ever wake it again. The only way out is a governance
//! update to the auction timing parameters: when one arrives while no epoch
//! is active, the watcher opens a new epoch by arming the rescheduler one
//! tick ahead. Updates that arrive while an epoch is active are ignored.

use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::state::{SchedulerEventKind, SchedulerState, SchedulerStatus};
use crate::auction::{AuctioneerFacet, ParamChange};
use crate::core::time::{RelativeTime, Timestamp};
use crate::error::Result;
use crate::timer::{TimerService, TimerWaker};
use crate::utils::constants::TICK;

/// Re-arms the rescheduler after a pause
pub struct GovernanceWatcher<T: ?Sized> {
    timer: Arc<T>,
    rescheduler: Arc<dyn TimerWaker>,
    state: SchedulerState,
}

impl<T: TimerService + ?Sized> GovernanceWatcher<T> {
    /// Create a watcher sharing `state` with the wakeup scheduler
    pub fn new(timer: Arc<T>, rescheduler: Arc<dyn TimerWaker>, state: SchedulerState) -> Self {
        Self {
            timer,
            rescheduler,
            state,
        }
    }

    /// React to one parameter change.
    ///
    /// Returns the rescheduler fire time if a new epoch was opened, `None`
    /// if an epoch was already active.
    pub async fn on_param_change(&self) -> Result<Option<Timestamp>> {
        let mut epoch = self.state.lock().await;

        if let Some(token) = epoch.token() {
            debug!(%token, "Epoch active; ignoring parameter change");
            return Ok(None);
        }

        let now = self.timer.current_timestamp().await?;
        let reschedule_at = now.add_rel(RelativeTime::from_ticks(TICK))?;
        let token = epoch.mint_token();
        self.timer
            .set_wakeup(reschedule_at, self.rescheduler.clone(), Some(&token))
            .await?;

        epoch.install_token(token.clone());
        epoch.set_status(SchedulerStatus::Repairing);
        epoch.record(
            now,
            SchedulerEventKind::GovernanceRearmed {
                token: token.clone(),
                reschedule_at,
            },
        );
        info!(%token, %reschedule_at, "Parameter change re-armed rescheduler");

        Ok(Some(reschedule_at))
    }

    /// Handle notifications until the feed closes
    pub async fn run(self, mut changes: broadcast::Receiver<ParamChange>) {
        loop {
            match changes.recv().await {
                Ok(change) => {
                    debug!(
                        sequence = change.sequence,
                        parameter = change.parameter.name(),
                        "Parameter change received"
                    );
                }
                // Missed updates collapse into one; only the fact of a change matters.
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Parameter feed lagged");
                }
                Err(RecvError::Closed) => {
                    info!("Parameter feed closed; governance watcher stopping");
                    break;
                }
            }

            if let Err(e) = self.on_param_change().await {
                warn!("Failed to re-arm after parameter change: {}", e);
            }
        }
    }
}

/// Subscribe to parameter changes and handle them on a spawned task.
///
/// The subscription is taken before this returns, so no update published
/// afterwards is missed.
pub async fn watch_param_changes<A, T>(
    auctioneer: &A,
    timer: Arc<T>,
    rescheduler: Arc<dyn TimerWaker>,
    state: SchedulerState,
) -> Result<JoinHandle<()>>
where
    A: AuctioneerFacet + ?Sized,
    T: TimerService + ?Sized + 'static,
{
    let changes = auctioneer.subscribe().await?;
    let watcher = GovernanceWatcher::new(timer, rescheduler, state);
    Ok(tokio::spawn(watcher.run(changes)))
}
