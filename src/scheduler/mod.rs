//! Liquidation wakeup scheduling.
//!
//! Three wakeups are armed per auction round, all under one cancel token:
//! - price lock, `price_lock_period` before the nominal start
//! - liquidation, at the nominal start
//! - rescheduler, one tick after the nominal start
//!
//! The rescheduler re-reads the auction house and arms the following round.
//! A governance watcher provides the only way out of the paused state.

pub mod director;
pub mod governance;
pub mod state;
pub mod wakeups;

pub use director::LiquidationDirector;
pub use governance::{watch_param_changes, GovernanceWatcher};
pub use state::{
    ArmedRound, PauseReason, ScheduleOutcome, SchedulerEvent, SchedulerEventKind, SchedulerState,
    SchedulerStatus,
};
pub use wakeups::{RoundWakers, WakeupScheduler};
