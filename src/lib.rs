//! # Auction Liquidator
//!
//! Schedules periodic collateral-liquidation auctions for a lending protocol
//! and settles what they recover against the liquidated debt.
//!
//! ## Architecture
//!
//! - **Timer**: Timer gateway trait, cancel tokens and a manual timer
//! - **Auction**: Auction house facet, schedules and governed timing parameters
//! - **Scheduler**: Wakeup state machine, governance watcher and director
//! - **Liquidation**: Vault selection, atomic custody transfer and proceeds reconciliation
//!
//! ## Scheduling
//!
//! Each round arms three wakeups under one cancel token. A late wakeup inside
//! the round's window skips that round and recovers on the next one. A wakeup
//! after the window closes pauses the liquidator until a governance parameter
//! update re-arms it.
//!
//! ## Example
//!
//! ```rust,ignore
//! use auction_liquidator::prelude::*;
//!
//! let director = LiquidationDirector::new(timer, auctioneer, state, price_lock, liquidation);
//! let (outcome, watcher) = director.start().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    unused_lifetimes,
    unused_qualifications
)]

pub mod auction;
pub mod core;
pub mod error;
pub mod liquidation;
pub mod scheduler;
pub mod timer;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::auction::{
        AuctionParameter, AuctionSchedule, AuctionSchedules, AuctioneerFacet, ManualAuctioneer,
        ParamChange, ParamSet, PeriodicSchedule, RoundPublisher,
    };
    pub use crate::core::{
        amount::{Amount, Brand},
        config::LiquidatorConfig,
        time::{RelativeTime, Timestamp},
    };
    pub use crate::error::{Error, Result};
    pub use crate::liquidation::{
        custody::{AtomicTransfer, CustodyLedger, Keyword, SeatId, TransferPart},
        engine::{LiquidationBatch, LiquidationEngine, LiquidationStats},
        proceeds::{reconcile, LiquidationResult},
        vault::{
            CollateralizationCriteria, LiquidatableVault, ManagedVault, PrioritizedVaults, VaultId,
            VaultQueue, VaultStatus,
        },
    };
    pub use crate::scheduler::{
        watch_param_changes, LiquidationDirector, PauseReason, RoundWakers, ScheduleOutcome,
        SchedulerState, SchedulerStatus, WakeupScheduler,
    };
    pub use crate::timer::{CancelToken, ManualTimer, TimerService, TimerWaker};
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
