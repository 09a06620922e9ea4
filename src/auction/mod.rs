//! Auction house facet.
//!
//! The auction house runs price discovery and owns both the round schedule
//! and the governed timing parameters. The liquidator consumes it through
//! [`AuctioneerFacet`]:
//! - the next round's schedule
//! - a fresh snapshot of governed parameters
//! - a feed of parameter-change notifications

pub mod manual;
pub mod params;

pub use manual::*;
pub use params::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::core::time::Timestamp;
use crate::error::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// SCHEDULES
// ═══════════════════════════════════════════════════════════════════════════════

/// Timing of one auction round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionSchedule {
    /// When auctioning begins
    pub start_time: Timestamp,
    /// When the round closes
    pub end_time: Timestamp,
}

impl AuctionSchedule {
    /// Create a validated schedule
    pub fn new(start_time: Timestamp, end_time: Timestamp) -> Result<Self> {
        let schedule = Self { start_time, end_time };
        schedule.validate()?;
        Ok(schedule)
    }

    /// Check `start_time <= end_time`
    pub fn validate(&self) -> Result<()> {
        if self.start_time > self.end_time {
            return Err(Error::InvalidSchedule {
                start_time: self.start_time.ticks(),
                end_time: self.end_time.ticks(),
            });
        }
        Ok(())
    }

    /// Declared start of the round, `auction_start_delay` before auctioning begins
    pub fn nominal_start(&self, params: &ParamSet) -> Result<Timestamp> {
        self.start_time.sub_rel(params.auction_start_delay)
    }
}

/// Schedules published by the auction house
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionSchedules {
    /// Round currently running, if any
    pub live_auction_schedule: Option<AuctionSchedule>,
    /// Round the liquidator should prepare for
    pub next_auction_schedule: Option<AuctionSchedule>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// NOTIFICATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Notification that a governed parameter changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamChange {
    /// Update sequence number
    pub sequence: u64,
    /// Parameter that changed
    pub parameter: AuctionParameter,
    /// Parameters after the change
    pub params: ParamSet,
}

// ═══════════════════════════════════════════════════════════════════════════════
// FACET
// ═══════════════════════════════════════════════════════════════════════════════

/// Public facet of the auction house
#[async_trait]
pub trait AuctioneerFacet: Send + Sync {
    /// Live and next round schedules
    async fn schedules(&self) -> Result<AuctionSchedules>;

    /// Current governed parameters
    async fn governed_params(&self) -> Result<ParamSet>;

    /// Subscribe to parameter-change notifications from now on
    async fn subscribe(&self) -> Result<broadcast::Receiver<ParamChange>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::RelativeTime;

    #[test]
    fn test_schedule_validation() {
        assert!(AuctionSchedule::new(Timestamp::from_ticks(10), Timestamp::from_ticks(10)).is_ok());
        let err = AuctionSchedule::new(Timestamp::from_ticks(11), Timestamp::from_ticks(10)).unwrap_err();
        assert_eq!(err.code(), 1002);
    }

    #[test]
    fn test_nominal_start() {
        let schedule = AuctionSchedule::new(Timestamp::from_ticks(100), Timestamp::from_ticks(200)).unwrap();
        let params = ParamSet::new(RelativeTime::from_ticks(30), RelativeTime::from_ticks(5));
        assert_eq!(schedule.nominal_start(&params).unwrap(), Timestamp::from_ticks(95));

        let too_long = ParamSet::new(RelativeTime::from_ticks(30), RelativeTime::from_ticks(101));
        assert!(schedule.nominal_start(&too_long).is_err());
    }
}
