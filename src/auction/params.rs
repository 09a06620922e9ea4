//! Auction timing parameters that can be changed via governance.
//!
//! The auction house owns these values. The liquidator reads them fresh for
//! every scheduling decision and never caches them across rounds.

use serde::{Deserialize, Serialize};

use crate::core::time::RelativeTime;
use crate::error::{Error, Result};
use crate::utils::constants::*;

// ═══════════════════════════════════════════════════════════════════════════════
// AUCTION PARAMETERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Timing parameters that can be modified via governance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuctionParameter {
    /// Interval before nominal start during which the liquidation price is fixed
    PriceLockPeriod,
    /// Offset between the nominal start and the moment auctioning begins
    AuctionStartDelay,
}

impl AuctionParameter {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::PriceLockPeriod => "Price Lock Period",
            Self::AuctionStartDelay => "Auction Start Delay",
        }
    }

    /// Get validation bounds (min, max) in ticks
    pub fn bounds(&self) -> (u64, u64) {
        match self {
            Self::PriceLockPeriod => (1, MAX_GOVERNED_DURATION),
            Self::AuctionStartDelay => (0, MAX_GOVERNED_DURATION),
        }
    }

    /// Validate a value for this parameter
    pub fn validate(&self, value: u64) -> Result<()> {
        let (min, max) = self.bounds();

        if value < min || value > max {
            return Err(Error::InvalidParameter {
                name: self.name().into(),
                reason: format!("value {} outside bounds [{}, {}]", value, min, max),
            });
        }

        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARAM SET
// ═══════════════════════════════════════════════════════════════════════════════

/// Snapshot of the governed auction timing parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSet {
    /// Interval before nominal start during which the price is fixed
    pub price_lock_period: RelativeTime,
    /// Offset between nominal start and actual auction start
    pub auction_start_delay: RelativeTime,
}

impl Default for ParamSet {
    fn default() -> Self {
        Self::new(
            RelativeTime::from_ticks(DEFAULT_PRICE_LOCK_PERIOD),
            RelativeTime::from_ticks(DEFAULT_AUCTION_START_DELAY),
        )
    }
}

impl ParamSet {
    /// Create a parameter snapshot
    pub fn new(price_lock_period: RelativeTime, auction_start_delay: RelativeTime) -> Self {
        Self {
            price_lock_period,
            auction_start_delay,
        }
    }

    /// Current value of `param` in ticks
    pub fn get(&self, param: AuctionParameter) -> u64 {
        match param {
            AuctionParameter::PriceLockPeriod => self.price_lock_period.ticks(),
            AuctionParameter::AuctionStartDelay => self.auction_start_delay.ticks(),
        }
    }

    /// Copy of `self` with `param` replaced, after bounds validation
    pub fn with(&self, param: AuctionParameter, value: u64) -> Result<Self> {
        param.validate(value)?;
        let mut next = *self;
        match param {
            AuctionParameter::PriceLockPeriod => next.price_lock_period = RelativeTime::from_ticks(value),
            AuctionParameter::AuctionStartDelay => next.auction_start_delay = RelativeTime::from_ticks(value),
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_validation() {
        let param = AuctionParameter::PriceLockPeriod;

        assert!(param.validate(1).is_ok());
        assert!(param.validate(3600).is_ok());
        assert!(param.validate(0).is_err());
        assert!(param.validate(MAX_GOVERNED_DURATION + 1).is_err());
        assert!(AuctionParameter::AuctionStartDelay.validate(0).is_ok());
    }

    #[test]
    fn test_with_produces_new_value() {
        let params = ParamSet::default();
        let updated = params.with(AuctionParameter::AuctionStartDelay, 42).unwrap();

        assert_eq!(updated.get(AuctionParameter::AuctionStartDelay), 42);
        assert_eq!(params.get(AuctionParameter::AuctionStartDelay), DEFAULT_AUCTION_START_DELAY);
        assert!(params.with(AuctionParameter::PriceLockPeriod, 0).is_err());
    }
}
