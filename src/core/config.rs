//! Liquidator configuration.
//!
//! Values are loaded from a JSON file, then optionally overridden from the
//! environment. Auction timing entries seed the in-memory auction house used
//! by the simulator; a deployed auction house owns its own governed values.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::auction::{AuctionParameter, ParamSet, PeriodicSchedule};
use crate::core::time::{RelativeTime, Timestamp};
use crate::error::{Error, Result};
use crate::utils::constants::*;

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATOR CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Liquidator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiquidatorConfig {
    /// Label prefix for minted cancel tokens
    pub token_label: String,
    /// Scheduler decisions kept in memory
    pub max_events: usize,
    /// Price-lock period in ticks
    pub price_lock_period: u64,
    /// Delay between nominal and actual auction start in ticks
    pub auction_start_delay: u64,
    /// Ticks between consecutive round starts
    pub start_frequency: u64,
    /// Ticks each round runs for
    pub auction_duration: u64,
    /// Start time of the first round
    pub first_start: u64,
}

impl Default for LiquidatorConfig {
    fn default() -> Self {
        Self {
            token_label: DEFAULT_TOKEN_LABEL.into(),
            max_events: DEFAULT_MAX_EVENTS,
            price_lock_period: DEFAULT_PRICE_LOCK_PERIOD,
            auction_start_delay: DEFAULT_AUCTION_START_DELAY,
            start_frequency: DEFAULT_START_FREQUENCY,
            auction_duration: DEFAULT_AUCTION_DURATION,
            first_start: DEFAULT_START_FREQUENCY,
        }
    }
}

impl LiquidatorConfig {
    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {}", path.display(), e)))?;

        Ok(serde_json::from_str(&content)?)
    }

    /// Save to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `LIQ_*` environment overrides on top of `self`
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(label) = std::env::var("LIQ_TOKEN_LABEL") {
            self.token_label = label;
        }

        let numeric = [
            ("LIQ_PRICE_LOCK_PERIOD", &mut self.price_lock_period),
            ("LIQ_AUCTION_START_DELAY", &mut self.auction_start_delay),
            ("LIQ_START_FREQUENCY", &mut self.start_frequency),
            ("LIQ_AUCTION_DURATION", &mut self.auction_duration),
            ("LIQ_FIRST_START", &mut self.first_start),
        ];
        for (key, slot) in numeric {
            if let Ok(raw) = std::env::var(key) {
                *slot = raw.parse().map_err(|_| Error::Config(format!("{} is not a number: {}", key, raw)))?;
            }
        }

        Ok(self)
    }

    /// Defaults with environment overrides
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.token_label.is_empty() {
            return Err(Error::InvalidParameter {
                name: "token_label".into(),
                reason: "cannot be empty".into(),
            });
        }
        if self.max_events == 0 {
            return Err(Error::InvalidParameter {
                name: "max_events".into(),
                reason: "must be greater than 0".into(),
            });
        }

        AuctionParameter::PriceLockPeriod.validate(self.price_lock_period)?;
        AuctionParameter::AuctionStartDelay.validate(self.auction_start_delay)?;

        if self.auction_duration >= self.start_frequency {
            return Err(Error::InvalidParameter {
                name: "auction_duration".into(),
                reason: "rounds must end before the next one starts".into(),
            });
        }
        if self.first_start < self.auction_start_delay + self.price_lock_period {
            return Err(Error::InvalidParameter {
                name: "first_start".into(),
                reason: "price lock of the first round would precede the timer epoch".into(),
            });
        }

        Ok(())
    }

    /// Governed parameters described by this configuration
    pub fn param_set(&self) -> ParamSet {
        ParamSet::new(
            RelativeTime::from_ticks(self.price_lock_period),
            RelativeTime::from_ticks(self.auction_start_delay),
        )
    }

    /// Round plan described by this configuration
    pub fn round_plan(&self) -> PeriodicSchedule {
        PeriodicSchedule {
            first_start: Timestamp::from_ticks(self.first_start),
            start_frequency: RelativeTime::from_ticks(self.start_frequency),
            auction_duration: RelativeTime::from_ticks(self.auction_duration),
        }
    }
}
