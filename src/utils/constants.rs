//! Liquidator constants and defaults.
//!
//! All scheduling and liquidation defaults are defined here for easy auditing.

// ═══════════════════════════════════════════════════════════════════════════════
// TIMER CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Smallest timer step. The rescheduler fires this far after the nominal start
/// so that it always observes the following round.
pub const TICK: u64 = 1;

/// Label prefix for cancel tokens minted by the scheduler
pub const DEFAULT_TOKEN_LABEL: &str = "liq";

/// Scheduler decisions kept in memory
pub const DEFAULT_MAX_EVENTS: usize = 1000;

// ═══════════════════════════════════════════════════════════════════════════════
// AUCTION PARAMETER DEFAULTS (seconds)
// ═══════════════════════════════════════════════════════════════════════════════

/// Price is locked 30 minutes before the nominal start
pub const DEFAULT_PRICE_LOCK_PERIOD: u64 = 30 * 60;

/// Auctioning begins 10 seconds after the nominal start
pub const DEFAULT_AUCTION_START_DELAY: u64 = 10;

/// A new round starts every hour
pub const DEFAULT_START_FREQUENCY: u64 = 60 * 60;

/// Each round runs for 20 minutes
pub const DEFAULT_AUCTION_DURATION: u64 = 20 * 60;

/// Maximum governed duration (one week)
pub const MAX_GOVERNED_DURATION: u64 = 7 * 24 * 60 * 60;

// ═══════════════════════════════════════════════════════════════════════════════
// CUSTODY CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Keyword under which vault collateral is held
pub const COLLATERAL_KEYWORD: &str = "Collateral";
