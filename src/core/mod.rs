//! Core building blocks.
//!
//! - Branded amounts for debt and collateral
//! - Timer timestamps and durations
//! - Liquidator configuration

pub mod amount;
pub mod config;
pub mod time;

pub use amount::*;
pub use config::*;
pub use time::*;
