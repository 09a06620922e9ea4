//! Absolute and relative timer values.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Absolute instant as reported by the timer service
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(u64);

/// Duration between two timer instants
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct RelativeTime(u64);

impl Timestamp {
    /// Timer epoch
    pub const ZERO: Self = Self(0);

    /// Create from raw ticks
    pub const fn from_ticks(ticks: u64) -> Self {
        Self(ticks)
    }

    /// Raw tick count
    pub fn ticks(&self) -> u64 {
        self.0
    }

    /// `self + rel`, failing on overflow
    pub fn add_rel(&self, rel: RelativeTime) -> Result<Timestamp> {
        self.0.checked_add(rel.0).map(Self).ok_or_else(|| Error::TimeOutOfRange {
            operation: format!("{} + {}", self.0, rel.0),
        })
    }

    /// `self - rel`, failing if the result would precede the epoch
    pub fn sub_rel(&self, rel: RelativeTime) -> Result<Timestamp> {
        self.0.checked_sub(rel.0).map(Self).ok_or_else(|| Error::TimeOutOfRange {
            operation: format!("{} - {}", self.0, rel.0),
        })
    }
}

impl RelativeTime {
    /// Create from raw ticks
    pub const fn from_ticks(ticks: u64) -> Self {
        Self(ticks)
    }

    /// Raw tick count
    pub fn ticks(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.0)
    }
}

impl std::fmt::Display for RelativeTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ticks", self.0)
    }
}
