//! Cancel tokens.
//!
//! A token names one scheduling epoch. Every wakeup armed under it is
//! invalidated together by `TimerService::cancel`.

use serde::{Deserialize, Serialize};

/// Handle gating a set of wakeups
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CancelToken {
    label: String,
    epoch: u64,
}

impl CancelToken {
    /// Label shared by all tokens of one maker
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Epoch number, strictly increasing per maker
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

impl std::fmt::Display for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.label, self.epoch)
    }
}

/// Mints labelled tokens, never repeating an epoch
#[derive(Debug, Clone)]
pub struct CancelTokenMaker {
    label: String,
    next_epoch: u64,
}

impl CancelTokenMaker {
    /// Create a maker for `label`
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            next_epoch: 1,
        }
    }

    /// Mint a fresh token
    pub fn make(&mut self) -> CancelToken {
        let token = CancelToken {
            label: self.label.clone(),
            epoch: self.next_epoch,
        };
        self.next_epoch += 1;
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_never_reused() {
        let mut maker = CancelTokenMaker::new("liq");
        let a = maker.make();
        let b = maker.make();

        assert_ne!(a, b);
        assert!(b.epoch() > a.epoch());
        assert_eq!(a.label(), "liq");
        assert_eq!(b.to_string(), "liq-2");
    }
}
