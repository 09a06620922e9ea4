//! Proceeds reconciliation.
//!
//! Splits what an auction recovered against the debt it had to cover:
//! the part that repays debt is burned, any excess is overage, and any gap is
//! shortfall.

use serde::{Deserialize, Serialize};

use crate::core::amount::Amount;
use crate::error::{Error, Result};

/// How recovered proceeds settle a liquidated debt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationResult {
    /// Recovered beyond the debt, returned to vault holders
    pub overage: Amount,
    /// Debt left uncovered
    pub shortfall: Amount,
    /// Recovered amount that repays debt
    pub to_burn: Amount,
}

impl LiquidationResult {
    /// Check if the debt was fully covered
    pub fn is_fully_covered(&self) -> bool {
        self.shortfall.is_empty()
    }
}

/// Reconcile `debt` against `recovered`.
///
/// Both amounts must share a brand. Fails with a critical
/// [`Error::InvariantViolation`] rather than return a result where
/// `debt != to_burn + shortfall`.
pub fn reconcile(debt: &Amount, recovered: &Amount) -> Result<LiquidationResult> {
    recovered.ensure_brand(debt.brand())?;
    let to_burn = debt.min(recovered)?;
    let result = LiquidationResult {
        overage: recovered.subtract(&to_burn)?,
        shortfall: debt.subtract(&to_burn)?,
        to_burn,
    };

    let covered = result.to_burn.add(&result.shortfall)?;
    if covered != *debt {
        return Err(Error::InvariantViolation(format!(
            "debt {} != to_burn {} + shortfall {}",
            debt, result.to_burn, result.shortfall
        )));
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::amount::Brand;
    use proptest::prelude::*;

    const DEBT: Brand = Brand::new(1);

    fn amt(value: u64) -> Amount {
        Amount::new(DEBT, value)
    }

    fn split(debt: u64, recovered: u64) -> (u64, u64, u64) {
        let r = reconcile(&amt(debt), &amt(recovered)).unwrap();
        (r.overage.value(), r.shortfall.value(), r.to_burn.value())
    }

    #[test]
    fn test_exact_recovery() {
        assert_eq!(split(100, 100), (0, 0, 100));
    }

    #[test]
    fn test_partial_recovery() {
        assert_eq!(split(100, 60), (0, 40, 60));
    }

    #[test]
    fn test_excess_recovery() {
        assert_eq!(split(60, 100), (40, 0, 60));
    }

    #[test]
    fn test_nothing_recovered() {
        assert_eq!(split(100, 0), (0, 100, 0));
        assert!(!reconcile(&amt(100), &amt(0)).unwrap().is_fully_covered());
    }

    #[test]
    fn test_brand_mismatch() {
        let err = reconcile(&amt(10), &Amount::new(Brand::new(9), 10)).unwrap_err();
        assert_eq!(err.code(), 2002);
    }

    proptest! {
        #[test]
        fn test_burn_plus_shortfall_is_debt(debt in any::<u64>(), recovered in any::<u64>()) {
            let r = reconcile(&amt(debt), &amt(recovered)).unwrap();
            prop_assert_eq!(r.to_burn.value() + r.shortfall.value(), debt);
            prop_assert!(r.overage.is_empty() || r.shortfall.is_empty());
            prop_assert_eq!(r.to_burn.value(), debt.min(recovered));
        }
    }
}
