//! Branded amounts.
//!
//! Every quantity the liquidator handles carries the brand (denomination) it
//! was issued in, so debt and collateral can never be mixed by accident.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// BRAND
// ═══════════════════════════════════════════════════════════════════════════════

/// Denomination of an amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Brand(u32);

impl Brand {
    /// Create a brand from its registry id
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Registry id of this brand
    pub fn id(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Brand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "brand#{}", self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// AMOUNT
// ═══════════════════════════════════════════════════════════════════════════════

/// Non-negative quantity of a single brand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    brand: Brand,
    value: u64,
}

impl Amount {
    /// Create an amount
    pub const fn new(brand: Brand, value: u64) -> Self {
        Self { brand, value }
    }

    /// Zero amount of a brand
    pub const fn empty(brand: Brand) -> Self {
        Self { brand, value: 0 }
    }

    /// Zero amount with the same brand as `self`
    pub fn empty_like(&self) -> Self {
        Self::empty(self.brand)
    }

    /// Brand of this amount
    pub fn brand(&self) -> Brand {
        self.brand
    }

    /// Raw value
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Check if zero
    pub fn is_empty(&self) -> bool {
        self.value == 0
    }

    /// Fail unless this amount is denominated in `brand`
    pub fn ensure_brand(&self, brand: Brand) -> Result<()> {
        if self.brand != brand {
            return Err(Error::BrandMismatch {
                expected: brand.to_string(),
                got: self.brand.to_string(),
            });
        }
        Ok(())
    }

    /// Checked addition
    pub fn add(&self, other: &Amount) -> Result<Amount> {
        other.ensure_brand(self.brand)?;
        let value = self.value.checked_add(other.value).ok_or_else(|| Error::Overflow {
            operation: format!("{} + {}", self, other),
        })?;
        Ok(Self::new(self.brand, value))
    }

    /// Checked subtraction
    pub fn subtract(&self, other: &Amount) -> Result<Amount> {
        other.ensure_brand(self.brand)?;
        let value = self.value.checked_sub(other.value).ok_or_else(|| Error::Underflow {
            operation: format!("{} - {}", self, other),
        })?;
        Ok(Self::new(self.brand, value))
    }

    /// Greater-or-equal comparison within one brand
    pub fn is_gte(&self, other: &Amount) -> Result<bool> {
        other.ensure_brand(self.brand)?;
        Ok(self.value >= other.value)
    }

    /// Smaller of two amounts of the same brand
    pub fn min(&self, other: &Amount) -> Result<Amount> {
        Ok(if self.is_gte(other)? { *other } else { *self })
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.value, self.brand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEBT: Brand = Brand::new(1);
    const COLLATERAL: Brand = Brand::new(2);

    #[test]
    fn test_add_and_subtract() {
        let a = Amount::new(DEBT, 70);
        let b = Amount::new(DEBT, 30);

        assert_eq!(a.add(&b).unwrap().value(), 100);
        assert_eq!(a.subtract(&b).unwrap().value(), 40);
        assert!(b.subtract(&a).is_err());
    }

    #[test]
    fn test_brand_mismatch_rejected() {
        let debt = Amount::new(DEBT, 10);
        let collateral = Amount::new(COLLATERAL, 10);

        let err = debt.add(&collateral).unwrap_err();
        assert_eq!(err.code(), 2002);
        assert!(debt.is_gte(&collateral).is_err());
    }

    #[test]
    fn test_overflow_detected() {
        let max = Amount::new(DEBT, u64::MAX);
        assert!(matches!(max.add(&Amount::new(DEBT, 1)), Err(Error::Overflow { .. })));
    }

    #[test]
    fn test_min() {
        let a = Amount::new(DEBT, 5);
        let b = Amount::new(DEBT, 9);
        assert_eq!(a.min(&b).unwrap(), a);
        assert_eq!(b.min(&a).unwrap(), a);
        assert!(Amount::empty(DEBT).is_empty());
    }
}
