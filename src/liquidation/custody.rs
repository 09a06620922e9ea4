//! Custody seats and atomic transfers.
//!
//! Collateral and debt move between seats only through
//! [`AtomicTransfer::rearrange`], which applies a whole batch of transfers or
//! none of them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::core::amount::Amount;
use crate::error::{Error, Result};
use crate::utils::constants::COLLATERAL_KEYWORD;

// ═══════════════════════════════════════════════════════════════════════════════
// SEATS
// ═══════════════════════════════════════════════════════════════════════════════

/// Handle to a custody seat
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeatId(u64);

impl SeatId {
    /// Create from raw id
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw id
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SeatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "seat#{}", self.0)
    }
}

/// Allocation slot within a seat
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Keyword {
    /// Collateral held against debt
    Collateral,
}

impl Keyword {
    /// Allocation keyword as published
    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::Collateral => COLLATERAL_KEYWORD,
        }
    }
}

/// One leg of an atomic rearrangement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPart {
    /// Seat giving up the amounts
    pub from: SeatId,
    /// Seat receiving them
    pub to: SeatId,
    /// Amounts moved, by keyword
    pub amounts: BTreeMap<Keyword, Amount>,
}

impl TransferPart {
    /// Create an empty transfer between two seats
    pub fn new(from: SeatId, to: SeatId) -> Self {
        Self {
            from,
            to,
            amounts: BTreeMap::new(),
        }
    }

    /// Add an amount under `keyword`
    pub fn with(mut self, keyword: Keyword, amount: Amount) -> Self {
        self.amounts.insert(keyword, amount);
        self
    }
}

/// All-or-nothing custody primitive
pub trait AtomicTransfer: Send + Sync {
    /// Open a new seat with no allocation
    fn make_empty_seat(&self) -> Result<SeatId>;

    /// Apply every transfer, or none if any one fails
    fn rearrange(&self, transfers: &[TransferPart]) -> Result<()>;

    /// Close a seat that holds nothing
    fn release_seat(&self, seat: SeatId) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// CUSTODY LEDGER
// ═══════════════════════════════════════════════════════════════════════════════

type Allocation = BTreeMap<Keyword, Amount>;

#[derive(Debug, Default)]
struct LedgerState {
    next_seat: u64,
    seats: HashMap<SeatId, Allocation>,
    rearrangements: u64,
}

/// In-memory custody ledger
#[derive(Debug, Default)]
pub struct CustodyLedger {
    state: RwLock<LedgerState>,
}

impl CustodyLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Credit `amount` to `seat` under `keyword`
    pub fn deposit(&self, seat: SeatId, keyword: Keyword, amount: Amount) -> Result<()> {
        let mut state = self.write();
        let allocation = state
            .seats
            .get_mut(&seat)
            .ok_or_else(|| Error::SeatNotFound(seat.to_string()))?;
        credit(allocation, keyword, amount)
    }

    /// Current allocation of `seat` under `keyword`
    pub fn balance(&self, seat: SeatId, keyword: Keyword) -> Option<Amount> {
        self.read().seats.get(&seat)?.get(&keyword).copied()
    }

    /// Number of committed rearrangements
    pub fn rearrangement_count(&self) -> u64 {
        self.read().rearrangements
    }

    /// Number of open seats
    pub fn seat_count(&self) -> usize {
        self.read().seats.len()
    }
}

fn credit(allocation: &mut Allocation, keyword: Keyword, amount: Amount) -> Result<()> {
    let updated = match allocation.get(&keyword) {
        Some(held) => held.add(&amount)?,
        None => amount,
    };
    allocation.insert(keyword, updated);
    Ok(())
}

fn debit(allocation: &mut Allocation, seat: SeatId, keyword: Keyword, amount: Amount) -> Result<()> {
    if amount.is_empty() {
        return Ok(());
    }
    let held = allocation.get(&keyword).copied().unwrap_or(amount.empty_like());
    if !held.is_gte(&amount)? {
        return Err(Error::InsufficientAllocation {
            seat: format!("{} {}", seat, keyword.as_str()),
            required: amount.value(),
            available: held.value(),
        });
    }
    allocation.insert(keyword, held.subtract(&amount)?);
    Ok(())
}

impl AtomicTransfer for CustodyLedger {
    fn make_empty_seat(&self) -> Result<SeatId> {
        let mut state = self.write();
        let seat = SeatId::new(state.next_seat);
        state.next_seat += 1;
        state.seats.insert(seat, Allocation::new());
        Ok(seat)
    }

    fn rearrange(&self, transfers: &[TransferPart]) -> Result<()> {
        let mut state = self.write();

        // Work on a copy; only a fully applied batch is committed.
        let mut seats = state.seats.clone();
        for part in transfers {
            for (keyword, amount) in &part.amounts {
                let from = seats
                    .get_mut(&part.from)
                    .ok_or_else(|| Error::SeatNotFound(part.from.to_string()))?;
                debit(from, part.from, *keyword, *amount)?;

                let to = seats
                    .get_mut(&part.to)
                    .ok_or_else(|| Error::SeatNotFound(part.to.to_string()))?;
                credit(to, *keyword, *amount)?;
            }
        }

        state.seats = seats;
        state.rearrangements += 1;
        Ok(())
    }

    fn release_seat(&self, seat: SeatId) -> Result<()> {
        let mut state = self.write();
        let allocation = state
            .seats
            .get(&seat)
            .ok_or_else(|| Error::SeatNotFound(seat.to_string()))?;
        if allocation.values().any(|amount| !amount.is_empty()) {
            return Err(Error::Custody(format!("{} still holds an allocation", seat)));
        }
        state.seats.remove(&seat);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::amount::Brand;

    const COLLATERAL: Brand = Brand::new(2);

    fn coll(value: u64) -> Amount {
        Amount::new(COLLATERAL, value)
    }

    #[test]
    fn test_rearrange_moves_allocations() {
        let ledger = CustodyLedger::new();
        let vault = ledger.make_empty_seat().unwrap();
        let custody = ledger.make_empty_seat().unwrap();
        ledger.deposit(vault, Keyword::Collateral, coll(100)).unwrap();

        ledger
            .rearrange(&[TransferPart::new(vault, custody).with(Keyword::Collateral, coll(60))])
            .unwrap();

        assert_eq!(ledger.balance(vault, Keyword::Collateral), Some(coll(40)));
        assert_eq!(ledger.balance(custody, Keyword::Collateral), Some(coll(60)));
        assert_eq!(ledger.rearrangement_count(), 1);
    }

    #[test]
    fn test_failed_leg_rolls_back_whole_batch() {
        let ledger = CustodyLedger::new();
        let a = ledger.make_empty_seat().unwrap();
        let b = ledger.make_empty_seat().unwrap();
        let custody = ledger.make_empty_seat().unwrap();
        ledger.deposit(a, Keyword::Collateral, coll(100)).unwrap();
        ledger.deposit(b, Keyword::Collateral, coll(10)).unwrap();

        let err = ledger
            .rearrange(&[
                TransferPart::new(a, custody).with(Keyword::Collateral, coll(100)),
                TransferPart::new(b, custody).with(Keyword::Collateral, coll(20)),
            ])
            .unwrap_err();

        assert_eq!(err.code(), 2004);
        assert_eq!(ledger.balance(a, Keyword::Collateral), Some(coll(100)));
        assert_eq!(ledger.balance(custody, Keyword::Collateral), None);
        assert_eq!(ledger.rearrangement_count(), 0);
    }

    #[test]
    fn test_release_seat() {
        let ledger = CustodyLedger::new();
        let empty = ledger.make_empty_seat().unwrap();
        let funded = ledger.make_empty_seat().unwrap();
        ledger.deposit(funded, Keyword::Collateral, coll(5)).unwrap();

        ledger.release_seat(empty).unwrap();
        assert_eq!(ledger.seat_count(), 1);

        let err = ledger.release_seat(funded).unwrap_err();
        assert_eq!(err.code(), 2005);
        assert_eq!(ledger.balance(funded, Keyword::Collateral), Some(coll(5)));
        assert!(matches!(ledger.release_seat(empty), Err(Error::SeatNotFound(_))));
    }

    #[test]
    fn test_unknown_seat() {
        let ledger = CustodyLedger::new();
        let custody = ledger.make_empty_seat().unwrap();
        let err = ledger
            .rearrange(&[TransferPart::new(SeatId::new(99), custody).with(Keyword::Collateral, coll(1))])
            .unwrap_err();
        assert!(matches!(err, Error::SeatNotFound(_)));
    }
}
