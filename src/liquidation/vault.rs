//! Liquidatable vaults and their priority queue.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

use super::custody::SeatId;
use crate::core::amount::Amount;
use crate::error::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// VAULT
// ═══════════════════════════════════════════════════════════════════════════════

/// Unique identifier for a vault
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VaultId(u64);

impl VaultId {
    /// Create from raw id
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw id
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for VaultId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "vault-{}", self.0)
    }
}

/// Vault lifecycle as seen by the liquidator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaultStatus {
    /// Open and eligible for liquidation
    Active,
    /// Collateral handed to custody; terminal
    Liquidating,
}

/// Vault capability consumed by the liquidation engine
pub trait LiquidatableVault: Send + Sync {
    /// Vault identifier
    fn id(&self) -> VaultId;

    /// Current status
    fn status(&self) -> VaultStatus;

    /// Transition to liquidating. Fails if already liquidating.
    fn liquidating(&self) -> Result<()>;

    /// Collateral currently held
    fn collateral_amount(&self) -> Amount;

    /// Debt currently owed, interest included
    fn current_debt(&self) -> Amount;

    /// Seat holding the vault's allocation
    fn vault_seat(&self) -> SeatId;
}

/// In-memory vault
#[derive(Debug)]
pub struct ManagedVault {
    id: VaultId,
    seat: SeatId,
    collateral: Amount,
    debt: Amount,
    status: Mutex<VaultStatus>,
}

impl ManagedVault {
    /// Create an active vault
    pub fn new(id: VaultId, seat: SeatId, collateral: Amount, debt: Amount) -> Self {
        Self {
            id,
            seat,
            collateral,
            debt,
            status: Mutex::new(VaultStatus::Active),
        }
    }

    fn status_guard(&self) -> MutexGuard<'_, VaultStatus> {
        self.status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LiquidatableVault for ManagedVault {
    fn id(&self) -> VaultId {
        self.id
    }

    fn status(&self) -> VaultStatus {
        *self.status_guard()
    }

    fn liquidating(&self) -> Result<()> {
        let mut status = self.status_guard();
        if *status == VaultStatus::Liquidating {
            return Err(Error::MalformedCandidate {
                vault: self.id.to_string(),
                reason: "already liquidating".into(),
            });
        }
        *status = VaultStatus::Liquidating;
        Ok(())
    }

    fn collateral_amount(&self) -> Amount {
        self.collateral
    }

    fn current_debt(&self) -> Amount {
        self.debt
    }

    fn vault_seat(&self) -> SeatId {
        self.seat
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERALIZATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Threshold a vault must stay above to avoid liquidation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralizationCriteria {
    /// Locked price, debt units per collateral unit
    pub price: Decimal,
    /// Accrued interest multiplier applied to recorded debt
    pub interest: Decimal,
    /// Required collateralization margin (e.g. 1.5)
    pub margin: Decimal,
}

impl CollateralizationCriteria {
    /// Create criteria
    pub fn new(price: Decimal, interest: Decimal, margin: Decimal) -> Self {
        Self {
            price,
            interest,
            margin,
        }
    }

    /// Required collateral value over actual collateral value.
    ///
    /// Above one means below the threshold. `None` when collateral is
    /// worthless or the ratio cannot be represented.
    pub fn risk(&self, collateral: &Amount, debt: &Amount) -> Option<Decimal> {
        let required = Decimal::from(debt.value())
            .checked_mul(self.interest)?
            .checked_mul(self.margin)?;
        let held = Decimal::from(collateral.value()).checked_mul(self.price)?;
        if held.is_zero() {
            return None;
        }
        required.checked_div(held)
    }

    /// Check if a vault with these amounts must be liquidated
    pub fn is_below(&self, collateral: &Amount, debt: &Amount) -> bool {
        if debt.is_empty() {
            return false;
        }
        match self.risk(collateral, debt) {
            Some(risk) => risk > Decimal::ONE,
            None => true,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRIORITY QUEUE
// ═══════════════════════════════════════════════════════════════════════════════

/// Vaults ordered by liquidation priority
pub trait PrioritizedVaults<V: ?Sized> {
    /// Remove and return every vault below `criteria`, highest risk first
    fn remove_vaults_below(&mut self, criteria: &CollateralizationCriteria) -> Vec<Arc<V>>;
}

/// In-memory priority queue keyed by current risk
pub struct VaultQueue<V: ?Sized> {
    vaults: Vec<Arc<V>>,
}

impl<V: ?Sized> Default for VaultQueue<V> {
    fn default() -> Self {
        Self { vaults: Vec::new() }
    }
}

impl<V: LiquidatableVault + ?Sized> VaultQueue<V> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vault
    pub fn insert(&mut self, vault: Arc<V>) {
        self.vaults.push(vault);
    }

    /// Number of queued vaults
    pub fn len(&self) -> usize {
        self.vaults.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.vaults.is_empty()
    }

    /// Check if `id` is queued
    pub fn contains(&self, id: VaultId) -> bool {
        self.vaults.iter().any(|v| v.id() == id)
    }
}

impl<V: LiquidatableVault + ?Sized> PrioritizedVaults<V> for VaultQueue<V> {
    fn remove_vaults_below(&mut self, criteria: &CollateralizationCriteria) -> Vec<Arc<V>> {
        let (mut below, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.vaults)
            .into_iter()
            .partition(|v| criteria.is_below(&v.collateral_amount(), &v.current_debt()));
        self.vaults = kept;

        // Unrepresentable risk sorts first; ties keep insertion order.
        below.sort_by(|a, b| {
            let ra = criteria.risk(&a.collateral_amount(), &a.current_debt());
            let rb = criteria.risk(&b.collateral_amount(), &b.current_debt());
            match (ra, rb) {
                (None, None) => std::cmp::Ordering::Equal,
                (None, Some(_)) => std::cmp::Ordering::Less,
                (Some(_), None) => std::cmp::Ordering::Greater,
                (Some(ra), Some(rb)) => rb.cmp(&ra),
            }
        });
        below
    }
}
