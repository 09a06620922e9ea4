//! Liquidation engine.
//!
//! Runs when the liquidation wakeup fires:
//! - Selection of every vault below the collateralization criteria
//! - Atomic transfer of their collateral into one custody seat
//! - Settlement of the batch once auction proceeds are known

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::custody::{AtomicTransfer, Keyword, SeatId, TransferPart};
use super::proceeds::{reconcile, LiquidationResult};
use super::vault::{CollateralizationCriteria, LiquidatableVault, PrioritizedVaults, VaultId, VaultStatus};
use crate::core::amount::{Amount, Brand};
use crate::error::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION BATCH
// ═══════════════════════════════════════════════════════════════════════════════

/// Amounts of a vault at the moment it was selected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSnapshot {
    /// Vault the snapshot belongs to
    pub vault_id: VaultId,
    /// Collateral moved to custody
    pub collateral_amount: Amount,
    /// Debt owed at selection
    pub debt_amount: Amount,
}

/// Selected vault with its snapshot
pub struct LiquidatingVault<V: ?Sized> {
    /// The vault
    pub vault: Arc<V>,
    /// Amounts at selection
    pub snapshot: VaultSnapshot,
}

/// Vaults handed to custody in one atomic transfer
pub struct LiquidationBatch<V: ?Sized> {
    vaults: Vec<LiquidatingVault<V>>,
    total_debt: Amount,
    total_collateral: Amount,
    custody_seat: Option<SeatId>,
    unmarked: Vec<VaultId>,
}

impl<V: ?Sized> LiquidationBatch<V> {
    fn empty(debt_brand: Brand, collateral_brand: Brand) -> Self {
        Self {
            vaults: Vec::new(),
            total_debt: Amount::empty(debt_brand),
            total_collateral: Amount::empty(collateral_brand),
            custody_seat: None,
            unmarked: Vec::new(),
        }
    }

    /// Selected vaults, highest risk first
    pub fn vaults(&self) -> &[LiquidatingVault<V>] {
        &self.vaults
    }

    /// Ids of the selected vaults, highest risk first
    pub fn vault_ids(&self) -> Vec<VaultId> {
        self.vaults.iter().map(|v| v.snapshot.vault_id).collect()
    }

    /// Snapshot of one selected vault
    pub fn snapshot(&self, id: VaultId) -> Option<&VaultSnapshot> {
        self.vaults
            .iter()
            .map(|v| &v.snapshot)
            .find(|s| s.vault_id == id)
    }

    /// Sum of selected debts
    pub fn total_debt(&self) -> Amount {
        self.total_debt
    }

    /// Sum of collateral moved to custody
    pub fn total_collateral(&self) -> Amount {
        self.total_collateral
    }

    /// Seat holding the batch's collateral; `None` for an empty batch
    pub fn custody_seat(&self) -> Option<SeatId> {
        self.custody_seat
    }

    /// Vaults whose collateral is in custody but that refused to be marked liquidating
    pub fn unmarked(&self) -> &[VaultId] {
        &self.unmarked
    }

    /// Get number of vaults in batch
    pub fn len(&self) -> usize {
        self.vaults.len()
    }

    /// Check if batch is empty
    pub fn is_empty(&self) -> bool {
        self.vaults.is_empty()
    }
}

impl<V: ?Sized> std::fmt::Debug for LiquidationBatch<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiquidationBatch")
            .field("vaults", &self.vault_ids())
            .field("total_debt", &self.total_debt)
            .field("total_collateral", &self.total_collateral)
            .field("custody_seat", &self.custody_seat)
            .field("unmarked", &self.unmarked)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Running totals across batches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationStats {
    /// Non-empty batches handed to custody
    pub batches: u64,
    /// Vaults moved to liquidating
    pub vaults_liquidated: u64,
    /// Batches settled
    pub settlements: u64,
    /// Debt repaid from proceeds
    pub total_burned: u64,
    /// Debt left uncovered
    pub total_shortfall: u64,
    /// Proceeds beyond debt
    pub total_overage: u64,
}

/// Selects vaults for liquidation and settles their proceeds
#[derive(Debug, Clone, Default)]
pub struct LiquidationEngine {
    liquidating: HashSet<VaultId>,
    stats: LiquidationStats,
}

impl LiquidationEngine {
    /// Create a new liquidation engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a vault is in an unsettled batch
    pub fn is_liquidating(&self, id: VaultId) -> bool {
        self.liquidating.contains(&id)
    }

    /// Number of vaults in unsettled batches
    pub fn liquidating_count(&self) -> usize {
        self.liquidating.len()
    }

    /// Running totals
    pub fn stats(&self) -> LiquidationStats {
        self.stats
    }

    /// Remove every vault below `criteria` and move its collateral to custody.
    ///
    /// All candidates are validated before anything is transferred, and the
    /// transfers run as one [`AtomicTransfer::rearrange`]. On error no vault
    /// has changed status and no custody seat is left behind, but candidates
    /// already removed from `prioritized` are not re-inserted. Once the
    /// transfer commits the batch is always returned; vaults that refuse the
    /// liquidating transition are listed in [`LiquidationBatch::unmarked`].
    pub fn select_and_custody<V, P, X>(
        &mut self,
        custody: &X,
        criteria: &CollateralizationCriteria,
        prioritized: &mut P,
        debt_brand: Brand,
        collateral_brand: Brand,
    ) -> Result<LiquidationBatch<V>>
    where
        V: LiquidatableVault + ?Sized,
        P: PrioritizedVaults<V> + ?Sized,
        X: AtomicTransfer + ?Sized,
    {
        let candidates = prioritized.remove_vaults_below(criteria);
        let mut batch = LiquidationBatch::empty(debt_brand, collateral_brand);
        if candidates.is_empty() {
            debug!("No vaults below liquidation threshold");
            return Ok(batch);
        }

        let mut seen = HashSet::new();
        for vault in candidates {
            let snapshot = self.validate(vault.as_ref(), &mut seen, debt_brand, collateral_brand)?;
            batch.total_debt = batch.total_debt.add(&snapshot.debt_amount)?;
            batch.total_collateral = batch.total_collateral.add(&snapshot.collateral_amount)?;
            batch.vaults.push(LiquidatingVault { vault, snapshot });
        }

        let seat = custody.make_empty_seat()?;
        let transfers: Vec<TransferPart> = batch
            .vaults
            .iter()
            .map(|v| {
                TransferPart::new(v.vault.vault_seat(), seat)
                    .with(Keyword::Collateral, v.snapshot.collateral_amount)
            })
            .collect();
        if let Err(err) = custody.rearrange(&transfers) {
            if let Err(release_err) = custody.release_seat(seat) {
                warn!(%seat, error = %release_err, "Could not release unused custody seat");
            }
            return Err(err);
        }
        batch.custody_seat = Some(seat);

        // The collateral has moved; every vault stays in the batch even if
        // its own status transition is refused.
        for v in &batch.vaults {
            let id = v.snapshot.vault_id;
            if let Err(err) = v.vault.liquidating() {
                error!(vault = %id, error = %err, "Vault refused liquidating transition after custody");
                batch.unmarked.push(id);
            }
            self.liquidating.insert(id);
        }

        self.stats.batches += 1;
        self.stats.vaults_liquidated += batch.len() as u64;
        info!(
            vaults = batch.len(),
            debt = %batch.total_debt,
            collateral = %batch.total_collateral,
            %seat,
            "Vaults moved to liquidation custody"
        );

        Ok(batch)
    }

    fn validate<V: LiquidatableVault + ?Sized>(
        &self,
        vault: &V,
        seen: &mut HashSet<VaultId>,
        debt_brand: Brand,
        collateral_brand: Brand,
    ) -> Result<VaultSnapshot> {
        let id = vault.id();
        let malformed = |reason: &str| Error::MalformedCandidate {
            vault: id.to_string(),
            reason: reason.into(),
        };

        if vault.status() != VaultStatus::Active || self.liquidating.contains(&id) {
            return Err(malformed("already liquidating"));
        }
        if !seen.insert(id) {
            return Err(malformed("selected twice"));
        }

        let collateral_amount = vault.collateral_amount();
        let debt_amount = vault.current_debt();
        collateral_amount.ensure_brand(collateral_brand)?;
        debt_amount.ensure_brand(debt_brand)?;

        Ok(VaultSnapshot {
            vault_id: id,
            collateral_amount,
            debt_amount,
        })
    }

    /// Reconcile a batch against what its auction recovered
    pub fn settle<V: ?Sized>(
        &mut self,
        batch: LiquidationBatch<V>,
        recovered: &Amount,
    ) -> Result<LiquidationResult> {
        let result = reconcile(&batch.total_debt, recovered)?;

        for id in batch.vault_ids() {
            self.liquidating.remove(&id);
        }

        self.stats.settlements += 1;
        self.stats.total_burned = self.stats.total_burned.saturating_add(result.to_burn.value());
        self.stats.total_shortfall = self
            .stats
            .total_shortfall
            .saturating_add(result.shortfall.value());
        self.stats.total_overage = self.stats.total_overage.saturating_add(result.overage.value());

        info!(
            vaults = batch.len(),
            burned = %result.to_burn,
            shortfall = %result.shortfall,
            overage = %result.overage,
            "Liquidation settled"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liquidation::custody::CustodyLedger;
    use crate::liquidation::vault::{ManagedVault, VaultQueue};
    use rust_decimal::Decimal;

    const DEBT: Brand = Brand::new(1);
    const COLLATERAL: Brand = Brand::new(2);

    struct Fixture {
        ledger: CustodyLedger,
        queue: VaultQueue<ManagedVault>,
        vaults: Vec<Arc<ManagedVault>>,
    }

    /// price 1, margin 1: a vault is below when debt > collateral
    fn criteria() -> CollateralizationCriteria {
        CollateralizationCriteria::new(Decimal::ONE, Decimal::ONE, Decimal::ONE)
    }

    fn fixture(positions: &[(u64, u64)]) -> Fixture {
        let ledger = CustodyLedger::new();
        let mut queue = VaultQueue::new();
        let mut vaults = Vec::new();
        for (i, (collateral, debt)) in positions.iter().enumerate() {
            let seat = ledger.make_empty_seat().unwrap();
            let collateral = Amount::new(COLLATERAL, *collateral);
            ledger.deposit(seat, Keyword::Collateral, collateral).unwrap();
            let vault = Arc::new(ManagedVault::new(
                VaultId::new(i as u64),
                seat,
                collateral,
                Amount::new(DEBT, *debt),
            ));
            queue.insert(vault.clone());
            vaults.push(vault);
        }
        Fixture { ledger, queue, vaults }
    }

    #[test]
    fn test_no_candidates_is_noop() {
        let mut f = fixture(&[(100, 50), (100, 100)]);
        let seats = f.ledger.seat_count();
        let mut engine = LiquidationEngine::new();

        let batch = engine
            .select_and_custody(&f.ledger, &criteria(), &mut f.queue, DEBT, COLLATERAL)
            .unwrap();

        assert!(batch.is_empty());
        assert_eq!(batch.custody_seat(), None);
        assert_eq!(batch.total_debt(), Amount::empty(DEBT));
        assert_eq!(f.ledger.seat_count(), seats);
        assert_eq!(f.ledger.rearrangement_count(), 0);
        assert_eq!(engine.stats().batches, 0);
    }

    #[test]
    fn test_selected_vaults_move_to_custody() {
        let mut f = fixture(&[(100, 150), (100, 50), (80, 100)]);
        let mut engine = LiquidationEngine::new();

        let batch = engine
            .select_and_custody(&f.ledger, &criteria(), &mut f.queue, DEBT, COLLATERAL)
            .unwrap();

        assert_eq!(batch.vault_ids(), vec![VaultId::new(0), VaultId::new(2)]);
        assert_eq!(batch.total_debt(), Amount::new(DEBT, 250));
        assert_eq!(batch.total_collateral(), Amount::new(COLLATERAL, 180));

        let seat = batch.custody_seat().unwrap();
        assert_eq!(f.ledger.balance(seat, Keyword::Collateral), Some(Amount::new(COLLATERAL, 180)));
        assert_eq!(f.ledger.rearrangement_count(), 1);

        assert_eq!(f.vaults[0].status(), VaultStatus::Liquidating);
        assert_eq!(f.vaults[1].status(), VaultStatus::Active);
        assert_eq!(f.vaults[2].status(), VaultStatus::Liquidating);
        assert!(engine.is_liquidating(VaultId::new(0)));
        assert_eq!(f.queue.len(), 1);
    }

    #[test]
    fn test_already_liquidating_candidate_fails_fast() {
        let mut f = fixture(&[(100, 150), (100, 200)]);
        f.vaults[1].liquidating().unwrap();
        let mut engine = LiquidationEngine::new();

        let err = engine
            .select_and_custody(&f.ledger, &criteria(), &mut f.queue, DEBT, COLLATERAL)
            .unwrap_err();

        assert!(matches!(err, Error::MalformedCandidate { .. }));
        assert_eq!(f.vaults[0].status(), VaultStatus::Active);
        assert_eq!(f.ledger.rearrangement_count(), 0);
    }

    #[test]
    fn test_failed_transfer_leaves_vaults_active() {
        let mut f = fixture(&[(100, 150), (100, 200)]);
        // Drain vault 1's seat so its transfer leg cannot be funded.
        let sink = f.ledger.make_empty_seat().unwrap();
        f.ledger
            .rearrange(&[TransferPart::new(f.vaults[1].vault_seat(), sink)
                .with(Keyword::Collateral, Amount::new(COLLATERAL, 100))])
            .unwrap();
        let seats = f.ledger.seat_count();
        let mut engine = LiquidationEngine::new();

        let err = engine
            .select_and_custody(&f.ledger, &criteria(), &mut f.queue, DEBT, COLLATERAL)
            .unwrap_err();

        assert_eq!(err.code(), 2004);
        assert!(f.vaults.iter().all(|v| v.status() == VaultStatus::Active));
        assert_eq!(engine.liquidating_count(), 0);
        assert_eq!(f.ledger.seat_count(), seats);
        assert_eq!(
            f.ledger.balance(f.vaults[0].vault_seat(), Keyword::Collateral),
            Some(Amount::new(COLLATERAL, 100))
        );
    }

    /// Vault that reports `Active` but may refuse the liquidating transition
    struct StubbornVault {
        inner: ManagedVault,
        refuse: bool,
    }

    impl LiquidatableVault for StubbornVault {
        fn id(&self) -> VaultId {
            self.inner.id()
        }

        fn status(&self) -> VaultStatus {
            self.inner.status()
        }

        fn liquidating(&self) -> Result<()> {
            if self.refuse {
                return Err(Error::MalformedCandidate {
                    vault: self.id().to_string(),
                    reason: "transition refused".into(),
                });
            }
            self.inner.liquidating()
        }

        fn collateral_amount(&self) -> Amount {
            self.inner.collateral_amount()
        }

        fn current_debt(&self) -> Amount {
            self.inner.current_debt()
        }

        fn vault_seat(&self) -> SeatId {
            self.inner.vault_seat()
        }
    }

    #[test]
    fn test_refused_transition_keeps_batch_after_custody() {
        let ledger = CustodyLedger::new();
        let mut queue = VaultQueue::new();
        let mut vaults = Vec::new();
        for (i, refuse) in [false, true, false].into_iter().enumerate() {
            let seat = ledger.make_empty_seat().unwrap();
            let collateral = Amount::new(COLLATERAL, 100);
            ledger.deposit(seat, Keyword::Collateral, collateral).unwrap();
            let debt = Amount::new(DEBT, 300 - 50 * i as u64);
            let vault = Arc::new(StubbornVault {
                inner: ManagedVault::new(VaultId::new(i as u64), seat, collateral, debt),
                refuse,
            });
            queue.insert(vault.clone());
            vaults.push(vault);
        }
        let mut engine = LiquidationEngine::new();

        let batch = engine
            .select_and_custody(&ledger, &criteria(), &mut queue, DEBT, COLLATERAL)
            .unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.unmarked(), &[VaultId::new(1)]);
        let seat = batch.custody_seat().unwrap();
        assert_eq!(ledger.balance(seat, Keyword::Collateral), Some(Amount::new(COLLATERAL, 300)));
        // Marking carried on past the refusal.
        assert_eq!(vaults[0].status(), VaultStatus::Liquidating);
        assert_eq!(vaults[2].status(), VaultStatus::Liquidating);
        assert_eq!(engine.liquidating_count(), 3);

        engine.settle(batch, &Amount::new(DEBT, 600)).unwrap();
        assert_eq!(engine.liquidating_count(), 0);
    }

    #[test]
    fn test_brand_mismatch_candidate() {
        let mut f = fixture(&[(100, 150)]);
        let mut engine = LiquidationEngine::new();

        let err = engine
            .select_and_custody(&f.ledger, &criteria(), &mut f.queue, DEBT, Brand::new(7))
            .unwrap_err();
        assert!(matches!(err, Error::BrandMismatch { .. }));
    }

    #[test]
    fn test_settle_releases_vaults() {
        let mut f = fixture(&[(100, 150), (80, 100)]);
        let mut engine = LiquidationEngine::new();
        let batch = engine
            .select_and_custody(&f.ledger, &criteria(), &mut f.queue, DEBT, COLLATERAL)
            .unwrap();

        let result = engine.settle(batch, &Amount::new(DEBT, 200)).unwrap();

        assert_eq!(result.to_burn, Amount::new(DEBT, 200));
        assert_eq!(result.shortfall, Amount::new(DEBT, 50));
        assert_eq!(engine.liquidating_count(), 0);

        let stats = engine.stats();
        assert_eq!(stats.batches, 1);
        assert_eq!(stats.vaults_liquidated, 2);
        assert_eq!(stats.settlements, 1);
        assert_eq!(stats.total_shortfall, 50);
        // Status is terminal; settling does not reopen vaults.
        assert_eq!(f.vaults[0].status(), VaultStatus::Liquidating);
    }
}
