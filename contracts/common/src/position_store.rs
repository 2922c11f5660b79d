//! Position Store
//!
//! Owns the user → position map and the aggregate totals. Every mutation
//! goes through [`PositionStore::apply`], which enforces the per-position
//! minimum ratio and keeps totals in lockstep with the map.

use crate::errors::{BtcUsdError, BtcUsdResult, UnsafeOperation};
use crate::math::collateral_ratio_bps;
use crate::types::{Address, Position};
use crate::BTreeMap;

/// Signed change to a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PositionDelta {
    /// wBTC units, negative to remove
    pub collateral: i128,
    /// btcUSD units, negative to repay
    pub debt: i128,
}

impl PositionDelta {
    pub fn collateral(amount: i128) -> Self {
        Self { collateral: amount, debt: 0 }
    }

    pub fn debt(amount: i128) -> Self {
        Self { collateral: 0, debt: amount }
    }

    pub fn new(collateral: i128, debt: i128) -> Self {
        Self { collateral, debt }
    }

    /// True if the delta can lower the collateral ratio
    pub fn adds_risk(&self) -> bool {
        self.collateral < 0 || self.debt > 0
    }
}

/// How `apply` validates the resulting position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantCheck {
    /// Position with debt must stay at or above `min_ratio_bps` at `price`
    MinRatio {
        price: u128,
        min_ratio_bps: u64,
        operation: UnsafeOperation,
    },
    /// Liquidation: skips the ratio check, only shrinking deltas allowed
    LiquidationOverride,
}

/// Saved state for rolling back a single user's commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCheckpoint {
    user: Address,
    position: Option<Position>,
    total_collateral: u128,
    total_debt: u128,
}

/// The primary ledger
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionStore {
    positions: BTreeMap<Address, Position>,
    total_collateral: u128,
    total_debt: u128,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Position of `user`, zero-valued if absent
    pub fn get(&self, user: &Address) -> Position {
        self.positions.get(user).copied().unwrap_or_default()
    }

    /// Apply `delta` to `user`'s position and commit it with the totals.
    ///
    /// Deltas that only add collateral or only repay debt cannot lower the
    /// ratio and skip the ratio check.
    pub fn apply(
        &mut self,
        user: &Address,
        delta: PositionDelta,
        check: InvariantCheck,
        now: u64,
    ) -> BtcUsdResult<Position> {
        let current = self.get(user);

        // 1. Compute the resulting position
        let collateral = apply_signed(current.collateral, delta.collateral).ok_or(
            BtcUsdError::InsufficientCollateral {
                available: current.collateral,
                requested: delta.collateral.unsigned_abs(),
            },
        )?;
        let debt = apply_signed(current.debt, delta.debt).ok_or(BtcUsdError::ExceedsDebt {
            debt: current.debt,
            requested: delta.debt.unsigned_abs(),
        })?;
        let next = Position {
            collateral,
            debt,
            last_update: now,
        };

        // 2. Validate against the requested invariant
        match check {
            InvariantCheck::MinRatio {
                price,
                min_ratio_bps,
                operation,
            } => {
                if delta.adds_risk() && next.debt > 0 {
                    let ratio = collateral_ratio_bps(next.collateral, next.debt, price)?;
                    if ratio < u128::from(min_ratio_bps) {
                        return Err(BtcUsdError::InvariantViolation {
                            operation,
                            resulting_ratio_bps: ratio,
                            required_ratio_bps: min_ratio_bps,
                        });
                    }
                }
            }
            InvariantCheck::LiquidationOverride => {
                if delta.collateral > 0 || delta.debt > 0 {
                    return Err(BtcUsdError::InvalidOverride {
                        collateral_delta: delta.collateral,
                        debt_delta: delta.debt,
                    });
                }
            }
        }

        // 3. Update totals before touching the map so a failure leaves no trace
        let total_collateral = apply_signed(self.total_collateral, delta.collateral)
            .ok_or(BtcUsdError::Overflow)?;
        let total_debt =
            apply_signed(self.total_debt, delta.debt).ok_or(BtcUsdError::Overflow)?;

        self.total_collateral = total_collateral;
        self.total_debt = total_debt;
        if next.is_empty() {
            self.positions.remove(user);
        } else {
            self.positions.insert(*user, next);
        }

        log::trace!(
            "position {:02x?}: collateral {} debt {}",
            &user[..4],
            next.collateral,
            next.debt
        );

        Ok(next)
    }

    /// Capture `user`'s position and the totals
    pub fn checkpoint(&self, user: &Address) -> StoreCheckpoint {
        StoreCheckpoint {
            user: *user,
            position: self.positions.get(user).copied(),
            total_collateral: self.total_collateral,
            total_debt: self.total_debt,
        }
    }

    /// Roll back to a checkpoint taken before a single-user commit
    pub fn restore(&mut self, checkpoint: StoreCheckpoint) {
        match checkpoint.position {
            Some(position) => {
                self.positions.insert(checkpoint.user, position);
            }
            None => {
                self.positions.remove(&checkpoint.user);
            }
        }
        self.total_collateral = checkpoint.total_collateral;
        self.total_debt = checkpoint.total_debt;
    }

    /// Live positions in address order
    pub fn positions(&self) -> impl Iterator<Item = (&Address, &Position)> {
        self.positions.iter()
    }

    /// Number of live positions
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn total_collateral(&self) -> u128 {
        self.total_collateral
    }

    pub fn total_debt(&self) -> u128 {
        self.total_debt
    }
}

fn apply_signed(value: u128, delta: i128) -> Option<u128> {
    if delta >= 0 {
        value.checked_add(delta.unsigned_abs())
    } else {
        value.checked_sub(delta.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: Address = [1u8; 32];
    const BOB: Address = [2u8; 32];
    const PRICE: u128 = 6_500_000_000_000;
    const HALF_BTC: i128 = 50_000_000;
    const MAX_DEBT: i128 = 21_666_666_666_666_666_666_666;

    fn min_ratio(operation: UnsafeOperation) -> InvariantCheck {
        InvariantCheck::MinRatio {
            price: PRICE,
            min_ratio_bps: 15_000,
            operation,
        }
    }

    #[test]
    fn test_absent_position_is_zero() {
        let store = PositionStore::new();
        assert_eq!(store.get(&ALICE), Position::default());
        assert!(store.is_empty());
    }

    #[test]
    fn test_apply_updates_totals() {
        let mut store = PositionStore::new();
        store
            .apply(&ALICE, PositionDelta::collateral(HALF_BTC), min_ratio(UnsafeOperation::Adjust), 10)
            .unwrap();
        store
            .apply(&BOB, PositionDelta::collateral(HALF_BTC), min_ratio(UnsafeOperation::Adjust), 11)
            .unwrap();
        let alice = store
            .apply(&ALICE, PositionDelta::debt(MAX_DEBT), min_ratio(UnsafeOperation::Mint), 12)
            .unwrap();

        assert_eq!(alice.last_update, 12);
        assert_eq!(store.total_collateral(), 2 * HALF_BTC as u128);
        assert_eq!(store.total_debt(), MAX_DEBT as u128);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_min_ratio_enforced() {
        let mut store = PositionStore::new();
        store
            .apply(&ALICE, PositionDelta::new(HALF_BTC, MAX_DEBT), min_ratio(UnsafeOperation::Adjust), 1)
            .unwrap();

        let err = store
            .apply(&ALICE, PositionDelta::debt(1_000_000_000_000_000_000), min_ratio(UnsafeOperation::Mint), 2)
            .unwrap_err();
        assert!(err.is_mint_unsafe());

        let err = store
            .apply(&ALICE, PositionDelta::collateral(-1), min_ratio(UnsafeOperation::Withdrawal), 2)
            .unwrap_err();
        assert!(err.is_withdrawal_unsafe());

        // rejected deltas change nothing
        assert_eq!(store.get(&ALICE).debt, MAX_DEBT as u128);
        assert_eq!(store.get(&ALICE).last_update, 1);
    }

    #[test]
    fn test_repay_skips_ratio_check() {
        let mut store = PositionStore::new();
        store
            .apply(&ALICE, PositionDelta::new(HALF_BTC, MAX_DEBT), min_ratio(UnsafeOperation::Adjust), 1)
            .unwrap();

        // price collapse: position is far below the minimum
        let crashed = InvariantCheck::MinRatio {
            price: PRICE / 2,
            min_ratio_bps: 15_000,
            operation: UnsafeOperation::Adjust,
        };
        assert!(store.apply(&ALICE, PositionDelta::debt(-1), crashed, 2).is_ok());
        assert!(store.apply(&ALICE, PositionDelta::collateral(1), crashed, 3).is_ok());
    }

    #[test]
    fn test_underflow_errors() {
        let mut store = PositionStore::new();
        let check = min_ratio(UnsafeOperation::Withdrawal);
        assert!(matches!(
            store.apply(&ALICE, PositionDelta::collateral(-1), check, 1),
            Err(BtcUsdError::InsufficientCollateral { available: 0, requested: 1 })
        ));
        assert!(matches!(
            store.apply(&ALICE, PositionDelta::debt(-5), check, 1),
            Err(BtcUsdError::ExceedsDebt { debt: 0, requested: 5 })
        ));
    }

    #[test]
    fn test_liquidation_override() {
        let mut store = PositionStore::new();
        store
            .apply(&ALICE, PositionDelta::new(HALF_BTC, MAX_DEBT), min_ratio(UnsafeOperation::Adjust), 1)
            .unwrap();

        // override may leave the position below the minimum
        let after = store
            .apply(&ALICE, PositionDelta::new(-HALF_BTC / 2, -1), InvariantCheck::LiquidationOverride, 2)
            .unwrap();
        assert_eq!(after.collateral, (HALF_BTC / 2) as u128);

        // but never grow it
        assert!(matches!(
            store.apply(&ALICE, PositionDelta::debt(1), InvariantCheck::LiquidationOverride, 3),
            Err(BtcUsdError::InvalidOverride { .. })
        ));
    }

    #[test]
    fn test_empty_position_removed() {
        let mut store = PositionStore::new();
        let check = min_ratio(UnsafeOperation::Withdrawal);
        store.apply(&ALICE, PositionDelta::collateral(HALF_BTC), check, 1).unwrap();
        store.apply(&ALICE, PositionDelta::collateral(-HALF_BTC), check, 2).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.total_collateral(), 0);
    }

    #[test]
    fn test_checkpoint_restore() {
        let mut store = PositionStore::new();
        let check = min_ratio(UnsafeOperation::Adjust);
        store.apply(&ALICE, PositionDelta::collateral(HALF_BTC), check, 1).unwrap();

        let cp_alice = store.checkpoint(&ALICE);
        store.apply(&ALICE, PositionDelta::debt(MAX_DEBT), check, 2).unwrap();
        store.restore(cp_alice);
        assert_eq!(store.get(&ALICE).debt, 0);
        assert_eq!(store.total_debt(), 0);

        let cp_bob = store.checkpoint(&BOB);
        store.apply(&BOB, PositionDelta::collateral(HALF_BTC), check, 3).unwrap();
        store.restore(cp_bob);
        assert_eq!(store.len(), 1);
        assert_eq!(store.total_collateral(), HALF_BTC as u128);
    }
}
