//! Share-based lending pool
//!
//! Minimal ERC-4626 style vault: deposits mint shares at the current
//! assets/shares rate, interest raises the rate. Rounding always favors
//! the pool (floor on conversion, ceil on shares burned for a withdrawal).

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use btcusd_common::{
    errors::{BtcUsdError, BtcUsdResult},
    interfaces::YieldSource,
    math::{mul_div_ceil, mul_div_floor},
    types::Address,
    validation::require_positive,
};

/// Pool accounting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PoolState {
    pub total_assets: u128,
    pub total_shares: u128,
    pub paused: bool,
}

/// In-memory lending pool
#[derive(Debug, Clone)]
pub struct MemoryLendingPool {
    reserve: Address,
    state: PoolState,
}

impl MemoryLendingPool {
    pub fn new(reserve: Address) -> Self {
        Self {
            reserve,
            state: PoolState::default(),
        }
    }

    pub fn state(&self) -> &PoolState {
        &self.state
    }

    /// Credit interest to all shareholders
    pub fn accrue(&mut self, assets: u128) -> BtcUsdResult<()> {
        self.state.total_assets = self
            .state
            .total_assets
            .checked_add(assets)
            .ok_or(BtcUsdError::Overflow)?;
        Ok(())
    }

    /// Write down assets (bad debt inside the pool)
    pub fn realize_loss(&mut self, assets: u128) {
        self.state.total_assets = self.state.total_assets.saturating_sub(assets);
    }

    /// Refuse supply and withdraw calls
    pub fn set_paused(&mut self, paused: bool) {
        self.state.paused = paused;
    }

    fn ensure_open(&self) -> BtcUsdResult<()> {
        if self.state.paused {
            return Err(BtcUsdError::YieldSourceFailure {
                reason: "pool paused",
            });
        }
        Ok(())
    }
}

impl YieldSource for MemoryLendingPool {
    fn reserve(&self) -> Address {
        self.reserve
    }

    fn supply(&mut self, assets: u128) -> BtcUsdResult<u128> {
        self.ensure_open()?;
        require_positive(assets)?;

        let shares = if self.state.total_shares == 0 || self.state.total_assets == 0 {
            assets
        } else {
            mul_div_floor(assets, self.state.total_shares, self.state.total_assets)?
        };
        if shares == 0 {
            return Err(BtcUsdError::YieldSourceFailure {
                reason: "deposit too small for one share",
            });
        }

        self.state.total_assets = self
            .state
            .total_assets
            .checked_add(assets)
            .ok_or(BtcUsdError::Overflow)?;
        self.state.total_shares = self
            .state
            .total_shares
            .checked_add(shares)
            .ok_or(BtcUsdError::Overflow)?;
        Ok(shares)
    }

    fn withdraw(&mut self, assets: u128) -> BtcUsdResult<u128> {
        self.ensure_open()?;
        require_positive(assets)?;

        if assets > self.state.total_assets {
            return Err(BtcUsdError::YieldSourceFailure {
                reason: "insufficient pool liquidity",
            });
        }
        let shares = mul_div_ceil(assets, self.state.total_shares, self.state.total_assets)?;

        self.state.total_assets -= assets;
        self.state.total_shares = self.state.total_shares.saturating_sub(shares);
        Ok(shares)
    }

    fn convert_to_assets(&self, shares: u128) -> u128 {
        if self.state.total_shares == 0 {
            return 0;
        }
        mul_div_floor(shares, self.state.total_assets, self.state.total_shares).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESERVE: Address = [0xEE; 32];
    const ONE_BTC: u128 = 100_000_000;

    #[test]
    fn test_first_deposit_one_to_one() {
        let mut pool = MemoryLendingPool::new(RESERVE);
        assert_eq!(pool.supply(ONE_BTC).unwrap(), ONE_BTC);
        assert_eq!(pool.convert_to_assets(ONE_BTC), ONE_BTC);
        assert_eq!(pool.reserve(), RESERVE);
    }

    #[test]
    fn test_accrual_raises_rate() {
        let mut pool = MemoryLendingPool::new(RESERVE);
        pool.supply(ONE_BTC).unwrap();
        pool.accrue(1_000_000).unwrap();
        assert_eq!(pool.convert_to_assets(ONE_BTC), 101_000_000);

        // later depositors get fewer shares
        let shares = pool.supply(ONE_BTC).unwrap();
        assert_eq!(shares, 99_009_900);
    }

    #[test]
    fn test_withdraw_rounds_shares_up() {
        let mut pool = MemoryLendingPool::new(RESERVE);
        pool.supply(ONE_BTC).unwrap();
        pool.accrue(1_000_000).unwrap();

        let burned = pool.withdraw(1_000_000).unwrap();
        assert_eq!(burned, 990_100);
        assert_eq!(pool.convert_to_assets(pool.state().total_shares), ONE_BTC);
    }

    #[test]
    fn test_paused_pool_fails() {
        let mut pool = MemoryLendingPool::new(RESERVE);
        pool.set_paused(true);
        assert!(matches!(
            pool.supply(ONE_BTC),
            Err(BtcUsdError::YieldSourceFailure { .. })
        ));
    }

    #[test]
    fn test_withdraw_beyond_liquidity() {
        let mut pool = MemoryLendingPool::new(RESERVE);
        pool.supply(ONE_BTC).unwrap();
        pool.realize_loss(10);
        assert!(pool.withdraw(ONE_BTC).is_err());
        assert_eq!(pool.convert_to_assets(ONE_BTC), ONE_BTC - 10);
    }
}
