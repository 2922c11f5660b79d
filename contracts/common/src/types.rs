//! Core Types for btcUSD Protocol
//!
//! This module defines the data structures shared by the engine crates:
//! positions, protocol parameters, price readings and yield records.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::constants::{limits, liquidation, oracle, ratios, yield_share};
use crate::errors::{BtcUsdError, BtcUsdResult};

/// Type alias for addresses (32-byte hash)
pub type Address = [u8; 32];

// ============ Position Types ============

/// Per-user collateral and debt.
///
/// A zero-valued position means "no position"; the store never keeps one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Position {
    /// Collateral in wBTC base units (8 decimals)
    pub collateral: u128,
    /// Debt in btcUSD base units (18 decimals)
    pub debt: u128,
    /// Timestamp (seconds) of the last mutation
    pub last_update: u64,
}

impl Position {
    /// Returns true if both collateral and debt are zero
    pub fn is_empty(&self) -> bool {
        self.collateral == 0 && self.debt == 0
    }

    /// Returns true if the position owes anything
    pub fn has_debt(&self) -> bool {
        self.debt > 0
    }
}

/// Health classification, always recomputed from price and position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum PositionState {
    /// ratio >= minimum, or no debt
    Healthy,
    /// threshold <= ratio < minimum
    AtRisk,
    /// ratio < threshold with debt outstanding
    Liquidatable,
}

// ============ Oracle Types ============

/// Price reading as returned by a price feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PriceData {
    /// USD per BTC with 8 decimals (e.g. 6_500_000_000_000 = $65,000)
    pub price: u128,
    /// Publication time in seconds
    pub timestamp: u64,
    /// Oracle's own staleness flag
    pub is_stale: bool,
}

/// A view value together with the price it was computed at.
///
/// Read-only queries never fail on staleness; they report it here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedView<T> {
    pub value: T,
    pub price: u128,
    pub price_timestamp: u64,
    pub stale: bool,
}

impl<T> PricedView<T> {
    /// Map the value, keeping the price metadata
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> PricedView<U> {
        PricedView {
            value: f(self.value),
            price: self.price,
            price_timestamp: self.price_timestamp,
            stale: self.stale,
        }
    }
}

// ============ Yield Types ============

/// Per-user yield bookkeeping.
///
/// Records are zeroed, never removed, so harvest history survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct YieldRecord {
    /// wBTC supplied to the yield source and not yet withdrawn
    pub deposited_principal: u128,
    /// Total yield realized on harvests (user + protocol share)
    pub cumulative_harvested: u128,
    /// Yield source shares attributed to this user
    pub shares: u128,
}

// ============ Configuration Types ============

/// Process-wide risk and fee parameters, all in basis points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ProtocolParameters {
    pub min_collateral_ratio_bps: u64,
    pub liquidation_threshold_bps: u64,
    pub max_ltv_bps: u64,
    pub liquidation_penalty_bps: u64,
    pub liquidator_reward_bps: u64,
    pub close_factor_bps: u64,
    pub user_yield_share_bps: u64,
    pub protocol_yield_share_bps: u64,
}

impl Default for ProtocolParameters {
    fn default() -> Self {
        Self {
            min_collateral_ratio_bps: ratios::MIN_COLLATERAL_RATIO_BPS,
            liquidation_threshold_bps: ratios::LIQUIDATION_THRESHOLD_BPS,
            max_ltv_bps: ratios::MAX_LTV_BPS,
            liquidation_penalty_bps: liquidation::LIQUIDATION_PENALTY_BPS,
            liquidator_reward_bps: liquidation::LIQUIDATOR_REWARD_BPS,
            close_factor_bps: liquidation::CLOSE_FACTOR_BPS,
            user_yield_share_bps: yield_share::USER_YIELD_SHARE_BPS,
            protocol_yield_share_bps: yield_share::PROTOCOL_YIELD_SHARE_BPS,
        }
    }
}

impl ProtocolParameters {
    /// Validate every bound
    pub fn validate(&self) -> BtcUsdResult<()> {
        let precision = ratios::PRECISION;

        // 1. Threshold sits between 100% and the minimum ratio
        if self.liquidation_threshold_bps < precision {
            return Err(invalid("liquidation_threshold_bps", "must be >= 10000"));
        }
        if self.liquidation_threshold_bps > self.min_collateral_ratio_bps {
            return Err(invalid(
                "liquidation_threshold_bps",
                "must not exceed min_collateral_ratio_bps",
            ));
        }

        // 2. LTV within (0, 100%]
        if self.max_ltv_bps == 0 || self.max_ltv_bps > precision {
            return Err(invalid("max_ltv_bps", "must be in (0, 10000]"));
        }

        // 3. Liquidation incentives
        if self.liquidation_penalty_bps > liquidation::MAX_LIQUIDATION_PENALTY_BPS {
            return Err(invalid("liquidation_penalty_bps", "must be <= 3000"));
        }
        if self.liquidator_reward_bps > self.liquidation_penalty_bps {
            return Err(invalid(
                "liquidator_reward_bps",
                "must not exceed liquidation_penalty_bps",
            ));
        }
        if self.close_factor_bps == 0 || self.close_factor_bps > precision {
            return Err(invalid("close_factor_bps", "must be in (0, 10000]"));
        }

        // 4. Yield shares are a partition
        let shares = self
            .user_yield_share_bps
            .checked_add(self.protocol_yield_share_bps)
            .ok_or(BtcUsdError::Overflow)?;
        if shares != precision {
            return Err(invalid("yield_share_bps", "user + protocol must equal 10000"));
        }

        Ok(())
    }

    /// Replace the liquidation parameters, rejecting invalid combinations
    pub fn set_liquidation_params(
        &mut self,
        penalty_bps: u64,
        reward_bps: u64,
        close_factor_bps: u64,
    ) -> BtcUsdResult<()> {
        let candidate = Self {
            liquidation_penalty_bps: penalty_bps,
            liquidator_reward_bps: reward_bps,
            close_factor_bps,
            ..*self
        };
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }

    /// Replace the ratio parameters, rejecting invalid combinations
    pub fn set_ratio_params(
        &mut self,
        min_collateral_ratio_bps: u64,
        liquidation_threshold_bps: u64,
        max_ltv_bps: u64,
    ) -> BtcUsdResult<()> {
        let candidate = Self {
            min_collateral_ratio_bps,
            liquidation_threshold_bps,
            max_ltv_bps,
            ..*self
        };
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }

    /// Replace the yield split
    pub fn set_yield_shares(&mut self, user_bps: u64, protocol_bps: u64) -> BtcUsdResult<()> {
        let candidate = Self {
            user_yield_share_bps: user_bps,
            protocol_yield_share_bps: protocol_bps,
            ..*self
        };
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }
}

fn invalid(param: &'static str, reason: &'static str) -> BtcUsdError {
    BtcUsdError::InvalidParameter { param, reason }
}

/// Deployment settings that are not risk parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct EngineConfig {
    /// Oldest acceptable price, in seconds
    pub max_price_age: u64,
    /// Smallest accepted collateral deposit (wBTC units)
    pub min_deposit: u128,
    /// Supply deposited collateral to the yield source
    pub route_collateral_to_yield: bool,
    /// Address holding custodied wBTC; the only authorized btcUSD minter
    pub custody: Address,
    /// Receives the protocol yield share and liquidation penalty remainder
    pub treasury: Address,
}

impl EngineConfig {
    /// Config with network defaults for price age and minimum deposit
    pub fn new(custody: Address, treasury: Address) -> Self {
        Self {
            max_price_age: oracle::MAX_PRICE_AGE_SECS,
            min_deposit: limits::MIN_DEPOSIT,
            route_collateral_to_yield: false,
            custody,
            treasury,
        }
    }

    /// Builder-style toggle for yield routing
    pub fn with_yield_routing(mut self, enabled: bool) -> Self {
        self.route_collateral_to_yield = enabled;
        self
    }

    pub fn validate(&self) -> BtcUsdResult<()> {
        if self.max_price_age == 0 {
            return Err(invalid("max_price_age", "must be positive"));
        }
        if self.custody == self.treasury {
            return Err(invalid("treasury", "must differ from custody"));
        }
        Ok(())
    }
}
