//! Read-only Queries
//!
//! Views never fail on a stale price. They compute with the latest reading
//! and report its age through [`PricedView`], and they keep working while
//! the engine is paused.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use btcusd_common::{
    errors::BtcUsdResult,
    interfaces::{MintableLedger, PriceFeed, TokenLedger, YieldSource},
    liquidation::position_state,
    math::{
        bps_of, collateral_ratio_bps, collateral_value, liquidation_price, max_debt_at_ratio,
        required_collateral,
    },
    types::{Address, Position, PositionState, PricedView, ProtocolParameters, YieldRecord},
    Vec,
};

use crate::VaultEngine;

// ============ View Types ============

/// Classification of a single position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionHealth {
    pub state: PositionState,
    /// 0 when the position has no debt
    pub ratio_bps: u128,
    /// Distance above the liquidation threshold; negative once liquidatable,
    /// `None` without debt
    pub buffer_bps: Option<i128>,
    pub liquidation_price: u128,
}

/// Protocol-wide aggregates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolStats {
    pub total_collateral: u128,
    pub total_debt: u128,
    pub stablecoin_supply: u128,
    /// System-wide collateral ratio, 0 without debt
    pub system_ratio_bps: u128,
    pub position_count: u64,
    pub paused: bool,
    pub params: ProtocolParameters,
}

/// Serializable copy of the engine's ledger state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ProtocolSnapshot {
    pub engine_id: [u8; 32],
    pub positions: Vec<(Address, Position)>,
    pub yield_records: Vec<(Address, YieldRecord)>,
    pub total_collateral: u128,
    pub total_debt: u128,
    pub params: ProtocolParameters,
    pub paused: bool,
}

impl ProtocolSnapshot {
    /// Serialize snapshot to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    /// Deserialize snapshot from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }

    /// SHA-256 commitment over the borsh encoding
    pub fn digest(&self) -> [u8; 32] {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.to_bytes());
        let result = hasher.finalize();
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&result);
        digest
    }
}

// ============ Queries ============

impl<F, C, S, Y> VaultEngine<F, C, S, Y>
where
    F: PriceFeed,
    C: TokenLedger,
    S: MintableLedger,
    Y: YieldSource,
{
    /// Evaluate `f` at the latest price, tagging the result with its age
    pub(crate) fn priced<T>(
        &self,
        now: u64,
        f: impl FnOnce(u128) -> BtcUsdResult<T>,
    ) -> BtcUsdResult<PricedView<T>> {
        let data = self.gateway.view_price(now)?;
        Ok(PricedView {
            value: f(data.price)?,
            price: data.price,
            price_timestamp: data.timestamp,
            stale: data.is_stale,
        })
    }

    /// Position of `user`, zero-valued if absent
    pub fn get_position(&self, user: &Address) -> Position {
        self.store.get(user)
    }

    /// Collateral ratio in bps; 0 means no debt
    pub fn collateral_ratio_bps(&self, user: &Address, now: u64) -> BtcUsdResult<PricedView<u128>> {
        let position = self.store.get(user);
        self.priced(now, |price| {
            collateral_ratio_bps(position.collateral, position.debt, price)
        })
    }

    /// Same measure as the collateral ratio
    pub fn health_factor_bps(&self, user: &Address, now: u64) -> BtcUsdResult<PricedView<u128>> {
        self.collateral_ratio_bps(user, now)
    }

    /// Additional btcUSD `user` can mint right now
    pub fn max_mintable(&self, user: &Address, now: u64) -> BtcUsdResult<PricedView<u128>> {
        let position = self.store.get(user);
        let params = self.params;
        self.priced(now, |price| {
            let value = collateral_value(position.collateral, price)?;
            let ltv_cap = bps_of(value, params.max_ltv_bps)?;
            let ratio_cap =
                max_debt_at_ratio(position.collateral, price, params.min_collateral_ratio_bps)?;
            Ok(ltv_cap.min(ratio_cap).saturating_sub(position.debt))
        })
    }

    /// wBTC `user` can withdraw without breaching the minimum ratio
    pub fn max_withdrawable(&self, user: &Address, now: u64) -> BtcUsdResult<PricedView<u128>> {
        let position = self.store.get(user);
        let min_ratio_bps = self.params.min_collateral_ratio_bps;
        self.priced(now, |price| {
            if position.debt == 0 {
                return Ok(position.collateral);
            }
            let required = required_collateral(position.debt, price, min_ratio_bps)?;
            Ok(position.collateral.saturating_sub(required))
        })
    }

    /// Price at which `user` reaches the liquidation threshold; 0 without collateral
    pub fn liquidation_price(&self, user: &Address) -> BtcUsdResult<u128> {
        let position = self.store.get(user);
        liquidation_price(
            position.collateral,
            position.debt,
            self.params.liquidation_threshold_bps,
        )
    }

    /// State, ratio and headroom of `user`'s position
    pub fn position_health(
        &self,
        user: &Address,
        now: u64,
    ) -> BtcUsdResult<PricedView<PositionHealth>> {
        let position = self.store.get(user);
        let params = self.params;
        let liq_price = self.liquidation_price(user)?;
        self.priced(now, |price| {
            let ratio_bps = collateral_ratio_bps(position.collateral, position.debt, price)?;
            let buffer_bps = if position.has_debt() {
                let ratio = i128::try_from(ratio_bps).unwrap_or(i128::MAX);
                Some(ratio - i128::from(params.liquidation_threshold_bps))
            } else {
                None
            };
            Ok(PositionHealth {
                state: position_state(ratio_bps, position.debt, &params),
                ratio_bps,
                buffer_bps,
                liquidation_price: liq_price,
            })
        })
    }

    /// Unrealized yield on `user`'s routed collateral
    pub fn current_yield(&self, user: &Address) -> u128 {
        self.yields.current_yield(user)
    }

    pub fn yield_record(&self, user: &Address) -> YieldRecord {
        self.yields.record(user)
    }

    /// Totals, supply and system ratio
    pub fn protocol_stats(&self, now: u64) -> BtcUsdResult<PricedView<ProtocolStats>> {
        let total_collateral = self.store.total_collateral();
        let total_debt = self.store.total_debt();
        let stablecoin_supply = self.stable.total_supply();
        let position_count = self.store.len() as u64;
        let paused = self.emergency.paused;
        let params = self.params;
        self.priced(now, |price| {
            Ok(ProtocolStats {
                total_collateral,
                total_debt,
                stablecoin_supply,
                system_ratio_bps: collateral_ratio_bps(total_collateral, total_debt, price)?,
                position_count,
                paused,
                params,
            })
        })
    }

    /// Copy of every position and yield record, in address order
    pub fn snapshot(&self) -> ProtocolSnapshot {
        ProtocolSnapshot {
            engine_id: self.engine_id,
            positions: self.store.positions().map(|(a, p)| (*a, *p)).collect(),
            yield_records: self.yields.records().map(|(a, r)| (*a, *r)).collect(),
            total_collateral: self.store.total_collateral(),
            total_debt: self.store.total_debt(),
            params: self.params,
            paused: self.emergency.paused,
        }
    }
}
