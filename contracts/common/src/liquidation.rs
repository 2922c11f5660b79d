//! Liquidation Sizing
//!
//! Pure functions that classify a position and size a partial liquidation.
//! The vault-manager crate applies the result to the store and the ledgers.
//!
//! Below `100% + penalty` any penalized seizure lowers the ratio, so such a
//! position may be closed in full and the outcome guard does not apply.
//!
//! ## Liquidation Flow
//!
//! ```text
//! ratio < threshold, debt > 0
//!                 │
//!                 ▼
//! ┌───────────────────────────────────────┐
//! │  debt_repaid = min(request,           │
//! │     debt * closeFactor, or all debt   │
//! │     below 100% + penalty)             │
//! └───────────────┬───────────────────────┘
//!                 ▼
//! ┌───────────────────────────────────────┐
//! │  base   = debt_repaid / price         │
//! │  seized = min(base * (1 + penalty),   │
//! │               collateral)             │
//! │  bonus  = base * reward               │
//! └───────────────┬───────────────────────┘
//!                 ▼
//! ┌───────────────────────────────────────┐
//! │  liquidator: min(base + bonus, seized)│
//! │  treasury:   seized - liquidator      │
//! └───────────────────────────────────────┘
//! ```

use crate::{
    constants::ratios::PRECISION,
    errors::{BtcUsdError, BtcUsdResult},
    math::{bps_of, collateral_for_value, collateral_ratio_bps, mul_div_floor},
    types::{Address, Position, PositionState, ProtocolParameters},
};

/// Sizing of a single liquidation call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidationQuote {
    /// btcUSD burned from the liquidator
    pub debt_repaid: u128,
    /// wBTC worth `debt_repaid` at the current price
    pub collateral_base: u128,
    /// Total wBTC removed from the position
    pub collateral_seized: u128,
    /// Reward on top of the base, before capping
    pub liquidator_bonus: u128,
    /// wBTC sent to the liquidator
    pub liquidator_payout: u128,
    /// Penalty remainder sent to the treasury
    pub protocol_fee: u128,
}

/// Classify a position from its ratio
pub fn position_state(ratio_bps: u128, debt: u128, params: &ProtocolParameters) -> PositionState {
    if debt == 0 || ratio_bps >= u128::from(params.min_collateral_ratio_bps) {
        PositionState::Healthy
    } else if ratio_bps >= u128::from(params.liquidation_threshold_bps) {
        PositionState::AtRisk
    } else {
        PositionState::Liquidatable
    }
}

/// ratio < threshold with debt outstanding
pub fn is_liquidatable(ratio_bps: u128, debt: u128, params: &ProtocolParameters) -> bool {
    position_state(ratio_bps, debt, params) == PositionState::Liquidatable
}

/// Ratio below which every penalized seizure worsens the position
pub fn full_close_threshold_bps(params: &ProtocolParameters) -> u128 {
    u128::from(PRECISION) + u128::from(params.liquidation_penalty_bps)
}

/// Largest debt repayable in one call.
///
/// The close factor caps the repayment unless the position sits below
/// [`full_close_threshold_bps`], or its close-factor share floors to zero.
pub fn max_liquidatable_debt(
    debt: u128,
    ratio_bps: u128,
    params: &ProtocolParameters,
) -> BtcUsdResult<u128> {
    if ratio_bps < full_close_threshold_bps(params) {
        return Ok(debt);
    }
    let capped = bps_of(debt, params.close_factor_bps)?;
    Ok(if capped == 0 { debt } else { capped })
}

/// Size a liquidation of `position` at `price`
pub fn calculate_liquidation(
    user: &Address,
    position: &Position,
    price: u128,
    requested_repay: u128,
    params: &ProtocolParameters,
) -> BtcUsdResult<LiquidationQuote> {
    // 1. Must be liquidatable
    let ratio = collateral_ratio_bps(position.collateral, position.debt, price)?;
    if !is_liquidatable(ratio, position.debt, params) {
        return Err(BtcUsdError::NotLiquidatable {
            user: *user,
            ratio_bps: ratio,
            threshold_bps: params.liquidation_threshold_bps,
        });
    }
    if requested_repay == 0 {
        return Err(BtcUsdError::ZeroAmount);
    }

    // 2. Close factor cap
    let debt_repaid = requested_repay.min(max_liquidatable_debt(position.debt, ratio, params)?);

    // 3. Collateral worth the repaid debt
    let collateral_base = collateral_for_value(debt_repaid, price)?;

    // 4. Add the penalty, capped at what the position holds
    let with_penalty = mul_div_floor(
        collateral_base,
        u128::from(PRECISION + params.liquidation_penalty_bps),
        u128::from(PRECISION),
    )?;
    let collateral_seized = with_penalty.min(position.collateral);

    // 5. Liquidator reward and treasury remainder
    let liquidator_bonus = bps_of(collateral_base, params.liquidator_reward_bps)?;
    let liquidator_payout = collateral_base
        .checked_add(liquidator_bonus)
        .ok_or(BtcUsdError::Overflow)?
        .min(collateral_seized);
    let protocol_fee = collateral_seized - liquidator_payout;

    Ok(LiquidationQuote {
        debt_repaid,
        collateral_base,
        collateral_seized,
        liquidator_bonus,
        liquidator_payout,
        protocol_fee,
    })
}

/// Reject a partial liquidation that leaves the position less healthy.
///
/// A position ending with zero debt or zero collateral counts as closed.
/// Positions starting below [`full_close_threshold_bps`] are exempt.
pub fn check_liquidation_outcome(
    old_ratio_bps: u128,
    after: &Position,
    price: u128,
    params: &ProtocolParameters,
) -> BtcUsdResult<()> {
    if after.debt == 0 || after.collateral == 0 {
        return Ok(());
    }
    if old_ratio_bps < full_close_threshold_bps(params) {
        return Ok(());
    }
    let new_ratio_bps = collateral_ratio_bps(after.collateral, after.debt, price)?;
    if new_ratio_bps < old_ratio_bps {
        return Err(BtcUsdError::LiquidationWorsensPosition {
            old_ratio_bps,
            new_ratio_bps,
        });
    }
    Ok(())
}
