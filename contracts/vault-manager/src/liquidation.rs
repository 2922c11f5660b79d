//! Liquidation Orchestration
//!
//! Applies a [`LiquidationQuote`] to the store and the ledgers. Sizing
//! lives in `btcusd_common::liquidation`.
//!
//! ## Settlement
//!
//! ```text
//! liquidator ──btcUSD──▶ custody ──burn
//! position   ──seized wBTC──▶ liquidator (base + bonus)
//!                        └──▶ treasury   (penalty remainder)
//! ```

use btcusd_common::{
    errors::{BtcUsdError, BtcUsdResult},
    events::BtcUsdEvent,
    interfaces::{MintableLedger, PriceFeed, TokenLedger, YieldSource},
    liquidation::{self as sizing, check_liquidation_outcome, LiquidationQuote},
    math::collateral_ratio_bps,
    position_store::{InvariantCheck, PositionDelta},
    types::{Address, Position, PricedView},
};

use crate::{signed, VaultEngine};

impl<F, C, S, Y> VaultEngine<F, C, S, Y>
where
    F: PriceFeed,
    C: TokenLedger,
    S: MintableLedger,
    Y: YieldSource,
{
    /// True when `user` has debt and sits below the liquidation threshold
    pub fn is_liquidatable(&self, user: &Address, now: u64) -> BtcUsdResult<PricedView<bool>> {
        let position = self.store.get(user);
        let params = self.params;
        self.priced(now, |price| {
            let ratio = collateral_ratio_bps(position.collateral, position.debt, price)?;
            Ok(sizing::is_liquidatable(ratio, position.debt, &params))
        })
    }

    /// Size a liquidation of `user` at the current fresh price
    pub fn calculate_liquidation(
        &self,
        user: &Address,
        requested_repay: u128,
        now: u64,
    ) -> BtcUsdResult<LiquidationQuote> {
        let price = self.gateway.fresh_price(now)?.price;
        sizing::calculate_liquidation(
            user,
            &self.store.get(user),
            price,
            requested_repay,
            &self.params,
        )
    }

    /// Repay up to `debt_to_repay` of `user`'s debt with `liquidator`'s
    /// btcUSD and seize the matching collateral plus penalty.
    ///
    /// The liquidator must have approved the custody address on the btcUSD
    /// ledger. Returns the settled quote; with yield routing the payout
    /// reflects the assets actually redeemed.
    pub fn liquidate(
        &mut self,
        user: &Address,
        liquidator: &Address,
        debt_to_repay: u128,
        now: u64,
    ) -> BtcUsdResult<LiquidationQuote> {
        self.guarded(now, |engine| {
            engine.do_liquidate(user, liquidator, debt_to_repay, now)
        })
    }

    fn do_liquidate(
        &mut self,
        user: &Address,
        liquidator: &Address,
        debt_to_repay: u128,
        now: u64,
    ) -> BtcUsdResult<LiquidationQuote> {
        // 1. Size against a fresh price
        let price = self.gateway.fresh_price(now)?.price;
        let position = self.store.get(user);
        let quote = sizing::calculate_liquidation(
            user,
            &position,
            price,
            debt_to_repay,
            &self.params,
        )
        .map_err(|err| rejected(user, err))?;

        // 2. Liquidator must hold the repayment
        let available = self.stable.balance_of(liquidator);
        if available < quote.debt_repaid {
            return Err(rejected(
                user,
                BtcUsdError::InsufficientLiquidatorBalance {
                    available,
                    required: quote.debt_repaid,
                },
            ));
        }

        // 3. The position must not end less healthy than it started,
        //    unless it was already below 100% + penalty
        let old_ratio_bps = collateral_ratio_bps(position.collateral, position.debt, price)?;
        let after = Position {
            collateral: position.collateral - quote.collateral_seized,
            debt: position.debt - quote.debt_repaid,
            last_update: now,
        };
        check_liquidation_outcome(old_ratio_bps, &after, price, &self.params)
            .map_err(|err| rejected(user, err))?;

        // 4. Commit, bypassing the minimum ratio
        let cp = self.checkpoint(user, now);
        self.store.apply(
            user,
            PositionDelta::new(
                -signed(quote.collateral_seized)?,
                -signed(quote.debt_repaid)?,
            ),
            InvariantCheck::LiquidationOverride,
            now,
        )?;

        // 5. Settle with the ledgers
        let settled = self.settle_liquidation(user, liquidator, &quote, now);
        let quote = self.settle(cp, settled)?;

        self.events.emit(BtcUsdEvent::PositionLiquidated {
            user: *user,
            liquidator: *liquidator,
            debt_repaid: quote.debt_repaid,
            collateral_seized: quote.collateral_seized,
            liquidator_bonus: quote.liquidator_bonus,
            protocol_fee: quote.protocol_fee,
            price,
            timestamp: now,
        });
        log::debug!(
            "liquidated {:02x?}: repaid {} seized {} (liquidator {} treasury {})",
            &user[..4],
            quote.debt_repaid,
            quote.collateral_seized,
            quote.liquidator_payout,
            quote.protocol_fee
        );
        Ok(quote)
    }

    fn settle_liquidation(
        &mut self,
        user: &Address,
        liquidator: &Address,
        quote: &LiquidationQuote,
        now: u64,
    ) -> BtcUsdResult<LiquidationQuote> {
        let custody = self.config.custody;
        let treasury = self.config.treasury;

        // 1. Take the repayment and burn it
        self.collect_stable(liquidator, quote.debt_repaid)?;
        self.burn_from(&custody, quote.debt_repaid)?;

        if quote.collateral_seized == 0 {
            return Ok(*quote);
        }

        // 2. Redeem the seized collateral and split it
        let (source, assets) = self.redeem_collateral(user, quote.collateral_seized, now)?;
        let liquidator_payout = quote.liquidator_payout.min(assets);
        let protocol_fee = assets - liquidator_payout;
        self.pay_collateral(&source, liquidator, liquidator_payout)?;
        self.pay_collateral(&source, &treasury, protocol_fee)?;

        Ok(LiquidationQuote {
            liquidator_payout,
            protocol_fee,
            ..*quote
        })
    }
}

fn rejected(user: &Address, err: BtcUsdError) -> BtcUsdError {
    log::warn!("liquidation of {:02x?} rejected: {}", &user[..4], err);
    err
}
