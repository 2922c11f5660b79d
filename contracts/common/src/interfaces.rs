//! Collaborator Interfaces
//!
//! The engine never implements token transfers, price discovery or yield
//! generation itself. It is generic over these traits and only
//! orchestrates calls into them.

use crate::errors::BtcUsdResult;
use crate::types::{Address, PriceData};

/// Source of BTC/USD prices
pub trait PriceFeed {
    /// Latest published price with the oracle's own staleness flag
    fn latest_price(&self) -> BtcUsdResult<PriceData>;
}

/// Fungible token ledger (wBTC or btcUSD)
pub trait TokenLedger {
    fn balance_of(&self, owner: &Address) -> u128;

    fn allowance(&self, owner: &Address, spender: &Address) -> u128;

    /// Move `amount` from `from` to `to`, `from` acting for itself
    fn transfer(&mut self, from: &Address, to: &Address, amount: u128) -> BtcUsdResult<()>;

    /// Move `amount` from `from` to `to` using `spender`'s allowance
    fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> BtcUsdResult<()>;
}

/// Ledger whose supply can change; `caller` must be the authorized minter
pub trait MintableLedger: TokenLedger {
    fn mint(&mut self, caller: &Address, to: &Address, amount: u128) -> BtcUsdResult<()>;

    fn burn(&mut self, caller: &Address, from: &Address, amount: u128) -> BtcUsdResult<()>;

    fn total_supply(&self) -> u128;
}

/// Share-based yield venue for idle wBTC.
///
/// Supplied wBTC sits at [`YieldSource::reserve`] on the collateral ledger;
/// the reserve approves the depositor so redeemed assets can be pulled back.
pub trait YieldSource {
    /// Account holding the supplied assets
    fn reserve(&self) -> Address;

    /// Deposit `assets`; returns shares minted
    fn supply(&mut self, assets: u128) -> BtcUsdResult<u128>;

    /// Redeem exactly `assets`; returns shares burned
    fn withdraw(&mut self, assets: u128) -> BtcUsdResult<u128>;

    /// Current redeemable value of `shares`
    fn convert_to_assets(&self, shares: u128) -> u128;
}
