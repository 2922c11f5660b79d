//! btcUSD Token Ledger
//!
//! In-memory fungible token ledger used for both btcUSD and wBTC.
//! Only the authorized minter can mint or burn; for btcUSD that is the
//! vault custody address, so debt and supply can only move together.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use btcusd_common::{
    constants::{scale, token},
    errors::{BtcUsdError, BtcUsdResult},
    interfaces::{MintableLedger, TokenLedger},
    types::Address,
    validation::{require_caller, require_positive, require_sufficient_balance},
    BTreeMap, Vec,
};

// ============ Token Metadata ============

/// Static token description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    pub name: &'static str,
    pub symbol: &'static str,
    pub decimals: u8,
}

impl TokenInfo {
    /// The protocol stablecoin
    pub const BTCUSD: Self = Self {
        name: token::NAME,
        symbol: token::SYMBOL,
        decimals: scale::STABLE_DECIMALS,
    };

    /// Wrapped bitcoin collateral
    pub const WBTC: Self = Self {
        name: "Wrapped BTC",
        symbol: token::COLLATERAL_SYMBOL,
        decimals: scale::WBTC_DECIMALS,
    };
}

// ============ Ledger Events ============

/// Balance-changing ledger operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum LedgerEvent {
    Transfer {
        from: Address,
        to: Address,
        amount: u128,
    },
    Approval {
        owner: Address,
        spender: Address,
        amount: u128,
    },
    Mint {
        to: Address,
        amount: u128,
        new_total_supply: u128,
    },
    Burn {
        from: Address,
        amount: u128,
        new_total_supply: u128,
    },
}

// ============ Ledger ============

/// Account-based token ledger with a single authorized minter
#[derive(Debug, Clone)]
pub struct MemoryLedger {
    info: TokenInfo,
    authorized_minter: Address,
    balances: BTreeMap<Address, u128>,
    allowances: BTreeMap<(Address, Address), u128>,
    frozen: BTreeMap<Address, bool>,
    total_supply: u128,
    events: Vec<LedgerEvent>,
}

impl MemoryLedger {
    /// Create an empty ledger. No default minter: it must be chosen explicitly.
    pub fn new(info: TokenInfo, authorized_minter: Address) -> Self {
        Self {
            info,
            authorized_minter,
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
            frozen: BTreeMap::new(),
            total_supply: 0,
            events: Vec::new(),
        }
    }

    pub fn info(&self) -> &TokenInfo {
        &self.info
    }

    pub fn authorized_minter(&self) -> &Address {
        &self.authorized_minter
    }

    /// Set `spender`'s allowance over `owner`'s balance
    pub fn approve(&mut self, owner: &Address, spender: &Address, amount: u128) {
        self.allowances.insert((*owner, *spender), amount);
        self.events.push(LedgerEvent::Approval {
            owner: *owner,
            spender: *spender,
            amount,
        });
    }

    /// Block or unblock every movement touching `account`
    pub fn set_frozen(&mut self, account: &Address, frozen: bool) {
        if frozen {
            self.frozen.insert(*account, true);
        } else {
            self.frozen.remove(account);
        }
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    fn ensure_not_frozen(&self, account: &Address) -> BtcUsdResult<()> {
        if self.frozen.contains_key(account) {
            return Err(BtcUsdError::Unauthorized { actual: *account });
        }
        Ok(())
    }

    fn move_balance(&mut self, from: &Address, to: &Address, amount: u128) -> BtcUsdResult<()> {
        // 1. Amount must be positive
        require_positive(amount)?;

        // 2. Neither side frozen
        self.ensure_not_frozen(from)?;
        self.ensure_not_frozen(to)?;

        // 3. Sender must have enough balance
        let available = self.balance_of(from);
        require_sufficient_balance(available, amount)?;

        // 4. Move
        self.balances.insert(*from, available - amount);
        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(BtcUsdError::Overflow)?;
        self.balances.insert(*to, credited);

        self.events.push(LedgerEvent::Transfer {
            from: *from,
            to: *to,
            amount,
        });
        Ok(())
    }
}

impl TokenLedger for MemoryLedger {
    fn balance_of(&self, owner: &Address) -> u128 {
        self.balances.get(owner).copied().unwrap_or(0)
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> u128 {
        self.allowances.get(&(*owner, *spender)).copied().unwrap_or(0)
    }

    fn transfer(&mut self, from: &Address, to: &Address, amount: u128) -> BtcUsdResult<()> {
        self.move_balance(from, to, amount)
    }

    fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> BtcUsdResult<()> {
        let approved = self.allowance(from, spender);
        if approved < amount {
            return Err(BtcUsdError::InsufficientAllowance {
                approved,
                requested: amount,
            });
        }
        self.move_balance(from, to, amount)?;
        self.allowances.insert((*from, *spender), approved - amount);
        Ok(())
    }
}

impl MintableLedger for MemoryLedger {
    fn mint(&mut self, caller: &Address, to: &Address, amount: u128) -> BtcUsdResult<()> {
        // 1. Amount must be positive
        require_positive(amount)?;

        // 2. Caller must be the authorized minter
        require_caller(&self.authorized_minter, caller)?;
        self.ensure_not_frozen(to)?;

        // 3. Update supply and balance
        let new_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(BtcUsdError::Overflow)?;
        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(BtcUsdError::Overflow)?;
        self.total_supply = new_supply;
        self.balances.insert(*to, credited);

        self.events.push(LedgerEvent::Mint {
            to: *to,
            amount,
            new_total_supply: new_supply,
        });
        log::trace!("{} mint {} (supply {})", self.info.symbol, amount, new_supply);
        Ok(())
    }

    fn burn(&mut self, caller: &Address, from: &Address, amount: u128) -> BtcUsdResult<()> {
        // 1. Amount must be positive
        require_positive(amount)?;

        // 2. Caller must be the authorized minter
        require_caller(&self.authorized_minter, caller)?;
        self.ensure_not_frozen(from)?;

        // 3. Burner must hold the tokens
        let available = self.balance_of(from);
        require_sufficient_balance(available, amount)?;

        let new_supply = self
            .total_supply
            .checked_sub(amount)
            .ok_or(BtcUsdError::Overflow)?;
        self.total_supply = new_supply;
        self.balances.insert(*from, available - amount);

        self.events.push(LedgerEvent::Burn {
            from: *from,
            amount,
            new_total_supply: new_supply,
        });
        log::trace!("{} burn {} (supply {})", self.info.symbol, amount, new_supply);
        Ok(())
    }

    fn total_supply(&self) -> u128 {
        self.total_supply
    }
}

// ============ Helper Functions ============

/// Split an amount into whole and fractional parts for display
pub fn format_amount(amount: u128, decimals: u8) -> (u128, u128) {
    let one = 10u128.checked_pow(u32::from(decimals)).unwrap_or(u128::MAX);
    (amount / one, amount % one)
}

// ============ Tests ============

#[cfg(test)]
mod tests {
    use super::*;

    const MINTER: Address = [9u8; 32];
    const ALICE: Address = [1u8; 32];
    const BOB: Address = [2u8; 32];

    fn funded_ledger() -> MemoryLedger {
        let mut ledger = MemoryLedger::new(TokenInfo::BTCUSD, MINTER);
        ledger.mint(&MINTER, &ALICE, 1_000).unwrap();
        ledger
    }

    #[test]
    fn test_transfer_success() {
        let mut ledger = funded_ledger();
        ledger.transfer(&ALICE, &BOB, 600).unwrap();

        assert_eq!(ledger.balance_of(&ALICE), 400);
        assert_eq!(ledger.balance_of(&BOB), 600);
        assert_eq!(ledger.total_supply(), 1_000);
    }

    #[test]
    fn test_transfer_insufficient_balance() {
        let mut ledger = funded_ledger();
        let result = ledger.transfer(&ALICE, &BOB, 1_001);
        assert_eq!(
            result,
            Err(BtcUsdError::InsufficientBalance { available: 1_000, requested: 1_001 })
        );
    }

    #[test]
    fn test_zero_amount_rejected() {
        let mut ledger = funded_ledger();
        assert_eq!(ledger.transfer(&ALICE, &BOB, 0), Err(BtcUsdError::ZeroAmount));
    }

    #[test]
    fn test_transfer_from_uses_allowance() {
        let mut ledger = funded_ledger();

        assert!(matches!(
            ledger.transfer_from(&BOB, &ALICE, &BOB, 100),
            Err(BtcUsdError::InsufficientAllowance { approved: 0, requested: 100 })
        ));

        ledger.approve(&ALICE, &BOB, 300);
        ledger.transfer_from(&BOB, &ALICE, &BOB, 100).unwrap();
        assert_eq!(ledger.allowance(&ALICE, &BOB), 200);
        assert_eq!(ledger.balance_of(&BOB), 100);
    }

    #[test]
    fn test_mint_unauthorized() {
        let mut ledger = MemoryLedger::new(TokenInfo::BTCUSD, MINTER);
        let result = ledger.mint(&ALICE, &ALICE, 100);
        assert_eq!(result, Err(BtcUsdError::Unauthorized { actual: ALICE }));
        assert_eq!(ledger.total_supply(), 0);
    }

    #[test]
    fn test_burn_reduces_supply() {
        let mut ledger = funded_ledger();
        ledger.burn(&MINTER, &ALICE, 400).unwrap();
        assert_eq!(ledger.total_supply(), 600);
        assert_eq!(ledger.balance_of(&ALICE), 600);

        assert!(ledger.burn(&ALICE, &ALICE, 1).is_err());
        assert!(matches!(
            ledger.burn(&MINTER, &ALICE, 601),
            Err(BtcUsdError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_frozen_account() {
        let mut ledger = funded_ledger();
        ledger.set_frozen(&BOB, true);
        assert!(ledger.transfer(&ALICE, &BOB, 1).is_err());
        ledger.set_frozen(&BOB, false);
        assert!(ledger.transfer(&ALICE, &BOB, 1).is_ok());
    }

    #[test]
    fn test_events_recorded() {
        let mut ledger = funded_ledger();
        ledger.transfer(&ALICE, &BOB, 10).unwrap();
        assert_eq!(ledger.events().len(), 2);
        assert!(matches!(ledger.events()[0], LedgerEvent::Mint { amount: 1_000, .. }));
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(150_000_000, 8), (1, 50_000_000));
        assert_eq!(TokenInfo::WBTC.decimals, 8);
        assert_eq!(TokenInfo::BTCUSD.decimals, 18);
    }
}
