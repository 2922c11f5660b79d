//! Shared fixtures for unit and integration tests

use btcusd_common::{
    interfaces::{MintableLedger, TokenLedger},
    types::{Address, EngineConfig, ProtocolParameters},
};
use btcusd_price_oracle::OperatorOracle;
use btcusd_token::{MemoryLedger, TokenInfo};
use btcusd_yield::MemoryLendingPool;

use crate::{AdminCapability, Collaborators, VaultEngine};

pub type TestEngine = VaultEngine<OperatorOracle, MemoryLedger, MemoryLedger, MemoryLendingPool>;

pub const CUSTODY: Address = [0xC0; 32];
pub const TREASURY: Address = [0x7E; 32];
pub const RESERVE: Address = [0xEE; 32];
pub const BRIDGE: Address = [0xB1; 32];
pub const ORACLE_ADMIN: Address = [0xAD; 32];
pub const OPERATOR: Address = [0x0B; 32];
pub const ALICE: Address = [1u8; 32];
pub const BOB: Address = [2u8; 32];
pub const KEEPER: Address = [3u8; 32];

pub const NONCE: u64 = 1;
pub const T0: u64 = 1_700_000_000;

pub const ONE_BTC: u128 = 100_000_000;
pub const HALF_BTC: u128 = 50_000_000;
pub const ONE_STABLE: u128 = 1_000_000_000_000_000_000;
pub const PRICE_65K: u128 = 6_500_000_000_000;
pub const PRICE_50K: u128 = 5_000_000_000_000;

/// wBTC funded for users, reserve approving custody
pub fn collateral_ledger() -> MemoryLedger {
    let mut wbtc = MemoryLedger::new(TokenInfo::WBTC, BRIDGE);
    for user in [ALICE, BOB, KEEPER] {
        wbtc.mint(&BRIDGE, &user, 10 * ONE_BTC).unwrap();
        wbtc.approve(&user, &CUSTODY, u128::MAX);
    }
    wbtc.approve(&RESERVE, &CUSTODY, u128::MAX);
    wbtc
}

pub fn collaborators() -> Collaborators<OperatorOracle, MemoryLedger, MemoryLedger, MemoryLendingPool> {
    Collaborators {
        price_feed: OperatorOracle::new(ORACLE_ADMIN, OPERATOR, PRICE_65K, T0).unwrap(),
        collateral_token: collateral_ledger(),
        stablecoin: MemoryLedger::new(TokenInfo::BTCUSD, CUSTODY),
        yield_source: MemoryLendingPool::new(RESERVE),
    }
}

pub fn setup(route_to_yield: bool) -> (TestEngine, AdminCapability) {
    let config = EngineConfig::new(CUSTODY, TREASURY).with_yield_routing(route_to_yield);
    VaultEngine::new(config, ProtocolParameters::default(), collaborators(), NONCE).unwrap()
}

/// Walk the oracle to `target` in steps within its deviation limit
pub fn set_price(engine: &mut TestEngine, target: u128, now: u64) {
    loop {
        let current = engine.price_feed().state().price.price;
        if current == target {
            break;
        }
        let max_step = current / 10;
        let next = if target > current {
            target.min(current + max_step)
        } else {
            target.max(current - max_step)
        };
        engine
            .price_feed_mut()
            .update_price(&OPERATOR, next, now)
            .unwrap();
    }
}

/// Credit `assets` of interest to the pool, backed by real wBTC at the reserve
pub fn accrue_yield(engine: &mut TestEngine, assets: u128) {
    engine
        .collateral_token_mut()
        .mint(&BRIDGE, &RESERVE, assets)
        .unwrap();
    engine.yield_source_mut().accrue(assets).unwrap();
}

/// Hand `amount` btcUSD to the keeper from a separately collateralized position
pub fn fund_keeper(engine: &mut TestEngine, amount: u128, now: u64) {
    engine.deposit_collateral(&KEEPER, 5 * ONE_BTC, now).unwrap();
    engine.mint_stablecoin(&KEEPER, amount, now).unwrap();
    engine
        .stablecoin_mut()
        .approve(&KEEPER, &CUSTODY, u128::MAX);
}

/// wBTC sitting at the yield reserve
pub fn reserve_balance(engine: &TestEngine) -> u128 {
    engine.collateral_token().balance_of(&RESERVE)
}
