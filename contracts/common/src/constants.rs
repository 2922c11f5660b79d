//! Protocol Constants
//!
//! All magic numbers and default configuration values for the btcUSD protocol.
//! Ratios are expressed in basis points against [`ratios::PRECISION`].
//!
//! # Network Configuration
//!
//! Use feature flags to compile for different networks:
//! - `mainnet` - Production values (higher minimum deposit, tighter price age)
//! - Default (no feature) - Testnet values (lower minimums for testing)
//!
//! ```toml
//! # For mainnet deployment:
//! btcusd-common = { path = "...", features = ["mainnet"] }
//! ```

/// Decimal scales of every monetary quantity the engine touches
pub mod scale {
    /// wBTC decimal places (satoshi precision)
    pub const WBTC_DECIMALS: u8 = 8;
    /// btcUSD decimal places
    pub const STABLE_DECIMALS: u8 = 18;
    /// Oracle price decimal places (USD per BTC)
    pub const PRICE_DECIMALS: u8 = 8;

    /// One wBTC in base units
    pub const ONE_WBTC: u128 = 100_000_000;
    /// One btcUSD in base units
    pub const ONE_STABLE: u128 = 1_000_000_000_000_000_000;
}

/// Token Metadata
pub mod token {
    /// Stablecoin name
    pub const NAME: &str = "btcUSD";
    /// Stablecoin symbol
    pub const SYMBOL: &str = "btcUSD";
    /// Collateral token symbol
    pub const COLLATERAL_SYMBOL: &str = "wBTC";
}

/// Collateralization ratios (basis points, 10000 = 100%)
pub mod ratios {
    /// Basis point denominator
    pub const PRECISION: u64 = 10_000;

    /// Minimum collateral ratio every position with debt must keep (150%)
    pub const MIN_COLLATERAL_RATIO_BPS: u64 = 15_000;

    /// Below this ratio a position can be liquidated (120%)
    pub const LIQUIDATION_THRESHOLD_BPS: u64 = 12_000;

    /// Maximum loan-to-value at mint time (66.67%)
    pub const MAX_LTV_BPS: u64 = 6_667;
}

/// Liquidation Configuration
pub mod liquidation {
    /// Collateral penalty on top of the repaid value (10%)
    pub const LIQUIDATION_PENALTY_BPS: u64 = 1_000;

    /// Share of the penalty paid to the liquidator (5% of the base seizure)
    pub const LIQUIDATOR_REWARD_BPS: u64 = 500;

    /// Maximum fraction of debt repayable in a single call (50%)
    pub const CLOSE_FACTOR_BPS: u64 = 5_000;

    /// Upper bound accepted for the liquidation penalty (30%)
    pub const MAX_LIQUIDATION_PENALTY_BPS: u64 = 3_000;
}

/// Yield split between depositors and the protocol treasury
pub mod yield_share {
    /// Depositor share of harvested yield (70%)
    pub const USER_YIELD_SHARE_BPS: u64 = 7_000;

    /// Protocol share of harvested yield (30%)
    pub const PROTOCOL_YIELD_SHARE_BPS: u64 = 3_000;
}

/// Oracle Configuration
pub mod oracle {
    /// Maximum price age in seconds before the engine treats a price as stale
    /// - Mainnet: 15 minutes
    /// - Testnet: 1 hour
    #[cfg(feature = "mainnet")]
    pub const MAX_PRICE_AGE_SECS: u64 = 900;
    #[cfg(not(feature = "mainnet"))]
    pub const MAX_PRICE_AGE_SECS: u64 = 3_600;

    /// Maximum allowed price deviation per operator update (10%)
    pub const MAX_PRICE_DEVIATION_BPS: u64 = 1_000;
}

/// Deposit limits
///
/// Values differ between mainnet and testnet to allow easier testing.
pub mod limits {
    /// Minimum collateral deposit
    /// - Mainnet: 0.001 wBTC
    /// - Testnet: 0.00001 wBTC (1,000 sats)
    #[cfg(feature = "mainnet")]
    pub const MIN_DEPOSIT: u128 = 100_000;
    #[cfg(not(feature = "mainnet"))]
    pub const MIN_DEPOSIT: u128 = 1_000;
}
