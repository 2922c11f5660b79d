//! Price Oracle
//!
//! BTC/USD price access for the btcUSD protocol.
//!
//! - [`PriceGateway`] wraps any [`PriceFeed`] and applies the engine's own
//!   staleness rule on top of the oracle's flag. Mutating operations go
//!   through [`PriceGateway::fresh_price`], which refuses stale data;
//!   views use [`PriceGateway::view_price`], which reports it.
//! - [`OperatorOracle`] is a trusted-operator feed with a per-update
//!   deviation limit, used in tests and local deployments.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use btcusd_common::{
    constants::oracle::{MAX_PRICE_AGE_SECS, MAX_PRICE_DEVIATION_BPS},
    constants::ratios::PRECISION,
    errors::{BtcUsdError, BtcUsdResult},
    interfaces::PriceFeed,
    types::{Address, PriceData},
    validation::{is_stale, require_caller, require_fresh_price},
};

// ============ Price Gateway ============

/// Staleness-checked accessor over a price feed
#[derive(Debug, Clone)]
pub struct PriceGateway<F> {
    feed: F,
    max_age: u64,
}

impl<F: PriceFeed> PriceGateway<F> {
    pub fn new(feed: F, max_age: u64) -> Self {
        Self { feed, max_age }
    }

    /// Gateway with the network default age
    pub fn with_default_age(feed: F) -> Self {
        Self::new(feed, MAX_PRICE_AGE_SECS)
    }

    /// Price for a mutating operation.
    ///
    /// # Errors
    /// - `InvalidPrice` if the oracle reports zero
    /// - `StalePrice` if the oracle flags staleness or the reading is older
    ///   than `max_age`
    pub fn fresh_price(&self, now: u64) -> BtcUsdResult<PriceData> {
        let data = self.feed.latest_price()?;
        require_fresh_price(&data, now, self.max_age)?;
        Ok(data)
    }

    /// Price for a read-only query; `is_stale` combines both signals
    pub fn view_price(&self, now: u64) -> BtcUsdResult<PriceData> {
        let data = self.feed.latest_price()?;
        if data.price == 0 {
            return Err(BtcUsdError::InvalidPrice { price: 0 });
        }
        let stale = is_stale(&data, now, self.max_age);
        if stale {
            log::warn!(
                "serving stale price {} (published {}, now {}, max age {}s)",
                data.price,
                data.timestamp,
                now,
                self.max_age
            );
        }
        Ok(PriceData {
            is_stale: stale,
            ..data
        })
    }

    pub fn max_age(&self) -> u64 {
        self.max_age
    }

    pub fn set_max_age(&mut self, max_age: u64) -> BtcUsdResult<()> {
        if max_age == 0 {
            return Err(BtcUsdError::InvalidParameter {
                param: "max_price_age",
                reason: "must be positive",
            });
        }
        self.max_age = max_age;
        Ok(())
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    pub fn feed_mut(&mut self) -> &mut F {
        &mut self.feed
    }
}

// ============ Operator Oracle ============

/// Operator oracle state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct OracleState {
    /// Current price data
    pub price: PriceData,
    /// Authorized operator (can update price)
    pub operator: Address,
    /// Admin (can change operator)
    pub admin: Address,
    /// Whether oracle is active
    pub is_active: bool,
}

/// Trusted-operator price feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorOracle {
    state: OracleState,
}

impl OperatorOracle {
    /// Create an oracle with an initial price published at `now`
    pub fn new(admin: Address, operator: Address, initial_price: u128, now: u64) -> BtcUsdResult<Self> {
        if !validate_price_format(initial_price) {
            return Err(BtcUsdError::InvalidPrice {
                price: initial_price,
            });
        }
        Ok(Self {
            state: OracleState {
                price: PriceData {
                    price: initial_price,
                    timestamp: now,
                    is_stale: false,
                },
                operator,
                admin,
                is_active: true,
            },
        })
    }

    pub fn state(&self) -> &OracleState {
        &self.state
    }

    /// Publish a new price
    pub fn update_price(&mut self, signer: &Address, new_price: u128, now: u64) -> BtcUsdResult<()> {
        // 1. Only operator can update price
        require_caller(&self.state.operator, signer)?;

        // 2. Price must be within reasonable range ($1,000 - $10,000,000)
        if !validate_price_format(new_price) {
            return Err(BtcUsdError::InvalidPrice { price: new_price });
        }

        // 3. Check price deviation (prevent manipulation)
        let old_price = self.state.price.price;
        if calculate_price_deviation(old_price, new_price) > MAX_PRICE_DEVIATION_BPS {
            return Err(BtcUsdError::PriceDeviation {
                old_price,
                new_price,
                max_deviation_bps: MAX_PRICE_DEVIATION_BPS,
            });
        }

        // 4. Publish and reactivate
        self.state.price = PriceData {
            price: new_price,
            timestamp: now,
            is_stale: false,
        };
        self.state.is_active = true;

        log::debug!("oracle price {} -> {} at {}", old_price, new_price, now);
        Ok(())
    }

    /// Flag the current price as stale until the next update
    pub fn mark_stale(&mut self, signer: &Address) -> BtcUsdResult<()> {
        if *signer != self.state.operator && *signer != self.state.admin {
            return Err(BtcUsdError::Unauthorized { actual: *signer });
        }
        self.state.price.is_stale = true;
        Ok(())
    }

    /// Replace the operator
    pub fn set_operator(&mut self, signer: &Address, new_operator: Address) -> BtcUsdResult<()> {
        // 1. Only admin can change operator
        require_caller(&self.state.admin, signer)?;

        // 2. New operator must be different
        if new_operator == self.state.operator {
            return Err(BtcUsdError::InvalidParameter {
                param: "operator",
                reason: "same as current",
            });
        }

        self.state.operator = new_operator;
        Ok(())
    }

    /// Take the feed offline; readers see a stale flag
    pub fn deactivate(&mut self, signer: &Address) -> BtcUsdResult<()> {
        require_caller(&self.state.admin, signer)?;
        self.state.is_active = false;
        Ok(())
    }
}

impl PriceFeed for OperatorOracle {
    fn latest_price(&self) -> BtcUsdResult<PriceData> {
        Ok(PriceData {
            is_stale: self.state.price.is_stale || !self.state.is_active,
            ..self.state.price
        })
    }
}

// ============ Helper Functions ============

/// Calculate price deviation in basis points
///
/// 100 bps = 1%, 10000 bps = 100%
pub fn calculate_price_deviation(old_price: u128, new_price: u128) -> u64 {
    if old_price == 0 {
        return PRECISION; // 100% if no previous price
    }

    let diff = old_price.abs_diff(new_price);
    let deviation = diff.saturating_mul(u128::from(PRECISION)) / old_price;
    u64::try_from(deviation).unwrap_or(u64::MAX)
}

/// Validate price format (8 decimals)
pub fn validate_price_format(price: u128) -> bool {
    const MIN_REASONABLE_PRICE: u128 = 1_000_00000000; // $1,000
    const MAX_REASONABLE_PRICE: u128 = 10_000_000_00000000; // $10,000,000

    (MIN_REASONABLE_PRICE..=MAX_REASONABLE_PRICE).contains(&price)
}

// ============ Tests ============

#[cfg(test)]
mod tests {
    use super::*;

    const ADMIN: Address = [0u8; 32];
    const OPERATOR: Address = [1u8; 32];
    const PRICE_65K: u128 = 6_500_000_000_000;

    fn oracle_at(now: u64) -> OperatorOracle {
        OperatorOracle::new(ADMIN, OPERATOR, PRICE_65K, now).unwrap()
    }

    #[test]
    fn test_update_price_success() {
        let mut oracle = oracle_at(100);
        let new_price = 6_565_000_000_000; // +1%

        oracle.update_price(&OPERATOR, new_price, 160).unwrap();

        let data = oracle.latest_price().unwrap();
        assert_eq!(data.price, new_price);
        assert_eq!(data.timestamp, 160);
        assert!(!data.is_stale);
    }

    #[test]
    fn test_update_price_too_large_deviation() {
        let mut oracle = oracle_at(100);
        let result = oracle.update_price(&OPERATOR, 8_000_000_000_000, 160);
        assert!(matches!(result, Err(BtcUsdError::PriceDeviation { .. })));
    }

    #[test]
    fn test_update_price_unauthorized() {
        let mut oracle = oracle_at(100);
        let result = oracle.update_price(&[99u8; 32], PRICE_65K, 160);
        assert!(matches!(result, Err(BtcUsdError::Unauthorized { .. })));
    }

    #[test]
    fn test_gateway_rejects_old_price() {
        let gateway = PriceGateway::new(oracle_at(1_000), 3_600);

        assert_eq!(gateway.fresh_price(4_600).unwrap().price, PRICE_65K);

        let err = gateway.fresh_price(4_601).unwrap_err();
        assert!(matches!(
            err,
            BtcUsdError::StalePrice {
                price_timestamp: 1_000,
                now: 4_601,
                max_age: 3_600,
                oracle_flag: false,
            }
        ));
    }

    #[test]
    fn test_gateway_honors_oracle_flag() {
        let mut gateway = PriceGateway::new(oracle_at(1_000), 3_600);
        gateway.feed_mut().mark_stale(&OPERATOR).unwrap();

        assert!(matches!(
            gateway.fresh_price(1_000),
            Err(BtcUsdError::StalePrice { oracle_flag: true, .. })
        ));

        // a fresh update clears the flag
        gateway.feed_mut().update_price(&OPERATOR, PRICE_65K, 1_010).unwrap();
        assert!(gateway.fresh_price(1_010).is_ok());
    }

    #[test]
    fn test_view_price_flags_staleness() {
        let gateway = PriceGateway::new(oracle_at(0), 3_600);
        let view = gateway.view_price(10_000).unwrap();
        assert_eq!(view.price, PRICE_65K);
        assert!(view.is_stale);
        assert!(!gateway.view_price(10).unwrap().is_stale);
    }

    #[test]
    fn test_deactivated_oracle_reads_stale() {
        let mut oracle = oracle_at(0);
        oracle.deactivate(&ADMIN).unwrap();
        assert!(oracle.latest_price().unwrap().is_stale);
        assert!(oracle.deactivate(&OPERATOR).is_err());
    }

    #[test]
    fn test_set_max_age() {
        let mut gateway = PriceGateway::with_default_age(oracle_at(0));
        assert_eq!(gateway.max_age(), MAX_PRICE_AGE_SECS);
        assert!(gateway.set_max_age(0).is_err());
        gateway.set_max_age(60).unwrap();
        assert!(gateway.fresh_price(61).is_err());
    }

    #[test]
    fn test_price_deviation_calculation() {
        assert_eq!(calculate_price_deviation(100_000, 100_000), 0);
        assert_eq!(calculate_price_deviation(100_000, 101_000), 100);
        assert_eq!(calculate_price_deviation(100_000, 95_000), 500);
        assert_eq!(calculate_price_deviation(0, 1), 10_000);
    }

    #[test]
    fn test_set_operator() {
        let mut oracle = oracle_at(0);
        let new_operator = [2u8; 32];

        assert!(oracle.set_operator(&OPERATOR, new_operator).is_err());
        assert!(oracle.set_operator(&ADMIN, OPERATOR).is_err());
        oracle.set_operator(&ADMIN, new_operator).unwrap();

        assert!(oracle.update_price(&OPERATOR, PRICE_65K, 1).is_err());
        assert!(oracle.update_price(&new_operator, PRICE_65K, 1).is_ok());
    }

    #[test]
    fn test_validate_price_format() {
        assert!(validate_price_format(5_000_000_000_000)); // $50,000
        assert!(!validate_price_format(10_000_000_000)); // $100
        assert!(!validate_price_format(10_000_000_000_000_000)); // $100M
    }
}
