//! Validation Helpers for btcUSD Protocol
//!
//! Reusable precondition checks for the engine crates.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use btcusd_common::check;
//!
//! check!(amount > 0, BtcUsdError::ZeroAmount);
//! ```

use crate::errors::{BtcUsdError, BtcUsdResult};
use crate::types::{Address, PriceData};

// ============ Validation Macro ============

/// Check a condition and return an error if it fails.
///
/// # Examples
///
/// ```rust,ignore
/// check!(
///     debt <= position.debt,
///     BtcUsdError::ExceedsDebt {
///         debt: position.debt,
///         requested: debt,
///     }
/// );
/// ```
#[macro_export]
macro_rules! check {
    ($condition:expr, $error:expr) => {
        if !($condition) {
            return Err($error);
        }
    };
}

pub use crate::check;

// ============ Common Validation Helpers ============

/// Require a non-zero amount.
pub fn require_positive(amount: u128) -> BtcUsdResult<()> {
    check!(amount > 0, BtcUsdError::ZeroAmount);
    Ok(())
}

/// Require a deposit of at least `minimum`.
pub fn require_min_deposit(amount: u128, minimum: u128) -> BtcUsdResult<()> {
    require_positive(amount)?;
    check!(
        amount >= minimum,
        BtcUsdError::BelowMinimumDeposit { amount, minimum }
    );
    Ok(())
}

/// Require sufficient balance for an operation.
pub fn require_sufficient_balance(available: u128, requested: u128) -> BtcUsdResult<()> {
    check!(
        available >= requested,
        BtcUsdError::InsufficientBalance {
            available,
            requested,
        }
    );
    Ok(())
}

/// Require the caller to be the expected address.
pub fn require_caller(expected: &Address, actual: &Address) -> BtcUsdResult<()> {
    check!(expected == actual, BtcUsdError::Unauthorized { actual: *actual });
    Ok(())
}

/// Require a usable, fresh price.
///
/// Either the oracle's own flag or an age beyond `max_age` marks the price
/// stale. A timestamp ahead of `now` counts as age zero.
pub fn require_fresh_price(data: &PriceData, now: u64, max_age: u64) -> BtcUsdResult<()> {
    check!(data.price > 0, BtcUsdError::InvalidPrice { price: data.price });
    check!(
        !is_stale(data, now, max_age),
        BtcUsdError::StalePrice {
            price_timestamp: data.timestamp,
            now,
            max_age,
            oracle_flag: data.is_stale,
        }
    );
    Ok(())
}

/// Staleness as the engine sees it: oracle flag OR local age check
pub fn is_stale(data: &PriceData, now: u64, max_age: u64) -> bool {
    data.is_stale || now.saturating_sub(data.timestamp) > max_age
}

#[cfg(test)]
mod tests {
    use super::*;

    fn price_at(timestamp: u64, is_stale: bool) -> PriceData {
        PriceData {
            price: 6_500_000_000_000,
            timestamp,
            is_stale,
        }
    }

    #[test]
    fn test_check_macro() {
        fn validate(value: u128) -> BtcUsdResult<()> {
            check!(value > 0, BtcUsdError::ZeroAmount);
            check!(value <= 100, BtcUsdError::Overflow);
            Ok(())
        }

        assert!(validate(50).is_ok());
        assert_eq!(validate(0), Err(BtcUsdError::ZeroAmount));
        assert_eq!(validate(101), Err(BtcUsdError::Overflow));
    }

    #[test]
    fn test_min_deposit() {
        assert_eq!(require_min_deposit(0, 1_000), Err(BtcUsdError::ZeroAmount));
        assert_eq!(
            require_min_deposit(999, 1_000),
            Err(BtcUsdError::BelowMinimumDeposit { amount: 999, minimum: 1_000 })
        );
        assert!(require_min_deposit(1_000, 1_000).is_ok());
    }

    #[test]
    fn test_price_freshness() {
        // exactly at max age is still fresh
        assert!(require_fresh_price(&price_at(1_000, false), 4_600, 3_600).is_ok());

        let err = require_fresh_price(&price_at(1_000, false), 4_601, 3_600).unwrap_err();
        assert!(matches!(err, BtcUsdError::StalePrice { oracle_flag: false, .. }));

        // oracle flag alone is enough
        let err = require_fresh_price(&price_at(4_600, true), 4_600, 3_600).unwrap_err();
        assert!(matches!(err, BtcUsdError::StalePrice { oracle_flag: true, .. }));

        // future timestamps are not stale
        assert!(!is_stale(&price_at(5_000, false), 4_600, 3_600));

        let zero = PriceData { price: 0, timestamp: 0, is_stale: false };
        assert_eq!(
            require_fresh_price(&zero, 0, 3_600),
            Err(BtcUsdError::InvalidPrice { price: 0 })
        );
    }

    #[test]
    fn test_require_caller() {
        assert!(require_caller(&[1u8; 32], &[1u8; 32]).is_ok());
        assert_eq!(
            require_caller(&[1u8; 32], &[2u8; 32]),
            Err(BtcUsdError::Unauthorized { actual: [2u8; 32] })
        );
    }
}
