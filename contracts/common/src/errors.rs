//! Error Types for btcUSD Protocol
//!
//! Every failure names the precondition or invariant it tripped and the
//! values involved, so a caller can compute a corrected amount instead of
//! retrying blindly.

use crate::types::Address;

/// Result type alias for btcUSD operations
pub type BtcUsdResult<T> = Result<T, BtcUsdError>;

/// Main error enum for all btcUSD protocol errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BtcUsdError {
    // ============ Position Errors ============
    /// Operation would leave a position with debt below the minimum ratio
    #[error("{operation} unsafe: resulting ratio {resulting_ratio_bps}bps < minimum {required_ratio_bps}bps")]
    InvariantViolation {
        operation: UnsafeOperation,
        resulting_ratio_bps: u128,
        required_ratio_bps: u64,
    },

    /// Withdrawal larger than the collateral held by the position
    #[error("insufficient collateral: requested {requested}, position holds {available}")]
    InsufficientCollateral { available: u128, requested: u128 },

    /// Burn or repay larger than the outstanding debt
    #[error("amount {requested} exceeds outstanding debt {debt}")]
    ExceedsDebt { debt: u128, requested: u128 },

    /// Liquidation override requested with a delta that grows the position
    #[error("liquidation override only reduces positions (collateral delta {collateral_delta}, debt delta {debt_delta})")]
    InvalidOverride { collateral_delta: i128, debt_delta: i128 },

    // ============ Amount Errors ============
    /// Zero amount not allowed
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// Deposit below the configured minimum
    #[error("deposit {amount} below minimum {minimum}")]
    BelowMinimumDeposit { amount: u128, minimum: u128 },

    // ============ Token Collaborator Errors ============
    /// Balance too small (propagated from a token ledger)
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { available: u128, requested: u128 },

    /// Allowance too small (propagated from a token ledger)
    #[error("insufficient allowance: requested {requested}, approved {approved}")]
    InsufficientAllowance { approved: u128, requested: u128 },

    /// Caller is not allowed to perform this operation
    #[error("unauthorized caller {actual:?}")]
    Unauthorized { actual: Address },

    // ============ Oracle Errors ============
    /// Oracle price too old, or flagged stale by the oracle itself
    #[error("stale price: published at {price_timestamp}, now {now}, max age {max_age}s, oracle flag {oracle_flag}")]
    StalePrice {
        price_timestamp: u64,
        now: u64,
        max_age: u64,
        oracle_flag: bool,
    },

    /// Oracle returned an unusable price
    #[error("invalid oracle price {price}")]
    InvalidPrice { price: u128 },

    /// Operator price update moved too far from the previous price
    #[error("price deviation too large: {old_price} -> {new_price} exceeds {max_deviation_bps}bps")]
    PriceDeviation {
        old_price: u128,
        new_price: u128,
        max_deviation_bps: u64,
    },

    // ============ Liquidation Errors ============
    /// Position is not below the liquidation threshold
    #[error("position {user:?} not liquidatable: ratio {ratio_bps}bps >= threshold {threshold_bps}bps or no debt")]
    NotLiquidatable {
        user: Address,
        ratio_bps: u128,
        threshold_bps: u64,
    },

    /// Liquidator cannot cover the repayment
    #[error("liquidator balance {available} below repayment {required}")]
    InsufficientLiquidatorBalance { available: u128, required: u128 },

    /// Liquidation would leave a partially open position less healthy than before
    #[error("liquidation worsens position: ratio {old_ratio_bps}bps -> {new_ratio_bps}bps")]
    LiquidationWorsensPosition {
        old_ratio_bps: u128,
        new_ratio_bps: u128,
    },

    // ============ Configuration Errors ============
    /// Parameter outside its accepted bounds
    #[error("invalid parameter {param}: {reason}")]
    InvalidParameter {
        param: &'static str,
        reason: &'static str,
    },

    // ============ State Errors ============
    /// Protocol is paused
    #[error("protocol is paused")]
    ProtocolPaused,

    /// Supply or backing invariant found broken at the start of an operation
    #[error("global invariant broken: {invariant} (ledger {ledger_value}, accounted {accounted_value})")]
    GlobalInvariantBroken {
        invariant: GlobalInvariant,
        ledger_value: u128,
        accounted_value: u128,
    },

    /// Engine re-entered while an operation was in flight
    #[error("reentrant call rejected")]
    Reentrancy,

    // ============ Yield Errors ============
    /// The external yield source refused an operation
    #[error("yield source failure: {reason}")]
    YieldSourceFailure { reason: &'static str },

    // ============ Math Errors ============
    /// Quantities with different decimal scales were combined
    #[error("decimal scale mismatch: {left} vs {right}")]
    ScaleMismatch { left: u8, right: u8 },

    /// Arithmetic overflow occurred
    #[error("arithmetic overflow")]
    Overflow,

    /// Division by zero
    #[error("division by zero")]
    DivisionByZero,
}

/// Operation that tripped the minimum-ratio invariant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsafeOperation {
    /// Collateral withdrawal
    Withdrawal,
    /// Stablecoin mint
    Mint,
    /// Combined collateral and debt adjustment
    Adjust,
}

impl core::fmt::Display for UnsafeOperation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Withdrawal => f.write_str("withdrawal"),
            Self::Mint => f.write_str("mint"),
            Self::Adjust => f.write_str("adjustment"),
        }
    }
}

/// Global invariants cross-checked against the collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalInvariant {
    /// Sum of debt equals stablecoin supply
    SupplyConservation,
    /// Custodied wBTC covers the sum of collateral
    CollateralBacking,
}

impl core::fmt::Display for GlobalInvariant {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::SupplyConservation => f.write_str("debt/supply conservation"),
            Self::CollateralBacking => f.write_str("collateral backing"),
        }
    }
}

impl BtcUsdError {
    /// Returns a stable error code for logging/debugging
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvariantViolation { .. } => "E001_INVARIANT_VIOLATION",
            Self::InsufficientCollateral { .. } => "E002_INSUFFICIENT_COLLATERAL",
            Self::ExceedsDebt { .. } => "E003_EXCEEDS_DEBT",
            Self::InvalidOverride { .. } => "E004_INVALID_OVERRIDE",
            Self::ZeroAmount => "E010_ZERO_AMOUNT",
            Self::BelowMinimumDeposit { .. } => "E011_BELOW_MIN_DEPOSIT",
            Self::InsufficientBalance { .. } => "E020_INSUFFICIENT_BALANCE",
            Self::InsufficientAllowance { .. } => "E021_INSUFFICIENT_ALLOWANCE",
            Self::Unauthorized { .. } => "E022_UNAUTHORIZED",
            Self::StalePrice { .. } => "E030_STALE_PRICE",
            Self::InvalidPrice { .. } => "E031_INVALID_PRICE",
            Self::PriceDeviation { .. } => "E032_PRICE_DEVIATION",
            Self::NotLiquidatable { .. } => "E040_NOT_LIQUIDATABLE",
            Self::InsufficientLiquidatorBalance { .. } => "E041_LIQUIDATOR_BALANCE",
            Self::LiquidationWorsensPosition { .. } => "E042_LIQ_WORSENS",
            Self::InvalidParameter { .. } => "E050_INVALID_PARAM",
            Self::ProtocolPaused => "E060_PAUSED",
            Self::GlobalInvariantBroken { .. } => "E061_GLOBAL_INVARIANT",
            Self::Reentrancy => "E062_REENTRANCY",
            Self::YieldSourceFailure { .. } => "E070_YIELD_SOURCE",
            Self::ScaleMismatch { .. } => "E080_SCALE_MISMATCH",
            Self::Overflow => "E081_OVERFLOW",
            Self::DivisionByZero => "E082_DIV_ZERO",
        }
    }

    /// Returns true if the caller can fix this by changing inputs or waiting
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::GlobalInvariantBroken { .. }
                | Self::ProtocolPaused
                | Self::Reentrancy
                | Self::ScaleMismatch { .. }
                | Self::Overflow
                | Self::DivisionByZero
        )
    }

    /// Returns true for the one condition that halts all mutations
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::GlobalInvariantBroken { .. })
    }

    /// True for minimum-ratio failures raised by a withdrawal
    pub fn is_withdrawal_unsafe(&self) -> bool {
        matches!(
            self,
            Self::InvariantViolation {
                operation: UnsafeOperation::Withdrawal,
                ..
            }
        )
    }

    /// True for minimum-ratio failures raised by a mint
    pub fn is_mint_unsafe(&self) -> bool {
        matches!(
            self,
            Self::InvariantViolation {
                operation: UnsafeOperation::Mint,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::string::ToString;

    #[test]
    fn test_error_codes_unique() {
        let errors = [
            BtcUsdError::InvariantViolation {
                operation: UnsafeOperation::Mint,
                resulting_ratio_bps: 14_200,
                required_ratio_bps: 15_000,
            },
            BtcUsdError::ExceedsDebt { debt: 1, requested: 2 },
            BtcUsdError::ZeroAmount,
            BtcUsdError::StalePrice {
                price_timestamp: 0,
                now: 10_000,
                max_age: 3_600,
                oracle_flag: false,
            },
            BtcUsdError::Overflow,
        ];

        let codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        let unique: BTreeSet<_> = codes.iter().collect();
        assert_eq!(codes.len(), unique.len(), "Error codes must be unique");
    }

    #[test]
    fn test_message_names_values() {
        let err = BtcUsdError::InvariantViolation {
            operation: UnsafeOperation::Mint,
            resulting_ratio_bps: 14_200,
            required_ratio_bps: 15_000,
        };
        assert_eq!(
            err.to_string(),
            "mint unsafe: resulting ratio 14200bps < minimum 15000bps"
        );
        assert!(err.is_mint_unsafe());
        assert!(!err.is_withdrawal_unsafe());
    }

    #[test]
    fn test_only_global_breach_is_fatal() {
        let breach = BtcUsdError::GlobalInvariantBroken {
            invariant: GlobalInvariant::SupplyConservation,
            ledger_value: 10,
            accounted_value: 9,
        };
        assert!(breach.is_fatal());
        assert!(!breach.is_recoverable());
        assert!(!BtcUsdError::ZeroAmount.is_fatal());
        assert!(BtcUsdError::ZeroAmount.is_recoverable());
    }
}
