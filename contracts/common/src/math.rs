//! Mathematical Utilities for btcUSD Protocol
//!
//! Fixed-point arithmetic with explicit decimal scales.
//!
//! Every monetary quantity carries its scale (wBTC = 8, btcUSD = 18,
//! price = 8). Quantities of different scales never combine implicitly:
//! `Decimal::checked_add` refuses them, and the typed helpers below do the
//! rescaling in one place. Division floors unless the name says `ceil`.

use crate::constants::ratios::PRECISION;
use crate::constants::scale::{PRICE_DECIMALS, STABLE_DECIMALS, WBTC_DECIMALS};
use crate::errors::{BtcUsdError, BtcUsdResult};

/// Largest power of ten representable in u128
const MAX_SCALE: u8 = 38;

// ============ Decimal ============

/// Unsigned fixed-point value: `raw / 10^scale`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Decimal {
    raw: u128,
    scale: u8,
}

impl Decimal {
    pub const fn new(raw: u128, scale: u8) -> Self {
        Self { raw, scale }
    }

    /// wBTC amount in base units
    pub const fn wbtc(raw: u128) -> Self {
        Self::new(raw, WBTC_DECIMALS)
    }

    /// btcUSD amount in base units
    pub const fn stable(raw: u128) -> Self {
        Self::new(raw, STABLE_DECIMALS)
    }

    /// Oracle price in base units
    pub const fn price(raw: u128) -> Self {
        Self::new(raw, PRICE_DECIMALS)
    }

    pub const fn raw(&self) -> u128 {
        self.raw
    }

    pub const fn scale(&self) -> u8 {
        self.scale
    }

    pub const fn is_zero(&self) -> bool {
        self.raw == 0
    }

    pub fn checked_add(self, other: Self) -> BtcUsdResult<Self> {
        self.same_scale(&other)?;
        let raw = self.raw.checked_add(other.raw).ok_or(BtcUsdError::Overflow)?;
        Ok(Self::new(raw, self.scale))
    }

    pub fn checked_sub(self, other: Self) -> BtcUsdResult<Self> {
        self.same_scale(&other)?;
        let raw = self.raw.checked_sub(other.raw).ok_or(BtcUsdError::Overflow)?;
        Ok(Self::new(raw, self.scale))
    }

    /// Product of two decimals; the result scale is the sum of both scales
    pub fn checked_mul(self, other: Self) -> BtcUsdResult<Self> {
        let scale = self
            .scale
            .checked_add(other.scale)
            .filter(|s| *s <= MAX_SCALE)
            .ok_or(BtcUsdError::Overflow)?;
        let raw = self.raw.checked_mul(other.raw).ok_or(BtcUsdError::Overflow)?;
        Ok(Self::new(raw, scale))
    }

    /// Convert to another scale, flooring when precision is dropped
    pub fn rescale(self, to: u8) -> BtcUsdResult<Self> {
        if to >= self.scale {
            let factor = pow10(to - self.scale)?;
            let raw = self.raw.checked_mul(factor).ok_or(BtcUsdError::Overflow)?;
            Ok(Self::new(raw, to))
        } else {
            let factor = pow10(self.scale - to)?;
            Ok(Self::new(self.raw / factor, to))
        }
    }

    /// Convert to a smaller scale, rounding up any dropped remainder
    pub fn rescale_ceil(self, to: u8) -> BtcUsdResult<Self> {
        if to >= self.scale {
            return self.rescale(to);
        }
        let factor = pow10(self.scale - to)?;
        Ok(Self::new(self.raw.div_ceil(factor), to))
    }

    fn same_scale(&self, other: &Self) -> BtcUsdResult<()> {
        if self.scale != other.scale {
            return Err(BtcUsdError::ScaleMismatch {
                left: self.scale,
                right: other.scale,
            });
        }
        Ok(())
    }
}

/// 10^exp as u128
pub fn pow10(exp: u8) -> BtcUsdResult<u128> {
    10u128
        .checked_pow(u32::from(exp))
        .ok_or(BtcUsdError::Overflow)
}

// ============ Integer Helpers ============

/// a * b / d, rounded down
pub fn mul_div_floor(a: u128, b: u128, d: u128) -> BtcUsdResult<u128> {
    if d == 0 {
        return Err(BtcUsdError::DivisionByZero);
    }
    a.checked_mul(b)
        .ok_or(BtcUsdError::Overflow)
        .map(|product| product / d)
}

/// a * b / d, rounded up
pub fn mul_div_ceil(a: u128, b: u128, d: u128) -> BtcUsdResult<u128> {
    if d == 0 {
        return Err(BtcUsdError::DivisionByZero);
    }
    a.checked_mul(b)
        .ok_or(BtcUsdError::Overflow)
        .map(|product| product.div_ceil(d))
}

/// amount * bps / 10000, rounded down
pub fn bps_of(amount: u128, bps: u64) -> BtcUsdResult<u128> {
    mul_div_floor(amount, u128::from(bps), u128::from(PRECISION))
}

// ============ Collateral Valuation ============

/// Value of `collateral` wBTC at `price`, in btcUSD base units
pub fn collateral_value(collateral: u128, price: u128) -> BtcUsdResult<u128> {
    Ok(Decimal::wbtc(collateral)
        .checked_mul(Decimal::price(price))?
        .rescale(STABLE_DECIMALS)?
        .raw())
}

/// Factor turning (wBTC units * price units) into btcUSD units
fn value_shift() -> BtcUsdResult<u128> {
    pow10(STABLE_DECIMALS - WBTC_DECIMALS - PRICE_DECIMALS)
}

/// wBTC units worth `value` btcUSD at `price`, rounded down
pub fn collateral_for_value(value: u128, price: u128) -> BtcUsdResult<u128> {
    if price == 0 {
        return Err(BtcUsdError::InvalidPrice { price });
    }
    let denominator = price.checked_mul(value_shift()?).ok_or(BtcUsdError::Overflow)?;
    Ok(value / denominator)
}

/// wBTC units worth `value` btcUSD at `price`, rounded up
pub fn collateral_for_value_ceil(value: u128, price: u128) -> BtcUsdResult<u128> {
    if price == 0 {
        return Err(BtcUsdError::InvalidPrice { price });
    }
    let denominator = price.checked_mul(value_shift()?).ok_or(BtcUsdError::Overflow)?;
    Ok(value.div_ceil(denominator))
}

// ============ Ratios ============

/// Collateral ratio in basis points.
///
/// Zero debt returns 0, which callers treat as infinite health.
pub fn collateral_ratio_bps(collateral: u128, debt: u128, price: u128) -> BtcUsdResult<u128> {
    if debt == 0 {
        return Ok(0);
    }
    let value = collateral_value(collateral, price)?;
    mul_div_floor(value, u128::from(PRECISION), debt)
}

/// Largest debt `collateral` can carry while keeping `ratio_bps`
pub fn max_debt_at_ratio(collateral: u128, price: u128, ratio_bps: u64) -> BtcUsdResult<u128> {
    let value = collateral_value(collateral, price)?;
    mul_div_floor(value, u128::from(PRECISION), u128::from(ratio_bps))
}

/// Smallest collateral that keeps `debt` at or above `ratio_bps`, rounded up
pub fn required_collateral(debt: u128, price: u128, ratio_bps: u64) -> BtcUsdResult<u128> {
    if debt == 0 {
        return Ok(0);
    }
    let value = mul_div_ceil(debt, u128::from(ratio_bps), u128::from(PRECISION))?;
    collateral_for_value_ceil(value, price)
}

/// Price at which the ratio equals `threshold_bps`; 0 without collateral
pub fn liquidation_price(collateral: u128, debt: u128, threshold_bps: u64) -> BtcUsdResult<u128> {
    if collateral == 0 {
        return Ok(0);
    }
    // price = debt * T / (collateral * 10^shift * PRECISION)
    let denominator = collateral
        .checked_mul(value_shift()?)
        .and_then(|v| v.checked_mul(u128::from(PRECISION)))
        .ok_or(BtcUsdError::Overflow)?;
    mul_div_floor(debt, u128::from(threshold_bps), denominator)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HALF_BTC: u128 = 50_000_000;
    const PRICE_65K: u128 = 6_500_000_000_000;
    const PRICE_50K: u128 = 5_000_000_000_000;

    #[test]
    fn test_scale_mismatch_rejected() {
        let btc = Decimal::wbtc(1);
        let usd = Decimal::stable(1);
        assert_eq!(
            btc.checked_add(usd),
            Err(BtcUsdError::ScaleMismatch { left: 8, right: 18 })
        );
        assert!(btc.checked_sub(usd).is_err());
        assert_eq!(btc.checked_add(Decimal::wbtc(2)).unwrap().raw(), 3);
    }

    #[test]
    fn test_mul_adds_scales() {
        let product = Decimal::wbtc(HALF_BTC).checked_mul(Decimal::price(PRICE_65K)).unwrap();
        assert_eq!(product.scale(), 16);
        assert_eq!(product.rescale(18).unwrap().raw(), 32_500 * 1_000_000_000_000_000_000);
    }

    #[test]
    fn test_rescale_rounding() {
        let d = Decimal::new(1_999, 3);
        assert_eq!(d.rescale(0).unwrap().raw(), 1);
        assert_eq!(d.rescale_ceil(0).unwrap().raw(), 2);
        assert_eq!(Decimal::new(2_000, 3).rescale_ceil(0).unwrap().raw(), 2);
    }

    #[test]
    fn test_mul_div() {
        assert_eq!(mul_div_floor(10, 1, 3).unwrap(), 3);
        assert_eq!(mul_div_ceil(10, 1, 3).unwrap(), 4);
        assert_eq!(mul_div_floor(1, 1, 0), Err(BtcUsdError::DivisionByZero));
        assert_eq!(mul_div_floor(u128::MAX, 2, 1), Err(BtcUsdError::Overflow));
        assert_eq!(bps_of(1_000_000, 3_000).unwrap(), 300_000);
    }

    #[test]
    fn test_collateral_value() {
        // 0.5 BTC at $65,000 = $32,500
        let value = collateral_value(HALF_BTC, PRICE_65K).unwrap();
        assert_eq!(value, 32_500_000_000_000_000_000_000);
        assert_eq!(collateral_for_value(value, PRICE_65K).unwrap(), HALF_BTC);
    }

    #[test]
    fn test_ratio_at_min_mint() {
        let debt = max_debt_at_ratio(HALF_BTC, PRICE_65K, 15_000).unwrap();
        assert_eq!(debt, 21_666_666_666_666_666_666_666);
        assert_eq!(collateral_ratio_bps(HALF_BTC, debt, PRICE_65K).unwrap(), 15_000);
        assert_eq!(collateral_ratio_bps(HALF_BTC, debt, PRICE_50K).unwrap(), 11_538);
    }

    #[test]
    fn test_zero_debt_ratio() {
        assert_eq!(collateral_ratio_bps(HALF_BTC, 0, PRICE_65K).unwrap(), 0);
        assert_eq!(required_collateral(0, PRICE_65K, 15_000).unwrap(), 0);
    }

    #[test]
    fn test_required_collateral_rounds_up() {
        let debt = 21_666_666_666_666_666_666_666;
        // exact requirement is 49_999_999.99.., rounded up to the full half BTC
        assert_eq!(required_collateral(debt, PRICE_65K, 15_000).unwrap(), HALF_BTC);
    }

    #[test]
    fn test_liquidation_price() {
        let debt = 21_666_666_666_666_666_666_666;
        let price = liquidation_price(HALF_BTC, debt, 12_000).unwrap();
        assert_eq!(price, 5_199_999_999_999);
        assert!(collateral_ratio_bps(HALF_BTC, debt, price).unwrap() < 12_000);
        assert!(collateral_ratio_bps(HALF_BTC, debt, price + 1).unwrap() >= 12_000);
        assert_eq!(liquidation_price(0, debt, 12_000).unwrap(), 0);
    }

    #[test]
    fn test_zero_price_rejected() {
        assert!(matches!(
            collateral_for_value(1, 0),
            Err(BtcUsdError::InvalidPrice { price: 0 })
        ));
    }
}
