//! 18-decimal fixed-point helpers on 256-bit integers
//!
//! Every product in the accrual and gauge math that can leave the 256-bit
//! range is routed through [`mul_div`], which keeps the intermediate in
//! 512 bits before dividing back down.

use crate::error::{Result, RewardsError};
use crate::types::{Bps, BPS_DENOMINATOR};
use primitive_types::{U256, U512};

/// Token amounts, supplies, biases and accumulators
pub type Amount = U256;

/// 10^18, fixed-point one
pub const EXA: U256 = U256([1_000_000_000_000_000_000, 0, 0, 0]);

/// Token amount from whole units (18 decimals)
pub fn tokens(whole: u64) -> Amount {
    U256::from(whole) * EXA
}

/// `a * b / c` with a 512-bit intermediate, rounding down.
///
/// Division by zero yields zero.
pub fn mul_div(a: U256, b: U256, c: U256) -> Result<U256> {
    if c.is_zero() {
        return Ok(U256::zero());
    }
    let wide = a.full_mul(b) / U512::from(c);
    U256::try_from(wide).map_err(|_| RewardsError::ArithmeticOverflow)
}

/// Share of `amount` expressed in basis points
pub fn bps_of(amount: U256, bps: Bps) -> U256 {
    amount * U256::from(bps) / U256::from(BPS_DENOMINATOR)
}

/// Product of two 18-decimal values
pub fn exa_mul(a: U256, b: U256) -> Result<U256> {
    mul_div(a, b, EXA)
}

/// Fixed-point `base^exp` by square-and-multiply, `base` in 18 decimals.
pub fn exa_pow(base: U256, mut exp: u64) -> Result<U256> {
    let mut result = EXA;
    let mut square = base;
    while exp > 0 {
        if exp & 1 == 1 {
            result = exa_mul(result, square)?;
        }
        exp >>= 1;
        if exp > 0 {
            square = exa_mul(square, square)?;
        }
    }
    Ok(result)
}

/// Percentage (bps) as an 18-decimal fraction
pub fn bps_to_exa(bps: Bps) -> U256 {
    EXA * U256::from(bps) / U256::from(BPS_DENOMINATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_exa_constant() {
        assert_eq!(EXA, U256::exp10(18));
        assert_eq!(tokens(3), U256::from(3u64) * U256::exp10(18));
    }

    #[test]
    fn test_mul_div_wide_intermediate() {
        // 1e40 * 1e40 / 1e40 overflows 256 bits without the wide intermediate
        let big = U256::exp10(40);
        assert_eq!(mul_div(big, big, big).unwrap(), big);
    }

    #[test]
    fn test_mul_div_overflowing_result() {
        assert_eq!(
            mul_div(U256::MAX, U256::from(2u8), U256::one()),
            Err(RewardsError::ArithmeticOverflow)
        );
    }

    #[test]
    fn test_mul_div_zero_divisor() {
        assert_eq!(mul_div(EXA, EXA, U256::zero()).unwrap(), U256::zero());
    }

    #[test]
    fn test_exa_pow() {
        let half = EXA / 2;
        assert_eq!(exa_pow(half, 0).unwrap(), EXA);
        assert_eq!(exa_pow(half, 1).unwrap(), half);
        assert_eq!(exa_pow(half, 3).unwrap(), EXA / 8);

        let decay = EXA * 995 / 1000;
        assert_eq!(exa_pow(decay, 2).unwrap(), EXA * 990_025 / 1_000_000);
    }

    #[test]
    fn test_bps_helpers() {
        assert_eq!(bps_of(tokens(100), 2_500), tokens(25));
        assert_eq!(bps_to_exa(10_000), EXA);
        assert_eq!(bps_to_exa(100), EXA / 100);
    }

    proptest! {
        #[test]
        fn prop_mul_div_matches_u128(a in 0u64..u64::MAX, b in 0u64..u64::MAX, c in 1u64..u64::MAX) {
            let expected = (a as u128) * (b as u128) / (c as u128);
            let got = mul_div(U256::from(a), U256::from(b), U256::from(c)).unwrap();
            prop_assert_eq!(got, U256::from(expected));
        }

        #[test]
        fn prop_exa_pow_never_grows_below_one(steps in 0u64..2_000) {
            let decay = EXA * 995 / 1000;
            prop_assert!(exa_pow(decay, steps).unwrap() <= EXA);
        }
    }
}
