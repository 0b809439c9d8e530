// EVM word bounds and division semantics over BigInt.
//
// All bit-exact kernels in this crate run on BigInt end-to-end, so arithmetic
// can never wrap silently. Every place the EVM would overflow instead checks
// the word bound and surfaces a typed error.

use num_bigint::BigInt;
use num_traits::{One, Signed, Zero};
use once_cell::sync::Lazy;

use crate::errors::EvmError;

pub static MAX_UINT256: Lazy<BigInt> = Lazy::new(|| (BigInt::one() << 256) - 1);
pub static MAX_UINT160: Lazy<BigInt> = Lazy::new(|| (BigInt::one() << 160) - 1);
pub static MAX_UINT128: Lazy<BigInt> = Lazy::new(|| (BigInt::one() << 128) - 1);
pub static MAX_UINT24: Lazy<BigInt> = Lazy::new(|| (BigInt::one() << 24) - 1);
pub static MAX_INT256: Lazy<BigInt> = Lazy::new(|| (BigInt::one() << 255) - 1);
pub static MIN_INT256: Lazy<BigInt> = Lazy::new(|| {
    let max_half: BigInt = BigInt::one() << 255;
    -max_half
});

pub const MAX_INT16: i16 = i16::MAX;

#[inline]
pub fn big(v: i64) -> BigInt {
    BigInt::from(v)
}

/// Parse a decimal constant. Only used for compile-time literals, so a parse
/// failure is a programming error.
#[inline]
pub fn big_dec(s: &str) -> BigInt {
    BigInt::parse_bytes(s.as_bytes(), 10).expect("Failed to parse BigInt constant")
}

#[inline]
pub fn ensure_uint256(value: &BigInt) -> Result<(), EvmError> {
    if value.is_negative() || value > &*MAX_UINT256 {
        return Err(EvmError::InvalidUint256);
    }
    Ok(())
}

#[inline]
pub fn ensure_uint160(value: &BigInt) -> Result<(), EvmError> {
    if value.is_negative() || value > &*MAX_UINT160 {
        return Err(EvmError::Uint160Overflow);
    }
    Ok(())
}

#[inline]
pub fn ensure_uint128(value: &BigInt) -> Result<(), EvmError> {
    if value.is_negative() || value > &*MAX_UINT128 {
        return Err(EvmError::InvalidUint256);
    }
    Ok(())
}

#[inline]
pub fn ensure_int256(value: &BigInt) -> Result<(), EvmError> {
    if value < &*MIN_INT256 || value > &*MAX_INT256 {
        return Err(EvmError::InvalidUint256);
    }
    Ok(())
}

/// Integer division with truncation toward zero, matching EVM SDIV. BigInt
/// division already truncates toward zero, so this exists to make the intent
/// explicit at call sites that handle negative operands.
#[inline]
pub fn evm_divide(a: &BigInt, b: &BigInt) -> Result<BigInt, EvmError> {
    if b.is_zero() {
        return Err(EvmError::ZeroDivision);
    }
    Ok(a / b)
}

/// Floor division, matching Solidity's behavior for the tick compression
/// paths that round toward negative infinity.
#[inline]
pub fn floor_divide(a: &BigInt, b: &BigInt) -> BigInt {
    let quotient = a / b;
    if (a % b).is_zero() || (a.is_negative() == b.is_negative()) {
        quotient
    } else {
        quotient - 1
    }
}

/// Ceiling division for non-negative operands.
#[inline]
pub fn div_rounding_up(x: &BigInt, y: &BigInt) -> Result<BigInt, EvmError> {
    if y.is_zero() {
        return Err(EvmError::ZeroDivision);
    }
    let quotient = x / y;
    if (x % y).is_zero() {
        Ok(quotient)
    } else {
        Ok(quotient + 1)
    }
}

/// Index of the most significant set bit. The argument must be positive.
#[inline]
pub fn most_significant_bit(value: &BigInt) -> u64 {
    debug_assert!(value.is_positive());
    value.bits() - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evm_divide_truncates_toward_zero() {
        assert_eq!(evm_divide(&big(7), &big(2)).unwrap(), big(3));
        assert_eq!(evm_divide(&big(-7), &big(2)).unwrap(), big(-3));
        assert_eq!(evm_divide(&big(7), &big(-2)).unwrap(), big(-3));
        assert_eq!(evm_divide(&big(-7), &big(-2)).unwrap(), big(3));
        assert_eq!(evm_divide(&big(1), &big(0)), Err(EvmError::ZeroDivision));
    }

    #[test]
    fn floor_divide_rounds_toward_negative_infinity() {
        assert_eq!(floor_divide(&big(7), &big(2)), big(3));
        assert_eq!(floor_divide(&big(-7), &big(2)), big(-4));
        assert_eq!(floor_divide(&big(-6), &big(2)), big(-3));
    }

    #[test]
    fn div_rounding_up_adds_one_for_remainders() {
        assert_eq!(div_rounding_up(&big(7), &big(2)).unwrap(), big(4));
        assert_eq!(div_rounding_up(&big(6), &big(2)).unwrap(), big(3));
        assert_eq!(div_rounding_up(&big(0), &big(5)).unwrap(), big(0));
    }

    #[test]
    fn msb_matches_bit_positions() {
        assert_eq!(most_significant_bit(&big(1)), 0);
        assert_eq!(most_significant_bit(&big(2)), 1);
        assert_eq!(most_significant_bit(&(BigInt::one() << 255)), 255);
    }

    #[test]
    fn word_bounds() {
        assert!(ensure_uint256(&MAX_UINT256).is_ok());
        assert!(ensure_uint256(&(&*MAX_UINT256 + 1)).is_err());
        assert!(ensure_uint160(&MAX_UINT160).is_ok());
        assert!(ensure_uint160(&(&*MAX_UINT160 + 1)).is_err());
        assert!(ensure_int256(&MIN_INT256).is_ok());
        assert!(ensure_int256(&(&*MIN_INT256 - 1)).is_err());
    }
}
