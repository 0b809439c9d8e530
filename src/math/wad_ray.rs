// Aave WadRayMath.
//
// Wad: 18-decimal unsigned fixed point. Ray: 27-decimal unsigned fixed point.
// The default operations round half-up; the explicit floor/ceil variants were
// introduced with the v3.4 TokenMath library and carry its overflow checks.

use num_bigint::BigInt;
use num_traits::Zero;
use once_cell::sync::Lazy;

use crate::errors::EvmError;
use crate::evm::{big_dec, MAX_UINT256};

pub static WAD: Lazy<BigInt> = Lazy::new(|| big_dec("1000000000000000000"));
pub static HALF_WAD: Lazy<BigInt> = Lazy::new(|| big_dec("500000000000000000"));
pub static RAY: Lazy<BigInt> = Lazy::new(|| big_dec("1000000000000000000000000000"));
pub static HALF_RAY: Lazy<BigInt> = Lazy::new(|| big_dec("500000000000000000000000000"));
pub static WAD_RAY_RATIO: Lazy<BigInt> = Lazy::new(|| big_dec("1000000000"));

/// Half-up: (a * b + WAD / 2) / WAD
pub fn wad_mul(a: &BigInt, b: &BigInt) -> Result<BigInt, EvmError> {
    if !b.is_zero() && a > &((&*MAX_UINT256 - &*HALF_WAD) / b) {
        return Err(EvmError::MulOverflow);
    }
    Ok((a * b + &*HALF_WAD) / &*WAD)
}

/// Half-up: (a * WAD + b / 2) / b
pub fn wad_div(a: &BigInt, b: &BigInt) -> Result<BigInt, EvmError> {
    if b.is_zero() {
        return Err(EvmError::ZeroDivision);
    }
    if a > &((&*MAX_UINT256 - b / 2u8) / &*WAD) {
        return Err(EvmError::DivInternal);
    }
    Ok((a * &*WAD + b / 2u8) / b)
}

/// Half-up: (a * b + RAY / 2) / RAY
pub fn ray_mul(a: &BigInt, b: &BigInt) -> Result<BigInt, EvmError> {
    if !b.is_zero() && a > &((&*MAX_UINT256 - &*HALF_RAY) / b) {
        return Err(EvmError::MulOverflow);
    }
    Ok((a * b + &*HALF_RAY) / &*RAY)
}

pub fn ray_mul_floor(a: &BigInt, b: &BigInt) -> Result<BigInt, EvmError> {
    if !b.is_zero() && a > &(&*MAX_UINT256 / b) {
        return Err(EvmError::MulOverflow);
    }
    Ok((a * b) / &*RAY)
}

pub fn ray_mul_ceil(a: &BigInt, b: &BigInt) -> Result<BigInt, EvmError> {
    if !b.is_zero() && a > &(&*MAX_UINT256 / b) {
        return Err(EvmError::MulOverflow);
    }
    let product = a * b;
    let mut result = &product / &*RAY;
    if !(product % &*RAY).is_zero() {
        result += 1;
    }
    Ok(result)
}

/// Half-up: (a * RAY + b / 2) / b
pub fn ray_div(a: &BigInt, b: &BigInt) -> Result<BigInt, EvmError> {
    if b.is_zero() {
        return Err(EvmError::ZeroDivision);
    }
    if a > &((&*MAX_UINT256 - b / 2u8) / &*RAY) {
        return Err(EvmError::DivInternal);
    }
    Ok((a * &*RAY + b / 2u8) / b)
}

pub fn ray_div_floor(a: &BigInt, b: &BigInt) -> Result<BigInt, EvmError> {
    if b.is_zero() {
        return Err(EvmError::ZeroDivision);
    }
    if a > &(&*MAX_UINT256 / &*RAY) {
        return Err(EvmError::DivInternal);
    }
    Ok((a * &*RAY) / b)
}

pub fn ray_div_ceil(a: &BigInt, b: &BigInt) -> Result<BigInt, EvmError> {
    if b.is_zero() {
        return Err(EvmError::ZeroDivision);
    }
    if a > &(&*MAX_UINT256 / &*RAY) {
        return Err(EvmError::DivInternal);
    }
    let scaled = a * &*RAY;
    let mut result = &scaled / b;
    if !(scaled % b).is_zero() {
        result += 1;
    }
    Ok(result)
}

/// Half-up conversion from ray to wad precision.
pub fn ray_to_wad(a: &BigInt) -> BigInt {
    let mut result = a / &*WAD_RAY_RATIO;
    if a % &*WAD_RAY_RATIO >= &*WAD_RAY_RATIO / 2u8 {
        result += 1;
    }
    result
}

/// Exact conversion from wad to ray precision.
pub fn wad_to_ray(a: &BigInt) -> Result<BigInt, EvmError> {
    if a > &(&*MAX_UINT256 / &*WAD_RAY_RATIO) {
        return Err(EvmError::MulOverflow);
    }
    Ok(a * &*WAD_RAY_RATIO)
}

/// Rounding discipline selector used by the per-revision token math.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    HalfUp,
    Floor,
    Ceil,
}

pub fn ray_mul_rounded(a: &BigInt, b: &BigInt, rounding: Rounding) -> Result<BigInt, EvmError> {
    match rounding {
        Rounding::HalfUp => ray_mul(a, b),
        Rounding::Floor => ray_mul_floor(a, b),
        Rounding::Ceil => ray_mul_ceil(a, b),
    }
}

pub fn ray_div_rounded(a: &BigInt, b: &BigInt, rounding: Rounding) -> Result<BigInt, EvmError> {
    match rounding {
        Rounding::HalfUp => ray_div(a, b),
        Rounding::Floor => ray_div_floor(a, b),
        Rounding::Ceil => ray_div_ceil(a, b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evm::big;
    use num_traits::One;

    #[test]
    fn wad_mul_rounds_half_up() {
        let a = big_dec("1500000000000000000"); // 1.5
        let b = big_dec("1500000000000000000");
        assert_eq!(wad_mul(&a, &b).unwrap(), big_dec("2250000000000000000"));

        // 1 wei * 0.5 wad rounds up to 1
        assert_eq!(wad_mul(&BigInt::one(), &HALF_WAD).unwrap(), BigInt::one());
    }

    #[test]
    fn wad_mul_overflow_check() {
        let a = (&*MAX_UINT256 - &*HALF_WAD) / &*WAD + 1u8;
        assert_eq!(wad_mul(&a, &WAD), Err(EvmError::MulOverflow));
        let a = (&*MAX_UINT256 - &*HALF_WAD) / &*WAD;
        assert!(wad_mul(&a, &WAD).is_ok());
    }

    #[test]
    fn wad_div_rejects_zero() {
        assert_eq!(wad_div(&WAD, &BigInt::zero()), Err(EvmError::ZeroDivision));
    }

    #[test]
    fn ray_div_variants_bracket_half_up() {
        // ray_div_floor <= ray_div <= ray_div_ceil, differing by at most 1
        let samples = [
            (big_dec("1000000000000000000000000001"), big_dec("3000000000000000000000000000")),
            (big_dec("50043781461041674422932"), big_dec("1143509431396222220498421265")),
            (big(7), big(3)),
            (big_dec("999999999999999999999999999"), big_dec("1000000000000000000000000000")),
        ];
        for (a, b) in samples {
            let floor = ray_div_floor(&a, &b).unwrap();
            let half = ray_div(&a, &b).unwrap();
            let ceil = ray_div_ceil(&a, &b).unwrap();
            assert!(floor <= half && half <= ceil);
            let spread = &ceil - &floor;
            assert!(spread == BigInt::zero() || spread == BigInt::one());
        }
    }

    #[test]
    fn ray_mul_variants_bracket_half_up() {
        let a = big_dec("50043781461041674422932");
        let b = big_dec("1143509431396222220498421265");
        let floor = ray_mul_floor(&a, &b).unwrap();
        let half = ray_mul(&a, &b).unwrap();
        let ceil = ray_mul_ceil(&a, &b).unwrap();
        assert!(floor <= half && half <= ceil);
        assert!(&ceil - &floor <= BigInt::one());
    }

    #[test]
    fn ray_wad_conversions() {
        let ray_value = big_dec("1000000000000000000000000000");
        assert_eq!(ray_to_wad(&ray_value), *WAD);
        assert_eq!(wad_to_ray(&WAD).unwrap(), *RAY);

        // half-up on the dropped digits
        let just_below_half = big_dec("1000000000000000000499999999");
        let at_half = big_dec("1000000000000000000500000000");
        assert_eq!(ray_to_wad(&just_below_half), *WAD);
        assert_eq!(ray_to_wad(&at_half), &*WAD + 1u8);
    }

    #[test]
    fn div_internal_overflow_check() {
        let too_big = &*MAX_UINT256 / &*RAY + 1u8;
        assert_eq!(ray_div_floor(&too_big, &RAY), Err(EvmError::DivInternal));
        assert_eq!(ray_div_ceil(&too_big, &RAY), Err(EvmError::DivInternal));
    }
}
