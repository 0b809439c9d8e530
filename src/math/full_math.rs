// 512-bit-intermediate multiply/divide primitives.
//
// These are the only high-precision multiply/divide routines used by the
// swap engines. The BigInt product is exact, so the floor quotient equals
// the Solidity FullMath result whenever that result fits in a uint256.

use num_bigint::BigInt;
use num_traits::Zero;

use crate::errors::EvmError;
use crate::evm::MAX_UINT256;

/// Computes floor(a * b / denominator) over the full-width product.
///
/// Fails on a zero denominator or when the quotient exceeds uint256.
pub fn muldiv(a: &BigInt, b: &BigInt, denominator: &BigInt) -> Result<BigInt, EvmError> {
    if denominator.is_zero() {
        return Err(EvmError::ZeroDivision);
    }
    let result = (a * b) / denominator;
    if result > *MAX_UINT256 {
        return Err(EvmError::MulDivOverflow);
    }
    Ok(result)
}

/// Computes ceil(a * b / denominator), failing if the rounded-up result
/// overflows uint256.
pub fn muldiv_rounding_up(a: &BigInt, b: &BigInt, denominator: &BigInt) -> Result<BigInt, EvmError> {
    let mut result = muldiv(a, b, denominator)?;
    if !mulmod(a, b, denominator).is_zero() {
        if result == *MAX_UINT256 {
            return Err(EvmError::MulDivOverflow);
        }
        result += 1;
    }
    Ok(result)
}

/// (a * b) % denominator over the full-width product. A zero denominator
/// yields zero, matching the EVM MULMOD opcode.
pub fn mulmod(a: &BigInt, b: &BigInt, denominator: &BigInt) -> BigInt {
    if denominator.is_zero() {
        return BigInt::zero();
    }
    (a * b) % denominator
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evm::big;
    use num_traits::One;

    fn q128() -> BigInt {
        BigInt::one() << 128
    }

    #[test]
    fn muldiv_rejects_zero_denominator() {
        assert_eq!(
            muldiv(&q128(), &big(5), &BigInt::zero()),
            Err(EvmError::ZeroDivision)
        );
        assert_eq!(
            muldiv_rounding_up(&q128(), &big(5), &BigInt::zero()),
            Err(EvmError::ZeroDivision)
        );
    }

    #[test]
    fn muldiv_rejects_overflowing_quotient() {
        assert_eq!(
            muldiv(&MAX_UINT256, &MAX_UINT256, &big(1)),
            Err(EvmError::MulDivOverflow)
        );
        // max * max / max fits exactly
        assert_eq!(
            muldiv(&MAX_UINT256, &MAX_UINT256, &MAX_UINT256).unwrap(),
            *MAX_UINT256
        );
    }

    #[test]
    fn muldiv_accurate_without_phantom_overflow() {
        // (Q128 * 0.5) * (Q128 * 1.5) / (Q128 * 3) = Q128 / 4
        let result = muldiv(
            &(q128() / 2u8),
            &(q128() * 3u8 / 2u8),
            &(q128() * 3u8),
        )
        .unwrap();
        assert_eq!(result, q128() / 4u8);
    }

    #[test]
    fn muldiv_accurate_with_phantom_overflow() {
        // numerator overflows 256 bits but the quotient fits
        let result = muldiv(&q128(), &(big(35) * q128()), &(big(8) * q128())).unwrap();
        assert_eq!(result, big(4375) * q128() / 1000u16);
    }

    #[test]
    fn rounding_up_differs_by_at_most_one() {
        let a = big(1_000_000_007);
        let b = big(999_999_937);
        let d = big(57);
        let floor = muldiv(&a, &b, &d).unwrap();
        let ceil = muldiv_rounding_up(&a, &b, &d).unwrap();
        let diff = &ceil - &floor;
        assert!(diff == BigInt::zero() || diff == BigInt::one());
        let expected = if mulmod(&a, &b, &d).is_zero() { 0 } else { 1 };
        assert_eq!(diff, big(expected));
    }

    #[test]
    fn rounding_up_overflow_at_max() {
        // a * b = 2^257 - 1: the floor quotient by 2 is exactly MAX_UINT256
        // with a remainder, so the +1 overflows
        let a = crate::evm::big_dec("535006138814359");
        let b = crate::evm::big_dec(
            "432862656469423142931042426214547535783388063929571229938474969",
        );
        assert_eq!(muldiv(&a, &b, &big(2)).unwrap(), *MAX_UINT256);
        assert_eq!(
            muldiv_rounding_up(&a, &b, &big(2)),
            Err(EvmError::MulDivOverflow)
        );
    }
}
