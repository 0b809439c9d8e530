// Balancer 18-decimal fixed point helpers with directional rounding.
//
// pow_down/pow_up wrap the log/exp power with the contract's relative error
// haircut so that rounding never favors the trader.

use num_bigint::BigInt;
use num_traits::Zero;
use once_cell::sync::Lazy;

use crate::errors::EvmError;
use crate::evm::{big, big_dec, MAX_UINT256};
use crate::math::log_exp;

pub static ONE: Lazy<BigInt> = Lazy::new(|| big_dec("1000000000000000000"));
static TWO: Lazy<BigInt> = Lazy::new(|| big_dec("2000000000000000000"));
static FOUR: Lazy<BigInt> = Lazy::new(|| big_dec("4000000000000000000"));

// 1e4 wei of relative error tolerated on the raw pow result
static MAX_POW_RELATIVE_ERROR: Lazy<BigInt> = Lazy::new(|| big(10_000));

pub fn mul_down(a: &BigInt, b: &BigInt) -> Result<BigInt, EvmError> {
    let product = a * b;
    if product > *MAX_UINT256 {
        return Err(EvmError::MulOverflow);
    }
    Ok(product / &*ONE)
}

pub fn mul_up(a: &BigInt, b: &BigInt) -> Result<BigInt, EvmError> {
    let product = a * b;
    if product > *MAX_UINT256 {
        return Err(EvmError::MulOverflow);
    }
    if product.is_zero() {
        Ok(BigInt::zero())
    } else {
        Ok((product - 1u8) / &*ONE + 1u8)
    }
}

pub fn div_down(a: &BigInt, b: &BigInt) -> Result<BigInt, EvmError> {
    if b.is_zero() {
        return Err(EvmError::ZeroDivision);
    }
    let scaled = a * &*ONE;
    if scaled > *MAX_UINT256 {
        return Err(EvmError::DivInternal);
    }
    Ok(scaled / b)
}

pub fn div_up(a: &BigInt, b: &BigInt) -> Result<BigInt, EvmError> {
    if b.is_zero() {
        return Err(EvmError::ZeroDivision);
    }
    let scaled = a * &*ONE;
    if scaled > *MAX_UINT256 {
        return Err(EvmError::DivInternal);
    }
    if scaled.is_zero() {
        Ok(BigInt::zero())
    } else {
        Ok((scaled - 1u8) / b + 1u8)
    }
}

/// ONE - x for x <= ONE, zero otherwise.
pub fn complement(x: &BigInt) -> BigInt {
    if x < &*ONE {
        &*ONE - x
    } else {
        BigInt::zero()
    }
}

/// x^y rounded down, with exact shortcuts for y in {1, 2, 4}.
pub fn pow_down(x: &BigInt, y: &BigInt) -> Result<BigInt, EvmError> {
    if y == &*ONE {
        return Ok(x.clone());
    }
    if y == &*TWO {
        return mul_down(x, x);
    }
    if y == &*FOUR {
        let square = mul_down(x, x)?;
        return mul_down(&square, &square);
    }

    let raw = log_exp::pow(x, y)?;
    let max_error = mul_up(&raw, &MAX_POW_RELATIVE_ERROR)? + 1u8;
    if raw < max_error {
        Ok(BigInt::zero())
    } else {
        Ok(raw - max_error)
    }
}

/// x^y rounded up, with exact shortcuts for y in {1, 2, 4}.
pub fn pow_up(x: &BigInt, y: &BigInt) -> Result<BigInt, EvmError> {
    if y == &*ONE {
        return Ok(x.clone());
    }
    if y == &*TWO {
        return mul_up(x, x);
    }
    if y == &*FOUR {
        let square = mul_up(x, x)?;
        return mul_up(&square, &square);
    }

    let raw = log_exp::pow(x, y)?;
    let max_error = mul_up(&raw, &MAX_POW_RELATIVE_ERROR)? + 1u8;
    Ok(raw + max_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(value: u64) -> BigInt {
        BigInt::from(value) * &*ONE
    }

    #[test]
    fn mul_rounding_directions() {
        // 1/3 * 3 loses a wei downward, regains it upward
        let third = &*ONE / 3u8;
        let down = mul_down(&third, &fp(3)).unwrap();
        let up = mul_up(&third, &fp(3)).unwrap();
        assert!(down < up);
        assert_eq!(&up - &down, BigInt::from(1u8));
    }

    #[test]
    fn div_rounding_directions() {
        let down = div_down(&fp(1), &fp(3)).unwrap();
        let up = div_up(&fp(1), &fp(3)).unwrap();
        assert_eq!(&up - &down, BigInt::from(1u8));
        assert!(div_down(&fp(1), &BigInt::zero()).is_err());
    }

    #[test]
    fn complement_clamps_at_one() {
        assert_eq!(complement(&fp(0)), *ONE);
        assert_eq!(complement(&ONE), BigInt::zero());
        assert_eq!(complement(&fp(2)), BigInt::zero());
        assert_eq!(complement(&(&*ONE / 4u8)), &*ONE * 3u8 / 4u8);
    }

    #[test]
    fn pow_shortcuts_are_exact() {
        assert_eq!(pow_down(&fp(7), &ONE).unwrap(), fp(7));
        assert_eq!(pow_down(&fp(3), &TWO).unwrap(), fp(9));
        assert_eq!(pow_down(&fp(2), &FOUR).unwrap(), fp(16));
        assert_eq!(pow_up(&fp(3), &TWO).unwrap(), fp(9));
    }

    #[test]
    fn pow_bounds_bracket_the_true_value() {
        // 2^0.5: down <= sqrt(2) <= up
        let x = fp(2);
        let half = &*ONE / 2u8;
        let down = pow_down(&x, &half).unwrap();
        let up = pow_up(&x, &half).unwrap();
        let sqrt2 = big_dec("1414213562373095048");
        assert!(down <= sqrt2 && sqrt2 <= up, "down {down} up {up}");
        assert!(down < up);
    }
}
