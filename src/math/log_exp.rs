// Natural log, exp and pow over signed 18-decimal fixed point, with
// internal escalation to 20 and 36 decimals.
//
// pow(x, y) is computed as exp(y * ln(x)). ln decomposes its argument into
// precomputed e^(2^k) factors for k in [7..-4] followed by a 6-term
// arctanh-style Taylor series; exp reverses the decomposition with a 12-term
// series. Arguments near one route through a 36-decimal ln for precision.

use num_bigint::BigInt;
use num_traits::{One, Signed, Zero};
use once_cell::sync::Lazy;

use crate::errors::EvmError;
use crate::evm::big_dec;

pub static ONE_18: Lazy<BigInt> = Lazy::new(|| big_dec("1000000000000000000"));
pub static ONE_20: Lazy<BigInt> = Lazy::new(|| big_dec("100000000000000000000"));
pub static ONE_36: Lazy<BigInt> =
    Lazy::new(|| big_dec("1000000000000000000000000000000000000"));

pub static MAX_NATURAL_EXPONENT: Lazy<BigInt> = Lazy::new(|| big_dec("130000000000000000000"));
pub static MIN_NATURAL_EXPONENT: Lazy<BigInt> = Lazy::new(|| big_dec("-41000000000000000000"));

static LN_36_LOWER_BOUND: Lazy<BigInt> = Lazy::new(|| &*ONE_18 - big_dec("100000000000000000"));
static LN_36_UPPER_BOUND: Lazy<BigInt> = Lazy::new(|| &*ONE_18 + big_dec("100000000000000000"));
static MILD_EXPONENT_BOUND: Lazy<BigInt> = Lazy::new(|| (BigInt::one() << 254) / &*ONE_20);

// x_n = 2^(7-n) as 18- or 20-decimal fixed point, a_n = e^(x_n).
static X0: Lazy<BigInt> = Lazy::new(|| big_dec("128000000000000000000")); // 2^7
static A0: Lazy<BigInt> =
    Lazy::new(|| big_dec("38877084059945950922200000000000000000000000000000000000")); // e^(2^7), no decimals
static X1: Lazy<BigInt> = Lazy::new(|| big_dec("64000000000000000000")); // 2^6
static A1: Lazy<BigInt> = Lazy::new(|| big_dec("6235149080811616882910000000")); // e^(2^6), no decimals
static X2: Lazy<BigInt> = Lazy::new(|| big_dec("3200000000000000000000")); // 2^5, 20 decimals
static A2: Lazy<BigInt> = Lazy::new(|| big_dec("7896296018268069516100000000000000"));
static X3: Lazy<BigInt> = Lazy::new(|| big_dec("1600000000000000000000")); // 2^4
static A3: Lazy<BigInt> = Lazy::new(|| big_dec("888611052050787263676000000"));
static X4: Lazy<BigInt> = Lazy::new(|| big_dec("800000000000000000000")); // 2^3
static A4: Lazy<BigInt> = Lazy::new(|| big_dec("298095798704172827474000"));
static X5: Lazy<BigInt> = Lazy::new(|| big_dec("400000000000000000000")); // 2^2
static A5: Lazy<BigInt> = Lazy::new(|| big_dec("5459815003314423907810"));
static X6: Lazy<BigInt> = Lazy::new(|| big_dec("200000000000000000000")); // 2^1
static A6: Lazy<BigInt> = Lazy::new(|| big_dec("738905609893065022723"));
static X7: Lazy<BigInt> = Lazy::new(|| big_dec("100000000000000000000")); // 2^0
static A7: Lazy<BigInt> = Lazy::new(|| big_dec("271828182845904523536"));
static X8: Lazy<BigInt> = Lazy::new(|| big_dec("50000000000000000000")); // 2^-1
static A8: Lazy<BigInt> = Lazy::new(|| big_dec("164872127070012814685"));
static X9: Lazy<BigInt> = Lazy::new(|| big_dec("25000000000000000000")); // 2^-2
static A9: Lazy<BigInt> = Lazy::new(|| big_dec("128402541668774148407"));
static X10: Lazy<BigInt> = Lazy::new(|| big_dec("12500000000000000000")); // 2^-3
static A10: Lazy<BigInt> = Lazy::new(|| big_dec("113314845306682631683"));
static X11: Lazy<BigInt> = Lazy::new(|| big_dec("6250000000000000000")); // 2^-4
static A11: Lazy<BigInt> = Lazy::new(|| big_dec("106449445891785942956"));

/// x^y over unsigned 18-decimal fixed point. 0^0 is defined as one.
pub fn pow(x: &BigInt, y: &BigInt) -> Result<BigInt, EvmError> {
    if y.is_zero() {
        return Ok(ONE_18.clone());
    }
    if x.is_zero() {
        return Ok(BigInt::zero());
    }

    // ln takes a signed value, so x must fit the signed 256 bit range
    if x >= &(BigInt::one() << 255) {
        return Err(EvmError::XOutOfBounds);
    }
    // bounding y keeps y * ln(x) from overflowing
    if y >= &*MILD_EXPONENT_BOUND {
        return Err(EvmError::YOutOfBounds);
    }

    let logx_times_y = if &*LN_36_LOWER_BOUND < x && x < &*LN_36_UPPER_BOUND {
        let ln_36_x = ln_36(x);
        // split the 36-decimal ln into two 18-decimal multiplications to
        // avoid overflowing the intermediate product
        (&ln_36_x / &*ONE_18) * y + ((&ln_36_x % &*ONE_18) * y) / &*ONE_18
    } else {
        ln_internal(x) * y
    };
    let logx_times_y = logx_times_y / &*ONE_18;

    if logx_times_y < *MIN_NATURAL_EXPONENT || logx_times_y > *MAX_NATURAL_EXPONENT {
        return Err(EvmError::ProductOutOfBounds);
    }

    exp(&logx_times_y)
}

/// e^x over signed 18-decimal fixed point.
pub fn exp(x: &BigInt) -> Result<BigInt, EvmError> {
    if x < &*MIN_NATURAL_EXPONENT || x > &*MAX_NATURAL_EXPONENT {
        return Err(EvmError::InvalidExponent);
    }

    if x.is_negative() {
        // e^(-x) = 1 / e^x; fixed point division multiplies by ONE_18
        return Ok((&*ONE_18 * &*ONE_18) / exp(&-x)?);
    }
    let mut x = x.clone();

    // The first two a_n are stored with no decimals to avoid intermediate
    // overflow; x0 + x1 exceeds the exponent bound so at most one applies.
    let first_an = if x >= *X0 {
        x -= &*X0;
        A0.clone()
    } else if x >= *X1 {
        x -= &*X1;
        A1.clone()
    } else {
        BigInt::one()
    };

    // move to 20 decimal precision for the smaller terms
    x *= 100;
    let mut product = ONE_20.clone();

    for (x_n, a_n) in [
        (&*X2, &*A2),
        (&*X3, &*A3),
        (&*X4, &*A4),
        (&*X5, &*A5),
        (&*X6, &*A6),
        (&*X7, &*A7),
        (&*X8, &*A8),
        (&*X9, &*A9),
    ] {
        if x >= *x_n {
            x -= x_n;
            product = (product * a_n) / &*ONE_20;
        }
    }

    // Taylor series for the remainder: 1 + x + x^2/2! + ... + x^12/12!
    let mut series_sum = ONE_20.clone();
    let mut term = x.clone();
    series_sum += &term;
    for n in 2..=12 {
        term = ((&term * &x) / &*ONE_20) / n;
        series_sum += &term;
    }

    Ok((((product * series_sum) / &*ONE_20) * first_an) / 100)
}

/// log(arg) in base `base`, both signed 18-decimal fixed point.
pub fn log(arg: &BigInt, base: &BigInt) -> Result<BigInt, EvmError> {
    if arg <= &BigInt::zero() || base <= &BigInt::zero() {
        return Err(EvmError::OutOfBounds);
    }
    // base change with both logs upscaled to 36 decimals
    let log_base = if &*LN_36_LOWER_BOUND < base && base < &*LN_36_UPPER_BOUND {
        ln_36(base)
    } else {
        ln_internal(base) * &*ONE_18
    };
    let log_arg = if &*LN_36_LOWER_BOUND < arg && arg < &*LN_36_UPPER_BOUND {
        ln_36(arg)
    } else {
        ln_internal(arg) * &*ONE_18
    };
    Ok((log_arg * &*ONE_18) / log_base)
}

/// Natural log over signed 18-decimal fixed point.
pub fn ln(a: &BigInt) -> Result<BigInt, EvmError> {
    if a <= &BigInt::zero() {
        return Err(EvmError::OutOfBounds);
    }
    if &*LN_36_LOWER_BOUND < a && a < &*LN_36_UPPER_BOUND {
        Ok(ln_36(a) / &*ONE_18)
    } else {
        Ok(ln_internal(a))
    }
}

fn ln_internal(a: &BigInt) -> BigInt {
    if a < &*ONE_18 {
        // ln(a) = -ln(1/a) keeps the decomposition below on arguments > one
        return -ln_internal(&((&*ONE_18 * &*ONE_18) / a));
    }
    let mut a = a.clone();
    let mut sum = BigInt::zero();

    if a >= &*A0 * &*ONE_18 {
        a /= &*A0; // integer, not fixed point division
        sum += &*X0;
    }
    if a >= &*A1 * &*ONE_18 {
        a /= &*A1;
        sum += &*X1;
    }

    // remaining factors are 20-decimal fixed point
    sum *= 100;
    a *= 100;

    for (x_n, a_n) in [
        (&*X2, &*A2),
        (&*X3, &*A3),
        (&*X4, &*A4),
        (&*X5, &*A5),
        (&*X6, &*A6),
        (&*X7, &*A7),
        (&*X8, &*A8),
        (&*X9, &*A9),
        (&*X10, &*A10),
        (&*X11, &*A11),
    ] {
        if a >= *a_n {
            a = (&a * &*ONE_20) / a_n;
            sum += x_n;
        }
    }

    // a is now below a11 (~1.06): ln(a) = 2 * atanh((a-1)/(a+1))
    let z = ((&a - &*ONE_20) * &*ONE_20) / (&a + &*ONE_20);
    let z_squared = (&z * &z) / &*ONE_20;

    let mut num = z.clone();
    let mut series_sum = num.clone();
    for divisor in [3u32, 5, 7, 9, 11] {
        num = (&num * &z_squared) / &*ONE_20;
        series_sum += &num / divisor;
    }
    series_sum *= 2;

    (sum + series_sum) / 100
}

/// High-precision ln for arguments close to one, returned with 36 decimals.
fn ln_36(x: &BigInt) -> BigInt {
    let x: BigInt = x * &*ONE_18;

    let z = ((&x - &*ONE_36) * &*ONE_36) / (&x + &*ONE_36);
    let z_squared = (&z * &z) / &*ONE_36;

    let mut num = z.clone();
    let mut series_sum = num.clone();
    for divisor in [3u32, 5, 7, 9, 11, 13, 15] {
        num = (&num * &z_squared) / &*ONE_36;
        series_sum += &num / divisor;
    }
    series_sum * 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evm::big;

    fn one_18() -> BigInt {
        ONE_18.clone()
    }

    #[test]
    fn pow_identities() {
        let two = &one_18() * 2;
        assert_eq!(pow(&two, &BigInt::zero()).unwrap(), one_18());
        assert_eq!(pow(&BigInt::zero(), &two).unwrap(), BigInt::zero());
        assert_eq!(pow(&one_18(), &one_18()).unwrap(), one_18());
    }

    #[test]
    fn pow_squares_within_tolerance() {
        let x = &one_18() * 3;
        let y = &one_18() * 2;
        let result = pow(&x, &y).unwrap();
        let expected = &one_18() * 9;
        let error = (&result - &expected).abs();
        // relative error well below the 1e4 wei bound used by pow_up/pow_down
        assert!(error < big(1_000_000_000), "3^2 error: {error}");
    }

    #[test]
    fn exp_and_ln_are_inverse() {
        for mult in [1i64, 2, 5, 17] {
            let x = &one_18() * mult;
            let round_trip = ln(&exp(&x).unwrap()).unwrap();
            let error = (&round_trip - &x).abs();
            assert!(error < big(1_000), "exp/ln round trip at {mult}: {error}");
        }
    }

    #[test]
    fn ln_of_e_is_one() {
        // A7 is e with 20 decimals; scale to 18
        let e = &*A7 / 100;
        let result = ln(&e).unwrap();
        let error = (&result - &one_18()).abs();
        assert!(error < big(100), "ln(e) error: {error}");
    }

    #[test]
    fn ln_near_one_uses_high_precision_window() {
        let arg = &one_18() + big(1_000_000); // 1 + 1e-12
        let result = ln(&arg).unwrap();
        // ln(1+x) ~ x for tiny x
        let error = (&result - big(1_000_000)).abs();
        assert!(error <= big(1), "ln near one error: {error}");
    }

    #[test]
    fn domain_errors() {
        assert_eq!(ln(&BigInt::zero()), Err(EvmError::OutOfBounds));
        assert_eq!(ln(&big(-1)), Err(EvmError::OutOfBounds));
        assert_eq!(
            exp(&(&*MAX_NATURAL_EXPONENT + 1u8)),
            Err(EvmError::InvalidExponent)
        );
        assert_eq!(
            exp(&(&*MIN_NATURAL_EXPONENT - 1u8)),
            Err(EvmError::InvalidExponent)
        );
        assert_eq!(
            pow(&(BigInt::one() << 255), &one_18()),
            Err(EvmError::XOutOfBounds)
        );
        assert_eq!(
            pow(&one_18(), &MILD_EXPONENT_BOUND.clone()),
            Err(EvmError::YOutOfBounds)
        );
    }

    #[test]
    fn negative_exponent_reciprocal() {
        // e^-1 = 1/e
        let minus_one = -one_18();
        let result = exp(&minus_one).unwrap();
        let expected = (&one_18() * &one_18()) / (&*A7 / 100);
        let error = (&result - &expected).abs();
        assert!(error < big(100), "e^-1 error: {error}");
    }
}
