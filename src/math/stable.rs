// Solidly-style stable swap math (Aerodrome / Velodrome stable pools).
//
// The invariant is k = x^3*y + x*y^3 over balances normalized to 18
// decimals. Swaps solve for the post-trade output balance with Newton
// iteration, using the contract's exact 1-wei convergence probes.

use num_bigint::BigInt;
use num_traits::Zero;

use crate::errors::EvmError;
use crate::math::log_exp::ONE_18;

pub const DEFAULT_MAX_ITERATIONS: u32 = 255;

/// k(x, y) = x*y * (x^2 + y^2) / 1e18^3, on 18-decimal normalized balances.
pub fn k_stable(x: &BigInt, y: &BigInt) -> BigInt {
    let a = (x * y) / &*ONE_18;
    let b = (x * x) / &*ONE_18 + (y * y) / &*ONE_18;
    (a * b) / &*ONE_18
}

/// f(x0, y) = x0*y^3 + x0^3*y, the invariant expanded around a fixed x0.
fn f(x0: &BigInt, y: &BigInt) -> BigInt {
    x0 * (((y * y) / &*ONE_18) * y / &*ONE_18) / &*ONE_18
        + (((x0 * x0) / &*ONE_18) * x0 / &*ONE_18) * y / &*ONE_18
}

/// df/dy = 3*x0*y^2 + x0^3
fn d(x0: &BigInt, y: &BigInt) -> BigInt {
    (x0 * 3u8) * ((y * y) / &*ONE_18) / &*ONE_18
        + ((x0 * x0) / &*ONE_18) * x0 / &*ONE_18
}

/// Solves f(x0, y) = xy for y by Newton iteration starting at `y_guess`.
///
/// Matches the contract loop: a zero step is probed one wei in each
/// direction before accepting, and running past the iteration cap fails.
pub fn get_y(
    x0: &BigInt,
    xy: &BigInt,
    y_guess: &BigInt,
    max_iterations: u32,
) -> Result<BigInt, EvmError> {
    let mut y = y_guess.clone();
    for _ in 0..max_iterations {
        let k = f(x0, &y);
        if k < *xy {
            let denominator = d(x0, &y);
            if denominator.is_zero() {
                return Err(EvmError::ZeroDivision);
            }
            let mut dy = ((xy - &k) * &*ONE_18) / &denominator;
            if dy.is_zero() {
                if k == *xy {
                    return Ok(y);
                }
                if k_probe_exceeds(x0, &(&y + 1u8), xy) {
                    return Ok(&y + 1u8);
                }
                dy = BigInt::from(1u8);
            }
            y += dy;
        } else {
            let denominator = d(x0, &y);
            if denominator.is_zero() {
                return Err(EvmError::ZeroDivision);
            }
            let mut dy = ((&k - xy) * &*ONE_18) / &denominator;
            if dy.is_zero() {
                if k == *xy || f(x0, &(&y - 1u8)) < *xy {
                    return Ok(y);
                }
                dy = BigInt::from(1u8);
            }
            y -= dy;
        }
    }
    Err(EvmError::StableInvariantNoConverge)
}

fn k_probe_exceeds(x0: &BigInt, y: &BigInt, xy: &BigInt) -> bool {
    f(x0, y) > *xy
}

/// Output amount for a stable swap over normalized reserves. The fee must
/// already be deducted from `amount_in`; decimal scaling belongs to the
/// pool layer.
pub fn out_given_in_normalized(
    amount_in: &BigInt,
    reserve_in: &BigInt,
    reserve_out: &BigInt,
    max_iterations: u32,
) -> Result<BigInt, EvmError> {
    let xy = k_stable(reserve_in, reserve_out);
    let y = get_y(&(amount_in + reserve_in), &xy, reserve_out, max_iterations)?;
    Ok(reserve_out - y)
}
