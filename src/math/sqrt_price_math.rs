// Token amount deltas between sqrt prices, and next-price solutions for a
// given input or output amount. Rounding directions match the on-chain
// SqrtPriceMath library exactly, including its overflow-recovery branches.

use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use once_cell::sync::Lazy;

use crate::errors::EvmError;
use crate::evm::{div_rounding_up, MAX_UINT160, MAX_UINT256};
use crate::math::full_math::{muldiv, muldiv_rounding_up, mulmod};

pub const RESOLUTION: u32 = 96;
pub static Q96: Lazy<BigInt> = Lazy::new(|| BigInt::from(1u8) << 96);

/// Amount of token0 between two sqrt prices for `liquidity`, rounded up or
/// down. Computed as two chained divisions to match the contract:
/// ceil(ceil((L << 96) * (sb - sa) / sb) / sa) when rounding up.
pub fn get_amount0_delta(
    sqrt_price_a_x96: &BigInt,
    sqrt_price_b_x96: &BigInt,
    liquidity: &BigInt,
    round_up: bool,
) -> Result<BigInt, EvmError> {
    let (lower, upper) = if sqrt_price_a_x96 < sqrt_price_b_x96 {
        (sqrt_price_a_x96, sqrt_price_b_x96)
    } else {
        (sqrt_price_b_x96, sqrt_price_a_x96)
    };
    if lower.is_zero() {
        return Err(EvmError::InvalidPrice);
    }

    let numerator1: BigInt = liquidity << RESOLUTION;
    let numerator2: BigInt = upper - lower;

    if round_up {
        let inner = muldiv_rounding_up(&numerator1, &numerator2, upper)?;
        div_rounding_up(&inner, lower)
    } else {
        Ok(muldiv(&numerator1, &numerator2, upper)? / lower)
    }
}

/// Signed variant: negative liquidity rounds down and negates, mirroring the
/// contract convention for liquidity removal.
pub fn get_amount0_delta_signed(
    sqrt_price_a_x96: &BigInt,
    sqrt_price_b_x96: &BigInt,
    liquidity: &BigInt,
) -> Result<BigInt, EvmError> {
    if liquidity.is_negative() {
        get_amount0_delta(sqrt_price_a_x96, sqrt_price_b_x96, &-liquidity, false)
    } else {
        Ok(-get_amount0_delta(sqrt_price_a_x96, sqrt_price_b_x96, liquidity, true)?)
    }
}

/// Amount of token1 between two sqrt prices for `liquidity`:
/// L * |sb - sa| / Q96 with directional rounding.
pub fn get_amount1_delta(
    sqrt_price_a_x96: &BigInt,
    sqrt_price_b_x96: &BigInt,
    liquidity: &BigInt,
    round_up: bool,
) -> Result<BigInt, EvmError> {
    let numerator = (sqrt_price_a_x96 - sqrt_price_b_x96).abs();
    let mut result = muldiv(liquidity, &numerator, &Q96)?;
    if round_up && !mulmod(liquidity, &numerator, &Q96).is_zero() {
        result += 1;
    }
    Ok(result)
}

pub fn get_amount1_delta_signed(
    sqrt_price_a_x96: &BigInt,
    sqrt_price_b_x96: &BigInt,
    liquidity: &BigInt,
) -> Result<BigInt, EvmError> {
    if liquidity.is_negative() {
        get_amount1_delta(sqrt_price_a_x96, sqrt_price_b_x96, &-liquidity, false)
    } else {
        Ok(-get_amount1_delta(sqrt_price_a_x96, sqrt_price_b_x96, liquidity, true)?)
    }
}

/// Next sqrt price after adding or removing `amount` of token0, rounding up
/// so the price target is never passed.
pub fn get_next_sqrt_price_from_amount0_rounding_up(
    sqrt_price_x96: &BigInt,
    liquidity: &BigInt,
    amount: &BigInt,
    add: bool,
) -> Result<BigInt, EvmError> {
    // the result is otherwise not guaranteed to equal the input price
    if amount.is_zero() {
        return Ok(sqrt_price_x96.clone());
    }

    let numerator1: BigInt = liquidity << RESOLUTION;
    let product = amount * sqrt_price_x96;

    if add {
        // the contract detects overflow inside an unchecked block; the
        // full-width product makes the check direct
        if product <= *MAX_UINT256 {
            let denominator = &numerator1 + &product;
            if denominator >= numerator1 {
                return muldiv_rounding_up(&numerator1, sqrt_price_x96, &denominator);
            }
        }
        return div_rounding_up(&numerator1, &(&numerator1 / sqrt_price_x96 + amount));
    }

    if &product / amount != *sqrt_price_x96 || numerator1 <= product {
        return Err(EvmError::PriceOverflow);
    }
    let result = muldiv_rounding_up(&numerator1, sqrt_price_x96, &(&numerator1 - &product))?;
    if result > *MAX_UINT160 {
        return Err(EvmError::Uint160Overflow);
    }
    Ok(result)
}

/// Next sqrt price after adding or removing `amount` of token1, rounding
/// down so the price target is never passed.
pub fn get_next_sqrt_price_from_amount1_rounding_down(
    sqrt_price_x96: &BigInt,
    liquidity: &BigInt,
    amount: &BigInt,
    add: bool,
) -> Result<BigInt, EvmError> {
    if add {
        let quotient = if amount <= &*MAX_UINT160 {
            (amount << RESOLUTION) / liquidity
        } else {
            muldiv(amount, &Q96, liquidity)?
        };
        let result = sqrt_price_x96 + quotient;
        if result > *MAX_UINT160 {
            return Err(EvmError::Uint160Overflow);
        }
        return Ok(result);
    }

    let quotient = if amount <= &*MAX_UINT160 {
        div_rounding_up(&(amount << RESOLUTION), liquidity)?
    } else {
        muldiv_rounding_up(amount, &Q96, liquidity)?
    };
    if *sqrt_price_x96 <= quotient {
        return Err(EvmError::NotEnoughLiquidity);
    }
    Ok(sqrt_price_x96 - quotient)
}

/// Next sqrt price for an input amount, rounding so the target price is
/// never passed.
pub fn get_next_sqrt_price_from_input(
    sqrt_price_x96: &BigInt,
    liquidity: &BigInt,
    amount_in: &BigInt,
    zero_for_one: bool,
) -> Result<BigInt, EvmError> {
    if sqrt_price_x96.is_zero() || liquidity.is_zero() {
        return Err(EvmError::InvalidPriceOrLiquidity);
    }
    if zero_for_one {
        get_next_sqrt_price_from_amount0_rounding_up(sqrt_price_x96, liquidity, amount_in, true)
    } else {
        get_next_sqrt_price_from_amount1_rounding_down(sqrt_price_x96, liquidity, amount_in, true)
    }
}

/// Next sqrt price for an output amount, rounding so the target price is
/// never passed.
pub fn get_next_sqrt_price_from_output(
    sqrt_price_x96: &BigInt,
    liquidity: &BigInt,
    amount_out: &BigInt,
    zero_for_one: bool,
) -> Result<BigInt, EvmError> {
    if sqrt_price_x96.is_zero() || liquidity.is_zero() {
        return Err(EvmError::InvalidPriceOrLiquidity);
    }
    if zero_for_one {
        get_next_sqrt_price_from_amount1_rounding_down(sqrt_price_x96, liquidity, amount_out, false)
    } else {
        get_next_sqrt_price_from_amount0_rounding_up(sqrt_price_x96, liquidity, amount_out, false)
    }
}
