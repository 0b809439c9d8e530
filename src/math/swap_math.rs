// Single-step swap computation shared by the V3 and V4 engines.
//
// amount_remaining is signed: negative means exact input, positive means
// exact output, matching the v4-core SwapMath convention.

use num_bigint::BigInt;
use num_traits::Signed;
use once_cell::sync::Lazy;

use crate::errors::EvmError;
use crate::evm::big;
use crate::math::full_math::{muldiv, muldiv_rounding_up};
use crate::math::sqrt_price_math;

/// Swap fees are expressed in pips: 10^6 = 100%.
pub static MAX_SWAP_FEE: Lazy<BigInt> = Lazy::new(|| big(1_000_000));

/// Price target for the next swap step: the tick boundary, clamped to the
/// user's price limit in the direction of the swap.
pub fn get_sqrt_price_target(
    zero_for_one: bool,
    sqrt_price_next_x96: &BigInt,
    sqrt_price_limit_x96: &BigInt,
) -> BigInt {
    if zero_for_one {
        sqrt_price_next_x96.max(sqrt_price_limit_x96).clone()
    } else {
        sqrt_price_next_x96.min(sqrt_price_limit_x96).clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapStep {
    pub sqrt_price_next_x96: BigInt,
    pub amount_in: BigInt,
    pub amount_out: BigInt,
    pub fee_amount: BigInt,
}

/// Computes the result of swapping some amount in, or amount out, within a
/// single liquidity range.
pub fn compute_swap_step(
    sqrt_price_current_x96: &BigInt,
    sqrt_price_target_x96: &BigInt,
    liquidity: &BigInt,
    amount_remaining: &BigInt,
    fee_pips: u32,
) -> Result<SwapStep, EvmError> {
    let zero_for_one = sqrt_price_current_x96 >= sqrt_price_target_x96;
    let exact_in = amount_remaining.is_negative();
    let fee_pips_big = big(fee_pips as i64);

    let sqrt_price_next_x96;
    let mut amount_in;
    let amount_out;
    let fee_amount;

    if exact_in {
        let amount_remaining_less_fee = muldiv(
            &-amount_remaining,
            &(&*MAX_SWAP_FEE - &fee_pips_big),
            &MAX_SWAP_FEE,
        )?;
        amount_in = if zero_for_one {
            sqrt_price_math::get_amount0_delta(
                sqrt_price_target_x96,
                sqrt_price_current_x96,
                liquidity,
                true,
            )?
        } else {
            sqrt_price_math::get_amount1_delta(
                sqrt_price_current_x96,
                sqrt_price_target_x96,
                liquidity,
                true,
            )?
        };

        if amount_remaining_less_fee >= amount_in {
            // amount_in is capped by the target price
            sqrt_price_next_x96 = sqrt_price_target_x96.clone();
            fee_amount = if fee_pips_big == *MAX_SWAP_FEE {
                // amount_in is zero here, the entire input is the fee
                amount_in.clone()
            } else {
                muldiv_rounding_up(&amount_in, &fee_pips_big, &(&*MAX_SWAP_FEE - &fee_pips_big))?
            };
        } else {
            // exhaust the remaining amount
            amount_in = amount_remaining_less_fee.clone();
            sqrt_price_next_x96 = sqrt_price_math::get_next_sqrt_price_from_input(
                sqrt_price_current_x96,
                liquidity,
                &amount_remaining_less_fee,
                zero_for_one,
            )?;
            // the target was not reached, take the remainder of the maximum
            // input as fee
            fee_amount = -amount_remaining - &amount_in;
        }

        amount_out = if zero_for_one {
            sqrt_price_math::get_amount1_delta(
                &sqrt_price_next_x96,
                sqrt_price_current_x96,
                liquidity,
                false,
            )?
        } else {
            sqrt_price_math::get_amount0_delta(
                sqrt_price_current_x96,
                &sqrt_price_next_x96,
                liquidity,
                false,
            )?
        };
    } else {
        if fee_pips_big == *MAX_SWAP_FEE {
            return Err(EvmError::InvalidFeeForExactOut);
        }
        let mut out = if zero_for_one {
            sqrt_price_math::get_amount1_delta(
                sqrt_price_target_x96,
                sqrt_price_current_x96,
                liquidity,
                false,
            )?
        } else {
            sqrt_price_math::get_amount0_delta(
                sqrt_price_current_x96,
                sqrt_price_target_x96,
                liquidity,
                false,
            )?
        };

        if amount_remaining >= &out {
            // amount_out is capped by the target price
            sqrt_price_next_x96 = sqrt_price_target_x96.clone();
        } else {
            // cap the output amount to not exceed the remaining output
            out = amount_remaining.clone();
            sqrt_price_next_x96 = sqrt_price_math::get_next_sqrt_price_from_output(
                sqrt_price_current_x96,
                liquidity,
                &out,
                zero_for_one,
            )?;
        }
        amount_out = out;

        amount_in = if zero_for_one {
            sqrt_price_math::get_amount0_delta(
                &sqrt_price_next_x96,
                sqrt_price_current_x96,
                liquidity,
                true,
            )?
        } else {
            sqrt_price_math::get_amount1_delta(
                sqrt_price_current_x96,
                &sqrt_price_next_x96,
                liquidity,
                true,
            )?
        };
        fee_amount =
            muldiv_rounding_up(&amount_in, &fee_pips_big, &(&*MAX_SWAP_FEE - &fee_pips_big))?;
    }

    Ok(SwapStep {
        sqrt_price_next_x96,
        amount_in,
        amount_out,
        fee_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evm::big_dec;
    use num_integer::Roots;
    use num_traits::Zero;

    fn encode_price_sqrt(reserve1: u128, reserve0: u128) -> BigInt {
        ((BigInt::from(reserve1) << 192) / BigInt::from(reserve0)).sqrt()
    }

    #[test]
    fn exact_in_capped_at_price_target() {
        let price = encode_price_sqrt(1, 1);
        let price_target = encode_price_sqrt(101, 100);
        let liquidity = big_dec("2000000000000000000");
        let amount = -big_dec("1000000000000000000"); // exact in
        let fee = 600;

        let step = compute_swap_step(&price, &price_target, &liquidity, &amount, fee).unwrap();
        assert_eq!(step.amount_in, big_dec("9975124224178055"));
        assert_eq!(step.fee_amount, big_dec("5988667735148"));
        assert_eq!(step.amount_out, big_dec("9925619580021728"));
        assert!(&step.amount_in + &step.fee_amount < -&amount);
        assert_eq!(step.sqrt_price_next_x96, price_target);
    }

    #[test]
    fn exact_out_capped_at_price_target() {
        let price = encode_price_sqrt(1, 1);
        let price_target = encode_price_sqrt(101, 100);
        let liquidity = big_dec("2000000000000000000");
        let amount = big_dec("1000000000000000000"); // exact out
        let fee = 600;

        let step = compute_swap_step(&price, &price_target, &liquidity, &amount, fee).unwrap();
        assert_eq!(step.amount_in, big_dec("9975124224178055"));
        assert_eq!(step.fee_amount, big_dec("5988667735148"));
        assert_eq!(step.amount_out, big_dec("9925619580021728"));
        assert!(step.amount_out < amount);
        assert_eq!(step.sqrt_price_next_x96, price_target);
    }

    #[test]
    fn exact_in_fully_spent() {
        let price = encode_price_sqrt(1, 1);
        let price_target = encode_price_sqrt(1000, 100);
        let liquidity = big_dec("2000000000000000000");
        let amount = -big_dec("1000000000000000000");
        let fee = 600;

        let step = compute_swap_step(&price, &price_target, &liquidity, &amount, fee).unwrap();
        assert_eq!(step.amount_in, big_dec("999400000000000000"));
        assert_eq!(step.fee_amount, big_dec("600000000000000"));
        assert_eq!(step.amount_out, big_dec("666399946655997866"));
        // entire input amount is consumed
        assert_eq!(&step.amount_in + &step.fee_amount, -&amount);
        assert!(step.sqrt_price_next_x96 < price_target);
    }

    #[test]
    fn exact_out_fully_received() {
        let price = encode_price_sqrt(1, 1);
        let price_target = encode_price_sqrt(10000, 100);
        let liquidity = big_dec("2000000000000000000");
        let amount = big_dec("1000000000000000000");
        let fee = 600;

        let step = compute_swap_step(&price, &price_target, &liquidity, &amount, fee).unwrap();
        assert_eq!(step.amount_out, amount);
        assert_eq!(step.amount_in, big_dec("2000000000000000000"));
        assert_eq!(step.fee_amount, big_dec("1200720432259356"));
        assert!(step.sqrt_price_next_x96 < price_target);
    }

    #[test]
    fn input_too_small_to_move_the_price() {
        let price = big_dec("2413");
        let price_target = big_dec("79887613182836312");
        let liquidity = big_dec("1985041575832132834610021537970");
        let amount = -big_dec("10");

        // the net input rounds to a zero price delta; the remainder of the
        // gross amount is collected as fee
        let step = compute_swap_step(&price, &price_target, &liquidity, &amount, 1_872).unwrap();
        assert_eq!(step.amount_in, big_dec("9"));
        assert_eq!(step.amount_out, BigInt::zero());
        assert_eq!(step.fee_amount, big_dec("1"));
        assert_eq!(step.sqrt_price_next_x96, big_dec("2413"));
    }

    #[test]
    fn max_fee_disallowed_for_exact_out() {
        let price = encode_price_sqrt(1, 1);
        let target = encode_price_sqrt(101, 100);
        let liquidity = big_dec("2000000000000000000");
        let amount = big_dec("1000000000000000000");
        assert_eq!(
            compute_swap_step(&price, &target, &liquidity, &amount, 1_000_000),
            Err(EvmError::InvalidFeeForExactOut)
        );
    }

    #[test]
    fn price_target_clamps_by_direction() {
        let lo = encode_price_sqrt(99, 100);
        let hi = encode_price_sqrt(101, 100);
        assert_eq!(get_sqrt_price_target(true, &lo, &hi), hi);
        assert_eq!(get_sqrt_price_target(false, &hi, &lo), lo);
    }
}
