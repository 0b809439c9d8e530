// Balancer weighted pool math.
//
// Rounding is always directional in the pool's favor: outputs round down,
// required inputs round up, and every intermediate rounds the same way the
// contract does.

use num_bigint::BigInt;
use num_traits::Zero;
use once_cell::sync::Lazy;

use crate::errors::EvmError;
use crate::evm::big_dec;
use crate::math::fixed_point::{
    complement, div_down, div_up, mul_down, mul_up, pow_down, pow_up, ONE,
};

// Swap limits: amounts swapped may not exceed this share of the balance.
pub static MAX_IN_RATIO: Lazy<BigInt> = Lazy::new(|| big_dec("300000000000000000"));
pub static MAX_OUT_RATIO: Lazy<BigInt> = Lazy::new(|| big_dec("300000000000000000"));

// Invariant movement limits for non-proportional joins and exits.
pub static MAX_INVARIANT_RATIO: Lazy<BigInt> = Lazy::new(|| big_dec("3000000000000000000"));
pub static MIN_INVARIANT_RATIO: Lazy<BigInt> = Lazy::new(|| big_dec("700000000000000000"));

/// invariant = product(balance_i ^ weight_i), computed with pow_down.
pub fn calculate_invariant(
    normalized_weights: &[BigInt],
    balances: &[BigInt],
) -> Result<BigInt, EvmError> {
    let mut invariant = ONE.clone();
    for (balance, weight) in balances.iter().zip(normalized_weights) {
        invariant = mul_down(&invariant, &pow_down(balance, weight)?)?;
    }
    if invariant.is_zero() {
        return Err(EvmError::ZeroInvariant);
    }
    Ok(invariant)
}

/// Tokens out for `amount_in` in:
/// amount_out = balance_out * (1 - (balance_in / (balance_in + amount_in)) ^ (w_in / w_out))
///
/// Rounds down overall: the power (subtrahend) rounds up, so its base and
/// exponent round accordingly.
pub fn calc_out_given_in(
    balance_in: &BigInt,
    weight_in: &BigInt,
    balance_out: &BigInt,
    weight_out: &BigInt,
    amount_in: &BigInt,
) -> Result<BigInt, EvmError> {
    if amount_in > &mul_down(balance_in, &MAX_IN_RATIO)? {
        return Err(EvmError::MaxInRatio);
    }

    let denominator = balance_in + amount_in;
    let base = div_up(balance_in, &denominator)?;
    let exponent = div_down(weight_in, weight_out)?;
    let power = pow_up(&base, &exponent)?;
    mul_down(balance_out, &complement(&power))
}

/// Tokens in for `amount_out` out:
/// amount_in = balance_in * ((balance_out / (balance_out - amount_out)) ^ (w_out / w_in) - 1)
///
/// Rounds up overall; the base is above one so the power never dips below
/// one and the final subtraction cannot underflow.
pub fn calc_in_given_out(
    balance_in: &BigInt,
    weight_in: &BigInt,
    balance_out: &BigInt,
    weight_out: &BigInt,
    amount_out: &BigInt,
) -> Result<BigInt, EvmError> {
    if amount_out > &mul_down(balance_out, &MAX_OUT_RATIO)? {
        return Err(EvmError::MaxOutRatio);
    }

    let base = div_up(balance_out, &(balance_out - amount_out))?;
    let exponent = div_up(weight_out, weight_in)?;
    let power = pow_up(&base, &exponent)?;
    let ratio = power - &*ONE;
    mul_up(balance_in, &ratio)
}

/// amount - fee, with the fee amount rounded up in the pool's favor.
pub fn subtract_swap_fee_amount(
    amount: &BigInt,
    fee_percentage: &BigInt,
) -> Result<BigInt, EvmError> {
    let fee_amount = mul_up(amount, fee_percentage)?;
    Ok(amount - fee_amount)
}

/// Gross amount whose fee-reduced value equals `amount`.
pub fn add_swap_fee_amount(amount: &BigInt, fee_percentage: &BigInt) -> Result<BigInt, EvmError> {
    div_up(amount, &complement(fee_percentage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evm::big;

    fn fp(value: u64) -> BigInt {
        BigInt::from(value) * &*ONE
    }

    fn half() -> BigInt {
        &*ONE / 2u8
    }

    #[test]
    fn equal_weights_behave_like_constant_product() {
        // 50/50 pool: out = bO * aI / (bI + aI), up to pow rounding
        let out = calc_out_given_in(&fp(100), &half(), &fp(100), &half(), &fp(10)).unwrap();
        let expected = fp(100) * fp(10) / (fp(100) + fp(10));
        let error = (&out - &expected).magnitude().clone();
        // directional rounding may only lose value for the trader
        assert!(out <= expected);
        assert!(BigInt::from(error) < fp(10) / 10_000u32, "out {out}");
    }

    #[test]
    fn in_given_out_round_trips_above_out_given_in() {
        let balance_in = fp(5_000);
        let balance_out = fp(1_000);
        let weight_in = &*ONE * 8u8 / 10u8;
        let weight_out = &*ONE * 2u8 / 10u8;
        let amount_out = fp(100);

        let amount_in =
            calc_in_given_out(&balance_in, &weight_in, &balance_out, &weight_out, &amount_out)
                .unwrap();
        let realized =
            calc_out_given_in(&balance_in, &weight_in, &balance_out, &weight_out, &amount_in)
                .unwrap();
        assert!(realized >= amount_out, "realized {realized} < requested {amount_out}");
    }

    #[test]
    fn ratio_caps() {
        assert_eq!(
            calc_out_given_in(&fp(100), &half(), &fp(100), &half(), &fp(31)),
            Err(EvmError::MaxInRatio)
        );
        assert_eq!(
            calc_in_given_out(&fp(100), &half(), &fp(100), &half(), &fp(31)),
            Err(EvmError::MaxOutRatio)
        );
        // exactly at the cap is allowed
        assert!(calc_out_given_in(&fp(100), &half(), &fp(100), &half(), &fp(30)).is_ok());
    }

    #[test]
    fn invariant_of_uniform_pool() {
        // equal balances and weights: invariant equals the balance
        let weights = [half(), half()];
        let balances = [fp(100), fp(100)];
        let invariant = calculate_invariant(&weights, &balances).unwrap();
        let error = (&invariant - fp(100)).magnitude().clone();
        assert!(BigInt::from(error) < fp(1) / 1_000u32, "invariant {invariant}");
    }

    #[test]
    fn zero_invariant_rejected() {
        let weights = [half(), half()];
        let balances = [BigInt::zero(), fp(100)];
        assert_eq!(
            calculate_invariant(&weights, &balances),
            Err(EvmError::ZeroInvariant)
        );
    }

    #[test]
    fn fee_helpers_are_inverse_within_rounding() {
        let fee = &*ONE * big(3) / big(1000); // 0.3%
        let amount = fp(1_000);
        let net = subtract_swap_fee_amount(&amount, &fee).unwrap();
        let gross = add_swap_fee_amount(&net, &fee).unwrap();
        let lower = &amount - 1u8;
        let upper = &amount + 2u8;
        assert!(gross >= lower && gross <= upper, "gross {gross}");
    }
}
