// Constant-product (x*y=k) swap math with fee, plus the closed-form
// derivative used by gradient-based solvers.
//
// All math is raw token units over integers. The fee is a fraction
// fee_num/fee_den (e.g. 3/1000 for the canonical 0.3%).

use num_bigint::BigInt;
use num_traits::{Signed, Zero};

use crate::errors::{EvmError, LiquidityPoolError};

/// Exact output for a given input:
/// (dx * (fd - fn) * y) / (x * fd + dx * (fd - fn)), floor division.
///
/// A zero or negative input is invalid. Zero reserves on either side mean
/// the pool has no liquidity in this direction.
pub fn out_given_in(
    amount_in: &BigInt,
    reserves_in: &BigInt,
    reserves_out: &BigInt,
    fee_num: &BigInt,
    fee_den: &BigInt,
) -> Result<BigInt, LiquidityPoolError> {
    if !amount_in.is_positive() {
        return Err(LiquidityPoolError::InvalidSwapInputAmount);
    }
    if reserves_in.is_zero() || reserves_out.is_zero() {
        return Err(EvmError::NotEnoughLiquidity.into());
    }

    let amount_in_with_fee = amount_in * (fee_den - fee_num);
    let numerator = &amount_in_with_fee * reserves_out;
    let denominator = reserves_in * fee_den + &amount_in_with_fee;
    Ok(numerator / denominator)
}

/// Exact input required for a given output:
/// x * dy * fd / ((y - dy) * (fd - fn)) + 1.
///
/// The +1 covers the truncated remainder so the pool invariant still holds
/// after the swap. Requesting the entire reserve (or more) fails; the most
/// a swap can extract is y - 1.
pub fn in_given_out(
    amount_out: &BigInt,
    reserves_in: &BigInt,
    reserves_out: &BigInt,
    fee_num: &BigInt,
    fee_den: &BigInt,
) -> Result<BigInt, LiquidityPoolError> {
    if !amount_out.is_positive() {
        return Err(LiquidityPoolError::InvalidSwapInputAmount);
    }
    if amount_out >= reserves_out {
        return Err(EvmError::NotEnoughLiquidity.into());
    }

    let numerator = reserves_in * amount_out * fee_den;
    let denominator = (reserves_out - amount_out) * (fee_den - fee_num);
    Ok(numerator / denominator + 1)
}

/// Exact rational, kept unreduced. Numerator and denominator are both
/// non-negative for the derivatives produced here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fraction {
    pub numerator: BigInt,
    pub denominator: BigInt,
}

impl Fraction {
    pub fn as_f64(&self) -> f64 {
        // reporting only; magnitudes here are far below f64 range after the
        // shared power-of-ten factors cancel
        let num = self.numerator.to_string().parse::<f64>().unwrap_or(0.0);
        let den = self.denominator.to_string().parse::<f64>().unwrap_or(1.0);
        if den == 0.0 {
            0.0
        } else {
            num / den
        }
    }
}

/// d(out)/d(in) at `amount_in`:
/// y * (1-f) * x / (x + dx * (1-f))^2, with 1-f = (fd - fn)/fd.
///
/// At dx = 0 this reduces to the fee-adjusted spot price (1-f) * y / x.
pub fn swap_derivative(
    amount_in: &BigInt,
    reserves_in: &BigInt,
    reserves_out: &BigInt,
    fee_num: &BigInt,
    fee_den: &BigInt,
) -> Fraction {
    if reserves_in.is_zero() || reserves_out.is_zero() {
        return Fraction {
            numerator: BigInt::zero(),
            denominator: BigInt::from(1u8),
        };
    }

    let fee_complement = fee_den - fee_num;
    if amount_in.is_zero() {
        return Fraction {
            numerator: &fee_complement * reserves_out,
            denominator: fee_den * reserves_in,
        };
    }

    // y * (fd-fn) * x * fd / (x*fd + dx*(fd-fn))^2
    let inner = reserves_in * fee_den + amount_in * &fee_complement;
    Fraction {
        numerator: reserves_out * &fee_complement * reserves_in * fee_den,
        denominator: &inner * &inner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evm::{big, big_dec};

    fn pool_reserves() -> (BigInt, BigInt) {
        (big_dec("16231137593"), big_dec("2571336301536722443178"))
    }

    #[test]
    fn known_swap_values() {
        let (x, y) = pool_reserves();
        let out = out_given_in(&big_dec("8000000000"), &x, &y, &big(3), &big(1000)).unwrap();
        assert_eq!(out, big_dec("847228560678214929944"));

        let amount_in =
            in_given_out(&big_dec("1200000000000000000000"), &x, &y, &big(3), &big(1000)).unwrap();
        assert_eq!(amount_in, big_dec("14245938804"));
    }

    #[test]
    fn zero_input_is_rejected() {
        let (x, y) = pool_reserves();
        assert!(matches!(
            out_given_in(&BigInt::zero(), &x, &y, &big(3), &big(1000)),
            Err(LiquidityPoolError::InvalidSwapInputAmount)
        ));
        assert!(matches!(
            in_given_out(&BigInt::zero(), &x, &y, &big(3), &big(1000)),
            Err(LiquidityPoolError::InvalidSwapInputAmount)
        ));
    }

    #[test]
    fn cannot_drain_the_output_reserve() {
        let (x, y) = pool_reserves();
        assert!(in_given_out(&y, &x, &y, &big(3), &big(1000)).is_err());
        assert!(in_given_out(&(&y + 1u8), &x, &y, &big(3), &big(1000)).is_err());
        // the pool will never pay out the full reserve
        let huge_in = &x * 1_000_000_000u64;
        let out = out_given_in(&huge_in, &x, &y, &big(3), &big(1000)).unwrap();
        assert!(out <= &y - 1u8);
    }

    #[test]
    fn round_trip_never_favors_the_trader() {
        let (x, y) = pool_reserves();
        for dy in [big(1_000_000), big_dec("1000000000000000000"), big_dec("99000000000000000000")] {
            let dx = in_given_out(&dy, &x, &y, &big(3), &big(1000)).unwrap();
            let out = out_given_in(&dx, &x, &y, &big(3), &big(1000)).unwrap();
            assert!(out >= dy, "round trip through in_given_out lost output");
        }
        for dx in [big(50_000), big(7_000_000_000)] {
            let dy = out_given_in(&dx, &x, &y, &big(3), &big(1000)).unwrap();
            if dy.is_positive() {
                let needed = in_given_out(&dy, &x, &y, &big(3), &big(1000)).unwrap();
                assert!(needed <= dx, "inverse swap claims to need more than paid");
            }
        }
    }

    #[test]
    fn derivative_matches_finite_difference() {
        let (x, y) = pool_reserves();
        let dx = big(2_000_000_000);
        let step = big(1_000);

        let derivative = swap_derivative(&dx, &x, &y, &big(3), &big(1000));
        let out_hi =
            out_given_in(&(&dx + &step), &x, &y, &big(3), &big(1000)).unwrap();
        let out_lo =
            out_given_in(&(&dx - &step), &x, &y, &big(3), &big(1000)).unwrap();
        let numeric = (&out_hi - &out_lo) / (&step * 2);

        // analytic derivative, floored to the same grid
        let analytic = &derivative.numerator / &derivative.denominator;
        let numeric_diff: BigInt = &numeric - &analytic;
        let diff = numeric_diff.magnitude().clone();
        assert!(
            BigInt::from(diff) <= (&numeric / 100u8) + 1u8,
            "analytic {analytic} vs numeric {numeric}"
        );
    }

    #[test]
    fn derivative_at_zero_is_fee_adjusted_spot() {
        let (x, y) = pool_reserves();
        let derivative = swap_derivative(&BigInt::zero(), &x, &y, &big(3), &big(1000));
        assert_eq!(derivative.numerator, big(997) * &y);
        assert_eq!(derivative.denominator, big(1000) * &x);
    }
}
