// GHO variable debt token processing and the discount rate strategy.
//
// Revisions 1-3 grant a rate discount keyed by the user's staked-token
// balance: every balance-changing action first accrues interest net of the
// discount, and the discount portion is burned out of the scaled balance.
// Revisions 4+ deprecate the discount and follow the TokenMath rounding of
// their pool revision.

use num_bigint::BigInt;
use num_traits::Zero;
use once_cell::sync::Lazy;

use crate::errors::{AaveError, EvmError};
use crate::evm::big_dec;
use crate::math::percentage::percent_mul;
use crate::math::wad_ray::{ray_div, ray_mul};

use super::processors::{DebtBurnEvent, DebtMintEvent, ScaledPosition};
use super::token_math::TokenMathVersion;

pub static MIN_DEBT_TOKEN_BALANCE: Lazy<BigInt> = Lazy::new(|| big_dec("1000000000000000000"));
pub static MIN_DISCOUNT_TOKEN_BALANCE: Lazy<BigInt> = Lazy::new(|| big_dec("1000000000000000"));
pub const DISCOUNT_RATE_BPS: u32 = 3_000;
pub static GHO_DISCOUNTED_PER_DISCOUNT_TOKEN: Lazy<BigInt> =
    Lazy::new(|| big_dec("100000000000000000000"));
static WAD: Lazy<BigInt> = Lazy::new(|| big_dec("1000000000000000000"));

/// Mirrors the on-chain GhoDiscountRateStrategy.calculateDiscountRate.
pub fn calculate_gho_discount_rate(
    debt_balance: &BigInt,
    discount_token_balance: &BigInt,
) -> u32 {
    if debt_balance < &*MIN_DEBT_TOKEN_BALANCE
        || discount_token_balance < &*MIN_DISCOUNT_TOKEN_BALANCE
    {
        return 0;
    }
    let discounted_balance = (discount_token_balance * &*GHO_DISCOUNTED_PER_DISCOUNT_TOKEN) / &*WAD;
    if &discounted_balance >= debt_balance {
        DISCOUNT_RATE_BPS
    } else {
        // proportional share of the full discount
        let rate = (&discounted_balance * DISCOUNT_RATE_BPS) / debt_balance;
        // quotient is bounded by DISCOUNT_RATE_BPS
        rate.try_into().unwrap_or(DISCOUNT_RATE_BPS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GhoUserOperation {
    Borrow,
    Repay,
    InterestAccrual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GhoMintResult {
    pub balance_delta: BigInt,
    pub new_index: BigInt,
    pub user_operation: GhoUserOperation,
    pub discount_scaled: BigInt,
    pub should_refresh_discount: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GhoBurnResult {
    pub balance_delta: BigInt,
    pub new_index: BigInt,
    pub discount_scaled: BigInt,
    pub should_refresh_discount: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct GhoProcessor {
    revision: u8,
    math: TokenMathVersion,
}

impl GhoProcessor {
    pub fn new(revision: u8) -> Result<Self, AaveError> {
        if !matches!(revision, 1..=6) {
            return Err(AaveError::UnknownRevision {
                class: "gho".to_string(),
                revision,
            });
        }
        Ok(Self {
            revision,
            math: TokenMathVersion::for_token_revision(revision),
        })
    }

    pub fn revision(&self) -> u8 {
        self.revision
    }

    pub fn supports_discount(&self) -> bool {
        self.revision <= 3
    }

    /// The scaled discount burned by _accrueDebtOnAction: the interest
    /// accrued since the last index, times the discount rate, rescaled.
    pub fn accrue_debt_on_action(
        &self,
        previous_scaled_balance: &BigInt,
        previous_index: &BigInt,
        discount_bps: u32,
        current_index: &BigInt,
    ) -> Result<BigInt, EvmError> {
        if !self.supports_discount() {
            return Ok(BigInt::zero());
        }
        let balance_increase = ray_mul(previous_scaled_balance, current_index)?
            - ray_mul(previous_scaled_balance, previous_index)?;
        if balance_increase.is_zero() || discount_bps == 0 {
            return Ok(BigInt::zero());
        }
        let discount = percent_mul(&balance_increase, &BigInt::from(discount_bps))?;
        ray_div(&discount, current_index)
    }

    /// balanceOf with the discount applied, used by the full-repayment
    /// probe on burns.
    pub fn get_discounted_balance(
        &self,
        scaled_balance: &BigInt,
        previous_index: &BigInt,
        current_index: &BigInt,
        discount_bps: u32,
    ) -> Result<BigInt, EvmError> {
        if scaled_balance.is_zero() {
            return Ok(BigInt::zero());
        }
        let mut balance = ray_mul(scaled_balance, current_index)?;
        if !self.supports_discount() || current_index == previous_index {
            return Ok(balance);
        }
        if discount_bps != 0 {
            let balance_increase = &balance - ray_mul(scaled_balance, previous_index)?;
            balance -= percent_mul(&balance_increase, &BigInt::from(discount_bps))?;
        }
        Ok(balance)
    }

    pub fn process_mint_event(
        &self,
        event: &DebtMintEvent,
        position: &ScaledPosition,
        previous_discount_bps: u32,
        scaled_delta: Option<&BigInt>,
    ) -> Result<GhoMintResult, EvmError> {
        let discount_scaled = self.accrue_debt_on_action(
            &position.scaled_balance,
            &position.last_index,
            previous_discount_bps,
            &event.index,
        )?;

        if event.value > event.balance_increase {
            // borrow
            let requested = &event.value - &event.balance_increase;
            let amount_scaled = match scaled_delta {
                Some(delta) => delta.clone(),
                None if self.supports_discount() => ray_div(&requested, &event.index)?,
                None => self.math.get_debt_mint_scaled_amount(&requested, &event.index)?,
            };
            // the discount burn can exceed the borrow, flipping the sign
            let balance_delta = amount_scaled - &discount_scaled;
            return Ok(GhoMintResult {
                balance_delta,
                new_index: event.index.clone(),
                user_operation: GhoUserOperation::Borrow,
                discount_scaled,
                should_refresh_discount: self.supports_discount(),
            });
        }

        if event.balance_increase > event.value {
            // repay
            let requested = &event.balance_increase - &event.value;
            let amount_scaled = if self.supports_discount() {
                ray_div(&requested, &event.index)?
            } else {
                self.math.get_debt_burn_scaled_amount(&requested, &event.index)?
            };
            // revision 2+ runs the same full-repayment probe as the burn
            // path: repaying exactly the discounted balance clears the
            // entire scaled position
            let balance_delta = if self.revision >= 2 && self.supports_discount() {
                let balance_before_burn = self.get_discounted_balance(
                    &position.scaled_balance,
                    &position.last_index,
                    &event.index,
                    previous_discount_bps,
                )?;
                if requested == balance_before_burn {
                    -&position.scaled_balance
                } else {
                    // the interest leg nets against the discount burn; the
                    // sign can flip either way
                    &discount_scaled - amount_scaled
                }
            } else {
                &discount_scaled - amount_scaled
            };
            return Ok(GhoMintResult {
                balance_delta,
                new_index: event.index.clone(),
                user_operation: GhoUserOperation::Repay,
                discount_scaled,
                should_refresh_discount: self.supports_discount(),
            });
        }

        // pure interest accrual
        let balance_delta = if self.supports_discount() {
            // the contract burns the discount amount
            -&discount_scaled
        } else {
            // no discount: reconvert the accrued interest back to scaled
            let accrued = ray_mul(&position.scaled_balance, &event.index)?
                - ray_mul(&position.scaled_balance, &position.last_index)?;
            ray_div(&accrued, &event.index)?
        };
        Ok(GhoMintResult {
            balance_delta,
            new_index: event.index.clone(),
            user_operation: GhoUserOperation::InterestAccrual,
            discount_scaled,
            should_refresh_discount: self.supports_discount(),
        })
    }

    pub fn process_burn_event(
        &self,
        event: &DebtBurnEvent,
        position: &ScaledPosition,
        previous_discount_bps: u32,
        scaled_delta: Option<&BigInt>,
    ) -> Result<GhoBurnResult, EvmError> {
        let requested = &event.value + &event.balance_increase;

        if !self.supports_discount() {
            let balance_delta = match scaled_delta {
                Some(delta) => -delta,
                None => -self.math.get_debt_burn_scaled_amount(&requested, &event.index)?,
            };
            return Ok(GhoBurnResult {
                balance_delta,
                new_index: event.index.clone(),
                discount_scaled: BigInt::zero(),
                should_refresh_discount: false,
            });
        }

        let amount_scaled = ray_div(&requested, &event.index)?;
        let discount_scaled = self.accrue_debt_on_action(
            &position.scaled_balance,
            &position.last_index,
            previous_discount_bps,
            &event.index,
        )?;

        // revision 2+ detects full repayment against the discounted balance
        // and burns the entire scaled position
        let balance_delta = if self.revision >= 2 {
            let balance_before_burn = self.get_discounted_balance(
                &position.scaled_balance,
                &position.last_index,
                &event.index,
                previous_discount_bps,
            )?;
            if requested == balance_before_burn {
                -&position.scaled_balance
            } else {
                -(amount_scaled + &discount_scaled)
            }
        } else {
            -(amount_scaled + &discount_scaled)
        };

        Ok(GhoBurnResult {
            balance_delta,
            new_index: event.index.clone(),
            discount_scaled,
            should_refresh_discount: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Address;

    fn gho(value: &str) -> BigInt {
        big_dec(value)
    }

    #[test]
    fn discount_rate_reference_values() {
        // fully covered debt: maximum discount
        assert_eq!(
            calculate_gho_discount_rate(&gho("100000000000000000000"), &gho("2000000000000000000")),
            3000
        );
        // half covered: proportional
        assert_eq!(
            calculate_gho_discount_rate(&gho("100000000000000000000"), &gho("500000000000000000")),
            1500
        );
        // below the debt threshold
        assert_eq!(
            calculate_gho_discount_rate(&gho("999999999999999999"), &gho("2000000000000000000")),
            0
        );
        // below the staked-token threshold
        assert_eq!(
            calculate_gho_discount_rate(&gho("100000000000000000000"), &gho("999999999999999")),
            0
        );
    }

    fn position() -> ScaledPosition {
        ScaledPosition {
            scaled_balance: gho("1000000000000000000000"),
            last_index: gho("1100000000000000000000000000"),
        }
    }

    fn mint_event(value: &str, balance_increase: &str) -> DebtMintEvent {
        DebtMintEvent {
            caller: Address::zero(),
            on_behalf_of: Address::zero(),
            value: gho(value),
            balance_increase: gho(balance_increase),
            index: gho("1150000000000000000000000000"),
        }
    }

    #[test]
    fn borrow_nets_out_the_discount() {
        let processor = GhoProcessor::new(2).unwrap();
        let event = mint_event("100000000000000000000", "50000000000000000000");
        let result = processor
            .process_mint_event(&event, &position(), 3000, None)
            .unwrap();
        assert_eq!(result.user_operation, GhoUserOperation::Borrow);
        assert!(result.should_refresh_discount);

        let amount_scaled = ray_div(&gho("50000000000000000000"), &event.index).unwrap();
        let expected_discount = processor
            .accrue_debt_on_action(
                &position().scaled_balance,
                &position().last_index,
                3000,
                &event.index,
            )
            .unwrap();
        assert!(expected_discount > BigInt::zero());
        assert_eq!(result.balance_delta, amount_scaled - &expected_discount);
        assert_eq!(result.discount_scaled, expected_discount);
    }

    #[test]
    fn discount_larger_than_borrow_flips_the_sign() {
        let processor = GhoProcessor::new(2).unwrap();
        // tiny borrow against a large accrued discount
        let event = mint_event("2000000000000000000", "1999999999999999999");
        let result = processor
            .process_mint_event(&event, &position(), 3000, None)
            .unwrap();
        assert_eq!(result.user_operation, GhoUserOperation::Borrow);
        assert!(result.balance_delta < BigInt::zero());
    }

    #[test]
    fn interest_accrual_burns_only_the_discount() {
        let processor = GhoProcessor::new(1).unwrap();
        let event = mint_event("50000000000000000000", "50000000000000000000");
        let result = processor
            .process_mint_event(&event, &position(), 3000, None)
            .unwrap();
        assert_eq!(result.user_operation, GhoUserOperation::InterestAccrual);
        assert_eq!(result.balance_delta, -result.discount_scaled.clone());
    }

    #[test]
    fn full_repayment_burns_the_whole_position() {
        let processor = GhoProcessor::new(2).unwrap();
        let pos = position();
        let discount_bps = 3000;
        let index = gho("1150000000000000000000000000");
        let full_balance = processor
            .get_discounted_balance(&pos.scaled_balance, &pos.last_index, &index, discount_bps)
            .unwrap();

        // burn exactly the discounted balance: value + balance_increase
        let event = DebtBurnEvent {
            from: Address::zero(),
            target: Address::zero(),
            value: full_balance.clone(),
            balance_increase: BigInt::zero(),
            index: index.clone(),
        };
        let result = processor
            .process_burn_event(&event, &pos, discount_bps, None)
            .unwrap();
        assert_eq!(result.balance_delta, -pos.scaled_balance);
    }

    #[test]
    fn full_repayment_through_a_mint_event_burns_the_whole_position() {
        // a repay delivered as a Mint (balance_increase > value) must run
        // the same probe as the burn path on revision 2+
        let processor = GhoProcessor::new(2).unwrap();
        let pos = position();
        let discount_bps = 3000;
        let index = gho("1150000000000000000000000000");
        let full_balance = processor
            .get_discounted_balance(&pos.scaled_balance, &pos.last_index, &index, discount_bps)
            .unwrap();

        let event = DebtMintEvent {
            caller: Address::zero(),
            on_behalf_of: Address::zero(),
            value: gho("5000000000000000000"),
            balance_increase: &full_balance + gho("5000000000000000000"),
            index: index.clone(),
        };
        let result = processor
            .process_mint_event(&event, &pos, discount_bps, None)
            .unwrap();
        assert_eq!(result.user_operation, GhoUserOperation::Repay);
        assert_eq!(result.balance_delta, -pos.scaled_balance.clone());

        // one wei away from the discounted balance is a partial repayment
        let event = DebtMintEvent {
            balance_increase: &full_balance + gho("4999999999999999999"),
            ..event
        };
        let result = processor
            .process_mint_event(&event, &pos, discount_bps, None)
            .unwrap();
        let amount_scaled = ray_div(&(&full_balance - 1u8), &event.index).unwrap();
        assert_eq!(
            result.balance_delta,
            &result.discount_scaled - amount_scaled
        );
    }

    #[test]
    fn revision_1_mint_repay_has_no_probe() {
        // revision 1 predates the full-repayment detection: even an exact
        // discounted-balance repayment nets discount against amount
        let processor = GhoProcessor::new(1).unwrap();
        let pos = position();
        let index = gho("1150000000000000000000000000");
        let full_balance = processor
            .get_discounted_balance(&pos.scaled_balance, &pos.last_index, &index, 3000)
            .unwrap();
        let event = DebtMintEvent {
            caller: Address::zero(),
            on_behalf_of: Address::zero(),
            value: BigInt::zero(),
            balance_increase: full_balance.clone(),
            index: index.clone(),
        };
        let result = processor.process_mint_event(&event, &pos, 3000, None).unwrap();
        let amount_scaled = ray_div(&full_balance, &index).unwrap();
        assert_eq!(result.balance_delta, &result.discount_scaled - amount_scaled);
        assert_ne!(result.balance_delta, -pos.scaled_balance.clone());
    }

    #[test]
    fn revision_4_deprecates_the_discount() {
        let processor = GhoProcessor::new(4).unwrap();
        assert!(!processor.supports_discount());
        let event = mint_event("100000000000000000000", "50000000000000000000");
        let result = processor
            .process_mint_event(&event, &position(), 3000, None)
            .unwrap();
        assert_eq!(result.discount_scaled, BigInt::zero());
        assert!(!result.should_refresh_discount);
        // rev 4+ borrow rounds with ceil via TokenMath
        let expected = TokenMathVersion::V4
            .get_debt_mint_scaled_amount(&gho("50000000000000000000"), &event.index)
            .unwrap();
        assert_eq!(result.balance_delta, expected);
    }
}
