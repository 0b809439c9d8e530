// Scaled-token mint/burn event processors.
//
// A scaled token emits Mint and Burn events whose value/balance_increase
// relationship encodes the user operation: supplies and borrows, repays and
// withdrawals, or pure interest accrual. Each (asset class, revision) pair
// carries its own rounding discipline through TokenMathVersion.

use ethers::types::Address;
use num_bigint::BigInt;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::errors::{AaveError, EvmError};
use crate::math::wad_ray::{ray_div, ray_mul};

use super::token_math::{AssetClass, TokenMathVersion};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralMintEvent {
    pub value: BigInt,
    pub balance_increase: BigInt,
    pub index: BigInt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralBurnEvent {
    pub value: BigInt,
    pub balance_increase: BigInt,
    pub index: BigInt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtMintEvent {
    pub caller: Address,
    pub on_behalf_of: Address,
    pub value: BigInt,
    pub balance_increase: BigInt,
    pub index: BigInt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtBurnEvent {
    pub from: Address,
    pub target: Address,
    pub value: BigInt,
    pub balance_increase: BigInt,
    pub index: BigInt,
}

/// Outcome of a mint-class event: the scaled-balance delta, the index the
/// position should record, and whether the event sat on the repay side of a
/// combined operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintResult {
    pub balance_delta: BigInt,
    pub new_index: BigInt,
    pub is_repay: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurnResult {
    pub balance_delta: BigInt,
    pub new_index: BigInt,
}

/// A user's position in one scaled token.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScaledPosition {
    pub scaled_balance: BigInt,
    pub last_index: BigInt,
}

impl ScaledPosition {
    pub fn apply(&mut self, balance_delta: &BigInt, new_index: &BigInt) {
        self.scaled_balance += balance_delta;
        self.last_index = new_index.clone();
    }
}

/// Collateral (aToken) processor for a given token revision.
#[derive(Debug, Clone, Copy)]
pub struct CollateralProcessor {
    revision: u8,
    math: TokenMathVersion,
}

impl CollateralProcessor {
    pub fn new(revision: u8) -> Result<Self, AaveError> {
        if !matches!(revision, 1..=6) {
            return Err(AaveError::UnknownRevision {
                class: "collateral".to_string(),
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

    pub fn calculate_mint_scaled_amount(
        &self,
        raw_amount: &BigInt,
        index: &BigInt,
    ) -> Result<BigInt, EvmError> {
        self.math.get_collateral_mint_scaled_amount(raw_amount, index)
    }

    pub fn calculate_burn_scaled_amount(
        &self,
        raw_amount: &BigInt,
        index: &BigInt,
    ) -> Result<BigInt, EvmError> {
        self.math.get_collateral_burn_scaled_amount(raw_amount, index)
    }

    /// Mint events fire for supplies, for the interest leg of withdrawals,
    /// and for pure interest accrual.
    pub fn process_mint_event(
        &self,
        event: &CollateralMintEvent,
        scaled_delta: Option<&BigInt>,
    ) -> Result<MintResult, EvmError> {
        if event.balance_increase > event.value {
            // interest accrual exceeds the deposit: emitted during withdraw
            let requested = &event.balance_increase - &event.value;
            let balance_delta = -ray_div(&requested, &event.index)?;
            return Ok(MintResult {
                balance_delta,
                new_index: event.index.clone(),
                is_repay: true,
            });
        }

        if event.value > event.balance_increase {
            // standard supply
            let balance_delta = match scaled_delta {
                // a matched Pool SUPPLY supplies the exact scaled amount
                Some(delta) => delta.clone(),
                None => {
                    let requested = &event.value - &event.balance_increase;
                    self.math.get_collateral_mint_scaled_amount(&requested, &event.index)?
                }
            };
            return Ok(MintResult {
                balance_delta,
                new_index: event.index.clone(),
                is_repay: false,
            });
        }

        // pure interest accrual: only the index moves
        Ok(MintResult {
            balance_delta: BigInt::zero(),
            new_index: event.index.clone(),
            is_repay: false,
        })
    }

    /// Burn events fire for withdrawals and collateral seizure. The burn
    /// reduces the position by the requested amount plus the interest that
    /// was minted into it immediately before.
    pub fn process_burn_event(
        &self,
        event: &CollateralBurnEvent,
        scaled_delta: Option<&BigInt>,
    ) -> Result<BurnResult, EvmError> {
        let balance_delta = match scaled_delta {
            Some(delta) => -delta,
            None => {
                // fallback from event data; can deviate a wei from the Pool
                // calculation on revision 5+ when no matched event exists
                let requested = &event.value + &event.balance_increase;
                -self.math.get_collateral_burn_scaled_amount(&requested, &event.index)?
            }
        };
        Ok(BurnResult {
            balance_delta,
            new_index: event.index.clone(),
        })
    }
}

/// Debt (vToken) processor for a given token revision. GHO debt has its own
/// processor in the gho module.
#[derive(Debug, Clone, Copy)]
pub struct DebtProcessor {
    revision: u8,
    math: TokenMathVersion,
}

impl DebtProcessor {
    pub fn new(revision: u8) -> Result<Self, AaveError> {
        if !matches!(revision, 1..=6) {
            return Err(AaveError::UnknownRevision {
                class: "debt".to_string(),
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

    pub fn calculate_mint_scaled_amount(
        &self,
        raw_amount: &BigInt,
        index: &BigInt,
    ) -> Result<BigInt, EvmError> {
        self.math.get_debt_mint_scaled_amount(raw_amount, index)
    }

    pub fn calculate_burn_scaled_amount(
        &self,
        raw_amount: &BigInt,
        index: &BigInt,
    ) -> Result<BigInt, EvmError> {
        self.math.get_debt_burn_scaled_amount(raw_amount, index)
    }

    /// Mint events fire for borrows, for the interest leg of repayments,
    /// and for pure interest accrual.
    pub fn process_mint_event(
        &self,
        event: &DebtMintEvent,
        position: &ScaledPosition,
        scaled_delta: Option<&BigInt>,
    ) -> Result<MintResult, EvmError> {
        if event.value > event.balance_increase {
            // borrow
            let balance_delta = match scaled_delta {
                Some(delta) => delta.clone(),
                None => {
                    let requested = &event.value - &event.balance_increase;
                    self.math.get_debt_mint_scaled_amount(&requested, &event.index)?
                }
            };
            return Ok(MintResult {
                balance_delta,
                new_index: event.index.clone(),
                is_repay: false,
            });
        }

        if event.balance_increase > event.value {
            // repay: the mint carries the interest accrued before the burn
            let requested = &event.balance_increase - &event.value;
            let balance_delta = -self.math.get_debt_burn_scaled_amount(&requested, &event.index)?;
            return Ok(MintResult {
                balance_delta,
                new_index: event.index.clone(),
                is_repay: true,
            });
        }

        // pure interest accrual: reconvert the accrued interest to scaled
        // units at the new index; interest grows a debt position
        let accrued = ray_mul(&position.scaled_balance, &event.index)?
            - ray_mul(&position.scaled_balance, &position.last_index)?;
        let balance_delta = ray_div(&accrued, &event.index)?;
        Ok(MintResult {
            balance_delta,
            new_index: event.index.clone(),
            is_repay: false,
        })
    }

    pub fn process_burn_event(
        &self,
        event: &DebtBurnEvent,
        scaled_delta: Option<&BigInt>,
    ) -> Result<BurnResult, EvmError> {
        let balance_delta = match scaled_delta {
            Some(delta) => -delta,
            None => {
                let requested = &event.value + &event.balance_increase;
                -self.math.get_debt_burn_scaled_amount(&requested, &event.index)?
            }
        };
        Ok(BurnResult {
            balance_delta,
            new_index: event.index.clone(),
        })
    }
}

/// Factory mapping revisions to processors, mirroring the deployed token
/// revisions (revision 2 was skipped on both token families).
pub fn collateral_processor(revision: u8) -> Result<CollateralProcessor, AaveError> {
    CollateralProcessor::new(revision)
}

pub fn debt_processor(revision: u8) -> Result<DebtProcessor, AaveError> {
    DebtProcessor::new(revision)
}

pub use super::token_math::AssetClass as Class;

/// Displayed balance for a position at the current index, with the
/// class/revision-appropriate rounding.
pub fn displayed_balance(
    class: AssetClass,
    revision: u8,
    position: &ScaledPosition,
    current_index: &BigInt,
) -> Result<BigInt, EvmError> {
    let math = TokenMathVersion::for_token_revision(revision);
    match class {
        AssetClass::Collateral => math.get_collateral_balance(&position.scaled_balance, current_index),
        AssetClass::Debt => math.get_debt_balance(&position.scaled_balance, current_index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evm::big_dec;

    fn index() -> BigInt {
        big_dec("1143509431396222220498421265")
    }

    #[test]
    fn v4_collateral_mint_uses_floor() {
        let processor = CollateralProcessor::new(4).unwrap();
        let event = CollateralMintEvent {
            value: big_dec("50043781461041674422932"),
            balance_increase: big_dec("43781461041674422931"),
            index: index(),
        };
        let result = processor.process_mint_event(&event, None).unwrap();
        assert_eq!(result.balance_delta, big_dec("43725043823162981893235"));
        assert!(!result.is_repay);
    }

    #[test]
    fn v5_debt_mint_uses_ceil() {
        let processor = DebtProcessor::new(5).unwrap();
        let event = DebtMintEvent {
            caller: Address::zero(),
            on_behalf_of: Address::zero(),
            value: big_dec("50043781461041674422932"),
            balance_increase: big_dec("43781461041674422931"),
            index: index(),
        };
        let position = ScaledPosition::default();
        let result = processor.process_mint_event(&event, &position, None).unwrap();
        assert_eq!(result.balance_delta, big_dec("43725043823162981893236"));
    }

    #[test]
    fn withdrawal_adjacent_mint_reduces_collateral() {
        let processor = CollateralProcessor::new(1).unwrap();
        let event = CollateralMintEvent {
            value: big_dec("1000000000000000000"),
            balance_increase: big_dec("3000000000000000000"),
            index: index(),
        };
        let result = processor.process_mint_event(&event, None).unwrap();
        assert!(result.is_repay);
        let expected = -crate::math::wad_ray::ray_div(&big_dec("2000000000000000000"), &index()).unwrap();
        assert_eq!(result.balance_delta, expected);
    }

    #[test]
    fn pure_interest_mint_leaves_scaled_balance_untouched() {
        let processor = CollateralProcessor::new(5).unwrap();
        let event = CollateralMintEvent {
            value: big_dec("43781461041674422931"),
            balance_increase: big_dec("43781461041674422931"),
            index: index(),
        };
        let result = processor.process_mint_event(&event, None).unwrap();
        assert_eq!(result.balance_delta, BigInt::zero());
        assert_eq!(result.new_index, index());
    }

    #[test]
    fn matched_scaled_delta_wins_over_event_data() {
        let processor = CollateralProcessor::new(5).unwrap();
        let event = CollateralMintEvent {
            value: big_dec("50043781461041674422932"),
            balance_increase: big_dec("43781461041674422931"),
            index: index(),
        };
        let pool_supplied = big_dec("43725043823162981893000");
        let result = processor.process_mint_event(&event, Some(&pool_supplied)).unwrap();
        assert_eq!(result.balance_delta, pool_supplied);
    }

    #[test]
    fn burn_adds_interest_to_the_requested_amount() {
        let processor = CollateralProcessor::new(1).unwrap();
        let event = CollateralBurnEvent {
            value: big_dec("10000000000000000000"),
            balance_increase: big_dec("500000000000000000"),
            index: index(),
        };
        let result = processor.process_burn_event(&event, None).unwrap();
        let expected =
            -crate::math::wad_ray::ray_div(&big_dec("10500000000000000000"), &index()).unwrap();
        assert_eq!(result.balance_delta, expected);
    }

    #[test]
    fn debt_pure_interest_grows_the_scaled_balance() {
        let processor = DebtProcessor::new(3).unwrap();
        let previous_index = big_dec("1100000000000000000000000000");
        let current_index = big_dec("1150000000000000000000000000");
        let position = ScaledPosition {
            scaled_balance: big_dec("1000000000000000000000"),
            last_index: previous_index,
        };
        let event = DebtMintEvent {
            caller: Address::zero(),
            on_behalf_of: Address::zero(),
            value: big_dec("50000000000000000000"),
            balance_increase: big_dec("50000000000000000000"),
            index: current_index.clone(),
        };
        let result = processor.process_mint_event(&event, &position, None).unwrap();
        assert!(result.balance_delta > BigInt::zero());
        // 1000 scaled * 0.05 index growth / 1.15 index ~ 43.48 scaled
        let approx = big_dec("43478260869565217391");
        let error = (&result.balance_delta - &approx).magnitude().clone();
        assert!(BigInt::from(error) < big_dec("10"), "{}", result.balance_delta);
    }

    #[test]
    fn rejects_unknown_revisions() {
        assert!(CollateralProcessor::new(0).is_err());
        assert!(CollateralProcessor::new(7).is_err());
        assert!(DebtProcessor::new(7).is_err());
    }
}
