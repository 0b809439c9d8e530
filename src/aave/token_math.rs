// Pool-contract TokenMath: rounding-aware scaled-amount calculations.
//
// Revisions 1-3 predate the TokenMath library and round everything half-up.
// Revision 4 introduced explicit floor/ceil rounding; revision 5+ keeps the
// same discipline. Mints round down for collateral and up for debt, burns
// invert that, so the protocol never over-mints aTokens or under-accounts
// debt.

use num_bigint::BigInt;

use crate::errors::{AaveError, EvmError};
use crate::math::wad_ray::{ray_div_rounded, ray_mul_rounded, Rounding};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetClass {
    Collateral,
    Debt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenMathVersion {
    /// Pool revisions 1-3 (Aave v3.1-v3.3): half-up everywhere.
    V1,
    /// Pool revision 4 (Aave v3.4): explicit floor/ceil.
    V4,
    /// Pool revisions 5+ (Aave v3.5+): same discipline as V4.
    V5,
}

impl TokenMathVersion {
    pub fn for_pool_revision(revision: u8) -> Result<Self, AaveError> {
        match revision {
            1..=3 => Ok(Self::V1),
            4 => Ok(Self::V4),
            5 | 6 => Ok(Self::V5),
            _ => Err(AaveError::UnknownRevision {
                class: "pool".to_string(),
                revision,
            }),
        }
    }

    /// Token revisions map onto the pool version they shipped with.
    pub fn for_token_revision(revision: u8) -> Self {
        match revision {
            0..=3 => Self::V1,
            4 => Self::V4,
            _ => Self::V5,
        }
    }

    fn is_legacy(self) -> bool {
        matches!(self, Self::V1)
    }

    pub fn mint_rounding(self, class: AssetClass) -> Rounding {
        if self.is_legacy() {
            Rounding::HalfUp
        } else {
            match class {
                AssetClass::Collateral => Rounding::Floor,
                AssetClass::Debt => Rounding::Ceil,
            }
        }
    }

    pub fn burn_rounding(self, class: AssetClass) -> Rounding {
        if self.is_legacy() {
            Rounding::HalfUp
        } else {
            match class {
                AssetClass::Collateral => Rounding::Ceil,
                AssetClass::Debt => Rounding::Floor,
            }
        }
    }

    pub fn balance_rounding(self, class: AssetClass) -> Rounding {
        if self.is_legacy() {
            Rounding::HalfUp
        } else {
            match class {
                AssetClass::Collateral => Rounding::Floor,
                AssetClass::Debt => Rounding::Ceil,
            }
        }
    }

    pub fn get_collateral_mint_scaled_amount(
        self,
        amount: &BigInt,
        liquidity_index: &BigInt,
    ) -> Result<BigInt, EvmError> {
        ray_div_rounded(amount, liquidity_index, self.mint_rounding(AssetClass::Collateral))
    }

    pub fn get_collateral_burn_scaled_amount(
        self,
        amount: &BigInt,
        liquidity_index: &BigInt,
    ) -> Result<BigInt, EvmError> {
        ray_div_rounded(amount, liquidity_index, self.burn_rounding(AssetClass::Collateral))
    }

    /// Transfers round up so the recipient receives at least the requested
    /// amount.
    pub fn get_collateral_transfer_scaled_amount(
        self,
        amount: &BigInt,
        liquidity_index: &BigInt,
    ) -> Result<BigInt, EvmError> {
        let rounding = if self.is_legacy() {
            Rounding::HalfUp
        } else {
            Rounding::Ceil
        };
        ray_div_rounded(amount, liquidity_index, rounding)
    }

    pub fn get_collateral_balance(
        self,
        scaled_amount: &BigInt,
        liquidity_index: &BigInt,
    ) -> Result<BigInt, EvmError> {
        ray_mul_rounded(
            scaled_amount,
            liquidity_index,
            self.balance_rounding(AssetClass::Collateral),
        )
    }

    pub fn get_debt_mint_scaled_amount(
        self,
        amount: &BigInt,
        borrow_index: &BigInt,
    ) -> Result<BigInt, EvmError> {
        ray_div_rounded(amount, borrow_index, self.mint_rounding(AssetClass::Debt))
    }

    pub fn get_debt_burn_scaled_amount(
        self,
        amount: &BigInt,
        borrow_index: &BigInt,
    ) -> Result<BigInt, EvmError> {
        ray_div_rounded(amount, borrow_index, self.burn_rounding(AssetClass::Debt))
    }

    pub fn get_debt_balance(
        self,
        scaled_amount: &BigInt,
        borrow_index: &BigInt,
    ) -> Result<BigInt, EvmError> {
        ray_mul_rounded(scaled_amount, borrow_index, self.balance_rounding(AssetClass::Debt))
    }
}
