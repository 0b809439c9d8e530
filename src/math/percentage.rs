// Aave PercentageMath. Percentages are expressed in basis points of a
// 1e4 factor (1% = 100 bps), rounded half-up.

use num_bigint::BigInt;
use num_traits::Zero;
use once_cell::sync::Lazy;

use crate::errors::EvmError;
use crate::evm::{big, MAX_UINT256};

pub static PERCENTAGE_FACTOR: Lazy<BigInt> = Lazy::new(|| big(10_000));
pub static HALF_PERCENTAGE_FACTOR: Lazy<BigInt> = Lazy::new(|| big(5_000));

/// (value * percentage + 5000) / 10000
pub fn percent_mul(value: &BigInt, percentage: &BigInt) -> Result<BigInt, EvmError> {
    if !percentage.is_zero()
        && value > &((&*MAX_UINT256 - &*HALF_PERCENTAGE_FACTOR) / percentage)
    {
        return Err(EvmError::MulOverflow);
    }
    Ok((value * percentage + &*HALF_PERCENTAGE_FACTOR) / &*PERCENTAGE_FACTOR)
}

/// (value * 10000 + percentage / 2) / percentage
pub fn percent_div(value: &BigInt, percentage: &BigInt) -> Result<BigInt, EvmError> {
    if percentage.is_zero() {
        return Err(EvmError::ZeroDivision);
    }
    if value > &((&*MAX_UINT256 - percentage / 2u8) / &*PERCENTAGE_FACTOR) {
        return Err(EvmError::DivInternal);
    }
    Ok((value * &*PERCENTAGE_FACTOR + percentage / 2u8) / percentage)
}
