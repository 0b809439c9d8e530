// Typed error taxonomy for the simulation engine.
//
// Errors are tagged values, never control flow: every failure carries its
// attached data and serializes cleanly so distributed solvers can re-surface
// results computed in another process.

use ethers::types::{Address, H256};
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pools::hooks::HookFlag;

/// Arithmetic and bounds failures mirroring EVM reverts.
///
/// The display strings match the revert reasons of the on-chain libraries
/// where those exist (Aave WadRayMath, Balancer LogExpMath, Uniswap core).
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum EvmError {
    #[error("MUL_OVERFLOW")]
    MulOverflow,
    #[error("ZERO_DIVISION")]
    ZeroDivision,
    #[error("DIV_INTERNAL")]
    DivInternal,
    #[error("muldiv quotient exceeds uint256")]
    MulDivOverflow,
    #[error("Not a valid uint256")]
    InvalidUint256,
    #[error("value exceeds uint160")]
    Uint160Overflow,
    #[error("InvalidTick")]
    InvalidTick,
    #[error("InvalidSqrtPrice")]
    InvalidSqrtPrice,
    #[error("InvalidPrice")]
    InvalidPrice,
    #[error("InvalidPriceOrLiquidity")]
    InvalidPriceOrLiquidity,
    #[error("PriceOverflow")]
    PriceOverflow,
    #[error("NotEnoughLiquidity")]
    NotEnoughLiquidity,
    #[error("InvalidFeeForExactOut")]
    InvalidFeeForExactOut,
    #[error("X_OUT_OF_BOUNDS")]
    XOutOfBounds,
    #[error("Y_OUT_OF_BOUNDS")]
    YOutOfBounds,
    #[error("PRODUCT_OUT_OF_BOUNDS")]
    ProductOutOfBounds,
    #[error("OUT_OF_BOUNDS")]
    OutOfBounds,
    #[error("INVALID_EXPONENT")]
    InvalidExponent,
    #[error("ZERO_INVARIANT")]
    ZeroInvariant,
    #[error("MAX_IN_RATIO")]
    MaxInRatio,
    #[error("MAX_OUT_RATIO")]
    MaxOutRatio,
    #[error("!y")]
    StableInvariantNoConverge,
}

/// Failures raised by pool state machines and their liquidity maps.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum LiquidityPoolError {
    #[error("EVM revert: {0}")]
    Revert(#[from] EvmError),

    /// A word bitmap is not included in a sparse liquidity map. The caller
    /// decides whether to fetch the word from the chain reader or fail.
    #[error("word {word} is unknown")]
    LiquidityMapWordMissing { word: i16 },

    #[error("pool address verification failed")]
    AddressMismatch,

    #[error("external update failed sanity checks: {reason}")]
    ExternalUpdateError { reason: String },

    #[error("update at block {update_block} is prior to last update at block {pool_block}")]
    LateUpdateError { update_block: u64, pool_block: u64 },

    #[error("no pool state known prior to block {block}")]
    NoPoolStateAvailable { block: u64 },

    #[error("the swap input is invalid")]
    InvalidSwapInputAmount,

    /// The swap ended before consuming the input or delivering the requested
    /// output. Partial results are attached because solvers legitimately
    /// need them.
    #[error("insufficient liquidity to swap for the requested amount")]
    IncompleteSwap { amount_in: BigInt, amount_out: BigInt },

    /// The pool has one or more active hooks that might invalidate the
    /// calculated result. The candidate result is attached; the caller
    /// decides whether to trust it.
    #[error("the pool has one or more hooks that might invalidate the calculated result")]
    PossibleInaccurateResult {
        amount_in: BigInt,
        amount_out: BigInt,
        hooks: Vec<HookFlag>,
    },

    #[error("state override has the wrong variant for this pool")]
    StateOverrideMismatch,

    #[error("token {token} is not held by pool {pool}")]
    TokenNotInPool { token: Address, pool: Address },
}

/// Failures raised by the arbitrage solver and pathfinder.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ArbitrageError {
    #[error("no solver solution")]
    NoSolverSolution,

    #[error("arbitrage calculation failed: {0}")]
    ArbCalculationError(String),

    #[error("rate of exchange {numerator}/{denominator} below minimum")]
    RateOfExchangeBelowMinimum { numerator: BigInt, denominator: BigInt },

    #[error("invalid swap path")]
    InvalidSwapPath,

    #[error("no liquidity in the direction of the proposed swap")]
    NoLiquidity,

    #[error("search cancelled before convergence")]
    Cancelled,

    #[error(transparent)]
    Pool(#[from] LiquidityPoolError),
}

/// Failures raised by the process-global registries.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RegistryError {
    #[error("pool {address:?} is unknown")]
    UnknownPool { address: Address },

    #[error("pool id {id:?} is unknown")]
    UnknownPoolId { id: H256 },

    #[error("registry already holds a different instance for this key")]
    RegistryAlreadyInitialized,
}

/// Failures raised by Aave event decoding and matching.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum AaveError {
    #[error("no processor for {class} revision {revision}")]
    UnknownRevision { class: String, revision: u8 },

    #[error("log at index {log_index} is malformed: {reason}")]
    MalformedLog { log_index: u32, reason: String },
}
