// Pool state machines.
//
// Every pool variant owns its state behind a copy-on-write snapshot:
// readers clone an Arc, simulation returns candidate future states without
// mutating the original, and external updates swap the snapshot under a
// write lock before fanning out to subscribers.

pub mod aerodrome;
pub mod balancer;
pub mod concentrated;
pub mod hooks;
pub mod liquidity_map;
pub mod publisher;
pub mod registry;
pub mod v2;

use std::sync::Arc;

use ethers::types::Address;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::errors::LiquidityPoolError;
use publisher::Subscriber;

/// Tag for the pool protocol variant, used by the pathfinder's filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolVariant {
    UniswapV2,
    UniswapV3,
    UniswapV4,
    AerodromeVolatile,
    AerodromeStable,
    BalancerWeighted,
}

/// A point-in-time copy of a pool's state. Passed back into swap entry
/// points as an override to simulate against hypothetical states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PoolSnapshot {
    ConstantProduct(v2::UniswapV2PoolState),
    Concentrated(concentrated::UniswapV3PoolState),
    Aerodrome(aerodrome::AerodromePoolState),
    Weighted(balancer::BalancerPoolState),
}

impl PoolSnapshot {
    pub fn block(&self) -> u64 {
        match self {
            PoolSnapshot::ConstantProduct(state) => state.block,
            PoolSnapshot::Concentrated(state) => state.block,
            PoolSnapshot::Aerodrome(state) => state.block,
            PoolSnapshot::Weighted(state) => state.block,
        }
    }
}

/// The common pool protocol. The arbitrage solver and pathfinder operate
/// over this trait and never downcast to a concrete pool type.
pub trait LiquidityPool: Send + Sync {
    fn address(&self) -> Address;

    fn variant(&self) -> PoolVariant;

    fn tokens(&self) -> Vec<Address>;

    fn update_block(&self) -> u64;

    fn snapshot(&self) -> PoolSnapshot;

    /// Exact-input quote. `override_state`, when given, replaces the pool's
    /// own state for this calculation only.
    fn calculate_tokens_out_from_tokens_in(
        &self,
        token_in: Address,
        amount_in: &BigInt,
        override_state: Option<&PoolSnapshot>,
    ) -> Result<BigInt, LiquidityPoolError>;

    /// Exact-output quote.
    fn calculate_tokens_in_from_tokens_out(
        &self,
        token_out: Address,
        amount_out: &BigInt,
        override_state: Option<&PoolSnapshot>,
    ) -> Result<BigInt, LiquidityPoolError>;

    /// Analytical d(out)/d(in) at `amount_in`, where the pool math admits a
    /// closed form. Solvers fall back to finite differences when this
    /// returns None.
    fn swap_derivative(
        &self,
        _token_in: Address,
        _amount_in: &BigInt,
        _override_state: Option<&PoolSnapshot>,
    ) -> Option<crate::math::constant_product::Fraction> {
        None
    }

    fn subscribe(&self, subscriber: &Arc<dyn Subscriber>);
}

/// Picks the paired token for single-hop pools.
pub(crate) fn other_token(
    token: Address,
    token0: Address,
    token1: Address,
    pool: Address,
) -> Result<Address, LiquidityPoolError> {
    if token == token0 {
        Ok(token1)
    } else if token == token1 {
        Ok(token0)
    } else {
        Err(LiquidityPoolError::TokenNotInPool { token, pool })
    }
}
