// Constant-product (Uniswap V2 style) liquidity pool.

use std::sync::{Arc, RwLock};

use ethers::types::Address;
use log::debug;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::errors::LiquidityPoolError;
use crate::math::constant_product;

use super::publisher::{PoolStateMessage, Subscriber, SubscriberSet};
use super::{other_token, LiquidityPool, PoolSnapshot, PoolVariant};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniswapV2PoolState {
    pub block: u64,
    pub reserves_token0: BigInt,
    pub reserves_token1: BigInt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct V2PoolExternalUpdate {
    pub block_number: u64,
    pub reserves_token0: BigInt,
    pub reserves_token1: BigInt,
}

/// Fee as a fraction, e.g. 3/1000 for the canonical 0.3%. Some forks charge
/// different fees per input token, so each direction carries its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolFee {
    pub num: BigInt,
    pub den: BigInt,
}

impl PoolFee {
    pub fn new(num: u64, den: u64) -> Self {
        Self {
            num: BigInt::from(num),
            den: BigInt::from(den),
        }
    }
}

#[derive(Debug)]
pub struct UniswapV2Pool {
    address: Address,
    token0: Address,
    token1: Address,
    fee_token0: PoolFee,
    fee_token1: PoolFee,
    state: RwLock<Arc<UniswapV2PoolState>>,
    subscribers: SubscriberSet,
}

impl UniswapV2Pool {
    pub fn new(
        address: Address,
        token0: Address,
        token1: Address,
        fee: PoolFee,
        state: UniswapV2PoolState,
    ) -> Self {
        Self::with_split_fees(address, token0, token1, fee.clone(), fee, state)
    }

    pub fn with_split_fees(
        address: Address,
        token0: Address,
        token1: Address,
        fee_token0: PoolFee,
        fee_token1: PoolFee,
        state: UniswapV2PoolState,
    ) -> Self {
        Self {
            address,
            token0,
            token1,
            fee_token0,
            fee_token1,
            state: RwLock::new(Arc::new(state)),
            subscribers: SubscriberSet::new(),
        }
    }

    pub fn token0(&self) -> Address {
        self.token0
    }

    pub fn token1(&self) -> Address {
        self.token1
    }

    pub fn state(&self) -> Arc<UniswapV2PoolState> {
        self.state.read().expect("pool state lock poisoned").clone()
    }

    fn resolve_state(
        &self,
        override_state: Option<&PoolSnapshot>,
    ) -> Result<Arc<UniswapV2PoolState>, LiquidityPoolError> {
        match override_state {
            None => Ok(self.state()),
            Some(PoolSnapshot::ConstantProduct(state)) => Ok(Arc::new(state.clone())),
            Some(_) => Err(LiquidityPoolError::StateOverrideMismatch),
        }
    }

    fn oriented(
        &self,
        token_in: Address,
        state: &UniswapV2PoolState,
    ) -> Result<(BigInt, BigInt, &PoolFee), LiquidityPoolError> {
        if token_in == self.token0 {
            Ok((
                state.reserves_token0.clone(),
                state.reserves_token1.clone(),
                &self.fee_token0,
            ))
        } else if token_in == self.token1 {
            Ok((
                state.reserves_token1.clone(),
                state.reserves_token0.clone(),
                &self.fee_token1,
            ))
        } else {
            Err(LiquidityPoolError::TokenNotInPool {
                token: token_in,
                pool: self.address,
            })
        }
    }

    /// Exact-input swap returning the output amount and the candidate state
    /// after the trade. The pool itself is not mutated.
    pub fn simulate_exact_input_swap(
        &self,
        token_in: Address,
        amount_in: &BigInt,
        override_state: Option<&PoolSnapshot>,
    ) -> Result<(BigInt, UniswapV2PoolState), LiquidityPoolError> {
        let state = self.resolve_state(override_state)?;
        let (reserves_in, reserves_out, fee) = self.oriented(token_in, &state)?;
        let amount_out =
            constant_product::out_given_in(amount_in, &reserves_in, &reserves_out, &fee.num, &fee.den)?;

        let new_state = if token_in == self.token0 {
            UniswapV2PoolState {
                block: state.block,
                reserves_token0: &state.reserves_token0 + amount_in,
                reserves_token1: &state.reserves_token1 - &amount_out,
            }
        } else {
            UniswapV2PoolState {
                block: state.block,
                reserves_token0: &state.reserves_token0 - &amount_out,
                reserves_token1: &state.reserves_token1 + amount_in,
            }
        };
        Ok((amount_out, new_state))
    }

    /// d(out)/d(in) at `amount_in`, for gradient-based solvers.
    pub fn swap_derivative(
        &self,
        token_in: Address,
        amount_in: &BigInt,
        override_state: Option<&PoolSnapshot>,
    ) -> Result<constant_product::Fraction, LiquidityPoolError> {
        let state = self.resolve_state(override_state)?;
        let (reserves_in, reserves_out, fee) = self.oriented(token_in, &state)?;
        Ok(constant_product::swap_derivative(
            amount_in,
            &reserves_in,
            &reserves_out,
            &fee.num,
            &fee.den,
        ))
    }

    /// Applies an external reserve snapshot. Updates carrying a block number
    /// lower than the current state are dropped. Returns whether the state
    /// changed; subscribers are notified on change.
    pub fn external_update(
        &self,
        update: &V2PoolExternalUpdate,
    ) -> Result<bool, LiquidityPoolError> {
        let message = {
            let mut state = self.state.write().expect("pool state lock poisoned");
            if update.block_number < state.block {
                debug!(
                    "pool {:?}: dropping stale update at block {} (state at {})",
                    self.address, update.block_number, state.block
                );
                return Ok(false);
            }
            if update.reserves_token0 == state.reserves_token0
                && update.reserves_token1 == state.reserves_token1
            {
                return Ok(false);
            }
            let new_state = Arc::new(UniswapV2PoolState {
                block: update.block_number,
                reserves_token0: update.reserves_token0.clone(),
                reserves_token1: update.reserves_token1.clone(),
            });
            *state = new_state.clone();
            PoolStateMessage::new(self.address, PoolSnapshot::ConstantProduct((*new_state).clone()))
        };
        // fan-out happens outside the write lock
        self.subscribers.publish(&message);
        Ok(true)
    }
}

impl LiquidityPool for UniswapV2Pool {
    fn address(&self) -> Address {
        self.address
    }

    fn variant(&self) -> PoolVariant {
        PoolVariant::UniswapV2
    }

    fn tokens(&self) -> Vec<Address> {
        vec![self.token0, self.token1]
    }

    fn update_block(&self) -> u64 {
        self.state().block
    }

    fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot::ConstantProduct((*self.state()).clone())
    }

    fn calculate_tokens_out_from_tokens_in(
        &self,
        token_in: Address,
        amount_in: &BigInt,
        override_state: Option<&PoolSnapshot>,
    ) -> Result<BigInt, LiquidityPoolError> {
        let state = self.resolve_state(override_state)?;
        let (reserves_in, reserves_out, fee) = self.oriented(token_in, &state)?;
        constant_product::out_given_in(amount_in, &reserves_in, &reserves_out, &fee.num, &fee.den)
    }

    fn calculate_tokens_in_from_tokens_out(
        &self,
        token_out: Address,
        amount_out: &BigInt,
        override_state: Option<&PoolSnapshot>,
    ) -> Result<BigInt, LiquidityPoolError> {
        let state = self.resolve_state(override_state)?;
        let token_in = other_token(token_out, self.token0, self.token1, self.address)?;
        let (reserves_in, reserves_out, fee) = self.oriented(token_in, &state)?;
        constant_product::in_given_out(amount_out, &reserves_in, &reserves_out, &fee.num, &fee.den)
    }

    fn swap_derivative(
        &self,
        token_in: Address,
        amount_in: &BigInt,
        override_state: Option<&PoolSnapshot>,
    ) -> Option<constant_product::Fraction> {
        UniswapV2Pool::swap_derivative(self, token_in, amount_in, override_state).ok()
    }

    fn subscribe(&self, subscriber: &Arc<dyn Subscriber>) {
        self.subscribers.subscribe(subscriber);
    }
}
