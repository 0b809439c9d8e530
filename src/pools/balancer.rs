// Balancer weighted pool.
//
// Token amounts are upscaled to 18 decimals through cached per-token
// scaling factors before the weighted math runs, then descaled with
// directional rounding on the way out.

use std::sync::{Arc, RwLock};

use ethers::types::{Address, H256};
use log::debug;
use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use serde::{Deserialize, Serialize};

use crate::errors::LiquidityPoolError;
use crate::evm::div_rounding_up;
use crate::math::weighted;

use super::publisher::{PoolStateMessage, Subscriber, SubscriberSet};
use super::{LiquidityPool, PoolSnapshot, PoolVariant};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalancerPoolState {
    pub block: u64,
    pub balances: Vec<BigInt>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalancerPoolExternalUpdate {
    pub block_number: u64,
    pub balances: Vec<BigInt>,
}

#[derive(Debug)]
pub struct BalancerWeightedPool {
    address: Address,
    pool_id: H256,
    vault: Address,
    tokens: Vec<Address>,
    normalized_weights: Vec<BigInt>,
    /// Plain 10^(18 - decimals) multipliers, cached per token.
    scaling_factors: Vec<BigInt>,
    /// Swap fee as an 18-decimal percentage.
    fee: BigInt,
    state: RwLock<Arc<BalancerPoolState>>,
    subscribers: SubscriberSet,
}

impl BalancerWeightedPool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        address: Address,
        pool_id: H256,
        vault: Address,
        tokens: Vec<Address>,
        normalized_weights: Vec<BigInt>,
        scaling_factors: Vec<BigInt>,
        fee: BigInt,
        state: BalancerPoolState,
    ) -> Self {
        assert_eq!(tokens.len(), normalized_weights.len());
        assert_eq!(tokens.len(), scaling_factors.len());
        assert_eq!(tokens.len(), state.balances.len());
        Self {
            address,
            pool_id,
            vault,
            tokens,
            normalized_weights,
            scaling_factors,
            fee,
            state: RwLock::new(Arc::new(state)),
            subscribers: SubscriberSet::new(),
        }
    }

    pub fn pool_id(&self) -> H256 {
        self.pool_id
    }

    pub fn vault(&self) -> Address {
        self.vault
    }

    pub fn state(&self) -> Arc<BalancerPoolState> {
        self.state.read().expect("pool state lock poisoned").clone()
    }

    fn resolve_state(
        &self,
        override_state: Option<&PoolSnapshot>,
    ) -> Result<Arc<BalancerPoolState>, LiquidityPoolError> {
        match override_state {
            None => Ok(self.state()),
            Some(PoolSnapshot::Weighted(state)) => Ok(Arc::new(state.clone())),
            Some(_) => Err(LiquidityPoolError::StateOverrideMismatch),
        }
    }

    fn token_index(&self, token: Address) -> Result<usize, LiquidityPoolError> {
        self.tokens
            .iter()
            .position(|candidate| *candidate == token)
            .ok_or(LiquidityPoolError::TokenNotInPool {
                token,
                pool: self.address,
            })
    }

    fn upscale(&self, amount: &BigInt, index: usize) -> BigInt {
        amount * &self.scaling_factors[index]
    }

    fn downscale_down(&self, amount: &BigInt, index: usize) -> BigInt {
        amount / &self.scaling_factors[index]
    }

    fn downscale_up(&self, amount: &BigInt, index: usize) -> Result<BigInt, LiquidityPoolError> {
        Ok(div_rounding_up(amount, &self.scaling_factors[index])?)
    }

    /// The pool's invariant over current balances, for join/exit limits.
    pub fn invariant(
        &self,
        override_state: Option<&PoolSnapshot>,
    ) -> Result<BigInt, LiquidityPoolError> {
        let state = self.resolve_state(override_state)?;
        let upscaled: Vec<BigInt> = state
            .balances
            .iter()
            .enumerate()
            .map(|(index, balance)| self.upscale(balance, index))
            .collect();
        Ok(weighted::calculate_invariant(&self.normalized_weights, &upscaled)?)
    }

    pub fn external_update(
        &self,
        update: &BalancerPoolExternalUpdate,
    ) -> Result<bool, LiquidityPoolError> {
        if update.balances.len() != self.tokens.len() {
            return Err(LiquidityPoolError::ExternalUpdateError {
                reason: format!(
                    "expected {} balances, got {}",
                    self.tokens.len(),
                    update.balances.len()
                ),
            });
        }
        let message = {
            let mut state = self.state.write().expect("pool state lock poisoned");
            if update.block_number < state.block {
                debug!(
                    "pool {:?}: dropping stale update at block {} (state at {})",
                    self.address, update.block_number, state.block
                );
                return Ok(false);
            }
            if update.balances == state.balances {
                return Ok(false);
            }
            let new_state = Arc::new(BalancerPoolState {
                block: update.block_number,
                balances: update.balances.clone(),
            });
            *state = new_state.clone();
            PoolStateMessage::new(self.address, PoolSnapshot::Weighted((*new_state).clone()))
        };
        self.subscribers.publish(&message);
        Ok(true)
    }
}

impl LiquidityPool for BalancerWeightedPool {
    fn address(&self) -> Address {
        self.address
    }

    fn variant(&self) -> PoolVariant {
        PoolVariant::BalancerWeighted
    }

    fn tokens(&self) -> Vec<Address> {
        self.tokens.clone()
    }

    fn update_block(&self) -> u64 {
        self.state().block
    }

    fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot::Weighted((*self.state()).clone())
    }

    fn calculate_tokens_out_from_tokens_in(
        &self,
        token_in: Address,
        amount_in: &BigInt,
        override_state: Option<&PoolSnapshot>,
    ) -> Result<BigInt, LiquidityPoolError> {
        if !amount_in.is_positive() {
            return Err(LiquidityPoolError::InvalidSwapInputAmount);
        }
        let state = self.resolve_state(override_state)?;
        let index_in = self.token_index(token_in)?;
        // single-hop: the other token of a two-token pool, or an explicit
        // pair for larger pools is not supported through the generic trait
        let index_out = self.pair_index(index_in)?;

        let net_in = weighted::subtract_swap_fee_amount(&self.upscale(amount_in, index_in), &self.fee)?;
        let out = weighted::calc_out_given_in(
            &self.upscale(&state.balances[index_in], index_in),
            &self.normalized_weights[index_in],
            &self.upscale(&state.balances[index_out], index_out),
            &self.normalized_weights[index_out],
            &net_in,
        )?;
        Ok(self.downscale_down(&out, index_out))
    }

    fn calculate_tokens_in_from_tokens_out(
        &self,
        token_out: Address,
        amount_out: &BigInt,
        override_state: Option<&PoolSnapshot>,
    ) -> Result<BigInt, LiquidityPoolError> {
        if !amount_out.is_positive() {
            return Err(LiquidityPoolError::InvalidSwapInputAmount);
        }
        let state = self.resolve_state(override_state)?;
        let index_out = self.token_index(token_out)?;
        let index_in = self.pair_index(index_out)?;

        let amount_in = weighted::calc_in_given_out(
            &self.upscale(&state.balances[index_in], index_in),
            &self.normalized_weights[index_in],
            &self.upscale(&state.balances[index_out], index_out),
            &self.normalized_weights[index_out],
            &self.upscale(amount_out, index_out),
        )?;
        let before_fee = self.downscale_up(&amount_in, index_in)?;
        Ok(weighted::add_swap_fee_amount(&before_fee, &self.fee)?)
    }

    fn subscribe(&self, subscriber: &Arc<dyn Subscriber>) {
        self.subscribers.subscribe(subscriber);
    }
}

impl BalancerWeightedPool {
    fn pair_index(&self, index: usize) -> Result<usize, LiquidityPoolError> {
        if self.tokens.len() != 2 {
            return Err(LiquidityPoolError::TokenNotInPool {
                token: Address::zero(),
                pool: self.address,
            });
        }
        Ok(1 - index)
    }

    /// Explicit-pair quote for pools holding more than two tokens.
    pub fn calculate_tokens_out_for_pair(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: &BigInt,
        override_state: Option<&PoolSnapshot>,
    ) -> Result<BigInt, LiquidityPoolError> {
        if !amount_in.is_positive() {
            return Err(LiquidityPoolError::InvalidSwapInputAmount);
        }
        let state = self.resolve_state(override_state)?;
        let index_in = self.token_index(token_in)?;
        let index_out = self.token_index(token_out)?;

        let net_in = weighted::subtract_swap_fee_amount(&self.upscale(amount_in, index_in), &self.fee)?;
        let out = weighted::calc_out_given_in(
            &self.upscale(&state.balances[index_in], index_in),
            &self.normalized_weights[index_in],
            &self.upscale(&state.balances[index_out], index_out),
            &self.normalized_weights[index_out],
            &net_in,
        )?;
        Ok(self.downscale_down(&out, index_out))
    }
}
