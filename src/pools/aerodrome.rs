// Aerodrome (Solidly-style) pools. The volatile branch is plain x*y=k with
// the fee floored off the input first, exactly as the pair contract does;
// the stable branch solves the x^3*y + x*y^3 invariant over 18-decimal
// normalized balances.

use std::sync::{Arc, RwLock};

use ethers::types::Address;
use log::debug;
use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use serde::{Deserialize, Serialize};

use crate::errors::{EvmError, LiquidityPoolError};
use crate::math::log_exp::ONE_18;
use crate::math::stable;

use super::publisher::{PoolStateMessage, Subscriber, SubscriberSet};
use super::{other_token, LiquidityPool, PoolSnapshot, PoolVariant};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AerodromePoolState {
    pub block: u64,
    pub reserves_token0: BigInt,
    pub reserves_token1: BigInt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AerodromePoolExternalUpdate {
    pub block_number: u64,
    pub reserves_token0: BigInt,
    pub reserves_token1: BigInt,
}

#[derive(Debug)]
pub struct AerodromePool {
    address: Address,
    token0: Address,
    token1: Address,
    decimals0: u8,
    decimals1: u8,
    stable: bool,
    fee_bps: u32,
    max_iterations: u32,
    state: RwLock<Arc<AerodromePoolState>>,
    subscribers: SubscriberSet,
}

fn pow10(decimals: u8) -> BigInt {
    BigInt::from(10u8).pow(decimals as u32)
}

impl AerodromePool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        address: Address,
        token0: Address,
        token1: Address,
        decimals0: u8,
        decimals1: u8,
        stable: bool,
        fee_bps: u32,
        state: AerodromePoolState,
    ) -> Self {
        Self {
            address,
            token0,
            token1,
            decimals0,
            decimals1,
            stable,
            fee_bps,
            max_iterations: stable::DEFAULT_MAX_ITERATIONS,
            state: RwLock::new(Arc::new(state)),
            subscribers: SubscriberSet::new(),
        }
    }

    pub fn with_iteration_cap(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn is_stable(&self) -> bool {
        self.stable
    }

    pub fn state(&self) -> Arc<AerodromePoolState> {
        self.state.read().expect("pool state lock poisoned").clone()
    }

    fn resolve_state(
        &self,
        override_state: Option<&PoolSnapshot>,
    ) -> Result<Arc<AerodromePoolState>, LiquidityPoolError> {
        match override_state {
            None => Ok(self.state()),
            Some(PoolSnapshot::Aerodrome(state)) => Ok(Arc::new(state.clone())),
            Some(_) => Err(LiquidityPoolError::StateOverrideMismatch),
        }
    }

    fn oriented(
        &self,
        token_in: Address,
        state: &AerodromePoolState,
    ) -> Result<(BigInt, BigInt, BigInt, BigInt), LiquidityPoolError> {
        if token_in == self.token0 {
            Ok((
                state.reserves_token0.clone(),
                state.reserves_token1.clone(),
                pow10(self.decimals0),
                pow10(self.decimals1),
            ))
        } else if token_in == self.token1 {
            Ok((
                state.reserves_token1.clone(),
                state.reserves_token0.clone(),
                pow10(self.decimals1),
                pow10(self.decimals0),
            ))
        } else {
            Err(LiquidityPoolError::TokenNotInPool {
                token: token_in,
                pool: self.address,
            })
        }
    }

    /// getAmountOut: the fee is floored off the input first, then the
    /// branch-specific curve applies.
    fn amount_out(
        &self,
        token_in: Address,
        amount_in: &BigInt,
        state: &AerodromePoolState,
    ) -> Result<BigInt, LiquidityPoolError> {
        if !amount_in.is_positive() {
            return Err(LiquidityPoolError::InvalidSwapInputAmount);
        }
        let (reserve_in, reserve_out, dec_in, dec_out) = self.oriented(token_in, state)?;
        if reserve_in.is_zero() || reserve_out.is_zero() {
            return Err(EvmError::NotEnoughLiquidity.into());
        }

        let amount_in = amount_in - (amount_in * self.fee_bps) / 10_000u32;

        if self.stable {
            let normalized_in = (&amount_in * &*ONE_18) / &dec_in;
            let normalized_reserve_in = (&reserve_in * &*ONE_18) / &dec_in;
            let normalized_reserve_out = (&reserve_out * &*ONE_18) / &dec_out;
            let out = stable::out_given_in_normalized(
                &normalized_in,
                &normalized_reserve_in,
                &normalized_reserve_out,
                self.max_iterations,
            )?;
            Ok((out * &dec_out) / &*ONE_18)
        } else {
            Ok((&amount_in * &reserve_out) / (&reserve_in + &amount_in))
        }
    }

    pub fn external_update(
        &self,
        update: &AerodromePoolExternalUpdate,
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
            let new_state = Arc::new(AerodromePoolState {
                block: update.block_number,
                reserves_token0: update.reserves_token0.clone(),
                reserves_token1: update.reserves_token1.clone(),
            });
            *state = new_state.clone();
            PoolStateMessage::new(self.address, PoolSnapshot::Aerodrome((*new_state).clone()))
        };
        self.subscribers.publish(&message);
        Ok(true)
    }
}

impl LiquidityPool for AerodromePool {
    fn address(&self) -> Address {
        self.address
    }

    fn variant(&self) -> PoolVariant {
        if self.stable {
            PoolVariant::AerodromeStable
        } else {
            PoolVariant::AerodromeVolatile
        }
    }

    fn tokens(&self) -> Vec<Address> {
        vec![self.token0, self.token1]
    }

    fn update_block(&self) -> u64 {
        self.state().block
    }

    fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot::Aerodrome((*self.state()).clone())
    }

    fn calculate_tokens_out_from_tokens_in(
        &self,
        token_in: Address,
        amount_in: &BigInt,
        override_state: Option<&PoolSnapshot>,
    ) -> Result<BigInt, LiquidityPoolError> {
        let state = self.resolve_state(override_state)?;
        self.amount_out(token_in, amount_in, &state)
    }

    /// The pair contract has no inverse quote; bisect the forward quote
    /// until the output covers the request.
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
        let token_in = other_token(token_out, self.token0, self.token1, self.address)?;
        let (reserve_in, reserve_out, _, _) = self.oriented(token_in, &state)?;
        if amount_out >= &reserve_out {
            return Err(EvmError::NotEnoughLiquidity.into());
        }

        // exponential bracket, then bisection on the forward quote
        let input_cap = &reserve_in * &reserve_out * 100u8;
        let mut hi = BigInt::from(1u8);
        loop {
            let out = self.amount_out(token_in, &hi, &state)?;
            if out >= *amount_out {
                break;
            }
            hi = &hi * 2u8;
            if hi > input_cap {
                return Err(EvmError::NotEnoughLiquidity.into());
            }
        }
        let mut lo = BigInt::zero();
        while &hi - &lo > BigInt::from(1u8) {
            let mid = (&hi + &lo) / 2u8;
            let out = self.amount_out(token_in, &mid, &state)?;
            if out >= *amount_out {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        Ok(hi)
    }

    fn subscribe(&self, subscriber: &Arc<dyn Subscriber>) {
        self.subscribers.subscribe(subscriber);
    }
}
