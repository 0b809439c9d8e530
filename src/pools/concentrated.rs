// Concentrated-liquidity (Uniswap V3/V4 style) pool with the tick-crossing
// swap loop.
//
// V4 pools differ from V3 only in carrying a hook contract; pools whose
// hooks intercept swap logic still compute a candidate result, then surface
// PossibleInaccurateResult so the caller decides whether to trust it.

use std::sync::{Arc, RwLock};

use ethers::types::Address;
use log::debug;
use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use serde::{Deserialize, Serialize};

use crate::errors::{EvmError, LiquidityPoolError};
use crate::math::swap_math::{compute_swap_step, get_sqrt_price_target};
use crate::math::tick_math::{
    sqrt_price_at_tick, tick_at_sqrt_price, MAX_SQRT_PRICE, MAX_TICK, MIN_SQRT_PRICE, MIN_TICK,
};

use super::hooks::{hook_flags, intercepts_swaps, HookFlag};
use super::liquidity_map::{LiquidityAtTick, LiquidityMap};
use super::publisher::{PoolStateMessage, Subscriber, SubscriberSet};
use super::{LiquidityPool, PoolSnapshot, PoolVariant};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniswapV3PoolState {
    pub block: u64,
    pub sqrt_price_x96: BigInt,
    pub tick: i32,
    pub liquidity: BigInt,
    pub liquidity_map: LiquidityMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct V3PoolExternalUpdate {
    pub block_number: u64,
    pub sqrt_price_x96: BigInt,
    pub tick: i32,
    pub liquidity: BigInt,
    /// Absolute per-tick liquidity values to apply on top of the current
    /// map, keyed by tick. A zero-gross entry clears the tick.
    pub tick_changes: Vec<(i32, LiquidityAtTick)>,
}

/// Result of a simulated swap: totals plus the candidate state.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcentratedSwapResult {
    pub amount_in: BigInt,
    pub amount_out: BigInt,
    pub sqrt_price_x96: BigInt,
    pub tick: i32,
    pub liquidity: BigInt,
    pub ticks_crossed: usize,
}

#[derive(Debug)]
pub struct UniswapV3Pool {
    address: Address,
    token0: Address,
    token1: Address,
    fee_pips: u32,
    protocol_fee_pips: Option<u32>,
    tick_spacing: i32,
    hooks: Vec<HookFlag>,
    state: RwLock<Arc<UniswapV3PoolState>>,
    subscribers: SubscriberSet,
}

impl UniswapV3Pool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        address: Address,
        token0: Address,
        token1: Address,
        fee_pips: u32,
        tick_spacing: i32,
        state: UniswapV3PoolState,
    ) -> Self {
        Self {
            address,
            token0,
            token1,
            fee_pips,
            protocol_fee_pips: None,
            tick_spacing,
            hooks: Vec::new(),
            state: RwLock::new(Arc::new(state)),
            subscribers: SubscriberSet::new(),
        }
    }

    /// A V4 pool is a V3 pool plus a hook address whose low bits encode the
    /// hook's permissions.
    #[allow(clippy::too_many_arguments)]
    pub fn new_v4(
        address: Address,
        token0: Address,
        token1: Address,
        fee_pips: u32,
        tick_spacing: i32,
        hook_address: Address,
        state: UniswapV3PoolState,
    ) -> Self {
        Self {
            address,
            token0,
            token1,
            fee_pips,
            protocol_fee_pips: None,
            tick_spacing,
            hooks: hook_flags(&hook_address),
            state: RwLock::new(Arc::new(state)),
            subscribers: SubscriberSet::new(),
        }
    }

    /// Records the protocol's share of collected fees. Informational only:
    /// the protocol fee is skimmed out of the LP fee on-chain and never
    /// changes the total fee charged to the swapper.
    pub fn with_protocol_fee(mut self, protocol_fee_pips: u32) -> Self {
        self.protocol_fee_pips = Some(protocol_fee_pips);
        self
    }

    pub fn protocol_fee_pips(&self) -> Option<u32> {
        self.protocol_fee_pips
    }

    pub fn token0(&self) -> Address {
        self.token0
    }

    pub fn token1(&self) -> Address {
        self.token1
    }

    pub fn fee_pips(&self) -> u32 {
        self.fee_pips
    }

    pub fn tick_spacing(&self) -> i32 {
        self.tick_spacing
    }

    pub fn hooks(&self) -> &[HookFlag] {
        &self.hooks
    }

    pub fn state(&self) -> Arc<UniswapV3PoolState> {
        self.state.read().expect("pool state lock poisoned").clone()
    }

    fn resolve_state(
        &self,
        override_state: Option<&PoolSnapshot>,
    ) -> Result<Arc<UniswapV3PoolState>, LiquidityPoolError> {
        match override_state {
            None => Ok(self.state()),
            Some(PoolSnapshot::Concentrated(state)) => Ok(Arc::new(state.clone())),
            Some(_) => Err(LiquidityPoolError::StateOverrideMismatch),
        }
    }

    /// Core tick-crossing loop. `amount_specified` is signed: negative for
    /// exact input, positive for exact output.
    fn swap(
        &self,
        state: &UniswapV3PoolState,
        zero_for_one: bool,
        amount_specified: &BigInt,
        sqrt_price_limit_x96: Option<&BigInt>,
    ) -> Result<ConcentratedSwapResult, LiquidityPoolError> {
        if amount_specified.is_zero() {
            return Err(LiquidityPoolError::InvalidSwapInputAmount);
        }

        let user_limited = sqrt_price_limit_x96.is_some();
        let limit = match sqrt_price_limit_x96 {
            Some(limit) => limit.clone(),
            None if zero_for_one => &*MIN_SQRT_PRICE + 1u8,
            None => &*MAX_SQRT_PRICE - 1u8,
        };

        // the limit must lie between the current price and the usable bound
        let limit_valid = if zero_for_one {
            limit < state.sqrt_price_x96 && limit > *MIN_SQRT_PRICE
        } else {
            limit > state.sqrt_price_x96 && limit < *MAX_SQRT_PRICE
        };
        if !limit_valid {
            return Err(EvmError::InvalidSqrtPrice.into());
        }

        let exact_input = amount_specified.is_negative();
        let mut amount_remaining = amount_specified.clone();
        let mut sqrt_price = state.sqrt_price_x96.clone();
        let mut tick = state.tick;
        let mut liquidity = state.liquidity.clone();

        let mut total_in = BigInt::zero();
        let mut total_out = BigInt::zero();
        let mut ticks_crossed = 0usize;

        while !amount_remaining.is_zero() && sqrt_price != limit {
            let sqrt_price_start = sqrt_price.clone();

            let (next_tick, initialized) = state
                .liquidity_map
                .next_initialized_tick_within_one_word(tick, self.tick_spacing, zero_for_one)?;
            let next_tick = next_tick.clamp(MIN_TICK, MAX_TICK);
            let sqrt_price_next_tick = sqrt_price_at_tick(next_tick)?;

            let target = get_sqrt_price_target(zero_for_one, &sqrt_price_next_tick, &limit);
            let step = compute_swap_step(
                &sqrt_price,
                &target,
                &liquidity,
                &amount_remaining,
                self.fee_pips,
            )
            .map_err(|e| match e {
                // overflow while consuming a range means the pool cannot
                // deliver the requested amount
                EvmError::MulDivOverflow | EvmError::PriceOverflow | EvmError::Uint160Overflow => {
                    EvmError::NotEnoughLiquidity
                }
                other => other,
            })?;

            sqrt_price = step.sqrt_price_next_x96.clone();
            let gross_in = &step.amount_in + &step.fee_amount;
            if exact_input {
                amount_remaining += &gross_in;
                debug_assert!(!amount_remaining.is_positive());
            } else {
                amount_remaining -= &step.amount_out;
                debug_assert!(!amount_remaining.is_negative());
            }
            total_in += gross_in;
            total_out += &step.amount_out;

            if sqrt_price == sqrt_price_next_tick {
                // reached the boundary tick
                if initialized {
                    let net = state
                        .liquidity_map
                        .liquidity_at_tick(next_tick)
                        .map(|info| info.liquidity_net)
                        .unwrap_or(0);
                    let net = BigInt::from(net);
                    liquidity += if zero_for_one { -net } else { net };
                    if liquidity.is_negative() {
                        return Err(EvmError::NotEnoughLiquidity.into());
                    }
                    ticks_crossed += 1;
                }
                tick = if zero_for_one { next_tick - 1 } else { next_tick };
            } else if sqrt_price != sqrt_price_start {
                tick = tick_at_sqrt_price(&sqrt_price)?;
            }
        }

        if !amount_remaining.is_zero() && !user_limited {
            return Err(LiquidityPoolError::IncompleteSwap {
                amount_in: total_in,
                amount_out: total_out,
            });
        }

        Ok(ConcentratedSwapResult {
            amount_in: total_in,
            amount_out: total_out,
            sqrt_price_x96: sqrt_price,
            tick,
            liquidity,
            ticks_crossed,
        })
    }

    fn guard_hooks(
        &self,
        result: ConcentratedSwapResult,
    ) -> Result<ConcentratedSwapResult, LiquidityPoolError> {
        if intercepts_swaps(&self.hooks) {
            return Err(LiquidityPoolError::PossibleInaccurateResult {
                amount_in: result.amount_in,
                amount_out: result.amount_out,
                hooks: self.hooks.clone(),
            });
        }
        Ok(result)
    }

    /// Exact-input simulation returning totals plus the candidate state.
    pub fn simulate_exact_input_swap(
        &self,
        token_in: Address,
        amount_in: &BigInt,
        sqrt_price_limit_x96: Option<&BigInt>,
        override_state: Option<&PoolSnapshot>,
    ) -> Result<(ConcentratedSwapResult, UniswapV3PoolState), LiquidityPoolError> {
        if !amount_in.is_positive() {
            return Err(LiquidityPoolError::InvalidSwapInputAmount);
        }
        let state = self.resolve_state(override_state)?;
        let zero_for_one = self.direction_for_input(token_in)?;
        let result = self.swap(&state, zero_for_one, &-amount_in, sqrt_price_limit_x96)?;
        let result = self.guard_hooks(result)?;
        let new_state = UniswapV3PoolState {
            block: state.block,
            sqrt_price_x96: result.sqrt_price_x96.clone(),
            tick: result.tick,
            liquidity: result.liquidity.clone(),
            liquidity_map: state.liquidity_map.clone(),
        };
        Ok((result, new_state))
    }

    /// Exact-output simulation.
    pub fn simulate_exact_output_swap(
        &self,
        token_out: Address,
        amount_out: &BigInt,
        sqrt_price_limit_x96: Option<&BigInt>,
        override_state: Option<&PoolSnapshot>,
    ) -> Result<(ConcentratedSwapResult, UniswapV3PoolState), LiquidityPoolError> {
        if !amount_out.is_positive() {
            return Err(LiquidityPoolError::InvalidSwapInputAmount);
        }
        let state = self.resolve_state(override_state)?;
        let zero_for_one = self.direction_for_output(token_out)?;
        let result = self.swap(&state, zero_for_one, amount_out, sqrt_price_limit_x96)?;
        let result = self.guard_hooks(result)?;
        let new_state = UniswapV3PoolState {
            block: state.block,
            sqrt_price_x96: result.sqrt_price_x96.clone(),
            tick: result.tick,
            liquidity: result.liquidity.clone(),
            liquidity_map: state.liquidity_map.clone(),
        };
        Ok((result, new_state))
    }

    fn direction_for_input(&self, token_in: Address) -> Result<bool, LiquidityPoolError> {
        if token_in == self.token0 {
            Ok(true)
        } else if token_in == self.token1 {
            Ok(false)
        } else {
            Err(LiquidityPoolError::TokenNotInPool {
                token: token_in,
                pool: self.address,
            })
        }
    }

    fn direction_for_output(&self, token_out: Address) -> Result<bool, LiquidityPoolError> {
        // taking token1 out pushes the price down (zero for one)
        if token_out == self.token1 {
            Ok(true)
        } else if token_out == self.token0 {
            Ok(false)
        } else {
            Err(LiquidityPoolError::TokenNotInPool {
                token: token_out,
                pool: self.address,
            })
        }
    }

    /// Applies an external snapshot per the ordering rules: stale blocks are
    /// dropped silently, tick changes land in the liquidity map (surfacing
    /// missing sparse words), and subscribers hear about real changes.
    pub fn external_update(
        &self,
        update: &V3PoolExternalUpdate,
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

            let mut liquidity_map = state.liquidity_map.clone();
            for (tick, liquidity) in &update.tick_changes {
                liquidity_map.set_tick(*tick, self.tick_spacing, *liquidity)?;
            }

            let new_state = UniswapV3PoolState {
                block: update.block_number,
                sqrt_price_x96: update.sqrt_price_x96.clone(),
                tick: update.tick,
                liquidity: update.liquidity.clone(),
                liquidity_map,
            };
            if **state == new_state {
                return Ok(false);
            }
            let new_state = Arc::new(new_state);
            *state = new_state.clone();
            PoolStateMessage::new(self.address, PoolSnapshot::Concentrated((*new_state).clone()))
        };
        self.subscribers.publish(&message);
        Ok(true)
    }
}

impl LiquidityPool for UniswapV3Pool {
    fn address(&self) -> Address {
        self.address
    }

    fn variant(&self) -> PoolVariant {
        if self.hooks.is_empty() {
            PoolVariant::UniswapV3
        } else {
            PoolVariant::UniswapV4
        }
    }

    fn tokens(&self) -> Vec<Address> {
        vec![self.token0, self.token1]
    }

    fn update_block(&self) -> u64 {
        self.state().block
    }

    fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot::Concentrated((*self.state()).clone())
    }

    fn calculate_tokens_out_from_tokens_in(
        &self,
        token_in: Address,
        amount_in: &BigInt,
        override_state: Option<&PoolSnapshot>,
    ) -> Result<BigInt, LiquidityPoolError> {
        let (result, _) = self.simulate_exact_input_swap(token_in, amount_in, None, override_state)?;
        Ok(result.amount_out)
    }

    fn calculate_tokens_in_from_tokens_out(
        &self,
        token_out: Address,
        amount_out: &BigInt,
        override_state: Option<&PoolSnapshot>,
    ) -> Result<BigInt, LiquidityPoolError> {
        let (result, _) =
            self.simulate_exact_output_swap(token_out, amount_out, None, override_state)?;
        Ok(result.amount_in)
    }

    fn subscribe(&self, subscriber: &Arc<dyn Subscriber>) {
        self.subscribers.subscribe(subscriber);
    }
}
