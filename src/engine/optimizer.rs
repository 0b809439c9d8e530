// Cycle arbitrage solver.
//
// Given pools forming a cycle in one token, the solver maximizes
// profit(x) = f_{n-1}(...f_0(x)...) - x over x in [1, max_input]. The
// default mode brackets coarsely off the constraining reserve and refines
// with Brent's method to one-wei tolerance; gradient mode bisects the
// composite derivative, which closes analytically for pure constant-product
// cycles and falls back to central differences elsewhere.

use std::collections::HashMap;
use std::sync::Arc;

use ethers::types::Address;
use log::debug;
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

use crate::errors::{ArbitrageError, LiquidityPoolError};
use crate::pools::{LiquidityPool, PoolSnapshot, PoolVariant};

use super::CancelToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverMode {
    /// Bracket + Brent refinement on the profit function.
    Bounded,
    /// Root-find the composite derivative; analytical for pure V2 cycles.
    Gradient,
}

#[derive(Clone)]
pub struct ArbitrageCycle {
    pub pools: Vec<Arc<dyn LiquidityPool>>,
    /// The token the cycle starts and ends in.
    pub input_token: Address,
    pub max_input: Option<BigInt>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbitrageSolution {
    pub input: BigInt,
    pub profit: BigInt,
    /// (amount_in, amount_out) per pool along the cycle.
    pub per_pool_amounts: Vec<(BigInt, BigInt)>,
}

pub struct ArbitrageSolver {
    cycle: ArbitrageCycle,
    /// Token sequence along the cycle; tokens[0] is the input token.
    tokens: Vec<Address>,
    overrides: HashMap<Address, PoolSnapshot>,
}

impl ArbitrageSolver {
    /// Validates the cycle: each pool must hold the token produced by the
    /// previous hop, and the last hop must return to the input token.
    pub fn new(cycle: ArbitrageCycle) -> Result<Self, ArbitrageError> {
        if cycle.pools.len() < 2 {
            return Err(ArbitrageError::InvalidSwapPath);
        }
        let mut tokens = vec![cycle.input_token];
        for pool in &cycle.pools {
            let held = pool.tokens();
            let current = *tokens.last().expect("token chain is never empty");
            if !held.contains(&current) {
                return Err(ArbitrageError::InvalidSwapPath);
            }
            let next = held
                .iter()
                .find(|token| **token != current)
                .copied()
                .ok_or(ArbitrageError::InvalidSwapPath)?;
            tokens.push(next);
        }
        if *tokens.last().expect("token chain is never empty") != cycle.input_token {
            return Err(ArbitrageError::InvalidSwapPath);
        }
        Ok(Self {
            cycle,
            tokens,
            overrides: HashMap::new(),
        })
    }

    /// Installs per-pool state overrides; simulations never mutate the
    /// underlying pools either way.
    pub fn with_overrides(mut self, overrides: HashMap<Address, PoolSnapshot>) -> Self {
        self.overrides = overrides;
        self
    }

    fn override_for(&self, pool: &Arc<dyn LiquidityPool>) -> Option<&PoolSnapshot> {
        self.overrides.get(&pool.address())
    }

    /// Runs the full cycle for a given input, collecting per-pool legs.
    fn run_cycle(&self, input: &BigInt) -> Result<Vec<(BigInt, BigInt)>, LiquidityPoolError> {
        let mut legs = Vec::with_capacity(self.cycle.pools.len());
        let mut amount = input.clone();
        for (position, pool) in self.cycle.pools.iter().enumerate() {
            let token_in = self.tokens[position];
            let amount_out = pool.calculate_tokens_out_from_tokens_in(
                token_in,
                &amount,
                self.override_for(pool),
            )?;
            legs.push((amount.clone(), amount_out.clone()));
            amount = amount_out;
        }
        Ok(legs)
    }

    /// profit(x); swaps that fail (exhausted liquidity and the like) count
    /// as no result so the search can retreat.
    fn profit(&self, input: &BigInt) -> Option<BigInt> {
        if !input.is_positive() {
            return None;
        }
        let legs = self.run_cycle(input).ok()?;
        let output = &legs.last()?.1;
        Some(output - input)
    }

    fn profit_or_min(&self, input: &BigInt) -> BigInt {
        self.profit(input).unwrap_or_else(|| -input.clone())
    }

    /// A coarse scale for the search: the constraining (smallest) input-side
    /// reserve along the cycle.
    fn constraining_reserve(&self) -> Result<BigInt, ArbitrageError> {
        let mut smallest: Option<BigInt> = None;
        for (position, pool) in self.cycle.pools.iter().enumerate() {
            let token_in = self.tokens[position];
            if let Some(reserve) = reserve_hint(pool, token_in, self.override_for(pool)) {
                if reserve.is_positive() {
                    smallest = Some(match smallest {
                        Some(existing) if existing <= reserve => existing,
                        _ => reserve,
                    });
                }
            }
        }
        smallest.ok_or(ArbitrageError::NoLiquidity)
    }

    /// Finds the profit-maximizing input. NoSolverSolution when no input is
    /// profitable.
    pub fn solve(
        &self,
        mode: SolverMode,
        cancel: Option<&CancelToken>,
    ) -> Result<ArbitrageSolution, ArbitrageError> {
        let reserve = self.constraining_reserve()?;
        let max_input = self
            .cycle
            .max_input
            .clone()
            .unwrap_or_else(|| &reserve / 2u8);
        if !max_input.is_positive() {
            return Err(ArbitrageError::NoSolverSolution);
        }

        let best = match mode {
            SolverMode::Bounded => self.solve_bounded(&reserve, &max_input, cancel)?,
            SolverMode::Gradient => self.solve_gradient(&max_input, cancel)?,
        };

        let best = self.polish(best, &max_input, cancel)?;
        let profit = self.profit(&best).unwrap_or_else(BigInt::zero);
        if !profit.is_positive() {
            debug!("cycle maximum is non-profitable: {profit}");
            return Err(ArbitrageError::NoSolverSolution);
        }
        let per_pool_amounts = self.run_cycle(&best).map_err(ArbitrageError::Pool)?;
        Ok(ArbitrageSolution {
            input: best,
            profit,
            per_pool_amounts,
        })
    }

    /// Bracket at [0.001 R, 0.01 R], expand while the profit still grows,
    /// then Brent to one-wei tolerance.
    fn solve_bounded(
        &self,
        reserve: &BigInt,
        max_input: &BigInt,
        cancel: Option<&CancelToken>,
    ) -> Result<BigInt, ArbitrageError> {
        let mut left = (reserve / 1000u32).max(BigInt::from(1u8));
        let mut right = (reserve / 100u32).max(BigInt::from(2u8)).min(max_input.clone());

        // push the right edge out while profit keeps improving
        let mut best_profit = self.profit_or_min(&right);
        for _ in 0..64 {
            check_cancel(cancel)?;
            if right >= *max_input {
                break;
            }
            let candidate = (&right * 2u8).min(max_input.clone());
            let candidate_profit = self.profit_or_min(&candidate);
            if candidate_profit > best_profit {
                left = right.clone();
                best_profit = candidate_profit;
                right = candidate;
            } else {
                right = candidate;
                break;
            }
        }
        if left >= right {
            left = BigInt::from(1u8);
        }

        self.brent_maximize(&left, &right, cancel)
    }

    /// Brent's method (parabolic interpolation with golden-section
    /// fallback), xatol = 1 wei.
    fn brent_maximize(
        &self,
        lower: &BigInt,
        upper: &BigInt,
        cancel: Option<&CancelToken>,
    ) -> Result<BigInt, ArbitrageError> {
        const GOLDEN: f64 = 0.381_966_011_250_105;
        let mut a = lower.to_f64().unwrap_or(1.0);
        let mut b = upper.to_f64().unwrap_or(f64::MAX);
        if b <= a {
            return Ok(lower.clone());
        }

        let eval = |x: f64| -> f64 {
            let input = BigInt::from(x.max(1.0) as i128);
            self.profit_or_min(&input).to_f64().unwrap_or(f64::MIN)
        };

        let mut x = a + GOLDEN * (b - a);
        let mut w = x;
        let mut v = x;
        let mut fx = eval(x);
        let mut fw = fx;
        let mut fv = fx;
        let mut d: f64 = 0.0;
        let mut e: f64 = 0.0;

        for _ in 0..200 {
            check_cancel(cancel)?;
            let midpoint = 0.5 * (a + b);
            let tolerance = 1.0; // xatol: one wei
            if (x - midpoint).abs() + 0.5 * (b - a) <= 2.0 * tolerance {
                break;
            }

            let mut use_golden = true;
            if e.abs() > tolerance {
                // fit a parabola through (v, w, x)
                let r = (x - w) * (fx - fv);
                let q = (x - v) * (fx - fw);
                let mut p = (x - v) * q - (x - w) * r;
                let mut q2 = 2.0 * (q - r);
                if q2 > 0.0 {
                    p = -p;
                }
                q2 = q2.abs();
                if p.abs() < (0.5 * q2 * e).abs() && p > q2 * (a - x) && p < q2 * (b - x) {
                    e = d;
                    d = p / q2;
                    use_golden = false;
                }
            }
            if use_golden {
                e = if x < midpoint { b - x } else { a - x };
                d = GOLDEN * e;
            }

            let u = if d.abs() >= tolerance {
                x + d
            } else {
                x + tolerance.copysign(d)
            };
            let fu = eval(u);

            if fu > fx {
                if u < x {
                    b = x;
                } else {
                    a = x;
                }
                v = w;
                fv = fw;
                w = x;
                fw = fx;
                x = u;
                fx = fu;
            } else {
                if u < x {
                    a = u;
                } else {
                    b = u;
                }
                if fu > fw || w == x {
                    v = w;
                    fv = fw;
                    w = u;
                    fw = fu;
                } else if fu > fv || v == x || v == w {
                    v = u;
                    fv = fu;
                }
            }
        }

        Ok(BigInt::from(x.max(1.0) as i128))
    }

    /// Derivative of the composed cycle at `input`, as a float. Uses the
    /// analytical chain rule when every pool closes one; otherwise central
    /// finite differences with step input/1000.
    fn cycle_derivative(&self, input: &BigInt) -> Option<f64> {
        let analytic = self
            .cycle
            .pools
            .iter()
            .all(|pool| pool.variant() == PoolVariant::UniswapV2);

        if analytic {
            let legs = self.run_cycle(input).ok()?;
            let mut derivative = 1.0f64;
            for (position, pool) in self.cycle.pools.iter().enumerate() {
                let fraction = pool.swap_derivative(
                    self.tokens[position],
                    &legs[position].0,
                    self.override_for(pool),
                )?;
                derivative *= fraction.as_f64();
            }
            return Some(derivative);
        }

        let step = (input / 1000u32).max(BigInt::from(1u8));
        let high = self.profit(&(input + &step))?;
        let low_point = (input - &step).max(BigInt::from(1u8));
        let low = self.profit(&low_point)?;
        let delta = (&high - &low).to_f64()?;
        let span = (input + &step - &low_point).to_f64()?;
        // profit' = out' - 1; re-add the 1 to express d(out)/d(in)
        Some(delta / span + 1.0)
    }

    /// Bisects d(out)/d(in) = 1 over [1, max_input]; the derivative of a
    /// composed AMM cycle is monotone decreasing.
    fn solve_gradient(
        &self,
        max_input: &BigInt,
        cancel: Option<&CancelToken>,
    ) -> Result<BigInt, ArbitrageError> {
        // start far enough from zero that integer truncation cannot flatten
        // the finite-difference slope
        let lo_start = (max_input / 1_000_000u32).max(BigInt::from(1u8));
        let derivative_at_lo = self.cycle_derivative(&lo_start).ok_or_else(|| {
            ArbitrageError::ArbCalculationError("derivative unavailable at lower bound".to_string())
        })?;
        if derivative_at_lo <= 1.0 {
            // unprofitable at the margin already
            return Err(ArbitrageError::NoSolverSolution);
        }

        let mut lo = lo_start;
        let mut hi = max_input.clone();
        while &hi - &lo > BigInt::from(1u8) {
            check_cancel(cancel)?;
            let mid = (&lo + &hi) / 2u8;
            match self.cycle_derivative(&mid) {
                Some(derivative) if derivative > 1.0 => lo = mid,
                _ => hi = mid,
            }
        }
        Ok(lo)
    }

    /// Integer polish: hill-climb a few wei around the candidate so float
    /// rounding in the search cannot cost the last wei of profit.
    fn polish(
        &self,
        candidate: BigInt,
        max_input: &BigInt,
        cancel: Option<&CancelToken>,
    ) -> Result<BigInt, ArbitrageError> {
        let mut best = candidate.clamp(BigInt::from(1u8), max_input.clone());
        let mut best_profit = self.profit_or_min(&best);
        let mut step = BigInt::from(1u8);
        for _ in 0..64 {
            check_cancel(cancel)?;
            let mut improved = false;
            for direction in [1i8, -1i8] {
                let next = if direction > 0 {
                    (&best + &step).min(max_input.clone())
                } else {
                    (&best - &step).max(BigInt::from(1u8))
                };
                let next_profit = self.profit_or_min(&next);
                if next_profit > best_profit {
                    best = next;
                    best_profit = next_profit;
                    improved = true;
                }
            }
            if improved {
                step *= 2u8;
            } else if step > BigInt::from(1u8) {
                step = BigInt::from(1u8);
            } else {
                break;
            }
        }
        Ok(best)
    }
}

/// A rough input-side reserve for bracketing. Concentrated pools expose the
/// virtual reserve of the active range.
fn reserve_hint(
    pool: &Arc<dyn LiquidityPool>,
    token_in: Address,
    override_state: Option<&PoolSnapshot>,
) -> Option<BigInt> {
    let snapshot = match override_state {
        Some(snapshot) => snapshot.clone(),
        None => pool.snapshot(),
    };
    let tokens = pool.tokens();
    let is_token0 = tokens.first() == Some(&token_in);
    match snapshot {
        PoolSnapshot::ConstantProduct(state) => Some(if is_token0 {
            state.reserves_token0
        } else {
            state.reserves_token1
        }),
        PoolSnapshot::Aerodrome(state) => Some(if is_token0 {
            state.reserves_token0
        } else {
            state.reserves_token1
        }),
        PoolSnapshot::Weighted(state) => {
            let index = tokens.iter().position(|token| *token == token_in)?;
            state.balances.get(index).cloned()
        }
        PoolSnapshot::Concentrated(state) => {
            if state.sqrt_price_x96.is_zero() {
                return None;
            }
            let q96: BigInt = BigInt::from(1u8) << 96;
            Some(if is_token0 {
                // x_virtual = L * 2^96 / sqrtP
                (&state.liquidity * &q96) / &state.sqrt_price_x96
            } else {
                // y_virtual = L * sqrtP / 2^96
                (&state.liquidity * &state.sqrt_price_x96) / &q96
            })
        }
    }
}

fn check_cancel(cancel: Option<&CancelToken>) -> Result<(), ArbitrageError> {
    if cancel.map(CancelToken::is_cancelled).unwrap_or(false) {
        return Err(ArbitrageError::Cancelled);
    }
    Ok(())
}
