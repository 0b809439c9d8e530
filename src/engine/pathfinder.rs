// Path enumeration over a pool/token graph.
//
// Paths are produced lazily, depth by depth from 2 up to the requested
// maximum, in pool insertion order, deduplicated by their pool-address
// tuple. A pair of equivalent tokens (native and wrapped, say) lets a cycle
// start and end in nominally different tokens that convert 1:1 outside the
// swap path.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ethers::types::Address;
use log::debug;

use crate::pools::{LiquidityPool, PoolVariant};

use super::CancelToken;

#[derive(Clone)]
pub struct SwapPath {
    pub pools: Vec<Arc<dyn LiquidityPool>>,
    /// Token sequence, one longer than the pool list.
    pub tokens: Vec<Address>,
}

impl SwapPath {
    pub fn addresses(&self) -> Vec<Address> {
        self.pools.iter().map(|pool| pool.address()).collect()
    }
}

impl std::fmt::Debug for SwapPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwapPath")
            .field("pools", &self.addresses())
            .field("tokens", &self.tokens)
            .finish()
    }
}

#[derive(Default)]
pub struct PoolGraph {
    pools: Vec<Arc<dyn LiquidityPool>>,
    by_token: HashMap<Address, Vec<usize>>,
}

impl PoolGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pool(&mut self, pool: Arc<dyn LiquidityPool>) {
        let index = self.pools.len();
        for token in pool.tokens() {
            self.by_token.entry(token).or_default().push(index);
        }
        self.pools.push(pool);
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Enumerates swap paths from `start_token` back to `end_token` with
    /// depth in [2, max_depth]. `variants` filters pool types; equivalent
    /// token pairs let start and end differ when they convert outside the
    /// path.
    pub fn find_paths<'a>(
        &'a self,
        start_token: Address,
        end_token: Address,
        max_depth: usize,
        variants: Option<&'a [PoolVariant]>,
        equivalent_tokens: &[(Address, Address)],
        cancel: Option<&'a CancelToken>,
    ) -> impl Iterator<Item = SwapPath> + 'a {
        let mut equivalents: HashMap<Address, Address> = HashMap::new();
        for (a, b) in equivalent_tokens {
            equivalents.insert(*a, *b);
            equivalents.insert(*b, *a);
        }

        PathIter {
            graph: self,
            start_token,
            end_token,
            equivalents,
            variants,
            cancel,
            depth: 2,
            max_depth: max_depth.max(2),
            stack: Vec::new(),
            seen: HashSet::new(),
            exhausted: false,
        }
    }

    fn allowed(&self, index: usize, variants: Option<&[PoolVariant]>) -> bool {
        match variants {
            Some(allowed) => allowed.contains(&self.pools[index].variant()),
            None => true,
        }
    }

    fn candidates(&self, token: Address) -> &[usize] {
        self.by_token
            .get(&token)
            .map(|indices| indices.as_slice())
            .unwrap_or(&[])
    }
}

/// Depth-bounded DFS frame: the pool candidates for one hop and the cursor
/// into them.
struct Frame {
    token_in: Address,
    candidates: Vec<usize>,
    cursor: usize,
}

struct PathIter<'a> {
    graph: &'a PoolGraph,
    start_token: Address,
    end_token: Address,
    equivalents: HashMap<Address, Address>,
    variants: Option<&'a [PoolVariant]>,
    cancel: Option<&'a CancelToken>,
    depth: usize,
    max_depth: usize,
    stack: Vec<Frame>,
    seen: HashSet<Vec<Address>>,
    exhausted: bool,
}

impl<'a> PathIter<'a> {
    fn terminal(&self, token: Address) -> bool {
        token == self.end_token
            || self.equivalents.get(&token) == Some(&self.end_token)
    }

    /// A depth-2 cycle only makes sense through a forward token that two or
    /// more pools serve.
    fn forward_token_is_deep_enough(&self, token: Address) -> bool {
        if self.depth != 2 {
            return true;
        }
        self.graph
            .candidates(token)
            .iter()
            .filter(|index| self.graph.allowed(**index, self.variants))
            .count()
            >= 2
    }

    fn open_frame(&mut self, token_in: Address) {
        let candidates: Vec<usize> = self
            .graph
            .candidates(token_in)
            .iter()
            .copied()
            .filter(|index| self.graph.allowed(*index, self.variants))
            .collect();
        self.stack.push(Frame {
            token_in,
            candidates,
            cursor: 0,
        });
    }

    fn current_pools(&self, with: usize) -> Vec<usize> {
        let mut pools: Vec<usize> = self
            .stack
            .iter()
            .take(self.stack.len() - 1)
            .map(|frame| frame.candidates[frame.cursor - 1])
            .collect();
        pools.push(with);
        pools
    }
}

impl<'a> Iterator for PathIter<'a> {
    type Item = SwapPath;

    fn next(&mut self) -> Option<SwapPath> {
        loop {
            if self.exhausted || self.cancel.map(CancelToken::is_cancelled).unwrap_or(false) {
                return None;
            }
            if self.stack.is_empty() {
                if self.depth > self.max_depth {
                    self.exhausted = true;
                    return None;
                }
                self.open_frame(self.start_token);
            }

            // advance the deepest frame
            let level = self.stack.len() - 1;
            let frame = &mut self.stack[level];
            if frame.cursor >= frame.candidates.len() {
                self.stack.pop();
                if self.stack.is_empty() {
                    self.depth += 1;
                    if self.depth > self.max_depth {
                        self.exhausted = true;
                        return None;
                    }
                }
                continue;
            }

            let pool_index = frame.candidates[frame.cursor];
            frame.cursor += 1;
            let token_in = frame.token_in;

            // no pool twice in one path
            let used_before = self
                .stack
                .iter()
                .take(level)
                .any(|prior| prior.candidates[prior.cursor - 1] == pool_index);
            if used_before {
                continue;
            }

            let pool = &self.graph.pools[pool_index];
            let token_out = match pool.tokens().iter().find(|token| **token != token_in) {
                Some(token) => *token,
                None => continue,
            };

            if self.stack.len() == self.depth {
                // final hop: must land on the end token (or an equivalent)
                if !self.terminal(token_out) {
                    continue;
                }
                let pool_indices = self.current_pools(pool_index);
                let addresses: Vec<Address> = pool_indices
                    .iter()
                    .map(|index| self.graph.pools[*index].address())
                    .collect();
                if !self.seen.insert(addresses) {
                    continue;
                }
                let mut tokens: Vec<Address> =
                    self.stack.iter().map(|frame| frame.token_in).collect();
                tokens.push(token_out);
                let path = SwapPath {
                    pools: pool_indices
                        .iter()
                        .map(|index| self.graph.pools[*index].clone())
                        .collect(),
                    tokens,
                };
                debug!("path found at depth {}: {:?}", self.depth, path.addresses());
                return Some(path);
            }

            // interior hop: never pass through the cycle tokens, and for
            // two-pool cycles require a forward token served twice
            if token_out == self.start_token || self.terminal(token_out) {
                continue;
            }
            if !self.forward_token_is_deep_enough(token_out) {
                continue;
            }
            self.open_frame(token_out);
        }
    }
}
