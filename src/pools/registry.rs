// Process-global pool and token registries.
//
// Pools and tokens are interned by (chain_id, address); a lookup returns
// the existing instance. Pool entries are held weakly so dropping the last
// external owner releases the pool; token records are small and live for
// the process.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use ethers::types::Address;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::errors::RegistryError;

use super::LiquidityPool;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Erc20Token {
    pub chain_id: u64,
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

static TOKEN_REGISTRY: Lazy<DashMap<(u64, Address), Arc<Erc20Token>>> = Lazy::new(DashMap::new);
static POOL_REGISTRY: Lazy<DashMap<(u64, Address), Weak<dyn LiquidityPool>>> =
    Lazy::new(DashMap::new);

/// Interns a token record, returning the existing instance when one is
/// already registered for the same (chain_id, address).
pub fn intern_token(token: Erc20Token) -> Arc<Erc20Token> {
    TOKEN_REGISTRY
        .entry((token.chain_id, token.address))
        .or_insert_with(|| Arc::new(token))
        .clone()
}

pub fn get_token(chain_id: u64, address: Address) -> Option<Arc<Erc20Token>> {
    TOKEN_REGISTRY.get(&(chain_id, address)).map(|entry| entry.clone())
}

/// Registers a pool. Re-registering the same instance is a no-op; a live
/// different instance under the same key is an error.
pub fn register_pool(
    chain_id: u64,
    pool: Arc<dyn LiquidityPool>,
) -> Result<(), RegistryError> {
    let key = (chain_id, pool.address());
    if let Some(existing) = POOL_REGISTRY.get(&key) {
        if let Some(live) = existing.upgrade() {
            if Arc::ptr_eq(&live, &pool) {
                return Ok(());
            }
            return Err(RegistryError::RegistryAlreadyInitialized);
        }
    }
    POOL_REGISTRY.insert(key, Arc::downgrade(&pool));
    Ok(())
}

pub fn get_pool(chain_id: u64, address: Address) -> Result<Arc<dyn LiquidityPool>, RegistryError> {
    POOL_REGISTRY
        .get(&(chain_id, address))
        .and_then(|entry| entry.upgrade())
        .ok_or(RegistryError::UnknownPool { address })
}

/// Drops dead weak entries. Called opportunistically by long-running hosts.
pub fn prune_pool_registry() {
    POOL_REGISTRY.retain(|_, weak| weak.strong_count() > 0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evm::big_dec;
    use crate::pools::v2::{PoolFee, UniswapV2Pool, UniswapV2PoolState};

    fn pool_at(address: Address) -> Arc<dyn LiquidityPool> {
        Arc::new(UniswapV2Pool::new(
            address,
            Address::from_low_u64_be(1),
            Address::from_low_u64_be(2),
            PoolFee::new(3, 1000),
            UniswapV2PoolState {
                block: 1,
                reserves_token0: big_dec("1000"),
                reserves_token1: big_dec("1000"),
            },
        ))
    }

    #[test]
    fn token_interning_returns_the_first_instance() {
        let token = Erc20Token {
            chain_id: 8453,
            address: Address::from_low_u64_be(0x1111),
            symbol: "WETH".to_string(),
            decimals: 18,
        };
        let first = intern_token(token.clone());
        let second = intern_token(Erc20Token {
            symbol: "DIFFERENT".to_string(),
            ..token
        });
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.symbol, "WETH");
    }

    #[test]
    fn pool_registry_interns_and_releases() {
        let address = Address::from_low_u64_be(0x2222);
        let pool = pool_at(address);
        register_pool(1, pool.clone()).unwrap();

        // same instance: fine; other instance: rejected
        register_pool(1, pool.clone()).unwrap();
        let other = pool_at(address);
        assert_eq!(
            register_pool(1, other),
            Err(RegistryError::RegistryAlreadyInitialized)
        );

        let fetched = get_pool(1, address).unwrap();
        assert!(Arc::ptr_eq(&fetched, &pool));

        // weak entries die with their pools
        drop(fetched);
        drop(pool);
        assert_eq!(
            get_pool(1, address).unwrap_err(),
            RegistryError::UnknownPool { address }
        );

        // a fresh instance can then take the slot
        let replacement = pool_at(address);
        register_pool(1, replacement).unwrap();
    }

    #[test]
    fn chains_are_isolated() {
        let address = Address::from_low_u64_be(0x3333);
        let mainnet_pool = pool_at(address);
        let base_pool = pool_at(address);
        register_pool(1, mainnet_pool.clone()).unwrap();
        register_pool(8453, base_pool.clone()).unwrap();
        assert!(!Arc::ptr_eq(
            &get_pool(1, address).unwrap(),
            &get_pool(8453, address).unwrap()
        ));
    }
}
