// Chain-reader boundary.
//
// Pool bootstrap needs three primitives from whoever talks to a node:
// contract calls at a block, the head block number, and log queries. The
// trait is deliberately minimal; implementations (RPC clients, forks,
// fixtures) live outside this crate.

use async_trait::async_trait;
use ethers::types::{Address, H256};
use ethers::utils::keccak256;
use once_cell::sync::Lazy;

use crate::aave::events::LogRecord;

/// Four-byte function selector derived from the canonical signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

// V2 pair bootstrap calls.
pub static GET_RESERVES_SELECTOR: Lazy<[u8; 4]> = Lazy::new(|| selector("getReserves()"));
pub static TOKEN0_SELECTOR: Lazy<[u8; 4]> = Lazy::new(|| selector("token0()"));
pub static TOKEN1_SELECTOR: Lazy<[u8; 4]> = Lazy::new(|| selector("token1()"));
pub static FACTORY_SELECTOR: Lazy<[u8; 4]> = Lazy::new(|| selector("factory()"));

// V3/V4 pool bootstrap calls.
pub static SLOT0_SELECTOR: Lazy<[u8; 4]> = Lazy::new(|| selector("slot0()"));
pub static LIQUIDITY_SELECTOR: Lazy<[u8; 4]> = Lazy::new(|| selector("liquidity()"));
pub static TICK_SPACING_SELECTOR: Lazy<[u8; 4]> = Lazy::new(|| selector("tickSpacing()"));
pub static FEE_SELECTOR: Lazy<[u8; 4]> = Lazy::new(|| selector("fee()"));
pub static TICKS_SELECTOR: Lazy<[u8; 4]> = Lazy::new(|| selector("ticks(int24)"));
pub static TICK_BITMAP_SELECTOR: Lazy<[u8; 4]> = Lazy::new(|| selector("tickBitmap(int16)"));

// Balancer pool bootstrap calls.
pub static GET_POOL_ID_SELECTOR: Lazy<[u8; 4]> = Lazy::new(|| selector("getPoolId()"));
pub static GET_VAULT_SELECTOR: Lazy<[u8; 4]> = Lazy::new(|| selector("getVault()"));
pub static GET_POOL_TOKENS_SELECTOR: Lazy<[u8; 4]> =
    Lazy::new(|| selector("getPoolTokens(bytes32)"));
pub static GET_SWAP_FEE_PERCENTAGE_SELECTOR: Lazy<[u8; 4]> =
    Lazy::new(|| selector("getSwapFeePercentage()"));
pub static GET_NORMALIZED_WEIGHTS_SELECTOR: Lazy<[u8; 4]> =
    Lazy::new(|| selector("getNormalizedWeights()"));

/// Filter for log queries at the boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    pub addresses: Vec<Address>,
    pub topics: Vec<H256>,
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ChainReaderError {
    #[error("call to {address:?} reverted: {reason}")]
    CallReverted { address: Address, reason: String },
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Minimal read access to a chain. Implementations may suspend; the
/// simulation core never calls this from inside a swap loop.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn call(
        &self,
        address: Address,
        calldata: Vec<u8>,
        block: Option<u64>,
    ) -> Result<Vec<u8>, ChainReaderError>;

    async fn get_block_number(&self) -> Result<u64, ChainReaderError>;

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<LogRecord>, ChainReaderError>;
}

/// Fetches a batch of tick-bitmap words concurrently. Used when a sparse
/// liquidity map reports LiquidityMapWordMissing and the caller decides to
/// load the words instead of failing.
pub async fn fetch_bitmap_words(
    reader: &dyn ChainReader,
    pool: Address,
    word_positions: &[i16],
    block: Option<u64>,
) -> Result<Vec<(i16, Vec<u8>)>, ChainReaderError> {
    let calls = word_positions.iter().map(|word_pos| async move {
        let mut calldata = TICK_BITMAP_SELECTOR.to_vec();
        // int16 argument, left-padded to a word
        let mut argument = [0u8; 32];
        let word_bytes = word_pos.to_be_bytes();
        if *word_pos < 0 {
            argument = [0xFF; 32];
        }
        argument[30] = word_bytes[0];
        argument[31] = word_bytes[1];
        calldata.extend_from_slice(&argument);
        reader
            .call(pool, calldata, block)
            .await
            .map(|data| (*word_pos, data))
    });
    futures::future::try_join_all(calls).await
}
