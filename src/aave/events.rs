// Aave event taxonomy and log-boundary types.
//
// Topic-0 constants are derived from the canonical event signatures with
// keccak256, so they are bit-exact by construction. Raw ABI decoding of
// log payloads stays outside this crate; the matcher consumes the typed
// events below.

use ethers::types::{Address, H256};
use ethers::utils::keccak256;
use num_bigint::BigInt;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::token_math::AssetClass;

/// Boundary log record, as delivered by the chain-reader collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Vec<u8>,
    pub block_number: u64,
    pub transaction_hash: H256,
    pub log_index: u32,
}

fn topic(signature: &str) -> H256 {
    H256::from(keccak256(signature.as_bytes()))
}

pub static SUPPLY_TOPIC: Lazy<H256> =
    Lazy::new(|| topic("Supply(address,address,address,uint256,uint16)"));
pub static WITHDRAW_TOPIC: Lazy<H256> =
    Lazy::new(|| topic("Withdraw(address,address,address,uint256)"));
pub static BORROW_TOPIC: Lazy<H256> =
    Lazy::new(|| topic("Borrow(address,address,address,uint256,uint8,uint256,uint16)"));
pub static REPAY_TOPIC: Lazy<H256> =
    Lazy::new(|| topic("Repay(address,address,address,uint256,bool)"));
pub static LIQUIDATION_CALL_TOPIC: Lazy<H256> = Lazy::new(|| {
    topic("LiquidationCall(address,address,address,uint256,uint256,address,bool)")
});
pub static DEFICIT_CREATED_TOPIC: Lazy<H256> =
    Lazy::new(|| topic("DeficitCreated(address,address,uint256)"));
pub static RESERVE_DATA_UPDATED_TOPIC: Lazy<H256> = Lazy::new(|| {
    topic("ReserveDataUpdated(address,uint256,uint256,uint256,uint256,uint256)")
});
pub static SCALED_TOKEN_MINT_TOPIC: Lazy<H256> =
    Lazy::new(|| topic("Mint(address,address,uint256,uint256,uint256)"));
pub static SCALED_TOKEN_BURN_TOPIC: Lazy<H256> =
    Lazy::new(|| topic("Burn(address,address,uint256,uint256,uint256)"));
pub static BALANCE_TRANSFER_TOPIC: Lazy<H256> =
    Lazy::new(|| topic("BalanceTransfer(address,address,uint256,uint256)"));
pub static ERC20_TRANSFER_TOPIC: Lazy<H256> =
    Lazy::new(|| topic("Transfer(address,address,uint256)"));

/// Pool-contract events relevant to position accounting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolEventKind {
    Supply {
        reserve: Address,
        user: Address,
        on_behalf_of: Address,
        amount: BigInt,
    },
    Withdraw {
        reserve: Address,
        user: Address,
        to: Address,
        amount: BigInt,
    },
    Borrow {
        reserve: Address,
        user: Address,
        on_behalf_of: Address,
        amount: BigInt,
    },
    Repay {
        reserve: Address,
        user: Address,
        repayer: Address,
        amount: BigInt,
        use_atokens: bool,
    },
    LiquidationCall {
        collateral_asset: Address,
        debt_asset: Address,
        user: Address,
        debt_to_cover: BigInt,
        liquidated_collateral_amount: BigInt,
        liquidator: Address,
        receive_atoken: bool,
    },
    DeficitCreated {
        user: Address,
        debt_asset: Address,
        amount_created: BigInt,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolEvent {
    pub log_index: u32,
    pub kind: PoolEventKind,
}

/// Scaled-token events emitted by aTokens and vTokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenEventKind {
    Mint {
        caller: Address,
        on_behalf_of: Address,
        value: BigInt,
        balance_increase: BigInt,
        index: BigInt,
    },
    Burn {
        from: Address,
        target: Address,
        value: BigInt,
        balance_increase: BigInt,
        index: BigInt,
    },
    BalanceTransfer {
        from: Address,
        to: Address,
        value: BigInt,
        index: BigInt,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEvent {
    pub log_index: u32,
    /// The scaled token that emitted the event.
    pub token: Address,
    /// The underlying reserve asset the token wraps.
    pub reserve: Address,
    pub class: AssetClass,
    pub kind: TokenEventKind,
}

impl TokenEvent {
    pub fn is_mint(&self) -> bool {
        matches!(self.kind, TokenEventKind::Mint { .. })
    }

    pub fn is_burn(&self) -> bool {
        matches!(self.kind, TokenEventKind::Burn { .. })
    }
}
