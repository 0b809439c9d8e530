// poolsim: off-chain simulation of DEX liquidity pools and Aave-style
// lending accounting, bit-exact against the on-chain contracts.

pub mod aave;
pub mod chain;
pub mod engine;
pub mod errors;
pub mod evm;
pub mod math;
pub mod pools;
