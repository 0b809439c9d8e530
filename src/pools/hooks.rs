// Uniswap V4 hook permission decoding.
//
// A V4 pool's hook contract encodes its permissions in the low 14 bits of
// its address. Pools whose hooks can intercept swap logic cannot be
// simulated with certainty off-chain; the swap path surfaces those flags to
// the caller.

use ethers::types::Address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookFlag {
    BeforeInitialize,
    AfterInitialize,
    BeforeAddLiquidity,
    AfterAddLiquidity,
    BeforeRemoveLiquidity,
    AfterRemoveLiquidity,
    BeforeSwap,
    AfterSwap,
    BeforeDonate,
    AfterDonate,
    BeforeSwapReturnsDelta,
    AfterSwapReturnsDelta,
    AfterAddLiquidityReturnsDelta,
    AfterRemoveLiquidityReturnsDelta,
}

const FLAG_BITS: [(u16, HookFlag); 14] = [
    (1 << 13, HookFlag::BeforeInitialize),
    (1 << 12, HookFlag::AfterInitialize),
    (1 << 11, HookFlag::BeforeAddLiquidity),
    (1 << 10, HookFlag::AfterAddLiquidity),
    (1 << 9, HookFlag::BeforeRemoveLiquidity),
    (1 << 8, HookFlag::AfterRemoveLiquidity),
    (1 << 7, HookFlag::BeforeSwap),
    (1 << 6, HookFlag::AfterSwap),
    (1 << 5, HookFlag::BeforeDonate),
    (1 << 4, HookFlag::AfterDonate),
    (1 << 3, HookFlag::BeforeSwapReturnsDelta),
    (1 << 2, HookFlag::AfterSwapReturnsDelta),
    (1 << 1, HookFlag::AfterAddLiquidityReturnsDelta),
    (1 << 0, HookFlag::AfterRemoveLiquidityReturnsDelta),
];

/// Decode the permission flags from a hook contract address.
pub fn hook_flags(hook_address: &Address) -> Vec<HookFlag> {
    if hook_address.is_zero() {
        return Vec::new();
    }
    let bytes = hook_address.as_bytes();
    let low_bits = u16::from_be_bytes([bytes[18], bytes[19]]) & 0x3FFF;
    FLAG_BITS
        .iter()
        .filter(|(bit, _)| low_bits & bit != 0)
        .map(|(_, flag)| *flag)
        .collect()
}

/// True if any of the flags lets the hook modify swap amounts or pricing.
pub fn intercepts_swaps(flags: &[HookFlag]) -> bool {
    flags.iter().any(|flag| {
        matches!(
            flag,
            HookFlag::BeforeSwap
                | HookFlag::AfterSwap
                | HookFlag::BeforeSwapReturnsDelta
                | HookFlag::AfterSwapReturnsDelta
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address_with_low_bits(bits: u16) -> Address {
        let mut bytes = [0u8; 20];
        bytes[0] = 0xAA; // any nonzero upper part
        bytes[18] = (bits >> 8) as u8;
        bytes[19] = bits as u8;
        Address::from(bytes)
    }

    #[test]
    fn zero_address_has_no_flags() {
        assert!(hook_flags(&Address::zero()).is_empty());
    }

    #[test]
    fn decodes_swap_flags() {
        let addr = address_with_low_bits((1 << 7) | (1 << 6));
        let flags = hook_flags(&addr);
        assert_eq!(flags, vec![HookFlag::BeforeSwap, HookFlag::AfterSwap]);
        assert!(intercepts_swaps(&flags));
    }

    #[test]
    fn liquidity_only_hooks_do_not_intercept_swaps() {
        let addr = address_with_low_bits((1 << 11) | (1 << 10));
        let flags = hook_flags(&addr);
        assert_eq!(
            flags,
            vec![HookFlag::BeforeAddLiquidity, HookFlag::AfterAddLiquidity]
        );
        assert!(!intercepts_swaps(&flags));
    }
}
