// Tick bitmap and liquidity mapping for concentrated-liquidity pools.
//
// One 256-bit word covers 256 compressed ticks; bit i of word w is set iff
// tick (w*256 + i) * spacing is initialized. The map runs in one of two
// modes: full (missing words read as empty) or sparse (missing words are an
// error surfaced to the caller, who may fetch them from the chain).

use std::collections::BTreeMap;

use num_bigint::BigInt;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};

use crate::errors::LiquidityPoolError;
use crate::evm::most_significant_bit;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityAtTick {
    pub liquidity_net: i128,
    pub liquidity_gross: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityMap {
    sparse: bool,
    bitmap: BTreeMap<i16, BigInt>,
    ticks: BTreeMap<i32, LiquidityAtTick>,
}

/// Computes the word and bit holding a compressed tick's initialized flag.
pub fn position(compressed_tick: i32) -> (i16, u8) {
    let word_pos = (compressed_tick >> 8) as i16;
    let bit_pos = compressed_tick.rem_euclid(256) as u8;
    (word_pos, bit_pos)
}

/// Compress a tick by its spacing, rounding toward negative infinity.
pub fn compress(tick: i32, tick_spacing: i32) -> i32 {
    tick.div_euclid(tick_spacing)
}

impl LiquidityMap {
    pub fn new_sparse() -> Self {
        Self {
            sparse: true,
            bitmap: BTreeMap::new(),
            ticks: BTreeMap::new(),
        }
    }

    pub fn new_full() -> Self {
        Self {
            sparse: false,
            bitmap: BTreeMap::new(),
            ticks: BTreeMap::new(),
        }
    }

    pub fn is_sparse(&self) -> bool {
        self.sparse
    }

    pub fn tick_data(&self) -> &BTreeMap<i32, LiquidityAtTick> {
        &self.ticks
    }

    pub fn liquidity_at_tick(&self, tick: i32) -> Option<&LiquidityAtTick> {
        self.ticks.get(&tick)
    }

    /// Install a fetched word. Used when a sparse map demand-loads bitmap
    /// words from the chain reader.
    pub fn set_word(&mut self, word_pos: i16, bitmap: BigInt) {
        self.bitmap.insert(word_pos, bitmap);
    }

    pub fn has_word(&self, word_pos: i16) -> bool {
        self.bitmap.contains_key(&word_pos)
    }

    pub fn known_words(&self) -> impl Iterator<Item = (&i16, &BigInt)> {
        self.bitmap.iter()
    }

    fn word(&self, word_pos: i16) -> Result<BigInt, LiquidityPoolError> {
        match self.bitmap.get(&word_pos) {
            Some(word) => Ok(word.clone()),
            None if self.sparse => Err(LiquidityPoolError::LiquidityMapWordMissing {
                word: word_pos,
            }),
            None => Ok(BigInt::zero()),
        }
    }

    /// Flips the initialized state of `tick`, which must be aligned to the
    /// spacing. A missing word in sparse mode is surfaced; in full mode it
    /// is materialized as empty.
    pub fn flip_tick(&mut self, tick: i32, tick_spacing: i32) -> Result<(), LiquidityPoolError> {
        assert!(
            tick % tick_spacing == 0,
            "tick {tick} not aligned to spacing {tick_spacing}"
        );
        let (word_pos, bit_pos) = position(compress(tick, tick_spacing));

        if !self.bitmap.contains_key(&word_pos) {
            if self.sparse {
                return Err(LiquidityPoolError::LiquidityMapWordMissing { word: word_pos });
            }
            self.bitmap.insert(word_pos, BigInt::zero());
        }
        let word = self.bitmap.get_mut(&word_pos).expect("word was just ensured");
        *word ^= BigInt::one() << bit_pos;
        Ok(())
    }

    /// Applies an absolute liquidity value at a tick, flipping the bitmap on
    /// zero <-> nonzero transitions so the gross/bitmap invariant holds.
    pub fn set_tick(
        &mut self,
        tick: i32,
        tick_spacing: i32,
        liquidity: LiquidityAtTick,
    ) -> Result<(), LiquidityPoolError> {
        let was_initialized = self
            .ticks
            .get(&tick)
            .map(|existing| existing.liquidity_gross > 0)
            .unwrap_or(false);
        let now_initialized = liquidity.liquidity_gross > 0;

        if was_initialized != now_initialized {
            self.flip_tick(tick, tick_spacing)?;
        }
        if now_initialized {
            self.ticks.insert(tick, liquidity);
        } else {
            self.ticks.remove(&tick);
        }
        Ok(())
    }

    /// Returns the next initialized tick within one bitmap word of `tick`,
    /// either at or below it (lte) or strictly above it. The boolean is
    /// false when the returned tick is just the word boundary.
    pub fn next_initialized_tick_within_one_word(
        &self,
        tick: i32,
        tick_spacing: i32,
        less_than_or_equal: bool,
    ) -> Result<(i32, bool), LiquidityPoolError> {
        let compressed = compress(tick, tick_spacing);

        if less_than_or_equal {
            let (word_pos, bit_pos) = position(compressed);
            let word = self.word(word_pos)?;

            // all bits at or to the right of the current bit
            let mask = (BigInt::one() << (bit_pos as u32 + 1)) - 1u8;
            let masked = word & mask;

            if masked.is_zero() {
                // no initialized tick in this word: return its low boundary
                Ok(((compressed - bit_pos as i32) * tick_spacing, false))
            } else {
                let highest = most_significant_bit(&masked) as i32;
                Ok((
                    (compressed - (bit_pos as i32 - highest)) * tick_spacing,
                    true,
                ))
            }
        } else {
            // start from the word of the next tick; the current tick's own
            // state does not matter when searching upward
            let (word_pos, bit_pos) = position(compressed + 1);
            let word = self.word(word_pos)?;

            // all bits at or to the left of the next bit
            let all_ones: BigInt = (BigInt::one() << 256) - 1u8;
            let below: BigInt = (BigInt::one() << bit_pos as u32) - 1u8;
            let mask: BigInt = all_ones ^ below;
            let masked: BigInt = word & mask;

            if masked.is_zero() {
                // no initialized tick in this word: return its high boundary
                Ok((
                    (compressed + 1 + (255 - bit_pos as i32)) * tick_spacing,
                    false,
                ))
            } else {
                let lowest = masked.trailing_zeros().unwrap_or(0) as i32;
                Ok((
                    (compressed + 1 + (lowest - bit_pos as i32)) * tick_spacing,
                    true,
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_with_ticks(ticks: &[i32], spacing: i32) -> LiquidityMap {
        let mut map = LiquidityMap::new_full();
        for &tick in ticks {
            map.set_tick(
                tick,
                spacing,
                LiquidityAtTick {
                    liquidity_net: 1,
                    liquidity_gross: 1,
                },
            )
            .unwrap();
        }
        map
    }

    #[test]
    fn position_decomposition() {
        assert_eq!(position(0), (0, 0));
        assert_eq!(position(255), (0, 255));
        assert_eq!(position(256), (1, 0));
        assert_eq!(position(-1), (-1, 255));
        assert_eq!(position(-256), (-1, 0));
        assert_eq!(position(-257), (-2, 255));
    }

    #[test]
    fn flip_requires_aligned_tick() {
        let mut map = LiquidityMap::new_full();
        assert!(map.flip_tick(120, 60).is_ok());
        assert!(map.flip_tick(120, 60).is_ok()); // flip back
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = map.flip_tick(121, 60);
        }));
        assert!(result.is_err());
    }

    #[test]
    fn sparse_map_surfaces_missing_words() {
        let mut map = LiquidityMap::new_sparse();
        assert_eq!(
            map.flip_tick(0, 1),
            Err(LiquidityPoolError::LiquidityMapWordMissing { word: 0 })
        );
        map.set_word(0, BigInt::zero());
        assert!(map.flip_tick(0, 1).is_ok());

        assert_eq!(
            map.next_initialized_tick_within_one_word(-1, 1, true),
            Err(LiquidityPoolError::LiquidityMapWordMissing { word: -1 })
        );
    }

    #[test]
    fn search_descending_finds_set_bits_and_boundaries() {
        let map = map_with_ticks(&[-240, 120], 60);

        // from 150 (compressed 2) downward: tick 120 (compressed 2) is set
        assert_eq!(
            map.next_initialized_tick_within_one_word(150, 60, true).unwrap(),
            (120, true)
        );
        // exactly on an initialized tick returns it
        assert_eq!(
            map.next_initialized_tick_within_one_word(120, 60, true).unwrap(),
            (120, true)
        );
        // just below 120: nothing else set at or below bit 1 in word 0, so
        // the scan stops at the word's low boundary
        assert_eq!(
            map.next_initialized_tick_within_one_word(119, 60, true).unwrap(),
            (0, false)
        );
        // below all set bits in the word: low word boundary, uninitialized.
        // compressed(-241/60) = -5, word -1 holds bits for -256..-1
        assert_eq!(
            map.next_initialized_tick_within_one_word(-300, 60, true).unwrap(),
            (-256 * 60, false)
        );
    }

    #[test]
    fn search_ascending_finds_set_bits_and_boundaries() {
        let map = map_with_ticks(&[-240, 120, 300], 60);

        assert_eq!(
            map.next_initialized_tick_within_one_word(-300, 60, false).unwrap(),
            (-240, true)
        );
        // search is strictly greater-than
        assert_eq!(
            map.next_initialized_tick_within_one_word(120, 60, false).unwrap(),
            (300, true)
        );
        assert_eq!(
            map.next_initialized_tick_within_one_word(119, 60, false).unwrap(),
            (120, true)
        );
        // above all set bits: high boundary of the word, uninitialized
        assert_eq!(
            map.next_initialized_tick_within_one_word(300, 60, false).unwrap(),
            (255 * 60, false)
        );
    }

    #[test]
    fn gross_zero_clears_the_bitmap_bit() {
        let mut map = map_with_ticks(&[120], 60);
        assert_eq!(
            map.next_initialized_tick_within_one_word(150, 60, true).unwrap(),
            (120, true)
        );
        map.set_tick(
            120,
            60,
            LiquidityAtTick {
                liquidity_net: 0,
                liquidity_gross: 0,
            },
        )
        .unwrap();
        let (next, initialized) =
            map.next_initialized_tick_within_one_word(150, 60, true).unwrap();
        assert!(!initialized);
        assert_eq!(next, 0);
        assert!(map.liquidity_at_tick(120).is_none());
    }

    #[test]
    fn word_snapshot_round_trip() {
        let map = map_with_ticks(&[0, 60, 120], 60);
        let words: Vec<_> = map.known_words().collect();
        assert_eq!(words.len(), 1);
        let word = words[0].1;
        assert_eq!(word, &BigInt::from(0b111u8));
    }
}
