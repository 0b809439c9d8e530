// Tick <-> sqrt price conversion, Q64.96.
//
// sqrt_price_at_tick computes sqrt(1.0001^tick) * 2^96 with the canonical
// per-bit ratio multipliers; tick_at_sqrt_price inverts it through an exact
// base-2 logarithm with the published error-bound constants. Both directions
// are bit-identical to the on-chain TickMath library.

use num_bigint::BigInt;
use num_traits::{One, ToPrimitive};
use once_cell::sync::Lazy;

use crate::errors::EvmError;
use crate::evm::{big_dec, floor_divide, most_significant_bit, MAX_UINT256};

pub const MIN_TICK: i32 = -887_272;
pub const MAX_TICK: i32 = 887_272;
pub const MIN_TICK_SPACING: i32 = 1;
pub const MAX_TICK_SPACING: i32 = i16::MAX as i32;

pub static MIN_SQRT_PRICE: Lazy<BigInt> = Lazy::new(|| big_dec("4295128739"));
pub static MAX_SQRT_PRICE: Lazy<BigInt> =
    Lazy::new(|| big_dec("1461446703485210103287273052203988822378723970342"));

// Error bounds for the log_sqrt10001 approximation over the valid sqrt price
// range (2^-64, 2^64).
static MIN_ERROR: Lazy<BigInt> =
    Lazy::new(|| big_dec("291339464771989622907027621153398088495"));
static MAX_ERROR: Lazy<BigInt> =
    Lazy::new(|| big_dec("3402992956809132418596140100660247210"));

static LOG_SQRT10001_MULTIPLIER: Lazy<BigInt> =
    Lazy::new(|| big_dec("255738958999603826347141"));

// Q128.128 ratio of 1/sqrt(1.0001) for a set low bit.
static RATIO_BIT_0: Lazy<BigInt> =
    Lazy::new(|| big_dec("340265354078544963557816517032075149313"));

// 1/sqrt(1.0001^(2^i)) multipliers for bits 1..=19, Q128.128.
static RATIO_MULTIPLIERS: Lazy<[(u32, BigInt); 19]> = Lazy::new(|| {
    [
        (0x2, big_dec("340248342086729790484326174814286782778")),
        (0x4, big_dec("340214320654664324051920982716015181260")),
        (0x8, big_dec("340146287995602323631171512101879684304")),
        (0x10, big_dec("340010263488231146823593991679159461444")),
        (0x20, big_dec("339738377640345403697157401104375502016")),
        (0x40, big_dec("339195258003219555707034227454543997025")),
        (0x80, big_dec("338111622100601834656805679988414885971")),
        (0x100, big_dec("335954724994790223023589805789778977700")),
        (0x200, big_dec("331682121138379247127172139078559817300")),
        (0x400, big_dec("323299236684853023288211250268160618739")),
        (0x800, big_dec("307163716377032989948697243942600083929")),
        (0x1000, big_dec("277268403626896220162999269216087595045")),
        (0x2000, big_dec("225923453940442621947126027127485391333")),
        (0x4000, big_dec("149997214084966997727330242082538205943")),
        (0x8000, big_dec("66119101136024775622716233608466517926")),
        (0x10000, big_dec("12847376061809297530290974190478138313")),
        (0x20000, big_dec("485053260817066172746253684029974020")),
        (0x40000, big_dec("691415978906521570653435304214168")),
        (0x80000, big_dec("1404880482679654955896180642")),
    ]
});

/// Largest tick aligned to `tick_spacing` at or below MAX_TICK.
pub fn max_usable_tick(tick_spacing: i32) -> i32 {
    (MAX_TICK / tick_spacing) * tick_spacing
}

/// Smallest tick aligned to `tick_spacing` at or above MIN_TICK.
pub fn min_usable_tick(tick_spacing: i32) -> i32 {
    // truncation toward zero keeps the result inside the tick range
    (MIN_TICK / tick_spacing) * tick_spacing
}

/// Calculates sqrt(1.0001^tick) * 2^96 as a Q64.96 value.
pub fn sqrt_price_at_tick(tick: i32) -> Result<BigInt, EvmError> {
    let abs_tick = tick.unsigned_abs();
    if abs_tick > MAX_TICK as u32 {
        return Err(EvmError::InvalidTick);
    }

    let mut price = if abs_tick & 0x1 != 0 {
        RATIO_BIT_0.clone()
    } else {
        BigInt::one() << 128
    };
    for (mask, multiplier) in RATIO_MULTIPLIERS.iter() {
        if abs_tick & mask != 0 {
            price = (price * multiplier) >> 128;
        }
    }

    if tick > 0 {
        price = &*MAX_UINT256 / price;
    }

    // Q128.128 -> Q64.96, rounding up so the tick_at_sqrt_price of the
    // output is always consistent.
    Ok((price + ((BigInt::one() << 32) - 1)) >> 32)
}

/// Calculates the greatest tick whose sqrt price is <= `sqrt_price_x96`.
pub fn tick_at_sqrt_price(sqrt_price_x96: &BigInt) -> Result<i32, EvmError> {
    if sqrt_price_x96 < &*MIN_SQRT_PRICE || sqrt_price_x96 > &*MAX_SQRT_PRICE {
        return Err(EvmError::InvalidSqrtPrice);
    }

    let price: BigInt = sqrt_price_x96 << 32;
    let msb = most_significant_bit(&price);

    let mut r = if msb >= 128 {
        &price >> (msb - 127)
    } else {
        &price << (127 - msb)
    };
    let mut log_2: BigInt = BigInt::from(msb as i64 - 128) << 64;

    // 14 iterative squarings extract the fractional log_2 bits 63..50. The
    // bits are disjoint and start zeroed, so addition stands in for OR.
    for factor in (50..=63).rev() {
        r = (&r * &r) >> 127;
        let f: BigInt = &r >> 128;
        log_2 += &f << factor;
        r >>= f.to_u8().unwrap_or(0);
    }

    let log_sqrt10001 = log_2 * &*LOG_SQRT10001_MULTIPLIER; // Q22.128

    let tick_low = floor_divide(&(&log_sqrt10001 - &*MAX_ERROR), &(BigInt::one() << 128))
        .to_i32()
        .ok_or(EvmError::InvalidSqrtPrice)?;
    let tick_high = floor_divide(&(&log_sqrt10001 + &*MIN_ERROR), &(BigInt::one() << 128))
        .to_i32()
        .ok_or(EvmError::InvalidSqrtPrice)?;

    if tick_low == tick_high {
        Ok(tick_low)
    } else if sqrt_price_at_tick(tick_high)? <= *sqrt_price_x96 {
        Ok(tick_high)
    } else {
        Ok(tick_low)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evm::big;

    #[test]
    fn rejects_out_of_range_ticks() {
        assert_eq!(sqrt_price_at_tick(MAX_TICK + 1), Err(EvmError::InvalidTick));
        assert_eq!(sqrt_price_at_tick(MIN_TICK - 1), Err(EvmError::InvalidTick));
    }

    #[test]
    fn boundary_prices() {
        assert_eq!(sqrt_price_at_tick(MIN_TICK).unwrap(), *MIN_SQRT_PRICE);
        assert_eq!(sqrt_price_at_tick(MAX_TICK).unwrap(), *MAX_SQRT_PRICE);
        assert_eq!(sqrt_price_at_tick(0).unwrap(), BigInt::one() << 96);
    }

    #[test]
    fn known_prices_near_the_boundaries() {
        assert_eq!(tick_at_sqrt_price(&big_dec("4295343490")).unwrap(), MIN_TICK + 1);
        assert_eq!(
            tick_at_sqrt_price(&big_dec(
                "1461373636630004318706518188784493106690254656249"
            ))
            .unwrap(),
            MAX_TICK - 1
        );
        assert_eq!(tick_at_sqrt_price(&MIN_SQRT_PRICE).unwrap(), MIN_TICK);
        // MAX_SQRT_PRICE itself maps to MAX_TICK
        assert_eq!(tick_at_sqrt_price(&MAX_SQRT_PRICE).unwrap(), MAX_TICK);
    }

    #[test]
    fn rejects_out_of_range_prices() {
        assert_eq!(
            tick_at_sqrt_price(&(&*MIN_SQRT_PRICE - 1u8)),
            Err(EvmError::InvalidSqrtPrice)
        );
        assert_eq!(
            tick_at_sqrt_price(&(&*MAX_SQRT_PRICE + 1u8)),
            Err(EvmError::InvalidSqrtPrice)
        );
    }

    #[test]
    fn round_trip_over_sampled_ticks() {
        let mut tick = MIN_TICK;
        while tick <= MAX_TICK {
            let price = sqrt_price_at_tick(tick).unwrap();
            assert_eq!(tick_at_sqrt_price(&price).unwrap(), tick, "tick {tick}");
            tick += 19_937; // prime stride covers both signs and bit patterns
        }
        let price = sqrt_price_at_tick(MAX_TICK).unwrap();
        assert_eq!(tick_at_sqrt_price(&price).unwrap(), MAX_TICK);
    }

    #[test]
    fn price_brackets_its_tick() {
        for sqrt_price in [
            MIN_SQRT_PRICE.clone(),
            big_dec("4295343490"),
            BigInt::one() << 96,
            (BigInt::one() << 96) + big(123_456_789),
            &*MAX_SQRT_PRICE - 1u8,
        ] {
            let tick = tick_at_sqrt_price(&sqrt_price).unwrap();
            assert!(sqrt_price_at_tick(tick).unwrap() <= sqrt_price);
            assert!(sqrt_price_at_tick(tick + 1).unwrap() > sqrt_price);
        }
    }

    #[test]
    fn usable_tick_alignment() {
        assert_eq!(max_usable_tick(60), 887_220);
        assert_eq!(min_usable_tick(60), -887_220);
        assert_eq!(max_usable_tick(1), MAX_TICK);
        assert_eq!(min_usable_tick(1), MIN_TICK);
    }
}
