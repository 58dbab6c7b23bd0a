//! Banded price↔tick-level table.
//!
//! Exchange price grids are banded: the minimum increment ("tick") depends
//! on the price region. The table maps between raw prices (fixed-point,
//! scaled ×1000) and integer *tick levels* — a dense index over the grid —
//! so that "one tick below the ask" is a subtraction, not a table walk.

use serde::{Deserialize, Serialize};

/// Lowest valid tick level. Level 0 is reserved for "no price".
pub const MIN_TICK_LEVEL: i32 = 1;

/// One price band: all prices in `[from, next band's from)` move in `tick`
/// increments. Prices are fixed-point, scaled ×1000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Band {
    pub from: i32,
    pub tick: i32,
}

/// Banded tick table for one security.
///
/// Invariants: bands are ascending by `from`, every band length is a
/// multiple of its tick, and `end` closes the last band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadTable {
    bands: Vec<Band>,
    end: i32,
    /// Cumulative tick count at the start of each band; `cum[0] == 0`.
    cum: Vec<i32>,
}

impl SpreadTable {
    pub fn new(bands: Vec<Band>, end: i32) -> Self {
        debug_assert!(!bands.is_empty());
        debug_assert!(bands.windows(2).all(|w| w[0].from < w[1].from));
        let mut cum = Vec::with_capacity(bands.len());
        let mut total = 0;
        for (i, band) in bands.iter().enumerate() {
            cum.push(total);
            let to = if i + 1 < bands.len() { bands[i + 1].from } else { end };
            debug_assert!((to - band.from) % band.tick == 0);
            total += (to - band.from) / band.tick;
        }
        Self { bands, end, cum }
    }

    /// Hong Kong equity/warrant grid, prices scaled ×1000.
    pub fn hk() -> Self {
        Self::new(
            vec![
                Band { from: 10, tick: 1 },
                Band { from: 250, tick: 5 },
                Band { from: 500, tick: 10 },
                Band { from: 10_000, tick: 20 },
                Band { from: 20_000, tick: 50 },
                Band { from: 100_000, tick: 100 },
                Band { from: 200_000, tick: 200 },
                Band { from: 500_000, tick: 500 },
                Band { from: 1_000_000, tick: 1_000 },
                Band { from: 2_000_000, tick: 2_000 },
                Band { from: 5_000_000, tick: 5_000 },
            ],
            9_995_000,
        )
    }

    fn band_index(&self, price: i32) -> usize {
        match self.bands.binary_search_by(|b| b.from.cmp(&price)) {
            Ok(i) => i,
            Err(0) => 0,
            Err(i) => i - 1,
        }
    }

    /// Tick level for a price, rounding down to the grid. Prices below the
    /// table start clamp to `MIN_TICK_LEVEL`.
    pub fn price_to_tick(&self, price: i32) -> i32 {
        if price <= self.bands[0].from {
            return MIN_TICK_LEVEL;
        }
        let price = price.min(self.end);
        let i = self.band_index(price);
        let b = self.bands[i];
        MIN_TICK_LEVEL + self.cum[i] + (price - b.from) / b.tick
    }

    /// Price at a tick level. Levels below `MIN_TICK_LEVEL` clamp to the
    /// table start.
    pub fn tick_to_price(&self, level: i32) -> i32 {
        let offset = (level - MIN_TICK_LEVEL).max(0);
        // Find the band whose cumulative range contains the offset.
        let mut i = match self.cum.binary_search(&offset) {
            Ok(i) => i,
            Err(0) => 0,
            Err(i) => i - 1,
        };
        // Exact cum hits can land on the next band's start; both map to the
        // same price, so normalize to the later band.
        while i + 1 < self.bands.len() && self.cum[i + 1] <= offset {
            i += 1;
        }
        let b = self.bands[i];
        (b.from + (offset - self.cum[i]) * b.tick).min(self.end)
    }

    /// Tick size governing increments upward from `price`. At an exact band
    /// boundary the upper band's tick applies.
    pub fn price_to_tick_size(&self, price: i32) -> i32 {
        let i = self.band_index(price.max(self.bands[0].from).min(self.end));
        self.bands[i].tick
    }

    pub fn min_price(&self) -> i32 {
        self.bands[0].from
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_across_bands() {
        let t = SpreadTable::hk();
        for price in [10, 11, 249, 250, 255, 495, 500, 510, 9_980, 10_000, 100_000, 100_100] {
            let level = t.price_to_tick(price);
            assert_eq!(t.tick_to_price(level), price, "price {price}");
        }
    }

    #[test]
    fn adjacent_levels_differ_by_band_tick() {
        let t = SpreadTable::hk();
        let level = t.price_to_tick(100_000);
        assert_eq!(t.tick_to_price(level + 1) - t.tick_to_price(level), 100);
        let level = t.price_to_tick(240);
        assert_eq!(t.tick_to_price(level + 1) - t.tick_to_price(level), 1);
    }

    #[test]
    fn boundary_uses_upper_band_tick() {
        let t = SpreadTable::hk();
        assert_eq!(t.price_to_tick_size(250), 5);
        assert_eq!(t.price_to_tick_size(249), 1);
        assert_eq!(t.price_to_tick_size(100_000), 100);
    }

    #[test]
    fn spread_of_one_tick_at_hundred_dollars() {
        let t = SpreadTable::hk();
        assert_eq!(t.price_to_tick(100_100) - t.price_to_tick(100_000), 1);
        assert_eq!(t.price_to_tick(100_200) - t.price_to_tick(100_000), 2);
    }

    #[test]
    fn below_table_clamps_to_min_level() {
        let t = SpreadTable::hk();
        assert_eq!(t.price_to_tick(0), MIN_TICK_LEVEL);
        assert_eq!(t.tick_to_price(0), 10);
    }
}
