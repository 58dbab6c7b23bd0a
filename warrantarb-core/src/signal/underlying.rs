//! Underlying-side signal generator: spot estimation and tight-spread
//! classification.
//!
//! One instance per underlying, shared by every warrant on it. Each book
//! tick recomputes best bid/ask and, when both sides are present and the
//! feed is not recovering, the spot estimate: the mid price, and — when
//! the spread is exactly one tick — a size-weighted average where each
//! side is weighted by the *opposite* side's displayed size.
//!
//! Observer ordering is load-bearing: an ascending spot notifies put-side
//! warrants first, a descending spot call-side first. The context applies
//! the ordering from `SpotSignal::ascending`; previous-tick snapshots roll
//! only after all observers have been notified.

use crate::domain::{BookSnapshot, SpreadTable, TriggerInfo, WEIGHTED_AVERAGE_SCALE};

/// Spot update to fan out to the side-ordered observer lists.
#[derive(Debug, Clone, Copy)]
pub struct SpotSignal {
    pub nano_of_day: i64,
    pub weighted_average: i64,
    pub mid_price: i64,
    pub is_tight: bool,
    /// `weighted_average > prev_weighted_average` at emission time.
    pub ascending: bool,
    pub trigger: TriggerInfo,
}

/// Outcome of one underlying book tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct UndBookOutcome {
    pub spot: Option<SpotSignal>,
    /// New ask-side tick size, notified to put-side warrants.
    pub ask_tick_size_changed: Option<i32>,
    /// New bid-side tick size, notified to call-side warrants.
    pub bid_tick_size_changed: Option<i32>,
}

#[derive(Debug)]
pub struct UnderlyingSignals {
    table: SpreadTable,

    last_tick_ns: i64,
    best_bid_price: i32,
    best_bid_level: i32,
    best_bid_size: i64,
    best_ask_price: i32,
    best_ask_level: i32,
    best_ask_size: i64,
    prev_best_bid_price: i32,
    prev_best_ask_price: i32,
    spread: i32,
    prev_spread: i32,
    is_tight: bool,
    is_prev_tight: bool,
    ask_tick_size: i32,
    bid_tick_size: i32,
    weighted_average: i64,
    mid_price: i64,
    prev_weighted_average: i64,
    prev_mid_price: i64,
}

impl UnderlyingSignals {
    pub fn new(table: SpreadTable) -> Self {
        Self {
            table,
            last_tick_ns: 0,
            best_bid_price: 0,
            best_bid_level: 0,
            best_bid_size: 0,
            best_ask_price: 0,
            best_ask_level: 0,
            best_ask_size: 0,
            prev_best_bid_price: 0,
            prev_best_ask_price: 0,
            spread: i32::MAX,
            prev_spread: i32::MAX,
            is_tight: false,
            is_prev_tight: false,
            ask_tick_size: 0,
            bid_tick_size: 0,
            weighted_average: 0,
            mid_price: 0,
            prev_weighted_average: 0,
            prev_mid_price: 0,
        }
    }

    pub fn reset(&mut self) {
        self.best_bid_price = 0;
        self.best_bid_level = 0;
        self.best_bid_size = 0;
        self.best_ask_price = 0;
        self.best_ask_level = 0;
        self.best_ask_size = 0;
        self.prev_best_bid_price = 0;
        self.prev_best_ask_price = 0;
        self.spread = i32::MAX;
        self.prev_spread = i32::MAX;
        self.is_tight = false;
        self.is_prev_tight = false;
        self.last_tick_ns = 0;
    }

    /// Recompute best levels and the spot estimate from a fresh snapshot.
    /// Previous-tick values stay untouched until `finish_tick`.
    pub fn apply_book(&mut self, timestamp: i64, book: &BookSnapshot) -> UndBookOutcome {
        self.last_tick_ns = timestamp;
        self.is_tight = false;
        self.spread = i32::MAX;
        let mut outcome = UndBookOutcome::default();

        match book.best_bid() {
            Some(bid) => {
                self.best_bid_price = bid.price;
                self.best_bid_size = bid.qty;
                self.best_bid_level = bid.tick_level;
            }
            None => {
                self.best_bid_price = 0;
                self.best_bid_size = 0;
                self.best_bid_level = 0;
            }
        }

        match book.best_ask() {
            Some(ask) => {
                self.best_ask_price = ask.price;
                self.best_ask_size = ask.qty;
                self.best_ask_level = ask.tick_level;

                if self.best_bid_price != 0 {
                    self.spread = self.best_ask_level - self.best_bid_level;
                    if !book.is_recovery {
                        self.mid_price = (self.best_ask_price as i64 + self.best_bid_price as i64)
                            * WEIGHTED_AVERAGE_SCALE
                            / 2;
                        if self.spread == 1 {
                            self.is_tight = true;
                            let weighted = (self.best_ask_price as f64 * self.best_bid_size as f64
                                + self.best_bid_price as f64 * self.best_ask_size as f64)
                                / (self.best_bid_size + self.best_ask_size) as f64;
                            self.weighted_average =
                                (weighted * WEIGHTED_AVERAGE_SCALE as f64) as i64;
                        } else {
                            self.weighted_average = self.mid_price;
                        }
                        outcome.spot = Some(SpotSignal {
                            nano_of_day: self.last_tick_ns,
                            weighted_average: self.weighted_average,
                            mid_price: self.mid_price,
                            is_tight: self.is_tight,
                            ascending: self.weighted_average > self.prev_weighted_average,
                            trigger: book.trigger,
                        });
                    }
                }
            }
            None => {
                self.best_ask_price = 0;
                self.best_ask_size = 0;
                self.best_ask_level = 0;
            }
        }

        if self.prev_best_ask_price != self.best_ask_price && self.best_ask_price != 0 {
            let tick_below_ask = self.table.tick_to_price(self.best_ask_level - 1);
            let tick_size = self.best_ask_price - tick_below_ask;
            if tick_size != self.ask_tick_size {
                self.ask_tick_size = tick_size;
                outcome.ask_tick_size_changed = Some(tick_size);
            }
        }
        if self.prev_best_bid_price != self.best_bid_price && self.best_bid_price != 0 {
            let tick_size = self.table.price_to_tick_size(self.best_bid_price);
            if tick_size != self.bid_tick_size {
                self.bid_tick_size = tick_size;
                outcome.bid_tick_size_changed = Some(tick_size);
            }
        }

        outcome
    }

    /// Roll previous-tick snapshots; call after all observers have seen the
    /// update.
    pub fn finish_tick(&mut self) {
        self.prev_best_bid_price = self.best_bid_price;
        self.prev_best_ask_price = self.best_ask_price;
        self.prev_spread = self.spread;
        self.is_prev_tight = self.is_tight;
        self.prev_weighted_average = self.weighted_average;
        self.prev_mid_price = self.mid_price;
    }

    pub fn bid_price(&self) -> i32 {
        self.best_bid_price
    }

    pub fn ask_price(&self) -> i32 {
        self.best_ask_price
    }

    pub fn prev_bid_price(&self) -> i32 {
        self.prev_best_bid_price
    }

    pub fn prev_ask_price(&self) -> i32 {
        self.prev_best_ask_price
    }

    pub fn is_tight_spread(&self) -> bool {
        self.is_tight
    }

    pub fn is_prev_tight_spread(&self) -> bool {
        self.is_prev_tight
    }

    pub fn weighted_average(&self) -> i64 {
        self.weighted_average
    }

    pub fn prev_weighted_average(&self) -> i64 {
        self.prev_weighted_average
    }

    pub fn mid_price(&self) -> i64 {
        self.mid_price
    }

    pub fn prev_mid_price(&self) -> i64 {
        self.prev_mid_price
    }

    pub fn ask_tick_size(&self) -> i32 {
        self.ask_tick_size
    }

    pub fn bid_tick_size(&self) -> i32 {
        self.bid_tick_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SpreadTable;

    fn book(bids: &[(i32, i64)], asks: &[(i32, i64)]) -> BookSnapshot {
        BookSnapshot::from_prices(&SpreadTable::hk(), bids, asks, TriggerInfo::default())
    }

    #[test]
    fn one_tick_spread_is_tight_and_weights_by_opposite_size() {
        let mut und = UnderlyingSignals::new(SpreadTable::hk());
        let outcome = und.apply_book(1, &book(&[(100_000, 3000)], &[(100_100, 1000)]));
        let spot = outcome.spot.expect("both sides present");
        assert!(spot.is_tight);
        // Ask weighted by bid size: (100_100*3000 + 100_000*1000) / 4000.
        assert_eq!(spot.weighted_average, 100_075_000);
        assert_eq!(spot.mid_price, 100_050_000);
    }

    #[test]
    fn two_tick_spread_collapses_weighted_to_mid() {
        let mut und = UnderlyingSignals::new(SpreadTable::hk());
        let outcome = und.apply_book(1, &book(&[(100_000, 3000)], &[(100_200, 1000)]));
        let spot = outcome.spot.unwrap();
        assert!(!spot.is_tight);
        assert_eq!(spot.weighted_average, spot.mid_price);
        assert_eq!(spot.mid_price, 100_100_000);
    }

    #[test]
    fn ascending_flag_compares_against_previous_weighted() {
        let mut und = UnderlyingSignals::new(SpreadTable::hk());
        let first = und.apply_book(1, &book(&[(100_000, 1000)], &[(100_100, 1000)]));
        assert!(first.spot.unwrap().ascending);
        und.finish_tick();
        let down = und.apply_book(2, &book(&[(99_900, 1000)], &[(100_000, 1000)]));
        assert!(!down.spot.unwrap().ascending);
    }

    #[test]
    fn recovery_suppresses_spot_but_keeps_best_levels() {
        let mut und = UnderlyingSignals::new(SpreadTable::hk());
        let mut snapshot = book(&[(100_000, 1000)], &[(100_100, 1000)]);
        snapshot.is_recovery = true;
        let outcome = und.apply_book(1, &snapshot);
        assert!(outcome.spot.is_none());
        assert_eq!(und.bid_price(), 100_000);
        assert_eq!(und.ask_price(), 100_100);
    }

    #[test]
    fn tick_size_changes_route_by_side() {
        let mut und = UnderlyingSignals::new(SpreadTable::hk());
        let outcome = und.apply_book(1, &book(&[(100_000, 1000)], &[(100_100, 1000)]));
        assert_eq!(outcome.ask_tick_size_changed, Some(100));
        assert_eq!(outcome.bid_tick_size_changed, Some(100));
        und.finish_tick();
        // Same prices: no change notifications.
        let outcome = und.apply_book(2, &book(&[(100_000, 2000)], &[(100_100, 500)]));
        assert!(outcome.ask_tick_size_changed.is_none());
        assert!(outcome.bid_tick_size_changed.is_none());
    }
}
