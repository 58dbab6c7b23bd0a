//! Market-data views consumed by the core.
//!
//! The live order book is owned and maintained outside the core; each tick
//! the dispatcher hands over a flat snapshot of the price levels. Snapshots
//! carry a `TriggerInfo` sequence number for causal ordering in logs and
//! audit — never for control flow.

use serde::{Deserialize, Serialize};

use super::spread_table::SpreadTable;

/// Monotonically increasing per-tick sequence number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerInfo {
    pub seq_num: u64,
    pub nano_of_day: i64,
}

/// One displayed price level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: i32,
    pub qty: i64,
    /// Tick level per the security's spread table.
    pub tick_level: i32,
}

/// Flat order-book snapshot: bids best-first descending, asks best-first
/// ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    /// Set while the feed is recovering/replaying; spot estimation is
    /// suppressed until clear.
    pub is_recovery: bool,
    pub trigger: TriggerInfo,
}

impl BookSnapshot {
    pub fn best_bid(&self) -> Option<BookLevel> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<BookLevel> {
        self.asks.first().copied()
    }

    /// Test/feed helper: build a snapshot from (price, qty) pairs, deriving
    /// tick levels from the spread table.
    pub fn from_prices(
        table: &SpreadTable,
        bids: &[(i32, i64)],
        asks: &[(i32, i64)],
        trigger: TriggerInfo,
    ) -> Self {
        let level = |&(price, qty): &(i32, i64)| BookLevel {
            price,
            qty,
            tick_level: table.price_to_tick(price),
        };
        Self {
            bids: bids.iter().map(level).collect(),
            asks: asks.iter().map(level).collect(),
            is_recovery: false,
            trigger,
        }
    }
}

/// Aggressor side of a print: `Ask` means the buyer lifted the offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    Bid,
    Ask,
}

impl TradeSide {
    /// Numeric convention carried over from the wire format: bid +1, ask -1.
    pub fn sign(self) -> i64 {
        match self {
            TradeSide::Bid => 1,
            TradeSide::Ask => -1,
        }
    }
}

/// One market print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketTrade {
    pub price: i32,
    pub qty: i64,
    pub side: TradeSide,
    pub nano_of_day: i64,
    pub trigger: TriggerInfo,
}

impl MarketTrade {
    pub fn new(price: i32, qty: i64, side: TradeSide, nano_of_day: i64) -> Self {
        Self {
            price,
            qty,
            side,
            nano_of_day,
            trigger: TriggerInfo {
                seq_num: 0,
                nano_of_day,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_prices_assigns_tick_levels() {
        let table = SpreadTable::hk();
        let book = BookSnapshot::from_prices(
            &table,
            &[(100_000, 500)],
            &[(100_100, 700)],
            TriggerInfo::default(),
        );
        let bid = book.best_bid().unwrap();
        let ask = book.best_ask().unwrap();
        assert_eq!(ask.tick_level - bid.tick_level, 1);
        assert_eq!(bid.qty, 500);
    }

    #[test]
    fn trade_side_signs_follow_wire_convention() {
        assert_eq!(TradeSide::Bid.sign(), 1);
        assert_eq!(TradeSide::Ask.sign(), -1);
    }
}
