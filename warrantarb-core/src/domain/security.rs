//! Security reference data and live per-security values.
//!
//! Securities are owned by the surrounding reference-data subsystem; the
//! core holds a non-owning `Rc<Security>` handle. Live fields mutated from
//! outside the core (position, pending sell, greeks, last trade, our own
//! resting order) are `Cell`s — all dispatch is single-threaded, so plain
//! interior mutability is enough.

use std::cell::Cell;

use serde::{Deserialize, Serialize};

use super::book::MarketTrade;
use super::spread_table::SpreadTable;

/// Option side of a warrant. Underlyings are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionSide {
    Call,
    Put,
    None,
}

/// What kind of instrument the underlying is; selects the price-scale
/// formula variant once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnderlyingKind {
    Equity,
    Index,
}

/// Externally computed risk sensitivities.
///
/// Fixed-point: delta/gamma/vega ×1e5, ref spot ×1e3.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: i32,
    pub gamma: i32,
    pub vega: i32,
    pub ref_spot: i32,
}

/// One listed security: identity plus the live values the rest of the
/// trading stack keeps current.
#[derive(Debug)]
pub struct Security {
    pub sid: u64,
    pub code: String,
    pub side: OptionSide,
    pub underlying_sid: u64,
    pub issuer_sid: u32,
    pub underlying_kind: UnderlyingKind,
    pub spread_table: SpreadTable,
    pub lot_size: i32,
    /// Conversion ratio, scaled ×1000.
    pub conv_ratio: i32,

    position: Cell<i64>,
    pending_sell: Cell<i64>,
    greeks: Cell<Greeks>,
    last_trade: Cell<Option<MarketTrade>>,
    /// Our own resting limit order on the ask, if any.
    limit_order_price: Cell<i32>,
    limit_order_qty: Cell<i64>,
}

impl Security {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sid: u64,
        code: impl Into<String>,
        side: OptionSide,
        underlying_sid: u64,
        issuer_sid: u32,
        underlying_kind: UnderlyingKind,
        spread_table: SpreadTable,
        lot_size: i32,
        conv_ratio: i32,
    ) -> Self {
        Self {
            sid,
            code: code.into(),
            side,
            underlying_sid,
            issuer_sid,
            underlying_kind,
            spread_table,
            lot_size,
            conv_ratio,
            position: Cell::new(0),
            pending_sell: Cell::new(0),
            greeks: Cell::new(Greeks::default()),
            last_trade: Cell::new(None),
            limit_order_price: Cell::new(0),
            limit_order_qty: Cell::new(0),
        }
    }

    pub fn position(&self) -> i64 {
        self.position.get()
    }

    pub fn set_position(&self, qty: i64) {
        self.position.set(qty);
    }

    pub fn pending_sell(&self) -> i64 {
        self.pending_sell.get()
    }

    pub fn set_pending_sell(&self, qty: i64) {
        self.pending_sell.set(qty);
    }

    /// Position not already committed to an outstanding sell.
    pub fn available_position(&self) -> i64 {
        self.position.get() - self.pending_sell.get()
    }

    pub fn greeks(&self) -> Greeks {
        self.greeks.get()
    }

    pub fn set_greeks(&self, greeks: Greeks) {
        self.greeks.set(greeks);
    }

    pub fn last_trade(&self) -> Option<MarketTrade> {
        self.last_trade.get()
    }

    pub fn set_last_trade(&self, trade: MarketTrade) {
        self.last_trade.set(Some(trade));
    }

    pub fn limit_order_price(&self) -> i32 {
        self.limit_order_price.get()
    }

    pub fn limit_order_qty(&self) -> i64 {
        self.limit_order_qty.get()
    }

    pub fn set_limit_order(&self, price: i32, qty: i64) {
        self.limit_order_price.set(price);
        self.limit_order_qty.set(qty);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warrant() -> Security {
        Security::new(
            1,
            "18888",
            OptionSide::Call,
            2,
            7,
            UnderlyingKind::Equity,
            SpreadTable::hk(),
            10_000,
            10_000,
        )
    }

    #[test]
    fn available_position_excludes_pending_sell() {
        let sec = warrant();
        sec.set_position(30_000);
        sec.set_pending_sell(10_000);
        assert_eq!(sec.available_position(), 20_000);
    }
}
