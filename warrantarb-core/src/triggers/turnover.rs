//! Turnover-making detection.
//!
//! Issuers occasionally print matched volume against themselves to
//! manufacture turnover. The signature is a pair of opposite-side prints
//! at the same price inside a short window, both of at least the
//! configured size. Detection arms a buy ban and drives the deferred
//! sell-at-turnover-price path in the automaton.

use std::collections::VecDeque;

use tracing::debug;

use crate::domain::MarketTrade;
use crate::params::WarrantParams;

#[derive(Debug)]
pub struct TurnoverDetector {
    code: String,
    recent: VecDeque<MarketTrade>,
}

impl TurnoverDetector {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            recent: VecDeque::with_capacity(16),
        }
    }

    /// Observe a print; returns the turnover price when the matched-pair
    /// signature completes on this trade.
    pub fn on_trade(&mut self, params: &WarrantParams, trade: &MarketTrade) -> Option<i32> {
        if params.turnover_making_size == 0 || params.turnover_making_period == 0 {
            return None;
        }
        let min_ts = trade.nano_of_day - params.turnover_making_period;
        while let Some(front) = self.recent.front() {
            if front.nano_of_day >= min_ts {
                break;
            }
            self.recent.pop_front();
        }
        let detected = trade.qty >= params.turnover_making_size
            && self.recent.iter().any(|prev| {
                prev.price == trade.price
                    && prev.side != trade.side
                    && prev.qty >= params.turnover_making_size
            });
        self.recent.push_back(*trade);
        if detected {
            debug!(code = %self.code, price = trade.price, "turnover making detected");
            Some(trade.price)
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        self.recent.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TradeSide;

    fn trade(price: i32, qty: i64, side: TradeSide, ns: i64) -> MarketTrade {
        MarketTrade::new(price, qty, side, ns)
    }

    fn params(size: i64, period: i64) -> WarrantParams {
        let mut p = WarrantParams::new(1);
        p.turnover_making_size = size;
        p.turnover_making_period = period;
        p
    }

    #[test]
    fn matched_opposite_prints_at_one_price_detect() {
        let mut det = TurnoverDetector::new("18888");
        let p = params(100_000, 50_000_000);
        assert!(det.on_trade(&p, &trade(100, 150_000, TradeSide::Ask, 0)).is_none());
        assert_eq!(
            det.on_trade(&p, &trade(100, 150_000, TradeSide::Bid, 10_000_000)),
            Some(100)
        );
    }

    #[test]
    fn stale_or_small_prints_do_not_detect() {
        let mut det = TurnoverDetector::new("18888");
        let p = params(100_000, 50_000_000);
        det.on_trade(&p, &trade(100, 150_000, TradeSide::Ask, 0));
        // Outside the window.
        assert!(det
            .on_trade(&p, &trade(100, 150_000, TradeSide::Bid, 60_000_000))
            .is_none());
        // Undersized leg.
        det.on_trade(&p, &trade(101, 150_000, TradeSide::Ask, 61_000_000));
        assert!(det
            .on_trade(&p, &trade(101, 50_000, TradeSide::Bid, 62_000_000))
            .is_none());
    }

    #[test]
    fn zero_size_disables_detection() {
        let mut det = TurnoverDetector::new("18888");
        let p = params(0, 50_000_000);
        det.on_trade(&p, &trade(100, 150_000, TradeSide::Ask, 0));
        assert!(det.on_trade(&p, &trade(100, 150_000, TradeSide::Bid, 1)).is_none());
    }
}
