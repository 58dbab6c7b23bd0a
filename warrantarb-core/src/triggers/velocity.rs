//! Velocity trigger: signed traded notional over a short rolling window of
//! underlying prints.
//!
//! One generator per (underlying, window length); all warrants on the
//! underlying read the same instance. Calls trigger on positive velocity,
//! puts on negative.

use std::collections::VecDeque;

use crate::domain::{MarketTrade, OptionSide};
use crate::params::UnderlyingParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TriggerStrength {
    None,
    Weak,
    Medium,
    Strong,
}

#[derive(Debug)]
pub struct VelocityTrigger {
    window_ns: i64,
    max_entries: usize,
    entries: VecDeque<(i64, i64)>,
    velocity: i64,
}

impl VelocityTrigger {
    pub fn new(window_ns: i64, max_entries: usize) -> Self {
        Self {
            window_ns,
            max_entries,
            entries: VecDeque::with_capacity(max_entries.min(1024)),
            velocity: 0,
        }
    }

    pub fn on_trade(&mut self, timestamp: i64, trade: &MarketTrade) {
        let net = -trade.side.sign() * trade.qty * trade.price as i64;
        self.velocity += net;
        self.maintain(timestamp);
        if self.entries.len() == self.max_entries {
            if let Some((_, v)) = self.entries.pop_front() {
                self.velocity -= v;
            }
        }
        self.entries.push_back((timestamp, net));
    }

    pub fn on_book_updated(&mut self, timestamp: i64) {
        self.maintain(timestamp);
    }

    fn maintain(&mut self, timestamp: i64) {
        let min_ts = timestamp - self.window_ns;
        while let Some(&(ts, v)) = self.entries.front() {
            if ts >= min_ts {
                break;
            }
            self.velocity -= v;
            self.entries.pop_front();
        }
    }

    pub fn is_triggered(&self, side: OptionSide, params: &UnderlyingParams) -> bool {
        match side {
            OptionSide::Call => self.velocity >= params.velocity_threshold,
            OptionSide::Put => -self.velocity >= params.velocity_threshold,
            OptionSide::None => false,
        }
    }

    pub fn strength(&self, side: OptionSide, params: &UnderlyingParams) -> TriggerStrength {
        let v = match side {
            OptionSide::Call => self.velocity,
            OptionSide::Put => -self.velocity,
            OptionSide::None => return TriggerStrength::None,
        };
        if v > params.velocity_threshold3 {
            TriggerStrength::Strong
        } else if v > params.velocity_threshold2 {
            TriggerStrength::Medium
        } else if v > params.velocity_threshold {
            TriggerStrength::Weak
        } else {
            TriggerStrength::None
        }
    }

    pub fn velocity(&self) -> i64 {
        self.velocity
    }

    pub fn reset(&mut self) {
        self.velocity = 0;
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TradeSide;

    fn trade(price: i32, qty: i64, side: TradeSide, ns: i64) -> MarketTrade {
        MarketTrade::new(price, qty, side, ns)
    }

    fn params(threshold: i64) -> UnderlyingParams {
        let mut p = UnderlyingParams::new(2);
        p.velocity_threshold = threshold;
        p.velocity_threshold2 = threshold * 2;
        p.velocity_threshold3 = threshold * 4;
        p
    }

    #[test]
    fn buys_accumulate_positive_velocity_for_calls() {
        let mut vel = VelocityTrigger::new(5_000_000, 64);
        vel.on_trade(1_000, &trade(100_000, 1000, TradeSide::Ask, 1_000));
        assert_eq!(vel.velocity(), 100_000_000);
        let p = params(50_000_000);
        assert!(vel.is_triggered(OptionSide::Call, &p));
        assert!(!vel.is_triggered(OptionSide::Put, &p));
        assert_eq!(vel.strength(OptionSide::Call, &p), TriggerStrength::Weak);
    }

    #[test]
    fn stale_prints_age_out_of_the_window() {
        let mut vel = VelocityTrigger::new(5_000_000, 64);
        vel.on_trade(0, &trade(100_000, 1000, TradeSide::Ask, 0));
        vel.on_book_updated(6_000_000);
        assert_eq!(vel.velocity(), 0);
    }

    #[test]
    fn sells_drive_put_triggers() {
        let mut vel = VelocityTrigger::new(5_000_000, 64);
        vel.on_trade(0, &trade(100_000, 3000, TradeSide::Bid, 0));
        let p = params(100_000_000);
        assert!(vel.is_triggered(OptionSide::Put, &p));
        assert_eq!(vel.strength(OptionSide::Put, &p), TriggerStrength::Medium);
    }

    #[test]
    fn reset_clears_accumulated_state() {
        let mut vel = VelocityTrigger::new(5_000_000, 64);
        vel.on_trade(0, &trade(100_000, 1000, TradeSide::Ask, 0));
        vel.reset();
        assert_eq!(vel.velocity(), 0);
    }
}
