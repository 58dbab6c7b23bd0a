//! Issuer-underlying delta-limit alerts.
//!
//! One generator per (issuer, underlying). Warrant prints accumulate
//! signed delta shares in a ten-second window; when the delta notional
//! crosses the configured threshold, every sibling warrant is alerted and
//! the ledger restarts.

use tracing::debug;

use crate::domain::{MarketTrade, Security, WEIGHTED_AVERAGE_SCALE};
use crate::params::IssuerUnderlyingParams;
use crate::ports::{BroadcastKind, InfoSender};
use crate::window::RollingSumWindow;

const DELTA_WINDOW_NS: i64 = 10_000_000_000;

/// Spot scale for converting between delta shares and delta notional.
pub fn spot_scale() -> i64 {
    1000 * WEIGHTED_AVERAGE_SCALE
}

/// Delta shares equivalent to a notional at the current spot estimate.
/// A dead spot yields zero, which downstream gates treat as "no capacity".
pub fn delta_shares_for_notional(notional: i64, weighted_average: i64) -> i64 {
    if weighted_average == 0 {
        return 0;
    }
    notional * spot_scale() / weighted_average
}

#[derive(Debug)]
pub struct DeltaLimitGenerator {
    underlying_code: String,
    window: RollingSumWindow,
}

impl DeltaLimitGenerator {
    pub fn new(underlying_code: impl Into<String>) -> Self {
        Self {
            underlying_code: underlying_code.into(),
            window: RollingSumWindow::new(DELTA_WINDOW_NS),
        }
    }

    /// Record the delta shares of one warrant print.
    pub fn on_warrant_trade(&mut self, timestamp: i64, warrant: &Security, trade: &MarketTrade) {
        let delta = warrant.greeks().delta as i64;
        let delta_shares = trade.qty * -trade.side.sign() * delta / (warrant.conv_ratio as i64 * 100);
        self.window.record(timestamp, delta_shares);
    }

    /// Refresh the ledger on a warrant book tick. Returns the absolute
    /// delta notional when the limit is crossed; the caller fans the alert
    /// out to every sibling warrant.
    pub fn on_warrant_book(
        &mut self,
        timestamp: i64,
        weighted_average: i64,
        params: &mut IssuerUnderlyingParams,
        info: &mut dyn InfoSender,
    ) -> Option<i64> {
        self.window.update(timestamp);
        let delta_shares = self.window.sum();
        if params.und_delta_shares == delta_shares {
            return None;
        }
        let notional = delta_shares * weighted_average / spot_scale();
        let abs_notional = notional.abs();
        params.und_delta_shares = delta_shares;
        params.und_trade_vol = abs_notional;
        let mut alert = None;
        if params.und_trade_vol_threshold != 0 && abs_notional >= params.und_trade_vol_threshold {
            debug!(
                underlying = %self.underlying_code,
                notional,
                "delta limit exceeded, broadcasting and resetting"
            );
            params.und_delta_shares = 0;
            params.und_trade_vol = 0;
            self.window.clear();
            alert = Some(abs_notional);
        }
        info.issuer_und_params(params, BroadcastKind::Throttled);
        alert
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Greeks, OptionSide, SpreadTable, TradeSide, UnderlyingKind};
    use crate::params::{
        BucketParams, IssuerParams, UnderlyingParams, WarrantParams,
    };
    use crate::ports::AuditEvent;

    struct NoopInfo;
    impl InfoSender for NoopInfo {
        fn warrant_params(&mut self, _: &WarrantParams, _: BroadcastKind) {}
        fn underlying_params(&mut self, _: &UnderlyingParams, _: BroadcastKind) {}
        fn issuer_params(&mut self, _: &IssuerParams, _: BroadcastKind) {}
        fn issuer_und_params(&mut self, _: &IssuerUnderlyingParams, _: BroadcastKind) {}
        fn bucket_params(&mut self, _: &BucketParams, _: BroadcastKind) {}
        fn send_event(&mut self, _: AuditEvent) {}
    }

    fn warrant() -> Security {
        let sec = Security::new(
            1,
            "18888",
            OptionSide::Call,
            2,
            7,
            UnderlyingKind::Equity,
            SpreadTable::hk(),
            10_000,
            10_000,
        );
        sec.set_greeks(Greeks {
            delta: 50_000,
            gamma: 0,
            vega: 0,
            ref_spot: 100_000,
        });
        sec
    }

    #[test]
    fn alert_fires_when_notional_crosses_threshold_and_ledger_restarts() {
        let mut gen = DeltaLimitGenerator::new("5");
        let warrant = warrant();
        let mut params = IssuerUnderlyingParams::new(7, 2);
        params.und_trade_vol_threshold = 1_000_000;
        let wavg = 100_000 * WEIGHTED_AVERAGE_SCALE;

        // Buy print: 200k shares × 0.5 delta / 10 conv = 1k delta shares.
        gen.on_warrant_trade(
            0,
            &warrant,
            &MarketTrade::new(100, 200_000, TradeSide::Ask, 0),
        );
        let alert = gen.on_warrant_book(1, wavg, &mut params, &mut NoopInfo);
        // 1k delta shares at $100 spot = 100k notional: under the limit.
        assert!(alert.is_none());
        assert_eq!(params.und_delta_shares, 1000);

        for i in 0..10 {
            gen.on_warrant_trade(
                2 + i,
                &warrant,
                &MarketTrade::new(100, 200_000, TradeSide::Ask, 2 + i),
            );
        }
        let alert = gen.on_warrant_book(20, wavg, &mut params, &mut NoopInfo);
        assert_eq!(alert, Some(1_100_000));
        assert_eq!(params.und_delta_shares, 0);
        assert_eq!(params.und_trade_vol, 0);
    }

    #[test]
    fn dead_spot_converts_to_zero_capacity() {
        assert_eq!(delta_shares_for_notional(5_000_000, 0), 0);
        assert_eq!(
            delta_shares_for_notional(5_000_000, 100_000_000),
            5_000_000 * spot_scale() / 100_000_000
        );
    }
}
