//! Call/put sign asymmetry.
//!
//! Every directional comparison in the automaton flips between calls and
//! puts: which interval bound anchors a bucket, which underlying side is
//! "the bid", which direction a stop-loss may ratchet. Selected once at
//! construction and held as an owned value.

use crate::domain::{Greeks, OptionSide, SpotInterval, WEIGHTED_AVERAGE_SCALE};
use crate::params::MarketOutlook;
use crate::pricing::{BucketPredictor, ScaleFormula};
use crate::signal::UnderlyingSignals;

pub trait Polarity {
    fn side(&self) -> OptionSide;

    fn desirable_outlook(&self) -> MarketOutlook;
    fn undesirable_outlook(&self) -> MarketOutlook;

    /// The interval bound the warrant price is anchored to.
    fn bucket_anchor(&self, interval: &SpotInterval) -> i64;

    /// Spot at the underlying level the position exits into.
    fn underlying_bid_spot(&self, und: &UnderlyingSignals) -> i64;
    fn prev_underlying_bid_spot(&self, und: &UnderlyingSignals) -> i64;

    /// Spot strictly past `value` in the favorable direction.
    fn is_spot_beyond(&self, spot: i64, value: i64) -> bool;
    fn is_spot_at_or_beyond(&self, spot: i64, value: i64) -> bool;
    /// Spot past `value` in the adverse direction.
    fn is_spot_behind(&self, spot: i64, value: i64) -> bool;

    fn update_best_spot(&self, best: i64, spot: i64) -> i64;

    /// The tighter (more protective) of two stop losses.
    fn favored_stop(&self, a: i64, b: i64) -> i64;
    /// The looser of two stop losses.
    fn relaxed_stop(&self, a: i64, b: i64) -> i64;
    /// Loosen a stop by an amount.
    fn relax_stop_by(&self, stop: i64, amount: i64) -> i64;
    /// A revision may only tighten.
    fn can_update_stop(&self, target: i64, current: i64) -> bool;

    /// Gamma-adjusted spot change implied by a warrant price change.
    fn spot_change_required(
        &self,
        scale: &dyn ScaleFormula,
        conv_ratio: i32,
        greeks: Greeks,
        spot: i64,
        price_change: i32,
    ) -> i64;

    /// Remaining delta-share capacity under a symmetric threshold.
    fn available_delta_shares(&self, current: i64, threshold: i64) -> i64;

    /// Interval containing the spot plus the adjacent interval in the
    /// favorable direction.
    fn overlap_and_next(
        &self,
        pricer: &dyn BucketPredictor,
        spot: i64,
        out: &mut SpotInterval,
        out_next: &mut SpotInterval,
    ) -> bool;
}

pub struct CallPolarity;
pub struct PutPolarity;

pub static CALL: CallPolarity = CallPolarity;
pub static PUT: PutPolarity = PutPolarity;

pub fn polarity_for(side: OptionSide) -> &'static dyn Polarity {
    match side {
        OptionSide::Put => &PUT,
        _ => &CALL,
    }
}

impl Polarity for CallPolarity {
    fn side(&self) -> OptionSide {
        OptionSide::Call
    }

    fn desirable_outlook(&self) -> MarketOutlook {
        MarketOutlook::Bullish
    }

    fn undesirable_outlook(&self) -> MarketOutlook {
        MarketOutlook::Bearish
    }

    fn bucket_anchor(&self, interval: &SpotInterval) -> i64 {
        interval.begin
    }

    fn underlying_bid_spot(&self, und: &UnderlyingSignals) -> i64 {
        und.bid_price() as i64 * WEIGHTED_AVERAGE_SCALE
    }

    fn prev_underlying_bid_spot(&self, und: &UnderlyingSignals) -> i64 {
        und.prev_bid_price() as i64 * WEIGHTED_AVERAGE_SCALE
    }

    fn is_spot_beyond(&self, spot: i64, value: i64) -> bool {
        spot > value
    }

    fn is_spot_at_or_beyond(&self, spot: i64, value: i64) -> bool {
        spot >= value
    }

    fn is_spot_behind(&self, spot: i64, value: i64) -> bool {
        spot < value
    }

    fn update_best_spot(&self, best: i64, spot: i64) -> i64 {
        best.max(spot)
    }

    fn favored_stop(&self, a: i64, b: i64) -> i64 {
        a.max(b)
    }

    fn relaxed_stop(&self, a: i64, b: i64) -> i64 {
        a.min(b)
    }

    fn relax_stop_by(&self, stop: i64, amount: i64) -> i64 {
        stop - amount
    }

    fn can_update_stop(&self, target: i64, current: i64) -> bool {
        target >= current
    }

    fn spot_change_required(
        &self,
        scale: &dyn ScaleFormula,
        conv_ratio: i32,
        greeks: Greeks,
        spot: i64,
        price_change: i32,
    ) -> i64 {
        let adjusted_delta = scale.adjusted_delta(spot, greeks);
        scale.spot_change_for_price_change_call(price_change, conv_ratio, adjusted_delta, greeks)
    }

    fn available_delta_shares(&self, current: i64, threshold: i64) -> i64 {
        threshold - current
    }

    fn overlap_and_next(
        &self,
        pricer: &dyn BucketPredictor,
        spot: i64,
        out: &mut SpotInterval,
        out_next: &mut SpotInterval,
    ) -> bool {
        pricer.overlap_and_greater_interval(spot, out, out_next)
    }
}

impl Polarity for PutPolarity {
    fn side(&self) -> OptionSide {
        OptionSide::Put
    }

    fn desirable_outlook(&self) -> MarketOutlook {
        MarketOutlook::Bearish
    }

    fn undesirable_outlook(&self) -> MarketOutlook {
        MarketOutlook::Bullish
    }

    fn bucket_anchor(&self, interval: &SpotInterval) -> i64 {
        interval.end - 1
    }

    fn underlying_bid_spot(&self, und: &UnderlyingSignals) -> i64 {
        und.ask_price() as i64 * WEIGHTED_AVERAGE_SCALE
    }

    fn prev_underlying_bid_spot(&self, und: &UnderlyingSignals) -> i64 {
        und.prev_ask_price() as i64 * WEIGHTED_AVERAGE_SCALE
    }

    fn is_spot_beyond(&self, spot: i64, value: i64) -> bool {
        spot < value
    }

    fn is_spot_at_or_beyond(&self, spot: i64, value: i64) -> bool {
        spot <= value
    }

    fn is_spot_behind(&self, spot: i64, value: i64) -> bool {
        spot > value
    }

    fn update_best_spot(&self, best: i64, spot: i64) -> i64 {
        if spot > 0 {
            if best == 0 {
                spot
            } else {
                best.min(spot)
            }
        } else {
            best
        }
    }

    fn favored_stop(&self, a: i64, b: i64) -> i64 {
        a.min(b)
    }

    fn relaxed_stop(&self, a: i64, b: i64) -> i64 {
        a.max(b)
    }

    fn relax_stop_by(&self, stop: i64, amount: i64) -> i64 {
        stop + amount
    }

    fn can_update_stop(&self, target: i64, current: i64) -> bool {
        target <= current
    }

    fn spot_change_required(
        &self,
        scale: &dyn ScaleFormula,
        conv_ratio: i32,
        greeks: Greeks,
        spot: i64,
        price_change: i32,
    ) -> i64 {
        let adjusted_delta = scale.adjusted_delta(spot, greeks);
        scale.spot_change_for_price_change_put(price_change, conv_ratio, adjusted_delta, greeks)
    }

    fn available_delta_shares(&self, current: i64, threshold: i64) -> i64 {
        threshold + current
    }

    fn overlap_and_next(
        &self,
        pricer: &dyn BucketPredictor,
        spot: i64,
        out: &mut SpotInterval,
        out_next: &mut SpotInterval,
    ) -> bool {
        pricer.overlap_and_smaller_interval(spot, out, out_next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_stops_ratchet_upward_puts_downward() {
        assert_eq!(CALL.favored_stop(100, 90), 100);
        assert_eq!(PUT.favored_stop(100, 90), 90);
        assert!(CALL.can_update_stop(100, 90));
        assert!(!CALL.can_update_stop(80, 90));
        assert!(PUT.can_update_stop(80, 90));
        assert!(!PUT.can_update_stop(100, 90));
    }

    #[test]
    fn put_best_spot_ignores_dead_quotes() {
        assert_eq!(PUT.update_best_spot(0, 500), 500);
        assert_eq!(PUT.update_best_spot(500, 0), 500);
        assert_eq!(PUT.update_best_spot(500, 400), 400);
        assert_eq!(CALL.update_best_spot(500, 400), 500);
    }

    #[test]
    fn bucket_anchor_uses_opposite_bounds() {
        let iv = SpotInterval::new(100, 200, 5000);
        assert_eq!(CALL.bucket_anchor(&iv), 100);
        assert_eq!(PUT.bucket_anchor(&iv), 199);
    }
}
