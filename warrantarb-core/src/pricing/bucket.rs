//! Bucket-predictor oracle contract.
//!
//! The predictor learns, from recent joint observations, the range of
//! warrant prices historically associated with a given underlying spot
//! range, and flags when live prices fall outside the learned range. Its
//! internals live outside this crate; the core consumes it through this
//! trait — two instances per warrant, one per pricing mode.

use serde::{Deserialize, Serialize};

use crate::domain::{Greeks, SpotInterval, TriggerInfo};

/// How the underlying's spot estimate is computed, and which predictor is
/// authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PricingMode {
    Unknown,
    Weighted,
    Mid,
    /// Both predictors violated on the same tick; neither is trusted.
    AdjustVol,
}

/// Outcome of feeding one tick to a predictor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Violation {
    None,
    /// Live warrant price below the learned range: the issuer marked
    /// volatility down.
    DownVol,
    /// Live warrant price above the learned range.
    UpVol,
    Inconsistent,
    PriceOverlapped,
    BucketTooBig,
    Error,
}

impl Violation {
    pub fn is_violation(self) -> bool {
        self != Violation::None
    }
}

/// The oracle surface the core depends on. All spots are ×1e6, prices
/// ×1000, spreads in ticks, times in nanoseconds-of-day.
pub trait BucketPredictor {
    /// Feed a warrant book tick.
    fn observe_deriv_tick(
        &mut self,
        nano_of_day: i64,
        bid: i32,
        ask: i32,
        mm_bid: i32,
        mm_ask: i32,
        spread_ticks: i32,
        trigger: TriggerInfo,
    ) -> Violation;

    /// Feed an underlying spot tick. On violation the predictor reports the
    /// interval the price fell out of through `out_interval`.
    fn observe_und_tick(
        &mut self,
        nano_of_day: i64,
        spot: i64,
        is_tight_spread: bool,
        trigger: TriggerInfo,
        out_interval: &mut SpotInterval,
    ) -> Violation;

    fn observe_greeks(&mut self, nano_of_day: i64, greeks: Greeks);

    /// Interval containing the spot; false when the spot is outside every
    /// learned bucket.
    fn interval_by_und_spot(&self, spot: i64, out: &mut SpotInterval) -> bool;

    /// Interval containing the spot plus the adjacent greater interval.
    fn overlap_and_greater_interval(
        &self,
        spot: i64,
        out: &mut SpotInterval,
        out_greater: &mut SpotInterval,
    ) -> bool;

    /// Interval containing the spot plus the adjacent smaller interval.
    fn overlap_and_smaller_interval(
        &self,
        spot: i64,
        out: &mut SpotInterval,
        out_smaller: &mut SpotInterval,
    ) -> bool;

    /// Learned interval for a warrant price, observed buckets only.
    fn interval_by_deriv_price(&self, price: i32, out: &mut SpotInterval) -> bool;

    /// Learned interval for a warrant price, extrapolating beyond the
    /// observed buckets.
    fn interval_by_deriv_price_with_extrapolation(&self, price: i32, out: &mut SpotInterval)
        -> bool;

    fn target_spread_ticks(&self) -> i32;

    /// True when the live mm spread has diverged from the spread the
    /// buckets were collected at.
    fn has_target_spread_changed(&self) -> bool;

    /// As above, and on change registers the current underlying interval so
    /// collection restarts anchored to the live market.
    fn has_target_spread_changed_and_register(
        &mut self,
        nano_of_day: i64,
        mm_bid: i32,
        mm_ask: i32,
        spread_ticks: i32,
    ) -> bool;

    fn reset_target_spread(&mut self, nano_of_day: i64, target_spread_ticks: i32);

    /// Drop collected buckets and restart collection at the given spread.
    fn reset_and_set_target_spread(&mut self, target_spread_ticks: i32);

    /// Drop collected buckets.
    fn reset(&mut self, nano_of_day: i64);

    /// Drop collected buckets, seeding collection with a known-good
    /// interval.
    fn reset_and_register(&mut self, nano_of_day: i64, interval: &SpotInterval);

    fn set_issuer_max_lag(&mut self, max_lag_ns: i64);

    /// Full wipe, used on strategy reset.
    fn clear(&mut self);
}

/// Construction parameters handed to the external predictor factory.
#[derive(Debug, Clone, Copy)]
pub struct PredictorConfig {
    pub mode: PricingMode,
    pub underlying_sid: u64,
    pub warrant_sid: u64,
    pub side: crate::domain::OptionSide,
    /// Conversion ratio ×1000, pre-divided for index underlyings.
    pub conv_ratio: i32,
    pub issuer_max_lag_ns: i64,
    /// Delta allowance, ×1000.
    pub delta_allowance: i32,
}

/// Factory the embedding application supplies; one predictor per pricing
/// mode per warrant.
pub trait BucketPredictorFactory {
    fn create(&self, config: &PredictorConfig) -> Box<dyn BucketPredictor>;
}
