//! Numeric scale bridge: pure conversions between warrant price ticks and
//! underlying spot moves, parameterized by delta/gamma and the conversion
//! ratio.
//!
//! Two variants exist: a generic one parameterized by both price scales
//! (used for index underlyings, whose point scale differs from the price
//! grid), and an equity-tuned one with both scales fixed at 1000. Selected
//! once per security at construction and held as an owned value.
//!
//! Unit conventions: prices ×1000, spots ×1e6, delta/gamma ×1e5,
//! conversion ratio ×1000. `adjusted_delta` stays in delta units (×1e5);
//! `adjusted_delta_c` is the per-conversion-unit form
//! (`adjusted_delta / (conv_ratio × 100)`).

use crate::domain::{Greeks, WEIGHTED_AVERAGE_SCALE};

/// Pure, side-effect-free scale conversions.
pub trait ScaleFormula {
    /// Warrant price movement (×1000, fractional) implied by one underlying
    /// tick.
    fn price_per_underlying_tick(&self, und_tick_size: i32, greeks: Greeks, conv_ratio: i32) -> f64;

    /// Delta linearly corrected for gamma by the spot's distance from the
    /// greeks' reference spot. Result in delta units (×1e5).
    fn adjusted_delta(&self, spot: i64, greeks: Greeks) -> f64;

    /// Spot change needed for a warrant price change, per-conversion-unit
    /// delta form.
    fn spot_change_for_price_change_c(&self, price_change: i32, adjusted_delta_c: f64) -> i64;

    /// Spot change needed for a warrant price change, linear in delta.
    fn spot_change_for_price_change(
        &self,
        price_change: i32,
        conv_ratio: i32,
        adjusted_delta: f64,
    ) -> i64;

    /// Gamma-adjusted spot change for a call: positive root of the
    /// delta/gamma quadratic. Falls back to the linear form when gamma is
    /// zero.
    fn spot_change_for_price_change_call(
        &self,
        price_change: i32,
        conv_ratio: i32,
        adjusted_delta: f64,
        greeks: Greeks,
    ) -> i64;

    /// Gamma-adjusted spot change for a put: the opposite root.
    fn spot_change_for_price_change_put(
        &self,
        price_change: i32,
        conv_ratio: i32,
        adjusted_delta: f64,
        greeks: Greeks,
    ) -> i64;

    /// Fractional warrant price change for a spot change.
    fn price_change_for_spot_change(
        &self,
        spot_change: i64,
        conv_ratio: i32,
        adjusted_delta: f64,
    ) -> f64;

    /// Spot buffer implied by a tick buffer (buffer scaled ×1000).
    fn spot_buffer_from_tick_buffer(
        &self,
        wrt_tick_size: i32,
        tick_buffer: i32,
        adjusted_delta_c: f64,
    ) -> i64;
}

/// Generic variant parameterized by warrant and underlying price scales.
#[derive(Debug, Clone, Copy)]
pub struct GenericScaleFormula {
    wrt_price_scale: i64,
    und_price_scale: i64,
    spot_scale: i64,
    wrt_to_spot_scale: i64,
}

impl GenericScaleFormula {
    pub fn new(wrt_price_scale: i64, und_price_scale: i64) -> Self {
        let spot_scale = und_price_scale * WEIGHTED_AVERAGE_SCALE;
        Self {
            wrt_price_scale,
            und_price_scale,
            spot_scale,
            wrt_to_spot_scale: spot_scale / wrt_price_scale,
        }
    }
}

impl ScaleFormula for GenericScaleFormula {
    fn price_per_underlying_tick(&self, und_tick_size: i32, greeks: Greeks, conv_ratio: i32) -> f64 {
        let tick = und_tick_size as f64;
        let linear = tick * greeks.delta as f64;
        let convex = 0.5 * tick * tick * greeks.gamma as f64 / self.und_price_scale as f64;
        self.wrt_price_scale as f64 * (linear + convex).abs()
            / (conv_ratio as f64 * 100.0 * self.und_price_scale as f64)
    }

    fn adjusted_delta(&self, spot: i64, greeks: Greeks) -> f64 {
        let drift = (spot - greeks.ref_spot as i64 * WEIGHTED_AVERAGE_SCALE) as f64;
        drift * greeks.gamma as f64 / self.spot_scale as f64 + greeks.delta as f64
    }

    fn spot_change_for_price_change_c(&self, price_change: i32, adjusted_delta_c: f64) -> i64 {
        (price_change as f64 * self.wrt_to_spot_scale as f64 / adjusted_delta_c) as i64
    }

    fn spot_change_for_price_change(
        &self,
        price_change: i32,
        conv_ratio: i32,
        adjusted_delta: f64,
    ) -> i64 {
        (price_change as f64 * conv_ratio as f64 * 100.0 * self.wrt_to_spot_scale as f64
            / adjusted_delta) as i64
    }

    fn spot_change_for_price_change_call(
        &self,
        price_change: i32,
        conv_ratio: i32,
        adjusted_delta: f64,
        greeks: Greeks,
    ) -> i64 {
        if greeks.gamma == 0 {
            return self.spot_change_for_price_change(price_change, conv_ratio, adjusted_delta);
        }
        let gamma = greeks.gamma as f64;
        let discriminant = adjusted_delta * adjusted_delta
            + gamma * conv_ratio as f64 * 200.0 * price_change as f64 / self.wrt_price_scale as f64;
        (self.spot_scale as f64 * (-adjusted_delta + discriminant.sqrt()) / gamma) as i64
    }

    fn spot_change_for_price_change_put(
        &self,
        price_change: i32,
        conv_ratio: i32,
        adjusted_delta: f64,
        greeks: Greeks,
    ) -> i64 {
        if greeks.gamma == 0 {
            return self.spot_change_for_price_change(price_change, conv_ratio, adjusted_delta);
        }
        let gamma = greeks.gamma as f64;
        let discriminant = adjusted_delta * adjusted_delta
            + gamma * conv_ratio as f64 * 200.0 * price_change as f64 / self.wrt_price_scale as f64;
        (self.spot_scale as f64 * (-adjusted_delta - discriminant.sqrt()) / gamma) as i64
    }

    fn price_change_for_spot_change(
        &self,
        spot_change: i64,
        conv_ratio: i32,
        adjusted_delta: f64,
    ) -> f64 {
        spot_change as f64 * adjusted_delta * self.wrt_price_scale as f64
            / (conv_ratio as f64 * 100.0 * self.spot_scale as f64)
    }

    fn spot_buffer_from_tick_buffer(
        &self,
        wrt_tick_size: i32,
        tick_buffer: i32,
        adjusted_delta_c: f64,
    ) -> i64 {
        (wrt_tick_size as f64 * tick_buffer as f64 * self.wrt_to_spot_scale as f64
            / (1000.0 * adjusted_delta_c)) as i64
    }
}

/// Equity-tuned variant: warrant and underlying share the ×1000 price grid.
#[derive(Debug, Clone, Copy, Default)]
pub struct EquityScaleFormula;

const EQ_UND_PRICE_SCALE: f64 = 1000.0;
const EQ_FULL_SPOT_SCALE: f64 = (WEIGHTED_AVERAGE_SCALE * 1000) as f64;

impl ScaleFormula for EquityScaleFormula {
    fn price_per_underlying_tick(&self, und_tick_size: i32, greeks: Greeks, conv_ratio: i32) -> f64 {
        let tick = und_tick_size as f64;
        let linear = tick * greeks.delta as f64;
        let convex = 0.5 * tick * tick * greeks.gamma as f64 / EQ_UND_PRICE_SCALE;
        (linear + convex).abs() / (conv_ratio as f64 * 100.0)
    }

    fn adjusted_delta(&self, spot: i64, greeks: Greeks) -> f64 {
        let drift = (spot - greeks.ref_spot as i64 * WEIGHTED_AVERAGE_SCALE) as f64;
        drift * greeks.gamma as f64 / EQ_FULL_SPOT_SCALE + greeks.delta as f64
    }

    fn spot_change_for_price_change_c(&self, price_change: i32, adjusted_delta_c: f64) -> i64 {
        (price_change as f64 * WEIGHTED_AVERAGE_SCALE as f64 / adjusted_delta_c) as i64
    }

    fn spot_change_for_price_change(
        &self,
        price_change: i32,
        conv_ratio: i32,
        adjusted_delta: f64,
    ) -> i64 {
        (price_change as f64 * conv_ratio as f64 * 100_000.0 / adjusted_delta) as i64
    }

    fn spot_change_for_price_change_call(
        &self,
        price_change: i32,
        conv_ratio: i32,
        adjusted_delta: f64,
        greeks: Greeks,
    ) -> i64 {
        if greeks.gamma == 0 {
            return self.spot_change_for_price_change(price_change, conv_ratio, adjusted_delta);
        }
        let gamma = greeks.gamma as f64;
        let discriminant = adjusted_delta * adjusted_delta
            + gamma * price_change as f64 * conv_ratio as f64 / 5.0;
        (EQ_FULL_SPOT_SCALE * (-adjusted_delta + discriminant.sqrt()) / gamma) as i64
    }

    fn spot_change_for_price_change_put(
        &self,
        price_change: i32,
        conv_ratio: i32,
        adjusted_delta: f64,
        greeks: Greeks,
    ) -> i64 {
        if greeks.gamma == 0 {
            return self.spot_change_for_price_change(price_change, conv_ratio, adjusted_delta);
        }
        let gamma = greeks.gamma as f64;
        let discriminant = adjusted_delta * adjusted_delta
            + gamma * price_change as f64 * conv_ratio as f64 / 5.0;
        (EQ_FULL_SPOT_SCALE * (-adjusted_delta - discriminant.sqrt()) / gamma) as i64
    }

    fn price_change_for_spot_change(
        &self,
        spot_change: i64,
        conv_ratio: i32,
        adjusted_delta: f64,
    ) -> f64 {
        spot_change as f64 * adjusted_delta / (conv_ratio as f64 * 100_000.0)
    }

    fn spot_buffer_from_tick_buffer(
        &self,
        wrt_tick_size: i32,
        tick_buffer: i32,
        adjusted_delta_c: f64,
    ) -> i64 {
        (wrt_tick_size as f64 * tick_buffer as f64 / adjusted_delta_c) as i64
    }
}

/// Pick the formula variant for a security's underlying kind.
pub fn formula_for(kind: crate::domain::UnderlyingKind) -> Box<dyn ScaleFormula> {
    match kind {
        // Index points carry no extra grid scale.
        crate::domain::UnderlyingKind::Index => Box::new(GenericScaleFormula::new(1000, 1)),
        crate::domain::UnderlyingKind::Equity => Box::new(EquityScaleFormula),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn greeks(delta: i32, gamma: i32, ref_spot: i32) -> Greeks {
        Greeks {
            delta,
            gamma,
            vega: 0,
            ref_spot,
        }
    }

    #[test]
    fn generic_matches_equity_when_scales_are_equal() {
        let generic = GenericScaleFormula::new(1000, 1000);
        let equity = EquityScaleFormula;
        let g = greeks(50_000, 2_000, 100_000);
        let spot = 100_000_000;

        assert!((generic.adjusted_delta(spot, g) - equity.adjusted_delta(spot, g)).abs() < 1.0);
        assert!(
            (generic.price_per_underlying_tick(100, g, 10_000)
                - equity.price_per_underlying_tick(100, g, 10_000))
            .abs()
                < 1e-6
        );
        assert_eq!(
            generic.spot_change_for_price_change(5, 10_000, 50_000.0),
            equity.spot_change_for_price_change(5, 10_000, 50_000.0)
        );
    }

    #[test]
    fn adjusted_delta_at_reference_spot_is_delta() {
        let equity = EquityScaleFormula;
        let g = greeks(50_000, 2_000, 100_000);
        let at_ref = 100_000i64 * WEIGHTED_AVERAGE_SCALE;
        assert_eq!(equity.adjusted_delta(at_ref, g), 50_000.0);
        // Above the reference a call's delta grows with gamma.
        assert!(equity.adjusted_delta(at_ref + 1_000_000, g) > 50_000.0);
    }

    #[test]
    fn quadratic_roots_collapse_to_linear_without_gamma() {
        let equity = EquityScaleFormula;
        let g = greeks(50_000, 0, 100_000);
        let linear = equity.spot_change_for_price_change(10, 10_000, 50_000.0);
        assert_eq!(
            equity.spot_change_for_price_change_call(10, 10_000, 50_000.0, g),
            linear
        );
        assert_eq!(
            equity.spot_change_for_price_change_put(10, 10_000, 50_000.0, g),
            linear
        );
    }

    #[test]
    fn call_and_put_roots_have_opposite_signs() {
        let equity = EquityScaleFormula;
        let g = greeks(50_000, 2_000, 100_000);
        let call = equity.spot_change_for_price_change_call(10, 10_000, 50_000.0, g);
        let put = equity.spot_change_for_price_change_put(10, 10_000, 50_000.0, g);
        assert!(call > 0);
        assert!(put < 0);
    }
}
