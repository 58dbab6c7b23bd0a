//! Warrant-side signal generator.
//!
//! Per warrant book tick this derives the market-maker-qualified quotes
//! (best level with displayed size over the configured minimum, walking
//! deeper if the top is too small), the mm spread and tick sensitivity,
//! the rolling target spread, and the spread-state classification. Every
//! tick also feeds two bucket predictors in parallel — one per pricing
//! mode — and the mode with materially fewer violations becomes the
//! authoritative spot source.
//!
//! Methods are staged so the context can dispatch automaton events at the
//! exact points the derived state changes; previous-tick snapshots roll in
//! `finish_book_tick` after all events of the tick have been handled.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use tracing::debug;

use super::underlying::UnderlyingSignals;
use super::{Event, Events};
use crate::domain::{
    BookSnapshot, MarketTrade, Security, SpotInterval, SpreadTable, TradeSide, TriggerInfo,
    MIN_TICK_LEVEL,
};
use crate::params::{BucketParams, SpreadState, WarrantParams};
use crate::ports::{
    AuditEvent, AuditEventKind, AuditValueKind, BroadcastKind, InfoSender, Scheduler,
};
use crate::pricing::{BucketPredictor, PricingMode, ScaleFormula, Violation};
use crate::triggers::issuer_lag::{IssuerLagMonitor, LagSignal};
use crate::window::RollingSumWindow;

/// Observation window for adopting a strictly tighter mm spread as target.
const SPREAD_OBSERVATION_PERIOD_WHEN_TIGHTER: i64 = 100_000_000;
const MIN_ISSUER_MAX_LAG: i64 = 10_000_000;
const TRADES_VOLUME_WINDOW: i64 = 20_000_000;

/// Which spot estimate a pricing mode reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpotSource {
    Weighted,
    Mid,
}

impl SpotSource {
    pub fn index(self) -> usize {
        match self {
            SpotSource::Weighted => 0,
            SpotSource::Mid => 1,
        }
    }
}

/// Active/standby slot. The unknown variants keep a spot source but no
/// authoritative predictor; violations are then tracked for neither side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bridge {
    UnknownWeighted,
    UnknownMid,
    Weighted,
    Mid,
}

impl Bridge {
    fn source(self) -> SpotSource {
        match self {
            Bridge::UnknownWeighted | Bridge::Weighted => SpotSource::Weighted,
            Bridge::UnknownMid | Bridge::Mid => SpotSource::Mid,
        }
    }

    fn pricer(self) -> Option<usize> {
        match self {
            Bridge::Weighted => Some(SpotSource::Weighted.index()),
            Bridge::Mid => Some(SpotSource::Mid.index()),
            _ => None,
        }
    }

    fn of(source: SpotSource) -> Bridge {
        match source {
            SpotSource::Weighted => Bridge::Weighted,
            SpotSource::Mid => Bridge::Mid,
        }
    }
}

pub struct WarrantSignals {
    code: String,
    warrant_sid: u64,
    table: SpreadTable,
    pricers: [Box<dyn BucketPredictor>; 2],
    num_violations: [i32; 2],
    out_intervals: [SpotInterval; 2],
    active: Bridge,
    standby: Bridge,

    book: BookSnapshot,
    last_tick_ns: i64,
    trigger: TriggerInfo,

    best_bid_price: i32,
    best_bid_level: i32,
    best_bid_qty: i64,
    best_ask_price: i32,
    best_ask_level: i32,
    best_ask_level_not_ours: i32,
    tick_below_best_ask_not_ours: i32,
    prev_best_bid_price: i32,
    prev_best_ask_price: i32,
    price_per_und_tick: f64,
    mm_bid_price: i32,
    mm_bid_level: i32,
    mm_ask_price: i32,
    mm_ask_level: i32,
    prev_mm_bid_price: i32,
    prev_mm_ask_price: i32,
    mm_ask_tick_size: i32,
    mm_spread: i32,
    prev_mm_spread: i32,
    target_spread: i32,
    target_spread_end_ns: i64,
    last_mm_spread_update_ns: i64,
    ask_price_at_prev_und_tick: i32,
    is_at_target_spread: bool,
    is_prev_at_target_spread: bool,
    is_loosely_tight: bool,
    bucket_size: i32,
    delta: i32,
    collecting: bool,
    underlying_tick_size: i32,
    hold_bid_ban_prices: BinaryHeap<Reverse<i32>>,
    prev_trade_price_for_hold_bid_ban: i32,
    trades_volume_20ms: RollingSumWindow,
    pending_param_send: bool,

    // Mode-residency statistics, reported when the strategy switches off.
    start_pricing_mode_ns: i64,
    time_in_weighted_mode: i64,
    time_in_mid_mode: i64,
    down_vols_while_long: i32,
    up_vols_while_long: i32,
}

impl WarrantSignals {
    pub fn new(security: &Security, pricers: [Box<dyn BucketPredictor>; 2]) -> Self {
        Self {
            code: security.code.clone(),
            warrant_sid: security.sid,
            table: security.spread_table.clone(),
            pricers,
            num_violations: [0; 2],
            out_intervals: [SpotInterval::empty(); 2],
            active: Bridge::UnknownWeighted,
            standby: Bridge::UnknownWeighted,
            book: BookSnapshot::default(),
            last_tick_ns: 0,
            trigger: TriggerInfo::default(),
            best_bid_price: 0,
            best_bid_level: 0,
            best_bid_qty: 0,
            best_ask_price: 0,
            best_ask_level: 0,
            best_ask_level_not_ours: 0,
            tick_below_best_ask_not_ours: 0,
            prev_best_bid_price: 0,
            prev_best_ask_price: 0,
            price_per_und_tick: 0.0,
            mm_bid_price: 0,
            mm_bid_level: 0,
            mm_ask_price: 0,
            mm_ask_level: 0,
            prev_mm_bid_price: 0,
            prev_mm_ask_price: 0,
            mm_ask_tick_size: 0,
            mm_spread: i32::MAX,
            prev_mm_spread: i32::MAX,
            target_spread: i32::MAX,
            target_spread_end_ns: i64::MAX,
            last_mm_spread_update_ns: i64::MAX,
            ask_price_at_prev_und_tick: 0,
            is_at_target_spread: false,
            is_prev_at_target_spread: false,
            is_loosely_tight: false,
            bucket_size: 0,
            delta: 0,
            collecting: false,
            underlying_tick_size: 0,
            hold_bid_ban_prices: BinaryHeap::new(),
            prev_trade_price_for_hold_bid_ban: 0,
            trades_volume_20ms: RollingSumWindow::new(TRADES_VOLUME_WINDOW),
            pending_param_send: false,
            start_pricing_mode_ns: 0,
            time_in_weighted_mode: 0,
            time_in_mid_mode: 0,
            down_vols_while_long: 0,
            up_vols_while_long: 0,
        }
    }

    pub fn start(&mut self, params: &mut WarrantParams) {
        debug!(
            code = %self.code,
            mode = ?params.default_pricing_mode,
            seq = self.trigger.seq_num,
            "switching pricing mode"
        );
        params.pricing_mode = params.default_pricing_mode;
        self.refresh_bridge(params);
    }

    pub fn reset(&mut self, params: &mut WarrantParams, bucket_params: &mut BucketParams) {
        self.best_bid_price = 0;
        self.best_bid_level = 0;
        self.best_bid_qty = 0;
        self.best_ask_price = 0;
        self.best_ask_level = 0;
        self.best_ask_level_not_ours = 0;
        self.tick_below_best_ask_not_ours = 0;
        self.prev_best_bid_price = 0;
        self.prev_best_ask_price = 0;
        self.price_per_und_tick = 0.0;
        self.prev_mm_spread = i32::MAX;
        self.mm_spread = i32::MAX;
        self.target_spread = i32::MAX;
        self.target_spread_end_ns = i64::MAX;
        self.last_tick_ns = 0;
        self.ask_price_at_prev_und_tick = 0;
        self.is_at_target_spread = false;
        self.is_prev_at_target_spread = false;
        self.is_loosely_tight = false;
        self.delta = 0;
        params.pricing_mode = params.default_pricing_mode;
        bucket_params.reset();
        self.refresh_bridge(params);
        params.tick_sensitivity = 0;
        params.num_wavg_down_vols = 0;
        params.num_wavg_up_vols = 0;
        params.num_mprc_down_vols = 0;
        params.num_mprc_up_vols = 0;
        self.num_violations = [0; 2];
        self.out_intervals = [SpotInterval::empty(); 2];
        self.pricers[0].clear();
        self.pricers[1].clear();
        self.collecting = false;
        self.hold_bid_ban_prices.clear();
        self.prev_trade_price_for_hold_bid_ban = 0;
        self.start_pricing_mode_ns = 0;
        self.time_in_weighted_mode = 0;
        self.time_in_mid_mode = 0;
        self.down_vols_while_long = 0;
        self.up_vols_while_long = 0;
        self.trades_volume_20ms.clear();
    }

    // ── Warrant book tick ──────────────────────────────────────────────

    pub fn begin_book_tick(&mut self, timestamp: i64, book: &BookSnapshot) {
        self.last_tick_ns = timestamp;
        if self.start_pricing_mode_ns == 0 {
            self.start_pricing_mode_ns = timestamp;
        }
        self.trigger = book.trigger;
        self.book = book.clone();
    }

    /// Recompute every per-tick derived field from the stored book. Runs up
    /// to (and including) the issuer-lag notification; bucket observation
    /// and event dispatch are orchestrated by the context so the automaton
    /// sees derived state exactly as it stood when each event was emitted.
    #[allow(clippy::too_many_arguments)]
    pub fn update_book_state(
        &mut self,
        params: &mut WarrantParams,
        security: &Security,
        lag: &mut IssuerLagMonitor,
        scheduler: &mut dyn Scheduler,
        info: &mut dyn InfoSender,
        events: &mut Events,
    ) {
        self.mm_spread = i32::MAX;
        self.is_loosely_tight = false;
        self.is_at_target_spread = false;

        if let Some(best) = self.book.best_bid() {
            self.best_bid_price = best.price;
            self.best_bid_level = best.tick_level;
            self.best_bid_qty = best.qty;
            match self.book.bids.iter().find(|l| l.qty >= params.mm_bid_size) {
                Some(mm) => {
                    self.mm_bid_price = mm.price;
                    self.mm_bid_level = mm.tick_level;
                }
                None => {
                    self.mm_bid_price = 0;
                    self.mm_bid_level = 0;
                }
            }
        } else {
            self.best_bid_price = 0;
            self.best_bid_level = 0;
            self.best_bid_qty = 0;
            self.mm_bid_price = 0;
            self.mm_bid_level = 0;
        }

        if let Some(best) = self.book.best_ask() {
            self.best_ask_price = best.price;
            self.best_ask_level = best.tick_level;

            // Ignore the top ask when it is only our own resting order.
            let ours_alone = security.limit_order_qty() != 0
                && security.limit_order_price() == best.price
                && best.qty <= security.limit_order_qty();
            self.best_ask_level_not_ours = if ours_alone {
                self.book.asks.get(1).map(|l| l.tick_level).unwrap_or(0)
            } else {
                best.tick_level
            };

            match self.book.asks.iter().find(|l| l.qty >= params.mm_ask_size) {
                Some(mm) => {
                    self.mm_ask_price = mm.price;
                    self.mm_ask_level = mm.tick_level;
                }
                None => {
                    self.mm_ask_price = 0;
                    self.mm_ask_level = 0;
                }
            }

            if self.mm_ask_price > 0 {
                if self.mm_bid_price > 0 {
                    self.mm_spread = self.mm_ask_level - self.mm_bid_level;
                }
                let warrant_tick_size = self.table.price_to_tick_size(self.mm_ask_price);
                if warrant_tick_size != self.mm_ask_tick_size {
                    self.mm_ask_tick_size = warrant_tick_size;
                    params.tick_sensitivity =
                        (self.price_per_und_tick * 1000.0 / warrant_tick_size as f64) as i32;
                    self.pending_param_send = true;
                }
            } else {
                self.mm_ask_tick_size = 0;
                params.tick_sensitivity = 0;
            }

            self.tick_below_best_ask_not_ours = if self.best_ask_level_not_ours > MIN_TICK_LEVEL {
                self.table.tick_to_price(
                    (self.best_ask_level_not_ours - 1 - params.wide_spread_buffer)
                        .max(MIN_TICK_LEVEL),
                )
            } else {
                0
            };
            self.is_loosely_tight = self.loosely_tight_with_known_spread();
        } else {
            params.tick_sensitivity = 0;
            self.best_ask_price = 0;
            self.best_ask_level = 0;
            self.best_ask_level_not_ours = 0;
            self.tick_below_best_ask_not_ours = 0;
            self.mm_ask_price = 0;
            self.mm_ask_level = 0;
            self.mm_ask_tick_size = 0;
        }

        self.maintain_hold_bid_ban();

        if self.mm_spread != params.warrant_spread {
            params.warrant_spread = self.mm_spread;
            self.last_mm_spread_update_ns = self.last_tick_ns;
            self.pending_param_send = true;
        }

        self.is_at_target_spread = self.detect_target_spread_updates();
        if self.check_for_target_spread_reset(params, security) {
            self.set_target_spread_to_mm();
            self.set_pricers_target_spread(params, info);
        }
        if self.update_spread_state(params, security) {
            self.pending_param_send = true;
        }

        let lag_signal = if self.mm_spread == i32::MAX {
            lag.on_mm_book_updated(
                scheduler,
                self.last_tick_ns,
                self.mm_bid_level,
                self.mm_ask_level,
                self.target_spread,
                false,
            )
        } else if self.mm_spread == self.target_spread {
            lag.on_mm_book_updated(
                scheduler,
                self.last_tick_ns,
                self.mm_bid_level,
                self.mm_ask_level,
                self.target_spread,
                true,
            )
        } else if self.mm_spread >= self.prev_mm_spread && self.prev_mm_spread != i32::MAX {
            lag.on_mm_book_updated(
                scheduler,
                self.last_tick_ns,
                self.mm_bid_level,
                self.mm_ask_level,
                self.target_spread,
                false,
            )
        } else {
            None
        };
        self.apply_lag_signal(lag_signal, params, info, events);
    }

    /// Roll previous-tick snapshots and flush any pending throttled
    /// broadcast. Call after every event of the tick has been dispatched.
    pub fn finish_book_tick(&mut self, params: &WarrantParams, info: &mut dyn InfoSender) {
        self.prev_mm_spread = self.mm_spread;
        self.prev_best_bid_price = self.best_bid_price;
        self.prev_best_ask_price = self.best_ask_price;
        self.prev_mm_ask_price = self.mm_ask_price;
        self.prev_mm_bid_price = self.mm_bid_price;
        self.is_prev_at_target_spread = self.is_at_target_spread;
        if self.pending_param_send {
            self.pending_param_send = false;
            info.warrant_params(params, BroadcastKind::Throttled);
        }
    }

    // ── Underlying spot tick ───────────────────────────────────────────

    pub fn begin_und_spot(&mut self, nano_of_day: i64, trigger: TriggerInfo) {
        self.trigger = trigger;
        self.last_tick_ns = nano_of_day;
        if self.start_pricing_mode_ns == 0 {
            self.start_pricing_mode_ns = nano_of_day;
        }
    }

    /// Spot-side target-spread reset check.
    #[allow(clippy::too_many_arguments)]
    pub fn check_spot_target_reset(
        &mut self,
        params: &mut WarrantParams,
        security: &Security,
        lag: &mut IssuerLagMonitor,
        scheduler: &mut dyn Scheduler,
        info: &mut dyn InfoSender,
        events: &mut Events,
    ) {
        if self.check_for_target_spread_reset(params, security) {
            self.set_target_to_mm_from_non_deriv(params, lag, scheduler, info, events);
            self.set_pricers_target_spread(params, info);
            if self.update_spread_state(params, security) {
                info.warrant_params(params, BroadcastKind::Batched);
            }
        }
    }

    /// Feed the spot estimate to both predictors.
    pub fn observe_und_ticks(
        &mut self,
        nano_of_day: i64,
        weighted_average: i64,
        mid_price: i64,
        is_tight: bool,
    ) -> (Violation, Violation) {
        let wa_index = SpotSource::Weighted.index();
        let mp_index = SpotSource::Mid.index();
        let wa = self.pricers[wa_index].observe_und_tick(
            nano_of_day,
            weighted_average,
            is_tight,
            self.trigger,
            &mut self.out_intervals[wa_index],
        );
        let mp = self.pricers[mp_index].observe_und_tick(
            nano_of_day,
            mid_price,
            is_tight,
            self.trigger,
            &mut self.out_intervals[mp_index],
        );
        (wa, mp)
    }

    pub fn finish_und_spot(&mut self) {
        self.ask_price_at_prev_und_tick = self.best_ask_price;
    }

    // ── Warrant trade prints ───────────────────────────────────────────

    pub fn on_trade(&mut self, params: &WarrantParams, trade: &MarketTrade) {
        self.last_tick_ns = trade.nano_of_day;
        match trade.side {
            TradeSide::Ask => {
                if params.use_hold_bid_ban && trade.price != self.prev_trade_price_for_hold_bid_ban
                {
                    self.prev_trade_price_for_hold_bid_ban = trade.price;
                    self.hold_bid_ban_prices.push(Reverse(trade.price));
                    debug!(
                        code = %self.code,
                        price = trade.price,
                        banned = self.hold_bid_ban_price(),
                        seq = self.trigger.seq_num,
                        "hold bid ban price set"
                    );
                }
                if params.trades_volume_threshold != 0 {
                    self.trades_volume_20ms.record(trade.nano_of_day, trade.qty);
                }
            }
            TradeSide::Bid => {
                if params.trades_volume_threshold != 0 {
                    self.trades_volume_20ms.record(trade.nano_of_day, -trade.qty);
                }
            }
        }
    }

    // ── Greeks / tick-size feeds ───────────────────────────────────────

    pub fn on_greeks_updated(
        &mut self,
        params: &mut WarrantParams,
        security: &Security,
        scale: &dyn ScaleFormula,
        info: &mut dyn InfoSender,
        greeks: crate::domain::Greeks,
    ) {
        params.greeks = greeks;
        if self.delta != greeks.delta {
            self.delta = greeks.delta;
            self.pricers[0].observe_greeks(1, greeks);
            self.pricers[1].observe_greeks(1, greeks);
            self.calc_price_per_und_tick(params, security, scale, info);
        }
    }

    pub fn on_underlying_tick_size_changed(
        &mut self,
        params: &mut WarrantParams,
        security: &Security,
        scale: &dyn ScaleFormula,
        info: &mut dyn InfoSender,
        tick_size: i32,
    ) {
        self.underlying_tick_size = tick_size;
        self.calc_price_per_und_tick(params, security, scale, info);
    }

    fn calc_price_per_und_tick(
        &mut self,
        params: &mut WarrantParams,
        security: &Security,
        scale: &dyn ScaleFormula,
        info: &mut dyn InfoSender,
    ) {
        if self.underlying_tick_size != 0 && params.greeks.delta != 0 {
            let price_per_tick = scale.price_per_underlying_tick(
                self.underlying_tick_size,
                params.greeks,
                security.conv_ratio,
            );
            if self.price_per_und_tick != price_per_tick {
                self.price_per_und_tick = price_per_tick;
                if self.mm_ask_tick_size != 0 {
                    let sensitivity =
                        self.price_per_und_tick * 1000.0 / self.mm_ask_tick_size as f64;
                    let prev_sensitivity = params.tick_sensitivity;
                    params.tick_sensitivity = sensitivity as i32;
                    self.bucket_size = (self.underlying_tick_size as f64
                        * self.mm_ask_tick_size as f64
                        / self.price_per_und_tick) as i32;
                    if (prev_sensitivity - params.tick_sensitivity).abs() > 500 {
                        info.warrant_params(params, BroadcastKind::Throttled);
                    }
                }
            }
            self.is_loosely_tight = self.calc_is_loosely_tight();
        } else if self.price_per_und_tick != 0.0 {
            self.price_per_und_tick = 0.0;
            params.tick_sensitivity = 0;
            self.is_loosely_tight = self.calc_is_loosely_tight();
        }
        if self.update_spread_state_no_security(params) {
            info.warrant_params(params, BroadcastKind::Batched);
        }
    }

    // ── Bucket violations and pricing-mode arbitration ─────────────────

    pub fn collecting(&self) -> bool {
        self.collecting
    }

    /// Feed the warrant tick to both predictors.
    pub fn observe_deriv_ticks(&mut self) -> (Violation, Violation) {
        let wa = self.pricers[SpotSource::Weighted.index()].observe_deriv_tick(
            self.last_tick_ns,
            self.best_bid_price,
            self.best_ask_price,
            self.mm_bid_price,
            self.mm_ask_price,
            self.mm_spread,
            self.trigger,
        );
        let mp = self.pricers[SpotSource::Mid.index()].observe_deriv_tick(
            self.last_tick_ns,
            self.best_bid_price,
            self.best_ask_price,
            self.mm_bid_price,
            self.mm_ask_price,
            self.mm_spread,
            self.trigger,
        );
        (wa, mp)
    }

    /// Handle one predictor's violation. Resets the offending predictor
    /// (and the standby when the active one violated), counts vols and
    /// emits the matching automaton events. Returns the updated
    /// has-reset-standby flag.
    #[allow(clippy::too_many_arguments)]
    pub fn handle_violation(
        &mut self,
        source: SpotSource,
        violation: Violation,
        mut has_reset_standby: bool,
        from_warrant_tick: bool,
        params: &mut WarrantParams,
        security: &Security,
        lag: &mut IssuerLagMonitor,
        scheduler: &mut dyn Scheduler,
        info: &mut dyn InfoSender,
        events: &mut Events,
    ) -> bool {
        if !violation.is_violation() {
            return has_reset_standby;
        }
        let is_active = self.active == Bridge::of(source);
        if is_active {
            self.set_target_to_mm_from_non_deriv(params, lag, scheduler, info, events);
            debug!(
                code = %self.code,
                ?source,
                ?violation,
                target_spread = self.target_spread,
                seq = self.trigger.seq_num,
                "bucket violation for active pricer, resetting"
            );
            let active_index = source.index();
            self.reset_pricer(active_index, from_warrant_tick);
            // Active concrete implies standby concrete; see refresh_bridge.
            if let Some(standby_index) = self.standby.pricer() {
                if self.target_spread != self.pricers[standby_index].target_spread_ticks() {
                    debug!(
                        code = %self.code,
                        target_spread = self.target_spread,
                        seq = self.trigger.seq_num,
                        "resetting standby pricer after active violation"
                    );
                    self.reset_pricer(standby_index, from_warrant_tick);
                    has_reset_standby = true;
                }
            }
        } else if has_reset_standby {
            debug!(
                code = %self.code,
                ?source,
                ?violation,
                seq = self.trigger.seq_num,
                "standby pricer violation, already reset"
            );
        } else {
            debug!(
                code = %self.code,
                ?source,
                ?violation,
                seq = self.trigger.seq_num,
                "standby pricer violation, resetting"
            );
            self.reset_pricer(source.index(), from_warrant_tick);
            has_reset_standby = true;
        }
        self.count_violation(source, violation, is_active, from_warrant_tick, params, security, info, events);
        has_reset_standby
    }

    fn reset_pricer(&mut self, index: usize, from_warrant_tick: bool) {
        if from_warrant_tick {
            self.pricers[index].reset(self.last_tick_ns);
            self.pricers[index].has_target_spread_changed_and_register(
                self.last_tick_ns,
                self.mm_bid_price,
                self.mm_ask_price,
                self.mm_spread,
            );
        } else {
            let interval = self.out_intervals[index];
            if !interval.is_empty() {
                self.pricers[index].reset_and_register(self.last_tick_ns, &interval);
            } else {
                self.pricers[index].reset(self.last_tick_ns);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn count_violation(
        &mut self,
        source: SpotSource,
        violation: Violation,
        is_active: bool,
        from_warrant_tick: bool,
        params: &mut WarrantParams,
        security: &Security,
        info: &mut dyn InfoSender,
        events: &mut Events,
    ) {
        self.num_violations[source.index()] += 1;
        let position = security.position();
        match violation {
            Violation::DownVol => {
                let count = match source {
                    SpotSource::Weighted => {
                        params.num_wavg_down_vols += 1;
                        params.num_wavg_down_vols
                    }
                    SpotSource::Mid => {
                        params.num_mprc_down_vols += 1;
                        params.num_mprc_down_vols
                    }
                };
                if is_active {
                    // Convention: a flat book reports the count negated.
                    info.send_event(AuditEvent {
                        kind: AuditEventKind::VolDownSignal,
                        security_sid: self.warrant_sid,
                        nano_of_day: self.last_tick_ns,
                        value_kind: AuditValueKind::HasPosition,
                        value: if position == 0 { -count as i64 } else { count as i64 },
                    });
                    if position > 0 {
                        self.down_vols_while_long += 1;
                    }
                    events.push(if from_warrant_tick {
                        Event::DownVolFromWarrantTick
                    } else {
                        Event::DownVolFromUnderlyingTick
                    });
                } else {
                    events.push(Event::DownVolForStandbyPricer);
                }
            }
            Violation::UpVol => {
                let count = match source {
                    SpotSource::Weighted => {
                        params.num_wavg_up_vols += 1;
                        params.num_wavg_up_vols
                    }
                    SpotSource::Mid => {
                        params.num_mprc_up_vols += 1;
                        params.num_mprc_up_vols
                    }
                };
                if is_active {
                    info.send_event(AuditEvent {
                        kind: AuditEventKind::VolUpSignal,
                        security_sid: self.warrant_sid,
                        nano_of_day: self.last_tick_ns,
                        value_kind: AuditValueKind::HasPosition,
                        value: if position == 0 { -count as i64 } else { count as i64 },
                    });
                    if position > 0 {
                        events.push(Event::NonDownVolViolation);
                        self.up_vols_while_long += 1;
                    }
                }
            }
            _ => {
                if is_active && position > 0 {
                    events.push(Event::NonDownVolViolation);
                }
            }
        }
        info.warrant_params(params, BroadcastKind::Throttled);
    }

    /// Arbitrate the authoritative pricing mode: a mode wins only when its
    /// violation count is more than one below the other's; ties fall back
    /// to the configured default.
    pub fn detect_pricing_mode(
        &mut self,
        wa_violation: Violation,
        mp_violation: Violation,
        params: &mut WarrantParams,
        info: &mut dyn InfoSender,
        events: &mut Events,
    ) {
        if wa_violation.is_violation() && mp_violation.is_violation() {
            self.switch_pricing_mode(PricingMode::AdjustVol, params, info, events);
        } else {
            let wa = self.num_violations[SpotSource::Weighted.index()];
            let mp = self.num_violations[SpotSource::Mid.index()];
            if wa + 1 < mp {
                self.switch_pricing_mode(PricingMode::Weighted, params, info, events);
            } else if wa > mp + 1 {
                self.switch_pricing_mode(PricingMode::Mid, params, info, events);
            } else {
                self.switch_pricing_mode(params.default_pricing_mode, params, info, events);
            }
        }
    }

    fn switch_pricing_mode(
        &mut self,
        new_mode: PricingMode,
        params: &mut WarrantParams,
        info: &mut dyn InfoSender,
        events: &mut Events,
    ) {
        if params.pricing_mode == new_mode {
            return;
        }
        debug!(
            code = %self.code,
            mode = ?new_mode,
            seq = self.trigger.seq_num,
            mid_violations = self.num_violations[SpotSource::Mid.index()],
            weighted_violations = self.num_violations[SpotSource::Weighted.index()],
            "switching pricing mode"
        );
        self.collect_pricing_mode_stats(params);
        params.pricing_mode = new_mode;
        info.warrant_params(params, BroadcastKind::Throttled);
        self.refresh_bridge(params);
        if let Some(index) = self.active.pricer() {
            events.push(Event::PricingModeUpdated);
            let target = self.pricers[index].target_spread_ticks();
            if target != i32::MAX {
                self.target_spread = target;
                debug!(
                    code = %self.code,
                    target_spread = self.target_spread,
                    seq = self.trigger.seq_num,
                    "target spread adopted from new active pricer"
                );
            }
        }
    }

    fn collect_pricing_mode_stats(&mut self, params: &WarrantParams) {
        match params.pricing_mode {
            PricingMode::Mid => {
                self.time_in_mid_mode += self.last_tick_ns - self.start_pricing_mode_ns;
            }
            PricingMode::Weighted => {
                self.time_in_weighted_mode += self.last_tick_ns - self.start_pricing_mode_ns;
            }
            _ => {}
        }
        self.start_pricing_mode_ns = self.last_tick_ns;
    }

    fn refresh_bridge(&mut self, params: &WarrantParams) {
        match params.pricing_mode {
            PricingMode::Mid => {
                self.active = Bridge::Mid;
                self.standby = Bridge::Weighted;
            }
            PricingMode::Weighted => {
                self.active = Bridge::Weighted;
                self.standby = Bridge::Mid;
            }
            _ => {
                if self.active == Bridge::Mid {
                    self.active = Bridge::UnknownMid;
                    self.standby = Bridge::UnknownWeighted;
                } else {
                    self.active = Bridge::UnknownWeighted;
                    self.standby = Bridge::UnknownMid;
                }
            }
        }
    }

    // ── Target spread maintenance ──────────────────────────────────────

    fn detect_target_spread_updates(&mut self) -> bool {
        if self.mm_spread == self.target_spread && self.mm_spread != i32::MAX {
            if !self.is_prev_at_target_spread {
                self.target_spread_end_ns = i64::MAX;
            }
            true
        } else if self.mm_spread < self.target_spread {
            self.is_prev_at_target_spread
        } else {
            if self.is_prev_at_target_spread {
                self.target_spread_end_ns = self.last_tick_ns;
            }
            false
        }
    }

    fn check_for_target_spread_reset(&self, params: &WarrantParams, security: &Security) -> bool {
        if self.last_tick_ns - self.target_spread_end_ns > params.spread_observation_period
            && security.position() == 0
        {
            return true;
        }
        ((self.target_spread == i32::MAX && self.mm_spread != i32::MAX)
            || self.mm_spread < self.target_spread)
            && self.last_tick_ns - self.last_mm_spread_update_ns
                > SPREAD_OBSERVATION_PERIOD_WHEN_TIGHTER
    }

    fn set_target_spread_to_mm(&mut self) {
        self.target_spread = self.mm_spread;
        self.target_spread_end_ns = i64::MAX;
        self.is_at_target_spread = true;
    }

    fn set_target_to_mm_from_non_deriv(
        &mut self,
        params: &mut WarrantParams,
        lag: &mut IssuerLagMonitor,
        scheduler: &mut dyn Scheduler,
        info: &mut dyn InfoSender,
        events: &mut Events,
    ) {
        self.set_target_spread_to_mm();
        self.is_prev_at_target_spread = true;
        let signal = lag.on_mm_book_updated(
            scheduler,
            self.last_tick_ns,
            self.mm_bid_level,
            self.mm_ask_level,
            self.target_spread,
            true,
        );
        self.apply_lag_signal(signal, params, info, events);
    }

    fn set_pricers_target_spread(&mut self, params: &mut WarrantParams, info: &mut dyn InfoSender) {
        debug!(
            code = %self.code,
            target_spread = self.target_spread,
            mm_spread = self.mm_spread,
            seq = self.trigger.seq_num,
            "target spread updated, resetting pricers"
        );
        let (ns, target) = (self.last_tick_ns, self.target_spread);
        for pricer in self.pricers.iter_mut() {
            if pricer.has_target_spread_changed() {
                pricer.reset_target_spread(ns, target);
            }
        }
        params.num_spread_resets += 1;
        info.warrant_params(params, BroadcastKind::Throttled);
    }

    fn apply_lag_signal(
        &mut self,
        signal: Option<LagSignal>,
        params: &mut WarrantParams,
        info: &mut dyn InfoSender,
        events: &mut Events,
    ) {
        match signal {
            Some(LagSignal::LagUpdated(lag_ns)) => {
                params.issuer_lag = lag_ns;
                let blended = if lag_ns < params.issuer_max_lag {
                    (params.issuer_max_lag + lag_ns) / 2
                } else {
                    lag_ns
                };
                params.issuer_max_lag = blended.max(MIN_ISSUER_MAX_LAG).min(params.issuer_max_lag_cap);
                debug!(
                    code = %self.code,
                    issuer_max_lag = params.issuer_max_lag,
                    seq = self.trigger.seq_num,
                    "issuer max lag updated"
                );
                self.refresh_issuer_max_lag(params);
                info.warrant_params(params, BroadcastKind::Batched);
            }
            Some(LagSignal::SmoothingUpdated(smoothing_ns)) => {
                params.issuer_smoothing = smoothing_ns;
                events.push(Event::IssuerSmoothingCompleted);
                info.warrant_params(params, BroadcastKind::Batched);
            }
            None => {}
        }
    }

    // ── Spread state ───────────────────────────────────────────────────

    pub fn update_spread_state(&mut self, params: &mut WarrantParams, security: &Security) -> bool {
        let new_state = self.spread_state(params, security.position());
        if params.spread_state != new_state {
            params.spread_state = new_state;
            return true;
        }
        false
    }

    /// Spread-state refresh in contexts without a security handle (the
    /// position check then degrades to flat).
    fn update_spread_state_no_security(&mut self, params: &mut WarrantParams) -> bool {
        let new_state = self.spread_state(params, 0);
        if params.spread_state != new_state {
            params.spread_state = new_state;
            return true;
        }
        false
    }

    fn spread_state(&self, params: &WarrantParams, position: i64) -> SpreadState {
        if position > 0
            && self.best_bid_price < params.enter_price
            && self.mm_spread > params.enter_mm_spread
            && !self.is_loosely_tight
        {
            return SpreadState::TooWide;
        }
        if self.is_at_target_spread {
            SpreadState::Normal
        } else {
            SpreadState::Wide
        }
    }

    pub fn update_is_loosely_tight(&mut self, params: &mut WarrantParams, security: &Security) {
        self.is_loosely_tight = self.calc_is_loosely_tight();
        self.update_spread_state(params, security);
    }

    fn calc_is_loosely_tight(&self) -> bool {
        self.best_ask_level_not_ours >= MIN_TICK_LEVEL
            && self.best_bid_level >= MIN_TICK_LEVEL
            && self.loosely_tight_with_known_spread()
    }

    fn loosely_tight_with_known_spread(&self) -> bool {
        self.best_ask_level_not_ours - self.best_bid_level < 3
            || ((self.tick_below_best_ask_not_ours - self.best_bid_price) as f64)
                < self.price_per_und_tick
    }

    // ── Hold-bid ban ───────────────────────────────────────────────────

    fn maintain_hold_bid_ban(&mut self) {
        if self.hold_bid_ban_prices.is_empty() {
            return;
        }
        while let Some(&Reverse(lowest)) = self.hold_bid_ban_prices.peek() {
            if self.mm_bid_price > lowest {
                self.hold_bid_ban_prices.pop();
            } else {
                break;
            }
        }
        if self.mm_bid_price > self.prev_trade_price_for_hold_bid_ban {
            self.prev_trade_price_for_hold_bid_ban = 0;
        }
    }

    pub fn hold_bid_ban_price(&self) -> i32 {
        self.hold_bid_ban_prices
            .peek()
            .map(|&Reverse(p)| p)
            .unwrap_or(i32::MAX)
    }

    pub fn clear_hold_bid_ban(&mut self) {
        self.hold_bid_ban_prices.clear();
        self.prev_trade_price_for_hold_bid_ban = 0;
        debug!(code = %self.code, seq = self.trigger.seq_num, "hold bid ban cleared");
    }

    // ── Bucket collection ──────────────────────────────────────────────

    pub fn enable_collect_buckets(&mut self) {
        if !self.collecting {
            self.collecting = true;
            let target = self.target_spread;
            self.pricers[0].reset_and_set_target_spread(target);
            self.pricers[1].reset_and_set_target_spread(target);
            debug!(code = %self.code, seq = self.trigger.seq_num, "bucket collection enabled");
        }
    }

    pub fn disable_collect_buckets(&mut self) {
        if self.collecting {
            self.collecting = false;
            debug!(code = %self.code, seq = self.trigger.seq_num, "bucket collection disabled");
        }
    }

    pub fn refresh_issuer_max_lag(&mut self, params: &WarrantParams) {
        self.pricers[0].set_issuer_max_lag(params.issuer_max_lag);
        self.pricers[1].set_issuer_max_lag(params.issuer_max_lag);
    }

    // ── Volume window ──────────────────────────────────────────────────

    pub fn refresh_net_trades_volume(&mut self) -> i64 {
        self.trades_volume_20ms.update(self.last_tick_ns);
        self.trades_volume_20ms.sum()
    }

    pub fn net_trades_volume(&self) -> i64 {
        self.trades_volume_20ms.sum()
    }

    // ── Spot views ─────────────────────────────────────────────────────

    pub fn spot_price(&self, und: &UnderlyingSignals) -> i64 {
        match self.active.source() {
            SpotSource::Weighted => und.weighted_average(),
            SpotSource::Mid => und.mid_price(),
        }
    }

    pub fn prev_spot_price(&self, und: &UnderlyingSignals) -> i64 {
        match self.active.source() {
            SpotSource::Weighted => und.prev_weighted_average(),
            SpotSource::Mid => und.prev_mid_price(),
        }
    }

    pub fn standby_spot_price(&self, und: &UnderlyingSignals) -> i64 {
        match self.standby.source() {
            SpotSource::Weighted => und.weighted_average(),
            SpotSource::Mid => und.mid_price(),
        }
    }

    pub fn standby_prev_spot_price(&self, und: &UnderlyingSignals) -> i64 {
        match self.standby.source() {
            SpotSource::Weighted => und.prev_weighted_average(),
            SpotSource::Mid => und.prev_mid_price(),
        }
    }

    pub fn active_pricer(&self) -> Option<&dyn BucketPredictor> {
        self.active.pricer().map(|i| self.pricers[i].as_ref())
    }

    pub fn standby_pricer(&self) -> Option<&dyn BucketPredictor> {
        self.standby.pricer().map(|i| self.pricers[i].as_ref())
    }

    // ── Accessors ──────────────────────────────────────────────────────

    pub fn last_tick_ns(&self) -> i64 {
        self.last_tick_ns
    }

    pub fn trigger_info(&self) -> TriggerInfo {
        self.trigger
    }

    pub fn mm_bid_price(&self) -> i32 {
        self.mm_bid_price
    }

    pub fn mm_bid_level(&self) -> i32 {
        self.mm_bid_level
    }

    pub fn mm_ask_price(&self) -> i32 {
        self.mm_ask_price
    }

    pub fn mm_ask_level(&self) -> i32 {
        self.mm_ask_level
    }

    pub fn prev_mm_bid_price(&self) -> i32 {
        self.prev_mm_bid_price
    }

    pub fn prev_mm_ask_price(&self) -> i32 {
        self.prev_mm_ask_price
    }

    pub fn mm_spread(&self) -> i32 {
        self.mm_spread
    }

    pub fn target_spread(&self) -> i32 {
        self.target_spread
    }

    pub fn bid_price(&self) -> i32 {
        self.best_bid_price
    }

    pub fn bid_level(&self) -> i32 {
        self.best_bid_level
    }

    pub fn bid_qty(&self) -> i64 {
        self.best_bid_qty
    }

    pub fn ask_price(&self) -> i32 {
        self.best_ask_price
    }

    pub fn ask_level(&self) -> i32 {
        self.best_ask_level
    }

    pub fn prev_bid_price(&self) -> i32 {
        self.prev_best_bid_price
    }

    pub fn prev_ask_price(&self) -> i32 {
        self.prev_best_ask_price
    }

    pub fn is_loosely_tight(&self) -> bool {
        self.is_loosely_tight
    }

    pub fn bucket_size(&self) -> i32 {
        self.bucket_size
    }

    pub fn ask_price_at_prev_und_tick(&self) -> i32 {
        self.ask_price_at_prev_und_tick
    }

    pub fn print_stats(&self) {
        tracing::info!(
            code = %self.code,
            down_vols_while_long = self.down_vols_while_long,
            up_vols_while_long = self.up_vols_while_long,
            "adjust vol statistics"
        );
        tracing::info!(
            code = %self.code,
            time_in_mid_mode = self.time_in_mid_mode,
            time_in_weighted_mode = self.time_in_weighted_mode,
            "pricing mode statistics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Greeks, OptionSide, UnderlyingKind};
    use crate::pricing::BucketPredictor;

    struct NullPredictor {
        target_spread: i32,
    }

    impl NullPredictor {
        fn boxed() -> Box<dyn BucketPredictor> {
            Box::new(NullPredictor {
                target_spread: i32::MAX,
            })
        }
    }

    impl BucketPredictor for NullPredictor {
        fn observe_deriv_tick(
            &mut self,
            _: i64,
            _: i32,
            _: i32,
            _: i32,
            _: i32,
            _: i32,
            _: TriggerInfo,
        ) -> Violation {
            Violation::None
        }
        fn observe_und_tick(
            &mut self,
            _: i64,
            _: i64,
            _: bool,
            _: TriggerInfo,
            _: &mut SpotInterval,
        ) -> Violation {
            Violation::None
        }
        fn observe_greeks(&mut self, _: i64, _: Greeks) {}
        fn interval_by_und_spot(&self, _: i64, _: &mut SpotInterval) -> bool {
            false
        }
        fn overlap_and_greater_interval(
            &self,
            _: i64,
            _: &mut SpotInterval,
            _: &mut SpotInterval,
        ) -> bool {
            false
        }
        fn overlap_and_smaller_interval(
            &self,
            _: i64,
            _: &mut SpotInterval,
            _: &mut SpotInterval,
        ) -> bool {
            false
        }
        fn interval_by_deriv_price(&self, _: i32, _: &mut SpotInterval) -> bool {
            false
        }
        fn interval_by_deriv_price_with_extrapolation(
            &self,
            _: i32,
            _: &mut SpotInterval,
        ) -> bool {
            false
        }
        fn target_spread_ticks(&self) -> i32 {
            self.target_spread
        }
        fn has_target_spread_changed(&self) -> bool {
            false
        }
        fn has_target_spread_changed_and_register(&mut self, _: i64, _: i32, _: i32, _: i32) -> bool {
            false
        }
        fn reset_target_spread(&mut self, _: i64, target: i32) {
            self.target_spread = target;
        }
        fn reset_and_set_target_spread(&mut self, target: i32) {
            self.target_spread = target;
        }
        fn reset(&mut self, _: i64) {}
        fn reset_and_register(&mut self, _: i64, _: &SpotInterval) {}
        fn set_issuer_max_lag(&mut self, _: i64) {}
        fn clear(&mut self) {}
    }

    struct NoopScheduler;
    impl Scheduler for NoopScheduler {
        fn schedule(&mut self, _: u64, _: crate::ports::ScheduleKind, _: i64) -> bool {
            true
        }
    }

    struct NoopInfo;
    impl InfoSender for NoopInfo {
        fn warrant_params(&mut self, _: &WarrantParams, _: BroadcastKind) {}
        fn underlying_params(&mut self, _: &crate::params::UnderlyingParams, _: BroadcastKind) {}
        fn issuer_params(&mut self, _: &crate::params::IssuerParams, _: BroadcastKind) {}
        fn issuer_und_params(
            &mut self,
            _: &crate::params::IssuerUnderlyingParams,
            _: BroadcastKind,
        ) {
        }
        fn bucket_params(&mut self, _: &BucketParams, _: BroadcastKind) {}
        fn send_event(&mut self, _: AuditEvent) {}
    }

    fn warrant_security() -> Security {
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

    fn signals() -> WarrantSignals {
        WarrantSignals::new(
            &warrant_security(),
            [NullPredictor::boxed(), NullPredictor::boxed()],
        )
    }

    fn tick(
        sig: &mut WarrantSignals,
        params: &mut WarrantParams,
        security: &Security,
        lag: &mut IssuerLagMonitor,
        ts: i64,
        bids: &[(i32, i64)],
        asks: &[(i32, i64)],
    ) {
        let book = BookSnapshot::from_prices(&SpreadTable::hk(), bids, asks, TriggerInfo::default());
        let mut events = Events::new();
        sig.begin_book_tick(ts, &book);
        sig.update_book_state(params, security, lag, &mut NoopScheduler, &mut NoopInfo, &mut events);
        sig.finish_book_tick(params, &mut NoopInfo);
    }

    #[test]
    fn mm_quote_walks_past_undersized_top_level() {
        let mut sig = signals();
        let security = warrant_security();
        let mut params = WarrantParams::new(1);
        params.mm_bid_size = 100_000;
        params.mm_ask_size = 100_000;
        let mut lag = IssuerLagMonitor::new(1, "18888");
        tick(
            &mut sig,
            &mut params,
            &security,
            &mut lag,
            1,
            &[(100, 50_000), (99, 200_000)],
            &[(101, 200_000)],
        );
        assert_eq!(sig.bid_price(), 100);
        assert_eq!(sig.mm_bid_price(), 99);
        assert_eq!(sig.mm_ask_price(), 101);
        assert_eq!(sig.mm_spread(), 2);
    }

    #[test]
    fn mm_quote_unset_when_no_level_qualifies() {
        let mut sig = signals();
        let security = warrant_security();
        let mut params = WarrantParams::new(1);
        params.mm_bid_size = 1_000_000;
        let mut lag = IssuerLagMonitor::new(1, "18888");
        tick(
            &mut sig,
            &mut params,
            &security,
            &mut lag,
            1,
            &[(100, 50_000)],
            &[(101, 2_000_000)],
        );
        assert_eq!(sig.mm_bid_price(), 0);
        assert_eq!(sig.mm_spread(), i32::MAX);
    }

    #[test]
    fn tighter_spread_becomes_target_after_observation_period() {
        let mut sig = signals();
        let security = warrant_security();
        let mut params = WarrantParams::new(1);
        params.mm_bid_size = 0;
        params.mm_ask_size = 0;
        params.spread_observation_period = 1_000_000_000;
        let mut lag = IssuerLagMonitor::new(1, "18888");
        tick(&mut sig, &mut params, &security, &mut lag, 1, &[(100, 1)], &[(102, 1)]);
        assert_eq!(sig.target_spread(), i32::MAX);
        // Spread unchanged for over 100ms: target adopts it.
        tick(
            &mut sig,
            &mut params,
            &security,
            &mut lag,
            200_000_001,
            &[(100, 1)],
            &[(102, 1)],
        );
        assert_eq!(sig.target_spread(), 2);
        assert_eq!(params.spread_state, SpreadState::Normal);
    }

    #[test]
    fn hold_bid_ban_pops_when_mm_bid_climbs_above() {
        let mut sig = signals();
        let security = warrant_security();
        let mut params = WarrantParams::new(1);
        params.use_hold_bid_ban = true;
        params.mm_bid_size = 0;
        params.mm_ask_size = 0;
        let mut lag = IssuerLagMonitor::new(1, "18888");
        sig.on_trade(
            &params,
            &MarketTrade::new(100, 10_000, TradeSide::Ask, 1),
        );
        assert_eq!(sig.hold_bid_ban_price(), 100);
        tick(&mut sig, &mut params, &security, &mut lag, 2, &[(101, 1)], &[(102, 1)]);
        assert_eq!(sig.hold_bid_ban_price(), i32::MAX);
    }

    #[test]
    fn net_trades_volume_is_signed_and_windowed() {
        let mut sig = signals();
        let mut params = WarrantParams::new(1);
        params.trades_volume_threshold = 1;
        sig.on_trade(
            &params,
            &MarketTrade::new(100, 30_000, TradeSide::Ask, 1_000_000),
        );
        sig.on_trade(
            &params,
            &MarketTrade::new(100, 10_000, TradeSide::Bid, 2_000_000),
        );
        assert_eq!(sig.net_trades_volume(), 20_000);
        sig.begin_und_spot(50_000_000, TriggerInfo::default());
        assert_eq!(sig.refresh_net_trades_volume(), 0);
    }
}
