//! The per-warrant strategy automaton.
//!
//! Owns the buy/hold/sell lifecycle: a five-state machine driven by the
//! signal generators' events, order acknowledgements and control commands.
//! Entry requires the subscribed trigger, qualified market-maker quotes, a
//! spread at target and one of three bucket-prediction signals, then must
//! pass the outstanding-volume and delta-notional risk gates. While a
//! position is held the stop loss ratchets toward the favorable side and
//! several exit paths compete, arbitrated by the active exit mode.
//!
//! All bans and cooldowns are absolute nanosecond deadlines compared
//! against tick timestamps; the same input sequence always produces the
//! same output sequence.

use std::cell::RefCell;

use tracing::{debug, info, warn};

use super::exit_mode::{ExitMode, Transition};
use super::explain::{sell_flags, ExplainReason, ExplainRecord};
use super::polarity::{polarity_for, Polarity};
use crate::domain::{Security, SpotInterval, MIN_TICK_LEVEL};
use crate::error::StrategyError;
use crate::params::warrant::{
    DEFAULT_SAFE_BID_BUFFER_FROM_CURRENT_PRICE, DEFAULT_SAFE_BID_BUFFER_FROM_ENTER_PRICE,
};
use crate::params::{
    BucketParams, IssuerParams, IssuerUnderlyingParams, StrategyStatus, UnderlyingParams,
    WarrantParams,
};
use crate::pricing::{BucketPredictor, PricingMode, ScaleFormula};
use crate::ports::{BroadcastKind, InfoSender, OrderRejectKind, OrderService, Scheduler};
use crate::signal::{Event, UnderlyingSignals, WarrantSignals};
use crate::triggers::{IssuerLagMonitor, TriggerView};

const LARGE_WARRANT_PRICE: i32 = 250;
const VERY_LARGE_WARRANT_PRICE: i32 = 500;
const EXIT_LEVEL_ALLOWANCE: i32 = 3;
const MIN_ISSUER_WIDE_TIME: i64 = 30_000_000_000;
const QUICK_PROFIT_TIME: i64 = 100_000_000;
const DELTA_LIMIT_EFFECT_TIME: i64 = 1_000_000_000;
const LARGE_OUTSTANDING_EFFECT_TIME: i64 = 1_000_000_000;
const ORDER_REJECT_BAN: i64 = 10_000_000;

/// Automaton states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Off,
    NoPositionHeld,
    BuyingPosition,
    PositionHeld,
    SellingPosition,
}

/// Everything one dispatch needs: the warrant's own mutable components
/// plus read views over the shared underlying-level state. Assembled by
/// the context per call; all borrows are disjoint fields of the runtime.
pub struct StrategyEnv<'a> {
    pub security: &'a Security,
    pub und: &'a UnderlyingSignals,
    pub signals: &'a mut WarrantSignals,
    pub params: &'a mut WarrantParams,
    pub bucket_params: &'a mut BucketParams,
    pub und_params: &'a RefCell<UnderlyingParams>,
    pub issuer_params: &'a mut IssuerParams,
    pub issuer_und_params: &'a mut IssuerUnderlyingParams,
    pub trigger: TriggerView<'a>,
    pub lag: &'a mut IssuerLagMonitor,
    pub scheduler: &'a mut dyn Scheduler,
    pub scale: &'a dyn ScaleFormula,
    pub orders: &'a mut dyn OrderService,
    pub info: &'a mut dyn InfoSender,
}

impl StrategyEnv<'_> {
    fn spot(&self) -> i64 {
        self.signals.spot_price(self.und)
    }

    fn prev_spot(&self) -> i64 {
        self.signals.prev_spot_price(self.und)
    }
}

pub struct StrategyAutomaton {
    code: String,
    state: State,
    mode: ExitMode,
    polarity: &'static dyn Polarity,
    /// Backtest-comparison behavior switch, threaded through construction.
    comparison_mode: bool,
    explain: ExplainRecord,

    high_warrant_bid: i32,
    best_spot: i64,
    target_sell_price: i32,
    sell_price: i32,
    sell_qty: i64,
    sell_flags: u32,

    turnover_time: i64,
    turnover_price: i32,

    buy_ban_until: i64,
    sell_ban_until: i64,
    sell_on_vol_down_ban_until: i64,
    quick_profit_until: i64,

    interval_by_price: SpotInterval,
    interval_by_spot: SpotInterval,
    prev_reported_overlap: SpotInterval,
    prev_reported_next: SpotInterval,
    bucket_overlap: SpotInterval,
    bucket_next: SpotInterval,

    target_stop_loss: i64,
    standby_target_stop_loss: i64,
    target_stop_loss_mode: PricingMode,

    order_status_time: i64,
    order_reject: OrderRejectKind,
    our_traded_price: i32,

    reentry_ban: bool,
    mm_bid_level_at_buy: i32,
    pending_delta_shares: i64,
    consecutive_wins: i32,
    trades_volume_at_buy: i64,

    max_current_order_size: i32,
    large_price_order_size: i32,
    very_large_price_order_size: i32,
    max_large_price_order_size: i32,
    max_very_large_price_order_size: i32,
    large_price_trades_volume_threshold: i64,
    very_large_price_trades_volume_threshold: i64,
    order_size_remainder: i32,
    large_price_order_size_remainder: i32,
    very_large_price_order_size_remainder: i32,

    delta_limit_exceed_expiry: i64,
    large_outstanding_exceed_expiry: i64,

    has_started: bool,
    cached_adjusted_delta_c: f64,
    cached_buy_delta_shares: i64,
    cached_buy_order_size: i32,
}

impl StrategyAutomaton {
    pub fn new(security: &Security, comparison_mode: bool) -> Self {
        Self {
            code: security.code.clone(),
            state: State::Off,
            mode: ExitMode::Normal,
            polarity: polarity_for(security.side),
            comparison_mode,
            explain: ExplainRecord::new(security.sid),
            high_warrant_bid: 0,
            best_spot: 0,
            target_sell_price: i32::MAX,
            sell_price: 0,
            sell_qty: 0,
            sell_flags: 0,
            turnover_time: 0,
            turnover_price: 0,
            buy_ban_until: 0,
            sell_ban_until: 0,
            sell_on_vol_down_ban_until: 0,
            quick_profit_until: 0,
            interval_by_price: SpotInterval::empty(),
            interval_by_spot: SpotInterval::empty(),
            prev_reported_overlap: SpotInterval::empty(),
            prev_reported_next: SpotInterval::empty(),
            bucket_overlap: SpotInterval::empty(),
            bucket_next: SpotInterval::empty(),
            target_stop_loss: 0,
            standby_target_stop_loss: 0,
            target_stop_loss_mode: PricingMode::Unknown,
            order_status_time: 0,
            order_reject: OrderRejectKind::None,
            our_traded_price: 0,
            reentry_ban: true,
            mm_bid_level_at_buy: 0,
            pending_delta_shares: 0,
            consecutive_wins: 0,
            trades_volume_at_buy: 0,
            max_current_order_size: 0,
            large_price_order_size: 0,
            very_large_price_order_size: 0,
            max_large_price_order_size: 0,
            max_very_large_price_order_size: 0,
            large_price_trades_volume_threshold: 0,
            very_large_price_trades_volume_threshold: 0,
            order_size_remainder: 0,
            large_price_order_size_remainder: 0,
            very_large_price_order_size_remainder: 0,
            delta_limit_exceed_expiry: 0,
            large_outstanding_exceed_expiry: 0,
            has_started: false,
            cached_adjusted_delta_c: 0.0,
            cached_buy_delta_shares: 0,
            cached_buy_order_size: 0,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn exit_mode(&self) -> ExitMode {
        self.mode
    }

    pub fn is_on(&self) -> bool {
        self.state != State::Off
    }

    pub fn is_off(&self) -> bool {
        self.state == State::Off
    }

    pub fn is_exiting(&self) -> bool {
        self.mode.off_when_exit_position() && self.state != State::Off
    }

    pub fn has_started(&self) -> bool {
        self.has_started
    }

    pub fn mark_started(&mut self) {
        self.has_started = true;
    }

    // ── Sizing precomputation ──────────────────────────────────────────

    pub fn initialize(&mut self, params: &mut WarrantParams, lot_size: i32) {
        self.calculate_max_order_size(params);
        self.cap_and_calculate_order_size(params, lot_size);
        self.calculate_trades_volume_threshold(params);
        self.calculate_order_size_remainder(params, lot_size);
    }

    pub fn calculate_trades_volume_threshold(&mut self, params: &WarrantParams) {
        self.large_price_trades_volume_threshold = params.trades_volume_threshold / 5;
        self.very_large_price_trades_volume_threshold = params.trades_volume_threshold / 10;
    }

    pub fn calculate_max_order_size(&mut self, params: &WarrantParams) {
        self.max_current_order_size = if params.order_size_increment == 0 {
            params.max_order_size
        } else {
            let floored = (params.max_order_size / params.order_size_increment)
                * params.order_size_increment;
            if floored < params.max_order_size {
                floored + params.order_size_increment
            } else {
                floored
            }
        };
        self.max_large_price_order_size = params.max_order_size / 5;
        self.max_very_large_price_order_size = params.max_order_size / 10;
    }

    pub fn calculate_order_size(&mut self, params: &mut WarrantParams, lot_size: i32) {
        let scaled = |divisor: i64| -> i32 {
            (params.current_order_size as i64 * params.order_size_multiplier as i64 / divisor)
                .min(i32::MAX as i64) as i32
        };
        params.order_size = scaled(1000).min(params.max_order_size);
        self.large_price_order_size = scaled(5000).min(self.max_large_price_order_size);
        self.very_large_price_order_size = scaled(10_000).min(self.max_very_large_price_order_size);
        if lot_size > 0 {
            params.order_size = lot_size.max((params.order_size / lot_size) * lot_size);
            self.large_price_order_size =
                lot_size.max((self.large_price_order_size / lot_size) * lot_size);
            self.very_large_price_order_size =
                lot_size.max((self.very_large_price_order_size / lot_size) * lot_size);
        }
    }

    pub fn calculate_order_size_remainder(&mut self, params: &WarrantParams, lot_size: i32) {
        if params.order_size_remainder > 0 {
            self.order_size_remainder = params.order_size_remainder;
            self.large_price_order_size_remainder = self.order_size_remainder / 5;
            self.very_large_price_order_size_remainder = self.order_size_remainder / 10;
            if lot_size > 0 {
                self.order_size_remainder =
                    lot_size.max((self.order_size_remainder / lot_size) * lot_size);
                self.large_price_order_size_remainder =
                    lot_size.max((self.large_price_order_size_remainder / lot_size) * lot_size);
                self.very_large_price_order_size_remainder = lot_size
                    .max((self.very_large_price_order_size_remainder / lot_size) * lot_size);
            }
        } else {
            self.order_size_remainder = 0;
            self.large_price_order_size_remainder = 0;
            self.very_large_price_order_size_remainder = 0;
        }
    }

    pub fn cap_and_calculate_order_size(&mut self, params: &mut WarrantParams, lot_size: i32) {
        params.current_order_size = params.current_order_size.min(self.max_current_order_size);
        self.calculate_order_size(params, lot_size);
    }

    pub fn on_updated_trades_volume_threshold(&mut self, last_tick_ns: i64, params: &WarrantParams) {
        self.calculate_trades_volume_threshold(params);
        if last_tick_ns > self.large_outstanding_exceed_expiry {
            self.large_outstanding_exceed_expiry = 0;
        }
    }

    // ── Control surface ────────────────────────────────────────────────

    pub fn on_switched_on(&mut self, env: &mut StrategyEnv) -> Result<(), StrategyError> {
        self.mode = ExitMode::Normal;
        if env.security.position() > 0 && env.params.enter_price == 0 {
            self.mode = ExitMode::Error;
            self.set_param_status(StrategyStatus::Error, env);
            return Err(StrategyError::MissingEnterPrice {
                code: self.code.clone(),
            });
        }
        self.set_param_status(self.mode.default_status(), env);
        self.on_event(Event::SwitchedOn, env);
        Ok(())
    }

    pub fn on_switched_off(&mut self, exit_mode: ExitMode, env: &mut StrategyEnv) {
        if self.mode.can_be_replaced_by(exit_mode, self.is_on()) {
            self.mode = exit_mode;
            self.set_param_status(self.mode.default_status(), env);
            self.on_event(Event::SwitchedOff, env);
        }
    }

    pub fn on_capture_profit(&mut self, env: &mut StrategyEnv) {
        debug!(code = %self.code, seq = env.signals.trigger_info().seq_num, "user capture profit");
        self.on_event(Event::CaptureProfit, env);
    }

    pub fn on_place_sell_order(&mut self, env: &mut StrategyEnv) {
        self.on_event(Event::PlaceSellOrder, env);
    }

    pub fn on_order_status(
        &mut self,
        nano_of_day: i64,
        price: i32,
        reject: OrderRejectKind,
        env: &mut StrategyEnv,
    ) {
        self.order_status_time = nano_of_day;
        self.order_reject = reject;
        self.our_traded_price = price;
        self.on_event(Event::OrderStatusUpdated, env);
    }

    pub fn on_turnover_making_detected(&mut self, nano_of_day: i64, price: i32, env: &mut StrategyEnv) {
        self.turnover_time = nano_of_day;
        self.turnover_price = price;
        env.info.send_event(crate::ports::AuditEvent {
            kind: crate::ports::AuditEventKind::TurnoverMakingSignal,
            security_sid: env.security.sid,
            nano_of_day,
            value_kind: crate::ports::AuditValueKind::TurnoverPrice,
            value: price as i64,
        });
        debug!(code = %self.code, price, seq = env.signals.trigger_info().seq_num, "turnover making signal");
        self.on_event(Event::TurnoverMaking, env);
    }

    pub fn on_delta_limit_exceeded(
        &mut self,
        trigger_is_self: bool,
        nano_of_day: i64,
        env: &mut StrategyEnv,
    ) {
        self.delta_limit_exceed_expiry = nano_of_day + DELTA_LIMIT_EFFECT_TIME;
        // The triggering warrant sees its own book tick this cycle anyway.
        if !trigger_is_self {
            self.on_event(Event::DeltaLimitAlertReceived, env);
        }
    }

    pub fn on_stop_loss_externally_updated(&mut self, params: &mut WarrantParams) {
        params.stop_loss_adjustment = 0;
        self.target_stop_loss = params.stop_loss;
    }

    pub fn on_updated_do_not_sell(&mut self, env: &mut StrategyEnv) {
        if self.is_on()
            && !env.params.do_not_sell
            && self.polarity.is_spot_behind(env.spot(), env.params.stop_loss)
        {
            env.params.stop_loss = env.spot();
            info!(code = %self.code, stop_loss = env.params.stop_loss, "do-not-sell lifted with stop loss hit, snapping stop to spot");
        }
    }

    pub fn on_updated_sell_at_break_even_only(&mut self, env: &mut StrategyEnv) {
        if self.is_on()
            && !env.params.sell_at_break_even_only
            && self.polarity.is_spot_behind(env.spot(), env.params.stop_loss)
        {
            env.params.stop_loss = env.spot();
            info!(code = %self.code, stop_loss = env.params.stop_loss, "breakeven-only lifted with stop loss hit, snapping stop to spot");
        }
    }

    pub fn reset(&mut self, env: &mut StrategyEnv) {
        env.params.enter_mm_spread = i32::MAX;
        env.params.enter_price = 0;
        env.params.enter_level = 0;
        env.params.exit_level = 0;
        env.params.stop_loss = 0;
        env.params.stop_loss_adjustment = 0;
        env.params.profit_run = 0;
        env.params.stop_loss_trigger = 0;
        env.params.allow_stop_loss_on_wide_spread = false;
        env.params.do_not_sell = false;
        env.params.sell_at_break_even_only = false;
        env.params.ignore_mm_size_on_sell = false;
        self.target_sell_price = i32::MAX;
        self.target_stop_loss = 0;
        self.target_stop_loss_mode = PricingMode::Unknown;
        self.standby_target_stop_loss = 0;
        env.info.warrant_params(env.params, BroadcastKind::Batched);
        self.mode = ExitMode::Normal;
        self.buy_ban_until = 0;
        self.sell_ban_until = 0;
        self.quick_profit_until = 0;
        self.sell_on_vol_down_ban_until = 0;
        self.sell_flags = 0;
        self.delta_limit_exceed_expiry = 0;
        self.large_outstanding_exceed_expiry = 0;
        self.state = State::Off;
    }

    // ── Event dispatch ─────────────────────────────────────────────────

    pub fn on_event(&mut self, event: Event, env: &mut StrategyEnv) {
        if let Some(transition) = self.translate(event, env) {
            self.apply(transition, env);
        }
    }

    fn translate(&mut self, event: Event, env: &mut StrategyEnv) -> Option<Transition> {
        match (self.state, event) {
            // ── NO_POSITION_HELD ──
            (State::NoPositionHeld, Event::SpotUpdated) => {
                let reason = self.buy_trigger_reason(env);
                match reason {
                    ExplainReason::PredictionByBidBucket | ExplainReason::PredictionByBucket => {
                        self.set_initial_stop_losses(self.cached_adjusted_delta_c, env);
                    }
                    ExplainReason::PredictionByPrevSpot => {
                        self.set_initial_stop_losses_using_prev_spot(self.cached_adjusted_delta_c, env);
                    }
                    _ => return None,
                }
                env.lag.on_trigger_up(env.scheduler, env.signals.last_tick_ns());
                self.explain.reason = reason;
                Some(Transition::BuyPosition)
            }
            (State::NoPositionHeld, Event::SwitchedOff) => Some(Transition::ExitStrategy),
            (
                State::NoPositionHeld | State::BuyingPosition | State::SellingPosition,
                Event::TurnoverMaking,
            ) => {
                self.arm_turnover_buy_ban(env);
                None
            }
            (
                State::NoPositionHeld | State::BuyingPosition | State::SellingPosition,
                Event::DownVolFromUnderlyingTick | Event::DownVolFromWarrantTick,
            ) => {
                self.arm_down_vol_buy_ban(env);
                None
            }

            // ── BUYING_POSITION ──
            (State::BuyingPosition, Event::OrderStatusUpdated) => {
                self.clear_pending_delta_shares(env);
                if env.security.position() > 0 {
                    env.params.enter_quantity = env.security.position() as i32;
                    if !self.comparison_mode {
                        if let Some(t) = self.check_for_exit_on_warrant_price_update(env) {
                            return Some(t);
                        }
                    }
                    Some(self.mode.on_position_bought())
                } else {
                    self.buy_ban_until = self
                        .buy_ban_until
                        .max(env.signals.last_tick_ns() + ORDER_REJECT_BAN);
                    debug!(
                        code = %self.code,
                        ban_until = self.buy_ban_until,
                        seq = env.signals.trigger_info().seq_num,
                        "buy ban armed after order reject"
                    );
                    Some(self.mode.on_position_not_bought())
                }
            }
            (State::BuyingPosition, Event::WarrantTickReceived) => {
                if env.orders.can_trade() && self.sell_ban_until > 0 {
                    let mm_moved = env.signals.mm_ask_price() != env.signals.prev_mm_ask_price()
                        || env.signals.mm_bid_price() != env.signals.prev_mm_bid_price();
                    if mm_moved {
                        debug!(code = %self.code, seq = env.signals.trigger_info().seq_num, "sell ban lifted");
                        self.sell_ban_until = 0;
                    }
                }
                if self.reentry_ban && env.signals.mm_bid_level() != self.mm_bid_level_at_buy {
                    self.reentry_ban = false;
                }
                self.high_warrant_bid = self.high_warrant_bid.max(env.signals.bid_price());
                None
            }
            (State::BuyingPosition, Event::MarketTradeReceived) => {
                if self.update_trades_volume_at_buy(env) {
                    self.has_large_trade_volume_signal(env);
                }
                None
            }
            (State::BuyingPosition, Event::SwitchedOff) => self.mode_entered_on_pending_buy(),

            // ── POSITION_HELD ──
            (State::PositionHeld, Event::SwitchedOff) => self.mode_entered_on_position(env),
            (State::PositionHeld | State::SellingPosition, Event::AllowStopLossOnWideSpreadUpdated) => {
                if env.params.allow_stop_loss_on_wide_spread {
                    self.adjust_safe_bid_buffer(env);
                    if self.polarity.is_spot_behind(env.spot(), env.params.stop_loss) {
                        env.params.stop_loss = self.polarity.underlying_bid_spot(env.und);
                        info!(
                            code = %self.code,
                            stop_loss = env.params.stop_loss,
                            seq = env.signals.trigger_info().seq_num,
                            "wide-spread stop loss enabled while hit, snapping stop to bid"
                        );
                    }
                }
                None
            }
            (State::PositionHeld | State::SellingPosition, Event::IgnoreMmSizeOnSellUpdated) => {
                if env.params.ignore_mm_size_on_sell {
                    self.adjust_safe_bid_buffer(env);
                    if self.polarity.is_spot_behind(env.spot(), env.params.stop_loss) {
                        env.params.stop_loss = self.polarity.underlying_bid_spot(env.und);
                        info!(
                            code = %self.code,
                            stop_loss = env.params.stop_loss,
                            seq = env.signals.trigger_info().seq_num,
                            "ignore-mm-size enabled while stop loss hit, snapping stop to bid"
                        );
                    }
                }
                None
            }
            (State::PositionHeld, Event::SpotUpdated) => {
                let result = self.spot_updated_on_position(env);
                self.broadcast_bucket_update(env);
                result
            }
            (State::PositionHeld, Event::WarrantTickReceived) => {
                self.warrant_tick_on_position(env)
            }
            (State::PositionHeld, Event::PricingModeUpdated) => {
                if self.target_stop_loss_mode != env.params.pricing_mode {
                    let old_target = self.target_stop_loss;
                    if self.standby_target_stop_loss != env.params.stop_loss
                        && self.mode.can_revise_stop_loss()
                    {
                        env.params.stop_loss = self.standby_target_stop_loss;
                        env.info.warrant_params(env.params, BroadcastKind::Batched);
                        debug!(
                            code = %self.code,
                            exit_level = env.params.exit_level,
                            stop_loss = env.params.stop_loss,
                            seq = env.signals.trigger_info().seq_num,
                            "stop loss carried over on pricing mode switch"
                        );
                    }
                    self.standby_target_stop_loss = old_target;
                    self.target_stop_loss = env.params.stop_loss;
                    self.target_stop_loss_mode = env.params.pricing_mode;
                }
                None
            }
            (State::PositionHeld, Event::CaptureProfit) => {
                if env.signals.bid_price() >= env.params.enter_price {
                    self.explain.reason = ExplainReason::UserCaptureProfit;
                    self.sell_price = env.signals.bid_price();
                    self.sell_qty = env.security.available_position();
                    Some(Transition::SellPosition)
                } else {
                    debug!(
                        code = %self.code,
                        bid = env.signals.bid_price(),
                        enter = env.params.enter_price,
                        seq = env.signals.trigger_info().seq_num,
                        "cannot capture profit below enter price"
                    );
                    None
                }
            }
            (State::PositionHeld, Event::PlaceSellOrder) => {
                if env.security.pending_sell() == 0 {
                    let bid_level =
                        env.params.enter_level + env.params.manual_order_ticks_from_enter_price;
                    let bid_price = env.security.spread_table.tick_to_price(bid_level);
                    let lot = env.security.lot_size;
                    let half_entry = (env.params.enter_quantity / (2 * lot)) * lot;
                    let sell_qty =
                        (lot.max(half_entry) as i64).min(env.security.available_position());
                    self.explain.reason = ExplainReason::UserPlaceSellOrder;
                    self.update_strategy_explain(env);
                    env.orders.sell_limit(env.security, bid_price, sell_qty, &self.explain);
                }
                None
            }
            (State::PositionHeld, Event::DownVolForStandbyPricer) => {
                if env.params.reset_stop_loss_on_vol_down
                    && env.signals.mm_bid_level() >= MIN_TICK_LEVEL
                {
                    let (stop_loss_bid, spot_adjustment, stop_loss_buffer) =
                        self.vol_down_stop_loss_inputs(env);
                    // Half-tick buffer: the buckets were just reset after
                    // the issuer dropped vol.
                    self.standby_target_stop_loss = self.restricted_target_stop_loss(
                        stop_loss_bid,
                        env.signals.standby_spot_price(env.und),
                        spot_adjustment,
                        self.standby_target_stop_loss,
                        stop_loss_buffer,
                        true,
                        env,
                    );
                }
                None
            }
            (State::PositionHeld, Event::DownVolFromUnderlyingTick) => {
                let result = self.handle_issuer_vol_down_on_position(false, env);
                self.broadcast_bucket_update(env);
                result
            }
            (State::PositionHeld, Event::DownVolFromWarrantTick) => {
                let result = self.handle_issuer_vol_down_on_position(true, env);
                self.broadcast_bucket_update(env);
                result
            }
            (State::PositionHeld, Event::NonDownVolViolation) => {
                if env.params.stop_loss_adjustment != 0 {
                    env.params.stop_loss_adjustment = 0;
                    env.info.warrant_params(env.params, BroadcastKind::Throttled);
                }
                None
            }
            (State::PositionHeld, Event::TurnoverMaking) => {
                self.buy_ban_until = self
                    .buy_ban_until
                    .max(self.turnover_time + env.params.ban_period_to_turnover_making);
                self.sell_flags |= sell_flags::TURNOVER_MAKING;
                debug!(
                    code = %self.code,
                    ban_until = self.buy_ban_until,
                    turnover_price = self.turnover_price,
                    seq = env.signals.trigger_info().seq_num,
                    "buy ban armed on turnover making"
                );
                self.target_sell_price = self.turnover_price;
                if env.signals.bid_price() >= self.turnover_price {
                    return self.try_enter_selling_at(
                        ExplainReason::TurnoverMakingSell,
                        self.target_sell_price,
                        None,
                        env,
                    );
                }
                None
            }
            (State::PositionHeld, Event::DeltaLimitAlertReceived) => {
                if env.signals.bid_price() >= env.params.enter_price
                    && (self.target_sell_price == i32::MAX
                        || env.signals.bid_price() >= self.target_sell_price)
                {
                    return self.try_enter_selling_at_enter_price(
                        ExplainReason::DeltaLimitSell,
                        None,
                        env,
                    );
                }
                None
            }
            (State::PositionHeld, Event::IssuerSmoothingCompleted) => {
                if env.params.issuer_smoothing > MIN_ISSUER_WIDE_TIME {
                    self.sell_flags |= sell_flags::WIDE;
                }
                None
            }
            (State::PositionHeld, Event::MarketTradeReceived) => {
                if self.update_trades_volume_at_buy(env)
                    && self.has_large_trade_volume_signal(env)
                    && env.signals.bid_price() >= env.params.enter_price
                    && (self.target_sell_price == i32::MAX
                        || env.signals.bid_price() >= self.target_sell_price)
                {
                    return self.try_sell_excess_at_enter_price(
                        ExplainReason::LargeOutstandingSell,
                        None,
                        env,
                    );
                }
                None
            }
            (State::PositionHeld | State::SellingPosition, Event::OrderStatusUpdated) => {
                self.order_status_on_sell(env)
            }

            // ── SELLING_POSITION ──
            (State::SellingPosition, Event::SwitchedOff) => self.mode_entered_on_pending_sell(),
            (State::SellingPosition, Event::SpotUpdated) => {
                self.broadcast_bucket_update(env);
                None
            }

            // ── OFF ──
            (State::Off, Event::SwitchedOn) => {
                if env.security.position() > 0 {
                    env.params.enter_quantity = env.security.position() as i32;
                    env.signals.enable_collect_buckets();
                    Some(Transition::EnterWithPosition)
                } else {
                    env.signals.enable_collect_buckets();
                    Some(Transition::EnterWithoutPosition)
                }
            }
            (State::Off, Event::SwitchedOff) => Some(Transition::ExitStrategy),

            // Everything else is an explicit no-transition.
            _ => None,
        }
    }

    fn apply(&mut self, transition: Transition, env: &mut StrategyEnv) {
        let Some(next) = Self::target_state(self.state, transition) else {
            warn!(code = %self.code, ?transition, state = ?self.state, "unlinked transition, ignoring");
            return;
        };
        self.state = next;
        match next {
            State::BuyingPosition => self.enter_buying(env),
            State::SellingPosition => self.enter_selling(env),
            State::Off => self.enter_off(env),
            _ => {}
        }
    }

    fn target_state(state: State, transition: Transition) -> Option<State> {
        use State::*;
        use Transition::*;
        match (state, transition) {
            (NoPositionHeld, BuyPosition) => Some(BuyingPosition),
            (NoPositionHeld, ExitStrategy) => Some(Off),
            (BuyingPosition, OrderFilled) => Some(PositionHeld),
            (BuyingPosition, ProfitRun) => Some(PositionHeld),
            (BuyingPosition, OrderNotFilled) => Some(NoPositionHeld),
            (BuyingPosition, SellPosition) => Some(SellingPosition),
            (BuyingPosition, ExitStrategy) => Some(Off),
            (PositionHeld, ProfitRun) => Some(PositionHeld),
            (PositionHeld, SellPosition) => Some(SellingPosition),
            (PositionHeld, OrderFilled) => Some(NoPositionHeld),
            (PositionHeld, ExitStrategy) => Some(Off),
            (SellingPosition, OrderFilled) => Some(NoPositionHeld),
            (SellingPosition, OrderNotFilled) => Some(PositionHeld),
            (SellingPosition, SellPosition) => Some(SellingPosition),
            (SellingPosition, ExitStrategy) => Some(Off),
            (Off, EnterWithPosition) => Some(PositionHeld),
            (Off, EnterWithoutPosition) => Some(NoPositionHeld),
            (Off, ExitStrategy) => Some(Off),
            _ => None,
        }
    }

    // ── State entry actions ────────────────────────────────────────────

    fn enter_buying(&mut self, env: &mut StrategyEnv) {
        let order_size = if self.cached_buy_order_size == 0 {
            self.order_size_to_buy(env)
        } else {
            self.cached_buy_order_size
        };
        self.buy(order_size, env);
    }

    fn enter_selling(&mut self, env: &mut StrategyEnv) {
        match self.mode {
            ExitMode::Error | ExitMode::NoExit => {}
            ExitMode::PriceCheckExit | ExitMode::ClosingPriceCheckExit => self.sell_to_exit(env),
            ExitMode::NoCheckExit => self.sell_to_exit_no_check(env),
            _ => self.sell(env),
        }
    }

    fn enter_off(&mut self, env: &mut StrategyEnv) {
        if env.params.status != StrategyStatus::Off && env.params.status != StrategyStatus::Error {
            let mode = env.params.pricing_mode;
            if mode != env.params.default_pricing_mode
                && matches!(mode, PricingMode::Mid | PricingMode::Weighted)
                && !self.comparison_mode
            {
                env.params.default_pricing_mode = mode;
            }
            self.set_param_status_only(StrategyStatus::Off, env);
            env.info.warrant_params(env.params, BroadcastKind::Immediate);
        }
        self.mode = ExitMode::Normal;
        env.signals.print_stats();
        env.lag.print_stats();
    }

    // ── Exit-mode hooks ────────────────────────────────────────────────

    fn mode_entered_on_pending_buy(&self) -> Option<Transition> {
        match self.mode {
            ExitMode::Error | ExitMode::NoExit => Some(Transition::ExitStrategy),
            _ => None,
        }
    }

    fn mode_entered_on_pending_sell(&self) -> Option<Transition> {
        match self.mode {
            ExitMode::Error | ExitMode::NoExit => Some(Transition::ExitStrategy),
            _ => None,
        }
    }

    fn mode_entered_on_position(&mut self, env: &mut StrategyEnv) -> Option<Transition> {
        match self.mode {
            ExitMode::Normal => None,
            ExitMode::Error | ExitMode::NoExit => Some(Transition::ExitStrategy),
            ExitMode::StrategyExit
            | ExitMode::ScoreboardExit
            | ExitMode::ClosingStrategyExit
            | ExitMode::SemiManualExit => {
                self.adjust_safe_bid_buffer(env);
                None
            }
            ExitMode::PriceCheckExit | ExitMode::ClosingPriceCheckExit => {
                self.adjust_safe_bid_buffer(env);
                if env.orders.can_trade() && self.is_price_safe_to_exit(env) {
                    if self.mode == ExitMode::ClosingPriceCheckExit && self.do_not_sell(env) {
                        return None;
                    }
                    self.explain.reason = ExplainReason::ExitStrategySell;
                    return Some(Transition::SellPosition);
                }
                None
            }
            ExitMode::NoCheckExit => {
                self.adjust_safe_bid_buffer(env);
                if env.orders.can_trade() && env.signals.bid_price() >= env.params.safe_bid_price {
                    self.explain.reason = ExplainReason::ExitStrategySell;
                    return Some(Transition::SellPosition);
                }
                None
            }
        }
    }

    fn warrant_tick_on_position(&mut self, env: &mut StrategyEnv) -> Option<Transition> {
        match self.mode {
            ExitMode::PriceCheckExit | ExitMode::ClosingPriceCheckExit => {
                let result = self.handle_warrant_price_update_on_position(env);
                if result.is_none() && env.orders.can_trade() && self.is_price_safe_to_exit(env) {
                    return self.try_enter_sell_to_exit(ExplainReason::ExitStrategySell, None, env);
                }
                None
            }
            ExitMode::NoCheckExit => {
                let result = self.handle_warrant_price_update_on_position(env);
                if result.is_none()
                    && env.orders.can_trade()
                    && env.signals.bid_price() >= env.params.safe_bid_price
                {
                    return self.try_enter_sell_to_exit(ExplainReason::ExitStrategySell, None, env);
                }
                None
            }
            _ => self.handle_warrant_price_update_on_position(env),
        }
    }

    fn spot_updated_on_position(&mut self, env: &mut StrategyEnv) -> Option<Transition> {
        match self.mode {
            ExitMode::PriceCheckExit | ExitMode::ClosingPriceCheckExit => {
                let result = self.handle_spot_update_on_position(env);
                if result.is_none() && env.orders.can_trade() && self.is_price_safe_to_exit(env) {
                    return self.try_enter_sell_to_exit(ExplainReason::ExitStrategySell, None, env);
                }
                None
            }
            ExitMode::NoCheckExit => {
                let result = self.handle_spot_update_on_position(env);
                if result.is_none()
                    && env.orders.can_trade()
                    && env.signals.bid_price() >= env.params.safe_bid_price
                {
                    return self.try_enter_sell_to_exit(ExplainReason::ExitStrategySell, None, env);
                }
                None
            }
            _ => self.handle_spot_update_on_position(env),
        }
    }

    fn allow_stop_loss_on_wide_spread(&self, env: &StrategyEnv) -> bool {
        let mm_present = env.signals.mm_bid_level() > 0 || env.params.ignore_mm_size_on_sell;
        match self.mode {
            ExitMode::Normal | ExitMode::ScoreboardExit => {
                env.params.allow_stop_loss_on_wide_spread && mm_present
            }
            _ => !self.comparison_mode && mm_present,
        }
    }

    // ── Bans ───────────────────────────────────────────────────────────

    fn arm_turnover_buy_ban(&mut self, env: &StrategyEnv) {
        self.buy_ban_until = self
            .buy_ban_until
            .max(self.turnover_time + env.params.ban_period_to_turnover_making);
        debug!(
            code = %self.code,
            ban_until = self.buy_ban_until,
            turnover_price = self.turnover_price,
            seq = env.signals.trigger_info().seq_num,
            "buy ban armed on turnover making"
        );
    }

    fn arm_down_vol_buy_ban(&mut self, env: &mut StrategyEnv) {
        self.buy_ban_until = self
            .buy_ban_until
            .max(env.signals.last_tick_ns() + env.params.ban_period_to_down_vol);
        debug!(
            code = %self.code,
            ban_until = self.buy_ban_until,
            seq = env.signals.trigger_info().seq_num,
            "buy ban armed on issuer down vol"
        );
        if env.params.stop_loss_adjustment != 0 {
            env.params.stop_loss_adjustment = 0;
            env.info.warrant_params(env.params, BroadcastKind::Throttled);
        }
    }

    // ── Entry detection ────────────────────────────────────────────────

    fn buy_trigger_reason(&mut self, env: &mut StrategyEnv) -> ExplainReason {
        if !env.orders.can_trade()
            || env.signals.active_pricer().is_none()
            || env.signals.last_tick_ns() < self.buy_ban_until
            || env.params.tick_sensitivity < env.params.tick_sensitivity_threshold
        {
            return ExplainReason::None;
        }
        let triggered = {
            let und_params = env.und_params.borrow();
            env.trigger.is_triggered(self.polarity.side(), &und_params)
        };
        if !(triggered
            && env.signals.mm_bid_level() >= MIN_TICK_LEVEL
            && env.signals.mm_ask_level() >= MIN_TICK_LEVEL
            && env.signals.mm_spread() <= env.params.allowed_max_spread
            && env.signals.target_spread() == env.signals.mm_spread())
        {
            return ExplainReason::None;
        }
        self.cached_adjusted_delta_c = self.calc_adjusted_delta_c(env);
        if self.cached_adjusted_delta_c == 0.0 {
            return ExplainReason::None;
        }
        let spot_buffer = self.tick_buffer_spot_adjustment(self.cached_adjusted_delta_c, env);
        let spot = env.spot();
        // Resolve the prediction first; the risk gates need the env back
        // mutably.
        let prediction = {
            let Some(pricer) = env.signals.active_pricer() else {
                return ExplainReason::None;
            };
            if pricer.interval_by_und_spot(spot - spot_buffer, &mut self.interval_by_spot) {
                if self.interval_by_spot.anchor_price >= env.signals.ask_price() {
                    Some(ExplainReason::PredictionByBidBucket)
                } else {
                    None
                }
            } else if env.params.greeks.delta != 0 {
                // The spot has run past the observed range for the current
                // bucket; test the move against the implied ask-bid gap.
                if pricer
                    .interval_by_deriv_price(env.signals.mm_bid_price(), &mut self.interval_by_price)
                {
                    let spot_to_cover =
                        self.target_spot_move(self.cached_adjusted_delta_c, env) + spot_buffer;
                    if self.polarity.is_spot_beyond(
                        spot,
                        self.polarity.bucket_anchor(&self.interval_by_price) + spot_to_cover,
                    ) {
                        Some(ExplainReason::PredictionByBucket)
                    } else {
                        None
                    }
                } else if env.prev_spot() != 0 {
                    let spot_to_cover =
                        self.target_spot_move(self.cached_adjusted_delta_c, env) + spot_buffer;
                    if self
                        .polarity
                        .is_spot_beyond(spot, env.prev_spot() + spot_to_cover)
                    {
                        Some(ExplainReason::PredictionByPrevSpot)
                    } else {
                        None
                    }
                } else {
                    None
                }
            } else {
                None
            }
        };
        match prediction {
            Some(reason) => self.check_risk_gates(reason, env),
            None => ExplainReason::None,
        }
    }

    /// Both risk gates must pass before a prediction signal may buy;
    /// failing a gate suppresses the entry without changing state.
    fn check_risk_gates(&mut self, reason: ExplainReason, env: &mut StrategyEnv) -> ExplainReason {
        self.cached_buy_delta_shares = 0;
        self.cached_buy_order_size = 0;
        if env.signals.mm_ask_price() > env.signals.hold_bid_ban_price() {
            debug!(
                code = %self.code,
                mm_ask = env.signals.mm_ask_price(),
                banned = env.signals.hold_bid_ban_price(),
                seq = env.signals.trigger_info().seq_num,
                "entry suppressed by hold bid ban"
            );
            return ExplainReason::None;
        }
        if env.params.trades_volume_threshold != 0 {
            let buy_order_size = self.order_size_to_buy(env);
            let threshold =
                self.adjusted_trades_volume_threshold(env.params, env.signals.ask_price());
            if env.signals.refresh_net_trades_volume() + buy_order_size as i64 >= threshold {
                debug!(
                    code = %self.code,
                    threshold,
                    outstanding = env.signals.net_trades_volume(),
                    seq = env.signals.trigger_info().seq_num,
                    "entry suppressed by outstanding trade volume"
                );
                return ExplainReason::None;
            }
            self.cached_buy_order_size = buy_order_size;
        }
        if env.issuer_und_params.und_trade_vol_threshold != 0 {
            if env.signals.last_tick_ns() <= self.delta_limit_exceed_expiry {
                debug!(code = %self.code, seq = env.signals.trigger_info().seq_num, "entry suppressed by delta limit alert");
                return ExplainReason::None;
            }
            let mut buy_order_size = self.order_size_to_buy(env);
            let threshold_shares = crate::triggers::delta_limit::delta_shares_for_notional(
                env.issuer_und_params.und_trade_vol_threshold,
                env.und.weighted_average(),
            );
            let current_shares = env.issuer_und_params.und_delta_shares
                + env.issuer_und_params.pending_und_delta_shares;
            if current_shares.abs() > threshold_shares {
                debug!(
                    code = %self.code,
                    delta_shares = env.issuer_und_params.und_delta_shares,
                    pending = env.issuer_und_params.pending_und_delta_shares,
                    seq = env.signals.trigger_info().seq_num,
                    "entry suppressed by delta limit"
                );
                return ExplainReason::None;
            } else if env.params.greeks.delta != 0 {
                let available = self
                    .polarity
                    .available_delta_shares(current_shares, threshold_shares);
                let available_qty = (available * env.security.conv_ratio as i64 * 100
                    / env.params.greeks.delta.unsigned_abs() as i64)
                    as i32;
                if available_qty < buy_order_size {
                    buy_order_size =
                        (available_qty / env.security.lot_size) * env.security.lot_size;
                    if buy_order_size > 0 {
                        debug!(
                            code = %self.code,
                            seq = env.signals.trigger_info().seq_num,
                            "buy size shrunk to remaining delta capacity"
                        );
                    } else {
                        debug!(
                            code = %self.code,
                            seq = env.signals.trigger_info().seq_num,
                            "entry suppressed, no delta capacity left"
                        );
                        return ExplainReason::None;
                    }
                }
            }
            self.cached_buy_order_size = buy_order_size;
            self.cached_buy_delta_shares = buy_order_size as i64 * env.params.greeks.delta as i64
                / (env.security.conv_ratio as i64 * 100);
        }
        reason
    }

    fn order_size_to_buy(&self, env: &StrategyEnv) -> i32 {
        if env.signals.ask_price() < LARGE_WARRANT_PRICE {
            env.params.order_size
        } else if env.signals.ask_price() < VERY_LARGE_WARRANT_PRICE {
            self.large_price_order_size
        } else {
            self.very_large_price_order_size
        }
    }

    fn adjusted_trades_volume_threshold(&self, params: &WarrantParams, price: i32) -> i64 {
        if price < LARGE_WARRANT_PRICE {
            params.trades_volume_threshold
        } else if price < VERY_LARGE_WARRANT_PRICE {
            self.large_price_trades_volume_threshold
        } else {
            self.very_large_price_trades_volume_threshold
        }
    }

    // ── Order placement ────────────────────────────────────────────────

    fn buy(&mut self, order_size: i32, env: &mut StrategyEnv) {
        self.reentry_ban = true;
        self.update_pending_delta_shares_for_buy(env);
        self.mm_bid_level_at_buy = env.signals.mm_bid_level();
        self.high_warrant_bid = 0;
        self.best_spot = 0;
        self.sell_flags = 0;
        self.update_strategy_explain(env);
        // Exit level must be in place before the order leaves.
        env.params.exit_level = env.signals.ask_level();
        self.delta_limit_exceed_expiry = 0;
        self.large_outstanding_exceed_expiry = 0;
        env.params.enter_mm_spread = env.signals.mm_spread();
        env.params.enter_price = env.signals.ask_price();
        env.params.enter_level = env.signals.ask_level();
        env.params.profit_run = 0;
        env.params.stop_loss_trigger = 0;
        env.params.enter_mm_bid_price = env.signals.mm_bid_price();
        env.params.enter_bid_level = env.signals.bid_level();
        env.params.enter_spot_price = env.prev_spot();
        env.params.enter_quantity = order_size;
        env.params.do_not_sell = false;
        env.params.sell_at_break_even_only = false;
        env.params.allow_stop_loss_on_wide_spread = false;
        env.params.ignore_mm_size_on_sell = false;
        env.params.safe_bid_level_buffer = DEFAULT_SAFE_BID_BUFFER_FROM_ENTER_PRICE;
        self.update_safe_bid_price(env.params, env.security);
        self.sell_ban_until = env.signals.last_tick_ns() + env.params.selling_ban_period;
        self.quick_profit_until = if env.params.sell_at_quick_profit {
            env.signals.last_tick_ns() + QUICK_PROFIT_TIME
        } else {
            0
        };
        self.sell_on_vol_down_ban_until =
            env.signals.last_tick_ns() + env.params.sell_on_vol_down_ban_period;
        self.trades_volume_at_buy = env.signals.net_trades_volume();
        env.orders.buy(
            env.security,
            env.signals.ask_price(),
            order_size as i64,
            &self.explain,
        );
        env.info.warrant_params(env.params, BroadcastKind::Batched);
        debug!(
            code = %self.code,
            enter_price = env.params.enter_price,
            exit_level = env.params.exit_level,
            stop_loss = env.params.stop_loss,
            mm_bid = env.params.enter_mm_bid_price,
            spot = env.params.enter_spot_price,
            safe_bid = env.params.safe_bid_price,
            seq = env.signals.trigger_info().seq_num,
            "buying position"
        );
    }

    fn buy_additional(&mut self, env: &mut StrategyEnv) {
        let position = env.security.position() as i32;
        let order_size = if env.signals.ask_price() < LARGE_WARRANT_PRICE {
            env.params
                .order_size
                .min(env.params.max_order_size - position)
        } else if env.signals.ask_price() < VERY_LARGE_WARRANT_PRICE {
            self.large_price_order_size
                .min(self.max_large_price_order_size - position)
        } else {
            self.very_large_price_order_size
                .min(self.max_very_large_price_order_size - position)
        };
        if order_size <= 0 {
            return;
        }
        self.reentry_ban = true;
        self.update_pending_delta_shares_for_buy(env);
        self.mm_bid_level_at_buy = env.signals.mm_bid_level();
        self.update_strategy_explain(env);
        env.orders.buy(
            env.security,
            env.signals.ask_price(),
            order_size as i64,
            &self.explain,
        );
        if env.signals.ask_level() > env.params.enter_level {
            env.params.enter_price = env.signals.ask_price();
            env.params.enter_level = env.signals.ask_level();
        }
        env.info.warrant_params(env.params, BroadcastKind::Batched);
        debug!(
            code = %self.code,
            enter_price = env.params.enter_price,
            seq = env.signals.trigger_info().seq_num,
            "buying additional position"
        );
    }

    fn sell(&mut self, env: &mut StrategyEnv) {
        self.update_strategy_explain(env);
        if env.security.pending_sell() > 0 {
            if self.sell_qty > 0 {
                self.update_pending_delta_shares_for_sell(self.sell_qty, env);
                env.orders
                    .sell(env.security, self.sell_price, self.sell_qty, &self.explain);
            }
            env.orders
                .cancel_and_sell_outstanding_sell(env.security, self.sell_price, &self.explain);
        } else {
            self.update_pending_delta_shares_for_sell(self.sell_qty, env);
            env.orders
                .sell(env.security, self.sell_price, self.sell_qty, &self.explain);
        }
        self.sell_price = 0;
        self.sell_qty = 0;
    }

    fn sell_to_exit(&mut self, env: &mut StrategyEnv) {
        let sell_price = if env.signals.bid_level() > MIN_TICK_LEVEL {
            env.security
                .spread_table
                .tick_to_price(env.signals.bid_level() - 1)
        } else {
            env.signals.bid_price()
        };
        self.sell_to_exit_at(sell_price, env);
    }

    fn sell_to_exit_no_check(&mut self, env: &mut StrategyEnv) {
        let bid_level = (env.signals.bid_level() - 5).max(MIN_TICK_LEVEL);
        let sell_price = env.security.spread_table.tick_to_price(bid_level);
        let floored = sell_price.max(env.params.safe_bid_price);
        self.sell_to_exit_at(floored, env);
    }

    fn sell_to_exit_at(&mut self, sell_price: i32, env: &mut StrategyEnv) {
        self.update_strategy_explain(env);
        let sell_qty = env.security.available_position();
        if env.security.pending_sell() > 0 {
            if sell_qty > 0 {
                self.update_pending_delta_shares_for_sell(sell_qty, env);
                env.orders
                    .sell_to_exit(env.security, sell_price, sell_qty, &self.explain);
            }
            env.orders
                .cancel_and_sell_outstanding_sell(env.security, sell_price, &self.explain);
        } else {
            self.update_pending_delta_shares_for_sell(sell_qty, env);
            env.orders
                .sell_to_exit(env.security, sell_price, sell_qty, &self.explain);
        }
    }

    // ── Sell attempts ──────────────────────────────────────────────────

    fn try_enter_selling_at_enter_price(
        &mut self,
        reason: ExplainReason,
        default: Option<Transition>,
        env: &mut StrategyEnv,
    ) -> Option<Transition> {
        let sell_price = env.params.enter_price;
        let sell_qty = env.security.available_position();
        self.try_enter_selling(reason, sell_price, sell_qty, default, env)
    }

    /// Sell only the position above the configured remainder, directly,
    /// without leaving the held state.
    fn try_sell_excess_at_enter_price(
        &mut self,
        reason: ExplainReason,
        default: Option<Transition>,
        env: &mut StrategyEnv,
    ) -> Option<Transition> {
        if env.signals.mm_bid_price() == 0 {
            return default;
        }
        let remainder = if env.signals.mm_bid_price() < LARGE_WARRANT_PRICE {
            self.order_size_remainder
        } else if env.signals.mm_bid_price() < VERY_LARGE_WARRANT_PRICE {
            self.large_price_order_size_remainder
        } else {
            self.very_large_price_order_size_remainder
        };
        if remainder == 0 {
            return self.try_enter_selling_at_enter_price(reason, default, env);
        }
        let remainder = remainder as i64;
        if remainder >= env.security.available_position() {
            if remainder >= env.params.enter_quantity as i64 {
                return self.try_enter_selling_at_enter_price(reason, default, env);
            }
        } else {
            self.explain.reason = reason;
            if self.do_not_sell(env) {
                return default;
            }
            if env.signals.last_tick_ns() <= self.sell_ban_until {
                debug!(
                    code = %self.code,
                    reason = ?self.explain.reason,
                    seq = env.signals.trigger_info().seq_num,
                    "partial sell suppressed by sell ban"
                );
                return default;
            }
            let sell_price = env.params.enter_price;
            let sell_qty = env.security.available_position() - remainder;
            self.update_strategy_explain(env);
            self.update_pending_delta_shares_for_sell(sell_qty, env);
            env.orders.sell(env.security, sell_price, sell_qty, &self.explain);
        }
        default
    }

    fn try_enter_selling_at_one_below_bid_with_check(
        &mut self,
        reason: ExplainReason,
        default: Option<Transition>,
        env: &mut StrategyEnv,
    ) -> Option<Transition> {
        if env.signals.bid_price() < env.params.safe_bid_price {
            debug!(
                code = %self.code,
                reason = ?reason,
                bid = env.signals.bid_price(),
                safe_bid = env.params.safe_bid_price,
                seq = env.signals.trigger_info().seq_num,
                "sell suppressed, bid below safe bid"
            );
            return default;
        }
        let sell_price = if env.signals.bid_price() > env.params.safe_bid_price {
            env.security
                .spread_table
                .tick_to_price(env.signals.bid_level() - 1)
        } else {
            env.params.safe_bid_price
        };
        let sell_qty = env.security.available_position();
        self.try_enter_selling(reason, sell_price, sell_qty, default, env)
    }

    fn try_enter_selling_at_one_below_bid(
        &mut self,
        reason: ExplainReason,
        default: Option<Transition>,
        env: &mut StrategyEnv,
    ) -> Option<Transition> {
        let sell_price = if env.signals.bid_level() > MIN_TICK_LEVEL {
            env.security
                .spread_table
                .tick_to_price(env.signals.bid_level() - 1)
        } else {
            env.signals.bid_price()
        };
        let sell_qty = env.security.available_position();
        self.try_enter_selling(reason, sell_price, sell_qty, default, env)
    }

    fn try_enter_selling_at_bid(
        &mut self,
        reason: ExplainReason,
        default: Option<Transition>,
        env: &mut StrategyEnv,
    ) -> Option<Transition> {
        let sell_price = env.signals.bid_price();
        let sell_qty = env.security.available_position();
        self.try_enter_selling(reason, sell_price, sell_qty, default, env)
    }

    fn try_enter_selling_at(
        &mut self,
        reason: ExplainReason,
        sell_price: i32,
        default: Option<Transition>,
        env: &mut StrategyEnv,
    ) -> Option<Transition> {
        let sell_qty = env.security.available_position();
        self.try_enter_selling(reason, sell_price, sell_qty, default, env)
    }

    fn try_enter_selling(
        &mut self,
        reason: ExplainReason,
        sell_price: i32,
        sell_qty: i64,
        default: Option<Transition>,
        env: &mut StrategyEnv,
    ) -> Option<Transition> {
        self.sell_price = sell_price;
        self.sell_qty = sell_qty;
        self.try_enter_sell_to_exit(reason, default, env)
    }

    fn try_enter_sell_to_exit(
        &mut self,
        reason: ExplainReason,
        default: Option<Transition>,
        env: &mut StrategyEnv,
    ) -> Option<Transition> {
        self.explain.reason = reason;
        if self.do_not_sell(env) {
            return default;
        }
        if env.signals.last_tick_ns() > self.sell_ban_until {
            return Some(Transition::SellPosition);
        }
        debug!(
            code = %self.code,
            reason = ?self.explain.reason,
            seq = env.signals.trigger_info().seq_num,
            "sell suppressed by sell ban"
        );
        default
    }

    fn do_not_sell(&self, env: &StrategyEnv) -> bool {
        if env.params.do_not_sell
            || (env.params.sell_at_break_even_only
                && env.signals.bid_price() < env.params.enter_price)
        {
            debug!(
                code = %self.code,
                reason = ?self.explain.reason,
                seq = env.signals.trigger_info().seq_num,
                "selling disallowed by policy flags"
            );
            return true;
        }
        false
    }

    // ── Pending delta shares ───────────────────────────────────────────

    fn update_pending_delta_shares_for_buy(&mut self, env: &mut StrategyEnv) {
        self.pending_delta_shares += self.cached_buy_delta_shares;
        env.issuer_und_params.pending_und_delta_shares += self.cached_buy_delta_shares;
    }

    fn update_pending_delta_shares_for_sell(&mut self, qty: i64, env: &mut StrategyEnv) {
        let sell_delta_shares =
            qty * env.params.greeks.delta as i64 / (env.security.conv_ratio as i64 * 100);
        self.pending_delta_shares -= sell_delta_shares;
        env.issuer_und_params.pending_und_delta_shares -= sell_delta_shares;
    }

    fn clear_pending_delta_shares(&mut self, env: &mut StrategyEnv) {
        env.issuer_und_params.pending_und_delta_shares -= self.pending_delta_shares;
        self.pending_delta_shares = 0;
    }

    // ── Stop-loss mechanics ────────────────────────────────────────────

    fn target_stop_loss_via(
        &mut self,
        pricer: Option<&dyn BucketPredictor>,
        stop_loss_bid: i32,
        spot: i64,
        spot_adjustment: i64,
    ) -> i64 {
        if let Some(pricer) = pricer {
            if pricer
                .interval_by_deriv_price_with_extrapolation(stop_loss_bid, &mut self.interval_by_price)
            {
                return self.polarity.relaxed_stop(
                    spot + spot_adjustment,
                    self.polarity.bucket_anchor(&self.interval_by_price),
                );
            }
        }
        spot + spot_adjustment
    }

    fn target_stop_loss_via_prev_spot(
        &mut self,
        pricer: Option<&dyn BucketPredictor>,
        stop_loss_bid: i32,
        spot: i64,
        prev_spot: i64,
        spot_adjustment: i64,
    ) -> i64 {
        if let Some(pricer) = pricer {
            if pricer
                .interval_by_deriv_price_with_extrapolation(stop_loss_bid, &mut self.interval_by_price)
            {
                return self.polarity.relaxed_stop(
                    spot + spot_adjustment,
                    self.polarity.bucket_anchor(&self.interval_by_price),
                );
            }
        }
        prev_spot + spot_adjustment
    }

    fn tick_buffer_spot_adjustment(&self, adjusted_delta_c: f64, env: &StrategyEnv) -> i64 {
        if env.params.tick_buffer == 0 {
            0
        } else {
            env.scale.spot_buffer_from_tick_buffer(
                env.security
                    .spread_table
                    .price_to_tick_size(env.signals.ask_price()),
                env.params.tick_buffer,
                adjusted_delta_c,
            )
        }
    }

    fn stop_loss_spot_adjustment(&self, adjusted_delta_c: f64, env: &StrategyEnv) -> i64 {
        if env.params.stop_loss_tick_buffer == 0 {
            0
        } else {
            env.scale.spot_buffer_from_tick_buffer(
                env.security
                    .spread_table
                    .price_to_tick_size(env.signals.ask_price()),
                env.params.stop_loss_tick_buffer,
                adjusted_delta_c,
            )
        }
    }

    fn target_spot_move(&self, adjusted_delta_c: f64, env: &StrategyEnv) -> i64 {
        env.scale.spot_change_for_price_change_c(
            env.signals.ask_price() - env.signals.mm_bid_price(),
            adjusted_delta_c,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn restricted_target_stop_loss(
        &mut self,
        stop_loss_bid: i32,
        spot: i64,
        spot_adjustment: i64,
        prev_stop_loss: i64,
        stop_loss_buffer: i64,
        standby: bool,
        env: &StrategyEnv,
    ) -> i64 {
        let pricer = if standby {
            env.signals.standby_pricer()
        } else {
            env.signals.active_pricer()
        };
        let mut target = self.target_stop_loss_via(pricer, stop_loss_bid, spot, spot_adjustment);
        target += stop_loss_buffer;
        if env.params.stop_loss_adjustment != 0 {
            target += env.params.stop_loss_adjustment;
            target = self.polarity.relaxed_stop(spot, target);
        }
        if !env.und.is_tight_spread() && target == spot {
            target = self.polarity.relax_stop_by(target, 10);
        }
        self.polarity.favored_stop(target, prev_stop_loss)
    }

    fn set_initial_stop_losses(&mut self, adjusted_delta_c: f64, env: &mut StrategyEnv) {
        let stop_loss_bid = env.signals.mm_bid_price();
        env.params.stop_loss_adjustment = self.stop_loss_spot_adjustment(adjusted_delta_c, env);
        self.target_stop_loss_mode = env.params.pricing_mode;
        self.target_stop_loss = self.target_stop_loss_via(
            env.signals.active_pricer(),
            stop_loss_bid,
            env.spot(),
            0,
        );
        self.standby_target_stop_loss = self.target_stop_loss_via(
            env.signals.standby_pricer(),
            stop_loss_bid,
            env.signals.standby_spot_price(env.und),
            0,
        );
        env.params.stop_loss = self.target_stop_loss;
    }

    fn set_initial_stop_losses_using_prev_spot(
        &mut self,
        adjusted_delta_c: f64,
        env: &mut StrategyEnv,
    ) {
        let stop_loss_bid = env.signals.mm_bid_price();
        env.params.stop_loss_adjustment = self.stop_loss_spot_adjustment(adjusted_delta_c, env);
        self.target_stop_loss_mode = env.params.pricing_mode;
        self.target_stop_loss = self.target_stop_loss_via_prev_spot(
            env.signals.active_pricer(),
            stop_loss_bid,
            env.spot(),
            env.prev_spot(),
            0,
        );
        self.standby_target_stop_loss = self.target_stop_loss_via_prev_spot(
            env.signals.standby_pricer(),
            stop_loss_bid,
            env.signals.standby_spot_price(env.und),
            env.signals.standby_prev_spot_price(env.und),
            0,
        );
        env.params.stop_loss = self.target_stop_loss;
    }

    fn calc_adjusted_delta_c(&self, env: &StrategyEnv) -> f64 {
        env.scale.adjusted_delta(env.spot(), env.params.greeks)
            / (env.security.conv_ratio as f64 * 100.0)
    }

    fn is_stop_loss_triggered(&self, env: &StrategyEnv) -> bool {
        self.polarity.is_spot_behind(env.spot(), env.params.stop_loss)
            || (!env.und.is_tight_spread() && env.params.stop_loss == env.spot())
    }

    /// Stop-loss inputs for the vol-down revision: with the market outlook
    /// on our side the stop anchors one tick below the mm bid; against us
    /// it anchors at the bid with a half-tick spot buffer, because the
    /// buckets were just reset.
    fn vol_down_stop_loss_inputs(&self, env: &StrategyEnv) -> (i32, i64, i64) {
        if env.params.market_outlook == self.polarity.desirable_outlook() {
            let stop_loss_bid = if env.signals.mm_bid_level() > MIN_TICK_LEVEL {
                env.security
                    .spread_table
                    .tick_to_price(env.signals.mm_bid_level() - 1)
            } else {
                env.signals.mm_bid_price()
            };
            let spot_adjustment = self.polarity.spot_change_required(
                env.scale,
                env.security.conv_ratio,
                env.params.greeks,
                env.spot(),
                stop_loss_bid - env.signals.mm_bid_price(),
            );
            (stop_loss_bid, spot_adjustment, 0)
        } else {
            let stop_loss_bid = env.signals.mm_bid_price();
            let prev_mm_bid = if env.signals.mm_bid_level() > MIN_TICK_LEVEL {
                env.security
                    .spread_table
                    .tick_to_price(env.signals.mm_bid_level() - 1)
            } else {
                env.signals.mm_bid_price()
            };
            let buffer = self.polarity.spot_change_required(
                env.scale,
                env.security.conv_ratio,
                env.params.greeks,
                env.spot(),
                prev_mm_bid - stop_loss_bid,
            ) / 2;
            (stop_loss_bid, 0, buffer)
        }
    }

    fn revise_stop_loss_and_exit_level(&mut self, env: &mut StrategyEnv) {
        if env.signals.mm_bid_level() < MIN_TICK_LEVEL {
            return;
        }
        let (stop_loss_bid, spot_adjustment, stop_loss_buffer) = {
            if env.params.market_outlook == self.polarity.desirable_outlook() {
                let bid = if env.signals.mm_bid_level() > MIN_TICK_LEVEL {
                    env.security
                        .spread_table
                        .tick_to_price(env.signals.mm_bid_level() - 1)
                } else {
                    env.signals.mm_bid_price()
                };
                let adj = self.polarity.spot_change_required(
                    env.scale,
                    env.security.conv_ratio,
                    env.params.greeks,
                    env.spot(),
                    bid - env.signals.mm_bid_price(),
                );
                (bid, adj, 0)
            } else {
                let bid = env.signals.mm_bid_price();
                let buffer = if env.params.exit_level == 0 {
                    let prev_mm_bid = if env.signals.mm_bid_level() > MIN_TICK_LEVEL {
                        env.security
                            .spread_table
                            .tick_to_price(env.signals.mm_bid_level() - 1)
                    } else {
                        env.signals.mm_bid_price()
                    };
                    self.polarity.spot_change_required(
                        env.scale,
                        env.security.conv_ratio,
                        env.params.greeks,
                        env.spot(),
                        prev_mm_bid - bid,
                    ) / 2
                } else {
                    0
                };
                (bid, 0, buffer)
            }
        };
        self.target_stop_loss = self.restricted_target_stop_loss(
            stop_loss_bid,
            env.spot(),
            spot_adjustment,
            self.target_stop_loss,
            stop_loss_buffer,
            false,
            env,
        );
        self.standby_target_stop_loss = self.restricted_target_stop_loss(
            stop_loss_bid,
            env.signals.standby_spot_price(env.und),
            spot_adjustment,
            self.standby_target_stop_loss,
            stop_loss_buffer,
            true,
            env,
        );
        if self
            .polarity
            .can_update_stop(self.target_stop_loss, env.params.stop_loss)
            && self.mode.can_revise_stop_loss()
        {
            env.params.stop_loss = self.target_stop_loss;
        }
        env.params.exit_level = env.signals.mm_bid_level() + 1;
        env.info.warrant_params(env.params, BroadcastKind::Batched);
        debug!(
            code = %self.code,
            exit_level = env.params.exit_level,
            stop_loss = env.params.stop_loss,
            seq = env.signals.trigger_info().seq_num,
            "exit level and stop loss revised"
        );
    }

    // ── Position upkeep ────────────────────────────────────────────────

    fn handle_warrant_price_update_on_position(
        &mut self,
        env: &mut StrategyEnv,
    ) -> Option<Transition> {
        if self.sell_ban_until > 0 {
            let mm_moved = env.signals.mm_ask_price() != env.signals.prev_mm_ask_price()
                || env.signals.mm_ask_price() == 0
                || env.signals.mm_bid_price() != env.signals.prev_mm_bid_price()
                || env.signals.mm_bid_price() == 0;
            if mm_moved {
                debug!(code = %self.code, seq = env.signals.trigger_info().seq_num, "sell ban lifted");
                self.sell_ban_until = 0;
            }
        }
        if self.reentry_ban && env.signals.mm_bid_level() != self.mm_bid_level_at_buy {
            self.reentry_ban = false;
        }
        self.high_warrant_bid = self.high_warrant_bid.max(env.signals.bid_price());
        self.check_for_exit_on_warrant_price_update(env)
    }

    fn check_for_exit_on_warrant_price_update(
        &mut self,
        env: &mut StrategyEnv,
    ) -> Option<Transition> {
        let mut next: Option<Transition> = None;
        if !env.orders.can_trade() || env.signals.bid_price() <= 0 {
            return None;
        }
        let sell = Some(Transition::SellPosition);

        if next != sell
            && env.params.sell_at_break_even_only
            && env.signals.bid_level() >= env.params.enter_level
        {
            next = self.try_enter_selling_at(
                ExplainReason::UserCaptureProfit,
                env.signals.bid_price(),
                next,
                env,
            );
        }
        if env.signals.bid_level() >= env.params.exit_level {
            env.params.profit_run = env.signals.bid_level() - env.params.enter_level;
            if next != sell {
                if env.params.profit_run >= env.params.run_ticks_threshold {
                    next = self.try_enter_selling_at_one_below_bid(
                        ExplainReason::ProfitRunSell,
                        next,
                        env,
                    );
                } else if !env.params.sell_on_vol_down
                    && env.security.available_position()
                        * (env.signals.bid_price() - env.params.enter_price) as i64
                        >= env.params.stop_profit
                {
                    next = self.try_enter_selling_at_one_below_bid(
                        ExplainReason::StopProfitSell,
                        next,
                        env,
                    );
                }
                if self.mode.sell_on_hit_exit_level() && env.params.exit_level != 0 {
                    next = self.try_enter_selling_at_one_below_bid_with_check(
                        ExplainReason::ClosingProfitRunSell,
                        next,
                        env,
                    );
                }
            }
            if env.signals.bid_price() == env.signals.mm_bid_price() {
                self.revise_stop_loss_and_exit_level(env);
                if next.is_none() {
                    next = Some(Transition::ProfitRun);
                }
            } else if next != sell
                && env.signals.bid_price() > env.params.enter_price
                && env.params.sell_to_non_issuer
            {
                next = self.try_enter_selling_at_bid(ExplainReason::NonIssuerBidSell, next, env);
            }
            if next != sell
                && env.signals.bid_price() > env.params.enter_price
                && env.signals.last_tick_ns() <= self.quick_profit_until
            {
                next = self.try_enter_selling_at_one_below_bid(
                    ExplainReason::QuickProfitSell,
                    next,
                    env,
                );
            }
        }
        if next != sell && self.is_stop_loss_triggered(env) {
            if env.signals.bid_price() > env.params.enter_price {
                next =
                    self.try_enter_selling_at_one_below_bid(ExplainReason::StopLossSell, next, env);
            } else if env.signals.bid_price() == env.params.enter_price
                || env.signals.mm_spread() <= env.params.enter_mm_spread
                || env.signals.is_loosely_tight()
            {
                next = self.try_enter_selling_at_one_below_bid_with_check(
                    ExplainReason::StopLossSell,
                    next,
                    env,
                );
            } else if self.allow_stop_loss_on_wide_spread(env) {
                next = self.try_enter_selling_at_one_below_bid_with_check(
                    ExplainReason::StopLossSell,
                    next,
                    env,
                );
            }
        }
        if self.target_sell_price != i32::MAX {
            if next != sell && env.signals.bid_price() >= self.target_sell_price {
                next = self.try_enter_selling_at(
                    ExplainReason::TurnoverMakingSell,
                    self.target_sell_price,
                    next,
                    env,
                );
            }
        } else if env.signals.bid_level() >= env.params.enter_level {
            if next != sell
                && env.issuer_und_params.und_trade_vol_threshold != 0
                && env.signals.last_tick_ns() <= self.delta_limit_exceed_expiry
            {
                next = self.try_enter_selling_at_enter_price(ExplainReason::DeltaLimitSell, next, env);
            }
            if next != sell
                && env.params.trades_volume_threshold != 0
                && env.signals.last_tick_ns() <= self.large_outstanding_exceed_expiry
            {
                next = self.try_sell_excess_at_enter_price(
                    ExplainReason::LargeOutstandingSell,
                    next,
                    env,
                );
            }
        }
        next
    }

    fn handle_spot_update_on_position(&mut self, env: &mut StrategyEnv) -> Option<Transition> {
        if !env.orders.can_trade() {
            return None;
        }
        self.best_spot = self.polarity.update_best_spot(self.best_spot, env.spot());
        if self.is_stop_loss_triggered(env) {
            if env.signals.bid_price() > env.params.enter_price {
                return self.try_enter_selling_at_one_below_bid(
                    ExplainReason::StopLossSell,
                    None,
                    env,
                );
            } else if env.signals.bid_price() == env.params.enter_price
                || env.signals.mm_spread() <= env.params.enter_mm_spread
                || env.signals.is_loosely_tight()
            {
                return self.try_enter_selling_at_one_below_bid_with_check(
                    ExplainReason::StopLossSell,
                    None,
                    env,
                );
            } else if self.allow_stop_loss_on_wide_spread(env) {
                return self.try_enter_selling_at_one_below_bid_with_check(
                    ExplainReason::StopLossSell,
                    None,
                    env,
                );
            }
        } else if env.params.stop_loss_trigger > 0
            && self
                .polarity
                .is_spot_at_or_beyond(env.spot(), env.params.stop_loss_trigger)
        {
            debug!(
                code = %self.code,
                stop_loss_trigger = env.params.stop_loss_trigger,
                seq = env.signals.trigger_info().seq_num,
                "stop loss trigger activated"
            );
            env.params.stop_loss = env.params.stop_loss_trigger;
            env.params.stop_loss_trigger = 0;
            self.on_stop_loss_externally_updated(env.params);
            env.info.warrant_params(env.params, BroadcastKind::Batched);
        }
        if !self.reentry_ban
            && !self.mode.off_when_exit_position()
            && env.params.allow_additional_buy
        {
            let reason = self.buy_trigger_reason(env);
            if reason != ExplainReason::None {
                self.explain.reason = reason;
                self.buy_additional(env);
            }
        }
        None
    }

    fn handle_issuer_vol_down_on_position(
        &mut self,
        from_warrant_tick: bool,
        env: &mut StrategyEnv,
    ) -> Option<Transition> {
        let mut next: Option<Transition> = None;
        self.buy_ban_until = self
            .buy_ban_until
            .max(env.signals.last_tick_ns() + env.params.ban_period_to_down_vol);
        self.sell_flags |= sell_flags::VOL_DOWN;
        debug!(
            code = %self.code,
            ban_until = self.buy_ban_until,
            seq = env.signals.trigger_info().seq_num,
            "buy ban armed on issuer down vol"
        );
        if env.params.stop_loss_adjustment != 0 {
            env.params.stop_loss_adjustment = 0;
            env.info.warrant_params(env.params, BroadcastKind::Throttled);
        }
        if from_warrant_tick
            && env.params.sell_on_vol_down
            && env.signals.last_tick_ns() >= self.sell_on_vol_down_ban_until
        {
            if env.signals.bid_price() > 0 && env.signals.bid_price() >= env.params.enter_price {
                if self.target_sell_price != i32::MAX
                    && env.signals.bid_price() < self.target_sell_price
                {
                    debug!(
                        code = %self.code,
                        turnover_price = self.target_sell_price,
                        seq = env.signals.trigger_info().seq_num,
                        "down-vol sell deferred below turnover price"
                    );
                } else {
                    next = self.try_enter_selling_at_one_below_bid(
                        ExplainReason::IssuerDownVolSell,
                        next,
                        env,
                    );
                }
            } else if env.signals.is_loosely_tight() {
                next = self.try_enter_selling_at_one_below_bid_with_check(
                    ExplainReason::IssuerDownVolSell,
                    next,
                    env,
                );
            }
        }
        if env.params.reset_stop_loss_on_vol_down {
            if env.signals.mm_bid_level() >= MIN_TICK_LEVEL {
                let (stop_loss_bid, spot_adjustment, stop_loss_buffer) =
                    self.vol_down_stop_loss_inputs(env);
                // Half-tick buffer: the buckets were reset after the issuer
                // dropped vol.
                self.target_stop_loss = self.restricted_target_stop_loss(
                    stop_loss_bid,
                    env.spot(),
                    spot_adjustment,
                    self.target_stop_loss,
                    stop_loss_buffer,
                    false,
                    env,
                );
                if self
                    .polarity
                    .can_update_stop(self.target_stop_loss, env.params.stop_loss)
                {
                    env.params.exit_level = env.signals.mm_bid_level() + 1;
                    if self.mode.can_revise_stop_loss() {
                        env.params.stop_loss = self.target_stop_loss;
                    }
                    env.info.warrant_params(env.params, BroadcastKind::Batched);
                    debug!(
                        code = %self.code,
                        exit_level = env.params.exit_level,
                        stop_loss = env.params.stop_loss,
                        seq = env.signals.trigger_info().seq_num,
                        "exit level and stop loss revised on down vol"
                    );
                }
            } else {
                env.params.exit_level = 0;
                env.info.warrant_params(env.params, BroadcastKind::Batched);
            }
        }
        next
    }

    // ── Sell acknowledgement ───────────────────────────────────────────

    fn order_status_on_sell(&mut self, env: &mut StrategyEnv) -> Option<Transition> {
        self.clear_pending_delta_shares(env);
        if env.security.pending_sell() > 0 {
            return None;
        }
        match self.order_reject {
            OrderRejectKind::None => {}
            kind if kind.is_throttle() => {
                self.sell_ban_until = self.order_status_time + ORDER_REJECT_BAN;
                debug!(
                    code = %self.code,
                    ban_until = self.sell_ban_until,
                    seq = env.signals.trigger_info().seq_num,
                    "sell ban armed after throttled order"
                );
            }
            OrderRejectKind::InsufficientPosition => {
                if let Some(next) = self.check_for_exit_on_warrant_price_update(env) {
                    debug!(
                        code = %self.code,
                        seq = env.signals.trigger_info().seq_num,
                        "sell rejected for insufficient position, retrying"
                    );
                    return Some(next);
                }
                self.sell_ban_until = self.order_status_time + ORDER_REJECT_BAN;
                debug!(
                    code = %self.code,
                    ban_until = self.sell_ban_until,
                    seq = env.signals.trigger_info().seq_num,
                    "sell ban armed after order reject"
                );
            }
            _ => {
                self.sell_ban_until = self.order_status_time + ORDER_REJECT_BAN;
                debug!(
                    code = %self.code,
                    ban_until = self.sell_ban_until,
                    seq = env.signals.trigger_info().seq_num,
                    "sell ban armed after order reject"
                );
            }
        }
        if env.security.position() > 0 {
            return Some(self.mode.on_position_not_fully_sold());
        }
        let need_persist = self.adjust_order_size_on_position_sold(env);
        env.params.enter_mm_spread = i32::MAX;
        env.params.enter_price = 0;
        env.params.enter_level = 0;
        env.params.profit_run = 0;
        env.params.exit_level = 0;
        env.params.stop_loss = 0;
        env.params.stop_loss_trigger = 0;
        env.params.stop_loss_adjustment = 0;
        if env.params.allow_stop_loss_on_wide_spread {
            let status = self.mode.default_status();
            self.set_param_status_only(status, env);
        }
        env.params.allow_stop_loss_on_wide_spread = false;
        env.params.do_not_sell = false;
        env.params.sell_at_break_even_only = false;
        env.params.ignore_mm_size_on_sell = false;
        env.params.safe_bid_level_buffer = DEFAULT_SAFE_BID_BUFFER_FROM_ENTER_PRICE;
        self.target_stop_loss = 0;
        self.target_stop_loss_mode = PricingMode::Unknown;
        self.standby_target_stop_loss = 0;
        self.target_sell_price = i32::MAX;
        self.large_outstanding_exceed_expiry = 0;
        env.signals.update_spread_state(env.params, env.security);
        if need_persist {
            env.info
                .warrant_params(env.params, BroadcastKind::BatchedPersist);
        } else {
            env.info.warrant_params(env.params, BroadcastKind::Batched);
        }
        Some(self.mode.on_position_fully_sold())
    }

    /// After a full exit, nudge the order size up on consecutive wins (or a
    /// strong-signal win) and down on a loss, within the per-tier caps.
    fn adjust_order_size_on_position_sold(&mut self, env: &mut StrategyEnv) -> bool {
        if self.our_traded_price == 0 {
            return false;
        }
        let increase;
        let decrease;
        if self.our_traded_price > env.params.enter_price {
            self.consecutive_wins += 1;
            increase = self.consecutive_wins > 1
                || self.explain.reason == ExplainReason::ProfitRunSell
                || self.explain.reason == ExplainReason::QuickProfitSell;
            decrease = false;
        } else if self.our_traded_price == env.params.enter_price {
            increase = false;
            decrease = false;
        } else {
            self.consecutive_wins = 0;
            increase = false;
            decrease = true;
        }
        if env.params.order_size_increment > 0 {
            if increase {
                if env.params.current_order_size < env.params.base_order_size {
                    self.apply_order_size(env.params.base_order_size, env);
                } else {
                    self.apply_order_size(
                        self.max_current_order_size
                            .min(env.params.current_order_size + env.params.order_size_increment),
                        env,
                    );
                }
            } else if decrease {
                let traded_level = env
                    .security
                    .spread_table
                    .price_to_tick(self.our_traded_price);
                if env.params.current_order_size > env.params.base_order_size
                    && traded_level < self.mm_bid_level_at_buy - 1
                {
                    self.apply_order_size(env.params.base_order_size / 2, env);
                } else if env.params.current_order_size < env.params.base_order_size {
                    self.apply_order_size(env.params.current_order_size / 2, env);
                } else {
                    self.apply_order_size(
                        0.max(env.params.current_order_size - env.params.order_size_increment),
                        env,
                    );
                }
            }
        }
        increase || decrease
    }

    fn apply_order_size(&mut self, new_size: i32, env: &mut StrategyEnv) {
        env.params.current_order_size = new_size;
        self.calculate_order_size(env.params, env.security.lot_size);
        debug!(
            code = %self.code,
            current_order_size = env.params.current_order_size,
            seq = env.signals.trigger_info().seq_num,
            "order size adapted"
        );
    }

    // ── Trade-volume signals ───────────────────────────────────────────

    fn update_trades_volume_at_buy(&mut self, env: &StrategyEnv) -> bool {
        let Some(trade) = env.security.last_trade() else {
            return false;
        };
        match trade.side {
            crate::domain::TradeSide::Ask => {
                if env.signals.mm_spread() <= 3 {
                    self.trades_volume_at_buy += trade.qty;
                    return true;
                }
                false
            }
            crate::domain::TradeSide::Bid => {
                self.trades_volume_at_buy -= trade.qty;
                false
            }
        }
    }

    fn has_large_trade_volume_signal(&mut self, env: &StrategyEnv) -> bool {
        if env.params.trades_volume_threshold == 0 {
            return false;
        }
        let Some(trade) = env.security.last_trade() else {
            return false;
        };
        let threshold = self.adjusted_trades_volume_threshold(env.params, trade.price);
        if self.trades_volume_at_buy >= threshold && self.large_outstanding_exceed_expiry == 0 {
            self.large_outstanding_exceed_expiry =
                env.signals.last_tick_ns() + LARGE_OUTSTANDING_EFFECT_TIME;
            return true;
        }
        false
    }

    // ── Safe bid ───────────────────────────────────────────────────────

    fn adjust_safe_bid_buffer(&mut self, env: &mut StrategyEnv) {
        let buffer = env.params.enter_bid_level
            - MIN_TICK_LEVEL
                .max(env.signals.bid_level() - DEFAULT_SAFE_BID_BUFFER_FROM_CURRENT_PRICE);
        if buffer < env.params.safe_bid_level_buffer {
            env.params.safe_bid_level_buffer = buffer;
            self.update_safe_bid_price(env.params, env.security);
            info!(
                code = %self.code,
                safe_bid_level_buffer = env.params.safe_bid_level_buffer,
                safe_bid_price = env.params.safe_bid_price,
                seq = env.signals.trigger_info().seq_num,
                "safe bid buffer tightened"
            );
        }
    }

    pub fn update_safe_bid_price(&self, params: &mut WarrantParams, security: &Security) {
        let bid_level = MIN_TICK_LEVEL.max(params.enter_bid_level - params.safe_bid_level_buffer);
        params.safe_bid_price = security.spread_table.tick_to_price(bid_level);
    }

    fn is_price_safe_to_exit(&self, env: &StrategyEnv) -> bool {
        if env.signals.bid_price() >= env.params.enter_price {
            return true;
        }
        if env.spot() > 0 && env.signals.bid_price() > 0 {
            let adjusted_delta = env.scale.adjusted_delta(env.spot(), env.params.greeks);
            let change_to_spot_move = env.scale.price_change_for_spot_change(
                env.spot() - env.params.enter_spot_price,
                env.security.conv_ratio,
                adjusted_delta,
            );
            let vega_allowance =
                env.params.greeks.vega as f64 / (env.security.conv_ratio as f64 * 10.0);
            let lowest_bid_allowed =
                env.params.enter_mm_bid_price as f64 + change_to_spot_move - vega_allowance;
            let price_to_compare = env
                .security
                .spread_table
                .tick_to_price(env.signals.bid_level() + EXIT_LEVEL_ALLOWANCE + 1);
            return lowest_bid_allowed < price_to_compare as f64;
        }
        false
    }

    // ── Explain / bucket broadcast ─────────────────────────────────────

    fn update_strategy_explain(&mut self, env: &StrategyEnv) {
        self.explain.trigger_seq_num = env.signals.trigger_info().seq_num;
        self.explain.prev_und_bid = env.und.prev_bid_price();
        self.explain.prev_und_ask = env.und.prev_ask_price();
        self.explain.und_bid = env.und.bid_price();
        self.explain.und_ask = env.und.ask_price();
        self.explain.prev_wrt_bid = env.signals.prev_bid_price();
        self.explain.prev_wrt_ask = env.signals.prev_ask_price();
        self.explain.wrt_bid = env.signals.bid_price();
        self.explain.wrt_ask = env.signals.ask_price();
        self.explain.velocity = env.trigger.explain_value();
        self.explain.delta = env.params.greeks.delta;
        self.explain.warrant_spread = env.signals.ask_level() - env.signals.bid_level();
        self.explain.tick_sensitivity = env.params.tick_sensitivity;
        self.explain.high_warrant_bid = self.high_warrant_bid;
        self.explain.best_spot = self.best_spot;
        self.explain.spot = env.spot();
        self.explain.prev_spot = env.prev_spot();
        self.explain.bucket_size = env.signals.bucket_size();
        self.explain.pricing_mode = env.params.pricing_mode;
        self.explain.flags = self.sell_flags;
    }

    pub fn explain(&self) -> &ExplainRecord {
        &self.explain
    }

    fn broadcast_bucket_update(&mut self, env: &mut StrategyEnv) {
        let found = match env.signals.active_pricer() {
            Some(pricer) => self.polarity.overlap_and_next(
                pricer,
                env.spot(),
                &mut self.bucket_overlap,
                &mut self.bucket_next,
            ),
            None => false,
        };
        if found {
            if self.prev_reported_overlap != self.bucket_overlap
                || self.prev_reported_next != self.bucket_next
            {
                self.prev_reported_overlap = self.bucket_overlap;
                self.prev_reported_next = self.bucket_next;
                env.bucket_params.active_interval = self.prev_reported_overlap;
                env.bucket_params.next_interval = self.prev_reported_next;
                env.info
                    .bucket_params(env.bucket_params, BroadcastKind::Throttled);
            }
        } else if !self.prev_reported_overlap.is_empty() || !self.prev_reported_next.is_empty() {
            self.prev_reported_overlap.clear();
            self.prev_reported_next.clear();
            env.bucket_params.active_interval = self.prev_reported_overlap;
            env.bucket_params.next_interval = self.prev_reported_next;
            env.info
                .bucket_params(env.bucket_params, BroadcastKind::Throttled);
        }
    }

    // ── Status bookkeeping ─────────────────────────────────────────────

    fn set_param_status(&mut self, status: StrategyStatus, env: &mut StrategyEnv) {
        self.set_param_status_only(status, env);
        env.info.warrant_params(env.params, BroadcastKind::Immediate);
    }

    fn set_param_status_only(&mut self, status: StrategyStatus, env: &mut StrategyEnv) {
        let prev = env.params.status;
        debug!(
            code = %self.code,
            prev_status = ?prev,
            new_status = ?status,
            seq = env.signals.trigger_info().seq_num,
            "strategy status updated"
        );
        env.params.status = status;
        if prev != StrategyStatus::Active && status == StrategyStatus::Active {
            env.issuer_params.active_warrants += 1;
            env.info
                .issuer_params(env.issuer_params, BroadcastKind::Throttled);
            let mut und_params = env.und_params.borrow_mut();
            und_params.active_warrants += 1;
            env.info.underlying_params(&und_params, BroadcastKind::Throttled);
        }
        if prev == StrategyStatus::Active && status != StrategyStatus::Active {
            env.issuer_params.active_warrants -= 1;
            env.info
                .issuer_params(env.issuer_params, BroadcastKind::Throttled);
            let mut und_params = env.und_params.borrow_mut();
            und_params.active_warrants -= 1;
            env.info.underlying_params(&und_params, BroadcastKind::Throttled);
        }
    }
}
