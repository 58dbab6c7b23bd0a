//! Strategy context: per-warrant wiring and tick dispatch.
//!
//! The context is the root owner of every runtime object. Underlying-level
//! state (signal generator, velocity triggers, observer lists) is created
//! lazily and shared by all warrants on the underlying; issuer-underlying
//! state (delta-limit ledger) likewise; per-warrant state is always
//! created fresh. Dispatch entry points orchestrate the per-tick call
//! sequence explicitly, preserving the event interleaving the automaton
//! depends on: violation events fire before the tick event, and
//! previous-tick snapshots roll only after all events have been handled.
//!
//! Everything runs on one dispatch thread; the only interior mutability is
//! a `RefCell` around the underlying parameter tier, which the automaton
//! bumps while the underlying's signal state is borrowed shared.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, info, warn};

use super::automaton::{State, StrategyAutomaton, StrategyEnv};
use super::exit_mode::ExitMode;
use crate::domain::{BookSnapshot, Greeks, MarketTrade, OptionSide, Security, UnderlyingKind};
use crate::error::StrategyError;
use crate::params::{
    BucketParams, IssuerParams, IssuerUnderlyingParams, ParamError, StrategyTypeParams,
    UnderlyingParams, WarrantParams, WarrantParamsValidator, WrtParamWrite,
};
use crate::ports::{InfoSender, OrderRejectKind, OrderService, ScheduleKind, Scheduler};
use crate::pricing::{
    formula_for, BucketPredictorFactory, PredictorConfig, PricingMode, ScaleFormula,
    DELTA_ALLOWANCE,
};
use crate::signal::warrant::SpotSource;
use crate::signal::{Event, Events, SpotSignal, UnderlyingSignals, WarrantSignals};
use crate::triggers::{
    DeltaLimitGenerator, IssuerLagMonitor, TriggerController, TriggerKind, TriggerView,
    TurnoverDetector, VelocityTrigger,
};

struct UnderlyingRuntime {
    security: Rc<Security>,
    signals: UnderlyingSignals,
    params: RefCell<UnderlyingParams>,
    call_warrants: Vec<u64>,
    put_warrants: Vec<u64>,
    vel_5ms: VelocityTrigger,
    vel_10ms: VelocityTrigger,
}

struct WarrantRuntime {
    security: Rc<Security>,
    scale: Box<dyn ScaleFormula>,
    signals: WarrantSignals,
    automaton: StrategyAutomaton,
    params: WarrantParams,
    bucket_params: BucketParams,
    turnover: TurnoverDetector,
    lag: IssuerLagMonitor,
    validator: Box<dyn WarrantParamsValidator>,
}

struct IssuerUndRuntime {
    delta_limit: DeltaLimitGenerator,
    params: IssuerUnderlyingParams,
    warrants: Vec<u64>,
}

/// Accepts every write; the facade installs the side-aware validator.
struct AcceptAll;

impl WarrantParamsValidator for AcceptAll {
    fn validate(&self, params: &WarrantParams, write: &WrtParamWrite, _spot: i64) -> bool {
        crate::params::warrant::validate_common(params, write)
    }
}

/// Disjoint-field borrows over one warrant's dispatch surface.
struct Parts<'a> {
    wrt: &'a mut WarrantRuntime,
    und: &'a UnderlyingRuntime,
    issuer: &'a mut IssuerParams,
    iu: &'a mut IssuerUndRuntime,
    controller: &'a TriggerController,
    orders: &'a mut dyn OrderService,
    info: &'a mut dyn InfoSender,
    scheduler: &'a mut dyn Scheduler,
}

pub struct StrategyContext {
    strategy_params: StrategyTypeParams,
    underlyings: HashMap<u64, UnderlyingRuntime>,
    warrants: HashMap<u64, WarrantRuntime>,
    issuers: HashMap<u32, IssuerParams>,
    issuer_und: HashMap<u64, IssuerUndRuntime>,
    trigger_controller: TriggerController,
    predictor_factory: Box<dyn BucketPredictorFactory>,
    orders: Box<dyn OrderService>,
    info: Box<dyn InfoSender>,
    scheduler: Box<dyn Scheduler>,
    comparison_mode: bool,
}

impl StrategyContext {
    pub fn new(
        strategy_id: u64,
        predictor_factory: Box<dyn BucketPredictorFactory>,
        orders: Box<dyn OrderService>,
        info: Box<dyn InfoSender>,
        scheduler: Box<dyn Scheduler>,
    ) -> Self {
        Self {
            strategy_params: StrategyTypeParams::new(strategy_id),
            underlyings: HashMap::new(),
            warrants: HashMap::new(),
            issuers: HashMap::new(),
            issuer_und: HashMap::new(),
            trigger_controller: TriggerController::new(),
            predictor_factory,
            orders,
            info,
            scheduler,
            comparison_mode: false,
        }
    }

    /// Backtest-comparison behavior switch; applies to contexts created
    /// afterwards.
    pub fn with_comparison_mode(mut self, comparison_mode: bool) -> Self {
        self.comparison_mode = comparison_mode;
        self
    }

    pub fn strategy_params(&self) -> &StrategyTypeParams {
        &self.strategy_params
    }

    pub fn strategy_params_mut(&mut self) -> &mut StrategyTypeParams {
        &mut self.strategy_params
    }

    // ── Wiring ─────────────────────────────────────────────────────────

    /// Create and wire the runtime for a warrant. Idempotent: a second
    /// call for an already-initialized warrant is a no-op.
    pub fn initialize_context(&mut self, warrant: Rc<Security>, underlying: Rc<Security>) {
        let warrant_sid = warrant.sid;
        if self.warrants.contains_key(&warrant_sid) {
            return;
        }
        let underlying_sid = underlying.sid;
        let issuer_sid = warrant.issuer_sid;

        self.underlyings
            .entry(underlying_sid)
            .or_insert_with(|| UnderlyingRuntime {
                signals: UnderlyingSignals::new(underlying.spread_table.clone()),
                params: RefCell::new(UnderlyingParams::new(underlying_sid)),
                call_warrants: Vec::new(),
                put_warrants: Vec::new(),
                vel_5ms: VelocityTrigger::new(5_000_000, 8192),
                vel_10ms: VelocityTrigger::new(10_000_000, 16384),
                security: underlying.clone(),
            });

        self.issuers
            .entry(issuer_sid)
            .or_insert_with(|| IssuerParams::new(issuer_sid));

        let iu_key = IssuerUnderlyingParams::key(issuer_sid, underlying_sid);
        let iu = self
            .issuer_und
            .entry(iu_key)
            .or_insert_with(|| IssuerUndRuntime {
                delta_limit: DeltaLimitGenerator::new(underlying.code.clone()),
                params: IssuerUnderlyingParams::new(issuer_sid, underlying_sid),
                warrants: Vec::new(),
            });
        iu.warrants.push(warrant_sid);

        let mut params = WarrantParams::new(warrant_sid);
        let predictor_conv_ratio = if warrant.underlying_kind == UnderlyingKind::Index {
            warrant.conv_ratio / 1000
        } else {
            warrant.conv_ratio
        };
        let predictor = |mode: PricingMode| {
            self.predictor_factory.create(&PredictorConfig {
                mode,
                underlying_sid,
                warrant_sid,
                side: warrant.side,
                conv_ratio: predictor_conv_ratio,
                issuer_max_lag_ns: params.issuer_max_lag,
                delta_allowance: DELTA_ALLOWANCE,
            })
        };
        let pricers = [predictor(PricingMode::Weighted), predictor(PricingMode::Mid)];

        let mut automaton = StrategyAutomaton::new(&warrant, self.comparison_mode);
        automaton.initialize(&mut params, warrant.lot_size);

        let runtime = WarrantRuntime {
            scale: formula_for(warrant.underlying_kind),
            signals: WarrantSignals::new(&warrant, pricers),
            automaton,
            params,
            bucket_params: BucketParams::new(warrant_sid),
            turnover: TurnoverDetector::new(warrant.code.clone()),
            lag: IssuerLagMonitor::new(warrant_sid, warrant.code.clone()),
            validator: Box::new(AcceptAll),
            security: warrant.clone(),
        };

        match warrant.side {
            OptionSide::Put => {
                if let Some(und) = self.underlyings.get_mut(&underlying_sid) {
                    und.put_warrants.push(warrant_sid);
                }
            }
            _ => {
                if let Some(und) = self.underlyings.get_mut(&underlying_sid) {
                    und.call_warrants.push(warrant_sid);
                }
            }
        }
        self.warrants.insert(warrant_sid, runtime);
        debug!(code = %warrant.code, "warrant context initialized");
    }

    /// Install the facade's side-aware parameter validator.
    pub fn install_validator(
        &mut self,
        warrant_sid: u64,
        validator: Box<dyn WarrantParamsValidator>,
    ) {
        if let Some(wrt) = self.warrants.get_mut(&warrant_sid) {
            wrt.validator = validator;
        }
    }

    pub fn start_strategy(&mut self, warrant_sid: u64) {
        let Some((code, kind)) = self
            .warrants
            .get(&warrant_sid)
            .map(|w| (w.security.code.clone(), w.params.trigger_type))
        else {
            return;
        };
        self.trigger_controller.subscribe(warrant_sid, &code, kind);
        let Some(mut p) = self.parts(warrant_sid) else {
            return;
        };
        info!(
            code = %code,
            params = %serde_json::to_string(&p.wrt.params).unwrap_or_default(),
            "initial strategy parameters"
        );
        p.wrt.signals.start(&mut p.wrt.params);
        p.wrt.automaton.mark_started();
    }

    /// Return every transactional field to neutral without destroying the
    /// runtime objects.
    pub fn reset_strategy(&mut self, warrant_sid: u64) {
        let Some(underlying_sid) = self
            .warrants
            .get(&warrant_sid)
            .map(|w| w.security.underlying_sid)
        else {
            return;
        };
        if let Some(und) = self.underlyings.get_mut(&underlying_sid) {
            und.signals.reset();
            TriggerController::reset_all(&mut und.vel_5ms, &mut und.vel_10ms);
        }
        if let Some(mut p) = self.parts(warrant_sid) {
            let (params, bucket_params) = (&mut p.wrt.params, &mut p.wrt.bucket_params);
            p.wrt.signals.reset(params, bucket_params);
            p.wrt.turnover.reset();
            Self::with_env(&mut p, |automaton, env| automaton.reset(env));
        }
    }

    // ── Market-data dispatch ───────────────────────────────────────────

    pub fn on_underlying_book_updated(&mut self, underlying_sid: u64, timestamp: i64, book: &BookSnapshot) {
        let Some(und) = self.underlyings.get_mut(&underlying_sid) else {
            return;
        };
        let outcome = und.signals.apply_book(timestamp, book);
        let puts = std::mem::take(&mut und.put_warrants);
        let calls = std::mem::take(&mut und.call_warrants);

        if let Some(spot) = outcome.spot {
            // Ascending spot notifies put-side warrants first; descending
            // notifies call-side first. This ordering is load-bearing.
            let (first, second) = if spot.ascending {
                (&puts, &calls)
            } else {
                (&calls, &puts)
            };
            for &sid in first.iter().chain(second.iter()) {
                self.warrant_spot_tick(sid, &spot);
            }
        }
        if let Some(tick_size) = outcome.ask_tick_size_changed {
            for &sid in &puts {
                self.warrant_und_tick_size(sid, tick_size);
            }
        }
        if let Some(tick_size) = outcome.bid_tick_size_changed {
            for &sid in &calls {
                self.warrant_und_tick_size(sid, tick_size);
            }
        }

        if let Some(und) = self.underlyings.get_mut(&underlying_sid) {
            und.put_warrants = puts;
            und.call_warrants = calls;
            und.signals.finish_tick();
            und.vel_5ms.on_book_updated(timestamp);
            und.vel_10ms.on_book_updated(timestamp);
        }
    }

    pub fn on_underlying_trade(&mut self, underlying_sid: u64, timestamp: i64, trade: &MarketTrade) {
        if let Some(und) = self.underlyings.get_mut(&underlying_sid) {
            und.security.set_last_trade(*trade);
            und.vel_5ms.on_trade(timestamp, trade);
            und.vel_10ms.on_trade(timestamp, trade);
        }
    }

    pub fn on_warrant_book_updated(&mut self, warrant_sid: u64, timestamp: i64, book: &BookSnapshot) {
        let alert = {
            let Some(mut p) = self.parts(warrant_sid) else {
                return;
            };
            p.wrt.signals.begin_book_tick(timestamp, book);
            Self::run_warrant_book(&mut p);
            let weighted_average = p.und.signals.weighted_average();
            p.iu
                .delta_limit
                .on_warrant_book(timestamp, weighted_average, &mut p.iu.params, &mut *p.info)
                .map(|net_delta| (net_delta, p.iu.warrants.clone()))
        };
        if let Some((net_delta, siblings)) = alert {
            for sid in siblings {
                self.dispatch_delta_limit_alert(sid, warrant_sid, timestamp, net_delta);
            }
        }
    }

    pub fn on_warrant_trade(&mut self, warrant_sid: u64, timestamp: i64, trade: &MarketTrade) {
        let Some(mut p) = self.parts(warrant_sid) else {
            return;
        };
        p.wrt.security.set_last_trade(*trade);
        p.wrt.signals.on_trade(&p.wrt.params, trade);
        Self::dispatch_event(&mut p, Event::MarketTradeReceived);
        if let Some(price) = p.wrt.turnover.on_trade(&p.wrt.params, trade) {
            Self::with_env(&mut p, |automaton, env| {
                automaton.on_turnover_making_detected(timestamp, price, env)
            });
        }
        p.iu
            .delta_limit
            .on_warrant_trade(timestamp, &p.wrt.security, trade);
    }

    pub fn on_greeks_updated(&mut self, warrant_sid: u64, greeks: Greeks) {
        let Some(mut p) = self.parts(warrant_sid) else {
            return;
        };
        p.wrt.security.set_greeks(greeks);
        p.wrt.signals.on_greeks_updated(
            &mut p.wrt.params,
            &p.wrt.security,
            p.wrt.scale.as_ref(),
            &mut *p.info,
            greeks,
        );
    }

    pub fn on_order_status(
        &mut self,
        warrant_sid: u64,
        nano_of_day: i64,
        price: i32,
        quantity: i64,
        reject: OrderRejectKind,
    ) {
        let Some(mut p) = self.parts(warrant_sid) else {
            return;
        };
        debug!(
            code = %p.wrt.security.code,
            price,
            quantity,
            ?reject,
            "order status received"
        );
        Self::with_env(&mut p, |automaton, env| {
            automaton.on_order_status(nano_of_day, price, reject, env)
        });
    }

    pub fn on_timeout(&mut self, warrant_sid: u64, kind: ScheduleKind, scheduled_ns: i64) {
        if let Some(wrt) = self.warrants.get_mut(&warrant_sid) {
            wrt.lag.on_timeout(kind, scheduled_ns);
        }
    }

    // ── Control surface ────────────────────────────────────────────────

    pub fn switch_on(&mut self, warrant_sid: u64) -> Result<(), StrategyError> {
        let Some(mut p) = self.parts(warrant_sid) else {
            return Ok(());
        };
        info!(code = %p.wrt.security.code, seq = p.wrt.signals.trigger_info().seq_num, "strategy switched on");
        Self::with_env(&mut p, |automaton, env| automaton.on_switched_on(env))
    }

    pub fn switch_off(&mut self, warrant_sid: u64, exit_mode: ExitMode) {
        let Some(mut p) = self.parts(warrant_sid) else {
            return;
        };
        info!(
            code = %p.wrt.security.code,
            ?exit_mode,
            seq = p.wrt.signals.trigger_info().seq_num,
            "strategy switched off"
        );
        Self::with_env(&mut p, |automaton, env| {
            automaton.on_switched_off(exit_mode, env)
        });
    }

    pub fn capture_profit(&mut self, warrant_sid: u64) {
        if let Some(mut p) = self.parts(warrant_sid) {
            Self::with_env(&mut p, |automaton, env| automaton.on_capture_profit(env));
        }
    }

    pub fn place_sell_order(&mut self, warrant_sid: u64) {
        if let Some(mut p) = self.parts(warrant_sid) {
            Self::with_env(&mut p, |automaton, env| automaton.on_place_sell_order(env));
        }
    }

    pub fn is_on(&self, warrant_sid: u64) -> bool {
        self.warrants
            .get(&warrant_sid)
            .map(|w| w.automaton.is_on())
            .unwrap_or(false)
    }

    pub fn automaton_state(&self, warrant_sid: u64) -> Option<State> {
        self.warrants.get(&warrant_sid).map(|w| w.automaton.state())
    }

    pub fn exit_mode(&self, warrant_sid: u64) -> Option<ExitMode> {
        self.warrants
            .get(&warrant_sid)
            .map(|w| w.automaton.exit_mode())
    }

    pub fn warrant_params(&self, warrant_sid: u64) -> Option<&WarrantParams> {
        self.warrants.get(&warrant_sid).map(|w| &w.params)
    }

    pub fn underlying_params(&self, underlying_sid: u64) -> Option<std::cell::Ref<'_, UnderlyingParams>> {
        self.underlyings.get(&underlying_sid).map(|u| u.params.borrow())
    }

    // ── Parameter writes ───────────────────────────────────────────────

    /// Validated user write against the warrant tier. A rejected value
    /// leaves the prior value untouched; the post-update hook runs only on
    /// success.
    pub fn write_warrant_param(
        &mut self,
        warrant_sid: u64,
        write: WrtParamWrite,
    ) -> Result<(), ParamError> {
        {
            let Some(mut p) = self.parts(warrant_sid) else {
                return Err(ParamError::UnknownSecurity(warrant_sid));
            };
            let spot = p.wrt.signals.spot_price(&p.und.signals);
            if !p.wrt.validator.validate(&p.wrt.params, &write, spot) {
                warn!(
                    code = %p.wrt.security.code,
                    field = write.field_name(),
                    value = write.raw_value(),
                    "parameter write rejected"
                );
                return Err(ParamError::Rejected {
                    field: write.field_name(),
                    value: write.raw_value(),
                });
            }
            Self::apply_warrant_write(&mut p.wrt.params, &write);
            info!(
                code = %p.wrt.security.code,
                field = write.field_name(),
                seq = p.wrt.signals.trigger_info().seq_num,
                "parameter updated"
            );
            Self::run_warrant_param_hook(&mut p, &write);
        }
        // The trigger-type hook re-subscribes, which needs the controller
        // mutably and so runs outside the dispatch borrow.
        if let WrtParamWrite::TriggerType(kind) = write {
            let resubscribe = self
                .warrants
                .get(&warrant_sid)
                .map(|w| (w.automaton.has_started(), w.security.code.clone()));
            if let Some((true, code)) = resubscribe {
                self.trigger_controller.subscribe(warrant_sid, &code, kind);
            }
        }
        Ok(())
    }

    fn apply_warrant_write(params: &mut WarrantParams, write: &WrtParamWrite) {
        use WrtParamWrite::*;
        match *write {
            MmBidSize(v) => params.mm_bid_size = v,
            MmAskSize(v) => params.mm_ask_size = v,
            BaseOrderSize(v) => params.base_order_size = v,
            CurrentOrderSize(v) => params.current_order_size = v,
            MaxOrderSize(v) => params.max_order_size = v,
            OrderSizeIncrement(v) => params.order_size_increment = v,
            OrderSizeMultiplier(v) => params.order_size_multiplier = v,
            OrderSizeRemainder(v) => params.order_size_remainder = v,
            RunTicksThreshold(v) => params.run_ticks_threshold = v,
            TickSensitivityThreshold(v) => params.tick_sensitivity_threshold = v,
            StopLoss(v) => params.stop_loss = v,
            StopLossTrigger(v) => params.stop_loss_trigger = v,
            StopProfit(v) => params.stop_profit = v,
            AllowedMaxSpread(v) => params.allowed_max_spread = v,
            TurnoverMakingSize(v) => params.turnover_making_size = v,
            TurnoverMakingPeriod(v) => params.turnover_making_period = v,
            BanPeriodToDownVol(v) => params.ban_period_to_down_vol = v,
            BanPeriodToTurnoverMaking(v) => params.ban_period_to_turnover_making = v,
            SellingBanPeriod(v) => params.selling_ban_period = v,
            SellOnVolDownBanPeriod(v) => params.sell_on_vol_down_ban_period = v,
            HoldingPeriod(v) => params.holding_period = v,
            SpreadObservationPeriod(v) => params.spread_observation_period = v,
            MarketOutlook(v) => params.market_outlook = v,
            SellOnVolDown(v) => params.sell_on_vol_down = v,
            ResetStopLossOnVolDown(v) => params.reset_stop_loss_on_vol_down = v,
            AllowStopLossOnFlashingBid(v) => params.allow_stop_loss_on_flashing_bid = v,
            SellAtQuickProfit(v) => params.sell_at_quick_profit = v,
            SellToNonIssuer(v) => params.sell_to_non_issuer = v,
            AllowAdditionalBuy(v) => params.allow_additional_buy = v,
            UseHoldBidBan(v) => params.use_hold_bid_ban = v,
            IssuerMaxLag(v) => params.issuer_max_lag = v,
            IssuerMaxLagCap(v) => params.issuer_max_lag_cap = v,
            DefaultPricingMode(v) => params.default_pricing_mode = v,
            TriggerType(v) => params.trigger_type = v,
            TickBuffer(v) => params.tick_buffer = v,
            StopLossTickBuffer(v) => params.stop_loss_tick_buffer = v,
            ManualOrderTicksFromEnterPrice(v) => params.manual_order_ticks_from_enter_price = v,
            WideSpreadBuffer(v) => params.wide_spread_buffer = v,
            TradesVolumeThreshold(v) => params.trades_volume_threshold = v,
            AllowStopLossOnWideSpread(v) => params.allow_stop_loss_on_wide_spread = v,
            DoNotSell(v) => params.do_not_sell = v,
            SellAtBreakEvenOnly(v) => params.sell_at_break_even_only = v,
            IgnoreMmSizeOnSell(v) => params.ignore_mm_size_on_sell = v,
            SafeBidLevelBuffer(v) => params.safe_bid_level_buffer = v,
        }
    }

    /// Side-effecting recomputation after a successful write.
    fn run_warrant_param_hook(p: &mut Parts, write: &WrtParamWrite) {
        use WrtParamWrite::*;
        match *write {
            MmBidSize(_) | MmAskSize(_) => Self::run_warrant_book(p),
            MaxOrderSize(_) | OrderSizeIncrement(_) => {
                let lot = p.wrt.security.lot_size;
                p.wrt.automaton.calculate_max_order_size(&p.wrt.params);
                p.wrt
                    .automaton
                    .cap_and_calculate_order_size(&mut p.wrt.params, lot);
            }
            OrderSizeMultiplier(_) => {
                let lot = p.wrt.security.lot_size;
                p.wrt.automaton.calculate_order_size(&mut p.wrt.params, lot);
            }
            CurrentOrderSize(_) => {
                let lot = p.wrt.security.lot_size;
                p.wrt
                    .automaton
                    .cap_and_calculate_order_size(&mut p.wrt.params, lot);
            }
            OrderSizeRemainder(_) => {
                let lot = p.wrt.security.lot_size;
                p.wrt
                    .automaton
                    .calculate_order_size_remainder(&p.wrt.params, lot);
            }
            IssuerMaxLag(_) => p.wrt.signals.refresh_issuer_max_lag(&p.wrt.params),
            WideSpreadBuffer(_) => {
                let security = p.wrt.security.clone();
                p.wrt
                    .signals
                    .update_is_loosely_tight(&mut p.wrt.params, &security);
            }
            UseHoldBidBan(false) => p.wrt.signals.clear_hold_bid_ban(),
            TradesVolumeThreshold(_) => {
                let last_tick = p.wrt.signals.last_tick_ns();
                p.wrt
                    .automaton
                    .on_updated_trades_volume_threshold(last_tick, &p.wrt.params);
            }
            SafeBidLevelBuffer(_) => {
                let security = p.wrt.security.clone();
                p.wrt
                    .automaton
                    .update_safe_bid_price(&mut p.wrt.params, &security);
            }
            StopLoss(_) => {
                if p.wrt.params.stop_loss == 0 {
                    p.wrt.params.stop_loss = p.wrt.signals.spot_price(&p.und.signals);
                }
                p.wrt
                    .automaton
                    .on_stop_loss_externally_updated(&mut p.wrt.params);
            }
            AllowStopLossOnWideSpread(_) => {
                Self::dispatch_event(p, Event::AllowStopLossOnWideSpreadUpdated)
            }
            IgnoreMmSizeOnSell(_) => Self::dispatch_event(p, Event::IgnoreMmSizeOnSellUpdated),
            DoNotSell(_) => {
                Self::with_env(p, |automaton, env| automaton.on_updated_do_not_sell(env))
            }
            SellAtBreakEvenOnly(_) => Self::with_env(p, |automaton, env| {
                automaton.on_updated_sell_at_break_even_only(env)
            }),
            _ => {}
        }
    }

    /// User write against the underlying tier.
    pub fn write_underlying_velocity_thresholds(
        &mut self,
        underlying_sid: u64,
        threshold: i64,
        threshold2: i64,
        threshold3: i64,
    ) -> Result<(), ParamError> {
        let Some(und) = self.underlyings.get(&underlying_sid) else {
            return Err(ParamError::UnknownSecurity(underlying_sid));
        };
        let mut params = und.params.borrow_mut();
        params.velocity_threshold = threshold;
        params.velocity_threshold2 = threshold2;
        params.velocity_threshold3 = threshold3;
        info!(underlying_sid, threshold, "velocity thresholds updated");
        Ok(())
    }

    /// User write against the issuer-underlying tier.
    pub fn write_und_trade_vol_threshold(
        &mut self,
        issuer_sid: u32,
        underlying_sid: u64,
        threshold: i64,
    ) -> Result<(), ParamError> {
        if threshold < 0 {
            return Err(ParamError::Rejected {
                field: "und_trade_vol_threshold",
                value: threshold,
            });
        }
        let key = IssuerUnderlyingParams::key(issuer_sid, underlying_sid);
        let Some(iu) = self.issuer_und.get_mut(&key) else {
            return Err(ParamError::UnknownSecurity(underlying_sid));
        };
        iu.params.und_trade_vol_threshold = threshold;
        info!(issuer_sid, underlying_sid, threshold, "delta-notional limit updated");
        Ok(())
    }

    // ── Per-warrant orchestration ──────────────────────────────────────

    fn parts(&mut self, warrant_sid: u64) -> Option<Parts<'_>> {
        let wrt = self.warrants.get_mut(&warrant_sid)?;
        let underlying_sid = wrt.security.underlying_sid;
        let issuer_sid = wrt.security.issuer_sid;
        let und = self.underlyings.get(&underlying_sid)?;
        let issuer = self.issuers.get_mut(&issuer_sid)?;
        let iu = self
            .issuer_und
            .get_mut(&IssuerUnderlyingParams::key(issuer_sid, underlying_sid))?;
        Some(Parts {
            wrt,
            und,
            issuer,
            iu,
            controller: &self.trigger_controller,
            orders: self.orders.as_mut(),
            info: self.info.as_mut(),
            scheduler: self.scheduler.as_mut(),
        })
    }

    fn with_env<R>(
        p: &mut Parts,
        f: impl FnOnce(&mut StrategyAutomaton, &mut StrategyEnv) -> R,
    ) -> R {
        let trigger = match p.controller.kind_for(p.wrt.security.sid) {
            TriggerKind::Velocity5Ms => TriggerView::Velocity(&p.und.vel_5ms),
            TriggerKind::Velocity10Ms => TriggerView::Velocity(&p.und.vel_10ms),
            TriggerKind::AllowAll => TriggerView::AllowAll,
        };
        let mut env = StrategyEnv {
            security: p.wrt.security.as_ref(),
            und: &p.und.signals,
            signals: &mut p.wrt.signals,
            params: &mut p.wrt.params,
            bucket_params: &mut p.wrt.bucket_params,
            und_params: &p.und.params,
            issuer_params: &mut *p.issuer,
            issuer_und_params: &mut p.iu.params,
            trigger,
            lag: &mut p.wrt.lag,
            scheduler: &mut *p.scheduler,
            scale: p.wrt.scale.as_ref(),
            orders: &mut *p.orders,
            info: &mut *p.info,
        };
        f(&mut p.wrt.automaton, &mut env)
    }

    fn dispatch_event(p: &mut Parts, event: Event) {
        Self::with_env(p, |automaton, env| automaton.on_event(event, env));
    }

    fn dispatch_batch(p: &mut Parts, events: &Events) {
        for event in events.iter() {
            Self::dispatch_event(p, event);
        }
    }

    /// Book-tick orchestration: derived state, lag notification, predictor
    /// observation, violation handling (events dispatched at their emission
    /// points), pricing-mode arbitration, then the tick event and the
    /// previous-value roll.
    fn run_warrant_book(p: &mut Parts) {
        let mut events = Events::new();
        {
            let security = p.wrt.security.clone();
            p.wrt.signals.update_book_state(
                &mut p.wrt.params,
                &security,
                &mut p.wrt.lag,
                &mut *p.scheduler,
                &mut *p.info,
                &mut events,
            );
        }
        Self::dispatch_batch(p, &events);

        if p.wrt.signals.collecting() {
            let (wa, mp) = p.wrt.signals.observe_deriv_ticks();
            let security = p.wrt.security.clone();
            let mut events = Events::new();
            let has_reset = p.wrt.signals.handle_violation(
                SpotSource::Weighted,
                wa,
                false,
                true,
                &mut p.wrt.params,
                &security,
                &mut p.wrt.lag,
                &mut *p.scheduler,
                &mut *p.info,
                &mut events,
            );
            Self::dispatch_batch(p, &events);
            let mut events = Events::new();
            p.wrt.signals.handle_violation(
                SpotSource::Mid,
                mp,
                has_reset,
                true,
                &mut p.wrt.params,
                &security,
                &mut p.wrt.lag,
                &mut *p.scheduler,
                &mut *p.info,
                &mut events,
            );
            Self::dispatch_batch(p, &events);
            let mut events = Events::new();
            p.wrt
                .signals
                .detect_pricing_mode(wa, mp, &mut p.wrt.params, &mut *p.info, &mut events);
            Self::dispatch_batch(p, &events);
        }
        Self::dispatch_event(p, Event::WarrantTickReceived);
        p.wrt.signals.finish_book_tick(&p.wrt.params, &mut *p.info);
    }

    fn warrant_spot_tick(&mut self, warrant_sid: u64, spot: &SpotSignal) {
        let Some(mut p) = self.parts(warrant_sid) else {
            return;
        };
        p.wrt.signals.begin_und_spot(spot.nano_of_day, spot.trigger);
        let mut events = Events::new();
        {
            let security = p.wrt.security.clone();
            p.wrt.signals.check_spot_target_reset(
                &mut p.wrt.params,
                &security,
                &mut p.wrt.lag,
                &mut *p.scheduler,
                &mut *p.info,
                &mut events,
            );
        }
        Self::dispatch_batch(&mut p, &events);

        if p.wrt.signals.collecting() {
            let (wa, mp) = p.wrt.signals.observe_und_ticks(
                spot.nano_of_day,
                spot.weighted_average,
                spot.mid_price,
                spot.is_tight,
            );
            let security = p.wrt.security.clone();
            let mut events = Events::new();
            let has_reset = p.wrt.signals.handle_violation(
                SpotSource::Weighted,
                wa,
                false,
                false,
                &mut p.wrt.params,
                &security,
                &mut p.wrt.lag,
                &mut *p.scheduler,
                &mut *p.info,
                &mut events,
            );
            Self::dispatch_batch(&mut p, &events);
            let mut events = Events::new();
            p.wrt.signals.handle_violation(
                SpotSource::Mid,
                mp,
                has_reset,
                false,
                &mut p.wrt.params,
                &security,
                &mut p.wrt.lag,
                &mut *p.scheduler,
                &mut *p.info,
                &mut events,
            );
            Self::dispatch_batch(&mut p, &events);
            let mut events = Events::new();
            p.wrt
                .signals
                .detect_pricing_mode(wa, mp, &mut p.wrt.params, &mut *p.info, &mut events);
            Self::dispatch_batch(&mut p, &events);
        }
        Self::dispatch_event(&mut p, Event::SpotUpdated);
        p.wrt.signals.finish_und_spot();
    }

    fn warrant_und_tick_size(&mut self, warrant_sid: u64, tick_size: i32) {
        let Some(mut p) = self.parts(warrant_sid) else {
            return;
        };
        let security = p.wrt.security.clone();
        p.wrt.signals.on_underlying_tick_size_changed(
            &mut p.wrt.params,
            &security,
            p.wrt.scale.as_ref(),
            &mut *p.info,
            tick_size,
        );
    }

    fn dispatch_delta_limit_alert(
        &mut self,
        warrant_sid: u64,
        trigger_sid: u64,
        timestamp: i64,
        _net_delta: i64,
    ) {
        if let Some(mut p) = self.parts(warrant_sid) {
            Self::with_env(&mut p, |automaton, env| {
                automaton.on_delta_limit_exceeded(warrant_sid == trigger_sid, timestamp, env)
            });
        }
    }
}
