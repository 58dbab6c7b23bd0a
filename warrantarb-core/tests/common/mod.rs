//! Shared test fixtures: fake collaborators and a wired-up rig.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use warrantarb_core::domain::{
    BookSnapshot, Greeks, MarketTrade, OptionSide, Security, SpotInterval, SpreadTable, TradeSide,
    TriggerInfo, UnderlyingKind,
};
use warrantarb_core::params::{
    BucketParams, IssuerParams, IssuerUnderlyingParams, UnderlyingParams, WarrantParams,
    WrtParamWrite,
};
use warrantarb_core::ports::{
    AuditEvent, BroadcastKind, InfoSender, OrderRejectKind, OrderService, ScheduleKind, Scheduler,
};
use warrantarb_core::pricing::{
    BucketPredictor, BucketPredictorFactory, PredictorConfig, Violation,
};
use warrantarb_core::strategy::{ExplainRecord, State, Strategy, StrategyContext};

pub const WARRANT_SID: u64 = 1;
pub const UNDERLYING_SID: u64 = 2;
pub const ISSUER_SID: u32 = 7;
pub const LOT_SIZE: i32 = 10_000;

// ── Fake order service ─────────────────────────────────────────────────

#[derive(Default)]
pub struct OrderLog {
    pub buys: Vec<(i32, i64)>,
    pub sells: Vec<(i32, i64)>,
    pub sell_to_exits: Vec<(i32, i64)>,
    pub sell_limits: Vec<(i32, i64)>,
    pub cancel_and_sells: Vec<i32>,
}

impl OrderLog {
    pub fn total_orders(&self) -> usize {
        self.buys.len() + self.sells.len() + self.sell_to_exits.len() + self.sell_limits.len()
    }
}

pub struct FakeOrderService {
    pub log: Rc<RefCell<OrderLog>>,
    pub can_trade: Rc<Cell<bool>>,
}

impl OrderService for FakeOrderService {
    fn can_trade(&self) -> bool {
        self.can_trade.get()
    }

    fn buy(&mut self, _security: &Security, price: i32, qty: i64, _explain: &ExplainRecord) {
        self.log.borrow_mut().buys.push((price, qty));
    }

    fn sell(&mut self, _security: &Security, price: i32, qty: i64, _explain: &ExplainRecord) {
        self.log.borrow_mut().sells.push((price, qty));
    }

    fn sell_to_exit(&mut self, _security: &Security, price: i32, qty: i64, _explain: &ExplainRecord) {
        self.log.borrow_mut().sell_to_exits.push((price, qty));
    }

    fn sell_limit(&mut self, _security: &Security, price: i32, qty: i64, _explain: &ExplainRecord) {
        self.log.borrow_mut().sell_limits.push((price, qty));
    }

    fn cancel_and_sell_outstanding_sell(
        &mut self,
        _security: &Security,
        price: i32,
        _explain: &ExplainRecord,
    ) {
        self.log.borrow_mut().cancel_and_sells.push(price);
    }
}

// ── Fake info sender / scheduler ───────────────────────────────────────

#[derive(Default)]
pub struct FakeInfoSender {
    pub events: Rc<RefCell<Vec<AuditEvent>>>,
}

impl InfoSender for FakeInfoSender {
    fn warrant_params(&mut self, _params: &WarrantParams, _kind: BroadcastKind) {}
    fn underlying_params(&mut self, _params: &UnderlyingParams, _kind: BroadcastKind) {}
    fn issuer_params(&mut self, _params: &IssuerParams, _kind: BroadcastKind) {}
    fn issuer_und_params(&mut self, _params: &IssuerUnderlyingParams, _kind: BroadcastKind) {}
    fn bucket_params(&mut self, _params: &BucketParams, _kind: BroadcastKind) {}
    fn send_event(&mut self, event: AuditEvent) {
        self.events.borrow_mut().push(event);
    }
}

pub struct FakeScheduler {
    pub scheduled: Rc<RefCell<Vec<(u64, ScheduleKind, i64)>>>,
}

impl Scheduler for FakeScheduler {
    fn schedule(&mut self, warrant_sid: u64, kind: ScheduleKind, deadline_ns: i64) -> bool {
        self.scheduled.borrow_mut().push((warrant_sid, kind, deadline_ns));
        true
    }
}

// ── Scripted bucket predictor ──────────────────────────────────────────

/// Intervals the test wants the oracle to report. Shared between both
/// pricing-mode instances.
#[derive(Default)]
pub struct Script {
    pub by_spot: HashMap<i64, SpotInterval>,
    pub by_spot_any: Option<SpotInterval>,
    pub by_price: Option<SpotInterval>,
    pub by_price_extrapolated: Option<SpotInterval>,
}

pub struct ScriptedPredictor {
    script: Rc<RefCell<Script>>,
    target_spread: i32,
}

impl BucketPredictor for ScriptedPredictor {
    fn observe_deriv_tick(
        &mut self,
        _ns: i64,
        _bid: i32,
        _ask: i32,
        _mm_bid: i32,
        _mm_ask: i32,
        _spread: i32,
        _trigger: TriggerInfo,
    ) -> Violation {
        Violation::None
    }

    fn observe_und_tick(
        &mut self,
        _ns: i64,
        _spot: i64,
        _tight: bool,
        _trigger: TriggerInfo,
        _out: &mut SpotInterval,
    ) -> Violation {
        Violation::None
    }

    fn observe_greeks(&mut self, _ns: i64, _greeks: Greeks) {}

    fn interval_by_und_spot(&self, spot: i64, out: &mut SpotInterval) -> bool {
        let script = self.script.borrow();
        if let Some(interval) = script.by_spot.get(&spot).or(script.by_spot_any.as_ref()) {
            *out = *interval;
            return true;
        }
        false
    }

    fn overlap_and_greater_interval(
        &self,
        _spot: i64,
        _out: &mut SpotInterval,
        _out_greater: &mut SpotInterval,
    ) -> bool {
        false
    }

    fn overlap_and_smaller_interval(
        &self,
        _spot: i64,
        _out: &mut SpotInterval,
        _out_smaller: &mut SpotInterval,
    ) -> bool {
        false
    }

    fn interval_by_deriv_price(&self, _price: i32, out: &mut SpotInterval) -> bool {
        if let Some(interval) = self.script.borrow().by_price {
            *out = interval;
            return true;
        }
        false
    }

    fn interval_by_deriv_price_with_extrapolation(&self, _price: i32, out: &mut SpotInterval) -> bool {
        if let Some(interval) = self.script.borrow().by_price_extrapolated {
            *out = interval;
            return true;
        }
        false
    }

    fn target_spread_ticks(&self) -> i32 {
        self.target_spread
    }

    fn has_target_spread_changed(&self) -> bool {
        false
    }

    fn has_target_spread_changed_and_register(
        &mut self,
        _ns: i64,
        _mm_bid: i32,
        _mm_ask: i32,
        _spread: i32,
    ) -> bool {
        false
    }

    fn reset_target_spread(&mut self, _ns: i64, target: i32) {
        self.target_spread = target;
    }

    fn reset_and_set_target_spread(&mut self, target: i32) {
        self.target_spread = target;
    }

    fn reset(&mut self, _ns: i64) {}
    fn reset_and_register(&mut self, _ns: i64, _interval: &SpotInterval) {}
    fn set_issuer_max_lag(&mut self, _max_lag: i64) {}
    fn clear(&mut self) {}
}

pub struct ScriptedFactory {
    pub script: Rc<RefCell<Script>>,
}

impl BucketPredictorFactory for ScriptedFactory {
    fn create(&self, _config: &PredictorConfig) -> Box<dyn BucketPredictor> {
        Box::new(ScriptedPredictor {
            script: self.script.clone(),
            target_spread: i32::MAX,
        })
    }
}

// ── The rig ────────────────────────────────────────────────────────────

pub struct Rig {
    pub ctx: Rc<RefCell<StrategyContext>>,
    pub strategy: Strategy,
    pub warrant: Rc<Security>,
    pub underlying: Rc<Security>,
    pub orders: Rc<RefCell<OrderLog>>,
    pub can_trade: Rc<Cell<bool>>,
    pub audit_events: Rc<RefCell<Vec<AuditEvent>>>,
    pub script: Rc<RefCell<Script>>,
    seq: Cell<u64>,
}

impl Rig {
    pub fn new(side: OptionSide) -> Self {
        let warrant = Rc::new(Security::new(
            WARRANT_SID,
            "18888",
            side,
            UNDERLYING_SID,
            ISSUER_SID,
            UnderlyingKind::Equity,
            SpreadTable::hk(),
            LOT_SIZE,
            10_000,
        ));
        let underlying = Rc::new(Security::new(
            UNDERLYING_SID,
            "5",
            OptionSide::None,
            UNDERLYING_SID,
            0,
            UnderlyingKind::Equity,
            SpreadTable::hk(),
            500,
            1_000,
        ));
        let orders = Rc::new(RefCell::new(OrderLog::default()));
        let can_trade = Rc::new(Cell::new(true));
        let audit_events = Rc::new(RefCell::new(Vec::new()));
        let script = Rc::new(RefCell::new(Script::default()));
        let ctx = Rc::new(RefCell::new(StrategyContext::new(
            100,
            Box::new(ScriptedFactory {
                script: script.clone(),
            }),
            Box::new(FakeOrderService {
                log: orders.clone(),
                can_trade: can_trade.clone(),
            }),
            Box::new(FakeInfoSender {
                events: audit_events.clone(),
            }),
            Box::new(FakeScheduler {
                scheduled: Rc::new(RefCell::new(Vec::new())),
            }),
        )));
        let strategy = Strategy::of(ctx.clone(), warrant.clone(), underlying.clone(), 100);
        Rig {
            ctx,
            strategy,
            warrant,
            underlying,
            orders,
            can_trade,
            audit_events,
            script,
            seq: Cell::new(0),
        }
    }

    fn next_trigger(&self, ns: i64) -> TriggerInfo {
        self.seq.set(self.seq.get() + 1);
        TriggerInfo {
            seq_num: self.seq.get(),
            nano_of_day: ns,
        }
    }

    pub fn set(&self, write: WrtParamWrite) {
        self.ctx
            .borrow_mut()
            .write_warrant_param(WARRANT_SID, write)
            .expect("param write accepted");
    }

    pub fn und_book(&self, ns: i64, bids: &[(i32, i64)], asks: &[(i32, i64)]) {
        let book = BookSnapshot::from_prices(
            &self.underlying.spread_table,
            bids,
            asks,
            self.next_trigger(ns),
        );
        self.ctx
            .borrow_mut()
            .on_underlying_book_updated(UNDERLYING_SID, ns, &book);
    }

    pub fn wrt_book(&self, ns: i64, bids: &[(i32, i64)], asks: &[(i32, i64)]) {
        let book = BookSnapshot::from_prices(
            &self.warrant.spread_table,
            bids,
            asks,
            self.next_trigger(ns),
        );
        self.ctx
            .borrow_mut()
            .on_warrant_book_updated(WARRANT_SID, ns, &book);
    }

    pub fn wrt_trade(&self, ns: i64, price: i32, qty: i64, trade_side: TradeSide) {
        let trade = MarketTrade::new(price, qty, trade_side, ns);
        self.ctx
            .borrow_mut()
            .on_warrant_trade(WARRANT_SID, ns, &trade);
    }

    pub fn greeks(&self, delta: i32, gamma: i32, ref_spot: i32) {
        self.ctx.borrow_mut().on_greeks_updated(
            WARRANT_SID,
            Greeks {
                delta,
                gamma,
                vega: 0,
                ref_spot,
            },
        );
    }

    pub fn order_status(&self, ns: i64, price: i32, qty: i64, reject: OrderRejectKind) {
        self.ctx
            .borrow_mut()
            .on_order_status(WARRANT_SID, ns, price, qty, reject);
    }

    pub fn state(&self) -> State {
        self.ctx
            .borrow()
            .automaton_state(WARRANT_SID)
            .expect("warrant registered")
    }

    pub fn params(&self) -> WarrantParams {
        self.ctx
            .borrow()
            .warrant_params(WARRANT_SID)
            .expect("warrant registered")
            .clone()
    }

    /// Baseline setup shared by the automaton scenarios: permissive entry
    /// thresholds, allow-all trigger, qualified mm quotes, established
    /// target spread and greeks.
    pub fn arm_for_entry(&mut self) {
        use warrantarb_core::triggers::TriggerKind;
        self.set(WrtParamWrite::TriggerType(TriggerKind::AllowAll));
        self.set(WrtParamWrite::MmBidSize(50_000));
        self.set(WrtParamWrite::MmAskSize(50_000));
        self.set(WrtParamWrite::MaxOrderSize(100_000));
        self.set(WrtParamWrite::CurrentOrderSize(LOT_SIZE));
        self.set(WrtParamWrite::BaseOrderSize(LOT_SIZE));
        self.set(WrtParamWrite::SpreadObservationPeriod(1_000_000_000));
        self.strategy.start();
        self.strategy.switch_on().expect("switch on");

        // Underlying tight book: establishes spot, tick sizes and greeks.
        self.und_book(1_000, &[(100_000, 2_000)], &[(100_100, 2_000)]);
        self.greeks(50_000, 0, 100_000);
        // Warrant book twice, >100ms apart, so the mm spread becomes the
        // sustained target.
        self.wrt_book(2_000, &[(99, 100_000)], &[(100, 100_000)]);
        self.wrt_book(200_000_000, &[(99, 100_000)], &[(100, 100_000)]);
    }

    /// Drive the rig from flat into a held position at ask 100.
    pub fn enter_position(&mut self, now: i64) {
        self.script.borrow_mut().by_spot_any = Some(SpotInterval::new(0, i64::MAX, 100));
        self.und_book(now, &[(100_000, 3_000)], &[(100_100, 1_000)]);
        assert_eq!(self.state(), State::BuyingPosition);
        self.script.borrow_mut().by_spot_any = None;
        self.warrant.set_position(LOT_SIZE as i64);
        self.order_status(now + 1_000, 100, LOT_SIZE as i64, OrderRejectKind::None);
        assert_eq!(self.state(), State::PositionHeld);
    }
}
