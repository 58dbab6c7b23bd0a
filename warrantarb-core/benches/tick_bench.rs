//! Tick-path throughput: one warrant, alternating underlying and warrant
//! book updates through the full dispatch stack.

use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use warrantarb_core::domain::{
    BookSnapshot, Greeks, OptionSide, Security, SpotInterval, SpreadTable, TriggerInfo,
    UnderlyingKind,
};
use warrantarb_core::params::{
    BucketParams, IssuerParams, IssuerUnderlyingParams, UnderlyingParams, WarrantParams,
};
use warrantarb_core::ports::{
    AuditEvent, BroadcastKind, InfoSender, OrderService, ScheduleKind, Scheduler,
};
use warrantarb_core::pricing::{
    BucketPredictor, BucketPredictorFactory, PredictorConfig, Violation,
};
use warrantarb_core::strategy::{ExplainRecord, StrategyContext};

struct NullPredictor;

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
    fn overlap_and_greater_interval(&self, _: i64, _: &mut SpotInterval, _: &mut SpotInterval) -> bool {
        false
    }
    fn overlap_and_smaller_interval(&self, _: i64, _: &mut SpotInterval, _: &mut SpotInterval) -> bool {
        false
    }
    fn interval_by_deriv_price(&self, _: i32, _: &mut SpotInterval) -> bool {
        false
    }
    fn interval_by_deriv_price_with_extrapolation(&self, _: i32, _: &mut SpotInterval) -> bool {
        false
    }
    fn target_spread_ticks(&self) -> i32 {
        i32::MAX
    }
    fn has_target_spread_changed(&self) -> bool {
        false
    }
    fn has_target_spread_changed_and_register(&mut self, _: i64, _: i32, _: i32, _: i32) -> bool {
        false
    }
    fn reset_target_spread(&mut self, _: i64, _: i32) {}
    fn reset_and_set_target_spread(&mut self, _: i32) {}
    fn reset(&mut self, _: i64) {}
    fn reset_and_register(&mut self, _: i64, _: &SpotInterval) {}
    fn set_issuer_max_lag(&mut self, _: i64) {}
    fn clear(&mut self) {}
}

struct NullFactory;

impl BucketPredictorFactory for NullFactory {
    fn create(&self, _: &PredictorConfig) -> Box<dyn BucketPredictor> {
        Box::new(NullPredictor)
    }
}

struct NullOrders;

impl OrderService for NullOrders {
    fn can_trade(&self) -> bool {
        true
    }
    fn buy(&mut self, _: &Security, _: i32, _: i64, _: &ExplainRecord) {}
    fn sell(&mut self, _: &Security, _: i32, _: i64, _: &ExplainRecord) {}
    fn sell_to_exit(&mut self, _: &Security, _: i32, _: i64, _: &ExplainRecord) {}
    fn sell_limit(&mut self, _: &Security, _: i32, _: i64, _: &ExplainRecord) {}
    fn cancel_and_sell_outstanding_sell(&mut self, _: &Security, _: i32, _: &ExplainRecord) {}
}

struct NullInfo;

impl InfoSender for NullInfo {
    fn warrant_params(&mut self, _: &WarrantParams, _: BroadcastKind) {}
    fn underlying_params(&mut self, _: &UnderlyingParams, _: BroadcastKind) {}
    fn issuer_params(&mut self, _: &IssuerParams, _: BroadcastKind) {}
    fn issuer_und_params(&mut self, _: &IssuerUnderlyingParams, _: BroadcastKind) {}
    fn bucket_params(&mut self, _: &BucketParams, _: BroadcastKind) {}
    fn send_event(&mut self, _: AuditEvent) {}
}

struct NullScheduler;

impl Scheduler for NullScheduler {
    fn schedule(&mut self, _: u64, _: ScheduleKind, _: i64) -> bool {
        true
    }
}

fn build_context() -> StrategyContext {
    let mut ctx = StrategyContext::new(
        1,
        Box::new(NullFactory),
        Box::new(NullOrders),
        Box::new(NullInfo),
        Box::new(NullScheduler),
    );
    let warrant = Rc::new(Security::new(
        1,
        "18888",
        OptionSide::Call,
        2,
        7,
        UnderlyingKind::Equity,
        SpreadTable::hk(),
        10_000,
        10_000,
    ));
    let underlying = Rc::new(Security::new(
        2,
        "5",
        OptionSide::None,
        2,
        0,
        UnderlyingKind::Equity,
        SpreadTable::hk(),
        500,
        1_000,
    ));
    ctx.initialize_context(warrant, underlying);
    ctx.start_strategy(1);
    ctx.on_greeks_updated(
        1,
        Greeks {
            delta: 50_000,
            gamma: 2_000,
            vega: 0,
            ref_spot: 100_000,
        },
    );
    ctx
}

fn bench_tick_path(c: &mut Criterion) {
    let mut ctx = build_context();
    let table = SpreadTable::hk();
    let und_book = BookSnapshot::from_prices(
        &table,
        &[(100_000, 2_000)],
        &[(100_100, 2_000)],
        TriggerInfo::default(),
    );
    let wrt_book = BookSnapshot::from_prices(
        &table,
        &[(99, 100_000)],
        &[(100, 100_000)],
        TriggerInfo::default(),
    );

    let mut ts = 0i64;
    c.bench_function("und_and_warrant_tick", |b| {
        b.iter(|| {
            ts += 1_000;
            ctx.on_underlying_book_updated(black_box(2), ts, &und_book);
            ts += 1_000;
            ctx.on_warrant_book_updated(black_box(1), ts, &wrt_book);
        })
    });
}

criterion_group!(benches, bench_tick_path);
criterion_main!(benches);
