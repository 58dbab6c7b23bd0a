//! Integration tests for the strategy automaton.
//!
//! Scenarios:
//! 1. Entry + fill: flat → buying → held, with enter price and exit level
//!    captured from the ask (Scenario B)
//! 2. Profit-run revision keeps the call stop loss monotone (Scenario C)
//! 3. Turnover-making sell is deferred until the bid reaches the turnover
//!    price, and re-entry stays banned until the ban expires (Scenario D)
//! 4. Undefined (state, event) pairs are explicit no-ops
//! 5. Exit-mode priority: lower-or-equal priority cannot pre-empt
//! 6. A full exit resets every entry-scoped field
//! 7. Throttle rejects arm a sell ban that expires by deadline

mod common;

use common::{Rig, LOT_SIZE};
use warrantarb_core::domain::{OptionSide, SpotInterval, TradeSide};
use warrantarb_core::params::WrtParamWrite;
use warrantarb_core::ports::OrderRejectKind;
use warrantarb_core::strategy::{ExitMode, State};

#[test]
fn entry_signal_buys_at_ask_and_fill_moves_to_held() {
    let mut rig = Rig::new(OptionSide::Call);
    rig.arm_for_entry();
    assert_eq!(rig.state(), State::NoPositionHeld);

    rig.enter_position(300_000_000);

    let orders = rig.orders.borrow();
    assert_eq!(orders.buys, vec![(100, LOT_SIZE as i64)]);
    drop(orders);
    let params = rig.params();
    assert_eq!(params.enter_price, 100);
    assert_eq!(params.enter_level, rig.warrant.spread_table.price_to_tick(100));
    assert_eq!(params.exit_level, rig.warrant.spread_table.price_to_tick(100));
    assert_eq!(params.enter_quantity, LOT_SIZE);
}

#[test]
fn entry_is_suppressed_without_qualified_mm_quotes() {
    let mut rig = Rig::new(OptionSide::Call);
    rig.arm_for_entry();
    // Thin the book below the mm-qualifying size.
    rig.wrt_book(250_000_000, &[(99, 1_000)], &[(100, 1_000)]);
    rig.script.borrow_mut().by_spot_any = Some(SpotInterval::new(0, i64::MAX, 100));
    rig.und_book(300_000_000, &[(100_000, 3_000)], &[(100_100, 1_000)]);
    assert_eq!(rig.state(), State::NoPositionHeld);
    assert!(rig.orders.borrow().buys.is_empty());
}

#[test]
fn zero_fill_returns_to_flat_with_buy_ban() {
    let mut rig = Rig::new(OptionSide::Call);
    rig.arm_for_entry();
    rig.script.borrow_mut().by_spot_any = Some(SpotInterval::new(0, i64::MAX, 100));
    rig.und_book(300_000_000, &[(100_000, 3_000)], &[(100_100, 1_000)]);
    assert_eq!(rig.state(), State::BuyingPosition);

    // Acknowledged with no fill: back to flat, short buy ban armed.
    rig.order_status(300_001_000, 0, 0, OrderRejectKind::Other);
    assert_eq!(rig.state(), State::NoPositionHeld);

    // Within the 10ms ban the same signal cannot re-enter.
    rig.und_book(300_002_000, &[(100_000, 3_100)], &[(100_100, 1_000)]);
    assert_eq!(rig.state(), State::NoPositionHeld);
    assert_eq!(rig.orders.borrow().buys.len(), 1);

    // After the deadline it can.
    rig.und_book(320_000_000, &[(100_000, 3_200)], &[(100_100, 1_000)]);
    assert_eq!(rig.state(), State::BuyingPosition);
    assert_eq!(rig.orders.borrow().buys.len(), 2);
}

#[test]
fn profit_run_revision_never_lowers_a_call_stop_loss() {
    let mut rig = Rig::new(OptionSide::Call);
    rig.arm_for_entry();
    rig.enter_position(300_000_000);
    rig.set(WrtParamWrite::RunTicksThreshold(1_000_000));
    rig.set(WrtParamWrite::StopProfit(i64::MAX));
    let stop_before = rig.params().stop_loss;
    assert!(stop_before > 0);

    // Underlying climbs one tick; spot estimate rises.
    rig.und_book(400_000_000, &[(100_100, 2_000)], &[(100_200, 2_000)]);
    // Best bid joins the mm bid at the exit level: revision fires.
    rig.wrt_book(401_000_000, &[(100, 100_000)], &[(101, 100_000)]);

    let params = rig.params();
    assert!(
        params.stop_loss >= stop_before,
        "stop loss regressed: {} < {}",
        params.stop_loss,
        stop_before
    );
    assert_eq!(params.exit_level, rig.warrant.spread_table.price_to_tick(100) + 1);
    assert_eq!(rig.state(), State::PositionHeld);
}

#[test]
fn turnover_making_sell_defers_until_bid_reaches_turnover_price() {
    let mut rig = Rig::new(OptionSide::Call);
    rig.arm_for_entry();
    rig.enter_position(300_000_000);
    rig.set(WrtParamWrite::RunTicksThreshold(1_000_000));
    rig.set(WrtParamWrite::StopProfit(i64::MAX));
    rig.set(WrtParamWrite::TurnoverMakingSize(50_000));
    rig.set(WrtParamWrite::TurnoverMakingPeriod(50_000_000));
    rig.set(WrtParamWrite::BanPeriodToTurnoverMaking(1_000_000_000));

    // Matched opposite prints above the bid: detection, but no sell yet.
    rig.wrt_trade(400_000_000, 101, 60_000, TradeSide::Ask);
    rig.wrt_trade(401_000_000, 101, 60_000, TradeSide::Bid);
    assert_eq!(rig.state(), State::PositionHeld);
    assert!(rig.orders.borrow().sells.is_empty());

    // Bid reaches the turnover price: the deferred sell goes out there.
    rig.wrt_book(402_000_000, &[(101, 100_000)], &[(102, 100_000)]);
    assert_eq!(rig.state(), State::SellingPosition);
    assert_eq!(rig.orders.borrow().sells, vec![(101, LOT_SIZE as i64)]);

    // Full fill: back to flat with entry-scoped fields neutral.
    rig.warrant.set_position(0);
    rig.order_status(403_000_000, 101, LOT_SIZE as i64, OrderRejectKind::None);
    assert_eq!(rig.state(), State::NoPositionHeld);
    let params = rig.params();
    assert_eq!(params.enter_price, 0);
    assert_eq!(params.enter_level, 0);
    assert_eq!(params.stop_loss, 0);
    assert_eq!(params.exit_level, 0);
    assert_eq!(params.profit_run, 0);

    // Re-entry is banned until turnover_time + ban period.
    rig.script.borrow_mut().by_spot_any = Some(SpotInterval::new(0, i64::MAX, 102));
    rig.und_book(500_000_000, &[(100_100, 2_100)], &[(100_200, 2_000)]);
    assert_eq!(rig.state(), State::NoPositionHeld);
    assert_eq!(rig.orders.borrow().buys.len(), 1);

    rig.und_book(1_500_000_000, &[(100_100, 2_200)], &[(100_200, 2_000)]);
    assert_eq!(rig.state(), State::BuyingPosition);
    assert_eq!(rig.orders.borrow().buys.len(), 2);
}

#[test]
fn undefined_events_are_explicit_no_ops() {
    let mut rig = Rig::new(OptionSide::Call);
    rig.arm_for_entry();
    assert_eq!(rig.state(), State::NoPositionHeld);

    // Neither of these is defined while flat.
    rig.strategy.capture_profit();
    rig.strategy.place_sell_order();
    assert_eq!(rig.state(), State::NoPositionHeld);
    assert_eq!(rig.orders.borrow().total_orders(), 0);

    // Switching on while already on leaves the state alone.
    rig.strategy.switch_on().expect("switch on");
    assert_eq!(rig.state(), State::NoPositionHeld);
}

#[test]
fn lower_or_equal_priority_exit_mode_cannot_preempt() {
    let mut rig = Rig::new(OptionSide::Call);
    rig.arm_for_entry();
    rig.enter_position(300_000_000);

    rig.strategy.switch_off_with(ExitMode::ScoreboardExit);
    assert_eq!(
        rig.ctx.borrow().exit_mode(common::WARRANT_SID),
        Some(ExitMode::ScoreboardExit)
    );
    assert_eq!(rig.state(), State::PositionHeld);

    // Equal or lower rank is ignored.
    rig.strategy.switch_off_with(ExitMode::StrategyExit);
    assert_eq!(
        rig.ctx.borrow().exit_mode(common::WARRANT_SID),
        Some(ExitMode::ScoreboardExit)
    );
    rig.strategy.switch_off_with(ExitMode::ScoreboardExit);
    assert_eq!(
        rig.ctx.borrow().exit_mode(common::WARRANT_SID),
        Some(ExitMode::ScoreboardExit)
    );

    // Error always wins and forces the off path.
    rig.strategy.switch_off_with(ExitMode::Error);
    assert_eq!(rig.state(), State::Off);
    assert_eq!(
        rig.params().status,
        warrantarb_core::params::StrategyStatus::Error
    );
}

#[test]
fn throttle_reject_arms_a_sell_ban_that_expires_by_deadline() {
    let mut rig = Rig::new(OptionSide::Call);
    rig.arm_for_entry();
    rig.enter_position(300_000_000);

    // Spot collapses below the stop loss: sell attempt at one below bid.
    rig.und_book(400_000_000, &[(99_800, 2_000)], &[(99_900, 2_000)]);
    assert_eq!(rig.state(), State::SellingPosition);
    assert_eq!(rig.orders.borrow().sells.len(), 1);

    // Throttled while still holding: back to held, ban armed.
    rig.order_status(401_000_000, 0, 0, OrderRejectKind::Throttled);
    assert_eq!(rig.state(), State::PositionHeld);

    // Within the 10ms ban the stop loss cannot re-fire.
    rig.und_book(405_000_000, &[(99_800, 2_100)], &[(99_900, 2_000)]);
    assert_eq!(rig.state(), State::PositionHeld);
    assert_eq!(rig.orders.borrow().sells.len(), 1);

    // Past the deadline it retries.
    rig.und_book(415_000_000, &[(99_800, 2_200)], &[(99_900, 2_000)]);
    assert_eq!(rig.state(), State::SellingPosition);
    assert_eq!(rig.orders.borrow().sells.len(), 2);
}

#[test]
fn capture_profit_sells_at_bid_only_at_or_above_enter_price() {
    let mut rig = Rig::new(OptionSide::Call);
    rig.arm_for_entry();
    rig.enter_position(300_000_000);
    rig.set(WrtParamWrite::RunTicksThreshold(1_000_000));
    rig.set(WrtParamWrite::StopProfit(i64::MAX));

    // Bid below enter price: capture profit refuses.
    rig.strategy.capture_profit();
    assert_eq!(rig.state(), State::PositionHeld);
    assert!(rig.orders.borrow().sells.is_empty());

    // Bid at enter price: sells the available position at the bid.
    rig.wrt_book(400_000_000, &[(100, 100_000)], &[(101, 100_000)]);
    rig.strategy.capture_profit();
    assert_eq!(rig.state(), State::SellingPosition);
    assert_eq!(rig.orders.borrow().sells, vec![(100, LOT_SIZE as i64)]);
}
