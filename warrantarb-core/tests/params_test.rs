//! Parameter validation and order-sizing tests.
//!
//! A rejected write must leave the prior value untouched and must not run
//! the post-update hook; order sizes stay lot-rounded and capped.

mod common;

use common::{Rig, LOT_SIZE, WARRANT_SID};
use proptest::prelude::*;
use warrantarb_core::domain::OptionSide;
use warrantarb_core::params::WrtParamWrite;

#[test]
fn call_stop_loss_above_spot_is_rejected_without_mutation() {
    let mut rig = Rig::new(OptionSide::Call);
    rig.arm_for_entry();
    rig.enter_position(300_000_000);
    let stop_before = rig.params().stop_loss;
    let spot = 100_075_000;

    let result = rig
        .ctx
        .borrow_mut()
        .write_warrant_param(WARRANT_SID, WrtParamWrite::StopLoss(spot + 1));
    assert!(result.is_err());
    assert_eq!(rig.params().stop_loss, stop_before);

    // At or below the spot the write lands.
    rig.set(WrtParamWrite::StopLoss(spot - 1_000));
    assert_eq!(rig.params().stop_loss, spot - 1_000);
}

#[test]
fn put_stop_loss_below_spot_is_rejected() {
    let rig = Rig::new(OptionSide::Put);
    rig.strategy.start();
    // Establish a spot estimate.
    rig.und_book(1_000, &[(100_000, 2_000)], &[(100_100, 2_000)]);
    let spot = 100_050_000;

    let result = rig
        .ctx
        .borrow_mut()
        .write_warrant_param(WARRANT_SID, WrtParamWrite::StopLoss(spot - 1));
    assert!(result.is_err());

    rig.set(WrtParamWrite::StopLoss(spot + 1_000));
    assert_eq!(rig.params().stop_loss, spot + 1_000);
    // Zero is the explicit "clear" value for puts and snaps to the spot.
    rig.set(WrtParamWrite::StopLoss(0));
    assert_eq!(rig.params().stop_loss, spot);
}

#[test]
fn base_order_size_cannot_exceed_max() {
    let rig = Rig::new(OptionSide::Call);
    rig.set(WrtParamWrite::MaxOrderSize(50_000));
    let result = rig
        .ctx
        .borrow_mut()
        .write_warrant_param(WARRANT_SID, WrtParamWrite::BaseOrderSize(50_001));
    assert!(result.is_err());
    assert_eq!(rig.params().base_order_size, 0);
}

#[test]
fn stop_loss_tick_buffer_is_bounded_by_tick_buffer() {
    let rig = Rig::new(OptionSide::Call);
    rig.set(WrtParamWrite::TickBuffer(2_000));
    rig.set(WrtParamWrite::StopLossTickBuffer(1_500));
    assert!(rig
        .ctx
        .borrow_mut()
        .write_warrant_param(WARRANT_SID, WrtParamWrite::StopLossTickBuffer(2_500))
        .is_err());
    assert_eq!(rig.params().stop_loss_tick_buffer, 1_500);
}

#[test]
fn rejected_multiplier_keeps_order_size() {
    let rig = Rig::new(OptionSide::Call);
    rig.set(WrtParamWrite::MaxOrderSize(100_000));
    rig.set(WrtParamWrite::CurrentOrderSize(20_000));
    let size_before = rig.params().order_size;
    assert!(rig
        .ctx
        .borrow_mut()
        .write_warrant_param(WARRANT_SID, WrtParamWrite::OrderSizeMultiplier(4_001))
        .is_err());
    assert_eq!(rig.params().order_size, size_before);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Computed order size is always a lot multiple and never exceeds the
    /// configured maximum.
    #[test]
    fn order_size_is_lot_rounded_and_capped(
        current in 0i32..=1_000_000,
        multiplier in 0i32..=4_000,
        max_lots in 1i32..=100,
    ) {
        let rig = Rig::new(OptionSide::Call);
        let max = max_lots * LOT_SIZE;
        rig.set(WrtParamWrite::MaxOrderSize(max));
        rig.set(WrtParamWrite::OrderSizeMultiplier(multiplier));
        rig.set(WrtParamWrite::CurrentOrderSize(current));
        let params = rig.params();
        prop_assert_eq!(params.order_size % LOT_SIZE, 0);
        prop_assert!(params.order_size <= max, "{} > {}", params.order_size, max);
    }
}
