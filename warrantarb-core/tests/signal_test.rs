//! Integration tests for the signal layer.
//!
//! 1. Tight-spread detection and the weighted-average spot (Scenario A)
//! 2. Spread-state classification, including TOO_WIDE while holding
//! 3. Hold-bid ban suppresses entry until the mm bid climbs through it

mod common;

use common::{Rig, LOT_SIZE};
use warrantarb_core::domain::{BookSnapshot, OptionSide, SpotInterval, SpreadTable, TradeSide, TriggerInfo};
use warrantarb_core::params::{SpreadState, WrtParamWrite};
use warrantarb_core::signal::UnderlyingSignals;
use warrantarb_core::strategy::State;

fn book(bids: &[(i32, i64)], asks: &[(i32, i64)]) -> BookSnapshot {
    BookSnapshot::from_prices(&SpreadTable::hk(), bids, asks, TriggerInfo::default())
}

#[test]
fn tight_spread_weighted_average_collapses_to_mid_when_widened() {
    let mut und = UnderlyingSignals::new(SpreadTable::hk());

    // 100.00 / 100.10: one tick apart.
    let outcome = und.apply_book(1, &book(&[(100_000, 3_000)], &[(100_100, 1_000)]));
    let spot = outcome.spot.expect("spot present");
    assert!(spot.is_tight);
    assert!(und.is_tight_spread());
    assert!(spot.weighted_average > 100_000_000 && spot.weighted_average < 100_100_000);
    assert_ne!(spot.weighted_average, spot.mid_price);
    und.finish_tick();

    // 100.00 / 100.20: two ticks; weighted collapses to the mid.
    let outcome = und.apply_book(2, &book(&[(100_000, 3_000)], &[(100_200, 1_000)]));
    let spot = outcome.spot.expect("spot present");
    assert!(!spot.is_tight);
    assert!(!und.is_tight_spread());
    assert_eq!(spot.weighted_average, spot.mid_price);
    assert_eq!(spot.mid_price, 100_100_000);
}

#[test]
fn spread_state_reports_too_wide_only_under_entry_water_with_wide_mm() {
    let mut rig = Rig::new(OptionSide::Call);
    rig.arm_for_entry();
    rig.enter_position(300_000_000);
    assert_eq!(rig.params().spread_state, SpreadState::Normal);

    // Bid collapses far below the entry, mm spread far above the entry
    // spread, and the book is not loosely tight.
    rig.wrt_book(400_000_000, &[(90, 100_000)], &[(100, 100_000)]);
    assert_eq!(rig.params().spread_state, SpreadState::TooWide);
    assert_eq!(rig.state(), State::PositionHeld);
}

#[test]
fn hold_bid_ban_suppresses_entry_until_mm_bid_climbs_through() {
    let mut rig = Rig::new(OptionSide::Call);
    rig.set(WrtParamWrite::UseHoldBidBan(true));
    rig.arm_for_entry();

    // A seller-initiated print below the mm ask arms the ban.
    rig.wrt_trade(250_000_000, 99, 10_000, TradeSide::Ask);
    rig.script.borrow_mut().by_spot_any = Some(SpotInterval::new(0, i64::MAX, 100));
    rig.und_book(300_000_000, &[(100_000, 3_000)], &[(100_100, 1_000)]);
    // mm ask (100) above the banned price (99): entry suppressed.
    assert_eq!(rig.state(), State::NoPositionHeld);
    assert!(rig.orders.borrow().buys.is_empty());

    // The mm bid climbing above the banned price releases it.
    rig.wrt_book(310_000_000, &[(100, 100_000)], &[(101, 100_000)]);
    rig.script.borrow_mut().by_spot_any = Some(SpotInterval::new(0, i64::MAX, 101));
    rig.und_book(320_000_000, &[(100_000, 3_100)], &[(100_100, 1_000)]);
    assert_eq!(rig.state(), State::BuyingPosition);
    assert_eq!(rig.orders.borrow().buys.len(), 1);
}
