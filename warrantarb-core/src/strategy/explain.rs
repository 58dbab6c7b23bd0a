//! Explain records: the numeric inputs behind each order decision.
//!
//! A fixed-shape snapshot captured when an order is sent, attached to the
//! order for audit and logged when the acknowledgement comes back. Never
//! read back by the automaton.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::pricing::PricingMode;

/// Why an order was placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExplainReason {
    None,
    PredictionByBidBucket,
    PredictionByBucket,
    PredictionByPrevSpot,
    ProfitRunSell,
    StopProfitSell,
    QuickProfitSell,
    StopLossSell,
    IssuerDownVolSell,
    TurnoverMakingSell,
    NonIssuerBidSell,
    DeltaLimitSell,
    LargeOutstandingSell,
    ExitStrategySell,
    ClosingProfitRunSell,
    UserCaptureProfit,
    UserPlaceSellOrder,
}

/// Condition flags accumulated while a position is held.
pub mod sell_flags {
    pub const VOL_DOWN: u32 = 1;
    pub const TURNOVER_MAKING: u32 = 2;
    pub const WIDE: u32 = 4;
}

/// Snapshot of the decision inputs. Prices ×1000, spots ×1e6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainRecord {
    pub security_sid: u64,
    pub order_sid: u64,
    pub reason: ExplainReason,
    pub trigger_seq_num: u64,
    pub prev_und_bid: i32,
    pub prev_und_ask: i32,
    pub und_bid: i32,
    pub und_ask: i32,
    pub prev_wrt_bid: i32,
    pub prev_wrt_ask: i32,
    pub wrt_bid: i32,
    pub wrt_ask: i32,
    pub velocity: i64,
    pub delta: i32,
    pub warrant_spread: i32,
    pub tick_sensitivity: i32,
    pub high_warrant_bid: i32,
    pub best_spot: i64,
    pub spot: i64,
    pub prev_spot: i64,
    pub bucket_size: i32,
    pub pricing_mode: PricingMode,
    pub flags: u32,
}

impl ExplainRecord {
    pub fn new(security_sid: u64) -> Self {
        Self {
            security_sid,
            order_sid: 0,
            reason: ExplainReason::None,
            trigger_seq_num: 0,
            prev_und_bid: 0,
            prev_und_ask: 0,
            und_bid: 0,
            und_ask: 0,
            prev_wrt_bid: 0,
            prev_wrt_ask: 0,
            wrt_bid: 0,
            wrt_ask: 0,
            velocity: 0,
            delta: 0,
            warrant_spread: 0,
            tick_sensitivity: 0,
            high_warrant_bid: 0,
            best_spot: 0,
            spot: 0,
            prev_spot: 0,
            bucket_size: 0,
            pricing_mode: PricingMode::Unknown,
            flags: 0,
        }
    }

    pub fn log_for_buy_order(&self, code: &str) {
        info!(
            code,
            order_sid = self.order_sid,
            reason = ?self.reason,
            und_bid = self.und_bid,
            und_ask = self.und_ask,
            wrt_bid = self.wrt_bid,
            wrt_ask = self.wrt_ask,
            velocity = self.velocity,
            delta = self.delta,
            spread = self.warrant_spread,
            tick_sensitivity = self.tick_sensitivity,
            spot = self.spot,
            prev_spot = self.prev_spot,
            "buy order acknowledged"
        );
    }

    pub fn log_for_sell_order(&self, code: &str) {
        info!(
            code,
            order_sid = self.order_sid,
            reason = ?self.reason,
            und_bid = self.und_bid,
            und_ask = self.und_ask,
            wrt_bid = self.wrt_bid,
            wrt_ask = self.wrt_ask,
            velocity = self.velocity,
            high_warrant_bid = self.high_warrant_bid,
            best_spot = self.best_spot,
            vol_down = self.flags & sell_flags::VOL_DOWN != 0,
            turnover_making = self.flags & sell_flags::TURNOVER_MAKING != 0,
            widened = self.flags & sell_flags::WIDE != 0,
            "sell order acknowledged"
        );
    }
}
