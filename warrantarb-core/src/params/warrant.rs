//! Per-warrant parameter tier: the tunables plus the live fields the
//! automaton and warrant signal generator keep current.

use serde::{Deserialize, Serialize};

use super::{MarketOutlook, SpreadState, StrategyStatus};
use crate::domain::{Greeks, SpotInterval};
use crate::pricing::PricingMode;
use crate::triggers::TriggerKind;

/// Safe-bid buffer below the enter bid level, in tick levels.
pub const DEFAULT_SAFE_BID_BUFFER_FROM_ENTER_PRICE: i32 = 20;
/// Safe-bid buffer below the current bid level, in tick levels.
pub const DEFAULT_SAFE_BID_BUFFER_FROM_CURRENT_PRICE: i32 = 5;

/// The per-warrant tier. Input fields are user tunables; the rest is live
/// state recomputed by the core and broadcast through the info sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarrantParams {
    pub warrant_sid: u64,

    // --- tunables ---
    pub mm_bid_size: i64,
    pub mm_ask_size: i64,
    pub base_order_size: i32,
    pub current_order_size: i32,
    pub max_order_size: i32,
    pub order_size_increment: i32,
    /// Per-mille multiplier applied to the current order size.
    pub order_size_multiplier: i32,
    pub order_size_remainder: i32,
    pub run_ticks_threshold: i32,
    pub tick_sensitivity_threshold: i32,
    pub stop_profit: i64,
    pub allowed_max_spread: i32,
    pub turnover_making_size: i64,
    pub turnover_making_period: i64,
    pub ban_period_to_down_vol: i64,
    pub ban_period_to_turnover_making: i64,
    pub selling_ban_period: i64,
    pub sell_on_vol_down_ban_period: i64,
    pub holding_period: i64,
    pub spread_observation_period: i64,
    pub market_outlook: MarketOutlook,
    pub sell_on_vol_down: bool,
    pub reset_stop_loss_on_vol_down: bool,
    pub allow_stop_loss_on_flashing_bid: bool,
    pub sell_at_quick_profit: bool,
    pub sell_to_non_issuer: bool,
    pub allow_additional_buy: bool,
    pub use_hold_bid_ban: bool,
    pub issuer_max_lag: i64,
    pub issuer_max_lag_cap: i64,
    pub default_pricing_mode: PricingMode,
    pub trigger_type: TriggerKind,
    /// Entry buffer in ticks, scaled ×1000.
    pub tick_buffer: i32,
    /// Stop-loss buffer in ticks, scaled ×1000; never exceeds `tick_buffer`.
    pub stop_loss_tick_buffer: i32,
    pub manual_order_ticks_from_enter_price: i32,
    pub wide_spread_buffer: i32,
    pub trades_volume_threshold: i64,

    // --- entry-scoped policy flags, reset when the position closes ---
    pub allow_stop_loss_on_wide_spread: bool,
    pub do_not_sell: bool,
    pub sell_at_break_even_only: bool,
    pub ignore_mm_size_on_sell: bool,
    pub safe_bid_level_buffer: i32,

    // --- live state ---
    pub status: StrategyStatus,
    pub order_size: i32,
    pub tick_sensitivity: i32,
    pub warrant_spread: i32,
    pub spread_state: SpreadState,
    pub pricing_mode: PricingMode,
    pub greeks: Greeks,
    pub enter_price: i32,
    pub enter_level: i32,
    pub enter_bid_level: i32,
    pub enter_mm_spread: i32,
    pub enter_mm_bid_price: i32,
    pub enter_spot_price: i64,
    pub enter_quantity: i32,
    pub exit_level: i32,
    pub profit_run: i32,
    pub stop_loss: i64,
    pub stop_loss_trigger: i64,
    pub stop_loss_adjustment: i64,
    pub safe_bid_price: i32,
    pub issuer_lag: i64,
    pub issuer_smoothing: i64,
    pub num_wavg_down_vols: i32,
    pub num_wavg_up_vols: i32,
    pub num_mprc_down_vols: i32,
    pub num_mprc_up_vols: i32,
    pub num_spread_resets: i32,
}

impl WarrantParams {
    pub fn new(warrant_sid: u64) -> Self {
        Self {
            warrant_sid,
            mm_bid_size: 0,
            mm_ask_size: 0,
            base_order_size: 0,
            current_order_size: 0,
            max_order_size: 0,
            order_size_increment: 0,
            order_size_multiplier: 1000,
            order_size_remainder: 0,
            run_ticks_threshold: 0,
            tick_sensitivity_threshold: 0,
            stop_profit: 0,
            allowed_max_spread: i32::MAX,
            turnover_making_size: 0,
            turnover_making_period: 0,
            ban_period_to_down_vol: 0,
            ban_period_to_turnover_making: 0,
            selling_ban_period: 0,
            sell_on_vol_down_ban_period: 0,
            holding_period: 0,
            spread_observation_period: 0,
            market_outlook: MarketOutlook::Neutral,
            sell_on_vol_down: false,
            reset_stop_loss_on_vol_down: false,
            allow_stop_loss_on_flashing_bid: false,
            sell_at_quick_profit: false,
            sell_to_non_issuer: false,
            allow_additional_buy: false,
            use_hold_bid_ban: false,
            issuer_max_lag: 0,
            issuer_max_lag_cap: i64::MAX,
            default_pricing_mode: PricingMode::Weighted,
            trigger_type: TriggerKind::Velocity5Ms,
            tick_buffer: 0,
            stop_loss_tick_buffer: 0,
            manual_order_ticks_from_enter_price: 0,
            wide_spread_buffer: 0,
            trades_volume_threshold: 0,
            allow_stop_loss_on_wide_spread: false,
            do_not_sell: false,
            sell_at_break_even_only: false,
            ignore_mm_size_on_sell: false,
            safe_bid_level_buffer: DEFAULT_SAFE_BID_BUFFER_FROM_ENTER_PRICE,
            status: StrategyStatus::Off,
            order_size: 0,
            tick_sensitivity: 0,
            warrant_spread: i32::MAX,
            spread_state: SpreadState::Wide,
            pricing_mode: PricingMode::Unknown,
            greeks: Greeks::default(),
            enter_price: 0,
            enter_level: 0,
            enter_bid_level: 0,
            enter_mm_spread: i32::MAX,
            enter_mm_bid_price: 0,
            enter_spot_price: 0,
            enter_quantity: 0,
            exit_level: 0,
            profit_run: 0,
            stop_loss: 0,
            stop_loss_trigger: 0,
            stop_loss_adjustment: 0,
            safe_bid_price: 0,
            issuer_lag: 0,
            issuer_smoothing: 0,
            num_wavg_down_vols: 0,
            num_wavg_up_vols: 0,
            num_mprc_down_vols: 0,
            num_mprc_up_vols: 0,
            num_spread_resets: 0,
        }
    }
}

/// Bucket-interval output tier broadcast alongside the warrant tier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BucketParams {
    pub warrant_sid: u64,
    pub active_interval: SpotInterval,
    pub next_interval: SpotInterval,
}

impl BucketParams {
    pub fn new(warrant_sid: u64) -> Self {
        Self {
            warrant_sid,
            active_interval: SpotInterval::empty(),
            next_interval: SpotInterval::empty(),
        }
    }

    pub fn reset(&mut self) {
        self.active_interval.clear();
        self.next_interval.clear();
    }
}

/// One user write against the warrant tier. A closed enum so validation,
/// the write itself and the post-update hook dispatch from one place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WrtParamWrite {
    MmBidSize(i64),
    MmAskSize(i64),
    BaseOrderSize(i32),
    CurrentOrderSize(i32),
    MaxOrderSize(i32),
    OrderSizeIncrement(i32),
    OrderSizeMultiplier(i32),
    OrderSizeRemainder(i32),
    RunTicksThreshold(i32),
    TickSensitivityThreshold(i32),
    StopLoss(i64),
    StopLossTrigger(i64),
    StopProfit(i64),
    AllowedMaxSpread(i32),
    TurnoverMakingSize(i64),
    TurnoverMakingPeriod(i64),
    BanPeriodToDownVol(i64),
    BanPeriodToTurnoverMaking(i64),
    SellingBanPeriod(i64),
    SellOnVolDownBanPeriod(i64),
    HoldingPeriod(i64),
    SpreadObservationPeriod(i64),
    MarketOutlook(MarketOutlook),
    SellOnVolDown(bool),
    ResetStopLossOnVolDown(bool),
    AllowStopLossOnFlashingBid(bool),
    SellAtQuickProfit(bool),
    SellToNonIssuer(bool),
    AllowAdditionalBuy(bool),
    UseHoldBidBan(bool),
    IssuerMaxLag(i64),
    IssuerMaxLagCap(i64),
    DefaultPricingMode(PricingMode),
    TriggerType(TriggerKind),
    TickBuffer(i32),
    StopLossTickBuffer(i32),
    ManualOrderTicksFromEnterPrice(i32),
    WideSpreadBuffer(i32),
    TradesVolumeThreshold(i64),
    AllowStopLossOnWideSpread(bool),
    DoNotSell(bool),
    SellAtBreakEvenOnly(bool),
    IgnoreMmSizeOnSell(bool),
    SafeBidLevelBuffer(i32),
}

impl WrtParamWrite {
    pub fn field_name(&self) -> &'static str {
        use WrtParamWrite::*;
        match self {
            MmBidSize(_) => "mm_bid_size",
            MmAskSize(_) => "mm_ask_size",
            BaseOrderSize(_) => "base_order_size",
            CurrentOrderSize(_) => "current_order_size",
            MaxOrderSize(_) => "max_order_size",
            OrderSizeIncrement(_) => "order_size_increment",
            OrderSizeMultiplier(_) => "order_size_multiplier",
            OrderSizeRemainder(_) => "order_size_remainder",
            RunTicksThreshold(_) => "run_ticks_threshold",
            TickSensitivityThreshold(_) => "tick_sensitivity_threshold",
            StopLoss(_) => "stop_loss",
            StopLossTrigger(_) => "stop_loss_trigger",
            StopProfit(_) => "stop_profit",
            AllowedMaxSpread(_) => "allowed_max_spread",
            TurnoverMakingSize(_) => "turnover_making_size",
            TurnoverMakingPeriod(_) => "turnover_making_period",
            BanPeriodToDownVol(_) => "ban_period_to_down_vol",
            BanPeriodToTurnoverMaking(_) => "ban_period_to_turnover_making",
            SellingBanPeriod(_) => "selling_ban_period",
            SellOnVolDownBanPeriod(_) => "sell_on_vol_down_ban_period",
            HoldingPeriod(_) => "holding_period",
            SpreadObservationPeriod(_) => "spread_observation_period",
            MarketOutlook(_) => "market_outlook",
            SellOnVolDown(_) => "sell_on_vol_down",
            ResetStopLossOnVolDown(_) => "reset_stop_loss_on_vol_down",
            AllowStopLossOnFlashingBid(_) => "allow_stop_loss_on_flashing_bid",
            SellAtQuickProfit(_) => "sell_at_quick_profit",
            SellToNonIssuer(_) => "sell_to_non_issuer",
            AllowAdditionalBuy(_) => "allow_additional_buy",
            UseHoldBidBan(_) => "use_hold_bid_ban",
            IssuerMaxLag(_) => "issuer_max_lag",
            IssuerMaxLagCap(_) => "issuer_max_lag_cap",
            DefaultPricingMode(_) => "default_pricing_mode",
            TriggerType(_) => "trigger_type",
            TickBuffer(_) => "tick_buffer",
            StopLossTickBuffer(_) => "stop_loss_tick_buffer",
            ManualOrderTicksFromEnterPrice(_) => "manual_order_ticks_from_enter_price",
            WideSpreadBuffer(_) => "wide_spread_buffer",
            TradesVolumeThreshold(_) => "trades_volume_threshold",
            AllowStopLossOnWideSpread(_) => "allow_stop_loss_on_wide_spread",
            DoNotSell(_) => "do_not_sell",
            SellAtBreakEvenOnly(_) => "sell_at_break_even_only",
            IgnoreMmSizeOnSell(_) => "ignore_mm_size_on_sell",
            SafeBidLevelBuffer(_) => "safe_bid_level_buffer",
        }
    }

    /// The proposed value as an i64, for rejection logging.
    pub fn raw_value(&self) -> i64 {
        use WrtParamWrite::*;
        match *self {
            MmBidSize(v) | MmAskSize(v) | StopLoss(v) | StopLossTrigger(v) | StopProfit(v)
            | TurnoverMakingSize(v) | TurnoverMakingPeriod(v) | BanPeriodToDownVol(v)
            | BanPeriodToTurnoverMaking(v) | SellingBanPeriod(v) | SellOnVolDownBanPeriod(v)
            | HoldingPeriod(v) | SpreadObservationPeriod(v) | IssuerMaxLag(v)
            | IssuerMaxLagCap(v) | TradesVolumeThreshold(v) => v,
            BaseOrderSize(v) | CurrentOrderSize(v) | MaxOrderSize(v) | OrderSizeIncrement(v)
            | OrderSizeMultiplier(v) | OrderSizeRemainder(v) | RunTicksThreshold(v)
            | TickSensitivityThreshold(v) | AllowedMaxSpread(v) | TickBuffer(v)
            | StopLossTickBuffer(v) | ManualOrderTicksFromEnterPrice(v) | WideSpreadBuffer(v)
            | SafeBidLevelBuffer(v) => v as i64,
            SellOnVolDown(v) | ResetStopLossOnVolDown(v) | AllowStopLossOnFlashingBid(v)
            | SellAtQuickProfit(v) | SellToNonIssuer(v) | AllowAdditionalBuy(v)
            | UseHoldBidBan(v) | AllowStopLossOnWideSpread(v) | DoNotSell(v)
            | SellAtBreakEvenOnly(v) | IgnoreMmSizeOnSell(v) => v as i64,
            MarketOutlook(_) | DefaultPricingMode(_) | TriggerType(_) => 0,
        }
    }
}

/// Validation of user writes. Installed once by the strategy facade; the
/// stop-loss rules depend on the warrant's option side, so there is one
/// implementation per polarity. `spot` is the live spot estimate at write
/// time.
pub trait WarrantParamsValidator {
    fn validate(&self, params: &WarrantParams, write: &WrtParamWrite, spot: i64) -> bool;
}

/// Side-independent range rules shared by both polarities.
pub fn validate_common(params: &WarrantParams, write: &WrtParamWrite) -> bool {
    match *write {
        WrtParamWrite::BaseOrderSize(v) => v <= params.max_order_size,
        WrtParamWrite::OrderSizeIncrement(v) => v >= 0,
        WrtParamWrite::CurrentOrderSize(v) => v >= 0,
        WrtParamWrite::MaxOrderSize(v) => v <= 1_000_000,
        WrtParamWrite::OrderSizeMultiplier(v) => (0..=4000).contains(&v),
        WrtParamWrite::RunTicksThreshold(v) => v >= 0,
        WrtParamWrite::TickBuffer(v) => v >= 0 && v >= params.stop_loss_tick_buffer,
        WrtParamWrite::StopLossTickBuffer(v) => v >= 0 && v <= params.tick_buffer,
        WrtParamWrite::WideSpreadBuffer(v) => v >= 0,
        WrtParamWrite::TradesVolumeThreshold(v) => v >= 0,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_rules_reject_out_of_range_sizes() {
        let mut params = WarrantParams::new(1);
        params.max_order_size = 100_000;
        assert!(validate_common(&params, &WrtParamWrite::BaseOrderSize(100_000)));
        assert!(!validate_common(&params, &WrtParamWrite::BaseOrderSize(100_001)));
        assert!(!validate_common(&params, &WrtParamWrite::OrderSizeMultiplier(4001)));
        assert!(!validate_common(&params, &WrtParamWrite::OrderSizeIncrement(-1)));
    }

    #[test]
    fn stop_loss_buffer_cannot_exceed_tick_buffer() {
        let mut params = WarrantParams::new(1);
        params.tick_buffer = 2000;
        assert!(validate_common(&params, &WrtParamWrite::StopLossTickBuffer(2000)));
        assert!(!validate_common(&params, &WrtParamWrite::StopLossTickBuffer(2001)));
        params.stop_loss_tick_buffer = 1000;
        assert!(!validate_common(&params, &WrtParamWrite::TickBuffer(500)));
    }
}
