//! Tunable parameters, four tiers: per-warrant, per-underlying, per-issuer
//! and per-issuer-underlying.
//!
//! Every externally writable field goes through a validating write: a
//! rejected value leaves the prior value untouched and never runs the
//! post-update hook. Validators are trait objects installed once by the
//! strategy facade (polarity-dependent rules live there); hooks are
//! dispatched by the context from the same closed write enum.

pub mod issuer;
pub mod issuer_und;
pub mod strategy_type;
pub mod underlying;
pub mod warrant;

use serde::{Deserialize, Serialize};

pub use issuer::IssuerParams;
pub use issuer_und::IssuerUnderlyingParams;
pub use strategy_type::StrategyTypeParams;
pub use underlying::UnderlyingParams;
pub use warrant::{BucketParams, WarrantParams, WarrantParamsValidator, WrtParamWrite};

/// Strategy status broadcast with the warrant tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyStatus {
    Off,
    Active,
    Error,
    StrategyExiting,
    ScoreboardExiting,
    ClosingStrategyExiting,
    PriceCheckExiting,
    ClosingPriceCheckExiting,
    NoCheckExiting,
    SemiManualExiting,
}

/// How the live market-maker spread compares to its sustained minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpreadState {
    Normal,
    Wide,
    /// Position held, bid below entry and mm spread above the spread
    /// recorded at entry.
    TooWide,
}

/// Operator's directional view on the underlying; relaxes or tightens the
/// stop-loss revision rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketOutlook {
    Neutral,
    Bullish,
    Bearish,
}

/// Rejected parameter write.
#[derive(Debug, thiserror::Error)]
pub enum ParamError {
    #[error("validation rejected {field} = {value}")]
    Rejected { field: &'static str, value: i64 },
    #[error("unknown security {0}")]
    UnknownSecurity(u64),
}
