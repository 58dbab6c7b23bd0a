//! Per-issuer-underlying parameter tier: the delta-exposure ledger shared
//! by every warrant the issuer lists on one underlying.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuerUnderlyingParams {
    pub issuer_sid: u32,
    pub underlying_sid: u64,
    /// Delta-notional limit; zero disables the gate.
    pub und_trade_vol_threshold: i64,
    /// Net delta shares traded in the rolling window.
    pub und_delta_shares: i64,
    /// Delta shares committed to orders in flight.
    pub pending_und_delta_shares: i64,
    /// Absolute delta notional of the current window.
    pub und_trade_vol: i64,
}

impl IssuerUnderlyingParams {
    pub fn new(issuer_sid: u32, underlying_sid: u64) -> Self {
        Self {
            issuer_sid,
            underlying_sid,
            und_trade_vol_threshold: 0,
            und_delta_shares: 0,
            pending_und_delta_shares: 0,
            und_trade_vol: 0,
        }
    }

    /// Key for the issuer-underlying context map.
    pub fn key(issuer_sid: u32, underlying_sid: u64) -> u64 {
        ((issuer_sid as u64) << 48) | (underlying_sid & 0x0000_FFFF_FFFF_FFFF)
    }
}
