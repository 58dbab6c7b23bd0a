//! Per-underlying parameter tier, shared by every warrant on the
//! underlying.

use serde::{Deserialize, Serialize};

/// Velocity thresholds grade trigger strength; the counters track how many
/// warrants on this underlying are live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnderlyingParams {
    pub underlying_sid: u64,
    /// Signed-notional velocity needed to authorize entry.
    pub velocity_threshold: i64,
    /// Medium-strength grade.
    pub velocity_threshold2: i64,
    /// Strong grade.
    pub velocity_threshold3: i64,
    pub size_threshold: i64,
    pub active_warrants: i32,
    pub total_warrants: i32,
}

impl UnderlyingParams {
    pub fn new(underlying_sid: u64) -> Self {
        Self {
            underlying_sid,
            velocity_threshold: i64::MAX,
            velocity_threshold2: i64::MAX,
            velocity_threshold3: i64::MAX,
            size_threshold: 0,
            active_warrants: 0,
            total_warrants: 0,
        }
    }
}
