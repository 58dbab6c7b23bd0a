//! Per-issuer parameter tier.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuerParams {
    pub issuer_sid: u32,
    pub active_warrants: i32,
    pub total_warrants: i32,
}

impl IssuerParams {
    pub fn new(issuer_sid: u32) -> Self {
        Self {
            issuer_sid,
            active_warrants: 0,
            total_warrants: 0,
        }
    }
}
