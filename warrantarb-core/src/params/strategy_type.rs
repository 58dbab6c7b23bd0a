//! Strategy-type-level parameters: one instance per strategy scheduler.

use serde::{Deserialize, Serialize};

use crate::strategy::ExitMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyTypeParams {
    pub strategy_id: u64,
    /// Exit mode used by a plain `switch_off()` with no explicit mode.
    pub exit_mode: ExitMode,
}

impl StrategyTypeParams {
    pub fn new(strategy_id: u64) -> Self {
        Self {
            strategy_id,
            exit_mode: ExitMode::Normal,
        }
    }
}
