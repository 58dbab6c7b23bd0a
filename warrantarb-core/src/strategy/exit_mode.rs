//! Exit modes: the mutually exclusive liquidation policies.
//!
//! Modes are ordered by priority; once an exit mode is active, a
//! lower-or-equal-priority request cannot replace it (the normal trading
//! mode is always replaceable). Each mode decides how aggressively a held
//! position is unwound, whether the stop loss may still be revised and
//! which transition an order acknowledgement maps to.

use serde::{Deserialize, Serialize};

use crate::params::StrategyStatus;

/// State-machine transitions. The automaton resolves events to one of
/// these; unmapped pairs are explicit no-transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    BuyPosition,
    SellPosition,
    ProfitRun,
    OrderFilled,
    OrderNotFilled,
    EnterWithPosition,
    EnterWithoutPosition,
    ExitStrategy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitMode {
    /// Default trading mode; not an exit.
    Normal,
    NoExit,
    StrategyExit,
    PriceCheckExit,
    NoCheckExit,
    SemiManualExit,
    ClosingStrategyExit,
    ClosingPriceCheckExit,
    ScoreboardExit,
    /// Unconditional liquidation; blocks entries until explicitly reset.
    Error,
}

impl ExitMode {
    /// Priority rank; a new mode replaces the active one only with a
    /// strictly higher rank (Normal is always replaceable).
    pub fn rank(self) -> i32 {
        match self {
            ExitMode::Normal => 0,
            ExitMode::NoExit => 1,
            ExitMode::StrategyExit
            | ExitMode::PriceCheckExit
            | ExitMode::NoCheckExit
            | ExitMode::SemiManualExit => 2,
            ExitMode::ClosingStrategyExit | ExitMode::ClosingPriceCheckExit => 3,
            ExitMode::ScoreboardExit => 4,
            ExitMode::Error => 5,
        }
    }

    /// Whether a switch-off request in this mode may replace `self`.
    pub fn can_be_replaced_by(self, new_mode: ExitMode, is_on: bool) -> bool {
        let available = match self {
            ExitMode::Normal | ExitMode::Error => true,
            _ => is_on,
        };
        available && (self == ExitMode::Normal || new_mode.rank() > self.rank())
    }

    pub fn default_status(self) -> StrategyStatus {
        match self {
            ExitMode::Normal | ExitMode::NoExit => StrategyStatus::Active,
            ExitMode::StrategyExit => StrategyStatus::StrategyExiting,
            ExitMode::PriceCheckExit => StrategyStatus::PriceCheckExiting,
            ExitMode::NoCheckExit => StrategyStatus::NoCheckExiting,
            ExitMode::SemiManualExit => StrategyStatus::SemiManualExiting,
            ExitMode::ClosingStrategyExit => StrategyStatus::ClosingStrategyExiting,
            ExitMode::ClosingPriceCheckExit => StrategyStatus::ClosingPriceCheckExiting,
            ExitMode::ScoreboardExit => StrategyStatus::ScoreboardExiting,
            ExitMode::Error => StrategyStatus::Error,
        }
    }

    /// Exit modes turn the strategy off once the position unwinds.
    pub fn off_when_exit_position(self) -> bool {
        self != ExitMode::Normal
    }

    /// Closing modes force liquidation whenever the exit level is hit.
    pub fn sell_on_hit_exit_level(self) -> bool {
        matches!(
            self,
            ExitMode::ClosingStrategyExit | ExitMode::ClosingPriceCheckExit
        )
    }

    pub fn can_revise_stop_loss(self) -> bool {
        self != ExitMode::SemiManualExit
    }

    pub fn on_position_bought(self) -> Transition {
        match self {
            ExitMode::Error | ExitMode::NoExit => Transition::ExitStrategy,
            _ => Transition::OrderFilled,
        }
    }

    pub fn on_position_not_bought(self) -> Transition {
        match self {
            ExitMode::Normal => Transition::OrderNotFilled,
            _ => Transition::ExitStrategy,
        }
    }

    pub fn on_position_fully_sold(self) -> Transition {
        match self {
            ExitMode::Normal => Transition::OrderFilled,
            _ => Transition::ExitStrategy,
        }
    }

    pub fn on_position_not_fully_sold(self) -> Transition {
        match self {
            ExitMode::Error | ExitMode::NoExit => Transition::ExitStrategy,
            _ => Transition::OrderNotFilled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_is_always_replaceable() {
        assert!(ExitMode::Normal.can_be_replaced_by(ExitMode::StrategyExit, true));
        assert!(ExitMode::Normal.can_be_replaced_by(ExitMode::Error, false));
    }

    #[test]
    fn lower_or_equal_priority_cannot_preempt() {
        assert!(!ExitMode::ScoreboardExit.can_be_replaced_by(ExitMode::StrategyExit, true));
        assert!(!ExitMode::StrategyExit.can_be_replaced_by(ExitMode::SemiManualExit, true));
        assert!(ExitMode::StrategyExit.can_be_replaced_by(ExitMode::ScoreboardExit, true));
        assert!(ExitMode::ScoreboardExit.can_be_replaced_by(ExitMode::Error, true));
        assert!(!ExitMode::Error.can_be_replaced_by(ExitMode::ScoreboardExit, true));
    }

    #[test]
    fn error_and_normal_stay_available_when_off() {
        assert!(!ExitMode::Error.can_be_replaced_by(ExitMode::Error, false));
        assert!(!ExitMode::StrategyExit.can_be_replaced_by(ExitMode::ScoreboardExit, false));
        assert!(ExitMode::Normal.can_be_replaced_by(ExitMode::NoExit, false));
    }

    #[test]
    fn only_closing_modes_sell_on_exit_level() {
        assert!(ExitMode::ClosingStrategyExit.sell_on_hit_exit_level());
        assert!(ExitMode::ClosingPriceCheckExit.sell_on_hit_exit_level());
        assert!(!ExitMode::StrategyExit.sell_on_hit_exit_level());
        assert!(!ExitMode::Normal.sell_on_hit_exit_level());
    }

    #[test]
    fn semi_manual_freezes_the_stop_loss() {
        assert!(!ExitMode::SemiManualExit.can_revise_stop_loss());
        assert!(ExitMode::StrategyExit.can_revise_stop_loss());
    }
}
