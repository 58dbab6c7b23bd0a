//! Trigger subscription registry.
//!
//! Each warrant subscribes to exactly one entry-authorization source on
//! its underlying: a velocity window or the allow-all pass-through.
//! Re-subscribing with a different type detaches from the old generator
//! first; `reset_all` clears the accumulated state of every generator type
//! for an underlying.

use std::collections::HashMap;

use tracing::debug;

use super::velocity::{TriggerStrength, VelocityTrigger};
use super::TriggerKind;
use crate::domain::OptionSide;
use crate::params::UnderlyingParams;

#[derive(Debug, Default)]
pub struct TriggerController {
    subscriptions: HashMap<u64, TriggerKind>,
}

impl TriggerController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a warrant to a trigger type, detaching from the previous one
    /// when the type changes.
    pub fn subscribe(&mut self, warrant_sid: u64, code: &str, kind: TriggerKind) {
        match self.subscriptions.insert(warrant_sid, kind) {
            Some(previous) if previous != kind => {
                debug!(code, ?previous, ?kind, "trigger subscription switched");
            }
            None => {
                debug!(code, ?kind, "trigger subscribed");
            }
            _ => {}
        }
    }

    pub fn kind_for(&self, warrant_sid: u64) -> TriggerKind {
        self.subscriptions
            .get(&warrant_sid)
            .copied()
            .unwrap_or(TriggerKind::AllowAll)
    }

    /// Clear accumulated state in every generator type for one underlying.
    pub fn reset_all(vel_5ms: &mut VelocityTrigger, vel_10ms: &mut VelocityTrigger) {
        vel_5ms.reset();
        vel_10ms.reset();
    }
}

/// Read view over the subscribed generator, resolved per dispatch.
#[derive(Clone, Copy)]
pub enum TriggerView<'a> {
    Velocity(&'a VelocityTrigger),
    AllowAll,
}

impl TriggerView<'_> {
    pub fn is_triggered(&self, side: OptionSide, params: &UnderlyingParams) -> bool {
        match self {
            TriggerView::Velocity(v) => v.is_triggered(side, params),
            TriggerView::AllowAll => true,
        }
    }

    pub fn strength(&self, side: OptionSide, params: &UnderlyingParams) -> TriggerStrength {
        match self {
            TriggerView::Velocity(v) => v.strength(side, params),
            TriggerView::AllowAll => TriggerStrength::Strong,
        }
    }

    /// Value recorded in the explain snapshot.
    pub fn explain_value(&self) -> i64 {
        match self {
            TriggerView::Velocity(v) => v.velocity(),
            TriggerView::AllowAll => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsubscribed_warrants_default_to_allow_all() {
        let controller = TriggerController::new();
        assert_eq!(controller.kind_for(42), TriggerKind::AllowAll);
    }

    #[test]
    fn resubscription_replaces_the_generator() {
        let mut controller = TriggerController::new();
        controller.subscribe(1, "18888", TriggerKind::Velocity5Ms);
        assert_eq!(controller.kind_for(1), TriggerKind::Velocity5Ms);
        controller.subscribe(1, "18888", TriggerKind::Velocity10Ms);
        assert_eq!(controller.kind_for(1), TriggerKind::Velocity10Ms);
    }

    #[test]
    fn allow_all_always_authorizes() {
        let view = TriggerView::AllowAll;
        let params = UnderlyingParams::new(2);
        assert!(view.is_triggered(OptionSide::Call, &params));
        assert!(view.is_triggered(OptionSide::Put, &params));
        assert_eq!(view.explain_value(), 0);
    }
}
