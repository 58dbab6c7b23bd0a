//! Entry-authorization triggers and supplementary per-warrant detectors.

pub mod controller;
pub mod delta_limit;
pub mod issuer_lag;
pub mod turnover;
pub mod velocity;

use serde::{Deserialize, Serialize};

pub use controller::{TriggerController, TriggerView};
pub use delta_limit::DeltaLimitGenerator;
pub use issuer_lag::{IssuerLagMonitor, LagSignal};
pub use turnover::TurnoverDetector;
pub use velocity::{TriggerStrength, VelocityTrigger};

/// Which entry-authorization source a warrant subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerKind {
    Velocity5Ms,
    Velocity10Ms,
    AllowAll,
}
