//! External collaborator interfaces: order placement, parameter/event
//! broadcast, and deadline scheduling.
//!
//! All calls are fire-and-forget on the dispatch thread; implementations
//! must not block.

use serde::{Deserialize, Serialize};

use crate::domain::Security;
use crate::params::{
    BucketParams, IssuerParams, IssuerUnderlyingParams, UnderlyingParams, WarrantParams,
};
use crate::strategy::ExplainRecord;

/// Classified order-reject reasons. Rejects map to local remediation,
/// never to a propagated error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderRejectKind {
    None,
    Throttled,
    TimeoutBeforeThrottle,
    TimeoutAfterThrottle,
    ExceedUnderlyingThrottle,
    InsufficientPosition,
    Other,
}

impl OrderRejectKind {
    /// Throttle-family rejects arm a short retry ban instead of the generic
    /// one.
    pub fn is_throttle(self) -> bool {
        matches!(
            self,
            OrderRejectKind::Throttled
                | OrderRejectKind::TimeoutBeforeThrottle
                | OrderRejectKind::TimeoutAfterThrottle
                | OrderRejectKind::ExceedUnderlyingThrottle
        )
    }
}

/// Order placement service. Must not block; acknowledgements come back
/// through the order-status dispatch entry point.
pub trait OrderService {
    fn can_trade(&self) -> bool;
    fn buy(&mut self, security: &Security, price: i32, qty: i64, explain: &ExplainRecord);
    fn sell(&mut self, security: &Security, price: i32, qty: i64, explain: &ExplainRecord);
    fn sell_to_exit(&mut self, security: &Security, price: i32, qty: i64, explain: &ExplainRecord);
    fn sell_limit(&mut self, security: &Security, price: i32, qty: i64, explain: &ExplainRecord);
    /// Cancel the outstanding sell and re-sell its quantity at `price`.
    fn cancel_and_sell_outstanding_sell(
        &mut self,
        security: &Security,
        price: i32,
        explain: &ExplainRecord,
    );
}

/// Urgency class of a parameter broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastKind {
    Immediate,
    Throttled,
    Batched,
    /// Batched and durably persisted.
    BatchedPersist,
}

/// Discrete audit events forwarded to the surveillance stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEventKind {
    VolDownSignal,
    VolUpSignal,
    TurnoverMakingSignal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditValueKind {
    HasPosition,
    TurnoverPrice,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AuditEvent {
    pub kind: AuditEventKind,
    pub security_sid: u64,
    pub nano_of_day: i64,
    pub value_kind: AuditValueKind,
    pub value: i64,
}

/// Parameter-snapshot and audit-event broadcast.
pub trait InfoSender {
    fn warrant_params(&mut self, params: &WarrantParams, kind: BroadcastKind);
    fn underlying_params(&mut self, params: &UnderlyingParams, kind: BroadcastKind);
    fn issuer_params(&mut self, params: &IssuerParams, kind: BroadcastKind);
    fn issuer_und_params(&mut self, params: &IssuerUnderlyingParams, kind: BroadcastKind);
    fn bucket_params(&mut self, params: &BucketParams, kind: BroadcastKind);
    fn send_event(&mut self, event: AuditEvent);
}

/// Timeout classes scheduled by the issuer-lag monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleKind {
    IssuerInitialResponse,
    IssuerFullResponse,
}

/// Absolute-deadline task scheduling. Deadlines are nanoseconds-of-day on
/// the same clock as tick timestamps; the driver feeds expiries back
/// through `StrategyContext::on_timeout`.
pub trait Scheduler {
    /// Returns false when the task cannot be scheduled; the caller then
    /// simply skips the measurement.
    fn schedule(&mut self, warrant_sid: u64, kind: ScheduleKind, deadline_ns: i64) -> bool;
}
