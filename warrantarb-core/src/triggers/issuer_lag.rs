//! Issuer response-lag monitor.
//!
//! Measures how quickly the issuer's market-making engine reacts after an
//! entry trigger: the *initial response* (first mm ask lift after the
//! trigger) and the *full response* (spread back at target). Its own small
//! state machine rides on mm book updates; stale timeouts are ignored by
//! validating schedule kind and deadline.

use tracing::debug;

use crate::domain::MIN_TICK_LEVEL;
use crate::ports::{ScheduleKind, Scheduler};

const INITIAL_RESPONSE_TIMEOUT: i64 = 10_000_000_000;
const FULL_RESPONSE_TIMEOUT: i64 = 3_600_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LagState {
    Error,
    TightSpread,
    WaitingAskUp,
    WaitingTightSpread,
}

/// Measurement produced by one mm book update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LagSignal {
    /// Initial issuer response observed; value is the response lag in ns.
    LagUpdated(i64),
    /// Full response observed; value is the time spent in wide spread.
    SmoothingUpdated(i64),
}

#[derive(Debug)]
pub struct IssuerLagMonitor {
    warrant_sid: u64,
    code: String,
    state: LagState,

    nano_of_day: i64,
    mm_bid_level: i32,
    mm_ask_level: i32,
    prev_mm_ask_level: i32,
    target_spread: i32,
    is_tight: bool,

    trigger_ns: i64,
    trigger_target_spread: i32,
    initial_response_ns: i64,
    scheduled_kind: Option<ScheduleKind>,
    scheduled_ns: i64,

    num_triggers: u32,
    num_responses: u32,
    total_response_ns: i64,
    num_full_responses: u32,
    total_wide_spread_ns: i64,
}

impl IssuerLagMonitor {
    pub fn new(warrant_sid: u64, code: impl Into<String>) -> Self {
        Self {
            warrant_sid,
            code: code.into(),
            state: LagState::Error,
            nano_of_day: 0,
            mm_bid_level: 0,
            mm_ask_level: 0,
            prev_mm_ask_level: 0,
            target_spread: i32::MAX,
            is_tight: false,
            trigger_ns: 0,
            trigger_target_spread: i32::MAX,
            initial_response_ns: 0,
            scheduled_kind: None,
            scheduled_ns: -1,
            num_triggers: 0,
            num_responses: 0,
            total_response_ns: 0,
            num_full_responses: 0,
            total_wide_spread_ns: 0,
        }
    }

    /// Observe the market-maker book state. Returns a measurement when one
    /// completes on this update.
    pub fn on_mm_book_updated(
        &mut self,
        scheduler: &mut dyn Scheduler,
        nano_of_day: i64,
        mm_bid_level: i32,
        mm_ask_level: i32,
        target_spread: i32,
        is_tight: bool,
    ) -> Option<LagSignal> {
        self.nano_of_day = nano_of_day;
        self.mm_bid_level = mm_bid_level;
        self.mm_ask_level = mm_ask_level;
        self.target_spread = target_spread;
        self.is_tight = is_tight;

        let signal = match self.state {
            LagState::Error | LagState::TightSpread => {
                self.state = self.state_by_spread();
                None
            }
            LagState::WaitingAskUp => {
                if self.prev_mm_ask_level >= MIN_TICK_LEVEL
                    && (self.mm_ask_level == 0 || self.mm_ask_level > self.prev_mm_ask_level)
                {
                    self.initial_response_ns = nano_of_day;
                    let lag = nano_of_day - self.trigger_ns;
                    self.num_responses += 1;
                    self.total_response_ns += lag;
                    debug!(code = %self.code, lag, "initial issuer response");
                    if self.schedule(scheduler, ScheduleKind::IssuerFullResponse, FULL_RESPONSE_TIMEOUT)
                    {
                        self.state = LagState::WaitingTightSpread;
                    } else {
                        // Could not arm the timer; skip measuring the full
                        // response this round.
                        self.state = self.state_by_spread();
                    }
                    Some(LagSignal::LagUpdated(lag))
                } else {
                    None
                }
            }
            LagState::WaitingTightSpread => {
                if self.target_spread == self.trigger_target_spread {
                    if self.is_tight {
                        let wide_ns = nano_of_day - self.initial_response_ns;
                        self.num_full_responses += 1;
                        self.total_wide_spread_ns += wide_ns;
                        debug!(code = %self.code, wide_ns, "full issuer response");
                        self.cancel_timeout();
                        self.state = LagState::TightSpread;
                        Some(LagSignal::SmoothingUpdated(wide_ns))
                    } else {
                        None
                    }
                } else {
                    debug!(code = %self.code, "target spread moved while waiting for tight spread");
                    self.cancel_timeout();
                    self.state = self.state_by_spread();
                    None
                }
            }
        };
        self.prev_mm_ask_level = self.mm_ask_level;
        signal
    }

    /// Entry trigger fired; start the response-lag clock.
    pub fn on_trigger_up(&mut self, scheduler: &mut dyn Scheduler, nano_of_day: i64) {
        self.nano_of_day = nano_of_day;
        if matches!(self.state, LagState::Error | LagState::TightSpread) {
            self.trigger_ns = nano_of_day;
            self.trigger_target_spread = self.target_spread;
            if self.schedule(scheduler, ScheduleKind::IssuerInitialResponse, INITIAL_RESPONSE_TIMEOUT)
            {
                self.num_triggers += 1;
                self.state = LagState::WaitingAskUp;
            }
        }
    }

    /// Scheduler callback. Stale expiries (kind or deadline mismatch) are
    /// ignored.
    pub fn on_timeout(&mut self, kind: ScheduleKind, scheduled_ns: i64) {
        if self.scheduled_kind != Some(kind) || self.scheduled_ns != scheduled_ns {
            return;
        }
        match self.state {
            LagState::WaitingAskUp => {
                debug!(code = %self.code, "timed out waiting for ask up");
                self.state = LagState::Error;
            }
            LagState::WaitingTightSpread => {
                debug!(code = %self.code, "timed out waiting for tight spread");
                self.state = LagState::Error;
            }
            _ => {}
        }
    }

    fn state_by_spread(&self) -> LagState {
        if self.mm_bid_level >= MIN_TICK_LEVEL && self.mm_ask_level >= self.mm_bid_level {
            if self.is_tight {
                LagState::TightSpread
            } else {
                LagState::Error
            }
        } else {
            LagState::Error
        }
    }

    fn schedule(
        &mut self,
        scheduler: &mut dyn Scheduler,
        kind: ScheduleKind,
        timeout_ns: i64,
    ) -> bool {
        self.scheduled_kind = Some(kind);
        self.scheduled_ns = self.nano_of_day + timeout_ns;
        scheduler.schedule(self.warrant_sid, kind, self.scheduled_ns)
    }

    fn cancel_timeout(&mut self) {
        self.scheduled_kind = None;
        self.scheduled_ns = -1;
    }

    pub fn print_stats(&self) {
        tracing::info!(
            code = %self.code,
            triggers = self.num_triggers,
            responses = self.num_responses,
            total_response_ns = self.total_response_ns,
            full_responses = self.num_full_responses,
            total_wide_spread_ns = self.total_wide_spread_ns,
            "issuer response time statistics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopScheduler(bool);
    impl Scheduler for NoopScheduler {
        fn schedule(&mut self, _sid: u64, _kind: ScheduleKind, _deadline: i64) -> bool {
            self.0
        }
    }

    #[test]
    fn measures_initial_and_full_response() {
        let mut sched = NoopScheduler(true);
        let mut lag = IssuerLagMonitor::new(1, "18888");
        // Tight book at target spread.
        lag.on_mm_book_updated(&mut sched, 0, 10, 11, 1, true);
        lag.on_trigger_up(&mut sched, 1_000_000);
        // Ask lifts one level: initial response.
        let signal = lag.on_mm_book_updated(&mut sched, 3_000_000, 10, 12, 1, false);
        assert_eq!(signal, Some(LagSignal::LagUpdated(2_000_000)));
        // Spread returns to target: full response.
        let signal = lag.on_mm_book_updated(&mut sched, 9_000_000, 11, 12, 1, true);
        assert_eq!(signal, Some(LagSignal::SmoothingUpdated(6_000_000)));
    }

    #[test]
    fn stale_timeout_is_ignored() {
        let mut sched = NoopScheduler(true);
        let mut lag = IssuerLagMonitor::new(1, "18888");
        lag.on_mm_book_updated(&mut sched, 0, 10, 11, 1, true);
        lag.on_trigger_up(&mut sched, 1_000_000);
        // Wrong deadline: no transition.
        lag.on_timeout(ScheduleKind::IssuerInitialResponse, 42);
        let signal = lag.on_mm_book_updated(&mut sched, 2_000_000, 10, 12, 1, false);
        assert!(matches!(signal, Some(LagSignal::LagUpdated(_))));
    }

    #[test]
    fn unschedulable_trigger_is_discarded() {
        let mut sched = NoopScheduler(false);
        let mut lag = IssuerLagMonitor::new(1, "18888");
        lag.on_mm_book_updated(&mut sched, 0, 10, 11, 1, true);
        lag.on_trigger_up(&mut sched, 1_000_000);
        // Still in tight state: an ask lift is not treated as a response.
        let signal = lag.on_mm_book_updated(&mut sched, 2_000_000, 10, 12, 1, false);
        assert!(signal.is_none());
    }
}
