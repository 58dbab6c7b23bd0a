//! Strategy facade: the lifecycle surface exposed to the outside world.
//!
//! One facade per warrant. Construction wires the warrant's runtime into
//! the shared context (idempotently) and installs the side-aware
//! parameter validator; thereafter the facade forwards lifecycle commands.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::info;

use super::context::StrategyContext;
use super::exit_mode::ExitMode;
use crate::domain::{OptionSide, Security};
use crate::error::StrategyError;
use crate::params::warrant::validate_common;
use crate::params::{StrategyStatus, WarrantParams, WarrantParamsValidator, WrtParamWrite};

/// Stop-loss writes must stay on the adverse side of the live spot; the
/// rule flips with the option side. Everything else shares the common
/// range rules.
pub struct SideValidator {
    side: OptionSide,
}

impl SideValidator {
    pub fn new(side: OptionSide) -> Self {
        Self { side }
    }
}

impl WarrantParamsValidator for SideValidator {
    fn validate(&self, params: &WarrantParams, write: &WrtParamWrite, spot: i64) -> bool {
        if !validate_common(params, write) {
            return false;
        }
        match (self.side, write) {
            (OptionSide::Put, WrtParamWrite::StopLoss(v)) => *v >= spot || *v == 0,
            (_, WrtParamWrite::StopLoss(v)) => *v <= spot,
            (OptionSide::Put, WrtParamWrite::StopLossTrigger(v)) => *v < spot,
            (_, WrtParamWrite::StopLossTrigger(v)) => *v > spot,
            _ => true,
        }
    }
}

pub struct Strategy {
    strategy_sid: u64,
    warrant_sid: u64,
    code: String,
    context: Rc<RefCell<StrategyContext>>,
    pending_switch_on: bool,
}

impl Strategy {
    pub fn of(
        context: Rc<RefCell<StrategyContext>>,
        warrant: Rc<Security>,
        underlying: Rc<Security>,
        strategy_sid: u64,
    ) -> Self {
        let warrant_sid = warrant.sid;
        let code = warrant.code.clone();
        {
            let mut ctx = context.borrow_mut();
            ctx.initialize_context(warrant.clone(), underlying);
            ctx.install_validator(warrant_sid, Box::new(SideValidator::new(warrant.side)));
        }
        Self {
            strategy_sid,
            warrant_sid,
            code,
            context,
            pending_switch_on: false,
        }
    }

    pub fn strategy_sid(&self) -> u64 {
        self.strategy_sid
    }

    pub fn warrant_sid(&self) -> u64 {
        self.warrant_sid
    }

    /// Log the initial parameter snapshot and start the underlying
    /// generator, warrant generator and signal handler, in that order.
    pub fn start(&self) {
        self.context.borrow_mut().start_strategy(self.warrant_sid);
    }

    pub fn reset(&self) {
        self.context.borrow_mut().reset_strategy(self.warrant_sid);
    }

    pub fn switch_on(&mut self) -> Result<(), StrategyError> {
        let result = self.context.borrow_mut().switch_on(self.warrant_sid);
        self.pending_switch_on = false;
        result
    }

    /// Switch off with the strategy-type default exit mode.
    pub fn switch_off(&mut self) {
        let exit_mode = self.context.borrow().strategy_params().exit_mode;
        self.switch_off_with(exit_mode);
    }

    pub fn switch_off_with(&mut self, exit_mode: ExitMode) {
        self.context
            .borrow_mut()
            .switch_off(self.warrant_sid, exit_mode);
        self.cancel_switch_on();
    }

    pub fn pending_switch_on(&mut self) {
        self.pending_switch_on = true;
        info!(code = %self.code, "pending switch on");
    }

    pub fn cancel_switch_on(&mut self) {
        if self.pending_switch_on {
            self.pending_switch_on = false;
            info!(code = %self.code, "canceled pending switch on");
        }
    }

    pub fn proceed_switch_on(&mut self) -> Result<(), StrategyError> {
        if self.pending_switch_on {
            self.switch_on()
        } else {
            info!(code = %self.code, "no pending switch on to proceed");
            Ok(())
        }
    }

    pub fn capture_profit(&self) {
        self.context.borrow_mut().capture_profit(self.warrant_sid);
    }

    pub fn place_sell_order(&self) {
        self.context.borrow_mut().place_sell_order(self.warrant_sid);
    }

    pub fn is_on(&self) -> bool {
        self.context.borrow().is_on(self.warrant_sid)
    }

    pub fn status(&self) -> StrategyStatus {
        self.context
            .borrow()
            .warrant_params(self.warrant_sid)
            .map(|p| p.status)
            .unwrap_or(StrategyStatus::Off)
    }
}
