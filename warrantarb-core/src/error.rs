//! Crate-level errors.
//!
//! Almost everything in the core degrades to "no action this tick" rather
//! than erroring; the exceptions below are genuine operator mistakes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StrategyError {
    /// Switching on over an existing position requires a known enter
    /// price; without one the automaton lands in the Error exit mode.
    #[error("cannot switch on {code}: position held with no known enter price")]
    MissingEnterPrice { code: String },
}
