//! warrantarb-core — decision core of a warrant market-arbitrage engine.
//!
//! This crate contains the per-security strategy automaton and everything
//! it derives its decisions from:
//! - Domain types (securities, tick tables, book snapshots, intervals)
//! - Underlying and warrant signal generators
//! - The five-state buy/hold/sell automaton with nine exit modes
//! - Entry triggers (velocity windows, allow-all) and risk gates
//! - The bucket-predictor oracle contract and the numeric scale bridge
//! - Four-tier validated parameter model
//!
//! Order placement, live order-book maintenance, greeks computation and
//! parameter persistence are external collaborators consumed through the
//! traits in [`ports`]. Dispatch is single-threaded and tick-driven: all
//! timers are absolute nanosecond deadlines compared against tick
//! timestamps, so a replayed input sequence reproduces the output
//! sequence exactly.

pub mod domain;
pub mod error;
pub mod params;
pub mod ports;
pub mod pricing;
pub mod signal;
pub mod strategy;
pub mod triggers;
pub mod window;

pub use error::StrategyError;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: the externally visible data types are Send.
    /// The dispatch loop itself is single-threaded, but snapshots and
    /// events cross thread boundaries on their way to persistence.
    #[allow(dead_code)]
    fn assert_snapshot_types_send() {
        fn require_send<T: Send>() {}

        require_send::<domain::Security>();
        require_send::<domain::BookSnapshot>();
        require_send::<domain::MarketTrade>();
        require_send::<domain::SpotInterval>();
        require_send::<params::WarrantParams>();
        require_send::<params::UnderlyingParams>();
        require_send::<params::IssuerParams>();
        require_send::<params::IssuerUnderlyingParams>();
        require_send::<params::BucketParams>();
        require_send::<ports::AuditEvent>();
        require_send::<strategy::ExplainRecord>();
    }
}
