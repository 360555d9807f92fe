//! Phase 2: The Brain
//!
//! Responsible for:
//! - Finding negative cycles (arbitrage opportunities) using Bellman-Ford
//! - Tracing the cycle and pricing a notional through it

mod bellman_ford;
mod reporter;

pub use bellman_ford::{BellmanFord, ShortestPaths, DEFAULT_TOLERANCE};
pub use reporter::{
    compute_profit, trace_cycle, ArbitrageCycle, OpportunityLog, ProfitLeg, ProfitReport,
};
