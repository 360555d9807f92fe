//! Triangulator - currency arbitrage detection on a streaming quote feed
//!
//! Quotes come in through [`feed`], land in the [`cartographer::RateGraph`]
//! of the current [`session::ArbitrageSession`], and the [`brain`] looks for
//! negative cycles in `-ln(rate)` space and prices them.

pub mod brain;
pub mod cartographer;
pub mod config;
pub mod error;
pub mod feed;
pub mod session;

pub use config::{Config, DetectorSettings};
pub use session::{ArbitrageSession, IngestOutcome, Opportunity, SessionStats};
