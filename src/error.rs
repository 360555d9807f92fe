//! Error types for the detector core and the feed decoder.
//!
//! Nothing in here is fatal to the process: rejected quotes and malformed
//! records are logged and skipped, and an unknown anchor only skips one
//! evaluation.

use thiserror::Error;

use crate::cartographer::Currency;

/// A quote that must not reach the graph
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuoteError {
    #[error("invalid rate {rate} for {base}/{quote}: must be finite and > 0")]
    InvalidRate {
        base: Currency,
        quote: Currency,
        rate: f64,
    },
    #[error("quote {0}/{0} has the same base and quote currency")]
    SameCurrency(Currency),
    #[error("invalid currency code {0:?}: expected 3 ASCII characters")]
    InvalidCurrency(String),
}

/// Reasons the shortest-path engine cannot run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("anchor currency {0} is not in the graph")]
    UnknownAnchor(Currency),
}

/// Wire record decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("short record: {0} bytes, expected {expected}", expected = crate::feed::RECORD_SIZE)]
    ShortRecord(usize),
    #[error("currency bytes are not a valid code: {0}")]
    InvalidCurrency(String),
    #[error("timestamp {0}us is out of range")]
    InvalidTimestamp(u64),
}
