//! Phase 1: The Cartographer (Data Ingest)
//!
//! Currencies, quote events and the live rate graph they are applied to.

mod graph;
mod quote;

pub use graph::{RateEdge, RateGraph};
pub use quote::{Currency, QuoteEvent};
