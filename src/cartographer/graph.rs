//! Rate Graph
//!
//! Directed currency graph with `-ln(rate)` edge weights. Every edge carries
//! the timestamp of its last update in the same record, so a weight can never
//! change without its timestamp.

use chrono::{DateTime, Duration, Utc};
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use super::quote::{validate_rate, Currency};
use crate::error::QuoteError;

/// Edge data in the rate graph
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateEdge {
    /// `-ln(rate)` in the direction of the edge
    pub weight: f64,
    /// Origination time of the quote that last wrote this edge
    pub updated_at: DateTime<Utc>,
}

impl RateEdge {
    /// Plain exchange rate for traversing this edge
    pub fn rate(&self) -> f64 {
        (-self.weight).exp()
    }

    /// Age of the edge at `now`
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.updated_at
    }
}

/// The exchange rate graph for one feed session
#[derive(Debug, Clone, Default)]
pub struct RateGraph {
    graph: DiGraphMap<Currency, RateEdge>,
}

impl RateGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraphMap::new(),
        }
    }

    /// Apply a published rate `base -> quote`.
    ///
    /// Writes the forward edge (`-ln(rate)`) and the implied reverse edge
    /// (`+ln(rate)`) with the same timestamp. Invalid rates are rejected
    /// before anything is touched. Sequence checks are the caller's job,
    /// see [`RateGraph::is_out_of_sequence`].
    pub fn apply_update(
        &mut self,
        base: Currency,
        quote: Currency,
        rate: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<(), QuoteError> {
        validate_rate(base, quote, rate)?;

        let log_rate = rate.ln();
        self.graph.add_edge(
            base,
            quote,
            RateEdge {
                weight: -log_rate,
                updated_at: timestamp,
            },
        );
        self.graph.add_edge(
            quote,
            base,
            RateEdge {
                weight: log_rate,
                updated_at: timestamp,
            },
        );

        Ok(())
    }

    /// True iff `base -> quote` already has a newer timestamp than `timestamp`.
    /// A pair that has never been seen is never out of sequence.
    pub fn is_out_of_sequence(
        &self,
        base: Currency,
        quote: Currency,
        timestamp: DateTime<Utc>,
    ) -> bool {
        self.graph
            .edge_weight(base, quote)
            .is_some_and(|edge| timestamp < edge.updated_at)
    }

    /// Directed edges whose age at `now` is at least `stale_after`
    pub fn find_stale_edges(&self, now: DateTime<Utc>, stale_after: Duration) -> Vec<(Currency, Currency)> {
        self.graph
            .all_edges()
            .filter(|(_, _, edge)| edge.age(now) >= stale_after)
            .map(|(from, to, _)| (from, to))
            .collect()
    }

    /// Remove one directed edge. The reverse edge is left alone.
    /// Returns the removed edge, or `None` if it was already gone.
    pub fn evict_edge(&mut self, from: Currency, to: Currency) -> Option<RateEdge> {
        let removed = self.graph.remove_edge(from, to);
        if removed.is_some() {
            debug!("Removed stale quote for ({}, {})", from, to);
        }
        removed
    }

    /// Drop every currency and edge
    pub fn clear(&mut self) {
        self.graph.clear();
    }

    /// True iff no currency has been seen since the last clear
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, currency: Currency) -> bool {
        self.graph.contains_node(currency)
    }

    pub fn edge(&self, from: Currency, to: Currency) -> Option<&RateEdge> {
        self.graph.edge_weight(from, to)
    }

    /// All currencies, in first-seen order
    pub fn currencies(&self) -> impl Iterator<Item = Currency> + '_ {
        self.graph.nodes()
    }

    /// All directed edges, in first-written order
    pub fn edges(&self) -> impl Iterator<Item = (Currency, Currency, &RateEdge)> + '_ {
        self.graph.all_edges()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}
