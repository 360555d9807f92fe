//! Bellman-Ford Algorithm
//!
//! Step 2.1: The Pathfinder
//!
//! Shortest paths over `-ln(rate)` weights from an anchor currency. A path
//! that keeps getting shorter after |V|-1 passes means a negative cycle,
//! i.e. a chain of conversions whose rates multiply to more than 1.

use std::collections::HashMap;
use tracing::{debug, trace};

use super::reporter::ArbitrageCycle;
use crate::cartographer::{Currency, RateGraph};
use crate::error::EngineError;

/// Default improvement a witness edge must exceed to count as a negative cycle
pub const DEFAULT_TOLERANCE: f64 = 1e-12;

/// Result of one Bellman-Ford run
#[derive(Debug, Clone)]
pub struct ShortestPaths {
    pub start: Currency,
    /// `f64::INFINITY` for currencies not reachable from `start`
    pub dist: HashMap<Currency, f64>,
    pub prev: HashMap<Currency, Option<Currency>>,
    /// An edge that still relaxes beyond tolerance after all passes
    pub negative_cycle: Option<(Currency, Currency)>,
}

impl ShortestPaths {
    pub fn has_negative_cycle(&self) -> bool {
        self.negative_cycle.is_some()
    }

    pub fn distance(&self, currency: Currency) -> f64 {
        self.dist.get(&currency).copied().unwrap_or(f64::INFINITY)
    }

    pub fn predecessor(&self, currency: Currency) -> Option<Currency> {
        self.prev.get(&currency).copied().flatten()
    }
}

/// Bellman-Ford over a borrowed rate graph snapshot
pub struct BellmanFord<'a> {
    graph: &'a RateGraph,
    tolerance: f64,
    relaxation_passes: Option<usize>,
}

impl<'a> BellmanFord<'a> {
    pub fn new(graph: &'a RateGraph) -> Self {
        Self {
            graph,
            tolerance: DEFAULT_TOLERANCE,
            relaxation_passes: None,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Override the number of relaxation passes (`None` = |V|-1)
    pub fn with_relaxation_passes(mut self, passes: Option<usize>) -> Self {
        self.relaxation_passes = passes;
        self
    }

    /// Run from `start`. The start currency must already be in the graph.
    pub fn run(&self, start: Currency) -> Result<ShortestPaths, EngineError> {
        if !self.graph.contains(start) {
            return Err(EngineError::UnknownAnchor(start));
        }

        let mut dist: HashMap<Currency, f64> = HashMap::with_capacity(self.graph.node_count());
        let mut prev: HashMap<Currency, Option<Currency>> =
            HashMap::with_capacity(self.graph.node_count());
        for currency in self.graph.currencies() {
            dist.insert(currency, f64::INFINITY);
            prev.insert(currency, None);
        }
        dist.insert(start, 0.0);

        let passes = self
            .relaxation_passes
            .unwrap_or_else(|| self.graph.node_count().saturating_sub(1));

        for pass in 0..passes {
            let mut changed = false;

            for (from, to, edge) in self.graph.edges() {
                let d_from = dist[&from];
                if d_from == f64::INFINITY {
                    continue;
                }
                let candidate = d_from + edge.weight;
                if candidate < dist[&to] {
                    dist.insert(to, candidate);
                    prev.insert(to, Some(from));
                    changed = true;
                }
            }

            // Converged early, further passes cannot change anything
            if !changed {
                trace!("Bellman-Ford converged after {} passes", pass + 1);
                break;
            }
        }

        let negative_cycle = self.find_witness(&dist);
        if let Some((from, to)) = negative_cycle {
            debug!("Negative cycle witness edge: {} -> {}", from, to);
        }

        Ok(ShortestPaths {
            start,
            dist,
            prev,
            negative_cycle,
        })
    }

    /// One extra pass: any edge that still improves a distance by more than
    /// the tolerance proves a reachable negative cycle.
    fn find_witness(&self, dist: &HashMap<Currency, f64>) -> Option<(Currency, Currency)> {
        for (from, to, edge) in self.graph.edges() {
            let d_from = dist[&from];
            if d_from == f64::INFINITY {
                continue;
            }
            let candidate = d_from + edge.weight;
            let d_to = dist[&to];
            if candidate < d_to && d_to - candidate > self.tolerance {
                return Some((from, to));
            }
        }
        None
    }

    /// Isolate a negative cycle when the predecessor chain of `paths` only
    /// leads into a rounding loop.
    ///
    /// Keeps relaxing from the state `paths` left behind, accepting only
    /// improvements beyond the tolerance. Before `prev[to] = from` is written,
    /// the chain above `from` is searched for `to`; if found, the edge closes
    /// a loop, which is returned once its weight is below `-tolerance`.
    pub fn isolate_cycle(&self, paths: &ShortestPaths) -> Option<ArbitrageCycle> {
        let mut dist = paths.dist.clone();
        let mut prev = paths.prev.clone();
        let limit = self.graph.node_count();

        for _ in 0..2 * limit {
            let mut changed = false;

            for (from, to, edge) in self.graph.edges() {
                let d_from = dist[&from];
                if d_from == f64::INFINITY {
                    continue;
                }
                let candidate = d_from + edge.weight;
                if dist[&to] - candidate <= self.tolerance {
                    continue;
                }

                if let Some(cycle) = closing_walk(&prev, from, to, limit) {
                    let negative = cycle
                        .weight(self.graph)
                        .is_some_and(|w| w < -self.tolerance);
                    if negative && cycle.is_valid() {
                        debug!("Isolated negative cycle {}", cycle);
                        return Some(cycle);
                    }
                }

                dist.insert(to, candidate);
                prev.insert(to, Some(from));
                changed = true;
            }

            if !changed {
                break;
            }
        }

        None
    }
}

/// Loop `to -> .. -> from -> to` if `to` is among the first `limit`
/// predecessors of `from`
fn closing_walk(
    prev: &HashMap<Currency, Option<Currency>>,
    from: Currency,
    to: Currency,
    limit: usize,
) -> Option<ArbitrageCycle> {
    let mut chain = Vec::new();
    let mut current = from;

    for _ in 0..limit {
        chain.push(current);
        if current == to {
            chain.reverse();
            chain.push(to);
            return Some(ArbitrageCycle { path: chain });
        }
        current = prev.get(&current).copied().flatten()?;
    }

    None
}
