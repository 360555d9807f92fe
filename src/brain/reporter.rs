//! Cycle Reporter
//!
//! Step 2.2: The Accountant
//!
//! Turns a negative-cycle witness into the currency loop it belongs to and
//! walks a notional amount through that loop at the quoted rates.

use chrono::{DateTime, Utc};
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::debug;

use crate::cartographer::{Currency, RateGraph};

/// A closed walk of currencies, `path[0] == path[last]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbitrageCycle {
    pub path: Vec<Currency>,
}

impl ArbitrageCycle {
    /// Currency the walk starts and ends in
    pub fn start(&self) -> Option<Currency> {
        self.path.first().copied()
    }

    pub fn hop_count(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    /// Consecutive `(from, to)` conversions
    pub fn legs(&self) -> impl Iterator<Item = (Currency, Currency)> + '_ {
        self.path.windows(2).map(|w| (w[0], w[1]))
    }

    pub fn contains(&self, currency: Currency) -> bool {
        self.path.contains(&currency)
    }

    /// Closed, at least two distinct hops, no currency visited twice
    pub fn is_valid(&self) -> bool {
        if self.path.len() < 3 {
            return false;
        }
        if self.path.first() != self.path.last() {
            return false;
        }
        let body = &self.path[..self.path.len() - 1];
        let unique: HashSet<_> = body.iter().collect();
        unique.len() == body.len()
    }

    /// Summed `-ln(rate)` of the legs at the graph's current edges; below
    /// zero for a profitable loop. `None` if a leg has no edge.
    pub fn weight(&self, graph: &RateGraph) -> Option<f64> {
        self.legs()
            .try_fold(0.0, |acc, (from, to)| graph.edge(from, to).map(|e| acc + e.weight))
    }

    /// Same loop, entered at `currency`. Unchanged if `currency` is not on it.
    pub fn rotated_to(&self, currency: Currency) -> Self {
        if self.path.len() < 2 {
            return self.clone();
        }
        let body = &self.path[..self.path.len() - 1];
        match body.iter().position(|c| *c == currency) {
            Some(0) | None => self.clone(),
            Some(idx) => {
                let mut path = Vec::with_capacity(self.path.len());
                path.extend_from_slice(&body[idx..]);
                path.extend_from_slice(&body[..idx]);
                path.push(currency);
                Self { path }
            }
        }
    }
}

impl fmt::Display for ArbitrageCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = self.path.iter().map(|c| c.as_str()).collect();
        f.write_str(&parts.join(" → "))
    }
}

/// Recover the cycle behind a witness edge.
///
/// Applies the witness relaxation (`prev[to] = from`), then follows `prev`
/// back from `to` until a currency repeats; the repeated stretch, reversed,
/// is the cycle. Returns `None` if the chain reaches a root instead.
pub fn trace_cycle(
    prev: &HashMap<Currency, Option<Currency>>,
    witness: (Currency, Currency),
) -> Option<ArbitrageCycle> {
    let (witness_from, witness_to) = witness;
    let predecessor = |currency: Currency| -> Option<Currency> {
        if currency == witness_to {
            Some(witness_from)
        } else {
            prev.get(&currency).copied().flatten()
        }
    };

    let mut seen_at: HashMap<Currency, usize> = HashMap::new();
    let mut walk: Vec<Currency> = Vec::new();
    let mut current = witness_to;

    loop {
        if let Some(&idx) = seen_at.get(&current) {
            let mut path = walk.split_off(idx);
            path.reverse();
            path.push(path[0]);
            return Some(ArbitrageCycle { path });
        }
        seen_at.insert(current, walk.len());
        walk.push(current);

        match predecessor(current) {
            Some(next) => current = next,
            None => {
                debug!(
                    "Predecessor chain from {} ended at {} without closing a cycle",
                    witness_to, current
                );
                return None;
            }
        }
    }
}

/// One conversion of the notional
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfitLeg {
    pub from: Currency,
    pub to: Currency,
    pub rate: f64,
    /// Amount held in `to` after this leg
    pub notional: f64,
}

/// A notional walked once around a cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitReport {
    pub start: Currency,
    pub initial_notional: f64,
    pub legs: Vec<ProfitLeg>,
    pub final_notional: f64,
}

impl ProfitReport {
    /// `final / initial - 1`
    pub fn margin(&self) -> f64 {
        self.final_notional / self.initial_notional - 1.0
    }

    pub fn profit_percentage(&self) -> f64 {
        self.margin() * 100.0
    }

    /// True iff the margin clears `tolerance`
    pub fn is_profitable(&self, tolerance: f64) -> bool {
        self.margin() > tolerance
    }
}

/// Multiply `initial_notional` through every leg of `cycle` at the graph's
/// current rates. `None` if the cycle is empty or a leg has no edge.
pub fn compute_profit(
    graph: &RateGraph,
    cycle: &ArbitrageCycle,
    initial_notional: f64,
) -> Option<ProfitReport> {
    let start = cycle.start()?;
    let mut notional = initial_notional;
    let mut legs = Vec::with_capacity(cycle.hop_count());

    for (from, to) in cycle.legs() {
        let rate = graph.edge(from, to)?.rate();
        notional *= rate;
        legs.push(ProfitLeg {
            from,
            to,
            rate,
            notional,
        });
    }

    if legs.is_empty() {
        return None;
    }

    Some(ProfitReport {
        start,
        initial_notional,
        legs,
        final_notional: notional,
    })
}

// ============================================
// OPPORTUNITY LOGGER
// ============================================

/// One detected opportunity, as written to the opportunity log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpportunityLog {
    pub timestamp: DateTime<Utc>,
    pub path: Vec<Currency>,
    pub legs: Vec<ProfitLeg>,
    pub initial_notional: f64,
    pub final_notional: f64,
    pub margin_pct: f64,
}

impl OpportunityLog {
    pub fn new(timestamp: DateTime<Utc>, cycle: &ArbitrageCycle, report: &ProfitReport) -> Self {
        Self {
            timestamp,
            path: cycle.path.clone(),
            legs: report.legs.clone(),
            initial_notional: report.initial_notional,
            final_notional: report.final_notional,
            margin_pct: report.profit_percentage(),
        }
    }

    /// Append this log to a file as one JSON line
    pub fn append_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        let json = serde_json::to_string(self)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::{BellmanFord, DEFAULT_TOLERANCE};
    use chrono::TimeZone;

    fn ccy(code: &str) -> Currency {
        code.parse().unwrap()
    }

    fn cycle(codes: &[&str]) -> ArbitrageCycle {
        ArbitrageCycle {
            path: codes.iter().map(|c| ccy(c)).collect(),
        }
    }

    fn graph_from(quotes: &[(&str, &str, f64)]) -> RateGraph {
        let ts = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut graph = RateGraph::new();
        for &(base, quote, rate) in quotes {
            graph.apply_update(ccy(base), ccy(quote), rate, ts).unwrap();
        }
        graph
    }

    #[test]
    fn test_cycle_validation() {
        assert!(cycle(&["USD", "EUR", "GBP", "USD"]).is_valid());
        assert!(cycle(&["USD", "EUR", "USD"]).is_valid());

        // Not closed
        assert!(!cycle(&["USD", "EUR", "GBP"]).is_valid());
        // Visits EUR twice
        assert!(!cycle(&["USD", "EUR", "GBP", "EUR", "USD"]).is_valid());
        assert!(!cycle(&["USD", "USD"]).is_valid());
    }

    #[test]
    fn test_rotation() {
        let loop_ = cycle(&["GBP", "USD", "EUR", "GBP"]);

        assert_eq!(loop_.rotated_to(ccy("USD")), cycle(&["USD", "EUR", "GBP", "USD"]));
        assert_eq!(loop_.rotated_to(ccy("GBP")), loop_);
        assert_eq!(loop_.rotated_to(ccy("JPY")), loop_);
        assert_eq!(loop_.to_string(), "GBP → USD → EUR → GBP");
    }

    #[test]
    fn test_trace_follows_predecessors_from_witness() {
        // prev as left by the USD/EUR/GBP triangle
        let prev: HashMap<Currency, Option<Currency>> = [
            (ccy("USD"), Some(ccy("GBP"))),
            (ccy("EUR"), Some(ccy("USD"))),
            (ccy("GBP"), Some(ccy("EUR"))),
        ]
        .into_iter()
        .collect();

        let traced = trace_cycle(&prev, (ccy("USD"), ccy("EUR"))).unwrap();
        assert_eq!(traced, cycle(&["GBP", "USD", "EUR", "GBP"]));
        assert!(traced.is_valid());
    }

    #[test]
    fn test_trace_skips_tail_leading_into_cycle() {
        // CHF hangs off the EUR/GBP loop
        let prev: HashMap<Currency, Option<Currency>> = [
            (ccy("USD"), None),
            (ccy("EUR"), Some(ccy("GBP"))),
            (ccy("GBP"), Some(ccy("EUR"))),
            (ccy("CHF"), Some(ccy("EUR"))),
        ]
        .into_iter()
        .collect();

        let traced = trace_cycle(&prev, (ccy("EUR"), ccy("CHF"))).unwrap();
        assert!(traced.is_valid());
        assert_eq!(traced.hop_count(), 2);
        assert!(!traced.contains(ccy("CHF")));
    }

    #[test]
    fn test_trace_without_cycle() {
        let prev: HashMap<Currency, Option<Currency>> = [
            (ccy("USD"), None),
            (ccy("EUR"), Some(ccy("USD"))),
        ]
        .into_iter()
        .collect();

        assert!(trace_cycle(&prev, (ccy("USD"), ccy("EUR"))).is_none());
    }

    #[test]
    fn test_break_even_cycle_keeps_notional() {
        let graph = graph_from(&[("USD", "EUR", 0.8), ("EUR", "GBP", 1.25), ("GBP", "USD", 1.0)]);

        let report = compute_profit(&graph, &cycle(&["USD", "EUR", "GBP", "USD"]), 100.0).unwrap();
        assert!((report.final_notional - 100.0).abs() < 1e-9);
        assert!(report.margin().abs() < 1e-12);
        assert!(!report.is_profitable(DEFAULT_TOLERANCE));
        assert_eq!(report.legs.len(), 3);
        assert!((report.legs[0].notional - 80.0).abs() < 1e-9);
        assert!((report.legs[1].notional - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_profitable_triangle_end_to_end() {
        let graph = graph_from(&[("USD", "EUR", 0.9), ("EUR", "GBP", 0.8), ("GBP", "USD", 1.5)]);
        let usd = ccy("USD");

        let paths = BellmanFord::new(&graph).run(usd).unwrap();
        let witness = paths.negative_cycle.expect("arbitrage should be detected");

        let traced = trace_cycle(&paths.prev, witness).unwrap().rotated_to(usd);
        assert!(traced.is_valid());
        assert_eq!(traced.start(), Some(usd));

        let report = compute_profit(&graph, &traced, 100.0).unwrap();
        assert!(report.final_notional > 100.0);
        assert!((report.final_notional - 108.0).abs() < 1e-9);
        assert!((report.profit_percentage() - 8.0).abs() < 1e-9);
        assert!(report.is_profitable(DEFAULT_TOLERANCE));
    }

    #[test]
    fn test_cycle_weight() {
        let graph = graph_from(&[("USD", "EUR", 0.9), ("EUR", "GBP", 0.8), ("GBP", "USD", 1.5)]);

        let loop_ = cycle(&["USD", "EUR", "GBP", "USD"]);
        assert!((loop_.weight(&graph).unwrap() + (1.08f64).ln()).abs() < 1e-12);

        // Out and straight back nets to zero
        assert_eq!(cycle(&["USD", "EUR", "USD"]).weight(&graph), Some(0.0));
        assert_eq!(cycle(&["USD", "CHF", "USD"]).weight(&graph), None);
    }

    #[test]
    fn test_missing_leg_yields_no_report() {
        let mut graph = graph_from(&[("USD", "EUR", 0.9), ("EUR", "GBP", 0.8), ("GBP", "USD", 1.5)]);
        graph.evict_edge(ccy("EUR"), ccy("GBP"));

        assert!(compute_profit(&graph, &cycle(&["USD", "EUR", "GBP", "USD"]), 100.0).is_none());
        assert!(compute_profit(&graph, &cycle(&[]), 100.0).is_none());
    }

    #[test]
    fn test_opportunity_log_appends_json_lines() {
        let graph = graph_from(&[("USD", "EUR", 0.9), ("EUR", "GBP", 0.8), ("GBP", "USD", 1.5)]);
        let loop_ = cycle(&["USD", "EUR", "GBP", "USD"]);
        let report = compute_profit(&graph, &loop_, 100.0).unwrap();

        let dir = std::env::temp_dir().join(format!("triangulator-log-{}", std::process::id()));
        let path = dir.join("opportunities.jsonl");
        let _ = fs::remove_file(&path);

        let entry = OpportunityLog::new(Utc::now(), &loop_, &report);
        entry.append_to_file(&path).unwrap();
        entry.append_to_file(&path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: OpportunityLog = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.path, loop_.path);
        assert!((parsed.margin_pct - 8.0).abs() < 1e-9);

        let _ = fs::remove_dir_all(&dir);
    }
}
