//! Feed Session
//!
//! One subscription window of the feed: owns the rate graph, applies the
//! ordering policy to incoming quotes, sweeps stale edges and runs the
//! detector. The graph lives exactly as long as the session; `renew()`
//! starts the next one from an empty graph.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::brain::{compute_profit, trace_cycle, ArbitrageCycle, BellmanFord, ProfitReport};
use crate::cartographer::{Currency, QuoteEvent, RateGraph};
use crate::config::DetectorSettings;
use crate::error::{EngineError, QuoteError};

/// What happened to one quote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Applied,
    /// Older than what the graph already holds for the pair; dropped
    OutOfSequence,
}

/// A detected and priced arbitrage
#[derive(Debug, Clone)]
pub struct Opportunity {
    pub cycle: ArbitrageCycle,
    pub report: ProfitReport,
    /// Edge that proved the negative cycle
    pub witness: (Currency, Currency),
}

/// Per-session counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub applied: u64,
    pub out_of_sequence: u64,
    pub rejected: u64,
    pub evicted: u64,
    pub evaluations: u64,
    pub skipped_evaluations: u64,
    /// Witnessed cycles that could not be isolated or priced as a profit
    pub untraceable: u64,
    pub opportunities: u64,
}

/// Detector state for one feed session
pub struct ArbitrageSession {
    graph: RateGraph,
    settings: DetectorSettings,
    stats: SessionStats,
}

impl ArbitrageSession {
    pub fn new(settings: DetectorSettings) -> Self {
        Self {
            graph: RateGraph::new(),
            settings,
            stats: SessionStats::default(),
        }
    }

    pub fn graph(&self) -> &RateGraph {
        &self.graph
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Start a new session: drop the whole graph and the counters
    pub fn renew(&mut self) {
        self.graph.clear();
        self.stats = SessionStats::default();
    }

    /// Apply one quote unless it is older than the stored one for its pair
    pub fn ingest(&mut self, event: &QuoteEvent) -> Result<IngestOutcome, QuoteError> {
        if let Err(e) = event.validate() {
            self.stats.rejected += 1;
            return Err(e);
        }

        // First quote of a session has nothing to be compared against
        if !self.graph.is_empty()
            && self
                .graph
                .is_out_of_sequence(event.base, event.quote, event.observed_at)
        {
            debug!(
                "Ignoring out-of-sequence quote {}/{} @ {}",
                event.base, event.quote, event.observed_at
            );
            self.stats.out_of_sequence += 1;
            return Ok(IngestOutcome::OutOfSequence);
        }

        self.graph
            .apply_update(event.base, event.quote, event.rate, event.observed_at)?;
        self.stats.applied += 1;
        debug!(
            "{} {} {} {}",
            event.observed_at, event.base, event.quote, event.rate
        );

        Ok(IngestOutcome::Applied)
    }

    /// Evict every edge that is stale at `now`. Returns how many went.
    pub fn sweep_stale(&mut self, now: DateTime<Utc>) -> usize {
        let stale = self.graph.find_stale_edges(now, self.settings.stale_after());

        let evicted = stale
            .into_iter()
            .filter(|&(from, to)| self.graph.evict_edge(from, to).is_some())
            .count();

        if evicted > 0 {
            debug!("Evicted {} stale edges", evicted);
        }
        self.stats.evicted += evicted as u64;
        evicted
    }

    /// Run the detector from the anchor and price any cycle it finds
    pub fn evaluate(&mut self) -> Option<Opportunity> {
        let anchor = self.settings.anchor;
        let tolerance = self.settings.tolerance;

        let engine = BellmanFord::new(&self.graph)
            .with_tolerance(tolerance)
            .with_relaxation_passes(self.settings.relaxation_passes);

        let paths = match engine.run(anchor) {
            Ok(paths) => paths,
            Err(EngineError::UnknownAnchor(_)) => {
                debug!("Anchor {} not seen yet, skipping evaluation", anchor);
                self.stats.skipped_evaluations += 1;
                return None;
            }
        };
        self.stats.evaluations += 1;

        let witness = paths.negative_cycle?;

        // Rounding can leave a break-even loop in the predecessor chain
        let traced = trace_cycle(&paths.prev, witness)
            .map(|cycle| cycle.rotated_to(anchor))
            .filter(|cycle| {
                cycle.is_valid()
                    && cycle
                        .weight(&self.graph)
                        .is_some_and(|w| w < -tolerance)
            });
        let cycle = match traced {
            Some(cycle) => cycle,
            None => match engine.isolate_cycle(&paths) {
                Some(cycle) => cycle.rotated_to(anchor),
                None => {
                    warn!(
                        "Negative cycle at {} -> {} could not be traced",
                        witness.0, witness.1
                    );
                    self.stats.untraceable += 1;
                    return None;
                }
            },
        };

        let Some(report) = compute_profit(&self.graph, &cycle, self.settings.starting_notional)
        else {
            warn!("Cycle {} has a missing leg, cannot price it", cycle);
            self.stats.untraceable += 1;
            return None;
        };

        if !report.is_profitable(tolerance) {
            warn!(
                "Cycle {} returns {:.6} on {:.2}, not reporting it",
                cycle, report.final_notional, report.initial_notional
            );
            self.stats.untraceable += 1;
            return None;
        }

        self.stats.opportunities += 1;
        info!(
            "ARBITRAGE: {} | {} {:.2} -> {:.6} ({:+.6}%)",
            cycle,
            report.start,
            report.initial_notional,
            report.final_notional,
            report.profit_percentage()
        );

        Some(Opportunity {
            cycle,
            report,
            witness,
        })
    }

    /// Ingest a batch in order, sweep stale edges at `now`, then evaluate once
    pub fn process_batch<'a, I>(&mut self, events: I, now: DateTime<Utc>) -> Option<Opportunity>
    where
        I: IntoIterator<Item = &'a QuoteEvent>,
    {
        for event in events {
            if let Err(e) = self.ingest(event) {
                warn!("Rejected quote: {}", e);
            }
        }

        self.sweep_stale(now);
        self.evaluate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::DEFAULT_TOLERANCE;
    use chrono::TimeZone;

    fn ccy(code: &str) -> Currency {
        code.parse().unwrap()
    }

    fn at(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + millis).unwrap()
    }

    fn quote(base: &str, quote: &str, rate: f64, millis: i64) -> QuoteEvent {
        QuoteEvent::new(ccy(base), ccy(quote), rate, at(millis))
    }

    fn triangle(millis: i64) -> Vec<QuoteEvent> {
        vec![
            quote("USD", "EUR", 0.9, millis),
            quote("EUR", "GBP", 0.8, millis),
            quote("GBP", "USD", 1.5, millis),
        ]
    }

    #[test]
    fn test_out_of_sequence_quote_is_dropped() {
        let mut session = ArbitrageSession::new(DetectorSettings::default());

        assert_eq!(
            session.ingest(&quote("USD", "EUR", 0.9, 100)),
            Ok(IngestOutcome::Applied)
        );
        assert_eq!(
            session.ingest(&quote("USD", "EUR", 0.5, 50)),
            Ok(IngestOutcome::OutOfSequence)
        );

        let edge = session.graph().edge(ccy("USD"), ccy("EUR")).unwrap();
        assert!((edge.rate() - 0.9).abs() < 1e-12);
        assert_eq!(edge.updated_at, at(100));
        assert_eq!(session.stats().out_of_sequence, 1);
    }

    #[test]
    fn test_reverse_direction_is_checked_on_its_own_edge() {
        let mut session = ArbitrageSession::new(DetectorSettings::default());
        session.ingest(&quote("USD", "EUR", 0.9, 100)).unwrap();

        // EUR->USD was written at 100 by the implied reverse edge
        assert_eq!(
            session.ingest(&quote("EUR", "USD", 1.1, 99)),
            Ok(IngestOutcome::OutOfSequence)
        );
        assert_eq!(
            session.ingest(&quote("EUR", "USD", 1.1, 101)),
            Ok(IngestOutcome::Applied)
        );
    }

    #[test]
    fn test_invalid_quote_is_rejected_and_counted() {
        let mut session = ArbitrageSession::new(DetectorSettings::default());

        assert!(session.ingest(&quote("USD", "EUR", 0.0, 0)).is_err());
        assert!(session.ingest(&quote("USD", "EUR", f64::NAN, 0)).is_err());
        assert!(session.graph().is_empty());
        assert_eq!(session.stats().rejected, 2);
    }

    #[test]
    fn test_batch_detects_triangle() {
        let mut session = ArbitrageSession::new(DetectorSettings::default());

        let found = session.process_batch(&triangle(0), at(10)).unwrap();
        assert_eq!(found.cycle.start(), Some(Currency::USD));
        assert!(found.cycle.is_valid());
        assert!(found.report.final_notional > 100.0);
        assert!((found.report.final_notional - 108.0).abs() < 1e-9);
        assert_eq!(session.stats().opportunities, 1);
    }

    #[test]
    fn test_stale_edges_are_swept_before_evaluation() {
        let mut session = ArbitrageSession::new(DetectorSettings::default());

        // 1.5s after the quotes every edge is stale, nothing left to trade
        assert!(session.process_batch(&triangle(0), at(1500)).is_none());
        assert_eq!(session.graph().edge_count(), 0);
        assert_eq!(session.stats().evicted, 6);

        // Currencies survive eviction, only a renewal drops them
        assert!(!session.graph().is_empty());
    }

    #[test]
    fn test_unknown_anchor_skips_evaluation() {
        let mut session = ArbitrageSession::new(DetectorSettings::default());
        let batch = vec![
            quote("EUR", "GBP", 0.8, 0),
            quote("GBP", "CHF", 1.2, 0),
        ];

        assert!(session.process_batch(&batch, at(10)).is_none());
        assert_eq!(session.stats().skipped_evaluations, 1);
        assert_eq!(session.stats().evaluations, 0);
    }

    #[test]
    fn test_anchor_setting_is_respected() {
        let settings = DetectorSettings {
            anchor: ccy("EUR"),
            ..DetectorSettings::default()
        };
        let mut session = ArbitrageSession::new(settings);

        let found = session.process_batch(&triangle(0), at(10)).unwrap();
        assert_eq!(found.report.start, ccy("EUR"));
        assert!((found.report.final_notional - 108.0).abs() < 1e-9);
    }

    /// Small LCG so the generated graphs are identical on every run
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> u64 {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            self.0 >> 33
        }

        fn unit(&mut self) -> f64 {
            self.next() as f64 / (1u64 << 31) as f64
        }
    }

    const CODES: [&str; 8] = ["USD", "EUR", "GBP", "JPY", "CHF", "CAD", "AUD", "NZD"];
    const PRICES: [f64; 8] = [1.0, 0.92, 0.79, 151.3, 0.88, 1.37, 1.52, 1.66];

    /// Eight currencies near consistent prices, ~60% of pairs quoted in a
    /// random direction with up to 1% noise, then ~30% of directed edges evicted
    fn noisy_market(seed: u64) -> ArbitrageSession {
        let mut rng = Lcg(seed);
        let mut session = ArbitrageSession::new(DetectorSettings::default());

        for i in 0..CODES.len() {
            for j in i + 1..CODES.len() {
                if rng.unit() >= 0.6 {
                    continue;
                }
                let rate = PRICES[j] / PRICES[i] * (1.0 + (rng.unit() - 0.5) * 0.02);
                let event = if rng.unit() < 0.5 {
                    quote(CODES[i], CODES[j], rate, 0)
                } else {
                    quote(CODES[j], CODES[i], 1.0 / rate, 0)
                };
                session.ingest(&event).unwrap();
            }
        }

        let edges: Vec<(Currency, Currency)> =
            session.graph.edges().map(|(from, to, _)| (from, to)).collect();
        for (from, to) in edges {
            if rng.unit() < 0.3 {
                session.graph.evict_edge(from, to);
            }
        }

        session
    }

    #[test]
    fn test_every_reported_cycle_is_profitable_in_noisy_markets() {
        let mut reported = 0;

        for seed in 0..500 {
            let mut session = noisy_market(seed);
            let detected = BellmanFord::new(session.graph())
                .run(Currency::USD)
                .is_ok_and(|paths| paths.has_negative_cycle());

            match session.evaluate() {
                Some(found) => {
                    assert!(detected, "seed {}", seed);
                    assert!(found.cycle.is_valid(), "seed {}: {}", seed, found.cycle);
                    assert!(
                        found.cycle.weight(session.graph()).unwrap() < -DEFAULT_TOLERANCE,
                        "seed {}: {}",
                        seed,
                        found.cycle
                    );
                    assert!(
                        found.report.final_notional
                            > found.report.initial_notional * (1.0 + DEFAULT_TOLERANCE),
                        "seed {}: {} ends at {}",
                        seed,
                        found.cycle,
                        found.report.final_notional
                    );
                    reported += 1;
                }
                None => assert!(!detected, "seed {}: witness without a cycle", seed),
            }
            assert_eq!(session.stats().untraceable, 0, "seed {}", seed);
        }

        assert!(reported > 400, "only {} opportunities", reported);
    }

    #[test]
    fn test_renew_starts_from_empty_graph() {
        let mut session = ArbitrageSession::new(DetectorSettings::default());
        session.process_batch(&triangle(0), at(10));
        assert!(!session.graph().is_empty());

        session.renew();
        assert!(session.graph().is_empty());
        assert_eq!(session.stats(), SessionStats::default());

        // An old timestamp is fine again in the new session
        assert_eq!(
            session.ingest(&quote("USD", "EUR", 0.9, -5000)),
            Ok(IngestOutcome::Applied)
        );
    }
}
