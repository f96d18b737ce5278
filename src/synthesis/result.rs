//! Synthesis statistics

use std::time::Duration;

/// Counters collected over a synthesis session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynthesisStatistics {
    /// Total time spent synthesizing strategies
    pub elapsed_time: Duration,
    /// Decider queries issued by the rewrite rules
    pub oracle_queries: u64,
    /// Decider queries answered from the session cache
    pub cache_hits: u64,
    /// Quantifier eliminations attempted
    pub qe_calls: u64,
    /// Eliminations that produced no usable condition
    pub inconclusive: u64,
    /// Genuinely undecided conditions that split a strategy
    pub branch_points: u64,
    /// Full reductions of a composed term, one per probe
    pub exploration_runs: u64,
    /// Registered automaton states
    pub shapes: u64,
    /// Finalized strategies
    pub strategies: u64,
}

impl SynthesisStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of decider queries answered from the cache (0.0 to 1.0)
    pub fn cache_hit_rate(&self) -> f64 {
        if self.oracle_queries == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.oracle_queries as f64
        }
    }

    /// Average number of exploration runs per strategy
    pub fn runs_per_strategy(&self) -> f64 {
        if self.strategies == 0 {
            0.0
        } else {
            self.exploration_runs as f64 / self.strategies as f64
        }
    }

    /// Format statistics as a human-readable string
    pub fn format_summary(&self) -> String {
        let mut s = String::new();
        s.push_str(&format!("Time: {:.2?}\n", self.elapsed_time));
        s.push_str(&format!("Shapes: {}\n", self.shapes));
        s.push_str(&format!("Strategies: {}\n", self.strategies));
        s.push_str(&format!(
            "Exploration runs: {} ({:.1} per strategy)\n",
            self.exploration_runs,
            self.runs_per_strategy()
        ));
        s.push_str(&format!("Branch points: {}\n", self.branch_points));
        if self.oracle_queries > 0 {
            s.push_str(&format!("Oracle queries: {}\n", self.oracle_queries));
            s.push_str(&format!(
                "Cache hit rate: {:.2}%\n",
                self.cache_hit_rate() * 100.0
            ));
        }
        if self.qe_calls > 0 {
            s.push_str(&format!(
                "Quantifier eliminations: {} ({} inconclusive)\n",
                self.qe_calls, self.inconclusive
            ));
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates_handle_zero() {
        let stats = SynthesisStatistics::new();
        assert_eq!(stats.cache_hit_rate(), 0.0);
        assert_eq!(stats.runs_per_strategy(), 0.0);
    }

    #[test]
    fn test_summary_mentions_inconclusive_only_with_qe() {
        let mut stats = SynthesisStatistics {
            oracle_queries: 10,
            cache_hits: 5,
            strategies: 2,
            exploration_runs: 3,
            ..Default::default()
        };
        let summary = stats.format_summary();
        assert!(summary.contains("Cache hit rate: 50.00%"));
        assert!(summary.contains("1.5 per strategy"));
        assert!(!summary.contains("Quantifier"));

        stats.qe_calls = 4;
        stats.inconclusive = 1;
        assert!(stats.format_summary().contains("4 (1 inconclusive)"));
    }
}
