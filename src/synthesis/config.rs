//! Configuration types for automaton synthesis

use crate::semantics::smt::SolverConfig;
use std::time::Duration;

/// When strategies get synthesized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExplorationMode {
    /// On demand, for the states the actual input reaches
    #[default]
    Lazy,
    /// Up front, for every state reachable from the initial one
    AheadOfTime,
}

impl std::fmt::Display for ExplorationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExplorationMode::Lazy => write!(f, "lazy"),
            ExplorationMode::AheadOfTime => write!(f, "ahead-of-time"),
        }
    }
}

/// Main configuration for a synthesis session
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    /// Solver and quantifier elimination budgets
    pub solver: SolverConfig,
    /// Maximum number of registered automaton states
    pub max_shapes: usize,
    /// Maximum number of full rewrite passes per fixpoint
    pub max_rewrite_passes: usize,
    /// Lazy or ahead-of-time strategy synthesis
    pub mode: ExplorationMode,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            solver: SolverConfig::default(),
            max_shapes: 64,
            max_rewrite_passes: 64,
            mode: ExplorationMode::default(),
        }
    }
}

impl SynthesisConfig {
    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.solver = SolverConfig::with_timeout(timeout);
        self
    }

    pub fn with_max_shapes(mut self, max_shapes: usize) -> Self {
        self.max_shapes = max_shapes;
        self
    }

    pub fn with_max_rewrite_passes(mut self, passes: usize) -> Self {
        self.max_rewrite_passes = passes;
        self
    }

    pub fn with_mode(mut self, mode: ExplorationMode) -> Self {
        self.mode = mode;
        self
    }
}
