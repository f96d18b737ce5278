//! Strategy exploration
//!
//! The composed term of a shape is reduced by the rewrite fixpoint once per
//! probe. Conditions the oracle can settle are decided silently; a condition
//! that genuinely splits the input space becomes a branch point. Each probe
//! carries the decisions it must replay, and every unseen branch point pushes
//! a new probe taking its false arm. The recorded (decisions, leaf) runs are
//! then assembled into the decision tree of the strategy.

use std::time::Instant;

use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::error::{SynthError, SynthResult};
use crate::frontend::Aggregation;
use crate::ir::{display, utils, Node, StateId, TermId, TermStore};
use crate::semantics::oracle::{Oracle, SatOutcome};
use crate::synthesis::result::SynthesisStatistics;
use crate::synthesis::rewrite::{extend_path, simplify, Decide, Rewriter, Validity};
use crate::synthesis::shape::{as_state_app, Registry};

/// Decision tree of nested conditionals whose leaves are state applications
pub type Strategy = TermId;

/// Cached classification of a query under an explore path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Fixed(bool),
    /// Undecided; splits on a condition over parameters and input
    Branch(TermId),
}

/// Decisions a run must replay
#[derive(Debug, Clone, Default)]
struct Probe {
    forced: FxHashMap<TermId, bool>,
}

/// One finished run: the branch decisions taken and the resulting leaf
#[derive(Debug, Clone)]
struct Run {
    decisions: Vec<(TermId, bool)>,
    leaf: TermId,
}

/// Synthesizes strategies, sharing a decision cache across a session
#[derive(Debug, Default)]
pub struct Explorer {
    cache: FxHashMap<(TermId, TermId, TermId), Decision>,
    statistics: SynthesisStatistics,
}

impl Explorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statistics(&self) -> &SynthesisStatistics {
        &self.statistics
    }

    /// Compute, check and store the strategy of `state`
    pub fn synthesize<O: Oracle + ?Sized>(
        &mut self,
        store: &mut TermStore,
        aggregation: &Aggregation,
        registry: &mut Registry,
        rewriter: &Rewriter,
        oracle: &mut O,
        state: StateId,
    ) -> SynthResult<Strategy> {
        let start = Instant::now();
        let shape = registry
            .get(state)
            .ok_or_else(|| SynthError::MalformedStrategy(format!("unknown state {}", state)))?
            .shape;
        let state_var = aggregation.state_var();
        let composed = compose(store, aggregation, shape)?;
        debug!(%state, composed = %display(store, composed), "exploring");

        let top = store.mk_bool(true);
        let mut worklist = vec![Probe::default()];
        let mut runs = Vec::new();
        while let Some(probe) = worklist.pop() {
            self.statistics.exploration_runs += 1;
            let mut decider = RecordingDecider {
                oracle: &mut *oracle,
                cache: &mut self.cache,
                statistics: &mut self.statistics,
                state_var,
                forced: &probe.forced,
                explore_path: top,
                decisions: Vec::new(),
                probes: Vec::new(),
            };
            let reduced = rewriter.fixpoint(store, composed, &mut decider)?;
            let RecordingDecider {
                decisions, probes, ..
            } = decider;
            let leaf = registry.match_state(store, state_var, reduced)?;
            debug!(
                %state,
                branches = decisions.len(),
                leaf = %display(store, leaf),
                "exploration run finished"
            );
            runs.push(Run { decisions, leaf });
            worklist.extend(probes);
        }

        let tree = build_tree(store, &runs)?;
        let strategy = rewriter.fixpoint(store, tree, &mut Validity::new(&mut *oracle))?;
        check_strategy(store, state_var, strategy)?;
        registry.set_strategy(state, strategy)?;

        self.statistics.strategies += 1;
        self.statistics.shapes = registry.len() as u64;
        self.statistics.elapsed_time += start.elapsed();
        info!(%state, strategy = %display(store, strategy), runs = runs.len(), "strategy synthesized");
        Ok(strategy)
    }
}

/// One step of the aggregation applied to `shape`
///
/// A conditional shape is composed branch by branch so its case split
/// survives.
pub fn compose(store: &mut TermStore, aggregation: &Aggregation, shape: TermId) -> SynthResult<TermId> {
    if let Node::Ite { cond, then, els } = *store.node(shape) {
        let then = compose(store, aggregation, then)?;
        let els = compose(store, aggregation, els)?;
        return Ok(store.mk_ite(cond, then, els));
    }
    utils::substitute_one(store, aggregation.body(), aggregation.state_var(), shape)
}

struct RecordingDecider<'a, O: ?Sized> {
    oracle: &'a mut O,
    cache: &'a mut FxHashMap<(TermId, TermId, TermId), Decision>,
    statistics: &'a mut SynthesisStatistics,
    state_var: TermId,
    forced: &'a FxHashMap<TermId, bool>,
    /// Conjunction of the branch decisions taken so far
    explore_path: TermId,
    decisions: Vec<(TermId, bool)>,
    probes: Vec<Probe>,
}

impl<O: Oracle + ?Sized> RecordingDecider<'_, O> {
    fn satisfiable(&mut self, store: &mut TermStore, parts: &[TermId]) -> SynthResult<bool> {
        let parts: Vec<TermId> = parts
            .iter()
            .copied()
            .filter(|p| store.as_bool(*p) != Some(true))
            .collect();
        let formula = store.mk_and(parts);
        Ok(self.oracle.check_sat(store, formula)? != SatOutcome::Unsat)
    }

    fn classify(
        &mut self,
        store: &mut TermStore,
        assumption: TermId,
        query: TermId,
    ) -> SynthResult<Decision> {
        let path = self.explore_path;
        if !self.satisfiable(store, &[path, assumption])? {
            return Ok(Decision::Fixed(false));
        }
        if !self.satisfiable(store, &[path, assumption, query])? {
            return Ok(Decision::Fixed(false));
        }
        let negated = store.mk_not(query);
        if !self.satisfiable(store, &[path, assumption, negated])? {
            return Ok(Decision::Fixed(true));
        }

        let cond = if utils::contains(store, query, self.state_var) {
            self.statistics.qe_calls += 1;
            match self.oracle.eliminate_exists(store, self.state_var, negated)? {
                Some(witness) => Some(store.mk_not(witness)),
                None => None,
            }
        } else {
            Some(query)
        };
        let cond = match cond {
            Some(c) if !utils::contains(store, c, self.state_var) => simplify(store, c)?,
            _ => {
                self.statistics.inconclusive += 1;
                warn!(
                    query = %display(store, query),
                    "quantifier elimination inconclusive, resolving to false"
                );
                return Ok(Decision::Fixed(false));
            }
        };

        if !self.satisfiable(store, &[path, cond])? {
            return Ok(Decision::Fixed(false));
        }
        let not_cond = store.mk_not(cond);
        if !self.satisfiable(store, &[path, not_cond])? {
            return Ok(Decision::Fixed(true));
        }
        Ok(Decision::Branch(cond))
    }
}

impl<O: Oracle + ?Sized> Decide for RecordingDecider<'_, O> {
    fn decide(
        &mut self,
        store: &mut TermStore,
        assumption: TermId,
        query: TermId,
    ) -> SynthResult<bool> {
        self.statistics.oracle_queries += 1;
        let key = (self.explore_path, assumption, query);
        let decision = match self.cache.get(&key) {
            Some(known) => {
                self.statistics.cache_hits += 1;
                *known
            }
            None => {
                let fresh = self.classify(store, assumption, query)?;
                self.cache.insert(key, fresh);
                fresh
            }
        };
        let cond = match decision {
            Decision::Fixed(value) => return Ok(value),
            Decision::Branch(cond) => cond,
        };

        let value = match self.forced.get(&cond) {
            Some(value) => *value,
            None => {
                self.statistics.branch_points += 1;
                let mut forced: FxHashMap<TermId, bool> = self.decisions.iter().copied().collect();
                forced.insert(cond, false);
                self.probes.push(Probe { forced });
                true
            }
        };
        debug!(cond = %display(store, cond), value, "branch");
        let literal = if value { cond } else { store.mk_not(cond) };
        self.explore_path = extend_path(store, self.explore_path, literal);
        self.decisions.push((cond, value));
        Ok(value)
    }
}

/// Assemble recorded runs into nested conditionals
fn build_tree(store: &mut TermStore, runs: &[Run]) -> SynthResult<TermId> {
    let views: Vec<(&[(TermId, bool)], TermId)> = runs
        .iter()
        .map(|run| (run.decisions.as_slice(), run.leaf))
        .collect();
    build_node(store, &views)
}

fn build_node(store: &mut TermStore, runs: &[(&[(TermId, bool)], TermId)]) -> SynthResult<TermId> {
    let Some((first_path, first_leaf)) = runs.first() else {
        return Err(SynthError::MalformedStrategy(
            "decision tree has an unexplored arm".to_string(),
        ));
    };
    let Some(&(cond, _)) = first_path.first() else {
        if runs.iter().any(|(path, leaf)| !path.is_empty() || leaf != first_leaf) {
            return Err(SynthError::MalformedStrategy(format!(
                "runs disagree after reaching leaf {}",
                display(store, *first_leaf)
            )));
        }
        return Ok(*first_leaf);
    };

    let mut then_runs = Vec::new();
    let mut else_runs = Vec::new();
    for (path, leaf) in runs {
        match path.split_first() {
            Some((&(c, value), rest)) if c == cond => {
                if value {
                    then_runs.push((rest, *leaf));
                } else {
                    else_runs.push((rest, *leaf));
                }
            }
            _ => {
                return Err(SynthError::MalformedStrategy(format!(
                    "runs disagree on branching over {}",
                    display(store, cond)
                )))
            }
        }
    }
    let then = build_node(store, &then_runs)?;
    let els = build_node(store, &else_runs)?;
    Ok(store.mk_ite(cond, then, els))
}

/// Conditions must not mention the state and leaves must be state
/// applications
fn check_strategy(store: &TermStore, state_var: TermId, strategy: TermId) -> SynthResult<()> {
    match store.node(strategy) {
        Node::Ite { cond, then, els } => {
            if utils::contains(store, *cond, state_var) {
                return Err(SynthError::MalformedStrategy(format!(
                    "condition {} mentions the state",
                    display(store, *cond)
                )));
            }
            check_strategy(store, state_var, *then)?;
            check_strategy(store, state_var, *els)
        }
        _ => match as_state_app(store, strategy) {
            Some(_) if !utils::contains(store, strategy, state_var) => Ok(()),
            _ => Err(SynthError::MalformedStrategy(format!(
                "leaf {} is not a state application",
                display(store, strategy)
            ))),
        },
    }
}
