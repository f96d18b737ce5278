//! Decision procedure interface and its Z3 implementation

use tracing::debug;
use z3::ast::{exists_const, Ast, Dynamic};
use z3::{Goal, SatResult, Solver, Tactic};

use crate::error::SynthResult;
use crate::ir::{display, utils, TermId, TermStore};
use crate::semantics::smt::{create_solver_with_config, Encoder, SolverConfig};

/// Outcome of a satisfiability check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SatOutcome {
    Sat,
    Unsat,
    /// Timeout or incompleteness; callers must treat it conservatively
    Unknown,
}

impl From<SatResult> for SatOutcome {
    fn from(result: SatResult) -> Self {
        match result {
            SatResult::Sat => SatOutcome::Sat,
            SatResult::Unsat => SatOutcome::Unsat,
            SatResult::Unknown => SatOutcome::Unknown,
        }
    }
}

/// Satisfiability and quantifier elimination over boolean terms
pub trait Oracle {
    fn check_sat(&mut self, store: &TermStore, formula: TermId) -> SynthResult<SatOutcome>;

    /// `assumption` is satisfiable and `assumption ∧ ¬query` is not
    fn is_valid_under(
        &mut self,
        store: &mut TermStore,
        assumption: TermId,
        query: TermId,
    ) -> SynthResult<bool> {
        if self.check_sat(store, assumption)? != SatOutcome::Sat {
            return Ok(false);
        }
        let negated = store.mk_not(query);
        let counter = store.mk_and(vec![assumption, negated]);
        Ok(self.check_sat(store, counter)? == SatOutcome::Unsat)
    }

    /// Formula equivalent to `∃var. formula` that does not mention `var`
    ///
    /// `None` means the elimination was inconclusive.
    fn eliminate_exists(
        &mut self,
        store: &mut TermStore,
        var: TermId,
        formula: TermId,
    ) -> SynthResult<Option<TermId>>;
}

/// Pops the solver frame on drop
struct Scope<'a> {
    solver: &'a Solver,
}

impl<'a> Scope<'a> {
    fn push(solver: &'a Solver) -> Self {
        solver.push();
        Self { solver }
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        self.solver.pop(1);
    }
}

/// [`Oracle`] backed by a single Z3 solver session
pub struct Z3Oracle {
    solver: Solver,
    config: SolverConfig,
}

impl Z3Oracle {
    pub fn new(config: SolverConfig) -> Self {
        Self {
            solver: create_solver_with_config(&config),
            config,
        }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }
}

impl Default for Z3Oracle {
    fn default() -> Self {
        Self::new(SolverConfig::default())
    }
}

impl Oracle for Z3Oracle {
    fn check_sat(&mut self, store: &TermStore, formula: TermId) -> SynthResult<SatOutcome> {
        let mut encoder = Encoder::new();
        let encoded = encoder.encode_bool(store, formula)?;
        let _scope = Scope::push(&self.solver);
        self.solver.assert(&encoded);
        Ok(self.solver.check().into())
    }

    fn eliminate_exists(
        &mut self,
        store: &mut TermStore,
        var: TermId,
        formula: TermId,
    ) -> SynthResult<Option<TermId>> {
        let mut encoder = Encoder::new();
        let bound = encoder.encode(store, var)?.flatten();
        let body = encoder.encode_bool(store, formula)?;
        let bound_refs: Vec<&dyn Ast> = bound.iter().map(|b| b as &dyn Ast).collect();
        let quantified = exists_const(&bound_refs, &[], &body);

        let goal = Goal::new(false, false, false);
        goal.assert(&quantified);
        let mut tactic = Tactic::new("qe").and_then(&Tactic::new("simplify"));
        if let Some(timeout) = self.config.qe_timeout {
            tactic = tactic.try_for(timeout);
        }
        let applied = match tactic.apply(&goal, None) {
            Ok(applied) => applied,
            Err(reason) => {
                debug!(%reason, formula = %display(store, formula), "quantifier elimination failed");
                return Ok(None);
            }
        };

        let mut disjuncts = Vec::new();
        for subgoal in applied.list_subgoals() {
            let formulas: Vec<z3::ast::Bool> = subgoal.get_formulas();
            let mut conjuncts = Vec::with_capacity(formulas.len());
            for f in &formulas {
                match encoder.decode(store, &Dynamic::from_ast(f))? {
                    Some(term) => conjuncts.push(term),
                    None => return Ok(None),
                }
            }
            disjuncts.push(store.mk_and(conjuncts));
        }
        let result = store.mk_or(disjuncts);
        if utils::contains(store, result, var) {
            return Ok(None);
        }
        Ok(Some(result))
    }
}

impl std::fmt::Debug for Z3Oracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Z3Oracle")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
