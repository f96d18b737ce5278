//! Shape generalization and the automaton state registry
//!
//! A concrete symbolic state is generalized by repeatedly abstracting its
//! largest subterm that does not depend on the evolving state into a fresh
//! parameter. Repeated subterms share one parameter, except literals: each
//! literal occurrence gets its own, since equal constants in two places are a
//! coincidence of the current step. Parameters are numbered by their first
//! occurrence in the residual, so structurally identical generalizations
//! yield the same interned shape and the registry deduplicates states by it.

use indexmap::{IndexMap, IndexSet};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::info;

use crate::error::{SynthError, SynthResult};
use crate::ir::{display, utils, Node, Sort, StateId, TermId, TermStore};
use crate::synthesis::rewrite::project_fields;

/// Result of generalizing a term
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generalization {
    /// Residual term over the state variable and parameters `g0, g1, ...`
    pub shape: TermId,
    /// Subterm abstracted by each parameter, in parameter order
    pub arguments: Vec<TermId>,
}

/// Split `term` into a shape and the values filling its parameters
pub fn generalize(
    store: &mut TermStore,
    state_var: TermId,
    term: TermId,
) -> SynthResult<Generalization> {
    let term = expand_tuple_leaves(store, state_var, term)?;

    let mut blocked = FxHashSet::default();
    blocked.insert(state_var);
    let mut residual = term;
    let mut abstracted = FxHashMap::default();
    let mut slot = 0;

    loop {
        let mut candidates = IndexSet::new();
        let mut memo = FxHashMap::default();
        scan(store, residual, &blocked, &mut candidates, &mut memo);

        // Largest first; `max_by_key` would keep the last of equal sizes
        let mut best: Option<TermId> = None;
        for candidate in candidates {
            if best.map_or(true, |b| store.size(candidate) > store.size(b)) {
                best = Some(candidate);
            }
        }
        let Some(chosen) = best else { break };

        let sort = store.sort(chosen).clone();
        let marker = store.scratch_marker(slot, sort);
        slot += 1;
        residual = if matches!(store.node(chosen), Node::Int(_) | Node::Bool(_)) {
            let mut absent = FxHashSet::default();
            replace_leftmost(store, residual, chosen, marker, &mut absent)?.unwrap_or(residual)
        } else {
            utils::substitute_one(store, residual, chosen, marker)?
        };
        blocked.insert(marker);
        abstracted.insert(marker, chosen);
    }

    let mut order = IndexSet::new();
    let mut seen = FxHashSet::default();
    first_occurrences(store, residual, &abstracted, &mut order, &mut seen);
    let mut params = FxHashMap::default();
    let mut arguments = Vec::with_capacity(order.len());
    for (index, marker) in order.into_iter().enumerate() {
        let sort = store.sort(marker).clone();
        params.insert(marker, store.mk_param(index as u32, sort));
        arguments.push(abstracted[&marker]);
    }

    let shape = utils::substitute(store, residual, &params)?;
    let stray = utils::free_vars(store, shape)
        .into_iter()
        .any(|v| v != state_var);
    if !stray {
        return Ok(Generalization { shape, arguments });
    }
    if store.sort(term).is_scalar() {
        let sort = store.sort(term).clone();
        return Ok(Generalization {
            shape: store.mk_param(0, sort),
            arguments: vec![term],
        });
    }
    Err(SynthError::MalformedStrategy(format!(
        "cannot generalize {}",
        display(store, term)
    )))
}

/// Replace tuple-sorted variables other than the state by tuples of their
/// fields, then resolve the resulting projections
fn expand_tuple_leaves(
    store: &mut TermStore,
    state_var: TermId,
    term: TermId,
) -> SynthResult<TermId> {
    let tuple_vars: Vec<TermId> = utils::free_vars(store, term)
        .into_iter()
        .filter(|v| *v != state_var && !store.sort(*v).is_scalar())
        .collect();
    if tuple_vars.is_empty() {
        return Ok(term);
    }
    let mut map = FxHashMap::default();
    for var in tuple_vars {
        let expanded = expand(store, var)?;
        map.insert(var, expanded);
    }
    let substituted = utils::substitute(store, term, &map)?;
    project_fields(store, substituted)
}

fn expand(store: &mut TermStore, term: TermId) -> SynthResult<TermId> {
    let width = match store.sort(term).fields() {
        Some(fields) => fields.len(),
        None => return Ok(term),
    };
    let mut items = Vec::with_capacity(width);
    for k in 0..width {
        let field = store.mk_field(term, k)?;
        items.push(expand(store, field)?);
    }
    Ok(store.mk_tuple(items))
}

/// Replace only the leftmost occurrence of `target`; `None` if there is none
fn replace_leftmost(
    store: &mut TermStore,
    term: TermId,
    target: TermId,
    replacement: TermId,
    absent: &mut FxHashSet<TermId>,
) -> SynthResult<Option<TermId>> {
    if term == target {
        return Ok(Some(replacement));
    }
    if absent.contains(&term) {
        return Ok(None);
    }
    let args = store.args(term);
    for (k, child) in args.iter().enumerate() {
        if let Some(rebuilt) = replace_leftmost(store, *child, target, replacement, absent)? {
            let mut args = args.clone();
            args[k] = rebuilt;
            return store.with_args(term, args).map(Some);
        }
    }
    absent.insert(term);
    Ok(None)
}

/// Collect the markers of `abstracted` in left-to-right order of first occurrence
fn first_occurrences(
    store: &TermStore,
    term: TermId,
    abstracted: &FxHashMap<TermId, TermId>,
    order: &mut IndexSet<TermId>,
    seen: &mut FxHashSet<TermId>,
) {
    if !seen.insert(term) {
        return;
    }
    if abstracted.contains_key(&term) {
        order.insert(term);
        return;
    }
    for child in store.args(term) {
        first_occurrences(store, child, abstracted, order, seen);
    }
}

/// Post-order walk collecting candidates; returns whether `term` contains a
/// blocked subterm
fn scan(
    store: &TermStore,
    term: TermId,
    blocked: &FxHashSet<TermId>,
    candidates: &mut IndexSet<TermId>,
    memo: &mut FxHashMap<TermId, bool>,
) -> bool {
    if blocked.contains(&term) {
        return true;
    }
    if let Some(&known) = memo.get(&term) {
        return known;
    }
    let mut any_blocked = false;
    for child in store.args(term) {
        any_blocked |= scan(store, child, blocked, candidates, memo);
    }
    if !any_blocked && store.sort(term).is_scalar() {
        candidates.insert(term);
    }
    memo.insert(term, any_blocked);
    any_blocked
}

/// A registered shape
#[derive(Debug, Clone)]
pub struct AutomatonState {
    pub id: StateId,
    pub shape: TermId,
    /// Parameters `g0..gn` of the shape
    pub params: Vec<TermId>,
    /// Arguments seen when the shape was first registered
    pub template: Vec<TermId>,
}

impl AutomatonState {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Append-only registry of automaton states and their strategies
#[derive(Debug, Clone)]
pub struct Registry {
    states: Vec<AutomatonState>,
    by_shape: IndexMap<TermId, StateId>,
    strategies: Vec<Option<TermId>>,
    max_shapes: usize,
}

impl Registry {
    pub fn new(max_shapes: usize) -> Self {
        Self {
            states: Vec::new(),
            by_shape: IndexMap::new(),
            strategies: Vec::new(),
            max_shapes,
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.max_shapes
    }

    pub fn states(&self) -> &[AutomatonState] {
        &self.states
    }

    pub fn get(&self, id: StateId) -> Option<&AutomatonState> {
        self.states.get(id.0 as usize)
    }

    pub fn lookup(&self, shape: TermId) -> Option<StateId> {
        self.by_shape.get(&shape).copied()
    }

    /// Register the bare state variable as the arity-0 initial state
    pub fn register_initial(&mut self, store: &TermStore, state_var: TermId) -> SynthResult<StateId> {
        self.register(
            store,
            Generalization {
                shape: state_var,
                arguments: Vec::new(),
            },
        )
    }

    /// Look `generalization.shape` up, registering a fresh state if needed
    pub fn register(
        &mut self,
        store: &TermStore,
        generalization: Generalization,
    ) -> SynthResult<StateId> {
        if let Some(id) = self.lookup(generalization.shape) {
            return Ok(id);
        }
        if self.states.len() >= self.max_shapes {
            return Err(SynthError::ShapeLimit {
                limit: self.max_shapes,
            });
        }
        let id = StateId(self.states.len() as u32);
        let params = utils::params(store, generalization.shape);
        info!(state = %id, shape = %display(store, generalization.shape), "registered shape");
        self.states.push(AutomatonState {
            id,
            shape: generalization.shape,
            params,
            template: generalization.arguments,
        });
        self.by_shape.insert(generalization.shape, id);
        self.strategies.push(None);
        Ok(id)
    }

    /// Generalize `term` and return the application of its state to the
    /// abstracted arguments
    pub fn match_state(
        &mut self,
        store: &mut TermStore,
        state_var: TermId,
        term: TermId,
    ) -> SynthResult<TermId> {
        let generalization = generalize(store, state_var, term)?;
        let arguments = generalization.arguments.clone();
        let id = self.register(store, generalization)?;
        let sort: Sort = store.sort(state_var).clone();
        Ok(store.mk_state_app(id, arguments, sort))
    }

    pub fn strategy(&self, id: StateId) -> Option<TermId> {
        self.strategies.get(id.0 as usize).copied().flatten()
    }

    pub fn has_strategy(&self, id: StateId) -> bool {
        self.strategy(id).is_some()
    }

    /// Store the strategy of `id`; strategies are never replaced
    pub fn set_strategy(&mut self, id: StateId, strategy: TermId) -> SynthResult<()> {
        match self.strategies.get_mut(id.0 as usize) {
            Some(slot @ None) => {
                *slot = Some(strategy);
                Ok(())
            }
            Some(Some(_)) => Err(SynthError::MalformedStrategy(format!(
                "strategy of {} is already set",
                id
            ))),
            None => Err(SynthError::MalformedStrategy(format!("unknown state {}", id))),
        }
    }

    /// States whose strategy is still missing, in registration order
    pub fn unresolved(&self) -> impl Iterator<Item = StateId> + '_ {
        self.states
            .iter()
            .filter(|state| !self.has_strategy(state.id))
            .map(|state| state.id)
    }
}

/// Is `term` an application of an automaton state?
pub fn as_state_app(store: &TermStore, term: TermId) -> Option<(StateId, &[TermId])> {
    match store.node(term) {
        Node::App {
            decl: crate::ir::Decl::State(id),
            args,
        } => Some((*id, args.as_slice())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Op;
    use proptest::prelude::*;

    fn show(store: &TermStore, term: TermId) -> String {
        display(store, term).to_string()
    }

    #[test]
    fn test_generalize_max_step() {
        let mut store = TermStore::new();
        let s = store.mk_var("s", Sort::Int);
        let i = store.mk_var("i", Sort::Int);
        let gt = store.mk_op(Op::Gt, vec![i, s]);
        let ite = store.mk_ite(gt, i, s);
        let g = generalize(&mut store, s, ite).unwrap();
        assert_eq!(show(&store, g.shape), "if (g0 > s) { g0 } else { s }");
        assert_eq!(g.arguments, vec![i]);
    }

    #[test]
    fn test_generalize_prefers_largest_candidate() {
        let mut store = TermStore::new();
        let s = store.mk_var("s", Sort::Int);
        let i = store.mk_var("i", Sort::Int);
        let two = store.mk_int(2);
        let scaled = store.mk_op(Op::Mul, vec![i, two]);
        let sum = store.mk_op(Op::Add, vec![s, scaled, i]);
        let g = generalize(&mut store, s, sum).unwrap();
        assert_eq!(show(&store, g.shape), "(s + g0 + g1)");
        assert_eq!(g.arguments, vec![scaled, i]);
    }

    #[test]
    fn test_generalize_expands_tuple_input() {
        let mut store = TermStore::new();
        let pair = Sort::Tuple(vec![Sort::Bool, Sort::Int]);
        let s = store.mk_var("s", pair.clone());
        let i = store.mk_var("i", pair);
        let s0 = store.mk_field(s, 0).unwrap();
        let s1 = store.mk_field(s, 1).unwrap();
        let i0 = store.mk_field(i, 0).unwrap();
        let i1 = store.mk_field(i, 1).unwrap();
        let both = store.mk_op(Op::And, vec![s0, i0]);
        let sum = store.mk_op(Op::Add, vec![s1, i1]);
        let next = store.mk_tuple(vec![both, sum]);
        let g = generalize(&mut store, s, next).unwrap();
        assert_eq!(show(&store, g.shape), "((s.0 && g0), (s.1 + g1))");
        assert_eq!(g.arguments, vec![i0, i1]);

        // A bare tuple input is split into its fields
        let g = generalize(&mut store, s, i).unwrap();
        assert_eq!(show(&store, g.shape), "(g0, g1)");
        assert_eq!(g.arguments, vec![i0, i1]);
    }

    #[test]
    fn test_generalize_literals_and_params() {
        let mut store = TermStore::new();
        let pair = Sort::Tuple(vec![Sort::Bool, Sort::Int]);
        let s = store.mk_var("s", pair);
        let t = store.mk_bool(true);
        let old = store.mk_param(3, Sort::Int);
        let next = store.mk_tuple(vec![t, old]);
        let g = generalize(&mut store, s, next).unwrap();
        assert_eq!(show(&store, g.shape), "(g0, g1)");
        assert_eq!(g.arguments, vec![t, old]);
    }

    #[test]
    fn test_generalize_numbers_params_by_position() {
        let mut store = TermStore::new();
        let pair = Sort::Tuple(vec![Sort::Int, Sort::Int]);
        let s = store.mk_var("s", pair);
        let i = store.mk_var("i", Sort::Int);
        let j = store.mk_var("j", Sort::Int);
        let one = store.mk_int(1);
        let bumped = store.mk_op(Op::Add, vec![i, one]);
        let s0 = store.mk_field(s, 0).unwrap();
        let s1 = store.mk_field(s, 1).unwrap();
        let first = store.mk_op(Op::Add, vec![s0, j]);
        let second = store.mk_op(Op::Add, vec![s1, bumped]);
        let next = store.mk_tuple(vec![first, second]);
        let g = generalize(&mut store, s, next).unwrap();
        assert_eq!(show(&store, g.shape), "((s.0 + g0), (s.1 + g1))");
        assert_eq!(g.arguments, vec![j, bumped]);
    }

    #[test]
    fn test_generalize_splits_literal_occurrences() {
        let mut store = TermStore::new();
        let pair = Sort::Tuple(vec![Sort::Bool, Sort::Int]);
        let s = store.mk_var("s", pair);
        let i = store.mk_var("i", Sort::Int);
        let yes = store.mk_bool(true);
        let one = store.mk_int(1);
        let s0 = store.mk_field(s, 0).unwrap();
        let s1 = store.mk_field(s, 1).unwrap();
        let count = store.mk_op(Op::Add, vec![s1, one]);
        let open = store.mk_tuple(vec![yes, count]);
        let reset = store.mk_tuple(vec![yes, one]);
        let next = store.mk_ite(s0, open, reset);
        let g = generalize(&mut store, s, next).unwrap();
        assert_eq!(g.arguments, vec![yes, one, yes, one]);
        assert_eq!(utils::params(&store, g.shape).len(), 4);

        // Repeated non-literal subterms still share a parameter
        let bumped = store.mk_op(Op::Add, vec![i, one]);
        let first = store.mk_op(Op::Gt, vec![bumped, s1]);
        let both = store.mk_tuple(vec![first, bumped]);
        let g = generalize(&mut store, s, both).unwrap();
        assert_eq!(show(&store, g.shape), "((g0 > s.1), g0)");
        assert_eq!(g.arguments, vec![bumped]);
    }

    #[test]
    fn test_generalize_twice_interns_nothing_new() {
        let mut store = TermStore::new();
        let s = store.mk_var("s", Sort::Int);
        let i = store.mk_var("i", Sort::Int);
        let two = store.mk_int(2);
        let scaled = store.mk_op(Op::Mul, vec![i, two]);
        let gt = store.mk_op(Op::Gt, vec![scaled, s]);
        let ite = store.mk_ite(gt, scaled, s);
        let first = generalize(&mut store, s, ite).unwrap();
        let len = store.len();
        let second = generalize(&mut store, s, ite).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.len(), len);
    }

    #[test]
    fn test_registry_deduplicates_shapes() {
        let mut store = TermStore::new();
        let s = store.mk_var("s", Sort::Int);
        let i = store.mk_var("i", Sort::Int);
        let mut registry = Registry::new(8);
        let z0 = registry.register_initial(&store, s).unwrap();
        assert_eq!(z0, StateId(0));
        let bare = registry.match_state(&mut store, s, s).unwrap();
        assert_eq!(as_state_app(&store, bare), Some((z0, &[][..])));

        let a = store.mk_op(Op::Add, vec![s, i]);
        let seven = store.mk_int(7);
        let b = store.mk_op(Op::Add, vec![s, seven]);
        let app_a = registry.match_state(&mut store, s, a).unwrap();
        let app_b = registry.match_state(&mut store, s, b).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(as_state_app(&store, app_a), Some((StateId(1), &[i][..])));
        assert_eq!(as_state_app(&store, app_b), Some((StateId(1), &[seven][..])));
        assert_eq!(registry.get(StateId(1)).unwrap().template, vec![i]);
        assert_eq!(registry.get(StateId(1)).unwrap().arity(), 1);
    }

    #[test]
    fn test_registry_limit_and_strategies() {
        let mut store = TermStore::new();
        let s = store.mk_var("s", Sort::Int);
        let i = store.mk_var("i", Sort::Int);
        let mut registry = Registry::new(1);
        let z0 = registry.register_initial(&store, s).unwrap();
        let sum = store.mk_op(Op::Add, vec![s, i]);
        assert!(matches!(
            registry.match_state(&mut store, s, sum),
            Err(SynthError::ShapeLimit { limit: 1 })
        ));

        assert_eq!(registry.unresolved().collect::<Vec<_>>(), vec![z0]);
        let leaf = store.mk_state_app(z0, vec![], Sort::Int);
        registry.set_strategy(z0, leaf).unwrap();
        assert_eq!(registry.strategy(z0), Some(leaf));
        assert!(registry.set_strategy(z0, leaf).is_err());
        assert!(registry.set_strategy(StateId(5), leaf).is_err());
        assert_eq!(registry.unresolved().count(), 0);
    }

    #[derive(Debug, Clone)]
    enum Gen {
        S,
        I,
        Lit(i64),
        Bin(Op, Box<Gen>, Box<Gen>),
        Ite(Box<Gen>, Box<Gen>, Box<Gen>, Box<Gen>),
    }

    fn gen() -> impl Strategy<Value = Gen> {
        let leaf = prop_oneof![Just(Gen::S), Just(Gen::I), (0i64..4).prop_map(Gen::Lit)];
        leaf.prop_recursive(4, 32, 4, |inner| {
            prop_oneof![
                (
                    prop_oneof![Just(Op::Add), Just(Op::Sub), Just(Op::Mul)],
                    inner.clone(),
                    inner.clone()
                )
                    .prop_map(|(op, a, b)| Gen::Bin(op, a.into(), b.into())),
                (inner.clone(), inner.clone(), inner.clone(), inner)
                    .prop_map(|(a, b, c, d)| Gen::Ite(a.into(), b.into(), c.into(), d.into())),
            ]
        })
    }

    fn build(store: &mut TermStore, s: TermId, i: TermId, g: &Gen) -> TermId {
        match g {
            Gen::S => s,
            Gen::I => i,
            Gen::Lit(v) => store.mk_int(*v),
            Gen::Bin(op, a, b) => {
                let a = build(store, s, i, a);
                let b = build(store, s, i, b);
                store.mk_op(*op, vec![a, b])
            }
            Gen::Ite(l, r, a, b) => {
                let l = build(store, s, i, l);
                let r = build(store, s, i, r);
                let c = store.mk_op(Op::Lt, vec![l, r]);
                let a = build(store, s, i, a);
                let b = build(store, s, i, b);
                store.mk_ite(c, a, b)
            }
        }
    }

    proptest! {
        #[test]
        fn prop_generalize_is_deterministic(g in gen()) {
            let mut first = TermStore::new();
            let s1 = first.mk_var("s", Sort::Int);
            let i1 = first.mk_var("i", Sort::Int);
            let t1 = build(&mut first, s1, i1, &g);
            let a = generalize(&mut first, s1, t1).unwrap();
            let again = generalize(&mut first, s1, t1).unwrap();
            prop_assert_eq!(&a, &again);

            let mut second = TermStore::new();
            let s2 = second.mk_var("s", Sort::Int);
            let i2 = second.mk_var("i", Sort::Int);
            // Unrelated interning must not affect the outcome
            second.fresh_marker(Sort::Int);
            second.mk_int(99);
            let t2 = build(&mut second, s2, i2, &g);
            let b = generalize(&mut second, s2, t2).unwrap();
            prop_assert_eq!(show(&first, a.shape), show(&second, b.shape));
            prop_assert_eq!(a.arguments.len(), b.arguments.len());
            for (x, y) in a.arguments.iter().zip(&b.arguments) {
                prop_assert_eq!(show(&first, *x), show(&second, *y));
            }
        }

        #[test]
        fn prop_shape_mentions_only_state_and_params(g in gen()) {
            let mut store = TermStore::new();
            let s = store.mk_var("s", Sort::Int);
            let i = store.mk_var("i", Sort::Int);
            let t = build(&mut store, s, i, &g);
            let out = generalize(&mut store, s, t).unwrap();
            prop_assert!(utils::free_vars(&store, out.shape).iter().all(|v| *v == s));
            prop_assert_eq!(utils::params(&store, out.shape).len(), out.arguments.len());
        }
    }
}
