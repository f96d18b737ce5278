//! Rewrite system keeping composed terms small
//!
//! A pass applies every [`Rule`] in order to the whole term; the fixpoint
//! repeats passes until one changes nothing. Rules that consult the oracle
//! receive the path condition, the conjunction of the conditional guards
//! leading to the subterm being rewritten.

use std::fmt;

use rustc_hash::FxHashMap;
use tracing::warn;

use crate::error::SynthResult;
use crate::ir::{display, utils, Decl, Node, Op, Sort, TermId, TermStore};
use crate::semantics::concrete::{int_binop, int_cmp};
use crate::semantics::oracle::Oracle;

/// Oracle interface seen by the rewrite rules
pub trait Decide {
    /// Is `query` provably implied by `assumption`?
    fn decide(&mut self, store: &mut TermStore, assumption: TermId, query: TermId)
        -> SynthResult<bool>;
}

/// Proves only what is syntactically evident: `true`, or a conjunct of the
/// assumption
#[derive(Debug, Default, Clone, Copy)]
pub struct Syntactic;

impl Decide for Syntactic {
    fn decide(
        &mut self,
        store: &mut TermStore,
        assumption: TermId,
        query: TermId,
    ) -> SynthResult<bool> {
        if store.as_bool(query) == Some(true) || assumption == query {
            return Ok(true);
        }
        Ok(matches!(store.as_op(assumption), Some((Op::And, args)) if args.contains(&query)))
    }
}

/// Plain validity check through an oracle
pub struct Validity<'a, O: ?Sized> {
    oracle: &'a mut O,
}

impl<'a, O: Oracle + ?Sized> Validity<'a, O> {
    pub fn new(oracle: &'a mut O) -> Self {
        Self { oracle }
    }
}

impl<O: Oracle + ?Sized> Decide for Validity<'_, O> {
    fn decide(
        &mut self,
        store: &mut TermStore,
        assumption: TermId,
        query: TermId,
    ) -> SynthResult<bool> {
        self.oracle.is_valid_under(store, assumption, query)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    Simplify,
    Project,
    BoolConstants,
    Ites,
    IteDistributivity,
    GroupCommutative,
    LowerTupleEquals,
}

impl Rule {
    pub const ALL: [Rule; 7] = [
        Rule::Simplify,
        Rule::Project,
        Rule::BoolConstants,
        Rule::Ites,
        Rule::IteDistributivity,
        Rule::GroupCommutative,
        Rule::LowerTupleEquals,
    ];
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Rule::Simplify => "simplify",
            Rule::Project => "project",
            Rule::BoolConstants => "bool-constants",
            Rule::Ites => "ites",
            Rule::IteDistributivity => "ite-distributivity",
            Rule::GroupCommutative => "group-commutative",
            Rule::LowerTupleEquals => "lower-tuple-equals",
        };
        write!(f, "{}", name)
    }
}

/// Rule pipeline bound to one aggregation's state variable
#[derive(Debug, Clone)]
pub struct Rewriter {
    state_var: TermId,
    max_passes: usize,
}

impl Rewriter {
    pub fn new(state_var: TermId, max_passes: usize) -> Self {
        Self {
            state_var,
            max_passes,
        }
    }

    pub fn state_var(&self) -> TermId {
        self.state_var
    }

    /// Repeat passes until one changes nothing
    ///
    /// Hitting the pass limit logs a warning and returns the current term.
    pub fn fixpoint(
        &self,
        store: &mut TermStore,
        term: TermId,
        decider: &mut dyn Decide,
    ) -> SynthResult<TermId> {
        let mut current = term;
        for _ in 0..self.max_passes {
            let next = self.pass(store, current, decider)?;
            if next == current {
                return Ok(current);
            }
            current = next;
        }
        warn!(
            passes = self.max_passes,
            term = %display(store, current),
            "rewrite fixpoint not reached"
        );
        Ok(current)
    }

    /// Apply every rule once, in order
    pub fn pass(
        &self,
        store: &mut TermStore,
        term: TermId,
        decider: &mut dyn Decide,
    ) -> SynthResult<TermId> {
        let mut current = term;
        for rule in Rule::ALL {
            current = self.apply(rule, store, current, decider)?;
        }
        Ok(current)
    }

    pub fn apply(
        &self,
        rule: Rule,
        store: &mut TermStore,
        term: TermId,
        decider: &mut dyn Decide,
    ) -> SynthResult<TermId> {
        let mut deps = StateDeps::new(self.state_var);
        let top = store.mk_bool(true);
        let mut memo = FxHashMap::default();
        match rule {
            Rule::Simplify => simplify_masked(store, term),
            Rule::Project => project_fields(store, term),
            Rule::LowerTupleEquals => bottom_up(store, term, &mut |store, t| {
                match store.node(t).clone() {
                    Node::App {
                        decl: Decl::Op(Op::Eq),
                        args,
                    } if args.len() == 2 && !store.sort(args[0]).is_scalar() => {
                        lower_eq(store, args[0], args[1])
                    }
                    _ => Ok(t),
                }
            }),
            Rule::BoolConstants => top_down(store, term, top, &mut memo, &mut |store, t, path| {
                if store.sort(t) != &Sort::Bool
                    || store.as_bool(t).is_some()
                    || !deps.check(store, t)
                {
                    return Ok(t);
                }
                if decider.decide(store, path, t)? {
                    return Ok(store.mk_bool(true));
                }
                let negated = store.mk_not(t);
                if decider.decide(store, path, negated)? {
                    return Ok(store.mk_bool(false));
                }
                Ok(t)
            }),
            Rule::Ites => top_down(store, term, top, &mut memo, &mut |store, t, path| {
                ites_node(store, t, path, decider)
            }),
            Rule::IteDistributivity => {
                top_down(store, term, top, &mut memo, &mut |store, t, _| distribute_node(store, t))
            }
            Rule::GroupCommutative => top_down(store, term, top, &mut memo, &mut |store, t, _| {
                let Some((op, args)) = store.as_op(t) else {
                    return Ok(t);
                };
                if !matches!(op, Op::Add | Op::And) {
                    return Ok(t);
                }
                let args = args.to_vec();
                let (dependent, independent): (Vec<TermId>, Vec<TermId>) =
                    args.into_iter().partition(|a| deps.check(store, *a));
                if dependent.is_empty() || independent.len() < 2 {
                    return Ok(t);
                }
                let group = store.mk_op(op, independent);
                let mut regrouped = dependent;
                regrouped.push(group);
                Ok(store.mk_op(op, regrouped))
            }),
        }
    }
}

/// Memoized "mentions the state variable" test
struct StateDeps {
    var: TermId,
    memo: FxHashMap<TermId, bool>,
}

impl StateDeps {
    fn new(var: TermId) -> Self {
        Self {
            var,
            memo: FxHashMap::default(),
        }
    }

    fn check(&mut self, store: &TermStore, term: TermId) -> bool {
        if term == self.var {
            return true;
        }
        if let Some(&known) = self.memo.get(&term) {
            return known;
        }
        let result = store.args(term).into_iter().any(|c| self.check(store, c));
        self.memo.insert(term, result);
        result
    }
}

/// Conjoin a literal onto a path condition
pub fn extend_path(store: &mut TermStore, path: TermId, literal: TermId) -> TermId {
    if store.as_bool(path) == Some(true) {
        return literal;
    }
    let mut conjuncts = match store.as_op(path) {
        Some((Op::And, args)) => args.to_vec(),
        _ => vec![path],
    };
    conjuncts.push(literal);
    store.mk_op(Op::And, conjuncts)
}

fn rebuild_children<F>(store: &mut TermStore, term: TermId, f: &mut F) -> SynthResult<TermId>
where
    F: FnMut(&mut TermStore, TermId) -> SynthResult<TermId>,
{
    let children = store.args(term);
    if children.is_empty() {
        return Ok(term);
    }
    let mut rebuilt = Vec::with_capacity(children.len());
    for child in &children {
        rebuilt.push(f(store, *child)?);
    }
    if rebuilt == children {
        Ok(term)
    } else {
        store.with_args(term, rebuilt)
    }
}

/// Children first, then `visit` on the rebuilt node
fn bottom_up<F>(store: &mut TermStore, term: TermId, visit: &mut F) -> SynthResult<TermId>
where
    F: FnMut(&mut TermStore, TermId) -> SynthResult<TermId>,
{
    let mut memo = FxHashMap::default();
    bottom_up_rec(store, term, visit, &mut memo)
}

fn bottom_up_rec<F>(
    store: &mut TermStore,
    term: TermId,
    visit: &mut F,
    memo: &mut FxHashMap<TermId, TermId>,
) -> SynthResult<TermId>
where
    F: FnMut(&mut TermStore, TermId) -> SynthResult<TermId>,
{
    if let Some(&done) = memo.get(&term) {
        return Ok(done);
    }
    let rebuilt = rebuild_children(store, term, &mut |store, child| {
        bottom_up_rec(store, child, visit, memo)
    })?;
    let result = visit(store, rebuilt)?;
    memo.insert(term, result);
    Ok(result)
}

/// `visit` on the node, then on the children of its result
///
/// Conditional branches see the path extended with their guard.
fn top_down<F>(
    store: &mut TermStore,
    term: TermId,
    path: TermId,
    memo: &mut FxHashMap<(TermId, TermId), TermId>,
    visit: &mut F,
) -> SynthResult<TermId>
where
    F: FnMut(&mut TermStore, TermId, TermId) -> SynthResult<TermId>,
{
    if let Some(&done) = memo.get(&(term, path)) {
        return Ok(done);
    }
    let rewritten = visit(store, term, path)?;
    let result = match store.node(rewritten).clone() {
        Node::Ite { cond, then, els } => {
            let new_cond = top_down(store, cond, path, memo, visit)?;
            let then_path = extend_path(store, path, new_cond);
            let negated = store.mk_not(new_cond);
            let els_path = extend_path(store, path, negated);
            let new_then = top_down(store, then, then_path, memo, visit)?;
            let new_els = top_down(store, els, els_path, memo, visit)?;
            if (new_cond, new_then, new_els) == (cond, then, els) {
                rewritten
            } else {
                store.mk_ite(new_cond, new_then, new_els)
            }
        }
        _ => rebuild_children(store, rewritten, &mut |store, child| {
            top_down(store, child, path, memo, visit)
        })?,
    };
    memo.insert((term, path), result);
    Ok(result)
}

fn project_node(store: &mut TermStore, term: TermId) -> TermId {
    match store.node(term) {
        Node::Field { tuple, index } => match store.node(*tuple) {
            Node::Tuple(items) if *index < items.len() => items[*index],
            _ => term,
        },
        _ => term,
    }
}

/// Resolve every field access on a tuple constructor
pub fn project_fields(store: &mut TermStore, term: TermId) -> SynthResult<TermId> {
    bottom_up(store, term, &mut |store, t| Ok(project_node(store, t)))
}

/// Field access that projects constructor applications directly
fn project(store: &mut TermStore, tuple: TermId, index: usize) -> SynthResult<TermId> {
    if let Node::Tuple(items) = store.node(tuple) {
        if let Some(item) = items.get(index) {
            return Ok(*item);
        }
    }
    store.mk_field(tuple, index)
}

fn lower_eq(store: &mut TermStore, lhs: TermId, rhs: TermId) -> SynthResult<TermId> {
    let width = match store.sort(lhs).fields() {
        Some(fields) => fields.len(),
        None => return Ok(store.mk_eq(lhs, rhs)),
    };
    let mut conjuncts = Vec::with_capacity(width);
    for k in 0..width {
        let l = project(store, lhs, k)?;
        let r = project(store, rhs, k)?;
        conjuncts.push(lower_eq(store, l, r)?);
    }
    Ok(store.mk_and(conjuncts))
}

fn ites_node(
    store: &mut TermStore,
    term: TermId,
    path: TermId,
    decider: &mut dyn Decide,
) -> SynthResult<TermId> {
    let (cond, then, els) = match store.node(term) {
        Node::Ite { cond, then, els } => (*cond, *then, *els),
        _ => return Ok(term),
    };
    if decider.decide(store, path, cond)? {
        return Ok(then);
    }
    let negated = store.mk_not(cond);
    if decider.decide(store, path, negated)? {
        return Ok(els);
    }
    let same_branches = store.mk_eq(then, els);
    if decider.decide(store, path, same_branches)? {
        return Ok(if store.size(els) < store.size(then) {
            els
        } else {
            then
        });
    }
    for branch in [then, els] {
        let collapses = store.mk_eq(term, branch);
        if decider.decide(store, path, collapses)? {
            return Ok(branch);
        }
    }
    Ok(term)
}

fn distribute_node(store: &mut TermStore, term: TermId) -> SynthResult<TermId> {
    let inner = match store.node(term) {
        Node::App {
            decl: Decl::Op(Op::Not | Op::Neg) | Decl::State(_),
            args,
        } if args.len() == 1 => args[0],
        Node::Field { tuple, .. } => *tuple,
        _ => return Ok(term),
    };
    let (cond, then, els) = match store.node(inner) {
        Node::Ite { cond, then, els } => (*cond, *then, *els),
        _ => return Ok(term),
    };
    let new_then = store.with_args(term, vec![then])?;
    let new_els = store.with_args(term, vec![els])?;
    Ok(store.mk_ite(cond, new_then, new_els))
}

/// Simplify with integer literals hidden behind per-value markers
fn simplify_masked(store: &mut TermStore, term: TermId) -> SynthResult<TermId> {
    let literals = utils::subterms_where(store, term, |node| matches!(node, Node::Int(_)));
    if literals.is_empty() {
        return simplify(store, term);
    }
    let mut mask = FxHashMap::default();
    let mut unmask = FxHashMap::default();
    for literal in literals {
        if let Some(value) = store.as_int(literal) {
            let marker = store.numeral_marker(value);
            mask.insert(literal, marker);
            unmask.insert(marker, literal);
        }
    }
    let masked = utils::substitute(store, term, &mask)?;
    let simplified = simplify(store, masked)?;
    utils::substitute(store, simplified, &unmask)
}

/// Algebraic simplification and constant folding
pub fn simplify(store: &mut TermStore, term: TermId) -> SynthResult<TermId> {
    bottom_up(store, term, &mut simplify_node)
}

fn negate(store: &mut TermStore, term: TermId) -> TermId {
    if let Some((Op::Not, args)) = store.as_op(term) {
        return args[0];
    }
    store.mk_not(term)
}

fn is_literal(store: &TermStore, term: TermId) -> bool {
    matches!(store.node(term), Node::Bool(_) | Node::Int(_))
}

fn simplify_node(store: &mut TermStore, term: TermId) -> SynthResult<TermId> {
    match store.node(term).clone() {
        Node::App {
            decl: Decl::Op(op),
            args,
        } => Ok(simplify_op(store, term, op, &args)),
        Node::Ite { cond, then, els } => Ok(simplify_ite(store, term, cond, then, els)),
        Node::Field { .. } => Ok(project_node(store, term)),
        _ => Ok(term),
    }
}

fn simplify_op(store: &mut TermStore, term: TermId, op: Op, args: &[TermId]) -> TermId {
    match (op, args) {
        (Op::Not, [arg]) => negate(store, *arg),
        (Op::Neg, [arg]) => match store.node(*arg) {
            Node::Int(v) => match v.checked_neg() {
                Some(v) => store.mk_int(v),
                None => term,
            },
            Node::App {
                decl: Decl::Op(Op::Neg),
                args,
            } => args[0],
            _ => term,
        },
        (Op::And | Op::Or, _) => simplify_connective(store, term, op, args),
        (Op::Xor, [a, b]) => {
            let (a, b) = (*a, *b);
            match (store.as_bool(a), store.as_bool(b)) {
                (Some(x), Some(y)) => store.mk_bool(x ^ y),
                (Some(false), None) => b,
                (None, Some(false)) => a,
                (Some(true), None) => negate(store, b),
                (None, Some(true)) => negate(store, a),
                _ if a == b => store.mk_bool(false),
                _ => term,
            }
        }
        (Op::Eq, [a, b]) => {
            let (a, b) = (*a, *b);
            if a == b {
                return store.mk_bool(true);
            }
            if is_literal(store, a) && is_literal(store, b) {
                return store.mk_bool(false);
            }
            match (store.as_bool(a), store.as_bool(b)) {
                (Some(true), _) => b,
                (_, Some(true)) => a,
                (Some(false), _) => negate(store, b),
                (_, Some(false)) => negate(store, a),
                _ => term,
            }
        }
        (Op::Lt | Op::Le | Op::Gt | Op::Ge, [a, b]) => {
            if a == b {
                return store.mk_bool(matches!(op, Op::Le | Op::Ge));
            }
            match (store.as_int(*a), store.as_int(*b)) {
                (Some(x), Some(y)) => {
                    let result = int_cmp(op, x, y).unwrap_or(false);
                    store.mk_bool(result)
                }
                _ => term,
            }
        }
        (Op::Add | Op::Mul, _) => simplify_arith(store, term, op, args),
        (Op::Sub, [a, b]) => {
            if a == b {
                return store.mk_int(0);
            }
            match (store.as_int(*a), store.as_int(*b)) {
                (Some(x), Some(y)) => match x.checked_sub(y) {
                    Some(v) => store.mk_int(v),
                    None => term,
                },
                (_, Some(0)) => *a,
                _ => term,
            }
        }
        (Op::Div | Op::Mod, [a, b]) => match (store.as_int(*a), store.as_int(*b)) {
            (Some(x), Some(y)) if y != 0 => match int_binop(op, x, y) {
                Some(v) => store.mk_int(v),
                None => term,
            },
            (_, Some(1)) if op == Op::Div => *a,
            (_, Some(1)) => store.mk_int(0),
            _ => term,
        },
        _ => term,
    }
}

/// Flatten, drop units, short-circuit on the absorbing element, deduplicate
/// and detect complementary operands
fn simplify_connective(store: &mut TermStore, term: TermId, op: Op, args: &[TermId]) -> TermId {
    let absorbing = op == Op::Or;
    let mut flat = Vec::with_capacity(args.len());
    for arg in args {
        match store.as_op(*arg) {
            Some((inner, inner_args)) if inner == op => flat.extend_from_slice(inner_args),
            _ => flat.push(*arg),
        }
    }
    let mut kept: Vec<TermId> = Vec::with_capacity(flat.len());
    for arg in flat {
        match store.as_bool(arg) {
            Some(b) if b == absorbing => return store.mk_bool(absorbing),
            Some(_) => continue,
            None => {}
        }
        if !kept.contains(&arg) {
            kept.push(arg);
        }
    }
    let complementary = kept.iter().any(|arg| match store.as_op(*arg) {
        Some((Op::Not, inner)) => kept.contains(&inner[0]),
        _ => false,
    });
    if complementary {
        return store.mk_bool(absorbing);
    }
    match kept.len() {
        0 => store.mk_bool(!absorbing),
        1 => kept[0],
        _ if kept.as_slice() == args => term,
        _ => store.mk_op(op, kept),
    }
}

/// Flatten and fold literal operands into one trailing literal
fn simplify_arith(store: &mut TermStore, term: TermId, op: Op, args: &[TermId]) -> TermId {
    let unit = if op == Op::Add { 0 } else { 1 };
    let mut flat = Vec::with_capacity(args.len());
    for arg in args {
        match store.as_op(*arg) {
            Some((inner, inner_args)) if inner == op => flat.extend_from_slice(inner_args),
            _ => flat.push(*arg),
        }
    }
    let mut folded = unit;
    let mut literal_count = 0;
    let mut rest = Vec::with_capacity(flat.len());
    for arg in flat {
        match store.as_int(arg) {
            Some(v) => {
                // Literals whose fold overflows stay as written
                match int_binop(op, folded, v) {
                    Some(next) => folded = next,
                    None => return term,
                }
                literal_count += 1;
            }
            None => rest.push(arg),
        }
    }
    if op == Op::Mul && literal_count > 0 && folded == 0 {
        return store.mk_int(0);
    }
    if literal_count > 0 && folded != unit {
        let literal = store.mk_int(folded);
        rest.push(literal);
    }
    match rest.len() {
        0 => store.mk_int(folded),
        1 => rest[0],
        _ if rest.as_slice() == args => term,
        _ => store.mk_op(op, rest),
    }
}

fn simplify_ite(store: &mut TermStore, term: TermId, cond: TermId, then: TermId, els: TermId) -> TermId {
    if let Some(b) = store.as_bool(cond) {
        return if b { then } else { els };
    }
    if then == els {
        return then;
    }
    if let Some((Op::Not, inner)) = store.as_op(cond) {
        let inner = inner[0];
        let swapped = store.mk_ite(inner, els, then);
        return simplify_ite(store, swapped, inner, els, then);
    }
    match (store.as_bool(then), store.as_bool(els)) {
        (Some(true), Some(false)) => cond,
        (Some(false), Some(true)) => negate(store, cond),
        _ => term,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantics::concrete::{eval, Env, Value};
    use proptest::prelude::*;

    struct Fixture {
        store: TermStore,
        s: TermId,
        i: TermId,
        p: TermId,
    }

    fn fixture() -> Fixture {
        let mut store = TermStore::new();
        let s = store.mk_var("s", Sort::Int);
        let i = store.mk_var("i", Sort::Int);
        let p = store.mk_var("p", Sort::Bool);
        Fixture { store, s, i, p }
    }

    fn show(store: &TermStore, term: TermId) -> String {
        display(store, term).to_string()
    }

    #[test]
    fn test_simplify_flattens_and_folds() {
        let Fixture { mut store, s, i, .. } = fixture();
        let zero = store.mk_int(0);
        let two = store.mk_int(2);
        let three = store.mk_int(3);
        let inner = store.mk_op(Op::Add, vec![i, zero, two]);
        let sum = store.mk_op(Op::Add, vec![s, inner, three]);
        let out = simplify(&mut store, sum).unwrap();
        assert_eq!(show(&store, out), "(s + i + 5)");
    }

    #[test]
    fn test_simplify_keeps_overflowing_literals() {
        let Fixture { mut store, s, .. } = fixture();
        let max = store.mk_int(i64::MAX);
        let one = store.mk_int(1);
        let sum = store.mk_op(Op::Add, vec![s, max, one]);
        assert_eq!(simplify(&mut store, sum).unwrap(), sum);
        let min = store.mk_int(i64::MIN);
        let neg = store.mk_op(Op::Neg, vec![min]);
        assert_eq!(simplify(&mut store, neg).unwrap(), neg);
        let diff = store.mk_op(Op::Sub, vec![min, one]);
        assert_eq!(simplify(&mut store, diff).unwrap(), diff);
    }

    #[test]
    fn test_simplify_connectives() {
        let Fixture { mut store, s, i, p } = fixture();
        let lt = store.mk_op(Op::Lt, vec![s, i]);
        let not_lt = store.mk_not(lt);
        let t = store.mk_bool(true);
        let and = store.mk_op(Op::And, vec![p, t, lt, p]);
        let out = simplify(&mut store, and).unwrap();
        assert_eq!(show(&store, out), "(p && (s < i))");

        let contradiction = store.mk_op(Op::And, vec![lt, p, not_lt]);
        let out = simplify(&mut store, contradiction).unwrap();
        assert_eq!(store.as_bool(out), Some(false));

        let same = store.mk_op(Op::Le, vec![s, s]);
        let out = simplify(&mut store, same).unwrap();
        assert_eq!(store.as_bool(out), Some(true));
    }

    #[test]
    fn test_simplify_conditionals() {
        let Fixture { mut store, s, i, p } = fixture();
        let not_p = store.mk_not(p);
        let ite = store.mk_ite(not_p, s, i);
        let out = simplify(&mut store, ite).unwrap();
        assert_eq!(show(&store, out), "if p { i } else { s }");

        let t = store.mk_bool(true);
        let f = store.mk_bool(false);
        let as_bool = store.mk_ite(p, f, t);
        let out = simplify(&mut store, as_bool).unwrap();
        assert_eq!(out, not_p);
    }

    #[test]
    fn test_simplify_rule_keeps_numerals_apart() {
        let Fixture { mut store, s, .. } = fixture();
        let one = store.mk_int(1);
        let two = store.mk_int(2);
        let inner = store.mk_op(Op::Add, vec![s, one]);
        let sum = store.mk_op(Op::Add, vec![inner, two]);
        let rewriter = Rewriter::new(s, 16);
        let out = rewriter
            .apply(Rule::Simplify, &mut store, sum, &mut Syntactic)
            .unwrap();
        assert_eq!(show(&store, out), "(s + 1 + 2)");
        let plain = simplify(&mut store, sum).unwrap();
        assert_eq!(show(&store, plain), "(s + 3)");
    }

    #[test]
    fn test_group_commutative_after_flattening() {
        let Fixture { mut store, s, .. } = fixture();
        let g0 = store.mk_param(0, Sort::Int);
        let one = store.mk_int(1);
        let inner = store.mk_op(Op::Add, vec![s, g0]);
        let sum = store.mk_op(Op::Add, vec![one, inner]);
        let rewriter = Rewriter::new(s, 16);
        let out = rewriter.fixpoint(&mut store, sum, &mut Syntactic).unwrap();
        assert_eq!(show(&store, out), "(s + (1 + g0))");
    }

    #[test]
    fn test_path_condition_folds_nested_conditionals() {
        let Fixture { mut store, s, i, p } = fixture();
        let inner = store.mk_ite(p, s, i);
        let outer = store.mk_ite(p, inner, i);
        let rewriter = Rewriter::new(s, 16);
        let out = rewriter.fixpoint(&mut store, outer, &mut Syntactic).unwrap();
        assert_eq!(show(&store, out), "if p { s } else { i }");
    }

    #[test]
    fn test_bool_constants_use_path() {
        let Fixture { mut store, s, i, p } = fixture();
        let lt = store.mk_op(Op::Lt, vec![s, i]);
        let guarded = store.mk_op(Op::And, vec![lt, p]);
        let ite = store.mk_ite(lt, guarded, lt);
        let rewriter = Rewriter::new(s, 16);
        let out = rewriter.fixpoint(&mut store, ite, &mut Syntactic).unwrap();
        assert_eq!(show(&store, out), "if (s < i) { p } else { false }");
    }

    #[test]
    fn test_distributivity_and_projection() {
        let mut store = TermStore::new();
        let pair = Sort::Tuple(vec![Sort::Int, Sort::Int]);
        let s = store.mk_var("s", pair);
        let c = store.mk_var("c", Sort::Bool);
        let a = store.mk_var("a", Sort::Int);
        let b = store.mk_var("b", Sort::Int);
        let first = store.mk_field(s, 0).unwrap();
        let t1 = store.mk_tuple(vec![a, first]);
        let t2 = store.mk_tuple(vec![b, a]);
        let ite = store.mk_ite(c, t1, t2);
        let proj = store.mk_field(ite, 1).unwrap();
        let neg = store.mk_op(Op::Neg, vec![proj]);
        let rewriter = Rewriter::new(s, 16);
        let out = rewriter.fixpoint(&mut store, neg, &mut Syntactic).unwrap();
        assert_eq!(show(&store, out), "if c { -s.0 } else { -a }");
    }

    #[test]
    fn test_lower_tuple_equals() {
        let mut store = TermStore::new();
        let pair = Sort::Tuple(vec![Sort::Bool, Sort::Int]);
        let s = store.mk_var("s", pair);
        let p = store.mk_var("p", Sort::Bool);
        let n = store.mk_var("n", Sort::Int);
        let tuple = store.mk_tuple(vec![p, n]);
        let eq = store.mk_eq(tuple, s);
        let rewriter = Rewriter::new(s, 16);
        let out = rewriter
            .apply(Rule::LowerTupleEquals, &mut store, eq, &mut Syntactic)
            .unwrap();
        assert_eq!(show(&store, out), "((p == s.0) && (n == s.1))");
    }

    #[test]
    fn test_zero_passes_returns_input() {
        let Fixture { mut store, s, i, .. } = fixture();
        let zero = store.mk_int(0);
        let sum = store.mk_op(Op::Add, vec![s, i, zero]);
        let rewriter = Rewriter::new(s, 0);
        assert_eq!(rewriter.fixpoint(&mut store, sum, &mut Syntactic).unwrap(), sum);
    }

    #[derive(Debug, Clone)]
    enum Gen {
        S,
        I,
        Lit(i64),
        Add(Box<Gen>, Box<Gen>),
        Sub(Box<Gen>, Box<Gen>),
        Mul(Box<Gen>, Box<Gen>),
        Neg(Box<Gen>),
        Ite(Box<Cond>, Box<Gen>, Box<Gen>),
    }

    #[derive(Debug, Clone)]
    enum Cond {
        P,
        Lt(Gen, Gen),
        Eq(Gen, Gen),
        Not(Box<Cond>),
        And(Box<Cond>, Box<Cond>),
    }

    fn cond_gen(int: BoxedStrategy<Gen>) -> impl Strategy<Value = Cond> {
        let atom = prop_oneof![
            Just(Cond::P),
            (int.clone(), int.clone()).prop_map(|(a, b)| Cond::Lt(a, b)),
            (int.clone(), int).prop_map(|(a, b)| Cond::Eq(a, b)),
        ];
        atom.prop_recursive(2, 6, 2, |inner| {
            prop_oneof![
                inner.clone().prop_map(|c| Cond::Not(Box::new(c))),
                (inner.clone(), inner).prop_map(|(a, b)| Cond::And(Box::new(a), Box::new(b))),
            ]
        })
    }

    fn int_gen() -> impl Strategy<Value = Gen> {
        let leaf = prop_oneof![Just(Gen::S), Just(Gen::I), (-2i64..3).prop_map(Gen::Lit)];
        leaf.prop_recursive(4, 24, 3, |inner| {
            let boxed = inner.clone().boxed();
            prop_oneof![
                (inner.clone(), inner.clone()).prop_map(|(a, b)| Gen::Add(a.into(), b.into())),
                (inner.clone(), inner.clone()).prop_map(|(a, b)| Gen::Sub(a.into(), b.into())),
                (inner.clone(), inner.clone()).prop_map(|(a, b)| Gen::Mul(a.into(), b.into())),
                inner.clone().prop_map(|a| Gen::Neg(a.into())),
                (cond_gen(boxed), inner.clone(), inner)
                    .prop_map(|(c, a, b)| Gen::Ite(Box::new(c), a.into(), b.into())),
            ]
        })
    }

    fn build(f: &mut Fixture, g: &Gen) -> TermId {
        match g {
            Gen::S => f.s,
            Gen::I => f.i,
            Gen::Lit(v) => f.store.mk_int(*v),
            Gen::Add(a, b) | Gen::Sub(a, b) | Gen::Mul(a, b) => {
                let op = match g {
                    Gen::Add(..) => Op::Add,
                    Gen::Sub(..) => Op::Sub,
                    _ => Op::Mul,
                };
                let a = build(f, a);
                let b = build(f, b);
                f.store.mk_op(op, vec![a, b])
            }
            Gen::Neg(a) => {
                let a = build(f, a);
                f.store.mk_op(Op::Neg, vec![a])
            }
            Gen::Ite(c, a, b) => {
                let c = build_cond(f, c);
                let a = build(f, a);
                let b = build(f, b);
                f.store.mk_ite(c, a, b)
            }
        }
    }

    fn build_cond(f: &mut Fixture, c: &Cond) -> TermId {
        match c {
            Cond::P => f.p,
            Cond::Lt(a, b) | Cond::Eq(a, b) => {
                let op = if matches!(c, Cond::Lt(..)) { Op::Lt } else { Op::Eq };
                let a = build(f, a);
                let b = build(f, b);
                f.store.mk_op(op, vec![a, b])
            }
            Cond::Not(inner) => {
                let inner = build_cond(f, inner);
                f.store.mk_op(Op::Not, vec![inner])
            }
            Cond::And(a, b) => {
                let a = build_cond(f, a);
                let b = build_cond(f, b);
                f.store.mk_op(Op::And, vec![a, b])
            }
        }
    }

    proptest! {
        #[test]
        fn prop_fixpoint_is_idempotent(g in int_gen()) {
            let mut f = fixture();
            let term = build(&mut f, &g);
            let rewriter = Rewriter::new(f.s, 64);
            let once = rewriter.fixpoint(&mut f.store, term, &mut Syntactic).unwrap();
            let twice = rewriter.fixpoint(&mut f.store, once, &mut Syntactic).unwrap();
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_rewriting_preserves_meaning(
            g in int_gen(),
            s in -5i64..5,
            i in -5i64..5,
            p in any::<bool>(),
        ) {
            let mut f = fixture();
            let term = build(&mut f, &g);
            let rewriter = Rewriter::new(f.s, 64);
            let out = rewriter.fixpoint(&mut f.store, term, &mut Syntactic).unwrap();

            let mut env = Env::new();
            env.bind(&f.store, f.s, Value::Int(s)).unwrap();
            env.bind(&f.store, f.i, Value::Int(i)).unwrap();
            env.bind(&f.store, f.p, Value::Bool(p)).unwrap();
            prop_assert_eq!(eval(&f.store, term, &env).unwrap(), eval(&f.store, out, &env).unwrap());
        }
    }
}
