//! Hash-consed term arena
//!
//! Terms are interned in a [`TermStore`] and referenced by [`TermId`]
//! indices. Interning makes structural equality an index comparison, which
//! is what shape and state deduplication rely on.

use crate::error::{SynthError, SynthResult};
use crate::ir::types::{Decl, Op, Sort, StateId};
use rustc_hash::FxHashMap;

/// Index of an interned term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TermId(u32);

impl TermId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Term node; the interning key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Node {
    Var { name: String, sort: Sort },
    Bool(bool),
    Int(i64),
    /// Shape parameter `g<index>`
    Param { index: u32, sort: Sort },
    /// Opaque sentinel; every marker carries a fresh id so none is ever shared
    Marker { id: u32, sort: Sort },
    App { decl: Decl, args: Vec<TermId> },
    Ite { cond: TermId, then: TermId, els: TermId },
    Tuple(Vec<TermId>),
    Field { tuple: TermId, index: usize },
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        match self {
            Node::App { args, .. } => args.is_empty(),
            Node::Ite { .. } | Node::Tuple(_) | Node::Field { .. } => false,
            _ => true,
        }
    }
}

#[derive(Debug, Clone)]
struct TermData {
    node: Node,
    sort: Sort,
    size: u32,
}

/// Arena of interned terms
#[derive(Debug, Default)]
pub struct TermStore {
    terms: Vec<TermData>,
    index: FxHashMap<Node, TermId>,
    next_marker: u32,
    numeral_markers: FxHashMap<i64, TermId>,
    scratch_markers: FxHashMap<(u32, Sort), TermId>,
}

impl TermStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of interned terms
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    #[inline]
    pub fn node(&self, id: TermId) -> &Node {
        &self.terms[id.index()].node
    }

    #[inline]
    pub fn sort(&self, id: TermId) -> &Sort {
        &self.terms[id.index()].sort
    }

    /// Structural size of the term viewed as a tree
    #[inline]
    pub fn size(&self, id: TermId) -> u32 {
        self.terms[id.index()].size
    }

    fn intern(&mut self, node: Node, sort: Sort) -> TermId {
        if let Some(&id) = self.index.get(&node) {
            return id;
        }
        let size = 1u32.saturating_add(
            self.children(&node)
                .iter()
                .fold(0u32, |acc, c| acc.saturating_add(self.size(*c))),
        );
        let id = TermId(self.terms.len() as u32);
        self.terms.push(TermData {
            node: node.clone(),
            sort,
            size,
        });
        self.index.insert(node, id);
        id
    }

    fn children(&self, node: &Node) -> Vec<TermId> {
        match node {
            Node::App { args, .. } => args.clone(),
            Node::Ite { cond, then, els } => vec![*cond, *then, *els],
            Node::Tuple(args) => args.clone(),
            Node::Field { tuple, .. } => vec![*tuple],
            _ => Vec::new(),
        }
    }

    /// Direct children in left-to-right order
    pub fn args(&self, id: TermId) -> Vec<TermId> {
        self.children(self.node(id))
    }

    pub fn mk_var(&mut self, name: impl Into<String>, sort: Sort) -> TermId {
        let name = name.into();
        self.intern(
            Node::Var {
                name,
                sort: sort.clone(),
            },
            sort,
        )
    }

    pub fn mk_bool(&mut self, value: bool) -> TermId {
        self.intern(Node::Bool(value), Sort::Bool)
    }

    pub fn mk_int(&mut self, value: i64) -> TermId {
        self.intern(Node::Int(value), Sort::Int)
    }

    pub fn mk_param(&mut self, index: u32, sort: Sort) -> TermId {
        self.intern(
            Node::Param {
                index,
                sort: sort.clone(),
            },
            sort,
        )
    }

    /// Mint a marker distinct from every other term
    pub fn fresh_marker(&mut self, sort: Sort) -> TermId {
        let id = self.next_marker;
        self.next_marker += 1;
        self.intern(
            Node::Marker {
                id,
                sort: sort.clone(),
            },
            sort,
        )
    }

    /// Marker standing in for an integer literal while simplifying
    ///
    /// One marker per literal value keeps the arena bounded across the many
    /// simplifier passes of a session.
    pub fn numeral_marker(&mut self, value: i64) -> TermId {
        if let Some(&marker) = self.numeral_markers.get(&value) {
            return marker;
        }
        let marker = self.fresh_marker(Sort::Int);
        self.numeral_markers.insert(value, marker);
        marker
    }

    /// Marker for slot `slot` of a caller's scratch space
    ///
    /// The same slot and sort always give the same marker. Callers must not
    /// let scratch markers escape into terms that outlive the call.
    pub fn scratch_marker(&mut self, slot: u32, sort: Sort) -> TermId {
        let key = (slot, sort);
        if let Some(&marker) = self.scratch_markers.get(&key) {
            return marker;
        }
        let marker = self.fresh_marker(key.1.clone());
        self.scratch_markers.insert(key, marker);
        marker
    }

    /// Operator application without any simplification
    pub fn mk_op(&mut self, op: Op, args: Vec<TermId>) -> TermId {
        self.intern(
            Node::App {
                decl: Decl::Op(op),
                args,
            },
            op.result_sort(),
        )
    }

    pub fn mk_state_app(&mut self, state: StateId, args: Vec<TermId>, sort: Sort) -> TermId {
        self.intern(
            Node::App {
                decl: Decl::State(state),
                args,
            },
            sort,
        )
    }

    pub fn mk_not(&mut self, arg: TermId) -> TermId {
        match self.node(arg) {
            Node::Bool(b) => {
                let b = !*b;
                self.mk_bool(b)
            }
            _ => self.mk_op(Op::Not, vec![arg]),
        }
    }

    /// Conjunction; empty is `true`, a single conjunct is returned as is
    pub fn mk_and(&mut self, args: Vec<TermId>) -> TermId {
        match args.len() {
            0 => self.mk_bool(true),
            1 => args[0],
            _ => self.mk_op(Op::And, args),
        }
    }

    /// Disjunction; empty is `false`, a single disjunct is returned as is
    pub fn mk_or(&mut self, args: Vec<TermId>) -> TermId {
        match args.len() {
            0 => self.mk_bool(false),
            1 => args[0],
            _ => self.mk_op(Op::Or, args),
        }
    }

    pub fn mk_eq(&mut self, lhs: TermId, rhs: TermId) -> TermId {
        self.mk_op(Op::Eq, vec![lhs, rhs])
    }

    pub fn mk_ite(&mut self, cond: TermId, then: TermId, els: TermId) -> TermId {
        let sort = self.sort(then).clone();
        self.intern(Node::Ite { cond, then, els }, sort)
    }

    pub fn mk_tuple(&mut self, args: Vec<TermId>) -> TermId {
        let sort = Sort::Tuple(args.iter().map(|a| self.sort(*a).clone()).collect());
        self.intern(Node::Tuple(args), sort)
    }

    pub fn mk_field(&mut self, tuple: TermId, index: usize) -> SynthResult<TermId> {
        let sort = self.sort(tuple).field(index).cloned().ok_or_else(|| {
            SynthError::MalformedStrategy(format!(
                "field {} of non-tuple or short term of sort {}",
                index,
                self.sort(tuple)
            ))
        })?;
        Ok(self.intern(Node::Field { tuple, index }, sort))
    }

    /// Rebuild `id` with new children, keeping its head symbol
    pub fn with_args(&mut self, id: TermId, args: Vec<TermId>) -> SynthResult<TermId> {
        let rebuilt = match self.node(id).clone() {
            Node::App { decl, .. } => {
                let sort = self.sort(id).clone();
                self.intern(Node::App { decl, args }, sort)
            }
            Node::Ite { .. } => match args.as_slice() {
                [cond, then, els] => self.mk_ite(*cond, *then, *els),
                _ => {
                    return Err(SynthError::MalformedStrategy(
                        "if-then-else rebuilt with wrong arity".to_string(),
                    ))
                }
            },
            Node::Tuple(_) => self.mk_tuple(args),
            Node::Field { index, .. } => match args.as_slice() {
                [tuple] => self.mk_field(*tuple, index)?,
                _ => {
                    return Err(SynthError::MalformedStrategy(
                        "field access rebuilt with wrong arity".to_string(),
                    ))
                }
            },
            _ => id,
        };
        Ok(rebuilt)
    }

    pub fn as_bool(&self, id: TermId) -> Option<bool> {
        match self.node(id) {
            Node::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self, id: TermId) -> Option<i64> {
        match self.node(id) {
            Node::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_ite(&self, id: TermId) -> bool {
        matches!(self.node(id), Node::Ite { .. })
    }

    /// Operator and arguments if `id` is an operator application
    pub fn as_op(&self, id: TermId) -> Option<(Op, &[TermId])> {
        match self.node(id) {
            Node::App {
                decl: Decl::Op(op),
                args,
            } => Some((*op, args.as_slice())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_shares_structure() {
        let mut store = TermStore::new();
        let x = store.mk_var("x", Sort::Int);
        let one = store.mk_int(1);
        let a = store.mk_op(Op::Add, vec![x, one]);
        let b = store.mk_op(Op::Add, vec![x, one]);
        assert_eq!(a, b);
        assert_eq!(store.size(a), 3);
        assert_eq!(store.sort(a), &Sort::Int);
    }

    #[test]
    fn test_same_name_different_sort_is_distinct() {
        let mut store = TermStore::new();
        let a = store.mk_var("x", Sort::Int);
        let b = store.mk_var("x", Sort::Bool);
        assert_ne!(a, b);
    }

    #[test]
    fn test_markers_are_never_shared() {
        let mut store = TermStore::new();
        let m1 = store.fresh_marker(Sort::Int);
        let m2 = store.fresh_marker(Sort::Int);
        assert_ne!(m1, m2);
        assert_eq!(store.numeral_marker(7), store.numeral_marker(7));
        assert_ne!(store.numeral_marker(7), store.numeral_marker(8));
    }

    #[test]
    fn test_scratch_markers_are_reused_per_slot() {
        let mut store = TermStore::new();
        let a = store.scratch_marker(0, Sort::Int);
        let len = store.len();
        assert_eq!(store.scratch_marker(0, Sort::Int), a);
        assert_eq!(store.len(), len);
        assert_ne!(store.scratch_marker(1, Sort::Int), a);
        assert_ne!(store.scratch_marker(0, Sort::Bool), a);
        assert_ne!(store.fresh_marker(Sort::Int), a);
    }

    #[test]
    fn test_field_sort_and_errors() {
        let mut store = TermStore::new();
        let b = store.mk_bool(true);
        let n = store.mk_int(3);
        let pair = store.mk_tuple(vec![b, n]);
        let second = store.mk_field(pair, 1).unwrap();
        assert_eq!(store.sort(second), &Sort::Int);
        assert!(store.mk_field(pair, 2).is_err());
        assert!(store.mk_field(n, 0).is_err());
    }

    #[test]
    fn test_smart_connectives() {
        let mut store = TermStore::new();
        let t = store.mk_bool(true);
        assert_eq!(store.mk_and(vec![]), t);
        let p = store.mk_var("p", Sort::Bool);
        assert_eq!(store.mk_or(vec![p]), p);
        let f = store.mk_not(t);
        assert_eq!(store.as_bool(f), Some(false));
    }

    #[test]
    fn test_with_args_rebuilds_head() {
        let mut store = TermStore::new();
        let c = store.mk_var("c", Sort::Bool);
        let x = store.mk_int(1);
        let y = store.mk_int(2);
        let ite = store.mk_ite(c, x, y);
        let swapped = store.with_args(ite, vec![c, y, x]).unwrap();
        assert_eq!(store.args(swapped), vec![c, y, x]);
        assert!(store.with_args(ite, vec![c]).is_err());
    }
}
