//! Generic term utilities: substitution, containment and printing

use crate::error::SynthResult;
use crate::ir::term::{Node, TermId, TermStore};
use crate::ir::types::{Decl, Op};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;

/// Replace every occurrence of a key of `map` in `term` by its value
///
/// Replacement is not re-entrant: substituted terms are not searched again.
pub fn substitute(
    store: &mut TermStore,
    term: TermId,
    map: &FxHashMap<TermId, TermId>,
) -> SynthResult<TermId> {
    let mut memo = FxHashMap::default();
    substitute_rec(store, term, map, &mut memo)
}

fn substitute_rec(
    store: &mut TermStore,
    term: TermId,
    map: &FxHashMap<TermId, TermId>,
    memo: &mut FxHashMap<TermId, TermId>,
) -> SynthResult<TermId> {
    if let Some(&to) = map.get(&term) {
        return Ok(to);
    }
    if let Some(&done) = memo.get(&term) {
        return Ok(done);
    }
    let children = store.args(term);
    let result = if children.is_empty() {
        term
    } else {
        let mut changed = false;
        let mut new_children = Vec::with_capacity(children.len());
        for child in children {
            let new_child = substitute_rec(store, child, map, memo)?;
            changed |= new_child != child;
            new_children.push(new_child);
        }
        if changed {
            store.with_args(term, new_children)?
        } else {
            term
        }
    };
    memo.insert(term, result);
    Ok(result)
}

/// Substitute a single subterm
pub fn substitute_one(
    store: &mut TermStore,
    term: TermId,
    from: TermId,
    to: TermId,
) -> SynthResult<TermId> {
    let mut map = FxHashMap::default();
    map.insert(from, to);
    substitute(store, term, &map)
}

/// Does `target` occur anywhere inside `term` (including `term` itself)?
pub fn contains(store: &TermStore, term: TermId, target: TermId) -> bool {
    any_subterm(store, term, |id, _| id == target)
}

/// Does any subterm satisfy `pred`?
pub fn any_subterm(store: &TermStore, term: TermId, pred: impl Fn(TermId, &Node) -> bool) -> bool {
    let mut seen = FxHashSet::default();
    let mut stack = vec![term];
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        if pred(id, store.node(id)) {
            return true;
        }
        stack.extend(store.args(id));
    }
    false
}

/// Variables occurring in `term`, in first-occurrence order
pub fn free_vars(store: &TermStore, term: TermId) -> Vec<TermId> {
    subterms_where(store, term, |node| matches!(node, Node::Var { .. }))
}

/// Shape parameters occurring in `term`, ordered by parameter index
pub fn params(store: &TermStore, term: TermId) -> Vec<TermId> {
    let mut found = subterms_where(store, term, |node| matches!(node, Node::Param { .. }));
    found.sort_by_key(|id| match store.node(*id) {
        Node::Param { index, .. } => *index,
        _ => u32::MAX,
    });
    found
}

/// Distinct subterms whose node satisfies `pred`, in pre-order
pub fn subterms_where(store: &TermStore, term: TermId, pred: impl Fn(&Node) -> bool) -> Vec<TermId> {
    let mut seen = FxHashSet::default();
    let mut found = Vec::new();
    let mut stack = vec![term];
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        if pred(store.node(id)) {
            found.push(id);
        }
        // Reverse so children are visited left to right
        stack.extend(store.args(id).into_iter().rev());
    }
    found
}

/// Printable view of a term
pub struct TermDisplay<'a> {
    store: &'a TermStore,
    term: TermId,
}

/// Wrap a term for `Display`
pub fn display(store: &TermStore, term: TermId) -> TermDisplay<'_> {
    TermDisplay { store, term }
}

impl fmt::Display for TermDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_term(self.store, self.term, f)
    }
}

fn write_list(store: &TermStore, args: &[TermId], sep: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write_term(store, *arg, f)?;
    }
    Ok(())
}

fn write_term(store: &TermStore, term: TermId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match store.node(term) {
        Node::Var { name, .. } => write!(f, "{}", name),
        Node::Bool(b) => write!(f, "{}", b),
        Node::Int(v) => write!(f, "{}", v),
        Node::Param { index, .. } => write!(f, "g{}", index),
        Node::Marker { id, .. } => write!(f, "#{}", id),
        Node::App {
            decl: Decl::Op(op),
            args,
        } => {
            if op.is_unary() {
                write!(f, "{}", op)?;
                return write_term(store, args[0], f);
            }
            write!(f, "(")?;
            write_list(store, args, &format!(" {} ", op), f)?;
            write!(f, ")")
        }
        Node::App {
            decl: Decl::State(id),
            args,
        } => {
            write!(f, "{}", id)?;
            if !args.is_empty() {
                write!(f, "(")?;
                write_list(store, args, ", ", f)?;
                write!(f, ")")?;
            }
            Ok(())
        }
        Node::Ite { cond, then, els } => {
            write!(f, "if ")?;
            write_term(store, *cond, f)?;
            write!(f, " {{ ")?;
            write_term(store, *then, f)?;
            write!(f, " }} else {{ ")?;
            write_term(store, *els, f)?;
            write!(f, " }}")
        }
        Node::Tuple(args) => {
            write!(f, "(")?;
            write_list(store, args, ", ", f)?;
            if args.len() == 1 {
                write!(f, ",")?;
            }
            write!(f, ")")
        }
        Node::Field { tuple, index } => {
            write_term(store, *tuple, f)?;
            write!(f, ".{}", index)
        }
    }
}
