//! Z3 encoding of fold terms
//!
//! Tuple-sorted terms are flattened into one scalar Z3 constant per field
//! (`s@3.0`, `s@3.1`), so the solver only ever sees booleans and integers.
//! Every constant remembers the term it stands for, which lets quantifier
//! elimination results be decoded back into the term IR.

use std::time::Duration;

use rustc_hash::FxHashMap;
use z3::ast::{Ast, Bool, Dynamic, Int};
use z3::{AstKind, DeclKind, FuncDecl, Params, Solver, Sort as Z3Sort};

use crate::error::{SynthError, SynthResult};
use crate::ir::{display, Decl, Node, Op, Sort, TermId, TermStore};

/// Configuration for the SMT solver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverConfig {
    /// Timeout for each solver query (None means no timeout)
    pub timeout: Option<Duration>,
    /// Timeout for each quantifier elimination (None means no timeout)
    pub qe_timeout: Option<Duration>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            qe_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl SolverConfig {
    /// Create a config with no timeout
    pub fn no_timeout() -> Self {
        Self {
            timeout: None,
            qe_timeout: None,
        }
    }

    /// Create a config with a specific timeout in seconds for both budgets
    pub fn with_timeout_secs(secs: u64) -> Self {
        Self::with_timeout(Duration::from_secs(secs))
    }

    /// Create a config with a specific timeout for both budgets
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            qe_timeout: Some(timeout),
        }
    }
}

/// Create a Z3 solver with the given configuration
pub fn create_solver_with_config(cfg: &SolverConfig) -> Solver {
    let solver = Solver::new();
    if let Some(timeout) = cfg.timeout {
        let mut params = Params::new();
        params.set_u32("timeout", timeout.as_millis().min(u32::MAX as u128) as u32);
        solver.set_params(&params);
    }
    solver
}

/// A term encoded as Z3 values, one per scalar field
#[derive(Debug, Clone)]
pub enum Encoded {
    Bool(Bool),
    Int(Int),
    Tuple(Vec<Encoded>),
}

impl Encoded {
    pub fn as_bool(&self) -> SynthResult<&Bool> {
        match self {
            Encoded::Bool(b) => Ok(b),
            _ => Err(SynthError::Oracle("expected a boolean encoding".to_string())),
        }
    }

    pub fn as_int(&self) -> SynthResult<&Int> {
        match self {
            Encoded::Int(i) => Ok(i),
            _ => Err(SynthError::Oracle("expected an integer encoding".to_string())),
        }
    }

    /// Scalar leaves in field order
    pub fn flatten(&self) -> Vec<Dynamic> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(&self, out: &mut Vec<Dynamic>) {
        match self {
            Encoded::Bool(b) => out.push(Dynamic::from_ast(b)),
            Encoded::Int(i) => out.push(Dynamic::from_ast(i)),
            Encoded::Tuple(items) => items.iter().for_each(|item| item.flatten_into(out)),
        }
    }

    fn eq(&self, other: &Encoded) -> SynthResult<Bool> {
        match (self, other) {
            (Encoded::Bool(a), Encoded::Bool(b)) => Ok(a.eq(b)),
            (Encoded::Int(a), Encoded::Int(b)) => Ok(a.eq(b)),
            (Encoded::Tuple(a), Encoded::Tuple(b)) if a.len() == b.len() => {
                let conjuncts = a
                    .iter()
                    .zip(b)
                    .map(|(x, y)| x.eq(y))
                    .collect::<SynthResult<Vec<_>>>()?;
                Ok(Bool::and(&conjuncts))
            }
            _ => Err(SynthError::Oracle(
                "equality between differently shaped encodings".to_string(),
            )),
        }
    }

    fn ite(cond: &Bool, then: &Encoded, els: &Encoded) -> SynthResult<Encoded> {
        match (then, els) {
            (Encoded::Bool(a), Encoded::Bool(b)) => Ok(Encoded::Bool(cond.ite(a, b))),
            (Encoded::Int(a), Encoded::Int(b)) => Ok(Encoded::Int(cond.ite(a, b))),
            (Encoded::Tuple(a), Encoded::Tuple(b)) if a.len() == b.len() => Ok(Encoded::Tuple(
                a.iter()
                    .zip(b)
                    .map(|(x, y)| Encoded::ite(cond, x, y))
                    .collect::<SynthResult<_>>()?,
            )),
            _ => Err(SynthError::Oracle(
                "conditional over differently shaped encodings".to_string(),
            )),
        }
    }
}

/// Which scalar field of which term a Z3 constant stands for
#[derive(Debug, Clone, PartialEq, Eq)]
struct Origin {
    root: TermId,
    path: Vec<usize>,
}

/// Per-query translator between terms and Z3 expressions
#[derive(Default)]
pub struct Encoder {
    cache: FxHashMap<TermId, Encoded>,
    origins: FxHashMap<String, Origin>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode a boolean term
    pub fn encode_bool(&mut self, store: &TermStore, term: TermId) -> SynthResult<Bool> {
        let encoded = self.encode(store, term)?;
        encoded.as_bool().cloned()
    }

    /// Encode any term
    pub fn encode(&mut self, store: &TermStore, term: TermId) -> SynthResult<Encoded> {
        if let Some(done) = self.cache.get(&term) {
            return Ok(done.clone());
        }
        let encoded = match store.node(term) {
            Node::Var { name, sort } => {
                self.constants(term, &format!("{}@{}", name, term.index()), sort)
            }
            Node::Param { index, sort } => self.constants(term, &format!("g{}!", index), sort),
            Node::Marker { id, sort } => self.constants(term, &format!("!m{}", id), sort),
            Node::Bool(b) => Encoded::Bool(Bool::from_bool(*b)),
            Node::Int(v) => Encoded::Int(Int::from_i64(*v)),
            Node::App {
                decl: Decl::Op(op),
                args,
            } => {
                let args = args.clone();
                self.encode_op(store, *op, &args)?
            }
            Node::App {
                decl: Decl::State(id),
                args,
            } => {
                let mut flat = Vec::new();
                for arg in args.clone() {
                    flat.extend(self.encode(store, arg)?.flatten());
                }
                let name = format!("{}", id);
                encode_uninterpreted(&name, &flat, store.sort(term), &mut 0)
            }
            Node::Ite { cond, then, els } => {
                let (cond, then, els) = (*cond, *then, *els);
                let cond = self.encode_bool(store, cond)?;
                let then = self.encode(store, then)?;
                let els = self.encode(store, els)?;
                Encoded::ite(&cond, &then, &els)?
            }
            Node::Tuple(items) => Encoded::Tuple(
                items
                    .clone()
                    .into_iter()
                    .map(|item| self.encode(store, item))
                    .collect::<SynthResult<_>>()?,
            ),
            Node::Field { tuple, index } => {
                let index = *index;
                match self.encode(store, *tuple)? {
                    Encoded::Tuple(mut items) if index < items.len() => items.swap_remove(index),
                    _ => {
                        return Err(SynthError::Oracle(format!(
                            "field access on non-tuple `{}`",
                            display(store, term)
                        )))
                    }
                }
            }
        };
        self.cache.insert(term, encoded.clone());
        Ok(encoded)
    }

    fn constants(&mut self, root: TermId, base: &str, sort: &Sort) -> Encoded {
        self.constants_at(root, base, sort, &mut Vec::new())
    }

    fn constants_at(
        &mut self,
        root: TermId,
        name: &str,
        sort: &Sort,
        path: &mut Vec<usize>,
    ) -> Encoded {
        let origin = || Origin {
            root,
            path: path.clone(),
        };
        match sort {
            Sort::Bool => {
                self.origins.insert(name.to_string(), origin());
                Encoded::Bool(Bool::new_const(name))
            }
            Sort::Int => {
                self.origins.insert(name.to_string(), origin());
                Encoded::Int(Int::new_const(name))
            }
            Sort::Tuple(fields) => {
                let mut items = Vec::with_capacity(fields.len());
                for (k, field) in fields.iter().enumerate() {
                    path.push(k);
                    items.push(self.constants_at(root, &format!("{}.{}", name, k), field, path));
                    path.pop();
                }
                Encoded::Tuple(items)
            }
        }
    }

    fn encode_op(&mut self, store: &TermStore, op: Op, args: &[TermId]) -> SynthResult<Encoded> {
        let arity = |n: usize| -> SynthResult<()> {
            if args.len() == n {
                Ok(())
            } else {
                Err(SynthError::Oracle(format!(
                    "operator {} with {} operands",
                    op,
                    args.len()
                )))
            }
        };
        let encoded = match op {
            Op::Not => {
                arity(1)?;
                Encoded::Bool(self.encode_bool(store, args[0])?.not())
            }
            Op::Neg => {
                arity(1)?;
                Encoded::Int(self.encode_int(store, args[0])?.unary_minus())
            }
            Op::And | Op::Or => {
                let operands = args
                    .iter()
                    .map(|a| self.encode_bool(store, *a))
                    .collect::<SynthResult<Vec<_>>>()?;
                Encoded::Bool(if op == Op::And {
                    Bool::and(&operands)
                } else {
                    Bool::or(&operands)
                })
            }
            Op::Xor => {
                arity(2)?;
                let l = self.encode_bool(store, args[0])?;
                let r = self.encode_bool(store, args[1])?;
                Encoded::Bool(l.xor(&r))
            }
            Op::Eq => {
                arity(2)?;
                let l = self.encode(store, args[0])?;
                let r = self.encode(store, args[1])?;
                Encoded::Bool(l.eq(&r)?)
            }
            Op::Lt | Op::Le | Op::Gt | Op::Ge => {
                arity(2)?;
                let l = self.encode_int(store, args[0])?;
                let r = self.encode_int(store, args[1])?;
                Encoded::Bool(match op {
                    Op::Lt => l.lt(&r),
                    Op::Le => l.le(&r),
                    Op::Gt => l.gt(&r),
                    _ => l.ge(&r),
                })
            }
            Op::Add | Op::Mul => {
                let operands = args
                    .iter()
                    .map(|a| self.encode_int(store, *a))
                    .collect::<SynthResult<Vec<_>>>()?;
                Encoded::Int(if op == Op::Add {
                    Int::add(&operands)
                } else {
                    Int::mul(&operands)
                })
            }
            Op::Sub | Op::Div | Op::Mod => {
                arity(2)?;
                let l = self.encode_int(store, args[0])?;
                let r = self.encode_int(store, args[1])?;
                Encoded::Int(match op {
                    Op::Sub => Int::sub(&[l, r]),
                    Op::Div => l.div(&r),
                    _ => l.modulo(&r),
                })
            }
        };
        Ok(encoded)
    }

    fn encode_int(&mut self, store: &TermStore, term: TermId) -> SynthResult<Int> {
        let encoded = self.encode(store, term)?;
        encoded.as_int().cloned()
    }

    /// Decode a boolean Z3 formula produced from this encoder's constants
    ///
    /// Returns `None` when the formula uses anything outside the term
    /// language, such as a leftover quantifier or an unknown constant.
    pub fn decode(&self, store: &mut TermStore, ast: &Dynamic) -> SynthResult<Option<TermId>> {
        if ast.kind() == AstKind::Numeral {
            return Ok(ast
                .as_int()
                .and_then(|i| i.as_i64())
                .map(|v| store.mk_int(v)));
        }
        if ast.kind() != AstKind::App {
            return Ok(None);
        }
        if let Some(b) = ast.as_bool().and_then(|b| b.as_bool()) {
            return Ok(Some(store.mk_bool(b)));
        }
        let decl = ast.decl();
        let mut children = Vec::new();
        for child in ast.children() {
            match self.decode(store, &child)? {
                Some(term) => children.push(term),
                None => return Ok(None),
            }
        }
        let term = match decl.kind() {
            DeclKind::AND => store.mk_and(children),
            DeclKind::OR => store.mk_or(children),
            DeclKind::NOT if children.len() == 1 => store.mk_op(Op::Not, children),
            DeclKind::IMPLIES if children.len() == 2 => {
                let premise = store.mk_op(Op::Not, vec![children[0]]);
                store.mk_or(vec![premise, children[1]])
            }
            DeclKind::EQ | DeclKind::IFF if children.len() == 2 => store.mk_op(Op::Eq, children),
            DeclKind::DISTINCT if children.len() == 2 => {
                let eq = store.mk_op(Op::Eq, children);
                store.mk_op(Op::Not, vec![eq])
            }
            DeclKind::XOR if children.len() == 2 => store.mk_op(Op::Xor, children),
            DeclKind::ITE if children.len() == 3 => {
                store.mk_ite(children[0], children[1], children[2])
            }
            DeclKind::LE if children.len() == 2 => store.mk_op(Op::Le, children),
            DeclKind::GE if children.len() == 2 => store.mk_op(Op::Ge, children),
            DeclKind::LT if children.len() == 2 => store.mk_op(Op::Lt, children),
            DeclKind::GT if children.len() == 2 => store.mk_op(Op::Gt, children),
            DeclKind::ADD if !children.is_empty() => store.mk_op(Op::Add, children),
            DeclKind::MUL if !children.is_empty() => store.mk_op(Op::Mul, children),
            DeclKind::SUB if !children.is_empty() => {
                let mut iter = children.into_iter();
                let mut acc = match iter.next() {
                    Some(first) => first,
                    None => return Ok(None),
                };
                for next in iter {
                    acc = store.mk_op(Op::Sub, vec![acc, next]);
                }
                acc
            }
            DeclKind::UMINUS if children.len() == 1 => store.mk_op(Op::Neg, children),
            DeclKind::DIV | DeclKind::IDIV if children.len() == 2 => {
                store.mk_op(Op::Div, children)
            }
            DeclKind::MOD if children.len() == 2 => store.mk_op(Op::Mod, children),
            DeclKind::UNINTERPRETED if children.is_empty() => {
                match self.origins.get(&decl.name()) {
                    Some(origin) => {
                        let mut term = origin.root;
                        for &index in &origin.path {
                            term = store.mk_field(term, index)?;
                        }
                        term
                    }
                    None => return Ok(None),
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(term))
    }
}

fn encode_uninterpreted(name: &str, args: &[Dynamic], sort: &Sort, next: &mut usize) -> Encoded {
    match sort {
        Sort::Tuple(fields) => Encoded::Tuple(
            fields
                .iter()
                .map(|field| encode_uninterpreted(name, args, field, next))
                .collect(),
        ),
        scalar => {
            let field_name = format!("{}!{}", name, *next);
            *next += 1;
            let domain: Vec<Z3Sort> = args.iter().map(|a| a.get_sort()).collect();
            let domain_refs: Vec<&Z3Sort> = domain.iter().collect();
            let range = if *scalar == Sort::Bool {
                Z3Sort::bool()
            } else {
                Z3Sort::int()
            };
            let decl = FuncDecl::new(field_name, &domain_refs, &range);
            let arg_refs: Vec<&dyn Ast> = args.iter().map(|a| a as &dyn Ast).collect();
            let app = decl.apply(&arg_refs);
            match app.as_bool() {
                Some(b) => Encoded::Bool(b),
                None => Encoded::Int(app.as_int().unwrap_or_else(|| Int::from_i64(0))),
            }
        }
    }
}
