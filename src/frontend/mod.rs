//! Reducer front end
//!
//! A reducer is a two-parameter expression tree `|state, input| body` in a
//! small expression language. [`Aggregation::from_reducer`] lowers it into the
//! term IR, rejecting every construct outside that language.

use std::fmt;

use crate::error::{SynthError, SynthResult};
use crate::ir::{display, utils, Op, Sort, TermId, TermStore};
use crate::semantics::concrete::{self, Env, Value};

/// Parameter type as written by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    Int,
    Bool,
    Tuple(Vec<TypeExpr>),
    /// Any other type name; always rejected
    Named(String),
}

impl TypeExpr {
    fn to_sort(&self) -> SynthResult<Sort> {
        match self {
            TypeExpr::Int => Ok(Sort::Int),
            TypeExpr::Bool => Ok(Sort::Bool),
            TypeExpr::Tuple(fields) => {
                if fields.is_empty() {
                    return Err(SynthError::UnsupportedExpression(
                        "unit parameter type".to_string(),
                    ));
                }
                Ok(Sort::Tuple(
                    fields
                        .iter()
                        .map(TypeExpr::to_sort)
                        .collect::<SynthResult<_>>()?,
                ))
            }
            TypeExpr::Named(name) => Err(SynthError::UnsupportedExpression(format!(
                "parameter type `{}`",
                name
            ))),
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Int => write!(f, "int"),
            TypeExpr::Bool => write!(f, "bool"),
            TypeExpr::Named(name) => write!(f, "{}", name),
            TypeExpr::Tuple(fields) => {
                write!(f, "(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Named, typed reducer parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: TypeExpr) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Xor => "^",
        }
    }

    /// IR operator; `!=` has none and is lowered separately
    fn lower(&self) -> Option<Op> {
        Some(match self {
            BinaryOp::Add => Op::Add,
            BinaryOp::Sub => Op::Sub,
            BinaryOp::Mul => Op::Mul,
            BinaryOp::Div => Op::Div,
            BinaryOp::Mod => Op::Mod,
            BinaryOp::Eq => Op::Eq,
            BinaryOp::Ne => return None,
            BinaryOp::Lt => Op::Lt,
            BinaryOp::Le => Op::Le,
            BinaryOp::Gt => Op::Gt,
            BinaryOp::Ge => Op::Ge,
            BinaryOp::And => Op::And,
            BinaryOp::Or => Op::Or,
            BinaryOp::Xor => Op::Xor,
        })
    }
}

/// Host expression tree of a reducer body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Ident(String),
    Int(i64),
    Bool(bool),
    Str(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        els: Box<Expr>,
    },
    Tuple(Vec<Expr>),
    Field(Box<Expr>, usize),
    Call { name: String, args: Vec<Expr> },
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident(name.into())
    }

    pub fn unary(op: UnaryOp, arg: Expr) -> Self {
        Expr::Unary(op, Box::new(arg))
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn if_else(cond: Expr, then: Expr, els: Expr) -> Self {
        Expr::If {
            cond: Box::new(cond),
            then: Box::new(then),
            els: Box::new(els),
        }
    }

    pub fn field(tuple: Expr, index: usize) -> Self {
        Expr::Field(Box::new(tuple), index)
    }
}

/// `|state, input| body`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reducer {
    pub state: Param,
    pub input: Param,
    pub body: Expr,
}

/// Symbolic form of a reducer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aggregation {
    state_var: TermId,
    input_var: TermId,
    body: TermId,
}

impl Aggregation {
    /// Validate an aggregation triple
    pub fn new(
        store: &TermStore,
        state_var: TermId,
        input_var: TermId,
        body: TermId,
    ) -> SynthResult<Self> {
        use crate::ir::Node;

        let var_name = |id: TermId| match store.node(id) {
            Node::Var { name, .. } => Some(name.clone()),
            _ => None,
        };
        let (Some(state_name), Some(input_name)) = (var_name(state_var), var_name(input_var))
        else {
            return Err(SynthError::InvalidAggregation(
                "state and input must be variables".to_string(),
            ));
        };
        if state_name == input_name {
            return Err(SynthError::InvalidAggregation(format!(
                "state and input share the name `{}`",
                state_name
            )));
        }
        if store.sort(body) != store.sort(state_var) {
            return Err(SynthError::InvalidAggregation(format!(
                "body has sort {} but the state has sort {}",
                store.sort(body),
                store.sort(state_var)
            )));
        }
        if let Some(stray) = utils::free_vars(store, body)
            .into_iter()
            .find(|v| *v != state_var && *v != input_var)
        {
            return Err(SynthError::InvalidAggregation(format!(
                "body mentions free variable `{}`",
                display(store, stray)
            )));
        }
        if utils::any_subterm(store, body, |_, node| {
            !matches!(
                node,
                Node::Var { .. }
                    | Node::Bool(_)
                    | Node::Int(_)
                    | Node::App {
                        decl: crate::ir::Decl::Op(_),
                        ..
                    }
                    | Node::Ite { .. }
                    | Node::Tuple(_)
                    | Node::Field { .. }
            )
        }) {
            return Err(SynthError::InvalidAggregation(
                "body contains synthesis-internal terms".to_string(),
            ));
        }
        Ok(Self {
            state_var,
            input_var,
            body,
        })
    }

    /// Lower a reducer into an aggregation
    pub fn from_reducer(store: &mut TermStore, reducer: &Reducer) -> SynthResult<Self> {
        let state_sort = reducer.state.ty.to_sort()?;
        let input_sort = reducer.input.ty.to_sort()?;
        if reducer.state.name == reducer.input.name {
            return Err(SynthError::InvalidAggregation(format!(
                "state and input share the name `{}`",
                reducer.state.name
            )));
        }
        let state_var = store.mk_var(reducer.state.name.as_str(), state_sort);
        let input_var = store.mk_var(reducer.input.name.as_str(), input_sort);
        let scope = [
            (reducer.state.name.as_str(), state_var),
            (reducer.input.name.as_str(), input_var),
        ];
        let body = lower(store, &scope, &reducer.body)?;
        Self::new(store, state_var, input_var, body)
    }

    pub fn state_var(&self) -> TermId {
        self.state_var
    }

    pub fn input_var(&self) -> TermId {
        self.input_var
    }

    pub fn body(&self) -> TermId {
        self.body
    }

    pub fn state_sort<'a>(&self, store: &'a TermStore) -> &'a Sort {
        store.sort(self.state_var)
    }

    pub fn input_sort<'a>(&self, store: &'a TermStore) -> &'a Sort {
        store.sort(self.input_var)
    }

    /// Apply the reducer once
    pub fn step(&self, store: &TermStore, state: Value, input: &Value) -> SynthResult<Value> {
        let mut env = Env::new();
        env.bind(store, self.state_var, state)?;
        env.bind(store, self.input_var, input.clone())?;
        concrete::eval(store, self.body, &env)
    }

    /// Reference left-to-right fold
    pub fn fold(&self, store: &TermStore, initial: Value, inputs: &[Value]) -> SynthResult<Value> {
        inputs
            .iter()
            .try_fold(initial, |state, input| self.step(store, state, input))
    }
}

fn unsupported(what: impl Into<String>) -> SynthError {
    SynthError::UnsupportedExpression(what.into())
}

fn lower(store: &mut TermStore, scope: &[(&str, TermId)], expr: &Expr) -> SynthResult<TermId> {
    match expr {
        Expr::Ident(name) => scope
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
            .ok_or_else(|| unsupported(format!("unknown identifier `{}`", name))),
        Expr::Int(v) => Ok(store.mk_int(*v)),
        Expr::Bool(b) => Ok(store.mk_bool(*b)),
        Expr::Str(s) => Err(unsupported(format!("string literal {:?}", s))),
        Expr::Call { name, .. } => Err(unsupported(format!("call to `{}`", name))),
        Expr::Unary(op, arg) => {
            let arg = lower(store, scope, arg)?;
            let sort = store.sort(arg).clone();
            match (op, &sort) {
                (UnaryOp::Not, Sort::Bool) => Ok(store.mk_op(Op::Not, vec![arg])),
                (UnaryOp::Neg, Sort::Int) => Ok(store.mk_op(Op::Neg, vec![arg])),
                (UnaryOp::Plus, Sort::Int) => Ok(arg),
                _ => Err(unsupported(format!("unary {:?} on {}", op, sort))),
            }
        }
        Expr::Binary(op, lhs, rhs) => {
            let lhs = lower(store, scope, lhs)?;
            let rhs = lower(store, scope, rhs)?;
            let ir_op = op.lower().unwrap_or(Op::Eq);
            if !ir_op.accepts(&[store.sort(lhs), store.sort(rhs)]) {
                return Err(unsupported(format!(
                    "operator `{}` on {} and {}",
                    op.symbol(),
                    store.sort(lhs),
                    store.sort(rhs)
                )));
            }
            let app = store.mk_op(ir_op, vec![lhs, rhs]);
            if *op == BinaryOp::Ne {
                Ok(store.mk_op(Op::Not, vec![app]))
            } else {
                Ok(app)
            }
        }
        Expr::If { cond, then, els } => {
            let cond = lower(store, scope, cond)?;
            if store.sort(cond) != &Sort::Bool {
                return Err(unsupported(format!(
                    "condition of sort {}",
                    store.sort(cond)
                )));
            }
            let then = lower(store, scope, then)?;
            let els = lower(store, scope, els)?;
            if store.sort(then) != store.sort(els) {
                return Err(unsupported(format!(
                    "conditional branches of sorts {} and {}",
                    store.sort(then),
                    store.sort(els)
                )));
            }
            Ok(store.mk_ite(cond, then, els))
        }
        Expr::Tuple(items) => {
            if items.is_empty() {
                return Err(unsupported("unit value"));
            }
            let items = items
                .iter()
                .map(|item| lower(store, scope, item))
                .collect::<SynthResult<Vec<_>>>()?;
            Ok(store.mk_tuple(items))
        }
        Expr::Field(tuple, index) => {
            let tuple = lower(store, scope, tuple)?;
            store
                .mk_field(tuple, *index)
                .map_err(|_| unsupported(format!("field .{} of {}", index, store.sort(tuple))))
        }
    }
}
