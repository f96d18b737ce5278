//! Concrete interpreter for fold terms
//!
//! Integers are 64-bit. Arithmetic that leaves that range is an evaluation
//! error instead of wrapping, so every value the interpreter produces is also
//! the value of the solver's unbounded integer theory. Division and remainder
//! are Euclidean, matching the solver for nonzero divisors; `x / 0` is 0 and
//! `x % 0` is `x`.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::error::{SynthError, SynthResult};
use crate::ir::{display, Decl, Node, Op, Sort, TermId, TermStore};

/// Runtime value of a fold state or input
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Tuple(Vec<Value>),
}

impl Value {
    pub fn sort(&self) -> Sort {
        match self {
            Value::Bool(_) => Sort::Bool,
            Value::Int(_) => Sort::Int,
            Value::Tuple(items) => Sort::Tuple(items.iter().map(Value::sort).collect()),
        }
    }

    /// Does the value inhabit `sort`?
    pub fn conforms(&self, sort: &Sort) -> bool {
        match (self, sort) {
            (Value::Bool(_), Sort::Bool) | (Value::Int(_), Sort::Int) => true,
            (Value::Tuple(items), Sort::Tuple(fields)) => {
                items.len() == fields.len()
                    && items.iter().zip(fields).all(|(v, s)| v.conforms(s))
            }
            _ => false,
        }
    }

    pub fn as_bool(&self) -> SynthResult<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(SynthError::Evaluation(format!("expected bool, found {}", other))),
        }
    }

    pub fn as_int(&self) -> SynthResult<i64> {
        match self {
            Value::Int(v) => Ok(*v),
            other => Err(SynthError::Evaluation(format!("expected int, found {}", other))),
        }
    }

    /// Default value of a sort: `false`, `0`, or a tuple of defaults
    pub fn default_of(sort: &Sort) -> Value {
        match sort {
            Sort::Bool => Value::Bool(false),
            Sort::Int => Value::Int(0),
            Sort::Tuple(fields) => Value::Tuple(fields.iter().map(Value::default_of).collect()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(v) => write!(f, "{}", v),
            Value::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Variable and parameter bindings for evaluation
#[derive(Debug, Clone, Default)]
pub struct Env {
    vars: FxHashMap<TermId, Value>,
    params: Vec<Value>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a variable, checking the value against its sort
    pub fn bind(&mut self, store: &TermStore, var: TermId, value: Value) -> SynthResult<()> {
        if !value.conforms(store.sort(var)) {
            return Err(SynthError::Evaluation(format!(
                "value {} does not fit `{}` of sort {}",
                value,
                display(store, var),
                store.sort(var)
            )));
        }
        self.vars.insert(var, value);
        Ok(())
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }
}

/// Integer operator semantics shared with the simplifier's literal folding
///
/// Returns `None` for non-arithmetic operators and when the exact result does
/// not fit in an `i64`.
pub fn int_binop(op: Op, lhs: i64, rhs: i64) -> Option<i64> {
    match op {
        Op::Add => lhs.checked_add(rhs),
        Op::Sub => lhs.checked_sub(rhs),
        Op::Mul => lhs.checked_mul(rhs),
        Op::Div if rhs == 0 => Some(0),
        Op::Div => lhs.checked_div_euclid(rhs),
        Op::Mod if rhs == 0 => Some(lhs),
        // `i64::MIN % -1` is exactly 0, only the intermediate quotient overflows
        Op::Mod => Some(lhs.wrapping_rem_euclid(rhs)),
        _ => None,
    }
}

fn overflow(op: Op) -> SynthError {
    SynthError::Evaluation(format!("integer overflow in {}", op))
}

/// Integer comparison semantics
pub fn int_cmp(op: Op, lhs: i64, rhs: i64) -> Option<bool> {
    Some(match op {
        Op::Lt => lhs < rhs,
        Op::Le => lhs <= rhs,
        Op::Gt => lhs > rhs,
        Op::Ge => lhs >= rhs,
        _ => return None,
    })
}

/// Apply a built-in operator to already evaluated operands
pub fn apply_op(op: Op, args: &[Value]) -> SynthResult<Value> {
    let arity = |n: usize| -> SynthResult<()> {
        if args.len() == n {
            Ok(())
        } else {
            Err(SynthError::Evaluation(format!(
                "operator {} applied to {} operands",
                op,
                args.len()
            )))
        }
    };
    match op {
        Op::Not => {
            arity(1)?;
            Ok(Value::Bool(!args[0].as_bool()?))
        }
        Op::Neg => {
            arity(1)?;
            let value = args[0].as_int()?;
            value.checked_neg().map(Value::Int).ok_or_else(|| overflow(op))
        }
        Op::And => {
            for arg in args {
                if !arg.as_bool()? {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        Op::Or => {
            for arg in args {
                if arg.as_bool()? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        Op::Xor => {
            arity(2)?;
            Ok(Value::Bool(args[0].as_bool()? ^ args[1].as_bool()?))
        }
        Op::Eq => {
            arity(2)?;
            Ok(Value::Bool(args[0] == args[1]))
        }
        Op::Lt | Op::Le | Op::Gt | Op::Ge => {
            arity(2)?;
            let result = int_cmp(op, args[0].as_int()?, args[1].as_int()?).unwrap_or(false);
            Ok(Value::Bool(result))
        }
        Op::Add | Op::Mul => {
            let mut ints = args.iter().map(Value::as_int);
            let first = ints
                .next()
                .ok_or_else(|| SynthError::Evaluation(format!("operator {} without operands", op)))??;
            let mut acc = first;
            for next in ints {
                acc = int_binop(op, acc, next?).ok_or_else(|| overflow(op))?;
            }
            Ok(Value::Int(acc))
        }
        Op::Sub | Op::Div | Op::Mod => {
            arity(2)?;
            let lhs = args[0].as_int()?;
            let rhs = args[1].as_int()?;
            int_binop(op, lhs, rhs).map(Value::Int).ok_or_else(|| overflow(op))
        }
    }
}

/// Evaluate a term under `env`
///
/// Only the taken branch of a conditional is evaluated.
pub fn eval(store: &TermStore, term: TermId, env: &Env) -> SynthResult<Value> {
    match store.node(term) {
        Node::Var { name, .. } => env
            .vars
            .get(&term)
            .cloned()
            .ok_or_else(|| SynthError::Evaluation(format!("unbound variable `{}`", name))),
        Node::Bool(b) => Ok(Value::Bool(*b)),
        Node::Int(v) => Ok(Value::Int(*v)),
        Node::Param { index, .. } => env
            .params
            .get(*index as usize)
            .cloned()
            .ok_or_else(|| SynthError::Evaluation(format!("unbound parameter g{}", index))),
        Node::Marker { id, .. } => Err(SynthError::Evaluation(format!(
            "opaque marker #{} cannot be evaluated",
            id
        ))),
        Node::App {
            decl: Decl::State(id),
            ..
        } => Err(SynthError::Evaluation(format!(
            "state application {} cannot be evaluated",
            id
        ))),
        Node::App {
            decl: Decl::Op(op),
            args,
        } => {
            // Short-circuit so `false && _` never evaluates its tail
            match op {
                Op::And | Op::Or => {
                    let absorbing = *op == Op::Or;
                    for arg in args {
                        if eval(store, *arg, env)?.as_bool()? == absorbing {
                            return Ok(Value::Bool(absorbing));
                        }
                    }
                    Ok(Value::Bool(!absorbing))
                }
                _ => {
                    let values = args
                        .iter()
                        .map(|arg| eval(store, *arg, env))
                        .collect::<SynthResult<Vec<_>>>()?;
                    apply_op(*op, &values)
                }
            }
        }
        Node::Ite { cond, then, els } => {
            if eval(store, *cond, env)?.as_bool()? {
                eval(store, *then, env)
            } else {
                eval(store, *els, env)
            }
        }
        Node::Tuple(items) => Ok(Value::Tuple(
            items
                .iter()
                .map(|item| eval(store, *item, env))
                .collect::<SynthResult<_>>()?,
        )),
        Node::Field { tuple, index } => match eval(store, *tuple, env)? {
            Value::Tuple(mut items) if *index < items.len() => Ok(items.swap_remove(*index)),
            other => Err(SynthError::Evaluation(format!(
                "field .{} of {}",
                index, other
            ))),
        },
    }
}
