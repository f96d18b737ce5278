//! Executable form of a synthesized automaton
//!
//! Terms are compiled once into boxed closures over a [`Frame`]. The
//! [`Composer`] steps through input with a jump table of compiled strategies;
//! the [`StateTransformer`] turns a terminal state back into a value of the
//! reducer's state type.

pub mod composer;
pub mod transformer;

pub use composer::{Composer, Halt, HaltReason};
pub use transformer::StateTransformer;

use std::fmt;

use crate::error::{SynthError, SynthResult};
use crate::ir::{display, Decl, Node, Op, StateId, TermId, TermStore};
use crate::semantics::concrete::{apply_op, Value};

/// Values visible to compiled code
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub params: &'a [Value],
    pub input: Option<&'a Value>,
    pub initial: Option<&'a Value>,
}

/// A compiled expression
pub type Compiled = Box<dyn Fn(&Frame<'_>) -> SynthResult<Value>>;

/// Automaton state together with its parameter values
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateHandle {
    pub state: StateId,
    pub values: Vec<Value>,
}

impl StateHandle {
    pub fn new(state: StateId, values: Vec<Value>) -> Self {
        Self { state, values }
    }

    /// Handle of the arity-0 initial state
    pub fn initial() -> Self {
        Self::new(StateId(0), Vec::new())
    }
}

impl fmt::Display for StateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.state)?;
        if !self.values.is_empty() {
            write!(f, "(")?;
            for (i, value) in self.values.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", value)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// Variables a compiled term may refer to
#[derive(Debug, Clone, Copy)]
pub(crate) struct Bindings {
    pub state_var: TermId,
    pub input_var: TermId,
}

/// Compile a term without state applications
pub(crate) fn compile(store: &TermStore, bindings: Bindings, term: TermId) -> SynthResult<Compiled> {
    let compiled: Compiled = match store.node(term) {
        Node::Var { name, .. } => {
            let name = name.clone();
            if term == bindings.input_var {
                Box::new(move |frame: &Frame<'_>| {
                    frame
                        .input
                        .cloned()
                        .ok_or_else(|| SynthError::Evaluation(format!("no input bound to `{}`", name)))
                })
            } else if term == bindings.state_var {
                Box::new(move |frame: &Frame<'_>| {
                    frame.initial.cloned().ok_or_else(|| {
                        SynthError::Evaluation(format!("no initial state bound to `{}`", name))
                    })
                })
            } else {
                return Err(SynthError::MalformedStrategy(format!(
                    "unknown variable `{}`",
                    name
                )));
            }
        }
        Node::Bool(b) => {
            let value = Value::Bool(*b);
            Box::new(move |_: &Frame<'_>| Ok(value.clone()))
        }
        Node::Int(v) => {
            let value = Value::Int(*v);
            Box::new(move |_: &Frame<'_>| Ok(value.clone()))
        }
        Node::Param { index, .. } => {
            let index = *index as usize;
            Box::new(move |frame: &Frame<'_>| {
                frame
                    .params
                    .get(index)
                    .cloned()
                    .ok_or_else(|| SynthError::Evaluation(format!("missing parameter g{}", index)))
            })
        }
        Node::Marker { .. }
        | Node::App {
            decl: Decl::State(_),
            ..
        } => {
            return Err(SynthError::MalformedStrategy(format!(
                "{} cannot be compiled",
                display(store, term)
            )))
        }
        Node::App {
            decl: Decl::Op(op),
            args,
        } => {
            let op = *op;
            let args = args
                .iter()
                .map(|arg| compile(store, bindings, *arg))
                .collect::<SynthResult<Vec<_>>>()?;
            match op {
                Op::And | Op::Or => {
                    let absorbing = op == Op::Or;
                    Box::new(move |frame: &Frame<'_>| {
                        for arg in &args {
                            if arg(frame)?.as_bool()? == absorbing {
                                return Ok(Value::Bool(absorbing));
                            }
                        }
                        Ok(Value::Bool(!absorbing))
                    })
                }
                _ => Box::new(move |frame: &Frame<'_>| {
                    let values = args
                        .iter()
                        .map(|arg| arg(frame))
                        .collect::<SynthResult<Vec<_>>>()?;
                    apply_op(op, &values)
                }),
            }
        }
        Node::Ite { cond, then, els } => {
            let cond = compile(store, bindings, *cond)?;
            let then = compile(store, bindings, *then)?;
            let els = compile(store, bindings, *els)?;
            Box::new(move |frame: &Frame<'_>| {
                if cond(frame)?.as_bool()? {
                    then(frame)
                } else {
                    els(frame)
                }
            })
        }
        Node::Tuple(items) => {
            let items = items
                .iter()
                .map(|item| compile(store, bindings, *item))
                .collect::<SynthResult<Vec<_>>>()?;
            Box::new(move |frame: &Frame<'_>| {
                Ok(Value::Tuple(
                    items
                        .iter()
                        .map(|item| item(frame))
                        .collect::<SynthResult<_>>()?,
                ))
            })
        }
        Node::Field { tuple, index } => {
            let tuple = compile(store, bindings, *tuple)?;
            let index = *index;
            Box::new(move |frame: &Frame<'_>| match tuple(frame)? {
                Value::Tuple(mut items) if index < items.len() => Ok(items.swap_remove(index)),
                other => Err(SynthError::Evaluation(format!("field .{} of {}", index, other))),
            })
        }
    };
    Ok(compiled)
}
