//! Reconstruction of concrete results from terminal states

use crate::codegen::{compile, Bindings, Compiled, Frame, StateHandle};
use crate::error::{SynthError, SynthResult};
use crate::frontend::Aggregation;
use crate::ir::TermStore;
use crate::semantics::concrete::Value;
use crate::synthesis::shape::AutomatonState;

/// Evaluates state shapes against an initial state
pub struct StateTransformer {
    bindings: Bindings,
    shapes: Vec<Option<(usize, Compiled)>>,
}

impl StateTransformer {
    pub fn new(aggregation: &Aggregation) -> Self {
        Self {
            bindings: Bindings {
                state_var: aggregation.state_var(),
                input_var: aggregation.input_var(),
            },
            shapes: Vec::new(),
        }
    }

    pub fn is_installed(&self, state: &AutomatonState) -> bool {
        matches!(self.shapes.get(state.id.0 as usize), Some(Some(_)))
    }

    pub fn install(&mut self, store: &TermStore, state: &AutomatonState) -> SynthResult<()> {
        let compiled = compile(store, self.bindings, state.shape)?;
        let slot = state.id.0 as usize;
        if self.shapes.len() <= slot {
            self.shapes.resize_with(slot + 1, || None);
        }
        self.shapes[slot] = Some((state.arity(), compiled));
        Ok(())
    }

    /// Value of the state denoted by `handle` when the fold started at
    /// `initial`
    pub fn apply(&self, handle: &StateHandle, initial: &Value) -> SynthResult<Value> {
        let Some(Some((arity, shape))) = self.shapes.get(handle.state.0 as usize) else {
            return Err(SynthError::MalformedStrategy(format!(
                "no shape compiled for {}",
                handle.state
            )));
        };
        if *arity != handle.values.len() {
            return Err(SynthError::Evaluation(format!(
                "{} expects {} parameters, got {}",
                handle.state,
                arity,
                handle.values.len()
            )));
        }
        shape(&Frame {
            params: &handle.values,
            input: None,
            initial: Some(initial),
        })
    }
}
