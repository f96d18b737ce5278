//! Jump-table execution of composition strategies

use crate::codegen::{compile, Bindings, Compiled, Frame, StateHandle};
use crate::error::{SynthError, SynthResult};
use crate::frontend::Aggregation;
use crate::ir::{display, Node, Sort, StateId, TermId, TermStore};
use crate::semantics::concrete::Value;
use crate::synthesis::shape::as_state_app;

/// Compiled decision tree of one strategy
enum Block {
    Branch {
        cond: Compiled,
        then: Box<Block>,
        els: Box<Block>,
    },
    Jump {
        target: StateId,
        args: Vec<Compiled>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// Every input was consumed
    Exhausted,
    /// The current state has no strategy yet
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Halt {
    pub handle: StateHandle,
    /// Number of inputs consumed before halting
    pub consumed: usize,
    pub reason: HaltReason,
}

/// Steps an automaton over input, one strategy block per state
pub struct Composer {
    bindings: Bindings,
    input_sort: Sort,
    blocks: Vec<Option<Block>>,
}

impl Composer {
    pub fn new(store: &TermStore, aggregation: &Aggregation) -> Self {
        Self {
            bindings: Bindings {
                state_var: aggregation.state_var(),
                input_var: aggregation.input_var(),
            },
            input_sort: aggregation.input_sort(store).clone(),
            blocks: Vec::new(),
        }
    }

    pub fn is_installed(&self, state: StateId) -> bool {
        matches!(self.blocks.get(state.0 as usize), Some(Some(_)))
    }

    /// Compile `strategy` into the block of `state`
    pub fn install(&mut self, store: &TermStore, state: StateId, strategy: TermId) -> SynthResult<()> {
        let block = self.compile_block(store, strategy)?;
        let slot = state.0 as usize;
        if self.blocks.len() <= slot {
            self.blocks.resize_with(slot + 1, || None);
        }
        self.blocks[slot] = Some(block);
        Ok(())
    }

    fn compile_block(&self, store: &TermStore, strategy: TermId) -> SynthResult<Block> {
        if let Node::Ite { cond, then, els } = store.node(strategy) {
            return Ok(Block::Branch {
                cond: compile(store, self.bindings, *cond)?,
                then: Box::new(self.compile_block(store, *then)?),
                els: Box::new(self.compile_block(store, *els)?),
            });
        }
        let (target, args) = as_state_app(store, strategy).ok_or_else(|| {
            SynthError::MalformedStrategy(format!(
                "strategy leaf {} is not a state application",
                display(store, strategy)
            ))
        })?;
        let args = args
            .iter()
            .map(|arg| compile(store, self.bindings, *arg))
            .collect::<SynthResult<Vec<_>>>()?;
        Ok(Block::Jump { target, args })
    }

    /// Run from `handle` until the input ends or a state lacks a strategy
    pub fn run(&self, handle: StateHandle, inputs: &[Value]) -> SynthResult<Halt> {
        let mut handle = handle;
        for (consumed, input) in inputs.iter().enumerate() {
            if !input.conforms(&self.input_sort) {
                return Err(SynthError::Evaluation(format!(
                    "input {} does not have sort {}",
                    input, self.input_sort
                )));
            }
            let Some(Some(block)) = self.blocks.get(handle.state.0 as usize) else {
                return Ok(Halt {
                    handle,
                    consumed,
                    reason: HaltReason::Unresolved,
                });
            };
            handle = step(block, &handle, input)?;
        }
        Ok(Halt {
            handle,
            consumed: inputs.len(),
            reason: HaltReason::Exhausted,
        })
    }
}

fn step(block: &Block, handle: &StateHandle, input: &Value) -> SynthResult<StateHandle> {
    let frame = Frame {
        params: &handle.values,
        input: Some(input),
        initial: None,
    };
    let mut block = block;
    loop {
        match block {
            Block::Branch { cond, then, els } => {
                block = if cond(&frame)?.as_bool()? {
                    then.as_ref()
                } else {
                    els.as_ref()
                };
            }
            Block::Jump { target, args } => {
                // Arguments read the old parameters, so evaluate all first
                let values = args
                    .iter()
                    .map(|arg| arg(&frame))
                    .collect::<SynthResult<Vec<_>>>()?;
                return Ok(StateHandle::new(*target, values));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{BinaryOp, Expr, Param, Reducer, TypeExpr};
    use crate::ir::Op;

    /// Running sum with a hand-written two-state automaton
    fn setup() -> (TermStore, Aggregation, TermId, TermId) {
        let mut store = TermStore::new();
        let reducer = Reducer {
            state: Param::new("s", TypeExpr::Int),
            input: Param::new("i", TypeExpr::Int),
            body: Expr::binary(BinaryOp::Add, Expr::ident("s"), Expr::ident("i")),
        };
        let agg = Aggregation::from_reducer(&mut store, &reducer).unwrap();
        let i = agg.input_var();
        let enter = store.mk_state_app(StateId(1), vec![i], Sort::Int);
        let g0 = store.mk_param(0, Sort::Int);
        let sum = store.mk_op(Op::Add, vec![g0, i]);
        let stay = store.mk_state_app(StateId(1), vec![sum], Sort::Int);
        (store, agg, enter, stay)
    }

    #[test]
    fn test_run_to_exhaustion() {
        let (store, agg, enter, stay) = setup();
        let mut composer = Composer::new(&store, &agg);
        composer.install(&store, StateId(0), enter).unwrap();
        composer.install(&store, StateId(1), stay).unwrap();
        let inputs = [Value::Int(1), Value::Int(2), Value::Int(3)];
        let halt = composer.run(StateHandle::initial(), &inputs).unwrap();
        assert_eq!(halt.reason, HaltReason::Exhausted);
        assert_eq!(halt.consumed, 3);
        assert_eq!(halt.handle, StateHandle::new(StateId(1), vec![Value::Int(6)]));
    }

    #[test]
    fn test_halts_before_unresolved_state() {
        let (store, agg, enter, stay) = setup();
        let mut composer = Composer::new(&store, &agg);
        composer.install(&store, StateId(0), enter).unwrap();
        let inputs = [Value::Int(5), Value::Int(2)];
        let halt = composer.run(StateHandle::initial(), &inputs).unwrap();
        assert_eq!(halt.reason, HaltReason::Unresolved);
        assert_eq!(halt.consumed, 1);
        assert!(!composer.is_installed(StateId(1)));

        composer.install(&store, StateId(1), stay).unwrap();
        let resumed = composer.run(halt.handle, &inputs[halt.consumed..]).unwrap();
        assert_eq!(resumed.handle.values, vec![Value::Int(7)]);
        assert_eq!(composer.run(resumed.handle.clone(), &[]).unwrap().reason, HaltReason::Exhausted);
    }

    #[test]
    fn test_rejects_bad_input_and_leaves() {
        let (store, agg, enter, _) = setup();
        let mut composer = Composer::new(&store, &agg);
        composer.install(&store, StateId(0), enter).unwrap();
        assert!(composer.run(StateHandle::initial(), &[Value::Bool(true)]).is_err());
        assert!(composer.install(&store, StateId(2), agg.input_var()).is_err());
    }
}
