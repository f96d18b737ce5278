//! Synthesis session: runs the automaton over real input and synthesizes
//! strategies on demand

use std::fmt;

use tracing::{debug, info};

use crate::codegen::{Composer, HaltReason, StateHandle, StateTransformer};
use crate::error::{SynthError, SynthResult};
use crate::frontend::{Aggregation, Reducer};
use crate::ir::{display, StateId, TermStore};
use crate::parser::parse_reducer;
use crate::semantics::concrete::Value;
use crate::semantics::oracle::{Oracle, Z3Oracle};
use crate::synthesis::{
    ExplorationMode, Explorer, Registry, Rewriter, SynthesisConfig, SynthesisStatistics,
};

/// A reducer together with its partially synthesized automaton
pub struct Session<O: Oracle = Z3Oracle> {
    store: TermStore,
    aggregation: Aggregation,
    registry: Registry,
    rewriter: Rewriter,
    explorer: Explorer,
    composer: Composer,
    transformer: StateTransformer,
    oracle: O,
    config: SynthesisConfig,
}

impl<O: Oracle> Session<O> {
    /// Lower `reducer` and start a session
    pub fn new(reducer: &Reducer, oracle: O, config: SynthesisConfig) -> SynthResult<Self> {
        let mut store = TermStore::new();
        let aggregation = Aggregation::from_reducer(&mut store, reducer)?;
        Self::from_aggregation(store, aggregation, oracle, config)
    }

    /// Parse a reducer such as `|s: int, i: int| if i > s { i } else { s }`
    pub fn from_source(source: &str, oracle: O, config: SynthesisConfig) -> SynthResult<Self> {
        let reducer = parse_reducer(source)?;
        Self::new(&reducer, oracle, config)
    }

    pub fn from_aggregation(
        store: TermStore,
        aggregation: Aggregation,
        oracle: O,
        config: SynthesisConfig,
    ) -> SynthResult<Self> {
        let mut registry = Registry::new(config.max_shapes);
        let initial = registry.register_initial(&store, aggregation.state_var())?;
        let mut transformer = StateTransformer::new(&aggregation);
        if let Some(state) = registry.get(initial) {
            transformer.install(&store, state)?;
        }
        let mut session = Self {
            rewriter: Rewriter::new(aggregation.state_var(), config.max_rewrite_passes),
            composer: Composer::new(&store, &aggregation),
            explorer: Explorer::new(),
            store,
            aggregation,
            registry,
            transformer,
            oracle,
            config,
        };
        if session.config.mode == ExplorationMode::AheadOfTime {
            session.synthesize_reachable()?;
        }
        Ok(session)
    }

    pub fn store(&self) -> &TermStore {
        &self.store
    }

    pub fn aggregation(&self) -> &Aggregation {
        &self.aggregation
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    pub fn initial_handle(&self) -> StateHandle {
        StateHandle::initial()
    }

    /// Synthesize the strategy of `state` and make it executable
    fn resolve(&mut self, state: StateId) -> SynthResult<()> {
        let strategy = self.explorer.synthesize(
            &mut self.store,
            &self.aggregation,
            &mut self.registry,
            &self.rewriter,
            &mut self.oracle,
            state,
        )?;
        self.composer.install(&self.store, state, strategy)?;
        for registered in self.registry.states() {
            if !self.transformer.is_installed(registered) {
                self.transformer.install(&self.store, registered)?;
            }
        }
        Ok(())
    }

    /// Run the automaton over `inputs`, synthesizing strategies as states
    /// without one are reached
    pub fn run(&mut self, handle: StateHandle, inputs: &[Value]) -> SynthResult<StateHandle> {
        let mut handle = handle;
        let mut position = 0;
        loop {
            let halt = self.composer.run(handle, &inputs[position..])?;
            position += halt.consumed;
            match halt.reason {
                HaltReason::Exhausted => return Ok(halt.handle),
                HaltReason::Unresolved => {
                    debug!(handle = %halt.handle, position, "composer halted on unresolved state");
                    self.resolve(halt.handle.state)?;
                    handle = halt.handle;
                }
            }
        }
    }

    /// Fold `inputs` starting from `initial` through the automaton
    pub fn fold(&mut self, initial: &Value, inputs: &[Value]) -> SynthResult<Value> {
        self.check_state_value(initial)?;
        let handle = self.run(self.initial_handle(), inputs)?;
        self.transformer.apply(&handle, initial)
    }

    /// Combine a folded prefix with the terminal handle of the suffix
    ///
    /// A handle reached from the initial state denotes the function mapping
    /// a starting state to the result of folding that partition, so merging
    /// applies it to the concrete result of the left partition.
    pub fn merge(&self, left: &Value, right: &StateHandle) -> SynthResult<Value> {
        self.check_state_value(left)?;
        self.transformer.apply(right, left)
    }

    /// Fold each chunk independently from the initial state, then merge the
    /// partial results left to right
    pub fn fold_partitioned(&mut self, initial: &Value, chunks: &[&[Value]]) -> SynthResult<Value> {
        self.check_state_value(initial)?;
        let mut handles = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            handles.push(self.run(self.initial_handle(), chunk)?);
        }
        handles
            .iter()
            .try_fold(initial.clone(), |acc, handle| self.merge(&acc, handle))
    }

    /// Synthesize strategies for every state reachable from the initial one
    pub fn synthesize_reachable(&mut self) -> SynthResult<()> {
        loop {
            let next = self.registry.unresolved().next();
            let Some(state) = next else { break };
            self.resolve(state)?;
        }
        info!(shapes = self.registry.len(), "automaton complete");
        Ok(())
    }

    /// Reference sequential fold, bypassing the automaton
    pub fn fold_sequential(&self, initial: &Value, inputs: &[Value]) -> SynthResult<Value> {
        self.aggregation.fold(&self.store, initial.clone(), inputs)
    }

    pub fn statistics(&self) -> SynthesisStatistics {
        let mut stats = self.explorer.statistics().clone();
        stats.shapes = self.registry.len() as u64;
        stats
    }

    /// Printable listing of shapes and strategies
    pub fn automaton(&self) -> AutomatonListing<'_> {
        AutomatonListing {
            store: &self.store,
            registry: &self.registry,
        }
    }

    fn check_state_value(&self, value: &Value) -> SynthResult<()> {
        let sort = self.aggregation.state_sort(&self.store);
        if value.conforms(sort) {
            Ok(())
        } else {
            Err(SynthError::Evaluation(format!(
                "state value {} does not have sort {}",
                value, sort
            )))
        }
    }
}

pub struct AutomatonListing<'a> {
    store: &'a TermStore,
    registry: &'a Registry,
}

impl fmt::Display for AutomatonListing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for state in self.registry.states() {
            write!(f, "{}", state.id)?;
            if !state.params.is_empty() {
                write!(f, "(")?;
                for (i, param) in state.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", display(self.store, *param))?;
                }
                write!(f, ")")?;
            }
            writeln!(f, " = {}", display(self.store, state.shape))?;
            match self.registry.strategy(state.id) {
                Some(strategy) => writeln!(f, "    -> {}", display(self.store, strategy))?,
                None => writeln!(f, "    -> (unresolved)")?,
            }
        }
        Ok(())
    }
}
