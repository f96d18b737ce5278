//! foldsynth: synthesizes shape automata from sequential folds
//!
//! A reducer `|s, i| body` is lowered to terms, its reachable symbolic
//! states are generalized into parameterized shapes, and each shape gets a
//! composition strategy proven with an SMT oracle. The resulting automaton
//! folds input without knowing the initial state, so partial results can be
//! restarted and merged.

pub mod codegen;
pub mod driver;
pub mod error;
pub mod frontend;
pub mod ir;
pub mod parser;
pub mod semantics;
pub mod synthesis;

pub use codegen::StateHandle;
pub use driver::Session;
pub use error::{SynthError, SynthResult};
pub use frontend::{Aggregation, Reducer};
pub use semantics::{Oracle, SolverConfig, Value, Z3Oracle};
pub use synthesis::{ExplorationMode, SynthesisConfig, SynthesisStatistics};
