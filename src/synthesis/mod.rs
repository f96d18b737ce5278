//! Shape automaton synthesis
//!
//! - `shape`: generalization of symbolic states and the state registry
//! - `rewrite`: the rule-based simplifier driven by a decision oracle
//! - `explorer`: solver-guided construction of per-state strategies

pub mod config;
pub mod explorer;
pub mod result;
pub mod rewrite;
pub mod shape;

pub use config::{ExplorationMode, SynthesisConfig};
pub use explorer::{compose, Explorer, Strategy};
pub use result::SynthesisStatistics;
pub use rewrite::{Decide, Rewriter, Rule, Syntactic, Validity};
pub use shape::{generalize, AutomatonState, Generalization, Registry};
