//! Concrete and symbolic semantics of fold terms

pub mod concrete;
pub mod oracle;
pub mod smt;

// Re-export main functionality
pub use concrete::{eval, Env, Value};
pub use oracle::{Oracle, SatOutcome, Z3Oracle};
pub use smt::SolverConfig;
