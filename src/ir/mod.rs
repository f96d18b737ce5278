//! Intermediate Representation (IR) for symbolic fold terms

pub mod term;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use term::{Node, TermId, TermStore};
pub use types::{Decl, Op, Sort, StateId};
pub use utils::display;
