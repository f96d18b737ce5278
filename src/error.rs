//! Error types shared by every stage of the synthesis pipeline

use crate::parser::ParseError;
use thiserror::Error;

/// Failure raised while translating, synthesizing or executing an aggregation.
///
/// Inconclusive quantifier elimination is deliberately absent: the explorer
/// recovers from it locally and only records it in the statistics.
#[derive(Debug, Error)]
pub enum SynthError {
    #[error("unsupported expression: {0}")]
    UnsupportedExpression(String),

    #[error("invalid aggregation: {0}")]
    InvalidAggregation(String),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("malformed strategy: {0}")]
    MalformedStrategy(String),

    #[error("oracle failure: {0}")]
    Oracle(String),

    #[error("shape discovery exceeded the limit of {limit} shapes")]
    ShapeLimit { limit: usize },

    #[error("evaluation error: {0}")]
    Evaluation(String),
}

pub type SynthResult<T> = Result<T, SynthError>;
