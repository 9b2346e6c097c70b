//! Error types for the heuristic engine.

use thiserror::Error;

/// Errors that abort an engine invocation.
///
/// Recoverable conditions (an infeasible dive, a time limit) are latched
/// state, not errors; only failures that make the requested computation
/// meaningless surface here.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Instance could not be read.
    #[error("failed to read instance: {0}")]
    Parse(#[from] volfix_core::io::ParseError),

    /// The objective bound needs a bound the variable does not have.
    #[error("could not compute objective bound: column {0} is unbounded")]
    UnboundedObjectiveBound(usize),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
