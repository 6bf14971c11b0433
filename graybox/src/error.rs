//! Error types of the execution engine.
//!
//! Expected conditions (failed loads, non-convergence) are reported through
//! phase return values. The only error a phase propagates is [`Terminated`].

use thiserror::Error;

/// Raised by a model hook to request termination of the whole tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct Halt(pub String);

impl Halt {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// The tree was torn down by `terminate`. Not resumable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{program}' terminated by '{node}': {message}")]
pub struct Terminated {
    pub program: String,
    pub node: String,
    pub message: String,
}
