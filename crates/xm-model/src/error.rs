//! Error type for model validation and compilation.

use thiserror::Error;

use xm_exec::ExecError;
use xm_mem::MemError;

/// Errors raised while validating or compiling a model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A schema or semantic check failed; the message lists every finding.
    #[error("model validation failed:\n{0}")]
    Validation(String),

    #[error("state machine of agent {agent:?} contains a cycle through: {through}")]
    Cycle { agent: String, through: String },

    #[error("no transition function registered for {agent:?}::{function:?}")]
    MissingFunction { agent: String, function: String },

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Mem(#[from] MemError),

    #[error(transparent)]
    Board(#[from] xm_board::BoardError),
}

/// Shorthand result type for model compilation.
pub type ModelResult<T> = Result<T, ModelError>;
