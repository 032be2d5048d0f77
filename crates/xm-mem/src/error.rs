//! Error type for the memory subsystem.

use thiserror::Error;

use xm_core::ScalarType;

/// Errors raised by agent-memory registration and access.
#[derive(Debug, Error)]
pub enum MemError {
    #[error("unknown agent type {0:?}")]
    InvalidAgent(String),

    #[error("agent {agent:?} has no variable {var:?}")]
    InvalidVariable { agent: String, var: String },

    #[error("variable {var:?} is {actual}, not {requested}")]
    InvalidType {
        var: String,
        actual: ScalarType,
        requested: ScalarType,
    },

    #[error("memory layout of agent {agent:?} is finalized; cannot register {var:?}")]
    AlreadyFinalized { agent: String, var: String },

    #[error("duplicate name {0:?}")]
    DuplicateName(String),

    #[error("column {var:?} has {got} rows where {expected} were expected")]
    SizeMismatch {
        var: String,
        expected: usize,
        got: usize,
    },

    #[error("no read access to variable {0:?}")]
    NoReadAccess(String),

    #[error("no write access to variable {0:?}")]
    NoWriteAccess(String),

    #[error("memory iterator stepped past the end of its window")]
    OutOfRange,

    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

/// Shorthand result type for the memory subsystem.
pub type MemResult<T> = Result<T, MemError>;
