//! Top-level simulation error, wrapping every subsystem's kind.

use thiserror::Error;

/// Errors surfaced by the simulation facade.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Model(#[from] xm_model::ModelError),

    #[error(transparent)]
    Mem(#[from] xm_mem::MemError),

    #[error(transparent)]
    Board(#[from] xm_board::BoardError),

    #[error(transparent)]
    Exec(#[from] xm_exec::ExecError),

    #[error(transparent)]
    Population(#[from] xm_core::PopReadError),

    #[error("invalid operation: {0}")]
    InvalidState(String),
}

/// Shorthand result type for the simulation facade.
pub type SimResult<T> = Result<T, SimError>;
