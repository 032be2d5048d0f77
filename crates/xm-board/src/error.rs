//! Error type for the message-board subsystem.

use thiserror::Error;

use xm_core::ScalarType;

/// Errors raised by board registration, posting, and iteration.
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("unknown message type {0:?}")]
    UnknownMessage(String),

    #[error("duplicate name {0:?}")]
    DuplicateName(String),

    #[error("board {board:?} is finalized; cannot declare variable {var:?}")]
    AlreadyFinalized { board: String, var: String },

    #[error("message {board:?} has no variable {var:?}")]
    InvalidVariable { board: String, var: String },

    #[error("message variable {var:?} is {actual}, not {requested}")]
    InvalidType {
        var: String,
        actual: ScalarType,
        requested: ScalarType,
    },

    #[error("message posted to {board:?} with unset variable {var:?}")]
    InsufficientData { board: String, var: String },

    #[error("no read access to message {0:?}")]
    NoReadAccess(String),

    #[error("no post access to message {0:?}")]
    NoPostAccess(String),

    #[error("message {0:?} cannot be granted both read and post access")]
    ReadPostConflict(String),

    #[error("message iterator stepped past its last message")]
    OutOfRange,
}

/// Shorthand result type for the message-board subsystem.
pub type BoardResult<T> = Result<T, BoardError>;
