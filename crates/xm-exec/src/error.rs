//! Error type for the execution engine.

use thiserror::Error;

use xm_board::BoardError;
use xm_core::{SinkError, TaskId};
use xm_mem::MemError;

use crate::task::TaskKind;

/// Errors raised by task management, scheduling, and task execution.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("task graph is finalized; no further tasks or dependencies")]
    AlreadyFinalized,

    #[error("task graph has not been finalized")]
    NotFinalized,

    #[error("unknown task {0}")]
    UnknownTask(TaskId),

    #[error("unknown task name {0:?}")]
    UnknownTaskName(String),

    #[error("duplicate task name {0:?}")]
    DuplicateName(String),

    #[error("dependency {from} -> {to} would close a cycle")]
    WouldCycle { from: TaskId, to: TaskId },

    #[error("task graph contains a cycle through: {0}")]
    CycleDetected(String),

    #[error("no task available in the ready set")]
    NoneAvailable,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no queue assigned for task type {0}")]
    UnassignedType(TaskKind),

    #[error("task type {0} is already assigned to a queue")]
    TypeAlreadyAssigned(TaskKind),

    #[error("task graph has no runnable root task")]
    NoRunnableTasks,

    #[error("function {task:?} of agent {agent:?} aborted: {reason}")]
    FunctionAbort {
        task: String,
        agent: String,
        reason: String,
    },

    #[error(transparent)]
    Mem(#[from] MemError),

    #[error(transparent)]
    Board(#[from] BoardError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Shorthand result type for the execution engine.
pub type ExecResult<T> = Result<T, ExecError>;
