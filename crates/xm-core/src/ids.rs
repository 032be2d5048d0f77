//! Identifiers used across the execution engine.
//!
//! Tasks and queues live in arenas that only grow for the life of the
//! process, so a plain integer index is a stable identity.  The newtypes
//! keep the two id spaces from mixing at compile time; the raw integer is
//! `pub` because arena lookups are just `ids.0 as usize`.

use std::fmt;

// ── TaskId ────────────────────────────────────────────────────────────────────

/// Stable 64-bit id of a compiled task.
///
/// The task manager assigns ids densely in creation order and uses them to
/// address its task arena, its dependency tables, and the per-iteration
/// counter arrays.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Termination sentinel enqueued to wake and stop worker threads.
    ///
    /// A virtual id with no task object behind it; queues must never route
    /// it through the splitting machinery or the completion callback.
    pub const TERM: TaskId = TaskId(u64::MAX);

    /// The arena slot this id addresses.
    #[inline(always)]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// `true` if this id is the worker termination sentinel.
    #[inline(always)]
    pub fn is_term(self) -> bool {
        self == TaskId::TERM
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ── QueueId ───────────────────────────────────────────────────────────────────

/// Id of a task queue registered with the scheduler.
///
/// Queues are few — one per task-type family — so a `u16` is plenty.  The
/// scheduler hands ids out in queue-registration order.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct QueueId(pub u16);

impl QueueId {
    /// The scheduler slot this id addresses.
    #[inline(always)]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
