//! Access control: the task-owned `Proxy` and the per-worker `BoardClient`.
//!
//! A proxy records which messages a task may read and which it may post; the
//! compiler builds one per task from the model's input/output lists.  At
//! execution time each worker mints its own client from the task's proxy.
//! Clients cache writers, so sharing one client between threads would race —
//! one client per worker, always.

use std::collections::BTreeSet;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::{BoardError, BoardResult};
use crate::iterator::MessageIterator;
use crate::manager::BoardManager;
use crate::writer::{BoardWriter, Message};

// ── Proxy ─────────────────────────────────────────────────────────────────────

/// The static capability descriptor owned by a task.
///
/// The read and post sets are disjoint: a transition function never reads
/// and posts the same message within one iteration (the sync/clear bracket
/// would be unsatisfiable).
#[derive(Default, Clone, Debug)]
pub struct Proxy {
    read: BTreeSet<String>,
    post: BTreeSet<String>,
}

impl Proxy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant read access to `msg`.  Fails `ReadPostConflict` if post access
    /// was already granted.
    pub fn allow_read(&mut self, msg: &str) -> BoardResult<()> {
        if self.post.contains(msg) {
            return Err(BoardError::ReadPostConflict(msg.to_owned()));
        }
        self.read.insert(msg.to_owned());
        Ok(())
    }

    /// Grant post access to `msg`.  Fails `ReadPostConflict` if read access
    /// was already granted.
    pub fn allow_post(&mut self, msg: &str) -> BoardResult<()> {
        if self.read.contains(msg) {
            return Err(BoardError::ReadPostConflict(msg.to_owned()));
        }
        self.post.insert(msg.to_owned());
        Ok(())
    }

    pub fn can_read(&self, msg: &str) -> bool {
        self.read.contains(msg)
    }

    pub fn can_post(&self, msg: &str) -> bool {
        self.post.contains(msg)
    }

    /// Message names with read access, in sorted order.
    pub fn reads(&self) -> impl Iterator<Item = &str> {
        self.read.iter().map(String::as_str)
    }

    /// Message names with post access, in sorted order.
    pub fn posts(&self) -> impl Iterator<Item = &str> {
        self.post.iter().map(String::as_str)
    }

    /// Mint a client for one worker thread.
    pub fn client(&self, boards: Arc<BoardManager>) -> BoardClient {
        BoardClient {
            boards,
            read: self.read.clone(),
            post: self.post.clone(),
            writers: FxHashMap::default(),
        }
    }
}

// ── BoardClient ───────────────────────────────────────────────────────────────

/// A per-worker capability object exposing permitted board operations.
///
/// The writer cache makes the post path lock-free: each client owns its
/// writers and a board sync merely disconnects them, which the client
/// detects on next use.
pub struct BoardClient {
    boards: Arc<BoardManager>,
    read: BTreeSet<String>,
    post: BTreeSet<String>,
    writers: FxHashMap<String, Arc<BoardWriter>>,
}

impl BoardClient {
    /// An iterator over `msg`'s committed messages.
    ///
    /// Fails `NoReadAccess` unless the task's proxy granted read access.
    pub fn get_messages(&self, msg: &str) -> BoardResult<MessageIterator> {
        if !self.read.contains(msg) {
            return Err(BoardError::NoReadAccess(msg.to_owned()));
        }
        self.boards.iterator(msg)
    }

    /// This client's writer for `msg`, acquiring or re-acquiring as needed.
    ///
    /// Fails `NoPostAccess` unless the task's proxy granted post access.
    pub fn get_writer(&mut self, msg: &str) -> BoardResult<&Arc<BoardWriter>> {
        if !self.post.contains(msg) {
            return Err(BoardError::NoPostAccess(msg.to_owned()));
        }
        let stale = self
            .writers
            .get(msg)
            .is_none_or(|w| !w.is_connected());
        if stale {
            let fresh = self.boards.writer(msg)?;
            self.writers.insert(msg.to_owned(), fresh);
        }
        Ok(&self.writers[msg])
    }

    /// Convenience: a new unset message row against this client's writer.
    pub fn new_message(&mut self, msg: &str) -> BoardResult<Message<'_>> {
        let writer = self.get_writer(msg)?;
        Ok(writer.new_message())
    }

    /// Committed message count for `msg` (read access required).
    pub fn committed_count(&self, msg: &str) -> BoardResult<usize> {
        if !self.read.contains(msg) {
            return Err(BoardError::NoReadAccess(msg.to_owned()));
        }
        self.boards.committed_count(msg)
    }
}
