//! `BoardManager` — the registry of message boards by name.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use xm_core::ScalarType;

use crate::board::MessageBoard;
use crate::error::{BoardError, BoardResult};
use crate::iterator::MessageIterator;
use crate::writer::BoardWriter;

/// Process-wide registry of message boards.
///
/// Owned by the engine context and shared with worker threads behind `Arc`.
/// Registration is `&mut` and precedes sharing; all lookups fail
/// `UnknownMessage` on a miss.
#[derive(Default)]
pub struct BoardManager {
    boards: FxHashMap<String, Arc<MessageBoard>>,
}

impl BoardManager {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Registration plane ────────────────────────────────────────────────

    /// Register a board for message type `msg`.
    pub fn register_message(&mut self, msg: &str) -> BoardResult<()> {
        if self.boards.contains_key(msg) {
            return Err(BoardError::DuplicateName(msg.to_owned()));
        }
        self.boards
            .insert(msg.to_owned(), Arc::new(MessageBoard::new(msg)));
        tracing::debug!(msg, "registered message board");
        Ok(())
    }

    /// Declare a variable on board `msg`.
    pub fn declare_var(&mut self, msg: &str, var: &str, scalar: ScalarType) -> BoardResult<()> {
        let arc = self
            .boards
            .get_mut(msg)
            .ok_or_else(|| BoardError::UnknownMessage(msg.to_owned()))?;
        // Declaration precedes sharing, so the Arc is still unique here.
        let board = Arc::get_mut(arc).ok_or_else(|| BoardError::AlreadyFinalized {
            board: msg.to_owned(),
            var: var.to_owned(),
        })?;
        board.declare_var(var, scalar)
    }

    // ── Lookup plane ──────────────────────────────────────────────────────

    /// The board for message type `msg`.
    pub fn board(&self, msg: &str) -> BoardResult<&Arc<MessageBoard>> {
        self.boards
            .get(msg)
            .ok_or_else(|| BoardError::UnknownMessage(msg.to_owned()))
    }

    /// `true` if `msg` is a registered message type.
    pub fn exists(&self, msg: &str) -> bool {
        self.boards.contains_key(msg)
    }

    /// Number of registered boards.
    pub fn board_count(&self) -> usize {
        self.boards.len()
    }

    /// Issue a writer for `msg` (finalizes the board's declarations).
    pub fn writer(&self, msg: &str) -> BoardResult<Arc<BoardWriter>> {
        Ok(self.board(msg)?.writer())
    }

    /// A fresh iterator over `msg`'s committed messages.
    pub fn iterator(&self, msg: &str) -> BoardResult<MessageIterator> {
        Ok(self.board(msg)?.iterator())
    }

    /// Promote staged messages on `msg` (a `msg_sync` task body).
    pub fn sync(&self, msg: &str) -> BoardResult<()> {
        self.board(msg)?.sync()
    }

    /// Empty `msg`'s committed store (a `msg_clear` task body).
    pub fn clear(&self, msg: &str) -> BoardResult<()> {
        self.board(msg)?.clear();
        Ok(())
    }

    /// Committed message count for `msg`.
    pub fn committed_count(&self, msg: &str) -> BoardResult<usize> {
        Ok(self.board(msg)?.committed_count())
    }
}
