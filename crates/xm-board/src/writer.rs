//! `BoardWriter` staging and the `Message` row under construction.
//!
//! Messages are never posted to a board directly: concurrent posts would pay
//! locking on every message.  Each worker's client owns its writers, posts
//! stage into per-writer columns, and a `msg_sync` task merges all staging
//! areas into the committed store at a point where nothing else is running.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use rustc_hash::FxHashMap;
use xm_core::{Scalar, ScalarType, ScalarValue};
use xm_mem::VectorStore;

use crate::error::{BoardError, BoardResult};

/// A per-worker staging area for one board.
///
/// Obtained from [`MessageBoard::writer`](crate::MessageBoard::writer) —
/// normally through a [`BoardClient`](crate::BoardClient), which caches one
/// writer per board.  After a sync drains the writer it is disconnected;
/// clients detect this and transparently acquire a fresh one.
pub struct BoardWriter {
    board: String,
    vars: Vec<(String, ScalarType, Box<dyn VectorStore>)>,
    by_name: FxHashMap<String, usize>,
    /// Cleared when a sync drains this writer.
    connected: AtomicBool,
    /// Messages posted so far.
    count: AtomicUsize,
}

impl BoardWriter {
    pub(crate) fn new(board: &str, vars: Vec<(String, ScalarType, Box<dyn VectorStore>)>) -> Self {
        let by_name = vars
            .iter()
            .enumerate()
            .map(|(i, (name, _, _))| (name.clone(), i))
            .collect();
        Self {
            board: board.to_owned(),
            vars,
            by_name,
            connected: AtomicBool::new(true),
            count: AtomicUsize::new(0),
        }
    }

    /// The board this writer stages for.
    pub fn board(&self) -> &str {
        &self.board
    }

    /// Messages posted to this writer so far.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// `false` once a sync has drained this writer; post attempts through a
    /// client then re-acquire.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
    }

    pub(crate) fn staged_store(&self, var_idx: usize) -> &dyn VectorStore {
        &*self.vars[var_idx].2
    }

    /// A new message row with every variable unset.
    pub fn new_message(&self) -> Message<'_> {
        Message {
            writer: self,
            values: vec![None; self.vars.len()],
        }
    }

    fn var_index(&self, var: &str) -> BoardResult<usize> {
        self.by_name
            .get(var)
            .copied()
            .ok_or_else(|| BoardError::InvalidVariable {
                board: self.board.clone(),
                var: var.to_owned(),
            })
    }
}

// ── Message ───────────────────────────────────────────────────────────────────

/// A message row under construction against one writer.
///
/// Set every declared variable, then [`post`](Self::post).  The handle
/// resets to all-unset after a post and may be reused for further messages.
pub struct Message<'w> {
    writer: &'w BoardWriter,
    values: Vec<Option<ScalarValue>>,
}

impl Message<'_> {
    /// Stage a value for one variable.
    ///
    /// Fails `InvalidVariable` on an undeclared name and `InvalidType` if
    /// `T` disagrees with the declared tag.
    pub fn set<T: Scalar>(&mut self, var: &str, value: T) -> BoardResult<()> {
        let idx = self.writer.var_index(var)?;
        let declared = self.writer.vars[idx].1;
        if declared != T::TYPE {
            return Err(BoardError::InvalidType {
                var: var.to_owned(),
                actual: declared,
                requested: T::TYPE,
            });
        }
        self.values[idx] = Some(value.into_value());
        Ok(())
    }

    /// Append the staged row to the writer and reset this handle to unset.
    ///
    /// In debug builds an unset declared variable fails `InsufficientData`;
    /// in release builds unset variables are filled with the type default so
    /// staging columns never desynchronize.
    pub fn post(&mut self) -> BoardResult<()> {
        #[cfg(debug_assertions)]
        for (idx, value) in self.values.iter().enumerate() {
            if value.is_none() {
                return Err(BoardError::InsufficientData {
                    board: self.writer.board.clone(),
                    var: self.writer.vars[idx].0.clone(),
                });
            }
        }
        for (idx, value) in self.values.iter_mut().enumerate() {
            let (_, scalar, store) = &self.writer.vars[idx];
            let v = value.take().unwrap_or(match scalar {
                ScalarType::Int => ScalarValue::Int(0),
                ScalarType::Double => ScalarValue::Double(0.0),
            });
            // The writer is owned by one client thread; staging mutation is
            // exclusive by construction.
            store
                .push_value(v)
                .map_err(|_| BoardError::InvalidType {
                    var: self.writer.vars[idx].0.clone(),
                    actual: *scalar,
                    requested: *scalar,
                })?;
        }
        self.writer.count.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}
