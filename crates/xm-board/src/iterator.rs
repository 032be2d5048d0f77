//! `MessageIterator` — stepwise access to a board's committed messages.
//!
//! Two backends, as in the board design notes:
//!
//! - **Raw**: immutable, advances one raw element pointer per variable.
//!   The default; fast full-board iteration.
//! - **Indexed**: holds a list of row indices into the committed store.
//!   Produced on demand when sorting, randomizing, or subset iteration is
//!   requested; slower per access but reorderable.
//!
//! Either way the iterator is a read-only snapshot: the committed store is
//! only mutated by sync/clear tasks, which the compiler orders away from all
//! readers.

use std::any::TypeId;
use std::collections::BTreeMap;
use std::sync::Arc;

use rand::Rng;
use xm_core::{Scalar, ScalarValue};

use crate::board::MessageBoard;
use crate::error::{BoardError, BoardResult};

/// A read-only copy of one committed message row.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessageView {
    values: BTreeMap<String, ScalarValue>,
}

impl MessageView {
    /// The value of `var`, if present on the message type.
    pub fn get(&self, var: &str) -> Option<ScalarValue> {
        self.values.get(var).copied()
    }

    /// Variable names and values in declaration-independent sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, ScalarValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

enum Backend {
    /// One cursor pointer per variable, advanced together.
    Raw { ptrs: Vec<*mut u8> },
    /// Explicit row indices; reorderable.
    Indexed { rows: Vec<usize> },
}

/// Cursor over the messages committed to one board.
pub struct MessageIterator {
    board: Arc<MessageBoard>,
    backend: Backend,
    position: usize,
    count: usize,
}

impl MessageIterator {
    pub(crate) fn raw(board: Arc<MessageBoard>) -> Self {
        let count = board.committed_count();
        let ptrs = board.vars().iter().map(|v| v.store.raw_begin()).collect();
        Self {
            board,
            backend: Backend::Raw { ptrs },
            position: 0,
            count,
        }
    }

    // ── Stepping ──────────────────────────────────────────────────────────

    /// `true` once every message has been consumed.
    pub fn at_end(&self) -> bool {
        self.position >= self.count
    }

    /// Advance to the next message; `false` at the end.
    pub fn next(&mut self) -> bool {
        if self.at_end() {
            return false;
        }
        self.position += 1;
        if let Backend::Raw { ptrs } = &mut self.backend {
            for (i, p) in ptrs.iter_mut().enumerate() {
                *p = self.board.vars()[i].store.raw_step(*p);
            }
        }
        !self.at_end()
    }

    /// Restart from the first message (in the backend's current order).
    pub fn rewind(&mut self) {
        self.position = 0;
        if let Backend::Raw { ptrs } = &mut self.backend {
            for (i, p) in ptrs.iter_mut().enumerate() {
                *p = self.board.vars()[i].store.raw_begin();
            }
        }
    }

    /// Total messages this iterator ranges over.
    pub fn count(&self) -> usize {
        self.count
    }

    // ── Access ────────────────────────────────────────────────────────────

    /// Read variable `var` of the current message.
    ///
    /// Fails `InvalidVariable` on an undeclared name, `InvalidType` on a tag
    /// mismatch, and `OutOfRange` at the end (never returns garbage).
    pub fn get<T: Scalar>(&self, var: &str) -> BoardResult<T> {
        let idx = self.board.var_index(var)?;
        let bvar = &self.board.vars()[idx];
        if bvar.store.element_type() != TypeId::of::<T>() {
            return Err(BoardError::InvalidType {
                var: var.to_owned(),
                actual: bvar.scalar,
                requested: T::TYPE,
            });
        }
        if self.at_end() {
            return Err(BoardError::OutOfRange);
        }
        match &self.backend {
            Backend::Raw { ptrs } => {
                let p = ptrs[idx];
                if p.is_null() {
                    return Err(BoardError::OutOfRange);
                }
                // SAFETY: non-null cursor pointer into the committed column,
                // tag-checked above; sync/clear cannot run concurrently.
                Ok(unsafe { *(p as *const T) })
            }
            Backend::Indexed { rows } => {
                let row = rows[self.position];
                bvar.store
                    .value_at(row)
                    .and_then(T::from_value)
                    .ok_or(BoardError::OutOfRange)
            }
        }
    }

    /// A read-only copy of the current message row.
    pub fn current_message(&self) -> BoardResult<MessageView> {
        if self.at_end() {
            return Err(BoardError::OutOfRange);
        }
        let row = match &self.backend {
            Backend::Raw { .. } => self.position,
            Backend::Indexed { rows } => rows[self.position],
        };
        let mut values = BTreeMap::new();
        for var in self.board.vars() {
            if let Some(v) = var.store.value_at(row) {
                values.insert(var.name.clone(), v);
            }
        }
        Ok(MessageView { values })
    }

    // ── Reordering (promotes to the indexed backend) ──────────────────────

    fn rows_mut(&mut self) -> &mut Vec<usize> {
        if let Backend::Raw { .. } = self.backend {
            self.backend = Backend::Indexed {
                rows: (0..self.count).collect(),
            };
        }
        match &mut self.backend {
            Backend::Indexed { rows } => rows,
            Backend::Raw { .. } => unreachable!("raw backend was just promoted"),
        }
    }

    /// Shuffle message order.  Converts to the indexed backend and rewinds.
    pub fn randomise<R: Rng>(&mut self, rng: &mut R) {
        let rows = self.rows_mut();
        // Fisher–Yates, as rand's shuffle would do; spelled out to keep the
        // index list the only thing that moves.
        for i in (1..rows.len()).rev() {
            let j = rng.gen_range(0..=i);
            rows.swap(i, j);
        }
        self.position = 0;
    }

    /// Keep only messages for which `pred` returns true.  Converts to the
    /// indexed backend and rewinds.
    pub fn retain<F: FnMut(&MessageView) -> bool>(&mut self, mut pred: F) -> BoardResult<()> {
        let board = Arc::clone(&self.board);
        let rows = self.rows_mut();
        let mut kept = Vec::with_capacity(rows.len());
        for &row in rows.iter() {
            let mut values = BTreeMap::new();
            for var in board.vars() {
                if let Some(v) = var.store.value_at(row) {
                    values.insert(var.name.clone(), v);
                }
            }
            if pred(&MessageView { values }) {
                kept.push(row);
            }
        }
        let count = kept.len();
        *rows = kept;
        self.count = count;
        self.position = 0;
        Ok(())
    }

    /// Sort messages ascending by `var`.  Converts to the indexed backend
    /// and rewinds.
    pub fn sort_by_var(&mut self, var: &str) -> BoardResult<()> {
        let idx = self.board.var_index(var)?;
        let board = Arc::clone(&self.board);
        let rows = self.rows_mut();
        rows.sort_by(|&a, &b| {
            let store = &board.vars()[idx].store;
            let cmp = match (store.value_at(a), store.value_at(b)) {
                (Some(ScalarValue::Int(x)), Some(ScalarValue::Int(y))) => x.partial_cmp(&y),
                (Some(ScalarValue::Double(x)), Some(ScalarValue::Double(y))) => x.partial_cmp(&y),
                _ => None,
            };
            cmp.unwrap_or(std::cmp::Ordering::Equal)
        });
        self.position = 0;
        Ok(())
    }
}
