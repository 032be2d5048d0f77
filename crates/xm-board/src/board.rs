//! `MessageBoard` — committed store, writer lifecycle, sync and clear.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rustc_hash::FxHashMap;
use xm_core::ScalarType;
use xm_mem::VectorStore;
use xm_mem::vector::new_store;

use crate::error::{BoardError, BoardResult};
use crate::iterator::MessageIterator;
use crate::writer::BoardWriter;

pub(crate) struct BoardVar {
    pub(crate) name: String,
    pub(crate) scalar: ScalarType,
    pub(crate) store: Arc<dyn VectorStore>,
}

/// One message type's board.
///
/// Holds the committed column-major store of synchronized messages, the set
/// of outstanding writers, and the finalized flag.  Variable declaration is
/// `&mut` and closes when the first writer is issued; everything else is
/// `&self`.  `sync`/`clear` mutate the committed store and rely on the
/// scheduler placing them so that no reader or poster runs concurrently.
pub struct MessageBoard {
    name: String,
    vars: Vec<BoardVar>,
    by_name: FxHashMap<String, usize>,
    /// Set once the first writer is issued; blocks further declarations.
    finalized: AtomicBool,
    /// Writers issued since the last sync.
    writers: Mutex<Vec<Arc<BoardWriter>>>,
    /// Committed message count.  Kept explicitly so boards with no declared
    /// variables still count their synchronized posts.
    committed: AtomicUsize,
}

impl MessageBoard {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            vars: Vec::new(),
            by_name: FxHashMap::default(),
            finalized: AtomicBool::new(false),
            writers: Mutex::new(Vec::new()),
            committed: AtomicUsize::new(0),
        }
    }

    /// The message-type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    // ── Declaration plane (&mut, pre-finalize) ────────────────────────────

    /// Declare message variable `var` with tag `scalar`.
    ///
    /// Fails `AlreadyFinalized` once any writer has been issued and
    /// `DuplicateName` if the variable exists.
    pub fn declare_var(&mut self, var: &str, scalar: ScalarType) -> BoardResult<()> {
        if self.finalized.load(Ordering::Acquire) {
            return Err(BoardError::AlreadyFinalized {
                board: self.name.clone(),
                var: var.to_owned(),
            });
        }
        if self.by_name.contains_key(var) {
            return Err(BoardError::DuplicateName(var.to_owned()));
        }
        self.by_name.insert(var.to_owned(), self.vars.len());
        self.vars.push(BoardVar {
            name: var.to_owned(),
            scalar,
            store: Arc::from(new_store(scalar)),
        });
        tracing::debug!(board = %self.name, var, %scalar, "declared message variable");
        Ok(())
    }

    // ── Writer lifecycle ──────────────────────────────────────────────────

    /// Issue a new writer whose staging vectors are empty images of the
    /// committed columns.  Marks the board finalized.
    pub fn writer(&self) -> Arc<BoardWriter> {
        self.finalized.store(true, Ordering::Release);
        let writer = Arc::new(BoardWriter::new(
            &self.name,
            self.vars
                .iter()
                .map(|v| (v.name.clone(), v.scalar, v.store.clone_empty()))
                .collect(),
        ));
        self.writers
            .lock()
            .expect("writer-list mutex poisoned")
            .push(Arc::clone(&writer));
        writer
    }

    /// `true` once variable declaration has closed.
    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    /// Writers issued and not yet drained by a sync.
    pub fn outstanding_writers(&self) -> usize {
        self.writers.lock().expect("writer-list mutex poisoned").len()
    }

    // ── Sync / clear (scheduler-exclusive) ────────────────────────────────

    /// Promote every writer's staged messages into the committed store, in
    /// writer-issue order, then drop and disconnect the writers.
    ///
    /// Runs from a `msg_sync` task; the dependency graph guarantees no
    /// reader or poster is concurrent.  Idempotent when no writers are
    /// outstanding.
    pub fn sync(&self) -> BoardResult<()> {
        let drained: Vec<Arc<BoardWriter>> = {
            let mut writers = self.writers.lock().expect("writer-list mutex poisoned");
            std::mem::take(&mut *writers)
        };
        if drained.is_empty() {
            return Ok(());
        }
        let mut promoted = 0usize;
        for writer in &drained {
            for (i, var) in self.vars.iter().enumerate() {
                var.store
                    .extend_from(writer.staged_store(i))
                    .map_err(|_| BoardError::InvalidType {
                        var: var.name.clone(),
                        actual: var.scalar,
                        requested: var.scalar,
                    })?;
            }
            promoted += writer.count();
            writer.disconnect();
        }
        self.committed.fetch_add(promoted, Ordering::AcqRel);
        tracing::debug!(board = %self.name, promoted, "synchronized board");
        Ok(())
    }

    /// Truncate all committed columns to zero, preserving capacity.
    ///
    /// Runs from a `msg_clear` task with the same exclusivity guarantee as
    /// [`sync`](Self::sync).  A clear on an empty board is a no-op.
    pub fn clear(&self) {
        for var in &self.vars {
            var.store.truncate();
        }
        self.committed.store(0, Ordering::Release);
    }

    // ── Read side ─────────────────────────────────────────────────────────

    /// Number of committed (synchronized) messages.
    pub fn committed_count(&self) -> usize {
        self.committed.load(Ordering::Acquire)
    }

    /// A fresh iterator over the committed messages.
    pub fn iterator(self: &Arc<Self>) -> MessageIterator {
        MessageIterator::raw(Arc::clone(self))
    }

    // ── Internal lookup ───────────────────────────────────────────────────

    pub(crate) fn vars(&self) -> &[BoardVar] {
        &self.vars
    }

    pub(crate) fn var_index(&self, var: &str) -> BoardResult<usize> {
        self.by_name
            .get(var)
            .copied()
            .ok_or_else(|| BoardError::InvalidVariable {
                board: self.name.clone(),
                var: var.to_owned(),
            })
    }
}
