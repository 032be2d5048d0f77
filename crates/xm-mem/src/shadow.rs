//! `AgentShadow` — an access-controlled view over selected memory columns.
//!
//! A shadow lists which variables of one agent type a task may touch and
//! whether each is writable.  Tasks hold one shadow for the life of the run;
//! every execution mints a fresh [`MemoryIterator`] from it (re-reading
//! column lengths, since the population may grow between iterations).

use std::sync::Arc;

use rustc_hash::FxHashMap;
use xm_core::ScalarType;

use crate::agent::AgentMemory;
use crate::error::{MemError, MemResult};
use crate::iterator::MemoryIterator;
use crate::vector::VectorStore;

pub(crate) struct ShadowCol {
    pub(crate) name: String,
    pub(crate) scalar: ScalarType,
    pub(crate) writable: bool,
    pub(crate) store: Arc<dyn VectorStore>,
}

/// A filtered view of one agent's memory.
///
/// Created empty by [`MemoryManager::make_shadow`](crate::MemoryManager::make_shadow);
/// variables become visible through [`allow`](Self::allow).
pub struct AgentShadow {
    memory: Arc<AgentMemory>,
    cols: Vec<ShadowCol>,
    by_name: FxHashMap<String, usize>,
}

impl AgentShadow {
    pub(crate) fn new(memory: Arc<AgentMemory>) -> Self {
        Self {
            memory,
            cols: Vec::new(),
            by_name: FxHashMap::default(),
        }
    }

    /// The agent type this shadow views.
    pub fn agent(&self) -> &str {
        self.memory.name()
    }

    /// Grant access to `var`, writable or read-only.
    ///
    /// Fails `InvalidVariable` if the agent has no such variable,
    /// `DuplicateName` if already granted, and `SizeMismatch` if the column's
    /// length differs from the columns granted so far.
    pub fn allow(&mut self, var: &str, writable: bool) -> MemResult<()> {
        let store = Arc::clone(self.memory.vector_wrapper(var)?);
        if self.by_name.contains_key(var) {
            return Err(MemError::DuplicateName(var.to_owned()));
        }
        if let Some(first) = self.cols.first() {
            let expected = first.store.len();
            let got = store.len();
            if got != expected {
                return Err(MemError::SizeMismatch {
                    var: var.to_owned(),
                    expected,
                    got,
                });
            }
        }
        let scalar = self.memory.scalar_type_of(var)?;
        self.by_name.insert(var.to_owned(), self.cols.len());
        self.cols.push(ShadowCol {
            name: var.to_owned(),
            scalar,
            writable,
            store,
        });
        Ok(())
    }

    /// `true` if `var` has been granted on this shadow.
    pub fn is_allowed(&self, var: &str) -> bool {
        self.by_name.contains_key(var)
    }

    /// `true` if `var` has been granted writable.
    pub fn is_writable(&self, var: &str) -> bool {
        self.by_name
            .get(var)
            .is_some_and(|&i| self.cols[i].writable)
    }

    /// Number of granted variables.
    pub fn var_count(&self) -> usize {
        self.cols.len()
    }

    /// Current population of the underlying agent.
    pub fn size(&self) -> usize {
        self.memory.population()
    }

    /// A cursor over the whole current population.
    pub fn iter(&self) -> MemResult<MemoryIterator<'_>> {
        let size = self.checked_size()?;
        MemoryIterator::new(self, 0, size, size)
    }

    /// A windowed cursor over rows `[offset, offset + count)`, used when a
    /// task is split across workers.  The window is clamped to the
    /// population.
    pub fn iter_window(&self, offset: usize, count: usize) -> MemResult<MemoryIterator<'_>> {
        let size = self.checked_size()?;
        let offset = offset.min(size);
        let count = count.min(size - offset);
        MemoryIterator::new(self, offset, count, size)
    }

    pub(crate) fn cols(&self) -> &[ShadowCol] {
        &self.cols
    }

    pub(crate) fn col_index(&self, var: &str) -> Option<usize> {
        self.by_name.get(var).copied()
    }

    /// Re-read the population and verify all granted columns agree on it.
    fn checked_size(&self) -> MemResult<usize> {
        let Some(first) = self.cols.first() else {
            return Ok(self.memory.population());
        };
        let expected = first.store.len();
        for col in &self.cols[1..] {
            let got = col.store.len();
            if got != expected {
                return Err(MemError::SizeMismatch {
                    var: col.name.clone(),
                    expected,
                    got,
                });
            }
        }
        Ok(expected)
    }
}
