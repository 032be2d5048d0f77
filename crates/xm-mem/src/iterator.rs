//! `MemoryIterator` — the row cursor handed to task bodies.
//!
//! The cursor holds one raw element pointer per granted variable plus a
//! position counter and an `(offset, count)` window.  [`step`] advances every
//! pointer together, so the cursor is always internally consistent: all
//! tracked pointers refer to the same agent row.
//!
//! [`step`]: MemoryIterator::step

use std::any::TypeId;

use xm_core::{Scalar, ScalarValue};

use crate::error::{MemError, MemResult};
use crate::shadow::AgentShadow;

struct IterCol {
    shadow_idx: usize,
    ptr: *mut u8,
}

/// A windowed, access-checked cursor over one agent population.
///
/// Obtained from [`AgentShadow::iter`] or [`AgentShadow::iter_window`].
/// Reads and writes go through the raw pointers captured at creation;
/// the scheduler guarantees no conflicting task mutates these columns while
/// the cursor is live.
pub struct MemoryIterator<'a> {
    shadow: &'a AgentShadow,
    cols: Vec<IterCol>,
    /// Full population size of the underlying agent.
    size: usize,
    /// First row of the window.
    offset: usize,
    /// Rows in the window.
    count: usize,
    /// Rows consumed so far (0 ≤ position ≤ count).
    position: usize,
}

impl<'a> MemoryIterator<'a> {
    pub(crate) fn new(
        shadow: &'a AgentShadow,
        offset: usize,
        count: usize,
        size: usize,
    ) -> MemResult<Self> {
        let mut it = Self {
            shadow,
            cols: Vec::with_capacity(shadow.cols().len()),
            size,
            offset,
            count,
            position: 0,
        };
        for (i, col) in shadow.cols().iter().enumerate() {
            it.cols.push(IterCol {
                shadow_idx: i,
                ptr: col.store.raw_begin_at(offset),
            });
        }
        Ok(it)
    }

    // ── Cursor movement ───────────────────────────────────────────────────

    /// Reset all pointers to the window start.
    pub fn rewind(&mut self) {
        self.position = 0;
        for col in &mut self.cols {
            let sc = &self.shadow.cols()[col.shadow_idx];
            col.ptr = sc.store.raw_begin_at(self.offset);
        }
    }

    /// Advance every pointer to the next row.
    ///
    /// Returns `false` once the window is exhausted.  All pointers advance
    /// together or not at all.
    pub fn step(&mut self) -> bool {
        if self.at_end() {
            return false;
        }
        self.position += 1;
        if self.at_end() {
            for col in &mut self.cols {
                col.ptr = std::ptr::null_mut();
            }
            return false;
        }
        for col in &mut self.cols {
            let sc = &self.shadow.cols()[col.shadow_idx];
            col.ptr = sc.store.raw_step(col.ptr);
        }
        true
    }

    /// `true` when every row of the window has been consumed.
    pub fn at_end(&self) -> bool {
        self.position >= self.count
    }

    /// Rows consumed so far within the window.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Full population size of the underlying agent.
    pub fn size(&self) -> usize {
        self.size
    }

    /// First row of the window.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Rows in the window.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Absolute row index of the current agent.
    pub fn row(&self) -> usize {
        self.offset + self.position
    }

    // ── Access ────────────────────────────────────────────────────────────

    /// Read the current agent's value of `var`.
    ///
    /// Fails `InvalidVariable` if `var` is not in the shadow, `InvalidType`
    /// if `T` disagrees with the declared element type, and `OutOfRange` at
    /// the end of the window (never returns garbage).
    pub fn get<T: Scalar>(&self, var: &str) -> MemResult<T> {
        let (sc_idx, ptr) = self.lookup(var)?;
        self.check_type::<T>(sc_idx, var)?;
        if ptr.is_null() || self.at_end() {
            return Err(MemError::OutOfRange);
        }
        // SAFETY: ptr is a live, in-bounds element pointer of type T —
        // minted by the column store, non-null, type tag just checked, and
        // the window check above rules out the one-past-the-end state.
        Ok(unsafe { *(ptr as *const T) })
    }

    /// Write the current agent's value of `var`.
    ///
    /// Same failures as [`get`](Self::get), plus `NoWriteAccess` if `var`
    /// was granted read-only.
    pub fn set<T: Scalar>(&mut self, var: &str, value: T) -> MemResult<()> {
        let (sc_idx, ptr) = self.lookup(var)?;
        if !self.shadow.cols()[sc_idx].writable {
            return Err(MemError::NoWriteAccess(var.to_owned()));
        }
        self.check_type::<T>(sc_idx, var)?;
        if ptr.is_null() || self.at_end() {
            return Err(MemError::OutOfRange);
        }
        // SAFETY: as in `get`, plus the scheduler orders this task after
        // every other reader/writer of this column, so the write cannot race.
        unsafe { *(ptr as *mut T) = value };
        Ok(())
    }

    /// Read the current value of `var` as a tagged scalar (cold path; used
    /// by condition evaluation).
    pub fn value(&self, var: &str) -> MemResult<ScalarValue> {
        let (sc_idx, _) = self.lookup(var)?;
        match self.shadow.cols()[sc_idx].scalar {
            xm_core::ScalarType::Int => self.get::<i64>(var).map(ScalarValue::Int),
            xm_core::ScalarType::Double => self.get::<f64>(var).map(ScalarValue::Double),
        }
    }

    fn lookup(&self, var: &str) -> MemResult<(usize, *mut u8)> {
        match self.shadow.col_index(var) {
            Some(i) => Ok((i, self.cols[i].ptr)),
            None => Err(MemError::InvalidVariable {
                agent: self.shadow.agent().to_owned(),
                var: var.to_owned(),
            }),
        }
    }

    fn check_type<T: Scalar>(&self, sc_idx: usize, var: &str) -> MemResult<()> {
        let sc = &self.shadow.cols()[sc_idx];
        if sc.store.element_type() != TypeId::of::<T>() {
            return Err(MemError::InvalidType {
                var: var.to_owned(),
                actual: sc.scalar,
                requested: T::TYPE,
            });
        }
        Ok(())
    }
}
