//! Type-erased contiguous columns with a raw-pointer stepping hot path.
//!
//! # Design
//!
//! Each column is a `Vec<T>` wrapped in [`TypedVector<T>`] and stored behind
//! `Arc<dyn VectorStore>`.  Row iteration does not go through `Vec` indexing
//! or iterator objects: a cursor obtains a raw element pointer once via
//! [`VectorStore::raw_begin`] and advances it with [`VectorStore::raw_step`],
//! which is branch-free past its null/end check.  Type identity is carried as
//! a [`TypeId`] plus a [`ScalarType`] tag, so runtime type checks are tag
//! comparisons.
//!
//! # Why `&self` mutation
//!
//! Columns are shared across worker threads for the lifetime of a run, while
//! the dependency DAG — not the borrow checker — serialises conflicting
//! access: two tasks touching the same column with a writer among them are
//! always dependency-ordered.  Mutating operations therefore take `&self`
//! and route through an `UnsafeCell`, with the exclusivity obligation stated
//! on each method.  Structural registration happens before any sharing and
//! is `&mut` at the [`AgentMemory`](crate::AgentMemory) layer.

use std::any::{Any, TypeId};
use std::cell::UnsafeCell;
use std::ptr;

use xm_core::{Scalar, ScalarType, ScalarValue};

use crate::error::{MemError, MemResult};

// ── Trait object ──────────────────────────────────────────────────────────────

/// Type-erased interface over one memory column.
///
/// All mutating methods require *logically exclusive* access: no other thread
/// may read or write the column for the duration of the call.  Engine call
/// sites obtain that exclusivity from the scheduler's dependency ordering.
pub trait VectorStore: Send + Sync + 'static {
    /// Grow capacity to at least `n` elements.  Never shrinks, never
    /// reorders.  Requires exclusive access (may reallocate).
    fn reserve(&self, n: usize);

    /// Current element count.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pointer to the first element, or null if the column is empty.
    fn raw_begin(&self) -> *mut u8;

    /// Pointer to the element at `offset`, or null if `offset >= len`.
    ///
    /// Positions windowed cursors directly, without O(offset) stepping.
    fn raw_begin_at(&self, offset: usize) -> *mut u8;

    /// Advance a pointer produced by `raw_begin`/`raw_begin_at`/`raw_step`
    /// to the next element; null once the last element has been passed.
    fn raw_step(&self, p: *mut u8) -> *mut u8;

    /// Append all elements of `other`, which must have the same element
    /// type.  Requires exclusive access to `self`; `other` must not be
    /// mutated concurrently.
    fn extend_from(&self, other: &dyn VectorStore) -> MemResult<()>;

    /// A new, empty store of the same element type with zero capacity.
    fn clone_empty(&self) -> Box<dyn VectorStore>;

    /// Truncate to zero length, preserving capacity.  Requires exclusive
    /// access.
    fn truncate(&self);

    /// Remove the rows at `rows` (strictly ascending indices), compacting
    /// the remainder in order.  Requires exclusive access.
    fn remove_rows(&self, rows: &[usize]);

    /// Append one tagged value.  Requires exclusive access.
    fn push_value(&self, v: ScalarValue) -> MemResult<()>;

    /// Read row `idx` as a tagged value; `None` if out of bounds.  Cold path.
    fn value_at(&self, idx: usize) -> Option<ScalarValue>;

    /// The scalar tag declared at registration.
    fn scalar_type(&self) -> ScalarType;

    /// The Rust element type, for typed-access checks.
    fn element_type(&self) -> TypeId;

    #[doc(hidden)]
    fn as_any(&self) -> &dyn Any;
}

// ── Concrete column ───────────────────────────────────────────────────────────

/// A `Vec<T>` column usable behind `dyn VectorStore`.
///
/// The `UnsafeCell` makes `&self` mutation possible; `Sync` is sound because
/// every mutating method documents the exclusivity requirement satisfied by
/// the scheduler (see module docs).
pub struct TypedVector<T: Scalar> {
    cell: UnsafeCell<Vec<T>>,
}

// SAFETY: all aliasing mutation is funneled through methods whose contract
// requires logically exclusive access, provided by the dependency DAG.
unsafe impl<T: Scalar> Sync for TypedVector<T> {}

impl<T: Scalar> Default for TypedVector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Scalar> TypedVector<T> {
    pub fn new() -> Self {
        Self {
            cell: UnsafeCell::new(Vec::new()),
        }
    }

    pub fn from_vec(v: Vec<T>) -> Self {
        Self {
            cell: UnsafeCell::new(v),
        }
    }

    /// Shared view of the elements.
    ///
    /// Sound while no writer task for this column is in flight — the same
    /// window in which readers are scheduled at all.
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: see method docs; readers are never scheduled concurrently
        // with a writer to the same column.
        unsafe { (*self.cell.get()).as_slice() }
    }

    /// Append one element.  Same exclusivity requirement as `push_value`.
    pub fn push(&self, v: T) {
        // SAFETY: exclusive access per the trait contract.
        unsafe { (*self.cell.get()).push(v) }
    }

    #[allow(clippy::mut_from_ref)]
    unsafe fn vec_mut(&self) -> &mut Vec<T> {
        // SAFETY: caller holds logically exclusive access.
        unsafe { &mut *self.cell.get() }
    }

    fn vec(&self) -> &Vec<T> {
        // SAFETY: no exclusive writer concurrent with this read.
        unsafe { &*self.cell.get() }
    }
}

impl<T: Scalar> VectorStore for TypedVector<T> {
    fn reserve(&self, n: usize) {
        let v = unsafe { self.vec_mut() };
        if n > v.capacity() {
            v.reserve(n - v.len());
        }
    }

    fn len(&self) -> usize {
        self.vec().len()
    }

    fn raw_begin(&self) -> *mut u8 {
        let v = self.vec();
        if v.is_empty() {
            ptr::null_mut()
        } else {
            v.as_ptr() as *mut u8
        }
    }

    fn raw_begin_at(&self, offset: usize) -> *mut u8 {
        let v = self.vec();
        if offset >= v.len() {
            ptr::null_mut()
        } else {
            // SAFETY: offset < len, so the element pointer is in bounds.
            unsafe { v.as_ptr().add(offset) as *mut u8 }
        }
    }

    fn raw_step(&self, p: *mut u8) -> *mut u8 {
        let v = self.vec();
        if p.is_null() || v.is_empty() {
            return ptr::null_mut();
        }
        let last = unsafe { v.as_ptr().add(v.len() - 1) } as *mut u8;
        if p >= last {
            ptr::null_mut()
        } else {
            // SAFETY: p < last, so p + 1 element is still in bounds.
            unsafe { (p as *mut T).add(1) as *mut u8 }
        }
    }

    fn extend_from(&self, other: &dyn VectorStore) -> MemResult<()> {
        let Some(other) = other.as_any().downcast_ref::<TypedVector<T>>() else {
            return Err(MemError::InvalidType {
                var: String::new(),
                actual: other.scalar_type(),
                requested: T::TYPE,
            });
        };
        let dst = unsafe { self.vec_mut() };
        dst.extend_from_slice(other.as_slice());
        Ok(())
    }

    fn clone_empty(&self) -> Box<dyn VectorStore> {
        Box::new(TypedVector::<T>::new())
    }

    fn truncate(&self) {
        unsafe { self.vec_mut() }.clear();
    }

    fn remove_rows(&self, rows: &[usize]) {
        if rows.is_empty() {
            return;
        }
        let v = unsafe { self.vec_mut() };
        let mut dead = rows.iter().copied().peekable();
        let mut write = 0usize;
        for read in 0..v.len() {
            if dead.peek() == Some(&read) {
                dead.next();
                continue;
            }
            if write != read {
                v[write] = v[read];
            }
            write += 1;
        }
        v.truncate(write);
    }

    fn push_value(&self, value: ScalarValue) -> MemResult<()> {
        match T::from_value(value) {
            Some(v) => {
                self.push(v);
                Ok(())
            }
            None => Err(MemError::InvalidType {
                var: String::new(),
                actual: T::TYPE,
                requested: value.scalar_type(),
            }),
        }
    }

    fn value_at(&self, idx: usize) -> Option<ScalarValue> {
        self.vec().get(idx).map(|v| v.into_value())
    }

    fn scalar_type(&self) -> ScalarType {
        T::TYPE
    }

    fn element_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Construct an empty erased column for a scalar tag.
pub fn new_store(scalar: ScalarType) -> Box<dyn VectorStore> {
    match scalar {
        ScalarType::Int => Box::new(TypedVector::<i64>::new()),
        ScalarType::Double => Box::new(TypedVector::<f64>::new()),
    }
}
