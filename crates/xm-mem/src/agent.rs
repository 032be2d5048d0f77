//! `AgentMemory` — the named columns of one agent type.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use rustc_hash::FxHashMap;
use xm_core::{Scalar, ScalarType, ScalarValue};

use crate::error::{MemError, MemResult};
use crate::shadow::AgentShadow;
use crate::vector::{TypedVector, VectorStore, new_store};

/// One registered column: declaration-ordered name, tag, and erased storage.
pub(crate) struct Column {
    pub(crate) name: String,
    pub(crate) scalar: ScalarType,
    pub(crate) store: Arc<dyn VectorStore>,
}

/// All memory columns of one agent type.
///
/// Variables are registered in declaration order; the order is observable
/// through [`schema_vars`](Self::schema_vars) and matters to population-file
/// round trips.  Once a capacity hint locks the layout, no further variables
/// may be registered.
///
/// Column data mutation goes through `&self` (see the crate docs for the
/// concurrency contract); the registration plane is `&mut`.
pub struct AgentMemory {
    name: String,
    columns: Vec<Column>,
    by_name: FxHashMap<String, usize>,
    /// Layout locked — set by the first capacity hint.
    finalized: bool,
    /// Rows marked dead this iteration; compacted at the iteration boundary.
    dead: Mutex<BTreeSet<usize>>,
}

impl AgentMemory {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            columns: Vec::new(),
            by_name: FxHashMap::default(),
            finalized: false,
            dead: Mutex::new(BTreeSet::new()),
        }
    }

    /// The agent-type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    // ── Registration plane (&mut, pre-share) ──────────────────────────────

    /// Register variable `name` with element type `T`.
    ///
    /// Fails `AlreadyFinalized` once a capacity hint has locked the layout
    /// and `DuplicateName` if the variable exists.
    pub fn register_var<T: Scalar>(&mut self, name: &str) -> MemResult<()> {
        self.register_store(name, T::TYPE, Arc::new(TypedVector::<T>::new()))
    }

    /// Tag-driven registration used by the model loader.
    pub fn register_var_scalar(&mut self, name: &str, scalar: ScalarType) -> MemResult<()> {
        self.register_store(name, scalar, Arc::from(new_store(scalar)))
    }

    fn register_store(
        &mut self,
        name: &str,
        scalar: ScalarType,
        store: Arc<dyn VectorStore>,
    ) -> MemResult<()> {
        if self.finalized {
            return Err(MemError::AlreadyFinalized {
                agent: self.name.clone(),
                var: name.to_owned(),
            });
        }
        if self.by_name.contains_key(name) {
            return Err(MemError::DuplicateName(name.to_owned()));
        }
        self.by_name.insert(name.to_owned(), self.columns.len());
        self.columns.push(Column {
            name: name.to_owned(),
            scalar,
            store,
        });
        tracing::debug!(agent = %self.name, var = name, %scalar, "registered variable");
        Ok(())
    }

    /// Reserve room for `n` agents in every column and lock the layout.
    pub fn hint_population_size(&mut self, n: usize) {
        for col in &self.columns {
            col.store.reserve(n);
        }
        self.finalized = true;
    }

    /// `true` once the layout is locked.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    // ── Lookup ────────────────────────────────────────────────────────────

    pub(crate) fn column(&self, var: &str) -> MemResult<&Column> {
        self.by_name
            .get(var)
            .map(|&i| &self.columns[i])
            .ok_or_else(|| MemError::InvalidVariable {
                agent: self.name.clone(),
                var: var.to_owned(),
            })
    }

    /// The type-erased store for internal machinery.
    pub fn vector_wrapper(&self, var: &str) -> MemResult<&Arc<dyn VectorStore>> {
        Ok(&self.column(var)?.store)
    }

    /// Typed handle to a column.
    ///
    /// Fails `InvalidVariable` on a miss and `InvalidType` if `T` disagrees
    /// with the declared element type.
    pub fn vector_of<T: Scalar>(&self, var: &str) -> MemResult<&TypedVector<T>> {
        let col = self.column(var)?;
        col.store
            .as_any()
            .downcast_ref::<TypedVector<T>>()
            .ok_or_else(|| MemError::InvalidType {
                var: var.to_owned(),
                actual: col.scalar,
                requested: T::TYPE,
            })
    }

    /// Declared scalar type of a column.
    pub fn scalar_type_of(&self, var: &str) -> MemResult<ScalarType> {
        Ok(self.column(var)?.scalar)
    }

    /// `true` if `var` is declared on this agent.
    pub fn has_var(&self, var: &str) -> bool {
        self.by_name.contains_key(var)
    }

    /// Number of declared variables.
    pub fn var_count(&self) -> usize {
        self.columns.len()
    }

    /// `(type, name)` pairs in declaration order, for plugin discovery.
    pub fn schema_vars(&self) -> Vec<(ScalarType, String)> {
        self.columns
            .iter()
            .map(|c| (c.scalar, c.name.clone()))
            .collect()
    }

    /// Current population: the length of the first column (all columns are
    /// equal-length at task boundaries).  Zero when no variables exist.
    pub fn population(&self) -> usize {
        self.columns.first().map_or(0, |c| c.store.len())
    }

    /// Verify the column-equality invariant; fails `SizeMismatch` naming the
    /// first deviating column.
    pub fn assert_columns_equal(&self) -> MemResult<()> {
        let expected = self.population();
        for col in &self.columns {
            let got = col.store.len();
            if got != expected {
                return Err(MemError::SizeMismatch {
                    var: col.name.clone(),
                    expected,
                    got,
                });
            }
        }
        Ok(())
    }

    // ── Data plane (&self) ────────────────────────────────────────────────

    /// Append one value to a column (population loading).
    pub fn append_value(&self, var: &str, value: ScalarValue) -> MemResult<()> {
        let col = self.column(var)?;
        if col.scalar != value.scalar_type() {
            return Err(MemError::InvalidType {
                var: var.to_owned(),
                actual: col.scalar,
                requested: value.scalar_type(),
            });
        }
        col.store.push_value(value)
    }

    /// A fresh shadow over this agent's memory, initially with no
    /// accessible variables.
    pub fn make_shadow(self: &Arc<Self>) -> AgentShadow {
        AgentShadow::new(Arc::clone(self))
    }

    // ── Death and compaction ──────────────────────────────────────────────

    /// Record row `row` for removal at the end of the current iteration.
    /// Idempotent per row.
    pub fn mark_dead(&self, row: usize) {
        self.dead.lock().expect("dead-set mutex poisoned").insert(row);
    }

    /// Remove all rows marked dead from every column, in one ordered pass.
    ///
    /// Runs single-threaded between iterations.  Returns the number of rows
    /// removed.
    pub fn compact(&self) -> usize {
        let rows: Vec<usize> = {
            let mut dead = self.dead.lock().expect("dead-set mutex poisoned");
            std::mem::take(&mut *dead).into_iter().collect()
        };
        if rows.is_empty() {
            return 0;
        }
        for col in &self.columns {
            col.store.remove_rows(&rows);
        }
        tracing::debug!(agent = %self.name, removed = rows.len(), "compacted population");
        rows.len()
    }
}
