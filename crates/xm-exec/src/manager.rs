//! `TaskManager` — owns every task and drives per-iteration bookkeeping.
//!
//! Tasks and dependencies are created while the manager is exclusively owned
//! (`&mut`); [`finalize`](TaskManager::finalize) freezes the graph, checks it
//! for cycles, and computes the root set and parent counts.  After that the
//! manager is shared behind `Arc` and only the per-iteration state — the
//! ready, assigned, and pending sets — changes, always under one mutex with
//! short critical sections.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rustc_hash::{FxHashMap, FxHashSet};
use xm_core::TaskId;

use crate::context::EngineContext;
use crate::error::{ExecError, ExecResult};
use crate::task::{Task, TaskSpec};

/// Per-iteration mutable state, guarded by a single mutex.
struct IterState {
    /// Unmet parent count per task; a task enters the ready set at zero.
    pending: Vec<usize>,
    /// Tasks ready to dispatch.
    ready: VecDeque<TaskId>,
    /// Tasks handed to a worker and not yet reported done.
    assigned: FxHashSet<TaskId>,
    /// Completion flags for the current iteration.
    done: Vec<bool>,
    /// Number of tasks completed this iteration.
    completed: usize,
}

/// The owner of the compiled task graph.
pub struct TaskManager {
    tasks: Vec<Arc<Task>>,
    by_name: FxHashMap<String, TaskId>,
    children: Vec<Vec<usize>>,
    parents: Vec<Vec<usize>>,
    finalized: bool,
    roots: Vec<TaskId>,
    leaves: Vec<TaskId>,
    iter: Mutex<IterState>,
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("finalized", &self.finalized)
            .field("task_count", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            by_name: FxHashMap::default(),
            children: Vec::new(),
            parents: Vec::new(),
            finalized: false,
            roots: Vec::new(),
            leaves: Vec::new(),
            iter: Mutex::new(IterState {
                pending: Vec::new(),
                ready: VecDeque::new(),
                assigned: FxHashSet::default(),
                done: Vec::new(),
                completed: 0,
            }),
        }
    }

    // ── Graph construction (&mut, pre-finalize) ───────────────────────────

    /// Create and register a task; returns its stable id.
    ///
    /// Fails `AlreadyFinalized` once the graph is frozen, `DuplicateName` on
    /// a name conflict, and `InvalidArgument` when the owning agent or
    /// message does not resolve against the engine context.
    pub fn create_task(&mut self, spec: TaskSpec, ctx: &EngineContext) -> ExecResult<TaskId> {
        if self.finalized {
            return Err(ExecError::AlreadyFinalized);
        }
        if self.by_name.contains_key(&spec.name) {
            return Err(ExecError::DuplicateName(spec.name));
        }
        let id = TaskId(self.tasks.len() as u64);
        let name = spec.name.clone();
        let task = Task::build(id, spec, ctx)?;
        self.by_name.insert(name, id);
        self.tasks.push(Arc::new(task));
        self.children.push(Vec::new());
        self.parents.push(Vec::new());
        Ok(id)
    }

    /// Add a dependency edge: `to` runs only after `from` is done.
    ///
    /// Fails `WouldCycle` when `from` is already reachable from `to`.
    /// Redundant duplicate edges are ignored.
    pub fn add_dependency(&mut self, from: TaskId, to: TaskId) -> ExecResult<()> {
        if self.finalized {
            return Err(ExecError::AlreadyFinalized);
        }
        self.check_id(from)?;
        self.check_id(to)?;
        if from == to || self.reachable(to.index(), from.index()) {
            return Err(ExecError::WouldCycle { from, to });
        }
        if self.children[from.index()].contains(&to.index()) {
            return Ok(());
        }
        self.children[from.index()].push(to.index());
        self.parents[to.index()].push(from.index());
        Ok(())
    }

    /// Drop the dependency edge `from -> to` if present (transitive
    /// reduction rewrites edges through here before finalize).
    pub fn remove_dependency(&mut self, from: TaskId, to: TaskId) -> ExecResult<()> {
        if self.finalized {
            return Err(ExecError::AlreadyFinalized);
        }
        self.check_id(from)?;
        self.check_id(to)?;
        self.children[from.index()].retain(|&c| c != to.index());
        self.parents[to.index()].retain(|&p| p != from.index());
        Ok(())
    }

    /// Freeze the graph: verify acyclicity, compute roots, leaves, and the
    /// parent-count table, and prepare the first iteration.
    pub fn finalize(&mut self) -> ExecResult<()> {
        if self.finalized {
            return Ok(());
        }
        self.check_acyclic()?;
        self.roots = (0..self.tasks.len())
            .filter(|&i| self.parents[i].is_empty())
            .map(|i| TaskId(i as u64))
            .collect();
        self.leaves = (0..self.tasks.len())
            .filter(|&i| self.children[i].is_empty())
            .map(|i| TaskId(i as u64))
            .collect();
        self.finalized = true;
        self.iter_reset();
        tracing::info!(
            tasks = self.tasks.len(),
            roots = self.roots.len(),
            leaves = self.leaves.len(),
            "task graph finalized"
        );
        Ok(())
    }

    // ── Lookup ────────────────────────────────────────────────────────────

    pub fn task(&self, id: TaskId) -> ExecResult<&Arc<Task>> {
        self.tasks.get(id.index()).ok_or(ExecError::UnknownTask(id))
    }

    pub fn task_by_name(&self, name: &str) -> ExecResult<&Arc<Task>> {
        let id = self
            .by_name
            .get(name)
            .ok_or_else(|| ExecError::UnknownTaskName(name.to_owned()))?;
        self.task(*id)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn roots(&self) -> &[TaskId] {
        &self.roots
    }

    pub fn leaves(&self) -> &[TaskId] {
        &self.leaves
    }

    /// Parent ids of `id` in the reduced DAG.
    pub fn parents_of(&self, id: TaskId) -> ExecResult<Vec<TaskId>> {
        self.check_id(id)?;
        Ok(self.parents[id.index()]
            .iter()
            .map(|&p| TaskId(p as u64))
            .collect())
    }

    /// Child ids of `id` in the reduced DAG.
    pub fn children_of(&self, id: TaskId) -> ExecResult<Vec<TaskId>> {
        self.check_id(id)?;
        Ok(self.children[id.index()]
            .iter()
            .map(|&c| TaskId(c as u64))
            .collect())
    }

    /// `true` if an edge `from -> to` exists.
    pub fn dependency_exists(&self, from: TaskId, to: TaskId) -> bool {
        self.children
            .get(from.index())
            .is_some_and(|cs| cs.contains(&to.index()))
    }

    // ── Per-iteration state ───────────────────────────────────────────────

    /// Reset counters for a fresh iteration: pending ← parent counts,
    /// ready ← roots, assigned and done cleared.
    pub fn iter_reset(&self) {
        let mut st = self.lock_iter();
        st.pending = self.parents.iter().map(Vec::len).collect();
        st.ready = self.roots.iter().copied().collect();
        st.assigned.clear();
        st.done = vec![false; self.tasks.len()];
        st.completed = 0;
    }

    /// Atomically remove and return one ready task id.
    pub fn iter_pop(&self) -> ExecResult<TaskId> {
        let mut st = self.lock_iter();
        match st.ready.pop_front() {
            Some(id) => {
                st.assigned.insert(id);
                Ok(id)
            }
            None => Err(ExecError::NoneAvailable),
        }
    }

    /// `true` while the ready set is non-empty.
    pub fn iter_task_available(&self) -> bool {
        !self.lock_iter().ready.is_empty()
    }

    /// Report task `id` done; unlocks children whose last parent this was.
    ///
    /// Fails `InvalidArgument` if `id` was never assigned this iteration.
    pub fn iter_done(&self, id: TaskId) -> ExecResult<()> {
        self.check_id(id)?;
        let mut st = self.lock_iter();
        if !st.assigned.remove(&id) {
            return Err(ExecError::InvalidArgument(format!(
                "task {id} reported done but was not assigned"
            )));
        }
        st.done[id.index()] = true;
        st.completed += 1;
        for &child in &self.children[id.index()] {
            st.pending[child] -= 1;
            if st.pending[child] == 0 {
                st.ready.push_back(TaskId(child as u64));
            }
        }
        Ok(())
    }

    /// `true` once the ready, assigned, and pending sets are all empty.
    pub fn iter_complete(&self) -> bool {
        let st = self.lock_iter();
        st.ready.is_empty() && st.assigned.is_empty() && st.completed == self.tasks.len()
    }

    /// Number of tasks currently assigned to workers.
    pub fn iter_assigned_count(&self) -> usize {
        self.lock_iter().assigned.len()
    }

    /// `true` if `id` completed this iteration.
    pub fn iter_is_done(&self, id: TaskId) -> bool {
        self.lock_iter().done.get(id.index()).copied().unwrap_or(false)
    }

    // ── Internals ─────────────────────────────────────────────────────────

    fn lock_iter(&self) -> std::sync::MutexGuard<'_, IterState> {
        self.iter.lock().expect("iteration-state mutex poisoned")
    }

    fn check_id(&self, id: TaskId) -> ExecResult<()> {
        if id.index() < self.tasks.len() {
            Ok(())
        } else {
            Err(ExecError::UnknownTask(id))
        }
    }

    /// Depth-first reachability over the children lists.
    fn reachable(&self, from: usize, target: usize) -> bool {
        let mut seen = vec![false; self.tasks.len()];
        let mut stack = vec![from];
        while let Some(v) = stack.pop() {
            if v == target {
                return true;
            }
            if std::mem::replace(&mut seen[v], true) {
                continue;
            }
            stack.extend(self.children[v].iter().copied());
        }
        false
    }

    /// Kahn's algorithm; failure reports the tasks left on the cycle.
    fn check_acyclic(&self) -> ExecResult<()> {
        let mut indeg: Vec<usize> = self.parents.iter().map(Vec::len).collect();
        let mut queue: VecDeque<usize> = indeg
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d == 0)
            .map(|(i, _)| i)
            .collect();
        let mut visited = 0usize;
        while let Some(v) = queue.pop_front() {
            visited += 1;
            for &c in &self.children[v] {
                indeg[c] -= 1;
                if indeg[c] == 0 {
                    queue.push_back(c);
                }
            }
        }
        if visited == self.tasks.len() {
            Ok(())
        } else {
            let cycle: Vec<&str> = indeg
                .iter()
                .enumerate()
                .filter(|&(_, &d)| d > 0)
                .map(|(i, _)| self.tasks[i].name())
                .collect();
            Err(ExecError::CycleDetected(cycle.join(", ")))
        }
    }
}
