//! The scheduler: type→queue routing and the per-iteration driver.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use rustc_hash::FxHashMap;
use xm_core::{QueueId, TaskId};

use crate::context::EngineContext;
use crate::error::{ExecError, ExecResult};
use crate::manager::TaskManager;
use crate::queue::{DoneCallback, TaskQueue};
use crate::task::TaskKind;

// ── Done queue ────────────────────────────────────────────────────────────────

/// Completions reported by workers, drained by the iteration driver.
struct DoneQueue {
    queue: Mutex<Vec<(TaskId, ExecResult<()>)>>,
    cond: Condvar,
}

impl DoneQueue {
    fn new() -> Self {
        Self {
            queue: Mutex::new(Vec::new()),
            cond: Condvar::new(),
        }
    }

    fn push(&self, id: TaskId, outcome: ExecResult<()>) {
        let mut q = self.queue.lock().expect("done-queue mutex poisoned");
        q.push((id, outcome));
        self.cond.notify_one();
    }

    /// Block until at least one completion arrives, then take them all.
    fn wait_drain(&self) -> Vec<(TaskId, ExecResult<()>)> {
        let mut q = self.queue.lock().expect("done-queue mutex poisoned");
        while q.is_empty() {
            q = self.cond.wait(q).expect("done-queue mutex poisoned");
        }
        std::mem::take(&mut *q)
    }

    fn clear(&self) {
        self.queue.lock().expect("done-queue mutex poisoned").clear();
    }
}

// ── Scheduler ─────────────────────────────────────────────────────────────────

/// Dispatches ready tasks onto typed queues and drives the iteration
/// lifecycle.
///
/// Construction order: create the scheduler, create queues with
/// [`callback`](Self::callback), add them with [`add_queue`](Self::add_queue),
/// bind task types with [`assign`](Self::assign), then call
/// [`run_iteration`](Self::run_iteration) once per simulated step.
pub struct Scheduler {
    tasks: Arc<TaskManager>,
    ctx: Arc<EngineContext>,
    queues: Vec<Box<dyn TaskQueue>>,
    route: FxHashMap<TaskKind, QueueId>,
    done: Arc<DoneQueue>,
    /// Completed iteration count; also the index of the next iteration.
    iteration: AtomicU64,
}

impl Scheduler {
    pub fn new(tasks: Arc<TaskManager>, ctx: Arc<EngineContext>) -> Self {
        Self {
            tasks,
            ctx,
            queues: Vec::new(),
            route: FxHashMap::default(),
            done: Arc::new(DoneQueue::new()),
            iteration: AtomicU64::new(0),
        }
    }

    /// The completion callback queues must be constructed with.
    pub fn callback(&self) -> DoneCallback {
        let done = Arc::clone(&self.done);
        Arc::new(move |id, outcome| done.push(id, outcome))
    }

    /// Take ownership of a queue; returns its id for `assign`.
    pub fn add_queue(&mut self, queue: Box<dyn TaskQueue>) -> QueueId {
        self.queues.push(queue);
        QueueId((self.queues.len() - 1) as u16)
    }

    /// Bind a task type to a queue.  Each type may be bound exactly once.
    pub fn assign(&mut self, kind: TaskKind, queue: QueueId) -> ExecResult<()> {
        if queue.index() >= self.queues.len() {
            return Err(ExecError::InvalidArgument(format!(
                "invalid queue id {queue}"
            )));
        }
        if self.route.contains_key(&kind) {
            return Err(ExecError::TypeAlreadyAssigned(kind));
        }
        self.route.insert(kind, queue);
        Ok(())
    }

    /// Completed iterations so far.
    pub fn iteration(&self) -> u64 {
        self.iteration.load(Ordering::Acquire)
    }

    /// Set the iteration number the next run executes as, e.g. to continue
    /// from a loaded population's iteration count.
    pub fn set_iteration(&self, iteration: u64) {
        self.iteration.store(iteration, Ordering::Release);
    }

    /// Execute one full iteration of the task graph.
    ///
    /// Every task runs exactly once (split sub-tasks count as one task).
    /// On a task failure the driver stops dispatching, waits for in-flight
    /// tasks to drain, resets the iteration state, and returns the first
    /// error.
    pub fn run_iteration(&self) -> ExecResult<()> {
        if !self.tasks.is_finalized() {
            return Err(ExecError::NotFinalized);
        }
        if self.tasks.roots().is_empty() {
            return Err(ExecError::NoRunnableTasks);
        }

        let iteration = self.iteration.load(Ordering::Acquire);
        self.ctx.set_iteration(iteration);
        self.done.clear();
        tracing::debug!(iteration, "iteration start");

        let mut first_error: Option<ExecError> = None;
        while !self.tasks.iter_complete() {
            if first_error.is_none() {
                // Drain the ready set onto the queues.
                loop {
                    match self.tasks.iter_pop() {
                        Ok(id) => self.dispatch(id)?,
                        Err(ExecError::NoneAvailable) => break,
                        Err(e) => return Err(e),
                    }
                }
            }
            if self.tasks.iter_assigned_count() == 0 {
                // Aborting: nothing in flight remains.
                break;
            }
            for (id, outcome) in self.done.wait_drain() {
                self.tasks.iter_done(id)?;
                if let Err(e) = outcome {
                    tracing::warn!(task = %id, error = %e, "task failed; aborting iteration");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        self.tasks.iter_reset();
        match first_error {
            Some(e) => Err(e),
            None => {
                self.iteration.fetch_add(1, Ordering::AcqRel);
                tracing::info!(iteration, "iteration complete");
                Ok(())
            }
        }
    }

    fn dispatch(&self, id: TaskId) -> ExecResult<()> {
        let task = self.tasks.task(id)?;
        let qid = self
            .route
            .get(&task.kind())
            .ok_or(ExecError::UnassignedType(task.kind()))?;
        self.queues[qid.index()].enqueue(id);
        Ok(())
    }
}
