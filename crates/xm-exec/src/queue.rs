//! The FIFO task queue and its worker-thread pool.
//!
//! A queue owns a fixed pool of workers created at construction and joined
//! at destruction via termination sentinels.  Workers block only on the
//! queue's condition variable; task completion is reported upstream through
//! the scheduler-supplied callback.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use rustc_hash::FxHashMap;
use xm_core::TaskId;

use crate::context::EngineContext;
use crate::error::{ExecError, ExecResult};
use crate::manager::TaskManager;
use crate::runner;

/// Completion callback handed to queues by the scheduler.
pub type DoneCallback = Arc<dyn Fn(TaskId, ExecResult<()>) + Send + Sync>;

/// The interface the scheduler drives queues through.
pub trait TaskQueue: Send + Sync {
    /// Add a task to the queue, waking a worker.
    fn enqueue(&self, id: TaskId);

    /// Worker slots in this queue's pool.
    fn slots(&self) -> usize;
}

// ── Shared queue core ─────────────────────────────────────────────────────────

/// Split bookkeeping for one enqueued task.
pub(crate) struct SplitState {
    pub(crate) windows: Vec<(usize, usize)>,
    /// Next window to hand out.
    pub(crate) next: usize,
    /// Sub-tasks not yet reported done.
    pub(crate) remaining: usize,
    /// First error among the sub-tasks.
    pub(crate) error: Option<ExecError>,
}

pub(crate) struct QueueState {
    pub(crate) fifo: VecDeque<TaskId>,
    pub(crate) splits: FxHashMap<TaskId, SplitState>,
}

/// State shared between a queue facade and its workers.
pub(crate) struct QueueShared {
    pub(crate) state: Mutex<QueueState>,
    pub(crate) ready: Condvar,
    pub(crate) tasks: Arc<TaskManager>,
    pub(crate) ctx: Arc<EngineContext>,
    pub(crate) callback: DoneCallback,
    /// `true` for splitting queues.
    pub(crate) splitting: bool,
    pub(crate) max_tasks_per_split: AtomicUsize,
    pub(crate) min_vector_size: AtomicUsize,
}

impl QueueShared {
    pub(crate) fn new(
        tasks: Arc<TaskManager>,
        ctx: Arc<EngineContext>,
        callback: DoneCallback,
        splitting: bool,
        slots: usize,
        min_vector_size: usize,
    ) -> Self {
        Self {
            state: Mutex::new(QueueState {
                fifo: VecDeque::new(),
                splits: FxHashMap::default(),
            }),
            ready: Condvar::new(),
            tasks,
            ctx,
            callback,
            splitting,
            max_tasks_per_split: AtomicUsize::new(slots),
            min_vector_size: AtomicUsize::new(min_vector_size),
        }
    }

    /// Enqueue `id`, waking one worker — or, if the task splits, as many
    /// workers as there are sub-tasks.
    pub(crate) fn enqueue(&self, id: TaskId) {
        let mut st = self.state.lock().expect("queue mutex poisoned");
        st.fifo.push_back(id);
        self.ready.notify_one();

        // The TERM sentinel has no task object behind it.
        if id.is_term() || !self.splitting {
            return;
        }
        let Ok(task) = self.tasks.task(id) else {
            return;
        };
        if !task.kind().splittable() {
            return;
        }

        let n = task.population(&self.ctx);
        let min = self.min_vector_size.load(Ordering::Acquire).max(1);
        let max = self.max_tasks_per_split.load(Ordering::Acquire).max(1);
        if n <= min * 2 {
            return; // too small to be worth splitting
        }
        let k = max.min(n / min);
        if k < 2 {
            return;
        }
        let windows = chunk_windows(n, k);
        tracing::debug!(task = %task.name(), population = n, sub_tasks = k, "split task");
        st.splits.insert(
            id,
            SplitState {
                remaining: windows.len(),
                next: 0,
                windows,
                error: None,
            },
        );
        for _ in 1..k {
            self.ready.notify_one();
        }
    }

    /// Block until work is available; returns the task id and, for a split
    /// sub-task, its `(offset, count)` window.
    pub(crate) fn pop_next(&self) -> (TaskId, Option<(usize, usize)>) {
        let mut st = self.state.lock().expect("queue mutex poisoned");
        loop {
            let state = &mut *st;
            if let Some(&front) = state.fifo.front() {
                if let Some(split) = state.splits.get_mut(&front) {
                    let window = split.windows[split.next];
                    split.next += 1;
                    if split.next == split.windows.len() {
                        state.fifo.pop_front(); // all sub-tasks handed out
                    }
                    return (front, Some(window));
                }
                state.fifo.pop_front();
                return (front, None);
            }
            st = self.ready.wait(st).expect("queue mutex poisoned");
        }
    }

    /// Report one (sub-)task done.  For split tasks the upstream callback
    /// fires only after the last sub-task completes, carrying the first
    /// sub-task error if any.
    pub(crate) fn task_done(&self, id: TaskId, outcome: ExecResult<()>) {
        let upstream = {
            let mut st = self.state.lock().expect("queue mutex poisoned");
            match st.splits.get_mut(&id) {
                Some(split) => {
                    if let Err(e) = outcome {
                        split.error.get_or_insert(e);
                    }
                    split.remaining -= 1;
                    if split.remaining > 0 {
                        return; // more sub-tasks in flight
                    }
                    let split = st
                        .splits
                        .remove(&id)
                        .expect("split entry vanished mid-completion");
                    match split.error {
                        Some(e) => Err(e),
                        None => Ok(()),
                    }
                }
                None => outcome,
            }
        };
        (self.callback)(id, upstream);
    }
}

/// Divide `n` rows into `k` near-equal contiguous windows.
fn chunk_windows(n: usize, k: usize) -> Vec<(usize, usize)> {
    let base = n / k;
    let extra = n % k;
    let mut windows = Vec::with_capacity(k);
    let mut offset = 0;
    for i in 0..k {
        let count = base + usize::from(i < extra);
        windows.push((offset, count));
        offset += count;
    }
    windows
}

// ── Worker loop ───────────────────────────────────────────────────────────────

pub(crate) fn spawn_workers(shared: &Arc<QueueShared>, slots: usize) -> Vec<JoinHandle<()>> {
    (0..slots)
        .map(|i| {
            let shared = Arc::clone(shared);
            std::thread::Builder::new()
                .name(format!("xm-worker-{i}"))
                .spawn(move || worker_loop(shared))
                .expect("failed to spawn worker thread")
        })
        .collect()
}

fn worker_loop(shared: Arc<QueueShared>) {
    loop {
        let (id, window) = shared.pop_next();
        if id.is_term() {
            return;
        }
        let outcome = match shared.tasks.task(id) {
            Ok(task) => runner::run_task(task, window, &shared.ctx),
            Err(e) => Err(e),
        };
        shared.task_done(id, outcome);
    }
}

// ── FifoQueue ─────────────────────────────────────────────────────────────────

/// The basic FIFO queue: one shared deque, a condition variable, and a fixed
/// pool of workers.  Never splits tasks.
pub struct FifoQueue {
    shared: Arc<QueueShared>,
    slots: usize,
    handles: Vec<JoinHandle<()>>,
}

impl FifoQueue {
    pub fn new(
        slots: usize,
        tasks: Arc<TaskManager>,
        ctx: Arc<EngineContext>,
        callback: DoneCallback,
    ) -> ExecResult<Self> {
        if slots == 0 {
            return Err(ExecError::InvalidArgument("slots must be > 0".into()));
        }
        let shared = Arc::new(QueueShared::new(tasks, ctx, callback, false, slots, 1));
        let handles = spawn_workers(&shared, slots);
        Ok(Self {
            shared,
            slots,
            handles,
        })
    }
}

impl TaskQueue for FifoQueue {
    fn enqueue(&self, id: TaskId) {
        self.shared.enqueue(id);
    }

    fn slots(&self) -> usize {
        self.slots
    }
}

impl Drop for FifoQueue {
    fn drop(&mut self) {
        for _ in 0..self.slots {
            self.shared.enqueue(TaskId::TERM);
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
