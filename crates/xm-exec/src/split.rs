//! The splitting FIFO queue for data-parallel task types.
//!
//! Identical to [`FifoQueue`](crate::FifoQueue) except that on enqueue it
//! inspects the task's agent-population size and may subdivide the task into
//! windowed sub-tasks sharing the same id.  The queue reports the id
//! upstream only once every sub-task has completed.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;

use xm_core::TaskId;

use crate::context::EngineContext;
use crate::error::{ExecError, ExecResult};
use crate::manager::TaskManager;
use crate::queue::{DoneCallback, QueueShared, TaskQueue, spawn_workers};

/// Default minimum window width: populations below twice this size run
/// unsplit.
pub const DEFAULT_MIN_VECTOR_SIZE: usize = 50;

/// A FIFO queue that subdivides `function`/`condition` tasks into windowed
/// sub-tasks for its worker pool.
pub struct SplittingFifoQueue {
    shared: Arc<QueueShared>,
    slots: usize,
    handles: Vec<JoinHandle<()>>,
}

impl SplittingFifoQueue {
    /// Create the queue with `slots` workers.  `max_tasks_per_split`
    /// defaults to the slot count and `min_vector_size` to
    /// [`DEFAULT_MIN_VECTOR_SIZE`].
    pub fn new(
        slots: usize,
        tasks: Arc<TaskManager>,
        ctx: Arc<EngineContext>,
        callback: DoneCallback,
    ) -> ExecResult<Self> {
        if slots == 0 {
            return Err(ExecError::InvalidArgument("slots must be > 0".into()));
        }
        let shared = Arc::new(QueueShared::new(
            tasks,
            ctx,
            callback,
            true,
            slots,
            DEFAULT_MIN_VECTOR_SIZE,
        ));
        let handles = spawn_workers(&shared, slots);
        Ok(Self {
            shared,
            slots,
            handles,
        })
    }

    /// Cap the number of sub-tasks one task may split into.
    pub fn set_max_tasks_per_split(&self, max: usize) -> ExecResult<()> {
        if max == 0 {
            return Err(ExecError::InvalidArgument(
                "max_tasks_per_split must be > 0".into(),
            ));
        }
        self.shared
            .max_tasks_per_split
            .store(max, Ordering::Release);
        Ok(())
    }

    pub fn max_tasks_per_split(&self) -> usize {
        self.shared.max_tasks_per_split.load(Ordering::Acquire)
    }

    /// Set the minimum window width a split may produce.
    pub fn set_min_vector_size(&self, min: usize) -> ExecResult<()> {
        if min == 0 {
            return Err(ExecError::InvalidArgument(
                "min_vector_size must be > 0".into(),
            ));
        }
        self.shared.min_vector_size.store(min, Ordering::Release);
        Ok(())
    }

    pub fn min_vector_size(&self) -> usize {
        self.shared.min_vector_size.load(Ordering::Acquire)
    }
}

impl TaskQueue for SplittingFifoQueue {
    fn enqueue(&self, id: TaskId) {
        self.shared.enqueue(id);
    }

    fn slots(&self) -> usize {
        self.slots
    }
}

impl Drop for SplittingFifoQueue {
    fn drop(&mut self) {
        for _ in 0..self.slots {
            self.shared.enqueue(TaskId::TERM);
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
