//! `EngineContext` — the shared state handle passed to queues and workers.
//!
//! One context per simulation: the memory manager, the board manager, the
//! optional population sink, and the current iteration number.  Passing the
//! context explicitly keeps the registries out of global state while still
//! giving every worker a single source of truth.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use xm_board::BoardManager;
use xm_core::plugin::PopulationSink;
use xm_mem::MemoryManager;

/// Shared engine state.  Registration into the managers completes before the
/// context is constructed; afterwards only data-plane (`&self`) operations
/// occur.
pub struct EngineContext {
    memory: Arc<MemoryManager>,
    boards: Arc<BoardManager>,
    pop_sink: Mutex<Option<Box<dyn PopulationSink>>>,
    iteration: AtomicU64,
}

impl EngineContext {
    /// Wrap fully-registered managers into a shareable context.
    pub fn new(memory: MemoryManager, boards: BoardManager) -> Self {
        Self {
            memory: Arc::new(memory),
            boards: Arc::new(boards),
            pop_sink: Mutex::new(None),
            iteration: AtomicU64::new(0),
        }
    }

    /// The agent-memory registry.
    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    /// The message-board registry.
    pub fn boards(&self) -> &Arc<BoardManager> {
        &self.boards
    }

    /// Install (or replace) the population writer plugin.
    pub fn set_pop_sink(&self, mut sink: Box<dyn PopulationSink>) {
        sink.set_schema(self.memory.schema());
        *self.pop_sink.lock().expect("pop-sink mutex poisoned") = Some(sink);
    }

    /// Exclusive access to the installed sink, if any.
    ///
    /// `pop_write` and model-marker tasks never run concurrently with each
    /// other for the same sink phase, so this lock is uncontended.
    pub fn pop_sink(&self) -> MutexGuard<'_, Option<Box<dyn PopulationSink>>> {
        self.pop_sink.lock().expect("pop-sink mutex poisoned")
    }

    /// The iteration currently executing (set by the scheduler).
    pub fn iteration(&self) -> u64 {
        self.iteration.load(Ordering::Acquire)
    }

    pub(crate) fn set_iteration(&self, i: u64) {
        self.iteration.store(i, Ordering::Release);
    }
}
