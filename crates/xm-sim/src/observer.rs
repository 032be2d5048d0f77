//! Simulation observer trait for progress reporting.

/// Callbacks invoked by [`Simulation::run`][crate::Simulation::run] at
/// iteration boundaries.
///
/// All methods have default no-op implementations so implementors only need
/// to override what they care about.
pub trait SimObserver {
    /// Called before iteration `iteration` starts executing.
    fn on_iteration_start(&mut self, _iteration: u64) {}

    /// Called after iteration `iteration` completed and the population was
    /// compacted.  `compacted` is the number of dead agents removed.
    fn on_iteration_end(&mut self, _iteration: u64, _compacted: usize) {}

    /// Called once after the final iteration.
    fn on_run_end(&mut self, _iterations: u64) {}
}

/// A [`SimObserver`] that does nothing.  Use when you need to call `run`
/// but don't want progress callbacks.
pub struct NoopObserver;

impl SimObserver for NoopObserver {}
