//! `xm-mem` — columnar agent memory for the `rust_xm` runtime.
//!
//! Agent state is stored structure-of-arrays: one contiguous, type-erased
//! vector per declared variable, all vectors of one agent type equal in
//! length at every task boundary.  Row *i* across the columns is agent *i*.
//!
//! # Crate layout
//!
//! | Module       | Contents                                                  |
//! |--------------|-----------------------------------------------------------|
//! | [`vector`]   | `VectorStore` trait, `TypedVector<T>` (raw-pointer hot path) |
//! | [`agent`]    | `AgentMemory` — named columns of one agent type           |
//! | [`manager`]  | `MemoryManager` — registry of all agent types             |
//! | [`shadow`]   | `AgentShadow` — access-controlled view of selected columns |
//! | [`iterator`] | `MemoryIterator` — windowed row cursor over a shadow      |
//!
//! # Concurrency contract
//!
//! Registration (new agents, new variables, capacity hints) takes `&mut` and
//! happens before the memory manager is shared with worker threads.  All
//! data-plane operations take `&self`; the task scheduler's dependency graph
//! guarantees that two tasks never touch the same column concurrently with a
//! writer among them.  See [`vector::TypedVector`] for the `SAFETY`
//! obligations this places on engine call sites.

pub mod agent;
pub mod error;
pub mod iterator;
pub mod manager;
pub mod shadow;
pub mod vector;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use agent::AgentMemory;
pub use error::{MemError, MemResult};
pub use iterator::MemoryIterator;
pub use manager::MemoryManager;
pub use shadow::AgentShadow;
pub use vector::{TypedVector, VectorStore};
