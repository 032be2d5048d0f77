//! `xm-core` — foundational types for the `rust_xm` simulation runtime.
//!
//! This crate is a dependency of every other `xm-*` crate.  It intentionally
//! has no `xm-*` dependencies and a single external one (`thiserror`).
//!
//! # What lives here
//!
//! | Module      | Contents                                                |
//! |-------------|---------------------------------------------------------|
//! | [`ids`]     | `TaskId`, `QueueId`                                     |
//! | [`value`]   | `ScalarType`, `ScalarValue`, the `Scalar` element trait |
//! | [`plugin`]  | Population reader/sink contracts and the agent schema   |

pub mod ids;
pub mod plugin;
pub mod value;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use ids::{QueueId, TaskId};
pub use plugin::{
    AgentSchema, ColumnView, PopReadError, PopulationReader, PopulationSink, SinkError,
};
pub use value::{Scalar, ScalarType, ScalarValue};
