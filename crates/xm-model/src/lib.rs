//! `xm-model` — model description and the graph compiler of `rust_xm`.
//!
//! A model declares agents (memory variables plus transition functions
//! arranged as a state machine) and message types.  This crate validates the
//! declaration, builds each agent's state graph, derives the model-wide
//! execution DAG (conditional-state lifting, state contraction, data-
//! dependency analysis, message sync/clear insertion, pop-write insertion,
//! transitive reduction), and lowers the result into `xm-exec` tasks.
//!
//! # Crate layout
//!
//! | Module         | Contents                                             |
//! |----------------|------------------------------------------------------|
//! | [`def`]        | `ModelDef`, `AgentDef`, `FunctionDef`, `MessageDef`  |
//! | [`condition`]  | Transition precondition trees and their evaluation   |
//! | [`validate`]   | Semantic validation of a model declaration           |
//! | [`graph`]      | Index-arena DAG used by every compile stage          |
//! | [`stategraph`] | Stage 1: per-agent state graphs                      |
//! | [`depgraph`]   | Stages 2–8: the execution-graph pipeline             |
//! | [`lower`]      | Registry application and lowering into task objects  |

pub mod condition;
pub mod def;
pub mod depgraph;
pub mod error;
pub mod graph;
pub mod lower;
pub mod stategraph;
pub mod validate;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use condition::{CompareOp, Condition, LogicOp, Operand};
pub use def::{AgentDef, FunctionDef, MessageDef, ModelDef, TimeUnitDef, VarDef};
pub use error::{ModelError, ModelResult};
pub use lower::{FunctionRegistry, compile_model, register_model};
pub use validate::validate_model;
