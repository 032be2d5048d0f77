//! Population I/O plugin contracts.
//!
//! The engine never parses population files itself.  Readers push initial
//! values into agent memory through two typed callbacks; writers receive one
//! column at a time from `pop_write` tasks at the end of each iteration.
//! Plugins discover the memory layout through [`AgentSchema`].

use std::path::Path;

use thiserror::Error;

use crate::value::ScalarType;

// ── Schema ────────────────────────────────────────────────────────────────────

/// Agent-memory layout handed to plugins: agent name → variables in
/// declaration order.  `BTreeMap` so plugins see a deterministic agent order.
pub type AgentSchema = std::collections::BTreeMap<String, Vec<(ScalarType, String)>>;

// ── Reader side ───────────────────────────────────────────────────────────────

/// Callback appending one `int` value: `(agent_name, var_name, value)`.
pub type AddInt<'a> = dyn FnMut(&str, &str, i64) -> Result<(), PopReadError> + 'a;

/// Callback appending one `double` value: `(agent_name, var_name, value)`.
pub type AddDouble<'a> = dyn FnMut(&str, &str, f64) -> Result<(), PopReadError> + 'a;

/// A population-file reader plugin.
pub trait PopulationReader {
    /// Read the population at `path`, appending every value through the
    /// supplied callbacks in file order.
    ///
    /// Implementations must surface the error kinds of [`PopReadError`]
    /// distinctly: a malformed document, an undeclared agent, an undeclared
    /// variable, and an uncastable value are different failures with
    /// different exit codes at the CLI.
    fn read_pop(
        &mut self,
        path: &Path,
        add_int: &mut AddInt<'_>,
        add_double: &mut AddDouble<'_>,
    ) -> Result<u64, PopReadError>;
}

/// Why a population file could not be read.
///
/// Each variant is a distinct diagnostic (and CLI exit code).  `element_path`
/// fields name the location inside the document, e.g.
/// `states/xagent[3]/x_int`.
#[derive(Debug, Error)]
pub enum PopReadError {
    #[error("population file not found: {path}")]
    MissingFile { path: String },

    #[error("malformed population file {path} at {element_path}: {detail}")]
    Malformed {
        path: String,
        element_path: String,
        detail: String,
    },

    #[error("{element_path}: agent type {agent:?} is not declared in the model")]
    UnknownAgent { element_path: String, agent: String },

    #[error("{element_path}: agent {agent:?} has no variable {var:?}")]
    UnknownVariable {
        element_path: String,
        agent: String,
        var: String,
    },

    #[error("{element_path}: cannot cast {value:?} to {expected}")]
    BadCast {
        element_path: String,
        value: String,
        expected: ScalarType,
    },

    #[error("I/O error reading population: {0}")]
    Io(#[from] std::io::Error),
}

// ── Writer side ───────────────────────────────────────────────────────────────

/// A borrowed, typed view of one memory column, handed to sinks by
/// `pop_write` tasks.
#[derive(Copy, Clone, Debug)]
pub enum ColumnView<'a> {
    Int(&'a [i64]),
    Double(&'a [f64]),
}

impl ColumnView<'_> {
    /// Number of agents in the column.
    pub fn len(&self) -> usize {
        match self {
            ColumnView::Int(s) => s.len(),
            ColumnView::Double(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The element type of the column.
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            ColumnView::Int(_) => ScalarType::Int,
            ColumnView::Double(_) => ScalarType::Double,
        }
    }
}

/// A population-snapshot writer plugin.
///
/// `pop_write` tasks drive one full cycle per iteration:
/// `init_write(i)`, then `write_column` once per (agent, variable), then
/// `finalize_write()`.  Columns of one agent always arrive with equal
/// lengths; column order follows the declaration order in the schema.
pub trait PopulationSink: Send {
    /// Learn the memory layout.  Called once, before the first cycle.
    fn set_schema(&mut self, schema: AgentSchema);

    /// Begin the snapshot for `iteration`.
    fn init_write(&mut self, iteration: u64) -> Result<(), SinkError>;

    /// Hand over one column of final values.
    fn write_column(
        &mut self,
        agent: &str,
        var: &str,
        column: ColumnView<'_>,
    ) -> Result<(), SinkError>;

    /// Flush the snapshot to disk.  Snapshot files are named
    /// `<base><iteration>.<ext>`.
    fn finalize_write(&mut self) -> Result<(), SinkError>;
}

/// Why a snapshot could not be written.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error writing population: {0}")]
    Io(#[from] std::io::Error),

    /// Backend-specific failure (CSV serialisation, SQLite, …), already
    /// rendered to text by the plugin.
    #[error("population writer error: {0}")]
    Backend(String),
}
