//! Model description types.
//!
//! These are the in-memory form of an `xmodel` version-2 file: informational
//! headers, an environment block, agents with memory and state-machine
//! functions, and message types.  The XML parser in `xm-io` produces a
//! [`ModelDef`]; tests and demos build one in code.

use xm_core::ScalarType;

use crate::condition::Condition;

/// One declared variable: `(name, scalar type)`.
#[derive(Clone, Debug, PartialEq)]
pub struct VarDef {
    pub name: String,
    pub scalar: ScalarType,
}

impl VarDef {
    pub fn new(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self {
            name: name.into(),
            scalar,
        }
    }
}

/// A declared simulation time unit (`environment/timeUnits`).
///
/// Validated for referential integrity; runtime evaluation of time-based
/// conditions is not part of the execution core.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeUnitDef {
    pub name: String,
    /// Base unit: `iteration` or the name of another time unit.
    pub unit: String,
    /// How many base units make up one of this unit.
    pub period: u64,
}

/// A transition function of one agent.
#[derive(Clone, Debug, Default)]
pub struct FunctionDef {
    pub name: String,
    pub current_state: String,
    pub next_state: String,
    /// Optional precondition on agent variables.
    pub condition: Option<Condition>,
    /// Message types read (ordered as declared).
    pub inputs: Vec<String>,
    /// Message types posted (ordered as declared).
    pub outputs: Vec<String>,
    /// Agent variables accessed read-only.  Together with `read_write` this
    /// is the function's full access classification; when a model file
    /// declares no access lists, every agent variable defaults to
    /// read-write.
    pub read_only: Vec<String>,
    /// Agent variables accessed read-write.
    pub read_write: Vec<String>,
}

impl FunctionDef {
    pub fn new(
        name: impl Into<String>,
        current_state: impl Into<String>,
        next_state: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            current_state: current_state.into(),
            next_state: next_state.into(),
            ..Default::default()
        }
    }
}

/// One agent type: memory layout plus state-machine functions.
#[derive(Clone, Debug, Default)]
pub struct AgentDef {
    pub name: String,
    pub vars: Vec<VarDef>,
    pub functions: Vec<FunctionDef>,
}

impl AgentDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn has_var(&self, name: &str) -> bool {
        self.vars.iter().any(|v| v.name == name)
    }

    /// The effective access classification of `function`: `(read_only,
    /// read_write)` variable name lists.  An empty declaration means every
    /// variable is read-write.
    pub fn access_of(&self, function: &FunctionDef) -> (Vec<String>, Vec<String>) {
        if function.read_only.is_empty() && function.read_write.is_empty() {
            let rw = self.vars.iter().map(|v| v.name.clone()).collect();
            (Vec::new(), rw)
        } else {
            (function.read_only.clone(), function.read_write.clone())
        }
    }
}

/// One message type.
#[derive(Clone, Debug, Default)]
pub struct MessageDef {
    pub name: String,
    pub vars: Vec<VarDef>,
}

impl MessageDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vars: Vec::new(),
        }
    }
}

/// A complete model declaration.
#[derive(Clone, Debug, Default)]
pub struct ModelDef {
    pub name: String,
    pub version: String,
    pub author: String,
    pub description: String,
    /// Environment constants (`environment/constants`).
    pub constants: Vec<VarDef>,
    pub time_units: Vec<TimeUnitDef>,
    /// Implementation files named by the model (informational here; user
    /// functions are registered in code through the function registry).
    pub function_files: Vec<String>,
    pub agents: Vec<AgentDef>,
    pub messages: Vec<MessageDef>,
}

impl ModelDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn agent(&self, name: &str) -> Option<&AgentDef> {
        self.agents.iter().find(|a| a.name == name)
    }

    pub fn message(&self, name: &str) -> Option<&MessageDef> {
        self.messages.iter().find(|m| m.name == name)
    }

    pub fn has_time_unit(&self, name: &str) -> bool {
        self.time_units.iter().any(|t| t.name == name)
    }
}
