//! Runtime task objects and the transition-function ABI.
//!
//! A task is immutable once the graph is compiled.  It carries everything a
//! worker needs to execute it: the type tag, the owning agent or message
//! name, the variable access sets (already baked into a shadow for agent
//! tasks), the board capabilities, and the body.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use xm_board::{BoardClient, Proxy};
use xm_core::TaskId;
use xm_mem::{AgentShadow, MemError, MemoryIterator};

use crate::context::EngineContext;
use crate::error::{ExecError, ExecResult};

// ── Transition-function ABI ───────────────────────────────────────────────────

/// A user transition function aborted.  The worker annotates the abort with
/// the owning agent and task names before surfacing it.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransitionError(pub String);

impl TransitionError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

impl From<MemError> for TransitionError {
    fn from(e: MemError) -> Self {
        Self(e.to_string())
    }
}

impl From<xm_board::BoardError> for TransitionError {
    fn from(e: xm_board::BoardError) -> Self {
        Self(e.to_string())
    }
}

/// The signature of user transition functions.
///
/// Called once per agent row: the cursor is positioned at the agent and must
/// not be stepped by the function; the client exposes exactly the message
/// operations the model's I/O lists granted.
pub type TransitionFn =
    fn(&mut MemoryIterator<'_>, &mut BoardClient) -> Result<(), TransitionError>;

/// A compiled per-row predicate (a transition precondition).
///
/// Implemented by the model crate's condition trees; evaluated by condition
/// tasks over their window and by guarded function tasks before each call.
pub trait RowGuard: Send + Sync {
    fn test(&self, cursor: &MemoryIterator<'_>) -> Result<bool, MemError>;
}

// ── Task kinds and bodies ─────────────────────────────────────────────────────

/// The closed set of task types; each is routed to exactly one queue.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum TaskKind {
    /// User transition function over an agent window.  Splittable.
    Function,
    /// Lifted conditional state: precondition evaluation only.  Splittable.
    Condition,
    /// Promote one board's staged messages.
    MsgSync,
    /// Empty one board's committed store.
    MsgClear,
    /// Flush agent columns to the population writer plugin.
    PopWrite,
    /// Iteration-start marker; opens the population snapshot.
    StartModel,
    /// Iteration-end marker; finalizes the population snapshot.
    FinishModel,
}

impl TaskKind {
    /// `true` for the data-parallel kinds a splitting queue may subdivide.
    pub fn splittable(self) -> bool {
        matches!(self, TaskKind::Function | TaskKind::Condition)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskKind::Function => "function",
            TaskKind::Condition => "condition",
            TaskKind::MsgSync => "msg_sync",
            TaskKind::MsgClear => "msg_clear",
            TaskKind::PopWrite => "pop_write",
            TaskKind::StartModel => "start_model",
            TaskKind::FinishModel => "finish_model",
        };
        f.write_str(s)
    }
}

/// What a worker does when it runs the task.
pub enum TaskBody {
    /// Walk the agent window; evaluate the guard per row; call the function
    /// (when present) for qualifying rows.
    Agent {
        func: Option<TransitionFn>,
        guard: Option<Arc<dyn RowGuard>>,
    },
    /// `board.sync(owner)`.
    MsgSync,
    /// `board.clear(owner)`.
    MsgClear,
    /// Push the task's variables to the population sink.
    PopWrite,
    /// No computation; start/finish markers drive the sink lifecycle.
    Marker,
}

// ── Task construction ─────────────────────────────────────────────────────────

/// Everything the compiler supplies to create one task.
pub struct TaskSpec {
    pub kind: TaskKind,
    /// Unique human-readable task name, e.g. `Circle::move`.
    pub name: String,
    /// Owning agent name (agent kinds) or message name (board kinds).
    pub owner: String,
    pub func: Option<TransitionFn>,
    pub guard: Option<Arc<dyn RowGuard>>,
    /// Variables readable but not writable.
    pub reads: BTreeSet<String>,
    /// Variables readable and writable.
    pub writes: BTreeSet<String>,
    pub msg_reads: BTreeSet<String>,
    pub msg_posts: BTreeSet<String>,
}

impl TaskSpec {
    pub fn new(kind: TaskKind, name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            owner: owner.into(),
            func: None,
            guard: None,
            reads: BTreeSet::new(),
            writes: BTreeSet::new(),
            msg_reads: BTreeSet::new(),
            msg_posts: BTreeSet::new(),
        }
    }
}

/// One vertex of the compiled execution graph.
pub struct Task {
    id: TaskId,
    kind: TaskKind,
    name: String,
    owner: String,
    reads: BTreeSet<String>,
    writes: BTreeSet<String>,
    proxy: Proxy,
    body: TaskBody,
    /// Access-checked memory view; present on agent kinds.
    shadow: Option<AgentShadow>,
}

impl Task {
    pub(crate) fn build(id: TaskId, spec: TaskSpec, ctx: &EngineContext) -> ExecResult<Self> {
        // Resolve the owner and build the access machinery per kind.
        let shadow = match spec.kind {
            TaskKind::Function | TaskKind::Condition => {
                if spec.kind == TaskKind::Function && spec.func.is_none() {
                    return Err(ExecError::InvalidArgument(format!(
                        "function task {:?} has no function body",
                        spec.name
                    )));
                }
                let mut shadow = ctx.memory().make_shadow(&spec.owner).map_err(|_| {
                    ExecError::InvalidArgument(format!(
                        "task {:?} names unknown agent {:?}",
                        spec.name, spec.owner
                    ))
                })?;
                for var in &spec.writes {
                    shadow.allow(var, true)?;
                }
                for var in &spec.reads {
                    if !spec.writes.contains(var) {
                        shadow.allow(var, false)?;
                    }
                }
                Some(shadow)
            }
            TaskKind::PopWrite => {
                if !ctx.memory().is_registered(&spec.owner) {
                    return Err(ExecError::InvalidArgument(format!(
                        "task {:?} names unknown agent {:?}",
                        spec.name, spec.owner
                    )));
                }
                None
            }
            TaskKind::MsgSync | TaskKind::MsgClear => {
                if !ctx.boards().exists(&spec.owner) {
                    return Err(ExecError::InvalidArgument(format!(
                        "task {:?} names unknown message {:?}",
                        spec.name, spec.owner
                    )));
                }
                None
            }
            TaskKind::StartModel | TaskKind::FinishModel => None,
        };

        let mut proxy = Proxy::new();
        for msg in &spec.msg_reads {
            proxy.allow_read(msg)?;
        }
        for msg in &spec.msg_posts {
            proxy.allow_post(msg)?;
        }

        let body = match spec.kind {
            TaskKind::Function | TaskKind::Condition => TaskBody::Agent {
                func: spec.func,
                guard: spec.guard,
            },
            TaskKind::MsgSync => TaskBody::MsgSync,
            TaskKind::MsgClear => TaskBody::MsgClear,
            TaskKind::PopWrite => TaskBody::PopWrite,
            TaskKind::StartModel | TaskKind::FinishModel => TaskBody::Marker,
        };

        Ok(Self {
            id,
            kind: spec.kind,
            name: spec.name,
            owner: spec.owner,
            reads: spec.reads,
            writes: spec.writes,
            proxy,
            body,
            shadow,
        })
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The owning agent or message name.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Read-only variables.
    pub fn reads(&self) -> &BTreeSet<String> {
        &self.reads
    }

    /// Read-write variables.
    pub fn writes(&self) -> &BTreeSet<String> {
        &self.writes
    }

    pub fn proxy(&self) -> &Proxy {
        &self.proxy
    }

    pub fn body(&self) -> &TaskBody {
        &self.body
    }

    pub(crate) fn shadow(&self) -> Option<&AgentShadow> {
        self.shadow.as_ref()
    }

    /// Population size relevant for splitting: the owner agent's current
    /// population for agent kinds, 0 otherwise.
    pub fn population(&self, ctx: &EngineContext) -> usize {
        match self.kind {
            TaskKind::Function | TaskKind::Condition => {
                ctx.memory().population_of(&self.owner).unwrap_or(0)
            }
            _ => 0,
        }
    }
}
