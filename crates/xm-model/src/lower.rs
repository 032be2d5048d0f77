//! Registry application and lowering of the execution graph into tasks.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use xm_board::{BoardClient, BoardManager};
use xm_core::TaskId;
use xm_exec::{EngineContext, TaskKind, TaskManager, TaskSpec, TransitionError, TransitionFn};
use xm_mem::{MemoryIterator, MemoryManager};

use crate::def::ModelDef;
use crate::depgraph;
use crate::error::{ModelError, ModelResult};
use crate::graph::{NodeId, VertexKind};
use crate::validate::validate_model;

// ── Function registry ─────────────────────────────────────────────────────────

/// Maps `(agent, function)` names to the Rust transition functions
/// implementing them.
///
/// Model files name their implementation files informationally; the actual
/// bodies are registered here by the embedding program before compilation.
/// With `allow_stubs` set, unregistered functions lower to a no-op body —
/// useful for exercising model and population pipelines without user code.
#[derive(Default)]
pub struct FunctionRegistry {
    map: FxHashMap<(String, String), TransitionFn>,
    pub allow_stubs: bool,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the body of `agent`'s transition function `function`.
    /// Re-registration replaces the previous body.
    pub fn register(&mut self, agent: &str, function: &str, f: TransitionFn) {
        self.map.insert((agent.to_owned(), function.to_owned()), f);
    }

    pub fn resolve(&self, agent: &str, function: &str) -> Option<TransitionFn> {
        self.map
            .get(&(agent.to_owned(), function.to_owned()))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

fn stub_transition(
    _cursor: &mut MemoryIterator<'_>,
    _client: &mut BoardClient,
) -> Result<(), TransitionError> {
    Ok(())
}

// ── Registry application ──────────────────────────────────────────────────────

/// Materialize a model's declarations into the memory and board registries.
pub fn register_model(
    model: &ModelDef,
    memory: &mut MemoryManager,
    boards: &mut BoardManager,
) -> ModelResult<()> {
    for agent in &model.agents {
        memory.register_agent(&agent.name)?;
        for var in &agent.vars {
            memory.register_var_scalar(&agent.name, &var.name, var.scalar)?;
        }
    }
    for message in &model.messages {
        boards.register_message(&message.name)?;
        for var in &message.vars {
            boards.declare_var(&message.name, &var.name, var.scalar)?;
        }
    }
    Ok(())
}

// ── Lowering ──────────────────────────────────────────────────────────────────

/// Validate, compile, and lower a model into a finalized task manager.
pub fn compile_model(
    model: &ModelDef,
    registry: &FunctionRegistry,
    ctx: &EngineContext,
) -> ModelResult<TaskManager> {
    validate_model(model)?;
    let graph = depgraph::build_exec_graph(model)?;

    let mut tm = TaskManager::new();
    let mut task_ids: FxHashMap<NodeId, TaskId> = FxHashMap::default();

    let order = graph.topo_sort().map_err(|cycle| ModelError::Cycle {
        agent: model.name.clone(),
        through: format!("{} vertices", cycle.len()),
    })?;

    for id in order {
        let vertex = graph.vertex(id).ok_or_else(|| {
            ModelError::Validation("execution graph lost a vertex during lowering".into())
        })?;

        let spec = match vertex.kind() {
            VertexKind::Function => {
                if let Some(condition) = &vertex.condition {
                    if condition.uses_time() {
                        return Err(ModelError::NotImplemented(format!(
                            "function {:?} of agent {:?} branches on time; temporal conditions \
                             have no runtime semantics in the execution core",
                            vertex.name, vertex.parent
                        )));
                    }
                }
                let func = match registry.resolve(&vertex.parent, &vertex.name) {
                    Some(f) => f,
                    None if registry.allow_stubs => stub_transition,
                    None => {
                        return Err(ModelError::MissingFunction {
                            agent: vertex.parent.clone(),
                            function: vertex.name.clone(),
                        });
                    }
                };
                let mut spec = TaskSpec::new(
                    TaskKind::Function,
                    format!("{}::{}", vertex.parent, vertex.name),
                    &vertex.parent,
                );
                spec.func = Some(func);
                spec.guard = vertex
                    .condition
                    .clone()
                    .map(|c| c as Arc<dyn xm_exec::RowGuard>);
                spec.writes = vertex.writes.clone();
                spec.reads = vertex.reads.difference(&vertex.writes).cloned().collect();
                spec.msg_reads = vertex.in_msgs.clone();
                spec.msg_posts = vertex.out_msgs.clone();
                spec
            }
            VertexKind::Condition => {
                let condition = vertex.condition.clone().ok_or_else(|| {
                    ModelError::Validation(format!(
                        "condition vertex {:?} of agent {:?} lost its guard",
                        vertex.name, vertex.parent
                    ))
                })?;
                if condition.uses_time() {
                    return Err(ModelError::NotImplemented(format!(
                        "conditional state {:?} of agent {:?} branches on time; temporal \
                         conditions have no runtime semantics in the execution core",
                        vertex.name, vertex.parent
                    )));
                }
                let mut spec = TaskSpec::new(
                    TaskKind::Condition,
                    format!("{}::{}", vertex.parent, vertex.name),
                    &vertex.parent,
                );
                spec.guard = Some(condition as Arc<dyn xm_exec::RowGuard>);
                spec.reads = vertex.reads.clone();
                spec
            }
            VertexKind::MsgSync => TaskSpec::new(
                TaskKind::MsgSync,
                format!("sync::{}", vertex.name),
                &vertex.parent,
            ),
            VertexKind::MsgClear => TaskSpec::new(
                TaskKind::MsgClear,
                format!("clear::{}", vertex.name),
                &vertex.parent,
            ),
            VertexKind::PopWrite => {
                let mut spec = TaskSpec::new(
                    TaskKind::PopWrite,
                    format!("{}::{}", vertex.parent, vertex.name),
                    &vertex.parent,
                );
                spec.writes = vertex.writes.clone();
                spec
            }
            VertexKind::StartModel => {
                TaskSpec::new(TaskKind::StartModel, "start_model", &vertex.parent)
            }
            VertexKind::FinishModel => {
                TaskSpec::new(TaskKind::FinishModel, "finish_model", &vertex.parent)
            }
            VertexKind::State | VertexKind::StartAgent | VertexKind::EndAgent => {
                return Err(ModelError::Validation(format!(
                    "vertex {:?} of kind {:?} survived contraction",
                    vertex.name,
                    vertex.kind()
                )));
            }
        };

        let task_id = tm.create_task(spec, ctx)?;
        task_ids.insert(id, task_id);
    }

    for (from, to) in graph.edges() {
        tm.add_dependency(task_ids[&from], task_ids[&to])?;
    }

    tm.finalize()?;
    tracing::info!(model = %model.name, tasks = tm.task_count(), "model lowered");
    Ok(tm)
}
