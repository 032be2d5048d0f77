//! Stages 2–8: from state graphs to the model-wide execution DAG.
//!
//! Per agent: lift conditional states, contract state vertices, run the
//! data-dependency analysis (synthetic start writing every variable, RAW/
//! WAR/WAW edges, pop-write sinks), then eliminate the now-redundant state
//! edges.  Model-wide: merge the agent graphs under start/finish markers,
//! bracket every referenced message with sync and clear tasks, and take the
//! transitive reduction.

use std::collections::BTreeSet;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::condition::{Condition, LogicOp};
use crate::def::{AgentDef, ModelDef};
use crate::error::{ModelError, ModelResult};
use crate::graph::{DepKind, Graph, NodeId, Vertex, VertexKind};
use crate::stategraph;

/// Build the reduced execution graph for a whole model.
pub fn build_exec_graph(model: &ModelDef) -> ModelResult<Graph> {
    let mut merged = Graph::new();
    let start_model = merged.add_vertex(Vertex::new(
        VertexKind::StartModel,
        "start_model",
        &model.name,
    ));
    let finish_model = merged.add_vertex(Vertex::new(
        VertexKind::FinishModel,
        "finish_model",
        &model.name,
    ));

    for agent in &model.agents {
        let agent_graph = build_agent_graph(agent)?;
        import_agent_graph(&mut merged, agent_graph, start_model, finish_model);
    }

    // Contract the per-agent start vertices so the model start feeds the
    // initial tasks directly.
    for id in merged.vertices() {
        if merged.vertex(id).is_some_and(|v| v.kind() == VertexKind::StartAgent) {
            merged.contract_vertex(id, DepKind::Blank);
        }
    }

    insert_message_tasks(&mut merged, finish_model);

    merged.transitive_reduction();

    if let Err(cycle) = merged.topo_sort() {
        return Err(ModelError::Cycle {
            agent: model.name.clone(),
            through: vertex_names(&merged, &cycle),
        });
    }
    tracing::info!(
        model = %model.name,
        vertices = merged.vertex_count(),
        "execution graph compiled"
    );
    Ok(merged)
}

// ── Per-agent pipeline ────────────────────────────────────────────────────────

fn build_agent_graph(agent: &AgentDef) -> ModelResult<Graph> {
    let (mut graph, _start_state) = stategraph::build(agent)?;

    if let Err(cycle) = graph.topo_sort() {
        return Err(ModelError::Cycle {
            agent: agent.name.clone(),
            through: vertex_names(&graph, &cycle),
        });
    }

    lift_conditional_states(&mut graph, agent)?;
    contract_state_vertices(&mut graph);
    let start = add_data_dependencies(&mut graph, agent);
    graph.remove_edges_of_kind(DepKind::State);
    check_connected(&graph, start, agent)?;
    Ok(graph)
}

/// Stage 2: a state with more than one outgoing function becomes a
/// condition vertex.  Its guard is the disjunction of the branch
/// preconditions (validation has already required one per branch); it reads
/// every agent variable so splitting remains safe.
fn lift_conditional_states(graph: &mut Graph, agent: &AgentDef) -> ModelResult<()> {
    let conditional: Vec<NodeId> = graph
        .vertices()
        .into_iter()
        .filter(|&id| {
            graph.vertex(id).is_some_and(|v| v.kind() == VertexKind::State)
                && graph.out_degree(id) > 1
        })
        .collect();

    for state in conditional {
        let state_name = graph.vertex(state).expect("live vertex").name.clone();

        let mut branch_guards = Vec::new();
        for func in graph.out_neighbors(state) {
            let v = graph.vertex(func).expect("live vertex");
            match &v.condition {
                Some(c) => branch_guards.push(c.as_ref().clone()),
                None => {
                    return Err(ModelError::Validation(format!(
                        "function {:?} from conditional state {:?} of agent {:?} has no condition",
                        v.name, state_name, agent.name
                    )));
                }
            }
        }
        let combined = branch_guards
            .into_iter()
            .reduce(|lhs, rhs| Condition::Nested {
                lhs: Box::new(lhs),
                op: LogicOp::Or,
                rhs: Box::new(rhs),
            })
            .expect("conditional state has at least two branches");

        let mut vertex = Vertex::new(
            VertexKind::Condition,
            format!("cond::{state_name}"),
            &agent.name,
        );
        vertex.reads = agent.vars.iter().map(|v| v.name.clone()).collect();
        vertex.condition = Some(Arc::new(combined));
        let cond = graph.add_vertex(vertex);

        for pred in graph.in_neighbors(state) {
            graph.add_edge(pred, cond, DepKind::Condition);
        }
        for succ in graph.out_neighbors(state) {
            graph.add_edge(cond, succ, DepKind::Condition);
        }
        graph.remove_vertex(state);
    }
    Ok(())
}

/// Stage 3: replace every remaining state vertex with predecessor→successor
/// state edges.
fn contract_state_vertices(graph: &mut Graph) {
    for id in graph.vertices() {
        if graph.vertex(id).is_some_and(|v| v.kind() == VertexKind::State) {
            graph.contract_vertex(id, DepKind::State);
        }
    }
}

/// Stage 4 and stage 6: data-dependency analysis plus pop-write sinks.
///
/// Walks compute vertices in topological order keeping, per variable, the
/// current last-writer and last-reader vertex sets.  The synthetic start
/// vertex writes every variable so unwritten variables still have a
/// predecessor; the final last-writers of each variable feed that
/// variable's pop-write task.
fn add_data_dependencies(graph: &mut Graph, agent: &AgentDef) -> NodeId {
    let mut start = Vertex::new(VertexKind::StartAgent, "start", &agent.name);
    start.writes = agent.vars.iter().map(|v| v.name.clone()).collect();
    let start = graph.add_vertex(start);

    let mut last_writers: FxHashMap<String, BTreeSet<NodeId>> = FxHashMap::default();
    let mut last_readers: FxHashMap<String, BTreeSet<NodeId>> = FxHashMap::default();
    for var in &agent.vars {
        last_writers.insert(var.name.clone(), BTreeSet::from([start]));
        last_readers.insert(var.name.clone(), BTreeSet::new());
    }

    let order = graph
        .topo_sort()
        .expect("state graph verified acyclic before analysis");
    for id in order {
        let Some(vertex) = graph.vertex(id) else {
            continue;
        };
        if !matches!(vertex.kind(), VertexKind::Function | VertexKind::Condition) {
            continue;
        }
        let reads: Vec<String> = vertex.reads.iter().cloned().collect();
        let writes: Vec<String> = vertex.writes.iter().cloned().collect();

        // Reader after writer.
        for var in &reads {
            if let Some(writers) = last_writers.get(var) {
                for &w in writers {
                    graph.add_edge(w, id, DepKind::Data);
                }
            }
        }
        // Writer after reader, writer after writer; then this vertex becomes
        // the sole last writer and the reader set restarts.
        for var in &writes {
            if let Some(readers) = last_readers.get(var) {
                for &r in readers.clone().iter() {
                    graph.add_edge(r, id, DepKind::Data);
                }
            }
            if let Some(writers) = last_writers.get(var) {
                for &w in writers.clone().iter() {
                    graph.add_edge(w, id, DepKind::Data);
                }
            }
            last_writers.insert(var.clone(), BTreeSet::from([id]));
            last_readers.insert(var.clone(), BTreeSet::new());
        }
        for var in &reads {
            last_readers.entry(var.clone()).or_default().insert(id);
        }
    }

    // Stage 6: one pop-write sink per variable, fed by its final writers.
    for var in &agent.vars {
        let mut sink = Vertex::new(
            VertexKind::PopWrite,
            format!("write::{}", var.name),
            &agent.name,
        );
        sink.writes.insert(var.name.clone());
        let sink = graph.add_vertex(sink);
        if let Some(writers) = last_writers.get(&var.name) {
            for &w in writers {
                graph.add_edge(w, sink, DepKind::Data);
            }
        }
        // Final readers must not race the flush either.
        if let Some(readers) = last_readers.get(&var.name) {
            for &r in readers {
                graph.add_edge(r, sink, DepKind::Data);
            }
        }
    }

    start
}

/// Stage 5 sanity: with state edges gone, every compute and sink vertex must
/// still be reachable from the agent's start vertex.
fn check_connected(graph: &Graph, start: NodeId, agent: &AgentDef) -> ModelResult<()> {
    for id in graph.vertices() {
        if id == start {
            continue;
        }
        if !graph.reachable(start, id) {
            let name = &graph.vertex(id).expect("live vertex").name;
            return Err(ModelError::Validation(format!(
                "task {name:?} of agent {:?} is unreachable once state edges are removed; \
                 it touches no variable that links it into the iteration",
                agent.name
            )));
        }
    }
    Ok(())
}

// ── Model-wide stages ─────────────────────────────────────────────────────────

fn import_agent_graph(
    merged: &mut Graph,
    agent_graph: Graph,
    start_model: NodeId,
    finish_model: NodeId,
) {
    let mut remap: FxHashMap<NodeId, NodeId> = FxHashMap::default();
    for id in agent_graph.vertices() {
        let vertex = agent_graph.vertex(id).expect("live vertex").clone();
        let kind = vertex.kind();
        let new_id = merged.add_vertex(vertex);
        remap.insert(id, new_id);
        match kind {
            VertexKind::StartAgent => merged.add_edge(start_model, new_id, DepKind::Blank),
            VertexKind::PopWrite => merged.add_edge(new_id, finish_model, DepKind::Blank),
            _ => {}
        }
    }
    for (from, to) in agent_graph.edges() {
        let kinds = agent_graph
            .edge_kinds(from, to)
            .expect("edge just listed")
            .clone();
        for kind in kinds {
            merged.add_edge(remap[&from], remap[&to], kind);
        }
    }
}

/// Stage 7: bracket every referenced message with a sync task (after all
/// posters, before all readers) and a clear task (after all readers).
fn insert_message_tasks(graph: &mut Graph, finish_model: NodeId) {
    let mut messages: BTreeSet<String> = BTreeSet::new();
    for id in graph.vertices() {
        let v = graph.vertex(id).expect("live vertex");
        messages.extend(v.in_msgs.iter().cloned());
        messages.extend(v.out_msgs.iter().cloned());
    }

    for msg in messages {
        let sync = graph.add_vertex(Vertex::new(VertexKind::MsgSync, &msg, &msg));
        let clear = graph.add_vertex(Vertex::new(VertexKind::MsgClear, &msg, &msg));
        graph.add_edge(sync, clear, DepKind::Blank);
        graph.add_edge(clear, finish_model, DepKind::Blank);

        for id in graph.vertices() {
            let (posts, reads) = match graph.vertex(id) {
                Some(v) if v.kind() == VertexKind::Function => {
                    (v.out_msgs.contains(&msg), v.in_msgs.contains(&msg))
                }
                _ => continue,
            };
            if posts {
                graph.add_edge(id, sync, DepKind::Blank);
            }
            if reads {
                graph.add_edge(sync, id, DepKind::Blank);
                graph.add_edge(id, clear, DepKind::Blank);
            }
        }
    }
}

fn vertex_names(graph: &Graph, ids: &[NodeId]) -> String {
    ids.iter()
        .filter_map(|&id| graph.vertex(id))
        .map(|v| format!("{}::{}", v.parent, v.name))
        .collect::<Vec<_>>()
        .join(", ")
}
