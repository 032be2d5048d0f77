//! Stage 1: per-agent state graphs.
//!
//! Every transition function becomes a function vertex; every state label a
//! state vertex.  Edges run current-state → function → next-state.  The
//! function vertex carries the variable access sets (classification plus
//! condition reads) and the message I/O lists used by later stages.

use std::collections::BTreeSet;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::def::AgentDef;
use crate::error::{ModelError, ModelResult};
use crate::graph::{DepKind, Graph, NodeId, Vertex, VertexKind};

/// Build the state graph of one agent.  Returns the graph and the start
/// state's vertex id.
pub fn build(agent: &AgentDef) -> ModelResult<(Graph, NodeId)> {
    let mut graph = Graph::new();
    let mut states: FxHashMap<&str, NodeId> = FxHashMap::default();

    for function in &agent.functions {
        let mut vertex = Vertex::new(VertexKind::Function, &function.name, &agent.name);

        let (read_only, read_write) = agent.access_of(function);
        vertex.reads.extend(read_only);
        for var in read_write {
            vertex.reads.insert(var.clone());
            vertex.writes.insert(var);
        }
        if let Some(condition) = &function.condition {
            let mut condition_vars = BTreeSet::new();
            condition.read_vars(&mut condition_vars);
            vertex.reads.extend(condition_vars);
            vertex.condition = Some(Arc::new(condition.clone()));
        }
        vertex.in_msgs.extend(function.inputs.iter().cloned());
        vertex.out_msgs.extend(function.outputs.iter().cloned());

        let fv = graph.add_vertex(vertex);

        let current = state_vertex(&mut graph, &mut states, &function.current_state, agent);
        let next = state_vertex(&mut graph, &mut states, &function.next_state, agent);
        graph.add_edge(current, fv, DepKind::State);
        graph.add_edge(fv, next, DepKind::State);
    }

    // The start state is the unique state vertex with no incoming edge.
    let start_states: Vec<NodeId> = graph
        .vertices()
        .into_iter()
        .filter(|&id| {
            let v = graph.vertex(id).expect("live vertex");
            v.kind() == VertexKind::State && graph.in_degree(id) == 0
        })
        .collect();
    match start_states.as_slice() {
        [start] => Ok((graph, *start)),
        _ => Err(ModelError::Validation(format!(
            "agent {:?} does not have a unique start state",
            agent.name
        ))),
    }
}

fn state_vertex<'a>(
    graph: &mut Graph,
    states: &mut FxHashMap<&'a str, NodeId>,
    name: &'a str,
    agent: &AgentDef,
) -> NodeId {
    *states
        .entry(name)
        .or_insert_with(|| graph.add_vertex(Vertex::new(VertexKind::State, name, &agent.name)))
}
