//! The index-arena graph every compile stage works on.
//!
//! Vertices and edges live in flat arenas addressed by index; removed
//! vertices leave tombstones so indices stay stable across stages.  An edge
//! between two vertices carries a *set* of dependency kinds — a pair that is
//! both a state edge and a data edge survives state-edge elimination.

use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::FxHashMap;

use crate::condition::Condition;

/// Stable vertex index.
pub type NodeId = usize;

/// Why one vertex must run before another.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum DepKind {
    /// Pure state-machine ordering; eliminated after data analysis.
    State,
    /// A lifted conditional state gating its outgoing functions.
    Condition,
    /// Reader-after-writer, writer-after-reader, or writer-after-writer.
    Data,
    /// Structural ordering (model start/finish, message bracketing).
    Blank,
}

/// What a vertex will become once lowered.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum VertexKind {
    /// A state label; contracted away before lowering.
    State,
    /// A transition function.
    Function,
    /// A lifted conditional state.
    Condition,
    /// Per-agent synthetic source that writes every variable.
    StartAgent,
    /// Per-agent synthetic sink; replaced by pop-write vertices.
    EndAgent,
    MsgSync,
    MsgClear,
    PopWrite,
    StartModel,
    FinishModel,
}

/// One compile-time vertex.
#[derive(Clone, Debug)]
pub struct Vertex {
    pub kind: VertexKind,
    /// Function/state/message/variable name, depending on kind.
    pub name: String,
    /// Owning agent name, or the model name for model-level vertices.
    pub parent: String,
    /// Variables read (read-only and read-write alike).
    pub reads: BTreeSet<String>,
    /// Variables written.
    pub writes: BTreeSet<String>,
    /// Message types read.
    pub in_msgs: BTreeSet<String>,
    /// Message types posted.
    pub out_msgs: BTreeSet<String>,
    /// Precondition, on function and condition vertices.
    pub condition: Option<std::sync::Arc<Condition>>,
}

impl Vertex {
    pub fn new(kind: VertexKind, name: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            parent: parent.into(),
            reads: BTreeSet::new(),
            writes: BTreeSet::new(),
            in_msgs: BTreeSet::new(),
            out_msgs: BTreeSet::new(),
            condition: None,
        }
    }

    pub fn kind(&self) -> VertexKind {
        self.kind
    }
}

/// Directed graph with tombstoned removal and per-pair kind sets.
#[derive(Default)]
pub struct Graph {
    nodes: Vec<Option<Vertex>>,
    out: Vec<BTreeMap<NodeId, BTreeSet<DepKind>>>,
    inn: Vec<BTreeMap<NodeId, BTreeSet<DepKind>>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Construction ──────────────────────────────────────────────────────

    pub fn add_vertex(&mut self, v: Vertex) -> NodeId {
        self.nodes.push(Some(v));
        self.out.push(BTreeMap::new());
        self.inn.push(BTreeMap::new());
        self.nodes.len() - 1
    }

    pub fn add_edge(&mut self, from: NodeId, to: NodeId, kind: DepKind) {
        if from == to {
            return;
        }
        self.out[from].entry(to).or_default().insert(kind);
        self.inn[to].entry(from).or_default().insert(kind);
    }

    pub fn remove_edge(&mut self, from: NodeId, to: NodeId) {
        self.out[from].remove(&to);
        self.inn[to].remove(&from);
    }

    /// Remove `kind` from the edge `from -> to`, dropping the edge when no
    /// kind remains.
    pub fn remove_edge_kind(&mut self, from: NodeId, to: NodeId, kind: DepKind) {
        let empty = match self.out[from].get_mut(&to) {
            Some(kinds) => {
                kinds.remove(&kind);
                kinds.is_empty()
            }
            None => return,
        };
        if empty {
            self.out[from].remove(&to);
            self.inn[to].remove(&from);
        } else if let Some(kinds) = self.inn[to].get_mut(&from) {
            kinds.remove(&kind);
        }
    }

    /// Detach and tombstone a vertex.
    pub fn remove_vertex(&mut self, id: NodeId) {
        let preds: Vec<NodeId> = self.inn[id].keys().copied().collect();
        let succs: Vec<NodeId> = self.out[id].keys().copied().collect();
        for p in preds {
            self.out[p].remove(&id);
        }
        for s in succs {
            self.inn[s].remove(&id);
        }
        self.inn[id].clear();
        self.out[id].clear();
        self.nodes[id] = None;
    }

    /// Replace a vertex with direct `kind` edges from each predecessor to
    /// each successor, then remove it.
    pub fn contract_vertex(&mut self, id: NodeId, kind: DepKind) {
        let preds: Vec<NodeId> = self.inn[id].keys().copied().collect();
        let succs: Vec<NodeId> = self.out[id].keys().copied().collect();
        for &p in &preds {
            for &s in &succs {
                self.add_edge(p, s, kind);
            }
        }
        self.remove_vertex(id);
    }

    // ── Lookup ────────────────────────────────────────────────────────────

    pub fn vertex(&self, id: NodeId) -> Option<&Vertex> {
        self.nodes.get(id).and_then(Option::as_ref)
    }

    pub fn vertex_mut(&mut self, id: NodeId) -> Option<&mut Vertex> {
        self.nodes.get_mut(id).and_then(Option::as_mut)
    }

    /// Ids of all live vertices, ascending.
    pub fn vertices(&self) -> Vec<NodeId> {
        (0..self.nodes.len())
            .filter(|&i| self.nodes[i].is_some())
            .collect()
    }

    pub fn vertex_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn out_neighbors(&self, id: NodeId) -> Vec<NodeId> {
        self.out[id].keys().copied().collect()
    }

    pub fn in_neighbors(&self, id: NodeId) -> Vec<NodeId> {
        self.inn[id].keys().copied().collect()
    }

    pub fn out_degree(&self, id: NodeId) -> usize {
        self.out[id].len()
    }

    pub fn in_degree(&self, id: NodeId) -> usize {
        self.inn[id].len()
    }

    pub fn has_edge(&self, from: NodeId, to: NodeId) -> bool {
        self.out[from].contains_key(&to)
    }

    pub fn edge_kinds(&self, from: NodeId, to: NodeId) -> Option<&BTreeSet<DepKind>> {
        self.out[from].get(&to)
    }

    /// All `(from, to)` pairs currently present.
    pub fn edges(&self) -> Vec<(NodeId, NodeId)> {
        let mut edges = Vec::new();
        for from in self.vertices() {
            for &to in self.out[from].keys() {
                edges.push((from, to));
            }
        }
        edges
    }

    /// First vertex matching `(kind, name)`, if any.
    pub fn find(&self, kind: VertexKind, name: &str) -> Option<NodeId> {
        self.vertices().into_iter().find(|&id| {
            let v = self.nodes[id].as_ref().expect("live vertex");
            v.kind() == kind && v.name == name
        })
    }

    // ── Algorithms ────────────────────────────────────────────────────────

    /// Drop every edge whose only remaining kind is `kind`.
    pub fn remove_edges_of_kind(&mut self, kind: DepKind) {
        for (from, to) in self.edges() {
            self.remove_edge_kind(from, to, kind);
        }
    }

    /// Kahn's topological sort.  `Err` carries the vertices on a cycle.
    pub fn topo_sort(&self) -> Result<Vec<NodeId>, Vec<NodeId>> {
        let alive = self.vertices();
        let mut indeg: FxHashMap<NodeId, usize> =
            alive.iter().map(|&id| (id, self.in_degree(id))).collect();
        let mut queue: Vec<NodeId> = alive
            .iter()
            .copied()
            .filter(|id| indeg[id] == 0)
            .collect();
        queue.sort_unstable();
        let mut order = Vec::with_capacity(alive.len());
        let mut head = 0;
        while head < queue.len() {
            let v = queue[head];
            head += 1;
            order.push(v);
            for s in self.out_neighbors(v) {
                let d = indeg.get_mut(&s).expect("edge to live vertex");
                *d -= 1;
                if *d == 0 {
                    queue.push(s);
                }
            }
        }
        if order.len() == alive.len() {
            Ok(order)
        } else {
            Err(alive
                .into_iter()
                .filter(|id| indeg[id] > 0)
                .collect())
        }
    }

    /// `true` if `target` is reachable from `from` following out-edges.
    pub fn reachable(&self, from: NodeId, target: NodeId) -> bool {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![from];
        while let Some(v) = stack.pop() {
            if v == target {
                return true;
            }
            if std::mem::replace(&mut seen[v], true) {
                continue;
            }
            stack.extend(self.out[v].keys().copied());
        }
        false
    }

    /// Remove every edge implied by a longer path (transitive reduction of
    /// a DAG).  Edge kinds are irrelevant at this point — the reduced graph
    /// is pure scheduling structure.
    pub fn transitive_reduction(&mut self) {
        for (from, to) in self.edges() {
            // Is `to` still reachable when the direct edge is ignored?
            let mut seen = vec![false; self.nodes.len()];
            let mut stack: Vec<NodeId> = self.out[from]
                .keys()
                .copied()
                .filter(|&s| s != to)
                .collect();
            let mut redundant = false;
            while let Some(v) = stack.pop() {
                if v == to {
                    redundant = true;
                    break;
                }
                if std::mem::replace(&mut seen[v], true) {
                    continue;
                }
                stack.extend(self.out[v].keys().copied());
            }
            if redundant {
                self.remove_edge(from, to);
            }
        }
    }
}
