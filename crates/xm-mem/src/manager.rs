//! `MemoryManager` — the registry of every agent type's memory.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use xm_core::{AgentSchema, Scalar, ScalarType};

use crate::agent::AgentMemory;
use crate::error::{MemError, MemResult};
use crate::shadow::AgentShadow;
use crate::vector::TypedVector;

/// Process-wide registry of agent memories, one per agent type.
///
/// Owned by the engine context and shared with worker threads behind `Arc`.
/// Registration is `&mut` and must complete before sharing; lookups and the
/// data plane are `&self`.
#[derive(Default)]
pub struct MemoryManager {
    agents: FxHashMap<String, Arc<AgentMemory>>,
}

impl MemoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Registration plane ────────────────────────────────────────────────

    /// Register a new agent type.  Fails `DuplicateName` if it exists.
    pub fn register_agent(&mut self, agent: &str) -> MemResult<()> {
        if self.agents.contains_key(agent) {
            return Err(MemError::DuplicateName(agent.to_owned()));
        }
        self.agents
            .insert(agent.to_owned(), Arc::new(AgentMemory::new(agent)));
        tracing::debug!(agent, "registered agent type");
        Ok(())
    }

    /// Register variable `var` of element type `T` on `agent`.
    pub fn register_var<T: Scalar>(&mut self, agent: &str, var: &str) -> MemResult<()> {
        self.agent_mut(agent)?.register_var::<T>(var)
    }

    /// Tag-driven variant used by the model loader.
    pub fn register_var_scalar(
        &mut self,
        agent: &str,
        var: &str,
        scalar: ScalarType,
    ) -> MemResult<()> {
        self.agent_mut(agent)?.register_var_scalar(var, scalar)
    }

    /// Reserve room for `n` agents of type `agent` and lock its layout.
    pub fn hint_population_size(&mut self, agent: &str, n: usize) -> MemResult<()> {
        self.agent_mut(agent)?.hint_population_size(n);
        Ok(())
    }

    fn agent_mut(&mut self, agent: &str) -> MemResult<&mut AgentMemory> {
        let arc = self
            .agents
            .get_mut(agent)
            .ok_or_else(|| MemError::InvalidAgent(agent.to_owned()))?;
        // Registration precedes sharing, so the Arc is still unique here.
        Arc::get_mut(arc).ok_or_else(|| {
            MemError::InvalidOperation(format!(
                "memory of agent {agent:?} is already shared; registration window closed"
            ))
        })
    }

    // ── Lookup plane ──────────────────────────────────────────────────────

    /// The memory of one agent type.
    pub fn agent(&self, agent: &str) -> MemResult<&Arc<AgentMemory>> {
        self.agents
            .get(agent)
            .ok_or_else(|| MemError::InvalidAgent(agent.to_owned()))
    }

    /// Typed handle to one column.
    pub fn vector_of<T: Scalar>(&self, agent: &str, var: &str) -> MemResult<&TypedVector<T>> {
        self.agent(agent)?.vector_of::<T>(var)
    }

    /// Number of registered agent types.
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// `true` if `agent` is a registered agent type.
    pub fn is_registered(&self, agent: &str) -> bool {
        self.agents.contains_key(agent)
    }

    /// Fail unless `agent.var` is a registered variable.
    pub fn assert_var_registered(&self, agent: &str, var: &str) -> MemResult<()> {
        let am = self.agent(agent)?;
        if am.has_var(var) {
            Ok(())
        } else {
            Err(MemError::InvalidVariable {
                agent: agent.to_owned(),
                var: var.to_owned(),
            })
        }
    }

    /// Current population of one agent type (the splitting queue's input).
    pub fn population_of(&self, agent: &str) -> MemResult<usize> {
        Ok(self.agent(agent)?.population())
    }

    /// A fresh, empty shadow bound to `agent`'s memory.
    pub fn make_shadow(&self, agent: &str) -> MemResult<AgentShadow> {
        Ok(self.agent(agent)?.make_shadow())
    }

    /// The full memory layout, for plugin discovery: agent name → `(type,
    /// var)` pairs in declaration order.
    pub fn schema(&self) -> AgentSchema {
        self.agents
            .iter()
            .map(|(name, am)| (name.clone(), am.schema_vars()))
            .collect()
    }

    /// Verify the column-equality invariant for every agent type.
    pub fn assert_columns_equal(&self) -> MemResult<()> {
        for am in self.agents.values() {
            am.assert_columns_equal()?;
        }
        Ok(())
    }

    /// Compact every agent's dead rows; returns total rows removed.
    /// Runs single-threaded at iteration boundaries.
    pub fn compact_all(&self) -> usize {
        self.agents.values().map(|am| am.compact()).sum()
    }
}
