//! Column buffering shared by the snapshot writers.
//!
//! `pop_write` tasks hand over one column at a time; files want rows (XML,
//! CSV) or whole tables (SQLite).  The buffer copies each column as it
//! arrives and serves row-major access at finalize time.

use std::collections::BTreeMap;

use xm_core::{AgentSchema, ColumnView, ScalarValue, SinkError};

pub(crate) enum ColumnBuf {
    Int(Vec<i64>),
    Double(Vec<f64>),
}

impl ColumnBuf {
    fn len(&self) -> usize {
        match self {
            ColumnBuf::Int(v) => v.len(),
            ColumnBuf::Double(v) => v.len(),
        }
    }

    fn value_at(&self, row: usize) -> Option<ScalarValue> {
        match self {
            ColumnBuf::Int(v) => v.get(row).copied().map(ScalarValue::Int),
            ColumnBuf::Double(v) => v.get(row).copied().map(ScalarValue::Double),
        }
    }
}

#[derive(Default)]
pub(crate) struct SnapshotBuffer {
    schema: AgentSchema,
    columns: BTreeMap<String, BTreeMap<String, ColumnBuf>>,
}

impl SnapshotBuffer {
    pub(crate) fn set_schema(&mut self, schema: AgentSchema) {
        self.schema = schema;
    }

    pub(crate) fn schema(&self) -> &AgentSchema {
        &self.schema
    }

    /// Start a fresh snapshot, dropping previously buffered columns.
    pub(crate) fn begin(&mut self) {
        self.columns.clear();
    }

    /// Copy one incoming column.
    pub(crate) fn store(
        &mut self,
        agent: &str,
        var: &str,
        column: ColumnView<'_>,
    ) -> Result<(), SinkError> {
        if !self.schema.contains_key(agent) {
            return Err(SinkError::Backend(format!(
                "column for unknown agent {agent:?}"
            )));
        }
        let buf = match column {
            ColumnView::Int(s) => ColumnBuf::Int(s.to_vec()),
            ColumnView::Double(s) => ColumnBuf::Double(s.to_vec()),
        };
        self.columns
            .entry(agent.to_owned())
            .or_default()
            .insert(var.to_owned(), buf);
        Ok(())
    }

    /// Number of buffered rows for `agent` (0 when no column arrived).
    pub(crate) fn rows(&self, agent: &str) -> usize {
        self.columns
            .get(agent)
            .and_then(|vars| vars.values().next())
            .map_or(0, ColumnBuf::len)
    }

    /// Value of `agent.var` at `row`, if buffered.
    pub(crate) fn value(&self, agent: &str, var: &str, row: usize) -> Option<ScalarValue> {
        self.columns.get(agent)?.get(var)?.value_at(row)
    }
}
