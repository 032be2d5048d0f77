//! CSV population files.
//!
//! One record per agent instance: the agent-type name first, then one field
//! per declared variable in declaration order.  Snapshots are written as
//! `<base><iteration>.csv`; CSV carries no iteration number, so reading
//! returns iteration 0.

use std::path::{Path, PathBuf};

use xm_core::plugin::{AddDouble, AddInt, PopulationReader, PopulationSink};
use xm_core::{AgentSchema, ColumnView, PopReadError, ScalarValue, SinkError};

use crate::buffer::SnapshotBuffer;

// ── Reader ────────────────────────────────────────────────────────────────────

/// Reads agent-name-first CSV population files against a known schema.
pub struct CsvPopReader {
    schema: AgentSchema,
}

impl CsvPopReader {
    pub fn new(schema: AgentSchema) -> Self {
        Self { schema }
    }
}

impl PopulationReader for CsvPopReader {
    fn read_pop(
        &mut self,
        path: &Path,
        add_int: &mut AddInt<'_>,
        add_double: &mut AddDouble<'_>,
    ) -> Result<u64, PopReadError> {
        if !path.exists() {
            return Err(PopReadError::MissingFile {
                path: path.display().to_string(),
            });
        }
        let path_str = path.display().to_string();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| PopReadError::Malformed {
                path: path_str.clone(),
                element_path: "line 1".to_owned(),
                detail: e.to_string(),
            })?;

        for (index, record) in reader.records().enumerate() {
            let line = index + 1;
            let element_path = format!("line {line}");
            let record = record.map_err(|e| PopReadError::Malformed {
                path: path_str.clone(),
                element_path: element_path.clone(),
                detail: e.to_string(),
            })?;
            if record.is_empty() {
                continue;
            }

            let agent = record.get(0).unwrap_or_default().to_owned();
            let Some(vars) = self.schema.get(&agent) else {
                return Err(PopReadError::UnknownAgent {
                    element_path,
                    agent,
                });
            };
            if record.len() != vars.len() + 1 {
                return Err(PopReadError::Malformed {
                    path: path_str.clone(),
                    element_path,
                    detail: format!(
                        "agent {agent:?} supplies {} of {} declared variables",
                        record.len() - 1,
                        vars.len()
                    ),
                });
            }
            for (column, (scalar, var)) in vars.iter().enumerate() {
                let raw = record.get(column + 1).unwrap_or_default();
                let value = ScalarValue::parse_as(raw, *scalar).map_err(|e| {
                    PopReadError::BadCast {
                        element_path: format!("line {line}, field {var}"),
                        value: e.value,
                        expected: e.expected,
                    }
                })?;
                match value {
                    ScalarValue::Int(v) => add_int(&agent, var, v)?,
                    ScalarValue::Double(v) => add_double(&agent, var, v)?,
                }
            }
        }
        Ok(0)
    }
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// Writes `<base><iteration>.csv` population snapshots.
pub struct CsvPopSink {
    dir: PathBuf,
    base: String,
    buffer: SnapshotBuffer,
    iteration: u64,
}

impl CsvPopSink {
    pub fn new(dir: &Path, base: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            base: base.to_owned(),
            buffer: SnapshotBuffer::default(),
            iteration: 0,
        }
    }
}

impl PopulationSink for CsvPopSink {
    fn set_schema(&mut self, schema: AgentSchema) {
        self.buffer.set_schema(schema);
    }

    fn init_write(&mut self, iteration: u64) -> Result<(), SinkError> {
        self.iteration = iteration;
        self.buffer.begin();
        Ok(())
    }

    fn write_column(
        &mut self,
        agent: &str,
        var: &str,
        column: ColumnView<'_>,
    ) -> Result<(), SinkError> {
        self.buffer.store(agent, var, column)
    }

    fn finalize_write(&mut self) -> Result<(), SinkError> {
        let path = self.dir.join(format!("{}{}.csv", self.base, self.iteration));
        let mut writer = csv::Writer::from_path(&path)
            .map_err(|e| SinkError::Backend(e.to_string()))?;

        for (agent, vars) in self.buffer.schema().clone() {
            for row in 0..self.buffer.rows(&agent) {
                let mut record = Vec::with_capacity(vars.len() + 1);
                record.push(agent.clone());
                for (_, var) in &vars {
                    let value = self.buffer.value(&agent, var, row).ok_or_else(|| {
                        SinkError::Backend(format!("column {agent}.{var} missing from snapshot"))
                    })?;
                    record.push(value.to_string());
                }
                writer
                    .write_record(&record)
                    .map_err(|e| SinkError::Backend(e.to_string()))?;
            }
        }
        writer.flush()?;
        tracing::debug!(path = %path.display(), "population snapshot written");
        Ok(())
    }
}
