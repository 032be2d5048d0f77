//! SQLite population files: one table per agent type, one column per
//! variable, plus an `itno` table carrying the iteration number.
//!
//! Snapshots are written as `<base><iteration>.sqlite`.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use xm_core::plugin::{AddDouble, AddInt, PopulationReader, PopulationSink};
use xm_core::{AgentSchema, ColumnView, PopReadError, ScalarType, SinkError};

use crate::buffer::SnapshotBuffer;

// ── Reader ────────────────────────────────────────────────────────────────────

/// Reads table-per-agent SQLite population files against a known schema.
/// Agents without a table load as empty populations.
pub struct SqlitePopReader {
    schema: AgentSchema,
}

impl SqlitePopReader {
    pub fn new(schema: AgentSchema) -> Self {
        Self { schema }
    }
}

impl PopulationReader for SqlitePopReader {
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
        let malformed = |element_path: &str, detail: String| PopReadError::Malformed {
            path: path_str.clone(),
            element_path: element_path.to_owned(),
            detail,
        };

        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| malformed("database", e.to_string()))?;

        let iteration: u64 = conn
            .query_row("SELECT value FROM itno", [], |row| row.get::<_, i64>(0))
            .map(|v| v.max(0) as u64)
            .unwrap_or(0);

        for (agent, vars) in self.schema.clone() {
            if !table_exists(&conn, &agent).map_err(|e| malformed(&agent, e.to_string()))? {
                continue;
            }
            let columns: Vec<String> = vars
                .iter()
                .map(|(_, name)| format!("\"{name}\""))
                .collect();
            let sql = format!(
                "SELECT {} FROM \"{agent}\" ORDER BY rowid",
                columns.join(", ")
            );
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| malformed(&agent, e.to_string()))?;
            let mut rows = stmt
                .query([])
                .map_err(|e| malformed(&agent, e.to_string()))?;
            while let Some(row) = rows
                .next()
                .map_err(|e| malformed(&agent, e.to_string()))?
            {
                for (column, (scalar, var)) in vars.iter().enumerate() {
                    let element_path = format!("{agent}.{var}");
                    match scalar {
                        ScalarType::Int => {
                            let v: i64 = row.get(column).map_err(|e| PopReadError::BadCast {
                                element_path,
                                value: e.to_string(),
                                expected: *scalar,
                            })?;
                            add_int(&agent, var, v)?;
                        }
                        ScalarType::Double => {
                            let v: f64 = row.get(column).map_err(|e| PopReadError::BadCast {
                                element_path,
                                value: e.to_string(),
                                expected: *scalar,
                            })?;
                            add_double(&agent, var, v)?;
                        }
                    }
                }
            }
        }
        Ok(iteration)
    }
}

fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// Writes `<base><iteration>.sqlite` population snapshots.
pub struct SqlitePopSink {
    dir: PathBuf,
    base: String,
    buffer: SnapshotBuffer,
    iteration: u64,
}

impl SqlitePopSink {
    pub fn new(dir: &Path, base: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            base: base.to_owned(),
            buffer: SnapshotBuffer::default(),
            iteration: 0,
        }
    }
}

impl PopulationSink for SqlitePopSink {
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
        let backend = |e: rusqlite::Error| SinkError::Backend(e.to_string());

        let path = self
            .dir
            .join(format!("{}{}.sqlite", self.base, self.iteration));
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        let conn = Connection::open(&path).map_err(backend)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = NORMAL;
             CREATE TABLE itno (value INTEGER NOT NULL);",
        )
        .map_err(backend)?;
        conn.execute("INSERT INTO itno (value) VALUES (?1)", [self.iteration as i64])
            .map_err(backend)?;

        for (agent, vars) in self.buffer.schema().clone() {
            let columns: Vec<String> = vars
                .iter()
                .map(|(scalar, name)| {
                    let affinity = match scalar {
                        ScalarType::Int => "INTEGER",
                        ScalarType::Double => "REAL",
                    };
                    format!("\"{name}\" {affinity} NOT NULL")
                })
                .collect();
            conn.execute_batch(&format!(
                "CREATE TABLE \"{agent}\" ({});",
                columns.join(", ")
            ))
            .map_err(backend)?;

            let rows = self.buffer.rows(&agent);
            if rows == 0 {
                continue;
            }
            let placeholders: Vec<String> =
                (1..=vars.len()).map(|i| format!("?{i}")).collect();
            let names: Vec<String> = vars.iter().map(|(_, n)| format!("\"{n}\"")).collect();
            let sql = format!(
                "INSERT INTO \"{agent}\" ({}) VALUES ({})",
                names.join(", "),
                placeholders.join(", ")
            );
            let tx = conn.unchecked_transaction().map_err(backend)?;
            {
                let mut stmt = tx.prepare_cached(&sql).map_err(backend)?;
                for row in 0..rows {
                    let mut values: Vec<Box<dyn rusqlite::ToSql>> =
                        Vec::with_capacity(vars.len());
                    for (_, var) in &vars {
                        let value = self.buffer.value(&agent, var, row).ok_or_else(|| {
                            SinkError::Backend(format!(
                                "column {agent}.{var} missing from snapshot"
                            ))
                        })?;
                        match value {
                            xm_core::ScalarValue::Int(v) => values.push(Box::new(v)),
                            xm_core::ScalarValue::Double(v) => values.push(Box::new(v)),
                        }
                    }
                    let params: Vec<&dyn rusqlite::ToSql> =
                        values.iter().map(|v| v.as_ref()).collect();
                    stmt.execute(params.as_slice()).map_err(backend)?;
                }
            }
            tx.commit().map_err(backend)?;
        }
        tracing::debug!(path = %path.display(), "population snapshot written");
        Ok(())
    }
}
