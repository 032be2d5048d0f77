//! XML population files: `states` / `itno` / `xagent`.
//!
//! Reading pushes values through the engine callbacks in file order and
//! distinguishes the four failure kinds (malformed document, unknown agent,
//! unknown variable, uncastable value), each carrying the offending element
//! path.  Writing produces `<base><iteration>.xml` snapshots the reader
//! round-trips.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use xm_core::plugin::{AddDouble, AddInt, PopulationReader, PopulationSink};
use xm_core::{AgentSchema, ColumnView, PopReadError, ScalarValue, SinkError};

use crate::buffer::SnapshotBuffer;

// ── Reader ────────────────────────────────────────────────────────────────────

/// Reads `states`-dialect population files against a known memory schema.
pub struct XmlPopReader {
    schema: AgentSchema,
}

impl XmlPopReader {
    pub fn new(schema: AgentSchema) -> Self {
        Self { schema }
    }
}

impl PopulationReader for XmlPopReader {
    fn read_pop(
        &mut self,
        path: &Path,
        add_int: &mut AddInt<'_>,
        add_double: &mut AddDouble<'_>,
    ) -> Result<u64, PopReadError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PopReadError::MissingFile {
                    path: path.display().to_string(),
                }
            } else {
                PopReadError::Io(e)
            }
        })?;
        let path_str = path.display().to_string();
        let malformed = |element_path: &str, detail: String| PopReadError::Malformed {
            path: path_str.clone(),
            element_path: element_path.to_owned(),
            detail,
        };

        let mut reader = Reader::from_str(&text);
        reader.config_mut().trim_text(true);

        // Root element.
        loop {
            match reader
                .read_event()
                .map_err(|e| malformed("states", e.to_string()))?
            {
                Event::Start(e) if e.name().as_ref() == b"states" => break,
                Event::Start(e) => {
                    let got = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    return Err(malformed(
                        "states",
                        format!("root element is <{got}>, expected <states>"),
                    ));
                }
                Event::Eof => return Err(malformed("states", "empty document".to_owned())),
                _ => {}
            }
        }

        let mut iteration = 0u64;
        let mut agent_index = 0usize;
        loop {
            match reader
                .read_event()
                .map_err(|e| malformed("states", e.to_string()))?
            {
                Event::Start(e) if e.name().as_ref() == b"itno" => {
                    let raw = reader
                        .read_text(e.name())
                        .map_err(|e| malformed("states/itno", e.to_string()))?;
                    iteration = raw.trim().parse().map_err(|_| {
                        malformed(
                            "states/itno",
                            format!("{:?} is not a non-negative integer", raw.trim()),
                        )
                    })?;
                }
                Event::Start(e) if e.name().as_ref() == b"xagent" => {
                    agent_index += 1;
                    self.read_agent(
                        &mut reader,
                        agent_index,
                        &path_str,
                        add_int,
                        add_double,
                    )?;
                }
                Event::Start(e) => {
                    let got = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    return Err(malformed(
                        "states",
                        format!("unexpected element <{got}> under <states>"),
                    ));
                }
                Event::End(e) if e.name().as_ref() == b"states" => break,
                Event::Eof => {
                    return Err(malformed("states", "unexpected end of document".to_owned()));
                }
                _ => {}
            }
        }
        tracing::info!(agents = agent_index, iteration, "population file read");
        Ok(iteration)
    }
}

impl XmlPopReader {
    fn read_agent(
        &self,
        reader: &mut Reader<&[u8]>,
        index: usize,
        path: &str,
        add_int: &mut AddInt<'_>,
        add_double: &mut AddDouble<'_>,
    ) -> Result<(), PopReadError> {
        let base = format!("states/xagent[{index}]");
        let malformed = |element_path: String, detail: String| PopReadError::Malformed {
            path: path.to_owned(),
            element_path,
            detail,
        };

        let mut agent: Option<String> = None;
        let mut seen = 0usize;
        loop {
            match reader
                .read_event()
                .map_err(|e| malformed(base.clone(), e.to_string()))?
            {
                Event::Start(e) if e.name().as_ref() == b"name" => {
                    let raw = reader
                        .read_text(e.name())
                        .map_err(|e| malformed(format!("{base}/name"), e.to_string()))?;
                    let name = raw.trim().to_owned();
                    if !self.schema.contains_key(&name) {
                        return Err(PopReadError::UnknownAgent {
                            element_path: format!("{base}/name"),
                            agent: name,
                        });
                    }
                    agent = Some(name);
                }
                Event::Start(e) => {
                    let var =
                        String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    let element_path = format!("{base}/{var}");
                    let Some(agent) = agent.as_deref() else {
                        return Err(malformed(
                            element_path,
                            "<name> must precede the variable elements".to_owned(),
                        ));
                    };
                    let vars = &self.schema[agent];
                    let Some((scalar, _)) = vars.iter().find(|(_, v)| *v == var) else {
                        return Err(PopReadError::UnknownVariable {
                            element_path,
                            agent: agent.to_owned(),
                            var,
                        });
                    };
                    let raw = reader
                        .read_text(e.name())
                        .map_err(|e| malformed(element_path.clone(), e.to_string()))?;
                    let value = ScalarValue::parse_as(raw.trim(), *scalar).map_err(|e| {
                        PopReadError::BadCast {
                            element_path,
                            value: e.value,
                            expected: e.expected,
                        }
                    })?;
                    match value {
                        ScalarValue::Int(v) => add_int(agent, &var, v)?,
                        ScalarValue::Double(v) => add_double(agent, &var, v)?,
                    }
                    seen += 1;
                }
                Event::End(e) if e.name().as_ref() == b"xagent" => {
                    let Some(agent) = agent.as_deref() else {
                        return Err(malformed(base, "<xagent> without <name>".to_owned()));
                    };
                    let declared = self.schema[agent].len();
                    if seen != declared {
                        return Err(malformed(
                            base,
                            format!(
                                "agent {agent:?} supplies {seen} of {declared} declared variables"
                            ),
                        ));
                    }
                    return Ok(());
                }
                Event::Eof => {
                    return Err(malformed(base, "unexpected end of document".to_owned()));
                }
                _ => {}
            }
        }
    }
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// Writes `<base><iteration>.xml` population snapshots.
pub struct XmlPopSink {
    dir: PathBuf,
    base: String,
    buffer: SnapshotBuffer,
    iteration: u64,
}

impl XmlPopSink {
    pub fn new(dir: &Path, base: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            base: base.to_owned(),
            buffer: SnapshotBuffer::default(),
            iteration: 0,
        }
    }
}

impl PopulationSink for XmlPopSink {
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
        let path = self.dir.join(format!("{}{}.xml", self.base, self.iteration));
        let file = std::fs::File::create(&path)?;
        let mut out = std::io::BufWriter::new(file);

        writeln!(out, "<states>")?;
        writeln!(out, "<itno>{}</itno>", self.iteration)?;
        for (agent, vars) in self.buffer.schema().clone() {
            for row in 0..self.buffer.rows(&agent) {
                writeln!(out, "<xagent>")?;
                writeln!(out, "<name>{}</name>", escape(agent.as_str()))?;
                for (scalar, var) in &vars {
                    let value = self.buffer.value(&agent, var, row).ok_or_else(|| {
                        SinkError::Backend(format!(
                            "column {agent}.{var} missing from snapshot ({scalar})"
                        ))
                    })?;
                    writeln!(out, "<{var}>{value}</{var}>")?;
                }
                writeln!(out, "</xagent>")?;
            }
        }
        writeln!(out, "</states>")?;
        out.flush()?;
        tracing::debug!(path = %path.display(), "population snapshot written");
        Ok(())
    }
}
