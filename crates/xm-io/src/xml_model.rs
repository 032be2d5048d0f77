//! Parser for `xmodel` version-2 model files.
//!
//! A single forward pass over `quick-xml` events with recursive descent into
//! the nested blocks; no DOM is built and no unwinding control flow is used.
//! Unknown elements are skipped so models carrying tooling-specific extras
//! still load; structural violations fail with the element that broke.

use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use xm_core::ScalarType;
use xm_model::{
    AgentDef, CompareOp, Condition, FunctionDef, LogicOp, MessageDef, ModelDef, Operand,
    TimeUnitDef, VarDef,
};

use crate::error::{IoError, IoResult};

/// Parse the model file at `path`.
pub fn parse_model_file(path: &Path) -> IoResult<ModelDef> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            IoError::MissingFile {
                path: path.display().to_string(),
            }
        } else {
            IoError::Io(e)
        }
    })?;
    let mut parser = ModelParser::new(&text, path);
    let model = parser.parse()?;
    tracing::info!(
        model = %model.name,
        agents = model.agents.len(),
        messages = model.messages.len(),
        "model file parsed"
    );
    Ok(model)
}

struct ModelParser<'a> {
    reader: Reader<&'a [u8]>,
    path: String,
}

/// One side of an lhs/op/rhs block: a value operand or a sub-condition.
enum Side {
    Value(Operand),
    Cond(Condition),
}

impl<'a> ModelParser<'a> {
    fn new(text: &'a str, path: &Path) -> Self {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);
        Self {
            reader,
            path: path.display().to_string(),
        }
    }

    fn parse(&mut self) -> IoResult<ModelDef> {
        // Find the document root.
        let root = loop {
            match self.reader.read_event()? {
                Event::Start(e) => break e.into_owned(),
                Event::Eof => return Err(self.err("xmodel", "document has no root element")),
                _ => {}
            }
        };
        if root.name().as_ref() != b"xmodel" {
            return Err(self.err("xmodel", "root element is not <xmodel>"));
        }
        match root
            .try_get_attribute("version")
            .map_err(quick_xml::Error::from)?
        {
            Some(v) if v.value.as_ref() == b"2" => {}
            Some(v) => {
                let got = String::from_utf8_lossy(&v.value).into_owned();
                return Err(self.err("xmodel", &format!("unsupported model version {got:?}")));
            }
            None => return Err(self.err("xmodel", "missing version attribute")),
        }

        let mut model = ModelDef::default();
        loop {
            match self.reader.read_event()? {
                Event::Start(e) => match e.name().as_ref() {
                    b"name" => model.name = self.text(&e)?,
                    b"version" => model.version = self.text(&e)?,
                    b"author" => model.author = self.text(&e)?,
                    b"description" => model.description = self.text(&e)?,
                    b"environment" => self.parse_environment(&mut model)?,
                    b"agents" => self.parse_agents(&mut model)?,
                    b"messages" => self.parse_messages(&mut model)?,
                    _ => self.skip(&e)?,
                },
                Event::End(e) if e.name().as_ref() == b"xmodel" => break,
                Event::Eof => return Err(self.err("xmodel", "unexpected end of document")),
                _ => {}
            }
        }
        Ok(model)
    }

    // ── environment ───────────────────────────────────────────────────────

    fn parse_environment(&mut self, model: &mut ModelDef) -> IoResult<()> {
        loop {
            match self.reader.read_event()? {
                Event::Start(e) => match e.name().as_ref() {
                    b"constants" => {
                        model.constants = self.parse_variables(b"constants")?;
                    }
                    b"timeUnits" => self.parse_time_units(model)?,
                    b"functionFiles" => self.parse_function_files(model)?,
                    b"dataTypes" => {
                        // User-declared record types are a declared
                        // restriction of this runtime.
                        let inner = self.collect_child_names(b"dataTypes")?;
                        if !inner.is_empty() {
                            return Err(self.err(
                                "environment/dataTypes",
                                "user-declared data types are not supported",
                            ));
                        }
                    }
                    _ => self.skip(&e)?,
                },
                Event::End(e) if e.name().as_ref() == b"environment" => return Ok(()),
                Event::Eof => return Err(self.err("environment", "unexpected end of document")),
                _ => {}
            }
        }
    }

    fn parse_time_units(&mut self, model: &mut ModelDef) -> IoResult<()> {
        loop {
            match self.reader.read_event()? {
                Event::Start(e) if e.name().as_ref() == b"timeUnit" => {
                    let mut unit = TimeUnitDef {
                        name: String::new(),
                        unit: String::new(),
                        period: 0,
                    };
                    loop {
                        match self.reader.read_event()? {
                            Event::Start(f) => match f.name().as_ref() {
                                b"name" => unit.name = self.text(&f)?,
                                b"unit" => unit.unit = self.text(&f)?,
                                b"period" => {
                                    let raw = self.text(&f)?;
                                    unit.period = raw.parse().map_err(|_| {
                                        self.err(
                                            "timeUnit/period",
                                            &format!("{raw:?} is not a non-negative integer"),
                                        )
                                    })?;
                                }
                                _ => self.skip(&f)?,
                            },
                            Event::End(f) if f.name().as_ref() == b"timeUnit" => break,
                            Event::Eof => {
                                return Err(self.err("timeUnit", "unexpected end of document"));
                            }
                            _ => {}
                        }
                    }
                    model.time_units.push(unit);
                }
                Event::Start(e) => self.skip(&e)?,
                Event::End(e) if e.name().as_ref() == b"timeUnits" => return Ok(()),
                Event::Eof => return Err(self.err("timeUnits", "unexpected end of document")),
                _ => {}
            }
        }
    }

    fn parse_function_files(&mut self, model: &mut ModelDef) -> IoResult<()> {
        loop {
            match self.reader.read_event()? {
                Event::Start(e) if e.name().as_ref() == b"file" => {
                    let file = self.text(&e)?;
                    model.function_files.push(file);
                }
                Event::Start(e) => self.skip(&e)?,
                Event::End(e) if e.name().as_ref() == b"functionFiles" => return Ok(()),
                Event::Eof => return Err(self.err("functionFiles", "unexpected end of document")),
                _ => {}
            }
        }
    }

    // ── agents ────────────────────────────────────────────────────────────

    fn parse_agents(&mut self, model: &mut ModelDef) -> IoResult<()> {
        loop {
            match self.reader.read_event()? {
                Event::Start(e) if e.name().as_ref() == b"xagent" => {
                    let agent = self.parse_agent()?;
                    model.agents.push(agent);
                }
                Event::Start(e) => self.skip(&e)?,
                Event::End(e) if e.name().as_ref() == b"agents" => return Ok(()),
                Event::Eof => return Err(self.err("agents", "unexpected end of document")),
                _ => {}
            }
        }
    }

    fn parse_agent(&mut self) -> IoResult<AgentDef> {
        let mut agent = AgentDef::default();
        loop {
            match self.reader.read_event()? {
                Event::Start(e) => match e.name().as_ref() {
                    b"name" => agent.name = self.text(&e)?,
                    b"memory" => agent.vars = self.parse_variables(b"memory")?,
                    b"functions" => loop {
                        match self.reader.read_event()? {
                            Event::Start(f) if f.name().as_ref() == b"function" => {
                                agent.functions.push(self.parse_function()?);
                            }
                            Event::Start(f) => self.skip(&f)?,
                            Event::End(f) if f.name().as_ref() == b"functions" => break,
                            Event::Eof => {
                                return Err(self.err("functions", "unexpected end of document"));
                            }
                            _ => {}
                        }
                    },
                    _ => self.skip(&e)?,
                },
                Event::End(e) if e.name().as_ref() == b"xagent" => return Ok(agent),
                Event::Eof => return Err(self.err("xagent", "unexpected end of document")),
                _ => {}
            }
        }
    }

    fn parse_function(&mut self) -> IoResult<FunctionDef> {
        let mut function = FunctionDef::default();
        loop {
            match self.reader.read_event()? {
                Event::Start(e) => match e.name().as_ref() {
                    b"name" => function.name = self.text(&e)?,
                    b"currentState" => function.current_state = self.text(&e)?,
                    b"nextState" => function.next_state = self.text(&e)?,
                    b"condition" => function.condition = Some(self.parse_condition()?),
                    b"inputs" => {
                        function.inputs = self.parse_message_refs(b"inputs", b"input")?;
                    }
                    b"outputs" => {
                        function.outputs = self.parse_message_refs(b"outputs", b"output")?;
                    }
                    b"memoryAccess" => self.parse_memory_access(&mut function)?,
                    _ => self.skip(&e)?,
                },
                Event::End(e) if e.name().as_ref() == b"function" => return Ok(function),
                Event::Eof => return Err(self.err("function", "unexpected end of document")),
                _ => {}
            }
        }
    }

    fn parse_message_refs(&mut self, outer: &[u8], inner: &[u8]) -> IoResult<Vec<String>> {
        let mut refs = Vec::new();
        loop {
            match self.reader.read_event()? {
                Event::Start(e) if e.name().as_ref() == inner => {
                    // An input/output wraps a <messageName> child.
                    loop {
                        match self.reader.read_event()? {
                            Event::Start(f) if f.name().as_ref() == b"messageName" => {
                                refs.push(self.text(&f)?);
                            }
                            Event::Start(f) => self.skip(&f)?,
                            Event::End(f) if f.name().as_ref() == inner => break,
                            Event::Eof => {
                                return Err(
                                    self.err("inputs/outputs", "unexpected end of document")
                                );
                            }
                            _ => {}
                        }
                    }
                }
                Event::Start(e) => self.skip(&e)?,
                Event::End(e) if e.name().as_ref() == outer => return Ok(refs),
                Event::Eof => return Err(self.err("inputs/outputs", "unexpected end of document")),
                _ => {}
            }
        }
    }

    fn parse_memory_access(&mut self, function: &mut FunctionDef) -> IoResult<()> {
        loop {
            match self.reader.read_event()? {
                Event::Start(e) => match e.name().as_ref() {
                    b"readOnly" => {
                        function.read_only = self.parse_var_names(b"readOnly")?;
                    }
                    b"readWrite" => {
                        function.read_write = self.parse_var_names(b"readWrite")?;
                    }
                    _ => self.skip(&e)?,
                },
                Event::End(e) if e.name().as_ref() == b"memoryAccess" => return Ok(()),
                Event::Eof => return Err(self.err("memoryAccess", "unexpected end of document")),
                _ => {}
            }
        }
    }

    fn parse_var_names(&mut self, outer: &[u8]) -> IoResult<Vec<String>> {
        let mut names = Vec::new();
        loop {
            match self.reader.read_event()? {
                Event::Start(e) if e.name().as_ref() == b"variableName" => {
                    names.push(self.text(&e)?);
                }
                Event::Start(e) => self.skip(&e)?,
                Event::End(e) if e.name().as_ref() == outer => return Ok(names),
                Event::Eof => return Err(self.err("memoryAccess", "unexpected end of document")),
                _ => {}
            }
        }
    }

    // ── messages ──────────────────────────────────────────────────────────

    fn parse_messages(&mut self, model: &mut ModelDef) -> IoResult<()> {
        loop {
            match self.reader.read_event()? {
                Event::Start(e) if e.name().as_ref() == b"message" => {
                    let mut message = MessageDef::default();
                    loop {
                        match self.reader.read_event()? {
                            Event::Start(f) => match f.name().as_ref() {
                                b"name" => message.name = self.text(&f)?,
                                b"variables" => {
                                    message.vars = self.parse_variables(b"variables")?;
                                }
                                _ => self.skip(&f)?,
                            },
                            Event::End(f) if f.name().as_ref() == b"message" => break,
                            Event::Eof => {
                                return Err(self.err("message", "unexpected end of document"));
                            }
                            _ => {}
                        }
                    }
                    model.messages.push(message);
                }
                Event::Start(e) => self.skip(&e)?,
                Event::End(e) if e.name().as_ref() == b"messages" => return Ok(()),
                Event::Eof => return Err(self.err("messages", "unexpected end of document")),
                _ => {}
            }
        }
    }

    // ── variables ─────────────────────────────────────────────────────────

    fn parse_variables(&mut self, outer: &[u8]) -> IoResult<Vec<VarDef>> {
        let mut vars = Vec::new();
        loop {
            match self.reader.read_event()? {
                Event::Start(e) if e.name().as_ref() == b"variable" => {
                    let mut type_name = String::new();
                    let mut name = String::new();
                    loop {
                        match self.reader.read_event()? {
                            Event::Start(f) => match f.name().as_ref() {
                                b"type" => type_name = self.text(&f)?,
                                b"name" => name = self.text(&f)?,
                                _ => self.skip(&f)?,
                            },
                            Event::End(f) if f.name().as_ref() == b"variable" => break,
                            Event::Eof => {
                                return Err(self.err("variable", "unexpected end of document"));
                            }
                            _ => {}
                        }
                    }
                    let scalar = ScalarType::parse(&type_name).ok_or_else(|| {
                        self.err(
                            "variable/type",
                            &format!("unsupported variable type {type_name:?}"),
                        )
                    })?;
                    vars.push(VarDef::new(name, scalar));
                }
                Event::Start(e) => self.skip(&e)?,
                Event::End(e) if e.name().as_ref() == outer => return Ok(vars),
                Event::Eof => return Err(self.err("variables", "unexpected end of document")),
                _ => {}
            }
        }
    }

    // ── conditions ────────────────────────────────────────────────────────

    /// Parse the body of a `<condition>` element (the start tag has been
    /// consumed) up to its end tag.
    fn parse_condition(&mut self) -> IoResult<Condition> {
        let mut time: Option<(String, Option<i64>)> = None;
        let mut negated: Option<Condition> = None;
        let mut lhs: Option<Side> = None;
        let mut rhs: Option<Side> = None;
        let mut op: Option<String> = None;

        loop {
            match self.reader.read_event()? {
                Event::Start(e) => match e.name().as_ref() {
                    b"time" => time = Some(self.parse_time()?),
                    b"not" => negated = Some(self.parse_not()?),
                    b"lhs" => lhs = Some(self.parse_side(b"lhs")?),
                    b"rhs" => rhs = Some(self.parse_side(b"rhs")?),
                    b"op" => op = Some(self.text(&e)?),
                    _ => self.skip(&e)?,
                },
                Event::End(e) if e.name().as_ref() == b"condition" => break,
                Event::Eof => return Err(self.err("condition", "unexpected end of document")),
                _ => {}
            }
        }

        if let Some((unit, phase)) = time {
            return Ok(Condition::Time { unit, phase });
        }
        if let Some(inner) = negated {
            return Ok(Condition::Not(Box::new(inner)));
        }
        let (Some(lhs), Some(op), Some(rhs)) = (lhs, op, rhs) else {
            return Err(self.err("condition", "expected time, not, or lhs/op/rhs"));
        };
        match (lhs, rhs) {
            (Side::Value(l), Side::Value(r)) => {
                let op = CompareOp::parse(&op)
                    .ok_or_else(|| self.err("condition/op", &format!("unknown operator {op:?}")))?;
                Ok(Condition::Compare { lhs: l, op, rhs: r })
            }
            (Side::Cond(l), Side::Cond(r)) => {
                let op = LogicOp::parse(&op)
                    .ok_or_else(|| self.err("condition/op", &format!("unknown operator {op:?}")))?;
                Ok(Condition::Nested {
                    lhs: Box::new(l),
                    op,
                    rhs: Box::new(r),
                })
            }
            _ => Err(self.err(
                "condition",
                "lhs and rhs must both be values or both be conditions",
            )),
        }
    }

    fn parse_time(&mut self) -> IoResult<(String, Option<i64>)> {
        let mut unit = String::new();
        let mut phase = None;
        loop {
            match self.reader.read_event()? {
                Event::Start(e) => match e.name().as_ref() {
                    b"period" => unit = self.text(&e)?,
                    b"phase" => {
                        let raw = self.text(&e)?;
                        phase = Some(raw.parse().map_err(|_| {
                            self.err("time/phase", &format!("{raw:?} is not an integer"))
                        })?);
                    }
                    _ => self.skip(&e)?,
                },
                Event::End(e) if e.name().as_ref() == b"time" => return Ok((unit, phase)),
                Event::Eof => return Err(self.err("time", "unexpected end of document")),
                _ => {}
            }
        }
    }

    fn parse_not(&mut self) -> IoResult<Condition> {
        let mut inner = None;
        loop {
            match self.reader.read_event()? {
                Event::Start(e) if e.name().as_ref() == b"condition" => {
                    inner = Some(self.parse_condition()?);
                }
                Event::Start(e) => self.skip(&e)?,
                Event::End(e) if e.name().as_ref() == b"not" => {
                    return inner
                        .ok_or_else(|| self.err("not", "expected a nested <condition>"));
                }
                Event::Eof => return Err(self.err("not", "unexpected end of document")),
                _ => {}
            }
        }
    }

    fn parse_side(&mut self, outer: &[u8]) -> IoResult<Side> {
        let mut side = None;
        loop {
            match self.reader.read_event()? {
                Event::Start(e) => match e.name().as_ref() {
                    b"value" => {
                        let raw = self.text(&e)?;
                        side = Some(Side::Value(parse_operand(&raw)));
                    }
                    b"condition" => side = Some(Side::Cond(self.parse_condition()?)),
                    _ => self.skip(&e)?,
                },
                Event::End(e) if e.name().as_ref() == outer => {
                    return side
                        .ok_or_else(|| self.err("lhs/rhs", "expected <value> or <condition>"));
                }
                Event::Eof => return Err(self.err("lhs/rhs", "unexpected end of document")),
                _ => {}
            }
        }
    }

    // ── primitives ────────────────────────────────────────────────────────

    fn text(&mut self, start: &BytesStart<'_>) -> IoResult<String> {
        let text = self.reader.read_text(start.name())?;
        Ok(text.trim().to_owned())
    }

    fn skip(&mut self, start: &BytesStart<'_>) -> IoResult<()> {
        self.reader.read_to_end(start.name())?;
        Ok(())
    }

    /// Child element names of a container, consuming it entirely.
    fn collect_child_names(&mut self, outer: &[u8]) -> IoResult<Vec<String>> {
        let mut names = Vec::new();
        loop {
            match self.reader.read_event()? {
                Event::Start(e) => {
                    names.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                    self.skip(&e)?;
                }
                Event::Empty(e) => {
                    names.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                }
                Event::End(e) if e.name().as_ref() == outer => return Ok(names),
                Event::Eof => return Err(self.err("dataTypes", "unexpected end of document")),
                _ => {}
            }
        }
    }

    fn err(&self, element_path: &str, detail: &str) -> IoError {
        IoError::ModelParse {
            path: self.path.clone(),
            element_path: element_path.to_owned(),
            detail: detail.to_owned(),
        }
    }
}

/// Agent-variable references are written `a.name` in model files; bare
/// names and numeric literals are accepted as well.
fn parse_operand(raw: &str) -> Operand {
    match raw.strip_prefix("a.") {
        Some(var) => Operand::Var(var.to_owned()),
        None => Operand::parse(raw),
    }
}
