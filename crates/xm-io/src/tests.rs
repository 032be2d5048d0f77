//! Unit tests for xm-io.

#[cfg(test)]
mod support {
    use xm_core::{AgentSchema, PopReadError, ScalarType};

    /// Schema with one `Circle` agent: `x_int:int`, `y_dbl:double`.
    pub fn circle_schema() -> AgentSchema {
        let mut schema = AgentSchema::new();
        schema.insert(
            "Circle".to_owned(),
            vec![
                (ScalarType::Int, "x_int".to_owned()),
                (ScalarType::Double, "y_dbl".to_owned()),
            ],
        );
        schema
    }

    /// Drive a reader and collect `(agent, var, value-as-f64)` triples.
    pub fn collect(
        reader: &mut dyn xm_core::plugin::PopulationReader,
        path: &std::path::Path,
    ) -> Result<(u64, Vec<(String, String, f64)>), PopReadError> {
        let mut got: Vec<(String, String, f64)> = Vec::new();
        let mut ints = Vec::new();
        let mut add_int = |agent: &str, var: &str, v: i64| {
            ints.push((agent.to_owned(), var.to_owned(), v as f64));
            Ok(())
        };
        let mut doubles = Vec::new();
        let mut add_double = |agent: &str, var: &str, v: f64| {
            doubles.push((agent.to_owned(), var.to_owned(), v));
            Ok(())
        };
        let iteration = reader.read_pop(path, &mut add_int, &mut add_double)?;
        got.extend(ints);
        got.extend(doubles);
        Ok((iteration, got))
    }
}

#[cfg(test)]
mod xml_model {
    use std::io::Write;

    use xm_core::ScalarType;
    use xm_model::{CompareOp, Condition, Operand};

    use crate::{IoError, parse_model_file};

    fn parse(text: &str) -> Result<xm_model::ModelDef, IoError> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        parse_model_file(file.path())
    }

    const CIRCLES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xmodel version="2">
  <name>circles</name>
  <version>01</version>
  <author>test</author>
  <description>moving circles</description>
  <environment>
    <constants>
      <variable><type>double</type><name>radius</name></variable>
    </constants>
    <timeUnits>
      <timeUnit><name>daily</name><unit>iteration</unit><period>1</period></timeUnit>
    </timeUnits>
    <functionFiles>
      <file>functions.c</file>
    </functionFiles>
  </environment>
  <agents>
    <xagent>
      <name>Circle</name>
      <memory>
        <variable><type>int</type><name>x_int</name></variable>
        <variable><type>double</type><name>y_dbl</name></variable>
      </memory>
      <functions>
        <function>
          <name>move</name>
          <currentState>start</currentState>
          <nextState>end</nextState>
          <condition>
            <lhs><value>a.x_int</value></lhs>
            <op>GT</op>
            <rhs><value>0</value></rhs>
          </condition>
          <inputs>
            <input><messageName>location</messageName></input>
          </inputs>
          <outputs>
            <output><messageName>location</messageName></output>
          </outputs>
          <memoryAccess>
            <readOnly><variableName>x_int</variableName></readOnly>
            <readWrite><variableName>y_dbl</variableName></readWrite>
          </memoryAccess>
        </function>
      </functions>
    </xagent>
  </agents>
  <messages>
    <message>
      <name>location</name>
      <variables>
        <variable><type>double</type><name>x</name></variable>
      </variables>
    </message>
  </messages>
</xmodel>
"#;

    #[test]
    fn full_model_parses() {
        let model = parse(CIRCLES).unwrap();
        assert_eq!(model.name, "circles");
        assert_eq!(model.constants.len(), 1);
        assert_eq!(model.time_units[0].period, 1);
        assert_eq!(model.function_files, vec!["functions.c".to_owned()]);

        let agent = &model.agents[0];
        assert_eq!(agent.name, "Circle");
        assert_eq!(agent.vars[0].scalar, ScalarType::Int);
        let function = &agent.functions[0];
        assert_eq!(function.current_state, "start");
        assert_eq!(function.inputs, vec!["location".to_owned()]);
        assert_eq!(function.outputs, vec!["location".to_owned()]);
        assert_eq!(function.read_only, vec!["x_int".to_owned()]);
        assert_eq!(function.read_write, vec!["y_dbl".to_owned()]);
        assert_eq!(
            function.condition,
            Some(Condition::Compare {
                lhs: Operand::Var("x_int".to_owned()),
                op: CompareOp::Gt,
                rhs: Operand::Int(0),
            })
        );

        assert_eq!(model.messages[0].name, "location");
        assert_eq!(model.messages[0].vars[0].name, "x");
    }

    #[test]
    fn nested_and_time_conditions_parse() {
        let text = CIRCLES.replace(
            "<condition>\n            <lhs><value>a.x_int</value></lhs>\n            <op>GT</op>\n            <rhs><value>0</value></rhs>\n          </condition>",
            "<condition>\n            <lhs><condition><lhs><value>a.x_int</value></lhs><op>GT</op><rhs><value>0</value></rhs></condition></lhs>\n            <op>AND</op>\n            <rhs><condition><not><condition><time><period>daily</period><phase>1</phase></time></condition></not></condition></rhs>\n          </condition>",
        );
        let model = parse(&text).unwrap();
        let condition = model.agents[0].functions[0].condition.as_ref().unwrap();
        assert!(condition.uses_time());
        match condition {
            Condition::Nested { op, rhs, .. } => {
                assert_eq!(*op, xm_model::LogicOp::And);
                assert!(matches!(**rhs, Condition::Not(_)));
            }
            other => panic!("expected nested condition, got {other}"),
        }
    }

    #[test]
    fn wrong_version_rejected() {
        let text = CIRCLES.replace("version=\"2\"", "version=\"1\"");
        assert!(matches!(parse(&text), Err(IoError::ModelParse { .. })));
    }

    #[test]
    fn declared_data_types_rejected() {
        let text = CIRCLES.replace(
            "<functionFiles>",
            "<dataTypes><dataType><name>pair</name></dataType></dataTypes><functionFiles>",
        );
        let err = parse(&text).unwrap_err();
        assert!(err.to_string().contains("data types"), "{err}");
    }

    #[test]
    fn missing_file_is_distinct() {
        let err = parse_model_file(std::path::Path::new("/nonexistent/model.xml")).unwrap_err();
        assert!(matches!(err, IoError::MissingFile { .. }));
    }

    #[test]
    fn unsupported_variable_type_rejected() {
        let text = CIRCLES.replace(
            "<variable><type>int</type><name>x_int</name></variable>",
            "<variable><type>int[8]</type><name>x_int</name></variable>",
        );
        let err = parse(&text).unwrap_err();
        assert!(err.to_string().contains("unsupported variable type"), "{err}");
    }
}

#[cfg(test)]
mod xml_pop {
    use std::io::Write;
    use std::path::Path;

    use xm_core::plugin::PopulationSink;
    use xm_core::{ColumnView, PopReadError};

    use super::support::{circle_schema, collect};
    use crate::{XmlPopReader, XmlPopSink};

    fn read(text: &str) -> Result<(u64, Vec<(String, String, f64)>), PopReadError> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        let mut reader = XmlPopReader::new(circle_schema());
        collect(&mut reader, file.path())
    }

    const POP: &str = r#"<states>
<itno>0</itno>
<xagent><name>Circle</name><x_int>1</x_int><y_dbl>2.5</y_dbl></xagent>
<xagent><name>Circle</name><x_int>2</x_int><y_dbl>5.0</y_dbl></xagent>
</states>
"#;

    #[test]
    fn happy_path_reads_in_order() {
        let (iteration, values) = read(POP).unwrap();
        assert_eq!(iteration, 0);
        let xs: Vec<f64> = values
            .iter()
            .filter(|(_, var, _)| var == "x_int")
            .map(|(_, _, v)| *v)
            .collect();
        assert_eq!(xs, vec![1.0, 2.0]);
        let ys: Vec<f64> = values
            .iter()
            .filter(|(_, var, _)| var == "y_dbl")
            .map(|(_, _, v)| *v)
            .collect();
        assert_eq!(ys, vec![2.5, 5.0]);
    }

    #[test]
    fn bad_cast_names_the_element_path() {
        let text = POP.replace("<x_int>1</x_int>", "<x_int>abc</x_int>");
        let err = read(&text).unwrap_err();
        match err {
            PopReadError::BadCast {
                element_path,
                value,
                ..
            } => {
                assert_eq!(element_path, "states/xagent[1]/x_int");
                assert_eq!(value, "abc");
            }
            other => panic!("expected BadCast, got {other}"),
        }
    }

    #[test]
    fn unknown_agent_is_distinct() {
        let text = POP.replace("<name>Circle</name>", "<name>Square</name>");
        assert!(matches!(
            read(&text).unwrap_err(),
            PopReadError::UnknownAgent { .. }
        ));
    }

    #[test]
    fn unknown_variable_is_distinct() {
        let text = POP.replace("<x_int>1</x_int>", "<ghost>1</ghost>");
        assert!(matches!(
            read(&text).unwrap_err(),
            PopReadError::UnknownVariable { .. }
        ));
    }

    #[test]
    fn missing_variable_is_malformed() {
        let text = POP.replace("<y_dbl>2.5</y_dbl>", "");
        assert!(matches!(
            read(&text).unwrap_err(),
            PopReadError::Malformed { .. }
        ));
    }

    #[test]
    fn truncated_document_is_malformed() {
        let text = POP.replace("</states>", "");
        assert!(matches!(
            read(&text).unwrap_err(),
            PopReadError::Malformed { .. }
        ));
    }

    #[test]
    fn missing_file_is_distinct() {
        let mut reader = XmlPopReader::new(circle_schema());
        let err = collect(&mut reader, Path::new("/nonexistent/pop.xml")).unwrap_err();
        assert!(matches!(err, PopReadError::MissingFile { .. }));
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = XmlPopSink::new(dir.path(), "pop_");
        sink.set_schema(circle_schema());
        sink.init_write(3).unwrap();
        sink.write_column("Circle", "x_int", ColumnView::Int(&[7, 8]))
            .unwrap();
        sink.write_column("Circle", "y_dbl", ColumnView::Double(&[0.5, 1.5]))
            .unwrap();
        sink.finalize_write().unwrap();

        let mut reader = XmlPopReader::new(circle_schema());
        let (iteration, values) = collect(&mut reader, &dir.path().join("pop_3.xml")).unwrap();
        assert_eq!(iteration, 3);
        assert_eq!(values.len(), 4);
        assert!(values.contains(&("Circle".to_owned(), "x_int".to_owned(), 7.0)));
        assert!(values.contains(&("Circle".to_owned(), "y_dbl".to_owned(), 1.5)));
    }
}

#[cfg(test)]
mod csv_pop {
    use std::io::Write;

    use xm_core::plugin::PopulationSink;
    use xm_core::{ColumnView, PopReadError};

    use super::support::{circle_schema, collect};
    use crate::{CsvPopReader, CsvPopSink};

    #[test]
    fn read_agent_name_first_records() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Circle,1,2.5").unwrap();
        writeln!(file, "Circle,2,5.0").unwrap();
        let mut reader = CsvPopReader::new(circle_schema());
        let (_, values) = collect(&mut reader, file.path()).unwrap();
        assert_eq!(values.len(), 4);
    }

    #[test]
    fn unknown_agent_and_bad_cast_are_distinct() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Square,1,2.5").unwrap();
        let mut reader = CsvPopReader::new(circle_schema());
        assert!(matches!(
            collect(&mut reader, file.path()).unwrap_err(),
            PopReadError::UnknownAgent { .. }
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Circle,abc,2.5").unwrap();
        let mut reader = CsvPopReader::new(circle_schema());
        assert!(matches!(
            collect(&mut reader, file.path()).unwrap_err(),
            PopReadError::BadCast { .. }
        ));
    }

    #[test]
    fn short_record_is_malformed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Circle,1").unwrap();
        let mut reader = CsvPopReader::new(circle_schema());
        assert!(matches!(
            collect(&mut reader, file.path()).unwrap_err(),
            PopReadError::Malformed { .. }
        ));
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvPopSink::new(dir.path(), "pop_");
        sink.set_schema(circle_schema());
        sink.init_write(1).unwrap();
        sink.write_column("Circle", "x_int", ColumnView::Int(&[4]))
            .unwrap();
        sink.write_column("Circle", "y_dbl", ColumnView::Double(&[9.25]))
            .unwrap();
        sink.finalize_write().unwrap();

        let mut reader = CsvPopReader::new(circle_schema());
        let (_, values) = collect(&mut reader, &dir.path().join("pop_1.csv")).unwrap();
        assert!(values.contains(&("Circle".to_owned(), "x_int".to_owned(), 4.0)));
        assert!(values.contains(&("Circle".to_owned(), "y_dbl".to_owned(), 9.25)));
    }
}

#[cfg(test)]
mod sqlite_pop {
    use xm_core::plugin::PopulationSink;
    use xm_core::{ColumnView, PopReadError};

    use super::support::{circle_schema, collect};
    use crate::{SqlitePopReader, SqlitePopSink};

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = SqlitePopSink::new(dir.path(), "pop_");
        sink.set_schema(circle_schema());
        sink.init_write(2).unwrap();
        sink.write_column("Circle", "x_int", ColumnView::Int(&[10, 20]))
            .unwrap();
        sink.write_column("Circle", "y_dbl", ColumnView::Double(&[0.25, 0.75]))
            .unwrap();
        sink.finalize_write().unwrap();

        let mut reader = SqlitePopReader::new(circle_schema());
        let (iteration, values) =
            collect(&mut reader, &dir.path().join("pop_2.sqlite")).unwrap();
        assert_eq!(iteration, 2);
        assert_eq!(values.len(), 4);
        assert!(values.contains(&("Circle".to_owned(), "x_int".to_owned(), 20.0)));
        assert!(values.contains(&("Circle".to_owned(), "y_dbl".to_owned(), 0.25)));
    }

    #[test]
    fn missing_file_is_distinct() {
        let mut reader = SqlitePopReader::new(circle_schema());
        let err = collect(&mut reader, std::path::Path::new("/nonexistent/pop.sqlite"))
            .unwrap_err();
        assert!(matches!(err, PopReadError::MissingFile { .. }));
    }
}

#[cfg(test)]
mod format {
    use std::str::FromStr;

    use crate::OutputFormat;

    #[test]
    fn parse_and_display() {
        assert_eq!(OutputFormat::from_str("xml").unwrap(), OutputFormat::Xml);
        assert_eq!(OutputFormat::from_str("csv").unwrap(), OutputFormat::Csv);
        assert_eq!(
            OutputFormat::from_str("sqlite").unwrap(),
            OutputFormat::Sqlite
        );
        assert!(OutputFormat::from_str("hdf5").is_err());
        assert_eq!(OutputFormat::Sqlite.to_string(), "sqlite");
    }
}
