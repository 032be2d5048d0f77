//! Output-format selection and plugin factories.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use xm_core::AgentSchema;
use xm_core::plugin::{PopulationReader, PopulationSink};

use crate::csv_pop::{CsvPopReader, CsvPopSink};
use crate::sqlite_pop::{SqlitePopReader, SqlitePopSink};
use crate::xml_pop::{XmlPopReader, XmlPopSink};

/// The population snapshot formats selectable at the CLI.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Xml,
    Csv,
    Sqlite,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "xml" => Ok(OutputFormat::Xml),
            "csv" => Ok(OutputFormat::Csv),
            "sqlite" => Ok(OutputFormat::Sqlite),
            other => Err(format!(
                "unknown output format {other:?} (expected xml, csv, or sqlite)"
            )),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutputFormat::Xml => "xml",
            OutputFormat::Csv => "csv",
            OutputFormat::Sqlite => "sqlite",
        };
        f.write_str(s)
    }
}

/// A snapshot writer for `format`, producing `<dir>/<base><iteration>.<ext>`
/// files.
pub fn make_sink(format: OutputFormat, dir: &Path, base: &str) -> Box<dyn PopulationSink> {
    match format {
        OutputFormat::Xml => Box::new(XmlPopSink::new(dir, base)),
        OutputFormat::Csv => Box::new(CsvPopSink::new(dir, base)),
        OutputFormat::Sqlite => Box::new(SqlitePopSink::new(dir, base)),
    }
}

/// A population reader chosen by file extension (`.csv`, `.sqlite`/`.db`,
/// anything else reads as XML).
pub fn reader_for_path(path: &Path, schema: AgentSchema) -> Box<dyn PopulationReader> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
    {
        "csv" => Box::new(CsvPopReader::new(schema)),
        "sqlite" | "db" => Box::new(SqlitePopReader::new(schema)),
        _ => Box::new(XmlPopReader::new(schema)),
    }
}
