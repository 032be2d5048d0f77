//! `xm-io` — external-interface collaborators of the `rust_xm` core.
//!
//! The execution engine interacts with files only through this crate: the
//! `xmodel` version-2 model parser and the population reader/writer plugins.
//! Plugins implement the `xm-core` contracts (`PopulationReader`,
//! `PopulationSink`) and discover the memory layout through the agent
//! schema.
//!
//! # Crate layout
//!
//! | Module       | Contents                                            |
//! |--------------|-----------------------------------------------------|
//! | [`xml_model`]| `xmodel` v2 parser producing an `xm_model::ModelDef` |
//! | [`xml_pop`]  | `states`/`itno`/`xagent` population reader + writer  |
//! | [`csv_pop`]  | Agent-name-first CSV population reader + writer      |
//! | [`sqlite_pop`]| Table-per-agent SQLite population reader + writer   |
//! | [`format`]   | `OutputFormat` selection and plugin factories        |

pub mod csv_pop;
pub mod error;
pub mod format;
pub mod sqlite_pop;
pub mod xml_model;
pub mod xml_pop;

mod buffer;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use csv_pop::{CsvPopReader, CsvPopSink};
pub use error::{IoError, IoResult};
pub use format::{OutputFormat, make_sink, reader_for_path};
pub use sqlite_pop::{SqlitePopReader, SqlitePopSink};
pub use xml_model::parse_model_file;
pub use xml_pop::{XmlPopReader, XmlPopSink};
