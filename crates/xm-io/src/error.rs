//! Error type for model parsing and plugin construction.
//!
//! Population *read* failures use `xm_core::PopReadError` (the kinds are
//! shared with every plugin and mapped to distinct CLI exit codes);
//! population *write* failures use `xm_core::SinkError`.  This enum covers
//! the rest: model-file parsing and backend setup.

use thiserror::Error;

/// Errors raised while parsing a model file or opening a backend.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("model file not found: {path}")]
    MissingFile { path: String },

    #[error("malformed model file {path} at {element_path}: {detail}")]
    ModelParse {
        path: String,
        element_path: String,
        detail: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Shorthand result type for this crate.
pub type IoResult<T> = Result<T, IoError>;
