use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
/// Errors raised while configuring, reading, writing, filtering or mapping CSV data.
pub enum CsvError {
    /// Invalid configuration, detected before any I/O takes place.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Malformed input or output detected at the given physical line.
    #[error("Format error at line {line}: {message}")]
    Format { line: usize, message: String },

    /// A header row is required but none was read.
    #[error("Missing header row")]
    MissingHeader,

    /// Unknown field or column referenced by a filter or a mapping.
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// A textual value could not be converted, or a value could not be rendered.
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// Operation attempted on a closed reader or writer.
    #[error("Stream closed")]
    Closed,

    #[error("Step {0} failed")]
    Step(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl CsvError {
    pub(crate) fn format(line: usize, message: impl Into<String>) -> Self {
        CsvError::Format {
            line,
            message: message.into(),
        }
    }
}
