//! Error types for etos-script

use thiserror::Error;

/// Document loading error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Duplicate definition: {0}")]
    DuplicateDefinition(String),

    #[error(transparent)]
    Core(#[from] etos_core::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
