use std::path::PathBuf;
use thiserror::Error;

/// Malformed user input in a literal or an advanced query. Fatal to the
/// command invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid number literal: '{0}'")]
    InvalidLiteral(String),

    #[error("Invalid advanced query: '{0}' (expected key:value)")]
    MissingDelimiter(String),

    #[error("Invalid key in advanced query: '{0}'")]
    InvalidKey(String),

    #[error("Invalid query key for {entity}: {key}")]
    KeyNotAllowed { key: char, entity: &'static str },

    #[error("Invalid value for key: {0}")]
    MissingValue(char),

    #[error("Invalid modifier: {0}")]
    UnknownModifier(String),

    #[error("Invalid parameter size: '{0}'")]
    InvalidParamSize(String),

    #[error("Invalid class pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Rejected flag combination, reported before any archive is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct UsageError(pub String);

impl UsageError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// A search session was driven out of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EngineStateError {
    #[error("Engine is not initialized")]
    NotInitialized,

    #[error("Engine is already initialized")]
    AlreadyInitialized,
}

/// Failures reported by a search engine while processing one archive.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to load archive '{}': {reason}", .path.display())]
    Load { path: PathBuf, reason: String },

    #[error("Resource id couldn't retrieve: {0}")]
    ResourceId(String),

    #[error("Unsupported by this engine: {0}")]
    Unsupported(String),
}

/// The output directory of one archive could not be prepared.
#[derive(Debug, Error)]
pub enum OutputDirectoryError {
    #[error("Failed to overwrite: {}: {source}", .path.display())]
    Clear {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create output directory: {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
