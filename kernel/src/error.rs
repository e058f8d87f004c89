//! The error type returned from every fallible entry point in this crate.
//!
//! Input errors (malformed JSON, bad schema, missing table) and programmer
//! errors (non-contiguous version application) share one enum; I/O errors
//! from injected collaborators are wrapped so the underlying cause survives.

use std::sync::Arc;

/// Convenience alias used throughout the crate.
pub type DeltaResult<T> = Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// No commits and no checkpoint were found for a table (`version < 0`).
    #[error("table not found at '{0}'")]
    TableNotFound(String),

    /// A schema string failed to parse, or violated a schema invariant
    /// (decimal precision/scale out of range, duplicate struct field names).
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// An action record was malformed, had more than one variant populated,
    /// or was missing a required field.
    #[error("invalid action record: {0}")]
    CodecError(String),

    /// A programmer error: `apply` was called out of order, or an encoder
    /// was asked to serialize an action with more than one variant set.
    #[error("engine invariant violated: {0}")]
    EngineInvariantViolation(String),

    /// A row accessor was asked for a column that does not exist in the
    /// record's schema.
    #[error("column not found: {0}")]
    ColumnNotFound(String),

    /// A row accessor was called with a getter that doesn't match the
    /// column's declared type.
    #[error("type mismatch for column '{name}': expected {expected}, found {actual}")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// A schema or configuration value names a type this reader doesn't
    /// implement.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// A path or table-root string did not parse as a URI.
    #[error("invalid URI: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Propagated from a `serde_json` call outside the action/schema codecs
    /// proper (e.g. encoding a snapshot's metadata for display).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Propagated as-is from an injected file-store/column-reader
    /// collaborator; the original cause is preserved.
    #[error("I/O error: {0}")]
    Io(#[source] Arc<std::io::Error>),

    /// A catch-all for conditions that don't fit the taxonomy above, e.g.
    /// unrecognized configuration values.
    #[error("{0}")]
    Generic(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl Error {
    pub fn generic(msg: impl Into<String>) -> Self {
        Error::Generic(msg.into())
    }

    pub fn invalid_schema(msg: impl Into<String>) -> Self {
        Error::InvalidSchema(msg.into())
    }

    pub fn codec(msg: impl Into<String>) -> Self {
        Error::CodecError(msg.into())
    }
}
