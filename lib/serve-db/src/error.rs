use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServeDbError>;

/// Why a serve file was refused.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON object at top level, got {found}")]
    NotAnObject { found: &'static str },

    #[error("expected \"serves\" key to contain a JSON list, instead it contains {found}")]
    ServesNotList { found: &'static str },

    #[error("expected a JSON object in the \"serves\" list at index {index}, instead received {value}")]
    RecordNotObject { index: usize, value: String },

    #[error("did not receive an expected (\"{field}\") key in serve record {index}")]
    MissingField { index: usize, field: &'static str },

    #[error("expected string value for key (\"{field}\") in serve record {index}")]
    NonStringField { index: usize, field: &'static str },
}

/// Operational failures of the store.
#[derive(Error, Debug)]
pub enum ServeDbError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid serve file: {0}")]
    Invalid(#[from] ValidationError),

    #[error("loaded serve file {} is invalid: {source}", path.display())]
    CorruptLoaded {
        path: PathBuf,
        #[source]
        source: ValidationError,
    },

    /// A failure raised while handling an earlier one. Both are kept.
    #[error("{error} (while handling: {nested})")]
    Nested {
        error: Box<ServeDbError>,
        nested: Box<ServeDbError>,
    },
}

impl ServeDbError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn nested(error: ServeDbError, nested: ServeDbError) -> Self {
        Self::Nested {
            error: Box::new(error),
            nested: Box::new(nested),
        }
    }
}
