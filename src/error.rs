use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while resolving inputs and planning operations.
///
/// Every variant is fatal for the whole batch: planning stops before any
/// filesystem action runs.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("invalid glob pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("invalid output template: {0}")]
    Template(String),
    #[error("failed to render output for {input}: {message}")]
    Render { input: PathBuf, message: String },
    #[error("output template rendered an empty path for {0}")]
    EmptyOutput(PathBuf),
    #[error("cannot resolve {path}: {source}")]
    Path {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the persistent batch/operation log.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("record encoding: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot locate the home directory")]
    NoHome,
    #[error("batch {0} not found")]
    BatchNotFound(u64),
    #[error("batch {id} ({kind}) cannot be undone")]
    NotUndoable { id: u64, kind: String },
    #[error("favorite with name {0} already exists")]
    FavoriteExists(String),
    #[error("favorite {0} not found")]
    FavoriteNotFound(String),
}

/// Errors raised by an interactive prompt.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt aborted")]
    Aborted,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Flatten a `tera` error and its sources into one line.
///
/// `tera` keeps the useful detail (line, column, missing variable) in the
/// source chain, not in the top-level message.
pub(crate) fn tera_message(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

/// Errors raised while parsing an operation-id selection such as `3,5,8`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("`{0}` is not a comma-separated list of operation ids")]
    Malformed(String),
    #[error("operation {0} does not belong to this batch")]
    UnknownOperation(u64),
}
