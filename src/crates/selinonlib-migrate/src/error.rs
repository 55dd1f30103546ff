//! Error taxonomy for the migration engine, mirroring the style of
//! `selinonlib_core::error` (one enum, `thiserror`, helper constructors for
//! the variants that need formatting).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MigrateError>;

#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("migration filename '{0}' is not of the form '{{number}}.json'")]
    InvalidFilename(String),

    #[error("no migration found for flow '{0}'")]
    UnknownFlow(String),

    /// A message claims a config version newer than any migration on disk —
    /// it was compiled against a config this migration chain doesn't know
    /// about yet.
    #[error("message is ahead of the migration chain: {0}")]
    Skew(String),

    #[error(transparent)]
    Core(#[from] selinonlib_core::SelinonError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
