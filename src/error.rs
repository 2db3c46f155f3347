use std::path::PathBuf;
use thiserror::Error;

/// Error taxonomy shared by the query builder, executor, rule evaluator and
/// pipeline. Expected failure modes are variants here; `anyhow` stays at the
/// CLI edges.
#[derive(Debug, Error)]
pub enum MetricError {
    #[error("{0}")]
    InvalidArgument(String),

    /// Strict template resolution hit a placeholder whose context value is
    /// absent. `what` is the human description of the placeholder.
    #[error("Missing required {what} for SQL template")]
    MissingContextValue { what: &'static str },

    /// A write holds the store; reads fail fast instead of queuing.
    #[error("database is busy with a write operation")]
    DatabaseBusy,

    /// Read-only open attempted before any write created the store file.
    #[error("metric store not initialized at {}", .0.display())]
    StoreNotInitialized(PathBuf),

    #[error("database error: {0}")]
    Database(String),

    #[error("{0}")]
    Format(String),

    #[error("evaluation cancelled")]
    Cancelled,

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl From<rusqlite::Error> for MetricError {
    fn from(err: rusqlite::Error) -> Self {
        MetricError::Database(err.to_string())
    }
}

impl From<r2d2::Error> for MetricError {
    fn from(err: r2d2::Error) -> Self {
        MetricError::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MetricError>;
