//! Ledger error types.

use chrono::{DateTime, Utc};
use thiserror::Error;
use weave_models::{GroupId, JobId, JobStatus, TransitionError};
use weave_storage::StorageError;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    /// A live job already occupies the `(group_id, window_start)` slot.
    #[error("Group {group_id} already has a {existing} job for window starting {window_start}")]
    Conflict {
        group_id: GroupId,
        window_start: DateTime<Utc>,
        existing: JobStatus,
        existing_id: Option<JobId>,
    },

    #[error("Job {id}: {source}")]
    InvalidTransition {
        id: JobId,
        #[source]
        source: TransitionError,
    },

    #[error("Corrupt ledger row: {0}")]
    CorruptRow(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Submission listing failed: {0}")]
    Storage(#[from] StorageError),
}

impl LedgerError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Connection-level failures worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Database(sqlx::Error::PoolTimedOut)
                | Self::Database(sqlx::Error::Io(_))
                | Self::Database(sqlx::Error::PoolClosed)
        )
    }
}
