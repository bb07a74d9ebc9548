//! Worker error types.

use std::fmt;

use thiserror::Error;
use weave_ledger::LedgerError;
use weave_media::MediaError;
use weave_models::{GroupId, JobId};
use weave_queue::QueueError;
use weave_storage::StorageError;

pub type WorkerResult<T> = Result<T, WorkerError>;
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Ledger reason for a window with nothing to compile.
pub const REASON_NO_SUBMISSIONS: &str = "no submissions";
/// Ledger reason written by the stale-job sweeper.
pub const REASON_TIMED_OUT: &str = "timed out";
/// Ledger reason when a created job could not be handed to the queue.
pub const REASON_DISPATCH_FAILED: &str = "dispatch failed";

/// Pipeline stage, for error attribution and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Select,
    Materialize,
    Decorate,
    Compile,
    Score,
    Publish,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Select => "select",
            Stage::Materialize => "materialize",
            Stage::Decorate => "decorate",
            Stage::Compile => "compile",
            Stage::Score => "score",
            Stage::Publish => "publish",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by one pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Source object not found: {key}")]
    NotFound { key: String },

    #[error("Storage failure during {stage}: {source}")]
    Storage {
        stage: Stage,
        #[source]
        source: StorageError,
    },

    #[error("Transcode failed during {stage}: {message}")]
    Transcode {
        stage: Stage,
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// The submission repository could not list the window.
    #[error("Submission source error: {0}")]
    Submissions(#[source] LedgerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn storage(stage: Stage, source: StorageError) -> Self {
        match source {
            StorageError::NotFound(key) => Self::NotFound { key },
            source => Self::Storage { stage, source },
        }
    }

    pub fn transcode(stage: Stage, err: MediaError) -> Self {
        Self::Transcode {
            stage,
            message: err.to_string(),
            stderr: err.stderr().map(str::to_string),
            exit_code: err.exit_code(),
        }
    }

    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Input(_) => "input",
            PipelineError::NotFound { .. } => "not_found",
            PipelineError::Storage { .. } => "storage",
            PipelineError::Transcode { .. } => "transcode",
            PipelineError::Ledger(_) => "ledger",
            PipelineError::Submissions(_) => "submission_source",
            PipelineError::Io(_) => "io",
        }
    }

    /// Reason written to the ledger. Never includes tool stderr.
    pub fn failure_reason(&self) -> String {
        match self {
            PipelineError::Input(msg) => format!("invalid input: {}", msg),
            PipelineError::NotFound { key } => format!("source video missing: {}", key),
            PipelineError::Storage { stage, .. } => format!("storage failure during {}", stage),
            PipelineError::Transcode { stage, exit_code, .. } => match exit_code {
                Some(code) => format!("transcode failed during {} (exit {})", stage, code),
                None => format!("transcode failed during {}", stage),
            },
            PipelineError::Ledger(_) => "ledger unavailable".to_string(),
            PipelineError::Submissions(_) => "submission source unavailable".to_string(),
            PipelineError::Io(_) => "local io failure".to_string(),
        }
    }

    /// Whether another delivery of the same message could succeed.
    ///
    /// Only ledger connectivity problems qualify; every other failure has
    /// already moved the row to a terminal state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::Ledger(e) if e.is_transient())
    }
}

/// Errors from the manual and scheduled triggers.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Dispatch of job {job_id} for group {group_id} failed: {source}")]
    Dispatch {
        job_id: JobId,
        group_id: GroupId,
        #[source]
        source: QueueError,
    },
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Trigger error: {0}")]
    Trigger(#[from] TriggerError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcode_reason_hides_stderr() {
        let err = PipelineError::transcode(
            Stage::Compile,
            MediaError::ffmpeg_failed("concat failed", Some("Invalid data found".to_string()), Some(1)),
        );
        assert_eq!(err.kind(), "transcode");
        assert_eq!(err.failure_reason(), "transcode failed during compile (exit 1)");
        assert!(!err.failure_reason().contains("Invalid data"));
        match err {
            PipelineError::Transcode { stderr, .. } => assert_eq!(stderr.as_deref(), Some("Invalid data found")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_missing_object_is_not_found() {
        let err = PipelineError::storage(Stage::Materialize, StorageError::not_found("groups/7/videos/a.mp4"));
        assert_eq!(err.kind(), "not_found");
        assert_eq!(err.failure_reason(), "source video missing: groups/7/videos/a.mp4");

        let err = PipelineError::storage(Stage::Publish, StorageError::upload_failed("503"));
        assert_eq!(err.kind(), "storage");
        assert_eq!(err.failure_reason(), "storage failure during publish");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_terminal_failures_do_not_retry() {
        assert!(!PipelineError::input("bad window").is_retryable());
        assert!(!PipelineError::Ledger(LedgerError::NotFound(JobId(1))).is_retryable());
        assert!(!PipelineError::Ledger(LedgerError::config("missing url")).is_retryable());
    }

    #[test]
    fn test_submission_source_failure_is_not_blamed_on_ledger() {
        let err = PipelineError::Submissions(LedgerError::Storage(StorageError::ListFailed(
            "bucket unreachable".to_string(),
        )));
        assert_eq!(err.kind(), "submission_source");
        assert_eq!(err.failure_reason(), "submission source unavailable");
        assert!(!err.is_retryable());
    }
}
