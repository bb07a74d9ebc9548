//! The job ledger contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use weave_models::{CompilationJob, GroupId, JobId, NewCompilationJob};

use crate::error::LedgerResult;

/// Persisted record of compilation attempts.
///
/// Rows move `pending -> processing -> {completed, failed}` and never leave a
/// terminal state. `create_pending` is the only way rows come into existence
/// and it atomically refuses a second live row for the same
/// `(group_id, window_start)`.
#[async_trait]
pub trait JobLedger: Send + Sync {
    /// Insert a `pending` row, or `LedgerError::Conflict` if the window is taken.
    async fn create_pending(&self, job: NewCompilationJob) -> LedgerResult<CompilationJob>;

    async fn get(&self, id: JobId) -> LedgerResult<CompilationJob>;

    /// The live (pending, processing or completed) row for a window, if any.
    async fn find_live(
        &self,
        group_id: GroupId,
        window_start: DateTime<Utc>,
    ) -> LedgerResult<Option<CompilationJob>>;

    /// `pending -> processing`, stamping `started_at`.
    async fn mark_processing(&self, id: JobId) -> LedgerResult<CompilationJob>;

    /// `processing -> completed`, recording the result key and `completed_at`.
    async fn complete(&self, id: JobId, result_key: &str) -> LedgerResult<CompilationJob>;

    /// `pending | processing -> failed`, recording the reason and `completed_at`.
    async fn fail(&self, id: JobId, reason: &str) -> LedgerResult<CompilationJob>;

    /// Unfinished rows whose activity started before `cutoff`.
    async fn list_stale(&self, cutoff: DateTime<Utc>) -> LedgerResult<Vec<CompilationJob>>;
}
