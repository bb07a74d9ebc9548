//! Job payload for the queue.

use serde::{Deserialize, Serialize};
use weave_models::{CompilationJob, CompilationWindow, GroupId, JobId, WindowError};

/// Request to run the pipeline for one ledger row.
///
/// Wire form: `{"group_id": 7, "job_id": 12, "window_start": "2025-09-01T00:00:00Z", "window_end": "2025-09-07"}`.
/// `window_end` names the final calendar day; receivers widen bare dates and
/// midnight timestamps to the end of that day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileWindowJob {
    pub group_id: GroupId,
    pub job_id: JobId,
    pub window_start: String,
    pub window_end: String,
}

impl CompileWindowJob {
    pub fn new(group_id: GroupId, job_id: JobId, window: &CompilationWindow) -> Self {
        Self {
            group_id,
            job_id,
            window_start: window.payload_start(),
            window_end: window.payload_end(),
        }
    }

    /// Payload for an existing ledger row.
    pub fn for_job(job: &CompilationJob) -> Self {
        Self::new(job.group_id, job.id, &job.window())
    }

    /// Parse the window bounds.
    pub fn window(&self) -> Result<CompilationWindow, WindowError> {
        CompilationWindow::from_payload(&self.window_start, &self.window_end)
    }

    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("compile:{}", self.job_id)
    }
}
