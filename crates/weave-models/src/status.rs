//! Caller-facing job status.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{CompilationJob, GroupId, JobId, JobStatus};

/// Snapshot of a job returned by the status query.
///
/// `download_url` is only present for completed jobs and is generated on
/// read; it is never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobStatusView {
    pub id: JobId,
    pub group_id: GroupId,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl JobStatusView {
    /// Build a view without a download URL.
    pub fn from_job(job: &CompilationJob) -> Self {
        Self {
            id: job.id,
            group_id: job.group_id,
            window_start: job.window_start,
            window_end: job.window_end,
            status: job.status,
            created_at: job.created_at,
            completed_at: job.completed_at,
            download_url: None,
            reason: job.failure_reason.clone(),
        }
    }

    /// Attach a download URL. Ignored unless the job completed.
    pub fn with_download_url(mut self, url: Option<String>) -> Self {
        if self.status == JobStatus::Completed {
            self.download_url = url;
        }
        self
    }
}
