//! Compilation job records and their state machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::{CompilationWindow, GroupId, JobId, MusicTrackId};

/// Status of a compilation job.
///
/// `pending -> processing -> {completed, failed}`. A job row never leaves a
/// terminal state; retries get a fresh row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Row created, not yet picked up by a worker
    #[default]
    Pending,
    /// A worker is running the pipeline
    Processing,
    /// Result published
    Completed,
    /// Run ended without a result (including empty windows)
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether a row in this status occupies its `(group_id, window_start)` slot.
    ///
    /// Only failed rows free the slot for a new attempt.
    pub fn holds_window(&self) -> bool {
        !matches!(self, JobStatus::Failed)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }

    /// Validate a transition, returning the target status on success.
    pub fn transition(self, next: JobStatus) -> Result<JobStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError { from: self, to: next })
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[derive(Debug, Error)]
#[error("unknown job status: {0}")]
pub struct UnknownStatus(pub String);

/// Rejected state machine transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid job transition {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// A row of the compilation job ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CompilationJob {
    pub id: JobId,
    pub group_id: GroupId,
    pub window_start: DateTime<Utc>,
    /// Exclusive end of the window (`window_start + 7 days`)
    pub window_end: DateTime<Utc>,
    pub status: JobStatus,
    pub result_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music_track_id: Option<MusicTrackId>,
    /// Operator-facing reason for a failed job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    /// When the job entered `processing`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CompilationJob {
    pub fn window(&self) -> CompilationWindow {
        CompilationWindow::new(self.window_start, self.window_end)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Timestamp the staleness of a non-terminal job is measured from.
    pub fn active_since(&self) -> DateTime<Utc> {
        self.started_at.unwrap_or(self.created_at)
    }

    /// Check if a non-terminal job has been active longer than `threshold_secs`.
    pub fn is_stale(&self, now: DateTime<Utc>, threshold_secs: i64) -> bool {
        !self.is_terminal() && (now - self.active_since()).num_seconds() > threshold_secs
    }
}

/// Insert request for a new `pending` ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCompilationJob {
    pub group_id: GroupId,
    pub window: CompilationWindow,
    pub music_track_id: Option<MusicTrackId>,
}

impl NewCompilationJob {
    pub fn new(group_id: GroupId, window: CompilationWindow) -> Self {
        Self {
            group_id,
            window,
            music_track_id: None,
        }
    }

    pub fn with_music_track(mut self, track: Option<MusicTrackId>) -> Self {
        self.music_track_id = track;
        self
    }
}
