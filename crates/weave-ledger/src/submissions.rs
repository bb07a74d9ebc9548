//! Submission repositories.
//!
//! The pipeline depends only on `SubmissionRepository`. Which source backs
//! it is decided once at startup from configuration.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::debug;

use weave_models::submission::sort_chronologically;
use weave_models::{CompilationWindow, GroupId, Submission, SubmissionId};
use weave_storage::{group_videos_prefix, ObjectStore};

use crate::error::LedgerResult;

#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    /// Point-in-time snapshot of a group's submissions inside `window`,
    /// ascending by `submitted_at`. Empty is a valid answer.
    async fn list_submissions(
        &self,
        group_id: GroupId,
        window: &CompilationWindow,
    ) -> LedgerResult<Vec<Submission>>;

    async fn count_submissions(&self, group_id: GroupId, window: &CompilationWindow) -> LedgerResult<usize> {
        Ok(self.list_submissions(group_id, window).await?.len())
    }
}

/// Lower-fidelity source that infers submissions from uploaded objects.
///
/// Uploads are found under `groups/{group_id}/videos/` and placed in the
/// window by their last-modified time. Owner, prompt and duration are unknown,
/// and ids are synthetic positions within the listing.
pub struct ObjectListingSubmissions {
    store: Arc<dyn ObjectStore>,
}

impl ObjectListingSubmissions {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SubmissionRepository for ObjectListingSubmissions {
    async fn list_submissions(
        &self,
        group_id: GroupId,
        window: &CompilationWindow,
    ) -> LedgerResult<Vec<Submission>> {
        let prefix = group_videos_prefix(group_id);
        let objects = self.store.list(&prefix).await?;
        let listed = objects.len();

        let mut in_window: Vec<(String, chrono::DateTime<chrono::Utc>)> = objects
            .into_iter()
            .filter(|o| !o.key.ends_with('/'))
            .filter_map(|o| {
                let modified = o.last_modified?;
                window.contains(modified).then_some((o.key, modified))
            })
            .collect();
        in_window.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        let submissions: Vec<Submission> = in_window
            .into_iter()
            .enumerate()
            .map(|(i, (key, modified))| Submission {
                id: SubmissionId(i as i64 + 1),
                owner_id: None,
                group_id,
                prompt_id: None,
                storage_key: key,
                duration_seconds: None,
                submitted_at: modified,
            })
            .collect();

        debug!(
            group_id = %group_id,
            listed,
            in_window = submissions.len(),
            "Listed submissions from object store"
        );
        Ok(submissions)
    }
}

/// Fixed submission set for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySubmissions {
    submissions: Mutex<Vec<Submission>>,
}

impl MemorySubmissions {
    pub fn new(submissions: Vec<Submission>) -> Self {
        Self {
            submissions: Mutex::new(submissions),
        }
    }

    pub fn push(&self, submission: Submission) {
        self.submissions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(submission);
    }
}

#[async_trait]
impl SubmissionRepository for MemorySubmissions {
    async fn list_submissions(
        &self,
        group_id: GroupId,
        window: &CompilationWindow,
    ) -> LedgerResult<Vec<Submission>> {
        let mut selected: Vec<Submission> = self
            .submissions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|s| s.group_id == group_id && window.contains(s.submitted_at))
            .cloned()
            .collect();
        sort_chronologically(&mut selected);
        Ok(selected)
    }
}
