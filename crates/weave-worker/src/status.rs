//! Job status query for the HTTP layer and the CLI.

use std::sync::Arc;

use weave_ledger::{JobLedger, LedgerResult};
use weave_models::{JobId, JobStatus, JobStatusView};
use weave_storage::{ObjectStore, DOWNLOAD_URL_TTL};

pub struct JobStatusService {
    ledger: Arc<dyn JobLedger>,
    store: Arc<dyn ObjectStore>,
}

impl JobStatusService {
    pub fn new(ledger: Arc<dyn JobLedger>, store: Arc<dyn ObjectStore>) -> Self {
        Self { ledger, store }
    }

    /// Current state of a job. Completed jobs get a freshly signed download
    /// URL valid for one hour; nothing is written back.
    pub async fn status(&self, job_id: JobId) -> LedgerResult<JobStatusView> {
        let job = self.ledger.get(job_id).await?;
        let url = match (&job.status, &job.result_key) {
            (JobStatus::Completed, Some(key)) => Some(self.store.sign_get(key, DOWNLOAD_URL_TTL).await?),
            _ => None,
        };
        Ok(JobStatusView::from_job(&job).with_download_url(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use weave_ledger::{LedgerError, MemoryLedger};
    use weave_models::{CompilationWindow, GroupId, NewCompilationJob};
    use weave_storage::InMemoryObjectStore;

    fn week() -> CompilationWindow {
        CompilationWindow::starting_on(NaiveDate::from_ymd_opt(2025, 9, 1).unwrap())
    }

    #[tokio::test]
    async fn test_download_url_only_for_completed() {
        let ledger = Arc::new(MemoryLedger::new());
        let service = JobStatusService::new(ledger.clone(), Arc::new(InMemoryObjectStore::new()));
        let job = ledger.create_pending(NewCompilationJob::new(GroupId(7), week())).await.unwrap();

        let pending = service.status(job.id).await.unwrap();
        assert_eq!(pending.status, JobStatus::Pending);
        assert!(pending.download_url.is_none());

        ledger.mark_processing(job.id).await.unwrap();
        ledger.complete(job.id, "compilations/7/20250901_compilation.mp4").await.unwrap();

        let done = service.status(job.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(
            done.download_url.as_deref(),
            Some("memory://compilations/7/20250901_compilation.mp4?expires_in=3600")
        );
        assert!(done.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_job_reports_reason() {
        let ledger = Arc::new(MemoryLedger::new());
        let service = JobStatusService::new(ledger.clone(), Arc::new(InMemoryObjectStore::new()));
        let job = ledger.create_pending(NewCompilationJob::new(GroupId(9), week())).await.unwrap();
        ledger.mark_processing(job.id).await.unwrap();
        ledger.fail(job.id, "no submissions").await.unwrap();

        let view = service.status(job.id).await.unwrap();
        assert_eq!(view.reason.as_deref(), Some("no submissions"));
        assert!(view.download_url.is_none());

        assert!(matches!(
            service.status(JobId(99)).await,
            Err(LedgerError::NotFound(JobId(99)))
        ));
    }
}
