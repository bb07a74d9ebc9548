//! In-memory ledger.
//!
//! Same semantics as the Postgres ledger: the window check and the insert
//! happen under one lock, so concurrent triggers cannot both win.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use weave_models::{CompilationJob, GroupId, JobId, JobStatus, NewCompilationJob};

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::JobLedger;

#[derive(Debug, Default)]
struct Inner {
    jobs: BTreeMap<JobId, CompilationJob>,
    history: HashMap<JobId, Vec<JobStatus>>,
    next_id: i64,
}

#[derive(Debug, Default)]
pub struct MemoryLedger {
    inner: Mutex<Inner>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a row as-is, bypassing the state machine. Used to seed fixtures.
    pub fn insert_raw(&self, job: CompilationJob) {
        let mut inner = self.lock();
        inner.next_id = inner.next_id.max(job.id.get());
        inner.history.insert(job.id, vec![job.status]);
        inner.jobs.insert(job.id, job);
    }

    /// Every status a job has held, in order.
    pub fn history(&self, id: JobId) -> Vec<JobStatus> {
        self.lock().history.get(&id).cloned().unwrap_or_default()
    }

    pub fn jobs(&self) -> Vec<CompilationJob> {
        self.lock().jobs.values().cloned().collect()
    }

    fn transition<F>(&self, id: JobId, to: JobStatus, apply: F) -> LedgerResult<CompilationJob>
    where
        F: FnOnce(&mut CompilationJob, DateTime<Utc>),
    {
        let mut inner = self.lock();
        let job = inner.jobs.get_mut(&id).ok_or(LedgerError::NotFound(id))?;
        job.status = job
            .status
            .transition(to)
            .map_err(|source| LedgerError::InvalidTransition { id, source })?;
        apply(job, Utc::now());
        let updated = job.clone();
        inner.history.entry(id).or_default().push(to);
        Ok(updated)
    }
}

fn find_live_in(inner: &Inner, group_id: GroupId, window_start: DateTime<Utc>) -> Option<&CompilationJob> {
    inner
        .jobs
        .values()
        .rev()
        .find(|j| j.group_id == group_id && j.window_start == window_start && j.status.holds_window())
}

#[async_trait]
impl JobLedger for MemoryLedger {
    async fn create_pending(&self, new: NewCompilationJob) -> LedgerResult<CompilationJob> {
        let mut inner = self.lock();
        let window = new.window;

        if let Some(existing) = find_live_in(&inner, new.group_id, window.start()) {
            return Err(LedgerError::Conflict {
                group_id: new.group_id,
                window_start: window.start(),
                existing: existing.status,
                existing_id: Some(existing.id),
            });
        }

        inner.next_id += 1;
        let job = CompilationJob {
            id: JobId(inner.next_id),
            group_id: new.group_id,
            window_start: window.start(),
            window_end: window.end(),
            status: JobStatus::Pending,
            result_key: None,
            music_track_id: new.music_track_id,
            failure_reason: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        inner.history.insert(job.id, vec![JobStatus::Pending]);
        inner.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: JobId) -> LedgerResult<CompilationJob> {
        self.lock().jobs.get(&id).cloned().ok_or(LedgerError::NotFound(id))
    }

    async fn find_live(
        &self,
        group_id: GroupId,
        window_start: DateTime<Utc>,
    ) -> LedgerResult<Option<CompilationJob>> {
        Ok(find_live_in(&self.lock(), group_id, window_start).cloned())
    }

    async fn mark_processing(&self, id: JobId) -> LedgerResult<CompilationJob> {
        self.transition(id, JobStatus::Processing, |job, now| {
            job.started_at = Some(now);
        })
    }

    async fn complete(&self, id: JobId, result_key: &str) -> LedgerResult<CompilationJob> {
        self.transition(id, JobStatus::Completed, |job, now| {
            job.result_key = Some(result_key.to_string());
            job.failure_reason = None;
            job.completed_at = Some(now);
        })
    }

    async fn fail(&self, id: JobId, reason: &str) -> LedgerResult<CompilationJob> {
        self.transition(id, JobStatus::Failed, |job, now| {
            job.failure_reason = Some(reason.to_string());
            job.completed_at = Some(now);
        })
    }

    async fn list_stale(&self, cutoff: DateTime<Utc>) -> LedgerResult<Vec<CompilationJob>> {
        Ok(self
            .lock()
            .jobs
            .values()
            .filter(|j| !j.is_terminal() && j.active_since() < cutoff)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use std::sync::Arc;
    use weave_models::CompilationWindow;

    fn week() -> CompilationWindow {
        CompilationWindow::starting_on(NaiveDate::from_ymd_opt(2025, 9, 1).unwrap())
    }

    #[tokio::test]
    async fn test_happy_path_transitions() {
        let ledger = MemoryLedger::new();
        let job = ledger.create_pending(NewCompilationJob::new(GroupId(7), week())).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.window_end - job.window_start, Duration::days(7));

        ledger.mark_processing(job.id).await.unwrap();
        let done = ledger.complete(job.id, "compilations/7/20250901_compilation.mp4").await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.completed_at.is_some());
        assert_eq!(
            ledger.history(job.id),
            vec![JobStatus::Pending, JobStatus::Processing, JobStatus::Completed]
        );
    }

    #[tokio::test]
    async fn test_terminal_rows_reject_transitions() {
        let ledger = MemoryLedger::new();
        let job = ledger.create_pending(NewCompilationJob::new(GroupId(7), week())).await.unwrap();
        ledger.fail(job.id, "no submissions").await.unwrap();

        let err = ledger.mark_processing(job.id).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));
        let err = ledger.complete(job.id, "k").await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));
        assert!(matches!(ledger.get(JobId(99)).await, Err(LedgerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_window_uniqueness() {
        let ledger = MemoryLedger::new();
        let first = ledger.create_pending(NewCompilationJob::new(GroupId(7), week())).await.unwrap();

        let err = ledger.create_pending(NewCompilationJob::new(GroupId(7), week())).await.unwrap_err();
        assert!(matches!(err, LedgerError::Conflict { existing: JobStatus::Pending, .. }));

        // Other groups are unaffected
        ledger.create_pending(NewCompilationJob::new(GroupId(8), week())).await.unwrap();

        // A failed attempt frees the slot
        ledger.fail(first.id, "boom").await.unwrap();
        let retry = ledger.create_pending(NewCompilationJob::new(GroupId(7), week())).await.unwrap();
        assert_ne!(retry.id, first.id);

        // A completed one does not
        ledger.mark_processing(retry.id).await.unwrap();
        ledger.complete(retry.id, "k").await.unwrap();
        let err = ledger.create_pending(NewCompilationJob::new(GroupId(7), week())).await.unwrap_err();
        assert!(matches!(err, LedgerError::Conflict { existing: JobStatus::Completed, .. }));
    }

    #[tokio::test]
    async fn test_concurrent_creates_yield_one_row() {
        let ledger = Arc::new(MemoryLedger::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger.create_pending(NewCompilationJob::new(GroupId(7), week())).await
            }));
        }

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(ledger.jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_list_stale() {
        let ledger = MemoryLedger::new();
        let job = ledger.create_pending(NewCompilationJob::new(GroupId(7), week())).await.unwrap();
        ledger.mark_processing(job.id).await.unwrap();

        assert!(ledger.list_stale(Utc::now() - Duration::hours(1)).await.unwrap().is_empty());
        let stale = ledger.list_stale(Utc::now() + Duration::seconds(1)).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, job.id);
    }
}
