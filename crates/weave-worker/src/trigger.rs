//! Manual and scheduled compilation triggers.
//!
//! Both entry points go through `submit`: check the ledger for a live job in
//! the window, create a `pending` row (the ledger refuses a second live row
//! atomically), then hand the job to the dispatcher without waiting for it.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{error, info, warn};

use weave_ledger::{GroupDirectory, JobLedger, LedgerError, SubmissionRepository};
use weave_models::{
    CompilationJob, CompilationWindow, GroupId, JobId, JobStatus, MusicTrackId, NewCompilationJob, WeekAnchor,
};
use weave_queue::{CompileWindowJob, JobDispatcher};

use crate::error::{TriggerError, REASON_DISPATCH_FAILED};
use crate::metrics;

/// What a trigger call did for one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Dispatched { job_id: JobId, message_id: String },
    /// A completed job already covers the window.
    AlreadyCompiled { job_id: Option<JobId> },
    /// A pending or processing job already covers the window.
    InProgress { job_id: Option<JobId>, status: JobStatus },
    /// Pre-check found nothing to compile; no row was created.
    NoSubmissions,
}

impl TriggerOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerOutcome::Dispatched { .. } => "dispatched",
            TriggerOutcome::AlreadyCompiled { .. } => "already_compiled",
            TriggerOutcome::InProgress { .. } => "in_progress",
            TriggerOutcome::NoSubmissions => "no_submissions",
        }
    }

    fn from_existing(status: JobStatus, job_id: Option<JobId>) -> Self {
        if status == JobStatus::Completed {
            TriggerOutcome::AlreadyCompiled { job_id }
        } else {
            TriggerOutcome::InProgress { job_id, status }
        }
    }
}

/// Per-group results of one scheduled pass.
#[derive(Debug)]
pub struct ScheduleReport {
    pub window: CompilationWindow,
    pub results: Vec<(GroupId, Result<TriggerOutcome, TriggerError>)>,
}

impl ScheduleReport {
    pub fn dispatched(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, r)| matches!(r, Ok(TriggerOutcome::Dispatched { .. })))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|(_, r)| r.is_err()).count()
    }
}

pub struct JobTrigger {
    ledger: Arc<dyn JobLedger>,
    dispatcher: Arc<dyn JobDispatcher>,
    groups: Arc<dyn GroupDirectory>,
    anchor: WeekAnchor,
    precheck: Option<Arc<dyn SubmissionRepository>>,
}

impl JobTrigger {
    pub fn new(
        ledger: Arc<dyn JobLedger>,
        dispatcher: Arc<dyn JobDispatcher>,
        groups: Arc<dyn GroupDirectory>,
        anchor: WeekAnchor,
    ) -> Self {
        Self {
            ledger,
            dispatcher,
            groups,
            anchor,
            precheck: None,
        }
    }

    /// Count submissions before creating a row and report `NoSubmissions`
    /// instead of dispatching a job that would be skipped.
    pub fn with_submission_precheck(mut self, submissions: Arc<dyn SubmissionRepository>) -> Self {
        self.precheck = Some(submissions);
        self
    }

    /// The window a trigger at `now` targets, or the one starting on `week_start`.
    pub fn window_for(&self, now: DateTime<Utc>, week_start: Option<NaiveDate>) -> CompilationWindow {
        match week_start {
            Some(date) => CompilationWindow::starting_on(date),
            None => CompilationWindow::containing(now, self.anchor),
        }
    }

    /// Manual request for one group.
    pub async fn trigger_manual(
        &self,
        group_id: GroupId,
        week_start: Option<NaiveDate>,
        music_track_id: Option<MusicTrackId>,
        now: DateTime<Utc>,
    ) -> Result<TriggerOutcome, TriggerError> {
        if group_id.get() <= 0 {
            return Err(TriggerError::Input(format!("invalid group id {}", group_id)));
        }
        let window = self.window_for(now, week_start);
        let result = self.submit(group_id, window, music_track_id).await;
        record(&result);
        result
    }

    /// Weekly pass over every active group. One group's failure never stops the rest.
    pub async fn trigger_scheduled(&self, now: DateTime<Utc>) -> Result<ScheduleReport, TriggerError> {
        let window = self.window_for(now, None);
        let groups = self.groups.active_groups().await?;
        info!(groups = groups.len(), window = %window, "Starting scheduled compilation pass");

        let mut results = Vec::with_capacity(groups.len());
        for group_id in groups {
            let result = self.submit(group_id, window, None).await;
            match &result {
                Ok(outcome) => info!(group_id = %group_id, result = outcome.as_str(), "Scheduled trigger"),
                Err(e) => error!(group_id = %group_id, "Scheduled trigger failed: {}", e),
            }
            record(&result);
            results.push((group_id, result));
        }

        let report = ScheduleReport { window, results };
        info!(
            dispatched = report.dispatched(),
            failed = report.failed(),
            "Scheduled compilation pass finished"
        );
        Ok(report)
    }

    async fn submit(
        &self,
        group_id: GroupId,
        window: CompilationWindow,
        music_track_id: Option<MusicTrackId>,
    ) -> Result<TriggerOutcome, TriggerError> {
        if let Some(existing) = self.ledger.find_live(group_id, window.start()).await? {
            return Ok(TriggerOutcome::from_existing(existing.status, Some(existing.id)));
        }

        if let Some(submissions) = &self.precheck {
            if submissions.count_submissions(group_id, &window).await? == 0 {
                return Ok(TriggerOutcome::NoSubmissions);
            }
        }

        let new = NewCompilationJob::new(group_id, window).with_music_track(music_track_id);
        let job = match self.ledger.create_pending(new).await {
            Ok(job) => job,
            Err(LedgerError::Conflict { existing, existing_id, .. }) => {
                return Ok(TriggerOutcome::from_existing(existing, existing_id));
            }
            Err(e) => return Err(e.into()),
        };

        self.dispatch(job).await
    }

    async fn dispatch(&self, job: CompilationJob) -> Result<TriggerOutcome, TriggerError> {
        let payload = CompileWindowJob::for_job(&job);
        match self.dispatcher.dispatch(&payload).await {
            Ok(message_id) => {
                info!(
                    job_id = %job.id,
                    group_id = %job.group_id,
                    window_start = %payload.window_start,
                    "Dispatched compilation job"
                );
                Ok(TriggerOutcome::Dispatched {
                    job_id: job.id,
                    message_id,
                })
            }
            Err(source) => {
                // Free the window so the next trigger can try again
                if let Err(e) = self.ledger.fail(job.id, REASON_DISPATCH_FAILED).await {
                    warn!(job_id = %job.id, "Failed to release undispatched job: {}", e);
                }
                Err(TriggerError::Dispatch {
                    job_id: job.id,
                    group_id: job.group_id,
                    source,
                })
            }
        }
    }
}

fn record(result: &Result<TriggerOutcome, TriggerError>) {
    metrics::record_dispatch(match result {
        Ok(outcome) => outcome.as_str(),
        Err(_) => "failed",
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use mockall::mock;
    use weave_ledger::{MemoryLedger, MemorySubmissions, StaticDirectory};
    use weave_models::{Submission, SubmissionId};
    use weave_queue::{QueueError, QueueResult};

    mock! {
        Dispatcher {}

        #[async_trait]
        impl JobDispatcher for Dispatcher {
            async fn dispatch(&self, job: &CompileWindowJob) -> QueueResult<String>;
        }
    }

    fn now() -> DateTime<Utc> {
        // Wednesday
        Utc.with_ymd_and_hms(2025, 9, 3, 15, 30, 0).unwrap()
    }

    fn trigger(ledger: Arc<MemoryLedger>, dispatcher: MockDispatcher, groups: Vec<i64>) -> JobTrigger {
        JobTrigger::new(
            ledger,
            Arc::new(dispatcher),
            Arc::new(StaticDirectory::new(groups.into_iter().map(GroupId).collect())),
            WeekAnchor::default(),
        )
    }

    #[tokio::test]
    async fn test_manual_trigger_creates_and_dispatches() {
        let ledger = Arc::new(MemoryLedger::new());
        let mut dispatcher = MockDispatcher::new();
        dispatcher
            .expect_dispatch()
            .withf(|job| {
                job.group_id == GroupId(7)
                    && job.window_start == "2025-09-01T00:00:00Z"
                    && job.window_end == "2025-09-07"
            })
            .times(1)
            .returning(|_| Ok("1-0".to_string()));

        let outcome = trigger(ledger.clone(), dispatcher, vec![])
            .trigger_manual(GroupId(7), None, None, now())
            .await
            .unwrap();

        let jobs = ledger.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Pending);
        assert_eq!(
            outcome,
            TriggerOutcome::Dispatched {
                job_id: jobs[0].id,
                message_id: "1-0".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_second_manual_trigger_is_rejected_while_first_is_live() {
        let ledger = Arc::new(MemoryLedger::new());
        let mut dispatcher = MockDispatcher::new();
        dispatcher
            .expect_dispatch()
            .times(1)
            .returning(|_| Ok("1-0".to_string()));
        let trigger = trigger(ledger.clone(), dispatcher, vec![]);

        let first = trigger.trigger_manual(GroupId(7), None, None, now()).await.unwrap();
        let second = trigger.trigger_manual(GroupId(7), None, None, now()).await.unwrap();

        let TriggerOutcome::Dispatched { job_id, .. } = first else {
            panic!("first trigger did not dispatch: {:?}", first);
        };
        assert_eq!(
            second,
            TriggerOutcome::InProgress {
                job_id: Some(job_id),
                status: JobStatus::Pending,
            }
        );
        assert_eq!(ledger.jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_triggers_dispatch_once() {
        let ledger = Arc::new(MemoryLedger::new());
        let mut dispatcher = MockDispatcher::new();
        dispatcher
            .expect_dispatch()
            .times(1)
            .returning(|_| Ok("1-0".to_string()));
        let trigger = Arc::new(trigger(ledger.clone(), dispatcher, vec![]));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let trigger = trigger.clone();
                tokio::spawn(async move { trigger.trigger_manual(GroupId(7), None, None, now()).await })
            })
            .collect();

        let mut dispatched = 0;
        for handle in handles {
            if let Ok(TriggerOutcome::Dispatched { .. }) = handle.await.unwrap() {
                dispatched += 1;
            }
        }
        assert_eq!(dispatched, 1);
        assert_eq!(ledger.jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_completed_window_reports_already_compiled() {
        let ledger = Arc::new(MemoryLedger::new());
        let window = CompilationWindow::containing(now(), WeekAnchor::default());
        let job = ledger.create_pending(NewCompilationJob::new(GroupId(7), window)).await.unwrap();
        ledger.mark_processing(job.id).await.unwrap();
        ledger.complete(job.id, "compilations/7/20250901_compilation.mp4").await.unwrap();

        let mut dispatcher = MockDispatcher::new();
        dispatcher.expect_dispatch().never();

        let outcome = trigger(ledger, dispatcher, vec![])
            .trigger_manual(GroupId(7), None, None, now())
            .await
            .unwrap();
        assert_eq!(outcome, TriggerOutcome::AlreadyCompiled { job_id: Some(job.id) });
    }

    #[tokio::test]
    async fn test_failed_window_can_be_retried_with_new_row() {
        let ledger = Arc::new(MemoryLedger::new());
        let window = CompilationWindow::containing(now(), WeekAnchor::default());
        let old = ledger.create_pending(NewCompilationJob::new(GroupId(7), window)).await.unwrap();
        ledger.fail(old.id, "transcode failed during compile (exit 1)").await.unwrap();

        let mut dispatcher = MockDispatcher::new();
        dispatcher.expect_dispatch().times(1).returning(|_| Ok("2-0".to_string()));

        let outcome = trigger(ledger.clone(), dispatcher, vec![])
            .trigger_manual(GroupId(7), None, None, now())
            .await
            .unwrap();

        let TriggerOutcome::Dispatched { job_id, .. } = outcome else {
            panic!("expected dispatch, got {:?}", outcome);
        };
        assert_ne!(job_id, old.id);
        assert_eq!(ledger.jobs().len(), 2);
    }

    #[tokio::test]
    async fn test_dispatch_failure_releases_window() {
        let ledger = Arc::new(MemoryLedger::new());
        let mut dispatcher = MockDispatcher::new();
        dispatcher
            .expect_dispatch()
            .times(1)
            .returning(|_| Err(QueueError::connection_failed("redis down")));

        let err = trigger(ledger.clone(), dispatcher, vec![])
            .trigger_manual(GroupId(7), None, None, now())
            .await
            .unwrap_err();

        assert!(matches!(err, TriggerError::Dispatch { group_id: GroupId(7), .. }));
        let jobs = ledger.jobs();
        assert_eq!(jobs[0].status, JobStatus::Failed);
        assert_eq!(jobs[0].failure_reason.as_deref(), Some(REASON_DISPATCH_FAILED));
    }

    #[tokio::test]
    async fn test_scheduled_pass_isolates_group_failures() {
        let ledger = Arc::new(MemoryLedger::new());
        let mut dispatcher = MockDispatcher::new();
        dispatcher
            .expect_dispatch()
            .times(3)
            .returning(|job| {
                if job.group_id == GroupId(2) {
                    Err(QueueError::enqueue_failed("stream full"))
                } else {
                    Ok(format!("{}-0", job.group_id))
                }
            });

        let report = trigger(ledger.clone(), dispatcher, vec![1, 2, 3])
            .trigger_scheduled(now())
            .await
            .unwrap();

        assert_eq!(report.window.payload_start(), "2025-09-01T00:00:00Z");
        assert_eq!(report.dispatched(), 2);
        assert_eq!(report.failed(), 1);
        let groups: Vec<GroupId> = report.results.iter().map(|(g, _)| *g).collect();
        assert_eq!(groups, vec![GroupId(1), GroupId(2), GroupId(3)]);
    }

    #[tokio::test]
    async fn test_precheck_skips_empty_window_without_row() {
        let ledger = Arc::new(MemoryLedger::new());
        let mut dispatcher = MockDispatcher::new();
        dispatcher.expect_dispatch().never();
        let submissions = Arc::new(MemorySubmissions::new(vec![Submission {
            id: SubmissionId(1),
            owner_id: None,
            group_id: GroupId(7),
            prompt_id: None,
            storage_key: "groups/7/videos/1.mp4".to_string(),
            duration_seconds: None,
            submitted_at: Utc.with_ymd_and_hms(2025, 8, 20, 0, 0, 0).unwrap(),
        }]));

        let outcome = trigger(ledger.clone(), dispatcher, vec![])
            .with_submission_precheck(submissions)
            .trigger_manual(GroupId(7), None, None, now())
            .await
            .unwrap();

        assert_eq!(outcome, TriggerOutcome::NoSubmissions);
        assert!(ledger.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_explicit_week_and_invalid_group() {
        let ledger = Arc::new(MemoryLedger::new());
        let mut dispatcher = MockDispatcher::new();
        dispatcher
            .expect_dispatch()
            .withf(|job| job.window_start == "2025-08-25T00:00:00Z")
            .times(1)
            .returning(|_| Ok("1-0".to_string()));
        let trigger = trigger(ledger, dispatcher, vec![]);

        let week = NaiveDate::from_ymd_opt(2025, 8, 25);
        assert!(matches!(
            trigger.trigger_manual(GroupId(7), week, None, now()).await,
            Ok(TriggerOutcome::Dispatched { .. })
        ));
        assert!(matches!(
            trigger.trigger_manual(GroupId(0), None, None, now()).await,
            Err(TriggerError::Input(_))
        ));
    }
}
