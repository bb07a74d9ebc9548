//! Queue consumer that runs the pipeline for each dispatched job.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use weave_queue::{CompileWindowJob, JobQueue};

use crate::config::WorkerConfig;
use crate::error::{PipelineError, WorkerError, WorkerResult};
use crate::pipeline::{CompilationOutcome, CompilationPipeline};
use crate::retry::FailureTracker;

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    pipeline: Arc<CompilationPipeline>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

/// What to do with a queue message after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Ack,
    Retry,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, queue: JobQueue, pipeline: Arc<CompilationPipeline>) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            pipeline,
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Receiver that flips to `true` on shutdown, for companion tasks.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Consume until `shutdown` is called, then drain in-flight jobs.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        self.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();
        let claim_task = self.spawn_claim_loop();
        let mut failures = FailureTracker::new(3);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    match result {
                        Ok(()) => failures.record_success(),
                        Err(e) => {
                            if failures.record_failure() {
                                error!("Error consuming jobs: {}", e);
                            }
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!("In-flight jobs still running after {:?}", self.config.shutdown_timeout);
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Periodically take over messages a crashed consumer never acked.
    fn spawn_claim_loop(&self) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let pipeline = Arc::clone(&self.pipeline);
        let semaphore = Arc::clone(&self.job_semaphore);
        let consumer_name = self.consumer_name.clone();
        let interval = self.config.claim_interval;
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let jobs = match queue.claim_pending(&consumer_name, 5).await {
                            Ok(jobs) => jobs,
                            Err(e) => {
                                warn!("Failed to claim pending jobs: {}", e);
                                continue;
                            }
                        };
                        if !jobs.is_empty() {
                            info!("Claimed {} pending jobs", jobs.len());
                        }
                        for (message_id, job) in jobs {
                            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                                return;
                            };
                            let queue = Arc::clone(&queue);
                            let pipeline = Arc::clone(&pipeline);
                            tokio::spawn(async move {
                                let _permit = permit;
                                Self::execute_job(pipeline, queue, message_id, job).await;
                            });
                        }
                    }
                }
            }
        })
    }

    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .queue
            .consume(&self.consumer_name, 1000, available.min(5))
            .await?;

        if jobs.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} jobs from queue", jobs.len());

        for (message_id, job) in jobs {
            let pipeline = Arc::clone(&self.pipeline);
            let queue = Arc::clone(&self.queue);
            let permit = self
                .job_semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::job_failed("Semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(pipeline, queue, message_id, job).await;
            });
        }

        Ok(())
    }

    /// Run one job and settle its queue message.
    ///
    /// Pipeline failures are final for the ledger row, so the message is
    /// acked. Only failures that left the row untouched are redelivered,
    /// and after `max_retries` deliveries the message goes to the DLQ.
    async fn execute_job(
        pipeline: Arc<CompilationPipeline>,
        queue: Arc<JobQueue>,
        message_id: String,
        job: CompileWindowJob,
    ) {
        let job_id = job.job_id;
        info!(job_id = %job_id, group_id = %job.group_id, "Executing compilation job");

        let result = match job.window() {
            Ok(window) => pipeline.run(job.job_id, job.group_id, window).await,
            Err(e) => Err(PipelineError::input(e.to_string())),
        };

        let error_text = result.as_ref().err().map(|e| e.to_string());
        match disposition(&result) {
            Disposition::Ack => {
                if let Err(e) = queue.ack(&message_id).await {
                    error!(job_id = %job_id, "Failed to ack job: {}", e);
                }
            }
            Disposition::Retry => {
                let error_text = error_text.unwrap_or_default();
                let attempts = match queue.increment_retry(&message_id).await {
                    Ok(n) => n,
                    Err(e) => {
                        warn!(job_id = %job_id, "Failed to count retry: {}", e);
                        u32::MAX
                    }
                };
                let max_retries = queue.max_retries();
                if attempts >= max_retries {
                    warn!(job_id = %job_id, "Job exceeded max retries ({}), moving to DLQ", max_retries);
                    if let Err(e) = queue.dlq(&message_id, &job, &error_text).await {
                        error!(job_id = %job_id, "Failed to move job to DLQ: {}", e);
                    }
                } else {
                    info!(
                        job_id = %job_id,
                        "Job will be redelivered (attempt {}/{}): {}", attempts, max_retries, error_text
                    );
                }
            }
        }
    }

    async fn wait_for_jobs(&self) {
        loop {
            if self.job_semaphore.available_permits() == self.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

fn disposition(result: &Result<CompilationOutcome, PipelineError>) -> Disposition {
    match result {
        Err(e) if e.is_retryable() => Disposition::Retry,
        _ => Disposition::Ack,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_ledger::LedgerError;
    use weave_models::JobId;

    #[test]
    fn test_terminal_results_are_acked() {
        assert_eq!(disposition(&Ok(CompilationOutcome::Skipped)), Disposition::Ack);
        assert_eq!(
            disposition(&Ok(CompilationOutcome::Completed {
                result_key: "compilations/7/20250901_compilation.mp4".to_string(),
                clip_count: 3,
            })),
            Disposition::Ack
        );
        assert_eq!(
            disposition(&Err(PipelineError::input("bad window"))),
            Disposition::Ack
        );
        assert_eq!(
            disposition(&Err(PipelineError::Ledger(LedgerError::NotFound(JobId(3))))),
            Disposition::Ack
        );
    }
}
