//! Structured job logging utilities.
//!
//! Provides consistent, structured logging for job processing with
//! tracing spans and contextual information.

use tracing::{error, info, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use weave_models::JobId;

/// Install the global subscriber: human-readable by default, JSON when
/// `LOG_FORMAT=json`. `RUST_LOG` directives are honoured on top of `weave=info`.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter = EnvFilter::builder()
        .parse_lossy(std::env::var("RUST_LOG").unwrap_or_else(|_| "weave=info".to_string()));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Job logger for structured logging with consistent formatting.
///
/// Every event carries the job id and the operation name so a single run
/// can be followed through the logs.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: String,
}

impl JobLogger {
    /// Create a new job logger for a specific job and operation.
    ///
    /// # Arguments
    /// * `job_id` - The ledger id of the job
    /// * `operation` - The type of operation (e.g., "compile_window", "sweep")
    pub fn new(job_id: JobId, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Log the start of a job operation.
    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    /// Log a progress update during job execution.
    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job progress: {}", message
        );
    }

    /// Log an error during job execution.
    pub fn log_error(&self, kind: &str, message: &str) {
        error!(
            job_id = %self.job_id,
            operation = %self.operation,
            outcome = "failed",
            error_kind = kind,
            "Job error: {}", message
        );
    }

    /// Log the completion of a job operation.
    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            outcome = "completed",
            "Job completed: {}", message
        );
    }

    /// Log a run that ended without work to do.
    pub fn log_skipped(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            outcome = "skipped",
            "Job skipped: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Create a tracing span for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            operation = %self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_creation() {
        let logger = JobLogger::new(JobId(42), "compile_window");

        assert_eq!(logger.job_id(), "42");
        assert_eq!(logger.operation(), "compile_window");
    }
}
