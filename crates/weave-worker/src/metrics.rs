//! Prometheus metrics for the worker.

use std::net::{Ipv4Addr, SocketAddr};

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

use crate::error::{WorkerError, WorkerResult};

/// Install the Prometheus recorder and serve `/metrics` on `port`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(port: u16) -> WorkerResult<()> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {}", e)))?;
    info!("Serving Prometheus metrics on {}", addr);
    Ok(())
}

/// Metric names as constants for consistency.
pub mod names {
    pub const COMPILATIONS_TOTAL: &str = "weave_compilations_total";
    pub const COMPILATION_DURATION_SECONDS: &str = "weave_compilation_duration_seconds";
    pub const TRANSCODE_FAILURES_TOTAL: &str = "weave_transcode_failures_total";
    pub const STALE_JOBS_RECOVERED_TOTAL: &str = "weave_stale_jobs_recovered_total";
    pub const TRIGGER_DISPATCH_TOTAL: &str = "weave_trigger_dispatch_total";
}

/// Record the end of a pipeline run. `outcome` is `completed`, `skipped` or `failed`.
pub fn record_compilation(outcome: &'static str, duration_secs: f64) {
    let labels = [("outcome", outcome)];
    counter!(names::COMPILATIONS_TOTAL, &labels).increment(1);
    histogram!(names::COMPILATION_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_transcode_failure(stage: &'static str) {
    let labels = [("stage", stage)];
    counter!(names::TRANSCODE_FAILURES_TOTAL, &labels).increment(1);
}

pub fn record_stale_recovered(count: usize) {
    counter!(names::STALE_JOBS_RECOVERED_TOTAL).increment(count as u64);
}

/// `result` is one of `dispatched`, `already_compiled`, `in_progress`,
/// `no_submissions` or `failed`.
pub fn record_dispatch(result: &'static str) {
    let labels = [("result", result)];
    counter!(names::TRIGGER_DISPATCH_TOTAL, &labels).increment(1);
}
