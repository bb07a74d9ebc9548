//! Weekly compilation worker.
//!
//! This crate provides:
//! - The compilation pipeline (select, download, title cards, concat,
//!   optional music, publish) with guaranteed scratch cleanup
//! - Manual and scheduled triggers enforcing one live job per group and week
//! - The queue executor, the stale-job sweeper and the status query
//! - Binaries: `weave-worker`, the `weave` CLI and `worker-selfcheck`

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod retry;
pub mod status;
pub mod sweeper;
pub mod trigger;
pub mod workspace;

pub use config::WorkerConfig;
pub use context::Services;
pub use error::{PipelineError, Stage, TriggerError, WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::{init_tracing, JobLogger};
pub use pipeline::{CompilationOutcome, CompilationPipeline, PipelineSettings};
pub use status::JobStatusService;
pub use sweeper::StaleJobSweeper;
pub use trigger::{JobTrigger, ScheduleReport, TriggerOutcome};
pub use workspace::RunWorkspace;
