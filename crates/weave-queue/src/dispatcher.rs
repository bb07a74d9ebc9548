//! Fire-and-forget hand-off of compilation jobs.

use async_trait::async_trait;

use crate::error::QueueResult;
use crate::job::CompileWindowJob;

/// Submits a job for asynchronous execution without waiting for it.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    /// Returns a transport-specific message id.
    async fn dispatch(&self, job: &CompileWindowJob) -> QueueResult<String>;
}
