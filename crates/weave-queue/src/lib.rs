//! Redis Streams dispatch of compilation jobs.
//!
//! This crate provides:
//! - The JSON job payload exchanged between trigger and executor
//! - The `JobDispatcher` seam used by the trigger
//! - A stream-backed queue with consumer groups, retry counting, DLQ and
//!   reclaiming of messages abandoned by crashed consumers

pub mod dispatcher;
pub mod error;
pub mod job;
pub mod queue;

pub use dispatcher::JobDispatcher;
pub use error::{QueueError, QueueResult};
pub use job::CompileWindowJob;
pub use queue::{JobQueue, QueueConfig};
