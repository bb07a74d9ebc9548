//! Shared data models for the Weave compilation pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Group, job and submission identifiers
//! - Submissions and music tracks read by the pipeline
//! - Compilation jobs and their status state machine
//! - Weekly compilation windows
//! - Encoding configuration
//! - The status view returned to callers

pub mod encoding;
pub mod ids;
pub mod job;
pub mod music;
pub mod status;
pub mod submission;
pub mod window;

// Re-export common types
pub use encoding::{EncodingConfig, Resolution};
pub use ids::{GroupId, JobId, MusicTrackId, SubmissionId};
pub use job::{CompilationJob, JobStatus, NewCompilationJob, TransitionError};
pub use music::MusicTrack;
pub use status::JobStatusView;
pub use submission::Submission;
pub use window::{CompilationWindow, WeekAnchor, WindowError};
