//! Compilation job ledger and the read-side collaborators of the pipeline.
//!
//! This crate provides:
//! - `JobLedger`: create/read/transition compilation job rows, with the
//!   one-live-job-per-window rule enforced at insert time
//! - `SubmissionRepository`: the relational source and the object listing fallback
//! - `GroupDirectory` / `MusicCatalog`: active groups and background tracks
//! - Postgres (sqlx) and in-memory backends for all of the above

pub mod config;
pub mod directory;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod postgres;
pub mod submissions;

pub use config::{LedgerConfig, SubmissionSource};
pub use directory::{GroupDirectory, MusicCatalog, StaticDirectory};
pub use error::{LedgerError, LedgerResult};
pub use ledger::JobLedger;
pub use memory::MemoryLedger;
pub use postgres::{PgDirectory, PgLedger, PgSubmissions};
pub use submissions::{MemorySubmissions, ObjectListingSubmissions, SubmissionRepository};
