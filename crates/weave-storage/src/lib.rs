//! Object store gateway.
//!
//! This crate provides:
//! - The `ObjectStore` trait consumed by the compilation pipeline
//! - An S3 (or S3-compatible) implementation with presigned URLs
//! - An in-memory implementation for tests and local runs
//! - Object key conventions for submissions and compilations

pub mod client;
pub mod error;
pub mod keys;
pub mod memory;
pub mod store;

pub use client::{S3Client, S3Config};
pub use error::{StorageError, StorageResult};
pub use keys::{content_type_for, group_videos_prefix, result_key, DOWNLOAD_URL_TTL};
pub use memory::InMemoryObjectStore;
pub use store::{ObjectInfo, ObjectStore};
