//! FFmpeg CLI wrapper for compilation rendering.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with multiple inputs
//! - A process runner with timeout and stderr capture
//! - FFprobe stream inspection
//! - Filter-graph generation for title cards, normalization, concat and mixing
//! - The `MediaTranscoder` seam and its FFmpeg implementation

pub mod asset;
pub mod command;
pub mod error;
pub mod filters;
pub mod probe;
pub mod transcoder;

pub use asset::{AssetKind, MediaAsset};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegInput, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use probe::{probe_media, MediaInfo};
pub use transcoder::{FfmpegTranscoder, MediaTranscoder, TitleCard, TranscoderConfig};
