//! Locally materialized media.

use std::path::{Path, PathBuf};
use weave_models::SubmissionId;

/// What a local media file represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Intro,
    Submission(SubmissionId),
    Outro,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Intro => "intro",
            AssetKind::Submission(_) => "submission",
            AssetKind::Outro => "outro",
        }
    }
}

/// A file inside one run's workspace, with its position in the compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAsset {
    pub index: usize,
    pub kind: AssetKind,
    pub path: PathBuf,
}

impl MediaAsset {
    pub fn new(index: usize, kind: AssetKind, path: impl Into<PathBuf>) -> Self {
        Self {
            index,
            kind,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }
}
