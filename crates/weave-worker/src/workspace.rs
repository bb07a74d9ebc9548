//! Per-run scratch directory.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};
use weave_models::JobId;

/// Directory owned by exactly one pipeline run.
///
/// Removed by `close`, or on drop if the run unwinds before reaching it.
#[derive(Debug)]
pub struct RunWorkspace {
    dir: TempDir,
}

impl RunWorkspace {
    /// Create `root/job-<id>-XXXXXX`, creating `root` if needed.
    pub async fn create(root: &Path, job_id: JobId) -> io::Result<Self> {
        tokio::fs::create_dir_all(root).await?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("job-{}-", job_id))
            .tempdir_in(root)?;
        debug!(job_id = %job_id, path = %dir.path().display(), "Created run workspace");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path for a file inside the workspace.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Remove the directory. Failures are logged, not returned.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!(path = %path.display(), "Failed to remove run workspace: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_close_removes_everything() {
        let root = tempfile::tempdir().unwrap();
        let ws = RunWorkspace::create(&root.path().join("nested"), JobId(5)).await.unwrap();
        let inner = ws.file("000_intro.mp4");
        tokio::fs::write(&inner, b"card").await.unwrap();

        let dir = ws.path().to_path_buf();
        assert!(dir.file_name().unwrap().to_string_lossy().starts_with("job-5-"));
        ws.close();

        assert!(!dir.exists());
        assert!(!inner.exists());
    }

    #[tokio::test]
    async fn test_drop_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir = {
            let ws = RunWorkspace::create(root.path(), JobId(6)).await.unwrap();
            ws.path().to_path_buf()
        };
        assert!(!dir.exists());
    }
}
