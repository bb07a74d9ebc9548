//! Object key conventions.

use std::time::Duration;
use weave_models::{CompilationWindow, GroupId};

use crate::error::{StorageError, StorageResult};

/// Validity of download URLs handed to callers.
pub const DOWNLOAD_URL_TTL: Duration = Duration::from_secs(3600);

/// Deterministic key of a window's compilation.
///
/// Two runs for the same window write the same key; the later upload replaces
/// the earlier one.
pub fn result_key(group_id: GroupId, window: &CompilationWindow) -> String {
    format!(
        "compilations/{}/{}_compilation.mp4",
        group_id,
        window.start_stamp()
    )
}

/// Prefix under which a group's raw uploads live.
pub fn group_videos_prefix(group_id: GroupId) -> String {
    format!("groups/{}/videos/", group_id)
}

/// Content type inferred from the key's extension.
pub fn content_type_for(key: &str) -> &'static str {
    let ext = key
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "m4a" | "aac" => "audio/mp4",
        "wav" => "audio/wav",
        _ => "application/octet-stream",
    }
}

/// Reject keys the store would silently rewrite.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.starts_with('/') || key.contains("//") || key.contains("..") {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}
