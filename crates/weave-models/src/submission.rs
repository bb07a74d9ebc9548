//! Video submissions.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{GroupId, SubmissionId};

/// One member's uploaded video for a group's weekly prompt.
///
/// Submissions are created once on upload and never mutated. The pipeline
/// only references them by `storage_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Submission {
    pub id: SubmissionId,
    /// Uploading member. Unknown when the record was recovered from an object listing.
    pub owner_id: Option<i64>,
    pub group_id: GroupId,
    pub prompt_id: Option<i64>,
    /// Object store key of the uploaded video
    pub storage_key: String,
    pub duration_seconds: Option<f64>,
    pub submitted_at: DateTime<Utc>,
}

impl Submission {
    /// File extension of the stored object, defaulting to `mp4`.
    pub fn extension(&self) -> &str {
        self.storage_key
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty() && !ext.contains('/'))
            .unwrap_or("mp4")
    }
}

/// Sort submissions ascending by `submitted_at`, breaking ties by id.
pub fn sort_chronologically(submissions: &mut [Submission]) {
    submissions.sort_by(|a, b| {
        a.submitted_at
            .cmp(&b.submitted_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn submission(id: i64, key: &str, hour: u32) -> Submission {
        Submission {
            id: SubmissionId(id),
            owner_id: Some(1),
            group_id: GroupId(7),
            prompt_id: None,
            storage_key: key.to_string(),
            duration_seconds: Some(12.0),
            submitted_at: Utc.with_ymd_and_hms(2025, 9, 2, hour, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_extension() {
        assert_eq!(submission(1, "groups/7/videos/a.mov", 1).extension(), "mov");
        assert_eq!(submission(1, "groups/7/videos/a", 1).extension(), "mp4");
        assert_eq!(submission(1, "groups/7.x/videos/a", 1).extension(), "mp4");
    }

    #[test]
    fn test_sort_chronologically() {
        let mut subs = vec![
            submission(3, "c.mp4", 9),
            submission(1, "a.mp4", 5),
            submission(2, "b.mp4", 5),
        ];
        sort_chronologically(&mut subs);
        let ids: Vec<i64> = subs.iter().map(|s| s.id.get()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
