//! Background music catalog entries.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::MusicTrackId;

/// A track that can be mixed under a compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MusicTrack {
    pub id: MusicTrackId,
    pub title: String,
    pub artist: Option<String>,
    pub storage_key: String,
    pub duration_seconds: Option<f64>,
    pub is_active: bool,
}
