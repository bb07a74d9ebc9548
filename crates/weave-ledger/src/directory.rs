//! Active groups and the music catalog.

use async_trait::async_trait;
use std::collections::HashMap;

use weave_models::{GroupId, MusicTrack, MusicTrackId};

use crate::error::LedgerResult;

/// Groups the weekly schedule compiles for.
#[async_trait]
pub trait GroupDirectory: Send + Sync {
    async fn active_groups(&self) -> LedgerResult<Vec<GroupId>>;
}

/// Background tracks a job may reference.
#[async_trait]
pub trait MusicCatalog: Send + Sync {
    async fn find_track(&self, id: MusicTrackId) -> LedgerResult<Option<MusicTrack>>;
}

/// Fixed directory for tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct StaticDirectory {
    groups: Vec<GroupId>,
    tracks: HashMap<MusicTrackId, MusicTrack>,
}

impl StaticDirectory {
    pub fn new(groups: Vec<GroupId>) -> Self {
        Self {
            groups,
            tracks: HashMap::new(),
        }
    }

    pub fn with_track(mut self, track: MusicTrack) -> Self {
        self.tracks.insert(track.id, track);
        self
    }
}

#[async_trait]
impl GroupDirectory for StaticDirectory {
    async fn active_groups(&self) -> LedgerResult<Vec<GroupId>> {
        Ok(self.groups.clone())
    }
}

#[async_trait]
impl MusicCatalog for StaticDirectory {
    async fn find_track(&self, id: MusicTrackId) -> LedgerResult<Option<MusicTrack>> {
        Ok(self.tracks.get(&id).cloned())
    }
}
