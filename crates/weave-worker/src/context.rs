//! Construction of the production collaborators from the environment.

use std::sync::Arc;

use tracing::info;

use weave_ledger::{
    GroupDirectory, JobLedger, LedgerConfig, MusicCatalog, ObjectListingSubmissions, PgDirectory, PgLedger,
    PgSubmissions, SubmissionRepository, SubmissionSource,
};
use weave_media::{FfmpegTranscoder, MediaTranscoder, TranscoderConfig};
use weave_queue::JobDispatcher;
use weave_storage::{ObjectStore, S3Client};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::pipeline::{CompilationPipeline, PipelineSettings};
use crate::status::JobStatusService;
use crate::sweeper::StaleJobSweeper;
use crate::trigger::JobTrigger;

/// Shared handles to the ledger database and the object store.
#[derive(Clone)]
pub struct Services {
    pub config: WorkerConfig,
    pub ledger: Arc<dyn JobLedger>,
    pub submissions: Arc<dyn SubmissionRepository>,
    pub store: Arc<dyn ObjectStore>,
    pub groups: Arc<dyn GroupDirectory>,
    pub music: Arc<dyn MusicCatalog>,
}

impl Services {
    /// Connect to Postgres (running migrations) and S3 using environment configuration.
    pub async fn connect(config: WorkerConfig) -> WorkerResult<Self> {
        let ledger_config = LedgerConfig::from_env()?;
        let pool = ledger_config.connect().await?;

        let ledger = PgLedger::new(pool.clone());
        ledger.migrate().await?;

        let store: Arc<dyn ObjectStore> = Arc::new(S3Client::from_env().await?);

        let submissions: Arc<dyn SubmissionRepository> = match ledger_config.submission_source {
            SubmissionSource::Database => Arc::new(PgSubmissions::new(pool.clone())),
            SubmissionSource::ObjectStore => Arc::new(ObjectListingSubmissions::new(Arc::clone(&store))),
        };
        info!(source = ?ledger_config.submission_source, "Submission repository selected");

        let directory = Arc::new(PgDirectory::new(pool));

        Ok(Self {
            config,
            ledger: Arc::new(ledger),
            submissions,
            store,
            groups: directory.clone(),
            music: directory,
        })
    }

    /// FFmpeg-backed transcoder per the worker configuration.
    pub fn transcoder(&self) -> WorkerResult<Arc<dyn MediaTranscoder>> {
        let mut config = TranscoderConfig::detect()?.with_font_file(self.config.title_font.clone());
        if let Some(timeout) = self.config.ffmpeg_timeout {
            config = config.with_timeout(timeout.as_secs());
        }
        Ok(Arc::new(FfmpegTranscoder::new(config)))
    }

    pub fn pipeline(&self, transcoder: Arc<dyn MediaTranscoder>) -> CompilationPipeline {
        CompilationPipeline::new(
            Arc::clone(&self.ledger),
            Arc::clone(&self.submissions),
            Arc::clone(&self.store),
            transcoder,
            Arc::clone(&self.music),
            PipelineSettings::from_config(&self.config),
        )
    }

    pub fn trigger(&self, dispatcher: Arc<dyn JobDispatcher>) -> JobTrigger {
        JobTrigger::new(
            Arc::clone(&self.ledger),
            dispatcher,
            Arc::clone(&self.groups),
            self.config.week_anchor,
        )
    }

    pub fn status(&self) -> JobStatusService {
        JobStatusService::new(Arc::clone(&self.ledger), Arc::clone(&self.store))
    }

    pub fn sweeper(&self) -> StaleJobSweeper {
        StaleJobSweeper::new(Arc::clone(&self.ledger), self.config.stale_after)
    }
}
