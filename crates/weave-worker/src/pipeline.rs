//! The compilation pipeline: one ledger row in, one published video out.
//!
//! Stages run in order inside a scratch directory owned by the run:
//! select, materialize, decorate, compile, score (optional), publish.
//! The ledger is only written when the run starts (`processing`) and when it
//! ends (`completed` or `failed`). The scratch directory is removed on every
//! exit path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::{StreamExt, TryStreamExt};
use tracing::{warn, Instrument};

use weave_ledger::{JobLedger, LedgerError, MusicCatalog, SubmissionRepository};
use weave_media::{AssetKind, MediaAsset, MediaTranscoder, TitleCard};
use weave_models::{CompilationJob, CompilationWindow, GroupId, JobId, Resolution, Submission};
use weave_storage::{content_type_for, result_key, ObjectStore};

use crate::config::WorkerConfig;
use crate::error::{PipelineError, PipelineResult, Stage, REASON_NO_SUBMISSIONS};
use crate::logging::JobLogger;
use crate::metrics;
use crate::retry::{retry_async_when, RetryConfig};
use crate::workspace::RunWorkspace;

const COMPILATION_FILE: &str = "compilation.mp4";
const SCORED_FILE: &str = "compilation_scored.mp4";

/// Run-independent pipeline knobs.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub work_dir: PathBuf,
    pub resolution: Resolution,
    pub product_name: String,
    pub intro_secs: f64,
    pub outro_secs: f64,
    pub download_parallel: usize,
}

impl PipelineSettings {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            work_dir: config.work_dir.clone(),
            resolution: config.resolution,
            product_name: config.product_name.clone(),
            intro_secs: config.intro_secs,
            outro_secs: config.outro_secs,
            download_parallel: config.max_download_parallel,
        }
    }
}

/// How a run that reached a terminal ledger state ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompilationOutcome {
    /// Result uploaded and the row completed.
    Completed { result_key: String, clip_count: usize },
    /// The window had no submissions; the row was failed with `no submissions`.
    Skipped,
}

enum StagesOutcome {
    Empty,
    Published { result_key: String, clip_count: usize },
}

/// Orchestrates one compilation run over injected collaborators.
pub struct CompilationPipeline {
    ledger: Arc<dyn JobLedger>,
    submissions: Arc<dyn SubmissionRepository>,
    store: Arc<dyn ObjectStore>,
    transcoder: Arc<dyn MediaTranscoder>,
    music: Arc<dyn MusicCatalog>,
    settings: PipelineSettings,
    ledger_retry: RetryConfig,
}

impl CompilationPipeline {
    pub fn new(
        ledger: Arc<dyn JobLedger>,
        submissions: Arc<dyn SubmissionRepository>,
        store: Arc<dyn ObjectStore>,
        transcoder: Arc<dyn MediaTranscoder>,
        music: Arc<dyn MusicCatalog>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            ledger,
            submissions,
            store,
            transcoder,
            music,
            settings,
            ledger_retry: RetryConfig::new("ledger_close_out"),
        }
    }

    pub fn with_ledger_retry(mut self, retry: RetryConfig) -> Self {
        self.ledger_retry = retry;
        self
    }

    /// Run the pipeline for a `pending` ledger row.
    ///
    /// Invalid arguments are rejected before the row is touched. Once the
    /// row is `processing`, every exit leaves it terminal: an empty window
    /// returns `Ok(Skipped)`, any stage failure returns the error after the
    /// row has been failed.
    pub async fn run(
        &self,
        job_id: JobId,
        group_id: GroupId,
        window: CompilationWindow,
    ) -> PipelineResult<CompilationOutcome> {
        if group_id.get() <= 0 {
            return Err(PipelineError::input(format!("invalid group id {}", group_id)));
        }
        if job_id.get() <= 0 {
            return Err(PipelineError::input(format!("invalid job id {}", job_id)));
        }
        if window.end() <= window.start() {
            return Err(PipelineError::input(format!("empty window {}", window)));
        }

        let job = self.ledger.get(job_id).await?;
        if job.group_id != group_id || job.window_start != window.start() {
            return Err(PipelineError::input(format!(
                "job {} belongs to group {} window {}, not group {} window {}",
                job_id,
                job.group_id,
                job.window(),
                group_id,
                window
            )));
        }

        let logger = JobLogger::new(job_id, "compile_window");
        let span = logger.create_span();
        self.run_claimed(job, window, logger).instrument(span).await
    }

    async fn run_claimed(
        &self,
        job: CompilationJob,
        window: CompilationWindow,
        logger: JobLogger,
    ) -> PipelineResult<CompilationOutcome> {
        let started = Instant::now();
        let job = self.ledger.mark_processing(job.id).await?;
        logger.log_start(&format!("group {} {}", job.group_id, window.week_label()));

        let result = self.run_stages(&job, &window, &logger).await;
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(StagesOutcome::Empty) => {
                self.close_out_failed(job.id, REASON_NO_SUBMISSIONS).await?;
                logger.log_skipped(REASON_NO_SUBMISSIONS);
                metrics::record_compilation("skipped", elapsed);
                Ok(CompilationOutcome::Skipped)
            }
            Ok(StagesOutcome::Published { result_key, clip_count }) => {
                let completed = retry_async_when(
                    &self.ledger_retry,
                    || self.ledger.complete(job.id, &result_key),
                    LedgerError::is_transient,
                )
                .await;
                match completed {
                    Ok(_) => {
                        logger.log_completion(&format!("{} clips published to {}", clip_count, result_key));
                        metrics::record_compilation("completed", elapsed);
                        Ok(CompilationOutcome::Completed { result_key, clip_count })
                    }
                    Err(e) => {
                        let err = PipelineError::Ledger(e);
                        self.fail_run(&job, &err, &logger).await;
                        metrics::record_compilation("failed", elapsed);
                        Err(err)
                    }
                }
            }
            Err(err) => {
                self.fail_run(&job, &err, &logger).await;
                if let PipelineError::Transcode { stage, .. } = &err {
                    metrics::record_transcode_failure(stage.as_str());
                }
                metrics::record_compilation("failed", elapsed);
                Err(err)
            }
        }
    }

    async fn run_stages(
        &self,
        job: &CompilationJob,
        window: &CompilationWindow,
        logger: &JobLogger,
    ) -> PipelineResult<StagesOutcome> {
        let submissions = self
            .submissions
            .list_submissions(job.group_id, window)
            .await
            .map_err(PipelineError::Submissions)?;
        if submissions.is_empty() {
            return Ok(StagesOutcome::Empty);
        }
        logger.log_progress(&format!("selected {} submissions", submissions.len()));

        let workspace = RunWorkspace::create(&self.settings.work_dir, job.id).await?;
        let result = self.produce(job, window, &submissions, &workspace, logger).await;
        workspace.close();
        result
    }

    async fn produce(
        &self,
        job: &CompilationJob,
        window: &CompilationWindow,
        submissions: &[Submission],
        workspace: &RunWorkspace,
        logger: &JobLogger,
    ) -> PipelineResult<StagesOutcome> {
        let videos = self.materialize(submissions, workspace).await?;
        logger.log_progress(&format!("downloaded {} videos", videos.len()));

        let (intro, outro) = self.decorate(window, videos.len(), workspace).await?;

        let mut assets = Vec::with_capacity(videos.len() + 2);
        assets.push(intro);
        assets.extend(videos);
        assets.push(outro);
        let clip_count = assets.len();

        let compiled = workspace.file(COMPILATION_FILE);
        self.transcoder
            .concat(&assets, &compiled, self.settings.resolution)
            .await
            .map_err(|e| PipelineError::transcode(Stage::Compile, e))?;
        logger.log_progress(&format!("concatenated {} clips", clip_count));

        let artifact = match job.music_track_id {
            Some(track_id) => self.score(track_id, &compiled, workspace, logger).await?,
            None => compiled,
        };

        let key = result_key(job.group_id, window);
        self.store
            .put(&key, &artifact, content_type_for(&key))
            .await
            .map_err(|e| PipelineError::storage(Stage::Publish, e))?;

        Ok(StagesOutcome::Published {
            result_key: key,
            clip_count,
        })
    }

    /// Download every submission, preserving order in the asset indices.
    async fn materialize(
        &self,
        submissions: &[Submission],
        workspace: &RunWorkspace,
    ) -> PipelineResult<Vec<MediaAsset>> {
        // Collected first: a lazy `Map` over borrowed submissions makes `run` non-Send.
        let downloads: Vec<_> = submissions
            .iter()
            .enumerate()
            .map(|(i, submission)| {
                let index = i + 1;
                let path = workspace.file(&format!(
                    "{:03}_submission_{}.{}",
                    index,
                    submission.id,
                    submission.extension()
                ));
                async move {
                    self.store
                        .get(&submission.storage_key, &path)
                        .await
                        .map_err(|e| PipelineError::storage(Stage::Materialize, e))?;
                    Ok::<_, PipelineError>(MediaAsset::new(index, AssetKind::Submission(submission.id), path))
                }
            })
            .collect();

        futures::stream::iter(downloads)
            .buffered(self.settings.download_parallel.max(1))
            .try_collect()
            .await
    }

    async fn decorate(
        &self,
        window: &CompilationWindow,
        video_count: usize,
        workspace: &RunWorkspace,
    ) -> PipelineResult<(MediaAsset, MediaAsset)> {
        let resolution = self.settings.resolution;

        let intro = TitleCard::intro(window.week_label(), self.settings.intro_secs);
        let intro = self
            .transcoder
            .make_title_card(&intro, resolution, &workspace.file("000_intro.mp4"))
            .await
            .map_err(|e| PipelineError::transcode(Stage::Decorate, e))?
            .with_index(0);

        let outro_index = video_count + 1;
        let outro = TitleCard::outro(&self.settings.product_name, self.settings.outro_secs);
        let outro = self
            .transcoder
            .make_title_card(&outro, resolution, &workspace.file(&format!("{:03}_outro.mp4", outro_index)))
            .await
            .map_err(|e| PipelineError::transcode(Stage::Decorate, e))?
            .with_index(outro_index);

        Ok((intro, outro))
    }

    /// Mix the job's music track under the compilation.
    async fn score(
        &self,
        track_id: weave_models::MusicTrackId,
        compiled: &Path,
        workspace: &RunWorkspace,
        logger: &JobLogger,
    ) -> PipelineResult<PathBuf> {
        let track = match self.music.find_track(track_id).await? {
            Some(track) if track.is_active => track,
            _ => {
                return Err(PipelineError::input(format!(
                    "music track {} is not available",
                    track_id
                )))
            }
        };

        let extension = Path::new(&track.storage_key)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp3");
        let music_path = workspace.file(&format!("music.{}", extension));
        self.store
            .get(&track.storage_key, &music_path)
            .await
            .map_err(|e| PipelineError::storage(Stage::Score, e))?;

        let scored = workspace.file(SCORED_FILE);
        self.transcoder
            .mix_audio(compiled, &music_path, &scored)
            .await
            .map_err(|e| PipelineError::transcode(Stage::Score, e))?;
        logger.log_progress(&format!("mixed music track {}", track.title));
        Ok(scored)
    }

    async fn close_out_failed(&self, id: JobId, reason: &str) -> Result<CompilationJob, LedgerError> {
        retry_async_when(
            &self.ledger_retry,
            || self.ledger.fail(id, reason),
            LedgerError::is_transient,
        )
        .await
    }

    /// Best-effort transition to `failed`; the original error is what the caller sees.
    async fn fail_run(&self, job: &CompilationJob, err: &PipelineError, logger: &JobLogger) {
        logger.log_error(err.kind(), &err.to_string());
        if let PipelineError::Transcode { stderr: Some(stderr), .. } = err {
            warn!(job_id = %job.id, "Transcoder stderr tail:\n{}", stderr);
        }
        if let Err(e) = self.close_out_failed(job.id, &err.failure_reason()).await {
            warn!(job_id = %job.id, "Failed to mark job failed: {}", e);
        }
    }
}
