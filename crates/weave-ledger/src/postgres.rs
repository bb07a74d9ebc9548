//! Postgres backends.
//!
//! The ledger owns the `compilation_jobs` table (see `migrations/`). The
//! submission, group and music tables belong to the application database
//! and are only read here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use tracing::{debug, info};

use weave_models::{
    CompilationJob, CompilationWindow, GroupId, JobId, JobStatus, MusicTrack, MusicTrackId,
    NewCompilationJob, Submission, SubmissionId,
};

use crate::directory::{GroupDirectory, MusicCatalog};
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::JobLedger;
use crate::submissions::SubmissionRepository;

const JOB_COLUMNS: &str = "id, group_id, window_start, window_end, status, result_key, \
                           music_track_id, failure_reason, created_at, started_at, completed_at";

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: i64,
    group_id: i64,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    status: String,
    result_key: Option<String>,
    music_track_id: Option<i64>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for CompilationJob {
    type Error = LedgerError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<JobStatus>()
            .map_err(|e| LedgerError::CorruptRow(format!("job {}: {}", row.id, e)))?;
        Ok(CompilationJob {
            id: JobId(row.id),
            group_id: GroupId(row.group_id),
            window_start: row.window_start,
            window_end: row.window_end,
            status,
            result_key: row.result_key,
            music_track_id: row.music_track_id.map(MusicTrackId),
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

/// Ledger stored in the `compilation_jobs` table.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> LedgerResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Ledger schema up to date");
        Ok(())
    }

    /// Explain why a guarded update matched no row.
    async fn explain_miss(&self, id: JobId, to: JobStatus) -> LedgerError {
        match self.get(id).await {
            Ok(current) => match current.status.transition(to) {
                Err(source) => LedgerError::InvalidTransition { id, source },
                // Status changed between the update and this read
                Ok(_) => LedgerError::CorruptRow(format!("job {} changed concurrently", id)),
            },
            Err(e) => e,
        }
    }

    async fn guarded_update(
        &self,
        id: JobId,
        to: JobStatus,
        query: sqlx::query::QueryAs<'_, sqlx::Postgres, JobRow, sqlx::postgres::PgArguments>,
    ) -> LedgerResult<CompilationJob> {
        match query.fetch_optional(&self.pool).await? {
            Some(row) => {
                debug!(job_id = %id, status = to.as_str(), "Ledger transition");
                row.try_into()
            }
            None => Err(self.explain_miss(id, to).await),
        }
    }
}

#[async_trait]
impl JobLedger for PgLedger {
    async fn create_pending(&self, new: NewCompilationJob) -> LedgerResult<CompilationJob> {
        let sql = format!(
            "INSERT INTO compilation_jobs (group_id, window_start, window_end, status, music_track_id) \
             VALUES ($1, $2, $3, 'pending', $4) RETURNING {JOB_COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, JobRow>(&sql)
            .bind(new.group_id.get())
            .bind(new.window.start())
            .bind(new.window.end())
            .bind(new.music_track_id.map(|t| t.get()))
            .fetch_one(&self.pool)
            .await;

        match inserted {
            Ok(row) => row.try_into(),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                let existing = self.find_live(new.group_id, new.window.start()).await?;
                Err(LedgerError::Conflict {
                    group_id: new.group_id,
                    window_start: new.window.start(),
                    // The holder may have failed in between; report it as in progress
                    existing: existing.as_ref().map(|j| j.status).unwrap_or(JobStatus::Pending),
                    existing_id: existing.map(|j| j.id),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: JobId) -> LedgerResult<CompilationJob> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM compilation_jobs WHERE id = $1");
        sqlx::query_as::<_, JobRow>(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(LedgerError::NotFound(id))?
            .try_into()
    }

    async fn find_live(
        &self,
        group_id: GroupId,
        window_start: DateTime<Utc>,
    ) -> LedgerResult<Option<CompilationJob>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM compilation_jobs \
             WHERE group_id = $1 AND window_start = $2 \
               AND status IN ('pending', 'processing', 'completed') \
             ORDER BY id DESC LIMIT 1"
        );
        sqlx::query_as::<_, JobRow>(&sql)
            .bind(group_id.get())
            .bind(window_start)
            .fetch_optional(&self.pool)
            .await?
            .map(CompilationJob::try_from)
            .transpose()
    }

    async fn mark_processing(&self, id: JobId) -> LedgerResult<CompilationJob> {
        let sql = format!(
            "UPDATE compilation_jobs SET status = 'processing', started_at = now() \
             WHERE id = $1 AND status = 'pending' RETURNING {JOB_COLUMNS}"
        );
        let query = sqlx::query_as::<_, JobRow>(&sql).bind(id.get());
        self.guarded_update(id, JobStatus::Processing, query).await
    }

    async fn complete(&self, id: JobId, result_key: &str) -> LedgerResult<CompilationJob> {
        let sql = format!(
            "UPDATE compilation_jobs \
             SET status = 'completed', result_key = $2, failure_reason = NULL, completed_at = now() \
             WHERE id = $1 AND status = 'processing' RETURNING {JOB_COLUMNS}"
        );
        let query = sqlx::query_as::<_, JobRow>(&sql).bind(id.get()).bind(result_key);
        self.guarded_update(id, JobStatus::Completed, query).await
    }

    async fn fail(&self, id: JobId, reason: &str) -> LedgerResult<CompilationJob> {
        let sql = format!(
            "UPDATE compilation_jobs \
             SET status = 'failed', failure_reason = $2, completed_at = now() \
             WHERE id = $1 AND status IN ('pending', 'processing') RETURNING {JOB_COLUMNS}"
        );
        let query = sqlx::query_as::<_, JobRow>(&sql).bind(id.get()).bind(reason);
        self.guarded_update(id, JobStatus::Failed, query).await
    }

    async fn list_stale(&self, cutoff: DateTime<Utc>) -> LedgerResult<Vec<CompilationJob>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM compilation_jobs \
             WHERE status IN ('pending', 'processing') \
               AND COALESCE(started_at, created_at) < $1 \
             ORDER BY id"
        );
        sqlx::query_as::<_, JobRow>(&sql)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(CompilationJob::try_from)
            .collect()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubmissionRow {
    id: i64,
    user_id: Option<i64>,
    group_id: i64,
    prompt_id: Option<i64>,
    s3_key: String,
    duration: Option<f64>,
    submitted_at: DateTime<Utc>,
}

impl From<SubmissionRow> for Submission {
    fn from(row: SubmissionRow) -> Self {
        Submission {
            id: SubmissionId(row.id),
            owner_id: row.user_id,
            group_id: GroupId(row.group_id),
            prompt_id: row.prompt_id,
            storage_key: row.s3_key,
            duration_seconds: row.duration,
            submitted_at: row.submitted_at,
        }
    }
}

/// Submissions read from the `video_submissions` table.
#[derive(Clone)]
pub struct PgSubmissions {
    pool: PgPool,
}

impl PgSubmissions {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubmissionRepository for PgSubmissions {
    async fn list_submissions(
        &self,
        group_id: GroupId,
        window: &CompilationWindow,
    ) -> LedgerResult<Vec<Submission>> {
        let rows = sqlx::query_as::<_, SubmissionRow>(
            r#"
            SELECT id::BIGINT AS id, user_id::BIGINT AS user_id, group_id::BIGINT AS group_id,
                   prompt_id::BIGINT AS prompt_id, s3_key,
                   duration::DOUBLE PRECISION AS duration, submitted_at
            FROM video_submissions
            WHERE group_id = $1 AND submitted_at >= $2 AND submitted_at <= $3
            ORDER BY submitted_at ASC, id ASC
            "#,
        )
        .bind(group_id.get())
        .bind(window.start())
        .bind(window.query_end())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Submission::from).collect())
    }

    async fn count_submissions(&self, group_id: GroupId, window: &CompilationWindow) -> LedgerResult<usize> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM video_submissions \
             WHERE group_id = $1 AND submitted_at >= $2 AND submitted_at <= $3",
        )
        .bind(group_id.get())
        .bind(window.start())
        .bind(window.query_end())
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as usize)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MusicTrackRow {
    id: i64,
    title: String,
    artist: Option<String>,
    s3_key: String,
    duration: Option<f64>,
    is_active: Option<bool>,
}

/// Active groups and music tracks from the application database.
#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GroupDirectory for PgDirectory {
    async fn active_groups(&self) -> LedgerResult<Vec<GroupId>> {
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT id::BIGINT FROM groups WHERE is_active IS TRUE ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(ids.into_iter().map(GroupId).collect())
    }
}

#[async_trait]
impl MusicCatalog for PgDirectory {
    async fn find_track(&self, id: MusicTrackId) -> LedgerResult<Option<MusicTrack>> {
        let row = sqlx::query_as::<_, MusicTrackRow>(
            r#"
            SELECT id::BIGINT AS id, title, artist, s3_key,
                   duration::DOUBLE PRECISION AS duration, is_active
            FROM music_tracks
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| MusicTrack {
            id: MusicTrackId(r.id),
            title: r.title,
            artist: r.artist,
            storage_key: r.s3_key,
            duration_seconds: r.duration,
            is_active: r.is_active.unwrap_or(true),
        }))
    }
}
