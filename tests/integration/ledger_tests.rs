//! Postgres ledger integration tests.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use weave_ledger::{JobLedger, LedgerConfig, LedgerError, PgLedger, PgSubmissions, SubmissionRepository};
use weave_models::{CompilationWindow, GroupId, JobStatus, NewCompilationJob, SubmissionId};

async fn test_ledger() -> PgLedger {
    dotenvy::dotenv().ok();
    let config = LedgerConfig::from_env().expect("DATABASE_URL must be set");
    let pool = config.connect().await.expect("Failed to connect to Postgres");
    let ledger = PgLedger::new(pool);
    ledger.migrate().await.expect("Failed to run migrations");
    ledger
}

/// Group ids derived from the clock so reruns do not collide.
fn unique_group() -> GroupId {
    GroupId(Utc::now().timestamp_micros())
}

fn week() -> CompilationWindow {
    CompilationWindow::starting_on(NaiveDate::from_ymd_opt(2025, 9, 1).unwrap())
}

/// Test the full lifecycle of a row.
#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_job_lifecycle() {
    let ledger = test_ledger().await;
    let group = unique_group();

    let job = ledger
        .create_pending(NewCompilationJob::new(group, week()))
        .await
        .expect("Failed to create job");
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.window(), week());

    let job = ledger.mark_processing(job.id).await.expect("mark_processing");
    assert_eq!(job.status, JobStatus::Processing);
    assert!(job.started_at.is_some());

    let key = format!("compilations/{}/2025-09-01.mp4", group);
    let job = ledger.complete(job.id, &key).await.expect("complete");
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result_key.as_deref(), Some(key.as_str()));

    let found = ledger
        .find_live(group, week().start())
        .await
        .expect("find_live")
        .expect("completed row is live");
    assert_eq!(found.id, job.id);

    // Terminal rows do not move
    let err = ledger.fail(job.id, "late failure").await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidTransition { .. }));
}

/// Test that a second live row for the same window is refused.
#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_window_uniqueness() {
    let ledger = test_ledger().await;
    let group = unique_group();

    let first = ledger
        .create_pending(NewCompilationJob::new(group, week()))
        .await
        .expect("first insert");

    let second = ledger.create_pending(NewCompilationJob::new(group, week())).await;
    assert!(second.unwrap_err().is_conflict());

    // A failed row frees the window
    ledger.fail(first.id, "dispatch failed").await.expect("fail");
    let retry = ledger
        .create_pending(NewCompilationJob::new(group, week()))
        .await
        .expect("retry after failure");
    assert_ne!(retry.id, first.id);
}

/// Test that concurrent inserts for one window produce exactly one row.
#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_concurrent_create_pending() {
    let ledger = Arc::new(test_ledger().await);
    let group = unique_group();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                ledger
                    .create_pending(NewCompilationJob::new(group, week()))
                    .await
            })
        })
        .collect();

    let mut created = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(e) if e.is_conflict() => conflicts += 1,
            Err(e) => panic!("Unexpected error: {}", e),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(conflicts, 7);
}

/// Test that rows left unfinished show up in the stale listing.
#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_list_stale() {
    let ledger = test_ledger().await;
    let group = unique_group();

    let job = ledger
        .create_pending(NewCompilationJob::new(group, week()))
        .await
        .expect("insert");

    let stale = ledger
        .list_stale(Utc::now() + Duration::seconds(5))
        .await
        .expect("list_stale");
    assert!(stale.iter().any(|j| j.id == job.id));

    let fresh = ledger
        .list_stale(Utc::now() - Duration::hours(1))
        .await
        .expect("list_stale");
    assert!(!fresh.iter().any(|j| j.id == job.id));
}

/// Submissions read from the application's `video_submissions` table, whose
/// integer columns are INT4.
#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_submissions_from_application_table() {
    dotenvy::dotenv().ok();
    let mut config = LedgerConfig::from_env().expect("DATABASE_URL must be set");
    // One connection so the temporary table is visible to every query.
    config.max_connections = 1;
    let pool = config.connect().await.expect("Failed to connect to Postgres");

    sqlx::query(
        r#"
        CREATE TEMPORARY TABLE video_submissions (
            id SERIAL PRIMARY KEY,
            user_id INTEGER NOT NULL,
            group_id INTEGER NOT NULL,
            prompt_id INTEGER NOT NULL,
            s3_key VARCHAR NOT NULL,
            duration DOUBLE PRECISION NOT NULL,
            submitted_at TIMESTAMPTZ DEFAULT now()
        )
        "#,
    )
    .execute(&pool)
    .await
    .expect("create video_submissions");

    let rows = [
        (7, "groups/7/videos/late.mp4", Utc.with_ymd_and_hms(2025, 9, 7, 23, 30, 0).unwrap()),
        (7, "groups/7/videos/early.mp4", Utc.with_ymd_and_hms(2025, 9, 1, 8, 0, 0).unwrap()),
        (7, "groups/7/videos/next_week.mp4", Utc.with_ymd_and_hms(2025, 9, 8, 0, 0, 0).unwrap()),
        (8, "groups/8/videos/other.mp4", Utc.with_ymd_and_hms(2025, 9, 2, 8, 0, 0).unwrap()),
    ];
    for (group, key, at) in rows {
        sqlx::query(
            "INSERT INTO video_submissions (user_id, group_id, prompt_id, s3_key, duration, submitted_at) \
             VALUES (1, $1, 1, $2, 12.5, $3)",
        )
        .bind(group)
        .bind(key)
        .bind(at)
        .execute(&pool)
        .await
        .expect("insert submission");
    }

    let repo = PgSubmissions::new(pool);
    let submissions = repo
        .list_submissions(GroupId(7), &week())
        .await
        .expect("list_submissions");

    let keys: Vec<_> = submissions.iter().map(|s| s.storage_key.as_str()).collect();
    assert_eq!(keys, vec!["groups/7/videos/early.mp4", "groups/7/videos/late.mp4"]);
    assert_eq!(submissions[0].id, SubmissionId(2));
    assert_eq!(submissions[0].group_id, GroupId(7));
    assert_eq!(submissions[0].duration_seconds, Some(12.5));

    let count = repo
        .count_submissions(GroupId(7), &week())
        .await
        .expect("count_submissions");
    assert_eq!(count, 2);
}
