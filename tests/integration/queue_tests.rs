//! Redis queue integration tests.

use std::time::Duration;

use chrono::NaiveDate;
use weave_models::{CompilationWindow, GroupId, JobId};
use weave_queue::{CompileWindowJob, JobQueue, QueueConfig, QueueError};

fn test_queue(suffix: &str) -> JobQueue {
    dotenvy::dotenv().ok();
    let mut config = QueueConfig::from_env();
    config.stream_name = format!("weave:test:{}", suffix);
    config.consumer_group = format!("weave:test:{}:workers", suffix);
    config.dlq_stream_name = format!("weave:test:{}:dlq", suffix);
    JobQueue::new(config).expect("Failed to create queue")
}

fn unique_job_id() -> JobId {
    JobId(chrono::Utc::now().timestamp_micros())
}

fn week() -> CompilationWindow {
    CompilationWindow::starting_on(NaiveDate::from_ymd_opt(2025, 9, 1).unwrap())
}

/// Test Redis connection and stream setup.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_connection() {
    let queue = test_queue("connection");
    queue.init().await.expect("Failed to initialize queue");
    // Group creation is idempotent
    queue.init().await.expect("Second init should ignore BUSYGROUP");

    let len = queue.len().await.expect("Failed to get queue length");
    println!("Queue length: {}", len);
}

/// Test job enqueue, consume and ack cycle.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_job_enqueue_consume_ack() {
    let queue = test_queue("cycle");
    queue.init().await.expect("Failed to initialize queue");

    let job = CompileWindowJob::new(GroupId(42), unique_job_id(), &week());
    let message_id = queue.enqueue(&job).await.expect("Failed to enqueue");
    println!("Enqueued job {} with message ID {}", job.job_id, message_id);

    let jobs = queue
        .consume("test-consumer", 1000, 10)
        .await
        .expect("Failed to consume");

    let (consumed_id, consumed) = jobs
        .into_iter()
        .find(|(_, j)| j.job_id == job.job_id)
        .expect("Enqueued job not consumed");
    assert_eq!(consumed_id, message_id);
    assert_eq!(consumed.group_id, GroupId(42));
    assert_eq!(consumed.window().expect("window"), week());

    queue.ack(&consumed_id).await.expect("Failed to ack");
}

/// Test that a job id is only enqueued once.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_duplicate_enqueue_rejected() {
    let queue = test_queue("dedup");
    queue.init().await.expect("Failed to initialize queue");

    let job = CompileWindowJob::new(GroupId(7), unique_job_id(), &week());
    queue.enqueue(&job).await.expect("First enqueue");

    let second = queue.enqueue(&job).await;
    assert!(matches!(second, Err(QueueError::Duplicate(_))));
}

/// Test retry counting and dead-lettering.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_retry_and_dlq() {
    let queue = test_queue("dlq");
    queue.init().await.expect("Failed to initialize queue");

    let job = CompileWindowJob::new(GroupId(9), unique_job_id(), &week());
    let message_id = queue.enqueue(&job).await.expect("Failed to enqueue");

    assert_eq!(queue.get_retry_count(&message_id).await.unwrap(), 0);
    assert_eq!(queue.increment_retry(&message_id).await.unwrap(), 1);
    assert_eq!(queue.increment_retry(&message_id).await.unwrap(), 2);

    let before = queue.dlq_len().await.unwrap();
    queue
        .dlq(&message_id, &job, "ledger unavailable")
        .await
        .expect("Failed to dead-letter");
    assert_eq!(queue.dlq_len().await.unwrap(), before + 1);
    assert_eq!(queue.get_retry_count(&message_id).await.unwrap(), 0);
}

/// Test that idle deliveries can be reclaimed by another consumer.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_claim_pending() {
    dotenvy::dotenv().ok();
    let mut config = QueueConfig::from_env();
    config.stream_name = "weave:test:claim".to_string();
    config.consumer_group = "weave:test:claim:workers".to_string();
    config.dlq_stream_name = "weave:test:claim:dlq".to_string();
    config.claim_min_idle = Duration::from_millis(100);
    let queue = JobQueue::new(config).expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    let job = CompileWindowJob::new(GroupId(11), unique_job_id(), &week());
    queue.enqueue(&job).await.expect("Failed to enqueue");
    let delivered = queue.consume("crashed-consumer", 1000, 10).await.unwrap();
    assert!(delivered.iter().any(|(_, j)| j.job_id == job.job_id));

    tokio::time::sleep(Duration::from_millis(200)).await;

    let claimed = queue.claim_pending("healthy-consumer", 10).await.unwrap();
    let (message_id, _) = claimed
        .into_iter()
        .find(|(_, j)| j.job_id == job.job_id)
        .expect("Idle job not claimed");
    queue.ack(&message_id).await.unwrap();
}
