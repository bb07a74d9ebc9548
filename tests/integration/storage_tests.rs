//! S3 object store integration tests.

use std::time::Duration;

use weave_storage::{content_type_for, ObjectStore, S3Client, StorageError};

async fn test_client() -> S3Client {
    dotenvy::dotenv().ok();
    S3Client::from_env().await.expect("Failed to create S3 client")
}

/// Test bucket connectivity.
#[tokio::test]
#[ignore = "requires S3 credentials"]
async fn test_s3_connection() {
    let client = test_client().await;
    client
        .check_connectivity()
        .await
        .expect("Failed to reach bucket");
}

/// Test upload, listing, download and signing of one object.
#[tokio::test]
#[ignore = "requires S3 credentials"]
async fn test_put_list_get_sign() {
    let client = test_client().await;
    let dir = tempfile::tempdir().unwrap();

    let prefix = format!("integration/{}/", chrono::Utc::now().timestamp_micros());
    let key = format!("{}clip.mp4", prefix);
    let upload = dir.path().join("upload.mp4");
    tokio::fs::write(&upload, b"not really a video").await.unwrap();

    client
        .put(&key, &upload, content_type_for(&key))
        .await
        .expect("Failed to upload");

    let listed = client.list(&prefix).await.expect("Failed to list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].key, key);
    assert_eq!(listed[0].size, 18);

    let download = dir.path().join("download.mp4");
    client.get(&key, &download).await.expect("Failed to download");
    assert_eq!(tokio::fs::read(&download).await.unwrap(), b"not really a video");

    let url = client
        .sign_get(&key, Duration::from_secs(600))
        .await
        .expect("Failed to sign");
    assert!(url.contains("clip.mp4"));
}

/// Test that a missing object maps to NotFound.
#[tokio::test]
#[ignore = "requires S3 credentials"]
async fn test_get_missing_object() {
    let client = test_client().await;
    let dir = tempfile::tempdir().unwrap();

    let err = client
        .get("integration/does-not-exist.mp4", &dir.path().join("missing.mp4"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
}
