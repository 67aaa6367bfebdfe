use assert_fs::prelude::*;
use predicates::prelude::*;
use smb_gateway::config::{ConnectionProfile, ServiceConfig};
use smb_gateway::error::{ErrorKind, ValidationError};
use smb_gateway::protocols::smb::{ClientCall, InMemoryClient, NtStatus, ShareFixture};
use smb_gateway::{BackendTarget, SmbService, TransferOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn service(fixture: &ShareFixture) -> SmbService {
    let config = ServiceConfig {
        retry_delay_ms: 10,
        ..ServiceConfig::default()
    };
    let target = BackendTarget::Direct(Arc::new(InMemoryClient::factory(fixture.clone())));
    let service = SmbService::new(target, config);
    service.set_config(ConnectionProfile::new("192.168.1.100", "username", "password", "WORK").unwrap());
    service
}

fn quick() -> TransferOptions {
    TransferOptions::default().with_retry(3, Duration::from_millis(10))
}

#[tokio::test]
async fn test_list_share_root_excludes_dot_entries() {
    let fixture = ShareFixture::new("WORK")
        .with_file("report.csv", b"a,b\n".to_vec())
        .with_file("notes.txt", b"hello".to_vec())
        .with_dir("archive");
    let service = service(&fixture);

    let mut names = service
        .get_remote_file_names("", &CancellationToken::new())
        .await
        .unwrap();
    names.sort();

    assert_eq!(names, vec!["archive", "notes.txt", "report.csv"]);
    assert!(!names.iter().any(|n| n == "." || n == ".."));
}

#[tokio::test]
async fn test_download_onto_existing_file_without_overwrite() {
    let fixture = ShareFixture::new("WORK").with_file("report.csv", b"remote".to_vec());
    let service = service(&fixture);
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("report.csv");
    std::fs::write(&local, b"local").unwrap();

    let err = service
        .download_file("report.csv", &local, quick().with_overwrite(false), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.validation(), Some(&ValidationError::LocalFileExists(local.clone())));
    assert_eq!(err.validation().and_then(|v| v.kind()), Some(ErrorKind::Conflict));
    assert!(fixture.calls().is_empty());
    assert_eq!(fixture.clients_created(), 0);
    assert_eq!(std::fs::read(&local).unwrap(), b"local");
}

#[tokio::test]
async fn test_upload_of_missing_local_file() {
    let fixture = ShareFixture::new("WORK");
    let service = service(&fixture);
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("does-not-exist.bin");

    let err = service
        .upload_file(&local, "target.bin", quick(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.validation(), Some(&ValidationError::LocalFileNotFound(local)));
    assert_eq!(err.attempts(), 1);
    assert_eq!(service.stats().snapshot().total_attempts, 0);
    assert!(fixture.calls().is_empty());
}

#[tokio::test]
async fn test_transient_connection_failure_recovers_with_one_retry() {
    let fixture = ShareFixture::new("WORK").with_file("report.csv", b"a,b,c\n".to_vec());
    fixture.fail_connects(1);
    let service = service(&fixture);
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("report.csv");

    service
        .download_file("report.csv", &local, quick(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(std::fs::read(&local).unwrap(), b"a,b,c\n");
    let snapshot = service.stats().snapshot();
    assert_eq!(snapshot.total_retries, 1);
    assert_eq!(snapshot.total_attempts, 2);
    assert_eq!(snapshot.successful_operations, 1);
    assert_eq!(fixture.clients_created(), 2);
}

#[tokio::test]
async fn test_persistent_failure_reports_attempts() {
    let fixture = ShareFixture::new("WORK");
    fixture.fail_connects(10);
    let service = service(&fixture);

    let err = service
        .delete_remote_file("x.txt", quick(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::Connection));
    assert_eq!(err.attempts(), 3);
    assert!(err.to_string().contains("gave up after 3 attempts"));
    assert_eq!(service.stats().snapshot().failures_of(ErrorKind::Connection), 1);
}

#[tokio::test]
async fn test_authentication_failure_is_classified() {
    let fixture = ShareFixture::new("WORK").with_credentials("username", "other-password");
    let service = service(&fixture);

    let err = service
        .get_remote_file_names("", &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::Authentication));
    assert_eq!(err.status(), Some(NtStatus::LOGON_FAILURE));
}

#[tokio::test]
async fn test_upload_download_delete_round() {
    let fixture = ShareFixture::new("WORK").with_dir("inbox").with_io_size(16);
    let service = service(&fixture);
    let cancel = CancellationToken::new();
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.txt");
    let copy = dir.path().join("copy.txt");
    let body = "line one\nline two\nline three\n".repeat(10);
    std::fs::write(&source, &body).unwrap();

    service
        .upload_file(&source, "inbox/source.txt", quick(), &cancel)
        .await
        .unwrap();
    assert_eq!(fixture.file("inbox/source.txt").unwrap(), body.as_bytes());
    assert!(service.file_exists("inbox/source.txt", &cancel).await.unwrap());

    service
        .download_file("inbox/source.txt", &copy, quick(), &cancel)
        .await
        .unwrap();
    assert_eq!(std::fs::read_to_string(&copy).unwrap(), body);

    service
        .delete_remote_file("inbox/source.txt", quick(), &cancel)
        .await
        .unwrap();
    assert!(fixture.file("inbox/source.txt").is_none());
    assert!(!service.file_exists("inbox/source.txt", &cancel).await.unwrap());
    assert_eq!(fixture.open_handles(), 0);
}

#[tokio::test]
async fn test_upload_without_overwrite_onto_existing_remote() {
    let fixture = ShareFixture::new("WORK").with_file("keep.txt", b"original".to_vec());
    let service = service(&fixture);
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("keep.txt");
    std::fs::write(&source, b"replacement").unwrap();

    let err = service
        .upload_file(
            &source,
            "keep.txt",
            quick().with_retry(1, Duration::ZERO).with_overwrite(false),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::Conflict));
    assert_eq!(fixture.file("keep.txt").unwrap(), b"original");
}

#[tokio::test]
async fn test_existing_remote_conflict_is_not_retried() {
    let fixture = ShareFixture::new("WORK").with_file("keep.txt", b"original".to_vec());
    let service = service(&fixture);
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("keep.txt");
    std::fs::write(&source, b"replacement").unwrap();

    let err = service
        .upload_file(
            &source,
            "keep.txt",
            quick().with_overwrite(false),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::Conflict));
    assert_eq!(err.attempts(), 1);
    assert_eq!(fixture.clients_created(), 1);
    assert_eq!(service.stats().snapshot().total_retries, 0);
    assert_eq!(fixture.file("keep.txt").unwrap(), b"original");
}

#[tokio::test]
async fn test_download_overwrite_replaces_existing_file() {
    let fixture = ShareFixture::new("WORK").with_file("data.txt", b"fresh contents".to_vec());
    let service = service(&fixture);
    let temp = assert_fs::TempDir::new().unwrap();
    let local = temp.child("data.txt");
    local.write_str("stale").unwrap();

    service
        .download_file("data.txt", local.path(), quick(), &CancellationToken::new())
        .await
        .unwrap();

    local.assert("fresh contents");
    temp.child("missing.txt").assert(predicate::path::missing());
    temp.close().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_retry_delay() {
    let fixture = ShareFixture::new("WORK");
    fixture.fail_connects(5);
    let service = service(&fixture);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = service
        .delete_remote_file(
            "x.txt",
            TransferOptions::default().with_retry(5, Duration::from_secs(10)),
            &cancel,
        )
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(fixture.clients_created(), 1);
    assert_eq!(service.stats().snapshot().cancelled_operations, 1);
}

#[tokio::test]
async fn test_every_attempt_tears_down_its_session() {
    let fixture = ShareFixture::new("WORK");
    let service = service(&fixture);

    let _ = service
        .delete_remote_file("missing.txt", quick(), &CancellationToken::new())
        .await
        .unwrap_err();

    let disconnects = fixture
        .calls()
        .iter()
        .filter(|c| **c == ClientCall::Disconnect)
        .count();
    assert_eq!(disconnects, 3);
    assert_eq!(fixture.teardown_calls().len(), 9);
}
