use smb_gateway::config::ConnectionProfile;
use smb_gateway::error::{ErrorKind, SmbError};
use smb_gateway::protocols::smb::{
    ops, ClientCall, CreateRequest, InMemoryClient, NtStatus, RemoteFileClient, SessionExecutor,
    ShareFixture,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn profile() -> ConnectionProfile {
    ConnectionProfile::new("192.168.1.100", "username", "password", "WORK").unwrap()
}

fn executor(fixture: &ShareFixture) -> SessionExecutor {
    SessionExecutor::new(Arc::new(InMemoryClient::factory(fixture.clone())))
}

#[tokio::test]
async fn test_failed_operation_releases_in_reverse_order_exactly_once() {
    let fixture = ShareFixture::new("WORK");
    let err = executor(&fixture)
        .run(&profile(), &CancellationToken::new(), |client| {
            Box::pin(async move { ops::delete(client, "no-such-file.txt").await })
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::NotFound));
    assert_eq!(
        fixture.teardown_calls(),
        vec![ClientCall::TreeDisconnect, ClientCall::Logoff, ClientCall::Disconnect]
    );
}

#[tokio::test]
async fn test_protocol_steps_run_in_order() {
    let fixture = ShareFixture::new("WORK").with_file("a.txt", b"a".to_vec());
    executor(&fixture)
        .run(&profile(), &CancellationToken::new(), |client| {
            Box::pin(async move { ops::list_directory(client, "").await })
        })
        .await
        .unwrap();

    assert_eq!(
        fixture.calls(),
        vec![
            ClientCall::Connect,
            ClientCall::Login("username".to_string()),
            ClientCall::TreeConnect("WORK".to_string()),
            ClientCall::CreateFile(String::new()),
            ClientCall::QueryDirectory,
            ClientCall::Close,
            ClientCall::TreeDisconnect,
            ClientCall::Logoff,
            ClientCall::Disconnect,
        ]
    );
}

#[tokio::test]
async fn test_teardown_errors_never_replace_the_operation_error() {
    let fixture = ShareFixture::new("WORK");
    fixture.fail_teardown();
    let err = executor(&fixture)
        .run(&profile(), &CancellationToken::new(), |_client| {
            Box::pin(async { Err::<(), _>(SmbError::from_status(NtStatus::SHARING_VIOLATION, "open")) })
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::Conflict));
    assert_eq!(fixture.teardown_calls().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_transfer_tears_down_and_leaves_no_file() {
    let fixture = ShareFixture::new("WORK")
        .with_file("slow.bin", vec![1; 4096])
        .with_io_size(512);
    fixture.set_read_delay(Duration::from_secs(1));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        trigger.cancel();
    });
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("slow.bin");
    let target = local.clone();
    let transfer_cancel = cancel.clone();

    let err = executor(&fixture)
        .run(&profile(), &cancel, move |client| {
            Box::pin(async move { ops::download(client, "slow.bin", &target, &transfer_cancel).await })
        })
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(!local.exists());
    assert_eq!(fixture.open_handles(), 0);
    let calls = fixture.calls();
    let last_read = calls.iter().rposition(|c| *c == ClientCall::Read).unwrap();
    assert_eq!(
        calls[last_read + 1..].to_vec(),
        vec![
            ClientCall::Close,
            ClientCall::TreeDisconnect,
            ClientCall::Logoff,
            ClientCall::Disconnect,
        ]
    );
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_upload_discards_remote_file_before_close() {
    let fixture = ShareFixture::new("WORK")
        .with_file("keep.txt", b"ORIGINAL".to_vec())
        .with_io_size(8);
    fixture.set_write_delay(Duration::from_secs(1));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        trigger.cancel();
    });
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("replacement.bin");
    std::fs::write(&local, vec![7u8; 64]).unwrap();
    let transfer_cancel = cancel.clone();

    let err = executor(&fixture)
        .run(&profile(), &cancel, move |client| {
            Box::pin(async move { ops::upload(client, &local, "keep.txt", true, &transfer_cancel).await })
        })
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(fixture.file("keep.txt"), None);
    assert_eq!(fixture.open_handles(), 0);
    let calls = fixture.calls();
    let last_write = calls.iter().rposition(|c| *c == ClientCall::Write).unwrap();
    assert_eq!(
        calls[last_write + 1..].to_vec(),
        vec![
            ClientCall::SetDeletePending(true),
            ClientCall::Close,
            ClientCall::TreeDisconnect,
            ClientCall::Logoff,
            ClientCall::Disconnect,
        ]
    );
}

#[tokio::test]
async fn test_dropped_call_still_releases_session() {
    let fixture = ShareFixture::new("WORK");
    fixture.set_read_delay(Duration::from_secs(60));
    let fixture_for_file = fixture.clone().with_file("big.bin", vec![0; 10]);
    let exec = executor(&fixture_for_file);
    let profile = profile();

    let cancel = CancellationToken::new();
    let call = exec.run(&profile, &cancel, |client| {
        Box::pin(async move {
            let handle = client
                .create_file("big.bin", CreateRequest::read_file())
                .await
                .map_err(|s| SmbError::from_status(s, "open"))?;
            let _ = client.read(handle, 0, 10).await;
            Ok::<(), SmbError>(())
        })
    });
    let timed_out = tokio::time::timeout(Duration::from_millis(50), call).await;
    assert!(timed_out.is_err());

    for _ in 0..50 {
        if fixture.teardown_calls().len() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        fixture.teardown_calls(),
        vec![ClientCall::TreeDisconnect, ClientCall::Logoff, ClientCall::Disconnect]
    );
}
