use smb_gateway::ffi::{global_registry, HandleStatus, Outcome};
use std::collections::HashSet;
use std::ffi::CString;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct ReleaseMarker(Arc<AtomicUsize>);

impl Drop for ReleaseMarker {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_racing_success_callbacks_complete_once() {
    let released = Arc::new(AtomicUsize::new(0));
    let op = global_registry().create_handle();
    let id = op.id();
    op.keep_alive(ReleaseMarker(released.clone())).unwrap();
    let pair = op.begin_callbacks().unwrap();

    let threads: Vec<_> = (0..2)
        .map(|n| {
            thread::spawn(move || {
                let payload = CString::new(format!("caller-{}", n)).unwrap();
                (pair.on_success)(id, payload.as_ptr());
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    match op.wait(&CancellationToken::new()).await {
        Outcome::Succeeded(Some(payload)) => assert!(payload.starts_with("caller-")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(released.load(Ordering::SeqCst), 1);
    assert_eq!(global_registry().status(id), None);
    assert!(global_registry().stats().snapshot().unknown_callbacks >= 1);
}

#[tokio::test]
async fn test_success_after_cancel_is_ignored() {
    let released = Arc::new(AtomicUsize::new(0));
    let op = global_registry().create_handle();
    let id = op.id();
    op.keep_alive(ReleaseMarker(released.clone())).unwrap();
    let pair = op.begin_callbacks().unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    assert_eq!(op.wait(&cancel).await, Outcome::Canceled);
    assert_eq!(released.load(Ordering::SeqCst), 1);

    let late = thread::spawn(move || (pair.on_success)(id, std::ptr::null()));
    late.join().unwrap();

    assert_eq!(released.load(Ordering::SeqCst), 1);
    assert_eq!(global_registry().status(id), None);
}

#[tokio::test]
async fn test_error_callback_from_another_thread() {
    let op = global_registry().create_handle();
    let id = op.id();
    let pair = op.begin_callbacks().unwrap();
    assert_eq!(global_registry().status(id), Some(HandleStatus::Running));

    thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        let message = CString::new("share not reachable").unwrap();
        (pair.on_error)(id, 1, message.as_ptr());
    });

    assert_eq!(
        op.wait(&CancellationToken::new()).await,
        Outcome::Failed {
            code: 1,
            message: "share not reachable".to_string()
        }
    );
}

#[tokio::test]
async fn test_many_handles_complete_independently() {
    let ops: Vec<_> = (0..32).map(|_| global_registry().create_handle()).collect();
    let ids: HashSet<i32> = ops.iter().map(|op| op.id()).collect();
    assert_eq!(ids.len(), ops.len());

    for op in &ops {
        let id = op.id();
        let pair = op.begin_callbacks().unwrap();
        thread::spawn(move || {
            let payload = CString::new(id.to_string()).unwrap();
            (pair.on_success)(id, payload.as_ptr());
        });
    }

    for op in ops {
        let id = op.id();
        assert_eq!(
            op.wait(&CancellationToken::new()).await,
            Outcome::Succeeded(Some(id.to_string()))
        );
    }
}

#[test]
fn test_dropping_pending_operation_releases_resources() {
    let released = Arc::new(AtomicUsize::new(0));
    let op = global_registry().create_handle();
    let id = op.id();
    op.keep_alive(ReleaseMarker(released.clone())).unwrap();
    op.keep_alive(CString::new("config").unwrap()).unwrap();
    let pair = op.begin_callbacks().unwrap();

    drop(op);
    assert_eq!(released.load(Ordering::SeqCst), 1);
    assert_eq!(global_registry().status(id), None);

    (pair.on_success)(id, std::ptr::null());
    assert_eq!(released.load(Ordering::SeqCst), 1);
}
