//! Completion bridge for operations running behind a C callback boundary
//!
//! A foreign client receives an integer handle id plus two `extern "C"`
//! trampolines and reports completion by calling one of them with that id.
//! The registry maps ids to pending operations, guarantees at most one
//! terminal transition per handle, and releases everything attached to a
//! handle exactly once, on that transition.
//!
//! Every lookup, insert, transition, and removal happens under one lock.

use std::any::Any;
use std::collections::HashMap;
use std::ffi::CStr;
use std::os::raw::c_char;
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::instrumentation::OperationStats;

/// Called by the foreign side on success; `payload` may be null
pub type SuccessTrampoline = extern "C" fn(id: i32, payload: *const c_char);

/// Called by the foreign side on failure; `message` may be null
pub type ErrorTrampoline = extern "C" fn(id: i32, code: i32, message: *const c_char);

/// Function pointers handed to the foreign side for one handle
#[derive(Debug, Clone, Copy)]
pub struct CallbackPair {
    pub on_success: SuccessTrampoline,
    pub on_error: ErrorTrampoline,
}

/// Lifecycle state of a registered handle
///
/// Terminal handles are removed from the table, so only `Idle` and
/// `Running` are ever observed through [`AsyncOperationRegistry::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleStatus {
    Idle,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

/// Terminal result delivered to the awaiting side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded(Option<String>),
    Failed { code: i32, message: String },
    Canceled,
}

impl Outcome {
    pub fn status(&self) -> HandleStatus {
        match self {
            Outcome::Succeeded(_) => HandleStatus::Succeeded,
            Outcome::Failed { .. } => HandleStatus::Failed,
            Outcome::Canceled => HandleStatus::Canceled,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("async handle {0} is not registered")]
    UnknownHandle(i32),

    #[error("callbacks for async handle {0} were already issued")]
    AlreadyStarted(i32),
}

struct Entry {
    status: HandleStatus,
    sender: Option<oneshot::Sender<Outcome>>,
    callbacks: Option<CallbackPair>,
    keep_alive: Vec<Box<dyn Any + Send>>,
}

struct RegistryState {
    next_id: i32,
    entries: HashMap<i32, Entry>,
    released: u64,
}

/// Process-wide table of in-flight foreign operations
pub struct AsyncOperationRegistry {
    state: Mutex<RegistryState>,
    stats: OperationStats,
}

static GLOBAL_REGISTRY: once_cell::sync::Lazy<AsyncOperationRegistry> =
    once_cell::sync::Lazy::new(AsyncOperationRegistry::new);

/// The registry the trampolines report into
pub fn global_registry() -> &'static AsyncOperationRegistry {
    &GLOBAL_REGISTRY
}

impl AsyncOperationRegistry {
    fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                next_id: 1,
                entries: HashMap::new(),
                released: 0,
            }),
            stats: OperationStats::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Allocate a fresh id in the `Idle` state
    pub fn create_handle(&'static self) -> AsyncOperation {
        let (sender, receiver) = oneshot::channel();
        let mut state = self.lock();

        let mut id = state.next_id;
        while state.entries.contains_key(&id) {
            id = next_positive(id);
        }
        state.next_id = next_positive(id);

        state.entries.insert(
            id,
            Entry {
                status: HandleStatus::Idle,
                sender: Some(sender),
                callbacks: None,
                keep_alive: Vec::new(),
            },
        );
        drop(state);

        debug!(handle = id, "async handle created");
        AsyncOperation {
            id,
            receiver,
            registry: self,
        }
    }

    /// Move `id` from `Idle` to `Running` and hand out its trampolines
    ///
    /// The returned pointers stay valid for the life of the process; they
    /// report into [`global_registry`].
    pub fn begin_callbacks(&self, id: i32) -> Result<CallbackPair, RegistryError> {
        let mut state = self.lock();
        let entry = state
            .entries
            .get_mut(&id)
            .ok_or(RegistryError::UnknownHandle(id))?;
        if entry.status != HandleStatus::Idle {
            return Err(RegistryError::AlreadyStarted(id));
        }

        let pair = CallbackPair {
            on_success: success_trampoline,
            on_error: error_trampoline,
        };
        entry.status = HandleStatus::Running;
        entry.callbacks = Some(pair);
        Ok(pair)
    }

    /// Tie `resource` to the handle so it is dropped on the terminal transition
    pub fn keep_alive<R: Any + Send>(&self, id: i32, resource: R) -> Result<(), RegistryError> {
        let mut state = self.lock();
        let entry = state
            .entries
            .get_mut(&id)
            .ok_or(RegistryError::UnknownHandle(id))?;
        entry.keep_alive.push(Box::new(resource));
        Ok(())
    }

    /// Complete a running handle successfully
    pub fn on_success(&self, id: i32, payload: Option<String>) -> bool {
        self.complete(id, Outcome::Succeeded(payload))
    }

    /// Complete a running handle with a foreign error code
    pub fn on_failure(&self, id: i32, code: i32, message: String) -> bool {
        self.complete(id, Outcome::Failed { code, message })
    }

    /// Force a handle into `Canceled` unless it already finished
    ///
    /// Returns false if the handle was already terminal.
    pub fn cancel(&self, id: i32) -> bool {
        let removed = {
            let mut state = self.lock();
            let removed = state.entries.remove(&id);
            if removed.is_some() {
                state.released += 1;
            }
            removed
        };

        match removed {
            Some(entry) => {
                debug!(handle = id, "async handle canceled");
                finish(entry, Outcome::Canceled);
                true
            }
            None => false,
        }
    }

    pub fn status(&self, id: i32) -> Option<HandleStatus> {
        self.lock().entries.get(&id).map(|e| e.status)
    }

    /// Number of live handles
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Terminal transitions performed so far
    pub fn released(&self) -> u64 {
        self.lock().released
    }

    pub fn stats(&self) -> &OperationStats {
        &self.stats
    }

    fn complete(&self, id: i32, outcome: Outcome) -> bool {
        let removed = {
            let mut state = self.lock();
            let status = state.entries.get(&id).map(|e| e.status);
            match status {
                Some(HandleStatus::Running) => {
                    state.released += 1;
                    state.entries.remove(&id)
                }
                Some(status) => {
                    drop(state);
                    warn!(handle = id, ?status, "completion for a handle that is not running ignored");
                    return false;
                }
                None => None,
            }
        };

        match removed {
            Some(entry) => {
                debug!(handle = id, status = ?outcome.status(), "async handle completed");
                finish(entry, outcome);
                true
            }
            None => {
                error!(handle = id, "completion for unknown async handle");
                self.stats.record_unknown_callback();
                false
            }
        }
    }
}

/// Deliver the outcome and release the entry's resources outside the lock
fn finish(mut entry: Entry, outcome: Outcome) {
    entry.status = outcome.status();
    entry.callbacks = None;
    if let Some(sender) = entry.sender.take() {
        let _ = sender.send(outcome);
    }
    drop(entry);
}

fn next_positive(id: i32) -> i32 {
    if id >= i32::MAX {
        1
    } else {
        id + 1
    }
}

unsafe fn owned_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }
}

extern "C" fn success_trampoline(id: i32, payload: *const c_char) {
    // SAFETY: the foreign side passes null or a NUL-terminated string valid for this call
    let payload = unsafe { owned_string(payload) };
    global_registry().on_success(id, payload);
}

extern "C" fn error_trampoline(id: i32, code: i32, message: *const c_char) {
    // SAFETY: as above
    let message = unsafe { owned_string(message) }.unwrap_or_default();
    global_registry().on_failure(id, code, message);
}

/// Awaitable side of a registered handle
///
/// Dropping it before completion cancels the handle.
pub struct AsyncOperation {
    id: i32,
    receiver: oneshot::Receiver<Outcome>,
    registry: &'static AsyncOperationRegistry,
}

impl std::fmt::Debug for AsyncOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncOperation").field("id", &self.id).finish()
    }
}

impl AsyncOperation {
    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn begin_callbacks(&self) -> Result<CallbackPair, RegistryError> {
        self.registry.begin_callbacks(self.id)
    }

    pub fn keep_alive<R: Any + Send>(&self, resource: R) -> Result<(), RegistryError> {
        self.registry.keep_alive(self.id, resource)
    }

    /// Wait for the terminal outcome, canceling the handle if `cancel` fires first
    pub async fn wait(mut self, cancel: &CancellationToken) -> Outcome {
        tokio::select! {
            biased;
            outcome = &mut self.receiver => return outcome.unwrap_or(Outcome::Canceled),
            _ = cancel.cancelled() => {}
        }

        self.registry.cancel(self.id);
        // Either cancel() delivered Canceled or a completion won the race
        (&mut self.receiver).await.unwrap_or(Outcome::Canceled)
    }
}

impl Drop for AsyncOperation {
    fn drop(&mut self) {
        self.registry.cancel(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn registry() -> &'static AsyncOperationRegistry {
        Box::leak(Box::new(AsyncOperationRegistry::new()))
    }

    struct ReleaseMarker(Arc<AtomicUsize>);

    impl Drop for ReleaseMarker {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_lifecycle_success() {
        let registry = registry();
        let op = registry.create_handle();
        let id = op.id();
        assert_eq!(registry.status(id), Some(HandleStatus::Idle));

        op.begin_callbacks().unwrap();
        assert_eq!(registry.status(id), Some(HandleStatus::Running));

        assert!(registry.on_success(id, Some("[]".to_string())));
        assert_eq!(registry.status(id), None);
        assert_eq!(
            op.wait(&CancellationToken::new()).await,
            Outcome::Succeeded(Some("[]".to_string()))
        );
    }

    #[test]
    fn test_begin_twice_is_state_error() {
        let registry = registry();
        let op = registry.create_handle();
        op.begin_callbacks().unwrap();
        assert_eq!(
            op.begin_callbacks().unwrap_err(),
            RegistryError::AlreadyStarted(op.id())
        );
    }

    #[test]
    fn test_double_success_releases_once() {
        let registry = registry();
        let released = Arc::new(AtomicUsize::new(0));
        let op = registry.create_handle();
        op.keep_alive(ReleaseMarker(released.clone())).unwrap();
        op.begin_callbacks().unwrap();

        assert!(registry.on_success(op.id(), None));
        assert!(!registry.on_success(op.id(), None));

        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(registry.released(), 1);
        assert!(registry.is_empty());
        assert_eq!(registry.stats().snapshot().unknown_callbacks, 1);
    }

    #[test]
    fn test_success_after_cancel_is_noop() {
        let registry = registry();
        let released = Arc::new(AtomicUsize::new(0));
        let op = registry.create_handle();
        op.keep_alive(ReleaseMarker(released.clone())).unwrap();
        op.begin_callbacks().unwrap();

        assert!(registry.cancel(op.id()));
        assert!(!registry.on_success(op.id(), None));
        assert!(!registry.cancel(op.id()));

        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(registry.released(), 1);
    }

    #[test]
    fn test_completion_before_begin_ignored() {
        let registry = registry();
        let op = registry.create_handle();
        assert!(!registry.on_failure(op.id(), 1, "early".to_string()));
        assert_eq!(registry.status(op.id()), Some(HandleStatus::Idle));
    }

    #[test]
    fn test_drop_cancels_pending_handle() {
        let registry = registry();
        let op = registry.create_handle();
        let id = op.id();
        op.begin_callbacks().unwrap();
        drop(op);

        assert_eq!(registry.status(id), None);
        assert_eq!(registry.released(), 1);
    }

    #[test]
    fn test_ids_are_unique_while_live() {
        let registry = registry();
        let a = registry.create_handle();
        let b = registry.create_handle();
        assert_ne!(a.id(), b.id());
        assert_eq!(registry.len(), 2);
        assert_eq!(next_positive(i32::MAX), 1);
    }

    #[tokio::test]
    async fn test_wait_cancelled() {
        let registry = registry();
        let op = registry.create_handle();
        let id = op.id();
        op.begin_callbacks().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(op.wait(&cancel).await, Outcome::Canceled);
        assert!(!registry.on_success(id, None));
    }

    #[tokio::test]
    async fn test_trampolines_reach_global_registry() {
        let op = global_registry().create_handle();
        let pair = op.begin_callbacks().unwrap();
        let message = CString::new("login failed").unwrap();

        (pair.on_error)(op.id(), 2, message.as_ptr());

        assert_eq!(
            op.wait(&CancellationToken::new()).await,
            Outcome::Failed {
                code: 2,
                message: "login failed".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_null_payload() {
        let op = global_registry().create_handle();
        let pair = op.begin_callbacks().unwrap();
        (pair.on_success)(op.id(), std::ptr::null());
        assert_eq!(op.wait(&CancellationToken::new()).await, Outcome::Succeeded(None));
    }
}
