/*!
 * Service facade: the single entry point for share operations
 *
 * Arguments are validated locally before anything touches the network;
 * validation failures are returned immediately and never retried. Valid
 * calls run through a [`RetryPolicy`] wrapped around the configured
 * [`ShareBackend`], which opens a fresh session per attempt.
 */

use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{backend_for, BackendTarget, ShareBackend};
use crate::config::{ConnectionProfile, ServiceConfig};
use crate::core::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
use crate::error::{PathRole, Result, ValidationError};
use crate::instrumentation::OperationStats;

/// Characters rejected in remote share paths
const INVALID_REMOTE_CHARS: &[char] = &['<', '>', '"', '|', '?', '*'];

/// Per-call retry and overwrite settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOptions {
    /// Replace an existing destination (ignored by delete)
    pub overwrite: bool,
    /// Total attempts, clamped to 1..=5
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            overwrite: true,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl TransferOptions {
    /// Retry settings taken from the service configuration
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            overwrite: true,
            max_attempts: config.max_attempts,
            retry_delay: config.retry_delay(),
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.retry_delay = delay;
        self
    }
}

/// Facade over one backend and one replaceable connection profile
pub struct SmbService {
    backend: Arc<dyn ShareBackend>,
    config: ServiceConfig,
    profile: RwLock<Option<Arc<ConnectionProfile>>>,
    stats: OperationStats,
}

impl std::fmt::Debug for SmbService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmbService")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Drop for SmbService {
    fn drop(&mut self) {
        if self.stats.has_activity() {
            self.stats.emit();
        }
    }
}

impl SmbService {
    /// Build a service for `target` with no profile set yet
    pub fn new(target: BackendTarget, config: ServiceConfig) -> Self {
        let backend = backend_for(target, &config);
        Self::with_backend(backend, config)
    }

    pub fn with_backend(backend: Arc<dyn ShareBackend>, config: ServiceConfig) -> Self {
        Self {
            backend,
            config,
            profile: RwLock::new(None),
            stats: OperationStats::new(),
        }
    }

    /// Replace the connection profile used by subsequent calls
    ///
    /// Calls already in flight keep the profile they started with.
    pub fn set_config(&self, profile: ConnectionProfile) {
        info!(profile = %profile, "connection profile updated");
        let mut slot = self.profile.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(Arc::new(profile));
    }

    /// The current profile, if one was set
    pub fn profile(&self) -> Option<Arc<ConnectionProfile>> {
        self.profile
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn stats(&self) -> &OperationStats {
        &self.stats
    }

    /// Default options derived from the service configuration
    pub fn default_options(&self) -> TransferOptions {
        TransferOptions::from_config(&self.config)
    }

    /// Names in `dir` on the share, excluding `.` and `..`
    ///
    /// An empty `dir` lists the share root.
    pub async fn get_remote_file_names(
        &self,
        dir: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let outcome = self.list(dir, cancel).await;
        self.finish("list", outcome)
    }

    /// Copy `remote` to `local`
    ///
    /// With `overwrite` unset an existing `local` fails with
    /// [`ValidationError::LocalFileExists`] before any network call. The
    /// destination is replaced only once the whole file has arrived.
    pub async fn download_file(
        &self,
        remote: &str,
        local: &Path,
        options: TransferOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let outcome = self.download(remote, local, options, cancel).await;
        self.finish("download", outcome)
    }

    /// Copy `local` to `remote`
    ///
    /// A missing `local` fails with [`ValidationError::LocalFileNotFound`]
    /// without reaching the retry loop. An existing remote file is replaced
    /// when `overwrite` is set and reported as a conflict otherwise.
    pub async fn upload_file(
        &self,
        local: &Path,
        remote: &str,
        options: TransferOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let outcome = self.upload(local, remote, options, cancel).await;
        self.finish("upload", outcome)
    }

    pub async fn delete_remote_file(
        &self,
        remote: &str,
        options: TransferOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let outcome = self.delete(remote, options, cancel).await;
        self.finish("delete", outcome)
    }

    /// Whether `remote` names an existing file on the share
    pub async fn file_exists(&self, remote: &str, cancel: &CancellationToken) -> Result<bool> {
        let outcome = self.exists(remote, cancel).await;
        self.finish("exists", outcome)
    }

    async fn list(&self, dir: &str, cancel: &CancellationToken) -> Result<Vec<String>> {
        check_chars(dir, PathRole::Remote, INVALID_REMOTE_CHARS)?;
        let profile = self.require_profile()?;

        self.policy(&self.default_options())
            .execute_default(cancel, || self.backend.list(&profile, dir, cancel))
            .await
    }

    async fn download(
        &self,
        remote: &str,
        local: &Path,
        options: TransferOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        validate_remote(remote)?;
        validate_local(local)?;
        if !options.overwrite && local.exists() {
            return Err(ValidationError::LocalFileExists(local.to_path_buf()).into());
        }
        let profile = self.require_profile()?;

        debug!(remote, local = %local.display(), "download requested");
        self.policy(&options)
            .execute_default(cancel, || self.backend.download(&profile, remote, local, cancel))
            .await
    }

    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        options: TransferOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        validate_remote(remote)?;
        validate_local(local)?;
        if !local.is_file() {
            return Err(ValidationError::LocalFileNotFound(local.to_path_buf()).into());
        }
        let profile = self.require_profile()?;

        debug!(local = %local.display(), remote, "upload requested");
        self.policy(&options)
            .execute_default(cancel, || {
                self.backend
                    .upload(&profile, local, remote, options.overwrite, cancel)
            })
            .await
    }

    async fn delete(
        &self,
        remote: &str,
        options: TransferOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        validate_remote(remote)?;
        let profile = self.require_profile()?;

        debug!(remote, "delete requested");
        self.policy(&options)
            .execute_default(cancel, || self.backend.delete(&profile, remote, cancel))
            .await
    }

    async fn exists(&self, remote: &str, cancel: &CancellationToken) -> Result<bool> {
        validate_remote(remote)?;
        let profile = self.require_profile()?;

        self.policy(&self.default_options())
            .execute_default(cancel, || self.backend.exists(&profile, remote, cancel))
            .await
    }

    fn require_profile(&self) -> Result<Arc<ConnectionProfile>> {
        self.profile().ok_or_else(|| {
            ValidationError::InvalidConfig("connection profile not set".to_string()).into()
        })
    }

    fn policy(&self, options: &TransferOptions) -> RetryPolicy {
        RetryPolicy::new(options.max_attempts, options.retry_delay).with_stats(self.stats.clone())
    }

    fn finish<T>(&self, operation: &'static str, outcome: Result<T>) -> Result<T> {
        match &outcome {
            Ok(_) => {
                self.stats.record_success();
                info!(backend = self.backend.name(), operation, "operation succeeded");
            }
            Err(e) => {
                self.stats.record_failure(e);
                let kind = e.kind().map(|k| k.as_str()).unwrap_or("none");
                if e.is_cancelled() {
                    info!(backend = self.backend.name(), operation, "operation cancelled");
                } else {
                    warn!(
                        backend = self.backend.name(),
                        operation,
                        kind,
                        attempts = e.attempts(),
                        error = %e,
                        "operation failed"
                    );
                }
            }
        }
        outcome
    }
}

fn validate_remote(path: &str) -> std::result::Result<(), ValidationError> {
    if path.trim().is_empty() {
        return Err(ValidationError::EmptyPath(PathRole::Remote));
    }
    check_chars(path, PathRole::Remote, INVALID_REMOTE_CHARS)
}

fn validate_local(path: &Path) -> std::result::Result<(), ValidationError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(ValidationError::EmptyPath(PathRole::Local));
    }
    check_chars(&text, PathRole::Local, &[])
}

/// Reject control characters (NUL included) and any of `extra`
fn check_chars(path: &str, role: PathRole, extra: &[char]) -> std::result::Result<(), ValidationError> {
    if path.chars().any(|c| c.is_control() || extra.contains(&c)) {
        return Err(ValidationError::InvalidPathCharacters {
            role,
            path: path.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::protocols::smb::{InMemoryClient, ShareFixture};

    fn service(fixture: &ShareFixture) -> SmbService {
        let target = BackendTarget::Direct(Arc::new(InMemoryClient::factory(fixture.clone())));
        let service = SmbService::new(target, ServiceConfig::default());
        service.set_config(ConnectionProfile::new("192.168.1.100", "user", "pass", "WORK").unwrap());
        service
    }

    fn fast() -> TransferOptions {
        TransferOptions::default().with_retry(3, Duration::ZERO)
    }

    #[test]
    fn test_path_validation() {
        assert_eq!(
            validate_remote("  "),
            Err(ValidationError::EmptyPath(PathRole::Remote))
        );
        assert!(matches!(
            validate_remote("a|b.txt"),
            Err(ValidationError::InvalidPathCharacters { role: PathRole::Remote, .. })
        ));
        assert!(validate_remote("dir/file.txt").is_ok());
        assert!(matches!(
            validate_local(Path::new("a\u{1}b")),
            Err(ValidationError::InvalidPathCharacters { role: PathRole::Local, .. })
        ));
        assert_eq!(
            validate_local(Path::new("")),
            Err(ValidationError::EmptyPath(PathRole::Local))
        );
    }

    #[test]
    fn test_options_defaults() {
        let options = TransferOptions::default();
        assert!(options.overwrite);
        assert_eq!(options.max_attempts, 3);
        assert_eq!(options.retry_delay, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_missing_profile_is_validation_error() {
        let fixture = ShareFixture::new("WORK");
        let target = BackendTarget::Direct(Arc::new(InMemoryClient::factory(fixture.clone())));
        let service = SmbService::new(target, ServiceConfig::default());

        let err = service
            .get_remote_file_names("", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(fixture.clients_created(), 0);
    }

    #[tokio::test]
    async fn test_invalid_remote_path_never_connects() {
        let fixture = ShareFixture::new("WORK");
        let service = service(&fixture);

        let err = service
            .delete_remote_file("bad*name", fast(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(fixture.calls().is_empty());
        assert_eq!(service.stats().snapshot().validation_failures, 1);
    }

    #[tokio::test]
    async fn test_file_exists() {
        let fixture = ShareFixture::new("WORK").with_file("present.txt", b"1".to_vec());
        let service = service(&fixture);
        let cancel = CancellationToken::new();

        assert!(service.file_exists("present.txt", &cancel).await.unwrap());
        assert!(!service.file_exists("absent.txt", &cancel).await.unwrap());
    }

    #[tokio::test]
    async fn test_protocol_failures_retried_up_to_cap() {
        let fixture = ShareFixture::new("WORK");
        let service = service(&fixture);

        let err = service
            .delete_remote_file("missing.txt", fast(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
        assert_eq!(err.attempts(), 3);
        assert_eq!(fixture.clients_created(), 3);
    }

    #[tokio::test]
    async fn test_stats_outlive_dropped_service() {
        let fixture = ShareFixture::new("WORK");
        let service = service(&fixture);
        let stats = service.stats().clone();
        assert!(!stats.has_activity());

        let _ = service
            .delete_remote_file("missing.txt", fast(), &CancellationToken::new())
            .await;
        assert!(stats.has_activity());

        drop(service);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.failed_operations, 1);
        assert_eq!(snapshot.total_retries, 2);
    }

    #[tokio::test]
    async fn test_set_config_replaces_profile() {
        let fixture = ShareFixture::new("WORK");
        let service = service(&fixture);
        let first = service.profile().unwrap();

        service.set_config(ConnectionProfile::new("10.0.0.9", "other", "pw", "WORK").unwrap());
        let second = service.profile().unwrap();

        assert_eq!(first.user_name(), "user");
        assert_eq!(second.user_name(), "other");
    }
}
