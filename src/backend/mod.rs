//! Backend selection for share operations
//!
//! A [`ShareBackend`] performs one coarse file operation per call against the
//! share described by a [`ConnectionProfile`]. Two implementations exist:
//!
//! - [`DirectBackend`] drives a [`RemoteFileClient`] through a
//!   [`SessionExecutor`], one session per call.
//! - [`ForeignBackend`] hands each operation to a platform client behind a C
//!   callback boundary and awaits completion through the async registry.
//!
//! The backend is chosen once, from a [`BackendTarget`], when the service is
//! built.
//!
//! # Example
//!
//! ```no_run
//! use smb_gateway::backend::{backend_for, BackendTarget};
//! use smb_gateway::config::{ConnectionProfile, ServiceConfig};
//! use smb_gateway::protocols::smb::{InMemoryClient, ShareFixture};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> smb_gateway::Result<()> {
//! let fixture = ShareFixture::new("WORK");
//! let target = BackendTarget::Direct(Arc::new(InMemoryClient::factory(fixture)));
//! let backend = backend_for(target, &ServiceConfig::default());
//!
//! let profile = ConnectionProfile::new("192.168.1.100", "user", "pass", "WORK").unwrap();
//! let names = backend.list(&profile, "", &CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`RemoteFileClient`]: crate::protocols::smb::RemoteFileClient
//! [`SessionExecutor`]: crate::protocols::smb::SessionExecutor

mod direct;
mod foreign;

pub use direct::DirectBackend;
pub use foreign::{DeleteFn, DownloadFn, ForeignApi, ForeignBackend, ListFn, UploadFn};

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::{ConnectionProfile, ServiceConfig};
use crate::error::Result;
use crate::protocols::smb::ClientFactory;

/// One-shot share operations, each on its own session
#[async_trait]
pub trait ShareBackend: Send + Sync {
    /// Short name used in log fields
    fn name(&self) -> &'static str;

    /// Names in `dir`, excluding `.` and `..`
    async fn list(
        &self,
        profile: &ConnectionProfile,
        dir: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>>;

    /// Copy `remote` to `local`, replacing `local` only on success
    async fn download(
        &self,
        profile: &ConnectionProfile,
        remote: &str,
        local: &Path,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Copy `local` to `remote`
    async fn upload(
        &self,
        profile: &ConnectionProfile,
        local: &Path,
        remote: &str,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> Result<()>;

    async fn delete(
        &self,
        profile: &ConnectionProfile,
        remote: &str,
        cancel: &CancellationToken,
    ) -> Result<()>;

    async fn exists(
        &self,
        profile: &ConnectionProfile,
        remote: &str,
        cancel: &CancellationToken,
    ) -> Result<bool>;
}

/// Which client implementation serves the share
#[derive(Clone)]
pub enum BackendTarget {
    /// A Rust client created per session by the factory
    Direct(Arc<dyn ClientFactory>),
    /// A platform client reached through C entry points
    Foreign(ForeignApi),
}

impl std::fmt::Debug for BackendTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendTarget::Direct(_) => f.write_str("BackendTarget::Direct"),
            BackendTarget::Foreign(_) => f.write_str("BackendTarget::Foreign"),
        }
    }
}

/// Build the backend for `target`
pub fn backend_for(target: BackendTarget, config: &ServiceConfig) -> Arc<dyn ShareBackend> {
    match target {
        BackendTarget::Direct(factory) => {
            Arc::new(DirectBackend::new(factory).with_connect_timeout(config.connect_timeout()))
        }
        BackendTarget::Foreign(api) => Arc::new(ForeignBackend::new(api)),
    }
}

/// Split a remote path into its parent directory and final component
pub(crate) fn split_remote(path: &str) -> (&str, &str) {
    let trimmed = path.trim_end_matches(['/', '\\']);
    match trimmed.rfind(['/', '\\']) {
        Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
        None => ("", trimmed),
    }
}
