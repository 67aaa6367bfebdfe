//! Backend that drives a Rust [`RemoteFileClient`] directly
//!
//! [`RemoteFileClient`]: crate::protocols::smb::RemoteFileClient

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::ShareBackend;
use crate::config::ConnectionProfile;
use crate::error::Result;
use crate::protocols::smb::{ops, ClientFactory, SessionExecutor};

#[derive(Debug, Clone)]
pub struct DirectBackend {
    executor: SessionExecutor,
}

impl DirectBackend {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            executor: SessionExecutor::new(factory),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.executor = self.executor.with_connect_timeout(timeout);
        self
    }

    pub fn executor(&self) -> &SessionExecutor {
        &self.executor
    }
}

#[async_trait]
impl ShareBackend for DirectBackend {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn list(
        &self,
        profile: &ConnectionProfile,
        dir: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let dir = dir.to_string();
        self.executor
            .run(profile, cancel, move |client| {
                Box::pin(async move { ops::list_directory(client, &dir).await })
            })
            .await
    }

    async fn download(
        &self,
        profile: &ConnectionProfile,
        remote: &str,
        local: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let remote = remote.to_string();
        let local = local.to_path_buf();
        let transfer_cancel = cancel.clone();
        self.executor
            .run(profile, cancel, move |client| {
                Box::pin(async move {
                    ops::download(client, &remote, &local, &transfer_cancel)
                        .await
                        .map(|_| ())
                })
            })
            .await
    }

    async fn upload(
        &self,
        profile: &ConnectionProfile,
        local: &Path,
        remote: &str,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let local = local.to_path_buf();
        let remote = remote.to_string();
        let transfer_cancel = cancel.clone();
        self.executor
            .run(profile, cancel, move |client| {
                Box::pin(async move {
                    ops::upload(client, &local, &remote, overwrite, &transfer_cancel)
                        .await
                        .map(|_| ())
                })
            })
            .await
    }

    async fn delete(
        &self,
        profile: &ConnectionProfile,
        remote: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let remote = remote.to_string();
        self.executor
            .run(profile, cancel, move |client| {
                Box::pin(async move { ops::delete(client, &remote).await })
            })
            .await
    }

    async fn exists(
        &self,
        profile: &ConnectionProfile,
        remote: &str,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let remote = remote.to_string();
        self.executor
            .run(profile, cancel, move |client| {
                Box::pin(async move { ops::exists(client, &remote).await })
            })
            .await
    }
}
