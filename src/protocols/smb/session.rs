//! Per-call SMB session lifecycle
//!
//! [`SessionExecutor::run`] opens a dedicated session for every call:
//! connect, login, tree connect, run the operation, then tree disconnect,
//! logoff, and disconnect. Release always runs in reverse order of the
//! stages actually reached, on success, failure, or cancellation. Sessions
//! are never pooled; one connection carries exactly one operation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ClientFactory, RemoteFileClient};
use crate::config::ConnectionProfile;
use crate::error::{Result, SmbError};

/// Default transport connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// How long a cancelled operation may keep running to release its handles
pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Furthest lifecycle stage a session reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionStage {
    NotConnected,
    Connected,
    Authenticated,
    ShareAttached,
}

/// Runs one operation per freshly established session
#[derive(Clone)]
pub struct SessionExecutor {
    factory: Arc<dyn ClientFactory>,
    connect_timeout: Duration,
    cancel_grace: Duration,
}

impl std::fmt::Debug for SessionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionExecutor")
            .field("connect_timeout", &self.connect_timeout)
            .field("cancel_grace", &self.cancel_grace)
            .finish_non_exhaustive()
    }
}

impl SessionExecutor {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            cancel_grace: DEFAULT_CANCEL_GRACE,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Bound the wind-down time of an operation after cancellation
    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    /// Execute `op` against a share attached for this call only
    ///
    /// The operation receives the attached client and must not retain it.
    /// Once `cancel` fires, an operation that is already running keeps being
    /// polled for up to the cancel grace period so it can observe the token
    /// and close what it opened; after that it is dropped. Teardown failures
    /// are logged and never replace the operation's result.
    pub async fn run<T, F>(
        &self,
        profile: &ConnectionProfile,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut dyn RemoteFileClient) -> BoxFuture<'c, Result<T>> + Send,
    {
        if cancel.is_cancelled() {
            return Err(SmbError::Cancelled);
        }

        let mut session = Session::new(self.factory.create_client());
        let outcome = self.drive(&mut session, profile, cancel, op).await;
        session.release().await;

        match &outcome {
            Ok(_) => debug!(host = %profile.host(), share = profile.share_name(), "SMB operation completed"),
            Err(e) => debug!(host = %profile.host(), share = profile.share_name(), error = %e, "SMB operation failed"),
        }
        outcome
    }

    async fn drive<T, F>(
        &self,
        session: &mut Session,
        profile: &ConnectionProfile,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut dyn RemoteFileClient) -> BoxFuture<'c, Result<T>>,
    {
        let Some(client) = session.client.as_deref_mut() else {
            return Err(SmbError::connection("session client already released"));
        };

        let addr = profile.socket_addr();
        match cancellable(cancel, tokio::time::timeout(self.connect_timeout, client.connect(addr))).await? {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(SmbError::connection(format!("failed to connect to {}: {}", addr, e)))
            }
            Err(_) => {
                return Err(SmbError::connection(format!(
                    "connection to {} timed out after {:?}",
                    addr, self.connect_timeout
                )))
            }
        }
        session.stage = SessionStage::Connected;
        debug!(host = %profile.host(), "transport connected");

        cancellable(cancel, client.login(profile.user_name(), profile.password()))
            .await?
            .map_err(|status| SmbError::from_status(status, "login failed"))?;
        session.stage = SessionStage::Authenticated;

        cancellable(cancel, client.tree_connect(profile.share_name()))
            .await?
            .map_err(|status| {
                SmbError::operation(status, &format!("tree connect to '{}' failed", profile.share_name()))
            })?;
        session.stage = SessionStage::ShareAttached;
        info!(host = %profile.host(), share = profile.share_name(), "SMB session established");

        let mut operation = op(client);
        tokio::select! {
            biased;
            outcome = &mut operation => return outcome,
            _ = cancel.cancelled() => {}
        }

        // Operations observe the same token; give them time to close their handles
        match tokio::time::timeout(self.cancel_grace, operation).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(grace = ?self.cancel_grace, "operation ignored cancellation; abandoning it");
                Err(SmbError::Cancelled)
            }
        }
    }
}

/// Race `fut` against the cancellation token
async fn cancellable<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SmbError::Cancelled),
        out = fut => Ok(out),
    }
}

/// Client plus the stage it reached; releases itself if dropped mid-call
struct Session {
    client: Option<Box<dyn RemoteFileClient>>,
    stage: SessionStage,
}

impl Session {
    fn new(client: Box<dyn RemoteFileClient>) -> Self {
        Self {
            client: Some(client),
            stage: SessionStage::NotConnected,
        }
    }

    async fn release(&mut self) {
        if let Some(mut client) = self.client.take() {
            teardown(client.as_mut(), self.stage).await;
            self.stage = SessionStage::NotConnected;
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let Some(mut client) = self.client.take() else {
            return;
        };
        let stage = self.stage;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    teardown(client.as_mut(), stage).await;
                });
            }
            Err(_) => warn!(?stage, "SMB session dropped outside a runtime; teardown skipped"),
        }
    }
}

/// Release every reached stage in reverse order, logging failures
async fn teardown(client: &mut dyn RemoteFileClient, reached: SessionStage) {
    if reached >= SessionStage::ShareAttached {
        if let Err(status) = client.tree_disconnect().await {
            warn!(%status, "tree disconnect failed");
        }
    }
    if reached >= SessionStage::Authenticated {
        if let Err(status) = client.logoff().await {
            warn!(%status, "logoff failed");
        }
    }
    if reached >= SessionStage::Connected {
        if let Err(e) = client.disconnect().await {
            warn!(error = %e, "disconnect failed");
        }
    }
}
