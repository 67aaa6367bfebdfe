//! SMB2/3 session layer
//!
//! The wire protocol itself lives in a [`RemoteFileClient`] implementation
//! supplied by the embedding application. This module drives such a client
//! through one connect → login → tree connect → operate → teardown cycle per
//! call and turns raw statuses into classified errors.
//!
//! # Example
//!
//! ```no_run
//! use smb_gateway::config::ConnectionProfile;
//! use smb_gateway::protocols::smb::{ops, InMemoryClient, SessionExecutor, ShareFixture};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> smb_gateway::Result<()> {
//! let fixture = ShareFixture::new("WORK").with_file("report.csv", b"a,b,c\n".to_vec());
//! let executor = SessionExecutor::new(Arc::new(InMemoryClient::factory(fixture)));
//! let profile = ConnectionProfile::new("192.168.1.100", "user", "pass", "WORK").unwrap();
//!
//! let names = executor
//!     .run(&profile, &CancellationToken::new(), |client| {
//!         Box::pin(async move { ops::list_directory(client, "").await })
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod memory;
pub mod ops;
pub mod session;
pub mod types;

pub use error::{classify, classify_foreign_code};
pub use memory::{ClientCall, InMemoryClient, ShareFixture};
pub use session::{SessionExecutor, SessionStage};
pub use types::*;

use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::net::SocketAddr;

/// Default negotiated read/write size when a client does not report one
pub const DEFAULT_MAX_IO_SIZE: u32 = 64 * 1024;

/// Primitive SMB operations exposed by a platform client
///
/// Every call is issued by exactly one session at a time; implementations do
/// not need to support concurrent commands on the same connection.
#[async_trait]
pub trait RemoteFileClient: Send {
    /// Establish the transport connection
    async fn connect(&mut self, addr: SocketAddr) -> io::Result<()>;

    /// Authenticate the session
    async fn login(&mut self, user_name: &str, password: &str) -> Result<(), NtStatus>;

    /// Attach to a share on the connected server
    async fn tree_connect(&mut self, share: &str) -> Result<(), NtStatus>;

    /// Open or create a file or directory on the attached share
    async fn create_file(&mut self, path: &str, request: CreateRequest) -> Result<FileId, NtStatus>;

    /// Enumerate names in an open directory matching `pattern`
    async fn query_directory(&mut self, dir: FileId, pattern: &str) -> Result<Vec<String>, NtStatus>;

    /// Read up to `max_len` bytes at `offset`; `END_OF_FILE` or an empty buffer ends the stream
    async fn read(&mut self, file: FileId, offset: u64, max_len: u32) -> Result<Bytes, NtStatus>;

    /// Write `data` at `offset`, returning the number of bytes written
    async fn write(&mut self, file: FileId, offset: u64, data: &[u8]) -> Result<u32, NtStatus>;

    /// Set or clear the delete-on-close disposition
    async fn set_delete_pending(&mut self, file: FileId, pending: bool) -> Result<(), NtStatus>;

    async fn close(&mut self, file: FileId) -> Result<(), NtStatus>;

    /// Detach from the share
    async fn tree_disconnect(&mut self) -> Result<(), NtStatus>;

    async fn logoff(&mut self) -> Result<(), NtStatus>;

    /// Tear down the transport connection
    async fn disconnect(&mut self) -> io::Result<()>;

    fn max_read_size(&self) -> u32 {
        DEFAULT_MAX_IO_SIZE
    }

    fn max_write_size(&self) -> u32 {
        DEFAULT_MAX_IO_SIZE
    }
}

/// Creates a fresh, unconnected client for each session
pub trait ClientFactory: Send + Sync {
    fn create_client(&self) -> Box<dyn RemoteFileClient>;
}

impl<F> ClientFactory for F
where
    F: Fn() -> Box<dyn RemoteFileClient> + Send + Sync,
{
    fn create_client(&self) -> Box<dyn RemoteFileClient> {
        self()
    }
}
