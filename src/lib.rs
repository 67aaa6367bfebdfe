/*!
 * smb-gateway - session-managed access to SMB file shares
 *
 * One facade for listing, downloading, uploading, and deleting files on a
 * remote share, with:
 * - A dedicated connect/login/attach session per call with ordered teardown
 * - Bounded retries of protocol failures with cooperative cancellation
 * - Protocol statuses classified into application error kinds
 * - Pluggable clients: Rust implementations or platform clients behind C callbacks
 *
 * Version: 0.4.0
 * Author: Shane Wall <shaneawall@gmail.com>
 */

pub mod backend;
pub mod config;
pub mod core;
pub mod error;
pub mod ffi;
pub mod instrumentation;
pub mod logging;
pub mod protocols;
pub mod service;

// Re-export commonly used types
pub use backend::{backend_for, BackendTarget, ShareBackend};
pub use config::{ConnectionProfile, ServiceConfig};
pub use crate::core::RetryPolicy;
pub use error::{ErrorKind, Result, SmbError, ValidationError};
pub use ffi::AsyncOperationRegistry;
pub use instrumentation::{OperationStats, StatsSnapshot};
pub use protocols::smb::{RemoteFileClient, SessionExecutor};
pub use service::{SmbService, TransferOptions};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
