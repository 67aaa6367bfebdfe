/*!
 * Error types for smb-gateway
 */

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::protocols::smb::{classify, NtStatus};

pub type Result<T> = std::result::Result<T, SmbError>;

/// Application-level classification of a remote failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transport could not be established or timed out
    Connection,
    /// Credentials were rejected or the account cannot log on
    Authentication,
    /// The account lacks rights for the requested access
    Permission,
    /// Share, file, or directory does not exist
    NotFound,
    /// Object is in use or not in a state allowing the operation
    Conflict,
    /// Server ran out of disk space or other resources
    Resource,
    /// Server does not support the request
    Unsupported,
    /// Generic protocol operation failure carrying the raw status
    ProtocolOperation,
    /// Anything not covered above
    Unknown,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 9] = [
        ErrorKind::Connection,
        ErrorKind::Authentication,
        ErrorKind::Permission,
        ErrorKind::NotFound,
        ErrorKind::Conflict,
        ErrorKind::Resource,
        ErrorKind::Unsupported,
        ErrorKind::ProtocolOperation,
        ErrorKind::Unknown,
    ];

    /// Stable label used in log fields and statistics
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Permission => "permission",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Resource => "resource",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::ProtocolOperation => "protocol_operation",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of a transfer a path argument names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRole {
    Remote,
    Local,
}

impl fmt::Display for PathRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathRole::Remote => f.write_str("remote"),
            PathRole::Local => f.write_str("local"),
        }
    }
}

/// Argument, profile, and local precondition failures.
///
/// These are detected before any session is opened and are never retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid host address: {0:?}")]
    InvalidHost(String),

    #[error("user name cannot be empty")]
    EmptyUserName,

    #[error("password cannot be empty")]
    EmptyPassword,

    #[error("share name cannot be empty")]
    EmptyShareName,

    #[error("share name {0:?} must match [A-Za-z0-9_-]+")]
    InvalidShareName(String),

    #[error("{0} path cannot be empty")]
    EmptyPath(PathRole),

    #[error("{role} path {path:?} contains invalid characters")]
    InvalidPathCharacters { role: PathRole, path: String },

    #[error("local file '{}' already exists", .0.display())]
    LocalFileExists(PathBuf),

    #[error("local file '{}' not found", .0.display())]
    LocalFileNotFound(PathBuf),

    #[error("invalid connection profile document: {0}")]
    InvalidProfileDocument(String),

    #[error("configuration error: {0}")]
    InvalidConfig(String),
}

impl ValidationError {
    /// Kind-style view for local precondition failures that mirror remote ones
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ValidationError::LocalFileExists(_) => Some(ErrorKind::Conflict),
            ValidationError::LocalFileNotFound(_) => Some(ErrorKind::NotFound),
            _ => None,
        }
    }
}

/// Errors surfaced by every public operation
#[derive(Debug, Error)]
pub enum SmbError {
    /// Bad arguments, profile, or local precondition
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Classified failure from the remote file protocol layer
    #[error("{kind} error: {message}")]
    Protocol {
        kind: ErrorKind,
        message: String,
        status: Option<NtStatus>,
    },

    /// The remote destination exists and overwriting was not requested
    #[error("conflict error: remote file '{0}' already exists")]
    RemoteExists(String),

    /// Cancellation was requested by the caller
    #[error("operation cancelled")]
    Cancelled,

    /// The last failure after more than one attempt
    #[error("{last} (gave up after {attempts} attempts)")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<SmbError>,
    },

    /// Local file I/O failed while an operation was running
    #[error("local I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SmbError {
    pub fn protocol(kind: ErrorKind, message: impl Into<String>) -> Self {
        SmbError::Protocol {
            kind,
            message: message.into(),
            status: None,
        }
    }

    /// Classify a raw status and attach it to the error
    pub fn from_status(status: NtStatus, context: &str) -> Self {
        SmbError::Protocol {
            kind: classify(status),
            message: format!("{}: {}", context, status),
            status: Some(status),
        }
    }

    /// Generic operation failure that keeps the raw status without classifying it
    pub fn operation(status: NtStatus, context: &str) -> Self {
        SmbError::Protocol {
            kind: ErrorKind::ProtocolOperation,
            message: format!("{}: {}", context, status),
            status: Some(status),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        SmbError::protocol(ErrorKind::Connection, message)
    }

    /// The underlying error, looking through retry exhaustion
    pub fn root(&self) -> &SmbError {
        match self {
            SmbError::RetriesExhausted { last, .. } => last.root(),
            other => other,
        }
    }

    /// Kind of a remote failure; `None` for local errors and cancellation
    pub fn kind(&self) -> Option<ErrorKind> {
        match self.root() {
            SmbError::Protocol { kind, .. } => Some(*kind),
            SmbError::RemoteExists(_) => Some(ErrorKind::Conflict),
            _ => None,
        }
    }

    /// Raw protocol status, when the failure carried one
    pub fn status(&self) -> Option<NtStatus> {
        match self.root() {
            SmbError::Protocol { status, .. } => *status,
            _ => None,
        }
    }

    /// True for failures originating in the remote file protocol layer
    pub fn is_protocol(&self) -> bool {
        matches!(self.root(), SmbError::Protocol { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), SmbError::Cancelled)
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.root(), SmbError::Validation(_))
    }

    pub fn validation(&self) -> Option<&ValidationError> {
        match self.root() {
            SmbError::Validation(v) => Some(v),
            _ => None,
        }
    }

    /// Number of attempts made before this error surfaced
    pub fn attempts(&self) -> u32 {
        match self {
            SmbError::RetriesExhausted { attempts, .. } => *attempts,
            _ => 1,
        }
    }
}

impl From<serde_json::Error> for SmbError {
    fn from(err: serde_json::Error) -> Self {
        SmbError::Validation(ValidationError::InvalidProfileDocument(err.to_string()))
    }
}
