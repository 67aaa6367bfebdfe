//! Mapping from raw SMB statuses to application error kinds
//!
//! This table is the single place where low-level failures acquire a meaning
//! for callers. Everything not listed maps to [`ErrorKind::Unknown`].

use super::types::NtStatus;
use crate::error::ErrorKind;

/// Classify a raw NT status
pub fn classify(status: NtStatus) -> ErrorKind {
    match status {
        NtStatus::IO_TIMEOUT => ErrorKind::Connection,

        NtStatus::LOGON_FAILURE
        | NtStatus::WRONG_PASSWORD
        | NtStatus::PASSWORD_EXPIRED
        | NtStatus::PASSWORD_MUST_CHANGE
        | NtStatus::ACCOUNT_DISABLED
        | NtStatus::ACCOUNT_RESTRICTION
        | NtStatus::INVALID_LOGON_HOURS => ErrorKind::Authentication,

        NtStatus::ACCESS_DENIED => ErrorKind::Permission,

        NtStatus::BAD_NETWORK_NAME | NtStatus::OBJECT_NAME_NOT_FOUND => ErrorKind::NotFound,

        NtStatus::SHARING_VIOLATION | NtStatus::DIRECTORY_NOT_EMPTY => ErrorKind::Conflict,

        NtStatus::DISK_FULL | NtStatus::INSUFFICIENT_RESOURCES => ErrorKind::Resource,

        NtStatus::NOT_SUPPORTED => ErrorKind::Unsupported,

        _ => ErrorKind::Unknown,
    }
}

/// Error codes reported by foreign-boundary backends
pub mod foreign_code {
    pub const CONNECTION_FAILED: i32 = 1;
    pub const LOGIN_FAILED: i32 = 2;
    pub const LIST_FAILED: i32 = 3;
    pub const UNKNOWN: i32 = -1;
}

/// Classify an error code delivered through a foreign completion callback
pub fn classify_foreign_code(code: i32) -> ErrorKind {
    match code {
        foreign_code::CONNECTION_FAILED => ErrorKind::Connection,
        foreign_code::LOGIN_FAILED => ErrorKind::Authentication,
        foreign_code::LIST_FAILED => ErrorKind::ProtocolOperation,
        _ => ErrorKind::Unknown,
    }
}
