//! SMB protocol types shared between the session layer and client backends

use std::fmt;

/// Raw NT status code returned by an SMB server
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NtStatus(pub u32);

impl NtStatus {
    pub const SUCCESS: NtStatus = NtStatus(0x0000_0000);
    pub const INVALID_HANDLE: NtStatus = NtStatus(0xC000_0008);
    pub const NO_MORE_FILES: NtStatus = NtStatus(0x8000_0006);
    pub const END_OF_FILE: NtStatus = NtStatus(0xC000_0011);
    pub const ACCESS_DENIED: NtStatus = NtStatus(0xC000_0022);
    pub const OBJECT_NAME_NOT_FOUND: NtStatus = NtStatus(0xC000_0034);
    pub const OBJECT_NAME_COLLISION: NtStatus = NtStatus(0xC000_0035);
    pub const OBJECT_PATH_NOT_FOUND: NtStatus = NtStatus(0xC000_003A);
    pub const SHARING_VIOLATION: NtStatus = NtStatus(0xC000_0043);
    pub const DELETE_PENDING: NtStatus = NtStatus(0xC000_0056);
    pub const WRONG_PASSWORD: NtStatus = NtStatus(0xC000_006A);
    pub const LOGON_FAILURE: NtStatus = NtStatus(0xC000_006D);
    pub const ACCOUNT_RESTRICTION: NtStatus = NtStatus(0xC000_006E);
    pub const INVALID_LOGON_HOURS: NtStatus = NtStatus(0xC000_006F);
    pub const PASSWORD_EXPIRED: NtStatus = NtStatus(0xC000_0071);
    pub const ACCOUNT_DISABLED: NtStatus = NtStatus(0xC000_0072);
    pub const DISK_FULL: NtStatus = NtStatus(0xC000_007F);
    pub const INSUFFICIENT_RESOURCES: NtStatus = NtStatus(0xC000_009A);
    pub const IO_TIMEOUT: NtStatus = NtStatus(0xC000_00B5);
    pub const FILE_IS_A_DIRECTORY: NtStatus = NtStatus(0xC000_00BA);
    pub const NOT_SUPPORTED: NtStatus = NtStatus(0xC000_00BB);
    pub const NETWORK_NAME_DELETED: NtStatus = NtStatus(0xC000_00C9);
    pub const BAD_NETWORK_NAME: NtStatus = NtStatus(0xC000_00CC);
    pub const DIRECTORY_NOT_EMPTY: NtStatus = NtStatus(0xC000_0101);
    pub const NOT_A_DIRECTORY: NtStatus = NtStatus(0xC000_0103);
    pub const PASSWORD_MUST_CHANGE: NtStatus = NtStatus(0xC000_0224);

    pub fn is_success(&self) -> bool {
        *self == NtStatus::SUCCESS
    }

    /// Symbolic name for statuses this crate knows about
    pub fn name(&self) -> Option<&'static str> {
        let name = match *self {
            NtStatus::SUCCESS => "STATUS_SUCCESS",
            NtStatus::INVALID_HANDLE => "STATUS_INVALID_HANDLE",
            NtStatus::NO_MORE_FILES => "STATUS_NO_MORE_FILES",
            NtStatus::END_OF_FILE => "STATUS_END_OF_FILE",
            NtStatus::ACCESS_DENIED => "STATUS_ACCESS_DENIED",
            NtStatus::OBJECT_NAME_NOT_FOUND => "STATUS_OBJECT_NAME_NOT_FOUND",
            NtStatus::OBJECT_NAME_COLLISION => "STATUS_OBJECT_NAME_COLLISION",
            NtStatus::OBJECT_PATH_NOT_FOUND => "STATUS_OBJECT_PATH_NOT_FOUND",
            NtStatus::SHARING_VIOLATION => "STATUS_SHARING_VIOLATION",
            NtStatus::DELETE_PENDING => "STATUS_DELETE_PENDING",
            NtStatus::WRONG_PASSWORD => "STATUS_WRONG_PASSWORD",
            NtStatus::LOGON_FAILURE => "STATUS_LOGON_FAILURE",
            NtStatus::ACCOUNT_RESTRICTION => "STATUS_ACCOUNT_RESTRICTION",
            NtStatus::INVALID_LOGON_HOURS => "STATUS_INVALID_LOGON_HOURS",
            NtStatus::PASSWORD_EXPIRED => "STATUS_PASSWORD_EXPIRED",
            NtStatus::ACCOUNT_DISABLED => "STATUS_ACCOUNT_DISABLED",
            NtStatus::DISK_FULL => "STATUS_DISK_FULL",
            NtStatus::INSUFFICIENT_RESOURCES => "STATUS_INSUFFICIENT_RESOURCES",
            NtStatus::IO_TIMEOUT => "STATUS_IO_TIMEOUT",
            NtStatus::FILE_IS_A_DIRECTORY => "STATUS_FILE_IS_A_DIRECTORY",
            NtStatus::NOT_SUPPORTED => "STATUS_NOT_SUPPORTED",
            NtStatus::NETWORK_NAME_DELETED => "STATUS_NETWORK_NAME_DELETED",
            NtStatus::BAD_NETWORK_NAME => "STATUS_BAD_NETWORK_NAME",
            NtStatus::DIRECTORY_NOT_EMPTY => "STATUS_DIRECTORY_NOT_EMPTY",
            NtStatus::NOT_A_DIRECTORY => "STATUS_NOT_A_DIRECTORY",
            NtStatus::PASSWORD_MUST_CHANGE => "STATUS_PASSWORD_MUST_CHANGE",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}

impl fmt::Debug for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NtStatus({})", self)
    }
}

impl From<u32> for NtStatus {
    fn from(raw: u32) -> Self {
        NtStatus(raw)
    }
}

/// Opaque identifier of an open remote file or directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(pub u64);

bitflags::bitflags! {
    /// Requested access rights for a create/open request
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessMask: u32 {
        const DELETE        = 0x0001_0000;
        const SYNCHRONIZE   = 0x0010_0000;
        const GENERIC_WRITE = 0x4000_0000;
        const GENERIC_READ  = 0x8000_0000;
    }
}

bitflags::bitflags! {
    /// Access other openers may share while the handle is open
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ShareAccess: u32 {
        const READ   = 0x0000_0001;
        const WRITE  = 0x0000_0002;
        const DELETE = 0x0000_0004;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CreateOptions: u32 {
        const DIRECTORY_FILE       = 0x0000_0001;
        const SYNCHRONOUS_IO_ALERT = 0x0000_0010;
        const NON_DIRECTORY_FILE   = 0x0000_0040;
    }
}

/// What to do when the target does or does not exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateDisposition {
    Supersede,
    /// Open only if it exists
    Open,
    /// Create only if it does not exist
    Create,
    OpenIf,
    Overwrite,
    /// Truncate if it exists, create otherwise
    OverwriteIf,
}

/// Parameters of a single create/open request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateRequest {
    pub access: AccessMask,
    pub share: ShareAccess,
    pub disposition: CreateDisposition,
    pub options: CreateOptions,
}

impl CreateRequest {
    /// Read-only open of an existing directory for enumeration
    pub fn list_directory() -> Self {
        Self {
            access: AccessMask::GENERIC_READ,
            share: ShareAccess::READ | ShareAccess::WRITE,
            disposition: CreateDisposition::Open,
            options: CreateOptions::DIRECTORY_FILE,
        }
    }

    /// Read-only open of an existing file
    pub fn read_file() -> Self {
        Self {
            access: AccessMask::GENERIC_READ | AccessMask::SYNCHRONIZE,
            share: ShareAccess::READ,
            disposition: CreateDisposition::Open,
            options: CreateOptions::NON_DIRECTORY_FILE | CreateOptions::SYNCHRONOUS_IO_ALERT,
        }
    }

    /// Check existence without holding more than read access
    pub fn existence_check() -> Self {
        Self {
            access: AccessMask::GENERIC_READ,
            share: ShareAccess::READ,
            disposition: CreateDisposition::Open,
            options: CreateOptions::NON_DIRECTORY_FILE,
        }
    }

    /// Create (or truncate) a file for writing
    pub fn write_file() -> Self {
        Self {
            access: AccessMask::GENERIC_WRITE | AccessMask::DELETE | AccessMask::SYNCHRONIZE,
            share: ShareAccess::WRITE,
            disposition: CreateDisposition::OverwriteIf,
            options: CreateOptions::NON_DIRECTORY_FILE | CreateOptions::SYNCHRONOUS_IO_ALERT,
        }
    }

    /// Exclusive open of an existing file so it can be marked delete-pending
    pub fn delete_file() -> Self {
        Self {
            access: AccessMask::GENERIC_WRITE | AccessMask::DELETE | AccessMask::SYNCHRONIZE,
            share: ShareAccess::empty(),
            disposition: CreateDisposition::Open,
            options: CreateOptions::NON_DIRECTORY_FILE | CreateOptions::SYNCHRONOUS_IO_ALERT,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.options.contains(CreateOptions::DIRECTORY_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(NtStatus::LOGON_FAILURE.to_string(), "STATUS_LOGON_FAILURE");
        assert_eq!(NtStatus(0xC000_0999).to_string(), "0xC0000999");
        assert!(NtStatus::SUCCESS.is_success());
        assert!(!NtStatus::END_OF_FILE.is_success());
    }

    #[test]
    fn test_access_modes_match_operation() {
        let list = CreateRequest::list_directory();
        assert!(list.is_directory());
        assert!(!list.access.contains(AccessMask::GENERIC_WRITE));

        let read = CreateRequest::read_file();
        assert!(!read.is_directory());
        assert!(read.access.contains(AccessMask::GENERIC_READ));
        assert!(!read.access.contains(AccessMask::DELETE));

        let write = CreateRequest::write_file();
        assert_eq!(write.disposition, CreateDisposition::OverwriteIf);
        assert!(write.access.contains(AccessMask::GENERIC_WRITE));

        let delete = CreateRequest::delete_file();
        assert!(delete.access.contains(AccessMask::DELETE));
        assert!(delete.share.is_empty());
        assert_eq!(delete.disposition, CreateDisposition::Open);
    }
}
