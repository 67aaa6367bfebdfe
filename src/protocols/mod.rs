//! Remote file protocol support
//!
//! Only SMB is implemented today; the session layer and error tables live
//! under [`smb`].

pub mod smb;
