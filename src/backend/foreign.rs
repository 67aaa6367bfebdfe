//! Backend for platform clients behind a C callback boundary
//!
//! Every entry point receives the connection profile as a JSON document
//! (`ipAddress`, `userName`, `password`, `shareName`), the operation's
//! paths, an async handle id, and the success/error trampolines. It must copy
//! its string arguments before returning and later report completion exactly
//! once through one of the trampolines, from any thread. A listing reports
//! its entry names as one comma-separated payload string.
//!
//! Downloads hand the platform client a staging path beside the destination
//! rather than the destination itself. The staging file is removed as soon
//! as the call fails or is cancelled, so the platform client must stop
//! writing to it once it reports completion or its handle is cancelled. A
//! write after that point recreates the file and nothing here removes it.

use std::ffi::CString;
use std::os::raw::c_char;
use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{split_remote, ShareBackend};
use crate::config::ConnectionProfile;
use crate::error::{ErrorKind, PathRole, Result, SmbError, ValidationError};
use crate::ffi::{global_registry, ErrorTrampoline, Outcome, SuccessTrampoline};
use crate::protocols::smb::classify_foreign_code;
use crate::protocols::smb::ops::{is_dot_entry, PARTIAL_DOWNLOAD_PREFIX};

pub type ListFn = unsafe extern "C" fn(
    config_json: *const c_char,
    path: *const c_char,
    handle: i32,
    on_success: SuccessTrampoline,
    on_error: ErrorTrampoline,
);

pub type DownloadFn = unsafe extern "C" fn(
    config_json: *const c_char,
    remote_path: *const c_char,
    local_path: *const c_char,
    handle: i32,
    on_success: SuccessTrampoline,
    on_error: ErrorTrampoline,
);

pub type UploadFn = unsafe extern "C" fn(
    config_json: *const c_char,
    local_path: *const c_char,
    remote_path: *const c_char,
    handle: i32,
    on_success: SuccessTrampoline,
    on_error: ErrorTrampoline,
);

pub type DeleteFn = unsafe extern "C" fn(
    config_json: *const c_char,
    remote_path: *const c_char,
    handle: i32,
    on_success: SuccessTrampoline,
    on_error: ErrorTrampoline,
);

/// Entry points exported by the platform client
#[derive(Debug, Clone, Copy)]
pub struct ForeignApi {
    pub list: ListFn,
    pub download: DownloadFn,
    pub upload: UploadFn,
    pub delete: DeleteFn,
}

#[derive(Debug, Clone, Copy)]
pub struct ForeignBackend {
    api: ForeignApi,
}

/// Arguments for one foreign call, in entry point order after the config
enum Call {
    List,
    Download,
    Upload,
    Delete,
}

impl ForeignBackend {
    pub fn new(api: ForeignApi) -> Self {
        Self { api }
    }

    /// Invoke one entry point and wait for its completion callback
    async fn dispatch(
        &self,
        call: Call,
        profile: &ConnectionProfile,
        args: Vec<CString>,
        cancel: &CancellationToken,
    ) -> Result<Option<String>> {
        if cancel.is_cancelled() {
            return Err(SmbError::Cancelled);
        }

        let config = c_string(profile.to_json()?, |_| {
            ValidationError::InvalidProfileDocument("profile contains a NUL byte".to_string())
        })?;

        let op = global_registry().create_handle();
        let id = op.id();
        let callbacks = op
            .begin_callbacks()
            .map_err(|e| SmbError::protocol(ErrorKind::Unknown, e.to_string()))?;

        {
            let config_ptr = config.as_ptr();
            let ptrs: Vec<*const c_char> = args.iter().map(|s| s.as_ptr()).collect();
            // The heap buffers behind these pointers stay put when the CStrings move
            op.keep_alive((config, args))
                .map_err(|e| SmbError::protocol(ErrorKind::Unknown, e.to_string()))?;

            debug!(handle = id, "dispatching foreign SMB call");
            // SAFETY: every pointer refers to a NUL-terminated buffer owned by the
            // handle until its terminal transition; the entry point copies them
            unsafe {
                match (call, ptrs.as_slice()) {
                    (Call::List, [path]) => {
                        (self.api.list)(config_ptr, *path, id, callbacks.on_success, callbacks.on_error)
                    }
                    (Call::Download, [remote, local]) => (self.api.download)(
                        config_ptr,
                        *remote,
                        *local,
                        id,
                        callbacks.on_success,
                        callbacks.on_error,
                    ),
                    (Call::Upload, [local, remote]) => (self.api.upload)(
                        config_ptr,
                        *local,
                        *remote,
                        id,
                        callbacks.on_success,
                        callbacks.on_error,
                    ),
                    (Call::Delete, [remote]) => {
                        (self.api.delete)(config_ptr, *remote, id, callbacks.on_success, callbacks.on_error)
                    }
                    _ => {
                        return Err(SmbError::protocol(
                            ErrorKind::Unknown,
                            "foreign call dispatched with the wrong argument count",
                        ))
                    }
                }
            }
        }

        match op.wait(cancel).await {
            Outcome::Succeeded(payload) => Ok(payload),
            Outcome::Failed { code, message } => Err(foreign_error(code, &message)),
            Outcome::Canceled => Err(SmbError::Cancelled),
        }
    }
}

fn foreign_error(code: i32, message: &str) -> SmbError {
    let kind = classify_foreign_code(code);
    if message.is_empty() {
        SmbError::protocol(kind, format!("platform client failed with code {}", code))
    } else {
        SmbError::protocol(kind, format!("platform client failed with code {}: {}", code, message))
    }
}

fn c_string<F>(value: String, on_nul: F) -> Result<CString>
where
    F: FnOnce(String) -> ValidationError,
{
    CString::new(value).map_err(|e| {
        let original = String::from_utf8_lossy(&e.into_vec()).into_owned();
        SmbError::Validation(on_nul(original))
    })
}

fn path_arg(path: &str, role: PathRole) -> Result<CString> {
    c_string(path.to_string(), |path| ValidationError::InvalidPathCharacters { role, path })
}

fn local_arg(path: &Path) -> Result<CString> {
    path_arg(&path.to_string_lossy(), PathRole::Local)
}

fn parse_listing(payload: Option<String>) -> Vec<String> {
    payload
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty() && !is_dot_entry(name))
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl ShareBackend for ForeignBackend {
    fn name(&self) -> &'static str {
        "foreign"
    }

    async fn list(
        &self,
        profile: &ConnectionProfile,
        dir: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let args = vec![path_arg(dir, PathRole::Remote)?];
        let payload = self.dispatch(Call::List, profile, args, cancel).await?;
        Ok(parse_listing(payload))
    }

    async fn download(
        &self,
        profile: &ConnectionProfile,
        remote: &str,
        local: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let dir = match local.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let staged = tempfile::Builder::new()
            .prefix(PARTIAL_DOWNLOAD_PREFIX)
            .tempfile_in(dir)?
            .into_temp_path();

        let args = vec![path_arg(remote, PathRole::Remote)?, local_arg(&staged)?];
        // Dropping `staged` on error removes whatever the client wrote so far
        self.dispatch(Call::Download, profile, args, cancel).await?;

        staged.persist(local).map_err(|e| SmbError::Io(e.error))?;
        Ok(())
    }

    async fn upload(
        &self,
        profile: &ConnectionProfile,
        local: &Path,
        remote: &str,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if !overwrite && self.exists(profile, remote, cancel).await? {
            return Err(SmbError::RemoteExists(remote.to_string()));
        }

        let args = vec![local_arg(local)?, path_arg(remote, PathRole::Remote)?];
        self.dispatch(Call::Upload, profile, args, cancel).await?;
        Ok(())
    }

    async fn delete(
        &self,
        profile: &ConnectionProfile,
        remote: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let args = vec![path_arg(remote, PathRole::Remote)?];
        self.dispatch(Call::Delete, profile, args, cancel).await?;
        Ok(())
    }

    /// Checked by listing the parent directory
    async fn exists(
        &self,
        profile: &ConnectionProfile,
        remote: &str,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let (parent, name) = split_remote(remote);
        match self.list(profile, parent, cancel).await {
            Ok(names) => Ok(names.iter().any(|n| n.eq_ignore_ascii_case(name))),
            Err(e) if e.kind() == Some(ErrorKind::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
