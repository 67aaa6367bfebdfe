//! File operations against an attached share
//!
//! Each operation opens exactly one protocol handle with the access it
//! needs and closes it before returning, whether the transfer succeeded or
//! not. All of them expect a client that [`super::SessionExecutor`] has
//! already attached to the share.

use std::path::Path;

use tempfile::TempPath;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::types::{CreateRequest, FileId, NtStatus};
use super::RemoteFileClient;
use crate::error::{ErrorKind, Result, SmbError};

/// Prefix of in-progress download files next to their destination
pub const PARTIAL_DOWNLOAD_PREFIX: &str = ".smb-part";

/// True for the `.` and `..` pseudo-entries
pub fn is_dot_entry(name: &str) -> bool {
    name == "." || name == ".."
}

/// Names of the entries in `dir`, without `.` and `..`
pub async fn list_directory(client: &mut dyn RemoteFileClient, dir: &str) -> Result<Vec<String>> {
    let handle = client
        .create_file(dir, CreateRequest::list_directory())
        .await
        .map_err(|status| SmbError::from_status(status, &format!("open directory '{}' failed", dir)))?;

    let listing = client.query_directory(handle, "*").await;
    close_quietly(client, handle).await;

    let names = match listing {
        Ok(names) => names,
        Err(NtStatus::NO_MORE_FILES) => Vec::new(),
        Err(status) => {
            return Err(SmbError::from_status(status, &format!("list '{}' failed", dir)));
        }
    };
    Ok(names.into_iter().filter(|name| !is_dot_entry(name)).collect())
}

/// Copy `remote` to `local`, returning the number of bytes transferred
///
/// Data is staged in a temporary file beside `local` and moved into place
/// only after the last chunk arrives. A failed or cancelled download closes
/// its handle, leaves no partial file behind, and does not touch an existing
/// destination.
pub async fn download(
    client: &mut dyn RemoteFileClient,
    remote: &str,
    local: &Path,
    cancel: &CancellationToken,
) -> Result<u64> {
    if cancel.is_cancelled() {
        return Err(SmbError::Cancelled);
    }
    let handle = client
        .create_file(remote, CreateRequest::read_file())
        .await
        .map_err(|status| SmbError::from_status(status, &format!("open '{}' for reading failed", remote)))?;

    let transfer = read_to_temp(client, handle, remote, local, cancel).await;
    close_quietly(client, handle).await;

    let (staged, bytes) = transfer?;
    staged.persist(local).map_err(|e| SmbError::Io(e.error))?;
    debug!(remote, local = %local.display(), bytes, "download complete");
    Ok(bytes)
}

async fn read_to_temp(
    client: &mut dyn RemoteFileClient,
    handle: FileId,
    remote: &str,
    local: &Path,
    cancel: &CancellationToken,
) -> Result<(TempPath, u64)> {
    let dir = match local.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let staged = tempfile::Builder::new()
        .prefix(PARTIAL_DOWNLOAD_PREFIX)
        .tempfile_in(dir)?
        .into_temp_path();
    let mut sink = tokio::fs::File::create(&staged).await?;

    let chunk = client.max_read_size().max(1);
    let mut offset = 0u64;
    loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(remote, offset, "download cancelled");
                return Err(SmbError::Cancelled);
            }
            read = client.read(handle, offset, chunk) => read,
        };
        match read {
            Ok(data) if data.is_empty() => break,
            Ok(data) => {
                sink.write_all(&data).await?;
                offset += data.len() as u64;
            }
            Err(NtStatus::END_OF_FILE) => break,
            Err(status) => {
                return Err(SmbError::from_status(
                    status,
                    &format!("read '{}' at offset {} failed", remote, offset),
                ));
            }
        }
    }
    sink.flush().await?;
    sink.sync_all().await?;
    Ok((staged, offset))
}

/// Copy `local` to `remote`, returning the number of bytes transferred
///
/// An existing remote file is deleted and recreated when `overwrite` is set
/// and reported as [`SmbError::RemoteExists`] otherwise. If the write loop
/// fails or is cancelled, the partially written remote file is marked
/// delete-pending before it is closed so no truncated copy survives.
pub async fn upload(
    client: &mut dyn RemoteFileClient,
    local: &Path,
    remote: &str,
    overwrite: bool,
    cancel: &CancellationToken,
) -> Result<u64> {
    let mut source = tokio::fs::File::open(local).await?;

    if exists(client, remote).await? {
        if !overwrite {
            return Err(SmbError::RemoteExists(remote.to_string()));
        }
        if cancel.is_cancelled() {
            return Err(SmbError::Cancelled);
        }
        delete(client, remote).await?;
    }

    let handle = client
        .create_file(remote, CreateRequest::write_file())
        .await
        .map_err(|status| SmbError::from_status(status, &format!("create '{}' failed", remote)))?;

    let transfer = write_from(client, handle, remote, &mut source, cancel).await;
    if transfer.is_err() {
        if let Err(status) = client.set_delete_pending(handle, true).await {
            warn!(remote, %status, "could not discard partially written file");
        }
    }
    close_quietly(client, handle).await;

    let bytes = transfer?;
    debug!(remote, local = %local.display(), bytes, "upload complete");
    Ok(bytes)
}

async fn write_from(
    client: &mut dyn RemoteFileClient,
    handle: FileId,
    remote: &str,
    source: &mut tokio::fs::File,
    cancel: &CancellationToken,
) -> Result<u64> {
    let mut buf = vec![0u8; client.max_write_size().max(1) as usize];
    let mut offset = 0u64;
    loop {
        let n = source.read(&mut buf).await?;
        if n == 0 {
            return Ok(offset);
        }
        let mut sent = 0;
        while sent < n {
            let written = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(remote, offset, "upload cancelled");
                    return Err(SmbError::Cancelled);
                }
                written = client.write(handle, offset, &buf[sent..n]) => written,
            };
            let count = written.map_err(|status| {
                SmbError::from_status(status, &format!("write '{}' at offset {} failed", remote, offset))
            })? as usize;
            if count == 0 || count > n - sent {
                return Err(SmbError::protocol(
                    ErrorKind::ProtocolOperation,
                    format!(
                        "server acknowledged {} of {} bytes writing '{}' at offset {}",
                        count,
                        n - sent,
                        remote,
                        offset
                    ),
                ));
            }
            sent += count;
            offset += count as u64;
        }
    }
}

/// Delete `remote` by marking it delete-pending and closing it
pub async fn delete(client: &mut dyn RemoteFileClient, remote: &str) -> Result<()> {
    let handle = client
        .create_file(remote, CreateRequest::delete_file())
        .await
        .map_err(|status| SmbError::from_status(status, &format!("open '{}' for delete failed", remote)))?;

    let marked = client.set_delete_pending(handle, true).await;
    close_quietly(client, handle).await;
    marked.map_err(|status| SmbError::from_status(status, &format!("delete '{}' failed", remote)))
}

/// Whether `remote` names an existing file
pub async fn exists(client: &mut dyn RemoteFileClient, remote: &str) -> Result<bool> {
    match client.create_file(remote, CreateRequest::existence_check()).await {
        Ok(handle) => {
            close_quietly(client, handle).await;
            Ok(true)
        }
        Err(NtStatus::OBJECT_NAME_NOT_FOUND) | Err(NtStatus::OBJECT_PATH_NOT_FOUND) => Ok(false),
        Err(status) => Err(SmbError::from_status(status, &format!("existence check for '{}' failed", remote))),
    }
}

async fn close_quietly(client: &mut dyn RemoteFileClient, handle: FileId) {
    if let Err(status) = client.close(handle).await {
        warn!(?handle, %status, "close failed");
    }
}
