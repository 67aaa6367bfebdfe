//! In-process SMB share emulator
//!
//! [`InMemoryClient`] implements [`RemoteFileClient`] against a
//! [`ShareFixture`] held in memory. Every client created from the same fixture
//! sees the same files, so a fixture can stand in for a server across many
//! sessions. The fixture journals each call and can inject failures at any
//! protocol step, which makes it the backend of choice for tests and local
//! development.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::types::{CreateDisposition, CreateRequest, FileId, NtStatus};
use super::{RemoteFileClient, DEFAULT_MAX_IO_SIZE};

/// One call observed by the fixture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCall {
    Connect,
    Login(String),
    TreeConnect(String),
    CreateFile(String),
    QueryDirectory,
    Read,
    Write,
    SetDeletePending(bool),
    Close,
    TreeDisconnect,
    Logoff,
    Disconnect,
}

impl ClientCall {
    pub fn is_teardown(&self) -> bool {
        matches!(
            self,
            ClientCall::TreeDisconnect | ClientCall::Logoff | ClientCall::Disconnect
        )
    }
}

#[derive(Debug)]
struct OpenHandle {
    path: String,
    is_dir: bool,
    exclusive: bool,
    delete_pending: bool,
}

#[derive(Debug)]
struct ShareState {
    share: String,
    credentials: Option<(String, String)>,
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    handles: HashMap<u64, OpenHandle>,
    next_handle: u64,
    calls: Vec<ClientCall>,
    clients_created: u32,
    io_size: u32,

    connect_failures: VecDeque<io::ErrorKind>,
    connect_delay: Option<Duration>,
    login_failures: VecDeque<NtStatus>,
    tree_failures: VecDeque<NtStatus>,
    read_fault: Option<(u32, NtStatus)>,
    write_fault: Option<(u32, NtStatus)>,
    read_delay: Option<Duration>,
    write_delay: Option<Duration>,
    overstate_writes: bool,
    failing_teardown: bool,
}

/// Shared contents and behaviour of an emulated share
#[derive(Debug, Clone)]
pub struct ShareFixture {
    state: Arc<Mutex<ShareState>>,
}

impl ShareFixture {
    pub fn new(share: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ShareState {
                share: share.into(),
                credentials: None,
                files: BTreeMap::new(),
                dirs: BTreeSet::new(),
                handles: HashMap::new(),
                next_handle: 1,
                calls: Vec::new(),
                clients_created: 0,
                io_size: DEFAULT_MAX_IO_SIZE,
                connect_failures: VecDeque::new(),
                connect_delay: None,
                login_failures: VecDeque::new(),
                tree_failures: VecDeque::new(),
                read_fault: None,
                write_fault: None,
                read_delay: None,
                write_delay: None,
                overstate_writes: false,
                failing_teardown: false,
            })),
        }
    }

    /// Require these credentials at login
    pub fn with_credentials(self, user_name: &str, password: &str) -> Self {
        self.state().credentials = Some((user_name.to_string(), password.to_string()));
        self
    }

    pub fn with_file(self, path: &str, data: Vec<u8>) -> Self {
        {
            let mut state = self.state();
            let path = normalize(path);
            for parent in ancestors(&path) {
                state.dirs.insert(parent);
            }
            state.files.insert(path, data);
        }
        self
    }

    pub fn with_dir(self, path: &str) -> Self {
        {
            let mut state = self.state();
            let path = normalize(path);
            for parent in ancestors(&path) {
                state.dirs.insert(parent);
            }
            state.dirs.insert(path);
        }
        self
    }

    /// Negotiated read and write size reported by clients
    pub fn with_io_size(self, bytes: u32) -> Self {
        self.state().io_size = bytes.max(1);
        self
    }

    /// Make the next `count` transport connects fail
    pub fn fail_connects(&self, count: u32) {
        let mut state = self.state();
        for _ in 0..count {
            state.connect_failures.push_back(io::ErrorKind::ConnectionRefused);
        }
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        self.state().connect_delay = Some(delay);
    }

    /// Reject the next login with `status`
    pub fn fail_login(&self, status: NtStatus) {
        self.state().login_failures.push_back(status);
    }

    /// Reject the next tree connect with `status`
    pub fn fail_tree_connect(&self, status: NtStatus) {
        self.state().tree_failures.push_back(status);
    }

    /// Fail the read issued after `successful_reads` good ones, once
    pub fn fail_read_after(&self, successful_reads: u32, status: NtStatus) {
        self.state().read_fault = Some((successful_reads, status));
    }

    /// Fail the write issued after `successful_writes` good ones, once
    pub fn fail_write_after(&self, successful_writes: u32, status: NtStatus) {
        self.state().write_fault = Some((successful_writes, status));
    }

    pub fn set_read_delay(&self, delay: Duration) {
        self.state().read_delay = Some(delay);
    }

    pub fn set_write_delay(&self, delay: Duration) {
        self.state().write_delay = Some(delay);
    }

    /// Report one byte more than was actually written
    pub fn overstate_write_counts(&self) {
        self.state().overstate_writes = true;
    }

    /// Make detach, logoff, and disconnect report failures
    pub fn fail_teardown(&self) {
        self.state().failing_teardown = true;
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state().files.get(&normalize(path)).cloned()
    }

    pub fn calls(&self) -> Vec<ClientCall> {
        self.state().calls.clone()
    }

    pub fn teardown_calls(&self) -> Vec<ClientCall> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.is_teardown())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Number of clients handed out so far
    pub fn clients_created(&self) -> u32 {
        self.state().clients_created
    }

    pub fn open_handles(&self) -> usize {
        self.state().handles.len()
    }

    fn state(&self) -> MutexGuard<'_, ShareState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, call: ClientCall) {
        self.state().calls.push(call);
    }
}

/// [`RemoteFileClient`] backed by a [`ShareFixture`]
#[derive(Debug)]
pub struct InMemoryClient {
    fixture: ShareFixture,
    connected: bool,
    logged_in: bool,
    attached: bool,
    io_size: u32,
}

impl InMemoryClient {
    pub fn new(fixture: ShareFixture) -> Self {
        let io_size = {
            let mut state = fixture.state();
            state.clients_created += 1;
            state.io_size
        };
        Self {
            fixture,
            connected: false,
            logged_in: false,
            attached: false,
            io_size,
        }
    }

    /// Client factory handing out a fresh client per session
    pub fn factory(fixture: ShareFixture) -> impl Fn() -> Box<dyn RemoteFileClient> + Send + Sync {
        move || Box::new(InMemoryClient::new(fixture.clone())) as Box<dyn RemoteFileClient>
    }

    fn require_attached(&self) -> Result<(), NtStatus> {
        if self.attached {
            Ok(())
        } else {
            Err(NtStatus::NETWORK_NAME_DELETED)
        }
    }
}

#[async_trait]
impl RemoteFileClient for InMemoryClient {
    async fn connect(&mut self, _addr: SocketAddr) -> io::Result<()> {
        self.fixture.record(ClientCall::Connect);
        let (delay, failure) = {
            let mut state = self.fixture.state();
            (state.connect_delay, state.connect_failures.pop_front())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(kind) = failure {
            return Err(io::Error::new(kind, "connection refused by emulated server"));
        }
        self.connected = true;
        Ok(())
    }

    async fn login(&mut self, user_name: &str, password: &str) -> Result<(), NtStatus> {
        self.fixture.record(ClientCall::Login(user_name.to_string()));
        let mut state = self.fixture.state();
        if !self.connected {
            return Err(NtStatus::INVALID_HANDLE);
        }
        if let Some(status) = state.login_failures.pop_front() {
            return Err(status);
        }
        if let Some((user, pass)) = &state.credentials {
            if user != user_name || pass != password {
                return Err(NtStatus::LOGON_FAILURE);
            }
        }
        self.logged_in = true;
        Ok(())
    }

    async fn tree_connect(&mut self, share: &str) -> Result<(), NtStatus> {
        self.fixture.record(ClientCall::TreeConnect(share.to_string()));
        let mut state = self.fixture.state();
        if !self.logged_in {
            return Err(NtStatus::ACCESS_DENIED);
        }
        if let Some(status) = state.tree_failures.pop_front() {
            return Err(status);
        }
        if !state.share.eq_ignore_ascii_case(share) {
            return Err(NtStatus::BAD_NETWORK_NAME);
        }
        self.attached = true;
        Ok(())
    }

    async fn create_file(&mut self, path: &str, request: CreateRequest) -> Result<FileId, NtStatus> {
        self.fixture.record(ClientCall::CreateFile(path.to_string()));
        self.require_attached()?;
        let mut state = self.fixture.state();
        let path = normalize(path);

        let busy: Vec<&OpenHandle> = state.handles.values().filter(|h| h.path == path).collect();
        if busy.iter().any(|h| h.delete_pending) {
            return Err(NtStatus::DELETE_PENDING);
        }
        let exclusive = request.share.is_empty();
        if !busy.is_empty() && (exclusive || busy.iter().any(|h| h.exclusive)) {
            return Err(NtStatus::SHARING_VIOLATION);
        }

        let is_dir_path = path.is_empty() || state.dirs.contains(&path);
        let is_file_path = state.files.contains_key(&path);

        if request.is_directory() {
            if is_file_path {
                return Err(NtStatus::NOT_A_DIRECTORY);
            }
            if !is_dir_path {
                return Err(NtStatus::OBJECT_NAME_NOT_FOUND);
            }
        } else {
            if is_dir_path {
                return Err(NtStatus::FILE_IS_A_DIRECTORY);
            }
            let parent_exists = parent(&path).map_or(true, |p| p.is_empty() || state.dirs.contains(&p));
            match request.disposition {
                CreateDisposition::Open if !is_file_path => {
                    return Err(NtStatus::OBJECT_NAME_NOT_FOUND)
                }
                CreateDisposition::Overwrite if !is_file_path => {
                    return Err(NtStatus::OBJECT_NAME_NOT_FOUND)
                }
                CreateDisposition::Create if is_file_path => {
                    return Err(NtStatus::OBJECT_NAME_COLLISION)
                }
                CreateDisposition::Open => {}
                _ if !parent_exists => return Err(NtStatus::OBJECT_PATH_NOT_FOUND),
                CreateDisposition::OpenIf => {
                    state.files.entry(path.clone()).or_default();
                }
                CreateDisposition::Create
                | CreateDisposition::Overwrite
                | CreateDisposition::OverwriteIf
                | CreateDisposition::Supersede => {
                    state.files.insert(path.clone(), Vec::new());
                }
            }
        }

        let id = state.next_handle;
        state.next_handle += 1;
        state.handles.insert(
            id,
            OpenHandle {
                path,
                is_dir: request.is_directory(),
                exclusive,
                delete_pending: false,
            },
        );
        Ok(FileId(id))
    }

    async fn query_directory(&mut self, dir: FileId, _pattern: &str) -> Result<Vec<String>, NtStatus> {
        self.fixture.record(ClientCall::QueryDirectory);
        self.require_attached()?;
        let state = self.fixture.state();
        let handle = state.handles.get(&dir.0).ok_or(NtStatus::INVALID_HANDLE)?;
        if !handle.is_dir {
            return Err(NtStatus::NOT_A_DIRECTORY);
        }

        let mut names = vec![".".to_string(), "..".to_string()];
        let children = state
            .dirs
            .iter()
            .chain(state.files.keys())
            .filter(|p| parent(p).unwrap_or_default() == handle.path && !p.is_empty())
            .map(|p| file_name(p).to_string());
        names.extend(children);
        Ok(names)
    }

    async fn read(&mut self, file: FileId, offset: u64, max_len: u32) -> Result<Bytes, NtStatus> {
        self.fixture.record(ClientCall::Read);
        self.require_attached()?;
        let delay = self.fixture.state().read_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.fixture.state();
        if let Some((remaining, status)) = state.read_fault {
            if remaining == 0 {
                state.read_fault = None;
                return Err(status);
            }
            state.read_fault = Some((remaining - 1, status));
        }

        let handle = state.handles.get(&file.0).ok_or(NtStatus::INVALID_HANDLE)?;
        let data = state.files.get(&handle.path).ok_or(NtStatus::OBJECT_NAME_NOT_FOUND)?;
        let start = offset as usize;
        if start >= data.len() {
            return Err(NtStatus::END_OF_FILE);
        }
        let end = (start + max_len as usize).min(data.len());
        Ok(Bytes::copy_from_slice(&data[start..end]))
    }

    async fn write(&mut self, file: FileId, offset: u64, data: &[u8]) -> Result<u32, NtStatus> {
        self.fixture.record(ClientCall::Write);
        self.require_attached()?;
        let delay = self.fixture.state().write_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.fixture.state();
        if let Some((remaining, status)) = state.write_fault {
            if remaining == 0 {
                state.write_fault = None;
                return Err(status);
            }
            state.write_fault = Some((remaining - 1, status));
        }

        let path = state
            .handles
            .get(&file.0)
            .map(|h| h.path.clone())
            .ok_or(NtStatus::INVALID_HANDLE)?;
        let contents = state.files.entry(path).or_default();
        let start = offset as usize;
        let end = start + data.len();
        if contents.len() < end {
            contents.resize(end, 0);
        }
        contents[start..end].copy_from_slice(data);
        let reported = if state.overstate_writes { data.len() + 1 } else { data.len() };
        Ok(reported as u32)
    }

    async fn set_delete_pending(&mut self, file: FileId, pending: bool) -> Result<(), NtStatus> {
        self.fixture.record(ClientCall::SetDeletePending(pending));
        self.require_attached()?;
        let mut state = self.fixture.state();
        let handle = state.handles.get_mut(&file.0).ok_or(NtStatus::INVALID_HANDLE)?;
        handle.delete_pending = pending;
        Ok(())
    }

    async fn close(&mut self, file: FileId) -> Result<(), NtStatus> {
        self.fixture.record(ClientCall::Close);
        let mut state = self.fixture.state();
        let handle = state.handles.remove(&file.0).ok_or(NtStatus::INVALID_HANDLE)?;
        if handle.delete_pending {
            state.files.remove(&handle.path);
        }
        Ok(())
    }

    async fn tree_disconnect(&mut self) -> Result<(), NtStatus> {
        self.fixture.record(ClientCall::TreeDisconnect);
        self.attached = false;
        if self.fixture.state().failing_teardown {
            return Err(NtStatus::IO_TIMEOUT);
        }
        Ok(())
    }

    async fn logoff(&mut self) -> Result<(), NtStatus> {
        self.fixture.record(ClientCall::Logoff);
        self.logged_in = false;
        if self.fixture.state().failing_teardown {
            return Err(NtStatus::IO_TIMEOUT);
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> io::Result<()> {
        self.fixture.record(ClientCall::Disconnect);
        self.connected = false;
        if self.fixture.state().failing_teardown {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "transport already closed"));
        }
        Ok(())
    }

    fn max_read_size(&self) -> u32 {
        self.io_size
    }

    fn max_write_size(&self) -> u32 {
        self.io_size
    }
}

fn normalize(path: &str) -> String {
    path.replace('/', "\\").trim_matches('\\').to_string()
}

fn parent(path: &str) -> Option<String> {
    if path.is_empty() {
        return None;
    }
    Some(path.rsplit_once('\\').map(|(p, _)| p.to_string()).unwrap_or_default())
}

fn file_name(path: &str) -> &str {
    path.rsplit_once('\\').map(|(_, n)| n).unwrap_or(path)
}

fn ancestors(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = parent(path);
    while let Some(p) = current {
        if p.is_empty() {
            break;
        }
        current = parent(&p);
        out.push(p);
    }
    out
}
