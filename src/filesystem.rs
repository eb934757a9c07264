use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::SystemTime,
};

use async_trait::async_trait;
use bitflags::bitflags;
use tokio::io::{AsyncRead, AsyncWrite};
use url::Url;

use crate::error::Result;

/// Nominal block size reported for every entry; SFTP has no notion of blocks.
pub const DEFAULT_BLOCK_SIZE: u64 = 4 * 1024;

/// Buffer size used by streams when the caller passes no hint.
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// A hierarchical path, optionally qualified with a `scheme://authority` prefix.
///
/// Paths are normalized on construction: empty and `.` segments are dropped and
/// `..` is folded into its predecessor where one exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FsPath {
    authority: Option<String>,
    path: String,
}

impl FsPath {
    pub fn new(path: impl AsRef<str>) -> FsPath {
        let raw = path.as_ref();
        if let Some((authority, rest)) = split_authority(raw) {
            let rest = if rest.is_empty() { "/" } else { rest };
            return FsPath {
                authority: Some(authority.to_string()),
                path: normalize(rest),
            };
        }
        FsPath {
            authority: None,
            path: normalize(raw),
        }
    }

    pub fn root() -> FsPath {
        FsPath::new("/")
    }

    /// The bare remote path, without any qualification prefix.
    pub fn as_str(&self) -> &str {
        &self.path
    }

    pub fn is_absolute(&self) -> bool {
        self.path.starts_with('/')
    }

    pub fn is_root(&self) -> bool {
        self.path == "/"
    }

    pub fn is_qualified(&self) -> bool {
        self.authority.is_some()
    }

    /// The last path segment; empty for the root.
    pub fn name(&self) -> &str {
        match self.path.rfind('/') {
            Some(index) => &self.path[index + 1..],
            None if self.path == "." => "",
            None => &self.path,
        }
    }

    pub fn parent(&self) -> Option<FsPath> {
        if self.is_root() {
            return None;
        }
        let parent = match self.path.rfind('/') {
            Some(0) => "/".to_string(),
            Some(index) => self.path[..index].to_string(),
            None => return None,
        };
        Some(FsPath {
            authority: self.authority.clone(),
            path: parent,
        })
    }

    /// Resolves `child` against this path. An absolute child wins outright.
    pub fn join(&self, child: &FsPath) -> FsPath {
        if child.is_absolute() {
            return child.clone();
        }
        if child.path == "." {
            return self.clone();
        }
        FsPath {
            authority: self.authority.clone(),
            path: normalize(&format!("{}/{}", self.path, child.path)),
        }
    }

    pub fn child(&self, name: &str) -> FsPath {
        self.join(&FsPath::new(name))
    }

    /// Drops any qualification prefix.
    pub fn unqualified(&self) -> FsPath {
        FsPath {
            authority: None,
            path: self.path.clone(),
        }
    }

    /// Prefixes the path with the scheme and authority of `uri`.
    pub fn make_qualified(&self, uri: &Url) -> FsPath {
        let mut authority = format!("{}://{}", uri.scheme(), uri.host_str().unwrap_or_default());
        if let Some(port) = uri.port() {
            authority.push(':');
            authority.push_str(&port.to_string());
        }
        FsPath {
            authority: Some(authority),
            path: self.path.clone(),
        }
    }
}

impl fmt::Display for FsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(authority) = &self.authority {
            f.write_str(authority)?;
        }
        f.write_str(&self.path)
    }
}

impl From<&str> for FsPath {
    fn from(value: &str) -> Self {
        FsPath::new(value)
    }
}

impl From<String> for FsPath {
    fn from(value: String) -> Self {
        FsPath::new(value)
    }
}

fn split_authority(raw: &str) -> Option<(&str, &str)> {
    let scheme_end = raw.find("://")?;
    let scheme = &raw[..scheme_end];
    if scheme.is_empty()
        || !scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        return None;
    }
    let after = scheme_end + 3;
    match raw[after..].find('/') {
        Some(slash) => Some(raw.split_at(after + slash)),
        None => Some((raw, "")),
    }
}

fn normalize(raw: &str) -> String {
    let absolute = raw.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(last) if *last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(segment),
            },
            _ => segments.push(segment),
        }
    }

    if absolute {
        format!("/{}", segments.join("/"))
    } else if segments.is_empty() {
        ".".to_string()
    } else {
        segments.join("/")
    }
}

bitflags! {
    /// Access bits for one of the user, group and other classes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FsAction: u8 {
        const READ = 0b100;
        const WRITE = 0b010;
        const EXECUTE = 0b001;
    }
}

impl fmt::Display for FsAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |bit: FsAction, c: char| if self.contains(bit) { c } else { '-' };
        write!(
            f,
            "{}{}{}",
            flag(FsAction::READ, 'r'),
            flag(FsAction::WRITE, 'w'),
            flag(FsAction::EXECUTE, 'x')
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FsPermission {
    pub user: FsAction,
    pub group: FsAction,
    pub other: FsAction,
}

impl FsPermission {
    pub fn new(user: FsAction, group: FsAction, other: FsAction) -> FsPermission {
        FsPermission { user, group, other }
    }

    pub fn from_mode(mode: u32) -> FsPermission {
        FsPermission {
            user: FsAction::from_bits_truncate(((mode >> 6) & 0o7) as u8),
            group: FsAction::from_bits_truncate(((mode >> 3) & 0o7) as u8),
            other: FsAction::from_bits_truncate((mode & 0o7) as u8),
        }
    }

    pub fn to_mode(&self) -> u32 {
        (u32::from(self.user.bits()) << 6)
            | (u32::from(self.group.bits()) << 3)
            | u32::from(self.other.bits())
    }
}

impl Default for FsPermission {
    fn default() -> Self {
        FsPermission::from_mode(0o777)
    }
}

impl fmt::Display for FsPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.user, self.group, self.other)
    }
}

/// Metadata describing one path, independent of the remote protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    /// `None` when the length is unknown, as for the root.
    pub len: Option<u64>,
    pub is_dir: bool,
    pub replication: u16,
    pub block_size: u64,
    pub modification_time: Option<SystemTime>,
    pub access_time: Option<SystemTime>,
    pub permission: FsPermission,
    pub owner: String,
    pub group: String,
    pub path: FsPath,
}

impl FileStatus {
    pub fn is_file(&self) -> bool {
        !self.is_dir
    }
}

/// Byte and operation counters shared by every stream of one file system.
#[derive(Debug, Default)]
pub struct Statistics {
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    read_ops: AtomicU64,
    write_ops: AtomicU64,
}

impl Statistics {
    pub fn new() -> Arc<Statistics> {
        Arc::new(Statistics::default())
    }

    pub fn increment_bytes_read(&self, bytes: u64) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
        self.read_ops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_bytes_written(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
        self.write_ops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    pub fn read_ops(&self) -> u64 {
        self.read_ops.load(Ordering::Relaxed)
    }

    pub fn write_ops(&self) -> u64 {
        self.write_ops.load(Ordering::Relaxed)
    }
}

pub type ProgressCallback = Arc<dyn Fn() + Send + Sync>;

/// Options for [`Filesystem::create`]. Replication, block size and progress exist for
/// contract compatibility; remote storage has no replication concept.
#[derive(Clone)]
pub struct CreateOptions {
    pub(crate) permission: FsPermission,
    pub(crate) overwrite: bool,
    pub(crate) buffer_size: usize,
    pub(crate) replication: u16,
    pub(crate) block_size: u64,
    pub(crate) progress: Option<ProgressCallback>,
}

impl CreateOptions {
    pub fn new() -> CreateOptions {
        CreateOptions {
            permission: FsPermission::default(),
            overwrite: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
            replication: 1,
            block_size: DEFAULT_BLOCK_SIZE,
            progress: None,
        }
    }

    pub fn permission(&mut self, permission: FsPermission) -> &mut Self {
        self.permission = permission;
        self
    }

    pub fn overwrite(&mut self) -> &mut Self {
        self.overwrite = true;
        self
    }

    pub fn buffer_size(&mut self, buffer_size: usize) -> &mut Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn replication(&mut self, replication: u16) -> &mut Self {
        self.replication = replication;
        self
    }

    pub fn block_size(&mut self, block_size: u64) -> &mut Self {
        self.block_size = block_size;
        self
    }

    pub fn progress(&mut self, progress: ProgressCallback) -> &mut Self {
        self.progress = Some(progress);
        self
    }

    pub fn is_overwrite(&self) -> bool {
        self.overwrite
    }
}

impl Default for CreateOptions {
    fn default() -> Self {
        CreateOptions::new()
    }
}

impl fmt::Debug for CreateOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateOptions")
            .field("permission", &self.permission)
            .field("overwrite", &self.overwrite)
            .field("buffer_size", &self.buffer_size)
            .field("replication", &self.replication)
            .field("block_size", &self.block_size)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// The hierarchical file system contract.
#[async_trait]
pub trait Filesystem {
    type Reader: AsyncRead + Send + Unpin;
    type Writer: AsyncWrite + Send + Unpin;

    fn uri(&self) -> &Url;

    async fn open(&self, path: &FsPath, buffer_size: usize) -> Result<Self::Reader>;

    async fn create(&self, path: &FsPath, options: &CreateOptions) -> Result<Self::Writer>;

    async fn append(&self, path: &FsPath, buffer_size: usize) -> Result<Self::Writer>;

    async fn delete(&self, path: &FsPath, recursive: bool) -> Result<bool>;

    async fn list_status(&self, path: &FsPath) -> Result<Vec<FileStatus>>;

    async fn file_status(&self, path: &FsPath) -> Result<FileStatus>;

    async fn mkdirs(&self, path: &FsPath, permission: FsPermission) -> Result<bool>;

    async fn rename(&self, source: &FsPath, destination: &FsPath) -> Result<bool>;

    async fn home_directory(&self) -> Result<FsPath>;

    async fn working_directory(&self) -> Result<FsPath>;

    fn set_working_directory(&self, path: &FsPath);
}
