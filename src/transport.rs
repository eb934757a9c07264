use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{config::SftpEndpoint, error::RemoteResult};

pub type RemoteReader = Pin<Box<dyn AsyncRead + Send>>;
pub type RemoteWriter = Pin<Box<dyn AsyncWrite + Send>>;

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;
const S_IFLNK: u32 = 0o120000;
const S_IFREG: u32 = 0o100000;
const S_IFCHR: u32 = 0o020000;
const S_IFBLK: u32 = 0o060000;
const S_IFIFO: u32 = 0o010000;
const S_IFSOCK: u32 = 0o140000;

/// Attribute block of a remote entry, as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAttrs {
    /// `ls -l` style string, e.g. `drwxr-xr-x`
    pub permissions: String,
    pub size: u64,
    pub is_dir: bool,
    /// Seconds since the epoch
    pub mtime: u32,
    pub atime: u32,
    pub uid: u32,
    pub gid: u32,
}

impl RemoteAttrs {
    /// Attributes for a POSIX `mode`, everything else zeroed.
    pub fn from_mode(mode: u32) -> RemoteAttrs {
        RemoteAttrs {
            permissions: permissions_string(mode),
            size: 0,
            is_dir: mode & S_IFMT == S_IFDIR,
            mtime: 0,
            atime: 0,
            uid: 0,
            gid: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDirEntry {
    pub filename: String,
    pub attrs: RemoteAttrs,
}

/// Renders a POSIX mode the way `ls -l` does.
pub fn permissions_string(mode: u32) -> String {
    let mut output = String::with_capacity(10);
    output.push(match mode & S_IFMT {
        S_IFDIR => 'd',
        S_IFLNK => 'l',
        S_IFCHR => 'c',
        S_IFBLK => 'b',
        S_IFIFO => 'p',
        S_IFSOCK => 's',
        S_IFREG => '-',
        _ => '-',
    });

    let triple = |shift: u32, special: u32, special_char: char| {
        let bits = (mode >> shift) & 0o7;
        let execute = match (bits & 0o1 != 0, mode & special != 0) {
            (true, true) => special_char,
            (false, true) => special_char.to_ascii_uppercase(),
            (true, false) => 'x',
            (false, false) => '-',
        };
        [
            if bits & 0o4 != 0 { 'r' } else { '-' },
            if bits & 0o2 != 0 { 'w' } else { '-' },
            execute,
        ]
    };
    output.extend(triple(6, 0o4000, 's'));
    output.extend(triple(3, 0o2000, 's'));
    output.extend(triple(0, 0o1000, 't'));
    output
}

/// Establishes authenticated sessions to an SFTP endpoint.
#[async_trait]
pub trait SftpTransport: Send + Sync {
    async fn connect(&self, endpoint: &SftpEndpoint) -> RemoteResult<Box<dyn RemoteSession>>;
}

/// An authenticated transport session.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    async fn is_connected(&self) -> bool;

    /// Opens a request/response channel speaking SFTP on top of this session.
    async fn open_sftp(&self) -> RemoteResult<Box<dyn SftpChannel>>;

    async fn disconnect(&self) -> RemoteResult<()>;
}

/// Remote primitives of an SFTP channel. Relative paths are resolved against the
/// channel's current directory, which starts at the login directory and moves with `cd`.
#[async_trait]
pub trait SftpChannel: Send + Sync {
    async fn is_connected(&self) -> bool;

    async fn pwd(&self) -> RemoteResult<String>;

    async fn cd(&self, path: &str) -> RemoteResult<()>;

    async fn ls(&self, path: &str) -> RemoteResult<Vec<RemoteDirEntry>>;

    async fn lstat(&self, path: &str) -> RemoteResult<RemoteAttrs>;

    async fn get(&self, path: &str) -> RemoteResult<RemoteReader>;

    /// Opens `path` for writing, creating or truncating it.
    async fn put(&self, path: &str) -> RemoteResult<RemoteWriter>;

    async fn rm(&self, path: &str) -> RemoteResult<()>;

    async fn rmdir(&self, path: &str) -> RemoteResult<()>;

    async fn mkdir(&self, path: &str) -> RemoteResult<()>;

    async fn rename(&self, old_path: &str, new_path: &str) -> RemoteResult<()>;

    async fn disconnect(&self) -> RemoteResult<()>;
}

/// Joins a possibly relative `path` onto the channel directory `cwd`.
pub fn resolve_against(cwd: &str, path: &str) -> String {
    if path.starts_with('/') {
        return path.to_string();
    }
    if cwd.ends_with('/') {
        format!("{cwd}{path}")
    } else {
        format!("{cwd}/{path}")
    }
}
