pub mod config;
pub mod connection;
pub mod error;
pub mod filesystem;
pub mod logging;
pub mod metadata;
pub mod ops;
pub mod resolver;
pub mod sftp_fs;
pub mod stream;
pub mod transport;

#[cfg(feature = "impl-russh")]
pub mod impl_russh;

pub use config::{Configuration, SftpEndpoint};
pub use error::{RemoteError, Result, SftpFsError};
pub use filesystem::{
    CreateOptions, FileStatus, Filesystem, FsAction, FsPath, FsPermission, Statistics,
};
pub use sftp_fs::SftpFileSystem;
pub use stream::{SftpInputStream, SftpOutputStream};
