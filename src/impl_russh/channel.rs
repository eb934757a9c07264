use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use russh::client;
use russh_sftp::{
    client::{error::Error, fs::Metadata, SftpSession},
    protocol::StatusCode,
};
use tracing::trace;

use super::TrustingHandler;
use crate::{
    error::{RemoteError, RemoteResult},
    transport::{
        resolve_against, RemoteAttrs, RemoteDirEntry, RemoteReader, RemoteWriter, SftpChannel,
    },
};

type SessionHandle = Arc<tokio::sync::Mutex<client::Handle<TrustingHandler>>>;

/// An SFTP channel over `russh-sftp`.
///
/// The SFTP protocol has no server-side working directory, so `cd` moves a
/// client-side cursor that relative paths are resolved against.
pub struct RusshSftpChannel {
    sftp_session: Mutex<Option<Arc<SftpSession>>>,
    /// The SSH session carrying the channel; it closes when the server or network
    /// drops the connection.
    handle: SessionHandle,
    cwd: Mutex<String>,
}

impl RusshSftpChannel {
    pub(super) async fn new(
        sftp_session: SftpSession,
        handle: SessionHandle,
    ) -> RemoteResult<RusshSftpChannel> {
        let home = sftp_session
            .canonicalize(".")
            .await
            .map_err(|err| remote_error(".", err))?;
        Ok(RusshSftpChannel {
            sftp_session: Mutex::new(Some(Arc::new(sftp_session))),
            handle,
            cwd: Mutex::new(home),
        })
    }

    fn session(&self) -> RemoteResult<Arc<SftpSession>> {
        lock(&self.sftp_session)
            .clone()
            .ok_or_else(|| RemoteError::ConnectionLost("sftp channel is closed".into()))
    }

    fn resolve(&self, path: &str) -> String {
        resolve_against(&lock(&self.cwd), path)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl SftpChannel for RusshSftpChannel {
    async fn is_connected(&self) -> bool {
        let open = lock(&self.sftp_session).is_some();
        open && !self.handle.lock().await.is_closed()
    }

    async fn pwd(&self) -> RemoteResult<String> {
        self.session()?;
        Ok(lock(&self.cwd).clone())
    }

    async fn cd(&self, path: &str) -> RemoteResult<()> {
        let session = self.session()?;
        let target = self.resolve(path);
        let canonical = session
            .canonicalize(target.as_str())
            .await
            .map_err(|err| remote_error(&target, err))?;
        let metadata = session
            .metadata(canonical.as_str())
            .await
            .map_err(|err| remote_error(&canonical, err))?;
        if !to_remote_attrs(&metadata).is_dir {
            return Err(RemoteError::Failure(format!("{canonical}: not a directory")));
        }
        trace!(cwd = %canonical, "changed directory");
        *lock(&self.cwd) = canonical;
        Ok(())
    }

    async fn ls(&self, path: &str) -> RemoteResult<Vec<RemoteDirEntry>> {
        let target = self.resolve(path);
        let read_dir = self
            .session()?
            .read_dir(target.as_str())
            .await
            .map_err(|err| remote_error(&target, err))?;
        Ok(read_dir
            .map(|entry| RemoteDirEntry {
                filename: entry.file_name(),
                attrs: to_remote_attrs(&entry.metadata()),
            })
            .collect())
    }

    async fn lstat(&self, path: &str) -> RemoteResult<RemoteAttrs> {
        let target = self.resolve(path);
        self.session()?
            .symlink_metadata(target.as_str())
            .await
            .map(|metadata| to_remote_attrs(&metadata))
            .map_err(|err| remote_error(&target, err))
    }

    async fn get(&self, path: &str) -> RemoteResult<RemoteReader> {
        let target = self.resolve(path);
        let file = self
            .session()?
            .open(target.as_str())
            .await
            .map_err(|err| remote_error(&target, err))?;
        Ok(Box::pin(file))
    }

    async fn put(&self, path: &str) -> RemoteResult<RemoteWriter> {
        let target = self.resolve(path);
        let file = self
            .session()?
            .create(target.as_str())
            .await
            .map_err(|err| remote_error(&target, err))?;
        Ok(Box::pin(file))
    }

    async fn rm(&self, path: &str) -> RemoteResult<()> {
        let target = self.resolve(path);
        self.session()?
            .remove_file(target.as_str())
            .await
            .map_err(|err| remote_error(&target, err))
    }

    async fn rmdir(&self, path: &str) -> RemoteResult<()> {
        let target = self.resolve(path);
        self.session()?
            .remove_dir(target.as_str())
            .await
            .map_err(|err| remote_error(&target, err))
    }

    async fn mkdir(&self, path: &str) -> RemoteResult<()> {
        let target = self.resolve(path);
        self.session()?
            .create_dir(target.as_str())
            .await
            .map_err(|err| remote_error(&target, err))
    }

    async fn rename(&self, old_path: &str, new_path: &str) -> RemoteResult<()> {
        let old_target = self.resolve(old_path);
        let new_target = self.resolve(new_path);
        self.session()?
            .rename(old_target.as_str(), new_target.as_str())
            .await
            .map_err(|err| remote_error(&old_target, err))
    }

    /// Dropping the last reference to the SFTP session closes its channel.
    async fn disconnect(&self) -> RemoteResult<()> {
        match lock(&self.sftp_session).take() {
            Some(_) => Ok(()),
            None => Err(RemoteError::ConnectionLost("sftp channel is already closed".into())),
        }
    }
}

fn to_remote_attrs(metadata: &Metadata) -> RemoteAttrs {
    let mut attrs = RemoteAttrs::from_mode(metadata.permissions.unwrap_or_default());
    attrs.size = metadata.size.unwrap_or_default();
    attrs.mtime = metadata.mtime.unwrap_or_default();
    attrs.atime = metadata.atime.unwrap_or_default();
    attrs.uid = metadata.uid.unwrap_or_default();
    attrs.gid = metadata.gid.unwrap_or_default();
    attrs
}

pub(super) fn map_sftp_error(err: Error) -> RemoteError {
    remote_error("sftp session", err)
}

fn remote_error(path: &str, err: Error) -> RemoteError {
    match err {
        Error::Status(status) => {
            let message = format!("{path}: {}", status.error_message);
            match status.status_code {
                StatusCode::NoSuchFile => RemoteError::NoSuchFile(message),
                StatusCode::PermissionDenied => RemoteError::PermissionDenied(message),
                StatusCode::NoConnection | StatusCode::ConnectionLost => {
                    RemoteError::ConnectionLost(message)
                }
                _ => RemoteError::Failure(message),
            }
        }
        other => RemoteError::Failure(format!("{path}: {other}")),
    }
}
