//! Directory operations performed against one held connection.
//!
//! Recursive operations (delete, mkdirs) reuse the same handle for the whole
//! traversal and visit children strictly one after another.

use futures_util::future::BoxFuture;
use tracing::{debug, trace};
use url::Url;

use crate::{
    connection::ConnectionHandle,
    error::{RemoteError, Result, SftpFsError},
    filesystem::{FileStatus, FsPath},
    metadata::{entry_to_status, root_status},
    resolver::make_absolute,
    transport::{RemoteDirEntry, RemoteReader, RemoteWriter, SftpChannel},
};

/// Outcome of a lightweight presence probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Existence {
    Found,
    Missing,
    /// The probe itself failed; the path may or may not exist.
    Failed(RemoteError),
}

pub struct DirectoryOps<'a> {
    channel: &'a dyn SftpChannel,
    uri: &'a Url,
}

impl<'a> DirectoryOps<'a> {
    pub fn new(connection: &'a ConnectionHandle, uri: &'a Url) -> DirectoryOps<'a> {
        DirectoryOps {
            channel: connection.channel(),
            uri,
        }
    }

    /// The channel's current directory, queried fresh on every call.
    pub async fn working_directory(&self) -> Result<FsPath> {
        self.channel
            .pwd()
            .await
            .map(FsPath::new)
            .map_err(|err| SftpFsError::protocol("cannot get current working directory", err))
    }

    pub async fn absolute(&self, path: &FsPath) -> Result<FsPath> {
        if path.is_absolute() {
            return Ok(path.unqualified());
        }
        let work_dir = self.working_directory().await?;
        Ok(make_absolute(&work_dir, path))
    }

    pub async fn probe(&self, path: &FsPath) -> Existence {
        let absolute = match self.absolute(path).await {
            Ok(absolute) => absolute,
            Err(SftpFsError::Protocol { source, .. }) => return Existence::Failed(source),
            Err(err) => return Existence::Failed(RemoteError::Failure(err.to_string())),
        };
        match self.channel.lstat(absolute.as_str()).await {
            Ok(_) => Existence::Found,
            Err(RemoteError::NoSuchFile(_)) => Existence::Missing,
            Err(err) => Existence::Failed(err),
        }
    }

    /// `false` on any remote error, including ones unrelated to absence.
    pub async fn exists(&self, path: &FsPath) -> bool {
        match self.probe(path).await {
            Existence::Found => true,
            Existence::Missing => false,
            Existence::Failed(err) => {
                debug!(path = %path, "existence check failed, treating as absent: {err}");
                false
            }
        }
    }

    pub async fn file_status(&self, path: &FsPath) -> Result<FileStatus> {
        let absolute = self.absolute(path).await?;
        let Some(parent) = absolute.parent() else {
            return Ok(root_status(self.uri));
        };

        let entries = match self.channel.ls(parent.as_str()).await {
            Ok(entries) => entries,
            Err(RemoteError::NoSuchFile(_)) => return Err(SftpFsError::not_found(path)),
            Err(err) => return Err(SftpFsError::protocol(format!("cannot list {parent}"), err)),
        };

        entries
            .iter()
            .find(|entry| entry.filename == absolute.name())
            .map(|entry| entry_to_status(entry, &parent, self.uri))
            .ok_or_else(|| SftpFsError::not_found(path))
    }

    pub async fn is_file(&self, path: &FsPath) -> Result<bool> {
        match self.file_status(path).await {
            Ok(status) => Ok(!status.is_dir),
            Err(SftpFsError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Lists one directory level, or the single entry for a file.
    pub async fn list_status(&self, path: &FsPath) -> Result<Vec<FileStatus>> {
        let absolute = self.absolute(path).await?;
        let status = self.file_status(&absolute).await?;
        if !status.is_dir {
            return Ok(vec![status]);
        }

        let entries = self
            .channel
            .ls(absolute.as_str())
            .await
            .map_err(|err| SftpFsError::protocol(format!("cannot list {absolute}"), err))?;

        Ok(visible_entries(entries)
            .iter()
            .map(|entry| entry_to_status(entry, &absolute, self.uri))
            .collect())
    }

    pub fn delete<'b>(&'b self, path: &'b FsPath, recursive: bool) -> BoxFuture<'b, Result<bool>> {
        Box::pin(async move {
            let absolute = self.absolute(path).await?;
            let status = self.file_status(&absolute).await?;
            if !status.is_dir {
                debug!(path = %absolute, "removing file");
                self.channel
                    .rm(absolute.as_str())
                    .await
                    .map_err(|err| {
                        SftpFsError::protocol(format!("cannot remove {absolute}"), err)
                    })?;
                return Ok(true);
            }

            let children = self.list_status(&absolute).await?;
            if !children.is_empty() && !recursive {
                return Err(SftpFsError::conflict(path, "directory is not empty"));
            }
            for child in &children {
                self.delete(&child.path.unqualified(), recursive).await?;
            }

            debug!(path = %absolute, "removing directory");
            self.channel
                .rmdir(absolute.as_str())
                .await
                .map_err(|err| {
                    SftpFsError::protocol(format!("cannot remove directory {absolute}"), err)
                })?;
            Ok(true)
        })
    }

    /// Creates `path` and any missing ancestors. Returns whether the whole chain
    /// now exists as directories.
    pub fn mkdirs<'b>(&'b self, path: &'b FsPath) -> BoxFuture<'b, Result<bool>> {
        Box::pin(async move {
            let absolute = self.absolute(path).await?;
            if self.exists(&absolute).await {
                if self.is_file(&absolute).await? {
                    return Err(SftpFsError::conflict(
                        &absolute,
                        "cannot make directory for a path that is a file",
                    ));
                }
                return Ok(true);
            }

            let Some(parent) = absolute.parent() else {
                return Ok(true);
            };
            if !self.mkdirs(&parent).await? {
                return Ok(false);
            }

            trace!(parent = %parent, name = absolute.name(), "creating directory");
            self.channel
                .cd(parent.as_str())
                .await
                .map_err(|err| {
                    SftpFsError::protocol(format!("cannot change directory to {parent}"), err)
                })?;
            self.channel
                .mkdir(absolute.name())
                .await
                .map_err(|err| {
                    SftpFsError::protocol(format!("cannot create directory {absolute}"), err)
                })?;
            Ok(true)
        })
    }

    /// Resolves `path`, checks it is a file, and opens it for reading.
    pub async fn open_reader(&self, path: &FsPath) -> Result<RemoteReader> {
        let absolute = self.absolute(path).await?;
        let status = self.file_status(&absolute).await?;
        if status.is_dir {
            return Err(SftpFsError::conflict(path, "path is a directory"));
        }
        self.channel
            .get(absolute.as_str())
            .await
            .map_err(|err| SftpFsError::protocol(format!("unable to open file {path}"), err))
    }

    /// Prepares the destination of a new file and opens it for writing: an existing
    /// file is removed when `overwrite` is set, missing parents are created, and the
    /// channel is moved into the parent directory.
    pub async fn open_writer(&self, path: &FsPath, overwrite: bool) -> Result<RemoteWriter> {
        let absolute = self.absolute(path).await?;
        if self.exists(&absolute).await {
            if !overwrite {
                return Err(SftpFsError::conflict(path, "file already exists"));
            }
            self.delete(&absolute, false).await?;
        }

        let Some(parent) = absolute.parent() else {
            return Err(SftpFsError::conflict(path, "cannot create a file at the root"));
        };
        if !self.mkdirs(&parent).await? {
            return Err(SftpFsError::conflict(&parent, "mkdirs failed to create parent"));
        }

        self.channel
            .cd(parent.as_str())
            .await
            .map_err(|err| {
                SftpFsError::protocol(format!("cannot change directory to {parent}"), err)
            })?;
        self.channel
            .put(absolute.name())
            .await
            .map_err(|err| SftpFsError::protocol(format!("unable to create file {path}"), err))
    }

    /// Renames within one directory. Moving across directories is not supported.
    pub async fn rename(&self, source: &FsPath, destination: &FsPath) -> Result<bool> {
        let work_dir = self.working_directory().await?;
        let absolute_source = make_absolute(&work_dir, source);
        let absolute_destination = make_absolute(&work_dir, destination);

        if !self.exists(&absolute_source).await {
            return Err(SftpFsError::not_found(source));
        }
        if self.exists(&absolute_destination).await {
            return Err(SftpFsError::conflict(
                destination,
                "destination already exists, cannot rename",
            ));
        }

        let (Some(source_parent), Some(destination_parent)) =
            (absolute_source.parent(), absolute_destination.parent())
        else {
            return Err(SftpFsError::Unsupported("renaming the root directory".into()));
        };
        if source_parent != destination_parent {
            return Err(SftpFsError::Unsupported(format!(
                "rename across directories ({source_parent} to {destination_parent})"
            )));
        }

        self.channel
            .cd(source_parent.as_str())
            .await
            .map_err(|err| {
                SftpFsError::protocol(format!("cannot change directory to {source_parent}"), err)
            })?;
        self.channel
            .rename(absolute_source.name(), absolute_destination.name())
            .await
            .map_err(|err| {
                SftpFsError::protocol(
                    format!("cannot rename {absolute_source} to {absolute_destination}"),
                    err,
                )
            })?;
        Ok(true)
    }
}

/// Drops self and parent markers. The check is a suffix match, so any name ending
/// in `.` is hidden as well.
pub fn visible_entries(entries: Vec<RemoteDirEntry>) -> Vec<RemoteDirEntry> {
    entries
        .into_iter()
        .filter(|entry| !entry.filename.ends_with('.'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::visible_entries;
    use crate::transport::{RemoteAttrs, RemoteDirEntry};

    fn entry(filename: &str) -> RemoteDirEntry {
        RemoteDirEntry {
            filename: filename.into(),
            attrs: RemoteAttrs::from_mode(0o100644),
        }
    }

    #[test]
    fn hides_entries_ending_in_a_dot() {
        let names: Vec<String> = visible_entries(vec![
            entry("."),
            entry(".."),
            entry("data.csv"),
            entry(".hidden"),
            entry("trailing."),
        ])
        .into_iter()
        .map(|entry| entry.filename)
        .collect();
        assert_eq!(names, vec!["data.csv", ".hidden"]);
    }
}
