use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use crate::{
    config::{Configuration, SftpEndpoint},
    connection::{ConnectionHandle, Connector},
    error::{Result, SftpFsError},
    filesystem::{
        CreateOptions, FileStatus, Filesystem, FsPath, FsPermission, Statistics,
        DEFAULT_BUFFER_SIZE,
    },
    ops::DirectoryOps,
    stream::{SftpInputStream, SftpOutputStream},
    transport::SftpTransport,
};

/// A file system whose storage lives behind an SFTP server.
///
/// No connection is held between calls: every operation opens its own session and
/// tears it down before returning, except [`SftpFileSystem::open`] and
/// [`SftpFileSystem::create`], whose streams release the session when closed.
pub struct SftpFileSystem {
    uri: Url,
    configuration: Configuration,
    endpoint: SftpEndpoint,
    connector: Connector,
    statistics: Arc<Statistics>,
}

impl SftpFileSystem {
    /// Initializes against the `russh` transport.
    #[cfg(feature = "impl-russh")]
    pub fn initialize(uri: &str, configuration: Configuration) -> Result<SftpFileSystem> {
        let transport = Arc::new(crate::impl_russh::RusshTransport::new());
        SftpFileSystem::with_transport(uri, configuration, transport)
    }

    pub fn with_transport(
        uri: &str,
        mut configuration: Configuration,
        transport: Arc<dyn SftpTransport>,
    ) -> Result<SftpFileSystem> {
        let uri = Url::parse(uri)?;
        let endpoint = SftpEndpoint::resolve(&uri, &mut configuration)?;
        Ok(SftpFileSystem {
            uri,
            configuration,
            endpoint,
            connector: Connector::new(transport),
            statistics: Statistics::new(),
        })
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn endpoint(&self) -> &SftpEndpoint {
        &self.endpoint
    }

    pub fn statistics(&self) -> &Arc<Statistics> {
        &self.statistics
    }

    async fn connect(&self) -> Result<ConnectionHandle> {
        self.connector.connect(&self.endpoint).await
    }

    /// Disconnects `connection` and returns `result`. The operation's own error takes
    /// precedence over a disconnect failure.
    async fn finish<T>(&self, connection: ConnectionHandle, result: Result<T>) -> Result<T> {
        let disconnected = connection.disconnect().await;
        match (result, disconnected) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(disconnect_err)) => {
                warn!(
                    host = %self.endpoint.host,
                    "disconnect after failed operation also failed: {disconnect_err}"
                );
                Err(err)
            }
        }
    }

    pub async fn exists(&self, path: &FsPath) -> Result<bool> {
        let connection = self.connect().await?;
        let found = DirectoryOps::new(&connection, &self.uri).exists(path).await;
        self.finish(connection, Ok(found)).await
    }

    /// Non-recursive delete.
    #[deprecated(note = "use `delete(path, recursive)`")]
    pub async fn delete_non_recursive(&self, path: &FsPath) -> Result<bool> {
        Filesystem::delete(self, path, false).await
    }

    pub async fn create_file(&self, path: &FsPath, overwrite: bool) -> Result<SftpOutputStream> {
        let mut options = CreateOptions::new();
        if overwrite {
            options.overwrite();
        }
        Filesystem::create(self, path, &options).await
    }
}

#[async_trait]
impl Filesystem for SftpFileSystem {
    type Reader = SftpInputStream;
    type Writer = SftpOutputStream;

    fn uri(&self) -> &Url {
        &self.uri
    }

    async fn open(&self, path: &FsPath, buffer_size: usize) -> Result<SftpInputStream> {
        let connection = self.connect().await?;
        let prepared = DirectoryOps::new(&connection, &self.uri).open_reader(path).await;
        let reader = match prepared {
            Ok(reader) => reader,
            Err(err) => return self.finish(connection, Err(err)).await,
        };
        if !connection.is_channel_connected().await {
            let err = SftpFsError::ResourceState("client not connected".into());
            return self.finish(connection, Err(err)).await;
        }

        debug!(path = %path, "opened input stream");
        let buffer_size = if buffer_size == 0 { DEFAULT_BUFFER_SIZE } else { buffer_size };
        Ok(SftpInputStream::new(reader, buffer_size, connection, self.statistics.clone()))
    }

    async fn create(&self, path: &FsPath, options: &CreateOptions) -> Result<SftpOutputStream> {
        let connection = self.connect().await?;
        let prepared = DirectoryOps::new(&connection, &self.uri)
            .open_writer(path, options.overwrite)
            .await;
        let writer = match prepared {
            Ok(writer) => writer,
            Err(err) => return self.finish(connection, Err(err)).await,
        };

        debug!(
            path = %path,
            replication = options.replication,
            block_size = options.block_size,
            "opened output stream"
        );
        let buffer_size = if options.buffer_size == 0 {
            DEFAULT_BUFFER_SIZE
        } else {
            options.buffer_size
        };
        Ok(SftpOutputStream::new(
            writer,
            buffer_size,
            connection,
            self.statistics.clone(),
            options.progress.clone(),
        ))
    }

    async fn append(&self, _path: &FsPath, _buffer_size: usize) -> Result<SftpOutputStream> {
        Err(SftpFsError::Unsupported("append".into()))
    }

    async fn delete(&self, path: &FsPath, recursive: bool) -> Result<bool> {
        let connection = self.connect().await?;
        let result = DirectoryOps::new(&connection, &self.uri).delete(path, recursive).await;
        self.finish(connection, result).await
    }

    async fn list_status(&self, path: &FsPath) -> Result<Vec<FileStatus>> {
        let connection = self.connect().await?;
        let result = DirectoryOps::new(&connection, &self.uri).list_status(path).await;
        self.finish(connection, result).await
    }

    async fn file_status(&self, path: &FsPath) -> Result<FileStatus> {
        let connection = self.connect().await?;
        let result = DirectoryOps::new(&connection, &self.uri).file_status(path).await;
        self.finish(connection, result).await
    }

    /// The permission is accepted for compatibility; directories get the server's defaults.
    async fn mkdirs(&self, path: &FsPath, permission: FsPermission) -> Result<bool> {
        debug!(path = %path, %permission, "mkdirs");
        let connection = self.connect().await?;
        let result = DirectoryOps::new(&connection, &self.uri).mkdirs(path).await;
        self.finish(connection, result).await
    }

    async fn rename(&self, source: &FsPath, destination: &FsPath) -> Result<bool> {
        let connection = self.connect().await?;
        let result = DirectoryOps::new(&connection, &self.uri)
            .rename(source, destination)
            .await;
        self.finish(connection, result).await
    }

    async fn home_directory(&self) -> Result<FsPath> {
        let connection = self.connect().await?;
        let result = DirectoryOps::new(&connection, &self.uri)
            .working_directory()
            .await
            .map(|home| home.make_qualified(&self.uri));
        self.finish(connection, result).await
    }

    /// Always the home directory; no working directory survives between calls.
    async fn working_directory(&self) -> Result<FsPath> {
        self.home_directory().await
    }

    fn set_working_directory(&self, path: &FsPath) {
        debug!(path = %path, "ignoring working directory change");
    }
}
