use std::io;

use thiserror::Error;

/// Failures reported by a transport implementation for a single remote primitive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("no such file: {0}")]
    NoSuchFile(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("authentication rejected for user {0}")]
    AuthenticationRejected(String),

    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("{0}")]
    Failure(String),
}

impl RemoteError {
    pub fn is_no_such_file(&self) -> bool {
        matches!(self, RemoteError::NoSuchFile(_))
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors surfaced by the file system adapter.
#[derive(Debug, Error)]
pub enum SftpFsError {
    /// The transport refused the session or authentication failed
    #[error("server {host} refused connection on port {port}: {reason}")]
    Connect { host: String, port: u16, reason: String },

    #[error("file {path} does not exist")]
    NotFound { path: String },

    /// The target exists where it must not, or has the wrong kind
    #[error("{path}: {reason}")]
    Conflict { path: String, reason: String },

    #[error("{context}: {source}")]
    Protocol {
        context: String,
        #[source]
        source: RemoteError,
    },

    #[error("{0} is not supported")]
    Unsupported(String),

    /// Closed stream or a session that is no longer connected
    #[error("{0}")]
    ResourceState(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid uri: {0}")]
    Url(#[from] url::ParseError),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl SftpFsError {
    pub(crate) fn not_found(path: impl ToString) -> Self {
        SftpFsError::NotFound { path: path.to_string() }
    }

    pub(crate) fn conflict(path: impl ToString, reason: impl Into<String>) -> Self {
        SftpFsError::Conflict {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn protocol(context: impl Into<String>, source: RemoteError) -> Self {
        SftpFsError::Protocol {
            context: context.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SftpFsError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, SftpFsError::Conflict { .. })
    }
}

impl From<SftpFsError> for io::Error {
    fn from(value: SftpFsError) -> Self {
        let kind = match &value {
            SftpFsError::NotFound { .. } => io::ErrorKind::NotFound,
            SftpFsError::Conflict { .. } => io::ErrorKind::AlreadyExists,
            SftpFsError::Unsupported(_) => io::ErrorKind::Unsupported,
            SftpFsError::Connect { .. } => io::ErrorKind::ConnectionRefused,
            SftpFsError::Io { source, .. } => source.kind(),
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, value)
    }
}

pub type Result<T, E = SftpFsError> = std::result::Result<T, E>;
