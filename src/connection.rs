use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::{
    config::SftpEndpoint,
    error::{RemoteError, Result, SftpFsError},
    transport::{RemoteSession, SftpChannel, SftpTransport},
};

/// One authenticated session plus the SFTP channel opened on it.
///
/// A handle is owned by exactly one in-flight operation and must be torn down with
/// [`ConnectionHandle::disconnect`]. Dropping a live handle only logs a warning.
pub struct ConnectionHandle {
    host: String,
    session: Box<dyn RemoteSession>,
    channel: Box<dyn SftpChannel>,
    torn_down: bool,
}

impl ConnectionHandle {
    pub(crate) fn new(
        host: String,
        session: Box<dyn RemoteSession>,
        channel: Box<dyn SftpChannel>,
    ) -> Self {
        ConnectionHandle {
            host,
            session,
            channel,
            torn_down: false,
        }
    }

    pub fn channel(&self) -> &dyn SftpChannel {
        self.channel.as_ref()
    }

    pub async fn is_channel_connected(&self) -> bool {
        self.channel.is_connected().await
    }

    /// Disconnects the channel, then the session.
    pub async fn disconnect(mut self) -> Result<()> {
        self.torn_down = true;
        if !self.session.is_connected().await {
            return Err(SftpFsError::ResourceState(format!(
                "client for {} not connected",
                self.host
            )));
        }

        let channel_result = self.channel.disconnect().await;
        let session_result = self.session.disconnect().await;
        info!(host = %self.host, "disconnected sftp session");

        channel_result
            .and(session_result)
            .map_err(|err| {
                SftpFsError::protocol(format!("failed to disconnect from {}", self.host), err)
            })
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if !self.torn_down {
            warn!(host = %self.host, "sftp connection dropped without disconnect");
        }
    }
}

/// The single place sessions are established.
#[derive(Clone)]
pub struct Connector {
    transport: Arc<dyn SftpTransport>,
}

impl Connector {
    pub fn new(transport: Arc<dyn SftpTransport>) -> Connector {
        Connector { transport }
    }

    /// Opens a session and exactly one SFTP channel on it. Failures are surfaced
    /// immediately; there is no retry.
    pub async fn connect(&self, endpoint: &SftpEndpoint) -> Result<ConnectionHandle> {
        debug!(
            host = %endpoint.host,
            port = endpoint.port,
            user = %endpoint.username,
            "connecting"
        );

        let timeout = endpoint.connect_timeout;
        let session = match tokio::time::timeout(timeout, self.transport.connect(endpoint)).await {
            Ok(Ok(session)) => session,
            Ok(Err(err)) => return Err(connect_failure(endpoint, err)),
            Err(_) => {
                let err = RemoteError::Timeout(timeout.as_millis() as u64);
                return Err(connect_failure(endpoint, err));
            }
        };

        let channel = match session.open_sftp().await {
            Ok(channel) => channel,
            Err(err) => {
                if let Err(disconnect_err) = session.disconnect().await {
                    warn!(
                        host = %endpoint.host,
                        "failed to release session after channel error: {disconnect_err}"
                    );
                }
                return Err(connect_failure(endpoint, err));
            }
        };

        info!(host = %endpoint.host, port = endpoint.port, "connected sftp session");
        Ok(ConnectionHandle::new(endpoint.host.clone(), session, channel))
    }
}

fn connect_failure(endpoint: &SftpEndpoint, err: RemoteError) -> SftpFsError {
    error!(host = %endpoint.host, port = endpoint.port, "sftp connection failed: {err}");
    SftpFsError::Connect {
        host: endpoint.host.clone(),
        port: endpoint.port,
        reason: err.to_string(),
    }
}
