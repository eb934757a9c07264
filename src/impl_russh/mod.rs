mod channel;

use std::sync::Arc;

use async_trait::async_trait;
use russh::{
    client::{self, Config},
    Disconnect,
};
use russh_keys::key::PublicKey;
use russh_sftp::client::SftpSession;
use tokio::sync::Mutex;
use tracing::debug;

pub use channel::RusshSftpChannel;

use crate::{
    config::SftpEndpoint,
    error::{RemoteError, RemoteResult},
    transport::{RemoteSession, SftpChannel, SftpTransport},
};

/// [`SftpTransport`] backed by `russh` and `russh-sftp`, authenticating with a password.
#[derive(Clone)]
pub struct RusshTransport {
    config: Arc<Config>,
}

impl RusshTransport {
    pub fn new() -> RusshTransport {
        RusshTransport::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> RusshTransport {
        RusshTransport {
            config: Arc::new(config),
        }
    }
}

impl Default for RusshTransport {
    fn default() -> Self {
        RusshTransport::new()
    }
}

#[async_trait]
impl SftpTransport for RusshTransport {
    async fn connect(&self, endpoint: &SftpEndpoint) -> RemoteResult<Box<dyn RemoteSession>> {
        let handler = TrustingHandler {
            host: endpoint.host.clone(),
        };
        let address = (endpoint.host.as_str(), endpoint.port);
        let mut handle = client::connect(self.config.clone(), address, handler)
            .await
            .map_err(|err| RemoteError::ConnectionLost(err.to_string()))?;

        let authenticated = handle
            .authenticate_password(endpoint.username.clone(), endpoint.password.clone())
            .await
            .map_err(|err| RemoteError::Failure(format!("authentication error: {err}")))?;
        if !authenticated {
            if let Err(err) = handle.disconnect(Disconnect::ByApplication, "", "English").await {
                debug!("failed to close rejected session: {err}");
            }
            return Err(RemoteError::AuthenticationRejected(endpoint.username.clone()));
        }

        Ok(Box::new(RusshSession {
            handle: Arc::new(Mutex::new(handle)),
        }))
    }
}

/// An authenticated `russh` session.
pub struct RusshSession {
    handle: Arc<Mutex<client::Handle<TrustingHandler>>>,
}

#[async_trait]
impl RemoteSession for RusshSession {
    async fn is_connected(&self) -> bool {
        !self.handle.lock().await.is_closed()
    }

    async fn open_sftp(&self) -> RemoteResult<Box<dyn SftpChannel>> {
        let sftp_channel = self
            .handle
            .lock()
            .await
            .channel_open_session()
            .await
            .map_err(|err| RemoteError::Failure(format!("cannot open channel: {err}")))?;
        sftp_channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|err| RemoteError::Failure(format!("cannot request sftp subsystem: {err}")))?;
        let sftp_session = SftpSession::new(sftp_channel.into_stream())
            .await
            .map_err(channel::map_sftp_error)?;

        let channel = RusshSftpChannel::new(sftp_session, self.handle.clone()).await?;
        Ok(Box::new(channel))
    }

    async fn disconnect(&self) -> RemoteResult<()> {
        self.handle
            .lock()
            .await
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
            .map_err(|err| RemoteError::ConnectionLost(err.to_string()))
    }
}

/// Accepts every server key. Host identity is not verified.
#[derive(Debug)]
pub struct TrustingHandler {
    host: String,
}

#[async_trait]
impl client::Handler for TrustingHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(
            host = %self.host,
            key = %server_public_key.fingerprint(),
            "accepting server key without verification"
        );
        Ok(true)
    }
}
