//! russh-backed transport and channel

use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{self, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect, Sig};
use tokio_util::sync::CancellationToken;

use mesh_core::config::Cluster;
use mesh_core::error::{ChannelError, ConnectionError};
use mesh_core::traits::{ChannelEvent, RemoteChannel, Transport};
use mesh_core::types::{Host, Signal};

use super::handler::ClientHandler;

/// An authenticated SSH connection to one host
pub struct SshTransport {
    host: Host,
    handle: Handle<ClientHandler>,
}

impl SshTransport {
    /// Dial `host` and authenticate with the cluster's identity file.
    ///
    /// The dial and authentication together are bounded by the cluster's
    /// connect timeout and abandoned as soon as `cancel` fires.
    pub async fn connect(
        cluster: &Cluster,
        host: &Host,
        cancel: &CancellationToken,
    ) -> Result<Self, ConnectionError> {
        let key_path = cluster.identity_path();
        let pem = tokio::fs::read_to_string(&key_path)
            .await
            .map_err(|source| ConnectionError::KeyRead {
                path: key_path.clone(),
                source,
            })?;
        let key = russh_keys::decode_secret_key(&pem, None).map_err(|e| {
            ConnectionError::KeyParse {
                path: key_path.clone(),
                message: e.to_string(),
            }
        })?;
        let key = Arc::new(key);

        let config = Arc::new(client::Config::default());
        let dial = async {
            tracing::debug!("Connecting to {}@{}:{}", cluster.user, host, cluster.port);
            let mut handle = client::connect(
                config,
                (host.as_str(), cluster.port),
                ClientHandler::new(host.clone()),
            )
            .await
            .map_err(|e| ConnectionError::Dial {
                host: host.to_string(),
                message: e.to_string(),
            })?;

            let authenticated = handle
                .authenticate_publickey(&cluster.user, key)
                .await
                .map_err(|e| ConnectionError::Dial {
                    host: host.to_string(),
                    message: format!("authentication error: {}", e),
                })?;
            if !authenticated {
                return Err(ConnectionError::AuthRejected {
                    user: cluster.user.clone(),
                    host: host.to_string(),
                });
            }
            Ok(handle)
        };

        let handle = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConnectionError::Cancelled),
            result = tokio::time::timeout(cluster.connect_timeout, dial) => {
                result.map_err(|_| ConnectionError::Timeout {
                    host: host.to_string(),
                    after: cluster.connect_timeout,
                })??
            }
        };

        tracing::debug!("[{}] authenticated as {}", host, cluster.user);
        Ok(Self {
            host: host.clone(),
            handle,
        })
    }

    pub fn host(&self) -> &Host {
        &self.host
    }
}

#[async_trait]
impl Transport for SshTransport {
    type Channel = SshChannel;

    async fn open_channel(&self) -> Result<SshChannel, ChannelError> {
        let inner = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| ChannelError::Open(e.to_string()))?;
        Ok(SshChannel { inner })
    }

    async fn disconnect(&self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            tracing::debug!("[{}] disconnect: {}", self.host, e);
        }
    }
}

/// One SSH session channel
pub struct SshChannel {
    inner: Channel<Msg>,
}

fn request_error(e: russh::Error) -> ChannelError {
    ChannelError::Request(e.to_string())
}

fn to_sig(signal: Signal) -> Sig {
    match signal {
        Signal::Term => Sig::TERM,
        Signal::Int => Sig::INT,
        Signal::Kill => Sig::KILL,
    }
}

fn sig_name(sig: &Sig) -> String {
    match sig {
        Sig::Custom(name) => name.clone(),
        other => format!("{:?}", other),
    }
}

#[async_trait]
impl RemoteChannel for SshChannel {
    async fn exec(&mut self, command: &str) -> Result<(), ChannelError> {
        self.inner.exec(true, command).await.map_err(request_error)
    }

    async fn send_stdin(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        self.inner.data(data).await.map_err(request_error)
    }

    async fn send_eof(&mut self) -> Result<(), ChannelError> {
        self.inner.eof().await.map_err(request_error)
    }

    async fn signal(&mut self, signal: Signal) -> Result<(), ChannelError> {
        self.inner.signal(to_sig(signal)).await.map_err(request_error)
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        loop {
            let event = match self.inner.wait().await? {
                ChannelMsg::Data { data } => ChannelEvent::Stdout(bytes::Bytes::copy_from_slice(&data)),
                ChannelMsg::ExtendedData { data, ext } => {
                    if ext != 1 {
                        tracing::trace!("ignoring extended data stream {}", ext);
                        continue;
                    }
                    ChannelEvent::Stderr(bytes::Bytes::copy_from_slice(&data))
                }
                ChannelMsg::ExitStatus { exit_status } => ChannelEvent::ExitStatus(exit_status),
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    ChannelEvent::ExitSignal(sig_name(&signal_name))
                }
                ChannelMsg::Eof => ChannelEvent::Eof,
                ChannelMsg::Failure => ChannelEvent::Rejected,
                ChannelMsg::Close => return None,
                _ => continue,
            };
            return Some(event);
        }
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        self.inner.close().await.map_err(request_error)
    }
}
