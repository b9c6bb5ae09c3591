//! Session factories

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use mesh_core::config::Cluster;
use mesh_core::error::ConnectionError;
use mesh_core::traits::Transport;
use mesh_core::types::Host;

use crate::session::{Session, DEFAULT_GRACE};
use crate::ssh::SshTransport;

/// Opens sessions to the hosts of a cluster
#[async_trait]
pub trait Connector: Send + Sync {
    /// The transport behind the sessions this connector opens
    type Transport: Transport + 'static;

    /// Connect and authenticate to `host` using the cluster's credentials
    async fn connect(
        &self,
        cluster: &Cluster,
        host: &Host,
        cancel: &CancellationToken,
    ) -> Result<Session<Self::Transport>, ConnectionError>;
}

/// Production connector over SSH
#[derive(Debug, Clone)]
pub struct SshConnector {
    grace: Duration,
}

impl SshConnector {
    pub fn new() -> Self {
        Self {
            grace: DEFAULT_GRACE,
        }
    }

    /// Grace period given to signalled commands on every session
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for SshConnector {
    type Transport = SshTransport;

    async fn connect(
        &self,
        cluster: &Cluster,
        host: &Host,
        cancel: &CancellationToken,
    ) -> Result<Session<SshTransport>, ConnectionError> {
        let transport = SshTransport::connect(cluster, host, cancel).await?;
        Ok(Session::new(host.clone(), transport).with_grace(self.grace))
    }
}
