//! russh client callbacks

use async_trait::async_trait;
use russh::client;
use russh_keys::key::PublicKey;

use mesh_core::types::Host;

/// Client handler for connections to cluster hosts
pub(crate) struct ClientHandler {
    host: Host,
}

impl ClientHandler {
    pub(crate) fn new(host: Host) -> Self {
        Self { host }
    }
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = anyhow::Error;

    /// Host keys are not verified; cluster hosts are trusted by address.
    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        tracing::debug!(
            "[{}] server host key: {}",
            self.host,
            server_public_key.fingerprint()
        );
        Ok(true)
    }
}
