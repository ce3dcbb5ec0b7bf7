use std::sync::Arc;

use tracing::info;
use vfuse_proto::MessageRegistry;
use vfuse_transport::{Endpoint, Listener};

use crate::client::{Client, ClientConfig};
use crate::error::Result;

/// The initiator's listening socket. Responders dial in; each accepted
/// connection becomes a [`Client`].
pub struct PeerListener {
    listener: Listener,
    registry: Arc<MessageRegistry>,
    config: ClientConfig,
}

impl PeerListener {
    /// Bind to `endpoint`.
    pub fn bind(endpoint: &Endpoint, registry: Arc<MessageRegistry>) -> Result<Self> {
        Ok(Self {
            listener: Listener::bind(endpoint)?,
            registry,
            config: ClientConfig::default(),
        })
    }

    /// Override the configuration given to accepted clients.
    pub fn with_client_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Accept the next responder (blocking).
    pub fn accept(&self) -> Result<Client> {
        let stream = self.listener.accept()?;
        info!(
            peer = %stream.peer_label(),
            transport = stream.transport_name(),
            "responder connected"
        );
        Client::new(stream, Arc::clone(&self.registry), self.config.clone())
    }

    /// The endpoint actually bound.
    pub fn local_endpoint(&self) -> Endpoint {
        self.listener.local_endpoint()
    }
}
