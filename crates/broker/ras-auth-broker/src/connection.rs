//! Client connection tracking and channel-based response delivery

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ras_auth_broker_core::{BrokerError, BrokerResult, ClientId, ClientMessenger, ClientResponse};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A simple channel-based response sender
#[derive(Debug, Clone)]
pub struct ChannelClientSender {
    client_id: ClientId,
    sender: mpsc::UnboundedSender<ClientResponse>,
}

impl ChannelClientSender {
    pub fn new(client_id: ClientId, sender: mpsc::UnboundedSender<ClientResponse>) -> Self {
        Self { client_id, sender }
    }

    /// Send a response through the channel
    pub fn send(&self, response: ClientResponse) -> BrokerResult<()> {
        self.sender.send(response).map_err(BrokerError::send)
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }
}

#[derive(Debug)]
struct ClientConnection {
    sender: ChannelClientSender,
    connected_at: DateTime<Utc>,
}

/// Thread-safe registry of connected clients using DashMap
///
/// Every connection owns an unbounded channel; the transport drains the
/// receiving half and writes to the socket.
#[derive(Debug, Default)]
pub struct ClientConnectionManager {
    connections: DashMap<ClientId, ClientConnection>,
}

impl ClientConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a client and return the receiving half of its response channel
    pub fn add_connection(&self, client_id: ClientId) -> mpsc::UnboundedReceiver<ClientResponse> {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = ClientConnection {
            sender: ChannelClientSender::new(client_id, tx),
            connected_at: Utc::now(),
        };
        if self.connections.insert(client_id, connection).is_some() {
            warn!("Replaced existing connection for client: {}", client_id);
        }
        info!("Added client connection: {}", client_id);
        rx
    }

    pub fn remove_connection(&self, client_id: ClientId) {
        if let Some((_, connection)) = self.connections.remove(&client_id) {
            let duration = Utc::now() - connection.connected_at;
            info!(
                "Removed client connection: {} (connected for {}s)",
                client_id,
                duration.num_seconds()
            );
        } else {
            warn!("Attempted to remove non-existent connection: {}", client_id);
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn get_client_ids(&self) -> Vec<ClientId> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }
}

#[async_trait]
impl ClientMessenger for ClientConnectionManager {
    async fn send_to_client(
        &self,
        client_id: ClientId,
        response: ClientResponse,
    ) -> BrokerResult<()> {
        // Clone the sender so no map guard is held while sending
        let sender = self
            .connections
            .get(&client_id)
            .map(|entry| entry.sender.clone());

        match sender {
            Some(sender) => {
                debug!("Sending {:?} to client {}", response, sender.client_id());
                sender.send(response)
            }
            None => {
                warn!("Attempted to send to non-existent client: {}", client_id);
                Ok(())
            }
        }
    }

    async fn is_connected(&self, client_id: ClientId) -> bool {
        self.connections.contains_key(&client_id)
    }
}
