//! Client messenger trait for delivering broker responses

use crate::{BrokerResult, ClientId, ClientResponse};
use async_trait::async_trait;

/// Trait for sending responses to connected clients
///
/// Implementations treat an unknown or disconnected client as a no-op; the
/// transport that owns the connection decides what a failed delivery means.
#[async_trait]
pub trait ClientMessenger: Send + Sync {
    /// Send a response to a specific client
    async fn send_to_client(&self, client_id: ClientId, response: ClientResponse)
    -> BrokerResult<()>;

    /// Check if a client is currently connected
    async fn is_connected(&self, client_id: ClientId) -> bool;
}
