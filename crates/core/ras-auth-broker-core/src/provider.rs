//! Identity provider client seam

use crate::{BrokerError, BrokerResult, ProviderMessage, ProviderRequest};
use async_trait::async_trait;
use std::sync::Arc;

/// Receiver of everything the provider client delivers asynchronously
#[async_trait]
pub trait ProviderEventHandler: Send + Sync + 'static {
    /// Handle a notification from the identity provider
    async fn on_provider_message(&self, message: ProviderMessage);

    /// Handle a transport-level failure of the provider connection
    async fn on_provider_error(&self, error: BrokerError);
}

/// Client connection to the external identity-provider gateway
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Establish the connection to the gateway
    async fn connect(&self) -> BrokerResult<()>;

    /// Forward a delegated request to the gateway
    async fn send_request(&self, request: ProviderRequest) -> BrokerResult<()>;

    /// Start delivering gateway messages and errors to `handler` on a background task
    fn receive_async(&self, handler: Arc<dyn ProviderEventHandler>) -> BrokerResult<()>;

    /// Close the connection and stop background delivery
    async fn dispose(&self) -> BrokerResult<()>;
}
