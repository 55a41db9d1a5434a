//! Client authentication broker
//!
//! This crate correlates client authentication requests with a delegated round trip
//! through an external identity gateway. It tracks in-flight attempts, enforces one
//! active attempt per client, and guarantees every attempt ends in exactly one
//! terminal response: the provider's decision, a provider-reported error, or a timeout.

pub mod connection;
pub mod correlation;
pub mod orchestrator;
pub mod provider;
pub mod registry;
pub mod timeout;

pub use connection::{ChannelClientSender, ClientConnectionManager};
pub use correlation::{AuthenticationAttempt, CorrelationError, CorrelationStore};
pub use orchestrator::{AuthenticationOrchestrator, OrchestratorConfig};
pub use provider::{ChannelProviderClient, ProviderEndpoint};
pub use registry::AuthenticatedClientRegistry;
pub use timeout::TimeoutScheduler;

// Re-export core types for convenience
pub use ras_auth_broker_core::{
    AttemptMetadata, AuthenticationOutcome, BrokerError, BrokerResult, BrokerState, ClientId,
    ClientMessenger, ClientRequest, ClientResponse, CorrelationToken, Credential, ProviderClient,
    ProviderEventHandler, ProviderMessage, ProviderRequest,
};
