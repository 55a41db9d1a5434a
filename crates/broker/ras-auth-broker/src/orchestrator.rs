//! Authentication orchestrator
//!
//! Accepts client authentication requests, forwards them to the identity provider,
//! and turns the provider's asynchronous notifications (or the lack of them) into
//! exactly one terminal response per attempt.
//!
//! Three contexts race on the same attempt: the provider callback, the timeout
//! task and, for navigation prompts, the client request that created it. The
//! provider-result, provider-error and timeout paths all resolve through
//! [`CorrelationStore::claim`]; the caller that receives the attempt sends the
//! terminal response and every other caller drops its notification.

use crate::correlation::{CorrelationError, CorrelationStore};
use crate::registry::AuthenticatedClientRegistry;
use crate::timeout::TimeoutScheduler;
use async_trait::async_trait;
use bon::Builder;
use ras_auth_broker_core::{
    AttemptMetadata, AuthenticationOutcome, BrokerError, BrokerResult, BrokerState, ClientId,
    ClientMessenger, ClientRequest, ClientResponse, CorrelationToken, Credential, ProviderClient,
    ProviderEventHandler, ProviderMessage, ProviderRequest,
};
use std::sync::{Arc, OnceLock, PoisonError, RwLock, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Per-orchestrator settings
#[derive(Debug, Clone, Builder)]
pub struct OrchestratorConfig {
    /// How long the provider round trip may take before the client gets a timeout
    pub authentication_timeout: Duration,

    /// Log full provider payloads and routing decisions; never changes control flow
    #[builder(default)]
    pub debug_logging: bool,
}

impl OrchestratorConfig {
    pub fn new(authentication_timeout: Duration) -> Self {
        Self {
            authentication_timeout,
            debug_logging: false,
        }
    }
}

struct OrchestratorInner {
    config: OrchestratorConfig,
    state: RwLock<BrokerState>,
    attempts: CorrelationStore,
    registry: AuthenticatedClientRegistry,
    timeouts: TimeoutScheduler,
    provider: Arc<dyn ProviderClient>,
    clients: Arc<dyn ClientMessenger>,
    first_provider_error: OnceLock<String>,
}

/// Brokers client authentication through an identity provider
///
/// Cloning is cheap; clones share the same attempts, credentials and timers.
#[derive(Clone)]
pub struct AuthenticationOrchestrator {
    inner: Arc<OrchestratorInner>,
}

impl AuthenticationOrchestrator {
    /// Connect the provider client and start receiving its notifications
    pub async fn start(
        config: OrchestratorConfig,
        provider: Arc<dyn ProviderClient>,
        clients: Arc<dyn ClientMessenger>,
    ) -> BrokerResult<Self> {
        let inner = Arc::new(OrchestratorInner {
            config,
            state: RwLock::new(BrokerState::Active),
            attempts: CorrelationStore::new(),
            registry: AuthenticatedClientRegistry::new(),
            timeouts: TimeoutScheduler::new(),
            provider,
            clients,
            first_provider_error: OnceLock::new(),
        });

        inner.provider.connect().await?;
        inner
            .provider
            .receive_async(Arc::new(ProviderEvents(Arc::downgrade(&inner))))?;

        info!(
            "Authentication orchestrator started (timeout: {:?})",
            inner.config.authentication_timeout
        );
        Ok(Self { inner })
    }

    /// Apply a client request as a transition of the broker state machine
    pub async fn handle_client_request(
        &self,
        client_id: ClientId,
        request: ClientRequest,
    ) -> BrokerResult<()> {
        let state = self.state();
        match (state, &request) {
            (BrokerState::Active, ClientRequest::AuthenticateClient) => {
                self.inner.authenticate_client(client_id).await
            }
            (state, request) => {
                warn!(
                    "No transition for {} from client {} while {}",
                    request.kind(),
                    client_id,
                    state
                );
                self.inner
                    .send(
                        client_id,
                        ClientResponse::UnexpectedBrokerRequest {
                            state,
                            request: request.clone(),
                        },
                    )
                    .await;
                Ok(())
            }
        }
    }

    pub fn state(&self) -> BrokerState {
        *self
            .inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_state(&self, state: BrokerState) {
        let mut current = self
            .inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if *current != state {
            info!("Broker state changed: {} -> {}", *current, state);
            *current = state;
        }
    }

    pub fn is_authenticated(&self, client_id: &ClientId) -> bool {
        self.inner.registry.is_authenticated(client_id)
    }

    pub fn credential(&self, client_id: &ClientId) -> Option<Credential> {
        self.inner.registry.credential(client_id)
    }

    /// Number of attempts still waiting for a terminal resolution
    pub fn pending_attempts(&self) -> usize {
        self.inner.attempts.len()
    }

    /// Whether `correlation_token` still names a live attempt
    pub fn is_pending(&self, correlation_token: &CorrelationToken) -> bool {
        self.inner.attempts.contains(correlation_token)
    }

    /// First provider failure seen since start, for diagnostics
    pub fn first_provider_error(&self) -> Option<String> {
        self.inner.first_provider_error.get().cloned()
    }

    /// Cancel all timers and dispose the provider client
    pub async fn dispose(&self) -> BrokerResult<()> {
        let abandoned = self.inner.attempts.len();
        if abandoned > 0 {
            warn!("Disposing orchestrator with {} unresolved attempts", abandoned);
        }
        self.inner.timeouts.shutdown().await;
        self.inner.provider.dispose().await?;
        info!("Authentication orchestrator disposed");
        Ok(())
    }
}

impl OrchestratorInner {
    async fn authenticate_client(self: &Arc<Self>, client_id: ClientId) -> BrokerResult<()> {
        if self.registry.is_authenticated(&client_id) {
            debug!("Client {} is already authenticated", client_id);
            self.send(client_id, ClientResponse::ClientAlreadyAuthenticatedError)
                .await;
            return Ok(());
        }

        let correlation_token = CorrelationToken::new();
        match self.attempts.register(correlation_token, client_id) {
            Ok(()) => {}
            Err(CorrelationError::ClientAttemptInProgress {
                correlation_token: active,
                ..
            }) => {
                debug!(
                    "Client {} already has attempt {} in progress",
                    client_id, active
                );
                self.send(client_id, ClientResponse::AuthenticationInProgressError)
                    .await;
                return Ok(());
            }
            Err(CorrelationError::DuplicateToken(token)) => {
                error!("Generated correlation token {} is already registered", token);
                return Err(BrokerError::DuplicateCorrelationToken(token));
            }
        }

        // Armed before the provider send so a stalled provider still ends in a timeout
        let inner = Arc::clone(self);
        self.timeouts.schedule(
            correlation_token,
            self.config.authentication_timeout,
            move |token| async move { inner.expire(token).await },
        );

        let metadata = AttemptMetadata {
            client_id,
            correlation_token,
        };
        if self.config.debug_logging {
            debug!("Forwarding authentication request: {:?}", metadata);
        }
        let forwarded = tokio::time::timeout(
            self.config.authentication_timeout,
            self.provider
                .send_request(ProviderRequest::Authenticate { metadata }),
        )
        .await
        .unwrap_or_else(|_| {
            Err(BrokerError::ProviderDisconnected(
                "provider did not accept the request in time".to_string(),
            ))
        });
        if let Err(e) = forwarded {
            // The attempt stays registered and resolves through its timer
            error!(
                "Failed to forward attempt {} to provider: {}",
                correlation_token, e
            );
            self.record_provider_error(&e);
        }

        info!(
            "Started authentication attempt {} for client {}",
            correlation_token, client_id
        );
        Ok(())
    }

    async fn expire(&self, correlation_token: CorrelationToken) {
        match self.attempts.claim(&correlation_token) {
            Some(attempt) => {
                info!(
                    "Attempt {} for client {} timed out after {:?}",
                    correlation_token,
                    attempt.client_id,
                    attempt.created_at.elapsed()
                );
                self.send(attempt.client_id, ClientResponse::AuthenticationTimeoutError)
                    .await;
            }
            None => debug!("Attempt {} resolved before its timer fired", correlation_token),
        }
    }

    async fn forward_navigation(&self, metadata: AttemptMetadata, url: String) {
        let Some(attempt) = self.attempts.get(&metadata.correlation_token) else {
            debug!(
                "Dropping navigation prompt for resolved attempt {}",
                metadata.correlation_token
            );
            return;
        };
        check_metadata(&metadata, attempt.client_id);
        self.send(attempt.client_id, ClientResponse::UrlNavigationNeeded { url })
            .await;
    }

    async fn resolve(&self, metadata: AttemptMetadata, outcome: AuthenticationOutcome) {
        let Some(attempt) = self.attempts.claim(&metadata.correlation_token) else {
            debug!(
                "Dropping late authentication result for attempt {}",
                metadata.correlation_token
            );
            return;
        };
        check_metadata(&metadata, attempt.client_id);
        let client_id = attempt.client_id;

        debug!(
            "Attempt {} resolved by provider (granted: {})",
            metadata.correlation_token,
            outcome.is_granted()
        );
        let response = match outcome {
            // A credential granted to an earlier attempt is never replaced
            AuthenticationOutcome::Granted { credential } => {
                if self.registry.try_set_if_absent(client_id, credential) {
                    info!("Client {} authenticated", client_id);
                    ClientResponse::AuthenticateClient { success: true }
                } else {
                    ClientResponse::ClientAlreadyAuthenticatedError
                }
            }
            AuthenticationOutcome::Denied if self.registry.is_authenticated(&client_id) => {
                ClientResponse::ClientAlreadyAuthenticatedError
            }
            AuthenticationOutcome::Denied => {
                info!("Provider denied authentication for client {}", client_id);
                ClientResponse::AuthenticateClient { success: false }
            }
        };
        self.send(client_id, response).await;
    }

    async fn reject_unexpected_request(
        &self,
        metadata: AttemptMetadata,
        state: String,
        request_kind: String,
    ) {
        let message =
            format!("Unexpected authentication request {request_kind} while in state {state}");
        let Some(attempt) = self.attempts.claim(&metadata.correlation_token) else {
            debug!(
                "Dropping provider error for resolved attempt {}: {}",
                metadata.correlation_token, message
            );
            return;
        };
        check_metadata(&metadata, attempt.client_id);
        warn!("Attempt {} failed: {}", metadata.correlation_token, message);
        self.send(
            attempt.client_id,
            ClientResponse::ClientAuthenticationManagerError { message },
        )
        .await;
    }

    async fn send(&self, client_id: ClientId, response: ClientResponse) {
        if self.config.debug_logging && !self.clients.is_connected(client_id).await {
            debug!("Client {} is gone; {:?} will be dropped", client_id, response);
        }
        if let Err(e) = self.clients.send_to_client(client_id, response).await {
            warn!("Failed to deliver response to client {}: {}", client_id, e);
        }
    }

    fn record_provider_error(&self, error: &BrokerError) {
        if self.first_provider_error.set(error.to_string()).is_err() {
            debug!("Provider error already recorded; ignoring: {}", error);
        }
    }
}

fn check_metadata(metadata: &AttemptMetadata, client_id: ClientId) {
    if metadata.client_id != client_id {
        warn!(
            "Provider reported client {} for attempt {} owned by client {}",
            metadata.client_id, metadata.correlation_token, client_id
        );
    }
}

/// Provider callbacks that do not keep the orchestrator alive
struct ProviderEvents(Weak<OrchestratorInner>);

#[async_trait]
impl ProviderEventHandler for ProviderEvents {
    async fn on_provider_message(&self, message: ProviderMessage) {
        match self.0.upgrade() {
            Some(inner) => inner.on_provider_message(message).await,
            None => debug!("Orchestrator dropped; ignoring provider message"),
        }
    }

    async fn on_provider_error(&self, error: BrokerError) {
        match self.0.upgrade() {
            Some(inner) => inner.on_provider_error(error).await,
            None => debug!("Orchestrator dropped; ignoring provider error: {}", error),
        }
    }
}

#[async_trait]
impl ProviderEventHandler for OrchestratorInner {
    async fn on_provider_message(&self, message: ProviderMessage) {
        let correlation_token = message.metadata().map(|m| m.correlation_token);
        if self.config.debug_logging {
            debug!(
                "Provider message for attempt {:?}: {:?}",
                correlation_token, message
            );
        }

        match message {
            ProviderMessage::NavigationNeeded { metadata, url } => {
                self.forward_navigation(metadata, url).await
            }
            ProviderMessage::AuthenticationResult { metadata, outcome } => {
                self.resolve(metadata, outcome).await
            }
            ProviderMessage::UnexpectedRequest {
                metadata,
                state,
                request_kind,
            } => {
                self.reject_unexpected_request(metadata, state, request_kind)
                    .await
            }
            ProviderMessage::UnexpectedProtocolResponse {
                state,
                response_kind,
                ..
            } => {
                warn!(
                    "Received provider protocol response unexpectedly as {} while in state {} (attempt: {:?})",
                    response_kind, state, correlation_token
                );
            }
        }
    }

    async fn on_provider_error(&self, error: BrokerError) {
        error!("Provider client error: {}", error);
        self.record_provider_error(&error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ClientConnectionManager;
    use crate::provider::{ChannelProviderClient, ProviderEndpoint};
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Started {
        orchestrator: AuthenticationOrchestrator,
        client: ClientId,
        responses: UnboundedReceiver<ClientResponse>,
        metadata: AttemptMetadata,
        _endpoint: ProviderEndpoint,
    }

    /// Start an orchestrator with one forwarded, unresolved attempt
    async fn start_with_attempt() -> Started {
        let (provider, mut endpoint) = ChannelProviderClient::pair();
        let clients = Arc::new(ClientConnectionManager::new());
        let orchestrator = AuthenticationOrchestrator::start(
            OrchestratorConfig::new(Duration::from_secs(30)),
            Arc::new(provider),
            clients.clone(),
        )
        .await
        .unwrap();

        let client = ClientId::new();
        let responses = clients.add_connection(client);
        orchestrator
            .handle_client_request(client, ClientRequest::AuthenticateClient)
            .await
            .unwrap();
        let Some(ProviderRequest::Authenticate { metadata }) = endpoint.next_request().await else {
            panic!("Provider endpoint closed");
        };

        Started {
            orchestrator,
            client,
            responses,
            metadata,
            _endpoint: endpoint,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_grant_after_credential_keeps_first_credential() {
        let mut started = start_with_attempt().await;
        let inner = &started.orchestrator.inner;

        // An earlier attempt for the same client won between the registry check and registration
        assert!(
            inner
                .registry
                .try_set_if_absent(started.client, Credential::new("subject-first"))
        );

        inner
            .on_provider_message(ProviderMessage::AuthenticationResult {
                metadata: started.metadata,
                outcome: AuthenticationOutcome::Granted {
                    credential: Credential::new("subject-second"),
                },
            })
            .await;

        assert_eq!(
            started.responses.recv().await,
            Some(ClientResponse::ClientAlreadyAuthenticatedError)
        );
        assert_eq!(
            started.orchestrator.credential(&started.client),
            Some(Credential::new("subject-first"))
        );
        assert_eq!(started.orchestrator.pending_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_denial_after_credential_reports_already_authenticated() {
        let mut started = start_with_attempt().await;
        let inner = &started.orchestrator.inner;
        assert!(
            inner
                .registry
                .try_set_if_absent(started.client, Credential::new("subject-first"))
        );

        inner
            .on_provider_message(ProviderMessage::AuthenticationResult {
                metadata: started.metadata,
                outcome: AuthenticationOutcome::Denied,
            })
            .await;

        assert_eq!(
            started.responses.recv().await,
            Some(ClientResponse::ClientAlreadyAuthenticatedError)
        );
        assert!(started.orchestrator.is_authenticated(&started.client));
    }

    #[test]
    fn test_config_builder() {
        let config = OrchestratorConfig::builder()
            .authentication_timeout(Duration::from_secs(10))
            .build();
        assert_eq!(config.authentication_timeout, Duration::from_secs(10));
        assert!(!config.debug_logging);

        let config = OrchestratorConfig::builder()
            .authentication_timeout(Duration::from_secs(5))
            .debug_logging(true)
            .build();
        assert!(config.debug_logging);
    }
}
