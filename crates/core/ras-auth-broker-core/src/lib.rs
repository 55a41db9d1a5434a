//! Core types for brokering client authentication through an external identity gateway
//!
//! This crate provides the identifiers, the client/provider message vocabulary and the
//! transport seams (`ProviderClient`, `ClientMessenger`) shared by the broker and the
//! server that hosts it.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub mod error;
pub mod messenger;
pub mod provider;

pub use error::{BrokerError, BrokerResult};
pub use messenger::ClientMessenger;
pub use provider::{ProviderClient, ProviderEventHandler};

/// Unique identifier for a connected client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Create a new random client ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a client ID from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier tying one authentication request to its provider round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationToken(Uuid);

impl CorrelationToken {
    /// Generate a fresh, globally unique token
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CorrelationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authentication identifier granted to a client by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// States of the broker structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerState {
    /// Accepting authentication requests
    Active,
    /// Reserved; no client request has a legal transition in this state
    UnderMaintenance,
}

impl fmt::Display for BrokerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerState::Active => write!(f, "active"),
            BrokerState::UnderMaintenance => write!(f, "under_maintenance"),
        }
    }
}

/// Messages sent by clients to the broker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Start an authentication attempt for the sending client
    AuthenticateClient,
}

impl ClientRequest {
    /// Wire name of the request kind
    pub fn kind(&self) -> &'static str {
        match self {
            ClientRequest::AuthenticateClient => "authenticate_client",
        }
    }
}

/// Messages sent by the broker to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientResponse {
    /// Terminal success or failure decided by the provider
    AuthenticateClient { success: bool },
    /// The end user must visit `url` before the provider can decide
    UrlNavigationNeeded { url: String },
    /// The provider did not answer within the configured duration
    AuthenticationTimeoutError,
    /// The client already holds a credential
    ClientAlreadyAuthenticatedError,
    /// The client already has an unresolved attempt
    AuthenticationInProgressError,
    /// The provider reported a protocol violation for this attempt
    ClientAuthenticationManagerError { message: String },
    /// The request has no legal transition in the broker's current state
    UnexpectedBrokerRequest {
        state: BrokerState,
        request: ClientRequest,
    },
}

impl ClientResponse {
    /// Whether this response ends the attempt from the client's perspective
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ClientResponse::UrlNavigationNeeded { .. })
    }
}

/// Correlation payload carried opaquely through the provider round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptMetadata {
    pub client_id: ClientId,
    pub correlation_token: CorrelationToken,
}

/// Requests sent by the broker to the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderRequest {
    /// Delegated authentication request for one attempt
    Authenticate { metadata: AttemptMetadata },
}

/// Terminal decision reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AuthenticationOutcome {
    Granted { credential: Credential },
    Denied,
}

impl AuthenticationOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, AuthenticationOutcome::Granted { .. })
    }
}

/// Notifications delivered by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderMessage {
    /// The end user must visit a URL; intermediate, not terminal
    NavigationNeeded {
        metadata: AttemptMetadata,
        url: String,
    },
    /// Terminal provider decision for an attempt
    AuthenticationResult {
        metadata: AttemptMetadata,
        outcome: AuthenticationOutcome,
    },
    /// The provider rejected a request it did not expect in its current state
    UnexpectedRequest {
        metadata: AttemptMetadata,
        state: String,
        request_kind: String,
    },
    /// The provider saw a sub-protocol response the broker never initiated
    UnexpectedProtocolResponse {
        metadata: Option<AttemptMetadata>,
        state: String,
        response_kind: String,
    },
}

impl ProviderMessage {
    /// Metadata of the attempt this message refers to, if any
    pub fn metadata(&self) -> Option<&AttemptMetadata> {
        match self {
            ProviderMessage::NavigationNeeded { metadata, .. }
            | ProviderMessage::AuthenticationResult { metadata, .. }
            | ProviderMessage::UnexpectedRequest { metadata, .. } => Some(metadata),
            ProviderMessage::UnexpectedProtocolResponse { metadata, .. } => metadata.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers_are_unique() {
        assert_ne!(ClientId::new(), ClientId::new());
        assert_ne!(CorrelationToken::new(), CorrelationToken::new());

        let uuid = Uuid::new_v4();
        assert_eq!(CorrelationToken::from_uuid(uuid).as_uuid(), &uuid);
        assert_eq!(ClientId::from_uuid(uuid).to_string(), uuid.to_string());
    }

    #[test]
    fn test_terminal_responses() {
        assert!(!ClientResponse::UrlNavigationNeeded {
            url: "https://idp.example/login".to_string()
        }
        .is_terminal());
        assert!(ClientResponse::AuthenticateClient { success: false }.is_terminal());
        assert!(ClientResponse::AuthenticationTimeoutError.is_terminal());
        assert!(ClientResponse::ClientAlreadyAuthenticatedError.is_terminal());
    }

    #[test]
    fn test_client_message_wire_format() {
        let request: ClientRequest =
            serde_json::from_str(r#"{"type":"authenticate_client"}"#).unwrap();
        assert_eq!(request, ClientRequest::AuthenticateClient);

        let json = serde_json::to_value(ClientResponse::AuthenticateClient { success: true })
            .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "authenticate_client", "success": true})
        );

        let json = serde_json::to_value(ClientResponse::UnexpectedBrokerRequest {
            state: BrokerState::UnderMaintenance,
            request: ClientRequest::AuthenticateClient,
        })
        .unwrap();
        assert_eq!(json["state"], "under_maintenance");
        assert_eq!(json["request"]["type"], "authenticate_client");
    }

    #[test]
    fn test_provider_message_carries_metadata_back() {
        let metadata = AttemptMetadata {
            client_id: ClientId::new(),
            correlation_token: CorrelationToken::new(),
        };
        let message = ProviderMessage::AuthenticationResult {
            metadata,
            outcome: AuthenticationOutcome::Granted {
                credential: Credential::new("subject-42"),
            },
        };

        let json = serde_json::to_string(&message).unwrap();
        let decoded: ProviderMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.metadata(), Some(&metadata));

        let stray = ProviderMessage::UnexpectedProtocolResponse {
            metadata: None,
            state: "idle".to_string(),
            response_kind: "token_response".to_string(),
        };
        assert!(stray.metadata().is_none());
    }
}
