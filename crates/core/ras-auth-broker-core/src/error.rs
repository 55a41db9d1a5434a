//! Error types for the authentication broker

use thiserror::Error;

/// Errors that can occur while brokering client authentication
#[derive(Error, Debug)]
pub enum BrokerError {
    /// A freshly generated correlation token collided with a live one
    #[error("Duplicate correlation token: {0}")]
    DuplicateCorrelationToken(crate::CorrelationToken),

    /// The provider client has not been connected
    #[error("Provider client is not connected")]
    ProviderNotConnected,

    /// The provider client is already connected
    #[error("Provider client is already connected")]
    ProviderAlreadyConnected,

    /// Failed to reach the identity provider
    #[error("Provider connection error: {0}")]
    ProviderConnection(String),

    /// The identity provider closed the connection
    #[error("Provider disconnected: {0}")]
    ProviderDisconnected(String),

    /// Failed to send a message
    #[error("Failed to send message: {0}")]
    SendError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BrokerError {
    /// Create a provider connection error
    pub fn provider_connection<E: std::fmt::Display>(error: E) -> Self {
        Self::ProviderConnection(error.to_string())
    }

    /// Create a send error
    pub fn send<E: std::fmt::Display>(error: E) -> Self {
        Self::SendError(error.to_string())
    }

    /// Create an internal error
    pub fn internal<E: std::fmt::Display>(error: E) -> Self {
        Self::Internal(error.to_string())
    }
}

/// Result type for broker operations
pub type BrokerResult<T> = std::result::Result<T, BrokerError>;
