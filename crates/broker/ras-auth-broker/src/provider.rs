//! In-process provider client backed by tokio channels
//!
//! `ChannelProviderClient` is the broker-side half; `ProviderEndpoint` is the
//! gateway-side half that receives delegated requests and answers them. Dropping
//! the endpoint looks like a lost gateway connection to the broker.

use async_trait::async_trait;
use ras_auth_broker_core::{
    BrokerError, BrokerResult, ProviderClient, ProviderEventHandler, ProviderMessage,
    ProviderRequest,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Provider client that talks to a [`ProviderEndpoint`] over channels
#[derive(Debug)]
pub struct ChannelProviderClient {
    requests: mpsc::UnboundedSender<ProviderRequest>,
    messages: Mutex<Option<mpsc::UnboundedReceiver<ProviderMessage>>>,
    connected: AtomicBool,
    shutdown: CancellationToken,
}

/// Gateway side of a [`ChannelProviderClient`]
#[derive(Debug)]
pub struct ProviderEndpoint {
    requests: mpsc::UnboundedReceiver<ProviderRequest>,
    messages: mpsc::UnboundedSender<ProviderMessage>,
}

impl ChannelProviderClient {
    /// Create a connected pair of provider client and gateway endpoint
    pub fn pair() -> (Self, ProviderEndpoint) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (message_tx, message_rx) = mpsc::unbounded_channel();

        let client = Self {
            requests: request_tx,
            messages: Mutex::new(Some(message_rx)),
            connected: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        };
        let endpoint = ProviderEndpoint {
            requests: request_rx,
            messages: message_tx,
        };
        (client, endpoint)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderClient for ChannelProviderClient {
    async fn connect(&self) -> BrokerResult<()> {
        if self.connected.swap(true, Ordering::SeqCst) {
            return Err(BrokerError::ProviderAlreadyConnected);
        }
        info!("Channel provider client connected");
        Ok(())
    }

    async fn send_request(&self, request: ProviderRequest) -> BrokerResult<()> {
        if !self.is_connected() {
            return Err(BrokerError::ProviderNotConnected);
        }
        self.requests
            .send(request)
            .map_err(|_| BrokerError::ProviderDisconnected("gateway endpoint closed".to_string()))
    }

    fn receive_async(&self, handler: Arc<dyn ProviderEventHandler>) -> BrokerResult<()> {
        let mut messages = self
            .messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| BrokerError::internal("provider messages are already being received"))?;
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Channel provider receive loop stopped");
                        break;
                    }
                    message = messages.recv() => match message {
                        Some(message) => handler.on_provider_message(message).await,
                        None => {
                            warn!("Gateway endpoint closed");
                            handler
                                .on_provider_error(BrokerError::ProviderDisconnected(
                                    "gateway endpoint closed".to_string(),
                                ))
                                .await;
                            break;
                        }
                    }
                }
            }
        });

        Ok(())
    }

    async fn dispose(&self) -> BrokerResult<()> {
        self.shutdown.cancel();
        self.connected.store(false, Ordering::SeqCst);
        info!("Channel provider client disposed");
        Ok(())
    }
}

impl Drop for ChannelProviderClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl ProviderEndpoint {
    /// Wait for the next delegated request from the broker
    pub async fn next_request(&mut self) -> Option<ProviderRequest> {
        self.requests.recv().await
    }

    /// Non-blocking variant of [`ProviderEndpoint::next_request`]
    pub fn try_next_request(&mut self) -> Option<ProviderRequest> {
        self.requests.try_recv().ok()
    }

    /// Deliver a notification to the broker; returns false once the broker stopped listening
    pub fn send(&self, message: ProviderMessage) -> bool {
        self.messages.send(message).is_ok()
    }
}
