//! Identity gateway client over WebSocket using tokio-tungstenite
//!
//! Delegated requests are written as JSON text frames; gateway notifications are
//! read on a background task and handed to the registered [`ProviderEventHandler`].
//! Read failures and connection loss are reported through
//! [`ProviderEventHandler::on_provider_error`].

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use ras_auth_broker_core::{
    BrokerError, BrokerResult, ProviderClient, ProviderEventHandler, ProviderMessage,
    ProviderRequest,
};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

type GatewayStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Provider client connected to a remote identity gateway
pub struct GatewayProviderClient {
    url: Url,
    connection_timeout: Duration,
    sink: Mutex<Option<SplitSink<GatewayStream, Message>>>,
    stream: std::sync::Mutex<Option<SplitStream<GatewayStream>>>,
    shutdown: CancellationToken,
}

impl GatewayProviderClient {
    pub fn new(url: Url, connection_timeout: Duration) -> Self {
        Self {
            url,
            connection_timeout,
            sink: Mutex::new(None),
            stream: std::sync::Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn is_connected(&self) -> bool {
        self.sink.lock().await.is_some()
    }
}

#[async_trait]
impl ProviderClient for GatewayProviderClient {
    async fn connect(&self) -> BrokerResult<()> {
        let mut sink = self.sink.lock().await;
        if sink.is_some() {
            return Err(BrokerError::ProviderAlreadyConnected);
        }

        info!("Connecting to identity gateway: {}", self.url);
        let (ws_stream, response) =
            tokio::time::timeout(self.connection_timeout, connect_async(self.url.as_str()))
                .await
                .map_err(|_| {
                    BrokerError::ProviderConnection(format!(
                        "Timed out after {}s",
                        self.connection_timeout.as_secs()
                    ))
                })?
                .map_err(BrokerError::provider_connection)?;
        debug!(
            "Gateway connection established, status: {}",
            response.status()
        );

        let (write, read) = ws_stream.split();
        *sink = Some(write);
        *self.stream.lock().unwrap_or_else(PoisonError::into_inner) = Some(read);

        info!("Connected to identity gateway");
        Ok(())
    }

    async fn send_request(&self, request: ProviderRequest) -> BrokerResult<()> {
        let json = serde_json::to_string(&request)?;
        debug!("Sending gateway request: {}", json);

        let mut sink = self.sink.lock().await;
        let sink = sink.as_mut().ok_or(BrokerError::ProviderNotConnected)?;
        sink.send(Message::Text(json.into()))
            .await
            .map_err(|e| BrokerError::ProviderDisconnected(e.to_string()))
    }

    fn receive_async(&self, handler: Arc<dyn ProviderEventHandler>) -> BrokerResult<()> {
        let mut stream = self
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(BrokerError::ProviderNotConnected)?;
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Gateway receive loop stopped");
                        break;
                    }
                    frame = stream.next() => frame,
                };

                let decoded = match frame {
                    Some(Ok(Message::Text(text))) => serde_json::from_str::<ProviderMessage>(&text),
                    Some(Ok(Message::Binary(data))) => {
                        serde_json::from_slice::<ProviderMessage>(&data)
                    }
                    Some(Ok(Message::Close(close_frame))) => {
                        info!("Gateway sent close frame: {:?}", close_frame);
                        handler
                            .on_provider_error(BrokerError::ProviderDisconnected(
                                "gateway closed the connection".to_string(),
                            ))
                            .await;
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("Gateway connection error: {}", e);
                        handler
                            .on_provider_error(BrokerError::ProviderDisconnected(e.to_string()))
                            .await;
                        break;
                    }
                    None => {
                        handler
                            .on_provider_error(BrokerError::ProviderDisconnected(
                                "gateway stream ended".to_string(),
                            ))
                            .await;
                        break;
                    }
                };

                match decoded {
                    Ok(message) => handler.on_provider_message(message).await,
                    Err(e) => {
                        warn!("Undecodable gateway message: {}", e);
                        handler.on_provider_error(BrokerError::Serialization(e)).await;
                    }
                }
            }
        });

        Ok(())
    }

    async fn dispose(&self) -> BrokerResult<()> {
        self.shutdown.cancel();
        if let Some(mut sink) = self.sink.lock().await.take() {
            if let Err(e) = sink.close().await {
                warn!("Error closing gateway connection: {}", e);
            }
        }
        info!("Gateway provider client disposed");
        Ok(())
    }
}

impl Drop for GatewayProviderClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ras_auth_broker_core::{AttemptMetadata, ClientId, CorrelationToken};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_send_before_connect_fails() {
        let url = Url::parse("ws://127.0.0.1:9/gateway").unwrap();
        let client = GatewayProviderClient::new(url, Duration::from_secs(1));
        let request = ProviderRequest::Authenticate {
            metadata: AttemptMetadata {
                client_id: ClientId::new(),
                correlation_token: CorrelationToken::new(),
            },
        };

        assert!(matches!(
            client.send_request(request).await,
            Err(BrokerError::ProviderNotConnected)
        ));
        assert!(!client.is_connected().await);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Reserve a port, then free it so nothing is listening
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("ws://{addr}/gateway")).unwrap();
        let client = GatewayProviderClient::new(url, Duration::from_secs(5));
        assert!(matches!(
            client.connect().await,
            Err(BrokerError::ProviderConnection(_))
        ));
    }
}
