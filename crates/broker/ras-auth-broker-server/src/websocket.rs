//! Client-facing WebSocket surface
//!
//! Every socket gets a fresh [`ClientId`] and a response channel in the
//! [`ClientConnectionManager`]. Text frames are decoded as [`ClientRequest`]s and
//! applied to the orchestrator; responses queued on the channel are written back
//! as JSON text frames.

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use ras_auth_broker::{
    AuthenticationOrchestrator, ClientConnectionManager, ClientId, ClientRequest, ClientResponse,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Shared state for the client-facing routes
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: AuthenticationOrchestrator,
    pub clients: Arc<ClientConnectionManager>,
}

impl AppState {
    pub fn new(
        orchestrator: AuthenticationOrchestrator,
        clients: Arc<ClientConnectionManager>,
    ) -> Self {
        Self {
            orchestrator,
            clients,
        }
    }
}

/// Build the `/ws` and `/health` routes
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
}

async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let client_id = ClientId::new();
    let mut responses = state.clients.add_connection(client_id);
    info!("Client connected: {}", client_id);

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_text(&state, client_id, text.as_str()).await;
                    }
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => handle_text(&state, client_id, text).await,
                        Err(_) => warn!("Received non-UTF-8 binary message from {}, ignoring", client_id),
                    },
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = socket.send(Message::Pong(data)).await {
                            error!("Failed to answer ping from {}: {}", client_id, e);
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => debug!("Received pong from {}", client_id),
                    Some(Ok(Message::Close(close_frame))) => {
                        debug!("Received close frame from {}: {:?}", client_id, close_frame);
                        break;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error for {}: {}", client_id, e);
                        break;
                    }
                    None => {
                        debug!("WebSocket connection closed by client {}", client_id);
                        break;
                    }
                }
            }

            response = responses.recv() => {
                let Some(response) = response else {
                    debug!("Response channel closed for {}", client_id);
                    break;
                };
                if let Err(e) = send_response(&mut socket, &response).await {
                    error!("Error sending response to {}: {}", client_id, e);
                    break;
                }
            }
        }
    }

    state.clients.remove_connection(client_id);
    info!("Client disconnected: {}", client_id);
}

async fn handle_text(state: &AppState, client_id: ClientId, text: &str) {
    let request = match serde_json::from_str::<ClientRequest>(text) {
        Ok(request) => request,
        Err(e) => {
            warn!("Could not parse request from {}: {} ({})", client_id, e, text);
            return;
        }
    };

    if let Err(e) = state
        .orchestrator
        .handle_client_request(client_id, request)
        .await
    {
        error!("Failed to handle request from {}: {}", client_id, e);
    }
}

async fn send_response(socket: &mut WebSocket, response: &ClientResponse) -> anyhow::Result<()> {
    let json = serde_json::to_string(response)?;
    debug!("Sending response: {}", json);
    socket.send(Message::Text(json.into())).await?;
    Ok(())
}
