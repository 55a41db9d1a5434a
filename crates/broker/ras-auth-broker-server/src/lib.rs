//! Authentication broker server
//!
//! Wires the broker to its two transports: an axum WebSocket endpoint for
//! clients and a tokio-tungstenite connection to the identity gateway.

pub mod config;
pub mod gateway;
pub mod telemetry;
pub mod websocket;

pub use config::Config;
pub use gateway::GatewayProviderClient;
pub use websocket::{AppState, router};
