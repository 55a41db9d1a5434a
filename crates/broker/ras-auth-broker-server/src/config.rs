//! Configuration module for the authentication broker server
//!
//! Settings are layered from:
//! - Configuration file (`config.toml`, or the path in `AUTH_BROKER_CONFIG_FILE`)
//! - Environment variables (`AUTH_BROKER__SECTION__KEY`)
//! - Default values
//!
//! Environment variables take precedence over config file values. The
//! authentication timeout has no default and must be configured.

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File};
use ras_auth_broker::OrchestratorConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const VALID_FORMATS: [&str; 3] = ["pretty", "json", "compact"];

/// Main configuration struct for the broker server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Client-facing listener
    #[serde(default)]
    pub server: ServerConfig,

    /// Identity gateway connection
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Authentication attempt settings
    pub auth: AuthConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to (default: 127.0.0.1)
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to bind to (default: 3000)
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Identity gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// WebSocket URL of the identity gateway
    #[serde(default = "default_provider_url")]
    pub url: String,

    /// Seconds to wait for the gateway handshake (default: 10)
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Seconds a client waits for the provider before getting a timeout error
    pub authentication_timeout_seconds: u64,

    /// Verbose routing and payload logging
    #[serde(default)]
    pub debug_logging: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    3000
}

fn default_provider_url() -> String {
    "ws://127.0.0.1:4000/gateway".to_string()
}

fn default_connection_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            url: default_provider_url(),
            connection_timeout_seconds: default_connection_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from environment and the optional config file
    pub fn load() -> Result<Self> {
        let config_path =
            std::env::var("AUTH_BROKER_CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from(config_path)
    }

    /// Load configuration using `config_path` as the file layer
    pub fn load_from(config_path: impl AsRef<Path>) -> Result<Self> {
        let config_path = config_path.as_ref();
        let mut builder = ConfigBuilder::builder();

        if config_path.exists() {
            info!("Loading configuration from {}", config_path.display());
            builder = builder.add_source(File::from(config_path));
        } else {
            debug!(
                "No config file found at {}, using defaults",
                config_path.display()
            );
        }

        // e.g. AUTH_BROKER__AUTH__AUTHENTICATION_TIMEOUT_SECONDS=30
        builder = builder.add_source(
            Environment::with_prefix("AUTH_BROKER")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let settings: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.auth.authentication_timeout_seconds == 0 {
            anyhow::bail!("Authentication timeout must be greater than 0");
        }

        if self.provider.connection_timeout_seconds == 0 {
            anyhow::bail!("Provider connection timeout must be greater than 0");
        }

        self.provider_url()?;

        let level_lower = self.logging.level.to_lowercase();
        if !self.has_filter_directive() && !VALID_LEVELS.contains(&level_lower.as_str()) {
            anyhow::bail!(
                "Invalid log level '{}'. Must be one of: {:?}",
                self.logging.level,
                VALID_LEVELS
            );
        }

        let format_lower = self.logging.format.to_lowercase();
        if !VALID_FORMATS.contains(&format_lower.as_str()) {
            anyhow::bail!(
                "Invalid log format '{}'. Must be one of: {:?}",
                self.logging.format,
                VALID_FORMATS
            );
        }

        Ok(())
    }

    /// Get the socket address for the server
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.server.host, self.server.port))
    }

    /// Parsed identity gateway URL; only `ws` and `wss` are accepted
    pub fn provider_url(&self) -> Result<Url> {
        let url = Url::parse(&self.provider.url)
            .with_context(|| format!("Invalid provider URL '{}'", self.provider.url))?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            scheme => anyhow::bail!(
                "Provider URL '{}' must use ws or wss, not {}",
                self.provider.url,
                scheme
            ),
        }
    }

    pub fn authentication_timeout(&self) -> Duration {
        Duration::from_secs(self.auth.authentication_timeout_seconds)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.connection_timeout_seconds)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig::builder()
            .authentication_timeout(self.authentication_timeout())
            .debug_logging(self.auth.debug_logging)
            .build()
    }

    /// Get the log filter string for tracing
    pub fn log_filter(&self) -> String {
        if self.has_filter_directive() {
            return self.logging.level.clone();
        }

        let broker_level = if self.auth.debug_logging {
            "debug"
        } else {
            self.logging.level.as_str()
        };
        format!(
            "ras_auth_broker={},ras_auth_broker_server={},{}",
            broker_level, broker_level, self.logging.level
        )
    }

    fn has_filter_directive(&self) -> bool {
        self.logging.level.contains('=') || self.logging.level.contains(',')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            server: ServerConfig::default(),
            provider: ProviderConfig::default(),
            auth: AuthConfig {
                authentication_timeout_seconds: 30,
                debug_logging: false,
            },
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_default_config() {
        let config = config();
        assert!(config.validate().is_ok());
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:3000");
        assert_eq!(config.authentication_timeout(), Duration::from_secs(30));
        assert_eq!(config.connection_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_config() {
        let mut config = config();
        config.server.port = 0;
        assert!(config.validate().is_err());

        config.server.port = 3000;
        config.auth.authentication_timeout_seconds = 0;
        assert!(config.validate().is_err());

        config.auth.authentication_timeout_seconds = 30;
        config.provider.url = "http://127.0.0.1:4000".to_string();
        assert!(config.validate().is_err());

        config.provider.url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.provider.url = default_provider_url();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());

        config.logging.format = "json".to_string();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_filter() {
        let mut config = config();
        assert_eq!(
            config.log_filter(),
            "ras_auth_broker=info,ras_auth_broker_server=info,info"
        );

        config.auth.debug_logging = true;
        assert_eq!(
            config.log_filter(),
            "ras_auth_broker=debug,ras_auth_broker_server=debug,info"
        );

        config.logging.level = "warn,ras_auth_broker=trace".to_string();
        assert!(config.validate().is_ok());
        assert_eq!(config.log_filter(), "warn,ras_auth_broker=trace");
    }

    #[test]
    fn test_orchestrator_config() {
        let mut config = config();
        config.auth.debug_logging = true;
        let orchestrator = config.orchestrator_config();
        assert_eq!(orchestrator.authentication_timeout, Duration::from_secs(30));
        assert!(orchestrator.debug_logging);
    }
}
