//! Configuration file loading tests

use anyhow::Result;
use ras_auth_broker_server::Config;
use std::time::Duration;
use tempfile::TempDir;

fn write_config(dir: &TempDir, contents: &str) -> Result<std::path::PathBuf> {
    let path = dir.path().join("config.toml");
    std::fs::write(&path, contents)?;
    Ok(path)
}

#[test]
fn test_load_full_config_file() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_config(
        &dir,
        r#"
[server]
host = "0.0.0.0"
port = 8088

[provider]
url = "wss://gateway.example/ws"
connection_timeout_seconds = 3

[auth]
authentication_timeout_seconds = 45
debug_logging = true

[logging]
level = "warn"
format = "json"
"#,
    )?;

    let config = Config::load_from(&path)?;
    assert_eq!(config.socket_addr().to_string(), "0.0.0.0:8088");
    assert_eq!(config.provider_url()?.as_str(), "wss://gateway.example/ws");
    assert_eq!(config.connection_timeout(), Duration::from_secs(3));
    assert_eq!(config.authentication_timeout(), Duration::from_secs(45));
    assert!(config.auth.debug_logging);
    assert_eq!(config.logging.format, "json");
    assert_eq!(
        config.log_filter(),
        "ras_auth_broker=debug,ras_auth_broker_server=debug,warn"
    );
    Ok(())
}

#[test]
fn test_defaults_fill_optional_sections() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_config(
        &dir,
        r#"
[auth]
authentication_timeout_seconds = 30
"#,
    )?;

    let config = Config::load_from(&path)?;
    assert_eq!(config.server.port, 3000);
    assert_eq!(config.provider.url, "ws://127.0.0.1:4000/gateway");
    assert!(!config.auth.debug_logging);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, "pretty");
    Ok(())
}

#[test]
fn test_authentication_timeout_is_required() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_config(
        &dir,
        r#"
[server]
port = 3001
"#,
    )?;

    assert!(Config::load_from(&path).is_err());
    Ok(())
}

#[test]
fn test_invalid_values_are_rejected() -> Result<()> {
    let dir = TempDir::new()?;

    let path = write_config(
        &dir,
        r#"
[auth]
authentication_timeout_seconds = 0
"#,
    )?;
    assert!(Config::load_from(&path).is_err());

    let path = write_config(
        &dir,
        r#"
[provider]
url = "https://gateway.example"

[auth]
authentication_timeout_seconds = 30
"#,
    )?;
    assert!(Config::load_from(&path).is_err());

    let path = write_config(
        &dir,
        r#"
[auth]
authentication_timeout_seconds = 30

[logging]
format = "yaml"
"#,
    )?;
    assert!(Config::load_from(&path).is_err());
    Ok(())
}

#[test]
fn test_missing_file_without_auth_fails() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.toml");
    assert!(Config::load_from(missing).is_err());
}
