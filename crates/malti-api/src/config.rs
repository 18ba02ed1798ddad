//! Configuration management for the API server.
//!
//! Supports loading configuration from environment variables with fallback
//! to defaults.

use std::path::PathBuf;

/// Runtime settings for the HTTP server and its backing stores.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub credentials_path: PathBuf,
    pub workers: usize,
}

/// Load [`ServerConfig`] from environment variables.
///
/// Environment variables:
/// - `MALTI_HOST`: bind address (default: 127.0.0.1)
/// - `MALTI_PORT`: bind port (default: 8080)
/// - `MALTI_DB_PATH`: SQLite database file (default: malti.db)
/// - `MALTI_CONFIG_PATH`: credential TOML file (default: malti.toml)
/// - `MALTI_WORKERS`: HTTP worker count (default: 4)
pub fn load_server_config() -> ServerConfig {
    ServerConfig {
        host: std::env::var("MALTI_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
        port: std::env::var("MALTI_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080),
        db_path: std::env::var("MALTI_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("malti.db")),
        credentials_path: std::env::var("MALTI_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("malti.toml")),
        workers: std::env::var("MALTI_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(4),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_has_sensible_defaults() {
        let config = load_server_config();
        assert!(!config.host.is_empty());
        assert!(config.port > 0);
        assert!(config.workers > 0);
        assert!(config.db_path.as_os_str().len() > 0);
        assert!(config.credentials_path.as_os_str().len() > 0);
    }
}
