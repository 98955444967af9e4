//! Gateway Configuration Module
//!
//! Loads bind address, base directory, CORS, and environment mode from
//! `GATEWAY_*` environment variables with development-friendly defaults.
//! Secrets (the peppers) are NOT part of this struct; they load through
//! their own validated types at boot.

use std::path::PathBuf;
use std::time::Duration;

/// Deployment environment, from `ENV` (or legacy `NODE_ENV`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "test" => Environment::Test,
            _ => Environment::Development,
        }
    }
}

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind host (`GATEWAY_HOST`, default `0.0.0.0`)
    pub host: String,

    /// Bind port (`GATEWAY_PORT`, default `8080`)
    pub port: u16,

    /// Root of the tenant/config/backup directory tree (`GATEWAY_BASE_DIR`)
    pub base_dir: PathBuf,

    /// Allowed CORS origins (`GATEWAY_CORS_ORIGINS`, comma-separated;
    /// empty = allow all, dev mode)
    pub cors_origins: Vec<String>,

    /// Log filter (`GATEWAY_LOG_LEVEL`, default `info`)
    pub log_level: String,

    /// Legacy plaintext global-admin token (`GATEWAY_ADMIN_TOKEN`)
    pub admin_token: Option<String>,

    /// Deployment environment
    pub environment: Environment,

    /// Fixed rate-limit window
    pub rate_limit_window: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            base_dir: PathBuf::from("./data"),
            cors_origins: Vec::new(),
            log_level: "info".to_string(),
            admin_token: None,
            environment: Environment::default(),
            rate_limit_window: Duration::from_millis(60_000),
        }
    }
}

impl ApiConfig {
    /// Create configuration from environment variables.
    ///
    /// Environment variables:
    /// - `GATEWAY_HOST`: bind host (default: 0.0.0.0)
    /// - `GATEWAY_PORT`: bind port (default: 8080)
    /// - `GATEWAY_BASE_DIR`: data root (default: ./data)
    /// - `GATEWAY_CORS_ORIGINS`: comma-separated origins (empty = allow all)
    /// - `GATEWAY_LOG_LEVEL`: tracing filter (default: info)
    /// - `GATEWAY_ADMIN_TOKEN`: legacy global-admin token
    /// - `ENV` / `NODE_ENV`: development | test | production
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cors_origins = std::env::var("GATEWAY_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let environment = std::env::var("ENV")
            .or_else(|_| std::env::var("NODE_ENV"))
            .map(|s| Environment::parse(&s))
            .unwrap_or_default();

        Self {
            host: std::env::var("GATEWAY_HOST").unwrap_or(defaults.host),
            port: std::env::var("GATEWAY_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            base_dir: std::env::var("GATEWAY_BASE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.base_dir),
            cors_origins,
            log_level: std::env::var("GATEWAY_LOG_LEVEL").unwrap_or(defaults.log_level),
            admin_token: std::env::var("GATEWAY_ADMIN_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
            environment,
            rate_limit_window: defaults.rate_limit_window,
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Directory holding backup snapshots.
    pub fn backups_dir(&self) -> PathBuf {
        self.base_dir.join("backups")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.environment, Environment::Development);
        assert!(config.cors_origins.is_empty());
        assert_eq!(config.rate_limit_window, Duration::from_millis(60_000));
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!(Environment::parse("production"), Environment::Production);
        assert_eq!(Environment::parse("PROD"), Environment::Production);
        assert_eq!(Environment::parse("test"), Environment::Test);
        assert_eq!(Environment::parse("dev"), Environment::Development);
        assert_eq!(Environment::parse("anything"), Environment::Development);
    }

    #[test]
    fn test_backups_dir() {
        let config = ApiConfig {
            base_dir: PathBuf::from("/var/lib/libervia"),
            ..ApiConfig::default()
        };
        assert_eq!(
            config.backups_dir(),
            PathBuf::from("/var/lib/libervia/backups")
        );
    }
}
