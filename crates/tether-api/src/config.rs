//! Configuration management for the Tether webhook ingress.

use std::{fmt, net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tether_core::TetherError;

use crate::{crypto::Webhook, identity::IdentityConfig};

const CONFIG_FILE: &str = "config.toml";

/// Log filter used when `rust_log` is unset or cannot be parsed.
pub const DEFAULT_LOG_FILTER: &str = "info,tether=debug,tower_http=debug";

/// Complete service configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables (highest priority)
/// 2. Configuration file (`config.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// The two secrets have no default and must be provided. They are never
/// serialized and are redacted from `Debug` output.
///
/// # Example
///
/// ```no_run
/// use tether_api::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
///
/// println!("Server will bind to {}:{}", config.host, config.port);
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    // Database
    /// PostgreSQL connection URL.
    ///
    /// Environment variable: `DATABASE_URL`
    #[serde(default = "default_database_url", alias = "DATABASE_URL")]
    pub database_url: String,
    /// Maximum number of database connections in the pool.
    ///
    /// Environment variable: `DATABASE_MAX_CONNECTIONS`
    #[serde(default = "default_max_connections", alias = "DATABASE_MAX_CONNECTIONS")]
    pub database_max_connections: u32,
    /// Minimum number of connections to maintain in the pool.
    ///
    /// Environment variable: `DATABASE_MIN_CONNECTIONS`
    #[serde(default = "default_min_connections", alias = "DATABASE_MIN_CONNECTIONS")]
    pub database_min_connections: u32,
    /// Database connection acquire timeout in seconds.
    ///
    /// Environment variable: `DATABASE_CONNECTION_TIMEOUT`
    #[serde(default = "default_acquire_timeout", alias = "DATABASE_CONNECTION_TIMEOUT")]
    pub database_connection_timeout: u64,
    /// Database connection idle timeout in seconds.
    ///
    /// Environment variable: `DATABASE_IDLE_TIMEOUT`
    #[serde(default = "default_idle_timeout", alias = "DATABASE_IDLE_TIMEOUT")]
    pub database_idle_timeout: u64,
    /// Maximum lifetime of database connections in seconds.
    ///
    /// Environment variable: `DATABASE_MAX_LIFETIME`
    #[serde(default = "default_max_lifetime", alias = "DATABASE_MAX_LIFETIME")]
    pub database_max_lifetime: u64,

    // Server
    /// Server bind address.
    ///
    /// Environment variable: `HOST`
    #[serde(default = "default_host", alias = "HOST")]
    pub host: String,
    /// Server bind port.
    ///
    /// Environment variable: `PORT`
    #[serde(default = "default_port", alias = "PORT")]
    pub port: u16,
    /// HTTP request timeout in seconds.
    ///
    /// Environment variable: `REQUEST_TIMEOUT`
    #[serde(default = "default_request_timeout", alias = "REQUEST_TIMEOUT")]
    pub request_timeout: u64,
    /// Largest accepted request body in bytes.
    ///
    /// Environment variable: `MAX_BODY_BYTES`
    #[serde(default = "default_max_body_bytes", alias = "MAX_BODY_BYTES")]
    pub max_body_bytes: usize,

    // Webhook
    /// Svix endpoint secret (`whsec_...`).
    ///
    /// Environment variable: `WEBHOOK_SECRET`
    #[serde(default, alias = "WEBHOOK_SECRET", skip_serializing)]
    pub webhook_secret: Option<String>,
    /// Accepted clock skew for webhook timestamps in seconds.
    ///
    /// Environment variable: `WEBHOOK_TOLERANCE_SECONDS`
    #[serde(default = "default_webhook_tolerance", alias = "WEBHOOK_TOLERANCE_SECONDS")]
    pub webhook_tolerance_seconds: u64,

    // Identity provider
    /// Backend API secret key (`sk_...`).
    ///
    /// Environment variable: `CLERK_SECRET_KEY`
    #[serde(default, alias = "CLERK_SECRET_KEY", skip_serializing)]
    pub clerk_secret_key: Option<String>,
    /// Backend API base URL.
    ///
    /// Environment variable: `CLERK_API_URL`
    #[serde(default = "default_clerk_api_url", alias = "CLERK_API_URL")]
    pub clerk_api_url: String,
    /// Backend API request timeout in seconds.
    ///
    /// Environment variable: `CLERK_TIMEOUT_SECONDS`
    #[serde(default = "default_clerk_timeout", alias = "CLERK_TIMEOUT_SECONDS")]
    pub clerk_timeout_seconds: u64,

    // Logging
    /// Log filter directives, read once at startup.
    ///
    /// Environment variable: `RUST_LOG`
    #[serde(default = "default_log_level", alias = "RUST_LOG")]
    pub rust_log: String,
}

impl Config {
    /// Load configuration from defaults, config file, and environment variable
    /// overrides.
    ///
    /// # Errors
    ///
    /// Fails if a source cannot be parsed or the result does not validate,
    /// including when either secret is absent.
    pub fn load() -> Result<Self> {
        Self::from_figment(
            Figment::new()
                .merge(Serialized::defaults(Self::default()))
                .merge(Toml::file(CONFIG_FILE))
                .merge(Env::prefixed("")),
        )
    }

    /// Extracts and validates configuration from an arbitrary figment.
    ///
    /// # Errors
    ///
    /// Fails if extraction or validation fails.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Builds the webhook verifier from the configured secret and tolerance.
    ///
    /// # Errors
    ///
    /// Returns `TetherError::Configuration` if the secret is absent or not a
    /// valid Svix secret.
    pub fn webhook(&self) -> std::result::Result<Webhook, TetherError> {
        let secret = required(self.webhook_secret.as_deref(), "WEBHOOK_SECRET")?;
        let webhook = Webhook::new(secret)
            .map_err(|e| TetherError::Configuration(format!("WEBHOOK_SECRET: {e}")))?;
        Ok(webhook.with_tolerance(Duration::from_secs(self.webhook_tolerance_seconds)))
    }

    /// Convert to the identity client's configuration.
    ///
    /// # Errors
    ///
    /// Returns `TetherError::Configuration` if the secret key is absent.
    pub fn to_identity_config(&self) -> std::result::Result<IdentityConfig, TetherError> {
        let secret_key = required(self.clerk_secret_key.as_deref(), "CLERK_SECRET_KEY")?;

        Ok(IdentityConfig {
            api_url: self.clerk_api_url.clone(),
            secret_key: SecretString::from(secret_key.to_string()),
            timeout: Duration::from_secs(self.clerk_timeout_seconds),
            user_agent: format!("Tether/{}", env!("CARGO_PKG_VERSION")),
        })
    }

    /// Request timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Parse server socket address from host and port configuration.
    ///
    /// # Errors
    ///
    /// Fails if host and port do not form a socket address.
    pub fn parse_server_addr(&self) -> Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.host, self.port);
        SocketAddr::from_str(&addr_str).context("Invalid server address")
    }

    /// Get database URL with password masked for logging.
    pub fn database_url_masked(&self) -> String {
        if let Some(at_pos) = self.database_url.find('@') {
            if let Some(colon_pos) = self.database_url[..at_pos].rfind(':') {
                let mut masked = self.database_url.clone();
                masked.replace_range(colon_pos + 1..at_pos, "***");
                return masked;
            }
        }
        self.database_url.clone()
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }

        if self.database_max_connections == 0 {
            anyhow::bail!("database max_connections must be greater than 0");
        }

        if self.database_min_connections > self.database_max_connections {
            anyhow::bail!("database min_connections cannot exceed max_connections");
        }

        if self.request_timeout == 0 {
            anyhow::bail!("request_timeout must be greater than 0");
        }

        if self.max_body_bytes == 0 {
            anyhow::bail!("max_body_bytes must be greater than 0");
        }

        self.webhook()?;
        self.to_identity_config()?;

        Ok(())
    }
}

fn required<'a>(value: Option<&'a str>, name: &str) -> std::result::Result<&'a str, TetherError> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| TetherError::Configuration(format!("{name} is not set")))
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |secret: &Option<String>| secret.as_ref().map(|_| "[REDACTED]");

        f.debug_struct("Config")
            .field("database_url", &self.database_url_masked())
            .field("database_max_connections", &self.database_max_connections)
            .field("database_min_connections", &self.database_min_connections)
            .field("database_connection_timeout", &self.database_connection_timeout)
            .field("database_idle_timeout", &self.database_idle_timeout)
            .field("database_max_lifetime", &self.database_max_lifetime)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("request_timeout", &self.request_timeout)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("webhook_secret", &redact(&self.webhook_secret))
            .field("webhook_tolerance_seconds", &self.webhook_tolerance_seconds)
            .field("clerk_secret_key", &redact(&self.clerk_secret_key))
            .field("clerk_api_url", &self.clerk_api_url)
            .field("clerk_timeout_seconds", &self.clerk_timeout_seconds)
            .field("rust_log", &self.rust_log)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            database_max_connections: default_max_connections(),
            database_min_connections: default_min_connections(),
            database_connection_timeout: default_acquire_timeout(),
            database_idle_timeout: default_idle_timeout(),
            database_max_lifetime: default_max_lifetime(),
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
            webhook_secret: None,
            webhook_tolerance_seconds: default_webhook_tolerance(),
            clerk_secret_key: None,
            clerk_api_url: default_clerk_api_url(),
            clerk_timeout_seconds: default_clerk_timeout(),
            rust_log: default_log_level(),
        }
    }
}

fn default_database_url() -> String {
    "postgresql://localhost/tether".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    10
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_max_lifetime() -> u64 {
    1800
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_webhook_tolerance() -> u64 {
    300
}

fn default_clerk_api_url() -> String {
    "https://api.clerk.com/v1".to_string()
}

fn default_clerk_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    DEFAULT_LOG_FILTER.to_string()
}
