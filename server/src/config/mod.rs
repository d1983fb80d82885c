//! Process configuration, read once from the environment in `main` and passed down
//! as `Arc<Config>`.

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

use crate::models::EventDetails;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";
const DEFAULT_PAYSTACK_BASE_URL: &str = "https://api.paystack.co";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// Gateway secret key. Payments fail with an upstream error while unset.
    pub secret_key: Option<SecretString>,
    pub base_url: String,
    pub callback_url: Option<String>,
    pub currency: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub host: IpAddr,
    pub port: u16,
    pub is_production: bool,
    pub allowed_origins: Vec<String>,
    pub payment: PaymentConfig,
    pub event: EventDetails,
    pub admin_session_ttl: chrono::Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = required("DATABASE_URL")?;

        let is_production = optional("RUST_ENV")
            .map(|v| v.to_lowercase() == "production")
            .unwrap_or(false);

        let allowed_origins = optional("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(String::from)
            .collect();

        let payment = PaymentConfig {
            secret_key: optional("PAYSTACK_SECRET_KEY").map(SecretString::from),
            base_url: optional("PAYSTACK_BASE_URL")
                .unwrap_or_else(|| DEFAULT_PAYSTACK_BASE_URL.to_string()),
            callback_url: optional("PAYSTACK_CALLBACK_URL"),
            currency: optional("PAYMENT_CURRENCY").unwrap_or_else(|| "NGN".to_string()),
            timeout: Duration::from_secs(parsed("PAYMENT_TIMEOUT_SECS", 15)?),
        };

        let event = EventDetails {
            name: optional("EVENT_NAME").unwrap_or_else(|| "Annual Tech Conference".to_string()),
            date: optional("EVENT_DATE").unwrap_or_else(|| "TBA".to_string()),
            venue: optional("EVENT_VENUE").unwrap_or_else(|| "TBA".to_string()),
        };

        Ok(Self {
            database_url,
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS", 5)?,
            host: parsed("HOST", IpAddr::from([0, 0, 0, 0]))?,
            port: parsed("PORT", 3001)?,
            is_production,
            allowed_origins,
            payment,
            event,
            admin_session_ttl: chrono::Duration::hours(parsed("ADMIN_SESSION_TTL_HOURS", 12)?),
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn required(key: &str) -> Result<String, ConfigError> {
    optional(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn parsed<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}

#[cfg(test)]
impl Config {
    /// Configuration for unit tests. No database or gateway is contacted.
    pub fn for_tests() -> Self {
        Self {
            database_url: "postgres://localhost/ticketing_test".to_string(),
            database_max_connections: 1,
            host: IpAddr::from([127, 0, 0, 1]),
            port: 0,
            is_production: false,
            allowed_origins: vec!["http://localhost:3000".to_string()],
            payment: PaymentConfig {
                secret_key: Some(SecretString::from("sk_test_secret".to_string())),
                base_url: DEFAULT_PAYSTACK_BASE_URL.to_string(),
                callback_url: None,
                currency: "NGN".to_string(),
                timeout: Duration::from_secs(5),
            },
            event: EventDetails {
                name: "Tech Summit".to_string(),
                date: "2026-11-20".to_string(),
                venue: "Main Hall".to_string(),
            },
            admin_session_ttl: chrono::Duration::hours(12),
        }
    }
}
