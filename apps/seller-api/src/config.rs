//! Application configuration loaded from environment variables.
//!
//! Fail-fast loading with validation: required variables must be present
//! and valid or the process exits with a clear message. Insecure
//! development defaults are allowed (with a warning) in development and
//! refused outright in production mode.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::env;
use thiserror::Error;

/// Default vault key: base64-encoded 32 zero bytes. Development only.
pub const INSECURE_VAULT_KEY: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

/// Application environment mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Production,
}

impl AppEnvironment {
    /// Parse from the `APP_ENV` value; unknown values fall back to
    /// development with a warning.
    #[must_use]
    pub fn from_env_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => {
                tracing::warn!(
                    value = other,
                    "Unrecognized APP_ENV value, defaulting to development"
                );
                Self::Development
            }
        }
    }

    /// True in production mode.
    #[must_use]
    pub fn is_production(&self) -> bool {
        *self == Self::Production
    }
}

impl std::fmt::Display for AppEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {detail}")]
    Invalid {
        name: &'static str,
        detail: String,
    },

    #[error("insecure default for {0} refused in production")]
    InsecureInProduction(&'static str),
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_env: AppEnvironment,
    pub host: String,
    pub port: u16,
    pub rust_log: String,
    pub database_url: String,
    pub database_max_connections: u32,

    /// 32-byte vault key for token encryption at rest.
    pub vault_key: Vec<u8>,

    pub marketplace_client_id: String,
    pub marketplace_client_secret: String,
    pub marketplace_auth_url: String,
    pub marketplace_token_url: String,
    pub marketplace_api_url: String,
    pub redirect_uri: String,

    /// AI answer pipeline endpoint.
    pub pipeline_url: String,

    /// Shared secret for inbound webhook signature verification. Unsigned
    /// webhooks are accepted when unset.
    pub webhook_secret: Option<String>,
}

impl Config {
    /// Load and validate configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let app_env = AppEnvironment::from_env_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = parse_var("PORT", 8080)?;
        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let database_url = required("DATABASE_URL")?;
        let database_max_connections = parse_var("DATABASE_MAX_CONNECTIONS", 10)?;

        let vault_key_b64 = env::var("VAULT_KEY").unwrap_or_else(|_| INSECURE_VAULT_KEY.to_string());
        if vault_key_b64 == INSECURE_VAULT_KEY {
            if app_env.is_production() {
                return Err(ConfigError::InsecureInProduction("VAULT_KEY"));
            }
            tracing::warn!("Using insecure default VAULT_KEY; set a real key before production");
        }
        let vault_key = BASE64
            .decode(&vault_key_b64)
            .map_err(|e| ConfigError::Invalid {
                name: "VAULT_KEY",
                detail: format!("not valid base64: {e}"),
            })?;
        if vault_key.len() != 32 {
            return Err(ConfigError::Invalid {
                name: "VAULT_KEY",
                detail: format!("expected 32 bytes after decode, got {}", vault_key.len()),
            });
        }

        let config = Self {
            app_env,
            host,
            port,
            rust_log,
            database_url,
            database_max_connections,
            vault_key,
            marketplace_client_id: required("MARKETPLACE_CLIENT_ID")?,
            marketplace_client_secret: required("MARKETPLACE_CLIENT_SECRET")?,
            marketplace_auth_url: env::var("MARKETPLACE_AUTH_URL")
                .unwrap_or_else(|_| "https://auth.mercadolibre.com/authorization".to_string()),
            marketplace_token_url: env::var("MARKETPLACE_TOKEN_URL")
                .unwrap_or_else(|_| "https://api.mercadolibre.com/oauth/token".to_string()),
            marketplace_api_url: env::var("MARKETPLACE_API_URL")
                .unwrap_or_else(|_| "https://api.mercadolibre.com".to_string()),
            redirect_uri: required("MARKETPLACE_REDIRECT_URI")?,
            pipeline_url: required("PIPELINE_URL")?,
            webhook_secret: env::var("WEBHOOK_SECRET").ok().filter(|s| !s.is_empty()),
        };

        Ok(config)
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            detail: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_environment_parsing() {
        assert!(AppEnvironment::from_env_str("production").is_production());
        assert!(AppEnvironment::from_env_str("prod").is_production());
        assert!(!AppEnvironment::from_env_str("development").is_production());
        assert!(!AppEnvironment::from_env_str("staging").is_production());
    }

    #[test]
    fn test_insecure_vault_key_decodes_to_32_zero_bytes() {
        let decoded = BASE64.decode(INSECURE_VAULT_KEY).unwrap();
        assert_eq!(decoded.len(), 32);
        assert!(decoded.iter().all(|b| *b == 0));
    }
}
