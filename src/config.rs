//! Application configuration loaded from environment variables.

use std::env;

/// OAuth client credentials for one provider.
#[derive(Debug, Clone)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// GitHub OAuth app credentials
    pub github: ProviderCredentials,
    /// Bitbucket OAuth consumer credentials
    pub bitbucket: ProviderCredentials,
    /// Frontend URL allowed for CORS
    pub frontend_url: String,
    /// Postgres connection string; in-memory store is used when absent
    pub database_url: Option<String>,
    /// Lifecycle event sink endpoint (best-effort delivery); disabled when absent
    pub events_endpoint: Option<String>,
    /// Write key sent with lifecycle events
    pub events_write_key: Option<String>,
    /// Server port
    pub port: u16,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            github: ProviderCredentials {
                client_id: "test_github_id".to_string(),
                client_secret: "test_github_secret".to_string(),
            },
            bitbucket: ProviderCredentials {
                client_id: "test_bitbucket_id".to_string(),
                client_secret: "test_bitbucket_secret".to_string(),
            },
            frontend_url: "http://localhost:5173".to_string(),
            database_url: None,
            events_endpoint: None,
            events_write_key: None,
            port: 8080,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            github: ProviderCredentials {
                client_id: env::var("GITHUB_CLIENT_ID")
                    .map_err(|_| ConfigError::Missing("GITHUB_CLIENT_ID"))?,
                client_secret: env::var("GITHUB_CLIENT_SECRET")
                    .map(|v| v.trim().to_string())
                    .map_err(|_| ConfigError::Missing("GITHUB_CLIENT_SECRET"))?,
            },
            bitbucket: ProviderCredentials {
                client_id: env::var("BITBUCKET_CLIENT_ID")
                    .map_err(|_| ConfigError::Missing("BITBUCKET_CLIENT_ID"))?,
                client_secret: env::var("BITBUCKET_CLIENT_SECRET")
                    .map(|v| v.trim().to_string())
                    .map_err(|_| ConfigError::Missing("BITBUCKET_CLIENT_SECRET"))?,
            },
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            database_url: env::var("DATABASE_URL").ok(),
            events_endpoint: env::var("EVENTS_ENDPOINT").ok(),
            events_write_key: env::var("EVENTS_WRITE_KEY").ok(),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
