//! Application configuration loaded from environment variables.
//!
//! Everything here is read once at startup and treated as read-only. For local
//! development a `.env` file is honored.

use std::env;
use std::str::FromStr;

use crate::error::ErrorPolicy;

/// Intuit environment the app is registered against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Sandbox,
    Production,
}

impl Environment {
    /// Base URL for the v3 accounting API.
    pub fn api_base_url(&self) -> &'static str {
        match self {
            Environment::Sandbox => "https://sandbox-quickbooks.api.intuit.com",
            Environment::Production => "https://quickbooks.api.intuit.com",
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" | "development" => Ok(Environment::Sandbox),
            "production" => Ok(Environment::Production),
            _ => Err(ConfigError::Invalid("QBO_ENVIRONMENT", s.to_string())),
        }
    }
}

/// Where credentials, OAuth states and synced records live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Firestore,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(StorageBackend::Firestore),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(ConfigError::Invalid("QBO_STORAGE", s.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- OAuth ---
    /// Intuit OAuth client ID (public)
    pub client_id: String,
    /// Intuit OAuth client secret
    pub client_secret: String,
    /// Redirect URI registered with Intuit (must match exactly)
    pub redirect_uri: String,
    /// Space-separated OAuth scopes
    pub scope: String,
    pub environment: Environment,

    // --- Token management ---
    /// Fallback access token lifetime when the provider omits `expires_in`
    pub access_token_lifetime_secs: i64,
    /// Fallback refresh token lifetime when the provider omits it
    pub refresh_token_lifetime_secs: i64,
    /// Refresh expired access tokens on demand instead of forcing reconnection
    pub auto_refresh: bool,
    /// Encrypt tokens at rest with KMS
    pub token_encryption: bool,
    /// Lifetime of an OAuth state token
    pub oauth_state_ttl_minutes: i64,

    // --- API client ---
    pub api_timeout_secs: u64,
    /// Attempts for idempotent reads (1 = no retry)
    pub api_retry_attempts: u32,
    pub minor_version: String,
    pub log_requests: bool,

    // --- Errors ---
    pub show_detailed_errors: bool,
    pub log_errors: bool,

    // --- Presentation redirects ---
    /// Where the user lands after a successful connection
    pub success_url: String,
    /// Where the user is sent to (re)connect
    pub connect_url: String,
    /// Where the user lands after a failed connection
    pub error_url: String,

    // --- Infrastructure ---
    pub storage: StorageBackend,
    pub gcp_project_id: String,
    pub gcp_region: String,
    pub kms_key_name: String,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    pub port: u16,
}

impl Config {
    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            client_id: "test_client_id".to_string(),
            client_secret: "test_secret".to_string(),
            redirect_uri: "http://localhost:8080/quickbooks/callback".to_string(),
            scope: "com.intuit.quickbooks.accounting".to_string(),
            environment: Environment::Sandbox,
            access_token_lifetime_secs: 3600,
            refresh_token_lifetime_secs: 8_726_400,
            auto_refresh: true,
            token_encryption: false,
            oauth_state_ttl_minutes: 60,
            api_timeout_secs: 30,
            api_retry_attempts: 3,
            minor_version: "65".to_string(),
            log_requests: false,
            show_detailed_errors: false,
            log_errors: true,
            success_url: "http://localhost:5173/dashboard".to_string(),
            connect_url: "/quickbooks/connect".to_string(),
            error_url: "http://localhost:5173/quickbooks/error".to_string(),
            storage: StorageBackend::Memory,
            gcp_project_id: "test-project".to_string(),
            gcp_region: "us-west1".to_string(),
            kms_key_name: "token-encryption".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            port: 8080,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            client_id: env::var("QBO_CLIENT_ID")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("QBO_CLIENT_ID"))?,
            client_secret: env::var("QBO_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("QBO_CLIENT_SECRET"))?,
            redirect_uri: env::var("QBO_REDIRECT_URI")
                .unwrap_or_else(|_| "http://localhost:8080/quickbooks/callback".to_string()),
            scope: env::var("QBO_SCOPE")
                .unwrap_or_else(|_| "com.intuit.quickbooks.accounting".to_string()),
            environment: parse_or("QBO_ENVIRONMENT", Environment::Sandbox)?,

            access_token_lifetime_secs: parse_or("QBO_ACCESS_TOKEN_LIFETIME", 3600)?,
            refresh_token_lifetime_secs: parse_or("QBO_REFRESH_TOKEN_LIFETIME", 8_726_400)?,
            auto_refresh: parse_or("QBO_AUTO_REFRESH", true)?,
            token_encryption: parse_or("QBO_TOKEN_ENCRYPTION", true)?,
            oauth_state_ttl_minutes: parse_or("QBO_OAUTH_STATE_TTL_MINUTES", 60)?,

            api_timeout_secs: parse_or("QBO_API_TIMEOUT", 30)?,
            api_retry_attempts: parse_or("QBO_API_RETRY_ATTEMPTS", 3)?,
            minor_version: env::var("QBO_MINOR_VERSION").unwrap_or_else(|_| "65".to_string()),
            log_requests: parse_or("QBO_LOG_REQUESTS", false)?,

            show_detailed_errors: parse_or("QBO_SHOW_DETAILED_ERRORS", false)?,
            log_errors: parse_or("QBO_LOG_ERRORS", true)?,

            success_url: env::var("QBO_SUCCESS_URL")
                .unwrap_or_else(|_| "http://localhost:5173/dashboard".to_string()),
            connect_url: env::var("QBO_CONNECT_URL")
                .unwrap_or_else(|_| "/quickbooks/connect".to_string()),
            error_url: env::var("QBO_ERROR_URL")
                .unwrap_or_else(|_| "http://localhost:5173/quickbooks/error".to_string()),

            storage: parse_or("QBO_STORAGE", StorageBackend::Firestore)?,
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            gcp_region: env::var("GCP_REGION").unwrap_or_else(|_| "us-west1".to_string()),
            kms_key_name: env::var("QBO_KMS_KEY_NAME")
                .unwrap_or_else(|_| "token-encryption".to_string()),
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            port: parse_or("PORT", 8080)?,
        })
    }

    /// Error logging and redaction flags.
    pub fn error_policy(&self) -> ErrorPolicy {
        ErrorPolicy {
            log_errors: self.log_errors,
            show_detailed_errors: self.show_detailed_errors,
        }
    }
}

/// Parse an optional variable, falling back to `default` when unset.
fn parse_or<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
