//! Store client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All variables are optional and fall back to development defaults:
//!
//! - `ORCHARD_API_URL` - Base URL of the backend API (default: `http://localhost:8000`)
//! - `ORCHARD_REQUEST_TIMEOUT_MS` - Per-request timeout in milliseconds (default: 10000)
//! - `ORCHARD_CACHE_TTL_SECS` - TTL for cached catalog reads (default: 300)
//! - `ORCHARD_CACHE_CAPACITY` - Max cached catalog entries (default: 1000)
//! - `ORCHARD_DATA_DIR` - Directory for device-persisted state (default: `.orchard`)

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Default backend API base URL.
const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default per-request timeout in milliseconds.
///
/// Bounds every remote call so a hung network surfaces as
/// `NetworkUnavailable` instead of blocking the caller indefinitely.
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Default catalog cache TTL in seconds.
const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Default catalog cache capacity.
const DEFAULT_CACHE_CAPACITY: u64 = 1000;

/// Default directory for device-persisted state.
const DEFAULT_DATA_DIR: &str = ".orchard";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Store client configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base URL of the backend API
    pub api_base_url: Url,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// TTL for cached catalog reads (products, categories)
    pub cache_ttl: Duration,
    /// Maximum number of cached catalog entries
    pub cache_capacity: u64,
    /// Directory for device-persisted state (session, mirror snapshots)
    pub data_dir: PathBuf,
}

impl StoreConfig {
    /// Create a configuration with defaults for the given API base URL.
    #[must_use]
    pub fn new(api_base_url: Url) -> Self {
        Self {
            api_base_url,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_base_url = get_env_or_default("ORCHARD_API_URL", DEFAULT_API_URL)
            .parse::<Url>()
            .map_err(|e| ConfigError::InvalidEnvVar("ORCHARD_API_URL".to_string(), e.to_string()))?;

        let request_timeout = Duration::from_millis(parse_env_or(
            "ORCHARD_REQUEST_TIMEOUT_MS",
            DEFAULT_REQUEST_TIMEOUT_MS,
        )?);
        let cache_ttl =
            Duration::from_secs(parse_env_or("ORCHARD_CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS)?);
        let cache_capacity = parse_env_or("ORCHARD_CACHE_CAPACITY", DEFAULT_CACHE_CAPACITY)?;

        let data_dir = PathBuf::from(get_env_or_default("ORCHARD_DATA_DIR", DEFAULT_DATA_DIR));

        Ok(Self {
            api_base_url,
            request_timeout,
            cache_ttl,
            cache_capacity,
            data_dir,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse a `u64` environment variable with a default value.
fn parse_env_or(key: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_applies_defaults() {
        let config = StoreConfig::new("http://localhost:8000".parse().unwrap());
        assert_eq!(config.api_base_url.as_str(), "http://localhost:8000/");
        assert_eq!(config.request_timeout, Duration::from_millis(10_000));
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.cache_capacity, 1000);
        assert_eq!(config.data_dir, PathBuf::from(".orchard"));
    }

    #[test]
    fn test_get_env_or_default_falls_back() {
        let value = get_env_or_default("ORCHARD_TEST_UNSET_VARIABLE", "fallback");
        assert_eq!(value, "fallback");
    }

    #[test]
    fn test_parse_env_or_falls_back() {
        let value = parse_env_or("ORCHARD_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }
}
