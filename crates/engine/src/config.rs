//! Engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CART_API_BASE_URL` - Base URL of the remote cart service
//!   (e.g., `https://carts.example.com/`)
//!
//! ## Optional
//! - `CART_API_TOKEN` - Bearer token for the remote cart service
//! - `CART_SYNC_DEBOUNCE_MS` - Debounce window for sync passes (default: 700)
//! - `CART_SYNC_RETRY_MS` - Delay before retrying a failed pass (default: 2000)
//! - `CART_HTTP_TIMEOUT_SECS` - Per-request transport timeout (default: 30)
//! - `CART_STORAGE_DIR` - Directory holding the durable cart (default: `.cart-sync`)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const DEFAULT_DEBOUNCE_MS: u64 = 700;
const DEFAULT_RETRY_MS: u64 = 2000;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_STORAGE_DIR: &str = ".cart-sync";
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Timing of the sync scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Quiet period after the last mutation before a pass starts.
    pub debounce: Duration,
    /// Delay before a failed pass is retried.
    pub retry_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            retry_delay: Duration::from_millis(DEFAULT_RETRY_MS),
        }
    }
}

/// Remote cart service configuration.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct CartApiConfig {
    /// Base URL; endpoint paths are joined onto it.
    pub base_url: Url,
    /// Bearer token handed to the auth session at startup, if any.
    pub token: Option<SecretString>,
    /// Transport-level timeout applied to every request.
    pub request_timeout: Duration,
}

impl std::fmt::Debug for CartApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartApiConfig")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Cart synchronization configuration.
#[derive(Debug, Clone)]
pub struct CartSyncConfig {
    /// Remote cart service
    pub api: CartApiConfig,
    /// Scheduler timing
    pub sync: SyncConfig,
    /// Directory for the durable cart and wishlist records
    pub storage_dir: PathBuf,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

impl CartSyncConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the token fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let base_url = parse_base_url("CART_API_BASE_URL", &get_required_env("CART_API_BASE_URL")?)?;
        let token = get_optional_env("CART_API_TOKEN")
            .map(|value| validate_secret_strength(&value, "CART_API_TOKEN").map(|()| value))
            .transpose()?
            .map(SecretString::from);
        let request_timeout =
            Duration::from_secs(get_u64_or_default("CART_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?);

        let sync = SyncConfig {
            debounce: Duration::from_millis(get_u64_or_default(
                "CART_SYNC_DEBOUNCE_MS",
                DEFAULT_DEBOUNCE_MS,
            )?),
            retry_delay: Duration::from_millis(get_u64_or_default(
                "CART_SYNC_RETRY_MS",
                DEFAULT_RETRY_MS,
            )?),
        };

        Ok(Self {
            api: CartApiConfig {
                base_url,
                token,
                request_timeout,
            },
            sync,
            storage_dir: PathBuf::from(get_env_or_default("CART_STORAGE_DIR", DEFAULT_STORAGE_DIR)),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get a numeric environment variable with a default value.
fn get_u64_or_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    get_optional_env(key).map_or(Ok(default), |value| {
        value
            .trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Parse a base URL, forcing a trailing slash so `Url::join` appends paths.
fn parse_base_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    let mut normalized = value.trim().to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    let url = Url::parse(&normalized)
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url)
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the token issued by the auth service."
            ),
        ));
    }

    Ok(())
}

/// Whether a token would pass validation. Used by callers that accept a
/// token from somewhere other than the environment.
#[must_use]
pub fn is_plausible_token(token: &SecretString) -> bool {
    validate_secret_strength(token.expose_secret(), "token").is_ok()
}
